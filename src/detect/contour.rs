// 该文件是 Reli （热力） 项目的一部分。
// src/detect/contour.rs - 基于轮廓的矩形检测器
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::imageops;
use imageproc::{
  contours::{BorderType, find_contours},
  edges::canny,
  filter::gaussian_blur_f32,
  geometry::{approximate_polygon_dp, arc_length},
  point::Point,
};
use nalgebra::Point2;
use tracing::debug;

use crate::{
  detect::{DetectPolicy, DetectedQuad, QuadDetector, filter_by_policy},
  frame::Frame,
  geometry::{order_corners, polygon_area},
};

const CONTOUR_BLUR_SIGMA: f32 = 1.4;
const CONTOUR_CANNY_LOW: f32 = 20.0;
const CONTOUR_CANNY_HIGH: f32 = 60.0;
/// Douglas-Peucker 容差与轮廓周长之比
const CONTOUR_DP_RATIO: f64 = 0.02;
/// 周长过短的轮廓直接跳过（像素）
const CONTOUR_MIN_PERIMETER: f64 = 16.0;

/// 灰度模糊 → Canny 边缘 → 外轮廓 → 多边形近似，保留凸四边形
///
/// 置信度为轮廓面积与近似四边形面积之比，越接近 1 越像矩形。
#[derive(Debug, Clone, Default)]
pub struct ContourQuadDetector;

impl ContourQuadDetector {
  pub fn new() -> Self {
    Self
  }
}

impl QuadDetector for ContourQuadDetector {
  fn detect(&mut self, frame: &Frame, policy: &DetectPolicy) -> Vec<DetectedQuad> {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    if w < 2.0 || h < 2.0 {
      return Vec::new();
    }

    let gray = imageops::grayscale(frame.image());
    let blurred = gaussian_blur_f32(&gray, CONTOUR_BLUR_SIGMA);
    let edges = canny(&blurred, CONTOUR_CANNY_LOW, CONTOUR_CANNY_HIGH);

    let mut quads = Vec::new();
    for contour in find_contours::<i32>(&edges) {
      if contour.border_type != BorderType::Outer {
        continue;
      }
      let perimeter = arc_length(&contour.points, true);
      if perimeter < CONTOUR_MIN_PERIMETER {
        continue;
      }

      let polygon = approximate_polygon_dp(&contour.points, perimeter * CONTOUR_DP_RATIO, true);
      let Some(corners) = as_convex_quad(&polygon) else {
        continue;
      };

      let contour_area = polygon_area(&to_points(&contour.points));
      let quad_area = polygon_area(&corners);
      if quad_area <= f32::EPSILON {
        continue;
      }
      let confidence = (contour_area / quad_area).min(1.0);

      let normalized = order_corners(corners).map(|p| Point2::new(p.x / w, p.y / h));
      quads.push(DetectedQuad::from_corners(normalized, confidence));
    }

    // 面积大的在前，近似于检测库按显著性排序
    quads.sort_by(|a, b| {
      let area_a = polygon_area(&a.corners());
      let area_b = polygon_area(&b.corners());
      area_b.total_cmp(&area_a)
    });

    debug!("帧 {}: 轮廓检测得到 {} 个四边形", frame.index(), quads.len());
    filter_by_policy(quads, policy)
  }
}

fn to_points(points: &[Point<i32>]) -> Vec<Point2<f32>> {
  points
    .iter()
    .map(|p| Point2::new(p.x as f32, p.y as f32))
    .collect()
}

fn as_convex_quad(polygon: &[Point<i32>]) -> Option<[Point2<f32>; 4]> {
  // 闭合近似可能把首点重复在末尾
  let trimmed = match polygon {
    [first, .., last] if polygon.len() == 5 && first == last => &polygon[..4],
    _ => polygon,
  };
  if trimmed.len() != 4 {
    return None;
  }

  let pts = to_points(trimmed);
  let cross = |i: usize| {
    let a = pts[i];
    let b = pts[(i + 1) % 4];
    let c = pts[(i + 2) % 4];
    (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x)
  };
  let signs: Vec<f32> = (0..4).map(cross).collect();
  let convex = signs.iter().all(|s| *s > 0.0) || signs.iter().all(|s| *s < 0.0);
  convex.then(|| [pts[0], pts[1], pts[2], pts[3]])
}
