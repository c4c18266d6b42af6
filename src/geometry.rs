// 该文件是 Reli （热力） 项目的一部分。
// src/geometry.rs - 二维几何工具
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

use nalgebra::{Affine2, Matrix3, Point2};

/// 轴对齐矩形，`min` 为左上角，`max` 为右下角
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect2 {
  pub min: Point2<f32>,
  pub max: Point2<f32>,
}

impl Rect2 {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      min: Point2::new(x, y),
      max: Point2::new(x + width, y + height),
    }
  }

  /// 点集的包围盒，空集返回 None
  pub fn bounding<I: IntoIterator<Item = Point2<f32>>>(points: I) -> Option<Self> {
    let mut iter = points.into_iter();
    let first = iter.next()?;
    let (min, max) = iter.fold((first, first), |(min, max), p| {
      (
        Point2::new(min.x.min(p.x), min.y.min(p.y)),
        Point2::new(max.x.max(p.x), max.y.max(p.y)),
      )
    });
    Some(Self { min, max })
  }

  pub fn width(&self) -> f32 {
    self.max.x - self.min.x
  }

  pub fn height(&self) -> f32 {
    self.max.y - self.min.y
  }

  pub fn corners(&self) -> [Point2<f32>; 4] {
    [
      self.min,
      Point2::new(self.max.x, self.min.y),
      self.max,
      Point2::new(self.min.x, self.max.y),
    ]
  }

  /// 左闭右开：落在右边或下边上的点不算在内
  pub fn contains(&self, point: &Point2<f32>) -> bool {
    point.x >= self.min.x && point.x < self.max.x && point.y >= self.min.y && point.y < self.max.y
  }

  /// 仿射变换后的包围盒（四个角点变换后再取外接矩形）
  pub fn apply(&self, transform: &Affine2<f32>) -> Rect2 {
    let corners = self.corners().map(|c| transform.transform_point(&c));
    // 四个点一定非空
    Rect2::bounding(corners).unwrap_or(*self)
  }
}

/// 按 `x' = a·x + c·y + tx`, `y' = b·x + d·y + ty` 构造仿射变换
pub fn affine(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Affine2<f32> {
  Affine2::from_matrix_unchecked(Matrix3::new(a, c, tx, b, d, ty, 0.0, 0.0, 1.0))
}

/// 把归一化坐标放大到视图尺寸的变换
pub fn viewport(width: f32, height: f32) -> Affine2<f32> {
  affine(width, 0.0, 0.0, height, 0.0, 0.0)
}

/// 多边形面积（鞋带公式，取绝对值）
pub fn polygon_area(points: &[Point2<f32>]) -> f32 {
  if points.len() < 3 {
    return 0.0;
  }
  let twice: f32 = points
    .iter()
    .zip(points.iter().cycle().skip(1))
    .map(|(p, q)| p.x * q.y - q.x * p.y)
    .sum();
  twice.abs() / 2.0
}

/// 顶点 `at` 处的内角，单位为度
pub fn corner_angle(prev: &Point2<f32>, at: &Point2<f32>, next: &Point2<f32>) -> f32 {
  let u = prev - at;
  let v = next - at;
  let denom = u.norm() * v.norm();
  if denom <= f32::EPSILON {
    return 0.0;
  }
  (u.dot(&v) / denom).clamp(-1.0, 1.0).acos().to_degrees()
}

/// 将四个角点整理为 左上、右上、右下、左下 的顺序（y 轴向下）
pub fn order_corners(points: [Point2<f32>; 4]) -> [Point2<f32>; 4] {
  let cx = points.iter().map(|p| p.x).sum::<f32>() / 4.0;
  let cy = points.iter().map(|p| p.y).sum::<f32>() / 4.0;

  let mut sorted = points;
  sorted.sort_by(|a, b| {
    let ta = (a.y - cy).atan2(a.x - cx);
    let tb = (b.y - cy).atan2(b.x - cx);
    ta.total_cmp(&tb)
  });

  let start = sorted
    .iter()
    .enumerate()
    .min_by(|(_, a), (_, b)| (a.x + a.y).total_cmp(&(b.x + b.y)))
    .map(|(i, _)| i)
    .unwrap_or(0);
  sorted.rotate_left(start);
  sorted
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transformed_rect_contains_point() {
    let rect = Rect2::new(0.25, 0.25, 0.5, 0.5);
    let view = rect.apply(&viewport(400.0, 800.0));
    assert!((view.min.x - 100.0).abs() < 1e-4);
    assert!((view.max.y - 600.0).abs() < 1e-4);
    assert!(view.contains(&Point2::new(200.0, 400.0)));
    assert!(!view.contains(&Point2::new(300.0, 400.0)));
  }

  #[test]
  fn rotated_transform_bounds_all_corners() {
    // 顺时针 90 度再平移
    let t = affine(0.0, 1.0, -1.0, 0.0, 1.0, 0.0);
    let rect = Rect2::new(0.0, 0.0, 0.5, 0.25).apply(&t);
    assert!((rect.width() - 0.25).abs() < 1e-6);
    assert!((rect.height() - 0.5).abs() < 1e-6);
  }

  #[test]
  fn corners_come_back_clockwise_from_top_left() {
    let tl = Point2::new(0.1, 0.1);
    let tr = Point2::new(0.9, 0.2);
    let br = Point2::new(0.8, 0.9);
    let bl = Point2::new(0.2, 0.8);
    assert_eq!(order_corners([br, tl, bl, tr]), [tl, tr, br, bl]);
  }

  #[test]
  fn square_has_right_angles() {
    let pts = Rect2::new(0.0, 0.0, 2.0, 2.0).corners();
    assert!((polygon_area(&pts) - 4.0).abs() < 1e-6);
    assert!((corner_angle(&pts[3], &pts[0], &pts[1]) - 90.0).abs() < 1e-3);
  }
}
