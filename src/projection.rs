// 该文件是 Reli （热力） 项目的一部分。
// src/projection.rs - 二维四边形到三维平面矩形的投影
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

use std::fmt;

use nalgebra::{Affine2, Point2, Point3};
use thiserror::Error;
use tracing::{debug, warn};

use crate::detect::CandidateQuad;

/// 平面命中测试：把变换后的归一化图像点映射到已跟踪平面上的世界坐标
pub trait PlaneHitTester {
  fn hit_test_plane(&self, image_point: &Point2<f32>, transform: &Affine2<f32>) -> Option<Point3<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
  TopLeft,
  TopRight,
  BottomRight,
  BottomLeft,
}

impl Corner {
  pub const ALL: [Corner; 4] = [
    Corner::TopLeft,
    Corner::TopRight,
    Corner::BottomRight,
    Corner::BottomLeft,
  ];
}

impl fmt::Display for Corner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Corner::TopLeft => "左上",
      Corner::TopRight => "右上",
      Corner::BottomRight => "右下",
      Corner::BottomLeft => "左下",
    };
    f.write_str(name)
  }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionError {
  #[error("矩形{0}角下方没有平面")]
  NoPlaneForRect(Corner),
}

/// 世界坐标系中的平面矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneRectangle {
  pub position: Point3<f32>,
  pub width: f32,
  pub height: f32,
  /// 绕竖直轴的旋转（弧度）
  pub orientation: f32,
  /// 命中的四个角点：左上、右上、右下、左下
  pub corners: [Point3<f32>; 4],
}

/// 四个角都必须命中平面，任何一个失败即整体失败
///
/// 宽为左上到右上的世界距离，高为左上到左下的世界距离，中心取四角平均。
/// 朝向取上边在水平面内相对 +X 的转角，正方向与绕 +Y 轴旋转一致。
pub fn project<H: PlaneHitTester + ?Sized>(
  candidate: &CandidateQuad,
  transform: &Affine2<f32>,
  planes: &H,
) -> Result<PlaneRectangle, ProjectionError> {
  let image_corners = candidate.corners();
  let mut corners = [Point3::origin(); 4];
  for (i, corner) in Corner::ALL.into_iter().enumerate() {
    corners[i] = planes
      .hit_test_plane(&image_corners[i], transform)
      .ok_or_else(|| {
        warn!("四边形 {:?} 的{}角没有命中平面", candidate.id, corner);
        ProjectionError::NoPlaneForRect(corner)
      })?;
  }

  let [tl, tr, _br, bl] = corners;
  let width = (tr - tl).norm();
  let height = (bl - tl).norm();
  let sum = corners.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords);
  let position = Point3::from(sum / 4.0);
  let top = tr - tl;
  let orientation = (-top.z).atan2(top.x);

  debug!(
    "四边形 {:?} 投影结果: 中心 {:?}, {:.3} x {:.3} m, 朝向 {:.3} rad",
    candidate.id, position, width, height, orientation
  );

  Ok(PlaneRectangle {
    position,
    width,
    height,
    orientation,
    corners,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    detect::{DetectedQuad, QuadId},
    geometry::Rect2,
  };

  /// 把归一化点直接铺到 y=0 的地面上，1 个单位对应 2 米
  struct Floor {
    hole: Option<Point2<f32>>,
  }

  impl PlaneHitTester for Floor {
    fn hit_test_plane(&self, p: &Point2<f32>, t: &Affine2<f32>) -> Option<Point3<f32>> {
      if self.hole.is_some_and(|h| (h - *p).norm() < 1e-6) {
        return None;
      }
      let v = t.transform_point(p);
      Some(Point3::new(v.x * 2.0, 0.0, v.y * 2.0))
    }
  }

  fn candidate() -> CandidateQuad {
    CandidateQuad {
      id: QuadId(1),
      quad: DetectedQuad::from_corners(Rect2::new(0.2, 0.3, 0.5, 0.25).corners(), 0.9),
    }
  }

  #[test]
  fn size_comes_from_world_distances() {
    let rect = project(&candidate(), &Affine2::identity(), &Floor { hole: None }).unwrap();
    assert!((rect.width - 1.0).abs() < 1e-5);
    assert!((rect.height - 0.5).abs() < 1e-5);
    assert!((rect.position.x - 0.9).abs() < 1e-5);
    assert!((rect.position.z - 0.85).abs() < 1e-5);
    assert!(rect.orientation.abs() < 1e-6);
  }

  #[test]
  fn missing_corner_fails_the_whole_rect() {
    let floor = Floor {
      hole: Some(Point2::new(0.7, 0.55)),
    };
    let err = project(&candidate(), &Affine2::identity(), &floor).unwrap_err();
    assert_eq!(err, ProjectionError::NoPlaneForRect(Corner::BottomRight));
  }

  #[test]
  fn same_inputs_same_rectangle() {
    let floor = Floor { hole: None };
    let t = crate::geometry::affine(0.0, 1.0, -1.0, 0.0, 1.0, 0.0);
    let a = project(&candidate(), &t, &floor).unwrap();
    let b = project(&candidate(), &t, &floor).unwrap();
    assert_eq!(a, b);
    // 旋转 90 度后上边指向 +Z，朝向为 -pi/2
    assert!((a.orientation + std::f32::consts::FRAC_PI_2).abs() < 1e-5);
  }
}
