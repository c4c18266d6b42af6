// 该文件是 Reli （热力） 项目的一部分。
// src/detect.rs - 四边形检测接口
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

use nalgebra::{Affine2, Point2};
use tracing::debug;

use crate::{
  frame::Frame,
  geometry::{Rect2, corner_angle},
};

#[cfg(feature = "contour_detector")]
mod contour;
#[cfg(feature = "contour_detector")]
pub use self::contour::ContourQuadDetector;

/// 检测策略，检测器应尽量满足，`filter_by_policy` 会再兜底一次
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectPolicy {
  pub max_observations: usize,
  /// 短边与长边之比的下限
  pub min_aspect_ratio: f32,
  /// 内角偏离 90 度的最大值（度）
  pub quadrature_tolerance: f32,
  /// 包围盒短边的下限（归一化坐标）
  pub min_size: f32,
  pub min_confidence: f32,
}

/// 召回优先的固定策略，几乎不过滤
pub const RECALL_POLICY: DetectPolicy = DetectPolicy {
  max_observations: 10,
  min_aspect_ratio: 0.1,
  quadrature_tolerance: 30.0,
  min_size: 0.01,
  min_confidence: 0.4,
};

impl Default for DetectPolicy {
  fn default() -> Self {
    RECALL_POLICY
  }
}

/// 检测器输出的原始四边形，角点为归一化图像坐标（左上角为原点）
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedQuad {
  pub top_left: Point2<f32>,
  pub top_right: Point2<f32>,
  pub bottom_right: Point2<f32>,
  pub bottom_left: Point2<f32>,
  pub confidence: f32,
}

impl DetectedQuad {
  pub fn from_corners(corners: [Point2<f32>; 4], confidence: f32) -> Self {
    let [top_left, top_right, bottom_right, bottom_left] = corners;
    Self {
      top_left,
      top_right,
      bottom_right,
      bottom_left,
      confidence,
    }
  }

  pub fn corners(&self) -> [Point2<f32>; 4] {
    [
      self.top_left,
      self.top_right,
      self.bottom_right,
      self.bottom_left,
    ]
  }

  pub fn bounding_box(&self) -> Rect2 {
    Rect2::bounding(self.corners()).unwrap_or(Rect2::new(0.0, 0.0, 0.0, 0.0))
  }

  fn satisfies(&self, policy: &DetectPolicy) -> bool {
    if !self.confidence.is_finite() || self.confidence < policy.min_confidence {
      return false;
    }

    let bbox = self.bounding_box();
    let (short, long) = if bbox.width() < bbox.height() {
      (bbox.width(), bbox.height())
    } else {
      (bbox.height(), bbox.width())
    };
    if long <= 0.0 || short < policy.min_size || short / long < policy.min_aspect_ratio {
      return false;
    }

    let c = self.corners();
    (0..4).all(|i| {
      let angle = corner_angle(&c[(i + 3) % 4], &c[i], &c[(i + 1) % 4]);
      (angle - 90.0).abs() <= policy.quadrature_tolerance
    })
  }
}

/// 一次检测中可被选中的候选四边形，`id` 在整个会话中唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuadId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateQuad {
  pub id: QuadId,
  pub quad: DetectedQuad,
}

impl CandidateQuad {
  pub fn corners(&self) -> [Point2<f32>; 4] {
    self.quad.corners()
  }

  pub fn bounding_box(&self) -> Rect2 {
    self.quad.bounding_box()
  }

  pub fn confidence(&self) -> f32 {
    self.quad.confidence
  }

  /// 显示变换后的角点（视图坐标）
  pub fn view_corners(&self, transform: &Affine2<f32>) -> [Point2<f32>; 4] {
    self.corners().map(|p| transform.transform_point(&p))
  }
}

/// 四边形检测器，在后台线程中调用
///
/// 检测失败应返回空结果而不是错误。
pub trait QuadDetector: Send {
  fn detect(&mut self, frame: &Frame, policy: &DetectPolicy) -> Vec<DetectedQuad>;
}

impl<F> QuadDetector for F
where
  F: FnMut(&Frame, &DetectPolicy) -> Vec<DetectedQuad> + Send,
{
  fn detect(&mut self, frame: &Frame, policy: &DetectPolicy) -> Vec<DetectedQuad> {
    self(frame, policy)
  }
}

/// 按策略过滤并截断检测结果，保持检测器给出的顺序
pub fn filter_by_policy(quads: Vec<DetectedQuad>, policy: &DetectPolicy) -> Vec<DetectedQuad> {
  let total = quads.len();
  let kept: Vec<_> = quads
    .into_iter()
    .filter(|q| q.satisfies(policy))
    .take(policy.max_observations)
    .collect();
  debug!("策略过滤: {} -> {}", total, kept.len());
  kept
}

#[cfg(test)]
mod tests {
  use super::*;

  fn axis_quad(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> DetectedQuad {
    DetectedQuad::from_corners(Rect2::new(x, y, w, h).corners(), confidence)
  }

  #[test]
  fn low_confidence_is_dropped() {
    let quads = vec![axis_quad(0.1, 0.1, 0.3, 0.3, 0.39), axis_quad(0.1, 0.1, 0.3, 0.3, 0.4)];
    let kept = filter_by_policy(quads, &RECALL_POLICY);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].confidence, 0.4);
  }

  #[test]
  fn slivers_and_specks_are_dropped() {
    let quads = vec![
      axis_quad(0.1, 0.1, 0.5, 0.04, 0.9),
      axis_quad(0.1, 0.1, 0.005, 0.005, 0.9),
      axis_quad(0.1, 0.1, 0.5, 0.06, 0.9),
    ];
    let kept = filter_by_policy(quads, &RECALL_POLICY);
    assert_eq!(kept.len(), 1);
    assert!((kept[0].bounding_box().height() - 0.06).abs() < 1e-6);
  }

  #[test]
  fn skewed_quad_outside_tolerance_is_dropped() {
    let skewed = DetectedQuad::from_corners(
      [
        Point2::new(0.1, 0.1),
        Point2::new(0.5, 0.1),
        Point2::new(0.9, 0.5),
        Point2::new(0.5, 0.5),
      ],
      0.9,
    );
    assert!(filter_by_policy(vec![skewed], &RECALL_POLICY).is_empty());
  }

  #[test]
  fn truncation_keeps_detector_order() {
    let quads: Vec<_> = (0..15)
      .map(|i| axis_quad(0.01 * i as f32, 0.1, 0.3, 0.3, 0.5 + 0.01 * i as f32))
      .collect();
    let kept = filter_by_policy(quads, &RECALL_POLICY);
    assert_eq!(kept.len(), 10);
    assert!((kept[0].confidence - 0.5).abs() < 1e-6);
    assert!((kept[9].confidence - 0.59).abs() < 1e-6);
  }
}
