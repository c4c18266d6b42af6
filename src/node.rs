// 该文件是 Reli （热力） 项目的一部分。
// src/node.rs - 场景中的矩形节点
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

use std::collections::HashMap;

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use tracing::{info, warn};

use crate::{detect::QuadId, heatmap::Heatmap, projection::PlaneRectangle};

pub const NODE_TRANSPARENCY: f32 = 0.9;

/// 贴上热力图的平面矩形
#[derive(Debug, Clone)]
pub struct RectangleNode {
  pub key: QuadId,
  pub rectangle: PlaneRectangle,
  pub heatmap: Heatmap,
  pub transparency: f32,
  pub double_sided: bool,
}

impl RectangleNode {
  pub fn new(key: QuadId, rectangle: PlaneRectangle, heatmap: Heatmap) -> Self {
    Self {
      key,
      rectangle,
      heatmap,
      transparency: NODE_TRANSPARENCY,
      double_sided: true,
    }
  }

  /// 节点位姿：平移到中心，先绕 X 轴放平，再绕平面法向转到矩形朝向
  ///
  /// 几何体本身是 XY 平面上宽 `width`、高 `height` 的矩形。
  pub fn transform(&self) -> Isometry3<f32> {
    let lay_flat = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -std::f32::consts::FRAC_PI_2);
    let spin = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), self.rectangle.orientation);
    let p = self.rectangle.position;
    Isometry3::from_parts(Translation3::new(p.x, p.y, p.z), lay_flat * spin)
  }
}

/// 节点表，每个来源四边形最多一个活动节点
#[derive(Debug, Default)]
pub struct NodeTable {
  nodes: HashMap<QuadId, RectangleNode>,
}

impl NodeTable {
  /// 插入节点，同一来源已有节点时替换并返回旧节点
  pub fn insert(&mut self, node: RectangleNode) -> Option<RectangleNode> {
    let key = node.key;
    let old = self.nodes.insert(key, node);
    if old.is_some() {
      warn!("四边形 {:?} 已有节点，替换为新节点", key);
    } else {
      info!("创建节点 {:?}，当前共 {} 个", key, self.nodes.len());
    }
    old
  }

  pub fn get(&self, key: QuadId) -> Option<&RectangleNode> {
    self.nodes.get(&key)
  }

  pub fn clear(&mut self) -> usize {
    let n = self.nodes.len();
    self.nodes.clear();
    if n > 0 {
      info!("清除 {} 个节点", n);
    }
    n
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &RectangleNode> {
    self.nodes.values()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    heatmap::HeatmapStyle,
    inference::ScalarField,
  };
  use nalgebra::Point3;

  fn node(id: u64, orientation: f32) -> RectangleNode {
    let rectangle = PlaneRectangle {
      position: Point3::new(1.0, 0.0, -2.0),
      width: 0.4,
      height: 0.2,
      orientation,
      corners: [Point3::origin(); 4],
    };
    let heatmap = Heatmap::paint(ScalarField::placeholder(), &HeatmapStyle::default());
    RectangleNode::new(QuadId(id), rectangle, heatmap)
  }

  #[test]
  fn unrotated_node_lies_flat() {
    let n = node(1, 0.0);
    let t = n.transform();
    // 几何体的 +Y 边落到世界 -Z，法向 +Z 变为世界 +Y
    let up = t * Vector3::z();
    assert!((up - Vector3::y()).norm() < 1e-6);
    let top = t * Vector3::y();
    assert!((top + Vector3::z()).norm() < 1e-6);
    assert_eq!(t.translation.vector, Vector3::new(1.0, 0.0, -2.0));
    assert_eq!(n.transparency, 0.9);
    assert!(n.double_sided);
  }

  #[test]
  fn orientation_spins_about_the_plane_normal() {
    let t = node(1, std::f32::consts::FRAC_PI_2).transform();
    let width_axis = t * Vector3::x();
    // 朝向 pi/2 时宽边指向世界 -Z
    assert!((width_axis + Vector3::z()).norm() < 1e-6);
  }

  #[test]
  fn one_node_per_quad() {
    let mut table = NodeTable::default();
    assert!(table.insert(node(1, 0.0)).is_none());
    assert!(table.insert(node(2, 0.0)).is_none());
    assert!(table.insert(node(1, 0.5)).is_some());
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(QuadId(1)).unwrap().rectangle.orientation, 0.5);
    assert_eq!(table.clear(), 2);
    assert!(table.is_empty());
  }
}
