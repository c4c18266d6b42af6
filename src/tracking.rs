// 该文件是 Reli （热力） 项目的一部分。
// src/tracking.rs - 平面锚点与射线命中测试
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

use std::collections::BTreeMap;

use nalgebra::{Affine2, Isometry3, Point2, Point3, Unit, Vector2, Vector3};
use tracing::{debug, info};

use crate::{frame::Frame, projection::PlaneHitTester};

const RAY_PARALLEL_EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(pub u64);

/// 跟踪子系统发现的平面：局部 +Y 为法向，`extent` 为局部 X/Z 方向的尺寸
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneAnchor {
  pub id: AnchorId,
  pub pose: Isometry3<f32>,
  pub extent: Vector2<f32>,
}

impl PlaneAnchor {
  /// 射线与平面在范围内的交点
  pub fn intersect(&self, origin: &Point3<f32>, dir: &Unit<Vector3<f32>>) -> Option<Point3<f32>> {
    let o = self.pose.inverse_transform_point(origin);
    let d = self.pose.inverse_transform_vector(dir);
    if d.y.abs() < RAY_PARALLEL_EPS {
      return None;
    }
    let t = -o.y / d.y;
    if t <= 0.0 {
      return None;
    }
    let local = o + d * t;
    let inside = local.x.abs() <= self.extent.x / 2.0 && local.z.abs() <= self.extent.y / 2.0;
    inside.then(|| self.pose.transform_point(&local))
  }
}

/// 当前会话跟踪到的所有平面
#[derive(Debug, Clone)]
pub struct SurfaceTable {
  anchors: BTreeMap<AnchorId, PlaneAnchor>,
  visible: bool,
}

impl Default for SurfaceTable {
  fn default() -> Self {
    Self {
      anchors: BTreeMap::new(),
      visible: true,
    }
  }
}

impl SurfaceTable {
  /// 新增平面，返回此前是否为空
  pub fn add(&mut self, anchor: PlaneAnchor) -> bool {
    let was_empty = self.anchors.is_empty();
    info!("新增平面 {:?}，尺寸 {:?}", anchor.id, anchor.extent);
    self.anchors.insert(anchor.id, anchor);
    was_empty
  }

  /// 更新已知平面，未知的平面不会被加入
  pub fn update(&mut self, anchor: PlaneAnchor) -> bool {
    match self.anchors.get_mut(&anchor.id) {
      Some(slot) => {
        debug!("更新平面 {:?}", anchor.id);
        *slot = anchor;
        true
      }
      None => false,
    }
  }

  pub fn remove(&mut self, id: AnchorId) -> Option<PlaneAnchor> {
    let removed = self.anchors.remove(&id);
    if removed.is_some() {
      info!("移除平面 {:?}", id);
    }
    removed
  }

  pub fn clear(&mut self) {
    self.anchors.clear();
  }

  pub fn toggle_visibility(&mut self) -> bool {
    self.visible = !self.visible;
    self.visible
  }

  pub fn is_visible(&self) -> bool {
    self.visible
  }

  pub fn len(&self) -> usize {
    self.anchors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.anchors.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &PlaneAnchor> {
    self.anchors.values()
  }
}

/// 用某一帧的相机对平面表做射线命中测试
pub struct PlaneContext<'a> {
  frame: &'a Frame,
  view_to_image: Option<Affine2<f32>>,
  surfaces: &'a SurfaceTable,
}

impl<'a> PlaneContext<'a> {
  pub fn new(frame: &'a Frame, surfaces: &'a SurfaceTable) -> Self {
    Self {
      frame,
      view_to_image: frame.display_transform().try_inverse(),
      surfaces,
    }
  }
}

impl PlaneHitTester for PlaneContext<'_> {
  fn hit_test_plane(&self, image_point: &Point2<f32>, transform: &Affine2<f32>) -> Option<Point3<f32>> {
    // 选中时的视图坐标，再按当前帧换回图像坐标
    let view = transform.transform_point(image_point);
    let image = self.view_to_image?.transform_point(&view);
    let (origin, dir) = self.frame.camera().ray(&image)?;

    self
      .surfaces
      .iter()
      .filter_map(|anchor| anchor.intersect(&origin, &dir))
      .min_by(|a, b| (*a - origin).norm().total_cmp(&(*b - origin).norm()))
  }
}
