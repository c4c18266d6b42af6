// 该文件是 Reli （热力） 项目的一部分。
// src/frame.rs - 相机帧定义
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

use std::sync::Arc;

use image::RgbImage;
use nalgebra::{Affine2, Isometry3, Point2, Point3, Unit, Vector3};

/// 针孔相机内参，单位为像素
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
  pub fx: f32,
  pub fy: f32,
  pub cx: f32,
  pub cy: f32,
}

impl CameraIntrinsics {
  pub fn is_valid(self) -> bool {
    self.fx.is_finite()
      && self.fy.is_finite()
      && self.cx.is_finite()
      && self.cy.is_finite()
      && self.fx.abs() > 1e-6
      && self.fy.abs() > 1e-6
  }

  /// 像素坐标转换为针孔归一化坐标
  pub fn pixel_to_normalized(self, pixel: Point2<f32>) -> Option<Point2<f32>> {
    if !self.is_valid() {
      return None;
    }
    let x = (pixel.x - self.cx) / self.fx;
    let y = (pixel.y - self.cy) / self.fy;
    (x.is_finite() && y.is_finite()).then(|| Point2::new(x, y))
  }
}

/// 一帧对应的相机：内参、分辨率以及相机到世界的位姿
///
/// 相机坐标系与跟踪子系统一致：+X 向右，+Y 向上，视线沿 -Z。
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
  pub intrinsics: CameraIntrinsics,
  pub resolution: (u32, u32),
  pub pose: Isometry3<f32>,
}

impl Camera {
  /// 主点位于图像中心、焦距为 `focal` 像素的相机
  pub fn centered(width: u32, height: u32, focal: f32, pose: Isometry3<f32>) -> Self {
    Self {
      intrinsics: CameraIntrinsics {
        fx: focal,
        fy: focal,
        cx: width as f32 / 2.0,
        cy: height as f32 / 2.0,
      },
      resolution: (width, height),
      pose,
    }
  }

  /// 归一化图像坐标（左上角为原点）对应的世界坐标射线
  pub fn ray(&self, image_point: &Point2<f32>) -> Option<(Point3<f32>, Unit<Vector3<f32>>)> {
    let (w, h) = self.resolution;
    let pixel = Point2::new(image_point.x * w as f32, image_point.y * h as f32);
    let n = self.intrinsics.pixel_to_normalized(pixel)?;
    // 图像 y 向下，相机 y 向上
    let dir_camera = Vector3::new(n.x, -n.y, -1.0);
    let dir_world = self.pose.rotation * dir_camera;
    let origin = Point3::from(self.pose.translation.vector);
    Some((origin, Unit::new_normalize(dir_world)))
  }
}

/// 跟踪子系统产出的一帧：时间戳、图像、相机以及图像到视图的显示变换
///
/// 帧创建后不可变，克隆只增加图像的引用计数。
#[derive(Debug, Clone)]
pub struct Frame {
  index: u64,
  timestamp: f64,
  image: Arc<RgbImage>,
  camera: Camera,
  display_transform: Affine2<f32>,
}

impl Frame {
  pub fn new(index: u64, timestamp: f64, image: RgbImage, camera: Camera) -> Self {
    Self {
      index,
      timestamp,
      image: Arc::new(image),
      camera,
      display_transform: Affine2::identity(),
    }
  }

  pub fn with_display_transform(mut self, transform: Affine2<f32>) -> Self {
    self.display_transform = transform;
    self
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn timestamp(&self) -> f64 {
    self.timestamp
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn camera(&self) -> &Camera {
    &self.camera
  }

  /// 归一化图像坐标到视图坐标的变换
  pub fn display_transform(&self) -> &Affine2<f32> {
    &self.display_transform
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    let (w, h) = image.dimensions();
    let camera = Camera::centered(w, h, w.max(h) as f32, Isometry3::identity());
    Frame::new(0, 0.0, image, camera)
  }
}
