// 该文件是 Reli （热力） 项目的一部分。
// src/output.rs - 输出定义
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

use image::{RgbImage, imageops};
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl,
  frame::Frame,
  heatmap::{Heatmap, Legend},
  overlay::Overlay,
};
#[cfg(any(feature = "save_image_file", feature = "directory_record"))]
use crate::FromUrlWithScheme;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

/// 可作为底图的类型
pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

impl ToRgbImage for RgbImage {
  fn to_rgb_image(&self) -> RgbImage {
    self.clone()
  }
}

impl ToRgbImage for Frame {
  fn to_rgb_image(&self) -> RgbImage {
    self.image().clone()
  }
}

/// 可画到底图上、也可写成记录的结果
pub trait Annotation {
  fn draw_on(&self, canvas: &mut RgbImage);
  fn to_record(&self) -> Value;
  fn is_empty(&self) -> bool {
    false
  }
}

impl Annotation for Overlay {
  fn draw_on(&self, canvas: &mut RgbImage) {
    self.draw(canvas);
  }

  fn to_record(&self) -> Value {
    let outline = |o: &[nalgebra::Point2<f32>; 4]| o.iter().map(|p| [p.x, p.y]).collect::<Vec<_>>();
    json!({
      "candidates": self.candidates().iter().map(outline).collect::<Vec<_>>(),
      "selected": self.selected().map(outline),
    })
  }

  fn is_empty(&self) -> bool {
    Overlay::is_empty(self)
  }
}

impl Annotation for Heatmap {
  /// 铺满整张底图
  fn draw_on(&self, canvas: &mut RgbImage) {
    *canvas = self.upscale(canvas.width(), canvas.height());
  }

  fn to_record(&self) -> Value {
    let style = self.style();
    json!({
      "cols": style.cols,
      "rows": style.rows,
      "range": [style.range.0, style.range.1],
      "values": self.field().values(),
    })
  }
}

impl Annotation for Legend {
  /// 贴在底图右侧
  fn draw_on(&self, canvas: &mut RgbImage) {
    let x = canvas.width() as i64 - self.image().width() as i64;
    imageops::overlay(canvas, self.image(), x.max(0), 0);
  }

  fn to_record(&self) -> Value {
    json!({
      "ticks": self
        .ticks()
        .iter()
        .map(|t| json!({ "value": t.value, "y": t.y }))
        .collect::<Vec<_>>(),
    })
  }
}

impl<A: Annotation, B: Annotation> Annotation for (A, B) {
  fn draw_on(&self, canvas: &mut RgbImage) {
    self.0.draw_on(canvas);
    self.1.draw_on(canvas);
  }

  fn to_record(&self) -> Value {
    json!([self.0.to_record(), self.1.to_record()])
  }

  fn is_empty(&self) -> bool {
    self.0.is_empty() && self.1.is_empty()
  }
}

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl<F: ToRgbImage, A: Annotation> Render<F, A> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &F, result: &A) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[allow(unreachable_patterns)]
      _ => {
        let _ = (frame, result);
        Err(OutputError::SchemeMismatch)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    heatmap::{DEFAULT_RANGE, HeatmapStyle},
    inference::ScalarField,
    overlay::OverlayUpdate,
  };
  use image::Rgb;
  use nalgebra::Point2;

  #[test]
  fn overlay_record_lists_outlines() {
    let mut overlay = Overlay::default();
    assert!(Annotation::is_empty(&overlay));
    overlay.apply(OverlayUpdate::Selected([
      Point2::new(1.0, 2.0),
      Point2::new(3.0, 2.0),
      Point2::new(3.0, 4.0),
      Point2::new(1.0, 4.0),
    ]));
    let record = overlay.to_record();
    assert_eq!(record["selected"][1], json!([3.0, 2.0]));
    assert_eq!(record["candidates"], json!([]));
  }

  #[test]
  fn heatmap_with_legend_fills_canvas() {
    let heatmap = Heatmap::paint(ScalarField::placeholder(), &HeatmapStyle::default());
    let legend = Legend::render(&[0.0, 200.0], DEFAULT_RANGE, 8, 48);
    let mut canvas = RgbImage::new(64, 48);
    (heatmap, legend).draw_on(&mut canvas);
    // 左侧是全零场的紫色，右侧顶端是图例的红色
    assert_eq!(canvas.get_pixel(0, 10), &Rgb([255, 0, 255]));
    assert_eq!(canvas.get_pixel(63, 0), &Rgb([255, 0, 0]));
  }
}
