// 该文件是 Reli （热力） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use nalgebra::Isometry3;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Camera, Frame},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("焦距参数无效: {0}")]
  InvalidFocal(String),
}

/// `image:///path/to/frame.png[?focal=500]`
///
/// 读出单帧，相机位于原点，主点在图像中心。未给出焦距时取图像长边。
pub struct ImageFileInput {
  image: Option<RgbImage>,
  focal: Option<f32>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let focal = match url.query_pairs().find(|(k, _)| k == "focal") {
      Some((_, v)) => Some(
        v.parse::<f32>()
          .ok()
          .filter(|f| f.is_finite() && *f > 0.0)
          .ok_or_else(|| ImageFileInputError::InvalidFocal(v.to_string()))?,
      ),
      None => None,
    };

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?;
    info!("读取图像 {}: {}x{}", path, image.width(), image.height());

    Ok(ImageFileInput {
      image: Some(image.into()),
      focal,
    })
  }
}

impl ImageFileInput {
  pub fn from_image(image: RgbImage) -> Self {
    Self {
      image: Some(image),
      focal: None,
    }
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let image = self.image.take()?;
    let (w, h) = image.dimensions();
    let focal = self.focal.unwrap_or(w.max(h) as f32);
    let camera = Camera::centered(w, h, focal, Isometry3::identity());
    Some(Frame::new(0, 0.0, image, camera))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_exactly_one_frame() {
    let mut input = ImageFileInput::from_image(RgbImage::new(40, 30));
    let frame = input.next().unwrap();
    assert_eq!((frame.width(), frame.height()), (40, 30));
    assert_eq!(frame.camera().intrinsics.fx, 40.0);
    assert!(input.next().is_none());
  }

  #[test]
  fn rejects_other_schemes_and_bad_focal() {
    let url = Url::parse("file:///tmp/a.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
    let url = Url::parse("image:///tmp/a.png?focal=-3").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::InvalidFocal(_))
    ));
  }
}
