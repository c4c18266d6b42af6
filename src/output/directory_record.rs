// 该文件是 Reli （热力） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{Annotation, Render, ToRgbImage},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("帧计数器锁已损坏")]
  Poisoned,
}

/// `folder:///dir[?record][&always]`
///
/// 按日期分目录保存每一帧。带 `record` 时保存原图并在同名 `.json` 中写出结果，
/// 否则保存画好结果的图。默认跳过空结果，带 `always` 时每帧都保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record: bool,
  always: bool,
  frame_counter: Mutex<u16>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri.query_pairs().any(|(k, _)| k == "record");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record,
      always,
      frame_counter: Mutex::new(0),
    })
  }
}

impl DirectoryRecordOutput {
  pub fn new<P: Into<PathBuf>>(directory: P, record: bool, always: bool) -> Self {
    Self {
      directory: directory.into(),
      record,
      always,
      frame_counter: Mutex::new(0),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counter
      .lock()
      .map_err(|_| DirectoryRecordOutputError::Poisoned)?;
    *counter = counter.wrapping_add(1);
    Ok(*counter)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()?
    )))
  }
}

impl<F: ToRgbImage, A: Annotation> Render<F, A> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &F, result: &A) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("结果为空，跳过保存");
      return Ok(());
    }

    let path = self.frame_path()?;
    let mut image = frame.to_rgb_image();
    if self.record {
      image.save(&path)?;
      let record = serde_json::to_string_pretty(&result.to_record())?;
      std::fs::write(path.with_extension("json"), record)?;
    } else {
      result.draw_on(&mut image);
      image.save(&path)?;
    }
    info!("记录帧到: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::overlay::Overlay;
  use image::RgbImage;

  fn files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
      for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
          out.extend(files(&path));
        } else {
          out.push(path);
        }
      }
    }
    out
  }

  #[test]
  fn empty_results_are_skipped_unless_always() {
    let dir = std::env::temp_dir().join(format!("reli-folder-{}", std::process::id()));
    let skip = DirectoryRecordOutput::new(dir.join("skip"), false, false);
    skip.render_result(&RgbImage::new(8, 8), &Overlay::default()).unwrap();
    assert!(files(skip.directory()).is_empty());

    let url = url::Url::parse(&format!("folder://{}?record&always", dir.join("rec").display())).unwrap();
    let rec = DirectoryRecordOutput::from_url(&url).unwrap();
    rec.render_result(&RgbImage::new(8, 8), &Overlay::default()).unwrap();
    let mut written = files(rec.directory());
    written.sort();
    assert_eq!(written.len(), 2);
    assert!(written.iter().any(|p| p.extension().is_some_and(|e| e == "json")));
    let _ = std::fs::remove_dir_all(dir);
  }
}
