// 该文件是 Reli （热力） 项目的一部分。
// src/dataset.rs - 预置数据集的加载与重排
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
  ops::Range,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 数据文件头占用的元素个数（按 f64 计）
pub const HEADER_LEN: usize = 16;
/// 去掉文件头后每行的元素个数
pub const ROW_LEN: usize = 1538;
/// 本次会话使用的样本行
pub const SAMPLE_ROW: usize = 13;
/// 几何特征切片长度
pub const GEOMETRY_LEN: usize = 768;
/// 真值场在行内的位置
pub const GROUND_TRUTH_RANGE: Range<usize> = 770..1538;

const F64_WIDTH: usize = std::mem::size_of::<f64>();

#[derive(Error, Debug)]
pub enum DatasetError {
  #[error("读取数据文件失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("数据长度 {0} 字节不是 8 的整数倍")]
  ByteLength(usize),
  #[error("数据只有 {len} 个元素，不足文件头 {header} 个")]
  MissingHeader { len: usize, header: usize },
  #[error("去掉文件头后剩余 {remainder} 个元素，不是行长 {row_len} 的整数倍")]
  RaggedRows { remainder: usize, row_len: usize },
  #[error("样本行 {row} 超出范围，共 {rows} 行")]
  RowOutOfRange { row: usize, rows: usize },
  #[error("样本几何长度应为 {expected}，实际为 {actual}")]
  GeometryLength { expected: usize, actual: usize },
  #[error("数据集地址无效: {0}")]
  InvalidUrl(String),
}

/// 数据文件与推理阶段之间约定的布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
  pub header_len: usize,
  pub row_len: usize,
  pub sample_row: usize,
  pub geometry_len: usize,
  pub ground_truth: Range<usize>,
}

impl Default for DatasetLayout {
  fn default() -> Self {
    Self {
      header_len: HEADER_LEN,
      row_len: ROW_LEN,
      sample_row: SAMPLE_ROW,
      geometry_len: GEOMETRY_LEN,
      ground_truth: GROUND_TRUTH_RANGE,
    }
  }
}

/// 降为 f32 并按行重排后的数据集
#[derive(Debug, Clone)]
pub struct RawDataset {
  layout: DatasetLayout,
  values: Box<[f32]>,
  rows: usize,
}

impl RawDataset {
  /// 解析小端 f64 数据，任何长度问题都直接报错，不做截断
  pub fn from_bytes(bytes: &[u8], layout: DatasetLayout) -> Result<Self, DatasetError> {
    if bytes.len() % F64_WIDTH != 0 {
      return Err(DatasetError::ByteLength(bytes.len()));
    }
    let len = bytes.len() / F64_WIDTH;
    if len < layout.header_len {
      return Err(DatasetError::MissingHeader {
        len,
        header: layout.header_len,
      });
    }
    let remainder = len - layout.header_len;
    if layout.row_len == 0 || remainder % layout.row_len != 0 {
      return Err(DatasetError::RaggedRows {
        remainder,
        row_len: layout.row_len,
      });
    }

    let values: Box<[f32]> = bytes
      .chunks_exact(F64_WIDTH)
      .skip(layout.header_len)
      .map(|chunk| {
        let mut raw = [0u8; F64_WIDTH];
        raw.copy_from_slice(chunk);
        f64::from_le_bytes(raw) as f32
      })
      .collect();
    let rows = remainder / layout.row_len;
    debug!("数据集共 {} 行，每行 {} 个元素", rows, layout.row_len);

    Ok(Self {
      layout,
      values,
      rows,
    })
  }

  pub fn load<P: AsRef<Path>>(path: P, layout: DatasetLayout) -> Result<Self, DatasetError> {
    let path = path.as_ref();
    info!("加载数据集: {}", path.display());
    let bytes = std::fs::read(path)?;
    debug!(
      "数据集大小: {:.2} KB",
      bytes.len() as f64 / 1024.0
    );
    Self::from_bytes(&bytes, layout)
  }

  pub fn layout(&self) -> &DatasetLayout {
    &self.layout
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn row(&self, index: usize) -> Option<&[f32]> {
    if index >= self.rows {
      return None;
    }
    let start = index * self.layout.row_len;
    Some(&self.values[start..start + self.layout.row_len])
  }

  /// 布局指定的样本行
  pub fn sample(&self) -> Result<Sample<'_>, DatasetError> {
    let row = self
      .row(self.layout.sample_row)
      .ok_or(DatasetError::RowOutOfRange {
        row: self.layout.sample_row,
        rows: self.rows,
      })?;
    Ok(Sample {
      row,
      layout: &self.layout,
    })
  }
}

/// 数据集中的一行样本
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
  row: &'a [f32],
  layout: &'a DatasetLayout,
}

impl<'a> Sample<'a> {
  /// 模型的几何输入
  pub fn geometry(&self) -> &'a [f32] {
    &self.row[..self.layout.geometry_len.min(self.row.len())]
  }

  /// 推理时不使用，仅供对照
  pub fn ground_truth(&self) -> &'a [f32] {
    let end = self.layout.ground_truth.end.min(self.row.len());
    let start = self.layout.ground_truth.start.min(end);
    &self.row[start..end]
  }
}

/// `npy:///path/to/data.npy`
#[derive(Debug, Clone)]
pub struct DatasetSource {
  path: PathBuf,
}

impl DatasetSource {
  pub fn new<P: Into<PathBuf>>(path: P) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn load(&self) -> Result<RawDataset, DatasetError> {
    RawDataset::load(&self.path, DatasetLayout::default())
  }
}

impl FromUrl for DatasetSource {
  type Error = DatasetError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DatasetError::InvalidUrl(format!(
        "数据集地址必须使用 {} 方案",
        Self::SCHEME
      )));
    }
    if url.path().is_empty() || url.path() == "/" {
      return Err(DatasetError::InvalidUrl("数据集路径为空".to_string()));
    }
    Ok(Self::new(url.path()))
  }
}

impl FromUrlWithScheme for DatasetSource {
  const SCHEME: &'static str = "npy";
}
