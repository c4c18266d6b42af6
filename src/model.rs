// 该文件是 Reli （热力） 项目的一部分。
// src/model.rs - 模型
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

use std::path::Path;

#[cfg(feature = "model_tflite")]
mod tflite;
#[cfg(feature = "model_tflite")]
pub use self::tflite::{TfliteRuntime, TfliteRuntimeError};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 按槽位绑定输入输出的数值推理运行时
///
/// 输入与输出都是原始字节，由调用方负责按模型约定的元素类型解释。
pub trait TensorRuntime: Send + Sized {
  type Error: std::error::Error + Send + Sync + 'static;

  fn load(path: &Path) -> Result<Self, Self::Error>;
  fn allocate(&mut self) -> Result<(), Self::Error>;
  fn bind_input(&mut self, slot: usize, bytes: &[u8]) -> Result<(), Self::Error>;
  fn invoke(&mut self) -> Result<(), Self::Error>;
  fn read_output(&self, slot: usize) -> Result<Vec<u8>, Self::Error>;
}

/// f32 切片按小端字节序展开
pub fn f32_to_bytes(values: &[f32]) -> Vec<u8> {
  values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// 小端字节解释为 f32，多余的尾部字节返回 None
pub fn bytes_to_f32(bytes: &[u8]) -> Option<Vec<f32>> {
  if bytes.len() % 4 != 0 {
    return None;
  }
  Some(
    bytes
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}
