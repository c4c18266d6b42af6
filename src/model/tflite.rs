// 该文件是 Reli （热力） 项目的一部分。
// src/model/tflite.rs - 基于 tract 的 TFLite 运行时
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

use thiserror::Error;
use tracing::{debug, info};
use tract_tflite::prelude::*;

use crate::model::{TensorRuntime, bytes_to_f32, f32_to_bytes};

type Plan = Box<dyn Fn(TVec<TValue>) -> TractResult<TVec<TValue>> + Send>;

#[derive(Error, Debug)]
pub enum TfliteRuntimeError {
  #[error(transparent)]
  Tract(#[from] TractError),
  #[error("模型尚未分配")]
  NotAllocated,
  #[error("输入槽位 {slot} 越界，模型共 {inputs} 个输入")]
  InputSlot { slot: usize, inputs: usize },
  #[error("输入槽位 {0} 尚未绑定")]
  Unbound(usize),
  #[error("输入字节数 {0} 不是 4 的整数倍")]
  InputBytes(usize),
  #[error("输入槽位 {slot} 需要 {expected} 个元素，实际为 {actual}")]
  InputLength {
    slot: usize,
    expected: usize,
    actual: usize,
  },
  #[error("输出槽位 {slot} 越界，模型共 {outputs} 个输出")]
  OutputSlot { slot: usize, outputs: usize },
  #[error("尚未执行推理")]
  NoOutput,
}

/// 单精度 TFLite 模型
///
/// 输入按模型声明的形状绑定。形状含符号维度时按 `[1, n]` 处理。
pub struct TfliteRuntime {
  model: Option<TypedModel>,
  plan: Option<Plan>,
  shapes: Vec<Option<Vec<usize>>>,
  inputs: Vec<Option<Tensor>>,
  outputs: Option<Vec<Tensor>>,
}

impl TfliteRuntime {
  pub fn from_model(model: TypedModel) -> Result<Self, TfliteRuntimeError> {
    let count = model.input_outlets()?.len();
    let shapes = (0..count)
      .map(|i| {
        model
          .input_fact(i)
          .map(|fact| fact.shape.as_concrete().map(|s| s.to_vec()))
      })
      .collect::<TractResult<Vec<_>>>()?;
    debug!("模型输入形状: {:?}", shapes);
    Ok(Self {
      model: Some(model),
      plan: None,
      shapes,
      inputs: vec![None; count],
      outputs: None,
    })
  }

  pub fn inputs(&self) -> usize {
    self.shapes.len()
  }
}

impl TensorRuntime for TfliteRuntime {
  type Error = TfliteRuntimeError;

  fn load(path: &Path) -> Result<Self, Self::Error> {
    info!("读取 TFLite 模型: {}", path.display());
    let model = tract_tflite::tflite().model_for_path(path)?;
    Self::from_model(model)
  }

  fn allocate(&mut self) -> Result<(), Self::Error> {
    let Some(model) = self.model.take() else {
      return Ok(());
    };
    let plan = model.into_optimized()?.into_runnable()?;
    self.plan = Some(Box::new(move |inputs| plan.run(inputs)));
    debug!("模型已优化，共 {} 个输入", self.shapes.len());
    Ok(())
  }

  fn bind_input(&mut self, slot: usize, bytes: &[u8]) -> Result<(), Self::Error> {
    let inputs = self.shapes.len();
    let shape = self
      .shapes
      .get(slot)
      .ok_or(TfliteRuntimeError::InputSlot { slot, inputs })?;
    let values = bytes_to_f32(bytes).ok_or(TfliteRuntimeError::InputBytes(bytes.len()))?;
    let shape = match shape {
      Some(shape) => {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
          return Err(TfliteRuntimeError::InputLength {
            slot,
            expected,
            actual: values.len(),
          });
        }
        shape.clone()
      }
      None => vec![1, values.len()],
    };
    self.inputs[slot] = Some(Tensor::from_shape(&shape, &values)?);
    Ok(())
  }

  fn invoke(&mut self) -> Result<(), Self::Error> {
    let plan = self.plan.as_ref().ok_or(TfliteRuntimeError::NotAllocated)?;
    let inputs = self
      .inputs
      .iter()
      .enumerate()
      .map(|(slot, t)| {
        t.clone()
          .map(TValue::from)
          .ok_or(TfliteRuntimeError::Unbound(slot))
      })
      .collect::<Result<TVec<TValue>, _>>()?;
    let outputs = plan(inputs)?;
    self.outputs = Some(outputs.into_iter().map(|v| v.into_tensor()).collect());
    Ok(())
  }

  fn read_output(&self, slot: usize) -> Result<Vec<u8>, Self::Error> {
    let outputs = self.outputs.as_ref().ok_or(TfliteRuntimeError::NoOutput)?;
    let tensor = outputs.get(slot).ok_or(TfliteRuntimeError::OutputSlot {
      slot,
      outputs: outputs.len(),
    })?;
    Ok(f32_to_bytes(tensor.as_slice::<f32>()?))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    dataset::{DatasetLayout, GEOMETRY_LEN, RawDataset, tests::synthetic_bytes},
    inference::{ControlInputs, StressNet},
    model::Model,
  };

  /// 输出 0 原样返回几何输入，输出 1 原样返回载荷
  fn passthrough(geometry_len: usize) -> TfliteRuntime {
    let mut model = TypedModel::default();
    let controls = model.add_source("controls", f32::fact([1usize, 2])).unwrap();
    let geometry = model
      .add_source("geometry", f32::fact([1usize, geometry_len]))
      .unwrap();
    model.set_output_outlets(&[geometry, controls]).unwrap();
    let mut runtime = TfliteRuntime::from_model(model).unwrap();
    runtime.allocate().unwrap();
    runtime
  }

  #[test]
  fn slots_follow_model_inputs() {
    let mut runtime = passthrough(4);
    assert_eq!(runtime.inputs(), 2);
    runtime.bind_input(0, &f32_to_bytes(&[65.0, 0.0])).unwrap();
    runtime
      .bind_input(1, &f32_to_bytes(&[1.0, 2.0, 3.0, 4.0]))
      .unwrap();
    runtime.invoke().unwrap();
    assert_eq!(runtime.read_output(0).unwrap(), f32_to_bytes(&[1.0, 2.0, 3.0, 4.0]));
    assert_eq!(runtime.read_output(1).unwrap(), f32_to_bytes(&[65.0, 0.0]));
    assert!(matches!(
      runtime.read_output(2),
      Err(TfliteRuntimeError::OutputSlot { slot: 2, outputs: 2 })
    ));
  }

  #[test]
  fn input_bytes_are_checked() {
    let mut runtime = passthrough(4);
    assert!(matches!(
      runtime.bind_input(1, &f32_to_bytes(&[1.0, 2.0])),
      Err(TfliteRuntimeError::InputLength {
        slot: 1,
        expected: 4,
        actual: 2
      })
    ));
    assert!(matches!(
      runtime.bind_input(0, &[0u8; 7]),
      Err(TfliteRuntimeError::InputBytes(7))
    ));
    assert!(matches!(
      runtime.bind_input(2, &f32_to_bytes(&[1.0])),
      Err(TfliteRuntimeError::InputSlot { slot: 2, inputs: 2 })
    ));
  }

  #[test]
  fn every_slot_must_be_bound_before_invoke() {
    let mut runtime = passthrough(4);
    assert!(matches!(runtime.read_output(0), Err(TfliteRuntimeError::NoOutput)));
    runtime.bind_input(0, &f32_to_bytes(&[1.0, 2.0])).unwrap();
    assert!(matches!(runtime.invoke(), Err(TfliteRuntimeError::Unbound(1))));
  }

  #[test]
  fn invoke_requires_allocate() {
    let mut model = TypedModel::default();
    let x = model.add_source("x", f32::fact([1usize, 2])).unwrap();
    model.set_output_outlets(&[x]).unwrap();
    let mut runtime = TfliteRuntime::from_model(model).unwrap();
    runtime.bind_input(0, &f32_to_bytes(&[1.0, 2.0])).unwrap();
    assert!(matches!(runtime.invoke(), Err(TfliteRuntimeError::NotAllocated)));
  }

  #[test]
  fn missing_model_file_fails_to_load() {
    assert!(TfliteRuntime::load(Path::new("/nonexistent/reli/model.tflite")).is_err());
  }

  #[test]
  fn stress_net_runs_on_tract() {
    let dataset = RawDataset::from_bytes(&synthetic_bytes(14), DatasetLayout::default()).unwrap();
    let net = StressNet::with_dataset(passthrough(GEOMETRY_LEN), &dataset);
    let field = net.infer(&ControlInputs::default()).unwrap();
    // 几何输入是第 13 行的前 768 个值
    assert_eq!(field.get(0), Some(130000.0));
    assert_eq!(field.get(767), Some(130767.0));
  }
}
