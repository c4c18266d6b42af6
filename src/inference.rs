// 该文件是 Reli （热力） 项目的一部分。
// src/inference.rs - 应力场推理
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
  ops::RangeInclusive,
  path::PathBuf,
  sync::{Arc, Mutex, OnceLock},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  dataset::{DatasetError, DatasetSource, GEOMETRY_LEN, RawDataset},
  model::{Model, TensorRuntime, bytes_to_f32, f32_to_bytes},
};

pub const GRID_COLS: usize = 32;
pub const GRID_ROWS: usize = 24;
pub const FIELD_LEN: usize = GRID_COLS * GRID_ROWS;

pub const CONTROL_RANGE: RangeInclusive<f32> = -200.0..=200.0;
pub const DEFAULT_CONTROL_X: f32 = 65.0;
pub const DEFAULT_CONTROL_Y: f32 = 0.0;

const CONTROL_SLOT: usize = 0;
const GEOMETRY_SLOT: usize = 1;
const FIELD_SLOT: usize = 0;

#[derive(Error, Debug)]
pub enum StressNetError {
  #[error("模型加载失败: {0}")]
  ModelLoad(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("模型运行时错误: {0}")]
  Runtime(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("数据集不可用: {0}")]
  Dataset(#[from] Arc<DatasetError>),
  #[error("模型输出字节数 {0} 不是 4 的整数倍")]
  OutputBytes(usize),
  #[error("模型输出元素个数应为 {expected}，实际为 {actual}")]
  OutputShape { expected: usize, actual: usize },
  #[error("模型运行时锁已损坏")]
  Poisoned,
  #[error("模型地址无效: {0}")]
  InvalidUrl(String),
}

impl StressNetError {
  fn runtime<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    StressNetError::Runtime(Box::new(e))
  }
}

/// 两个载荷滑块的取值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlInputs {
  x: f32,
  y: f32,
}

impl Default for ControlInputs {
  fn default() -> Self {
    Self {
      x: DEFAULT_CONTROL_X,
      y: DEFAULT_CONTROL_Y,
    }
  }
}

impl ControlInputs {
  /// 超出 [-200, 200] 的值会被截断
  pub fn new(x: f32, y: f32) -> Self {
    Self {
      x: clamp_control("x", x),
      y: clamp_control("y", y),
    }
  }

  pub fn x(&self) -> f32 {
    self.x
  }

  pub fn y(&self) -> f32 {
    self.y
  }

  fn to_bytes(self) -> Vec<u8> {
    f32_to_bytes(&[self.x, self.y])
  }
}

fn clamp_control(name: &str, value: f32) -> f32 {
  let (lo, hi) = (*CONTROL_RANGE.start(), *CONTROL_RANGE.end());
  if value.is_nan() {
    warn!("载荷 {} 为 NaN，按 0 处理", name);
    return 0.0;
  }
  if !CONTROL_RANGE.contains(&value) {
    warn!("载荷 {} = {} 超出范围 [{}, {}]", name, value, lo, hi);
  }
  value.clamp(lo, hi)
}

/// 模型输出的标量场，按 32 x 24 行优先排列
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
  values: Box<[f32]>,
}

impl ScalarField {
  /// 推理失败时使用的全零场
  pub fn placeholder() -> Self {
    Self {
      values: vec![0.0; FIELD_LEN].into_boxed_slice(),
    }
  }

  pub fn values(&self) -> &[f32] {
    &self.values
  }

  pub fn get(&self, index: usize) -> Option<f32> {
    self.values.get(index).copied()
  }

  pub fn cell(&self, col: usize, row: usize) -> Option<f32> {
    if col >= GRID_COLS || row >= GRID_ROWS {
      return None;
    }
    self.get(row * GRID_COLS + col)
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn is_finite(&self) -> bool {
    self.values.iter().all(|v| v.is_finite())
  }
}

impl TryFrom<Vec<f32>> for ScalarField {
  type Error = StressNetError;

  fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
    if values.len() != FIELD_LEN {
      return Err(StressNetError::OutputShape {
        expected: FIELD_LEN,
        actual: values.len(),
      });
    }
    Ok(Self {
      values: values.into_boxed_slice(),
    })
  }
}

impl TryFrom<&[f32]> for ScalarField {
  type Error = StressNetError;

  fn try_from(values: &[f32]) -> Result<Self, Self::Error> {
    Self::try_from(values.to_vec())
  }
}

/// 应力场模型：固定的样本几何加上两个实时载荷
pub struct StressNet<R> {
  runtime: Mutex<R>,
  source: Option<DatasetSource>,
  geometry: OnceLock<Result<Box<[f32]>, Arc<DatasetError>>>,
}

impl<R: TensorRuntime> StressNet<R> {
  /// 数据集在第一次推理时加载，之后一直复用
  pub fn new(runtime: R, source: DatasetSource) -> Self {
    Self {
      runtime: Mutex::new(runtime),
      source: Some(source),
      geometry: OnceLock::new(),
    }
  }

  /// 使用已加载的数据集
  pub fn with_dataset(runtime: R, dataset: &RawDataset) -> Self {
    let geometry = OnceLock::new();
    let _ = geometry.set(sample_geometry(dataset));
    Self {
      runtime: Mutex::new(runtime),
      source: None,
      geometry,
    }
  }

  fn geometry(&self) -> Result<&[f32], StressNetError> {
    // 失败也会被缓存，之后的推理直接降级
    let cached = self.geometry.get_or_init(|| {
      let source = self.source.as_ref().ok_or_else(|| {
        DatasetError::Io(std::io::Error::new(
          std::io::ErrorKind::NotFound,
          "未配置数据集",
        ))
      })?;
      sample_geometry(&source.load()?)
    });
    match cached {
      Ok(geometry) => Ok(&geometry[..]),
      Err(e) => Err(StressNetError::Dataset(e.clone())),
    }
  }

  /// 推理失败时记录错误并返回全零场，交互流程不会因此中断
  pub fn compute_field(&self, controls: &ControlInputs) -> ScalarField {
    match self.infer(controls) {
      Ok(field) => field,
      Err(e) => {
        error!("应力场推理失败，使用占位场: {}", e);
        ScalarField::placeholder()
      }
    }
  }
}

fn sample_geometry(dataset: &RawDataset) -> Result<Box<[f32]>, Arc<DatasetError>> {
  let sample = dataset.sample()?;
  let geometry = sample.geometry();
  if geometry.len() != GEOMETRY_LEN {
    return Err(Arc::new(DatasetError::GeometryLength {
      expected: GEOMETRY_LEN,
      actual: geometry.len(),
    }));
  }
  Ok(geometry.into())
}

impl<R: TensorRuntime> Model for StressNet<R> {
  type Input = ControlInputs;
  type Output = ScalarField;
  type Error = StressNetError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let geometry = self.geometry()?;
    let mut runtime = self.runtime.lock().map_err(|_| StressNetError::Poisoned)?;

    // 槽位顺序是与模型之间的约定
    runtime
      .bind_input(CONTROL_SLOT, &input.to_bytes())
      .map_err(StressNetError::runtime)?;
    runtime
      .bind_input(GEOMETRY_SLOT, &f32_to_bytes(geometry))
      .map_err(StressNetError::runtime)?;
    runtime.invoke().map_err(StressNetError::runtime)?;
    let bytes = runtime
      .read_output(FIELD_SLOT)
      .map_err(StressNetError::runtime)?;
    drop(runtime);

    let values = bytes_to_f32(&bytes).ok_or(StressNetError::OutputBytes(bytes.len()))?;
    let field = ScalarField::try_from(values)?;
    debug!(
      "推理完成: 载荷 ({}, {}), 输出 {} 个值",
      input.x,
      input.y,
      field.len()
    );
    Ok(field)
  }
}

/// `stressnet:///path/to/model?dataset=/path/to/data.npy`
#[derive(Debug, Clone)]
pub struct StressNetBuilder {
  model_path: PathBuf,
  dataset: DatasetSource,
}

impl FromUrl for StressNetBuilder {
  type Error = StressNetError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StressNetError::InvalidUrl(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }
    if url.path().is_empty() || url.path() == "/" {
      return Err(StressNetError::InvalidUrl("模型路径为空".to_string()));
    }
    let dataset = url
      .query_pairs()
      .find(|(k, _)| k == "dataset")
      .map(|(_, v)| v.into_owned())
      .ok_or_else(|| StressNetError::InvalidUrl("缺少 dataset 参数".to_string()))?;

    Ok(Self {
      model_path: PathBuf::from(url.path()),
      dataset: DatasetSource::new(dataset),
    })
  }
}

impl FromUrlWithScheme for StressNetBuilder {
  const SCHEME: &'static str = "stressnet";
}

impl StressNetBuilder {
  pub fn new<P: Into<PathBuf>>(model_path: P, dataset: DatasetSource) -> Self {
    Self {
      model_path: model_path.into(),
      dataset,
    }
  }

  /// 模型加载失败时直接返回错误
  pub fn build<R: TensorRuntime>(self) -> Result<StressNet<R>, StressNetError> {
    info!("加载模型文件: {}", self.model_path.display());
    let mut runtime =
      R::load(&self.model_path).map_err(|e| StressNetError::ModelLoad(Box::new(e)))?;
    runtime
      .allocate()
      .map_err(|e| StressNetError::ModelLoad(Box::new(e)))?;
    info!("模型加载完成，数据集: {}", self.dataset.path().display());
    Ok(StressNet::new(runtime, self.dataset))
  }
}

#[cfg(test)]
mod tests {
  use std::{
    path::Path,
    sync::{Arc, Mutex as StdMutex},
  };

  use super::*;
  use crate::dataset::{DatasetLayout, tests::synthetic_bytes};

  #[derive(Error, Debug)]
  #[error("假运行时错误: {0}")]
  struct FakeError(&'static str);

  /// 输出第 i 个值为 geometry[i] + x * 1000 + y
  #[derive(Default)]
  struct FakeRuntime {
    bound: Arc<StdMutex<Vec<(usize, usize)>>>,
    inputs: [Vec<f32>; 2],
    output: Vec<u8>,
    output_len: Option<usize>,
    fail_invoke: bool,
  }

  impl TensorRuntime for FakeRuntime {
    type Error = FakeError;

    fn load(path: &Path) -> Result<Self, Self::Error> {
      if path.exists() {
        Ok(Self::default())
      } else {
        Err(FakeError("模型文件不存在"))
      }
    }

    fn allocate(&mut self) -> Result<(), Self::Error> {
      Ok(())
    }

    fn bind_input(&mut self, slot: usize, bytes: &[u8]) -> Result<(), Self::Error> {
      self.bound.lock().unwrap().push((slot, bytes.len()));
      let slot = self.inputs.get_mut(slot).ok_or(FakeError("槽位越界"))?;
      *slot = bytes_to_f32(bytes).ok_or(FakeError("字节数错误"))?;
      Ok(())
    }

    fn invoke(&mut self) -> Result<(), Self::Error> {
      if self.fail_invoke {
        return Err(FakeError("推理失败"));
      }
      let [controls, geometry] = &self.inputs;
      let (x, y) = (controls[0], controls[1]);
      let len = self.output_len.unwrap_or(geometry.len());
      let out: Vec<f32> = (0..len)
        .map(|i| geometry.get(i).copied().unwrap_or(0.0) + x * 1000.0 + y)
        .collect();
      self.output = f32_to_bytes(&out);
      Ok(())
    }

    fn read_output(&self, slot: usize) -> Result<Vec<u8>, Self::Error> {
      if slot != 0 {
        return Err(FakeError("输出槽位越界"));
      }
      Ok(self.output.clone())
    }
  }

  fn dataset() -> RawDataset {
    RawDataset::from_bytes(&synthetic_bytes(14), DatasetLayout::default()).unwrap()
  }

  #[test]
  fn controls_go_to_slot_zero_and_geometry_to_slot_one() {
    let runtime = FakeRuntime::default();
    let bound = runtime.bound.clone();
    let net = StressNet::with_dataset(runtime, &dataset());
    let field = net.infer(&ControlInputs::new(2.0, 3.0)).unwrap();

    assert_eq!(*bound.lock().unwrap(), vec![(0, 8), (1, GEOMETRY_LEN * 4)]);
    assert_eq!(field.len(), FIELD_LEN);
    // 第 13 行第 0 列为 130000
    assert_eq!(field.get(0), Some(130000.0 + 2000.0 + 3.0));
    assert_eq!(field.cell(1, 1), Some(130000.0 + 33.0 + 2003.0));
  }

  #[test]
  fn same_controls_same_field() {
    let net = StressNet::with_dataset(FakeRuntime::default(), &dataset());
    let controls = ControlInputs::default();
    let a = net.compute_field(&controls);
    let b = net.compute_field(&controls);
    assert_eq!(a, b);
    assert_ne!(a, net.compute_field(&ControlInputs::new(0.0, 0.0)));
  }

  #[test]
  fn invoke_failure_degrades_to_placeholder() {
    let runtime = FakeRuntime {
      fail_invoke: true,
      ..Default::default()
    };
    let net = StressNet::with_dataset(runtime, &dataset());
    assert!(matches!(
      net.infer(&ControlInputs::default()),
      Err(StressNetError::Runtime(_))
    ));
    assert_eq!(net.compute_field(&ControlInputs::default()), ScalarField::placeholder());
  }

  #[test]
  fn output_shape_mismatch_is_reported() {
    let runtime = FakeRuntime {
      output_len: Some(700),
      ..Default::default()
    };
    let net = StressNet::with_dataset(runtime, &dataset());
    assert!(matches!(
      net.infer(&ControlInputs::default()),
      Err(StressNetError::OutputShape {
        expected: 768,
        actual: 700
      })
    ));
    assert!(net.compute_field(&ControlInputs::default()).is_finite());
  }

  #[test]
  fn missing_dataset_degrades() {
    let net = StressNet::new(
      FakeRuntime::default(),
      DatasetSource::new("/nonexistent/reli/data.npy"),
    );
    let err = net.infer(&ControlInputs::default()).unwrap_err();
    assert!(matches!(&err, StressNetError::Dataset(e) if matches!(**e, DatasetError::Io(_))));
    // 底层错误保留为错误来源
    let source = std::error::Error::source(&err).unwrap();
    assert!(source.downcast_ref::<Arc<DatasetError>>().is_some());
    assert_eq!(net.compute_field(&ControlInputs::default()), ScalarField::placeholder());
  }

  #[test]
  fn short_dataset_degrades() {
    let short = RawDataset::from_bytes(&synthetic_bytes(2), DatasetLayout::default()).unwrap();
    let net = StressNet::with_dataset(FakeRuntime::default(), &short);
    assert!(matches!(
      net.infer(&ControlInputs::default()),
      Err(StressNetError::Dataset(e)) if matches!(*e, DatasetError::RowOutOfRange { row: 13, rows: 2 })
    ));
  }

  #[test]
  fn controls_are_clamped() {
    let c = ControlInputs::new(500.0, -201.0);
    assert_eq!((c.x(), c.y()), (200.0, -200.0));
    assert_eq!(ControlInputs::default().x(), 65.0);
  }

  #[test]
  fn builder_from_url() {
    let url = Url::parse("stressnet:///models/stress.tflite?dataset=/data/stress.npy").unwrap();
    let builder = StressNetBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, PathBuf::from("/models/stress.tflite"));
    assert_eq!(builder.dataset.path(), Path::new("/data/stress.npy"));

    let no_dataset = Url::parse("stressnet:///models/stress.tflite").unwrap();
    assert!(StressNetBuilder::from_url(&no_dataset).is_err());
  }

  #[test]
  fn missing_model_is_fatal() {
    let builder = StressNetBuilder::new("/nonexistent/reli/model", DatasetSource::new("/x.npy"));
    assert!(matches!(
      builder.build::<FakeRuntime>(),
      Err(StressNetError::ModelLoad(_))
    ));
  }

  #[test]
  fn field_requires_exact_length() {
    assert!(ScalarField::try_from(vec![0.0; 767]).is_err());
    assert!(ScalarField::try_from(vec![1.0; FIELD_LEN]).is_ok());
  }
}
