// 该文件是 Reli （热力） 项目的一部分。
// src/bin/simple_stress.rs - 用 TFLite 模型推理应力场并画成热力图
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

use anyhow::Result;
use clap::Parser;
use image::RgbImage;
use tracing::info;
use url::Url;

use reli::{
  FromUrl,
  heatmap::{DEFAULT_RANGE, Heatmap, HeatmapStyle, Legend},
  inference::{ControlInputs, DEFAULT_CONTROL_X, DEFAULT_CONTROL_Y, StressNetBuilder},
  model::{Model, TfliteRuntime},
  output::{OutputWrapper, Render},
};

/// Reli 应力推理参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，例如 stressnet:///model.tflite?dataset=/data.npy
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 载荷 x
  #[arg(long, default_value_t = DEFAULT_CONTROL_X, allow_negative_numbers = true)]
  pub x: f32,
  /// 载荷 y
  #[arg(long, default_value_t = DEFAULT_CONTROL_Y, allow_negative_numbers = true)]
  pub y: f32,
  /// 输出图像宽度
  #[arg(long, default_value_t = 640)]
  pub width: u32,
  /// 输出图像高度
  #[arg(long, default_value_t = 480)]
  pub height: u32,
  /// 图例刻度
  #[arg(long, value_delimiter = ',', default_value = "200,150,100,50,0")]
  pub ticks: Vec<f32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型路径: {}", args.model);
  info!("输出路径: {}", args.output);

  let model = StressNetBuilder::from_url(&args.model)?.build::<TfliteRuntime>()?;
  let controls = ControlInputs::new(args.x, args.y);
  let field = model.infer(&controls)?;
  info!(
    "载荷 ({}, {}) 下的应力范围: {:.2} ~ {:.2}",
    controls.x(),
    controls.y(),
    field.values().iter().copied().fold(f32::INFINITY, f32::min),
    field.values().iter().copied().fold(f32::NEG_INFINITY, f32::max)
  );

  let heatmap = Heatmap::paint(field, &HeatmapStyle::default());
  let legend = Legend::render(&args.ticks, DEFAULT_RANGE, args.width / 16, args.height);
  let output = OutputWrapper::from_url(&args.output)?;
  output.render_result(&RgbImage::new(args.width, args.height), &(heatmap, legend))?;

  Ok(())
}
