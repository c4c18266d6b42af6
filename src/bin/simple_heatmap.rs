// 该文件是 Reli （热力） 项目的一部分。
// src/bin/simple_heatmap.rs - 把数据集中的真值场画成热力图
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
  dataset::DatasetSource,
  heatmap::{DEFAULT_RANGE, Heatmap, HeatmapStyle, Legend},
  inference::ScalarField,
  output::{OutputWrapper, Render},
};

/// Reli 热力图参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 数据集路径
  #[arg(long, value_name = "DATASET")]
  pub dataset: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
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

  info!("数据集: {}", args.dataset);
  info!("输出路径: {}", args.output);

  let dataset = DatasetSource::from_url(&args.dataset)?.load()?;
  let sample = dataset.sample()?;
  let field = ScalarField::try_from(sample.ground_truth())?;
  info!(
    "真值场范围: {:.2} ~ {:.2}",
    field.values().iter().copied().fold(f32::INFINITY, f32::min),
    field.values().iter().copied().fold(f32::NEG_INFINITY, f32::max)
  );

  let heatmap = Heatmap::paint(field, &HeatmapStyle::default());
  let legend = Legend::render(&args.ticks, DEFAULT_RANGE, args.width / 16, args.height);
  let output = OutputWrapper::from_url(&args.output)?;
  output.render_result(&RgbImage::new(args.width, args.height), &(heatmap, legend))?;

  Ok(())
}
