// 该文件是 Reli （热力） 项目的一部分。
// src/bin/simple_detect.rs - 单张图像上的矩形检测与选取
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

use std::{collections::VecDeque, time::Instant};

use anyhow::Result;
use clap::Parser;
use nalgebra::Point2;
use tracing::{info, warn};
use url::Url;

use reli::{
  FromUrl,
  detect::{ContourQuadDetector, QuadDetector, RECALL_POLICY},
  geometry::viewport,
  input::InputWrapper,
  overlay::Overlay,
  output::{OutputWrapper, Render},
  selection::{DetectionCompletion, Effect, SelectionMachine},
};

/// Reli 矩形检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图像
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 触摸点横坐标（归一化）
  #[arg(long, default_value_t = 0.5)]
  pub touch_x: f32,
  /// 触摸点纵坐标（归一化）
  #[arg(long, default_value_t = 0.5)]
  pub touch_y: f32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let mut detector = ContourQuadDetector::new();

  for frame in input {
    // 视图坐标取像素坐标，叠加层可以直接画在原图上
    let transform = viewport(frame.width() as f32, frame.height() as f32);
    let frame = frame.with_display_transform(transform);
    let touch = transform.transform_point(&Point2::new(args.touch_x, args.touch_y));

    let mut machine = SelectionMachine::new();
    let mut overlay = Overlay::default();
    let mut effects: VecDeque<Effect> = machine.on_touch_down(touch, &frame).into();

    while let Some(effect) = effects.pop_front() {
      match effect {
        Effect::Dispatch(request) => {
          let now = Instant::now();
          let quads = detector.detect(&request.frame, &RECALL_POLICY);
          info!("检测到 {} 个四边形，耗时 {:.2?}", quads.len(), now.elapsed());
          let completion = DetectionCompletion {
            pass: request.pass,
            quads,
          };
          effects.extend(machine.on_detection_complete(completion, Instant::now()));
        }
        Effect::Overlay(update) => overlay.apply(update),
        Effect::Message(message) if message.is_error() => warn!("{}", message),
        Effect::Message(message) => info!("{}", message),
        Effect::Finalize(_) => {}
      }
    }

    if let Some(selection) = machine.selected() {
      let c = selection.candidate.corners();
      info!(
        "选中四边形 {:?}: 左上 ({:.3}, {:.3}), 右下 ({:.3}, {:.3})",
        selection.candidate.id, c[0].x, c[0].y, c[2].x, c[2].y
      );
    }

    output.render_result(&frame, &overlay)?;
  }

  Ok(())
}
