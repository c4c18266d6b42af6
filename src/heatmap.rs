// 该文件是 Reli （热力） 项目的一部分。
// src/heatmap.rs - 热力图与图例
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

use image::{
  Rgb, RgbImage,
  imageops::{self, FilterType},
};
use imageproc::drawing::draw_line_segment_mut;
use tracing::debug;

use crate::inference::{GRID_COLS, GRID_ROWS, ScalarField};

/// 色带覆盖的色相范围（0 为红，5/6 为紫）
pub const HUE_SPAN: f32 = 5.0 / 6.0;
pub const DEFAULT_RANGE: (f32, f32) = (0.0, 200.0);

const TICK_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// 数值对应的色相，取值 [0, 1) 表示一整圈
///
/// 范围外的值不做截断，得到的色相会落在色带之外。
pub fn hue_for(value: f32, min: f32, max: f32) -> f32 {
  let normalized = (value - min) / (max - min);
  (1.0 - normalized) * HUE_SPAN
}

pub fn color_for(value: f32, min: f32, max: f32) -> Rgb<u8> {
  hsv_to_rgb(hue_for(value, min, max) * 360.0, 1.0, 1.0)
}

/// HSV 转 RGB，色相单位为度，超出一圈的按圈回绕
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let h = h.rem_euclid(360.0);
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeatmapStyle {
  pub cols: usize,
  pub rows: usize,
  pub range: (f32, f32),
  /// 每个格子的像素边长
  pub cell_px: u32,
}

impl Default for HeatmapStyle {
  fn default() -> Self {
    Self {
      cols: GRID_COLS,
      rows: GRID_ROWS,
      range: DEFAULT_RANGE,
      cell_px: 1,
    }
  }
}

/// 着色后的标量场，纹理中每个格子一种颜色
#[derive(Debug, Clone)]
pub struct Heatmap {
  field: ScalarField,
  style: HeatmapStyle,
  texture: RgbImage,
}

impl Heatmap {
  pub fn paint(field: ScalarField, style: &HeatmapStyle) -> Self {
    let cell = style.cell_px.max(1);
    let width = style.cols as u32 * cell;
    let height = style.rows as u32 * cell;
    let (min, max) = style.range;

    let texture = RgbImage::from_fn(width, height, |px, py| {
      let col = (px / cell) as usize;
      let row = (py / cell) as usize;
      // 越界的格子按 0 着色
      let value = field.get(row * style.cols + col).unwrap_or(0.0);
      color_for(value, min, max)
    });
    debug!("热力图纹理 {}x{}，范围 {:?}", width, height, style.range);

    Self {
      field,
      style: *style,
      texture,
    }
  }

  pub fn field(&self) -> &ScalarField {
    &self.field
  }

  pub fn style(&self) -> &HeatmapStyle {
    &self.style
  }

  pub fn texture(&self) -> &RgbImage {
    &self.texture
  }

  /// 最近邻放大到指定尺寸
  pub fn upscale(&self, width: u32, height: u32) -> RgbImage {
    imageops::resize(&self.texture, width, height, FilterType::Nearest)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegendTick {
  pub value: f32,
  /// 刻度所在的像素行
  pub y: u32,
}

/// 竖直色带图例，上端为最大值
#[derive(Debug, Clone)]
pub struct Legend {
  image: RgbImage,
  ticks: Vec<LegendTick>,
}

impl Legend {
  /// 刻度按调用方给出的顺序保留，落在色带外的刻度会被忽略
  pub fn render(ticks: &[f32], range: (f32, f32), width: u32, height: u32) -> Self {
    let (min, max) = range;
    let span = height.saturating_sub(1).max(1) as f32;
    let mut image = RgbImage::from_fn(width, height, |_, y| {
      let value = max - (max - min) * y as f32 / span;
      color_for(value, min, max)
    });

    let ticks: Vec<LegendTick> = ticks
      .iter()
      .filter_map(|&value| {
        let y = ((max - value) / (max - min) * span).round();
        (y >= 0.0 && y < height as f32).then_some(LegendTick {
          value,
          y: y as u32,
        })
      })
      .collect();

    let tick_len = (width / 4).max(1) as f32;
    for tick in &ticks {
      let y = tick.y as f32;
      draw_line_segment_mut(&mut image, (0.0, y), (tick_len, y), TICK_COLOR);
    }

    Self { image, ticks }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn ticks(&self) -> &[LegendTick] {
    &self.ticks
  }
}
