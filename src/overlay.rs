// 该文件是 Reli （热力） 项目的一部分。
// src/overlay.rs - 检测结果叠加层
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

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use nalgebra::Point2;

/// 视图坐标下的四边形轮廓：左上、右上、右下、左下
pub type Outline = [Point2<f32>; 4];

const CANDIDATE_COLOR: [u8; 3] = [255, 255, 0]; // 黄色
const SELECTED_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const CORNER_COLORS: [[u8; 3]; 4] = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 0]];
const CORNER_RADIUS: i32 = 5;
const LINE_THICKNESS: i32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayUpdate {
  /// 替换候选轮廓，同时清掉旧的选中轮廓
  Candidates(Vec<Outline>),
  /// 显示选中轮廓，候选轮廓随之移除
  Selected(Outline),
  Clear,
}

#[derive(Debug, Clone, Default)]
pub struct Overlay {
  candidates: Vec<Outline>,
  selected: Option<Outline>,
}

impl Overlay {
  pub fn apply(&mut self, update: OverlayUpdate) {
    match update {
      OverlayUpdate::Candidates(outlines) => {
        self.candidates = outlines;
        self.selected = None;
      }
      OverlayUpdate::Selected(outline) => {
        self.candidates.clear();
        self.selected = Some(outline);
      }
      OverlayUpdate::Clear => {
        self.candidates.clear();
        self.selected = None;
      }
    }
  }

  pub fn clear_selected(&mut self) {
    self.selected = None;
  }

  pub fn candidates(&self) -> &[Outline] {
    &self.candidates
  }

  pub fn selected(&self) -> Option<&Outline> {
    self.selected.as_ref()
  }

  pub fn is_empty(&self) -> bool {
    self.candidates.is_empty() && self.selected.is_none()
  }

  /// 把叠加层画到画布上，画布像素坐标即视图坐标
  pub fn draw(&self, canvas: &mut RgbImage) {
    for outline in &self.candidates {
      draw_outline(canvas, outline, CANDIDATE_COLOR);
    }
    if let Some(outline) = &self.selected {
      draw_outline(canvas, outline, SELECTED_COLOR);
    }
  }
}

fn draw_outline(canvas: &mut RgbImage, outline: &Outline, color: [u8; 3]) {
  for i in 0..4 {
    let a = outline[i];
    let b = outline[(i + 1) % 4];
    // 加粗
    for t in 0..LINE_THICKNESS {
      let d = t as f32;
      draw_line_segment_mut(canvas, (a.x + d, a.y + d), (b.x + d, b.y + d), Rgb(color));
    }
  }
  for (corner, color) in outline.iter().zip(CORNER_COLORS) {
    draw_filled_circle_mut(
      canvas,
      (corner.x.round() as i32, corner.y.round() as i32),
      CORNER_RADIUS,
      Rgb(color),
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn square(x: f32) -> Outline {
    [
      Point2::new(x, x),
      Point2::new(x + 20.0, x),
      Point2::new(x + 20.0, x + 20.0),
      Point2::new(x, x + 20.0),
    ]
  }

  #[test]
  fn selecting_discards_candidate_outlines() {
    let mut overlay = Overlay::default();
    overlay.apply(OverlayUpdate::Candidates(vec![square(2.0), square(30.0)]));
    assert_eq!(overlay.candidates().len(), 2);
    overlay.apply(OverlayUpdate::Selected(square(2.0)));
    assert!(overlay.candidates().is_empty());
    assert!(overlay.selected().is_some());
    overlay.apply(OverlayUpdate::Candidates(Vec::new()));
    assert!(overlay.is_empty());
  }

  #[test]
  fn selected_outline_is_drawn_red_with_corner_markers() {
    let mut overlay = Overlay::default();
    overlay.apply(OverlayUpdate::Selected(square(10.0)));
    let mut canvas = RgbImage::new(64, 64);
    overlay.draw(&mut canvas);
    assert_eq!(canvas.get_pixel(20, 10), &Rgb(SELECTED_COLOR));
    assert_eq!(canvas.get_pixel(30, 30), &Rgb(CORNER_COLORS[2]));
    assert_eq!(canvas.get_pixel(20, 20), &Rgb([0, 0, 0]));
  }
}
