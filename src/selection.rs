// 该文件是 Reli （热力） 项目的一部分。
// src/selection.rs - 触摸选取状态机
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

//! 触摸选取状态机
//!
//! 状态机本身不做任何 I/O，每个事件返回一组 [`Effect`]，由会话在交互线程上执行：
//! 派发检测、落地选中的矩形、更新提示和叠加层。
//!
//! 同一时刻最多只有一个检测在途。在途期间的触发直接丢弃，不排队。
//! 手指在检测途中抬起时，由检测完成的路径负责落地。

use std::time::{Duration, Instant};

use nalgebra::{Affine2, Point2};
use tracing::{debug, info, warn};

use crate::{
  detect::{CandidateQuad, DetectedQuad, QuadId},
  frame::Frame,
  message::Message,
  overlay::OverlayUpdate,
};

/// 按住不放时，距上次选中至少这么久才会自动重新检测
///
/// 还没有选中过任何四边形时，按住不放不会自动重新检测。
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Idle,
  Probing,
  Selected,
}

/// 派发到后台的一次检测
#[derive(Debug, Clone)]
pub struct DetectionRequest {
  pub pass: u64,
  pub frame: Frame,
}

/// 后台检测的结果，按检测器返回顺序排列
#[derive(Debug, Clone)]
pub struct DetectionCompletion {
  pub pass: u64,
  pub quads: Vec<DetectedQuad>,
}

/// 已确认的候选，连同选中时使用的显示变换
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
  pub candidate: CandidateQuad,
  pub transform: Affine2<f32>,
}

#[derive(Debug, Clone)]
pub enum Effect {
  Dispatch(DetectionRequest),
  Finalize(Selection),
  Message(Message),
  Overlay(OverlayUpdate),
}

#[derive(Debug, Clone)]
struct Outstanding {
  pass: u64,
  touch: Point2<f32>,
  transform: Affine2<f32>,
}

#[derive(Debug, Default)]
pub struct SelectionMachine {
  touch: Option<Point2<f32>>,
  selected: Option<Selection>,
  selected_at: Option<Instant>,
  finalized: bool,
  outstanding: Option<Outstanding>,
  passes: u64,
  next_quad_id: u64,
}

impl SelectionMachine {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn phase(&self) -> Phase {
    if self.outstanding.is_some() {
      Phase::Probing
    } else if self.selected.is_some() {
      Phase::Selected
    } else {
      Phase::Idle
    }
  }

  pub fn in_flight(&self) -> bool {
    self.outstanding.is_some()
  }

  pub fn touch(&self) -> Option<Point2<f32>> {
    self.touch
  }

  pub fn selected(&self) -> Option<&Selection> {
    self.selected.as_ref()
  }

  pub fn selected_at(&self) -> Option<Instant> {
    self.selected_at
  }

  /// 已派发的检测次数
  pub fn passes(&self) -> u64 {
    self.passes
  }

  pub fn on_touch_down(&mut self, point: Point2<f32>, frame: &Frame) -> Vec<Effect> {
    self.touch = Some(point);
    let mut effects = Vec::with_capacity(2);
    if let Some(request) = self.try_dispatch(point, frame) {
      effects.push(Effect::Dispatch(request));
    }
    effects.push(Effect::Message(Message::HelpTapReleaseRect));
    effects
  }

  pub fn on_touch_move(&mut self, point: Point2<f32>, frame: &Frame) -> Vec<Effect> {
    if self.in_flight() {
      return Vec::new();
    }
    self.touch = Some(point);
    self.try_dispatch(point, frame).map(Effect::Dispatch).into_iter().collect()
  }

  pub fn on_touch_up(&mut self) -> Vec<Effect> {
    self.touch = None;
    let mut effects = vec![Effect::Message(Message::HelpTapHoldRect)];
    // 检测在途时 selected 已被清空，落地交给完成路径
    if let Some(selection) = &self.selected
      && !self.finalized
    {
      self.finalized = true;
      info!("松手确认选中四边形 {:?}", selection.candidate.id);
      effects.push(Effect::Finalize(selection.clone()));
    }
    effects
  }

  pub fn on_frame_update(&mut self, frame: &Frame, now: Instant) -> Vec<Effect> {
    if self.in_flight() {
      return Vec::new();
    }
    let Some(touch) = self.touch else {
      return Vec::new();
    };
    let Some(at) = self.selected_at else {
      return Vec::new();
    };
    if now.saturating_duration_since(at) < DEBOUNCE_WINDOW {
      return Vec::new();
    }
    self.try_dispatch(touch, frame).map(Effect::Dispatch).into_iter().collect()
  }

  pub fn on_detection_complete(&mut self, completion: DetectionCompletion, now: Instant) -> Vec<Effect> {
    let outstanding = match self.outstanding.take() {
      Some(o) if o.pass == completion.pass => o,
      other => {
        warn!(
          "丢弃过期的检测结果: 第 {} 次, 当前在途 {:?}",
          completion.pass,
          other.as_ref().map(|o| o.pass)
        );
        self.outstanding = other;
        return Vec::new();
      }
    };

    let candidates: Vec<CandidateQuad> = completion
      .quads
      .into_iter()
      .map(|quad| {
        self.next_quad_id += 1;
        CandidateQuad {
          id: QuadId(self.next_quad_id),
          quad,
        }
      })
      .collect();
    debug!("第 {} 次检测完成: {} 个候选", completion.pass, candidates.len());

    let outlines = candidates
      .iter()
      .map(|c| c.view_corners(&outstanding.transform))
      .collect();
    let mut effects = vec![Effect::Overlay(OverlayUpdate::Candidates(outlines))];

    // 先到先得，不按置信度挑选
    let hit = candidates.into_iter().find(|c| {
      c.bounding_box()
        .apply(&outstanding.transform)
        .contains(&outstanding.touch)
    });
    let Some(candidate) = hit else {
      info!("触摸点处没有矩形");
      effects.push(Effect::Message(Message::ErrNoRect));
      return effects;
    };

    info!(
      "选中四边形 {:?}，置信度 {:.2}",
      candidate.id,
      candidate.confidence()
    );
    let selection = Selection {
      candidate,
      transform: outstanding.transform,
    };
    effects.push(Effect::Overlay(OverlayUpdate::Selected(
      selection.candidate.view_corners(&selection.transform),
    )));
    effects.push(Effect::Message(Message::HelpTapReleaseRect));

    self.selected = Some(selection.clone());
    self.selected_at = Some(now);
    self.finalized = self.touch.is_none();

    if self.finalized {
      info!("检测途中已松手，直接确认选中");
      effects.push(Effect::Finalize(selection));
    }
    effects
  }

  fn try_dispatch(&mut self, touch: Point2<f32>, frame: &Frame) -> Option<DetectionRequest> {
    if self.in_flight() {
      debug!("检测在途，忽略本次触发");
      return None;
    }
    self.passes += 1;
    self.selected = None;
    self.finalized = false;
    self.outstanding = Some(Outstanding {
      pass: self.passes,
      touch,
      transform: *frame.display_transform(),
    });
    debug!("派发第 {} 次检测 (帧 {})", self.passes, frame.index());
    Some(DetectionRequest {
      pass: self.passes,
      frame: frame.clone(),
    })
  }
}
