// 该文件是 Reli （热力） 项目的一部分。
// src/session.rs - 交互会话
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
  collections::VecDeque,
  time::{Duration, Instant},
};

use nalgebra::Point2;
use tracing::{debug, error, info, warn};

use crate::{
  detect::QuadDetector,
  frame::Frame,
  heatmap::{Heatmap, HeatmapStyle},
  inference::{ControlInputs, StressNet},
  message::Message,
  model::TensorRuntime,
  node::{NodeTable, RectangleNode},
  overlay::{Overlay, OverlayUpdate},
  projection::project,
  selection::{DetectionCompletion, Effect, Phase, Selection, SelectionMachine},
  tracking::{AnchorId, PlaneAnchor, PlaneContext, SurfaceTable},
  worker::DetectionWorker,
};

/// 一次交互会话
///
/// 所有方法都应在同一个交互线程上调用。后台检测的结果只在
/// [`Session::pump`] 或 [`Session::wait_for_detection`] 中被取回并应用。
pub struct Session<R> {
  machine: SelectionMachine,
  worker: DetectionWorker,
  surfaces: SurfaceTable,
  nodes: NodeTable,
  overlay: Overlay,
  message: Message,
  model: StressNet<R>,
  controls: ControlInputs,
  style: HeatmapStyle,
  last_frame: Option<Frame>,
}

impl<R: TensorRuntime> Session<R> {
  pub fn new<D: QuadDetector + 'static>(detector: D, model: StressNet<R>) -> std::io::Result<Self> {
    let worker = DetectionWorker::spawn(detector)?;
    info!("会话启动");
    Ok(Self {
      machine: SelectionMachine::new(),
      worker,
      surfaces: SurfaceTable::default(),
      nodes: NodeTable::default(),
      overlay: Overlay::default(),
      message: Message::HelpFindSurface,
      model,
      controls: ControlInputs::default(),
      style: HeatmapStyle::default(),
      last_frame: None,
    })
  }

  pub fn with_style(mut self, style: HeatmapStyle) -> Self {
    self.style = style;
    self
  }

  pub fn on_touch_down(&mut self, point: Point2<f32>, frame: &Frame) {
    self.last_frame = Some(frame.clone());
    let effects = self.machine.on_touch_down(point, frame);
    self.execute(effects);
  }

  pub fn on_touch_move(&mut self, point: Point2<f32>, frame: &Frame) {
    self.last_frame = Some(frame.clone());
    let effects = self.machine.on_touch_move(point, frame);
    self.execute(effects);
  }

  pub fn on_touch_up(&mut self) {
    let effects = self.machine.on_touch_up();
    self.execute(effects);
  }

  /// 每个跟踪周期调用一次，同时取回已完成的检测
  pub fn on_frame_update(&mut self, frame: &Frame) {
    self.last_frame = Some(frame.clone());
    self.pump();
    let effects = self.machine.on_frame_update(frame, Instant::now());
    self.execute(effects);
  }

  /// 应用所有已到达的检测结果，返回处理的个数
  pub fn pump(&mut self) -> usize {
    let mut n = 0;
    while let Some(completion) = self.worker.try_completion() {
      self.complete(completion);
      n += 1;
    }
    n
  }

  /// 阻塞等待在途检测完成，没有在途检测或超时返回 false
  pub fn wait_for_detection(&mut self, timeout: Duration) -> bool {
    if !self.machine.in_flight() {
      return false;
    }
    match self.worker.wait_completion(timeout) {
      Some(completion) => {
        self.complete(completion);
        true
      }
      None => {
        warn!("等待检测结果超时");
        false
      }
    }
  }

  fn complete(&mut self, completion: DetectionCompletion) {
    let effects = self
      .machine
      .on_detection_complete(completion, Instant::now());
    self.execute(effects);
  }

  fn execute(&mut self, effects: Vec<Effect>) {
    let mut queue: VecDeque<Effect> = effects.into();
    while let Some(effect) = queue.pop_front() {
      match effect {
        Effect::Dispatch(request) => {
          let pass = request.pass;
          if !self.worker.submit(request) {
            // 后台线程不可用时按空结果处理，避免在途标记卡死
            error!("检测线程不可用，第 {} 次检测按无结果处理", pass);
            let completion = DetectionCompletion {
              pass,
              quads: Vec::new(),
            };
            queue.extend(self.machine.on_detection_complete(completion, Instant::now()));
          }
        }
        Effect::Finalize(selection) => self.materialize(selection),
        Effect::Message(message) => self.set_message(message),
        Effect::Overlay(update) => self.overlay.apply(update),
      }
    }
  }

  /// 投影选中的四边形并创建节点
  fn materialize(&mut self, selection: Selection) {
    self.overlay.clear_selected();
    let Some(frame) = &self.last_frame else {
      warn!("没有可用的帧，无法放置矩形");
      return;
    };

    let planes = PlaneContext::new(frame, &self.surfaces);
    let rectangle = match project(&selection.candidate, &selection.transform, &planes) {
      Ok(rectangle) => rectangle,
      Err(e) => {
        warn!("放置矩形失败: {}", e);
        self.set_message(Message::ErrNoPlaneForRect);
        return;
      }
    };

    let field = self.model.compute_field(&self.controls);
    let heatmap = Heatmap::paint(field, &self.style);
    self
      .nodes
      .insert(RectangleNode::new(selection.candidate.id, rectangle, heatmap));
  }

  fn set_message(&mut self, message: Message) {
    if self.message != message {
      debug!("提示: {:?} -> {:?}", self.message, message);
    }
    self.message = message;
  }

  /// 新的载荷只影响之后创建的节点
  pub fn set_controls(&mut self, controls: ControlInputs) {
    self.controls = controls;
  }

  pub fn add_anchor(&mut self, anchor: PlaneAnchor) {
    self.surfaces.add(anchor);
    if self.message == Message::HelpFindSurface {
      self.set_message(Message::HelpTapHoldRect);
    }
  }

  pub fn update_anchor(&mut self, anchor: PlaneAnchor) {
    if !self.surfaces.update(anchor) {
      debug!("忽略未知平面的更新");
    }
  }

  pub fn remove_anchor(&mut self, id: AnchorId) {
    self.surfaces.remove(id);
  }

  pub fn toggle_surfaces(&mut self) -> bool {
    self.surfaces.toggle_visibility()
  }

  /// 移除所有矩形节点
  pub fn clear_rects(&mut self) {
    self.nodes.clear();
  }

  /// 移除节点和平面，回到寻找平面的状态
  ///
  /// 在途的检测不会被取消，其结果仍按正常流程处理。
  pub fn restart(&mut self) {
    info!("重新开始会话");
    self.nodes.clear();
    self.surfaces.clear();
    self.overlay.apply(OverlayUpdate::Clear);
    self.set_message(Message::HelpFindSurface);
  }

  pub fn message(&self) -> Message {
    self.message
  }

  pub fn phase(&self) -> Phase {
    self.machine.phase()
  }

  pub fn selection(&self) -> &SelectionMachine {
    &self.machine
  }

  pub fn nodes(&self) -> &NodeTable {
    &self.nodes
  }

  pub fn overlay(&self) -> &Overlay {
    &self.overlay
  }

  pub fn surfaces(&self) -> &SurfaceTable {
    &self.surfaces
  }

  pub fn controls(&self) -> ControlInputs {
    self.controls
  }
}
