// 该文件是 Reli （热力） 项目的一部分。
// src/worker.rs - 后台检测线程
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
  panic::{AssertUnwindSafe, catch_unwind},
  sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use tracing::{debug, error, info};

use crate::{
  detect::{QuadDetector, RECALL_POLICY, filter_by_policy},
  selection::{DetectionCompletion, DetectionRequest},
};

const WORKER_THREAD_NAME: &str = "reli-detect";

/// 在独立线程上运行检测器
///
/// 请求与结果都经由通道传递，结果只在交互线程调用 `try_completion` /
/// `wait_completion` 时被取走，后台线程从不触碰会话状态。
pub struct DetectionWorker {
  requests: Option<Sender<DetectionRequest>>,
  completions: Receiver<DetectionCompletion>,
  handle: Option<JoinHandle<()>>,
}

impl DetectionWorker {
  pub fn spawn<D: QuadDetector + 'static>(mut detector: D) -> std::io::Result<Self> {
    let (req_tx, req_rx) = mpsc::channel::<DetectionRequest>();
    let (done_tx, done_rx) = mpsc::channel();

    let handle = thread::Builder::new()
      .name(WORKER_THREAD_NAME.to_string())
      .spawn(move || {
        info!("检测线程启动");
        for request in req_rx {
          let now = Instant::now();
          let quads = catch_unwind(AssertUnwindSafe(|| {
            detector.detect(&request.frame, &RECALL_POLICY)
          }))
          .unwrap_or_else(|_| {
            error!("第 {} 次检测时检测器崩溃，按无结果处理", request.pass);
            Vec::new()
          });
          let quads = filter_by_policy(quads, &RECALL_POLICY);
          debug!(
            "第 {} 次检测耗时 {:.2?}，得到 {} 个四边形",
            request.pass,
            now.elapsed(),
            quads.len()
          );

          let completion = DetectionCompletion {
            pass: request.pass,
            quads,
          };
          if done_tx.send(completion).is_err() {
            break;
          }
        }
        info!("检测线程退出");
      })?;

    Ok(Self {
      requests: Some(req_tx),
      completions: done_rx,
      handle: Some(handle),
    })
  }

  /// 提交请求，线程已退出时返回 false
  pub fn submit(&self, request: DetectionRequest) -> bool {
    match &self.requests {
      Some(tx) => tx.send(request).is_ok(),
      None => false,
    }
  }

  pub fn try_completion(&self) -> Option<DetectionCompletion> {
    self.completions.try_recv().ok()
  }

  pub fn wait_completion(&self, timeout: Duration) -> Option<DetectionCompletion> {
    match self.completions.recv_timeout(timeout) {
      Ok(completion) => Some(completion),
      Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
    }
  }
}

impl Drop for DetectionWorker {
  fn drop(&mut self) {
    // 关闭请求通道，线程处理完手上的请求后退出
    self.requests.take();
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      error!("检测线程异常退出");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    detect::{DetectPolicy, DetectedQuad},
    frame::Frame,
    geometry::Rect2,
  };
  use image::RgbImage;

  fn request(pass: u64) -> DetectionRequest {
    DetectionRequest {
      pass,
      frame: Frame::from(RgbImage::new(4, 4)),
    }
  }

  #[test]
  fn completion_comes_back_with_the_same_pass() {
    let worker = DetectionWorker::spawn(|_: &Frame, _: &DetectPolicy| {
      vec![DetectedQuad::from_corners(
        Rect2::new(0.1, 0.1, 0.5, 0.5).corners(),
        0.8,
      )]
    })
    .unwrap();
    assert!(worker.submit(request(3)));
    let done = worker.wait_completion(Duration::from_secs(5)).unwrap();
    assert_eq!(done.pass, 3);
    assert_eq!(done.quads.len(), 1);
  }

  #[test]
  fn panicking_detector_yields_empty_result() {
    let worker = DetectionWorker::spawn(|_: &Frame, _: &DetectPolicy| -> Vec<DetectedQuad> {
      panic!("boom")
    })
    .unwrap();
    assert!(worker.submit(request(1)));
    let done = worker.wait_completion(Duration::from_secs(5)).unwrap();
    assert!(done.quads.is_empty());
    // 线程仍然可用
    assert!(worker.submit(request(2)));
    assert_eq!(worker.wait_completion(Duration::from_secs(5)).unwrap().pass, 2);
  }
}
