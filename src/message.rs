// 该文件是 Reli （热力） 项目的一部分。
// src/message.rs - 用户提示信息
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

use std::fmt;

/// 界面上显示的提示，完全由流水线状态变化决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
  HelpFindSurface,
  HelpTapHoldRect,
  HelpTapReleaseRect,
  ErrNoRect,
  ErrNoPlaneForRect,
}

impl Message {
  pub fn localized_str(&self) -> &'static str {
    match self {
      Message::HelpFindSurface => "Move the device to find a surface",
      Message::HelpTapHoldRect => "Tap and hold a rectangle",
      Message::HelpTapReleaseRect => "Release to confirm the rectangle",
      Message::ErrNoRect => "No rectangle found",
      Message::ErrNoPlaneForRect => "No plane for this rectangle",
    }
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Message::ErrNoRect | Message::ErrNoPlaneForRect)
  }
}

impl fmt::Display for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.localized_str())
  }
}
