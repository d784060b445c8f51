// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 管线配置
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

use crate::{
  input::SourceMode,
  mapper::{ContentMode, Size},
};

pub const DEFAULT_LABEL_HEIGHT: f32 = 24.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
  pub mode: SourceMode,
  pub content_mode: ContentMode,
  /// 每帧最多保留的检测数，`None` 表示不限制
  pub max_detections: Option<usize>,
  /// 显示视口，`None` 时使用帧本身的尺寸
  pub viewport: Option<Size>,
  pub label_height: f32,
}

impl PipelineConfig {
  /// 实时画面默认铺满视口，静态图像默认完整显示
  pub fn new(mode: SourceMode) -> Self {
    let content_mode = match mode {
      SourceMode::Live => ContentMode::Fill,
      SourceMode::Static => ContentMode::Fit,
    };
    Self {
      mode,
      content_mode,
      max_detections: None,
      viewport: None,
      label_height: DEFAULT_LABEL_HEIGHT,
    }
  }

  pub fn with_content_mode(mut self, content_mode: ContentMode) -> Self {
    self.content_mode = content_mode;
    self
  }

  pub fn with_max_detections(mut self, max_detections: Option<usize>) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn with_viewport(mut self, viewport: Option<Size>) -> Self {
    self.viewport = viewport;
    self
  }

  pub fn with_label_height(mut self, label_height: f32) -> Self {
    self.label_height = label_height.max(0.0);
    self
  }
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self::new(SourceMode::Live)
  }
}
