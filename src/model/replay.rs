// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/replay.rs - 回放检测结果的模型
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

//! 从 JSON 文件中按顺序回放每一帧的检测结果，用于没有 NPU 的环境。
//!
//! 文件内容是一个数组，每个元素对应一帧：
//!
//! ```json
//! [
//!   [{"label": "cat", "confidence": 0.91, "box": {"x": 0.0, "y": 0.0, "width": 0.5, "height": 0.5}}],
//!   null,
//!   []
//! ]
//! ```
//!
//! `null` 表示该帧推理失败。数组回放完毕后从头开始。

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{Detection, Detector, InferenceError, ModelLoadError},
};

pub struct ReplayDetector {
  script: Vec<Option<Vec<Detection>>>,
  cursor: AtomicUsize,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::SchemeMismatch(format!(
        "期望模型方案 '{}', 实际模型方案 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = crate::url_path(url);
    info!("加载回放文件: {}", path);
    let content = std::fs::read_to_string(&path)?;
    Self::from_json(&content)
  }
}

impl ReplayDetector {
  pub fn new(script: Vec<Option<Vec<Detection>>>) -> Result<Self, ModelLoadError> {
    if script.is_empty() {
      return Err(ModelLoadError::Invalid("回放文件中没有任何帧".to_string()));
    }
    Ok(Self {
      script,
      cursor: AtomicUsize::new(0),
    })
  }

  pub fn from_json(content: &str) -> Result<Self, ModelLoadError> {
    let script: Vec<Option<Vec<Detection>>> = serde_json::from_str(content)?;
    debug!("回放帧数: {}", script.len());
    Self::new(script)
  }
}

impl Detector for ReplayDetector {
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
    let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.script.len();
    debug!(
      "回放第 {} 帧结果 ({}x{})",
      index,
      frame.width(),
      frame.height()
    );
    self.script[index]
      .clone()
      .ok_or_else(|| InferenceError::Backend(format!("回放脚本第 {} 帧标记为失败", index)))
  }
}
