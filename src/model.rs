// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 检测模型适配
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

/// 归一化检测框
///
/// 所有分量位于 `[0, 1]`，`(x, y)` 是左下角，坐标原点在左下角。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedRect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

fn unit(v: f32) -> f32 {
  if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

impl NormalizedRect {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  /// 由左上角原点的角点坐标 `[x_min, y_min, x_max, y_max]` 构造
  pub fn from_top_left_corners(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
    Self {
      x: x_min,
      y: 1.0 - y_max,
      width: x_max - x_min,
      height: y_max - y_min,
    }
    .clamped()
  }

  /// 限制到单位正方形内，保证 `x + width <= 1` 且 `y + height <= 1`
  pub fn clamped(&self) -> Self {
    let x = unit(self.x);
    let y = unit(self.y);
    Self {
      x,
      y,
      width: unit(self.width).min(1.0 - x),
      height: unit(self.height).min(1.0 - y),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub label: String,
  pub confidence: f32,
  #[serde(rename = "box")]
  pub bbox: NormalizedRect,
}

impl Detection {
  pub fn new(label: impl Into<String>, confidence: f32, bbox: NormalizedRect) -> Self {
    Self {
      label: label.into(),
      confidence,
      bbox,
    }
  }

  /// 形如 `cat (0.91)` 的说明文字
  pub fn caption(&self) -> String {
    format!("{} ({:.2})", self.label, self.confidence)
  }
}

/// 模型初始化失败，属于启动期的致命错误
#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型加载错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型文件解析错误: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("模型无效: {0}")]
  Invalid(String),
  #[error("模型后端错误: {0}")]
  Backend(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 单帧推理失败，可恢复
#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("帧格式不受支持: {0}")]
  UnsupportedFrame(String),
  #[error("推理后端错误: {0}")]
  Backend(String),
  #[error("帧数据错误: {0}")]
  Frame(#[from] crate::frame::FrameError),
}

/// 检测模型能力
///
/// 对调用者是同步的，内部可能耗时数十毫秒。模型成功运行但没有发现目标时
/// 返回空列表而不是错误。
pub trait Detector: Send {
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, InferenceError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
    (**self).detect(frame)
  }
}

mod replay;
pub use self::replay::ReplayDetector;

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{COCO_LABELS, Yolo26, Yolo26Builder};

pub enum DetectorWrapper {
  Replay(ReplayDetector),
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26),
}

impl FromUrl for DetectorWrapper {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ReplayDetector::SCHEME => Ok(DetectorWrapper::Replay(ReplayDetector::from_url(url)?)),
      #[cfg(feature = "model_yolo26")]
      Yolo26Builder::SCHEME => Ok(DetectorWrapper::Yolo26(
        Yolo26Builder::from_url(url)?.build()?,
      )),
      scheme => Err(ModelLoadError::SchemeMismatch(format!(
        "不支持的模型方案 '{}'",
        scheme
      ))),
    }
  }
}

impl Detector for DetectorWrapper {
  fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, InferenceError> {
    match self {
      DetectorWrapper::Replay(detector) => detector.detect(frame),
      #[cfg(feature = "model_yolo26")]
      DetectorWrapper::Yolo26(detector) => detector.detect(frame),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[test]
  fn clamp_keeps_box_inside_unit_square() {
    let rect = NormalizedRect::new(0.7, 0.9, 0.6, 0.4).clamped();
    assert_relative_eq!(rect.x + rect.width, 1.0);
    assert_relative_eq!(rect.y + rect.height, 1.0);

    let rect = NormalizedRect::new(f32::NAN, -1.0, 2.0, f32::NAN).clamped();
    assert_eq!(rect, NormalizedRect::new(0.0, 0.0, 1.0, 0.0));
  }

  #[test]
  fn top_left_corners_are_flipped() {
    // 图像上半部分的左半边
    let rect = NormalizedRect::from_top_left_corners(0.0, 0.0, 0.5, 0.5);
    assert_relative_eq!(rect.x, 0.0);
    assert_relative_eq!(rect.y, 0.5);
    assert_relative_eq!(rect.width, 0.5);
    assert_relative_eq!(rect.height, 0.5);

    let rect = NormalizedRect::from_top_left_corners(0.1, 0.6, 0.3, 1.0);
    assert_relative_eq!(rect.y, 0.0);
    assert_relative_eq!(rect.height, 0.4, epsilon = 1e-6);
  }

  #[test]
  fn caption_uses_two_decimals() {
    let detection = Detection::new("cat", 0.914, NormalizedRect::default());
    assert_eq!(detection.caption(), "cat (0.91)");
  }

  #[test]
  fn detection_json_uses_box_key() {
    let detection: Detection = serde_json::from_str(
      r#"{"label":"dog","confidence":0.5,"box":{"x":0.1,"y":0.2,"width":0.3,"height":0.4}}"#,
    )
    .unwrap();
    assert_eq!(detection.label, "dog");
    assert_relative_eq!(detection.bbox.height, 0.4);
  }

  #[test]
  fn unknown_scheme_is_a_load_error() {
    let url = Url::parse("onnx:///tmp/model.onnx").unwrap();
    assert!(matches!(
      DetectorWrapper::from_url(&url),
      Err(ModelLoadError::SchemeMismatch(_))
    ));
  }
}
