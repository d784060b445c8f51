// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 视频/图像输入
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread::{self, JoinHandle},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{FromUrl, frame::Frame};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder,
};

/// 输入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
  /// 实时画面，按设备采集速率无限推送
  Live,
  /// 静态图像，只产生一帧
  Static,
}

/// 采集设备不可用，在产生任何帧之前报告
#[derive(Error, Debug)]
pub enum AcquisitionError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法启动采集线程: {0}")]
  CaptureThread(#[from] std::io::Error),
}

/// 帧来源：一个惰性的帧序列
pub trait FrameSource: Iterator<Item = Frame> + Send {
  fn mode(&self) -> SourceMode;
}

/// 内存中的一帧静态图像
pub struct StaticFrame {
  frame: Option<Frame>,
}

impl StaticFrame {
  pub fn new(frame: Frame) -> Self {
    Self { frame: Some(frame) }
  }
}

impl Iterator for StaticFrame {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take()
  }
}

impl FrameSource for StaticFrame {
  fn mode(&self) -> SourceMode {
    SourceMode::Static
  }
}

pub enum InputWrapper {
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = AcquisitionError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    Err(AcquisitionError::SchemeMismatch(format!(
      "不支持的输入方案 '{}'",
      url.scheme()
    )))
  }
}

impl Iterator for InputWrapper {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
    }
  }
}

impl FrameSource for InputWrapper {
  fn mode(&self) -> SourceMode {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.mode(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.mode(),
    }
  }
}

/// 采集线程句柄
pub struct CaptureHandle {
  stop: Arc<AtomicBool>,
  handle: JoinHandle<usize>,
}

impl CaptureHandle {
  /// 请求停止，下一帧到达时生效
  pub fn stop(&self) {
    self.stop.store(true, Ordering::Release);
  }

  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }

  /// 等待采集线程退出，返回推送的帧数
  pub fn join(self) -> usize {
    self.stop();
    match self.handle.join() {
      Ok(count) => count,
      Err(_) => {
        warn!("采集线程异常退出");
        0
      }
    }
  }
}

/// 在独立的采集线程上驱动帧来源，每采集到一帧调用一次 `on_frame`
pub fn spawn_capture<S, F>(source: S, mut on_frame: F) -> Result<CaptureHandle, AcquisitionError>
where
  S: FrameSource + 'static,
  F: FnMut(Frame) + Send + 'static,
{
  let stop = Arc::new(AtomicBool::new(false));
  let flag = stop.clone();
  let handle = thread::Builder::new()
    .name("capture".to_string())
    .spawn(move || {
      info!("采集线程启动");
      let mut count = 0usize;
      for frame in source {
        if flag.load(Ordering::Acquire) {
          break;
        }
        count += 1;
        debug!("采集第 {} 帧: {}x{}", count, frame.width(), frame.height());
        on_frame(frame);
      }
      info!("采集线程结束，共 {} 帧", count);
      count
    })?;

  Ok(CaptureHandle { stop, handle })
}
