// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 实时输入
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

//! # GStreamer 实时输入
//!
//! 通过 appsink 拉取摄像头或视频文件的画面：
//!
//! - `gst://camera/dev/video0?width=1280&height=720&fps=30&format=YUY2&rotate=90`
//! - `gst://file/path/to/video.mp4`
//!
//! 使用前需要安装 GStreamer 开发库（`libgstreamer1.0-dev`、
//! `libgstreamer-plugins-base1.0-dev`），并启用 `gstreamer_input` 特性。
//!
//! 管道在构造时切换到 PLAYING 并等待状态稳定，设备不可用会在产生任何帧之前
//! 以错误的形式报告。

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, FrameError, PixelFormat},
  input::{FrameSource, SourceMode},
};

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_FPS: u32 = 30;
const STATE_CHANGE_TIMEOUT_SECS: u64 = 5;

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 操作失败: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("无法将元素转换为 appsink")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式: {0:?}")]
  UnsupportedFormat(gst_video::VideoFormat),
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("状态切换失败: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("帧数据错误: {0}")]
  FrameError(#[from] FrameError),
}

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    format: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        format,
        width,
        height,
        fps,
      } => {
        let io_mode_str = io_mode
          .map(|mode| format!(" io-mode={}", mode))
          .unwrap_or_default();
        format!(
          "v4l2src device={}{} ! video/x-raw,format={},width={},height={},framerate={}/1",
          camera, io_mode_str, format, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
  mode: SourceMode,
}

impl GStreamerInputPipelineBuilder {
  pub fn camera(device: &str, width: u32, height: u32, fps: u32) -> Self {
    Self {
      items: vec![GStreamerInputBuilderItem::CameraSource {
        camera: device.to_string(),
        io_mode: None,
        format: "YUY2".to_string(),
        width,
        height,
        fps,
      }],
      mode: SourceMode::Live,
    }
  }

  pub fn file(path: &str) -> Self {
    Self {
      items: vec![GStreamerInputBuilderItem::FileSource(path.to_string())],
      mode: SourceMode::Live,
    }
  }

  pub fn rotate(mut self, degrees: Option<&str>) -> Self {
    let method = match degrees {
      Some("90") => 1,
      Some("180") => 2,
      Some("270") => 3,
      _ => return self,
    };
    self.items.push(GStreamerInputBuilderItem::VideoFlip { method });
    self
  }

  pub fn target_format(mut self, format: &str) -> Self {
    self.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: format.to_string(),
    });
    self
  }

  pub fn description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=2 drop=true sync=false name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let description = self.description();
    info!("GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    let input = GStreamerInput {
      pipeline,
      appsink,
      mode: self.mode,
    };

    // 等待状态稳定，设备打不开时在这里失败
    input.pipeline.set_state(gst::State::Playing)?;
    let (result, _, _) = input
      .pipeline
      .state(gst::ClockTime::from_seconds(STATE_CHANGE_TIMEOUT_SECS));
    if let Err(e) = result {
      error!("采集设备启动失败: {}", e);
      return Err(e.into());
    }

    Ok(input)
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let number = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let path = crate::url_path(url);
    let builder = match url.host_str() {
      Some("camera") => {
        let mut builder = Self::camera(
          &path,
          number("width", DEFAULT_WIDTH),
          number("height", DEFAULT_HEIGHT),
          number("fps", DEFAULT_FPS),
        );
        if let Some(GStreamerInputBuilderItem::CameraSource {
          io_mode, format, ..
        }) = builder.items.first_mut()
        {
          *io_mode = query.get("io-mode").and_then(|v| v.parse::<u32>().ok());
          if let Some(f) = query.get("format") {
            *format = f.clone();
          }
        }
        builder
      }
      Some("file") => Self::file(&path),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    };

    Ok(
      builder
        .rotate(query.get("rotate").map(String::as_str))
        .target_format("RGB"),
    )
  }
}

/// GStreamer 视频输入，逐帧从 appsink 拉取
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  mode: SourceMode,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    // 管道结束（EOS）时 pull_sample 返回错误
    let sample = self
      .appsink
      .pull_sample()
      .map_err(|e| info!("GStreamer 输入结束: {}", e))
      .ok()?;
    match convert_sample(&sample) {
      Ok(frame) => Some(frame),
      Err(e) => {
        error!("无法转换采样: {}", e);
        None
      }
    }
  }
}

impl FrameSource for GStreamerInput {
  fn mode(&self) -> SourceMode {
    self.mode
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<Frame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("采样中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("采样中没有 caps".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let format = match video_info.format() {
    gst_video::VideoFormat::Rgb => PixelFormat::Rgb8,
    gst_video::VideoFormat::Bgr => PixelFormat::Bgr8,
    gst_video::VideoFormat::Rgba | gst_video::VideoFormat::Rgbx => PixelFormat::Rgba8,
    gst_video::VideoFormat::Bgra | gst_video::VideoFormat::Bgrx => PixelFormat::Bgra8,
    other => return Err(GStreamerInputError::UnsupportedFormat(other)),
  };

  let map = buffer
    .map_readable()
    .map_err(|e| GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e)))?;

  let stride = video_info.stride()[0] as usize;
  Ok(Frame::with_stride(
    map.as_slice().to_vec(),
    video_info.width(),
    video_info.height(),
    stride,
    format,
  )?)
}
