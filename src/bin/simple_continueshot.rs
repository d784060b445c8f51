// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/simple_continueshot.rs - 实时画面检测
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use kanjian::{
  FromUrl,
  config::{DEFAULT_LABEL_HEIGHT, PipelineConfig},
  input::{FrameSource, InputWrapper, SourceMode},
  mapper::{ContentMode, Size},
  model::DetectorWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use tracing::{error, info, warn};

/// Kanjian 实时画面参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 yolo26:///path/to/model.rknn 或 replay:///path/to/script.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 gst://camera/dev/video0?width=1280&height=720
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 console://、folder:///tmp/records 或 image:///tmp/latest.png
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 内容布局：fill 或 fit，默认 fill
  #[arg(long, value_name = "MODE")]
  pub content_mode: Option<ContentMode>,
  /// 最多显示的检测数
  #[arg(long, value_name = "K")]
  pub max_detections: Option<usize>,
  /// 视口尺寸，例如 1280x720，默认与画面相同
  #[arg(long, value_name = "WxH")]
  pub viewport: Option<Size>,
  /// 标签高度（像素）
  #[arg(long, value_name = "PX", default_value_t = DEFAULT_LABEL_HEIGHT)]
  pub label_height: f32,
  /// 应用指定数量的结果后退出
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出: {}", args.output);

  let detector =
    DetectorWrapper::from_url(&args.model).inspect_err(|e| error!("模型加载失败: {}", e))?;
  let input = InputWrapper::from_url(&args.input).inspect_err(|e| error!("采集设备不可用: {}", e))?;
  let output = OutputWrapper::from_url(&args.output).inspect_err(|e| error!("输出不可用: {}", e))?;

  if input.mode() != SourceMode::Live {
    warn!("输入不是实时画面，只会处理一帧");
  }

  let mut config = PipelineConfig::new(SourceMode::Live)
    .with_max_detections(args.max_detections)
    .with_viewport(args.viewport)
    .with_label_height(args.label_height);
  if let Some(mode) = args.content_mode {
    config = config.with_content_mode(mode);
  }

  ContinuousTask::new(config)
    .with_frame_number(args.frame_number)
    .run_task(input, detector, output)?;

  Ok(())
}
