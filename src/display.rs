// 该文件是 Kanjian （看见） 项目的一部分。
// src/display.rs - 显示线程上下文
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

//! 显示线程独占的状态：叠加层、状态文字和坐标映射都只在这里修改。

use tracing::{debug, info, warn};

use crate::{
  config::PipelineConfig,
  frame::Frame,
  mapper::{ContentMode, CoordinateMapper, Size},
  model::Detection,
  output::DisplaySurface,
  overlay::{OverlayEntry, OverlayReconciler, OverlaySet},
  scheduler::{Inbox, InferenceOutcome},
};

pub const NO_DETECTIONS_TEXT: &str = "未检测到目标";

/// 结果文字：按顺序列出 `label (0.91)`，没有目标时给出提示
pub fn summarize(detections: &[Detection]) -> String {
  if detections.is_empty() {
    return NO_DETECTIONS_TEXT.to_string();
  }
  detections
    .iter()
    .map(Detection::caption)
    .collect::<Vec<_>>()
    .join(", ")
}

pub struct DisplayContext<S: DisplaySurface> {
  config: PipelineConfig,
  mapper: CoordinateMapper,
  reconciler: OverlayReconciler<S>,
  status: String,
  detections: Vec<Detection>,
  frame_size: Option<Size>,
}

impl<S: DisplaySurface> DisplayContext<S> {
  pub fn new(config: PipelineConfig, mut surface: S) -> Self {
    let viewport = config.viewport.unwrap_or_default();
    if config.viewport.is_some() {
      surface.set_viewport(viewport);
    }
    Self {
      config,
      mapper: CoordinateMapper::new(viewport, config.content_mode),
      reconciler: OverlayReconciler::new(surface),
      status: String::new(),
      detections: Vec::new(),
      frame_size: None,
    }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn mapper(&self) -> &CoordinateMapper {
    &self.mapper
  }

  pub fn status(&self) -> &str {
    &self.status
  }

  pub fn overlay(&self) -> &OverlaySet {
    self.reconciler.current()
  }

  pub fn surface(&self) -> &S {
    self.reconciler.surface()
  }

  pub fn into_surface(self) -> S {
    self.reconciler.into_surface()
  }

  /// 根据帧尺寸确定视口与内容尺寸
  fn layout_for(&mut self, frame_size: Size) {
    self.frame_size = Some(frame_size);
    let viewport = self.config.viewport.unwrap_or(frame_size);
    let mut mapper = CoordinateMapper::new(viewport, self.config.content_mode);
    if self.config.content_mode == ContentMode::Fit {
      mapper = mapper.with_content_size(frame_size);
    }
    if mapper != self.mapper {
      debug!("视口 {}，内容 {}", viewport, frame_size);
      self.reconciler.surface_mut().set_viewport(viewport);
    }
    self.mapper = mapper;
  }

  fn entries(&self) -> Vec<OverlayEntry> {
    self
      .detections
      .iter()
      .map(|detection| {
        let rect = self.mapper.map(&detection.bbox);
        OverlayEntry {
          rect,
          label_origin: self.mapper.label_anchor(&rect, self.config.label_height),
          label_height: self.config.label_height,
          text: detection.caption(),
        }
      })
      .collect()
  }

  fn redraw(&mut self) -> Result<(), S::Error> {
    let entries = self.entries();
    let status = summarize(&self.detections);
    self.reconciler.render(&entries, &status)?;
    self.status = status;
    Ok(())
  }

  /// 显示底图。静态模式下在推理前调用，使图像先于叠加层出现。
  pub fn show_frame(&mut self, frame: &Frame) -> Result<(), S::Error> {
    self.layout_for(frame.size());
    let area = self.mapper.content_frame();
    self.reconciler.surface_mut().show_frame(frame, area)
  }

  /// 应用一次推理结果。失败的结果不改动叠加层和状态文字。
  pub fn apply(&mut self, outcome: InferenceOutcome) -> Result<(), S::Error> {
    match outcome {
      InferenceOutcome::Detected {
        sequence,
        frame_size,
        detections,
      } => {
        self.layout_for(frame_size);
        self.detections = detections;
        self.redraw()?;
        info!("第 {} 帧: {}", sequence, self.status);
        Ok(())
      }
      InferenceOutcome::Failed { sequence, error } => {
        warn!("第 {} 帧推理失败，保留上一次的叠加层: {}", sequence, error);
        Ok(())
      }
    }
  }

  /// 处理收件箱中已到达的全部结果，返回处理的数量
  pub fn drain(&mut self, inbox: &Inbox) -> Result<usize, S::Error> {
    let mut count = 0;
    while let Some(outcome) = inbox.try_recv() {
      self.apply(outcome)?;
      count += 1;
    }
    Ok(count)
  }

  /// 视口变化后用最近一次的检测结果重新布局
  pub fn resize(&mut self, viewport: Size) -> Result<(), S::Error> {
    self.config.viewport = Some(viewport);
    let Some(frame_size) = self.frame_size else {
      self.mapper = CoordinateMapper::new(viewport, self.config.content_mode);
      self.reconciler.surface_mut().set_viewport(viewport);
      return Ok(());
    };
    self.layout_for(frame_size);
    if self.reconciler.current().generation > 0 {
      self.redraw()?;
    }
    Ok(())
  }
}
