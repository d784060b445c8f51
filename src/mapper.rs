// 该文件是 Kanjian （看见） 项目的一部分。
// src/mapper.rs - 归一化坐标到显示坐标的映射
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

//! # 坐标映射
//!
//! 模型输出的检测框位于单位正方形内，原点在左下角；显示坐标以像素为单位，
//! 原点在左上角。本模块负责两者之间的转换：
//!
//! - `Fill`：图像铺满整个视口，直接按视口尺寸缩放并翻转 y 轴；
//! - `Fit`：图像保持宽高比缩放到视口内部，四周可能留有黑边，
//!   映射时需要加上黑边偏移并按实际渲染尺寸缩放。

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::model::NormalizedRect;

/// 尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
  pub width: f32,
  pub height: f32,
}

impl Size {
  pub fn new(width: f32, height: f32) -> Self {
    Self { width, height }
  }

  /// 宽或高不是正数时视为退化尺寸
  pub fn is_degenerate(&self) -> bool {
    !(self.width > 0.0 && self.height > 0.0)
  }
}

impl fmt::Display for Size {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseLayoutError {
  #[error("无效的尺寸: {0}，期望格式为 宽x高")]
  InvalidSize(String),
  #[error("未知的内容布局模式: {0}，可选值为 fill 或 fit")]
  UnknownContentMode(String),
}

impl FromStr for Size {
  type Err = ParseLayoutError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (w, h) = s
      .split_once(['x', 'X'])
      .ok_or_else(|| ParseLayoutError::InvalidSize(s.to_string()))?;
    let width = w
      .trim()
      .parse::<f32>()
      .map_err(|_| ParseLayoutError::InvalidSize(s.to_string()))?;
    let height = h
      .trim()
      .parse::<f32>()
      .map_err(|_| ParseLayoutError::InvalidSize(s.to_string()))?;
    let size = Size::new(width, height);
    if size.is_degenerate() {
      return Err(ParseLayoutError::InvalidSize(s.to_string()));
    }
    Ok(size)
  }
}

/// 显示坐标中的点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

/// 显示坐标中的矩形，原点在左上角
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DisplayRect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl DisplayRect {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn max_x(&self) -> f32 {
    self.x + self.width
  }

  pub fn max_y(&self) -> f32 {
    self.y + self.height
  }
}

/// 内容布局模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
  /// 铺满视口（实时画面）
  #[default]
  Fill,
  /// 保持宽高比完整显示（静态图像，可能留黑边）
  Fit,
}

impl FromStr for ContentMode {
  type Err = ParseLayoutError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "fill" => Ok(ContentMode::Fill),
      "fit" => Ok(ContentMode::Fit),
      _ => Err(ParseLayoutError::UnknownContentMode(s.to_string())),
    }
  }
}

impl fmt::Display for ContentMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ContentMode::Fill => write!(f, "fill"),
      ContentMode::Fit => write!(f, "fit"),
    }
  }
}

/// 视口内容未做黑边处理时的映射
pub fn map(bbox: &NormalizedRect, viewport: Size, mode: ContentMode) -> DisplayRect {
  CoordinateMapper::new(viewport, mode).map(bbox)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
  viewport: Size,
  content: Size,
  mode: ContentMode,
}

impl CoordinateMapper {
  /// 内容尺寸默认等于视口尺寸
  pub fn new(viewport: Size, mode: ContentMode) -> Self {
    Self {
      viewport,
      content: viewport,
      mode,
    }
  }

  pub fn with_content_size(mut self, content: Size) -> Self {
    self.content = content;
    self
  }

  pub fn viewport(&self) -> Size {
    self.viewport
  }

  pub fn content(&self) -> Size {
    self.content
  }

  pub fn mode(&self) -> ContentMode {
    self.mode
  }

  /// 图像在视口中实际渲染的区域
  pub fn content_frame(&self) -> DisplayRect {
    let full = DisplayRect::new(0.0, 0.0, self.viewport.width, self.viewport.height);
    match self.mode {
      ContentMode::Fill => full,
      ContentMode::Fit => {
        if self.content.is_degenerate() || self.viewport.is_degenerate() {
          return full;
        }
        let scale = (self.viewport.width / self.content.width)
          .min(self.viewport.height / self.content.height);
        let width = self.content.width * scale;
        let height = self.content.height * scale;
        DisplayRect::new(
          (self.viewport.width - width) / 2.0,
          (self.viewport.height - height) / 2.0,
          width,
          height,
        )
      }
    }
  }

  pub fn map(&self, bbox: &NormalizedRect) -> DisplayRect {
    let frame = self.content_frame();
    let b = bbox.clamped();
    // y 轴翻转：左下角原点 -> 左上角原点
    let top = (1.0 - b.y - b.height).max(0.0);
    DisplayRect::new(
      frame.x + b.x * frame.width,
      frame.y + top * frame.height,
      b.width * frame.width,
      b.height * frame.height,
    )
  }

  /// `map` 的逆变换
  pub fn unmap(&self, rect: &DisplayRect) -> NormalizedRect {
    let frame = self.content_frame();
    if frame.width <= 0.0 || frame.height <= 0.0 {
      return NormalizedRect::default();
    }
    let width = rect.width / frame.width;
    let height = rect.height / frame.height;
    let x = (rect.x - frame.x) / frame.width;
    let y = 1.0 - (rect.y - frame.y) / frame.height - height;
    NormalizedRect::new(x, y, width, height)
  }

  /// 标签放在框上沿之上，不超出视口顶部
  pub fn label_anchor(&self, rect: &DisplayRect, label_height: f32) -> Point {
    Point {
      x: rect.x,
      y: (rect.y - label_height).max(0.0),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  fn random_rect() -> NormalizedRect {
    let x = fastrand::f32();
    let y = fastrand::f32();
    NormalizedRect::new(x, y, fastrand::f32() * (1.0 - x), fastrand::f32() * (1.0 - y))
  }

  #[test]
  fn fill_flips_y_axis() {
    let rect = map(
      &NormalizedRect::new(0.0, 0.0, 0.5, 0.5),
      Size::new(200.0, 100.0),
      ContentMode::Fill,
    );
    assert_eq!(rect, DisplayRect::new(0.0, 50.0, 100.0, 50.0));

    let rect = map(
      &NormalizedRect::new(0.25, 0.5, 0.5, 0.5),
      Size::new(200.0, 100.0),
      ContentMode::Fill,
    );
    assert_eq!(rect, DisplayRect::new(50.0, 0.0, 100.0, 50.0));
  }

  #[test]
  fn fill_stays_inside_viewport() {
    for _ in 0..1000 {
      let viewport = Size::new(1.0 + fastrand::f32() * 4000.0, 1.0 + fastrand::f32() * 4000.0);
      let bbox = NormalizedRect::new(
        fastrand::f32(),
        fastrand::f32(),
        fastrand::f32(),
        fastrand::f32(),
      );
      let rect = map(&bbox, viewport, ContentMode::Fill);
      let eps = viewport.width.max(viewport.height) * 1e-5;
      assert!(rect.x >= 0.0 && rect.y >= 0.0, "{:?}", rect);
      assert!(rect.width >= 0.0 && rect.height >= 0.0, "{:?}", rect);
      assert!(rect.max_x() <= viewport.width + eps, "{:?} {}", rect, viewport);
      assert!(rect.max_y() <= viewport.height + eps, "{:?} {}", rect, viewport);
    }
  }

  #[test]
  fn fill_round_trip() {
    let mapper = CoordinateMapper::new(Size::new(1280.0, 720.0), ContentMode::Fill);
    for _ in 0..1000 {
      let bbox = random_rect();
      let back = mapper.unmap(&mapper.map(&bbox));
      assert_relative_eq!(back.x, bbox.x, epsilon = 1e-4);
      assert_relative_eq!(back.y, bbox.y, epsilon = 1e-4);
      assert_relative_eq!(back.width, bbox.width, epsilon = 1e-4);
      assert_relative_eq!(back.height, bbox.height, epsilon = 1e-4);
    }
  }

  #[test]
  fn fit_letterboxes_wide_content() {
    // 400x100 的图像放进 200x200 的视口：缩放 0.5，上下各留 75 像素
    let mapper = CoordinateMapper::new(Size::new(200.0, 200.0), ContentMode::Fit)
      .with_content_size(Size::new(400.0, 100.0));
    assert_eq!(mapper.content_frame(), DisplayRect::new(0.0, 75.0, 200.0, 50.0));

    let rect = mapper.map(&NormalizedRect::new(0.0, 0.0, 1.0, 1.0));
    assert_eq!(rect, DisplayRect::new(0.0, 75.0, 200.0, 50.0));

    let rect = mapper.map(&NormalizedRect::new(0.5, 0.5, 0.5, 0.5));
    assert_eq!(rect, DisplayRect::new(100.0, 75.0, 100.0, 25.0));
  }

  #[test]
  fn fit_pillarboxes_tall_content() {
    let mapper = CoordinateMapper::new(Size::new(300.0, 100.0), ContentMode::Fit)
      .with_content_size(Size::new(50.0, 100.0));
    assert_eq!(mapper.content_frame(), DisplayRect::new(125.0, 0.0, 50.0, 100.0));
    let rect = mapper.map(&NormalizedRect::new(0.0, 0.0, 0.5, 0.5));
    assert_eq!(rect, DisplayRect::new(125.0, 50.0, 25.0, 50.0));
  }

  #[test]
  fn fit_round_trip() {
    let mapper = CoordinateMapper::new(Size::new(640.0, 480.0), ContentMode::Fit)
      .with_content_size(Size::new(1920.0, 1080.0));
    for _ in 0..200 {
      let bbox = random_rect();
      let back = mapper.unmap(&mapper.map(&bbox));
      assert_relative_eq!(back.x, bbox.x, epsilon = 1e-4);
      assert_relative_eq!(back.y, bbox.y, epsilon = 1e-4);
    }
  }

  #[test]
  fn fit_without_content_size_falls_back_to_fill() {
    let mapper = CoordinateMapper::new(Size::new(100.0, 100.0), ContentMode::Fit)
      .with_content_size(Size::default());
    assert_eq!(mapper.content_frame(), DisplayRect::new(0.0, 0.0, 100.0, 100.0));
  }

  #[test]
  fn out_of_range_boxes_are_clamped() {
    let rect = map(
      &NormalizedRect::new(0.8, -0.2, 0.5, 1.5),
      Size::new(100.0, 100.0),
      ContentMode::Fill,
    );
    assert_relative_eq!(rect.x, 80.0, epsilon = 1e-4);
    assert_relative_eq!(rect.y, 0.0, epsilon = 1e-4);
    assert_relative_eq!(rect.width, 20.0, epsilon = 1e-4);
    assert_relative_eq!(rect.height, 100.0, epsilon = 1e-4);
  }

  #[test]
  fn label_anchor_is_clamped_to_top() {
    let mapper = CoordinateMapper::new(Size::new(100.0, 100.0), ContentMode::Fill);
    let anchor = mapper.label_anchor(&DisplayRect::new(10.0, 30.0, 20.0, 20.0), 24.0);
    assert_eq!(anchor, Point { x: 10.0, y: 6.0 });
    let anchor = mapper.label_anchor(&DisplayRect::new(10.0, 5.0, 20.0, 20.0), 24.0);
    assert_eq!(anchor, Point { x: 10.0, y: 0.0 });
  }

  #[test]
  fn parse_layout_options() {
    assert_eq!("1280x720".parse::<Size>(), Ok(Size::new(1280.0, 720.0)));
    assert!("1280".parse::<Size>().is_err());
    assert!("0x720".parse::<Size>().is_err());
    assert_eq!("FIT".parse::<ContentMode>(), Ok(ContentMode::Fit));
    assert!("stretch".parse::<ContentMode>().is_err());
  }
}
