// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_image_file.rs - 保存叠加结果图像
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

use std::{convert::Infallible, path::Path};

use ab_glyph::FontVec;
use image::{RgbImage, imageops};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  mapper::{DisplayRect, Size},
  output::{DisplaySurface, Scene, draw::Draw},
  overlay::{OverlayPrimitive, PrimitiveId},
};

/// 每次提交时把视口内容（底图与叠加层）写入同一个图像文件
///
/// `image:///tmp/out.png?font=/usr/share/fonts/DejaVuSans.ttf`
pub struct SaveImageFileOutput {
  path: String,
  scene: Scene,
  backdrop: Option<(RgbImage, DisplayRect)>,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("无效的字体文件: {0}")]
  FontError(String),
  #[error("视口尺寸无效: {0}")]
  InvalidViewport(Size),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl From<Infallible> for SaveImageFileError {
  fn from(never: Infallible) -> Self {
    match never {}
  }
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut draw = Draw::default();
    if let Some((_, font_path)) = uri.query_pairs().find(|(k, _)| k == "font") {
      let bytes = std::fs::read(font_path.as_ref()).map_err(SaveImageFileError::IoError)?;
      let font =
        FontVec::try_from_vec(bytes).map_err(|e| SaveImageFileError::FontError(e.to_string()))?;
      draw = draw.with_font(font);
    } else {
      warn!("未指定字体，标签只绘制底色");
    }

    Ok(Self::new(crate::url_path(uri), draw))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<String>, draw: Draw) -> Self {
    Self {
      path: path.into(),
      scene: Scene::default(),
      backdrop: None,
      draw,
    }
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  /// 按视口尺寸生成画布：黑色背景，底图放在其显示区域内，最后绘制叠加层
  pub fn rasterize(&self) -> Result<RgbImage, SaveImageFileError> {
    let viewport = self.scene.viewport();
    if viewport.is_degenerate() {
      return Err(SaveImageFileError::InvalidViewport(viewport));
    }

    let mut canvas = RgbImage::new(viewport.width.round() as u32, viewport.height.round() as u32);
    if let Some((image, area)) = self.backdrop.as_ref() {
      imageops::overlay(
        &mut canvas,
        image,
        area.x.round() as i64,
        area.y.round() as i64,
      );
    }
    self.draw.draw_primitives(&mut canvas, self.scene.visible());
    Ok(canvas)
  }

  fn save_image(&self, image: RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    info!("保存图像到文件: {}", self.path);

    Ok(())
  }
}

impl DisplaySurface for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn remove_primitive(&mut self, id: PrimitiveId) {
    self.scene.remove_primitive(id);
  }

  fn add_primitive(&mut self, primitive: OverlayPrimitive) {
    self.scene.add_primitive(primitive);
  }

  fn present(&mut self, status: &str) -> Result<(), Self::Error> {
    self.scene.present(status)?;
    let image = self.rasterize()?;
    self.save_image(image)
  }

  fn set_viewport(&mut self, viewport: Size) {
    self.scene.set_viewport(viewport);
  }

  fn show_frame(&mut self, frame: &Frame, area: DisplayRect) -> Result<(), Self::Error> {
    let width = area.width.round() as u32;
    let height = area.height.round() as u32;
    if width == 0 || height == 0 {
      self.backdrop = None;
      return Ok(());
    }
    let image = frame.to_rgb_image();
    let image = if image.dimensions() == (width, height) {
      image
    } else {
      imageops::resize(&image, width, height, imageops::FilterType::Triangle)
    };
    self.backdrop = Some((image, area));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir()
      .join(format!("kanjian-save-{}-{}", std::process::id(), fastrand::u32(..)))
      .join(name)
  }

  #[test]
  fn backdrop_is_letterboxed_into_viewport() {
    let mut output = SaveImageFileOutput::new("unused.png", Draw::default());
    output.set_viewport(Size::new(20.0, 10.0));
    let frame = Frame::from(RgbImage::from_pixel(4, 4, Rgb([0, 200, 0])));
    output
      .show_frame(&frame, DisplayRect::new(5.0, 0.0, 10.0, 10.0))
      .unwrap();

    let canvas = output.rasterize().unwrap();
    assert_eq!(canvas.dimensions(), (20, 10));
    assert_eq!(canvas.get_pixel(0, 5), &Rgb([0, 0, 0]));
    assert_eq!(canvas.get_pixel(10, 5), &Rgb([0, 200, 0]));
    assert_eq!(canvas.get_pixel(19, 5), &Rgb([0, 0, 0]));
  }

  #[test]
  fn present_without_viewport_fails() {
    let mut output = SaveImageFileOutput::new("unused.png", Draw::default());
    assert!(matches!(
      output.present(""),
      Err(SaveImageFileError::InvalidViewport(_))
    ));
  }

  #[test]
  fn present_writes_file() {
    let path = temp_path("out.png");
    let mut output = SaveImageFileOutput::new(path.to_string_lossy(), Draw::default());
    output.set_viewport(Size::new(8.0, 8.0));
    output.add_primitive(OverlayPrimitive::Box {
      id: 0,
      rect: DisplayRect::new(1.0, 1.0, 5.0, 5.0),
    });
    output.present("cat (0.90)").unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (8, 8));
    assert_eq!(saved.get_pixel(1, 3), &Rgb([255, 0, 0]));
    if let Some(dir) = path.parent() {
      let _ = std::fs::remove_dir_all(dir);
    }
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
