// 该文件是 Kanjian （看见） 项目的一部分。
// src/output.rs - 显示输出
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

use std::convert::Infallible;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  mapper::{DisplayRect, Size},
  overlay::{OverlayPrimitive, PrimitiveId},
};

/// 显示表面
///
/// 增删操作只是暂存，调用 `present` 后才对观看者可见。
pub trait DisplaySurface {
  type Error;

  fn remove_primitive(&mut self, id: PrimitiveId);
  fn add_primitive(&mut self, primitive: OverlayPrimitive);
  fn present(&mut self, status: &str) -> Result<(), Self::Error>;

  /// 视口尺寸变化
  fn set_viewport(&mut self, _viewport: Size) {}

  /// 在 `area` 区域内显示底图
  fn show_frame(&mut self, _frame: &Frame, _area: DisplayRect) -> Result<(), Self::Error> {
    Ok(())
  }
}

impl<S: DisplaySurface + ?Sized> DisplaySurface for &mut S {
  type Error = S::Error;

  fn remove_primitive(&mut self, id: PrimitiveId) {
    (**self).remove_primitive(id)
  }

  fn add_primitive(&mut self, primitive: OverlayPrimitive) {
    (**self).add_primitive(primitive)
  }

  fn present(&mut self, status: &str) -> Result<(), Self::Error> {
    (**self).present(status)
  }

  fn set_viewport(&mut self, viewport: Size) {
    (**self).set_viewport(viewport)
  }

  fn show_frame(&mut self, frame: &Frame, area: DisplayRect) -> Result<(), Self::Error> {
    (**self).show_frame(frame, area)
  }
}

mod scene;
pub use self::scene::Scene;

mod console_output;
pub use self::console_output::ConsoleOutput;

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl From<Infallible> for OutputError {
  fn from(never: Infallible) -> Self {
    match never {}
  }
}

pub enum OutputWrapper {
  Console(ConsoleOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ConsoleOutput::SCHEME => Ok(OutputWrapper::Console(ConsoleOutput::from_url(url)?)),
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFileOutput(
        SaveImageFileOutput::from_url(url)?,
      )),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecordOutput(
        DirectoryRecordOutput::from_url(url)?,
      )),
      scheme => Err(OutputError::SchemeMismatch(format!(
        "不支持的输出方案 '{}'",
        scheme
      ))),
    }
  }
}

impl DisplaySurface for OutputWrapper {
  type Error = OutputError;

  fn remove_primitive(&mut self, id: PrimitiveId) {
    match self {
      OutputWrapper::Console(output) => output.remove_primitive(id),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.remove_primitive(id),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.remove_primitive(id),
    }
  }

  fn add_primitive(&mut self, primitive: OverlayPrimitive) {
    match self {
      OutputWrapper::Console(output) => output.add_primitive(primitive),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.add_primitive(primitive),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.add_primitive(primitive),
    }
  }

  fn present(&mut self, status: &str) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => output.present(status).map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        output.present(status).map_err(OutputError::from)
      }
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        output.present(status).map_err(OutputError::from)
      }
    }
  }

  fn set_viewport(&mut self, viewport: Size) {
    match self {
      OutputWrapper::Console(output) => output.set_viewport(viewport),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output.set_viewport(viewport),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output.set_viewport(viewport),
    }
  }

  fn show_frame(&mut self, frame: &Frame, area: DisplayRect) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => output.show_frame(frame, area).map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => {
        output.show_frame(frame, area).map_err(OutputError::from)
      }
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => {
        output.show_frame(frame, area).map_err(OutputError::from)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn console_scheme_is_always_available() {
    let url = Url::parse("console://").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Ok(OutputWrapper::Console(_))
    ));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtsp://localhost:8554/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(_))
    ));
  }
}
