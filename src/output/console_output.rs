// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/console_output.rs - 控制台输出
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

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  mapper::Size,
  output::{DisplaySurface, OutputError, Scene},
  overlay::{OverlayPrimitive, PrimitiveId},
};

/// 每次提交时把状态文字打印到日志
#[derive(Debug, Default)]
pub struct ConsoleOutput {
  scene: Scene,
}

impl ConsoleOutput {
  pub fn scene(&self) -> &Scene {
    &self.scene
  }
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(format!(
        "期望输出方案 '{}', 实际输出方案 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Ok(Self::default())
  }
}

impl DisplaySurface for ConsoleOutput {
  type Error = Infallible;

  fn remove_primitive(&mut self, id: PrimitiveId) {
    self.scene.remove_primitive(id);
  }

  fn add_primitive(&mut self, primitive: OverlayPrimitive) {
    self.scene.add_primitive(primitive);
  }

  fn present(&mut self, status: &str) -> Result<(), Self::Error> {
    self.scene.present(status)?;
    info!(
      "[{}] {} 个标注: {}",
      self.scene.presentations(),
      self.scene.visible().len() / 2,
      status
    );
    Ok(())
  }

  fn set_viewport(&mut self, viewport: Size) {
    self.scene.set_viewport(viewport);
  }
}
