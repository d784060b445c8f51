// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/scene.rs - 内存中的叠加层场景
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

use crate::{
  mapper::Size,
  output::DisplaySurface,
  overlay::{OverlayPrimitive, PrimitiveId},
};

/// 暂存区与可见区分离的场景，其他输出在此基础上绘制
#[derive(Debug, Clone, Default)]
pub struct Scene {
  staged: Vec<OverlayPrimitive>,
  visible: Vec<OverlayPrimitive>,
  status: String,
  presentations: u64,
  viewport: Size,
}

impl Scene {
  /// 已提交、对观看者可见的元素
  pub fn visible(&self) -> &[OverlayPrimitive] {
    &self.visible
  }

  pub fn status(&self) -> &str {
    &self.status
  }

  pub fn presentations(&self) -> u64 {
    self.presentations
  }

  pub fn viewport(&self) -> Size {
    self.viewport
  }
}

impl DisplaySurface for Scene {
  type Error = Infallible;

  fn remove_primitive(&mut self, id: PrimitiveId) {
    self.staged.retain(|p| p.id() != id);
  }

  fn add_primitive(&mut self, primitive: OverlayPrimitive) {
    self.staged.push(primitive);
  }

  fn present(&mut self, status: &str) -> Result<(), Self::Error> {
    self.visible = self.staged.clone();
    self.status = status.to_string();
    self.presentations += 1;
    Ok(())
  }

  fn set_viewport(&mut self, viewport: Size) {
    self.viewport = viewport;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mapper::DisplayRect;

  #[test]
  fn staged_changes_are_invisible_until_present() {
    let mut scene = Scene::default();
    scene.add_primitive(OverlayPrimitive::Box {
      id: 7,
      rect: DisplayRect::new(0.0, 0.0, 1.0, 1.0),
    });
    assert!(scene.visible().is_empty());
    scene.present("one").unwrap();
    assert_eq!(scene.visible().len(), 1);

    scene.remove_primitive(7);
    assert_eq!(scene.visible().len(), 1);
    scene.present("none").unwrap();
    assert!(scene.visible().is_empty());
    assert_eq!(scene.presentations(), 2);
  }
}
