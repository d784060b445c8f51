// 该文件是 Kanjian （看见） 项目的一部分。
// src/overlay.rs - 叠加层整体替换
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

use tracing::debug;

use crate::{
  mapper::{DisplayRect, Point},
  output::DisplaySurface,
};

pub type PrimitiveId = u64;

/// 单个可绘制元素
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayPrimitive {
  /// 矩形边框
  Box { id: PrimitiveId, rect: DisplayRect },
  /// 文字标签，`origin` 为左上角，`height` 为标签条高度
  Label {
    id: PrimitiveId,
    origin: Point,
    height: f32,
    text: String,
  },
}

impl OverlayPrimitive {
  pub fn id(&self) -> PrimitiveId {
    match self {
      OverlayPrimitive::Box { id, .. } | OverlayPrimitive::Label { id, .. } => *id,
    }
  }
}

/// 一个检测结果在显示坐标下的绘制内容
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayEntry {
  pub rect: DisplayRect,
  pub label_origin: Point,
  pub label_height: f32,
  pub text: String,
}

/// 当前显示中的叠加层
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OverlaySet {
  pub generation: u64,
  pub primitives: Vec<OverlayPrimitive>,
}

impl OverlaySet {
  pub fn is_empty(&self) -> bool {
    self.primitives.is_empty()
  }

  pub fn ids(&self) -> impl Iterator<Item = PrimitiveId> + '_ {
    self.primitives.iter().map(OverlayPrimitive::id)
  }
}

/// 每个周期整体替换叠加层：先移除上一周期的全部元素，再按顺序添加新元素，
/// 最后一次性提交给显示表面。
pub struct OverlayReconciler<S> {
  surface: S,
  current: OverlaySet,
  next_id: PrimitiveId,
}

impl<S: DisplaySurface> OverlayReconciler<S> {
  pub fn new(surface: S) -> Self {
    Self {
      surface,
      current: OverlaySet::default(),
      next_id: 0,
    }
  }

  pub fn current(&self) -> &OverlaySet {
    &self.current
  }

  pub fn surface(&self) -> &S {
    &self.surface
  }

  pub fn surface_mut(&mut self) -> &mut S {
    &mut self.surface
  }

  pub fn into_surface(self) -> S {
    self.surface
  }

  fn allocate_id(&mut self) -> PrimitiveId {
    let id = self.next_id;
    self.next_id += 1;
    id
  }

  pub fn render(&mut self, entries: &[OverlayEntry], status: &str) -> Result<&OverlaySet, S::Error> {
    for id in self.current.ids() {
      self.surface.remove_primitive(id);
    }

    let mut primitives = Vec::with_capacity(entries.len() * 2);
    for entry in entries {
      let rect = OverlayPrimitive::Box {
        id: self.allocate_id(),
        rect: entry.rect,
      };
      let label = OverlayPrimitive::Label {
        id: self.allocate_id(),
        origin: entry.label_origin,
        height: entry.label_height,
        text: entry.text.clone(),
      };
      self.surface.add_primitive(rect.clone());
      self.surface.add_primitive(label.clone());
      primitives.extend([rect, label]);
    }

    self.current = OverlaySet {
      generation: self.current.generation + 1,
      primitives,
    };
    debug!(
      "叠加层第 {} 代: {} 个元素",
      self.current.generation,
      self.current.primitives.len()
    );

    self.surface.present(status)?;
    Ok(&self.current)
  }
}
