// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

//! 把每次提交的叠加层写成一个 JSON 文件，按日期分目录存放：
//!
//! `folder:///var/lib/kanjian/records?always`
//!
//! 生成 `records/2026/03/14/08-30-15-0001.json`。默认跳过没有目标的提交，
//! 带上 `always` 参数时全部记录。

use std::{convert::Infallible, path::PathBuf};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  mapper::Size,
  output::{DisplaySurface, Scene},
  overlay::{OverlayPrimitive, PrimitiveId},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

impl From<Infallible> for DirectoryRecordOutputError {
  fn from(never: Infallible) -> Self {
    match never {}
  }
}

#[derive(Debug, Serialize)]
struct BoxRecord<'a> {
  label: &'a str,
  x: f32,
  y: f32,
  width: f32,
  height: f32,
}

#[derive(Debug, Serialize)]
struct PresentRecord<'a> {
  timestamp: String,
  /// 本输出累计提交的次数，含被跳过的空提交
  presentation: u64,
  status: &'a str,
  viewport: [f32; 2],
  boxes: Vec<BoxRecord<'a>>,
}

/// 叠加层按 框、标签 成对出现，标签文字作为框的名称
fn pair_boxes(primitives: &[OverlayPrimitive]) -> Vec<BoxRecord<'_>> {
  primitives
    .chunks(2)
    .filter_map(|pair| match pair {
      [
        OverlayPrimitive::Box { rect, .. },
        OverlayPrimitive::Label { text, .. },
      ] => Some(BoxRecord {
        label: text,
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
      }),
      _ => None,
    })
    .collect()
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  scene: Scene,
  frame_counter: u16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    Ok(Self::new(crate::url_path(uri), always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, always: bool) -> Self {
    Self {
      directory: directory.into(),
      scene: Scene::default(),
      frame_counter: 0,
      always,
    }
  }

  fn frame_id(&mut self) -> u16 {
    self.frame_counter = self.frame_counter.wrapping_add(1);
    self.frame_counter
  }

  fn record_path(&mut self, now: &DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.json",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl DisplaySurface for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn remove_primitive(&mut self, id: PrimitiveId) {
    self.scene.remove_primitive(id);
  }

  fn add_primitive(&mut self, primitive: OverlayPrimitive) {
    self.scene.add_primitive(primitive);
  }

  fn present(&mut self, status: &str) -> Result<(), Self::Error> {
    self.scene.present(status)?;
    if !self.always && self.scene.visible().is_empty() {
      return Ok(());
    }

    let now = Utc::now();
    let path = self.record_path(&now)?;
    let viewport = self.scene.viewport();
    let record = PresentRecord {
      timestamp: now.to_rfc3339(),
      presentation: self.scene.presentations(),
      status,
      viewport: [viewport.width, viewport.height],
      boxes: pair_boxes(self.scene.visible()),
    };
    std::fs::write(&path, serde_json::to_vec_pretty(&record)?)?;
    debug!("记录写入 {}", path.display());
    Ok(())
  }

  fn set_viewport(&mut self, viewport: Size) {
    self.scene.set_viewport(viewport);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mapper::{DisplayRect, Point};

  fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
      "kanjian-record-{}-{}",
      std::process::id(),
      fastrand::u32(..)
    ))
  }

  fn records(dir: &std::path::Path) -> Vec<serde_json::Value> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
      let Ok(entries) = std::fs::read_dir(&dir) else {
        continue;
      };
      for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
          stack.push(path);
        } else {
          let bytes = std::fs::read(&path).unwrap();
          found.push(serde_json::from_slice(&bytes).unwrap());
        }
      }
    }
    found
  }

  fn stage_cat(output: &mut DirectoryRecordOutput) {
    output.add_primitive(OverlayPrimitive::Box {
      id: 0,
      rect: DisplayRect::new(10.0, 20.0, 30.0, 40.0),
    });
    output.add_primitive(OverlayPrimitive::Label {
      id: 1,
      origin: Point { x: 10.0, y: 0.0 },
      height: 20.0,
      text: "cat (0.91)".to_string(),
    });
  }

  #[test]
  fn writes_one_record_per_non_empty_present() {
    let dir = temp_dir();
    let mut output = DirectoryRecordOutput::new(&dir, false);
    output.set_viewport(Size::new(100.0, 100.0));

    output.present("未检测到目标").unwrap();
    assert!(records(&dir).is_empty());

    stage_cat(&mut output);
    output.present("cat (0.91)").unwrap();

    let found = records(&dir);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["status"], "cat (0.91)");
    // 第一次空提交未写文件但仍计数
    assert_eq!(found[0]["presentation"], 2);
    assert!(found[0].get("generation").is_none());
    assert_eq!(found[0]["boxes"][0]["label"], "cat (0.91)");
    assert_eq!(found[0]["boxes"][0]["width"], 30.0);
    let _ = std::fs::remove_dir_all(&dir);
  }

  #[test]
  fn always_records_empty_presents() {
    let dir = temp_dir();
    let url = Url::parse(&format!("folder://{}?always", dir.display())).unwrap();
    let mut output = DirectoryRecordOutput::from_url(&url).unwrap();
    output.present("未检测到目标").unwrap();

    let found = records(&dir);
    assert_eq!(found.len(), 1);
    assert!(found[0]["boxes"].as_array().unwrap().is_empty());
    let _ = std::fs::remove_dir_all(&dir);
  }

  #[test]
  fn unpaired_primitives_are_skipped() {
    let primitives = [OverlayPrimitive::Label {
      id: 3,
      origin: Point::default(),
      height: 20.0,
      text: "x".to_string(),
    }];
    assert!(pair_boxes(&primitives).is_empty());
  }
}
