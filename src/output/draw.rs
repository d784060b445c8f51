// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 叠加层光栅化
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};

use crate::overlay::OverlayPrimitive;

// 文本渲染常量
const LABEL_FONT_RATIO: f32 = 0.8; // 字号相对标签条高度
const LABEL_CHAR_RATIO: f32 = 0.5; // 每字符平均宽度相对字号（粗略估计）
const LABEL_TEXT_PADDING: i32 = 2;
const BOX_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const LABEL_BACKGROUND: [u8; 3] = [0, 0, 0];
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Default)]
pub struct Draw {
  font: Option<FontVec>,
}

impl Draw {
  /// 没有字体时只绘制标签底色
  pub fn with_font(mut self, font: FontVec) -> Self {
    self.font = Some(font);
    self
  }

  fn draw_box(&self, image: &mut RgbImage, x: f32, y: f32, width: f32, height: f32) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let x_min = (x.floor() as i32).clamp(0, w - 1);
    let y_min = (y.floor() as i32).clamp(0, h - 1);
    let x_max = ((x + width).ceil() as i32).clamp(0, w - 1);
    let y_max = ((y + height).ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框加粗为 2 像素
    for thickness in 0..2 {
      let width = (x_max - x_min - 2 * thickness + 1).max(0) as u32;
      let height = (y_max - y_min - 2 * thickness + 1).max(0) as u32;
      if width == 0 || height == 0 {
        break;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width, height);
      draw_hollow_rect_mut(image, rect, Rgb(BOX_COLOR));
    }
  }

  fn draw_label(&self, image: &mut RgbImage, x: f32, y: f32, height: f32, text: &str) {
    let label_x = (x.floor() as i32).max(0);
    let label_y = (y.floor() as i32).max(0);
    if label_x >= image.width() as i32 || label_y >= image.height() as i32 {
      return;
    }

    let font_size = (height * LABEL_FONT_RATIO).max(1.0);
    let text_width = (text.chars().count() as f32 * font_size * LABEL_CHAR_RATIO).ceil() as u32;
    let label_width = text_width.min(image.width() - label_x as u32);
    let label_height = (height.round().max(0.0) as u32).min(image.height() - label_y as u32);
    if label_width == 0 || label_height == 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width, label_height);
    draw_filled_rect_mut(image, rect, Rgb(LABEL_BACKGROUND));

    if let Some(font) = self.font.as_ref() {
      draw_text_mut(
        image,
        Rgb(TEXT_COLOR),
        label_x + LABEL_TEXT_PADDING,
        label_y + LABEL_TEXT_PADDING / 2,
        PxScale::from(font_size),
        font,
        text,
      );
    }
  }

  /// 按顺序绘制所有元素
  pub fn draw_primitives(&self, image: &mut RgbImage, primitives: &[OverlayPrimitive]) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    for primitive in primitives {
      match primitive {
        OverlayPrimitive::Box { rect, .. } => {
          self.draw_box(image, rect.x, rect.y, rect.width, rect.height)
        }
        OverlayPrimitive::Label {
          origin,
          height,
          text,
          ..
        } => self.draw_label(image, origin.x, origin.y, *height, text),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mapper::{DisplayRect, Point};

  #[test]
  fn draws_box_outline_and_label_background() {
    let mut image = RgbImage::new(100, 100);
    let primitives = [
      OverlayPrimitive::Box {
        id: 0,
        rect: DisplayRect::new(10.0, 30.0, 40.0, 40.0),
      },
      OverlayPrimitive::Label {
        id: 1,
        origin: Point { x: 10.0, y: 10.0 },
        height: 20.0,
        text: "cat (0.91)".to_string(),
      },
    ];
    image.put_pixel(30, 50, Rgb([9, 9, 9]));
    Draw::default().draw_primitives(&mut image, &primitives);

    assert_eq!(image.get_pixel(10, 50), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(11, 50), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(50, 50), &Rgb(BOX_COLOR));
    // 框内不填充
    assert_eq!(image.get_pixel(30, 50), &Rgb([9, 9, 9]));
    assert_eq!(image.get_pixel(12, 12), &Rgb(LABEL_BACKGROUND));
  }

  #[test]
  fn out_of_bounds_primitives_are_ignored() {
    let mut image = RgbImage::from_pixel(10, 10, Rgb([1, 1, 1]));
    let primitives = [
      OverlayPrimitive::Box {
        id: 0,
        rect: DisplayRect::new(20.0, 20.0, 5.0, 5.0),
      },
      OverlayPrimitive::Label {
        id: 1,
        origin: Point { x: 50.0, y: 0.0 },
        height: 20.0,
        text: "x".to_string(),
      },
    ];
    Draw::default().draw_primitives(&mut image, &primitives);
    assert!(image.pixels().all(|p| *p == Rgb([1, 1, 1])));
  }

  #[test]
  fn label_strip_follows_label_height() {
    let mut image = RgbImage::from_pixel(100, 100, Rgb([7, 7, 7]));
    let primitives = [OverlayPrimitive::Label {
      id: 0,
      origin: Point { x: 0.0, y: 40.0 },
      height: 30.0,
      text: "dog (0.50)".to_string(),
    }];
    Draw::default().draw_primitives(&mut image, &primitives);

    assert_eq!(image.get_pixel(1, 40), &Rgb(LABEL_BACKGROUND));
    assert_eq!(image.get_pixel(1, 69), &Rgb(LABEL_BACKGROUND));
    assert_eq!(image.get_pixel(1, 70), &Rgb([7, 7, 7]));
    assert_eq!(image.get_pixel(1, 39), &Rgb([7, 7, 7]));
  }
}
