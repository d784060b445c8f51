// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - 帧定义
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

use thiserror::Error;

use crate::mapper::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
  Rgb8,
  Bgr8,
  Rgba8,
  Bgra8,
}

impl PixelFormat {
  pub fn bytes_per_pixel(&self) -> usize {
    match self {
      PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
      PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
    }
  }

  // R、G、B 三个通道在像素内的偏移
  fn rgb_offsets(&self) -> [usize; 3] {
    match self {
      PixelFormat::Rgb8 | PixelFormat::Rgba8 => [0, 1, 2],
      PixelFormat::Bgr8 | PixelFormat::Bgra8 => [2, 1, 0],
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("帧尺寸为空: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("行跨度过小: 行跨度 {stride}, 至少需要 {minimum}")]
  StrideTooSmall { stride: usize, minimum: usize },
  #[error("数据长度不匹配: 期望至少 {expected} 字节, 实际 {actual} 字节")]
  BufferTooSmall { expected: usize, actual: usize },
}

/// 一帧原始图像
///
/// 帧只在一次推理期间存在，解码后即被丢弃。
#[derive(Debug, Clone)]
pub struct Frame {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  stride: usize,
  format: PixelFormat,
}

impl Frame {
  /// 紧密排列（无行填充）的帧
  pub fn new(
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
  ) -> Result<Self, FrameError> {
    let stride = width as usize * format.bytes_per_pixel();
    Self::with_stride(data, width, height, stride, format)
  }

  pub fn with_stride(
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
  ) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyFrame { width, height });
    }

    let row_bytes = width as usize * format.bytes_per_pixel();
    if stride < row_bytes {
      return Err(FrameError::StrideTooSmall {
        stride,
        minimum: row_bytes,
      });
    }

    // 最后一行不要求带填充
    let expected = stride * (height as usize - 1) + row_bytes;
    if data.len() < expected {
      return Err(FrameError::BufferTooSmall {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
      stride,
      format,
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn size(&self) -> Size {
    Size::new(self.width as f32, self.height as f32)
  }

  pub fn row(&self, y: u32) -> &[u8] {
    let start = y as usize * self.stride;
    let len = self.width as usize * self.format.bytes_per_pixel();
    &self.data[start..start + len]
  }

  /// 转为紧密排列的 RGB（NHWC）数据
  pub fn to_rgb(&self) -> Vec<u8> {
    let bpp = self.format.bytes_per_pixel();
    let [r, g, b] = self.format.rgb_offsets();
    let mut rgb = Vec::with_capacity(self.width as usize * self.height as usize * 3);
    for y in 0..self.height {
      for pixel in self.row(y).chunks_exact(bpp) {
        rgb.extend_from_slice(&[pixel[r], pixel[g], pixel[b]]);
      }
    }
    rgb
  }
}

#[cfg(feature = "image")]
impl From<image::RgbImage> for Frame {
  fn from(image: image::RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      data: image.into_raw().into_boxed_slice(),
      width,
      height,
      stride: width as usize * 3,
      format: PixelFormat::Rgb8,
    }
  }
}

#[cfg(feature = "image")]
impl Frame {
  pub fn to_rgb_image(&self) -> image::RgbImage {
    let rgb = self.to_rgb();
    image::ImageBuffer::from_fn(self.width, self.height, |x, y| {
      let idx = (y as usize * self.width as usize + x as usize) * 3;
      image::Rgb([rgb[idx], rgb[idx + 1], rgb[idx + 2]])
    })
  }
}
