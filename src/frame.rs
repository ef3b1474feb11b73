// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - NHWC 浮点输入张量与预处理
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

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("输入图像为空: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("目标尺寸无效: {0}")]
  InvalidSize(u32),
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 像素归一化参数，输出值为 `(byte - mean) / std`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
  pub mean: f32,
  pub std: f32,
}

impl Default for Normalization {
  fn default() -> Self {
    // 仅缩放到 [0, 1]，不减均值
    Self {
      mean: 0.0,
      std: 255.0,
    }
  }
}

impl Normalization {
  #[inline]
  pub fn apply(&self, value: u8) -> f32 {
    (value as f32 - self.mean) / self.std
  }
}

/// 形状为 `1 x H x W x 3` 的浮点输入张量，按行优先存放 R、G、B
#[derive(Debug, Clone, PartialEq)]
pub struct NhwcTensor {
  height: usize,
  width: usize,
  data: Box<[f32]>,
}

impl NhwcTensor {
  pub fn with_shape(height: usize, width: usize) -> Self {
    Self {
      height,
      width,
      data: vec![0.0; height * width * RGB_CHANNELS].into_boxed_slice(),
    }
  }

  pub fn from_vec(height: usize, width: usize, data: Vec<f32>) -> Result<Self, FrameError> {
    let expected = height * width * RGB_CHANNELS;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }
    Ok(Self {
      height,
      width,
      data: data.into_boxed_slice(),
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// `[N, H, W, C]`
  pub fn shape(&self) -> [usize; 4] {
    [1, self.height, self.width, self.channels()]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 以本机字节序输出张量内容
  pub fn to_ne_bytes(&self) -> Vec<u8> {
    self.data.iter().flat_map(|v| v.to_ne_bytes()).collect()
  }

  /// 按 NHWC 顺序写入整幅图像，图像尺寸须与张量一致
  pub fn fill_from(&mut self, image: &RgbImage, norm: Normalization) -> Result<(), FrameError> {
    let (width, height) = image.dimensions();
    let expected = self.data.len();
    let actual = (width as usize) * (height as usize) * RGB_CHANNELS;
    if height as usize != self.height || width as usize != self.width {
      return Err(FrameError::LengthMismatch { expected, actual });
    }

    // 行优先，逐像素 R、G、B
    for (dst, &src) in self.data.iter_mut().zip(image.as_raw().iter()) {
      *dst = norm.apply(src);
    }
    Ok(())
  }
}

impl AsRef<[f32]> for NhwcTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

/// 将任意尺寸图像拉伸到 `size x size`（不保持宽高比）并归一化为输入张量
pub fn preprocess(
  image: &RgbImage,
  size: u32,
  norm: Normalization,
) -> Result<NhwcTensor, FrameError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(FrameError::EmptyImage(width, height));
  }
  if size == 0 {
    return Err(FrameError::InvalidSize(size));
  }

  debug!("缩放图像 {}x{} -> {}x{}", width, height, size, size);
  let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

  let mut tensor = NhwcTensor::with_shape(size as usize, size as usize);
  tensor.fill_from(&resized, norm)?;
  Ok(tensor)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn packs_rgb_row_major() {
    let mut image = RgbImage::new(2, 2);
    image.put_pixel(0, 0, Rgb([255, 0, 0]));
    image.put_pixel(1, 0, Rgb([0, 255, 0]));
    image.put_pixel(0, 1, Rgb([0, 0, 255]));
    image.put_pixel(1, 1, Rgb([51, 102, 153]));

    let mut tensor = NhwcTensor::with_shape(2, 2);
    tensor.fill_from(&image, Normalization::default()).unwrap();
    assert_eq!(tensor.shape(), [1, 2, 2, 3]);
    let expected = [
      1.0, 0.0, 0.0, //
      0.0, 1.0, 0.0, //
      0.0, 0.0, 1.0, //
      0.2, 0.4, 0.6,
    ];
    for (got, want) in tensor.as_slice().iter().zip(expected) {
      assert!((got - want).abs() < 1e-6, "{got} != {want}");
    }
  }

  #[test]
  fn mean_and_std_are_applied() {
    let norm = Normalization {
      mean: 127.5,
      std: 127.5,
    };
    assert_eq!(norm.apply(0), -1.0);
    assert_eq!(norm.apply(255), 1.0);
  }

  #[test]
  fn stretches_to_square() {
    let image = RgbImage::from_pixel(40, 10, Rgb([10, 20, 30]));
    let tensor = preprocess(&image, 8, Normalization::default()).unwrap();
    assert_eq!(tensor.height(), 8);
    assert_eq!(tensor.width(), 8);
    assert_eq!(tensor.as_slice().len(), 8 * 8 * 3);
  }

  #[test]
  fn preprocessing_is_deterministic() {
    let image = RgbImage::from_fn(31, 17, |x, y| Rgb([(x * 7) as u8, (y * 13) as u8, (x ^ y) as u8]));
    let a = preprocess(&image, 16, Normalization::default()).unwrap();
    let b = preprocess(&image, 16, Normalization::default()).unwrap();
    assert_eq!(a.to_ne_bytes(), b.to_ne_bytes());
  }

  #[test]
  fn native_byte_order() {
    let tensor = NhwcTensor::from_vec(1, 1, vec![1.0, 0.5, 0.25]).unwrap();
    let bytes = tensor.to_ne_bytes();
    assert_eq!(bytes.len(), 12);
    assert_eq!(&bytes[0..4], &1.0f32.to_ne_bytes());
    assert_eq!(&bytes[8..12], &0.25f32.to_ne_bytes());
  }

  #[test]
  fn rejects_empty_input() {
    let image = RgbImage::new(0, 5);
    assert_eq!(
      preprocess(&image, 4, Normalization::default()),
      Err(FrameError::EmptyImage(0, 5))
    );
    let image = RgbImage::new(3, 3);
    assert_eq!(
      preprocess(&image, 0, Normalization::default()),
      Err(FrameError::InvalidSize(0))
    );
  }
}
