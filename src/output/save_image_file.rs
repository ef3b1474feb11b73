// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::Path;

use image::RgbImage;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Classification, LabeledBox},
  output::{
    Render,
    draw::{Draw, DrawError},
  },
  query_value,
};

pub struct SaveImageFileOutput {
  path: String,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("字体错误: {0}")]
  DrawError(#[from] DrawError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
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
    if let Some(font) = query_value::<String>(uri, "font") {
      draw = draw.with_font_file(font)?;
    }

    Ok(SaveImageFileOutput {
      path: uri.path().to_string(),
      draw,
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<String>, draw: Draw) -> Self {
    Self {
      path: path.into(),
      draw,
    }
  }

  fn save_image(&self, image: RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
      }
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    warn!("保存图像到文件: {}", self.path);

    Ok(())
  }
}

impl Render<RgbImage, Vec<LabeledBox>> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbImage, result: &Vec<LabeledBox>) -> Result<(), Self::Error> {
    let image = self.draw.draw_detections(frame, result);
    self.save_image(image)
  }
}

impl Render<RgbImage, Classification> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbImage, result: &Classification) -> Result<(), Self::Error> {
    let image = self.draw.draw_caption(frame, &result.label);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn saves_annotated_copy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/out.png");
    let output = SaveImageFileOutput::new(path.to_string_lossy(), Draw::default());

    let frame = RgbImage::from_pixel(32, 32, Rgb([200, 200, 200]));
    let boxes = vec![LabeledBox {
      bbox: [2.0, 2.0, 20.0, 20.0],
      text: "horse, 91%".to_string(),
    }];
    output.render_result(&frame, &boxes).unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    // 左下角，避开上沿的标签文字
    assert_eq!(saved.get_pixel(2, 19), &Rgb([0, 255, 0]));
    assert_eq!(frame.get_pixel(2, 19), &Rgb([200, 200, 200]));
  }

  #[test]
  fn saves_captioned_classification() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caption.png");
    let output = SaveImageFileOutput::new(path.to_string_lossy(), Draw::default());

    let frame = RgbImage::from_pixel(224, 224, Rgb([200, 200, 200]));
    let result = Classification {
      index: Some(1),
      label: "human".to_string(),
      score: Some(0.7),
    };
    output.render_result(&frame, &result).unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_ne!(saved, frame);
  }

  #[test]
  fn scheme_is_checked() {
    let url = Url::parse("text:///tmp/out.png").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
