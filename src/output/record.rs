// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/record.rs - 结果记录
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

use std::path::PathBuf;

use image::RgbImage;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Classification, LabeledBox},
  output::Render,
};

#[derive(Error, Debug)]
pub enum RecordOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 将结果以 JSON 形式写入文件
pub struct RecordOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for RecordOutput {
  const SCHEME: &'static str = "record";
}

impl FromUrl for RecordOutput {
  type Error = RecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(RecordOutputError::SchemeMismatch);
    }
    Ok(RecordOutput {
      path: PathBuf::from(uri.path()),
    })
  }
}

impl RecordOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  fn write(&self, value: Value) -> Result<(), RecordOutputError> {
    std::fs::write(&self.path, serde_json::to_string_pretty(&value)?)?;
    info!("记录已写入: {}", self.path.display());
    Ok(())
  }
}

impl Render<RgbImage, Classification> for RecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &Classification) -> Result<(), Self::Error> {
    self.write(json!({
      "width": frame.width(),
      "height": frame.height(),
      "index": result.index,
      "label": result.label,
      "score": result.score,
    }))
  }
}

impl Render<RgbImage, Vec<LabeledBox>> for RecordOutput {
  type Error = RecordOutputError;

  fn render_result(&self, frame: &RgbImage, result: &Vec<LabeledBox>) -> Result<(), Self::Error> {
    let detections: Vec<Value> = result
      .iter()
      .map(|b| json!({ "text": b.text, "bbox": b.bbox }))
      .collect();
    self.write(json!({
      "width": frame.width(),
      "height": frame.height(),
      "detections": detections,
    }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn records_detections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result.json");
    let output = RecordOutput::new(&path);
    let boxes = vec![LabeledBox {
      bbox: [1.0, 2.0, 3.0, 4.0],
      text: "unknown".to_string(),
    }];
    output.render_result(&RgbImage::new(8, 6), &boxes).unwrap();

    let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["width"], 8);
    assert_eq!(value["detections"][0]["text"], "unknown");
    assert_eq!(value["detections"][0]["bbox"][2], 3.0);
  }
}
