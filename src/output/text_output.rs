// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/text_output.rs - 文本结果输出
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
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Classification, LabeledBox},
  output::Render,
};

#[derive(Error, Debug)]
pub enum TextOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 输出结果文本；`text:` 写到标准输出，`text:///path` 写入文件
pub struct TextOutput {
  path: Option<PathBuf>,
}

impl FromUrlWithScheme for TextOutput {
  const SCHEME: &'static str = "text";
}

impl FromUrl for TextOutput {
  type Error = TextOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(TextOutputError::SchemeMismatch);
    }
    let path = match uri.path() {
      "" | "/" | "-" => None,
      path => Some(PathBuf::from(path)),
    };
    Ok(TextOutput { path })
  }
}

impl TextOutput {
  pub fn stdout() -> Self {
    Self { path: None }
  }

  pub fn file(path: impl Into<PathBuf>) -> Self {
    Self {
      path: Some(path.into()),
    }
  }

  fn emit(&self, lines: &[&str]) -> Result<(), TextOutputError> {
    match &self.path {
      Some(path) => {
        let mut content = lines.join("\n");
        content.push('\n');
        std::fs::write(path, content)?;
        info!("结果已写入: {}", path.display());
      }
      None => {
        for line in lines {
          println!("{}", line);
        }
      }
    }
    Ok(())
  }
}

impl Render<RgbImage, Classification> for TextOutput {
  type Error = TextOutputError;

  fn render_result(&self, _frame: &RgbImage, result: &Classification) -> Result<(), Self::Error> {
    self.emit(&[&result.label])
  }
}

impl Render<RgbImage, Vec<LabeledBox>> for TextOutput {
  type Error = TextOutputError;

  fn render_result(&self, _frame: &RgbImage, result: &Vec<LabeledBox>) -> Result<(), Self::Error> {
    let lines: Vec<&str> = result.iter().map(|b| b.text.as_str()).collect();
    self.emit(&lines)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stdout_when_path_is_empty() {
    let url = Url::parse("text:").unwrap();
    assert!(TextOutput::from_url(&url).unwrap().path.is_none());
  }

  #[test]
  fn writes_classification_label() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result.txt");
    let output = TextOutput::file(&path);
    let result = Classification {
      index: Some(1),
      label: "human".to_string(),
      score: Some(0.7),
    };
    output.render_result(&RgbImage::new(1, 1), &result).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "human\n");
  }
}
