// 该文件是 Kanjian （看见） 项目的一部分。
// src/label.rs - 标签列表
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

use std::{
  io::BufRead,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, error};

/// 索引越界或缺少类别时使用的占位标签
pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取标签文件 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("读取标签失败: {0}")]
  Read(#[from] std::io::Error),
}

/// 按类别索引排列的标签，每行一个
///
/// 行号与模型输出的类别索引一一对应，这一对应关系由模型提供方保证。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelList {
  labels: Box<[String]>,
}

impl LabelList {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| {
      error!("打开标签文件失败: {}: {}", path.display(), source);
      LabelError::Io {
        path: path.to_path_buf(),
        source,
      }
    })?;
    let labels = Self::from_reader(std::io::BufReader::new(file))?;
    debug!("从 {} 读取 {} 个标签", path.display(), labels.len());
    Ok(labels)
  }

  pub fn from_reader(reader: impl BufRead) -> Result<Self, LabelError> {
    let mut labels = reader
      .lines()
      .map(|line| line.map(|l| l.trim_end_matches('\r').to_string()))
      .collect::<Result<Vec<_>, _>>()?;
    // 文件末尾的空行不是标签
    while labels.last().is_some_and(|l| l.is_empty()) {
      labels.pop();
    }
    Ok(Self {
      labels: labels.into_boxed_slice(),
    })
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  /// 查找标签，索引缺失或越界时返回 [`UNKNOWN_LABEL`]
  pub fn get_or_unknown(&self, index: Option<usize>) -> &str {
    index
      .and_then(|i| self.get(i))
      .unwrap_or(UNKNOWN_LABEL)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl<S: Into<String>> FromIterator<S> for LabelList {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}
