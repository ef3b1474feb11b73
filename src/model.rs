// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 模型
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

use crate::frame::FrameError;

/// 推理能力的统一抽象
///
/// 推理引擎（分类得分或检测框）与完整的分类/检测流水线都实现该 trait，
/// 测试中可以用确定性的桩实现替换真实模型。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

impl<M: Model + ?Sized> Model for Box<M> {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
  pub label: String,
  pub score: f32,
}

impl Category {
  pub fn new(label: impl Into<String>, score: f32) -> Self {
    Self {
      label: label.into(),
      score,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub bbox: [f32; 4], // [left, top, right, bottom]，原图像素坐标
  pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("预处理失败: {0}")]
  Preprocess(#[from] FrameError),
  #[error("模型推理失败: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl InferenceError {
  pub fn engine<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
    InferenceError::Engine(Box::new(err))
  }
}

mod classifier;
pub use self::classifier::{Classification, ClassifierConfig, ImageClassifier, argmax};

mod detector;
pub use self::detector::{
  DetectorConfig, LabeledBox, ObjectDetector, decode_detections, format_label,
};

#[cfg(feature = "tract")]
mod tract;
#[cfg(feature = "tract")]
pub use self::tract::{TractClassifier, TractDetector, TractModelError};
