// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/classifier.rs - 图像分类流水线
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

use image::RgbImage;
use tracing::{debug, warn};

use crate::{
  frame::{Normalization, NhwcTensor, preprocess},
  label::LabelList,
  model::{InferenceError, Model},
};

const CLASSIFIER_INPUT_SIZE: u32 = 224;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierConfig {
  pub input_size: u32,
  pub normalization: Normalization,
}

impl Default for ClassifierConfig {
  fn default() -> Self {
    Self {
      input_size: CLASSIFIER_INPUT_SIZE,
      normalization: Normalization::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
  /// 最大得分的类别索引，得分为空时为 `None`
  pub index: Option<usize>,
  pub label: String,
  pub score: Option<f32>,
}

/// 第一个取得最大值的索引；空序列返回 `None`，NaN 不会被选中
pub fn argmax(scores: &[f32]) -> Option<usize> {
  let mut best: Option<(usize, f32)> = None;
  for (idx, &score) in scores.iter().enumerate() {
    if score.is_nan() {
      continue;
    }
    if best.is_none_or(|(_, max)| score > max) {
      best = Some((idx, score));
    }
  }
  best.map(|(idx, _)| idx)
}

pub struct ImageClassifier<M> {
  engine: M,
  labels: LabelList,
  config: ClassifierConfig,
}

impl<M> ImageClassifier<M>
where
  M: Model<Input = NhwcTensor, Output = Vec<f32>>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(engine: M, labels: LabelList) -> Self {
    Self::with_config(engine, labels, ClassifierConfig::default())
  }

  pub fn with_config(engine: M, labels: LabelList, config: ClassifierConfig) -> Self {
    Self {
      engine,
      labels,
      config,
    }
  }

  pub fn labels(&self) -> &LabelList {
    &self.labels
  }

  pub fn config(&self) -> &ClassifierConfig {
    &self.config
  }

  pub fn classify(&self, image: &RgbImage) -> Result<Classification, InferenceError> {
    let tensor = preprocess(image, self.config.input_size, self.config.normalization)?;
    debug!("输入张量形状: {:?}", tensor.shape());

    let scores = self.engine.infer(&tensor).map_err(InferenceError::engine)?;
    debug!("分类得分: {:?}", scores);

    Ok(self.label_scores(&scores))
  }

  /// 将得分向量映射到标签，越界时返回占位标签
  pub fn label_scores(&self, scores: &[f32]) -> Classification {
    let index = argmax(scores);
    if scores.len() != self.labels.len() {
      warn!(
        "得分数量 {} 与标签数量 {} 不一致",
        scores.len(),
        self.labels.len()
      );
    }
    Classification {
      index,
      label: self.labels.get_or_unknown(index).to_string(),
      score: index.map(|i| scores[i]),
    }
  }
}

impl<M> Model for ImageClassifier<M>
where
  M: Model<Input = NhwcTensor, Output = Vec<f32>>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  type Input = RgbImage;
  type Output = Classification;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.classify(input)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::label::UNKNOWN_LABEL;

  struct FixedScores(Vec<f32>);

  impl Model for FixedScores {
    type Input = NhwcTensor;
    type Output = Vec<f32>;
    type Error = std::io::Error;

    fn infer(&self, input: &NhwcTensor) -> Result<Vec<f32>, std::io::Error> {
      assert_eq!(input.shape(), [1, 224, 224, 3]);
      Ok(self.0.clone())
    }
  }

  fn horse_human(scores: Vec<f32>) -> ImageClassifier<FixedScores> {
    ImageClassifier::new(FixedScores(scores), ["horse", "human"].into_iter().collect())
  }

  #[test]
  fn argmax_prefers_leftmost_maximum() {
    assert_eq!(argmax(&[0.2, 0.7]), Some(1));
    assert_eq!(argmax(&[0.5, 0.5]), Some(0));
    assert_eq!(argmax(&[0.1, 0.9, 0.9, 0.3]), Some(1));
    assert_eq!(argmax(&[-3.0, -1.0, -2.0]), Some(1));
    assert_eq!(argmax(&[]), None);
  }

  #[test]
  fn argmax_skips_nan() {
    assert_eq!(argmax(&[f32::NAN, 0.1, 0.3]), Some(2));
    assert_eq!(argmax(&[0.4, f32::NAN, 0.3]), Some(0));
  }

  #[test]
  fn classifies_human() {
    let image = RgbImage::new(300, 200);
    let result = horse_human(vec![0.2, 0.7]).classify(&image).unwrap();
    assert_eq!(result.label, "human");
    assert_eq!(result.index, Some(1));
    assert_eq!(result.score, Some(0.7));
  }

  #[test]
  fn tie_goes_to_first_label() {
    let image = RgbImage::new(10, 10);
    let result = horse_human(vec![0.5, 0.5]).classify(&image).unwrap();
    assert_eq!(result.label, "horse");
  }

  #[test]
  fn mismatched_model_yields_unknown() {
    let image = RgbImage::new(10, 10);
    let result = horse_human(vec![0.1, 0.2, 0.9]).classify(&image).unwrap();
    assert_eq!(result.index, Some(2));
    assert_eq!(result.label, UNKNOWN_LABEL);

    let result = horse_human(vec![]).classify(&image).unwrap();
    assert_eq!(result.index, None);
    assert_eq!(result.label, UNKNOWN_LABEL);
  }

  #[test]
  fn empty_image_is_a_request_error() {
    let image = RgbImage::new(0, 0);
    let err = horse_human(vec![0.2, 0.7]).classify(&image).unwrap_err();
    assert!(matches!(err, InferenceError::Preprocess(_)));
  }
}
