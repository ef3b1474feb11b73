// 该文件是 Kanjian （看见） 项目的一部分。
// src/app.rs - 界面适配层：选图、点击推理、展示结果
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

use std::{fmt::Display, sync::Arc};

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};

use crate::{
  frame::NhwcTensor,
  input::decode_image,
  model::{DetectResult, ImageClassifier, InferenceError, LabeledBox, Model, ObjectDetector},
  output::draw::Draw,
  session::{Acquire, Session, SessionError},
};

/// 选图后提示用户点击图片
pub const DETECT_PROMPT: &str = "点击图片开始检测";
pub const NOTHING_DETECTED: &str = "未检测到物体";

/// 展示给用户的错误，界面保持可用，可以重试
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScreenError {
  #[error("请先选择一张图片")]
  NoImage,
  #[error("无法加载图像: {0}")]
  LoadImage(String),
  #[error("模型或标签无法加载，请重试: {0}")]
  Assets(String),
  #[error("推理失败，请换一张图片重试: {0}")]
  Inference(String),
}

impl<E: Display> From<SessionError<E>> for ScreenError {
  fn from(err: SessionError<E>) -> Self {
    ScreenError::Assets(err.into_inner().to_string())
  }
}

impl From<InferenceError> for ScreenError {
  fn from(err: InferenceError) -> Self {
    ScreenError::Inference(err.to_string())
  }
}

fn load_bytes(bytes: &[u8]) -> Result<RgbImage, ScreenError> {
  decode_image(bytes).map_err(|e| {
    error!("图像解码失败: {}", e);
    ScreenError::LoadImage(e.to_string())
  })
}

#[cfg(feature = "read_image_file")]
fn load_file(path: &std::path::Path) -> Result<RgbImage, ScreenError> {
  crate::input::ImageFileInput::from_path(path)
    .map_err(|e| {
      error!("读取图像失败: {}: {}", path.display(), e);
      ScreenError::LoadImage(e.to_string())
    })?
    .into_image()
    .ok_or_else(|| ScreenError::LoadImage(path.display().to_string()))
}

/// 分类界面：一个选图按钮、一个可点击的图片、一行结果文本
pub struct ClassifyScreen<L: Acquire> {
  session: Arc<Session<L>>,
  selected: Option<RgbImage>,
  result_text: String,
}

impl<L, M> ClassifyScreen<L>
where
  L: Acquire<Resource = ImageClassifier<M>>,
  L::Error: Display,
  M: Model<Input = NhwcTensor, Output = Vec<f32>>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(session: Arc<Session<L>>) -> Self {
    Self {
      session,
      selected: None,
      result_text: String::new(),
    }
  }

  pub fn result_text(&self) -> &str {
    &self.result_text
  }

  pub fn selected_image(&self) -> Option<&RgbImage> {
    self.selected.as_ref()
  }

  /// 选中新图像并清空上一次的结果
  pub fn select_image(&mut self, image: RgbImage) {
    self.result_text.clear();
    self.selected = Some(image);
  }

  pub fn pick_image_bytes(&mut self, bytes: &[u8]) -> Result<(), ScreenError> {
    let image = self.report(load_bytes(bytes))?;
    self.select_image(image);
    Ok(())
  }

  #[cfg(feature = "read_image_file")]
  pub fn pick_image_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<(), ScreenError> {
    let image = self.report(load_file(path.as_ref()))?;
    self.select_image(image);
    Ok(())
  }

  /// 点击图片：对当前图像分类并更新结果文本
  pub fn tap(&mut self) -> Result<&str, ScreenError> {
    let result = self.classify_selected();
    let label = self.report(result)?;
    info!("分类结果: {}", label);
    self.result_text = label;
    Ok(&self.result_text)
  }

  fn classify_selected(&self) -> Result<String, ScreenError> {
    let image = self.selected.as_ref().ok_or(ScreenError::NoImage)?;
    let classifier = self.session.get()?;
    Ok(classifier.classify(image)?.label)
  }

  fn report<T>(&mut self, result: Result<T, ScreenError>) -> Result<T, ScreenError> {
    result.inspect_err(|e| self.result_text = e.to_string())
  }
}

/// 检测界面：选图后点击图片，结果框直接绘制在图片上
pub struct DetectScreen<L: Acquire> {
  session: Arc<Session<L>>,
  draw: Draw,
  selected: Option<RgbImage>,
  displayed: Option<RgbImage>,
  boxes: Vec<LabeledBox>,
  status_text: String,
}

impl<L, M> DetectScreen<L>
where
  L: Acquire<Resource = ObjectDetector<M>>,
  L::Error: Display,
  M: Model<Input = RgbImage, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(session: Arc<Session<L>>, draw: Draw) -> Self {
    Self {
      session,
      draw,
      selected: None,
      displayed: None,
      boxes: Vec::new(),
      status_text: String::new(),
    }
  }

  pub fn status_text(&self) -> &str {
    &self.status_text
  }

  /// 当前展示的图像：检测后为标注副本，否则为原图
  pub fn displayed_image(&self) -> Option<&RgbImage> {
    self.displayed.as_ref().or(self.selected.as_ref())
  }

  pub fn selected_image(&self) -> Option<&RgbImage> {
    self.selected.as_ref()
  }

  /// 最近一次检测的结果
  pub fn boxes(&self) -> &[LabeledBox] {
    &self.boxes
  }

  pub fn select_image(&mut self, image: RgbImage) {
    self.status_text = DETECT_PROMPT.to_string();
    self.displayed = None;
    self.boxes.clear();
    self.selected = Some(image);
  }

  pub fn pick_image_bytes(&mut self, bytes: &[u8]) -> Result<(), ScreenError> {
    let image = self.report(load_bytes(bytes))?;
    self.select_image(image);
    Ok(())
  }

  #[cfg(feature = "read_image_file")]
  pub fn pick_image_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<(), ScreenError> {
    let image = self.report(load_file(path.as_ref()))?;
    self.select_image(image);
    Ok(())
  }

  /// 点击图片：检测并把标注后的副本作为展示图像
  pub fn tap(&mut self) -> Result<&[LabeledBox], ScreenError> {
    let result = self.detect_selected();
    let (boxes, annotated) = self.report(result)?;
    info!("检测到 {} 个物体", boxes.len());

    self.status_text = if boxes.is_empty() {
      NOTHING_DETECTED.to_string()
    } else {
      boxes
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
    };
    self.displayed = Some(annotated);
    self.boxes = boxes;
    Ok(&self.boxes)
  }

  fn detect_selected(&self) -> Result<(Vec<LabeledBox>, RgbImage), ScreenError> {
    let image = self.selected.as_ref().ok_or(ScreenError::NoImage)?;
    let detector = self.session.get()?;
    let boxes = detector.detect(image)?;
    let annotated = self.draw.draw_detections(image, &boxes);
    Ok((boxes, annotated))
  }

  fn report<T>(&mut self, result: Result<T, ScreenError>) -> Result<T, ScreenError> {
    result.inspect_err(|e| self.status_text = e.to_string())
  }
}
