// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::LabeledBox;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 80.0;
const LABEL_CHAR_WIDTH: f32 = 0.55; // 每字符平均宽度与字号之比（粗略估计）
const LABEL_MIN_FONT_SIZE: f32 = 1.0;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const TEXT_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const BOX_THICKNESS: u32 = 2;

// 默认字体，随程序一同发布
static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件: {0}")]
  Io(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 文本宽度测量
pub trait TextMeasure {
  fn text_width(&self, font_size: f32, text: &str) -> f32;
}

impl TextMeasure for FontArc {
  fn text_width(&self, font_size: f32, text: &str) -> f32 {
    text_size(PxScale::from(font_size), self, text).0 as f32
  }
}

/// 没有字体时按字符数估算宽度
#[derive(Debug, Clone, Copy)]
pub struct CharWidthEstimate {
  pub ratio: f32,
}

impl Default for CharWidthEstimate {
  fn default() -> Self {
    Self {
      ratio: LABEL_CHAR_WIDTH,
    }
  }
}

impl TextMeasure for CharWidthEstimate {
  fn text_width(&self, font_size: f32, text: &str) -> f32 {
    text.chars().count() as f32 * font_size * self.ratio
  }
}

/// 缩小字号使文本宽度不超过检测框宽度；只会缩小，不会放大
pub fn fit_font_size(base: f32, text_width_at_base: f32, box_width: f32) -> f32 {
  if text_width_at_base <= 0.0 {
    return base;
  }
  // NaN 经 min 后回落到 base
  (base * box_width / text_width_at_base).min(base).max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelLayout {
  pub x: i32,
  pub y: i32,
  pub font_size: f32,
}

/// 计算标签的字号与位置：贴住检测框上沿，在框内水平居中
pub fn label_layout<M: TextMeasure + ?Sized>(
  measure: &M,
  text: &str,
  bbox: &[f32; 4],
  base: f32,
) -> LabelLayout {
  let box_width = bbox[2] - bbox[0];
  let font_size = fit_font_size(base, measure.text_width(base, text), box_width);
  let text_width = measure.text_width(font_size, text);
  let margin = ((box_width - text_width) / 2.0).max(0.0);
  LabelLayout {
    x: (bbox[0] + margin).floor() as i32,
    y: bbox[1].floor() as i32,
    font_size,
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawConfig {
  pub base_font_size: f32,
  pub box_color: [u8; 3],
  pub text_color: [u8; 3],
  pub box_thickness: u32,
}

impl Default for DrawConfig {
  fn default() -> Self {
    Self {
      base_font_size: LABEL_FONT_SIZE,
      box_color: BOX_COLOR,
      text_color: TEXT_COLOR,
      box_thickness: BOX_THICKNESS,
    }
  }
}

fn default_font() -> Option<FontArc> {
  FontArc::try_from_slice(DEFAULT_FONT)
    .inspect_err(|e| warn!("无法加载嵌入的字体: {}", e))
    .ok()
}

#[derive(Clone)]
pub struct Draw {
  config: DrawConfig,
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(DrawConfig::default())
  }
}

impl Draw {
  /// 使用嵌入的默认字体
  pub fn new(config: DrawConfig) -> Self {
    Self {
      config,
      font: default_font(),
    }
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  /// 只绘制检测框，不绘制标签文字
  pub fn without_font(mut self) -> Self {
    self.font = None;
    self
  }

  pub fn with_font_file(self, path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontArc::try_from_vec(data)?;
    debug!("加载字体: {}", path.as_ref().display());
    Ok(self.with_font(font))
  }

  pub fn config(&self) -> &DrawConfig {
    &self.config
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 在原图副本上绘制检测框与标签，原图保持不变
  pub fn draw_detections(&self, image: &RgbImage, boxes: &[LabeledBox]) -> RgbImage {
    let mut output = image.clone();
    self.draw_detections_mut(&mut output, boxes);
    output
  }

  pub fn draw_detections_mut(&self, image: &mut RgbImage, boxes: &[LabeledBox]) {
    if self.font.is_none() && !boxes.is_empty() {
      warn!("未加载字体，仅绘制检测框");
    }
    for item in boxes {
      self.draw_box(image, &item.bbox);
      self.draw_label(image, &item.bbox, &item.text);
    }
  }

  /// 在原图副本上方绘制一行文字（分类结果），字号适配图像宽度
  pub fn draw_caption(&self, image: &RgbImage, text: &str) -> RgbImage {
    let mut output = image.clone();
    let bbox = [0.0, 0.0, image.width() as f32, image.height() as f32];
    if self.font.is_none() {
      warn!("未加载字体，无法绘制文字: {}", text);
    }
    self.draw_label(&mut output, &bbox, text);
    output
  }

  fn draw_box(&self, image: &mut RgbImage, bbox: &[f32; 4]) {
    let x = bbox[0].floor() as i32;
    let y = bbox[1].floor() as i32;
    let width = (bbox[2] - bbox[0]).round().max(1.0) as u32;
    let height = (bbox[3] - bbox[1]).round().max(1.0) as u32;
    let color = Rgb(self.config.box_color);

    // 向内加粗
    for t in 0..self.config.box_thickness {
      let w = width.saturating_sub(2 * t);
      let h = height.saturating_sub(2 * t);
      if w == 0 || h == 0 {
        break;
      }
      let rect = Rect::at(x + t as i32, y + t as i32).of_size(w, h);
      draw_hollow_rect_mut(image, rect, color);
    }
  }

  fn draw_label(&self, image: &mut RgbImage, bbox: &[f32; 4], text: &str) {
    let Some(font) = self.font.as_ref() else {
      return;
    };
    let layout = label_layout(font, text, bbox, self.config.base_font_size);
    if layout.font_size < LABEL_MIN_FONT_SIZE {
      debug!("检测框过窄，跳过标签: {}", text);
      return;
    }
    draw_text_mut(
      image,
      Rgb(self.config.text_color),
      layout.x,
      layout.y,
      PxScale::from(layout.font_size),
      font,
      text,
    );
  }
}
