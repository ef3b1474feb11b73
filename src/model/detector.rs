// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/detector.rs - 目标检测流水线
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
use tracing::debug;

use crate::{
  label::{LabelList, UNKNOWN_LABEL},
  model::{Category, DetectItem, DetectResult, InferenceError, Model},
};

const DETECTOR_MAX_RESULTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
  pub max_results: usize,
  /// 低于该得分的检测被丢弃；没有类别的检测不受影响
  pub min_score: Option<f32>,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      max_results: DETECTOR_MAX_RESULTS,
      min_score: None,
    }
  }
}

/// 带显示文本的检测框
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledBox {
  pub bbox: [f32; 4], // [left, top, right, bottom]
  pub text: String,
}

impl LabeledBox {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }
}

/// 取第一个类别生成 `"<label>, <score%>"`，没有类别时返回占位标签
pub fn format_label(item: &DetectItem) -> String {
  match item.categories.first() {
    Some(category) => format!(
      "{}, {}%",
      category.label,
      (category.score * 100.0).floor() as i64
    ),
    None => UNKNOWN_LABEL.to_string(),
  }
}

/// 解码检测后处理模型的输出
///
/// `boxes` 每 4 个值为一个框（归一化的 ymin, xmin, ymax, xmax），`classes` 为类别编号，
/// 只取前 `count` 个。框坐标换算为原图像素并裁剪到图像范围内，类别编号为负或越界时
/// 使用占位标签。
pub fn decode_detections(
  boxes: &[f32],
  classes: &[f32],
  scores: &[f32],
  count: usize,
  width: u32,
  height: u32,
  labels: &LabelList,
) -> Vec<DetectItem> {
  let n = count.min(scores.len()).min(classes.len()).min(boxes.len() / 4);
  let (w, h) = (width as f32, height as f32);
  (0..n)
    .map(|i| {
      let b = &boxes[i * 4..i * 4 + 4];
      let class = classes[i];
      let index = (class >= 0.0).then_some(class as usize);
      DetectItem {
        bbox: [
          (b[1] * w).clamp(0.0, w),
          (b[0] * h).clamp(0.0, h),
          (b[3] * w).clamp(0.0, w),
          (b[2] * h).clamp(0.0, h),
        ],
        categories: vec![Category::new(labels.get_or_unknown(index), scores[i])],
      }
    })
    .collect()
}

pub struct ObjectDetector<M> {
  engine: M,
  config: DetectorConfig,
}

impl<M> ObjectDetector<M>
where
  M: Model<Input = RgbImage, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(engine: M) -> Self {
    Self::with_config(engine, DetectorConfig::default())
  }

  pub fn with_config(engine: M, config: DetectorConfig) -> Self {
    Self { engine, config }
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn detect(&self, image: &RgbImage) -> Result<Vec<LabeledBox>, InferenceError> {
    let result = self.engine.infer(image).map_err(InferenceError::engine)?;
    debug!("引擎返回 {} 个检测结果", result.items.len());

    for (index, item) in result.items.iter().enumerate() {
      debug!(
        "检测 {}: ({:.0}, {:.0}) - ({:.0}, {:.0}), 类别: {:?}",
        index, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3], item.categories
      );
    }

    Ok(self.label_items(&result))
  }

  /// 保持引擎给出的顺序，按得分阈值过滤并截断到 `max_results`
  pub fn label_items(&self, result: &DetectResult) -> Vec<LabeledBox> {
    result
      .items
      .iter()
      .filter(|item| match (self.config.min_score, item.categories.first()) {
        (Some(min), Some(category)) => category.score >= min,
        _ => true,
      })
      .take(self.config.max_results)
      .map(|item| LabeledBox {
        bbox: item.bbox,
        text: format_label(item),
      })
      .collect()
  }
}

impl<M> Model for ObjectDetector<M>
where
  M: Model<Input = RgbImage, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  type Input = RgbImage;
  type Output = Vec<LabeledBox>;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.detect(input)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct FixedDetections(DetectResult);

  impl Model for FixedDetections {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = std::io::Error;

    fn infer(&self, _input: &RgbImage) -> Result<DetectResult, std::io::Error> {
      Ok(self.0.clone())
    }
  }

  fn item(bbox: [f32; 4], categories: &[(&str, f32)]) -> DetectItem {
    DetectItem {
      bbox,
      categories: categories
        .iter()
        .map(|(label, score)| Category::new(*label, *score))
        .collect(),
    }
  }

  #[test]
  fn label_uses_first_category_and_floors_percent() {
    let cat = item([0.0, 0.0, 1.0, 1.0], &[("cat", 0.876), ("dog", 0.95)]);
    assert_eq!(format_label(&cat), "cat, 87%");
    let exact = item([0.0, 0.0, 1.0, 1.0], &[("person", 0.5)]);
    assert_eq!(format_label(&exact), "person, 50%");
    let almost = item([0.0, 0.0, 1.0, 1.0], &[("person", 0.999)]);
    assert_eq!(format_label(&almost), "person, 99%");
  }

  #[test]
  fn empty_categories_are_unknown() {
    let empty = item([1.0, 2.0, 3.0, 4.0], &[]);
    assert_eq!(format_label(&empty), UNKNOWN_LABEL);
  }

  #[test]
  fn keeps_engine_order_and_caps_results() {
    let result = DetectResult::from(vec![
      item([0.0, 0.0, 10.0, 10.0], &[("a", 0.3)]),
      item([0.0, 0.0, 10.0, 10.0], &[]),
      item([0.0, 0.0, 10.0, 10.0], &[("c", 0.9)]),
      item([0.0, 0.0, 10.0, 10.0], &[("d", 0.8)]),
    ]);
    let detector = ObjectDetector::new(FixedDetections(result));
    let boxes = detector.detect(&RgbImage::new(16, 16)).unwrap();
    let texts: Vec<_> = boxes.iter().map(|b| b.text.as_str()).collect();
    assert_eq!(texts, ["a, 30%", "unknown", "c, 90%"]);
  }

  #[test]
  fn min_score_never_drops_unknown_boxes() {
    let result = DetectResult::from(vec![
      item([0.0, 0.0, 10.0, 10.0], &[("a", 0.3)]),
      item([0.0, 0.0, 10.0, 10.0], &[]),
      item([0.0, 0.0, 10.0, 10.0], &[("c", 0.9)]),
    ]);
    let detector = ObjectDetector::with_config(
      FixedDetections(result),
      DetectorConfig {
        max_results: 10,
        min_score: Some(0.5),
      },
    );
    let boxes = detector.detect(&RgbImage::new(16, 16)).unwrap();
    let texts: Vec<_> = boxes.iter().map(|b| b.text.as_str()).collect();
    assert_eq!(texts, ["unknown", "c, 90%"]);
  }

  #[test]
  fn decodes_normalized_boxes_to_pixels() {
    let labels: LabelList = ["horse", "human"].into_iter().collect();
    let boxes = [
      0.25, 0.125, 0.75, 0.5, // ymin, xmin, ymax, xmax
      -0.5, 0.5, 1.5, 2.0, // 越出图像
    ];
    let items = decode_detections(&boxes, &[1.0, 0.0], &[0.9, 0.4], 2, 200, 100, &labels);

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].bbox, [25.0, 25.0, 100.0, 75.0]);
    assert_eq!(items[0].categories, [Category::new("human", 0.9)]);
    assert_eq!(items[1].bbox, [100.0, 0.0, 200.0, 100.0]);
    assert_eq!(items[1].categories, [Category::new("horse", 0.4)]);
  }

  #[test]
  fn decode_stops_at_count_and_shortest_output() {
    let labels: LabelList = ["horse", "human"].into_iter().collect();
    let boxes = [0.0, 0.0, 0.5, 0.5, 0.0, 0.0, 0.5, 0.5, 0.0, 0.0, 0.5, 0.5];
    let classes = [0.0, 1.0, 0.0];
    let scores = [0.9, 0.8, 0.7];

    assert_eq!(decode_detections(&boxes, &classes, &scores, 2, 10, 10, &labels).len(), 2);
    assert_eq!(decode_detections(&boxes, &classes, &scores, 0, 10, 10, &labels).len(), 0);
    // count 大于实际输出时以最短的输出为准
    assert_eq!(decode_detections(&boxes, &classes, &scores[..2], 10, 10, 10, &labels).len(), 2);
    assert_eq!(decode_detections(&boxes[..7], &classes, &scores, 10, 10, 10, &labels).len(), 1);
  }

  #[test]
  fn decode_maps_bad_class_ids_to_unknown() {
    let labels: LabelList = ["horse", "human"].into_iter().collect();
    let boxes = [0.0, 0.0, 1.0, 1.0].repeat(3);
    let classes = [-1.0, 2.0, f32::NAN];
    let items = decode_detections(&boxes, &classes, &[0.5, 0.25, 0.75], 3, 8, 8, &labels);

    let names: Vec<_> = items.iter().map(|i| i.categories[0].label.as_str()).collect();
    assert_eq!(names, [UNKNOWN_LABEL; 3]);
    let texts: Vec<_> = items.iter().map(format_label).collect();
    assert_eq!(texts, ["unknown, 50%", "unknown, 25%", "unknown, 75%"]);
  }
}
