// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/tract.rs - 基于 tract 的推理后端
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

use std::path::{Path, PathBuf};

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Normalization, NhwcTensor},
  label::{LabelError, LabelList},
  model::{DetectResult, Model, decode_detections},
  query_value,
};

const TRACT_SCHEME: &str = "tract";
const CLASSIFIER_INPUT_SIZE: usize = 224;
const DETECTOR_INPUT_SIZE: usize = 384;
const DETECTOR_NUM_OUTPUTS: usize = 4;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

#[derive(Error, Debug)]
pub enum TractModelError {
  #[error("模型加载错误 {path}: {source}")]
  ModelLoad {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("模型无效 {path}: {message}")]
  ModelInvalid { path: PathBuf, message: String },
  #[error("推理错误: {0}")]
  Run(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("标签错误: {0}")]
  Label(#[from] LabelError),
}

fn run_error(err: tract_onnx::prelude::TractError) -> TractModelError {
  TractModelError::Run(format!("{:#}", err))
}

/// 以只读内存映射方式打开模型文件并构建可执行计划
fn load_plan(path: &Path, input_fact: TypedFact) -> Result<Plan, TractModelError> {
  info!("加载模型文件: {}", path.display());
  let file = std::fs::File::open(path).map_err(|source| {
    error!("打开模型文件失败: {}: {}", path.display(), source);
    TractModelError::ModelLoad {
      path: path.to_path_buf(),
      source,
    }
  })?;
  // SAFETY: 映射为只读，模型解析完成后即释放
  let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|source| TractModelError::ModelLoad {
    path: path.to_path_buf(),
    source,
  })?;
  debug!(
    "模型文件大小: {:.2} MB",
    mmap.len() as f64 / (1024.0 * 1024.0)
  );

  let invalid = |err: tract_onnx::prelude::TractError| {
    error!("模型无效: {}: {:#}", path.display(), err);
    TractModelError::ModelInvalid {
      path: path.to_path_buf(),
      message: format!("{:#}", err),
    }
  };

  let plan = tract_onnx::onnx()
    .model_for_read(&mut &mmap[..])
    .and_then(|model| model.with_input_fact(0, input_fact.into()))
    .and_then(|model| model.into_optimized())
    .and_then(|model| model.into_runnable())
    .map_err(invalid)?;
  info!("模型加载完成");
  Ok(plan)
}

fn model_path(url: &Url) -> Result<PathBuf, TractModelError> {
  if url.scheme() != TRACT_SCHEME {
    return Err(TractModelError::ModelPathError(format!(
      "模型路径必须使用 {} 方案",
      TRACT_SCHEME
    )));
  }
  if url.path().is_empty() {
    return Err(TractModelError::ModelPathError("模型路径为空".to_string()));
  }
  Ok(PathBuf::from(url.path()))
}

fn to_f32_vec(tensor: &Tensor) -> TractResult<Vec<f32>> {
  Ok(tensor.cast_to::<f32>()?.as_slice::<f32>()?.to_vec())
}

/// 输出类别得分向量的分类模型，输入为 `f32 [1, S, S, 3]`
pub struct TractClassifier {
  plan: Plan,
  input_size: usize,
}

impl FromUrlWithScheme for TractClassifier {
  const SCHEME: &'static str = TRACT_SCHEME;
}

impl FromUrl for TractClassifier {
  type Error = TractModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let path = model_path(url)?;
    let input_size = query_value(url, "size").unwrap_or(CLASSIFIER_INPUT_SIZE);
    Self::open(path, input_size)
  }
}

impl TractClassifier {
  pub fn open(path: impl AsRef<Path>, input_size: usize) -> Result<Self, TractModelError> {
    let fact = f32::fact([1, input_size, input_size, 3]);
    let plan = load_plan(path.as_ref(), fact)?;
    Ok(Self { plan, input_size })
  }

  pub fn input_size(&self) -> usize {
    self.input_size
  }
}

impl Model for TractClassifier {
  type Input = NhwcTensor;
  type Output = Vec<f32>;
  type Error = TractModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let [n, h, w, c] = input.shape();
    debug!("设置模型输入: {}x{}x{}x{}", n, h, w, c);
    let array = tract_ndarray::Array4::from_shape_vec((n, h, w, c), input.as_slice().to_vec())
      .map_err(|e| TractModelError::Run(e.to_string()))?;

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(Tensor::from(array).into()))
      .map_err(run_error)?;

    let scores = outputs
      .first()
      .ok_or_else(|| TractModelError::Run("模型没有输出".to_string()))
      .and_then(|t| to_f32_vec(t).map_err(run_error))?;
    debug!("模型推理结果: {:?}", scores);
    Ok(scores)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DetectorInput {
  UInt8,
  Float32(Normalization),
}

/// 带检测后处理的目标检测模型
///
/// 输出依次为 boxes `[1, N, 4]`（归一化的 ymin, xmin, ymax, xmax）、
/// classes `[1, N]`、scores `[1, N]` 与 count `[1]`。
pub struct TractDetector {
  plan: Plan,
  input_size: usize,
  input: DetectorInput,
  labels: LabelList,
}

impl FromUrlWithScheme for TractDetector {
  const SCHEME: &'static str = TRACT_SCHEME;
}

impl FromUrl for TractDetector {
  type Error = TractModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let path = model_path(url)?;
    let input_size = query_value(url, "size").unwrap_or(DETECTOR_INPUT_SIZE);
    let input = match query_value::<String>(url, "dtype").as_deref() {
      Some("f32") => DetectorInput::Float32(Normalization {
        mean: query_value(url, "mean").unwrap_or(127.5),
        std: query_value(url, "std").unwrap_or(127.5),
      }),
      _ => DetectorInput::UInt8,
    };
    let labels = match query_value::<String>(url, "labels") {
      Some(labels) => LabelList::from_path(labels)?,
      None => {
        warn!("未指定标签文件，所有类别将显示为 unknown");
        LabelList::default()
      }
    };
    Self::open(path, input_size, input, labels)
  }
}

impl TractDetector {
  fn open(
    path: impl AsRef<Path>,
    input_size: usize,
    input: DetectorInput,
    labels: LabelList,
  ) -> Result<Self, TractModelError> {
    let shape = [1, input_size, input_size, 3];
    let fact = match input {
      DetectorInput::UInt8 => u8::fact(shape),
      DetectorInput::Float32(_) => f32::fact(shape),
    };
    let plan = load_plan(path.as_ref(), fact)?;
    Ok(Self {
      plan,
      input_size,
      input,
      labels,
    })
  }

  fn input_tensor(&self, image: &RgbImage) -> Result<Tensor, TractModelError> {
    let size = self.input_size as u32;
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let shape = (1, self.input_size, self.input_size, 3);
    let tensor = match self.input {
      DetectorInput::UInt8 => {
        tract_ndarray::Array4::from_shape_vec(shape, resized.into_raw()).map(Tensor::from)
      }
      DetectorInput::Float32(norm) => {
        let data: Vec<f32> = resized.as_raw().iter().map(|&v| norm.apply(v)).collect();
        tract_ndarray::Array4::from_shape_vec(shape, data).map(Tensor::from)
      }
    };
    tensor.map_err(|e| TractModelError::Run(e.to_string()))
  }
}

impl Model for TractDetector {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = TractModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (width, height) = input.dimensions();
    if width == 0 || height == 0 {
      return Err(TractModelError::Run(format!("输入图像为空: {}x{}", width, height)));
    }

    let tensor = self.input_tensor(input)?;
    debug!("执行模型推理");
    let outputs = self.plan.run(tvec!(tensor.into())).map_err(run_error)?;
    if outputs.len() < DETECTOR_NUM_OUTPUTS {
      return Err(TractModelError::Run(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        DETECTOR_NUM_OUTPUTS,
        outputs.len()
      )));
    }

    let boxes = to_f32_vec(&outputs[0]).map_err(run_error)?;
    let classes = to_f32_vec(&outputs[1]).map_err(run_error)?;
    let scores = to_f32_vec(&outputs[2]).map_err(run_error)?;
    let count = to_f32_vec(&outputs[3])
      .map_err(run_error)?
      .first()
      .map(|&c| c.max(0.0) as usize)
      .unwrap_or(scores.len());

    let items = decode_detections(&boxes, &classes, &scores, count, width, height, &self.labels);
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult::from(items))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_foreign_scheme() {
    let url = Url::parse("onnx:///model.onnx").unwrap();
    assert!(matches!(
      TractClassifier::from_url(&url),
      Err(TractModelError::ModelPathError(_))
    ));
  }

  #[test]
  fn missing_model_is_a_load_error() {
    let url = Url::parse("tract:///nonexistent/model.onnx?size=224").unwrap();
    let err = TractClassifier::from_url(&url).err().unwrap();
    assert!(matches!(err, TractModelError::ModelLoad { .. }));
    assert!(err.to_string().contains("/nonexistent/model.onnx"));
  }
}
