// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/detect.rs - 目标检测命令行
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use kanjian::{
  FromUrl,
  input::ImageFileInput,
  model::{DetectorConfig, ObjectDetector, TractDetector},
  output::OutputWrapper,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Kanjian 目标检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，例如 tract:///models/detect.onnx?size=384&labels=/models/labels.txt
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，例如 image:///photos/horse.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///out/horse.png?font=/fonts/DejaVuSans.ttf
  #[arg(long, value_name = "OUTPUT", default_value = "text:")]
  pub output: Url,
  /// 最多输出的检测数量
  #[arg(long, default_value = "3", value_name = "COUNT")]
  pub max_results: usize,
  /// 置信度阈值 (0.0 - 1.0)，缺省不过滤
  #[arg(long, value_name = "THRESHOLD")]
  pub min_score: Option<f32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = ImageFileInput::from_url(&args.input)?;
  let engine = TractDetector::from_url(&args.model)?;
  let detector = ObjectDetector::with_config(
    engine,
    DetectorConfig {
      max_results: args.max_results,
      min_score: args.min_score,
    },
  );
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(input, detector, output)?;

  Ok(())
}
