// 该文件是 Kanjian （看见） 项目的一部分。
// src/bin/classify.rs - 马/人图像分类命令行
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

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use url::Url;

use kanjian::{
  FromUrl,
  app::{ClassifyScreen, ScreenError},
  label::LabelList,
  model::{ClassifierConfig, ImageClassifier, TractClassifier},
  session::Session,
  task::Worker,
};
use tracing::{error, info};

/// Kanjian 图像分类
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，例如 tract:///models/horse_or_human.onnx?size=224
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 标签文件，每行一个类别
  #[arg(long, value_name = "LABELS")]
  pub labels: PathBuf,
  /// 待分类的图像文件，可以给出多个
  #[arg(value_name = "IMAGE", required = true)]
  pub images: Vec<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("标签文件路径: {}", args.labels.display());

  let model = args.model.clone();
  let labels = args.labels.clone();
  // 首次点击时才加载模型和标签
  let session = Arc::new(Session::new(move || -> Result<_> {
    let engine = TractClassifier::from_url(&model)?;
    let labels = LabelList::from_path(&labels)?;
    let config = ClassifierConfig {
      input_size: engine.input_size() as u32,
      ..Default::default()
    };
    Ok(ImageClassifier::with_config(engine, labels, config))
  }));

  let mut screen = ClassifyScreen::new(session);
  let worker = Worker::spawn(move |path: PathBuf| -> Result<String, ScreenError> {
    screen.pick_image_file(&path)?;
    screen.tap().map(str::to_string)
  });

  let mut failed = 0usize;
  for path in args.images {
    match worker.call(path.clone())? {
      Ok(label) => println!("{}: {}", path.display(), label),
      Err(e) => {
        error!("{}: {}", path.display(), e);
        failed += 1;
      }
    }
  }

  if failed > 0 {
    anyhow::bail!("{} 张图像分类失败", failed);
  }

  Ok(())
}
