// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 推理任务
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
  sync::mpsc::{self, Receiver, Sender},
  thread::{self, JoinHandle},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 取一幅图像，推理一次并输出
pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入图像"))?;
    info!("输入图像获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WorkerError {
  #[error("后台线程已退出")]
  Disconnected,
}

type Job<Req, Resp> = (Req, Sender<Resp>);

/// 单个后台线程依次处理请求，调用方线程不会被推理阻塞
///
/// 处理函数（及其持有的会话）归后台线程所有，`Worker` 销毁时等待线程退出，
/// 资源随之释放。
pub struct Worker<Req, Resp> {
  tx: Option<Sender<Job<Req, Resp>>>,
  handle: Option<JoinHandle<()>>,
}

impl<Req, Resp> Worker<Req, Resp>
where
  Req: Send + 'static,
  Resp: Send + 'static,
{
  pub fn spawn<H>(mut handler: H) -> Self
  where
    H: FnMut(Req) -> Resp + Send + 'static,
  {
    let (tx, rx) = mpsc::channel::<Job<Req, Resp>>();
    let handle = thread::spawn(move || {
      debug!("后台推理线程启动");
      for (request, reply) in rx {
        let response = handler(request);
        if reply.send(response).is_err() {
          warn!("请求方已放弃等待结果");
        }
      }
      debug!("后台推理线程退出");
    });

    Self {
      tx: Some(tx),
      handle: Some(handle),
    }
  }

  /// 提交请求，返回用于接收结果的通道
  pub fn submit(&self, request: Req) -> Result<Receiver<Resp>, WorkerError> {
    let (reply_tx, reply_rx) = mpsc::channel();
    self
      .tx
      .as_ref()
      .ok_or(WorkerError::Disconnected)?
      .send((request, reply_tx))
      .map_err(|_| WorkerError::Disconnected)?;
    Ok(reply_rx)
  }

  /// 提交请求并等待结果
  pub fn call(&self, request: Req) -> Result<Resp, WorkerError> {
    self
      .submit(request)?
      .recv()
      .map_err(|_| WorkerError::Disconnected)
  }
}

impl<Req, Resp> Drop for Worker<Req, Resp> {
  fn drop(&mut self) {
    drop(self.tx.take());
    if let Some(handle) = self.handle.take() {
      if handle.join().is_err() {
        warn!("后台推理线程异常退出");
      }
    }
  }
}
