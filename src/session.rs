// 该文件是 Kanjian （看见） 项目的一部分。
// src/session.rs - 推理会话：按需加载、复用并释放模型
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

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, error, info};

/// 资源的获取方式，例如加载模型文件与标签文件
pub trait Acquire {
  type Resource;
  type Error;

  fn acquire(&self) -> Result<Self::Resource, Self::Error>;
}

impl<R, E, F> Acquire for F
where
  F: Fn() -> Result<R, E>,
{
  type Resource = R;
  type Error = E;

  fn acquire(&self) -> Result<R, E> {
    self()
  }
}

#[derive(Error, Debug)]
pub enum SessionError<E> {
  #[error("模型或标签无法加载: {0}")]
  Load(#[source] E),
}

impl<E> SessionError<E> {
  pub fn into_inner(self) -> E {
    match self {
      SessionError::Load(err) => err,
    }
  }
}

/// 推理会话
///
/// 首次使用时获取资源并缓存，之后所有请求共享同一份；获取过程持有锁，
/// 不会并发重复加载。加载失败不会缓存，下一次请求会重新尝试。
/// 会话销毁（或调用 [`Session::release`]）时释放资源。
pub struct Session<L: Acquire> {
  loader: L,
  slot: Mutex<Option<Arc<L::Resource>>>,
}

impl<L: Acquire> Session<L> {
  pub fn new(loader: L) -> Self {
    Self {
      loader,
      slot: Mutex::new(None),
    }
  }

  /// 已加载的资源，必要时先加载
  pub fn get(&self) -> Result<Arc<L::Resource>, SessionError<L::Error>>
  where
    L::Error: std::fmt::Display,
  {
    let mut slot = self.lock();
    if let Some(resource) = slot.as_ref() {
      return Ok(Arc::clone(resource));
    }

    info!("首次使用，加载推理资源");
    let resource = self.loader.acquire().map_err(|err| {
      error!("加载推理资源失败: {}", err);
      SessionError::Load(err)
    })?;
    let resource = Arc::new(resource);
    *slot = Some(Arc::clone(&resource));
    debug!("推理资源已缓存");
    Ok(resource)
  }

  pub fn is_loaded(&self) -> bool {
    self.lock().is_some()
  }

  /// 释放缓存的资源；仍在使用中的请求持有的引用结束后才真正销毁
  pub fn release(&self) -> bool {
    let released = self.lock().take().is_some();
    if released {
      info!("推理资源已释放");
    }
    released
  }

  fn lock(&self) -> MutexGuard<'_, Option<Arc<L::Resource>>> {
    // 加载过程中 panic 不会留下半初始化的资源，可以继续使用
    self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Counted<'a> {
    loads: &'a AtomicUsize,
    drops: &'a AtomicUsize,
  }

  impl Drop for Counted<'_> {
    fn drop(&mut self) {
      self.drops.fetch_add(1, Ordering::SeqCst);
    }
  }

  #[test]
  fn acquires_once_and_releases_once() {
    let loads = AtomicUsize::new(0);
    let drops = AtomicUsize::new(0);
    {
      let session = Session::new(|| {
        loads.fetch_add(1, Ordering::SeqCst);
        Ok::<_, std::io::Error>(Counted {
          loads: &loads,
          drops: &drops,
        })
      });
      assert!(!session.is_loaded());
      let a = session.get().unwrap();
      let b = session.get().unwrap();
      assert!(Arc::ptr_eq(&a, &b));
      assert_eq!(a.loads.load(Ordering::SeqCst), 1);
      assert_eq!(drops.load(Ordering::SeqCst), 0);
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn failed_load_is_retried() {
    let attempts = AtomicUsize::new(0);
    let session = Session::new(|| {
      if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "labels.txt"))
      } else {
        Ok(42)
      }
    });

    let err = session.get().unwrap_err();
    assert!(err.to_string().contains("labels.txt"));
    assert!(!session.is_loaded());

    assert_eq!(*session.get().unwrap(), 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn release_then_reacquire() {
    let loads = AtomicUsize::new(0);
    let session = Session::new(|| Ok::<_, std::io::Error>(loads.fetch_add(1, Ordering::SeqCst)));
    assert_eq!(*session.get().unwrap(), 0);
    assert!(session.release());
    assert!(!session.release());
    assert_eq!(*session.get().unwrap(), 1);
  }
}
