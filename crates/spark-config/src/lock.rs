//! 合并引擎共享的读写锁。
//!
//! ### 契约说明（What）
//! - 注册表、值缓存与观察者注册表共用同一把锁：读路径取读锁，首次填充与代际替换取写锁；
//! - 可选公平释放：开启后守卫以 `unlock_fair` 释放，把锁直接交给排队中的线程；
//! - 可选获取时限：超时返回 [`CombinerError::LockTimeout`]，不会无限阻塞；
//! - 锁不可重入。读锁升级写锁时调用方必须先释放读守卫。

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::CombinerError;

/// 锁获取策略。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LockPolicy {
    /// 释放时是否公平移交。
    pub fair: bool,
    /// 获取时限；`None` 表示无限等待。
    pub timeout: Option<Duration>,
}

/// 加锁模式，出现在超时错误中。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    /// 读锁。
    Read,
    /// 写锁。
    Write,
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// 按 [`LockPolicy`] 获取的读写锁。
pub struct CombinerLock<T> {
    inner: RwLock<T>,
    policy: LockPolicy,
}

impl<T> CombinerLock<T> {
    /// 以给定策略包装受保护的状态。
    pub fn new(value: T, policy: LockPolicy) -> Self {
        Self {
            inner: RwLock::new(value),
            policy,
        }
    }

    /// 装配时选定的加锁策略。
    #[inline]
    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// 进入读侧临界区。
    pub fn read(&self) -> Result<CombinerReadGuard<'_, T>, CombinerError> {
        let guard = match self.policy.timeout {
            None => self.inner.read(),
            Some(timeout) => self
                .inner
                .try_read_for(timeout)
                .ok_or(CombinerError::LockTimeout {
                    mode: LockMode::Read,
                    timeout,
                })?,
        };
        Ok(CombinerReadGuard {
            guard: Some(guard),
            fair: self.policy.fair,
        })
    }

    /// 进入写侧临界区，守卫释放前其余读写方均被阻塞。
    pub fn write(&self) -> Result<CombinerWriteGuard<'_, T>, CombinerError> {
        let guard = match self.policy.timeout {
            None => self.inner.write(),
            Some(timeout) => self
                .inner
                .try_write_for(timeout)
                .ok_or(CombinerError::LockTimeout {
                    mode: LockMode::Write,
                    timeout,
                })?,
        };
        Ok(CombinerWriteGuard {
            guard: Some(guard),
            fair: self.policy.fair,
        })
    }
}

impl<T> fmt::Debug for CombinerLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinerLock")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// 读锁守卫。守卫只在 `Drop` 中被取走。
pub struct CombinerReadGuard<'a, T> {
    guard: Option<RwLockReadGuard<'a, T>>,
    fair: bool,
}

impl<T> Deref for CombinerReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.guard {
            Some(guard) => guard,
            None => unreachable!("read guard is only released on drop"),
        }
    }
}

impl<T> Drop for CombinerReadGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            if self.fair {
                RwLockReadGuard::unlock_fair(guard);
            }
        }
    }
}

/// 写锁守卫。
pub struct CombinerWriteGuard<'a, T> {
    guard: Option<RwLockWriteGuard<'a, T>>,
    fair: bool,
}

impl<T> Deref for CombinerWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.guard {
            Some(guard) => guard,
            None => unreachable!("write guard is only released on drop"),
        }
    }
}

impl<T> DerefMut for CombinerWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.guard {
            Some(guard) => guard,
            None => unreachable!("write guard is only released on drop"),
        }
    }
}

impl<T> Drop for CombinerWriteGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            if self.fair {
                RwLockWriteGuard::unlock_fair(guard);
            }
        }
    }
}
