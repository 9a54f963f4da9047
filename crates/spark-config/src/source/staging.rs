//! 写入器与数据源快照之间共享的版本化暂存区。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// 带代际计数的共享暂存区。
///
/// ### 契约说明（What）
/// - 写入方通过 [`StagingArea::stage`] / [`StagingArea::modify`] 提交新数据，每次提交代际加一；
/// - 快照记录自己构建时的代际，二者不同即表示“有更新”，检查本身不加锁、无副作用；
/// - [`StagingArea::load`] 返回代际与数据的一致组合，供适配器构建新快照。
///
/// ### 逻辑解析（How）
/// - 代际计数在互斥锁内递增，`load` 在同一把锁下读取，保证不会拿到“新代际 + 旧数据”。
pub struct StagingArea<T> {
    inner: Arc<StagingInner<T>>,
}

struct StagingInner<T> {
    generation: AtomicU64,
    data: Mutex<Arc<T>>,
}

impl<T> StagingArea<T> {
    /// 以初始内容创建暂存区，版本号从 0 开始。
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(StagingInner {
                generation: AtomicU64::new(0),
                data: Mutex::new(Arc::new(initial)),
            }),
        }
    }

    /// 当前已提交的代际。
    #[inline]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// 读取代际与数据的一致组合。
    pub fn load(&self) -> (u64, Arc<T>) {
        let data = self.inner.data.lock();
        (self.generation(), Arc::clone(&data))
    }

    /// 整体替换暂存数据，返回新代际。
    pub fn stage(&self, value: T) -> u64 {
        let mut data = self.inner.data.lock();
        *data = Arc::new(value);
        self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl<T: Clone> StagingArea<T> {
    /// 在当前数据上做增量修改，返回新代际。
    pub fn modify<F>(&self, edit: F) -> u64
    where
        F: FnOnce(&mut T),
    {
        let mut data = self.inner.data.lock();
        edit(Arc::make_mut(&mut data));
        self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl<T> Clone for StagingArea<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for StagingArea<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingArea")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
