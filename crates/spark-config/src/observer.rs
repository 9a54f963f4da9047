//! 观察者注册表。
//!
//! ### 契约说明（What）
//! - 每次注册返回不透明的 [`ObserverHandle`]，用于之后注销；
//! - 兴趣范围三选一：全部、按键、按精确描述符，由 [`Interest`] 的枚举形态保证互斥；
//! - 强引用注册持续到显式注销；弱引用注册在监听器被释放后视同不存在，
//!   不再产生通知，并在下一次注册、注销或更新周期中被压缩清理；
//! - 通知以 [`Notification`] 形式收集后交给调用方执行，注册表本身从不调用监听器。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::descriptor::TypeDescriptor;

/// 配置变更监听器。
pub trait ConfigListener: Send + Sync {
    /// 描述符对应的值在一次更新周期中发生了变化（出现、消失或值不同）。
    fn on_change(&self, descriptor: &TypeDescriptor);
}

impl<F> ConfigListener for F
where
    F: Fn(&TypeDescriptor) + Send + Sync,
{
    fn on_change(&self, descriptor: &TypeDescriptor) {
        self(descriptor)
    }
}

/// 监听范围。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interest {
    /// 每个发生变化的描述符。
    All,
    /// 键字符串相同的任意形状。
    Key(Arc<str>),
    /// 与描述符精确相等。
    Descriptor(TypeDescriptor),
}

impl Interest {
    /// 关心某个键的任意形状。
    pub fn key<K>(key: K) -> Self
    where
        K: Into<Arc<str>>,
    {
        Self::Key(key.into())
    }

    /// 只关心与该描述符精确相等的变化。
    pub fn descriptor(descriptor: TypeDescriptor) -> Self {
        Self::Descriptor(descriptor)
    }

    /// 变化的描述符是否落在兴趣范围内。
    pub fn matches(&self, descriptor: &TypeDescriptor) -> bool {
        match self {
            Self::All => true,
            Self::Key(key) => &**key == descriptor.key(),
            Self::Descriptor(expected) => expected == descriptor,
        }
    }
}

/// 注册句柄。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverHandle(u64);

impl ObserverHandle {
    /// 句柄的数值标识，在同一注册表内唯一。
    #[inline]
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

enum ListenerRef {
    Strong(Arc<dyn ConfigListener>),
    Weak(Weak<dyn ConfigListener>),
}

impl ListenerRef {
    fn is_live(&self) -> bool {
        match self {
            Self::Strong(_) => true,
            Self::Weak(weak) => weak.strong_count() > 0,
        }
    }
}

struct ObserverEntry {
    listener: ListenerRef,
    interest: Interest,
}

/// 观察者注册表，由合并引擎的锁保护。
#[derive(Default)]
pub struct ObserverRegistry {
    entries: BTreeMap<ObserverHandle, ObserverEntry>,
    next_id: u64,
}

impl ObserverRegistry {
    /// 创建空注册表。
    pub fn new() -> Self {
        Self::default()
    }

    /// 以强引用注册，监听器存活到显式注销。
    pub fn register(
        &mut self,
        listener: Arc<dyn ConfigListener>,
        interest: Interest,
    ) -> ObserverHandle {
        self.insert(ListenerRef::Strong(listener), interest)
    }

    /// 以弱引用注册，监听器释放后自动失效。
    pub fn register_soft(
        &mut self,
        listener: Weak<dyn ConfigListener>,
        interest: Interest,
    ) -> ObserverHandle {
        self.insert(ListenerRef::Weak(listener), interest)
    }

    fn insert(&mut self, listener: ListenerRef, interest: Interest) -> ObserverHandle {
        self.compact();
        self.next_id += 1;
        let handle = ObserverHandle(self.next_id);
        debug!(%handle, ?interest, "observer registered");
        self.entries
            .insert(handle, ObserverEntry { listener, interest });
        handle
    }

    /// 注销句柄。未知或已清理的句柄返回 `false`，不视为错误。
    pub fn deregister(&mut self, handle: ObserverHandle) -> bool {
        let removed = self.entries.remove(&handle).is_some();
        self.compact();
        if removed {
            debug!(%handle, "observer deregistered");
        }
        removed
    }

    /// 为变化的描述符收集待执行的通知。
    ///
    /// 只收集兴趣匹配且监听器仍然存活的条目；弱引用在执行时再次升级，
    /// 若届时已被释放则静默跳过。
    pub fn notifiable(&self, descriptor: &TypeDescriptor) -> Vec<Notification> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.listener.is_live() && entry.interest.matches(descriptor))
            .map(|(handle, entry)| Notification::new(*handle, descriptor.clone(), &entry.listener))
            .collect()
    }

    /// 移除已失效的弱引用条目，返回移除数量。
    pub fn compact(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.listener.is_live());
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "collected dead observers");
        }
        removed
    }

    /// 存活的观察者数量。
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.listener.is_live())
            .count()
    }

    /// 是否没有任何存活的监听器。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("entries", &self.entries.len())
            .field("live", &self.len())
            .finish()
    }
}

/// 一条尚未执行的变更通知。
///
/// 调用方决定在哪个线程、以何种顺序执行 [`Notification::run`]。
pub struct Notification {
    handle: ObserverHandle,
    descriptor: TypeDescriptor,
    callback: Box<dyn FnOnce(&TypeDescriptor) + Send>,
}

impl Notification {
    fn new(handle: ObserverHandle, descriptor: TypeDescriptor, listener: &ListenerRef) -> Self {
        let callback: Box<dyn FnOnce(&TypeDescriptor) + Send> = match listener {
            ListenerRef::Strong(listener) => {
                let listener = Arc::clone(listener);
                Box::new(move |descriptor: &TypeDescriptor| listener.on_change(descriptor))
            }
            ListenerRef::Weak(listener) => {
                let listener = Weak::clone(listener);
                Box::new(move |descriptor: &TypeDescriptor| {
                    if let Some(listener) = listener.upgrade() {
                        listener.on_change(descriptor);
                    }
                })
            }
        };
        Self {
            handle,
            descriptor,
            callback,
        }
    }

    /// 发生变化的描述符。
    #[inline]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// 变化的键。
    #[inline]
    pub fn key(&self) -> &str {
        self.descriptor.key()
    }

    /// 接收该通知的观察者句柄。
    #[inline]
    pub fn handle(&self) -> ObserverHandle {
        self.handle
    }

    /// 执行回调。
    pub fn run(self) {
        (self.callback)(&self.descriptor);
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("handle", &self.handle)
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
