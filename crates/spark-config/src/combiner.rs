//! 对外门面、强类型访问器与子视图。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::debug;

use crate::builder::CombinerBuilder;
use crate::cache::ValueCache;
use crate::descriptor::{Describe, TypeDescriptor};
use crate::error::CombinerError;
use crate::lock::{CombinerLock, LockPolicy};
use crate::manager::UpdateManager;
use crate::observer::{ConfigListener, Interest, ObserverHandle, ObserverRegistry};
use crate::options::CombinerOptions;
use crate::registry::SourceRegistry;
use crate::setting::Setting;
use crate::value::{ConfigValue, FromConfigValue};

/// 锁内的全部可变状态：一代数据源、值缓存、观察者与代际号。
pub(crate) struct CombinerState {
    pub(crate) registry: SourceRegistry,
    pub(crate) cache: ValueCache,
    pub(crate) observers: ObserverRegistry,
    pub(crate) generation: u64,
}

struct CombinerInner {
    name: Arc<str>,
    lock: CombinerLock<CombinerState>,
    manager_vended: AtomicBool,
}

/// 分层配置合并引擎的门面。
///
/// ### 设计目的（Why）
/// - 把有序数据源合并为一个一致、强类型、可观察的视图：每个被访问的键在同一时刻只由一个数据源决定，
///   所有读者在显式更新之前看到同一代的值。
///
/// ### 逻辑解析（How）
/// - 读路径取读锁命中缓存；未命中时释放读锁、改取写锁，二次检查后按声明顺序查找首个命中并写入缓存；
/// - 数据源、缓存与观察者注册表共用一把 [`CombinerLock`]；
/// - 更新协议由一次性领取的 [`UpdateManager`] 驱动，门面本身不刷新数据源。
///
/// ### 契约说明（What）
/// - `Combiner` 可廉价克隆，克隆体共享同一份状态；
/// - 所有加锁操作在配置了时限时可能返回 [`CombinerError::LockTimeout`]。
#[derive(Clone)]
pub struct Combiner {
    inner: Arc<CombinerInner>,
}

impl Combiner {
    /// 以名称开始装配。
    pub fn builder<N>(name: N) -> CombinerBuilder
    where
        N: Into<Arc<str>>,
    {
        CombinerBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: Arc<str>,
        registry: SourceRegistry,
        options: CombinerOptions,
    ) -> Self {
        let state = CombinerState {
            registry,
            cache: ValueCache::new(options.allow_mixed_types),
            observers: ObserverRegistry::new(),
            generation: 0,
        };
        Self {
            inner: Arc::new(CombinerInner {
                name,
                lock: CombinerLock::new(state, options.lock_policy()),
                manager_vended: AtomicBool::new(false),
            }),
        }
    }

    /// 引擎名称，用于日志与错误信息。
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 装配时选定的加锁策略。
    pub fn lock_policy(&self) -> LockPolicy {
        self.inner.lock.policy()
    }

    pub(crate) fn lock(&self) -> &CombinerLock<CombinerState> {
        &self.inner.lock
    }

    /// 两个门面是否指向同一个引擎实例。
    pub fn same_instance(&self, other: &Combiner) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// 解析描述符，缺失时返回 [`CombinerError::MissingKey`]。
    pub fn resolve(&self, descriptor: &TypeDescriptor) -> Result<ConfigValue, CombinerError> {
        self.try_resolve(descriptor)?
            .ok_or_else(|| CombinerError::MissingKey {
                descriptor: descriptor.clone(),
            })
    }

    /// 解析描述符，缺失时返回 `default`。其余错误照常上抛。
    pub fn resolve_or(
        &self,
        descriptor: &TypeDescriptor,
        default: ConfigValue,
    ) -> Result<ConfigValue, CombinerError> {
        Ok(self.try_resolve(descriptor)?.unwrap_or(default))
    }

    /// 解析描述符，`Ok(None)` 表示当前没有数据源能提供它。
    ///
    /// ### 逻辑解析（How）
    /// 1. 读锁下命中缓存直接返回，并提前检查类型冲突；
    /// 2. 释放读锁后取写锁（不嵌套，避免自锁），再次检查缓存以吸收并发填充；
    /// 3. 按声明顺序查找首个命中，签发描述符并缓存结果；查找失败时不签发。
    pub fn try_resolve(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<Option<ConfigValue>, CombinerError> {
        {
            let state = self.inner.lock.read()?;
            if let Some(value) = state.cache.get(descriptor) {
                return Ok(Some(value.clone()));
            }
            state.cache.check_issue(descriptor)?;
        }

        let mut state = self.inner.lock.write()?;
        if let Some(value) = state.cache.get(descriptor) {
            return Ok(Some(value.clone()));
        }
        state.cache.check_issue(descriptor)?;
        let resolved = state.registry.first_match(descriptor)?;
        state.cache.issue(descriptor)?;
        if let Some(value) = &resolved {
            state.cache.insert(descriptor.clone(), value.clone());
        }
        Ok(resolved)
    }

    /// 签发描述符但不解析，用于在取值前就纳入更新周期的变更检测。
    pub fn issue(&self, descriptor: &TypeDescriptor) -> Result<(), CombinerError> {
        {
            let state = self.inner.lock.read()?;
            if state.cache.is_issued(descriptor) {
                return Ok(());
            }
            state.cache.check_issue(descriptor)?;
        }
        self.inner.lock.write()?.cache.issue(descriptor).map(|_| ())
    }

    /// 是否能以该描述符的形状提供值：先查缓存，再读取当前代的首个命中数据源。不签发、不缓存。
    ///
    /// 首个命中数据源的值与形状不符时返回 `false`；数据源读取失败时原样返回错误。
    pub fn has(&self, descriptor: &TypeDescriptor) -> Result<bool, CombinerError> {
        let state = self.inner.lock.read()?;
        if state.cache.has(descriptor) {
            return Ok(true);
        }
        match state.registry.first_match(descriptor) {
            Ok(found) => Ok(found.is_some()),
            Err(CombinerError::TypeMismatch { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// 当前代的数据源能否提供该描述符，忽略缓存。
    pub fn exists(&self, descriptor: &TypeDescriptor) -> Result<bool, CombinerError> {
        Ok(self.inner.lock.read()?.registry.contains(descriptor))
    }

    /// 缓存中是否有与该描述符精确相等的项。
    pub fn is_cached(&self, descriptor: &TypeDescriptor) -> Result<bool, CombinerError> {
        Ok(self.inner.lock.read()?.cache.has(descriptor))
    }

    /// 以强引用注册监听器。
    pub fn register<L>(&self, listener: Arc<L>, interest: Interest) -> Result<ObserverHandle, CombinerError>
    where
        L: ConfigListener + 'static,
    {
        let listener: Arc<dyn ConfigListener> = listener;
        Ok(self.inner.lock.write()?.observers.register(listener, interest))
    }

    /// 以弱引用注册监听器，监听器释放后不再收到通知。
    pub fn register_soft<L>(
        &self,
        listener: &Arc<L>,
        interest: Interest,
    ) -> Result<ObserverHandle, CombinerError>
    where
        L: ConfigListener + 'static,
    {
        let listener: Weak<L> = Arc::downgrade(listener);
        let listener: Weak<dyn ConfigListener> = listener;
        Ok(self
            .inner
            .lock
            .write()?
            .observers
            .register_soft(listener, interest))
    }

    /// 注销观察者；未知句柄返回 `false`。
    pub fn deregister(&self, handle: ObserverHandle) -> Result<bool, CombinerError> {
        Ok(self.inner.lock.write()?.observers.deregister(handle))
    }

    /// 存活的观察者数量。
    pub fn observer_count(&self) -> Result<usize, CombinerError> {
        Ok(self.inner.lock.read()?.observers.len())
    }

    /// 立即清理已释放的弱引用观察者。
    pub fn compact_observers(&self) -> Result<usize, CombinerError> {
        Ok(self.inner.lock.write()?.observers.compact())
    }

    /// 已完成的代际替换次数。
    pub fn generation(&self) -> Result<u64, CombinerError> {
        Ok(self.inner.lock.read()?.generation)
    }

    /// 当前代数据源的名称，按声明顺序。
    pub fn source_names(&self) -> Result<Vec<String>, CombinerError> {
        Ok(self
            .inner
            .lock
            .read()?
            .registry
            .names()
            .map(str::to_owned)
            .collect())
    }

    /// 领取更新管理器。每个引擎只能领取一次。
    pub fn manager(&self) -> Result<UpdateManager, CombinerError> {
        if self.inner.manager_vended.swap(true, Ordering::AcqRel) {
            return Err(CombinerError::usage(format!(
                "update manager of combiner `{}` was already taken",
                self.inner.name
            )));
        }
        debug!(combiner = %self.inner.name, "update manager vended");
        Ok(UpdateManager::new(self.clone()))
    }

    /// 以 `"{prefix}."` 为键前缀的子视图。
    pub fn subset(&self, prefix: &str) -> Subset {
        Subset {
            combiner: self.clone(),
            prefix: Arc::from(prefix),
        }
    }
}

impl fmt::Debug for Combiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Combiner")
            .field("name", &self.inner.name)
            .field("lock", &self.inner.lock)
            .finish_non_exhaustive()
    }
}

/// 强类型访问器。
///
/// 标量与容器访问器都由 [`TypedAccess::setting`] 派生：描述符在调用点由 Rust 类型经 [`Describe`] 显式构造，
/// 创建句柄时即签发描述符，因此同键不同形状的冲突在这里就会暴露。
pub trait TypedAccess {
    /// 以 `T` 的形状访问 `key`。
    fn setting<T>(&self, key: &str) -> Result<Setting<T>, CombinerError>
    where
        T: Describe + FromConfigValue;

    /// 以显式描述符访问应用自定义类型。
    fn custom<T>(&self, descriptor: TypeDescriptor) -> Result<Setting<T>, CombinerError>
    where
        T: FromConfigValue;

    /// 以 `bool` 访问 `key`。
    fn boolean(&self, key: &str) -> Result<Setting<bool>, CombinerError> {
        self.setting(key)
    }

    /// 以 `i8` 访问 `key`。
    fn byte(&self, key: &str) -> Result<Setting<i8>, CombinerError> {
        self.setting(key)
    }

    /// 以 `char` 访问 `key`。
    fn character(&self, key: &str) -> Result<Setting<char>, CombinerError> {
        self.setting(key)
    }

    /// 以 `i16` 访问 `key`。
    fn short(&self, key: &str) -> Result<Setting<i16>, CombinerError> {
        self.setting(key)
    }

    /// 以 `i32` 访问 `key`。
    fn int(&self, key: &str) -> Result<Setting<i32>, CombinerError> {
        self.setting(key)
    }

    /// 以 `i64` 访问 `key`。
    fn long(&self, key: &str) -> Result<Setting<i64>, CombinerError> {
        self.setting(key)
    }

    /// 以 `f32` 访问 `key`。
    fn float(&self, key: &str) -> Result<Setting<f32>, CombinerError> {
        self.setting(key)
    }

    /// 以 `f64` 访问 `key`。
    fn double(&self, key: &str) -> Result<Setting<f64>, CombinerError> {
        self.setting(key)
    }

    /// 以 `String` 访问 `key`。
    fn string(&self, key: &str) -> Result<Setting<String>, CombinerError> {
        self.setting(key)
    }

    /// 以 `Vec<T>` 访问 `key`。
    fn list<T>(&self, key: &str) -> Result<Setting<Vec<T>>, CombinerError>
    where
        T: Describe + FromConfigValue,
    {
        self.setting(key)
    }

    /// 以 `BTreeSet<T>` 访问 `key`，重复元素只保留一个。
    fn set<T>(&self, key: &str) -> Result<Setting<BTreeSet<T>>, CombinerError>
    where
        T: Describe + FromConfigValue + Ord,
    {
        self.setting(key)
    }

    /// 以 `BTreeMap<K, V>` 访问 `key`。
    fn map<K, V>(&self, key: &str) -> Result<Setting<BTreeMap<K, V>>, CombinerError>
    where
        K: Describe + FromConfigValue + Ord,
        V: Describe + FromConfigValue,
    {
        self.setting(key)
    }
}

impl TypedAccess for Combiner {
    fn setting<T>(&self, key: &str) -> Result<Setting<T>, CombinerError>
    where
        T: Describe + FromConfigValue,
    {
        self.custom(TypeDescriptor::of::<T, _>(key)?)
    }

    fn custom<T>(&self, descriptor: TypeDescriptor) -> Result<Setting<T>, CombinerError>
    where
        T: FromConfigValue,
    {
        self.issue(&descriptor)?;
        Ok(Setting::new(self.clone(), descriptor))
    }
}

/// 键前缀子视图，所有访问都委托给门面。
///
/// 子视图可以继续嵌套：`combiner.subset("db").subset("pool")` 访问 `db.pool.*`。
#[derive(Clone)]
pub struct Subset {
    combiner: Combiner,
    prefix: Arc<str>,
}

impl Subset {
    /// 子视图的完整前缀，不含末尾的分隔点。
    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 子视图所依附的门面。
    pub fn combiner(&self) -> &Combiner {
        &self.combiner
    }

    fn qualify(&self, key: &str) -> String {
        format!("{}.{key}", self.prefix)
    }

    /// 在当前前缀之下再取一层子视图。
    pub fn subset(&self, prefix: &str) -> Subset {
        Subset {
            combiner: self.combiner.clone(),
            prefix: Arc::from(self.qualify(prefix)),
        }
    }

    /// 将描述符映射到完整键。
    pub fn qualified(&self, descriptor: &TypeDescriptor) -> TypeDescriptor {
        descriptor.with_key(self.qualify(descriptor.key()))
    }

    /// 以完整键查询 [`Combiner::has`]。
    pub fn has(&self, descriptor: &TypeDescriptor) -> Result<bool, CombinerError> {
        self.combiner.has(&self.qualified(descriptor))
    }

    /// 按子视图内的键注册强引用监听器。
    pub fn register_key<L>(&self, key: &str, listener: Arc<L>) -> Result<ObserverHandle, CombinerError>
    where
        L: ConfigListener + 'static,
    {
        self.combiner
            .register(listener, Interest::key(self.qualify(key)))
    }

    /// 按子视图内的键注册弱引用监听器。
    pub fn register_key_soft<L>(
        &self,
        key: &str,
        listener: &Arc<L>,
    ) -> Result<ObserverHandle, CombinerError>
    where
        L: ConfigListener + 'static,
    {
        self.combiner
            .register_soft(listener, Interest::key(self.qualify(key)))
    }
}

impl TypedAccess for Subset {
    fn setting<T>(&self, key: &str) -> Result<Setting<T>, CombinerError>
    where
        T: Describe + FromConfigValue,
    {
        self.combiner.setting(&self.qualify(key))
    }

    fn custom<T>(&self, descriptor: TypeDescriptor) -> Result<Setting<T>, CombinerError>
    where
        T: FromConfigValue,
    {
        self.combiner.custom(self.qualified(&descriptor))
    }
}

impl fmt::Debug for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subset")
            .field("combiner", &self.combiner.name())
            .field("prefix", &self.prefix)
            .finish()
    }
}
