//! 绑定到单个描述符的强类型句柄。

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::combiner::Combiner;
use crate::descriptor::TypeDescriptor;
use crate::error::CombinerError;
use crate::observer::{ConfigListener, Interest, ObserverHandle};
use crate::value::{ConfigValue, FromConfigValue};

/// 绑定到单个描述符的惰性强类型句柄。
///
/// ### 契约说明（What）
/// - 句柄本身不持有值，每次读取都委托给门面的缓存，因此更新周期之后读到的是新一代的值；
/// - [`Setting::value`] 缺失时返回 [`CombinerError::MissingKey`]，[`Setting::value_or`] 退化为默认值；
/// - [`Setting::exists`] 直接询问当前代的数据源，不依赖缓存；
/// - 相等性由（引擎实例，描述符）决定。
pub struct Setting<T> {
    combiner: Combiner,
    descriptor: TypeDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Setting<T> {
    pub(crate) fn new(combiner: Combiner, descriptor: TypeDescriptor) -> Self {
        Self {
            combiner,
            descriptor,
            _marker: PhantomData,
        }
    }

    /// 句柄绑定的描述符。
    #[inline]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// 句柄绑定的键。
    #[inline]
    pub fn key(&self) -> &str {
        self.descriptor.key()
    }

    /// 句柄所属的门面。
    #[inline]
    pub fn combiner(&self) -> &Combiner {
        &self.combiner
    }

    /// 当前代的数据源能否提供该描述符。
    pub fn exists(&self) -> Result<bool, CombinerError> {
        self.combiner.exists(&self.descriptor)
    }

    /// 未经类型还原的原始值。
    pub fn raw(&self) -> Result<ConfigValue, CombinerError> {
        self.combiner.resolve(&self.descriptor)
    }

    /// 以精确描述符兴趣注册强引用监听器。
    pub fn register<L>(&self, listener: Arc<L>) -> Result<ObserverHandle, CombinerError>
    where
        L: ConfigListener + 'static,
    {
        self.combiner
            .register(listener, Interest::descriptor(self.descriptor.clone()))
    }

    /// 以精确描述符兴趣注册弱引用监听器。
    pub fn register_soft<L>(&self, listener: &Arc<L>) -> Result<ObserverHandle, CombinerError>
    where
        L: ConfigListener + 'static,
    {
        self.combiner
            .register_soft(listener, Interest::descriptor(self.descriptor.clone()))
    }
}

impl<T: FromConfigValue> Setting<T> {
    /// 读取值，缺失时返回 [`CombinerError::MissingKey`]。
    pub fn value(&self) -> Result<T, CombinerError> {
        let value = self.combiner.resolve(&self.descriptor)?;
        self.extract(&value)
    }

    /// 读取值，缺失时返回 `default`。
    pub fn value_or(&self, default: T) -> Result<T, CombinerError> {
        match self.combiner.try_resolve(&self.descriptor)? {
            Some(value) => self.extract(&value),
            None => Ok(default),
        }
    }

    fn extract(&self, value: &ConfigValue) -> Result<T, CombinerError> {
        T::from_config_value(value).ok_or_else(|| CombinerError::TypeMismatch {
            descriptor: self.descriptor.clone(),
            origin: format!("combiner `{}`", self.combiner.name()),
            found: value.describe(),
        })
    }
}

impl<T> Clone for Setting<T> {
    fn clone(&self) -> Self {
        Self::new(self.combiner.clone(), self.descriptor.clone())
    }
}

impl<T> PartialEq for Setting<T> {
    fn eq(&self, other: &Self) -> bool {
        self.combiner.same_instance(&other.combiner) && self.descriptor == other.descriptor
    }
}

impl<T> Eq for Setting<T> {}

impl<T> fmt::Debug for Setting<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setting")
            .field("combiner", &self.combiner.name())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
