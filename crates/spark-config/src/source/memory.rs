//! 内存映射数据源。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::TypeDescriptor;
use crate::source::staging::StagingArea;
use crate::source::{Source, SourceError};
use crate::value::ConfigValue;

type Entries = BTreeMap<String, ConfigValue>;

/// 基于内存映射的数据源快照。
///
/// ### 契约说明（What）
/// - 快照内容不可变；修改经由 [`MemorySourceWriter`] 暂存，直到更新周期调用 `refreshed`；
/// - `has` 只检查键是否存在，值的结构由引擎按描述符校验。
///
/// ### 逻辑解析（How）
/// - 快照与写入器共享同一个 [`StagingArea`]，快照记录构建时的代际，
///   `has_update` 比较暂存代际与自身代际即可，不读取数据。
pub struct MemorySource {
    name: Arc<str>,
    generation: u64,
    entries: Arc<Entries>,
    staging: StagingArea<Entries>,
}

impl MemorySource {
    /// 以初始键值对构造数据源。
    pub fn from_entries<N, I, K, V>(name: N, entries: I) -> Self
    where
        N: Into<Arc<str>>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ConfigValue>,
    {
        let entries: Entries = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        let staging = StagingArea::new(entries);
        let (generation, entries) = staging.load();
        Self {
            name: name.into(),
            generation,
            entries,
            staging,
        }
    }

    /// 空数据源。
    pub fn empty<N>(name: N) -> Self
    where
        N: Into<Arc<str>>,
    {
        Self::from_entries(name, std::iter::empty::<(String, ConfigValue)>())
    }

    /// 返回共享同一暂存区的写入器。
    pub fn writer(&self) -> MemorySourceWriter {
        MemorySourceWriter {
            staging: self.staging.clone(),
        }
    }

    /// 快照中某个键的原始值。
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    /// 快照构建时的代际。
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Source for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn has(&self, descriptor: &TypeDescriptor) -> bool {
        self.entries.contains_key(descriptor.key())
    }

    fn value_for(&self, descriptor: &TypeDescriptor) -> Result<ConfigValue, SourceError> {
        self.entries.get(descriptor.key()).cloned().ok_or_else(|| {
            SourceError::new(
                &*self.name,
                format!("key `{}` is not present", descriptor.key()),
            )
        })
    }

    fn has_update(&self) -> bool {
        self.staging.generation() != self.generation
    }

    fn refreshed(self: Arc<Self>) -> Result<Arc<dyn Source>, SourceError> {
        if !self.has_update() {
            return Ok(self);
        }
        let (generation, entries) = self.staging.load();
        Ok(Arc::new(Self {
            name: Arc::clone(&self.name),
            generation,
            entries,
            staging: self.staging.clone(),
        }))
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("keys", &self.entries.len())
            .finish()
    }
}

/// [`MemorySource`] 的暂存写入器，可跨线程克隆。
///
/// 每个方法返回提交后的代际。
#[derive(Clone, Debug)]
pub struct MemorySourceWriter {
    staging: StagingArea<Entries>,
}

impl MemorySourceWriter {
    /// 暂存一次写入，返回新的暂存版本号。
    pub fn set<K, V>(&self, key: K, value: V) -> u64
    where
        K: Into<String>,
        V: Into<ConfigValue>,
    {
        let (key, value) = (key.into(), value.into());
        self.staging.modify(move |entries| {
            entries.insert(key, value);
        })
    }

    /// 暂存一次删除，返回新的暂存版本号。
    pub fn remove(&self, key: &str) -> u64 {
        self.staging.modify(|entries| {
            entries.remove(key);
        })
    }

    /// 以全新内容替换暂存数据。
    pub fn replace_all<I, K, V>(&self, entries: I) -> u64
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ConfigValue>,
    {
        self.staging.stage(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}
