//! 一代有序数据源。

use std::collections::BTreeSet;
use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::trace;

use crate::descriptor::TypeDescriptor;
use crate::error::CombinerError;
use crate::source::Source;
use crate::value::ConfigValue;

/// 一代数据源的有序集合。
///
/// ### 契约说明（What）
/// - 构造时校验名称唯一，重复时一次性列出全部重名；
/// - 顺序即优先级：[`SourceRegistry::first_match`] 按声明顺序返回首个命中的值，后续同名键被遮蔽；
/// - 集合本身不可变，克隆只增加引用计数；更新周期通过 [`SourceRegistry::refreshed`] 构造下一代，
///   再由写锁内的 [`SourceRegistry::replace`] 整体替换。
#[derive(Clone)]
pub struct SourceRegistry {
    sources: Arc<[Arc<dyn Source>]>,
}

impl SourceRegistry {
    /// 按优先级顺序构造注册表，拒绝重名数据源。
    pub fn new(sources: Vec<Arc<dyn Source>>) -> Result<Self, CombinerError> {
        let duplicates = duplicate_names(&sources);
        if !duplicates.is_empty() {
            return Err(CombinerError::DuplicateSource {
                names: duplicates.into_iter().collect(),
            });
        }
        Ok(Self {
            sources: sources.into(),
        })
    }

    /// 按声明顺序查找首个能提供描述符的数据源并取值。
    ///
    /// ### 契约说明（What）
    /// - 返回 `Ok(None)` 表示当前没有任何数据源可提供该描述符；
    /// - 命中的数据源给出的值若不满足描述符形状，返回 [`CombinerError::TypeMismatch`]，不会继续向后查找；
    /// - 数据源自身的读取失败原样上抛。
    pub fn first_match(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<Option<ConfigValue>, CombinerError> {
        let Some(source) = self.sources.iter().find(|source| source.has(descriptor)) else {
            return Ok(None);
        };
        let value = source.value_for(descriptor)?;
        if !value.conforms_to(descriptor.shape()) {
            return Err(CombinerError::TypeMismatch {
                descriptor: descriptor.clone(),
                origin: format!("source `{}`", source.name()),
                found: value.describe(),
            });
        }
        trace!(source = %source.name(), key = %descriptor, "resolved from source");
        Ok(Some(value))
    }

    /// 是否有任一数据源能提供该描述符，不读取值。
    pub fn contains(&self, descriptor: &TypeDescriptor) -> bool {
        self.sources.iter().any(|source| source.has(descriptor))
    }

    /// 是否有任一数据源报告更新。纯查询。
    pub fn has_update(&self) -> bool {
        self.sources.iter().any(|source| source.has_update())
    }

    /// 报告更新的数据源名称。
    pub fn stale_names(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|source| source.has_update())
            .map(|source| source.name())
            .collect()
    }

    /// 构造下一代候选集合：过期的数据源替换为 `refreshed` 的结果，其余原样保留。
    ///
    /// 没有任何数据源过期时返回 `Ok(None)`。
    pub fn refreshed(&self) -> Result<Option<SourceRegistry>, CombinerError> {
        if !self.has_update() {
            return Ok(None);
        }
        let mut next = self.copy();
        for slot in &mut next {
            if slot.has_update() {
                *slot = Arc::clone(slot).refreshed()?;
            }
        }
        Self::new(next).map(Some)
    }

    /// 当前集合的时点副本。
    pub fn copy(&self) -> Vec<Arc<dyn Source>> {
        self.sources.to_vec()
    }

    /// 整体替换为下一代，返回被替换的集合。
    pub fn replace(&mut self, next: SourceRegistry) -> SourceRegistry {
        mem::replace(self, next)
    }

    /// 按优先级顺序列出数据源名称。
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.sources.iter().map(|source| source.name())
    }

    /// 数据源数量。
    #[inline]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// 是否没有任何数据源。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn duplicate_names(sources: &[Arc<dyn Source>]) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for source in sources {
        if !seen.insert(source.name()) {
            duplicates.insert(source.name().to_owned());
        }
    }
    duplicates
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
