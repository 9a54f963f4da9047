//! 合并引擎的装配入口。

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::combiner::Combiner;
use crate::error::CombinerError;
use crate::options::CombinerOptions;
use crate::registry::SourceRegistry;
use crate::source::Source;

/// [`Combiner`] 的装配器。
///
/// ### 契约说明（What）
/// - 数据源按注册顺序决定优先级，先注册者优先；
/// - 设置了容量上限时，超出上限的注册立即返回 [`CombinerError::InvalidConfiguration`]；
/// - `build` 要求至少一个数据源，并一次性报告全部重名数据源。
pub struct CombinerBuilder {
    name: Arc<str>,
    options: CombinerOptions,
    sources: Vec<Arc<dyn Source>>,
    capacity: Option<usize>,
}

impl CombinerBuilder {
    /// 以引擎名称开始装配。
    pub fn new<N>(name: N) -> Self
    where
        N: Into<Arc<str>>,
    {
        Self {
            name: name.into(),
            options: CombinerOptions::default(),
            sources: Vec::new(),
            capacity: None,
        }
    }

    /// 整体替换装配参数。
    pub fn with_options(mut self, options: CombinerOptions) -> Self {
        self.options = options;
        self
    }

    /// 是否允许同一键以多种形状签发，默认不允许。
    pub fn allow_mixed_types(mut self, allow: bool) -> Self {
        self.options.allow_mixed_types = allow;
        self
    }

    /// 锁释放时是否公平移交，默认关闭。
    pub fn fair_lock(mut self, fair: bool) -> Self {
        self.options.fair_lock = fair;
        self
    }

    /// 设置加锁时限，超时返回 [`CombinerError::LockTimeout`]。
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.options.lock_timeout = Some(timeout);
        self
    }

    /// 限制最多可注册的数据源数量。
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// 追加一个数据源，优先级低于之前注册的全部数据源。
    pub fn register_source(&mut self, source: Arc<dyn Source>) -> Result<(), CombinerError> {
        if let Some(limit) = self.capacity {
            if self.sources.len() >= limit {
                return Err(CombinerError::configuration(format!(
                    "combiner `{}` accepts at most {limit} source(s)",
                    self.name
                )));
            }
        }
        self.sources.push(source);
        Ok(())
    }

    /// 链式版本的 [`CombinerBuilder::register_source`]。
    pub fn with_source(mut self, source: Arc<dyn Source>) -> Result<Self, CombinerError> {
        self.register_source(source)?;
        Ok(self)
    }

    /// 完成装配；没有任何数据源时返回 `InvalidConfiguration`。
    pub fn build(self) -> Result<Combiner, CombinerError> {
        if self.sources.is_empty() {
            return Err(CombinerError::configuration(format!(
                "combiner `{}` requires at least one source",
                self.name
            )));
        }
        let registry = SourceRegistry::new(self.sources)?;
        debug!(
            combiner = %self.name,
            sources = ?registry,
            allow_mixed_types = self.options.allow_mixed_types,
            "combiner built"
        );
        Ok(Combiner::from_parts(self.name, registry, self.options))
    }
}
