//! 数据源契约与内置适配器。

use std::borrow::Cow;
use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

use crate::descriptor::TypeDescriptor;
use crate::value::ConfigValue;

#[cfg(feature = "json")]
pub mod json;
pub mod memory;
pub mod staging;

/// 配置数据源契约。
///
/// ### 设计目的（Why）
/// - 把文件、内存映射、远程文档等后端统一为“具名、只读、可能过期”的快照；
/// - 合并引擎只依赖此契约完成首个命中解析与代际替换，不关心底层存储。
///
/// ### 契约说明（What）
/// - `name`：在同一合并引擎内必须唯一，构造时校验；
/// - `has`：当前快照能否提供满足描述符的值；
/// - `value_for`：前置条件为 `has(descriptor)` 返回 `true`，返回值的结构应满足描述符形状，
///   否则引擎以类型不匹配报错；
/// - `has_update`：纯查询，重复调用不得改变任何可观察状态；
/// - `refreshed`：无更新时返回自身，否则返回新的不可变快照，旧快照保持不变。
///
/// # 线程安全
/// - 快照在读线程与更新线程之间共享，因此要求 `Send + Sync`。
pub trait Source: Send + Sync {
    /// 数据源的稳定名称。
    fn name(&self) -> &str;

    /// 判断当前快照能否提供该描述符。
    fn has(&self, descriptor: &TypeDescriptor) -> bool;

    /// 读取描述符对应的值。
    fn value_for(&self, descriptor: &TypeDescriptor) -> Result<ConfigValue, SourceError>;

    /// 底层数据是否已变化。
    fn has_update(&self) -> bool;

    /// 生成最新快照；无更新时返回自身。
    fn refreshed(self: Arc<Self>) -> Result<Arc<dyn Source>, SourceError>;
}

/// 数据源自身的失败（解析、I/O 等）。
///
/// 引擎内部从不捕获此错误，它经由 [`crate::CombinerError::Source`] 原样交给调用方。
#[derive(Debug, Error)]
#[error("source `{source_name}` failed: {message}")]
pub struct SourceError {
    source_name: String,
    message: Cow<'static, str>,
    #[source]
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl SourceError {
    /// 构造不带底层原因的数据源错误。
    pub fn new<N, M>(source_name: N, message: M) -> Self
    where
        N: Into<String>,
        M: Into<Cow<'static, str>>,
    {
        Self {
            source_name: source_name.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// 附带底层错误。
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 出错数据源的名称。
    #[inline]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// 错误描述。
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}
