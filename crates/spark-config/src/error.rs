//! 统一错误类型。

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::descriptor::TypeDescriptor;
use crate::lock::LockMode;
use crate::source::SourceError;

/// 配置合并引擎的统一错误类型。
///
/// ### 契约说明（What）
/// - 所有错误都在触发调用处同步返回，引擎内部不吞掉任何错误；
/// - 唯一的降级路径是 [`crate::Setting::value_or`]：缺失键退化为调用方给出的默认值；
/// - 数据源自身的失败（解析、I/O）以 [`CombinerError::Source`] 原样透传。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CombinerError {
    /// 没有任何数据源能提供该描述符。
    #[error("no configuration source provides `{descriptor}`")]
    MissingKey {
        /// 请求的描述符。
        descriptor: TypeDescriptor,
    },

    /// 同一键已以另一种形状签发，且未允许混合类型。
    #[error("key `{}` was already issued as `{issued}`, refusing `{requested}`", issued.key())]
    TypeConflict {
        /// 已签发的描述符。
        issued: TypeDescriptor,
        /// 被拒绝的描述符。
        requested: TypeDescriptor,
    },

    /// 数据源声称持有该键，但实际值的结构与描述符不符。
    #[error("`{descriptor}` from {origin} holds a value of shape `{found}`")]
    TypeMismatch {
        /// 请求的描述符。
        descriptor: TypeDescriptor,
        /// 值的出处，例如某个数据源。
        origin: String,
        /// 实际值的形状。
        found: String,
    },

    /// 构造时出现重名数据源，`names` 列出全部重复名称。
    #[error("duplicate configuration source name(s): {}", names.join(", "))]
    DuplicateSource {
        /// 排序后的重复名称。
        names: Vec<String>,
    },

    /// 更新管理器的使用顺序不正确，例如重复领取。
    #[error("usage order violated: {context}")]
    UsageOrder {
        /// 违规的具体情形。
        context: Cow<'static, str>,
    },

    /// 在配置的时限内未取得锁。
    #[error("{mode} lock not acquired within {timeout:?}")]
    LockTimeout {
        /// 等待的加锁模式。
        mode: LockMode,
        /// 配置的时限。
        timeout: Duration,
    },

    /// 描述符结构不完整。
    #[error("invalid descriptor for key `{key}`: {reason}")]
    InvalidDescriptor {
        /// 描述符的键。
        key: String,
        /// 不合法的原因。
        reason: Cow<'static, str>,
    },

    /// 引擎装配参数不合法，例如未注册任何数据源。
    #[error("invalid combiner configuration: {context}")]
    InvalidConfiguration {
        /// 不合法的具体参数。
        context: Cow<'static, str>,
    },

    /// 数据源自身的失败。
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl CombinerError {
    /// 返回错误类别。
    pub fn kind(&self) -> CombinerErrorKind {
        match self {
            Self::MissingKey { .. } => CombinerErrorKind::MissingKey,
            Self::TypeConflict { .. } => CombinerErrorKind::TypeConflict,
            Self::TypeMismatch { .. } => CombinerErrorKind::TypeMismatch,
            Self::DuplicateSource { .. } => CombinerErrorKind::DuplicateSource,
            Self::UsageOrder { .. } => CombinerErrorKind::UsageOrder,
            Self::LockTimeout { .. } => CombinerErrorKind::LockTimeout,
            Self::InvalidDescriptor { .. } => CombinerErrorKind::InvalidDescriptor,
            Self::InvalidConfiguration { .. } => CombinerErrorKind::InvalidConfiguration,
            Self::Source(_) => CombinerErrorKind::Source,
        }
    }

    pub(crate) fn usage<C>(context: C) -> Self
    where
        C: Into<Cow<'static, str>>,
    {
        Self::UsageOrder {
            context: context.into(),
        }
    }

    pub(crate) fn configuration<C>(context: C) -> Self
    where
        C: Into<Cow<'static, str>>,
    {
        Self::InvalidConfiguration {
            context: context.into(),
        }
    }
}

/// 错误类别，便于调用方按类别分支处理。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CombinerErrorKind {
    /// 见 [`CombinerError::MissingKey`]。
    MissingKey,
    /// 见 [`CombinerError::TypeConflict`]。
    TypeConflict,
    /// 见 [`CombinerError::TypeMismatch`]。
    TypeMismatch,
    /// 见 [`CombinerError::DuplicateSource`]。
    DuplicateSource,
    /// 见 [`CombinerError::UsageOrder`]。
    UsageOrder,
    /// 见 [`CombinerError::LockTimeout`]。
    LockTimeout,
    /// 见 [`CombinerError::InvalidDescriptor`]。
    InvalidDescriptor,
    /// 见 [`CombinerError::InvalidConfiguration`]。
    InvalidConfiguration,
    /// 见 [`CombinerError::Source`]。
    Source,
}

impl CombinerErrorKind {
    /// 返回类别的稳定字符串。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingKey => "missing_key",
            Self::TypeConflict => "type_conflict",
            Self::TypeMismatch => "type_mismatch",
            Self::DuplicateSource => "duplicate_source",
            Self::UsageOrder => "usage_order",
            Self::LockTimeout => "lock_timeout",
            Self::InvalidDescriptor => "invalid_descriptor",
            Self::InvalidConfiguration => "invalid_configuration",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for CombinerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const _: fn() = || {
    fn assert_error_traits<T: std::error::Error + Send + Sync + 'static>() {}

    assert_error_traits::<CombinerError>();
    assert_error_traits::<SourceError>();
};
