//! 装配参数。

use std::time::Duration;

use crate::lock::LockPolicy;

/// 合并引擎的装配参数。
///
/// ### 契约说明（What）
/// - `allow_mixed_types`：是否允许同一个键以多种形状签发，默认严格；
/// - `fair_lock`：锁释放时是否公平移交，默认关闭；
/// - `lock_timeout`：加锁时限，`None` 表示无限等待；
/// - 序列化形式以毫秒表示时限（`lock_timeout_ms`），便于与业务配置放在同一文档中。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CombinerOptions {
    /// 是否允许同一个键以多种形状签发。
    pub allow_mixed_types: bool,
    /// 锁释放时是否公平移交。
    pub fair_lock: bool,
    /// 加锁时限。
    pub lock_timeout: Option<Duration>,
}

impl CombinerOptions {
    /// 转换为锁获取策略。
    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            fair: self.fair_lock,
            timeout: self.lock_timeout,
        }
    }

    fn from_repr(repr: CombinerOptionsRepr) -> Self {
        Self {
            allow_mixed_types: repr.allow_mixed_types,
            fair_lock: repr.fair_lock,
            lock_timeout: repr.lock_timeout_ms.map(Duration::from_millis),
        }
    }

    fn to_repr(self) -> CombinerOptionsRepr {
        CombinerOptionsRepr {
            allow_mixed_types: self.allow_mixed_types,
            fair_lock: self.fair_lock,
            lock_timeout_ms: self
                .lock_timeout
                .map(|timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

impl serde::Serialize for CombinerOptions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde::Serialize::serialize(&self.to_repr(), serializer)
    }
}

impl<'de> serde::Deserialize<'de> for CombinerOptions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let repr = <CombinerOptionsRepr as serde::Deserialize>::deserialize(deserializer)?;
        Ok(Self::from_repr(repr))
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct CombinerOptionsRepr {
    #[serde(default)]
    allow_mixed_types: bool,
    #[serde(default)]
    fair_lock: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lock_timeout_ms: Option<u64>,
}
