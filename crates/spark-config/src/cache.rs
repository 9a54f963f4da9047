//! 按描述符的值缓存与签发记录。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::descriptor::TypeDescriptor;
use crate::error::CombinerError;
use crate::value::ConfigValue;

/// 按描述符缓存的解析结果，以及曾经签发过的描述符集合。
///
/// ### 契约说明（What）
/// - 缓存命中以描述符精确相等为准，结构相容但不相等的描述符不会互相命中；
/// - 描述符在缓存中存在，当且仅当当前代的某个数据源能提供它；不存在即“当前不可解析”；
/// - 未允许混合类型时，同一个键最多签发一种描述符，之后以其他形状请求同键返回类型冲突。
///
/// ### 逻辑解析（How）
/// - 值映射以 `Arc` 持有：读者拿到的快照在更新周期整体替换时保持不变，
///   首次填充则通过 `Arc::make_mut` 写时复制。
#[derive(Clone, Debug)]
pub struct ValueCache {
    values: Arc<HashMap<TypeDescriptor, ConfigValue>>,
    issued: BTreeSet<TypeDescriptor>,
    issued_by_key: HashMap<String, TypeDescriptor>,
    allow_mixed_types: bool,
}

impl ValueCache {
    /// 创建空缓存；`allow_mixed_types` 决定同一键能否以多种形状签发。
    pub fn new(allow_mixed_types: bool) -> Self {
        Self {
            values: Arc::new(HashMap::new()),
            issued: BTreeSet::new(),
            issued_by_key: HashMap::new(),
            allow_mixed_types,
        }
    }

    /// 是否允许同一键以多种形状签发。
    #[inline]
    pub fn allows_mixed_types(&self) -> bool {
        self.allow_mixed_types
    }

    /// 按描述符精确查找已缓存的值。
    pub fn get(&self, descriptor: &TypeDescriptor) -> Option<&ConfigValue> {
        self.values.get(descriptor)
    }

    /// 是否存在与该描述符精确相等的缓存项。
    pub fn has(&self, descriptor: &TypeDescriptor) -> bool {
        self.values.contains_key(descriptor)
    }

    /// 描述符是否已经签发。
    pub fn is_issued(&self, descriptor: &TypeDescriptor) -> bool {
        self.issued.contains(descriptor)
    }

    /// 检查签发该描述符是否违反“一个键一种类型”的约束，不修改状态。
    pub fn check_issue(&self, descriptor: &TypeDescriptor) -> Result<(), CombinerError> {
        if self.allow_mixed_types || self.issued.contains(descriptor) {
            return Ok(());
        }
        match self.issued_by_key.get(descriptor.key()) {
            Some(issued) if issued != descriptor => Err(CombinerError::TypeConflict {
                issued: issued.clone(),
                requested: descriptor.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// 签发描述符；首次签发返回 `true`。
    pub fn issue(&mut self, descriptor: &TypeDescriptor) -> Result<bool, CombinerError> {
        self.check_issue(descriptor)?;
        if !self.issued.insert(descriptor.clone()) {
            return Ok(false);
        }
        self.issued_by_key
            .entry(descriptor.key().to_owned())
            .or_insert_with(|| descriptor.clone());
        debug!(key = %descriptor, issued = self.issued.len(), "descriptor issued");
        Ok(true)
    }

    /// 写入首次解析的结果。
    pub fn insert(&mut self, descriptor: TypeDescriptor, value: ConfigValue) {
        Arc::make_mut(&mut self.values).insert(descriptor, value);
    }

    /// 已签发描述符的有序副本，供更新周期逐一重算。
    pub fn issued(&self) -> Vec<TypeDescriptor> {
        self.issued.iter().cloned().collect()
    }

    /// 当前值映射的快照。
    pub fn values(&self) -> Arc<HashMap<TypeDescriptor, ConfigValue>> {
        Arc::clone(&self.values)
    }

    /// 以下一代的值映射整体替换当前映射。签发集合保持不变。
    pub fn replace_values(&mut self, values: HashMap<TypeDescriptor, ConfigValue>) {
        self.values = Arc::new(values);
    }

    /// 已缓存的值数量。
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 是否没有任何缓存值。
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
