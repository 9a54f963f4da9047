//! 配置值及其与 Rust 类型之间的转换。

use std::any::Any;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::descriptor::{Shape, ValueClass};

/// 配置值的动态表示。
///
/// ### 契约说明（What）
/// - 标量变体与 [`ValueClass`] 的标量类别一一对应；
/// - `Set` 在构造时去重，比较时忽略顺序与重复；`Map` 以键去重，比较时按键查找，重复键以最后一次出现为准；
/// - 浮点数按位比较，`NaN` 与自身相等，避免更新周期把未变化的 `NaN` 误判为变更。
#[derive(Clone)]
#[non_exhaustive]
pub enum ConfigValue {
    /// 布尔值。
    Bool(bool),
    /// 8 位整数。
    Byte(i8),
    /// 单个字符。
    Char(char),
    /// 16 位整数。
    Short(i16),
    /// 32 位整数。
    Int(i32),
    /// 64 位整数。
    Long(i64),
    /// 单精度浮点数。
    Float(f32),
    /// 双精度浮点数。
    Double(f64),
    /// 文本。
    Text(Arc<str>),
    /// 有序列表。
    List(Vec<ConfigValue>),
    /// 无序集合。
    Set(Vec<ConfigValue>),
    /// 键值映射。
    Map(Vec<(ConfigValue, ConfigValue)>),
    /// 应用自定义类型。
    Custom(CustomValue),
}

impl ConfigValue {
    /// 构造集合值，重复元素只保留首次出现的一个。
    pub fn set<I>(items: I) -> Self
    where
        I: IntoIterator<Item = ConfigValue>,
    {
        let mut unique: Vec<ConfigValue> = Vec::new();
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Self::Set(unique)
    }

    /// 构造映射值，重复键以最后一次写入为准。
    pub fn map<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (ConfigValue, ConfigValue)>,
    {
        let mut unique: Vec<(ConfigValue, ConfigValue)> = Vec::new();
        for (key, value) in entries {
            match unique.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => unique.push((key, value)),
            }
        }
        Self::Map(unique)
    }

    /// 返回值的类别。
    pub fn class(&self) -> ValueClass {
        match self {
            Self::Bool(_) => ValueClass::Bool,
            Self::Byte(_) => ValueClass::Byte,
            Self::Char(_) => ValueClass::Char,
            Self::Short(_) => ValueClass::Short,
            Self::Int(_) => ValueClass::Int,
            Self::Long(_) => ValueClass::Long,
            Self::Float(_) => ValueClass::Float,
            Self::Double(_) => ValueClass::Double,
            Self::Text(_) => ValueClass::Text,
            Self::List(_) => ValueClass::List,
            Self::Set(_) => ValueClass::Set,
            Self::Map(_) => ValueClass::Map,
            Self::Custom(custom) => ValueClass::Custom(custom.name.clone()),
        }
    }

    /// 判断值的实际结构是否满足请求的形状。
    ///
    /// ### 逻辑解析（How）
    /// - 类别必须完全一致；
    /// - 容器逐个元素递归检查，空容器满足任意元素形状；
    /// - 自定义类型只比较名称，其内部结构由应用自行约束。
    pub fn conforms_to(&self, shape: &Shape) -> bool {
        if self.class() != *shape.class() {
            return false;
        }
        match (self, shape.elements()) {
            (Self::List(items) | Self::Set(items), [element]) => {
                items.iter().all(|item| item.conforms_to(element))
            }
            (Self::Map(entries), [key, value]) => entries
                .iter()
                .all(|(k, v)| k.conforms_to(key) && v.conforms_to(value)),
            (Self::Custom(_), _) => true,
            (_, []) => true,
            _ => false,
        }
    }

    /// 以形状的形式描述实际值，用于类型不匹配的错误信息。
    pub fn describe(&self) -> String {
        match self {
            Self::List(items) | Self::Set(items) => match items.first() {
                Some(first) => format!("{}<{}>", self.class(), first.describe()),
                None => format!("{}<>", self.class()),
            },
            Self::Map(entries) => match entries.first() {
                Some((k, v)) => format!("map<{}, {}>", k.describe(), v.describe()),
                None => "map<>".to_owned(),
            },
            _ => self.class().to_string(),
        }
    }
}

impl PartialEq for ConfigValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Byte(a), Self::Byte(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Short(a), Self::Short(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => {
                a.iter().all(|item| b.contains(item)) && b.iter().all(|item| a.contains(item))
            }
            (Self::Map(a), Self::Map(b)) => same_entries(a, b) && same_entries(b, a),
            (Self::Custom(a), Self::Custom(b)) => a == b,
            _ => false,
        }
    }
}

/// `left` 中每个键在 `right` 中都存在且取值相同；重复键以最后一次出现为准。
fn same_entries(left: &[(ConfigValue, ConfigValue)], right: &[(ConfigValue, ConfigValue)]) -> bool {
    left.iter()
        .all(|(key, _)| lookup(left, key) == lookup(right, key))
}

fn lookup<'a>(entries: &'a [(ConfigValue, ConfigValue)], key: &ConfigValue) -> Option<&'a ConfigValue> {
    entries
        .iter()
        .rev()
        .find(|(existing, _)| existing == key)
        .map(|(_, value)| value)
}

impl fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Byte(v) => write!(f, "Byte({v})"),
            Self::Char(v) => write!(f, "Char({v:?})"),
            Self::Short(v) => write!(f, "Short({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Long(v) => write!(f, "Long({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Double(v) => write!(f, "Double({v})"),
            Self::Text(v) => write!(f, "Text({v:?})"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Set(items) => f.debug_tuple("Set").field(items).finish(),
            Self::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Self::Custom(custom) => fmt::Debug::fmt(custom, f),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ConfigValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Byte,
    char => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    CustomValue => Custom,
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Text(Arc::from(value))
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Text(Arc::from(value))
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ConfigValue>> From<BTreeSet<T>> for ConfigValue {
    fn from(items: BTreeSet<T>) -> Self {
        Self::set(items.into_iter().map(Into::into))
    }
}

impl<K: Into<ConfigValue>, V: Into<ConfigValue>> From<BTreeMap<K, V>> for ConfigValue {
    fn from(entries: BTreeMap<K, V>) -> Self {
        Self::map(entries.into_iter().map(|(k, v)| (k.into(), v.into())))
    }
}

/// 应用自定义类型的不透明值。
///
/// 构造时记录具体类型的比较与调试函数，使 [`ConfigValue`] 在不了解具体类型的情况下
/// 仍能完成变更比较；读取时通过 [`CustomValue::downcast_ref`] 还原。
#[derive(Clone)]
pub struct CustomValue {
    name: Cow<'static, str>,
    data: Arc<dyn Any + Send + Sync>,
    eq: fn(&(dyn Any + Send + Sync), &(dyn Any + Send + Sync)) -> bool,
    debug: fn(&(dyn Any + Send + Sync), &mut fmt::Formatter<'_>) -> fmt::Result,
}

impl CustomValue {
    /// 包装一个自定义值，`name` 必须与描述符中 [`ValueClass::Custom`] 的名称一致。
    pub fn new<T, N>(name: N, value: T) -> Self
    where
        T: Any + PartialEq + fmt::Debug + Send + Sync,
        N: Into<Cow<'static, str>>,
    {
        Self {
            name: name.into(),
            data: Arc::new(value),
            eq: |a, b| match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            debug: |data, f| match data.downcast_ref::<T>() {
                Some(value) => fmt::Debug::fmt(value, f),
                None => f.write_str("<opaque>"),
            },
        }
    }

    /// 自定义类型的名称。
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 按具体类型取回内部数据，类型不符时为 `None`。
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && (self.eq)(&*self.data, &*other.data)
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Custom<{}>(", self.name)?;
        (self.debug)(&*self.data, f)?;
        f.write_str(")")
    }
}

/// 从 [`ConfigValue`] 还原强类型值。
///
/// 变体不匹配时返回 `None`，由调用方转换为类型不匹配错误。
pub trait FromConfigValue: Sized {
    /// 变体与 `Self` 对应时返回还原后的值。
    fn from_config_value(value: &ConfigValue) -> Option<Self>;
}

macro_rules! from_value_copy {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromConfigValue for $ty {
                fn from_config_value(value: &ConfigValue) -> Option<Self> {
                    match value {
                        ConfigValue::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

from_value_copy! {
    bool => Bool,
    i8 => Byte,
    char => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
}

impl FromConfigValue for String {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Text(text) => Some(text.to_string()),
            _ => None,
        }
    }
}

impl FromConfigValue for ConfigValue {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromConfigValue for CustomValue {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Custom(custom) => Some(custom.clone()),
            _ => None,
        }
    }
}

impl<T: FromConfigValue> FromConfigValue for Vec<T> {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::List(items) => items.iter().map(T::from_config_value).collect(),
            _ => None,
        }
    }
}

impl<T: FromConfigValue + Ord> FromConfigValue for BTreeSet<T> {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Set(items) => items.iter().map(T::from_config_value).collect(),
            _ => None,
        }
    }
}

impl<K: FromConfigValue + Ord, V: FromConfigValue> FromConfigValue for BTreeMap<K, V> {
    fn from_config_value(value: &ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::Map(entries) => entries
                .iter()
                .map(|(k, v)| Some((K::from_config_value(k)?, V::from_config_value(v)?)))
                .collect(),
            _ => None,
        }
    }
}
