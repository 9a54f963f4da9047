//! JSON 文档数据源。
//!
//! ### 契约说明（What）
//! - 键先按顶层字段精确匹配，未命中时按 `.` 切分逐层进入对象，例如 `server.port`；
//! - 路径存在且不为 `null` 时 `has` 返回 `true`；
//! - 取值依据描述符形状转换：整数做范围检查，`char` 要求恰好一个字符的字符串，
//!   列表与集合来自数组，映射来自对象（非文本键按 JSON 字面量解析）；
//! - 文档值无法按形状转换时退回其自然表示（整数为 `long`、小数为 `double`、字符串为 `text`），
//!   由引擎的结构校验报告类型不匹配。

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::descriptor::{Shape, TypeDescriptor, ValueClass};
use crate::source::staging::StagingArea;
use crate::source::{Source, SourceError};
use crate::value::ConfigValue;

/// JSON 文档快照。
pub struct JsonSource {
    name: Arc<str>,
    generation: u64,
    document: Arc<Value>,
    staging: StagingArea<Value>,
}

impl JsonSource {
    /// 解析 JSON 文本构造数据源。
    pub fn from_str<N>(name: N, text: &str) -> Result<Self, SourceError>
    where
        N: Into<Arc<str>>,
    {
        let name = name.into();
        let document = parse(&name, text)?;
        Ok(Self::from_value(name, document))
    }

    /// 从已解析的 JSON 文档构造数据源。
    pub fn from_value<N>(name: N, document: Value) -> Self
    where
        N: Into<Arc<str>>,
    {
        let staging = StagingArea::new(document);
        let (generation, document) = staging.load();
        Self {
            name: name.into(),
            generation,
            document,
            staging,
        }
    }

    /// 返回共享暂存区的文档写入器。
    pub fn writer(&self) -> JsonDocumentWriter {
        JsonDocumentWriter {
            name: Arc::clone(&self.name),
            staging: self.staging.clone(),
        }
    }

    /// 快照中的完整文档。
    #[inline]
    pub fn document(&self) -> &Value {
        &self.document
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        if let Some(value) = self.document.get(key) {
            return Some(value);
        }
        key.split('.')
            .try_fold(&*self.document, |node, segment| node.get(segment))
    }
}

impl Source for JsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn has(&self, descriptor: &TypeDescriptor) -> bool {
        self.lookup(descriptor.key())
            .is_some_and(|value| !value.is_null())
    }

    fn value_for(&self, descriptor: &TypeDescriptor) -> Result<ConfigValue, SourceError> {
        let value = self.lookup(descriptor.key()).ok_or_else(|| {
            SourceError::new(
                &*self.name,
                format!("path `{}` is not present", descriptor.key()),
            )
        })?;
        convert(value, descriptor.shape()).ok_or_else(|| {
            SourceError::new(
                &*self.name,
                format!(
                    "path `{}` holds null where `{}` was requested",
                    descriptor.key(),
                    descriptor.shape()
                ),
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
        let (generation, document) = self.staging.load();
        Ok(Arc::new(Self {
            name: Arc::clone(&self.name),
            generation,
            document,
            staging: self.staging.clone(),
        }))
    }
}

impl fmt::Debug for JsonSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSource")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// [`JsonSource`] 的暂存写入器。
#[derive(Clone, Debug)]
pub struct JsonDocumentWriter {
    name: Arc<str>,
    staging: StagingArea<Value>,
}

impl JsonDocumentWriter {
    /// 暂存新文档，返回提交后的代际。
    pub fn replace(&self, document: Value) -> u64 {
        self.staging.stage(document)
    }

    /// 解析并暂存新文档；解析失败时暂存区保持不变。
    pub fn replace_str(&self, text: &str) -> Result<u64, SourceError> {
        let document = parse(&self.name, text)?;
        Ok(self.staging.stage(document))
    }
}

fn parse(name: &str, text: &str) -> Result<Value, SourceError> {
    serde_json::from_str(text)
        .map_err(|err| SourceError::new(name, "document is not valid JSON").with_cause(err))
}

fn convert(value: &Value, shape: &Shape) -> Option<ConfigValue> {
    shaped(value, shape).or_else(|| natural(value))
}

fn shaped(value: &Value, shape: &Shape) -> Option<ConfigValue> {
    let converted = match shape.class() {
        ValueClass::Bool => ConfigValue::Bool(value.as_bool()?),
        ValueClass::Byte => ConfigValue::Byte(i8::try_from(value.as_i64()?).ok()?),
        ValueClass::Short => ConfigValue::Short(i16::try_from(value.as_i64()?).ok()?),
        ValueClass::Int => ConfigValue::Int(i32::try_from(value.as_i64()?).ok()?),
        ValueClass::Long => ConfigValue::Long(value.as_i64()?),
        ValueClass::Float => {
            let number = value.as_f64()?;
            if number.abs() > f64::from(f32::MAX) {
                return None;
            }
            ConfigValue::Float(number as f32)
        }
        ValueClass::Double => ConfigValue::Double(value.as_f64()?),
        ValueClass::Char => {
            let mut chars = value.as_str()?.chars();
            let only = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            ConfigValue::Char(only)
        }
        ValueClass::Text => ConfigValue::from(value.as_str()?),
        ValueClass::List => {
            let [element] = shape.elements() else {
                return None;
            };
            ConfigValue::List(
                value
                    .as_array()?
                    .iter()
                    .map(|item| convert(item, element))
                    .collect::<Option<_>>()?,
            )
        }
        ValueClass::Set => {
            let [element] = shape.elements() else {
                return None;
            };
            ConfigValue::set(
                value
                    .as_array()?
                    .iter()
                    .map(|item| convert(item, element))
                    .collect::<Option<Vec<_>>>()?,
            )
        }
        ValueClass::Map => {
            let [key_shape, value_shape] = shape.elements() else {
                return None;
            };
            ConfigValue::map(
                value
                    .as_object()?
                    .iter()
                    .map(|(key, item)| Some((convert_key(key, key_shape)?, convert(item, value_shape)?)))
                    .collect::<Option<Vec<_>>>()?,
            )
        }
        ValueClass::Custom(_) => return None,
    };
    Some(converted)
}

fn convert_key(key: &str, shape: &Shape) -> Option<ConfigValue> {
    if *shape.class() == ValueClass::Text {
        return Some(ConfigValue::from(key));
    }
    match key.parse::<Value>() {
        Ok(literal) => convert(&literal, shape),
        Err(_) => Some(ConfigValue::from(key)),
    }
}

fn natural(value: &Value) -> Option<ConfigValue> {
    let converted = match value {
        Value::Null => return None,
        Value::Bool(flag) => ConfigValue::Bool(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => ConfigValue::Long(integer),
            None => ConfigValue::Double(number.as_f64()?),
        },
        Value::String(text) => ConfigValue::from(text.as_str()),
        Value::Array(items) => {
            ConfigValue::List(items.iter().map(natural).collect::<Option<_>>()?)
        }
        Value::Object(entries) => ConfigValue::map(
            entries
                .iter()
                .map(|(key, item)| Some((ConfigValue::from(key.as_str()), natural(item)?)))
                .collect::<Option<Vec<_>>>()?,
        ),
    };
    Some(converted)
}
