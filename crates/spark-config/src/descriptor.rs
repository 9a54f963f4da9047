//! 值类别、形状与类型描述符。

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::CombinerError;

/// 形状允许的最大嵌套深度（标量为第 1 层）。
pub const MAX_SHAPE_DEPTH: usize = 8;

/// 配置值的类别标签。
///
/// ### 契约说明（What）
/// - 标量类别对应固定的 Rust 基础类型；`List`/`Set`/`Map` 为容器，需要携带元素形状；
/// - `Custom` 表示应用自定义类型，以名称区分，元素形状不做约束。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum ValueClass {
    /// `bool`
    Bool,
    /// `i8`
    Byte,
    /// `char`
    Char,
    /// `i16`
    Short,
    /// `i32`
    Int,
    /// `i64`
    Long,
    /// `f32`
    Float,
    /// `f64`
    Double,
    /// `String`
    Text,
    /// 列表，一个元素形状。
    List,
    /// 集合，一个元素形状。
    Set,
    /// 映射，键与值两个元素形状。
    Map,
    /// 以名称区分的应用自定义类型。
    Custom(Cow<'static, str>),
}

impl ValueClass {
    /// 返回类别的稳定名称。
    pub fn as_str(&self) -> &str {
        match self {
            Self::Bool => "bool",
            Self::Byte => "byte",
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Text => "text",
            Self::List => "list",
            Self::Set => "set",
            Self::Map => "map",
            Self::Custom(name) => &**name,
        }
    }

    /// 该类别要求的元素形状数量；`None` 表示不限制（自定义类型）。
    pub const fn arity(&self) -> Option<usize> {
        match self {
            Self::List | Self::Set => Some(1),
            Self::Map => Some(2),
            Self::Custom(_) => None,
            _ => Some(0),
        }
    }

    /// 是否为容器类别。
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::List | Self::Set | Self::Map)
    }
}

impl fmt::Display for ValueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 请求值的结构形状：类别加上有序的元素形状。
///
/// ### 契约说明（What）
/// - 相等与哈希均按结构比较；
/// - 通过 [`Shape::validate`] 检查容器元数与嵌套深度，描述符构造时自动调用。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Shape {
    class: ValueClass,
    elements: Vec<Shape>,
}

impl Shape {
    /// 构造标量形状。容器类别传入此处会在校验时被拒绝。
    pub fn scalar(class: ValueClass) -> Self {
        Self {
            class,
            elements: Vec::new(),
        }
    }

    /// 元素形状为 `element` 的列表。
    pub fn list(element: Shape) -> Self {
        Self {
            class: ValueClass::List,
            elements: vec![element],
        }
    }

    /// 元素形状为 `element` 的集合。
    pub fn set(element: Shape) -> Self {
        Self {
            class: ValueClass::Set,
            elements: vec![element],
        }
    }

    /// 键值形状分别为 `key` 与 `value` 的映射。
    pub fn map(key: Shape, value: Shape) -> Self {
        Self {
            class: ValueClass::Map,
            elements: vec![key, value],
        }
    }

    /// 构造自定义类型形状，`elements` 描述其泛型参数（可为空）。
    pub fn custom<N>(name: N, elements: Vec<Shape>) -> Self
    where
        N: Into<Cow<'static, str>>,
    {
        Self {
            class: ValueClass::Custom(name.into()),
            elements,
        }
    }

    /// 最外层的值类别。
    #[inline]
    pub fn class(&self) -> &ValueClass {
        &self.class
    }

    /// 按声明顺序排列的元素形状。
    #[inline]
    pub fn elements(&self) -> &[Shape] {
        &self.elements
    }

    /// 形状的嵌套深度，标量为 1。
    pub fn depth(&self) -> usize {
        1 + self.elements.iter().map(Shape::depth).max().unwrap_or(0)
    }

    /// 校验形状是否结构完整。
    ///
    /// ### 契约说明（What）
    /// - 每一层的元素数量必须与类别元数一致；
    /// - 深度不得超过 [`MAX_SHAPE_DEPTH`]；
    /// - 失败时返回可读原因，由调用方包装为 [`CombinerError::InvalidDescriptor`]。
    pub fn validate(&self) -> Result<(), Cow<'static, str>> {
        if self.depth() > MAX_SHAPE_DEPTH {
            return Err(Cow::Owned(format!(
                "shape `{self}` nests deeper than {MAX_SHAPE_DEPTH} levels"
            )));
        }
        self.validate_arity()
    }

    fn validate_arity(&self) -> Result<(), Cow<'static, str>> {
        if let Some(expected) = self.class.arity() {
            if self.elements.len() != expected {
                return Err(Cow::Owned(format!(
                    "`{}` expects {expected} element shape(s), got {}",
                    self.class,
                    self.elements.len()
                )));
            }
        }
        self.elements.iter().try_for_each(Shape::validate_arity)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.class.as_str())?;
        if self.elements.is_empty() {
            return Ok(());
        }
        f.write_str("<")?;
        for (index, element) in self.elements.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{element}")?;
        }
        f.write_str(">")
    }
}

/// 配置键与请求形状的组合，是缓存、观察者与句柄共享的不可变标识。
///
/// ### 契约说明（What）
/// - 两个描述符相等当且仅当键、类别与元素形状逐层相等；
/// - 构造时完成结构校验，之后不可变，克隆只增加引用计数。
///
/// ### 逻辑解析（How）
/// - 键与形状均以 `Arc` 持有，在缓存、观察者注册表与 [`crate::Setting`] 之间共享。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeDescriptor {
    key: Arc<str>,
    shape: Arc<Shape>,
}

impl TypeDescriptor {
    /// 以显式形状构造描述符。
    ///
    /// 键为空或形状不完整时返回 [`CombinerError::InvalidDescriptor`]。
    pub fn new<K>(key: K, shape: Shape) -> Result<Self, CombinerError>
    where
        K: Into<Arc<str>>,
    {
        let key = key.into();
        if key.is_empty() {
            return Err(CombinerError::InvalidDescriptor {
                key: String::new(),
                reason: Cow::Borrowed("configuration key must not be empty"),
            });
        }
        shape
            .validate()
            .map_err(|reason| CombinerError::InvalidDescriptor {
                key: key.to_string(),
                reason,
            })?;
        Ok(Self {
            key,
            shape: Arc::new(shape),
        })
    }

    /// 根据 Rust 类型的 [`Describe`] 实现构造描述符。
    pub fn of<T, K>(key: K) -> Result<Self, CombinerError>
    where
        T: Describe,
        K: Into<Arc<str>>,
    {
        Self::new(key, T::shape())
    }

    /// 描述符的键。
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// 描述符要求的形状。
    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// 形状最外层的值类别。
    #[inline]
    pub fn class(&self) -> &ValueClass {
        self.shape.class()
    }

    /// 保留形状、替换键，供带前缀的子视图使用。
    pub(crate) fn with_key(&self, key: impl Into<Arc<str>>) -> Self {
        Self {
            key: key.into(),
            shape: Arc::clone(&self.shape),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.shape)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({self})")
    }
}

/// 由 Rust 类型显式给出其配置形状。
///
/// 容器访问器借助此 trait 在调用点构造描述符，不依赖运行时类型反射。
pub trait Describe {
    /// 该类型对应的配置形状。
    fn shape() -> Shape;
}

macro_rules! describe_scalar {
    ($($ty:ty => $class:ident),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn shape() -> Shape {
                    Shape::scalar(ValueClass::$class)
                }
            }
        )*
    };
}

describe_scalar! {
    bool => Bool,
    i8 => Byte,
    char => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => Text,
}

impl<T: Describe> Describe for Vec<T> {
    fn shape() -> Shape {
        Shape::list(T::shape())
    }
}

impl<T: Describe> Describe for BTreeSet<T> {
    fn shape() -> Shape {
        Shape::set(T::shape())
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn shape() -> Shape {
        Shape::map(K::shape(), V::shape())
    }
}
