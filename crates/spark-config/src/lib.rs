#![warn(missing_docs)]

//! # spark-config
//!
//! ## 定位与职责（Why）
//! - 将一组有序、相互独立、可能变化的配置数据源合并为一个一致、强类型、可观察的视图；
//! - 保证每个被访问的键在同一时刻只由一个数据源决定（首个命中），
//!   所有读者在显式更新之前都看到同一代的值。
//!
//! ## 架构嵌入（Where）
//! - `descriptor` / `value`：描述“要什么形状的值”与值本身；
//! - `source`：数据源契约与内置的内存、JSON 适配器；
//! - `registry` / `cache` / `observer`：一代数据源、按描述符的值缓存与观察者注册表，
//!   三者由 `lock` 中的同一把读写锁保护；
//! - `manager`：一次性领取的更新管理器，负责刷新、重算、收集通知与代际替换；
//! - `combiner` / `setting` / `builder` / `options`：对外门面、强类型句柄与装配入口。
//!
//! ## Feature 策略（Trade-offs）
//! - `json`（默认开启）引入 `serde_json`，提供 [`source::json::JsonSource`]；
//!   关闭后核心引擎与内存数据源不受影响。
//!
//! ```
//! use std::sync::Arc;
//! use spark_config::prelude::*;
//!
//! # fn main() -> Result<(), CombinerError> {
//! let overrides = Arc::new(MemorySource::from_entries("overrides", [("aInt", 12)]));
//! let writer = overrides.writer();
//! let combiner = Combiner::builder("app")
//!     .with_source(overrides)?
//!     .with_source(Arc::new(MemorySource::from_entries("defaults", [("aInt", 99)])))?
//!     .build()?;
//! let mut manager = combiner.manager()?;
//!
//! let a_int = combiner.int("aInt")?;
//! assert_eq!(a_int.value()?, 12);
//!
//! writer.set("aInt", 77);
//! let report = manager.update()?;
//! assert_eq!(report.changed().len(), 1);
//! assert_eq!(a_int.value()?, 77);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cache;
pub mod combiner;
pub mod descriptor;
pub mod error;
pub mod lock;
pub mod manager;
pub mod observer;
pub mod options;
pub mod registry;
pub mod setting;
pub mod source;
pub mod value;

pub use builder::CombinerBuilder;
pub use combiner::{Combiner, Subset, TypedAccess};
pub use descriptor::{Describe, MAX_SHAPE_DEPTH, Shape, TypeDescriptor, ValueClass};
pub use error::{CombinerError, CombinerErrorKind};
pub use lock::{LockMode, LockPolicy};
pub use manager::{UpdateManager, UpdateReport};
pub use observer::{ConfigListener, Interest, Notification, ObserverHandle};
pub use options::CombinerOptions;
pub use setting::Setting;
pub use source::{Source, SourceError};
pub use value::{ConfigValue, CustomValue, FromConfigValue};

/// 常用类型的一站式导入。
pub mod prelude {
    pub use crate::builder::CombinerBuilder;
    pub use crate::combiner::{Combiner, Subset, TypedAccess};
    pub use crate::descriptor::{Describe, Shape, TypeDescriptor, ValueClass};
    pub use crate::error::{CombinerError, CombinerErrorKind};
    pub use crate::manager::{UpdateManager, UpdateReport};
    pub use crate::observer::{ConfigListener, Interest, Notification, ObserverHandle};
    pub use crate::options::CombinerOptions;
    pub use crate::setting::Setting;
    #[cfg(feature = "json")]
    pub use crate::source::json::JsonSource;
    pub use crate::source::memory::{MemorySource, MemorySourceWriter};
    pub use crate::source::{Source, SourceError};
    pub use crate::value::{ConfigValue, CustomValue, FromConfigValue};
}
