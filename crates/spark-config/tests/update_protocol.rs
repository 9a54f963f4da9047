//! 更新协议的集成测试。
//!
//! # 教案级导览
//!
//! - **Why**：更新管理器是唯一能替换数据源代际的入口。它必须做到“查询无副作用、替换要么全做要么不做”，
//!   否则读者会在两代配置之间看到撕裂的混合视图。
//! - **How**：以内存数据源的写入器模拟外部变更，用 `proptest` 随机穿插查询与写入，
//!   再以一个刷新必然失败的数据源验证失败时旧代保持不变。
//! - **What**：覆盖 `has_update` 的幂等性、空更新、具体场景的变更通知、出现与消失的变化判定、
//!   集合内容变化，以及刷新失败与旧值读取失败时的回滚。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use proptest::prelude::*;
use spark_config::prelude::*;

fn scenario() -> (Combiner, MemorySourceWriter, MemorySourceWriter) {
    let first = Arc::new(MemorySource::from_entries("first", [("aInt", ConfigValue::Int(12))]));
    let second = Arc::new(MemorySource::from_entries(
        "second",
        [("aInt", ConfigValue::Int(99)), ("bBool", ConfigValue::Bool(true))],
    ));
    let (first_writer, second_writer) = (first.writer(), second.writer());
    let combiner = Combiner::builder("update")
        .with_source(first)
        .and_then(|builder| builder.with_source(second))
        .and_then(CombinerBuilder::build)
        .expect("场景装配应成功");
    (combiner, first_writer, second_writer)
}

/// 刷新时总是失败的数据源，用来验证更新的原子性。
struct FlakySource {
    fail: AtomicBool,
}

impl Source for FlakySource {
    fn name(&self) -> &str {
        "flaky"
    }

    fn has(&self, descriptor: &TypeDescriptor) -> bool {
        descriptor.key() == "flaky"
    }

    fn value_for(&self, _descriptor: &TypeDescriptor) -> Result<ConfigValue, SourceError> {
        Ok(ConfigValue::Int(1))
    }

    fn has_update(&self) -> bool {
        self.fail.load(Ordering::SeqCst)
    }

    fn refreshed(self: Arc<Self>) -> Result<Arc<dyn Source>, SourceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::new("flaky", "backend unreachable"));
        }
        Ok(self)
    }
}

proptest! {
    /// 任意次数的 `has_update` 之间结果一致，且不会推进代际或改变已缓存的值。
    #[test]
    fn has_update_is_a_pure_query(staged in any::<bool>(), queries in 1usize..8) {
        let (combiner, writer, _) = scenario();
        let manager = combiner.manager().unwrap();
        let a_int = combiner.int("aInt").unwrap();
        prop_assert_eq!(a_int.value().unwrap(), 12);
        if staged {
            writer.set("aInt", 77);
        }

        for _ in 0..queries {
            prop_assert_eq!(manager.has_update().unwrap(), staged);
        }
        prop_assert_eq!(combiner.generation().unwrap(), 0);
        prop_assert_eq!(a_int.value().unwrap(), 12);
    }
}

/// ## 测试一：没有过期数据源时更新是空操作
///
/// - **契约 (What)**：连续两次更新都不产生变化与通知，代际号保持为 0。
#[test]
fn update_without_stale_sources_is_empty() {
    let (combiner, _, _) = scenario();
    let mut manager = combiner.manager().unwrap();
    combiner.int("aInt").unwrap().value().unwrap();

    for _ in 0..2 {
        let report = manager.update().unwrap();
        assert!(report.is_empty());
        assert_eq!(report.generation(), 0);
    }
    assert!(!manager.has_update().unwrap());
}

/// ## 测试二：具体场景的完整更新周期
///
/// - **意图 (Why)**：第一层把 `aInt` 改为 77 后，`has_update` 报告过期，
///   更新产生一条针对 `aInt` 的通知，句柄读到新值，而未变化的 `bBool` 不在变化列表中。
/// - **契约 (What)**：通知在更新返回时尚未执行，只有调用方运行后监听器才被触发。
#[test]
fn scenario_update_notifies_the_changed_key() {
    let (combiner, writer, _) = scenario();
    let mut manager = combiner.manager().unwrap();
    let a_int = combiner.int("aInt").unwrap();
    let b_bool = combiner.boolean("bBool").unwrap();
    assert_eq!(a_int.value().unwrap(), 12);
    assert!(b_bool.value().unwrap());

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    combiner
        .register(
            Arc::new(move |_: &TypeDescriptor| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Interest::key("aInt"),
        )
        .unwrap();

    writer.replace_all([("aInt", ConfigValue::Int(77))]);
    assert!(manager.has_update().unwrap());

    let report = manager.update().unwrap();
    assert_eq!(report.generation(), 1);
    assert_eq!(report.changed(), std::slice::from_ref(a_int.descriptor()));
    assert_eq!(report.notifications().len(), 1);
    assert_eq!(report.notifications()[0].key(), "aInt");
    assert_eq!(fired.load(Ordering::SeqCst), 0, "更新本身不执行通知");

    assert_eq!(a_int.value().unwrap(), 77);
    assert!(b_bool.value().unwrap());
    assert_eq!(report.run_all(), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!manager.has_update().unwrap());
}

/// ## 测试三：值的出现与消失都算变化
#[test]
fn presence_changes_are_reported() {
    let (combiner, first, second) = scenario();
    let mut manager = combiner.manager().unwrap();
    let late = combiner.string("late").unwrap();
    assert_eq!(late.value_or("none".into()).unwrap(), "none");

    second.set("late", "arrived");
    let report = manager.update().unwrap();
    assert_eq!(report.changed(), std::slice::from_ref(late.descriptor()));
    assert_eq!(late.value().unwrap(), "arrived");

    // 第一层删除后回落到第二层：值从 12 变为 99。
    let a_int = combiner.int("aInt").unwrap();
    first.remove("aInt");
    let report = manager.update().unwrap();
    assert_eq!(report.changed(), std::slice::from_ref(a_int.descriptor()));
    assert_eq!(a_int.value().unwrap(), 99);

    second.remove("late");
    let report = manager.update().unwrap();
    assert_eq!(report.changed(), std::slice::from_ref(late.descriptor()));
    assert_eq!(late.value().unwrap_err().kind(), CombinerErrorKind::MissingKey);
}

/// ## 测试四：写入相同的值不产生通知
#[test]
fn rewriting_the_same_value_is_not_a_change() {
    let (combiner, writer, _) = scenario();
    let mut manager = combiner.manager().unwrap();
    let a_int = combiner.int("aInt").unwrap();
    a_int.value().unwrap();

    writer.set("aInt", 12);
    assert!(manager.has_update().unwrap());
    let report = manager.update().unwrap();
    assert!(report.is_empty());
    assert_eq!(report.generation(), 1, "过期数据源仍然被替换");
    assert!(!manager.has_update().unwrap());
}

/// ## 测试五：数据源刷新失败时整轮更新回滚
///
/// - **契约 (What)**：更新返回数据源错误，代际号、缓存与数据源集合保持原样；
///   故障消除后下一轮更新照常完成，之前暂存的变更随之生效。
#[test]
fn failed_refresh_keeps_the_previous_generation() {
    let memory = Arc::new(MemorySource::from_entries("memory", [("aInt", 12)]));
    let writer = memory.writer();
    let flaky = Arc::new(FlakySource {
        fail: AtomicBool::new(true),
    });
    let combiner = Combiner::builder("atomic")
        .with_source(memory)
        .and_then(|builder| builder.with_source(Arc::clone(&flaky) as Arc<dyn Source>))
        .and_then(CombinerBuilder::build)
        .unwrap();
    let mut manager = combiner.manager().unwrap();
    let a_int = combiner.int("aInt").unwrap();
    assert_eq!(a_int.value().unwrap(), 12);

    writer.set("aInt", 13);
    let err = manager.update().unwrap_err();
    assert_eq!(err.kind(), CombinerErrorKind::Source);
    assert!(err.to_string().contains("backend unreachable"), "{err}");
    assert_eq!(combiner.generation().unwrap(), 0);
    assert_eq!(a_int.value().unwrap(), 12);
    assert!(manager.has_update().unwrap());

    flaky.fail.store(false, Ordering::SeqCst);
    let report = manager.update().unwrap();
    assert_eq!(report.generation(), 1);
    assert_eq!(a_int.value().unwrap(), 13);
}

/// 在刷新之前读取总是失败、刷新之后恢复正常的数据源。
struct BrokenUntilRefreshed {
    healthy: bool,
    staged: AtomicBool,
}

impl Source for BrokenUntilRefreshed {
    fn name(&self) -> &str {
        "broken"
    }

    fn has(&self, descriptor: &TypeDescriptor) -> bool {
        descriptor.key() == "k"
    }

    fn value_for(&self, _descriptor: &TypeDescriptor) -> Result<ConfigValue, SourceError> {
        if self.healthy {
            Ok(ConfigValue::Int(5))
        } else {
            Err(SourceError::new("broken", "stale handle"))
        }
    }

    fn has_update(&self) -> bool {
        !self.healthy && self.staged.load(Ordering::SeqCst)
    }

    fn refreshed(self: Arc<Self>) -> Result<Arc<dyn Source>, SourceError> {
        Ok(Arc::new(Self {
            healthy: true,
            staged: AtomicBool::new(false),
        }))
    }
}

/// ## 测试六：旧代读取失败时整轮更新中止
///
/// - **意图 (Why)**：已签发但从未读取的描述符没有缓存值，比对时需要回到旧集合读取旧值；
///   这次读取失败意味着无法判断是否变化，不能当作“原本缺失”而报告一次出现。
/// - **契约 (What)**：更新返回数据源错误，代际号保持为 0，也不产生任何通知。
#[test]
fn failed_baseline_read_aborts_the_update() {
    let broken = Arc::new(BrokenUntilRefreshed {
        healthy: false,
        staged: AtomicBool::new(false),
    });
    let combiner = Combiner::builder("baseline")
        .with_source(Arc::clone(&broken) as Arc<dyn Source>)
        .and_then(CombinerBuilder::build)
        .unwrap();
    let mut manager = combiner.manager().unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    combiner
        .register(
            Arc::new(move |_: &TypeDescriptor| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Interest::All,
        )
        .unwrap();
    let k = combiner.int("k").unwrap();

    broken.staged.store(true, Ordering::SeqCst);
    assert!(manager.has_update().unwrap());
    let err = manager.update().unwrap_err();
    assert_eq!(err.kind(), CombinerErrorKind::Source);
    assert!(err.to_string().contains("stale handle"), "{err}");
    assert_eq!(combiner.generation().unwrap(), 0);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(k.value().unwrap_err().kind(), CombinerErrorKind::Source);
}

/// ## 测试七：集合内容变化即使元素个数不变也被报告
///
/// - **契约 (What)**：原始集合 `[1, 1]` 改写为 `[1, 2]` 后，`tags` 出现在变化列表中并产生一条通知，
///   句柄随后读到 `{1, 2}`。
#[test]
fn set_contents_change_is_reported() {
    let source = Arc::new(MemorySource::from_entries(
        "sets",
        [("tags", ConfigValue::Set(vec![ConfigValue::Int(1), ConfigValue::Int(1)]))],
    ));
    let writer = source.writer();
    let combiner = Combiner::builder("sets")
        .with_source(source)
        .and_then(CombinerBuilder::build)
        .unwrap();
    let mut manager = combiner.manager().unwrap();
    let tags = combiner.set::<i32>("tags").unwrap();
    assert_eq!(tags.value().unwrap(), BTreeSet::from([1]));
    combiner
        .register(Arc::new(|_: &TypeDescriptor| {}), Interest::key("tags"))
        .unwrap();

    writer.set("tags", ConfigValue::Set(vec![ConfigValue::Int(1), ConfigValue::Int(2)]));
    let report = manager.update().unwrap();
    assert_eq!(report.changed(), std::slice::from_ref(tags.descriptor()));
    assert_eq!(report.notifications().len(), 1);
    assert_eq!(tags.value().unwrap(), BTreeSet::from([1, 2]));
}

/// ## 测试八：更新管理器只能领取一次
#[test]
fn manager_cannot_be_taken_twice() {
    let (combiner, _, _) = scenario();
    let _manager = combiner.manager().unwrap();
    let err = combiner.clone().manager().unwrap_err();
    assert_eq!(err.kind(), CombinerErrorKind::UsageOrder);
}

/// ## 测试九：通知可以被移交给其他线程执行
#[test]
fn notifications_can_be_dispatched_elsewhere() {
    let (combiner, writer, _) = scenario();
    let mut manager = combiner.manager().unwrap();
    combiner.int("aInt").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    combiner
        .register(
            Arc::new(move |descriptor: &TypeDescriptor| sink.lock().push(descriptor.to_string())),
            Interest::All,
        )
        .unwrap();

    writer.set("aInt", 1);
    let notifications = manager.update().unwrap().into_notifications();
    std::thread::spawn(move || notifications.into_iter().for_each(Notification::run))
        .join()
        .unwrap();
    assert_eq!(*seen.lock(), vec!["aInt: int".to_owned()]);
}
