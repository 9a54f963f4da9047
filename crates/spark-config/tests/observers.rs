//! 观察者注册表与更新通知的集成测试。
//!
//! # 教案级导览
//!
//! - **Why**：监听器只应在自己关心的描述符真正变化时被点名；弱引用监听器被释放后
//!   不能继续占用注册表，也不能在执行阶段被“复活”。
//! - **How**：用一个记录收到描述符的监听器，分别以全部、键、精确描述符三种兴趣注册，
//!   通过写入器暂存变更并驱动一轮更新后比对通知集合。
//! - **What**：覆盖兴趣扇出、强弱引用生命周期、句柄注销与子视图上的键注册。

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use spark_config::prelude::*;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
}

impl Recorder {
    fn seen(&self) -> BTreeSet<String> {
        self.seen.lock().iter().cloned().collect()
    }
}

impl ConfigListener for Recorder {
    fn on_change(&self, descriptor: &TypeDescriptor) {
        self.seen.lock().push(descriptor.to_string());
    }
}

fn mixed() -> (Combiner, MemorySourceWriter) {
    let source = Arc::new(MemorySource::from_entries(
        "only",
        [("x", ConfigValue::Int(12)), ("y", ConfigValue::Int(1))],
    ));
    let writer = source.writer();
    let combiner = Combiner::builder("observers")
        .allow_mixed_types(true)
        .with_source(source)
        .and_then(CombinerBuilder::build)
        .expect("装配应成功");
    (combiner, writer)
}

/// ## 测试一：三种兴趣的扇出
///
/// - **契约 (What)**：`x` 从 12 变为 99 后，键兴趣只收到 `x`，全部兴趣收到每个变化的描述符，
///   精确描述符兴趣只收到与之完全相等的那一个。
#[test]
fn interests_select_their_notifications() {
    let (combiner, writer) = mixed();
    let mut manager = combiner.manager().unwrap();
    let x = combiner.int("x").unwrap();
    let y = combiner.int("y").unwrap();
    x.value().unwrap();
    y.value().unwrap();

    let by_key = Arc::new(Recorder::default());
    let everything = Arc::new(Recorder::default());
    let exact_y = Arc::new(Recorder::default());
    combiner.register(Arc::clone(&by_key), Interest::key("x")).unwrap();
    combiner.register(Arc::clone(&everything), Interest::All).unwrap();
    y.register(Arc::clone(&exact_y)).unwrap();

    writer.set("x", 99);
    let report = manager.update().unwrap();
    assert_eq!(report.notifications().len(), 2);
    report.run_all();
    assert_eq!(by_key.seen(), BTreeSet::from(["x: int".to_owned()]));
    assert_eq!(everything.seen(), BTreeSet::from(["x: int".to_owned()]));
    assert!(exact_y.seen().is_empty());

    writer.replace_all([("x", ConfigValue::Int(1)), ("y", ConfigValue::Int(2))]);
    manager.update().unwrap().run_all();
    assert_eq!(
        everything.seen(),
        BTreeSet::from(["x: int".to_owned(), "y: int".to_owned()])
    );
    assert_eq!(exact_y.seen(), BTreeSet::from(["y: int".to_owned()]));
    assert_eq!(by_key.seen.lock().len(), 2);
}

/// ## 测试二：键兴趣覆盖同一键的不同形状
#[test]
fn key_interest_spans_every_shape_of_the_key() {
    let (combiner, writer) = mixed();
    let mut manager = combiner.manager().unwrap();
    let as_int = combiner.int("x").unwrap();
    let as_text = combiner.string("x").unwrap();
    assert_eq!(as_int.value().unwrap(), 12);
    assert_eq!(as_text.value().unwrap_err().kind(), CombinerErrorKind::TypeMismatch);

    let recorder = Arc::new(Recorder::default());
    combiner.register(Arc::clone(&recorder), Interest::key("x")).unwrap();

    writer.set("x", "twelve");
    manager.update().unwrap().run_all();
    assert_eq!(
        recorder.seen(),
        BTreeSet::from(["x: int".to_owned(), "x: text".to_owned()]),
        "int 形状从有值变为不可解析，text 形状从不可解析变为有值"
    );
    assert_eq!(as_text.value().unwrap(), "twelve");
}

/// ## 测试三：弱引用监听器释放后被清理，句柄注销不报错
#[test]
fn released_soft_listeners_are_collected() {
    let (combiner, writer) = mixed();
    let mut manager = combiner.manager().unwrap();
    combiner.int("x").unwrap();

    let strong = Arc::new(Recorder::default());
    let soft = Arc::new(Recorder::default());
    let strong_handle = combiner.register(Arc::clone(&strong), Interest::All).unwrap();
    let soft_handle = combiner.register_soft(&soft, Interest::All).unwrap();
    assert_ne!(strong_handle, soft_handle);
    assert_eq!(combiner.observer_count().unwrap(), 2);

    drop(soft);
    assert_eq!(combiner.observer_count().unwrap(), 1, "已释放的监听器不计入存活数量");
    assert_eq!(combiner.compact_observers().unwrap(), 1);
    assert!(!combiner.deregister(soft_handle).unwrap(), "已清理的句柄注销返回 false");

    writer.set("x", 5);
    let report = manager.update().unwrap();
    assert_eq!(report.notifications().len(), 1);
    assert_eq!(report.notifications()[0].handle(), strong_handle);
    report.run_all();
    assert_eq!(strong.seen(), BTreeSet::from(["x: int".to_owned()]));

    assert!(combiner.deregister(strong_handle).unwrap());
    assert!(!combiner.deregister(strong_handle).unwrap());
    assert_eq!(combiner.observer_count().unwrap(), 0);
}

/// ## 测试四：通知收集之后、执行之前释放的弱引用监听器被静默跳过
#[test]
fn soft_listener_released_before_dispatch_is_skipped() {
    let (combiner, writer) = mixed();
    let mut manager = combiner.manager().unwrap();
    combiner.int("x").unwrap();
    let soft = Arc::new(Recorder::default());
    combiner.register_soft(&soft, Interest::key("x")).unwrap();

    writer.set("x", 7);
    let report = manager.update().unwrap();
    assert_eq!(report.notifications().len(), 1);
    let weak = Arc::downgrade(&soft);
    drop(soft);
    assert_eq!(report.run_all(), 1);
    assert!(weak.upgrade().is_none());
}

/// ## 测试五：子视图上的键注册使用完整键
#[test]
fn subset_registrations_use_qualified_keys() {
    let source = Arc::new(MemorySource::from_entries(
        "only",
        [("server.port", 80), ("client.port", 81)],
    ));
    let writer = source.writer();
    let combiner = Combiner::builder("subsets")
        .with_source(source)
        .and_then(CombinerBuilder::build)
        .unwrap();
    let mut manager = combiner.manager().unwrap();

    let server = combiner.subset("server");
    let port = server.int("port").unwrap();
    assert_eq!(port.key(), "server.port");
    assert_eq!(port.value().unwrap(), 80);
    combiner.int("client.port").unwrap().value().unwrap();

    let recorder = Arc::new(Recorder::default());
    server.register_key("port", Arc::clone(&recorder)).unwrap();

    writer.replace_all([("server.port", 8080), ("client.port", 8081)]);
    manager.update().unwrap().run_all();
    assert_eq!(recorder.seen(), BTreeSet::from(["server.port: int".to_owned()]));
    assert_eq!(port.value().unwrap(), 8080);
}
