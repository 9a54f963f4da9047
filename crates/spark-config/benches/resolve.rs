use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use spark_config::prelude::*;

fn layered(depth: usize) -> Combiner {
    let mut builder = Combiner::builder("bench");
    for index in 0..depth {
        let entries: Vec<(String, i32)> = if index + 1 == depth {
            vec![("hot".to_owned(), 1)]
        } else {
            Vec::new()
        };
        builder
            .register_source(Arc::new(MemorySource::from_entries(
                format!("layer-{index}"),
                entries,
            )))
            .expect("register source");
    }
    builder.build().expect("build combiner")
}

/// Benchmark: 已缓存描述符的读路径。
///
/// *Why*：绝大多数读取命中缓存，只取读锁，这条路径的开销决定了句柄能否放在热路径上。
/// *How*：键位于第八层，先读一次填充缓存，再循环读取。
/// *What*：输出关注单次读取耗时。
fn bench_cached_read(c: &mut Criterion) {
    let combiner = layered(8);
    let hot = combiner.int("hot").expect("issue descriptor");
    hot.value().expect("warm cache");
    c.bench_function("combiner_cached_read", |b| {
        b.iter(|| criterion::black_box(hot.value().expect("cached read")));
    });
}

/// Benchmark: 首次解析穿透全部数据源。
///
/// *Why*：未缓存时需要取写锁并按声明顺序逐层询问，衡量层数对首次读取的影响。
/// *How*：每次迭代重新装配引擎，避免缓存命中。
fn bench_first_resolve(c: &mut Criterion) {
    c.bench_function("combiner_first_resolve_depth_8", |b| {
        b.iter(|| {
            let combiner = layered(8);
            criterion::black_box(combiner.int("hot").and_then(|hot| hot.value()).expect("resolve"));
        });
    });
}

/// Benchmark: 一轮带变化的更新周期。
fn bench_update_cycle(c: &mut Criterion) {
    let source = Arc::new(MemorySource::from_entries("only", [("hot", 0)]));
    let writer = source.writer();
    let combiner = Combiner::builder("bench-update")
        .with_source(source)
        .and_then(CombinerBuilder::build)
        .expect("build combiner");
    let mut manager = combiner.manager().expect("take manager");
    let hot = combiner.int("hot").expect("issue descriptor");
    let mut round = 0_i32;
    c.bench_function("combiner_update_cycle", |b| {
        b.iter(|| {
            round += 1;
            writer.set("hot", round);
            criterion::black_box(manager.update().expect("update").run_all());
        });
    });
    criterion::black_box(hot.value().expect("read after updates"));
}

criterion_group!(
    resolve_benches,
    bench_cached_read,
    bench_first_resolve,
    bench_update_cycle
);
criterion_main!(resolve_benches);
