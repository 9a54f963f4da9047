//! 更新协议。
//!
//! ### 契约说明（What）
//! - [`UpdateManager`] 由 [`Combiner::manager`] 一次性领取，是唯一能替换数据源代际的入口；
//! - [`UpdateManager::has_update`] 是纯查询，可重复调用而不改变任何可观察状态；
//! - [`UpdateManager::update`] 刷新过期数据源、重算所有已签发描述符、收集通知，
//!   最后在写锁内一次性替换数据源集合与值缓存；通知不会被执行，交由调用方决定何时运行。
//!
//! ### 逻辑解析（How）
//! 1. 读锁下取得当前代的数据源、已签发描述符与值快照，随即释放；
//! 2. 锁外对过期数据源调用 `refreshed`，构造候选集合；
//! 3. 逐一用首个命中规则在候选集合上重算：出现、消失或值不等都记为变化；
//! 4. 写锁内补算快照之后新签发的描述符，收集通知并整体替换，代际号加一。
//!
//! 数据源失败会中止本轮更新，旧代保持不变；某个描述符在新一代中结构不匹配时视为不可解析，
//! 读者下一次访问时会直接收到类型不匹配错误。

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;

use tracing::{debug, info, warn};

use crate::combiner::Combiner;
use crate::descriptor::TypeDescriptor;
use crate::error::CombinerError;
use crate::observer::Notification;
use crate::registry::SourceRegistry;
use crate::value::ConfigValue;

/// 一次性领取的更新管理器。
///
/// 类型不实现 `Sync`：更新周期只能由持有它的单个线程驱动。
pub struct UpdateManager {
    combiner: Combiner,
    _single_driver: PhantomData<Cell<()>>,
}

impl UpdateManager {
    pub(crate) fn new(combiner: Combiner) -> Self {
        Self {
            combiner,
            _single_driver: PhantomData,
        }
    }

    /// 管理器所属的门面。
    #[inline]
    pub fn combiner(&self) -> &Combiner {
        &self.combiner
    }

    /// 当前代是否有任一数据源报告更新。
    pub fn has_update(&self) -> Result<bool, CombinerError> {
        let state = self.combiner.lock().read()?;
        let stale = state.registry.has_update();
        debug!(combiner = %self.combiner.name(), stale, "staleness checked");
        Ok(stale)
    }

    /// 执行一轮更新，返回变化的描述符与待执行的通知。
    pub fn update(&mut self) -> Result<UpdateReport, CombinerError> {
        let name = self.combiner.name().to_owned();
        let (registry, issued, previous, generation) = {
            let state = self.combiner.lock().read()?;
            (
                state.registry.clone(),
                state.cache.issued(),
                state.cache.values(),
                state.generation,
            )
        };

        let candidate = match registry.refreshed() {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                debug!(combiner = %name, generation, "no stale source, nothing to update");
                return Ok(UpdateReport::empty(generation));
            }
            Err(err) => {
                warn!(combiner = %name, error = %err, "update aborted: source refresh failed");
                return Err(err);
            }
        };

        let mut diff = GenerationDiff::default();
        for descriptor in issued {
            let before = previous.get(&descriptor).cloned();
            diff.recompute(descriptor, before, &registry, &candidate)
                .inspect_err(|err| {
                    warn!(combiner = %name, error = %err, "update aborted: source read failed");
                })?;
        }

        let mut guard = self.combiner.lock().write()?;
        let state = &mut *guard;
        for descriptor in state.cache.issued() {
            if diff.seen.contains(&descriptor) {
                continue;
            }
            let before = state.cache.get(&descriptor).cloned();
            diff.recompute(descriptor, before, &state.registry, &candidate)
                .inspect_err(|err| {
                    warn!(combiner = %name, error = %err, "update aborted: source read failed");
                })?;
        }

        state.observers.compact();
        let notifications: Vec<Notification> = diff
            .changed
            .iter()
            .flat_map(|descriptor| state.observers.notifiable(descriptor))
            .collect();
        state.registry.replace(candidate);
        state.cache.replace_values(diff.values);
        state.generation += 1;

        info!(
            combiner = %name,
            generation = state.generation,
            changed = diff.changed.len(),
            notifications = notifications.len(),
            "configuration generation swapped"
        );
        Ok(UpdateReport {
            generation: state.generation,
            changed: diff.changed,
            notifications,
        })
    }
}

impl std::fmt::Debug for UpdateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateManager")
            .field("combiner", &self.combiner.name())
            .finish()
    }
}

#[derive(Default)]
struct GenerationDiff {
    seen: BTreeSet<TypeDescriptor>,
    values: HashMap<TypeDescriptor, ConfigValue>,
    changed: Vec<TypeDescriptor>,
}

impl GenerationDiff {
    /// 在候选集合上重算一个描述符。
    ///
    /// `before` 为缓存中的旧值；未缓存时回落到旧集合上的首个命中，旧集合上的结构不匹配视为缺失。
    /// 新旧任一集合上的数据源失败都会中止本轮更新。
    fn recompute(
        &mut self,
        descriptor: TypeDescriptor,
        before: Option<ConfigValue>,
        current: &SourceRegistry,
        candidate: &SourceRegistry,
    ) -> Result<(), CombinerError> {
        let before = match before {
            Some(value) => Some(value),
            None => resolvable(current.first_match(&descriptor))?,
        };
        let after = match candidate.first_match(&descriptor) {
            Err(err @ CombinerError::TypeMismatch { .. }) => {
                warn!(key = %descriptor, error = %err, "descriptor no longer resolves");
                None
            }
            other => other?,
        };
        if before != after {
            self.changed.push(descriptor.clone());
        }
        if let Some(value) = after {
            self.values.insert(descriptor.clone(), value);
        }
        self.seen.insert(descriptor);
        Ok(())
    }
}

/// 结构不匹配视为不可解析，其余错误（数据源失败）原样上抛。
fn resolvable(
    outcome: Result<Option<ConfigValue>, CombinerError>,
) -> Result<Option<ConfigValue>, CombinerError> {
    match outcome {
        Err(CombinerError::TypeMismatch { .. }) => Ok(None),
        other => other,
    }
}

/// 一轮更新的结果。
#[derive(Debug)]
pub struct UpdateReport {
    generation: u64,
    changed: Vec<TypeDescriptor>,
    notifications: Vec<Notification>,
}

impl UpdateReport {
    fn empty(generation: u64) -> Self {
        Self {
            generation,
            changed: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// 本轮结束后的代际号；未发生替换时等于更新前的代际号。
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 值发生变化的描述符。
    #[inline]
    pub fn changed(&self) -> &[TypeDescriptor] {
        &self.changed
    }

    /// 待执行的通知，按注册顺序排列。
    #[inline]
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// 没有变化也没有待执行的通知。
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.notifications.is_empty()
    }

    /// 在当前线程依次执行全部通知，返回执行数量。
    pub fn run_all(self) -> usize {
        let count = self.notifications.len();
        self.notifications.into_iter().for_each(Notification::run);
        count
    }

    /// 取出通知以便交给其他线程执行。
    pub fn into_notifications(self) -> Vec<Notification> {
        self.notifications
    }
}
