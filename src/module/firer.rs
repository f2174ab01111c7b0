//! 变更通知
//!
//! 本模块提供引擎的事件模型与批量变更收集器。
//!
//! 复合操作（启用一批模块、删除一批模块）过程中产生的所有变更
//! 先积攒在 [`ChangeFirer`] 里，操作的状态修改全部落定之后一次
//! 性派发。监听器看到的是操作完成后的一致状态，永远不会观察到
//! 中间态。
//!
//! 监听器回调里不允许再调用引擎的修改接口（引擎检测到后返回
//! [`ReentrantMutation`]）；回调 panic 被捕获并记录日志，不影响
//! 其余监听器。
//!
//! [`ReentrantMutation`]: crate::utils::CoreError::ReentrantMutation

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, trace};

// ==================== 属性名 ====================

/// 注册模块集合变化
pub const PROP_MODULES: &str = "modules";
/// 已启用模块集合变化
pub const PROP_ENABLED_MODULES: &str = "enabled_modules";
/// 单个模块的启用状态变化
pub const PROP_ENABLED: &str = "enabled";
/// 单个模块的问题集变化
pub const PROP_PROBLEMS: &str = "problems";
/// 单个模块的元数据被重载
pub const PROP_METADATA: &str = "metadata";

/// 引擎事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleEvent {
    /// 模块注册完成
    Created {
        /// 模块名
        module: String,
    },
    /// 模块被删除
    Deleted {
        /// 模块名
        module: String,
    },
    /// 属性变化
    PropertyChanged {
        /// 相关模块；引擎级属性（如 [`PROP_MODULES`]）为 `None`
        module: Option<String>,
        /// 属性名，取本模块定义的 `PROP_*` 常量
        property: &'static str,
        /// 布尔属性的旧值（非布尔属性为 `None`）
        old: Option<bool>,
        /// 布尔属性的新值（非布尔属性为 `None`）
        new: Option<bool>,
    },
}

/// 变更监听器
pub trait ChangeListener: Send + Sync {
    /// 接收一个事件
    ///
    /// 在触发变更的调用方线程上同步执行，此时引擎持有读锁，
    /// 查询接口可用、修改接口被拒绝。
    fn on_change(&self, event: &ModuleEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&ModuleEvent) + Send + Sync,
{
    fn on_change(&self, event: &ModuleEvent) {
        self(event)
    }
}

/// 监听器句柄，用于注销
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// 批量变更收集器
///
/// 一次复合操作对应一个实例，操作结束时 [`fire`](ChangeFirer::fire)
/// 清空并派发。
#[derive(Debug, Default)]
pub struct ChangeFirer {
    created: Vec<String>,
    deleted: Vec<String>,
    changes: Vec<ModuleEvent>,
    /// (模块, 属性, 旧值, 新值) 去重键
    seen: HashSet<(Option<String>, &'static str, Option<bool>, Option<bool>)>,
}

impl ChangeFirer {
    /// 创建空收集器
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否没有积攒任何变更
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.changes.is_empty()
    }

    /// 记录模块创建
    pub fn created(&mut self, module: &str) {
        self.created.push(module.to_string());
    }

    /// 记录模块删除
    pub fn deleted(&mut self, module: &str) {
        self.deleted.push(module.to_string());
    }

    /// 记录属性变化
    ///
    /// 同一 (模块, 属性, 旧值, 新值) 组合在一个批次内只记一次。
    pub fn change(
        &mut self,
        module: Option<&str>,
        property: &'static str,
        old: Option<bool>,
        new: Option<bool>,
    ) {
        let key = (module.map(str::to_string), property, old, new);
        if !self.seen.insert(key) {
            return;
        }
        self.changes.push(ModuleEvent::PropertyChanged {
            module: module.map(str::to_string),
            property,
            old,
            new,
        });
    }

    /// 派发积攒的全部变更并清空
    ///
    /// 顺序：创建事件、删除事件、属性变化（按记录顺序）。单个
    /// 监听器 panic 被捕获并记录错误日志，派发继续。
    pub fn fire(&mut self, listeners: &[Arc<dyn ChangeListener>]) {
        if self.is_empty() {
            return;
        }

        let mut events: Vec<ModuleEvent> = Vec::with_capacity(
            self.created.len() + self.deleted.len() + self.changes.len(),
        );
        events.extend(
            self.created
                .drain(..)
                .map(|module| ModuleEvent::Created { module }),
        );
        events.extend(
            self.deleted
                .drain(..)
                .map(|module| ModuleEvent::Deleted { module }),
        );
        events.append(&mut self.changes);
        self.seen.clear();

        trace!(events = events.len(), listeners = listeners.len(), "派发变更事件");

        for event in &events {
            for listener in listeners {
                let result = catch_unwind(AssertUnwindSafe(|| listener.on_change(event)));
                if result.is_err() {
                    error!(?event, "变更监听器 panic，已忽略");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn collect() -> (Arc<Mutex<Vec<ModuleEvent>>>, Arc<dyn ChangeListener>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: Arc<dyn ChangeListener> =
            Arc::new(move |event: &ModuleEvent| sink.lock().push(event.clone()));
        (events, listener)
    }

    #[test]
    fn test_fire_order() {
        let (events, listener) = collect();
        let mut firer = ChangeFirer::new();

        firer.change(None, PROP_MODULES, None, None);
        firer.deleted("old_mod");
        firer.created("new_mod");
        firer.fire(&[listener]);

        let events = events.lock();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ModuleEvent::Created { .. }));
        assert!(matches!(events[1], ModuleEvent::Deleted { .. }));
        assert!(matches!(events[2], ModuleEvent::PropertyChanged { .. }));
    }

    #[test]
    fn test_duplicate_changes_merged() {
        let (events, listener) = collect();
        let mut firer = ChangeFirer::new();

        firer.change(Some("demo"), PROP_ENABLED, Some(false), Some(true));
        firer.change(Some("demo"), PROP_ENABLED, Some(false), Some(true));
        firer.change(Some("demo"), PROP_PROBLEMS, None, None);
        firer.fire(&[listener]);

        assert_eq!(events.lock().len(), 2);
    }

    #[test]
    fn test_fire_clears_batch() {
        let (events, listener) = collect();
        let mut firer = ChangeFirer::new();

        firer.created("demo");
        firer.fire(std::slice::from_ref(&listener));
        assert!(firer.is_empty());

        firer.fire(&[listener]);
        assert_eq!(events.lock().len(), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_delivery() {
        let (events, listener) = collect();
        let panicking: Arc<dyn ChangeListener> =
            Arc::new(|_: &ModuleEvent| panic!("监听器故障"));

        let mut firer = ChangeFirer::new();
        firer.created("demo");
        firer.fire(&[panicking, listener]);

        assert_eq!(events.lock().len(), 1);
    }
}
