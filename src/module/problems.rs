//! 问题缓存
//!
//! 缓存每个模块的依赖探测结果。探测是递归且高频的操作，同一
//! 模块在一次模拟中会被多个依赖方重复问到，缓存把每个模块的
//! 结果记一次。
//!
//! 缓存分两层，对应探测的两种严格度：
//!
//! - `with_needs` 层：NEEDS 依赖视同硬依赖；
//! - `without_needs` 层：NEEDS 依赖不计入问题（用于判断某模块
//!   能否作为 NEEDS 提供者候选，避免提供者环互相否决）。
//!
//! 进行中的探测在缓存里登记 [`ProbeEntry::InProgress`]，递归
//! 回到同一模块时按所在层的环容忍策略处理，不会无限递归。

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::module::metadata::Problem;

/// 探测层
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeTier {
    /// NEEDS 视同硬依赖
    WithNeeds,
    /// NEEDS 不计入问题
    WithoutNeeds,
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEntry {
    /// 探测进行中（递归尚未返回）
    InProgress,
    /// 探测完成，记录发现的问题集（空集表示无问题）
    Done(BTreeSet<Problem>),
}

/// 两层问题缓存
#[derive(Debug, Default)]
pub struct ProblemCache {
    with_needs: HashMap<String, ProbeEntry>,
    without_needs: HashMap<String, ProbeEntry>,
}

impl ProblemCache {
    /// 创建空缓存
    pub fn new() -> Self {
        Self::default()
    }

    fn tier(&self, tier: ProbeTier) -> &HashMap<String, ProbeEntry> {
        match tier {
            ProbeTier::WithNeeds => &self.with_needs,
            ProbeTier::WithoutNeeds => &self.without_needs,
        }
    }

    fn tier_mut(&mut self, tier: ProbeTier) -> &mut HashMap<String, ProbeEntry> {
        match tier {
            ProbeTier::WithNeeds => &mut self.with_needs,
            ProbeTier::WithoutNeeds => &mut self.without_needs,
        }
    }

    /// 查询缓存条目
    pub fn get(&self, tier: ProbeTier, name: &str) -> Option<&ProbeEntry> {
        self.tier(tier).get(name)
    }

    /// 登记探测开始
    pub fn begin(&mut self, tier: ProbeTier, name: &str) {
        self.tier_mut(tier)
            .insert(name.to_string(), ProbeEntry::InProgress);
    }

    /// 登记探测完成
    pub fn finish(&mut self, tier: ProbeTier, name: &str, problems: BTreeSet<Problem>) {
        self.tier_mut(tier)
            .insert(name.to_string(), ProbeEntry::Done(problems));
    }

    /// 向已完成条目追加一个问题
    ///
    /// 用于激活失败后把硬问题记入缓存。条目不存在时新建。
    pub fn add_problem(&mut self, tier: ProbeTier, name: &str, problem: Problem) {
        let entry = self
            .tier_mut(tier)
            .entry(name.to_string())
            .or_insert_with(|| ProbeEntry::Done(BTreeSet::new()));
        match entry {
            ProbeEntry::Done(problems) => {
                problems.insert(problem);
            }
            ProbeEntry::InProgress => {
                let mut problems = BTreeSet::new();
                problems.insert(problem);
                *entry = ProbeEntry::Done(problems);
            }
        }
    }

    /// 丢弃指定模块在两层中的条目
    pub fn forget(&mut self, name: &str) {
        self.with_needs.remove(name);
        self.without_needs.remove(name);
    }

    /// 清空两层缓存
    pub fn clear_all(&mut self) {
        self.with_needs.clear();
        self.without_needs.clear();
    }

    /// 精确失效：丢弃结论可能过期的停用模块条目
    ///
    /// 注册表发生变化（注册、删除、重载、启停完成）后调用。空条目
    /// 与含软问题（模块依赖与令牌依赖）的条目都可能因注册表变化
    /// 而改变结论，一律丢弃；全是硬问题（激活失败、环境约束）的
    /// 条目保留，避免重复探测注定失败的模块。
    ///
    /// # 参数
    ///
    /// * `is_disabled` - 判断模块当前是否处于停用状态
    ///
    /// # 返回
    ///
    /// 被丢弃的、原本记录了问题的模块名集合，调用方据此补发问题
    /// 变更事件（丢弃无问题条目不构成可观察的变化）。
    pub fn clear_soft_entries<F>(&mut self, is_disabled: F) -> BTreeSet<String>
    where
        F: Fn(&str) -> bool,
    {
        let mut changed = BTreeSet::new();

        for tier in [&mut self.with_needs, &mut self.without_needs] {
            tier.retain(|name, entry| {
                let drop = match entry {
                    ProbeEntry::Done(problems) => {
                        if !is_disabled(name) {
                            false
                        } else if problems.is_empty() {
                            true
                        } else {
                            let soft = problems.iter().any(|p| !p.is_hard());
                            if soft {
                                changed.insert(name.clone());
                            }
                            soft
                        }
                    }
                    // 不应残留进行中条目，保险起见一并丢弃
                    ProbeEntry::InProgress => true,
                };
                !drop
            });
        }

        if !changed.is_empty() {
            trace!(count = changed.len(), "问题缓存软条目已失效");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::{Dependency, Problem};

    fn soft_problem() -> Problem {
        Problem::UnmetDependency(Dependency::requires("db.kv"))
    }

    fn hard_problem() -> Problem {
        Problem::ActivationFailure {
            module: "demo".to_string(),
            reason: "boom".to_string(),
        }
    }

    #[test]
    fn test_tiers_are_independent() {
        let mut cache = ProblemCache::new();
        cache.finish(ProbeTier::WithNeeds, "demo", BTreeSet::new());

        assert!(matches!(
            cache.get(ProbeTier::WithNeeds, "demo"),
            Some(ProbeEntry::Done(_))
        ));
        assert!(cache.get(ProbeTier::WithoutNeeds, "demo").is_none());
    }

    #[test]
    fn test_in_progress_lifecycle() {
        let mut cache = ProblemCache::new();
        cache.begin(ProbeTier::WithNeeds, "demo");
        assert!(matches!(
            cache.get(ProbeTier::WithNeeds, "demo"),
            Some(ProbeEntry::InProgress)
        ));

        cache.finish(ProbeTier::WithNeeds, "demo", BTreeSet::new());
        assert!(matches!(
            cache.get(ProbeTier::WithNeeds, "demo"),
            Some(ProbeEntry::Done(_))
        ));
    }

    #[test]
    fn test_clear_soft_keeps_hard_only_entries() {
        let mut cache = ProblemCache::new();

        let mut soft = BTreeSet::new();
        soft.insert(soft_problem());
        cache.finish(ProbeTier::WithNeeds, "soft_mod", soft);

        let mut hard = BTreeSet::new();
        hard.insert(hard_problem());
        cache.finish(ProbeTier::WithNeeds, "hard_mod", hard);

        cache.finish(ProbeTier::WithNeeds, "clean_mod", BTreeSet::new());

        let changed = cache.clear_soft_entries(|_| true);
        assert_eq!(changed.len(), 1);
        assert!(changed.contains("soft_mod"));
        assert!(cache.get(ProbeTier::WithNeeds, "hard_mod").is_some());
        // 空条目也可能因注册表变化而过期，必须丢弃重算
        assert!(cache.get(ProbeTier::WithNeeds, "clean_mod").is_none());
    }

    #[test]
    fn test_clear_soft_skips_enabled_modules() {
        let mut cache = ProblemCache::new();
        let mut soft = BTreeSet::new();
        soft.insert(soft_problem());
        cache.finish(ProbeTier::WithNeeds, "enabled_mod", soft);

        let changed = cache.clear_soft_entries(|_| false);
        assert!(changed.is_empty());
        assert!(cache.get(ProbeTier::WithNeeds, "enabled_mod").is_some());
    }

    #[test]
    fn test_mixed_entry_is_dropped() {
        // 软硬混合的条目按软处理，注册表变化后重新探测
        let mut cache = ProblemCache::new();
        let mut mixed = BTreeSet::new();
        mixed.insert(soft_problem());
        mixed.insert(hard_problem());
        cache.finish(ProbeTier::WithoutNeeds, "mixed_mod", mixed);

        let changed = cache.clear_soft_entries(|_| true);
        assert!(changed.contains("mixed_mod"));
    }

    #[test]
    fn test_add_problem_to_existing_entry() {
        let mut cache = ProblemCache::new();
        cache.finish(ProbeTier::WithNeeds, "demo", BTreeSet::new());
        cache.add_problem(ProbeTier::WithNeeds, "demo", hard_problem());

        match cache.get(ProbeTier::WithNeeds, "demo") {
            Some(ProbeEntry::Done(problems)) => assert_eq!(problems.len(), 1),
            other => panic!("意外的缓存条目: {:?}", other),
        }
    }

    #[test]
    fn test_forget_clears_both_tiers() {
        let mut cache = ProblemCache::new();
        cache.finish(ProbeTier::WithNeeds, "demo", BTreeSet::new());
        cache.finish(ProbeTier::WithoutNeeds, "demo", BTreeSet::new());

        cache.forget("demo");
        assert!(cache.get(ProbeTier::WithNeeds, "demo").is_none());
        assert!(cache.get(ProbeTier::WithoutNeeds, "demo").is_none());
    }
}
