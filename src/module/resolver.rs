//! 依赖解析器
//!
//! 本模块实现引擎的核心算法：递归依赖探测、启用/停用模拟、
//! eager 与 autoload 的不动点搜索、模块间依赖关系查询。
//!
//! 修改路径在引擎写锁内执行；探测、模拟与关系查询只读注册表，
//! 在引擎读锁内也能运行。提供者索引与问题缓存放在
//! [`ResolverCaches`] 的互斥锁下，每个公共入口整体持锁一次，
//! 递归探测不会与并发探测交错。探测结果按模块记忆化，同一批
//! 模拟中每个模块最多被完整探测一次。
//!
//! 环处理规则：
//!
//! - NEEDS 令牌互相提供形成的环是合法结构，`with_needs` 层探测
//!   遇到进行中条目时视为可满足；
//! - REQUIRES 环是非法结构，`without_needs` 层遇到进行中条目时
//!   视为失败，环上的模块互相记为对方的问题；
//! - 约束检查通过后拓扑排序仍发现环时记警告日志并降级（启用
//!   模拟返回空列表，停用模拟按名称序返回）。

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::config::EngineConfig;
use crate::module::constraint;
use crate::module::firer::{ChangeFirer, PROP_PROBLEMS};
use crate::module::graph::DependencyGraph;
use crate::module::lifecycle::Installer;
use crate::module::metadata::{Dependency, DependencyKind, Problem};
use crate::module::problems::{ProbeEntry, ProbeTier, ProblemCache};
use crate::module::registry::ModuleRegistry;
use crate::utils::{CoreError, Result};

/// 引擎内部状态
///
/// 注册表、解析缓存、事件批次与配置的聚合体，整体放在引擎的
/// 读写锁之下。
pub(crate) struct EngineState {
    /// 模块注册表
    pub registry: ModuleRegistry,
    /// 解析期可变缓存，读锁下的查询也要做记忆化
    pub caches: Mutex<ResolverCaches>,
    /// 当前操作积攒的变更
    pub firer: ChangeFirer,
    /// 引擎配置
    pub config: EngineConfig,
    /// 全局安装器
    pub installer: Arc<dyn Installer>,
}

/// 提供者索引与问题缓存
///
/// 两者只在解析期间被写入，放在同一把互斥锁下。
pub(crate) struct ResolverCaches {
    /// 能力令牌提供者索引
    pub providers: crate::module::providers::ProviderIndex,
    /// 两层问题缓存
    pub problems: ProblemCache,
}

/// 探测调用的返回
enum ProbeOutcome {
    /// 探测完成
    Done(BTreeSet<Problem>),
    /// 递归回到了进行中的模块
    InProgress,
}

/// 探测时用到的模块记录快照
///
/// 递归探测需要一边读记录一边改缓存，先把用到的字段拷出来。
struct Snapshot {
    dependencies: Vec<Dependency>,
    autoload: bool,
    eager: bool,
    enabled: bool,
    fragment_host: Option<String>,
    provides_beyond_self: bool,
}

impl EngineState {
    pub(crate) fn new(config: EngineConfig, installer: Arc<dyn Installer>) -> Self {
        Self {
            registry: ModuleRegistry::new(),
            caches: Mutex::new(ResolverCaches {
                providers: crate::module::providers::ProviderIndex::new(),
                problems: ProblemCache::new(),
            }),
            firer: ChangeFirer::new(),
            config,
            installer,
        }
    }

    fn snapshot(&self, name: &str) -> Option<Snapshot> {
        let record = self.registry.get(name)?;
        Some(Snapshot {
            dependencies: record.dependencies.clone(),
            autoload: record.is_autoload(),
            eager: record.is_eager(),
            enabled: record.enabled,
            fragment_host: record.metadata.fragment_host.clone(),
            provides_beyond_self: record.provides_beyond_self(),
        })
    }

    fn is_enabled(&self, name: &str) -> bool {
        self.registry.get(name).map(|r| r.enabled).unwrap_or(false)
    }

    /// 令牌提供者查询（惰性构建索引）
    fn providers_of(&self, caches: &mut ResolverCaches, token: &str) -> BTreeSet<String> {
        caches.providers.providers_of(
            token,
            self.registry
                .iter()
                .map(|r| (r.name(), r.provides.as_slice())),
        )
    }

    // ==================== 依赖探测 ====================

    /// 计算模块当前的问题集
    ///
    /// 结果记忆化在问题缓存中，直到注册表变化或显式失效。
    /// 探测对象不应是已启用模块（已启用模块按定义无问题）。
    pub(crate) fn missing_dependencies(&self, name: &str, with_needs: bool) -> BTreeSet<Problem> {
        let mut caches = self.caches.lock();
        self.missing_dependencies_locked(&mut caches, name, with_needs)
    }

    fn missing_dependencies_locked(
        &self,
        caches: &mut ResolverCaches,
        name: &str,
        with_needs: bool,
    ) -> BTreeSet<Problem> {
        match self.probe(caches, name, with_needs) {
            ProbeOutcome::Done(problems) => problems,
            // 顶层调用不可能撞上进行中条目，保守返回空集
            ProbeOutcome::InProgress => BTreeSet::new(),
        }
    }

    fn probe(&self, caches: &mut ResolverCaches, name: &str, with_needs: bool) -> ProbeOutcome {
        let tier = if with_needs {
            ProbeTier::WithNeeds
        } else {
            ProbeTier::WithoutNeeds
        };
        match caches.problems.get(tier, name) {
            Some(ProbeEntry::InProgress) => return ProbeOutcome::InProgress,
            Some(ProbeEntry::Done(problems)) => return ProbeOutcome::Done(problems.clone()),
            None => {}
        }

        caches.problems.begin(tier, name);
        let mut problems = BTreeSet::new();

        // with_needs 层以 without_needs 层的结果为底，环境类依赖
        // 只在 without_needs 层计算一次
        if with_needs {
            if let ProbeOutcome::Done(base) = self.probe(caches, name, false) {
                problems.extend(base);
            }
        }

        if let Some(snap) = self.snapshot(name) {
            for dep in snap.dependencies {
                match dep.kind {
                    DependencyKind::Module => {
                        if !self.module_dep_ok(caches, &dep, with_needs) {
                            problems.insert(Problem::UnmetDependency(dep));
                        }
                    }
                    DependencyKind::Requires | DependencyKind::Needs => {
                        if dep.kind == DependencyKind::Needs && !with_needs {
                            continue;
                        }
                        if !self.token_dep_ok(caches, &dep.target, with_needs) {
                            problems.insert(Problem::UnmetDependency(dep));
                        }
                    }
                    // 建议性依赖从不构成问题
                    DependencyKind::Recommends => {}
                    DependencyKind::Platform | DependencyKind::Package => {
                        if with_needs {
                            continue;
                        }
                        // 常规模块的环境约束推迟到激活期，自主启用的
                        // 可选模块（eager、提供额外令牌的 autoload）
                        // 必须在探测期就确认环境可用
                        let optional =
                            snap.eager || (snap.autoload && snap.provides_beyond_self);
                        if optional && !self.installer.check_environment(&dep) {
                            problems.insert(Problem::UnmetDependency(dep));
                        }
                    }
                }
            }
        }

        caches.problems.finish(tier, name, problems.clone());
        ProbeOutcome::Done(problems)
    }

    /// 模块依赖是否可满足（含对停用目标的递归探测）
    fn module_dep_ok(&self, caches: &mut ResolverCaches, dep: &Dependency, with_needs: bool) -> bool {
        let (satisfied, enabled) = match self.registry.get(&dep.target) {
            None => return false,
            Some(other) => (
                constraint::module_dependency_met(dep, &other.metadata),
                other.enabled,
            ),
        };
        if !satisfied {
            return false;
        }
        if enabled {
            return true;
        }
        self.probe_clean(caches, &dep.target, with_needs)
    }

    /// 令牌依赖是否有可用提供者
    fn token_dep_ok(&self, caches: &mut ResolverCaches, token: &str, with_needs: bool) -> bool {
        let providers = self.providers_of(caches, token);
        if providers.is_empty() {
            return false;
        }
        for provider in &providers {
            if self.is_enabled(provider) || self.probe_clean(caches, provider, with_needs) {
                return true;
            }
        }
        false
    }

    /// 递归探测目标并判断其是否"干净"
    ///
    /// `with_needs` 层容忍环（进行中视为干净），`without_needs`
    /// 层不容忍。
    fn probe_clean(&self, caches: &mut ResolverCaches, name: &str, with_needs: bool) -> bool {
        match self.probe(caches, name, with_needs) {
            ProbeOutcome::Done(problems) => problems.is_empty(),
            ProbeOutcome::InProgress => with_needs,
        }
    }

    /// 丢弃含软问题的停用模块缓存条目并补发问题事件
    pub(crate) fn clear_soft_problems(&mut self) {
        let changed = {
            let registry = &self.registry;
            self.caches
                .lock()
                .problems
                .clear_soft_entries(|name| registry.get(name).map(|r| !r.enabled).unwrap_or(true))
        };
        for name in changed {
            self.firer.change(Some(&name), PROP_PROBLEMS, None, None);
        }
    }

    // ==================== 启用模拟 ====================

    /// 模拟启用一批模块
    ///
    /// 返回实际会被启用的模块的启用顺序（被依赖方在前），包含
    /// 连带拉起的 autoload、eager 与片段模块。请求中的模块因
    /// 依赖问题无法启用时不在结果中，由调用方比对。
    ///
    /// # 参数
    ///
    /// * `requested` - 请求启用的模块名集合
    /// * `honor_autoload_eager` - 是否拒绝显式请求 autoload/eager
    ///
    /// # 错误
    ///
    /// 前置条件错误（模块不存在、已启用、显式请求受控模块）。
    pub(crate) fn simulate_enable(
        &self,
        requested: &BTreeSet<String>,
        honor_autoload_eager: bool,
    ) -> Result<Vec<String>> {
        for name in requested {
            let record = self
                .registry
                .get(name)
                .ok_or_else(|| CoreError::ModuleNotFound(name.clone()))?;
            if honor_autoload_eager {
                if record.is_autoload() {
                    return Err(CoreError::ExplicitAutoload(name.clone()));
                }
                if record.is_eager() {
                    return Err(CoreError::ExplicitEager(name.clone()));
                }
            }
            if record.enabled {
                return Err(CoreError::AlreadyEnabled(name.clone()));
            }
        }

        let mut caches = self.caches.lock();
        let mut will_enable = BTreeSet::new();
        for name in requested {
            self.maybe_add_to_enable_list(&mut caches, &mut will_enable, requested, name, true, None);
        }

        // eager 不动点：反复扫描剩余停用模块，直到没有新的 eager
        // 模块能借助当前结果启用
        let mut still_disabled: BTreeSet<String> = self
            .registry
            .names()
            .into_iter()
            .filter(|n| !self.is_enabled(n) && !will_enable.contains(n))
            .collect();
        while self.search_for_possible_eager(
            &mut caches,
            &mut will_enable,
            &mut still_disabled,
            requested,
        ) {}

        let graph = self.dependency_order_graph(&mut caches, &will_enable);
        match graph.topological_sort() {
            Ok(order) => Ok(order),
            Err(cycle) => {
                warn!(cycle = ?cycle, "启用集内存在依赖环，拒绝启用");
                Ok(Vec::new())
            }
        }
    }

    /// 把模块及其依赖闭包加入启用列表
    ///
    /// `ok_to_fail` 为假时模块有问题属于调用方逻辑错误，记警告。
    fn maybe_add_to_enable_list(
        &self,
        caches: &mut ResolverCaches,
        will_enable: &mut BTreeSet<String>,
        might_enable: &BTreeSet<String>,
        name: &str,
        ok_to_fail: bool,
        reason: Option<&str>,
    ) {
        let problems = self.missing_dependencies_locked(caches, name, true);
        if !problems.is_empty() {
            if !ok_to_fail {
                warn!(module = %name, problems = problems.len(), "模块存在意外问题，无法加入启用列表");
            }
            return;
        }
        if !will_enable.insert(name.to_string()) {
            return;
        }
        if self.config.log_dependency_edges {
            debug!(module = %name, reason = reason.unwrap_or("请求"), "加入启用列表");
        }

        let snap = match self.snapshot(name) {
            Some(snap) => snap,
            None => return,
        };

        // 片段先拉宿主，排序时片段必须能看到宿主
        if let Some(host) = &snap.fragment_host {
            if self.registry.contains(host) && !self.is_enabled(host) {
                self.maybe_add_to_enable_list(
                    caches,
                    will_enable,
                    might_enable,
                    host,
                    ok_to_fail,
                    Some("片段宿主"),
                );
            }
        }

        for dep in &snap.dependencies {
            match dep.kind {
                DependencyKind::Module => {
                    // 探测已通过，目标必然存在且约束满足
                    if !self.is_enabled(&dep.target) {
                        self.maybe_add_to_enable_list(
                            caches,
                            will_enable,
                            might_enable,
                            &dep.target,
                            false,
                            None,
                        );
                    }
                }
                DependencyKind::Requires
                | DependencyKind::Needs
                | DependencyKind::Recommends => {
                    let providers = self.providers_of(caches, &dep.target);
                    if providers.is_empty() {
                        // 只有建议性依赖才可能走到这里
                        continue;
                    }
                    // 已有启用的提供者，或请求集中有无问题的提供者
                    let mut found = providers.iter().any(|p| self.is_enabled(p));
                    if !found {
                        for provider in &providers {
                            if might_enable.contains(provider)
                                && self
                                    .missing_dependencies_locked(caches, provider, true)
                                    .is_empty()
                            {
                                found = true;
                                break;
                            }
                        }
                    }
                    if found {
                        continue;
                    }
                    // 全部停用：把所有无问题的提供者一起拉进来
                    for provider in &providers {
                        let autoload = self
                            .registry
                            .get(provider)
                            .map(|r| r.is_autoload())
                            .unwrap_or(false);
                        if autoload
                            && !self
                                .missing_dependencies_locked(caches, provider, true)
                                .is_empty()
                        {
                            debug!(module = %provider, token = %dep.target, "提供者自身有问题，不连带启用 autoload");
                            continue;
                        }
                        self.maybe_add_to_enable_list(
                            caches,
                            will_enable,
                            might_enable,
                            provider,
                            true,
                            Some("令牌提供者"),
                        );
                    }
                }
                DependencyKind::Platform | DependencyKind::Package => {}
            }
        }

        // 急切片段随宿主一起启用
        for fragment in self.registry.fragments_of(name) {
            let eager = self
                .registry
                .get(&fragment)
                .map(|r| r.is_eager())
                .unwrap_or(false);
            if eager {
                self.maybe_add_to_enable_list(
                    caches,
                    will_enable,
                    might_enable,
                    &fragment,
                    true,
                    Some("急切片段"),
                );
            }
        }
    }

    /// 扫描一轮可启用的 eager 模块
    ///
    /// # 返回
    ///
    /// 本轮有新模块加入时返回 `true`，调用方继续迭代到不动点。
    fn search_for_possible_eager(
        &self,
        caches: &mut ResolverCaches,
        will_enable: &mut BTreeSet<String>,
        still_disabled: &mut BTreeSet<String>,
        might_enable: &BTreeSet<String>,
    ) -> bool {
        let mut found = false;
        for name in still_disabled.clone() {
            if will_enable.contains(&name) {
                still_disabled.remove(&name);
                continue;
            }
            let snap = match self.snapshot(&name) {
                Some(snap) => snap,
                None => continue,
            };
            if !snap.eager {
                continue;
            }
            // 片段只在宿主同批启用时自荐；宿主已启用的片段无法再
            // 并入其加载域，留在停用状态
            if let Some(host) = &snap.fragment_host {
                if !will_enable.contains(host) {
                    continue;
                }
            }
            let mut recursion = BTreeSet::new();
            if self.could_be_enabled_with_eagers(caches, &name, will_enable, &mut recursion) {
                found = true;
                still_disabled.remove(&name);
                self.maybe_add_to_enable_list(
                    caches,
                    will_enable,
                    might_enable,
                    &name,
                    false,
                    Some("eager"),
                );
            }
        }
        found
    }

    /// 模块能否只靠已启用模块、启用列表与其他 autoload/eager 激活
    ///
    /// `recursion` 是环容忍集：互相依赖的可选模块可以一起启用。
    fn could_be_enabled_with_eagers(
        &self,
        caches: &mut ResolverCaches,
        name: &str,
        will_enable: &BTreeSet<String>,
        recursion: &mut BTreeSet<String>,
    ) -> bool {
        let snap = match self.snapshot(name) {
            Some(snap) => snap,
            None => return false,
        };
        if snap.enabled || will_enable.contains(name) {
            return true;
        }
        if !snap.autoload && !snap.eager {
            return false;
        }
        if !self
            .missing_dependencies_locked(caches, name, true)
            .is_empty()
        {
            return false;
        }
        if !recursion.insert(name.to_string()) {
            return true;
        }

        for dep in &snap.dependencies {
            match dep.kind {
                DependencyKind::Module => {
                    if !self.could_be_enabled_with_eagers(caches, &dep.target, will_enable, recursion)
                    {
                        return false;
                    }
                }
                DependencyKind::Requires | DependencyKind::Needs => {
                    let providers = self.providers_of(caches, &dep.target);
                    let mut found = false;
                    for provider in &providers {
                        if self.could_be_enabled_with_eagers(caches, provider, will_enable, recursion)
                        {
                            found = true;
                            break;
                        }
                    }
                    if !found {
                        return false;
                    }
                }
                DependencyKind::Recommends => {}
                DependencyKind::Platform | DependencyKind::Package => {
                    if !self.installer.check_environment(dep) {
                        return false;
                    }
                }
            }
        }
        true
    }

    // ==================== 停用模拟 ====================

    /// 模拟停用一批模块
    ///
    /// 返回实际会被停用的模块的停用顺序（依赖方在前），包含反向
    /// 依赖闭包与不再被使用的 autoload 模块。
    ///
    /// # 错误
    ///
    /// 前置条件错误（模块不存在、未启用、固定、显式请求受控模块）。
    pub(crate) fn simulate_disable(&self, requested: &BTreeSet<String>) -> Result<Vec<String>> {
        for name in requested {
            let record = self
                .registry
                .get(name)
                .ok_or_else(|| CoreError::ModuleNotFound(name.clone()))?;
            if record.is_autoload() {
                return Err(CoreError::ExplicitAutoload(name.clone()));
            }
            if record.is_eager() {
                return Err(CoreError::ExplicitEager(name.clone()));
            }
            if record.fixed {
                return Err(CoreError::DisableFixed(name.clone()));
            }
            if !record.enabled {
                return Err(CoreError::NotEnabled(name.clone()));
            }
        }

        let mut will_disable = BTreeSet::new();
        for name in requested {
            self.add_to_disable_list(&mut will_disable, name);
        }

        // autoload 不动点：反复剔除不再被任何仍启用模块使用的
        // autoload
        let mut still_enabled: BTreeSet<String> = self
            .registry
            .enabled_names()
            .into_iter()
            .filter(|n| !will_disable.contains(n))
            .collect();
        while self.search_for_unused_autoloads(&mut will_disable, &mut still_enabled) {}

        let graph = self.dependency_order_graph(&mut self.caches.lock(), &will_disable);
        match graph.teardown_order() {
            Ok(order) => Ok(order),
            Err(cycle) => {
                warn!(cycle = ?cycle, "停用集内存在依赖环，按名称序停用");
                Ok(will_disable.into_iter().collect())
            }
        }
    }

    /// 把模块及依赖它的启用模块闭包加入停用列表
    ///
    /// 令牌依赖只在本模块是最后一个仍可用的提供者时才级联；
    /// 建议性依赖从不级联。宿主停用时并入其加载域的启用片段
    /// 一并停用。
    fn add_to_disable_list(&self, will_disable: &mut BTreeSet<String>, name: &str) {
        if !will_disable.insert(name.to_string()) {
            return;
        }

        for fragment in self.registry.fragments_of(name) {
            if self.is_enabled(&fragment) {
                self.add_to_disable_list(will_disable, &fragment);
            }
        }

        let provides: Vec<String> = self
            .registry
            .get(name)
            .map(|r| r.provides.clone())
            .unwrap_or_default();

        let candidates: Vec<(String, Vec<Dependency>)> = self
            .registry
            .iter()
            .filter(|r| r.enabled && !r.fixed && !will_disable.contains(r.name()))
            .map(|r| (r.name().to_string(), r.dependencies.clone()))
            .collect();

        for (other, deps) in candidates {
            if will_disable.contains(&other) {
                continue;
            }
            for dep in deps {
                match dep.kind {
                    DependencyKind::Module if dep.target == name => {
                        self.add_to_disable_list(will_disable, &other);
                        break;
                    }
                    DependencyKind::Requires | DependencyKind::Needs
                        if provides.iter().any(|t| *t == dep.target) =>
                    {
                        // 还有第三方启用提供者时依赖方不受影响
                        let registry = &self.registry;
                        let third_exists = registry.iter().any(|r| {
                            r.enabled
                                && !will_disable.contains(r.name())
                                && r.provides_token(&dep.target)
                        });
                        if !third_exists {
                            self.add_to_disable_list(will_disable, &other);
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// 扫描一轮不再被使用的 autoload 模块
    fn search_for_unused_autoloads(
        &self,
        will_disable: &mut BTreeSet<String>,
        still_enabled: &mut BTreeSet<String>,
    ) -> bool {
        let mut found = false;
        'candidates: for name in still_enabled.clone() {
            let snap = match self.snapshot(&name) {
                Some(snap) => snap,
                None => continue,
            };
            // 已启用宿主的片段跟随宿主，不单独停用
            if let Some(host) = &snap.fragment_host {
                if self.is_enabled(host) {
                    continue;
                }
            }
            if !snap.autoload {
                continue;
            }

            let provides: Vec<String> = self
                .registry
                .get(&name)
                .map(|r| r.provides.clone())
                .unwrap_or_default();

            for other in still_enabled.iter() {
                if *other == name {
                    continue;
                }
                let deps = match self.registry.get(other) {
                    Some(r) => r.dependencies.clone(),
                    None => continue,
                };
                for dep in deps {
                    match dep.kind {
                        DependencyKind::Module if dep.target == name => {
                            continue 'candidates;
                        }
                        // 提供被使用令牌的 autoload 保守地留在原位，
                        // 即使另有启用提供者
                        DependencyKind::Requires
                        | DependencyKind::Needs
                        | DependencyKind::Recommends
                            if provides.iter().any(|t| *t == dep.target) =>
                        {
                            continue 'candidates;
                        }
                        _ => {}
                    }
                }
            }

            found = true;
            still_enabled.remove(&name);
            will_disable.insert(name);
        }
        found
    }

    // ==================== 排序与查询 ====================

    /// 在给定集合内构建依赖图
    ///
    /// 边包括模块依赖、REQUIRES 依赖到集合内提供者、片段到宿主。
    /// NEEDS 互相提供是合法结构，不能作为排序边，否则会被当成环
    /// 拒绝；RECOMMENDS 只是建议，不约束顺序。
    fn dependency_order_graph(
        &self,
        caches: &mut ResolverCaches,
        set: &BTreeSet<String>,
    ) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for name in set {
            graph.add_node(name);
            let snap = match self.snapshot(name) {
                Some(snap) => snap,
                None => continue,
            };
            if let Some(host) = &snap.fragment_host {
                if set.contains(host) {
                    graph.add_edge(name, host);
                }
            }
            for dep in &snap.dependencies {
                match dep.kind {
                    DependencyKind::Module => {
                        if set.contains(&dep.target) {
                            graph.add_edge(name, &dep.target);
                        }
                    }
                    DependencyKind::Requires => {
                        for provider in self.providers_of(caches, &dep.target) {
                            if provider != *name && set.contains(&provider) {
                                graph.add_edge(name, &provider);
                            }
                        }
                    }
                    DependencyKind::Needs
                    | DependencyKind::Recommends
                    | DependencyKind::Platform
                    | DependencyKind::Package => {}
                }
            }
        }
        graph
    }

    /// 查询模块间依赖关系
    ///
    /// 令牌依赖按"依赖全部提供者"展开。结果不含起点模块本身，
    /// 也会剔除环导致的自指。
    ///
    /// # 参数
    ///
    /// * `reverse` - 为真时查"谁依赖它"，否则查"它依赖谁"
    /// * `transitive` - 为真时取传递闭包
    /// * `consider_needs` - 为真时 NEEDS 依赖计入
    pub(crate) fn module_interdependencies(
        &self,
        name: &str,
        reverse: bool,
        transitive: bool,
        consider_needs: bool,
    ) -> Result<BTreeSet<String>> {
        if !self.registry.contains(name) {
            return Err(CoreError::ModuleNotFound(name.to_string()));
        }

        let mut caches = self.caches.lock();
        let mut result = self.direct_interdependencies(&mut caches, name, reverse, consider_needs);
        if transitive {
            let mut queue: Vec<String> = result.iter().cloned().collect();
            while let Some(next) = queue.pop() {
                for found in
                    self.direct_interdependencies(&mut caches, &next, reverse, consider_needs)
                {
                    if found != name && result.insert(found.clone()) {
                        queue.push(found);
                    }
                }
            }
        }
        result.remove(name);
        Ok(result)
    }

    fn direct_interdependencies(
        &self,
        caches: &mut ResolverCaches,
        name: &str,
        reverse: bool,
        consider_needs: bool,
    ) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        if !reverse {
            let snap = match self.snapshot(name) {
                Some(snap) => snap,
                None => return result,
            };
            for dep in &snap.dependencies {
                match dep.kind {
                    DependencyKind::Module => {
                        if self.registry.contains(&dep.target) {
                            result.insert(dep.target.clone());
                        }
                    }
                    DependencyKind::Requires => {
                        result.extend(self.providers_of(caches, &dep.target));
                    }
                    DependencyKind::Needs if consider_needs => {
                        result.extend(self.providers_of(caches, &dep.target));
                    }
                    _ => {}
                }
            }
        } else {
            let provides: Vec<String> = self
                .registry
                .get(name)
                .map(|r| r.provides.clone())
                .unwrap_or_default();
            for record in self.registry.iter() {
                if record.name() == name {
                    continue;
                }
                let depends = record.dependencies.iter().any(|dep| match dep.kind {
                    DependencyKind::Module => dep.target == name,
                    DependencyKind::Requires => provides.iter().any(|t| *t == dep.target),
                    DependencyKind::Needs => {
                        consider_needs && provides.iter().any(|t| *t == dep.target)
                    }
                    _ => false,
                });
                if depends {
                    result.insert(record.name().to_string());
                }
            }
        }
        result.remove(name);
        result
    }
}
