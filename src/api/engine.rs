//! 模块引擎公共接口
//!
//! [`ModuleEngine`] 是整个库的入口：注册、删除、重载模块，
//! 启用、停用、模拟，问题查询与变更监听。
//!
//! # 并发模型
//!
//! 引擎状态放在一把读写锁下。查询接口（包括问题查询与启停模拟）
//! 取读锁，修改接口取写锁；修改落定后写锁降级为读锁，在读锁下
//! 同步派发事件。监听器回调中可以继续查询，但调用任何修改接口
//! 会得到 [`CoreError::ReentrantMutation`]。
//!
//! # 示例
//!
//! ```rust
//! use std::sync::Arc;
//! use sunmao_core::api::engine::ModuleEngine;
//! use sunmao_core::module::lifecycle::{NoopHost, NoopInstaller};
//! use sunmao_core::module::metadata::ModuleMetadata;
//!
//! let engine = ModuleEngine::new(Arc::new(NoopInstaller));
//! engine.create(ModuleMetadata::new("demo"), Box::new(NoopHost)).unwrap();
//! engine.enable_one("demo").unwrap();
//! assert!(engine.is_enabled("demo"));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use chrono::Utc;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::core::config::EngineConfig;
use crate::module::firer::{
    ChangeListener, ListenerId, PROP_ENABLED, PROP_ENABLED_MODULES, PROP_METADATA, PROP_MODULES,
    PROP_PROBLEMS,
};
use crate::module::lifecycle::{Installer, ModuleHost};
use crate::module::metadata::{DependencyKind, ModuleMetadata, Problem};
use crate::module::problems::ProbeTier;
use crate::module::registry::ModuleRecord;
use crate::module::resolver::EngineState;
use crate::utils::{CoreError, Result};

/// 模块依赖解析与生命周期引擎
pub struct ModuleEngine {
    state: RwLock<EngineState>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
    next_listener_id: AtomicU64,
    /// 正在派发事件的线程，用于拦截回调中的修改调用
    firing: Mutex<Option<ThreadId>>,
}

impl ModuleEngine {
    /// 使用默认配置创建引擎
    pub fn new(installer: Arc<dyn Installer>) -> Self {
        Self::with_config(EngineConfig::default(), installer)
    }

    /// 使用指定配置创建引擎
    pub fn with_config(config: EngineConfig, installer: Arc<dyn Installer>) -> Self {
        Self {
            state: RwLock::new(EngineState::new(config, installer)),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            firing: Mutex::new(None),
        }
    }

    // ==================== 监听器 ====================

    /// 注册变更监听器
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// 注销变更监听器
    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    /// 拦截监听器回调中的修改调用
    fn guard_mutation(&self) -> Result<()> {
        if *self.firing.lock() == Some(thread::current().id()) {
            return Err(CoreError::ReentrantMutation);
        }
        Ok(())
    }

    /// 写锁降级为读锁后派发积攒的事件
    fn fire_events(&self, mut guard: RwLockWriteGuard<'_, EngineState>) {
        if guard.firer.is_empty() {
            return;
        }
        let mut firer = std::mem::take(&mut guard.firer);
        let read_guard = RwLockWriteGuard::downgrade(guard);
        let listeners: Vec<Arc<dyn ChangeListener>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        *self.firing.lock() = Some(thread::current().id());
        firer.fire(&listeners);
        *self.firing.lock() = None;
        drop(read_guard);
    }

    // ==================== 注册 ====================

    /// 注册普通模块
    ///
    /// # 错误
    ///
    /// - [`CoreError::InvalidMetadata`] - 元数据校验失败
    /// - [`CoreError::DuplicateModule`] - 重名且配置未开启
    ///   `ignore_duplicates`
    pub fn create(&self, metadata: ModuleMetadata, host: Box<dyn ModuleHost>) -> Result<()> {
        self.create_record(metadata, host, false)
    }

    /// 注册固定模块
    ///
    /// 固定模块与引擎共存亡：不可删除、不可重载、不可停用。
    pub fn create_fixed(&self, metadata: ModuleMetadata, host: Box<dyn ModuleHost>) -> Result<()> {
        self.create_record(metadata, host, true)
    }

    fn create_record(
        &self,
        metadata: ModuleMetadata,
        host: Box<dyn ModuleHost>,
        fixed: bool,
    ) -> Result<()> {
        self.guard_mutation()?;
        if let Err(errors) = metadata.validate() {
            return Err(CoreError::InvalidMetadata(errors.join("; ")));
        }

        let mut state = self.state.write();

        let mut dependencies = metadata.dependencies.clone();
        state.installer.refine_dependencies(&metadata, &mut dependencies);
        let mut provides = metadata.provides.clone();
        provides.extend(state.installer.refine_provides(&metadata));

        let record = ModuleRecord::new(metadata, dependencies, provides, fixed, host);
        let name = record.name().to_string();
        let provides = record.provides.clone();

        let ignore_duplicates = state.config.ignore_duplicates;
        if !state.registry.add(record, ignore_duplicates)? {
            // 重名且配置要求保留旧记录
            return Ok(());
        }

        state.caches.lock().providers.provider_added(&name, &provides);
        state.clear_soft_problems();
        state.firer.created(&name);
        state.firer.change(None, PROP_MODULES, None, None);
        info!(module = %name, fixed, "模块已注册");

        self.fire_events(state);
        Ok(())
    }

    /// 删除模块
    ///
    /// # 错误
    ///
    /// - [`CoreError::ModuleNotFound`]
    /// - [`CoreError::DeleteFixed`] - 固定模块
    /// - [`CoreError::DeleteEnabled`] - 尚在启用状态
    pub fn delete(&self, name: &str) -> Result<()> {
        self.guard_mutation()?;
        let mut state = self.state.write();

        let record = state
            .registry
            .get(name)
            .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))?;
        if record.fixed {
            return Err(CoreError::DeleteFixed(name.to_string()));
        }
        if record.enabled {
            return Err(CoreError::DeleteEnabled(name.to_string()));
        }

        let removed = match state.registry.remove(name) {
            Some(record) => record,
            None => return Err(CoreError::ModuleNotFound(name.to_string())),
        };
        {
            let mut caches = state.caches.lock();
            caches.providers.provider_removed(name, &removed.provides);
            caches.problems.forget(name);
        }
        state.clear_soft_problems();
        state.firer.deleted(name);
        state.firer.change(None, PROP_MODULES, None, None);
        info!(module = %name, "模块已删除");

        self.fire_events(state);
        Ok(())
    }

    /// 重载模块元数据
    ///
    /// 保留原有的加载域宿主与固定性，替换元数据、依赖与提供令牌，
    /// 并精确失效相关问题缓存。
    ///
    /// # 错误
    ///
    /// - [`CoreError::ModuleNotFound`]
    /// - [`CoreError::ReloadFixed`] / [`CoreError::ReloadEnabled`]
    /// - [`CoreError::ReloadRenamed`] - 新元数据改了模块名
    /// - [`CoreError::InvalidMetadata`]
    pub fn reload(&self, name: &str, metadata: ModuleMetadata) -> Result<()> {
        self.guard_mutation()?;
        if let Err(errors) = metadata.validate() {
            return Err(CoreError::InvalidMetadata(errors.join("; ")));
        }

        let mut state = self.state.write();

        let record = state
            .registry
            .get(name)
            .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))?;
        if record.fixed {
            return Err(CoreError::ReloadFixed(name.to_string()));
        }
        if record.enabled {
            return Err(CoreError::ReloadEnabled(name.to_string()));
        }
        if metadata.name != name {
            return Err(CoreError::ReloadRenamed {
                old: name.to_string(),
                new: metadata.name,
            });
        }

        let old = match state.registry.remove(name) {
            Some(record) => record,
            None => return Err(CoreError::ModuleNotFound(name.to_string())),
        };
        state.caches.lock().providers.provider_removed(name, &old.provides);

        let mut dependencies = metadata.dependencies.clone();
        state.installer.refine_dependencies(&metadata, &mut dependencies);
        let mut provides = metadata.provides.clone();
        provides.extend(state.installer.refine_provides(&metadata));

        let record = ModuleRecord::new(metadata, dependencies, provides, old.fixed, old.host);
        let new_provides = record.provides.clone();
        state.registry.add(record, false)?;
        {
            let mut caches = state.caches.lock();
            caches.providers.provider_added(name, &new_provides);
            caches.problems.forget(name);
        }
        state.clear_soft_problems();
        state.firer.change(Some(name), PROP_METADATA, None, None);
        state.firer.change(Some(name), PROP_PROBLEMS, None, None);
        info!(module = %name, "模块已重载");

        self.fire_events(state);
        Ok(())
    }

    // ==================== 启用 ====================

    /// 启用单个模块
    pub fn enable_one(&self, name: &str) -> Result<Vec<String>> {
        self.enable([name.to_string()].into())
    }

    /// 启用一批模块
    ///
    /// 模拟、校验、逐个激活，任何一步失败则整批回滚到调用前的
    /// 启用状态。安装器 `load` 钩子追加的模块触发后续轮次。
    ///
    /// # 返回
    ///
    /// 实际启用的模块（含连带的 autoload/eager/片段），按启用顺序。
    pub fn enable(&self, requested: BTreeSet<String>) -> Result<Vec<String>> {
        self.enable_impl(requested, true)
    }

    fn enable_impl(
        &self,
        mut requested: BTreeSet<String>,
        mut honor_autoload_eager: bool,
    ) -> Result<Vec<String>> {
        self.guard_mutation()?;
        let mut state = self.state.write();
        debug!(requested = ?requested, "启用请求");

        let mut all_enabled: Vec<String> = Vec::new();
        let mut rounds = 0usize;

        loop {
            let simulated = state
                .simulate_enable(&requested, honor_autoload_eager)
                .and_then(|order| {
                    self.verify_enable_batch(&state, &requested, &order)?;
                    Ok(order)
                });
            let order = match simulated {
                Ok(order) => order,
                Err(err) => {
                    // 后续轮次失败时，之前轮次已启用的模块一并回滚
                    if !all_enabled.is_empty() {
                        self.rollback(&mut state, &all_enabled);
                    }
                    self.fire_events(state);
                    return Err(err);
                }
            };

            if let Err(err) = self.activate_batch(&mut state, &order) {
                if !all_enabled.is_empty() {
                    self.rollback(&mut state, &all_enabled);
                }
                self.fire_events(state);
                return Err(err);
            }

            // 模拟结果只含停用模块，非空轮次必然取得进展
            all_enabled.extend(order.iter().cloned());

            // 外部机制（桥接、按需装载）可能要求追加模块
            let extra = state.installer.load(&order);
            let extra: BTreeSet<String> = extra
                .into_iter()
                .filter(|n| !state.registry.get(n).map(|r| r.enabled).unwrap_or(false))
                .collect();
            if extra.is_empty() {
                break;
            }

            rounds += 1;
            if rounds > state.config.max_extra_rounds {
                warn!(extra = ?extra, rounds, "启用重验证无进展，整批回滚");
                self.rollback(&mut state, &all_enabled);
                self.fire_events(state);
                return Err(CoreError::RevalidationStalled(
                    extra.into_iter().collect(),
                ));
            }
            debug!(extra = ?extra, "安装器要求追加启用");
            // 后续轮次只模拟追加的模块，已启用的依赖自然被视为满足
            requested = extra;
            honor_autoload_eager = false;
        }

        state.clear_soft_problems();
        state.firer.change(None, PROP_ENABLED_MODULES, None, None);
        for name in &all_enabled {
            state
                .firer
                .change(Some(name), PROP_ENABLED, Some(false), Some(true));
        }
        info!(count = all_enabled.len(), "启用完成");

        self.fire_events(state);
        Ok(all_enabled)
    }

    /// 校验模拟结果与请求的一致性
    fn verify_enable_batch(
        &self,
        state: &EngineState,
        requested: &BTreeSet<String>,
        order: &[String],
    ) -> Result<()> {
        let result: BTreeSet<&String> = order.iter().collect();

        // 请求的模块必须全部在结果中，否则汇报每个落选者的问题集
        let missing: Vec<&String> = requested
            .iter()
            .filter(|n| !result.contains(n))
            .collect();
        if !missing.is_empty() {
            let mut report = BTreeMap::new();
            for name in missing {
                let problems = state.missing_dependencies(name, true);
                report.insert(name.clone(), problems);
            }
            return Err(CoreError::EnableMissing(report));
        }

        for name in order {
            let fragment_host = match state.registry.get(name) {
                Some(r) => r.metadata.fragment_host.clone(),
                None => return Err(CoreError::ModuleNotFound(name.clone())),
            };

            // 片段的宿主已经启用时加载域无法再合并
            if let Some(host) = &fragment_host {
                if state.registry.get(host).map(|r| r.enabled).unwrap_or(false) {
                    return Err(CoreError::FragmentHostEnabled {
                        fragment: name.clone(),
                        host: host.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// 逐个激活，失败则回滚整批
    fn activate_batch(&self, state: &mut EngineState, order: &[String]) -> Result<()> {
        let batch: BTreeSet<String> = order.iter().cloned().collect();
        let mut fallback: Vec<String> = Vec::new();

        for name in order {
            if state.registry.get(name).map(|r| r.enabled).unwrap_or(false) {
                continue;
            }
            fallback.push(name.clone());

            if let Err(reason) = self.activate_module(state, name, &batch) {
                warn!(module = %name, %reason, "模块激活失败，回滚整批");
                state.caches.lock().problems.add_problem(
                    ProbeTier::WithNeeds,
                    name,
                    Problem::ActivationFailure {
                        module: name.clone(),
                        reason: reason.clone(),
                    },
                );
                state.clear_soft_problems();
                state.firer.change(Some(name), PROP_PROBLEMS, None, None);

                self.rollback(state, &fallback);
                return Err(CoreError::ActivationFailed {
                    module: name.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// 单模块激活：加载域、环境约束、prepare 钩子
    fn activate_module(
        &self,
        state: &mut EngineState,
        name: &str,
        batch: &BTreeSet<String>,
    ) -> std::result::Result<(), String> {
        let is_fragment = state
            .registry
            .get(name)
            .and_then(|r| r.metadata.fragment_host.as_ref())
            .is_some();

        // 片段并入宿主的加载域，自己不单独构建
        if !is_fragment {
            let parents = self.calculate_parents(state, name, batch);
            let record = state
                .registry
                .get(name)
                .ok_or_else(|| format!("模块记录丢失: {}", name))?;
            record
                .host
                .bring_loading_domain_up(&parents)
                .map_err(|e| e.to_string())?;
        }

        if let Some(record) = state.registry.get_mut(name) {
            record.enabled = true;
            record.enabled_at = Some(Utc::now());
        }

        // 环境类约束此刻才能对真实加载域校验
        let env_deps: Vec<_> = state
            .registry
            .get(name)
            .map(|r| {
                r.dependencies
                    .iter()
                    .filter(|d| d.kind.is_environmental())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for dep in env_deps {
            let ok = state
                .registry
                .get(name)
                .map(|r| r.host.check_domain_dependency(&dep))
                .unwrap_or(false);
            if !ok {
                return Err(format!("环境约束不满足: {}", dep));
            }
        }

        state
            .installer
            .prepare(name)
            .map_err(|e| e.to_string())?;
        debug!(module = %name, "模块已激活");
        Ok(())
    }

    /// 计算模块加载域的父模块集合
    ///
    /// 模块依赖的目标，加上本模块所有片段的模块依赖目标（片段
    /// 并入宿主，片段的依赖由宿主承接），去掉自己与自己的片段。
    fn calculate_parents(
        &self,
        state: &mut EngineState,
        name: &str,
        batch: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        let mut parents = BTreeSet::new();
        let mut sources = vec![name.to_string()];
        let fragments = state.registry.fragments_of(name);
        for fragment in &fragments {
            if batch.contains(fragment)
                || state.registry.get(fragment).map(|r| r.enabled).unwrap_or(false)
            {
                sources.push(fragment.clone());
            }
        }

        for source in sources {
            if let Some(record) = state.registry.get(&source) {
                for dep in &record.dependencies {
                    if dep.kind == DependencyKind::Module && state.registry.contains(&dep.target) {
                        parents.insert(dep.target.clone());
                    }
                }
            }
        }

        parents.remove(name);
        for fragment in &fragments {
            parents.remove(fragment);
        }
        parents
    }

    /// 回滚：按启用相反顺序拆除
    fn rollback(&self, state: &mut EngineState, modules: &[String]) {
        for name in modules.iter().rev() {
            let fixed = state.registry.get(name).map(|r| r.fixed).unwrap_or(false);
            if fixed {
                continue;
            }
            if let Some(record) = state.registry.get_mut(name) {
                if !record.enabled {
                    continue;
                }
                record.enabled = false;
                record.enabled_at = None;
            }
            if let Some(record) = state.registry.get(name) {
                if record.metadata.fragment_host.is_none() {
                    record.host.tear_loading_domain_down();
                    record.host.release_resources();
                }
            }
            debug!(module = %name, "已回滚");
        }
        state.clear_soft_problems();
    }

    // ==================== 停用 ====================

    /// 停用单个模块
    pub fn disable_one(&self, name: &str) -> Result<Vec<String>> {
        self.disable([name.to_string()].into())
    }

    /// 停用一批模块
    ///
    /// 连带停用反向依赖闭包与不再被使用的 autoload 模块。
    /// 先整批通知安装器，再逐个处置、拆除加载域，最后统一释放
    /// 残留资源。
    ///
    /// # 返回
    ///
    /// 实际停用的模块，按停用顺序（依赖方在前）。
    pub fn disable(&self, requested: BTreeSet<String>) -> Result<Vec<String>> {
        self.guard_mutation()?;
        let mut state = self.state.write();
        debug!(requested = ?requested, "停用请求");

        let order = state.simulate_disable(&requested)?;

        state.installer.unload(&order);

        for name in &order {
            state.installer.dispose(name);
            if let Some(record) = state.registry.get_mut(name) {
                record.enabled = false;
                record.enabled_at = None;
            }
            let is_fragment = state
                .registry
                .get(name)
                .and_then(|r| r.metadata.fragment_host.as_ref())
                .is_some();
            if !is_fragment {
                if let Some(record) = state.registry.get(name) {
                    record.host.tear_loading_domain_down();
                }
            }
        }
        // 确认阶段：整批拆除完毕后统一释放
        for name in &order {
            if let Some(record) = state.registry.get(name) {
                if record.metadata.fragment_host.is_none() {
                    record.host.release_resources();
                }
            }
        }

        state.clear_soft_problems();
        state.firer.change(None, PROP_ENABLED_MODULES, None, None);
        for name in &order {
            state
                .firer
                .change(Some(name), PROP_ENABLED, Some(true), Some(false));
        }
        info!(count = order.len(), "停用完成");

        self.fire_events(state);
        Ok(order)
    }

    // ==================== 模拟 ====================

    /// 模拟启用（不改变任何状态，监听器回调中也可调用）
    pub fn simulate_enable(&self, requested: BTreeSet<String>) -> Result<Vec<String>> {
        let state = self.state.read_recursive();
        state.simulate_enable(&requested, true)
    }

    /// 模拟停用（不改变任何状态，监听器回调中也可调用）
    pub fn simulate_disable(&self, requested: BTreeSet<String>) -> Result<Vec<String>> {
        let state = self.state.read_recursive();
        state.simulate_disable(&requested)
    }

    // ==================== 关闭 ====================

    /// 关闭引擎
    ///
    /// 按停用顺序征询安装器，安装器否决时返回 `false` 且不做任何
    /// 改变；否则整批卸载并返回 `true`。
    pub fn shutdown(&self) -> bool {
        let mut state = self.state.write();
        let enabled = state.registry.enabled_names();
        let requested: BTreeSet<String> = enabled
            .iter()
            .filter(|n| {
                state
                    .registry
                    .get(n)
                    .map(|r| !r.fixed && !r.is_autoload() && !r.is_eager())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let order = if requested.is_empty() {
            enabled.into_iter().collect()
        } else {
            match state.simulate_disable(&requested) {
                Ok(order) => order,
                Err(_) => enabled.into_iter().collect(),
            }
        };

        if !state.installer.closing(&order) {
            info!("关闭被安装器否决");
            return false;
        }

        state.installer.unload(&order);
        for name in &order {
            state.installer.dispose(name);
        }
        info!(count = order.len(), "引擎已关闭");
        true
    }

    // ==================== 查询 ====================

    /// 所有已注册模块名
    pub fn get_modules(&self) -> BTreeSet<String> {
        self.state.read_recursive().registry.names()
    }

    /// 所有已启用模块名
    pub fn get_enabled_modules(&self) -> BTreeSet<String> {
        self.state.read_recursive().registry.enabled_names()
    }

    /// 注册模块数量
    pub fn module_count(&self) -> usize {
        self.state.read_recursive().registry.len()
    }

    /// 模块是否存在
    pub fn contains(&self, name: &str) -> bool {
        self.state.read_recursive().registry.contains(name)
    }

    /// 模块是否启用
    pub fn is_enabled(&self, name: &str) -> bool {
        self.state
            .read_recursive()
            .registry
            .get(name)
            .map(|r| r.enabled)
            .unwrap_or(false)
    }

    /// 查询模块元数据副本
    pub fn get_metadata(&self, name: &str) -> Option<ModuleMetadata> {
        self.state
            .read_recursive()
            .registry
            .get(name)
            .map(|r| r.metadata.clone())
    }

    /// 查询模块当前的问题集
    ///
    /// 已启用模块按定义没有问题，返回空集。问题变更事件的监听器
    /// 回调中也可调用。
    ///
    /// # 错误
    ///
    /// [`CoreError::ModuleNotFound`]
    pub fn get_problems(&self, name: &str) -> Result<BTreeSet<Problem>> {
        let state = self.state.read_recursive();
        let enabled = state
            .registry
            .get(name)
            .map(|r| r.enabled)
            .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))?;
        if enabled {
            return Ok(BTreeSet::new());
        }
        Ok(state.missing_dependencies(name, true))
    }

    /// 查询模块间依赖关系
    ///
    /// 令牌依赖展开为对全部提供者的依赖。
    ///
    /// # 参数
    ///
    /// * `reverse` - 查"谁依赖它"而非"它依赖谁"
    /// * `transitive` - 取传递闭包
    /// * `consider_needs` - NEEDS 依赖是否计入
    pub fn get_module_interdependencies(
        &self,
        name: &str,
        reverse: bool,
        transitive: bool,
        consider_needs: bool,
    ) -> Result<BTreeSet<String>> {
        let state = self.state.read_recursive();
        state.module_interdependencies(name, reverse, transitive, consider_needs)
    }

    /// 资源委派裁决
    ///
    /// 模块 `name` 能否从父模块 `parent` 委派加载包 `pkg` 下的
    /// 资源。依次检查：内部元数据目录屏蔽、父模块导出包、友元
    /// 白名单（实现版本依赖豁免）、安装器最终裁决。
    pub fn should_delegate_resource(&self, name: &str, parent: &str, pkg: &str) -> bool {
        let state = self.state.read_recursive();

        // 模块私有的元数据目录从不跨模块暴露
        if pkg.starts_with("META-INF/") {
            return false;
        }

        let parent_record = match state.registry.get(parent) {
            Some(record) => record,
            None => return false,
        };

        if let Some(exports) = &parent_record.metadata.public_packages {
            let exported = exports.iter().any(|e| e.matches(pkg));
            let friend_ok = match &parent_record.metadata.friends {
                Some(friends) => friends.iter().any(|f| f == name),
                None => true,
            };
            // 实现版本依赖表示紧耦合，放开全部内容
            let impl_dep = state.registry.get(name).map(|r| {
                r.dependencies.iter().any(|d| {
                    d.kind == DependencyKind::Module
                        && d.target == parent
                        && d.impl_version.is_some()
                })
            });
            if !(impl_dep.unwrap_or(false)) && !(exported && friend_ok) {
                return false;
            }
        }

        state.installer.should_delegate_classpath_resource(pkg)
    }
}

impl std::fmt::Debug for ModuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read_recursive();
        f.debug_struct("ModuleEngine")
            .field("modules", &state.registry.len())
            .field("enabled", &state.registry.enabled_names().len())
            .finish()
    }
}
