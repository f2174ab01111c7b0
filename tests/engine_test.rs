//! 引擎生命周期集成测试
//!
//! 测试模块引擎的完整工作流程，包括：
//! - 注册 → 启用 → 停用 → 删除
//! - 安装器钩子的调用顺序
//! - 激活失败的整批回滚
//! - 重验证轮次（安装器追加模块）
//! - 变更监听与重入拦截
//! - 引擎关闭与否决

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;

use sunmao_core::module::metadata::Problem;
use sunmao_core::{
    CoreError, Dependency, EngineConfig, Installer, ModuleEngine, ModuleEvent, ModuleMetadata,
    NoopHost, NoopInstaller,
};

// ============================================================================
// 测试辅助结构
// ============================================================================

/// 记录每次钩子调用的安装器
#[derive(Default)]
struct RecordingInstaller {
    calls: Mutex<Vec<String>>,
}

impl RecordingInstaller {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl Installer for RecordingInstaller {
    fn prepare(&self, module: &str) -> anyhow::Result<()> {
        self.calls.lock().push(format!("prepare:{}", module));
        Ok(())
    }

    fn load(&self, order: &[String]) -> Vec<String> {
        self.calls.lock().push(format!("load:{}", order.join(",")));
        Vec::new()
    }

    fn unload(&self, order: &[String]) {
        self.calls.lock().push(format!("unload:{}", order.join(",")));
    }

    fn dispose(&self, module: &str) {
        self.calls.lock().push(format!("dispose:{}", module));
    }
}

/// 对指定模块的 prepare 钩子报错的安装器
struct FailingInstaller {
    fail_on: &'static str,
}

impl Installer for FailingInstaller {
    fn prepare(&self, module: &str) -> anyhow::Result<()> {
        if module == self.fail_on {
            return Err(anyhow!("模拟的资源准备失败"));
        }
        Ok(())
    }
}

/// load 钩子总是要求追加同一个模块的安装器
struct ExtraInstaller {
    extra: &'static str,
}

impl Installer for ExtraInstaller {
    fn load(&self, _order: &[String]) -> Vec<String> {
        vec![self.extra.to_string()]
    }
}

/// 否决关闭的安装器
struct VetoInstaller;

impl Installer for VetoInstaller {
    fn closing(&self, _order: &[String]) -> bool {
        false
    }
}

fn engine() -> ModuleEngine {
    sunmao_core::utils::logger::init_for_tests();
    ModuleEngine::new(Arc::new(NoopInstaller))
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// 注册与删除
// ============================================================================

#[test]
fn test_register_query_delete() {
    let engine = engine();
    engine
        .create(ModuleMetadata::new("demo"), Box::new(NoopHost))
        .unwrap();

    assert!(engine.contains("demo"));
    assert_eq!(engine.get_modules(), set(&["demo"]));
    assert!(engine.get_enabled_modules().is_empty());

    engine.delete("demo").unwrap();
    assert!(!engine.contains("demo"));
    assert_eq!(engine.module_count(), 0);
}

#[test]
fn test_duplicate_registration_rejected() {
    let engine = engine();
    engine
        .create(ModuleMetadata::new("demo"), Box::new(NoopHost))
        .unwrap();

    let err = engine
        .create(ModuleMetadata::new("demo"), Box::new(NoopHost))
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateModule(_)));
}

#[test]
fn test_duplicate_registration_ignored_by_config() {
    let config = EngineConfig::builder().ignore_duplicates(true).build();
    let engine = ModuleEngine::with_config(config, Arc::new(NoopInstaller));

    engine
        .create(ModuleMetadata::new("demo").release(1), Box::new(NoopHost))
        .unwrap();
    engine
        .create(ModuleMetadata::new("demo").release(2), Box::new(NoopHost))
        .unwrap();

    // 保留先注册的记录
    assert_eq!(engine.get_metadata("demo").unwrap().release, 1);
}

#[test]
fn test_fixed_module_protections() {
    let engine = engine();
    engine
        .create_fixed(ModuleMetadata::new("kernel"), Box::new(NoopHost))
        .unwrap();
    engine.enable_one("kernel").unwrap();

    assert!(matches!(
        engine.delete("kernel").unwrap_err(),
        CoreError::DeleteFixed(_)
    ));
    assert!(matches!(
        engine.disable_one("kernel").unwrap_err(),
        CoreError::DisableFixed(_)
    ));
    assert!(matches!(
        engine
            .reload("kernel", ModuleMetadata::new("kernel"))
            .unwrap_err(),
        CoreError::ReloadFixed(_)
    ));
}

#[test]
fn test_reload_cannot_rename() {
    let engine = engine();
    engine
        .create(ModuleMetadata::new("old_name"), Box::new(NoopHost))
        .unwrap();

    let err = engine
        .reload("old_name", ModuleMetadata::new("new_name"))
        .unwrap_err();
    assert!(matches!(err, CoreError::ReloadRenamed { .. }));
}

// ============================================================================
// 启用与停用
// ============================================================================

#[test]
fn test_enable_pulls_module_dependencies() {
    let engine = engine();
    engine
        .create(ModuleMetadata::new("base"), Box::new(NoopHost))
        .unwrap();
    engine
        .create(
            ModuleMetadata::new("mid").dependency(Dependency::module("base")),
            Box::new(NoopHost),
        )
        .unwrap();
    engine
        .create(
            ModuleMetadata::new("app").dependency(Dependency::module("mid")),
            Box::new(NoopHost),
        )
        .unwrap();

    let enabled = engine.enable_one("app").unwrap();
    assert_eq!(enabled, vec!["base", "mid", "app"]);
    assert_eq!(engine.get_enabled_modules(), set(&["app", "base", "mid"]));
}

#[test]
fn test_disable_cascades_reverse_closure() {
    let engine = engine();
    engine
        .create(ModuleMetadata::new("base"), Box::new(NoopHost))
        .unwrap();
    engine
        .create(
            ModuleMetadata::new("mid").dependency(Dependency::module("base")),
            Box::new(NoopHost),
        )
        .unwrap();
    engine
        .create(
            ModuleMetadata::new("app").dependency(Dependency::module("mid")),
            Box::new(NoopHost),
        )
        .unwrap();
    engine.enable_one("app").unwrap();

    // 停用最底层，依赖方先于被依赖方停用
    let disabled = engine.disable_one("base").unwrap();
    assert_eq!(disabled, vec!["app", "mid", "base"]);
    assert!(engine.get_enabled_modules().is_empty());
}

#[test]
fn test_enable_already_enabled_rejected() {
    let engine = engine();
    engine
        .create(ModuleMetadata::new("demo"), Box::new(NoopHost))
        .unwrap();
    engine.enable_one("demo").unwrap();

    let err = engine.enable_one("demo").unwrap_err();
    assert!(matches!(err, CoreError::AlreadyEnabled(_)));
    assert!(err.is_misuse());
}

#[test]
fn test_enable_missing_dependency_fails_atomically() {
    let engine = engine();
    engine
        .create(
            ModuleMetadata::new("app").dependency(Dependency::module("absent")),
            Box::new(NoopHost),
        )
        .unwrap();

    match engine.enable_one("app").unwrap_err() {
        CoreError::EnableMissing(report) => {
            let problems = &report["app"];
            assert!(problems
                .iter()
                .any(|p| matches!(p, Problem::UnmetDependency(d) if d.target == "absent")));
        }
        other => panic!("意外错误: {}", other),
    }
    assert!(engine.get_enabled_modules().is_empty());
}

#[test]
fn test_installer_hook_order() {
    let installer = Arc::new(RecordingInstaller::default());
    let engine = ModuleEngine::new(Arc::clone(&installer) as Arc<dyn Installer>);

    engine
        .create(ModuleMetadata::new("base"), Box::new(NoopHost))
        .unwrap();
    engine
        .create(
            ModuleMetadata::new("app").dependency(Dependency::module("base")),
            Box::new(NoopHost),
        )
        .unwrap();

    engine.enable_one("app").unwrap();
    engine.disable_one("base").unwrap();

    assert_eq!(
        installer.calls(),
        vec![
            "prepare:base",
            "prepare:app",
            "load:base,app",
            "unload:app,base",
            "dispose:app",
            "dispose:base",
        ]
    );
}

// ============================================================================
// 回滚与重验证
// ============================================================================

#[test]
fn test_activation_failure_rolls_back_whole_batch() {
    let engine = ModuleEngine::new(Arc::new(FailingInstaller { fail_on: "app" }));
    engine
        .create(ModuleMetadata::new("base"), Box::new(NoopHost))
        .unwrap();
    engine
        .create(
            ModuleMetadata::new("app").dependency(Dependency::module("base")),
            Box::new(NoopHost),
        )
        .unwrap();

    let err = engine.enable_one("app").unwrap_err();
    assert!(matches!(err, CoreError::ActivationFailed { .. }));

    // base 已激活成功，也要跟着回滚
    assert!(!engine.is_enabled("base"));
    assert!(!engine.is_enabled("app"));

    // 激活失败作为硬问题留在问题集里
    let problems = engine.get_problems("app").unwrap();
    assert!(problems
        .iter()
        .any(|p| matches!(p, Problem::ActivationFailure { .. })));
}

#[test]
fn test_load_hook_extras_get_enabled() {
    let engine = ModuleEngine::new(Arc::new(ExtraInstaller { extra: "bridge" }));
    engine
        .create(ModuleMetadata::new("bridge"), Box::new(NoopHost))
        .unwrap();
    engine
        .create(ModuleMetadata::new("app"), Box::new(NoopHost))
        .unwrap();

    let enabled = engine.enable_one("app").unwrap();
    assert_eq!(enabled, vec!["app", "bridge"]);
    assert!(engine.is_enabled("bridge"));
}

// ============================================================================
// 变更监听
// ============================================================================

#[test]
fn test_events_fired_after_batch_completes() {
    let engine = Arc::new(engine());
    let events: Arc<Mutex<Vec<ModuleEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    engine.add_listener(Arc::new(move |event: &ModuleEvent| {
        sink.lock().push(event.clone());
    }));

    engine
        .create(ModuleMetadata::new("base"), Box::new(NoopHost))
        .unwrap();
    engine
        .create(
            ModuleMetadata::new("app").dependency(Dependency::module("base")),
            Box::new(NoopHost),
        )
        .unwrap();
    events.lock().clear();

    engine.enable_one("app").unwrap();

    let events = events.lock();
    // 引擎级变化先于逐模块变化，模块按启用顺序
    let described: Vec<String> = events
        .iter()
        .map(|e| match e {
            ModuleEvent::PropertyChanged {
                module, property, ..
            } => format!("{}:{}", module.as_deref().unwrap_or("-"), property),
            other => format!("{:?}", other),
        })
        .collect();
    assert_eq!(
        described,
        vec!["-:enabled_modules", "base:enabled", "app:enabled"]
    );
}

#[test]
fn test_listener_sees_final_state() {
    let engine = Arc::new(engine());
    let observed = Arc::new(Mutex::new(Vec::new()));

    let inner = Arc::clone(&engine);
    let sink = Arc::clone(&observed);
    engine.add_listener(Arc::new(move |_: &ModuleEvent| {
        sink.lock().push(inner.get_enabled_modules().len());
    }));

    engine
        .create(ModuleMetadata::new("base"), Box::new(NoopHost))
        .unwrap();
    engine
        .create(
            ModuleMetadata::new("app").dependency(Dependency::module("base")),
            Box::new(NoopHost),
        )
        .unwrap();
    engine.enable_one("app").unwrap();

    // 所有回调观察到的都是操作完成后的状态，没有中间态
    assert!(observed.lock().iter().all(|n| *n == 0 || *n == 2));
}

#[test]
fn test_mutation_from_listener_rejected() {
    let engine = Arc::new(engine());
    let captured: Arc<Mutex<Option<CoreError>>> = Arc::new(Mutex::new(None));

    let inner = Arc::clone(&engine);
    let sink = Arc::clone(&captured);
    engine.add_listener(Arc::new(move |_: &ModuleEvent| {
        if sink.lock().is_none() {
            let result = inner.create(ModuleMetadata::new("sneaky"), Box::new(NoopHost));
            *sink.lock() = result.err();
        }
    }));

    engine
        .create(ModuleMetadata::new("demo"), Box::new(NoopHost))
        .unwrap();

    assert!(matches!(
        *captured.lock(),
        Some(CoreError::ReentrantMutation)
    ));
    assert!(!engine.contains("sneaky"));
}

#[test]
fn test_listener_can_query_problems_during_firing() {
    let engine = Arc::new(engine());
    let observed: Arc<Mutex<Option<usize>>> = Arc::new(Mutex::new(None));

    let inner = Arc::clone(&engine);
    let sink = Arc::clone(&observed);
    engine.add_listener(Arc::new(move |event: &ModuleEvent| {
        if let ModuleEvent::Created { module } = event {
            if module == "app" {
                let problems = inner.get_problems("app").unwrap();
                *sink.lock() = Some(problems.len());
            }
        }
    }));

    engine
        .create(
            ModuleMetadata::new("app").dependency(Dependency::module("absent")),
            Box::new(NoopHost),
        )
        .unwrap();

    // 回调中能拿到问题集，而不是被重入拦截
    assert_eq!(*observed.lock(), Some(1));
}

#[test]
fn test_removed_listener_not_called() {
    let engine = engine();
    let events: Arc<Mutex<Vec<ModuleEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let id = engine.add_listener(Arc::new(move |event: &ModuleEvent| {
        sink.lock().push(event.clone());
    }));

    engine.remove_listener(id);
    engine
        .create(ModuleMetadata::new("demo"), Box::new(NoopHost))
        .unwrap();

    assert!(events.lock().is_empty());
}

// ============================================================================
// 关闭
// ============================================================================

#[test]
fn test_shutdown_veto_keeps_modules_enabled() {
    let engine = ModuleEngine::new(Arc::new(VetoInstaller));
    engine
        .create(ModuleMetadata::new("demo"), Box::new(NoopHost))
        .unwrap();
    engine.enable_one("demo").unwrap();

    assert!(!engine.shutdown());
    assert!(engine.is_enabled("demo"));
}

#[test]
fn test_shutdown_unloads_in_teardown_order() {
    let installer = Arc::new(RecordingInstaller::default());
    let engine = ModuleEngine::new(Arc::clone(&installer) as Arc<dyn Installer>);

    engine
        .create(ModuleMetadata::new("base"), Box::new(NoopHost))
        .unwrap();
    engine
        .create(
            ModuleMetadata::new("app").dependency(Dependency::module("base")),
            Box::new(NoopHost),
        )
        .unwrap();
    engine.enable_one("app").unwrap();

    assert!(engine.shutdown());
    let calls = installer.calls();
    assert!(calls.contains(&"unload:app,base".to_string()));
}

// ============================================================================
// 资源委派
// ============================================================================

#[test]
fn test_resource_delegation_respects_exports_and_friends() {
    use sunmao_core::PackageExport;

    let engine = engine();
    let mut parent = ModuleMetadata::new("parent");
    parent.public_packages = Some(vec![PackageExport::new("com/example/api/", true)]);
    parent.friends = Some(vec!["buddy".to_string()]);
    engine.create(parent, Box::new(NoopHost)).unwrap();

    engine
        .create(ModuleMetadata::new("buddy"), Box::new(NoopHost))
        .unwrap();
    engine
        .create(ModuleMetadata::new("stranger"), Box::new(NoopHost))
        .unwrap();
    engine
        .create(
            ModuleMetadata::new("coupled")
                .dependency(Dependency::module("parent").impl_exact("build-42")),
            Box::new(NoopHost),
        )
        .unwrap();

    // 友元访问导出包
    assert!(engine.should_delegate_resource("buddy", "parent", "com/example/api/util/"));
    // 友元访问未导出包
    assert!(!engine.should_delegate_resource("buddy", "parent", "com/example/internal/"));
    // 非友元访问导出包
    assert!(!engine.should_delegate_resource("stranger", "parent", "com/example/api/util/"));
    // 实现版本依赖豁免全部检查
    assert!(engine.should_delegate_resource("coupled", "parent", "com/example/internal/"));
    // 元数据目录从不委派
    assert!(!engine.should_delegate_resource("buddy", "parent", "META-INF/services/"));
}
