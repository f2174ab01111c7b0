//! 基本使用示例
//!
//! 本示例展示了榫卯模块引擎的基本使用方法，包括：
//!
//! - 创建引擎并注册模块
//! - 查询问题集
//! - 启用与停用（含连带的 autoload）
//! - 监听变更事件
//!
//! # 运行示例
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use sunmao_core::{
    Dependency, ModuleEngine, ModuleEvent, ModuleMetadata, NoopHost, NoopInstaller,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    sunmao_core::utils::logger::init("info");

    println!("=== 榫卯模块引擎基本使用示例 ===\n");

    // -------------------------------------------------------------------------
    // 1. 创建引擎
    // -------------------------------------------------------------------------
    println!("1. 创建引擎...");
    let engine = ModuleEngine::new(Arc::new(NoopInstaller));
    engine.add_listener(Arc::new(|event: &ModuleEvent| {
        println!("   [事件] {:?}", event);
    }));
    println!("   引擎创建成功\n");

    // -------------------------------------------------------------------------
    // 2. 注册模块
    // -------------------------------------------------------------------------
    println!("2. 注册模块...");
    engine.create(
        ModuleMetadata::new("logging").provide("svc.log").autoload(),
        Box::new(NoopHost),
    )?;
    engine.create(
        ModuleMetadata::new("storage").provide("db.kv"),
        Box::new(NoopHost),
    )?;
    engine.create(
        ModuleMetadata::new("app")
            .dependency(Dependency::module("storage"))
            .dependency(Dependency::requires("svc.log")),
        Box::new(NoopHost),
    )?;
    println!("   已注册 {} 个模块\n", engine.module_count());

    // -------------------------------------------------------------------------
    // 3. 查询问题集
    // -------------------------------------------------------------------------
    println!("3. 查询 app 的问题集...");
    let problems = engine.get_problems("app")?;
    println!("   问题数: {}（依赖齐备）\n", problems.len());

    // -------------------------------------------------------------------------
    // 4. 启用模块
    // -------------------------------------------------------------------------
    println!("4. 启用 app...");
    let enabled = engine.enable_one("app")?;
    println!("   启用顺序: {:?}", enabled);
    println!("   autoload 模块 logging 被连带启用: {}\n", engine.is_enabled("logging"));

    // -------------------------------------------------------------------------
    // 5. 停用模块
    // -------------------------------------------------------------------------
    println!("5. 停用 app...");
    let disabled = engine.disable_one("app")?;
    println!("   停用顺序: {:?}", disabled);
    println!("   无人使用的 logging 被回收: {}\n", !engine.is_enabled("logging"));

    // -------------------------------------------------------------------------
    // 6. 关闭引擎
    // -------------------------------------------------------------------------
    println!("6. 关闭引擎...");
    let closed = engine.shutdown();
    println!("   关闭{}", if closed { "完成" } else { "被否决" });

    Ok(())
}
