//! # Sunmao Core - 榫卯模块引擎
//!
//! 榫卯是一个模块依赖解析与生命周期引擎，提供以下核心功能：
//!
//! - **依赖解析**: 模块依赖、令牌依赖（REQUIRES/NEEDS/RECOMMENDS）
//!   与环境依赖的约束求值，带两层记忆化问题缓存
//! - **启停模拟**: 启用闭包与停用闭包的完整推演，autoload 按需
//!   拉入、eager 自动启用、无用 autoload 回收
//! - **事务化启用**: 逐个激活，任何一步失败整批回滚
//! - **变更通知**: 批量收集、操作落定后一次性派发
//!
//! ## 快速开始
//!
//! ```rust
//! use std::sync::Arc;
//! use sunmao_core::{Dependency, ModuleEngine, ModuleMetadata, NoopHost, NoopInstaller};
//!
//! let engine = ModuleEngine::new(Arc::new(NoopInstaller));
//!
//! engine.create(ModuleMetadata::new("storage"), Box::new(NoopHost))?;
//! engine.create(
//!     ModuleMetadata::new("app").dependency(Dependency::module("storage")),
//!     Box::new(NoopHost),
//! )?;
//!
//! // 启用 app 自动连带启用 storage
//! let enabled = engine.enable_one("app")?;
//! assert_eq!(enabled, vec!["storage", "app"]);
//! # Ok::<(), sunmao_core::CoreError>(())
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 元数据、注册表、解析器、依赖图、生命周期接缝
//! - `core` - 引擎配置
//! - `utils` - 错误类型和日志初始化
//! - `api` - 公共 API 接口

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod core;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use crate::api::engine::ModuleEngine;
pub use crate::core::config::{EngineConfig, EngineConfigBuilder};
pub use module::{
    ChangeListener, Dependency, DependencyKind, Installer, ListenerId, ModuleEvent, ModuleHost,
    ModuleMetadata, NoopHost, NoopInstaller, PackageExport, Problem, VersionComparison,
};
pub use utils::{CoreError, Result};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
