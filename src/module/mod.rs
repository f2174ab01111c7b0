//! 模块管理模块
//!
//! 包含依赖解析与生命周期管理的核心组件：
//! - 模块元数据与依赖声明
//! - 注册表与提供者索引
//! - 约束求值、问题缓存与递归解析器
//! - 依赖图与拓扑排序
//! - 生命周期接缝（加载域宿主、安装器）
//! - 变更通知

pub mod constraint;
pub mod firer;
pub mod graph;
pub mod lifecycle;
pub mod metadata;
pub mod problems;
pub mod providers;
pub mod registry;
pub(crate) mod resolver;

// 重导出常用类型
pub use firer::{ChangeListener, ListenerId, ModuleEvent};
pub use graph::DependencyGraph;
pub use lifecycle::{Installer, ModuleHost, NoopHost, NoopInstaller};
pub use metadata::{
    Dependency, DependencyKind, ModuleMetadata, PackageExport, Problem, VersionComparison,
};
pub use problems::{ProbeEntry, ProbeTier, ProblemCache};
pub use providers::ProviderIndex;
pub use registry::{ModuleRecord, ModuleRegistry};
