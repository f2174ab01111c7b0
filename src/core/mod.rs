//! 核心配置模块

pub mod config;

pub use config::{EngineConfig, EngineConfigBuilder};
