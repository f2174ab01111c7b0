//! 公共 API 模块
//!
//! [`engine::ModuleEngine`] 是使用本库的唯一入口。

pub mod engine;

pub use engine::ModuleEngine;
