//! 工具模块
//!
//! 包含错误类型与日志初始化。

pub mod error;
pub mod logger;

pub use error::{CoreError, Result};
