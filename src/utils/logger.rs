//! 日志初始化
//!
//! 引擎内部统一使用 [`tracing`] 宏记录结构化日志，本模块只提供
//! 一个可选的订阅器初始化入口，宿主程序也可以完全自行装配。

use tracing_subscriber::EnvFilter;

/// 初始化控制台日志订阅器
///
/// 日志级别优先读取 `RUST_LOG` 环境变量，未设置时使用传入的默认级别。
/// 重复调用时后续调用静默失败（订阅器只能安装一次）。
///
/// # 参数
///
/// * `default_level` - 默认日志级别，如 `"info"`、`"debug"`
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// 测试用日志初始化，输出写入测试捕获缓冲区
#[doc(hidden)]
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init("info");
        init("debug");
    }
}
