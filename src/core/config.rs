//! 引擎配置
//!
//! 定义模块引擎的配置结构。配置在引擎创建时传入，之后只读。

use serde::{Deserialize, Serialize};

/// 引擎配置
///
/// # 示例
///
/// ```rust
/// use sunmao_core::core::config::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .ignore_duplicates(true)
///     .max_extra_rounds(4)
///     .build();
/// assert!(config.ignore_duplicates);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 注册重名模块时是否保留旧记录而非报错
    #[serde(default)]
    pub ignore_duplicates: bool,

    /// 是否以 debug 级别记录解析器走过的每条依赖边
    #[serde(default)]
    pub log_dependency_edges: bool,

    /// 启用批次重验证轮次上限
    ///
    /// 安装器的 `load` 钩子可以追加新模块，每次追加引擎重走一轮
    /// 模拟-激活。轮次超过上限视为外部机制失控，整批回滚。
    #[serde(default = "default_max_extra_rounds")]
    pub max_extra_rounds: usize,

    /// 日志级别，传给 [`logger::init`](crate::utils::logger::init)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_extra_rounds() -> usize {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ignore_duplicates: false,
            log_dependency_edges: false,
            max_extra_rounds: default_max_extra_rounds(),
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// 创建配置构建器
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// 引擎配置构建器
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// 重名模块保留旧记录
    pub fn ignore_duplicates(mut self, value: bool) -> Self {
        self.config.ignore_duplicates = value;
        self
    }

    /// 记录解析器依赖边日志
    pub fn log_dependency_edges(mut self, value: bool) -> Self {
        self.config.log_dependency_edges = value;
        self
    }

    /// 设置重验证轮次上限
    pub fn max_extra_rounds(mut self, value: usize) -> Self {
        self.config.max_extra_rounds = value;
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// 构建配置
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
