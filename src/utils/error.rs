//! 榫卯引擎错误类型定义
//!
//! 本模块定义了引擎中使用的所有错误类型。
//!
//! 错误分为四类：
//!
//! - 未满足依赖（[`Problem::UnmetDependency`]）是声明性的预期结果，
//!   只记录、查询，从不作为 `Err` 抛出；
//! - 激活失败（[`CoreError::ActivationFailed`]）表示某模块的生命周期
//!   钩子在真正激活时出错，导致整批回滚；
//! - 调用方违反前置条件（`Misuse` 系列）立即返回错误，不产生任何
//!   部分生效的状态；
//! - 循环异常（拓扑排序在约束检查通过后仍发现环）不在此处建模，
//!   解析器记录警告日志并降级返回，不让引擎崩溃。
//!
//! [`Problem::UnmetDependency`]: crate::module::metadata::Problem::UnmetDependency

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::module::metadata::Problem;

/// 榫卯引擎核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 注册表错误 ====================

    /// 模块未注册
    #[error("模块未注册: '{0}'")]
    ModuleNotFound(String),

    /// 模块重名（注册表中任意时刻不允许同名模块并存）
    #[error("模块已存在: '{0}'")]
    DuplicateModule(String),

    /// 模块元数据无效
    #[error("无效的模块元数据: {0}")]
    InvalidMetadata(String),

    // ==================== 前置条件错误 ====================

    /// 固定模块不能删除
    #[error("固定模块不能删除: '{0}'")]
    DeleteFixed(String),

    /// 已启用的模块不能删除
    #[error("已启用的模块不能删除: '{0}'")]
    DeleteEnabled(String),

    /// 固定模块不能重载
    #[error("固定模块不能重载: '{0}'")]
    ReloadFixed(String),

    /// 已启用的模块不能重载
    #[error("已启用的模块不能重载: '{0}'")]
    ReloadEnabled(String),

    /// 重载时模块名不允许改变
    #[error("重载不能改变模块名: '{old}' -> '{new}'")]
    ReloadRenamed {
        /// 原模块名
        old: String,
        /// 新元数据中的模块名
        new: String,
    },

    /// autoload 模块只能由解析器隐式启停
    #[error("autoload 模块不能被显式启用/停用: '{0}'")]
    ExplicitAutoload(String),

    /// eager 模块只能由解析器隐式启停
    #[error("eager 模块不能被显式启用/停用: '{0}'")]
    ExplicitEager(String),

    /// 模块已处于启用状态
    #[error("模块已启用: '{0}'")]
    AlreadyEnabled(String),

    /// 模块已处于停用状态
    #[error("模块未启用: '{0}'")]
    NotEnabled(String),

    /// 固定模块不能停用
    #[error("固定模块不能停用: '{0}'")]
    DisableFixed(String),

    /// 片段模块的宿主已启用，加载域无法再合并
    #[error("片段 '{fragment}' 的宿主 '{host}' 已启用，加载域无法再合并")]
    FragmentHostEnabled {
        /// 片段模块名
        fragment: String,
        /// 宿主模块名
        host: String,
    },

    /// 在变更通知回调中试图修改注册表
    #[error("禁止在变更通知回调中修改模块引擎")]
    ReentrantMutation,

    // ==================== 启停错误 ====================

    /// 请求启用的模块未能通过依赖模拟，附带每个被拒模块的问题集
    #[error("以下模块依赖不满足，无法启用: {}", format_report(.0))]
    EnableMissing(BTreeMap<String, BTreeSet<Problem>>),

    /// 模块激活失败（加载域构建、平台/包校验或 prepare 钩子出错），
    /// 本批次已全部回滚
    #[error("模块激活失败: '{module}' - {reason}")]
    ActivationFailed {
        /// 出错的模块名
        module: String,
        /// 失败原因
        reason: String,
    },

    /// 外部机制反复追加新模块但批次不再增长
    #[error("启用重验证轮次超限或无进展: {0:?}")]
    RevalidationStalled(Vec<String>),

    // ==================== 通用错误 ====================

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 引擎操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

fn format_report(report: &BTreeMap<String, BTreeSet<Problem>>) -> String {
    let mut parts = Vec::with_capacity(report.len());
    for (name, probs) in report {
        parts.push(format!("{} ({} 个问题)", name, probs.len()));
    }
    parts.join(", ")
}

impl CoreError {
    /// 是否为调用方违反前置条件的错误
    ///
    /// 这类错误在任何状态改变之前就会返回，调用方可以据此区分
    /// 编程错误与运行期激活失败。
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            CoreError::DeleteFixed(_)
                | CoreError::DeleteEnabled(_)
                | CoreError::ReloadFixed(_)
                | CoreError::ReloadEnabled(_)
                | CoreError::ReloadRenamed { .. }
                | CoreError::ExplicitAutoload(_)
                | CoreError::ExplicitEager(_)
                | CoreError::AlreadyEnabled(_)
                | CoreError::NotEnabled(_)
                | CoreError::DisableFixed(_)
                | CoreError::FragmentHostEnabled { .. }
                | CoreError::ReentrantMutation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::ModuleNotFound("demo".to_string());
        assert!(err.to_string().contains("demo"));

        let err = CoreError::ActivationFailed {
            module: "demo".to_string(),
            reason: "加载域构建失败".to_string(),
        };
        assert!(err.to_string().contains("demo"));
        assert!(err.to_string().contains("加载域构建失败"));
    }

    #[test]
    fn test_is_misuse() {
        assert!(CoreError::AlreadyEnabled("a".to_string()).is_misuse());
        assert!(CoreError::ReentrantMutation.is_misuse());
        assert!(!CoreError::ModuleNotFound("a".to_string()).is_misuse());
        assert!(!CoreError::ActivationFailed {
            module: "a".to_string(),
            reason: "x".to_string()
        }
        .is_misuse());
    }

    #[test]
    fn test_enable_missing_report() {
        let mut report = BTreeMap::new();
        report.insert("mod_a".to_string(), BTreeSet::new());
        let err = CoreError::EnableMissing(report);
        assert!(err.to_string().contains("mod_a"));
    }
}
