//! 模块生命周期钩子
//!
//! 引擎只做依赖解析与状态编排，真正的加载域构建、资源准备与
//! 释放都通过本模块的两个 trait 委托给宿主程序：
//!
//! - [`ModuleHost`] - 每个模块一份，管理该模块的加载域；
//! - [`Installer`] - 引擎全局一份，介入注册精化、激活批次与关闭流程。
//!
//! 两个 trait 的所有方法都有保守的默认实现，测试和最简宿主
//! 可以直接使用 [`NoopHost`] 与 [`NoopInstaller`]。

use crate::module::metadata::{Dependency, ModuleMetadata};

/// 模块加载域宿主
///
/// 加载域是模块启用后持有的运行时资源（类路径、解释器上下文、
/// 进程内隔离单元等，具体含义由宿主决定）。引擎保证调用顺序：
/// 启用时先对依赖方的所有父模块完成 [`bring_loading_domain_up`]，
/// 停用时先 [`tear_loading_domain_down`] 再在确认阶段
/// [`release_resources`]。
///
/// [`bring_loading_domain_up`]: ModuleHost::bring_loading_domain_up
/// [`tear_loading_domain_down`]: ModuleHost::tear_loading_domain_down
/// [`release_resources`]: ModuleHost::release_resources
pub trait ModuleHost: Send + Sync {
    /// 构建本模块的加载域
    ///
    /// # 参数
    ///
    /// * `parents` - 父模块名集合（本模块依赖的、已就绪的模块，
    ///   片段模块的父集合已并入宿主的父集合）
    ///
    /// # 错误
    ///
    /// 构建失败返回错误，引擎回滚整个启用批次并把失败记为该
    /// 模块的硬问题。
    fn bring_loading_domain_up(
        &self,
        parents: &std::collections::BTreeSet<String>,
    ) -> anyhow::Result<()> {
        let _ = parents;
        Ok(())
    }

    /// 拆除加载域
    ///
    /// 停用第一阶段调用。实现不允许失败，清理错误自行记录日志。
    fn tear_loading_domain_down(&self) {}

    /// 释放加载域残留资源
    ///
    /// 停用第二阶段（确认阶段）调用，此时整批模块都已拆除完毕。
    fn release_resources(&self) {}

    /// 校验平台/环境包约束
    ///
    /// 只在模块自己的加载域就绪后调用，此时宿主可以探测真实
    /// 运行环境。返回 `false` 导致激活失败并回滚。
    fn check_domain_dependency(&self, dep: &Dependency) -> bool {
        let _ = dep;
        true
    }
}

/// 引擎安装器
///
/// 全局钩子，在注册、启用、停用与关闭的关键节点介入。
pub trait Installer: Send + Sync {
    /// 注册时精化依赖声明
    ///
    /// 可以向 `deps` 追加宿主策略注入的额外依赖（例如平台强制
    /// 依赖某内核模块）。
    fn refine_dependencies(&self, metadata: &ModuleMetadata, deps: &mut Vec<Dependency>) {
        let _ = (metadata, deps);
    }

    /// 注册时补充提供的能力令牌
    fn refine_provides(&self, metadata: &ModuleMetadata) -> Vec<String> {
        let _ = metadata;
        Vec::new()
    }

    /// 探测期校验环境类依赖
    ///
    /// 仅对可选模块（eager 模块与提供额外令牌的 autoload 模块）
    /// 的平台/包约束调用，常规模块的环境约束推迟到激活期。
    fn check_environment(&self, dep: &Dependency) -> bool {
        let _ = dep;
        true
    }

    /// 激活单个模块
    ///
    /// 在加载域就绪、环境约束通过之后调用。
    ///
    /// # 错误
    ///
    /// 失败导致整批回滚，并为该模块记录激活失败硬问题。
    fn prepare(&self, module: &str) -> anyhow::Result<()> {
        let _ = module;
        Ok(())
    }

    /// 整批激活完成通知
    ///
    /// # 参数
    ///
    /// * `order` - 本批模块的启用顺序（被依赖方在前）
    ///
    /// # 返回
    ///
    /// 宿主机制在加载过程中发现的、需要追加启用的模块名。引擎
    /// 对返回值重新走完整的模拟-激活流程。
    fn load(&self, order: &[String]) -> Vec<String> {
        let _ = order;
        Vec::new()
    }

    /// 整批停用开始通知
    ///
    /// # 参数
    ///
    /// * `order` - 本批模块的停用顺序（依赖方在前）
    fn unload(&self, order: &[String]) {
        let _ = order;
    }

    /// 单个模块停用
    fn dispose(&self, module: &str) {
        let _ = module;
    }

    /// 引擎关闭预询问
    ///
    /// # 返回
    ///
    /// 返回 `false` 否决本次关闭，引擎中止关闭流程。
    fn closing(&self, order: &[String]) -> bool {
        let _ = order;
        true
    }

    /// 资源委派的最终裁决
    ///
    /// 包可见性检查全部通过后仍会征询安装器，宿主可以在此屏蔽
    /// 特定包。
    fn should_delegate_classpath_resource(&self, pkg: &str) -> bool {
        let _ = pkg;
        true
    }
}

/// 无操作加载域宿主
///
/// 所有钩子使用默认实现，适用于测试与纯逻辑模块。
#[derive(Debug, Default)]
pub struct NoopHost;

impl ModuleHost for NoopHost {}

/// 无操作安装器
#[derive(Debug, Default)]
pub struct NoopInstaller;

impl Installer for NoopInstaller {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_noop_host_defaults() {
        let host = NoopHost;
        assert!(host.bring_loading_domain_up(&BTreeSet::new()).is_ok());
        assert!(host.check_domain_dependency(&Dependency::platform("linux")));
        host.tear_loading_domain_down();
        host.release_resources();
    }

    #[test]
    fn test_noop_installer_defaults() {
        let installer = NoopInstaller;
        assert!(installer.prepare("demo").is_ok());
        assert!(installer.load(&["demo".to_string()]).is_empty());
        assert!(installer.closing(&[]));
        assert!(installer.should_delegate_classpath_resource("com/example/"));
        assert!(installer.check_environment(&Dependency::package("org.example")));
    }
}
