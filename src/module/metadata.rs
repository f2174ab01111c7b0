//! 模块元数据定义
//!
//! 定义模块声明中的所有数据结构：依赖声明、能力令牌、导出包、
//! 以及记录在问题缓存中的问题条目。
//!
//! 引擎本身不解析任何打包格式，元数据由调用方构造后注册。

use std::collections::HashSet;
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

/// 隐式自令牌前缀
///
/// 每个模块除声明的能力令牌外，总是隐式提供 `module.<模块名>`，
/// 其他模块可以借此用 REQUIRES/NEEDS 依赖到它。
pub const SELF_TOKEN_PREFIX: &str = "module.";

/// 依赖种类
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// 按名称依赖另一个模块，可附带大版本范围和规格/实现版本比较
    Module,
    /// 硬性能力令牌依赖：必须有可用的提供者
    Requires,
    /// 软硬取决于上下文的能力令牌依赖：部分调用场景将其视同硬依赖
    Needs,
    /// 建议性能力令牌依赖：没有提供者也不阻塞激活
    Recommends,
    /// 运行平台约束，只能在加载域就绪后校验
    Platform,
    /// 运行环境包约束，只能在加载域就绪后校验
    Package,
}

impl DependencyKind {
    /// 是否为能力令牌类依赖（通过提供者索引解析）
    pub fn is_token(&self) -> bool {
        matches!(
            self,
            DependencyKind::Requires | DependencyKind::Needs | DependencyKind::Recommends
        )
    }

    /// 是否为只能在激活期校验的环境类依赖
    pub fn is_environmental(&self) -> bool {
        matches!(self, DependencyKind::Platform | DependencyKind::Package)
    }
}

/// 版本比较方式
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum VersionComparison {
    /// 不比较版本，只要目标存在
    Any,
    /// 规格版本比较：目标的规格版本必须不低于声明值
    Spec,
    /// 实现版本比较：目标的实现版本字符串必须完全相等
    Impl,
}

/// 依赖声明
///
/// # 示例
///
/// ```rust
/// use semver::Version;
/// use sunmao_core::module::metadata::Dependency;
///
/// // 依赖模块 storage，大版本 1，规格版本 >= 1.2.0
/// let dep = Dependency::module("storage")
///     .release(1)
///     .spec_min(Version::new(1, 2, 0));
///
/// // 硬性令牌依赖
/// let tok = Dependency::requires("db.kv");
/// assert!(tok.kind.is_token());
/// assert_eq!(dep.target, "storage");
/// ```
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Dependency {
    /// 依赖种类
    pub kind: DependencyKind,

    /// 目标：模块名、能力令牌或平台/包标识
    pub target: String,

    /// 模块依赖的大版本范围（含端点）；`None` 表示不限
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<(i32, i32)>,

    /// 版本比较方式
    pub comparison: VersionComparison,

    /// 规格版本下界（`comparison == Spec` 时有意义）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<Version>,

    /// 实现版本（`comparison == Impl` 时有意义）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impl_version: Option<String>,
}

impl Dependency {
    fn new(kind: DependencyKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            release: None,
            comparison: VersionComparison::Any,
            spec_version: None,
            impl_version: None,
        }
    }

    /// 模块依赖
    pub fn module(target: impl Into<String>) -> Self {
        Self::new(DependencyKind::Module, target)
    }

    /// 硬性令牌依赖
    pub fn requires(token: impl Into<String>) -> Self {
        Self::new(DependencyKind::Requires, token)
    }

    /// NEEDS 令牌依赖
    pub fn needs(token: impl Into<String>) -> Self {
        Self::new(DependencyKind::Needs, token)
    }

    /// 建议性令牌依赖
    pub fn recommends(token: impl Into<String>) -> Self {
        Self::new(DependencyKind::Recommends, token)
    }

    /// 平台约束
    pub fn platform(spec: impl Into<String>) -> Self {
        Self::new(DependencyKind::Platform, spec)
    }

    /// 环境包约束
    pub fn package(pkg: impl Into<String>) -> Self {
        Self::new(DependencyKind::Package, pkg)
    }

    /// 限定目标模块的大版本
    pub fn release(mut self, release: i32) -> Self {
        self.release = Some((release, release));
        self
    }

    /// 限定目标模块的大版本范围（含端点）
    pub fn release_range(mut self, min: i32, max: i32) -> Self {
        self.release = Some((min, max));
        self
    }

    /// 要求目标的规格版本不低于给定值
    pub fn spec_min(mut self, version: Version) -> Self {
        self.comparison = VersionComparison::Spec;
        self.spec_version = Some(version);
        self
    }

    /// 要求目标的实现版本字符串完全相等
    pub fn impl_exact(mut self, version: impl Into<String>) -> Self {
        self.comparison = VersionComparison::Impl;
        self.impl_version = Some(version.into());
        self
    }

    /// 是否为带范围的大版本声明（min < max）
    pub fn is_ranged(&self) -> bool {
        matches!(self.release, Some((min, max)) if min < max)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.kind, self.target)?;
        if let Some((min, max)) = self.release {
            if min == max {
                write!(f, "/{}", min)?;
            } else {
                write!(f, "/{}-{}", min, max)?;
            }
        }
        match self.comparison {
            VersionComparison::Spec => {
                if let Some(v) = &self.spec_version {
                    write!(f, " >= {}", v)?;
                }
            }
            VersionComparison::Impl => {
                if let Some(v) = &self.impl_version {
                    write!(f, " = {}", v)?;
                }
            }
            VersionComparison::Any => {}
        }
        Ok(())
    }
}

/// 导出包声明
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PackageExport {
    /// 包路径前缀，如 `com/example/api/`
    pub package: String,

    /// 是否递归导出子包
    #[serde(default)]
    pub recursive: bool,
}

impl PackageExport {
    /// 创建导出包声明
    pub fn new(package: impl Into<String>, recursive: bool) -> Self {
        Self {
            package: package.into(),
            recursive,
        }
    }

    /// 给定包路径是否命中本导出项
    pub fn matches(&self, pkg: &str) -> bool {
        if self.recursive {
            pkg.starts_with(&self.package)
        } else {
            pkg == self.package
        }
    }
}

/// 模块元数据
///
/// 模块的全部静态声明。注册后由引擎持有，`autoload` 与 `eager`
/// 互斥：前者只会被依赖方连带启用、无人使用时连带停用，后者在
/// 依赖允许时自动启用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// 模块唯一名称
    pub name: String,

    /// 大版本号，`-1` 表示未声明
    #[serde(default = "default_release")]
    pub release: i32,

    /// 规格版本（单调可比较）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<Version>,

    /// 实现版本（不透明字符串）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impl_version: Option<String>,

    /// 依赖声明
    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    /// 提供的能力令牌（不含隐式自令牌）
    #[serde(default)]
    pub provides: Vec<String>,

    /// 导出包列表；`None` 表示全部导出
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_packages: Option<Vec<PackageExport>>,

    /// 友元模块白名单；`None` 表示对所有模块公开
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friends: Option<Vec<String>>,

    /// 是否为 autoload 模块
    #[serde(default)]
    pub autoload: bool,

    /// 是否为 eager 模块
    #[serde(default)]
    pub eager: bool,

    /// 片段宿主模块名；`Some` 表示本模块并入宿主的加载域
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_host: Option<String>,
}

fn default_release() -> i32 {
    -1
}

impl ModuleMetadata {
    /// 创建最简元数据
    ///
    /// # 示例
    ///
    /// ```rust
    /// use semver::Version;
    /// use sunmao_core::module::metadata::ModuleMetadata;
    ///
    /// let meta = ModuleMetadata::new("demo").spec(Version::new(1, 0, 0));
    /// assert!(meta.validate().is_ok());
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            release: -1,
            spec_version: None,
            impl_version: None,
            dependencies: vec![],
            provides: vec![],
            public_packages: None,
            friends: None,
            autoload: false,
            eager: false,
            fragment_host: None,
        }
    }

    /// 设置大版本号
    pub fn release(mut self, release: i32) -> Self {
        self.release = release;
        self
    }

    /// 设置规格版本
    pub fn spec(mut self, version: Version) -> Self {
        self.spec_version = Some(version);
        self
    }

    /// 设置实现版本
    pub fn impl_version(mut self, version: impl Into<String>) -> Self {
        self.impl_version = Some(version.into());
        self
    }

    /// 添加一条依赖声明
    pub fn dependency(mut self, dep: Dependency) -> Self {
        self.dependencies.push(dep);
        self
    }

    /// 添加一个提供的能力令牌
    pub fn provide(mut self, token: impl Into<String>) -> Self {
        self.provides.push(token.into());
        self
    }

    /// 标记为 autoload 模块
    pub fn autoload(mut self) -> Self {
        self.autoload = true;
        self
    }

    /// 标记为 eager 模块
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// 声明为片段模块，并入给定宿主的加载域
    pub fn fragment_of(mut self, host: impl Into<String>) -> Self {
        self.fragment_host = Some(host.into());
        self
    }

    /// 本模块的隐式自令牌
    pub fn self_token(&self) -> String {
        format!("{}{}", SELF_TOKEN_PREFIX, self.name)
    }

    /// 验证元数据有效性
    ///
    /// # 错误
    ///
    /// 返回所有违反项的描述列表：
    ///
    /// - 模块名为空
    /// - `autoload` 与 `eager` 同时为真
    /// - 片段宿主是自己
    /// - 大版本范围上下颠倒
    /// - 带范围的大版本声明配合实现版本比较（内部契约违规，这种
    ///   声明没有一致语义，注册时直接拒绝）
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = vec![];

        if self.name.is_empty() {
            errors.push("模块名不能为空".to_string());
        }

        if self.autoload && self.eager {
            errors.push(format!("模块 '{}' 不能同时为 autoload 和 eager", self.name));
        }

        if self.fragment_host.as_deref() == Some(self.name.as_str()) {
            errors.push(format!("片段模块 '{}' 不能以自己为宿主", self.name));
        }

        for dep in &self.dependencies {
            if let Some((min, max)) = dep.release {
                if min > max {
                    errors.push(format!("依赖 {} 的大版本范围上下颠倒", dep));
                }
            }
            if dep.is_ranged() && dep.comparison == VersionComparison::Impl {
                errors.push(format!(
                    "依赖 {} 对大版本范围使用实现版本比较，没有一致语义",
                    dep
                ));
            }
            if dep.kind == DependencyKind::Module && dep.target == self.name {
                errors.push(format!("模块 '{}' 不能依赖自己", self.name));
            }
        }

        let mut seen = HashSet::new();
        for token in &self.provides {
            if !seen.insert(token.as_str()) {
                errors.push(format!("能力令牌 '{}' 重复声明", token));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 问题条目
///
/// 记录某个模块当前无法激活的原因，缓存在问题缓存中，通过
/// `get_problems` 查询。未满足依赖从不作为错误抛出。
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Problem {
    /// 某条依赖声明当前不可满足
    UnmetDependency(Dependency),

    /// 真正激活时生命周期钩子失败
    ActivationFailure {
        /// 出错的模块名
        module: String,
        /// 失败原因
        reason: String,
    },
}

impl Problem {
    /// 是否为"硬"问题
    ///
    /// 硬问题不会因其他模块的注册/删除/重载而消失：激活失败、
    /// 以及平台/包类环境约束。模块间依赖与令牌依赖是"软"问题，
    /// 注册表变化时对应缓存条目会被精确失效并重算。
    pub fn is_hard(&self) -> bool {
        match self {
            Problem::ActivationFailure { .. } => true,
            Problem::UnmetDependency(dep) => dep.kind.is_environmental(),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::UnmetDependency(dep) => write!(f, "依赖不满足: {}", dep),
            Problem::ActivationFailure { module, reason } => {
                write!(f, "激活失败: {} - {}", module, reason)
            }
        }
    }
}
