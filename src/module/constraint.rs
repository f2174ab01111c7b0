//! 模块依赖约束检查
//!
//! 纯函数集合，判断一条模块依赖声明是否被某个候选目标满足。
//! 不查注册表、不碰缓存，解析器在递归探测时调用。
//!
//! 判定规则：
//!
//! 1. 大版本：声明了范围则目标大版本必须落在范围内（含端点）；
//! 2. 规格版本：仅当目标大版本等于范围下界时才比较（目标大版本
//!    更高时视为兼容性重置点之后，不再追究规格版本）；
//! 3. 实现版本：不透明字符串全等比较。

use semver::Version;

use crate::module::metadata::{Dependency, DependencyKind, ModuleMetadata, VersionComparison};

/// 目标大版本是否落在声明范围内
pub fn release_in_range(dep: &Dependency, target_release: i32) -> bool {
    match dep.release {
        Some((min, max)) => target_release >= min && target_release <= max,
        None => true,
    }
}

/// 规格版本比较是否生效
///
/// 目标大版本严格高于范围下界时跳过规格版本比较。未声明范围时
/// 总是比较。
fn spec_comparison_applies(dep: &Dependency, target_release: i32) -> bool {
    match dep.release {
        Some((min, _)) => target_release == min,
        None => true,
    }
}

/// 目标规格版本是否满足下界要求
pub fn spec_version_met(required: &Version, target_spec: Option<&Version>) -> bool {
    match target_spec {
        Some(actual) => actual >= required,
        None => false,
    }
}

/// 判断模块依赖声明是否被目标模块满足
///
/// 只做版本层面的静态判定，目标是否可启用由解析器另行递归探测。
///
/// # 参数
///
/// * `dep` - 依赖声明，`kind` 必须为 [`DependencyKind::Module`]
/// * `target` - 候选目标模块的元数据
pub fn module_dependency_met(dep: &Dependency, target: &ModuleMetadata) -> bool {
    debug_assert_eq!(dep.kind, DependencyKind::Module);
    debug_assert_eq!(dep.target, target.name);

    if !release_in_range(dep, target.release) {
        return false;
    }

    match dep.comparison {
        VersionComparison::Any => true,
        VersionComparison::Spec => {
            if !spec_comparison_applies(dep, target.release) {
                return true;
            }
            match &dep.spec_version {
                Some(required) => spec_version_met(required, target.spec_version.as_ref()),
                None => true,
            }
        }
        VersionComparison::Impl => {
            dep.impl_version.is_some() && dep.impl_version == target.impl_version
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::Dependency;

    fn target(release: i32, spec: Option<Version>, impl_v: Option<&str>) -> ModuleMetadata {
        let mut meta = ModuleMetadata::new("target").release(release);
        meta.spec_version = spec;
        meta.impl_version = impl_v.map(str::to_string);
        meta
    }

    #[test]
    fn test_any_comparison_only_checks_release() {
        let dep = Dependency::module("target").release(2);
        assert!(module_dependency_met(&dep, &target(2, None, None)));
        assert!(!module_dependency_met(&dep, &target(1, None, None)));
        assert!(!module_dependency_met(&dep, &target(3, None, None)));
    }

    #[test]
    fn test_no_release_constraint() {
        let dep = Dependency::module("target");
        assert!(module_dependency_met(&dep, &target(-1, None, None)));
        assert!(module_dependency_met(&dep, &target(7, None, None)));
    }

    #[test]
    fn test_spec_version_lower_bound() {
        let dep = Dependency::module("target").spec_min(Version::new(1, 2, 0));
        assert!(module_dependency_met(
            &dep,
            &target(-1, Some(Version::new(1, 2, 0)), None)
        ));
        assert!(module_dependency_met(
            &dep,
            &target(-1, Some(Version::new(2, 0, 0)), None)
        ));
        assert!(!module_dependency_met(
            &dep,
            &target(-1, Some(Version::new(1, 1, 9)), None)
        ));
        // 目标没有规格版本时无法满足下界要求
        assert!(!module_dependency_met(&dep, &target(-1, None, None)));
    }

    #[test]
    fn test_spec_skipped_above_range_minimum() {
        // 范围 1-2，目标大版本 2：规格版本不再比较
        let dep = Dependency::module("target")
            .release_range(1, 2)
            .spec_min(Version::new(9, 0, 0));
        assert!(module_dependency_met(
            &dep,
            &target(2, Some(Version::new(1, 0, 0)), None)
        ));
        // 目标大版本 1（范围下界）：规格版本必须达标
        assert!(!module_dependency_met(
            &dep,
            &target(1, Some(Version::new(1, 0, 0)), None)
        ));
    }

    #[test]
    fn test_impl_exact_match() {
        let dep = Dependency::module("target").impl_exact("build-42");
        assert!(module_dependency_met(&dep, &target(-1, None, Some("build-42"))));
        assert!(!module_dependency_met(&dep, &target(-1, None, Some("build-43"))));
        assert!(!module_dependency_met(&dep, &target(-1, None, None)));
    }
}
