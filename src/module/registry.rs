//! 模块注册表
//!
//! 本模块提供引擎内部的模块记录与注册表结构。
//!
//! 注册表维护"模块名 -> 记录"的唯一映射与"宿主 -> 片段集合"的
//! 附着关系。记录持有精化后的依赖与令牌（含隐式自令牌），以及
//! 模块当前的启用状态。所有状态转换由上层引擎驱动，注册表本身
//! 只保证结构一致性。

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::module::lifecycle::ModuleHost;
use crate::module::metadata::{Dependency, ModuleMetadata};
use crate::utils::{CoreError, Result};

/// 模块记录
///
/// 注册表中一个模块的完整运行时状态。
pub struct ModuleRecord {
    /// 原始元数据
    pub metadata: ModuleMetadata,

    /// 精化后的依赖声明（原始声明加安装器注入的声明）
    pub dependencies: Vec<Dependency>,

    /// 精化后的提供令牌（声明令牌、安装器补充令牌与隐式自令牌）
    pub provides: Vec<String>,

    /// 是否为固定模块（随引擎存亡，不可删除/重载/停用）
    pub fixed: bool,

    /// 当前是否启用
    pub enabled: bool,

    /// 最近一次启用时间
    pub enabled_at: Option<DateTime<Utc>>,

    /// 加载域宿主
    pub host: Box<dyn ModuleHost>,
}

impl ModuleRecord {
    /// 创建未启用的模块记录
    ///
    /// `dependencies` 与 `provides` 应传入精化完成的结果；隐式
    /// 自令牌在此处追加，调用方不需要自己拼。
    pub fn new(
        metadata: ModuleMetadata,
        dependencies: Vec<Dependency>,
        mut provides: Vec<String>,
        fixed: bool,
        host: Box<dyn ModuleHost>,
    ) -> Self {
        let self_token = metadata.self_token();
        if !provides.contains(&self_token) {
            provides.push(self_token);
        }

        Self {
            metadata,
            dependencies,
            provides,
            fixed,
            enabled: false,
            enabled_at: None,
            host,
        }
    }

    /// 模块名
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// 是否为 autoload 模块
    pub fn is_autoload(&self) -> bool {
        self.metadata.autoload
    }

    /// 是否为 eager 模块
    pub fn is_eager(&self) -> bool {
        self.metadata.eager
    }

    /// 是否为片段模块
    pub fn is_fragment(&self) -> bool {
        self.metadata.fragment_host.is_some()
    }

    /// 除隐式自令牌外是否还提供其他令牌
    pub fn provides_beyond_self(&self) -> bool {
        let self_token = self.metadata.self_token();
        self.provides.iter().any(|t| *t != self_token)
    }

    /// 是否提供指定令牌
    pub fn provides_token(&self, token: &str) -> bool {
        self.provides.iter().any(|t| t == token)
    }
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("name", &self.metadata.name)
            .field("fixed", &self.fixed)
            .field("enabled", &self.enabled)
            .field("autoload", &self.metadata.autoload)
            .field("eager", &self.metadata.eager)
            .field("provides", &self.provides)
            .finish()
    }
}

/// 模块注册表
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    /// 模块名 -> 记录
    records: HashMap<String, ModuleRecord>,
    /// 宿主模块名 -> 附着的片段模块名集合
    fragments: HashMap<String, BTreeSet<String>>,
}

impl ModuleRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册模块记录
    ///
    /// # 参数
    ///
    /// * `record` - 待注册的记录
    /// * `ignore_duplicates` - 重名时是否保留旧记录（而非报错）
    ///
    /// # 返回
    ///
    /// 注册成功返回 `true`；`ignore_duplicates` 生效而保留旧记录
    /// 时返回 `false`。
    ///
    /// # 错误
    ///
    /// 重名且未开启 `ignore_duplicates` 时返回
    /// [`CoreError::DuplicateModule`]。
    pub fn add(&mut self, record: ModuleRecord, ignore_duplicates: bool) -> Result<bool> {
        let name = record.name().to_string();
        if self.records.contains_key(&name) {
            if ignore_duplicates {
                warn!(module = %name, "模块重名，保留已注册的记录");
                return Ok(false);
            }
            return Err(CoreError::DuplicateModule(name));
        }

        if let Some(host) = record.metadata.fragment_host.clone() {
            self.fragments.entry(host).or_default().insert(name.clone());
        }

        debug!(module = %name, fixed = record.fixed, "模块已注册");
        self.records.insert(name, record);
        Ok(true)
    }

    /// 移除模块记录
    ///
    /// 片段附着关系同步清理。模块不存在时返回 `None`。
    pub fn remove(&mut self, name: &str) -> Option<ModuleRecord> {
        let record = self.records.remove(name)?;
        if let Some(host) = &record.metadata.fragment_host {
            if let Some(set) = self.fragments.get_mut(host) {
                set.remove(name);
                if set.is_empty() {
                    self.fragments.remove(host);
                }
            }
        }
        debug!(module = %name, "模块已移除");
        Some(record)
    }

    /// 查询记录
    pub fn get(&self, name: &str) -> Option<&ModuleRecord> {
        self.records.get(name)
    }

    /// 查询可变记录
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ModuleRecord> {
        self.records.get_mut(name)
    }

    /// 是否存在指定模块
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// 注册模块总数
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 所有模块名（排序）
    pub fn names(&self) -> BTreeSet<String> {
        self.records.keys().cloned().collect()
    }

    /// 所有已启用模块名（排序）
    pub fn enabled_names(&self) -> BTreeSet<String> {
        self.records
            .values()
            .filter(|r| r.enabled)
            .map(|r| r.name().to_string())
            .collect()
    }

    /// 遍历全部记录
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.records.values()
    }

    /// 附着在指定宿主上的片段集合
    pub fn fragments_of(&self, host: &str) -> BTreeSet<String> {
        self.fragments.get(host).cloned().unwrap_or_default()
    }
}
