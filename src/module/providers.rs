//! 能力令牌提供者索引
//!
//! 维护"令牌 -> 提供者模块集合"的倒排索引，供解析器查找
//! REQUIRES/NEEDS/RECOMMENDS 依赖的候选提供者。
//!
//! 索引惰性构建：第一次查询时从注册表全量扫描，之后由注册/删除/
//! 重载操作增量维护。从未被查询过的索引保持空置，注册高峰期不
//! 付出维护成本。

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

/// 提供者索引
#[derive(Debug, Default)]
pub struct ProviderIndex {
    /// `None` 表示尚未构建
    index: Option<HashMap<String, BTreeSet<String>>>,
}

impl ProviderIndex {
    /// 创建空置索引
    pub fn new() -> Self {
        Self::default()
    }

    /// 索引是否已构建
    pub fn is_built(&self) -> bool {
        self.index.is_some()
    }

    /// 丢弃索引，下次查询时重建
    pub fn invalidate(&mut self) {
        self.index = None;
    }

    /// 查询令牌的提供者集合
    ///
    /// 索引未构建时先用 `all_modules` 提供的 (模块名, 提供令牌)
    /// 迭代器做一次全量构建。
    ///
    /// # 返回
    ///
    /// 提供该令牌的模块名集合，按名称排序；无提供者时为空集。
    pub fn providers_of<'a, I>(&mut self, token: &str, all_modules: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        self.ensure_built(all_modules);
        self.index
            .as_ref()
            .and_then(|idx| idx.get(token))
            .cloned()
            .unwrap_or_default()
    }

    fn ensure_built<'a, I>(&mut self, all_modules: I)
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        if self.index.is_some() {
            return;
        }

        let mut index: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (name, provides) in all_modules {
            for token in provides {
                index
                    .entry(token.clone())
                    .or_default()
                    .insert(name.to_string());
            }
        }
        trace!(tokens = index.len(), "提供者索引已构建");
        self.index = Some(index);
    }

    /// 增量登记新模块的提供令牌
    ///
    /// 索引未构建时不做任何事。
    pub fn provider_added(&mut self, name: &str, provides: &[String]) {
        if let Some(index) = self.index.as_mut() {
            for token in provides {
                index
                    .entry(token.clone())
                    .or_default()
                    .insert(name.to_string());
            }
        }
    }

    /// 增量移除模块的提供令牌
    ///
    /// 某令牌的提供者集合清空后整个条目被移除。索引未构建时
    /// 不做任何事。
    pub fn provider_removed(&mut self, name: &str, provides: &[String]) {
        if let Some(index) = self.index.as_mut() {
            for token in provides {
                if let Some(set) = index.get_mut(token) {
                    set.remove(name);
                    if set.is_empty() {
                        index.remove(token);
                    }
                }
            }
        }
    }
}
