//! 模块依赖关系图
//!
//! 本模块提供解析器内部使用的依赖关系图结构。
//!
//! 图只在一次模拟或一次激活批次内临时构建，节点是模块名，
//! 边表示"依赖方 -> 被依赖方"。所有容器使用有序集合，保证
//! 同样的输入总是产生同样的排序结果。
//!
//! 约束检查通过之后拓扑排序仍可能发现环（能力令牌互相提供
//! 造成的合法循环结构之外的真实依赖环）。这种情况不作为错误
//! 抛出，排序接口把环路径返回给调用方，由解析器记录警告日志
//! 并降级处理。
//!
//! # 示例
//!
//! ```rust
//! use sunmao_core::module::graph::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_edge("app", "storage");
//! graph.add_edge("storage", "kernel");
//!
//! let order = graph.topological_sort().unwrap();
//! assert_eq!(order, vec!["kernel", "storage", "app"]);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// 依赖关系图
///
/// 有向图，边 `a -> b` 表示模块 `a` 依赖模块 `b`。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 正向边：模块名 -> 该模块依赖的模块集合
    edges: BTreeMap<String, BTreeSet<String>>,
    /// 反向边：模块名 -> 依赖该模块的模块集合
    reverse_edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// 创建一个空的依赖图
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加模块节点
    ///
    /// 节点已存在时不做任何事。
    pub fn add_node(&mut self, name: &str) {
        self.edges.entry(name.to_string()).or_default();
        self.reverse_edges.entry(name.to_string()).or_default();
    }

    /// 添加依赖边
    ///
    /// 表示 `from` 依赖 `to`。两端节点不存在时自动创建。
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.add_node(from);
        self.add_node(to);
        if let Some(deps) = self.edges.get_mut(from) {
            deps.insert(to.to_string());
        }
        if let Some(rev) = self.reverse_edges.get_mut(to) {
            rev.insert(from.to_string());
        }
    }

    /// 图中是否包含指定节点
    pub fn contains(&self, name: &str) -> bool {
        self.edges.contains_key(name)
    }

    /// 节点数量
    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    /// 图是否为空
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// 模块的直接依赖
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        self.edges
            .get(name)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 依赖该模块的模块
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.reverse_edges
            .get(name)
            .map(|rev| rev.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 查找依赖环
    ///
    /// # 返回
    ///
    /// 存在环时返回一条闭合的环路径（首尾节点相同），否则返回 `None`。
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for node in self.edges.keys() {
            if let Some(cycle) =
                self.find_cycle_from(node, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(cycle);
            }
        }
        None
    }

    fn find_cycle_from(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if rec_stack.contains(node) {
            let start = path.iter().position(|n| n == node)?;
            let mut cycle: Vec<String> = path[start..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if visited.contains(node) {
            return None;
        }

        visited.insert(node.to_string());
        rec_stack.insert(node.to_string());
        path.push(node.to_string());

        if let Some(neighbors) = self.edges.get(node) {
            for neighbor in neighbors {
                if let Some(cycle) = self.find_cycle_from(neighbor, visited, rec_stack, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
        None
    }

    /// 拓扑排序（Kahn 算法）
    ///
    /// 被依赖的模块排在前面，即返回顺序可直接用作启用顺序。
    /// 无依赖关系的节点之间按模块名字典序输出，结果确定。
    ///
    /// # 返回
    ///
    /// 排序成功返回完整顺序；发现环时返回 `Err`，携带一条环路径，
    /// 由调用方决定如何降级。
    pub fn topological_sort(&self) -> std::result::Result<Vec<String>, Vec<String>> {
        // 入度 = 该模块依赖的模块数，入度为零的先输出
        let mut in_degree: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(node, deps)| (node.as_str(), deps.len()))
            .collect();

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut result = Vec::with_capacity(self.edges.len());

        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());

            if let Some(dependents) = self.reverse_edges.get(node) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.as_str());
                        }
                    }
                }
            }
        }

        if result.len() != self.edges.len() {
            let cycle = self.find_cycle().unwrap_or_default();
            return Err(cycle);
        }

        Ok(result)
    }

    /// 停用顺序
    ///
    /// 拓扑顺序的反序，依赖方先于被依赖方。
    pub fn teardown_order(&self) -> std::result::Result<Vec<String>, Vec<String>> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }
}
