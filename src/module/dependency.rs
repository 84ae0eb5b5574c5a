//! 模块依赖图
//!
//! 根据已注册模块声明的依赖构建有向图，用于：
//!
//! - 加载前的循环依赖检测（只检查从目标模块可达的部分）
//! - 计算单个模块或全部模块的加载顺序
//! - 查询依赖某个模块的其他模块
//!
//! 节点按首次出现的顺序保存，所有遍历结果都是确定的。
//!
//! # 示例
//!
//! ```rust
//! use module_framework::module::dependency::DependencyGraph;
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_dependency("app", "service");
//! graph.add_dependency("service", "database");
//!
//! assert_eq!(graph.load_order("app").unwrap(), vec!["database", "service", "app"]);
//! assert!(graph.find_cycle_from("app").is_none());
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use crate::utils::{LoadError, LoadResult};

/// 模块依赖关系图
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 节点插入顺序
    nodes: Vec<String>,
    /// 正向边：模块 ID -> 按声明顺序排列的依赖
    edges: HashMap<String, Vec<String>>,
    /// 反向边：模块 ID -> 依赖该模块的模块
    reverse_edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// 创建一个空的依赖图
    pub fn new() -> Self {
        Self::default()
    }

    /// 由 (模块 ID, 依赖列表) 序列构建
    pub fn from_modules<'a, I>(modules: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let mut graph = Self::new();
        for (id, dependencies) in modules {
            graph.add_module(id);
            for dependency in dependencies {
                graph.add_dependency(id, dependency);
            }
        }
        graph
    }

    /// 添加模块节点，已存在时忽略
    pub fn add_module(&mut self, module_id: &str) {
        if !self.edges.contains_key(module_id) {
            self.nodes.push(module_id.to_string());
            self.edges.insert(module_id.to_string(), Vec::new());
            self.reverse_edges.insert(module_id.to_string(), Vec::new());
        }
    }

    /// 添加依赖关系：`module_id` 依赖 `dependency_id`
    pub fn add_dependency(&mut self, module_id: &str, dependency_id: &str) {
        self.add_module(module_id);
        self.add_module(dependency_id);

        if let Some(deps) = self.edges.get_mut(module_id) {
            if !deps.iter().any(|d| d == dependency_id) {
                deps.push(dependency_id.to_string());
            }
        }
        if let Some(rev_deps) = self.reverse_edges.get_mut(dependency_id) {
            if !rev_deps.iter().any(|d| d == module_id) {
                rev_deps.push(module_id.to_string());
            }
        }
    }

    /// 模块的直接依赖
    pub fn get_dependencies(&self, module_id: &str) -> Vec<String> {
        self.edges.get(module_id).cloned().unwrap_or_default()
    }

    /// 直接依赖该模块的模块
    pub fn get_dependents(&self, module_id: &str) -> Vec<String> {
        self.reverse_edges.get(module_id).cloned().unwrap_or_default()
    }

    /// 模块的所有传递依赖，依赖在前
    pub fn get_all_dependencies(&self, module_id: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.collect_dependencies(module_id, &mut result, &mut visited);
        result
    }

    fn collect_dependencies(&self, module_id: &str, result: &mut Vec<String>, visited: &mut HashSet<String>) {
        if !visited.insert(module_id.to_string()) {
            return;
        }
        for dep in self.edges.get(module_id).into_iter().flatten() {
            self.collect_dependencies(dep, result, visited);
            if !result.contains(dep) {
                result.push(dep.clone());
            }
        }
    }

    /// 查找从 `start` 出发可达的循环
    ///
    /// # Returns
    ///
    /// 存在循环时返回闭合路径（首尾相同），例如 `["a", "b", "a"]`
    pub fn find_cycle_from(&self, start: &str) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.find_cycle_util(start, &mut visited, &mut path)
    }

    /// 查找图中任意一个循环
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.nodes
            .iter()
            .find_map(|node| self.find_cycle_util(node, &mut visited, &mut path))
    }

    /// 是否存在循环依赖
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    fn find_cycle_util(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if let Some(start) = path.iter().position(|n| n == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if !visited.insert(node.to_string()) {
            return None;
        }

        path.push(node.to_string());
        for neighbor in self.edges.get(node).into_iter().flatten() {
            if let Some(cycle) = self.find_cycle_util(neighbor, visited, path) {
                return Some(cycle);
            }
        }
        path.pop();
        None
    }

    /// 单个模块的加载顺序：传递依赖按声明顺序在前，模块自身在最后
    ///
    /// # Errors
    ///
    /// 可达部分存在循环时返回 `LoadError::DependencyCycle`
    pub fn load_order(&self, module_id: &str) -> LoadResult<Vec<String>> {
        if let Some(cycle) = self.find_cycle_from(module_id) {
            return Err(LoadError::DependencyCycle { cycle });
        }
        let mut order = self.get_all_dependencies(module_id);
        order.push(module_id.to_string());
        Ok(order)
    }

    /// 全部模块的拓扑排序（Kahn 算法），依赖在前
    ///
    /// # Errors
    ///
    /// 存在循环时返回 `LoadError::DependencyCycle`
    pub fn topological_sort(&self) -> LoadResult<Vec<String>> {
        if let Some(cycle) = self.find_cycle() {
            return Err(LoadError::DependencyCycle { cycle });
        }

        // 入度 = 尚未输出的依赖数量
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|n| (n.as_str(), self.edges.get(n).map_or(0, Vec::len)))
            .collect();

        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .map(String::as_str)
            .filter(|n| in_degree.get(n) == Some(&0))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());
            for dependent in self.reverse_edges.get(node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        Ok(result)
    }

    /// 卸载顺序（拓扑排序的逆序）
    pub fn unload_order(&self) -> LoadResult<Vec<String>> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }

    /// 模块数量
    pub fn module_count(&self) -> usize {
        self.nodes.len()
    }

    /// 是否包含模块
    pub fn contains_module(&self, module_id: &str) -> bool {
        self.edges.contains_key(module_id)
    }

    /// 所有模块，按首次出现顺序
    pub fn modules(&self) -> &[String] {
        &self.nodes
    }
}
