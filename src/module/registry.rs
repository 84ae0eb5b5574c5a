//! 模块注册表
//!
//! 保存所有已注册模块的描述与状态，是模块状态的唯一来源。
//! 描述一旦注册便不会被移除，卸载只会把模块恢复为 `Registered`。
//!
//! 状态变更方法（`begin_load`、`activate`、`fail`、`deactivate`）仅供加载器使用。

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::event::{events, EventBus, EventPayload};
use crate::module::dependency::DependencyGraph;
use crate::module::instance::ModuleRef;
use crate::module::metadata::{ModuleDescriptor, ModuleMetadata, ModuleStatus, ModuleSummary};
use crate::module::resolver::ModuleSource;
use crate::utils::{LoadError, LoadResult};

#[derive(Default)]
struct RegistryInner {
    modules: HashMap<String, ModuleDescriptor>,
    /// 注册顺序
    order: Vec<String>,
}

/// 模块注册表
pub struct ModuleRegistry {
    inner: RwLock<RegistryInner>,
    event_bus: EventBus,
}

impl ModuleRegistry {
    /// 创建注册表，注册成功时向 `event_bus` 发布 `module:registered`
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            event_bus,
        }
    }

    /// 注册模块
    ///
    /// 只记录描述，不处理 `auto_start`：自动加载由
    /// [`ModuleFramework::register_module`](crate::ModuleFramework::register_module) 安排。
    ///
    /// # Returns
    ///
    /// 注册成功返回 `true`；ID 或名称为空、ID 重复、依赖自身时返回 `false`，
    /// 已有记录不受影响。
    pub fn register(&self, metadata: ModuleMetadata, source: Option<ModuleSource>) -> bool {
        match self.try_register(metadata, source) {
            Ok(()) => true,
            Err(e) => {
                warn!(module_id = e.module_id().unwrap_or_default(), error = %e, "模块注册被拒绝");
                false
            }
        }
    }

    /// 注册模块，返回拒绝原因
    ///
    /// # Errors
    ///
    /// - `LoadError::InvalidDescriptor` - 元数据检查失败
    /// - `LoadError::AlreadyRegistered` - ID 已存在
    pub fn try_register(&self, metadata: ModuleMetadata, source: Option<ModuleSource>) -> LoadResult<()> {
        metadata.validate()?;
        let module_id = metadata.id.clone();

        let payload = {
            let mut inner = self.inner.write();
            if inner.modules.contains_key(&metadata.id) {
                return Err(LoadError::AlreadyRegistered(metadata.id));
            }

            let payload = EventPayload::Registered {
                id: metadata.id.clone(),
                name: metadata.name.clone(),
                version: metadata.version.clone(),
            };
            inner.order.push(metadata.id.clone());
            inner
                .modules
                .insert(metadata.id.clone(), ModuleDescriptor::new(metadata, source));
            payload
        };

        info!(module_id = %module_id, "模块注册成功");
        self.event_bus.publish(events::MODULE_REGISTERED, payload);
        Ok(())
    }

    /// 获取模块描述快照
    pub fn get(&self, module_id: &str) -> Option<ModuleDescriptor> {
        self.inner.read().modules.get(module_id).cloned()
    }

    /// 获取模块状态
    pub fn status(&self, module_id: &str) -> Option<ModuleStatus> {
        self.inner.read().modules.get(module_id).map(|d| d.status)
    }

    /// 获取活动模块的实例，非活动模块返回 `None`
    pub fn instance(&self, module_id: &str) -> Option<ModuleRef> {
        self.inner
            .read()
            .modules
            .get(module_id)
            .filter(|d| d.is_active())
            .and_then(|d| d.instance.clone())
    }

    /// 是否已注册
    pub fn contains(&self, module_id: &str) -> bool {
        self.inner.read().modules.contains_key(module_id)
    }

    /// 已注册模块数量
    pub fn count(&self) -> usize {
        self.inner.read().order.len()
    }

    /// 按注册顺序列出模块摘要
    pub fn list(&self, active_only: bool) -> Vec<ModuleSummary> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.modules.get(id))
            .filter(|d| !active_only || d.is_active())
            .map(ModuleDescriptor::summary)
            .collect()
    }

    /// 按注册顺序列出模块 ID
    pub fn ids(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// 由已注册模块构建依赖图
    pub fn dependency_graph(&self) -> DependencyGraph {
        let inner = self.inner.read();
        DependencyGraph::from_modules(
            inner
                .order
                .iter()
                .filter_map(|id| inner.modules.get(id))
                .map(|d| (d.metadata.id.as_str(), d.metadata.dependencies.as_slice())),
        )
    }

    /// 声明依赖 `module_id` 且处于 `Active` 或 `Loading` 的模块
    pub fn active_dependents(&self, module_id: &str) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.modules.get(id))
            .filter(|d| matches!(d.status, ModuleStatus::Active | ModuleStatus::Loading))
            .filter(|d| d.metadata.dependencies.iter().any(|dep| dep == module_id))
            .map(|d| d.metadata.id.clone())
            .collect()
    }

    /// 模块的加载顺序，依赖在前
    ///
    /// # Errors
    ///
    /// - `LoadError::NotFound` - 模块或其某个依赖未注册
    /// - `LoadError::DependencyCycle` - 可达依赖成环
    pub fn load_order(&self, module_id: &str) -> LoadResult<Vec<String>> {
        if !self.contains(module_id) {
            return Err(LoadError::NotFound(module_id.to_string()));
        }
        let order = self.dependency_graph().load_order(module_id)?;
        match order.iter().find(|id| !self.contains(id)) {
            Some(missing) => Err(LoadError::NotFound(missing.clone())),
            None => Ok(order),
        }
    }

    // ==================== 状态变更（加载器使用） ====================

    /// 进入 `Loading` 并清除上次错误，返回描述快照
    pub(crate) fn begin_load(&self, module_id: &str) -> LoadResult<ModuleDescriptor> {
        let mut inner = self.inner.write();
        let descriptor = inner
            .modules
            .get_mut(module_id)
            .ok_or_else(|| LoadError::NotFound(module_id.to_string()))?;

        descriptor.status = ModuleStatus::Loading;
        descriptor.last_error = None;
        descriptor.instance = None;
        descriptor.load_duration_ms = None;
        descriptor.init_duration_ms = None;
        debug!(module_id = %module_id, "模块进入 loading 状态");
        Ok(descriptor.clone())
    }

    /// 保存实例并进入 `Active`
    pub(crate) fn activate(&self, module_id: &str, instance: ModuleRef, load_duration_ms: f64) {
        if let Some(descriptor) = self.inner.write().modules.get_mut(module_id) {
            descriptor.status = ModuleStatus::Active;
            descriptor.instance = Some(instance);
            descriptor.load_duration_ms = Some(load_duration_ms);
        }
    }

    /// 记录初始化耗时
    pub(crate) fn record_init_duration(&self, module_id: &str, init_duration_ms: f64) {
        if let Some(descriptor) = self.inner.write().modules.get_mut(module_id) {
            descriptor.init_duration_ms = Some(init_duration_ms);
        }
    }

    /// 进入 `Error`，清除实例并保存错误；返回模块名称
    pub(crate) fn fail(&self, module_id: &str, error: &LoadError) -> Option<String> {
        let mut inner = self.inner.write();
        let descriptor = inner.modules.get_mut(module_id)?;
        descriptor.status = ModuleStatus::Error;
        descriptor.instance = None;
        descriptor.last_error = Some(error.clone());
        Some(descriptor.metadata.name.clone())
    }

    /// 活动模块恢复为 `Registered`，返回取出的实例与模块名称
    pub(crate) fn deactivate(&self, module_id: &str) -> Option<(ModuleRef, String)> {
        let mut inner = self.inner.write();
        let descriptor = inner.modules.get_mut(module_id).filter(|d| d.is_active())?;
        descriptor.status = ModuleStatus::Registered;
        descriptor.load_duration_ms = None;
        descriptor.init_duration_ms = None;
        let instance = descriptor.instance.take()?;
        Some((instance, descriptor.metadata.name.clone()))
    }
}
