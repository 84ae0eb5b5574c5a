//! ModuleFramework SDK
//!
//! 模块框架的主要对外接口，把注册表、加载器、解析器和事件总线组合在一起：
//!
//! - 模块注册：直接注册、配置文件声明、清单文件、宿主预加载
//! - 模块加载：按依赖顺序加载、卸载、调用方法
//! - 事件系统：订阅框架事件、发布自定义事件
//!
//! # 示例
//!
//! ```rust,no_run
//! use module_framework::{FrameworkConfig, ModuleFramework, ModuleMetadata, ModuleSource, ObjectInstance};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let framework = ModuleFramework::new(FrameworkConfig::default())?;
//!     framework.initialize().await?;
//!
//!     framework.register_module(
//!         ModuleMetadata::new("greeter", "Greeter"),
//!         Some(ModuleSource::instance(
//!             ObjectInstance::builder()
//!                 .method("hello", |_| Ok(json!("hello")))
//!                 .build(),
//!         )),
//!     );
//!
//!     let reply = framework.call_module_method("greeter", "hello", vec![]).await?;
//!     assert_eq!(reply, json!("hello"));
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::core::config::FrameworkConfig;
use crate::event::{events, Event, EventBus, EventPayload, SubscriptionHandle};
use crate::module::instance::ModuleRef;
use crate::module::loader::ModuleLoader;
use crate::module::metadata::{ModuleDescriptor, ModuleMetadata, ModuleSummary};
use crate::module::parser::ModuleParser;
use crate::module::registry::ModuleRegistry;
use crate::module::resolver::{DefaultFetcher, DefaultResolver, HostScope, ModuleResolver, ModuleSource};
use crate::utils::{LoadError, LoadResult, Result};

static GLOBAL: OnceLock<ModuleFramework> = OnceLock::new();

/// 模块框架
///
/// # 组件
///
/// - `registry`: 模块注册表，保存描述与状态
/// - `loader`: 加载器，驱动加载、卸载与方法调用
/// - `event_bus`: 事件总线
/// - `host`: 宿主作用域，保存宿主预先创建的实例
pub struct ModuleFramework {
    /// 框架配置
    config: FrameworkConfig,

    /// 事件总线
    event_bus: EventBus,

    /// 模块注册表
    registry: Arc<ModuleRegistry>,

    /// 模块加载器
    loader: ModuleLoader,

    /// 宿主作用域
    host: HostScope,

    /// 是否已执行 initialize
    initialized: AtomicBool,
}

impl ModuleFramework {
    /// 使用默认解析器创建框架
    ///
    /// # Errors
    ///
    /// 配置无效或 HTTP 客户端无法创建时返回错误
    pub fn new(config: FrameworkConfig) -> Result<Self> {
        config.validate()?;
        let host = HostScope::new();
        let fetcher = Arc::new(DefaultFetcher::new(&config.fetch)?);
        let resolver = Arc::new(DefaultResolver::new(host.clone(), fetcher));
        Ok(Self::with_resolver(config, host, resolver))
    }

    /// 使用自定义解析器创建框架
    pub fn with_resolver(config: FrameworkConfig, host: HostScope, resolver: Arc<dyn ModuleResolver>) -> Self {
        info!("创建模块框架 v{}", crate::VERSION);
        let event_bus = EventBus::new();
        let registry = Arc::new(ModuleRegistry::new(event_bus.clone()));
        let loader = ModuleLoader::new(registry.clone(), event_bus.clone(), resolver);

        Self {
            config,
            event_bus,
            registry,
            loader,
            host,
            initialized: AtomicBool::new(false),
        }
    }

    /// 进程级共享实例，首次调用时以默认配置创建
    pub fn global() -> Result<&'static ModuleFramework> {
        if let Some(framework) = GLOBAL.get() {
            return Ok(framework);
        }
        let framework = Self::new(FrameworkConfig::default())?;
        Ok(GLOBAL.get_or_init(|| framework))
    }

    /// 初始化框架
    ///
    /// 依次注册宿主预加载模块、配置中声明的模块和清单文件中的模块，
    /// 然后加载 `auto_load` 列出的模块，最后发布 `framework:initialized`。
    /// 重复调用不做任何事。
    ///
    /// # Errors
    ///
    /// 清单文件无法读取或解析时返回错误，此时不注册任何模块，框架保持未初始化，
    /// 可以再次调用；自动加载失败只记录日志。
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("框架已初始化，忽略重复调用");
            return Ok(());
        }

        // 先读取全部清单，失败时不注册任何模块
        let mut manifest_modules = Vec::new();
        for path in &self.config.modules.manifests {
            match ModuleParser::parse_file(path).await {
                Ok(modules) => {
                    info!(path = %path.display(), count = modules.len(), "读取模块清单");
                    manifest_modules.extend(modules);
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "读取模块清单失败");
                    self.initialized.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            }
        }

        for metadata in self.host.preloaded() {
            debug!(module_id = %metadata.id, "注册宿主预加载模块");
            self.register_module(metadata, None);
        }

        for metadata in self.config.modules.modules.iter().cloned() {
            self.register_module(metadata, None);
        }

        for metadata in manifest_modules {
            self.register_module(metadata, None);
        }

        for module_id in &self.config.modules.auto_load {
            if let Err(e) = self.load_module(module_id).await {
                error!(module_id = %module_id, error = %e, "自动加载模块失败");
            }
        }

        self.event_bus.publish(
            events::FRAMEWORK_INITIALIZED,
            EventPayload::FrameworkInitialized { timestamp: Utc::now() },
        );
        info!(modules = self.registry.count(), "模块框架初始化完成");
        Ok(())
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // ==================== 模块管理 ====================

    /// 注册模块
    ///
    /// `auto_start` 为 `true` 时，在本方法返回后由后台任务加载该模块。
    ///
    /// # Returns
    ///
    /// 注册成功返回 `true`
    pub fn register_module(&self, metadata: ModuleMetadata, source: Option<ModuleSource>) -> bool {
        match self.try_register_module(metadata, source) {
            Ok(()) => true,
            Err(e) => {
                warn!(module_id = e.module_id().unwrap_or_default(), error = %e, "模块注册被拒绝");
                false
            }
        }
    }

    /// 注册模块，返回拒绝原因
    pub fn try_register_module(&self, metadata: ModuleMetadata, source: Option<ModuleSource>) -> LoadResult<()> {
        let module_id = metadata.id.clone();
        let auto_start = metadata.auto_start;
        self.registry.try_register(metadata, source)?;

        if auto_start {
            self.schedule_load(module_id);
        }
        Ok(())
    }

    fn schedule_load(&self, module_id: String) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(module_id = %module_id, "当前不在 tokio 运行时中，跳过自动加载");
            return;
        };

        let loader = self.loader.clone();
        debug!(module_id = %module_id, "安排自动加载");
        handle.spawn(async move {
            if let Err(e) = loader.load(&module_id).await {
                debug!(module_id = %module_id, error = %e, "自动加载失败");
            }
        });
    }

    /// 加载模块及其依赖
    pub async fn load_module(&self, module_id: &str) -> LoadResult<ModuleRef> {
        self.loader.load(module_id).await
    }

    /// 卸载模块，被拒绝时返回 `false`
    pub fn unload_module(&self, module_id: &str) -> bool {
        self.loader.unload(module_id)
    }

    /// 卸载模块，返回拒绝原因
    pub fn try_unload_module(&self, module_id: &str) -> LoadResult<()> {
        self.loader.try_unload(module_id)
    }

    /// 按依赖逆序卸载所有活动模块，返回卸载数量
    pub fn unload_all(&self) -> usize {
        let order = self.registry.dependency_graph().unload_order().unwrap_or_else(|_| {
            let mut ids = self.registry.ids();
            ids.reverse();
            ids
        });

        order
            .iter()
            .filter(|id| self.registry.instance(id).is_some())
            .filter(|id| self.loader.unload(id))
            .count()
    }

    /// 活动模块的实例
    pub fn get_module(&self, module_id: &str) -> Option<ModuleRef> {
        self.registry.instance(module_id)
    }

    /// 模块描述快照
    pub fn get_descriptor(&self, module_id: &str) -> Option<ModuleDescriptor> {
        self.registry.get(module_id)
    }

    /// 按注册顺序列出模块
    pub fn get_modules(&self, active_only: bool) -> Vec<ModuleSummary> {
        self.registry.list(active_only)
    }

    /// 调用模块方法，模块未激活时先加载
    pub async fn call_module_method(&self, module_id: &str, method: &str, args: Vec<Value>) -> LoadResult<Value> {
        self.loader.invoke(module_id, method, args).await
    }

    /// 模块的加载顺序，依赖在前
    pub fn load_order(&self, module_id: &str) -> LoadResult<Vec<String>> {
        self.registry.load_order(module_id)
    }

    /// 模块当前的错误
    pub fn last_error(&self, module_id: &str) -> Option<LoadError> {
        self.registry.get(module_id).and_then(|d| d.last_error)
    }

    // ==================== 事件 ====================

    /// 订阅事件
    pub fn on<F>(&self, event_name: &str, callback: F) -> SubscriptionHandle
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.event_bus.subscribe(event_name, Arc::new(callback))
    }

    /// 取消订阅
    pub fn off(&self, event_name: &str, subscription_id: &str) -> bool {
        self.event_bus.unsubscribe(event_name, subscription_id)
    }

    /// 发布自定义事件，返回收到事件的订阅者数量
    pub fn emit(&self, event_name: &str, data: Value) -> usize {
        self.event_bus.publish(event_name, EventPayload::Custom(data))
    }

    // ==================== 访问器 ====================

    /// 框架配置
    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    /// 宿主作用域
    pub fn host(&self) -> &HostScope {
        &self.host
    }

    /// 模块注册表
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// 模块加载器
    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    /// 事件总线
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::instance::ObjectInstance;
    use crate::module::metadata::ModuleStatus;
    use crate::utils::CoreError;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    fn framework() -> ModuleFramework {
        ModuleFramework::new(FrameworkConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_registers_sources() {
        let config = FrameworkConfig::builder()
            .module(ModuleMetadata::new("theme", "Theme"))
            .auto_load("theme")
            .build();
        let framework = ModuleFramework::new(config).unwrap();
        framework.host().provide("theme", ObjectInstance::from_value(json!({"dark": true})).into_ref());
        framework
            .host()
            .preload(ModuleMetadata::new("clock", "Clock"), ObjectInstance::from_value(json!(0)).into_ref());

        let initialized = Arc::new(Mutex::new(0));
        let initialized_clone = initialized.clone();
        framework.on(events::FRAMEWORK_INITIALIZED, move |_| *initialized_clone.lock() += 1);

        framework.initialize().await.unwrap();
        framework.initialize().await.unwrap();

        assert!(framework.is_initialized());
        assert_eq!(*initialized.lock(), 1);
        let ids: Vec<String> = framework.get_modules(false).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["clock", "theme"]);
        assert_eq!(framework.get_module("theme").unwrap().state(), Some(json!({"dark": true})));
        assert!(framework.get_module("clock").is_none());
    }

    #[tokio::test]
    async fn test_initialize_retry_after_missing_manifest() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let manifest = temp_dir.path().join("modules.yaml");
        let config = FrameworkConfig::builder()
            .module(ModuleMetadata::new("theme", "Theme"))
            .manifest(&manifest)
            .auto_load("dock")
            .build();
        let framework = ModuleFramework::new(config).unwrap();
        framework.host().provide("dock", ObjectInstance::from_value(json!({})).into_ref());

        let initialized = Arc::new(Mutex::new(0));
        let initialized_clone = initialized.clone();
        framework.on(events::FRAMEWORK_INITIALIZED, move |_| *initialized_clone.lock() += 1);

        assert!(matches!(framework.initialize().await, Err(CoreError::Io(_))));
        assert!(!framework.is_initialized());
        assert_eq!(framework.registry().count(), 0);
        assert_eq!(*initialized.lock(), 0);

        tokio::fs::write(&manifest, "- id: dock\n  name: Dock\n").await.unwrap();
        framework.initialize().await.unwrap();

        assert!(framework.is_initialized());
        assert_eq!(*initialized.lock(), 1);
        let ids: Vec<String> = framework.get_modules(false).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["theme", "dock"]);
        assert_eq!(framework.registry().status("dock"), Some(ModuleStatus::Active));
    }

    #[tokio::test]
    async fn test_auto_start_runs_after_register_returns() {
        let framework = framework();
        assert!(framework.register_module(
            ModuleMetadata::new("auto", "Auto").with_auto_start(true),
            Some(ModuleSource::instance(ObjectInstance::from_value(json!({})))),
        ));
        assert_eq!(framework.registry().status("auto"), Some(ModuleStatus::Registered));

        for _ in 0..50 {
            if framework.get_module("auto").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(framework.registry().status("auto"), Some(ModuleStatus::Active));
    }

    #[test]
    fn test_auto_start_without_runtime() {
        let framework = framework();
        assert!(framework.register_module(ModuleMetadata::new("auto", "Auto").with_auto_start(true), None));
        assert_eq!(framework.registry().status("auto"), Some(ModuleStatus::Registered));
    }

    #[tokio::test]
    async fn test_emit_and_off() {
        let framework = framework();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let handle = framework.on("dock:resized", move |event| received_clone.lock().push(event.payload.to_json()));

        assert_eq!(framework.emit("dock:resized", json!({"width": 48})), 1);
        assert!(framework.off("dock:resized", handle.id()));
        assert_eq!(framework.emit("dock:resized", json!({"width": 64})), 0);
        assert_eq!(*received.lock(), vec![json!({"width": 48})]);
    }

    #[tokio::test]
    async fn test_unload_all_in_dependency_order() {
        let framework = framework();
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        for (id, deps) in [("base", vec![]), ("mid", vec!["base"]), ("top", vec!["mid"])] {
            let destroyed = destroyed.clone();
            let instance = ObjectInstance::builder()
                .on_destroy(move || {
                    destroyed.lock().push(id);
                    Ok(())
                })
                .build();
            framework.register_module(
                ModuleMetadata::new(id, id).with_dependencies(deps),
                Some(ModuleSource::instance(instance)),
            );
        }

        framework.load_module("top").await.unwrap();
        assert_eq!(framework.unload_all(), 3);
        assert_eq!(*destroyed.lock(), vec!["top", "mid", "base"]);
        assert!(framework.get_modules(true).is_empty());
    }

    #[tokio::test]
    async fn test_last_error_and_load_order() {
        let framework = framework();
        framework.register_module(ModuleMetadata::new("broken", "Broken"), None);
        framework.register_module(ModuleMetadata::new("app", "App").depends_on("broken"), None);

        assert_eq!(framework.load_order("app").unwrap(), vec!["broken", "app"]);
        assert!(framework.load_module("app").await.is_err());
        assert_eq!(
            framework.last_error("broken"),
            Some(LoadError::NoLoader("broken".to_string()))
        );
    }

    #[test]
    fn test_global_is_shared() {
        let first = ModuleFramework::global().unwrap() as *const ModuleFramework;
        let second = ModuleFramework::global().unwrap() as *const ModuleFramework;
        assert_eq!(first, second);
    }
}
