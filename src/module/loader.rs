//! 模块加载器
//!
//! 负责模块的加载、卸载和方法调用，是唯一驱动模块状态变化的组件。
//!
//! # 加载流程
//!
//! 1. 同一模块的并发加载共享同一个进行中的任务
//! 2. 检查从该模块可达的依赖是否成环
//! 3. 并发加载全部依赖，任一失败则整体失败
//! 4. 由解析器产生实例，进入 `Active`
//! 5. 调用初始化钩子，失败时进入 `Error`
//! 6. 移除进行中记录后发布 `module:loaded` 或 `module:error`
//!
//! 加载任务通过 `tokio::spawn` 运行，调用方放弃等待不会中断加载。

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::future::{self, try_join_all, BoxFuture, Shared};
use futures::{FutureExt, TryFutureExt};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::event::{events, EventBus, EventPayload};
use crate::module::instance::ModuleRef;
use crate::module::lifecycle;
use crate::module::metadata::{ModuleDescriptor, ModuleStatus};
use crate::module::registry::ModuleRegistry;
use crate::module::resolver::ModuleResolver;
use crate::utils::{LoadError, LoadResult};

/// 进行中的加载任务，可被多个调用方同时等待
type SharedLoad = Shared<BoxFuture<'static, LoadResult<ModuleRef>>>;

enum Acquired {
    Ready(ModuleRef),
    Pending(SharedLoad),
}

/// 模块加载器
#[derive(Clone)]
pub struct ModuleLoader {
    registry: Arc<ModuleRegistry>,
    event_bus: EventBus,
    resolver: Arc<dyn ModuleResolver>,
    /// 模块 ID -> 进行中的加载
    inflight: Arc<Mutex<HashMap<String, SharedLoad>>>,
}

impl ModuleLoader {
    /// 创建加载器
    pub fn new(registry: Arc<ModuleRegistry>, event_bus: EventBus, resolver: Arc<dyn ModuleResolver>) -> Self {
        Self {
            registry,
            event_bus,
            resolver,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 模块注册表
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// 加载模块及其依赖
    ///
    /// 已激活的模块直接返回现有实例；正在加载的模块返回同一个进行中的任务。
    /// 必须在 tokio 运行时内调用。
    ///
    /// # Errors
    ///
    /// - `LoadError::NotFound` - 模块未注册
    /// - `LoadError::DependencyCycle` - 可达依赖成环
    /// - `LoadError::DependencyFailure` - 某个依赖加载失败
    /// - `LoadError::NoLoader` / `LoadError::ResolverFailure` - 无法产生实例
    /// - `LoadError::InitFailure` - 初始化钩子失败
    pub fn load(&self, module_id: &str) -> BoxFuture<'static, LoadResult<ModuleRef>> {
        match self.acquire(module_id) {
            Ok(Acquired::Ready(instance)) => future::ready(Ok(instance)).boxed(),
            Ok(Acquired::Pending(pending)) => pending.boxed(),
            Err(e) => future::ready(Err(e)).boxed(),
        }
    }

    /// 是否有进行中的加载
    pub fn is_loading(&self, module_id: &str) -> bool {
        self.inflight.lock().contains_key(module_id)
    }

    /// 活动模块的实例
    pub fn get(&self, module_id: &str) -> Option<ModuleRef> {
        self.registry.instance(module_id)
    }

    fn acquire(&self, module_id: &str) -> LoadResult<Acquired> {
        let mut inflight = self.inflight.lock();
        if let Some(pending) = inflight.get(module_id) {
            debug!(module_id = %module_id, "等待进行中的加载");
            return Ok(Acquired::Pending(pending.clone()));
        }

        match self.registry.status(module_id) {
            None => return Err(LoadError::NotFound(module_id.to_string())),
            Some(ModuleStatus::Active) => {
                if let Some(instance) = self.registry.instance(module_id) {
                    return Ok(Acquired::Ready(instance));
                }
            }
            Some(_) => {}
        }

        let descriptor = self.registry.begin_load(module_id)?;
        info!(module_id = %module_id, "开始加载模块");

        let loader = self.clone();
        let task = tokio::spawn(loader.drive(descriptor.clone()));
        let cleanup = self.clone();
        let pending = async move {
            match task.await {
                Ok(outcome) => outcome,
                // 任务未运行到 finish（例如所在运行时已关闭），在此补做收尾
                Err(e) => {
                    let aborted = LoadError::Aborted {
                        module_id: descriptor.id().to_string(),
                        reason: e.to_string(),
                    };
                    cleanup.finish(&descriptor, Err(aborted))
                }
            }
        }
        .boxed()
        .shared();

        inflight.insert(module_id.to_string(), pending.clone());
        Ok(Acquired::Pending(pending))
    }

    async fn drive(self, descriptor: ModuleDescriptor) -> LoadResult<ModuleRef> {
        let outcome = AssertUnwindSafe(self.run_load(&descriptor))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(LoadError::Aborted {
                    module_id: descriptor.id().to_string(),
                    reason: panic_message(panic.as_ref()),
                })
            });
        self.finish(&descriptor, outcome)
    }

    async fn run_load(&self, descriptor: &ModuleDescriptor) -> LoadResult<ModuleRef> {
        let started = Instant::now();
        let module_id = descriptor.id();

        if let Some(cycle) = self.registry.dependency_graph().find_cycle_from(module_id) {
            return Err(LoadError::DependencyCycle { cycle });
        }

        let dependencies = &descriptor.metadata.dependencies;
        if !dependencies.is_empty() {
            debug!(module_id = %module_id, dependencies = ?dependencies, "加载依赖");
            try_join_all(dependencies.iter().map(|dependency| {
                let module_id = module_id.to_string();
                let dependency = dependency.clone();
                self.load(&dependency).map_err(move |source| LoadError::DependencyFailure {
                    module_id,
                    dependency,
                    source: Box::new(source),
                })
            }))
            .await?;
        }

        let instance = self.resolver.resolve(descriptor).await?;
        self.registry
            .activate(module_id, instance.clone(), lifecycle::elapsed_ms(started));

        if let Some(init_ms) = lifecycle::initialize(module_id, &instance).await? {
            self.registry.record_init_duration(module_id, init_ms);
        }

        Ok(instance)
    }

    fn finish(&self, descriptor: &ModuleDescriptor, outcome: LoadResult<ModuleRef>) -> LoadResult<ModuleRef> {
        let module_id = descriptor.id();
        {
            let mut inflight = self.inflight.lock();
            inflight.remove(module_id);
            if let Err(e) = &outcome {
                self.registry.fail(module_id, e);
            }
        }

        let id = module_id.to_string();
        let name = descriptor.name().to_string();
        match outcome {
            Ok(instance) => {
                let duration_ms = self.registry.get(module_id).and_then(|d| d.load_duration_ms);
                info!(module_id = %module_id, duration_ms = ?duration_ms, "模块加载成功");
                self.event_bus.publish(
                    events::MODULE_LOADED,
                    EventPayload::Loaded {
                        id,
                        name,
                        instance: instance.clone(),
                    },
                );
                Ok(instance)
            }
            Err(e) => {
                error!(module_id = %module_id, error = %e, code = e.error_code(), "模块加载失败");
                self.event_bus.publish(
                    events::MODULE_ERROR,
                    EventPayload::Error {
                        id,
                        name,
                        error: e.clone(),
                    },
                );
                Err(e)
            }
        }
    }

    /// 卸载模块
    ///
    /// # Returns
    ///
    /// 卸载成功返回 `true`，被拒绝时返回 `false` 并记录原因
    pub fn unload(&self, module_id: &str) -> bool {
        match self.try_unload(module_id) {
            Ok(()) => true,
            Err(e) => {
                warn!(module_id = %module_id, error = %e, "模块卸载被拒绝");
                false
            }
        }
    }

    /// 卸载模块，返回拒绝原因
    ///
    /// 销毁钩子的失败只记录日志，模块仍会被卸载。
    ///
    /// # Errors
    ///
    /// - `LoadError::NotFound` - 模块未注册
    /// - `LoadError::NotActive` - 模块未激活或正在加载
    /// - `LoadError::UnloadBlocked` - 仍有活动模块依赖它
    #[instrument(skip(self), fields(module_id = %module_id))]
    pub fn try_unload(&self, module_id: &str) -> LoadResult<()> {
        let (instance, name) = {
            let inflight = self.inflight.lock();
            let status = self
                .registry
                .status(module_id)
                .ok_or_else(|| LoadError::NotFound(module_id.to_string()))?;
            if inflight.contains_key(module_id) || !status.can_unload() {
                return Err(LoadError::NotActive(module_id.to_string()));
            }

            let dependents = self.registry.active_dependents(module_id);
            if !dependents.is_empty() {
                return Err(LoadError::UnloadBlocked {
                    module_id: module_id.to_string(),
                    dependents,
                });
            }

            self.registry
                .deactivate(module_id)
                .ok_or_else(|| LoadError::NotActive(module_id.to_string()))?
        };

        lifecycle::destroy(module_id, &instance);
        info!("模块已卸载");
        self.event_bus.publish(
            events::MODULE_UNLOADED,
            EventPayload::Unloaded {
                id: module_id.to_string(),
                name,
            },
        );
        Ok(())
    }

    /// 调用模块方法，模块未激活时先加载
    ///
    /// 方法返回异步结果时等待其完成。
    ///
    /// # Errors
    ///
    /// - 加载失败时返回对应的加载错误
    /// - `LoadError::MethodNotFound` - 实例没有该方法
    /// - `LoadError::InvocationFailed` - 方法执行失败
    #[instrument(skip(self, args), fields(module_id = %module_id, method = %method))]
    pub async fn invoke(&self, module_id: &str, method: &str, args: Vec<Value>) -> LoadResult<Value> {
        let instance = self.load(module_id).await?;

        let invocation_failed = |e: anyhow::Error| LoadError::InvocationFailed {
            module_id: module_id.to_string(),
            method: method.to_string(),
            reason: format!("{:#}", e),
        };

        let output = instance
            .call(method, args)
            .ok_or_else(|| LoadError::MethodNotFound {
                module_id: module_id.to_string(),
                method: method.to_string(),
            })?
            .map_err(invocation_failed)?;

        let value = output.resolve().await.map_err(invocation_failed)?;
        debug!("方法调用完成");
        Ok(value)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "加载任务 panic".to_string()
    }
}
