//! # Module Framework - 运行时模块框架
//!
//! 在运行时管理一组可插拔模块，提供以下核心功能：
//!
//! - **模块注册表**: 模块描述、状态与注册顺序
//! - **加载引擎**: 按依赖顺序异步加载，合并同一模块的并发加载
//! - **模块解析器**: 工厂函数、预先构造的实例、宿主实例或远程资源
//! - **事件总线**: 观察注册、加载、卸载与失败
//! - **配置与清单**: YAML/JSON 配置文件和模块清单
//! - **日志系统**: 结构化日志记录
//!
//! ## 快速开始
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
//!         ModuleMetadata::new("x", "X"),
//!         Some(ModuleSource::instance(ObjectInstance::from_value(json!({"value": 1})))),
//!     );
//!     let instance = framework.load_module("x").await?;
//!     assert_eq!(instance.state(), Some(json!({"value": 1})));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 元数据、注册表、依赖图、解析器与加载器
//! - `event` - 事件总线
//! - `utils` - 错误类型、ID 生成与日志
//! - `core` - 框架配置
//! - `api` - 公共 API 接口

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod core;
pub mod event;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use event::{events, Event, EventBus, EventCallback, EventPayload, SubscriptionHandle};

pub use module::{
    DefaultFetcher, DefaultResolver, DependencyGraph, FetchedResource, HostScope, MethodOutput,
    ModuleDescriptor, ModuleInstance, ModuleLoader, ModuleMetadata, ModuleParser, ModuleRef,
    ModuleRegistry, ModuleResolver, ModuleSource, ModuleStatus, ModuleSummary, ObjectInstance,
    ResourceFetcher, ResourceInstance,
};

pub use utils::{error_code, generate_id, CoreError, LoadError, LoadResult, Result};
pub use utils::logger::{fields, LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};

pub use core::config::{FetchConfig, FrameworkConfig, FrameworkConfigBuilder, LogConfig, ModulesConfig};
pub use api::sdk::ModuleFramework;

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
