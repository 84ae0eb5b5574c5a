//! 模块管理模块
//!
//! 包含模块管理系统的核心组件：
//! - 模块元数据与状态
//! - 实例能力接口
//! - 注册表、依赖图与解析器
//! - 加载器与生命周期钩子
//! - 清单解析

pub mod dependency;
pub mod instance;
pub mod lifecycle;
pub mod loader;
pub mod metadata;
pub mod parser;
pub mod registry;
pub mod resolver;

// 重导出常用类型
pub use dependency::DependencyGraph;
pub use instance::{
    FetchedResource, MethodFuture, MethodOutput, ModuleInstance, ModuleRef, ObjectInstance,
    ObjectInstanceBuilder, ResourceInstance,
};
pub use loader::ModuleLoader;
pub use metadata::{ModuleDescriptor, ModuleMetadata, ModuleStatus, ModuleSummary};
pub use parser::{ManifestFormat, ModuleParser};
pub use registry::ModuleRegistry;
pub use resolver::{
    DefaultFetcher, DefaultResolver, HostScope, ModuleFactory, ModuleResolver, ModuleSource,
    ResourceFetcher,
};
