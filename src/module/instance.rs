//! 模块实例
//!
//! 加载完成后，每个模块由一个实现了 [`ModuleInstance`] 的对象表示。
//! 框架只通过该 trait 与实例交互：
//!
//! - `initialize` - 可选的异步初始化钩子，加载时调用一次
//! - `destroy` - 可选的销毁钩子，卸载时调用
//! - `call` - 按名称调用方法，方法不存在时返回 `None`
//!
//! # 示例
//!
//! ```rust
//! use module_framework::module::instance::ObjectInstance;
//! use serde_json::json;
//!
//! let instance = ObjectInstance::builder()
//!     .data(json!({"theme": "dark"}))
//!     .method("echo", |args| Ok(args.into_iter().next().unwrap_or_default()))
//!     .build();
//!
//! assert_eq!(instance.data()["theme"], "dark");
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};

/// 共享的模块实例引用
pub type ModuleRef = Arc<dyn ModuleInstance>;

/// 异步方法返回的 future
pub type MethodFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// 方法调用结果：立即值或需要等待的 future
pub enum MethodOutput {
    /// 同步返回的值
    Ready(Value),
    /// 需要等待的结果
    Pending(MethodFuture),
}

impl MethodOutput {
    /// 等待并取得最终值
    pub async fn resolve(self) -> anyhow::Result<Value> {
        match self {
            MethodOutput::Ready(value) => Ok(value),
            MethodOutput::Pending(future) => future.await,
        }
    }
}

impl fmt::Debug for MethodOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodOutput::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            MethodOutput::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// 模块实例能力
pub trait ModuleInstance: Send + Sync + 'static {
    /// 初始化钩子，没有时返回 `None`
    fn initialize(&self) -> Option<BoxFuture<'_, anyhow::Result<()>>> {
        None
    }

    /// 销毁钩子，没有时返回 `None`
    fn destroy(&self) -> Option<anyhow::Result<()>> {
        None
    }

    /// 按名称调用方法，方法不存在时返回 `None`
    fn call(&self, method: &str, args: Vec<Value>) -> Option<anyhow::Result<MethodOutput>> {
        let _ = (method, args);
        None
    }

    /// 可调用的方法名
    fn methods(&self) -> Vec<String> {
        Vec::new()
    }

    /// 对外暴露的数据快照
    fn state(&self) -> Option<Value> {
        None
    }

    /// 用于向下转型
    fn as_any(&self) -> &dyn Any;
}

impl dyn ModuleInstance {
    /// 转换为具体的实例类型
    pub fn downcast_ref<T: ModuleInstance>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for dyn ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModuleInstance(..)")
    }
}

type SyncMethod = Arc<dyn Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync>;
type AsyncMethod = Arc<dyn Fn(Vec<Value>) -> MethodFuture + Send + Sync>;
type InitHook = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type DestroyHook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
enum Method {
    Sync(SyncMethod),
    Async(AsyncMethod),
}

/// 由数据与闭包组成的通用模块实例
#[derive(Clone, Default)]
pub struct ObjectInstance {
    data: Value,
    methods: HashMap<String, Method>,
    on_initialize: Option<InitHook>,
    on_destroy: Option<DestroyHook>,
}

impl ObjectInstance {
    /// 创建构建器
    pub fn builder() -> ObjectInstanceBuilder {
        ObjectInstanceBuilder::default()
    }

    /// 只包含数据的实例
    pub fn from_value(data: Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    /// 实例数据
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// 转换为共享引用
    pub fn into_ref(self) -> ModuleRef {
        Arc::new(self)
    }
}

impl ModuleInstance for ObjectInstance {
    fn initialize(&self) -> Option<BoxFuture<'_, anyhow::Result<()>>> {
        self.on_initialize.as_ref().map(|hook| hook())
    }

    fn destroy(&self) -> Option<anyhow::Result<()>> {
        self.on_destroy.as_ref().map(|hook| hook())
    }

    fn call(&self, method: &str, args: Vec<Value>) -> Option<anyhow::Result<MethodOutput>> {
        let output = match self.methods.get(method)? {
            Method::Sync(f) => f(args).map(MethodOutput::Ready),
            Method::Async(f) => Ok(MethodOutput::Pending(f(args))),
        };
        Some(output)
    }

    fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    fn state(&self) -> Option<Value> {
        Some(self.data.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ObjectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectInstance")
            .field("data", &self.data)
            .field("methods", &self.methods())
            .field("has_initialize", &self.on_initialize.is_some())
            .field("has_destroy", &self.on_destroy.is_some())
            .finish()
    }
}

/// [`ObjectInstance`] 构建器
#[derive(Default)]
pub struct ObjectInstanceBuilder {
    instance: ObjectInstance,
}

impl ObjectInstanceBuilder {
    /// 设置实例数据
    pub fn data(mut self, data: Value) -> Self {
        self.instance.data = data;
        self
    }

    /// 注册同步方法
    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.instance
            .methods
            .insert(name.into(), Method::Sync(Arc::new(f)));
        self
    }

    /// 注册异步方法
    pub fn async_method<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let method: AsyncMethod = Arc::new(move |args| f(args).boxed());
        self.instance.methods.insert(name.into(), Method::Async(method));
        self
    }

    /// 设置初始化钩子
    pub fn on_initialize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.instance.on_initialize = Some(Arc::new(move || f().boxed()));
        self
    }

    /// 设置销毁钩子
    pub fn on_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.instance.on_destroy = Some(Arc::new(f));
        self
    }

    /// 构建实例
    pub fn build(self) -> ObjectInstance {
        self.instance
    }

    /// 构建并转换为共享引用
    pub fn build_ref(self) -> ModuleRef {
        Arc::new(self.instance)
    }
}

/// 远程获取的资源内容
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedResource {
    /// 脚本
    Script {
        /// 脚本源码
        source: String,
    },
    /// 样式表
    Stylesheet {
        /// 样式源码
        source: String,
    },
    /// JSON 文档
    Json(Value),
    /// 纯文本
    Text(String),
}

impl FetchedResource {
    /// 资源类型名
    pub fn kind(&self) -> &'static str {
        match self {
            FetchedResource::Script { .. } => "script",
            FetchedResource::Stylesheet { .. } => "css",
            FetchedResource::Json(_) => "json",
            FetchedResource::Text(_) => "text",
        }
    }
}

/// 由远程资源构成的模块实例
///
/// 脚本和样式表暴露为 `{"loaded": true, "type": ..}`，JSON 与文本直接暴露内容。
/// 提供 `content` 方法返回同样的值。
#[derive(Debug, Clone)]
pub struct ResourceInstance {
    locator: String,
    resource: FetchedResource,
}

impl ResourceInstance {
    /// 创建资源实例
    pub fn new(locator: impl Into<String>, resource: FetchedResource) -> Self {
        Self {
            locator: locator.into(),
            resource,
        }
    }

    /// 资源定位符
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// 资源内容
    pub fn resource(&self) -> &FetchedResource {
        &self.resource
    }

    fn exposed(&self) -> Value {
        match &self.resource {
            FetchedResource::Script { .. } | FetchedResource::Stylesheet { .. } => {
                json!({"loaded": true, "type": self.resource.kind()})
            }
            FetchedResource::Json(value) => value.clone(),
            FetchedResource::Text(text) => Value::String(text.clone()),
        }
    }
}

impl ModuleInstance for ResourceInstance {
    fn call(&self, method: &str, _args: Vec<Value>) -> Option<anyhow::Result<MethodOutput>> {
        (method == "content").then(|| Ok(MethodOutput::Ready(self.exposed())))
    }

    fn methods(&self) -> Vec<String> {
        vec!["content".to_string()]
    }

    fn state(&self) -> Option<Value> {
        Some(self.exposed())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
