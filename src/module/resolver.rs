//! 模块解析器
//!
//! 负责把一个已注册的模块描述变成可用的实例。默认解析顺序：
//!
//! 1. 内联工厂函数（[`ModuleSource::Factory`]）
//! 2. 注册时提供的实例（[`ModuleSource::Instance`]）
//! 3. 宿主作用域中已存在的同名实例（[`HostScope`]）
//! 4. 远程资源定位符（`url`，通过 [`ResourceFetcher`] 获取）
//!
//! 都不存在时返回 `LoadError::NoLoader`。

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
#[cfg(feature = "http")]
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::debug;

use crate::core::config::FetchConfig;
use crate::module::instance::{FetchedResource, ModuleInstance, ModuleRef, ResourceInstance};
use crate::module::metadata::{ModuleDescriptor, ModuleMetadata};
#[cfg(feature = "http")]
use crate::utils::CoreError;
use crate::utils::{LoadError, LoadResult, Result};

/// 模块工厂函数
pub type ModuleFactory = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<ModuleRef>> + Send + Sync>;

/// 模块的内联加载方式
#[derive(Clone)]
pub enum ModuleSource {
    /// 异步工厂函数，每次加载调用一次
    Factory(ModuleFactory),
    /// 预先构造的实例
    Instance(ModuleRef),
}

impl ModuleSource {
    /// 由异步闭包创建工厂
    pub fn factory<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ModuleRef>> + Send + 'static,
    {
        ModuleSource::Factory(Arc::new(move || f().boxed()))
    }

    /// 由同步闭包创建工厂
    pub fn sync_factory<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<ModuleRef> + Send + Sync + 'static,
    {
        ModuleSource::Factory(Arc::new(move || futures::future::ready(f()).boxed()))
    }

    /// 使用现成的实例
    pub fn instance<T: ModuleInstance>(instance: T) -> Self {
        ModuleSource::Instance(Arc::new(instance))
    }
}

impl fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleSource::Factory(_) => f.write_str("Factory(..)"),
            ModuleSource::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

/// 宿主作用域
///
/// 保存宿主程序预先创建的模块实例，按模块 ID 索引。
/// 通过 `preload` 放入的条目会在框架初始化时自动注册。
#[derive(Clone, Default)]
pub struct HostScope {
    inner: Arc<RwLock<HostScopeInner>>,
}

#[derive(Default)]
struct HostScopeInner {
    instances: HashMap<String, ModuleRef>,
    preloaded: Vec<ModuleMetadata>,
}

impl HostScope {
    /// 创建空的宿主作用域
    pub fn new() -> Self {
        Self::default()
    }

    /// 提供一个按 ID 查找的实例
    pub fn provide(&self, id: impl Into<String>, instance: ModuleRef) {
        self.inner.write().instances.insert(id.into(), instance);
    }

    /// 提供一个预加载模块，框架初始化时以 `metadata` 注册
    pub fn preload(&self, metadata: ModuleMetadata, instance: ModuleRef) {
        let mut inner = self.inner.write();
        inner.instances.insert(metadata.id.clone(), instance);
        inner.preloaded.retain(|m| m.id != metadata.id);
        inner.preloaded.push(metadata);
    }

    /// 查找实例
    pub fn get(&self, id: &str) -> Option<ModuleRef> {
        self.inner.read().instances.get(id).cloned()
    }

    /// 移除实例
    pub fn remove(&self, id: &str) -> Option<ModuleRef> {
        let mut inner = self.inner.write();
        inner.preloaded.retain(|m| m.id != id);
        inner.instances.remove(id)
    }

    /// 预加载模块的元数据，按放入顺序
    pub fn preloaded(&self) -> Vec<ModuleMetadata> {
        self.inner.read().preloaded.clone()
    }

    /// 实例数量
    pub fn len(&self) -> usize {
        self.inner.read().instances.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 远程资源获取器
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// 获取并解码定位符指向的资源
    async fn fetch(&self, locator: &str) -> anyhow::Result<FetchedResource>;
}

/// 默认资源获取器
///
/// `http://` 与 `https://` 定位符通过 HTTP 获取（需要 `http` 特性），
/// 其余定位符视为本地文件路径，`file://` 前缀可选。
#[derive(Clone)]
pub struct DefaultFetcher {
    #[cfg(feature = "http")]
    client: reqwest::Client,
}

impl DefaultFetcher {
    /// 按配置创建获取器
    ///
    /// # Errors
    ///
    /// HTTP 客户端构建失败时返回 `CoreError::InitFailed`
    pub fn new(config: &FetchConfig) -> Result<Self> {
        #[cfg(feature = "http")]
        {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_millis(config.timeout_ms))
                .user_agent(config.user_agent.clone())
                .build()
                .map_err(|e| CoreError::InitFailed(format!("HTTP 客户端创建失败: {}", e)))?;
            Ok(Self { client })
        }

        #[cfg(not(feature = "http"))]
        {
            let _ = config;
            Ok(Self {})
        }
    }

    fn is_remote(locator: &str) -> bool {
        locator.starts_with("http://") || locator.starts_with("https://")
    }

    #[cfg(feature = "http")]
    async fn fetch_remote(&self, locator: &str) -> anyhow::Result<FetchedResource> {
        let response = self
            .client
            .get(locator)
            .send()
            .await
            .with_context(|| format!("请求资源失败: {}", locator))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP 错误，状态码: {}", status.as_u16());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .with_context(|| format!("读取响应失败: {}", locator))?;

        classify(locator, content_type.as_deref(), body)
    }

    #[cfg(not(feature = "http"))]
    async fn fetch_remote(&self, locator: &str) -> anyhow::Result<FetchedResource> {
        bail!("未启用 http 特性，无法获取远程资源: {}", locator)
    }

    async fn fetch_local(&self, locator: &str) -> anyhow::Result<FetchedResource> {
        let path = locator.strip_prefix("file://").unwrap_or(locator);
        let body = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("读取资源失败: {}", path))?;

        let content_type = Path::new(path)
            .extension()
            .filter(|ext| ext.eq_ignore_ascii_case("json"))
            .map(|_| "application/json");

        classify(locator, content_type, body)
    }
}

#[async_trait]
impl ResourceFetcher for DefaultFetcher {
    async fn fetch(&self, locator: &str) -> anyhow::Result<FetchedResource> {
        if Self::is_remote(locator) {
            self.fetch_remote(locator).await
        } else {
            self.fetch_local(locator).await
        }
    }
}

/// 按定位符后缀和内容类型解码资源
///
/// `.js` 为脚本，`.css` 为样式表；否则内容类型包含 `application/json`
/// 时按 JSON 解码，其余为纯文本。
pub fn classify(
    locator: &str,
    content_type: Option<&str>,
    body: String,
) -> anyhow::Result<FetchedResource> {
    let path = locator
        .split(['?', '#'])
        .next()
        .unwrap_or(locator)
        .to_ascii_lowercase();

    if path.ends_with(".js") {
        return Ok(FetchedResource::Script { source: body });
    }
    if path.ends_with(".css") {
        return Ok(FetchedResource::Stylesheet { source: body });
    }

    let is_json = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false);
    if is_json {
        let value = serde_json::from_str(&body)
            .with_context(|| format!("JSON 解码失败: {}", locator))?;
        return Ok(FetchedResource::Json(value));
    }

    Ok(FetchedResource::Text(body))
}

/// 模块解析器
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// 为模块描述产生实例
    async fn resolve(&self, descriptor: &ModuleDescriptor) -> LoadResult<ModuleRef>;
}

/// 默认解析器
#[derive(Clone)]
pub struct DefaultResolver {
    host: HostScope,
    fetcher: Arc<dyn ResourceFetcher>,
}

impl DefaultResolver {
    /// 创建解析器
    pub fn new(host: HostScope, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self { host, fetcher }
    }

    /// 宿主作用域
    pub fn host(&self) -> &HostScope {
        &self.host
    }
}

#[async_trait]
impl ModuleResolver for DefaultResolver {
    async fn resolve(&self, descriptor: &ModuleDescriptor) -> LoadResult<ModuleRef> {
        let module_id = descriptor.id();
        let failure = |e: anyhow::Error| LoadError::ResolverFailure {
            module_id: module_id.to_string(),
            reason: format!("{:#}", e),
        };

        match descriptor.source {
            Some(ModuleSource::Factory(ref factory)) => {
                debug!(module_id = %module_id, "通过工厂函数解析模块");
                return factory().await.map_err(failure);
            }
            Some(ModuleSource::Instance(ref instance)) => {
                debug!(module_id = %module_id, "使用注册时提供的实例");
                return Ok(instance.clone());
            }
            None => {}
        }

        if let Some(instance) = self.host.get(module_id) {
            debug!(module_id = %module_id, "使用宿主作用域中的实例");
            return Ok(instance);
        }

        if let Some(ref url) = descriptor.metadata.url {
            debug!(module_id = %module_id, url = %url, "获取远程资源");
            let resource = self.fetcher.fetch(url).await.map_err(failure)?;
            return Ok(Arc::new(ResourceInstance::new(url.clone(), resource)));
        }

        Err(LoadError::NoLoader(module_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::instance::ObjectInstance;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 记录调用次数的获取器
    struct StubFetcher {
        calls: AtomicUsize,
        result: FetchedResource,
    }

    #[async_trait]
    impl ResourceFetcher for StubFetcher {
        async fn fetch(&self, locator: &str) -> anyhow::Result<FetchedResource> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if locator.contains("broken") {
                bail!("HTTP 错误，状态码: 404");
            }
            Ok(self.result.clone())
        }
    }

    fn stub_resolver(host: HostScope) -> (DefaultResolver, Arc<StubFetcher>) {
        let fetcher = Arc::new(StubFetcher {
            calls: AtomicUsize::new(0),
            result: FetchedResource::Json(json!({"remote": true})),
        });
        (DefaultResolver::new(host, fetcher.clone()), fetcher)
    }

    fn data_of(instance: &ModuleRef) -> serde_json::Value {
        instance.state().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_factory_takes_precedence() {
        let host = HostScope::new();
        host.provide("m", ObjectInstance::from_value(json!("host")).into_ref());
        let (resolver, fetcher) = stub_resolver(host);

        let descriptor = ModuleDescriptor::new(
            ModuleMetadata::new("m", "M").with_url("https://example.com/m.json"),
            Some(ModuleSource::sync_factory(|| {
                Ok(ObjectInstance::from_value(json!("factory")).into_ref())
            })),
        );

        let instance = resolver.resolve(&descriptor).await.unwrap();
        assert_eq!(data_of(&instance), json!("factory"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_supplied_instance_returned_as_is() {
        let (resolver, _) = stub_resolver(HostScope::new());
        let supplied = ObjectInstance::from_value(json!(1)).into_ref();
        let descriptor = ModuleDescriptor::new(
            ModuleMetadata::new("m", "M"),
            Some(ModuleSource::Instance(supplied.clone())),
        );

        let instance = resolver.resolve(&descriptor).await.unwrap();
        assert!(Arc::ptr_eq(&instance, &supplied));
    }

    #[tokio::test]
    async fn test_host_scope_before_url() {
        let host = HostScope::new();
        host.provide("m", ObjectInstance::from_value(json!("host")).into_ref());
        let (resolver, fetcher) = stub_resolver(host);

        let descriptor = ModuleDescriptor::new(
            ModuleMetadata::new("m", "M").with_url("https://example.com/m.json"),
            None,
        );

        let instance = resolver.resolve(&descriptor).await.unwrap();
        assert_eq!(data_of(&instance), json!("host"));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_url_resolution() {
        let (resolver, fetcher) = stub_resolver(HostScope::new());
        let descriptor = ModuleDescriptor::new(
            ModuleMetadata::new("m", "M").with_url("https://example.com/m.json"),
            None,
        );

        let instance = resolver.resolve(&descriptor).await.unwrap();
        let resource = instance.downcast_ref::<ResourceInstance>().unwrap();
        assert_eq!(resource.locator(), "https://example.com/m.json");
        assert_eq!(data_of(&instance), json!({"remote": true}));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_url_failure_is_resolver_failure() {
        let (resolver, _) = stub_resolver(HostScope::new());
        let descriptor = ModuleDescriptor::new(
            ModuleMetadata::new("m", "M").with_url("https://example.com/broken.js"),
            None,
        );

        let err = resolver.resolve(&descriptor).await.unwrap_err();
        match err {
            LoadError::ResolverFailure { module_id, reason } => {
                assert_eq!(module_id, "m");
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_factory_failure() {
        let (resolver, _) = stub_resolver(HostScope::new());
        let descriptor = ModuleDescriptor::new(
            ModuleMetadata::new("m", "M"),
            Some(ModuleSource::factory(|| async { bail!("boom") })),
        );

        let err = resolver.resolve(&descriptor).await.unwrap_err();
        assert!(matches!(err, LoadError::ResolverFailure { .. }));
    }

    #[tokio::test]
    async fn test_no_loader() {
        let (resolver, _) = stub_resolver(HostScope::new());
        let descriptor = ModuleDescriptor::new(ModuleMetadata::new("m", "M"), None);

        let err = resolver.resolve(&descriptor).await.unwrap_err();
        assert_eq!(err, LoadError::NoLoader("m".to_string()));
    }

    #[test]
    fn test_classify() {
        let script = classify("https://cdn/x/app.js?v=2", None, "1".to_string()).unwrap();
        assert_eq!(script.kind(), "script");

        let css = classify("theme.CSS", Some("text/css"), String::new()).unwrap();
        assert_eq!(css.kind(), "css");

        let json = classify("/api/conf", Some("application/json; charset=utf-8"), r#"{"a":1}"#.to_string())
            .unwrap();
        assert_eq!(json, FetchedResource::Json(json!({"a": 1})));

        let text = classify("/readme", Some("text/plain"), "hello".to_string()).unwrap();
        assert_eq!(text, FetchedResource::Text("hello".to_string()));

        assert!(classify("/api/conf", Some("application/json"), "{".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_default_fetcher_local_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let json_path = dir.path().join("settings.json");
        tokio::fs::write(&json_path, r#"{"theme":"dark"}"#).await.unwrap();
        let text_path = dir.path().join("notes.txt");
        tokio::fs::write(&text_path, "hello").await.unwrap();

        let fetcher = DefaultFetcher::new(&FetchConfig::default()).unwrap();

        let json = fetcher.fetch(json_path.to_str().unwrap()).await.unwrap();
        assert_eq!(json, FetchedResource::Json(json!({"theme": "dark"})));

        let locator = format!("file://{}", text_path.display());
        let text = fetcher.fetch(&locator).await.unwrap();
        assert_eq!(text, FetchedResource::Text("hello".to_string()));

        let missing = dir.path().join("missing.txt");
        assert!(fetcher.fetch(missing.to_str().unwrap()).await.is_err());
    }

    #[test]
    fn test_host_scope_preload() {
        let host = HostScope::new();
        host.preload(
            ModuleMetadata::new("theme", "Theme"),
            ObjectInstance::from_value(json!({})).into_ref(),
        );
        host.provide("extra", ObjectInstance::from_value(json!({})).into_ref());

        assert_eq!(host.len(), 2);
        assert_eq!(host.preloaded().len(), 1);
        assert!(host.get("theme").is_some());

        host.remove("theme");
        assert!(host.preloaded().is_empty());
        assert!(host.get("theme").is_none());
    }
}
