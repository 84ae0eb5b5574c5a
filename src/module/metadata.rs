//! 模块元数据与运行时记录
//!
//! - [`ModuleMetadata`] - 注册输入，可从配置文件或清单反序列化
//! - [`ModuleStatus`] - 模块生命周期状态
//! - [`ModuleDescriptor`] - 注册表内部保存的完整记录
//! - [`ModuleSummary`] - 对外列出的模块摘要

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::module::instance::ModuleRef;
use crate::module::resolver::ModuleSource;
use crate::utils::LoadError;

/// 未声明版本时的默认版本号
pub const DEFAULT_VERSION: &str = "1.0.0";

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

/// 模块元数据
///
/// 描述模块的身份和依赖关系，不包含加载方式。工厂函数或预先构造的
/// 实例通过 [`ModuleSource`] 在注册时单独提供。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    /// 模块唯一标识
    pub id: String,

    /// 模块显示名称
    pub name: String,

    /// 模块版本（不参与依赖解析）
    #[serde(default = "default_version")]
    pub version: String,

    /// 依赖的模块 ID，按声明顺序发起加载
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 注册后是否自动加载
    #[serde(default, alias = "autoStart")]
    pub auto_start: bool,

    /// 权限声明（框架不解释）
    #[serde(default)]
    pub permissions: Vec<String>,

    /// 自由格式的模块设置
    #[serde(default)]
    pub settings: HashMap<String, Value>,

    /// 远程资源定位符
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ModuleMetadata {
    /// 创建新的模块元数据，其余字段取默认值
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: default_version(),
            dependencies: Vec::new(),
            auto_start: false,
            permissions: Vec::new(),
            settings: HashMap::new(),
            url: None,
        }
    }

    /// 设置版本号
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// 追加依赖
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// 设置依赖列表
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// 设置自动加载
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// 追加权限声明
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// 设置单个模块设置项
    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// 设置远程资源定位符
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// 注册前的结构检查
    ///
    /// # Errors
    ///
    /// ID 或名称为空、或依赖列表包含自身时返回 `LoadError::InvalidDescriptor`
    pub fn validate(&self) -> Result<(), LoadError> {
        let reason = if self.id.trim().is_empty() {
            Some("模块 ID 不能为空".to_string())
        } else if self.name.trim().is_empty() {
            Some("模块名称不能为空".to_string())
        } else if self.dependencies.iter().any(|d| d == &self.id) {
            Some("模块不能依赖自身".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => Err(LoadError::InvalidDescriptor {
                module_id: self.id.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// 模块状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// 已注册，未加载
    #[default]
    Registered,
    /// 正在加载
    Loading,
    /// 已加载且可用
    Active,
    /// 最近一次加载失败
    Error,
}

impl ModuleStatus {
    /// 是否可以发起新的加载
    pub fn can_load(&self) -> bool {
        matches!(self, ModuleStatus::Registered | ModuleStatus::Error)
    }

    /// 是否可以卸载
    pub fn can_unload(&self) -> bool {
        matches!(self, ModuleStatus::Active)
    }

    /// 状态名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Registered => "registered",
            ModuleStatus::Loading => "loading",
            ModuleStatus::Active => "active",
            ModuleStatus::Error => "error",
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// 注册表中的模块记录
///
/// `instance` 仅在 `Active` 状态下存在，`last_error` 仅在 `Error` 状态下存在。
#[derive(Clone)]
pub struct ModuleDescriptor {
    /// 模块元数据
    pub metadata: ModuleMetadata,

    /// 内联加载方式
    pub source: Option<ModuleSource>,

    /// 当前状态
    pub status: ModuleStatus,

    /// 已激活的实例
    pub instance: Option<ModuleRef>,

    /// 从开始加载到实例就绪的耗时（毫秒）
    pub load_duration_ms: Option<f64>,

    /// 初始化钩子耗时（毫秒）
    pub init_duration_ms: Option<f64>,

    /// 最近一次加载错误
    pub last_error: Option<LoadError>,

    /// 注册时间
    pub registered_at: DateTime<Utc>,
}

impl ModuleDescriptor {
    pub(crate) fn new(metadata: ModuleMetadata, source: Option<ModuleSource>) -> Self {
        Self {
            metadata,
            source,
            status: ModuleStatus::Registered,
            instance: None,
            load_duration_ms: None,
            init_duration_ms: None,
            last_error: None,
            registered_at: Utc::now(),
        }
    }

    /// 模块 ID
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// 模块名称
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// 是否处于活动状态
    pub fn is_active(&self) -> bool {
        self.status == ModuleStatus::Active
    }

    /// 生成对外摘要
    pub fn summary(&self) -> ModuleSummary {
        ModuleSummary {
            id: self.metadata.id.clone(),
            name: self.metadata.name.clone(),
            version: self.metadata.version.clone(),
            status: self.status,
            dependencies: self.metadata.dependencies.clone(),
            load_duration_ms: self.load_duration_ms,
            init_duration_ms: self.init_duration_ms,
        }
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("metadata", &self.metadata)
            .field("source", &self.source)
            .field("status", &self.status)
            .field("has_instance", &self.instance.is_some())
            .field("load_duration_ms", &self.load_duration_ms)
            .field("init_duration_ms", &self.init_duration_ms)
            .field("last_error", &self.last_error)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// 模块摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    /// 模块 ID
    pub id: String,
    /// 模块名称
    pub name: String,
    /// 版本
    pub version: String,
    /// 状态
    pub status: ModuleStatus,
    /// 依赖
    pub dependencies: Vec<String>,
    /// 加载耗时（毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration_ms: Option<f64>,
    /// 初始化耗时（毫秒）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_duration_ms: Option<f64>,
}
