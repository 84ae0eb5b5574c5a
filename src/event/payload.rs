//! 事件数据结构

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::module::instance::ModuleRef;
use crate::utils::{generate_id, LoadError};

/// 框架发布的事件名
pub mod events {
    /// 模块注册成功
    pub const MODULE_REGISTERED: &str = "module:registered";
    /// 模块加载成功
    pub const MODULE_LOADED: &str = "module:loaded";
    /// 模块已卸载
    pub const MODULE_UNLOADED: &str = "module:unloaded";
    /// 模块加载失败
    pub const MODULE_ERROR: &str = "module:error";
    /// 框架初始化完成
    pub const FRAMEWORK_INITIALIZED: &str = "framework:initialized";

    /// 所有框架事件
    pub const ALL: [&str; 5] = [
        MODULE_REGISTERED,
        MODULE_LOADED,
        MODULE_UNLOADED,
        MODULE_ERROR,
        FRAMEWORK_INITIALIZED,
    ];
}

/// 事件负载
#[derive(Clone)]
pub enum EventPayload {
    /// `module:registered`
    Registered {
        id: String,
        name: String,
        version: String,
    },
    /// `module:loaded`
    Loaded {
        id: String,
        name: String,
        instance: ModuleRef,
    },
    /// `module:unloaded`
    Unloaded { id: String, name: String },
    /// `module:error`
    Error {
        id: String,
        name: String,
        error: LoadError,
    },
    /// `framework:initialized`
    FrameworkInitialized { timestamp: DateTime<Utc> },
    /// 用户自定义事件
    Custom(Value),
}

impl EventPayload {
    /// 负载涉及的模块 ID
    pub fn module_id(&self) -> Option<&str> {
        match self {
            EventPayload::Registered { id, .. }
            | EventPayload::Loaded { id, .. }
            | EventPayload::Unloaded { id, .. }
            | EventPayload::Error { id, .. } => Some(id),
            EventPayload::FrameworkInitialized { .. } | EventPayload::Custom(_) => None,
        }
    }

    /// 转换为 JSON 表示
    ///
    /// `Loaded` 的实例以其数据快照表示，`Error` 附带错误码。
    pub fn to_json(&self) -> Value {
        match self {
            EventPayload::Registered { id, name, version } => {
                json!({"id": id, "name": name, "version": version})
            }
            EventPayload::Loaded { id, name, instance } => {
                json!({"id": id, "name": name, "instance": instance.state().unwrap_or(Value::Null)})
            }
            EventPayload::Unloaded { id, name } => json!({"id": id, "name": name}),
            EventPayload::Error { id, name, error } => json!({
                "id": id,
                "name": name,
                "error": error.to_string(),
                "code": error.error_code(),
            }),
            EventPayload::FrameworkInitialized { timestamp } => {
                json!({"timestamp": timestamp.timestamp_millis()})
            }
            EventPayload::Custom(value) => value.clone(),
        }
    }
}

impl fmt::Debug for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPayload::Loaded { id, name, .. } => f
                .debug_struct("Loaded")
                .field("id", id)
                .field("name", name)
                .finish_non_exhaustive(),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<Value> for EventPayload {
    fn from(value: Value) -> Self {
        EventPayload::Custom(value)
    }
}

/// 事件
#[derive(Debug, Clone)]
pub struct Event {
    /// 事件唯一标识
    pub event_id: String,

    /// 事件名
    pub name: String,

    /// 负载
    pub payload: EventPayload,

    /// 发布时间
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// 创建新事件
    pub fn new(name: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            event_id: generate_id(),
            name: name.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    /// 创建携带 JSON 数据的自定义事件
    pub fn custom(name: impl Into<String>, data: Value) -> Self {
        Self::new(name, EventPayload::Custom(data))
    }
}
