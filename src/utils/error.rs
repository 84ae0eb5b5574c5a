//! 模块框架错误类型定义
//!
//! 本模块定义了框架中使用的错误类型：
//!
//! - [`LoadError`] - 模块注册、加载、卸载和方法调用的失败分类，可克隆，
//!   便于在共享的加载 future 之间传递
//! - [`CoreError`] - 配置、IO、序列化等框架级错误

use thiserror::Error;

/// 模块加载错误
///
/// 所有加载相关的失败都归入此类型。由于同一个加载结果可能被多个
/// 等待者共享，`LoadError` 必须实现 `Clone`。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// 模块未注册
    #[error("模块未注册: '{0}'")]
    NotFound(String),

    /// 模块已注册
    #[error("模块已注册: '{0}'")]
    AlreadyRegistered(String),

    /// 模块描述无效
    #[error("模块描述无效: '{module_id}' - {reason}")]
    InvalidDescriptor {
        module_id: String,
        reason: String,
    },

    /// 没有可用的加载方式
    #[error("模块 '{0}' 没有可用的加载方式")]
    NoLoader(String),

    /// 依赖模块加载失败
    #[error("模块 '{module_id}' 的依赖 '{dependency}' 加载失败: {source}")]
    DependencyFailure {
        module_id: String,
        dependency: String,
        source: Box<LoadError>,
    },

    /// 循环依赖
    #[error("检测到循环依赖: {}", .cycle.join(" -> "))]
    DependencyCycle {
        cycle: Vec<String>,
    },

    /// 解析器失败
    #[error("模块 '{module_id}' 解析失败: {reason}")]
    ResolverFailure {
        module_id: String,
        reason: String,
    },

    /// 初始化失败
    #[error("模块 '{module_id}' 初始化失败: {reason}")]
    InitFailure {
        module_id: String,
        reason: String,
    },

    /// 方法不存在
    #[error("模块 '{module_id}' 不存在方法 '{method}'")]
    MethodNotFound {
        module_id: String,
        method: String,
    },

    /// 方法调用失败
    #[error("模块 '{module_id}' 的方法 '{method}' 调用失败: {reason}")]
    InvocationFailed {
        module_id: String,
        method: String,
        reason: String,
    },

    /// 模块未处于活动状态
    #[error("模块未处于活动状态: '{0}'")]
    NotActive(String),

    /// 模块有活动的依赖者，无法卸载
    #[error("模块 '{module_id}' 被以下活动模块依赖，无法卸载: {dependents:?}")]
    UnloadBlocked {
        module_id: String,
        dependents: Vec<String>,
    },

    /// 加载任务异常终止
    #[error("模块 '{module_id}' 的加载任务异常终止: {reason}")]
    Aborted {
        module_id: String,
        reason: String,
    },
}

impl LoadError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            LoadError::NotFound(_) => error_code::MODULE_NOT_FOUND,
            LoadError::AlreadyRegistered(_) | LoadError::InvalidDescriptor { .. } => {
                error_code::MODULE_INVALID_DESCRIPTOR
            }
            LoadError::NoLoader(_) | LoadError::ResolverFailure { .. } => {
                error_code::MODULE_LOAD_FAILED
            }
            LoadError::DependencyFailure { .. } => error_code::MODULE_DEPENDENCY_FAILED,
            LoadError::DependencyCycle { .. } => error_code::MODULE_CIRCULAR_DEPENDENCY,
            LoadError::InitFailure { .. } | LoadError::Aborted { .. } => {
                error_code::MODULE_INIT_FAILED
            }
            LoadError::MethodNotFound { .. } | LoadError::InvocationFailed { .. } => {
                error_code::MODULE_EXECUTION_ERROR
            }
            LoadError::NotActive(_) => error_code::MODULE_NOT_ACTIVE,
            LoadError::UnloadBlocked { .. } => error_code::MODULE_UNLOAD_BLOCKED,
        }
    }

    /// 沿依赖失败链找到最初的错误
    ///
    /// # Example
    ///
    /// ```
    /// use module_framework::utils::LoadError;
    ///
    /// let err = LoadError::DependencyFailure {
    ///     module_id: "y".to_string(),
    ///     dependency: "x".to_string(),
    ///     source: Box::new(LoadError::NotFound("x".to_string())),
    /// };
    /// assert_eq!(err.root_cause(), &LoadError::NotFound("x".to_string()));
    /// ```
    pub fn root_cause(&self) -> &LoadError {
        let mut current = self;
        while let LoadError::DependencyFailure { source, .. } = current {
            current = source;
        }
        current
    }

    /// 错误涉及的模块 ID（循环依赖返回环的起点）
    pub fn module_id(&self) -> Option<&str> {
        match self {
            LoadError::NotFound(id)
            | LoadError::AlreadyRegistered(id)
            | LoadError::NoLoader(id)
            | LoadError::NotActive(id) => Some(id),
            LoadError::InvalidDescriptor { module_id, .. }
            | LoadError::DependencyFailure { module_id, .. }
            | LoadError::ResolverFailure { module_id, .. }
            | LoadError::InitFailure { module_id, .. }
            | LoadError::MethodNotFound { module_id, .. }
            | LoadError::InvocationFailed { module_id, .. }
            | LoadError::UnloadBlocked { module_id, .. }
            | LoadError::Aborted { module_id, .. } => Some(module_id),
            LoadError::DependencyCycle { cycle } => cycle.first().map(String::as_str),
        }
    }
}

/// 加载操作结果类型别名
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// 框架核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 模块错误 ====================

    /// 模块加载相关错误
    #[error(transparent)]
    Load(#[from] LoadError),

    /// 无效的模块元数据
    #[error("无效的模块元数据: {0}")]
    InvalidMetadata(String),

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 框架操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 核心错误 (CORE-xxx)
    pub const CORE_INIT_FAILED: &str = "CORE-003";

    // 模块错误 (MODULE-xxx)
    pub const MODULE_NOT_FOUND: &str = "MODULE-001";
    pub const MODULE_EXECUTION_ERROR: &str = "MODULE-002";
    pub const MODULE_LOAD_FAILED: &str = "MODULE-003";
    pub const MODULE_UNLOAD_BLOCKED: &str = "MODULE-004";
    pub const MODULE_CIRCULAR_DEPENDENCY: &str = "MODULE-005";
    pub const MODULE_DEPENDENCY_FAILED: &str = "MODULE-006";
    pub const MODULE_INIT_FAILED: &str = "MODULE-007";
    pub const MODULE_NOT_ACTIVE: &str = "MODULE-008";
    pub const MODULE_INVALID_DESCRIPTOR: &str = "MODULE-009";

    // 资源错误 (RESOURCE-xxx)
    pub const RESOURCE_ACCESS_FAILED: &str = "RESOURCE-002";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Load(e) => e.error_code(),
            CoreError::InvalidMetadata(_) => error_code::MODULE_INVALID_DESCRIPTOR,
            CoreError::ConfigLoadFailed(_) | CoreError::Yaml(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::Io(_) => error_code::RESOURCE_ACCESS_FAILED,
            CoreError::InitFailed(_) => error_code::CORE_INIT_FAILED,
            _ => "UNKNOWN",
        }
    }
}
