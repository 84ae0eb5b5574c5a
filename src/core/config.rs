//! 框架配置
//!
//! 定义框架的配置结构和加载逻辑。配置文件按扩展名选择 JSON 或 YAML。

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::module::metadata::ModuleMetadata;
use crate::utils::{CoreError, Result};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略（never / hourly / daily）
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 模块配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// 直接声明的模块
    #[serde(default)]
    pub modules: Vec<ModuleMetadata>,

    /// 初始化后自动加载的模块 ID
    #[serde(default)]
    pub auto_load: Vec<String>,

    /// 模块清单文件
    #[serde(default)]
    pub manifests: Vec<PathBuf>,
}

/// 远程资源获取配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// 请求超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// 请求头中的 User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_user_agent() -> String {
    format!("module-framework/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

/// 框架配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 模块配置
    #[serde(default)]
    pub modules: ModulesConfig,

    /// 远程资源获取配置
    #[serde(default)]
    pub fetch: FetchConfig,

    /// 是否为开发模式
    #[serde(default)]
    pub dev_mode: bool,
}

impl FrameworkConfig {
    /// 创建配置构建器
    pub fn builder() -> FrameworkConfigBuilder {
        FrameworkConfigBuilder::new()
    }

    /// 从文件加载配置
    ///
    /// 清单路径为相对路径时，以配置文件所在目录为基准。
    ///
    /// # Errors
    ///
    /// - 文件无法读取时返回 `ConfigLoadFailed`
    /// - 内容格式错误时返回 JSON/YAML 错误
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoreError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;

        let mut config: FrameworkConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        if let Some(base) = path.parent() {
            for manifest in &mut config.modules.manifests {
                if manifest.is_relative() {
                    *manifest = base.join(&*manifest);
                }
            }
        }

        config.config_path = Some(path);
        Ok(config)
    }

    /// 合并另一个配置（用于覆盖）
    pub fn merge(&mut self, other: FrameworkConfig) {
        // 只覆盖非默认值的配置
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        if other.logging.rotation != default_rotation() {
            self.logging.rotation = other.logging.rotation;
        }
        self.modules.modules.extend(other.modules.modules);
        for id in other.modules.auto_load {
            if !self.modules.auto_load.contains(&id) {
                self.modules.auto_load.push(id);
            }
        }
        self.modules.manifests.extend(other.modules.manifests);
        if other.fetch.timeout_ms != default_timeout_ms() {
            self.fetch.timeout_ms = other.fetch.timeout_ms;
        }
        if other.fetch.user_agent != default_user_agent() {
            self.fetch.user_agent = other.fetch.user_agent;
        }
        if other.dev_mode {
            self.dev_mode = true;
        }
    }

    /// 检查配置值
    ///
    /// # Errors
    ///
    /// 日志级别未知、超时为 0、模块声明无效或 ID 重复时返回 `InvalidConfigValue`
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(CoreError::InvalidConfigValue {
                key: "logging.level".to_string(),
                reason: format!("未知的日志级别 '{}'", self.logging.level),
            });
        }

        if self.fetch.timeout_ms == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "fetch.timeout_ms".to_string(),
                reason: "超时必须大于 0".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for (index, metadata) in self.modules.modules.iter().enumerate() {
            let key = format!("modules.modules[{}]", index);
            metadata.validate().map_err(|e| CoreError::InvalidConfigValue {
                key: key.clone(),
                reason: e.to_string(),
            })?;
            if !seen.insert(metadata.id.as_str()) {
                return Err(CoreError::InvalidConfigValue {
                    key,
                    reason: format!("模块 ID '{}' 重复", metadata.id),
                });
            }
        }

        Ok(())
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct FrameworkConfigBuilder {
    config: FrameworkConfig,
}

impl FrameworkConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置配置文件路径
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.config_path = Some(path.into());
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 声明模块
    pub fn module(mut self, metadata: ModuleMetadata) -> Self {
        self.config.modules.modules.push(metadata);
        self
    }

    /// 初始化后自动加载模块
    pub fn auto_load(mut self, module_id: impl Into<String>) -> Self {
        self.config.modules.auto_load.push(module_id.into());
        self
    }

    /// 添加模块清单文件
    pub fn manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.modules.manifests.push(path.into());
        self
    }

    /// 设置远程获取超时（毫秒）
    pub fn fetch_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.fetch.timeout_ms = timeout_ms;
        self
    }

    /// 启用开发模式
    pub fn dev_mode(mut self) -> Self {
        self.config.dev_mode = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> FrameworkConfig {
        self.config
    }
}
