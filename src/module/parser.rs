//! 模块清单解析器
//!
//! 从 YAML 或 JSON 清单文件解析模块元数据。清单可以是单个模块、
//! 模块列表，或带有 `modules` 字段的对象：
//!
//! ```yaml
//! modules:
//!   - id: database
//!     name: Database
//!   - id: service
//!     name: Service
//!     dependencies: [database]
//!     autoStart: true
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::module::metadata::ModuleMetadata;
use crate::utils::{CoreError, Result};

/// 清单格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    /// YAML 清单
    Yaml,
    /// JSON 清单
    Json,
}

impl ManifestFormat {
    /// 根据扩展名判断格式，`.json` 之外一律按 YAML 处理
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ManifestFormat::Json,
            _ => ManifestFormat::Yaml,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    List(Vec<ModuleMetadata>),
    Wrapped { modules: Vec<ModuleMetadata> },
    Single(ModuleMetadata),
}

impl Manifest {
    fn into_modules(self) -> Vec<ModuleMetadata> {
        match self {
            Manifest::List(modules) | Manifest::Wrapped { modules } => modules,
            Manifest::Single(module) => vec![module],
        }
    }
}

/// 模块清单解析器
#[derive(Debug, Clone, Default)]
pub struct ModuleParser;

impl ModuleParser {
    /// 创建新的解析器实例
    pub fn new() -> Self {
        Self
    }

    /// 从文件解析模块清单
    ///
    /// # Errors
    ///
    /// - 文件不存在或无法读取时返回 IO 错误
    /// - 内容格式错误时返回 YAML/JSON 错误
    /// - 元数据验证失败时返回 `InvalidMetadata` 错误
    pub async fn parse_file(path: &Path) -> Result<Vec<ModuleMetadata>> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_str(&content, ManifestFormat::from_path(path))
    }

    /// 从文件同步解析模块清单
    pub fn parse_file_sync(path: &Path) -> Result<Vec<ModuleMetadata>> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content, ManifestFormat::from_path(path))
    }

    /// 从字符串解析模块清单
    ///
    /// 每个模块都会单独验证，清单内 ID 重复同样视为错误。
    pub fn parse_str(content: &str, format: ManifestFormat) -> Result<Vec<ModuleMetadata>> {
        let manifest: Manifest = match format {
            ManifestFormat::Yaml => serde_yaml::from_str(content)?,
            ManifestFormat::Json => serde_json::from_str(content)?,
        };
        let modules = manifest.into_modules();

        let mut seen = HashSet::new();
        for metadata in &modules {
            Self::validate(metadata)?;
            if !seen.insert(metadata.id.as_str()) {
                return Err(CoreError::InvalidMetadata(format!(
                    "清单中模块 ID '{}' 重复",
                    metadata.id
                )));
            }
        }

        Ok(modules)
    }

    /// 验证模块元数据
    ///
    /// 执行以下验证：
    /// - 模块 ID 与名称
    /// - 版本号格式（semver）
    /// - 依赖声明
    /// - 权限声明格式
    ///
    /// 所有问题汇总为一个 `InvalidMetadata` 错误返回。
    pub fn validate(metadata: &ModuleMetadata) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // 1. 验证 ID 与名称
        if metadata.id.is_empty() {
            errors.push("模块 ID 不能为空".to_string());
        } else if !Self::is_valid_module_id(&metadata.id) {
            errors.push(format!(
                "模块 ID '{}' 格式无效，只允许字母、数字、下划线和连字符",
                metadata.id
            ));
        }

        if metadata.name.trim().is_empty() {
            errors.push("模块名称不能为空".to_string());
        }

        // 2. 验证版本号格式
        if semver::Version::parse(&metadata.version).is_err() {
            errors.push(format!(
                "无效的版本号格式 '{}', 请使用 semver 格式 (如 1.0.0)",
                metadata.version
            ));
        }

        // 3. 验证依赖声明
        let mut seen = HashSet::new();
        for (index, dep) in metadata.dependencies.iter().enumerate() {
            if dep.is_empty() {
                errors.push(format!("第 {} 个依赖的模块 ID 不能为空", index + 1));
            } else if dep == &metadata.id {
                errors.push(format!("模块 '{}' 不能依赖自身", metadata.id));
            } else if !seen.insert(dep.as_str()) {
                errors.push(format!("依赖 '{}' 重复声明", dep));
            }
        }

        // 4. 验证权限声明
        for permission in &metadata.permissions {
            if !Self::is_valid_permission(permission) {
                errors.push(format!("无效的权限声明格式: '{}'", permission));
            }
        }

        if matches!(metadata.url.as_deref(), Some(url) if url.trim().is_empty()) {
            errors.push("资源定位符不能为空字符串".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidMetadata(errors.join("; ")))
        }
    }

    /// 字母开头，只包含字母、数字、下划线和连字符
    fn is_valid_module_id(id: &str) -> bool {
        id.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    /// 有效格式：`domain`、`domain.action` 或 `domain.*`
    fn is_valid_permission(permission: &str) -> bool {
        let parts: Vec<&str> = permission.split('.').collect();
        match parts.as_slice() {
            [name] => Self::is_valid_identifier(name),
            [domain, action] => Self::is_valid_identifier(domain) && (*action == "*" || Self::is_valid_identifier(action)),
            _ => false,
        }
    }

    fn is_valid_identifier(s: &str) -> bool {
        s.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(metadata: &ModuleMetadata, needle: &str) {
        match ModuleParser::validate(metadata) {
            Err(CoreError::InvalidMetadata(msg)) => assert!(msg.contains(needle), "{}", msg),
            other => panic!("expected InvalidMetadata, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_single_yaml() {
        let yaml = r#"
id: dock
name: Dock
version: 2.1.0
dependencies: [theme]
autoStart: true
permissions: [window.create, file.*]
settings:
  position: bottom
"#;
        let modules = ModuleParser::parse_str(yaml, ManifestFormat::Yaml).unwrap();
        assert_eq!(modules.len(), 1);
        let dock = &modules[0];
        assert_eq!(dock.id, "dock");
        assert_eq!(dock.version, "2.1.0");
        assert_eq!(dock.dependencies, vec!["theme"]);
        assert!(dock.auto_start);
        assert_eq!(dock.settings["position"], "bottom");
    }

    #[test]
    fn test_parse_list_and_wrapped() {
        let list = "- id: a\n  name: A\n- id: b\n  name: B\n  dependencies: [a]\n";
        let modules = ModuleParser::parse_str(list, ManifestFormat::Yaml).unwrap();
        assert_eq!(modules.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        let wrapped = r#"{"modules": [{"id": "a", "name": "A", "url": "https://cdn.example.com/a.js"}]}"#;
        let modules = ModuleParser::parse_str(wrapped, ManifestFormat::Json).unwrap();
        assert_eq!(modules[0].url.as_deref(), Some("https://cdn.example.com/a.js"));
        assert_eq!(modules[0].version, "1.0.0");
    }

    #[test]
    fn test_parse_duplicate_ids() {
        let list = "- id: a\n  name: A\n- id: a\n  name: Again\n";
        assert!(matches!(
            ModuleParser::parse_str(list, ManifestFormat::Yaml),
            Err(CoreError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_parse_invalid_syntax() {
        assert!(matches!(
            ModuleParser::parse_str("id: [unclosed", ManifestFormat::Yaml),
            Err(CoreError::Yaml(_))
        ));
        assert!(matches!(
            ModuleParser::parse_str("{not json", ManifestFormat::Json),
            Err(CoreError::Json(_))
        ));
    }

    #[test]
    fn test_validate_rules() {
        assert_invalid(&ModuleMetadata::new("", "X"), "ID 不能为空");
        assert_invalid(&ModuleMetadata::new("1bad", "X"), "格式无效");
        assert_invalid(&ModuleMetadata::new("ok", " "), "名称不能为空");
        assert_invalid(&ModuleMetadata::new("ok", "X").with_version("v1"), "版本号");
        assert_invalid(&ModuleMetadata::new("ok", "X").depends_on("ok"), "依赖自身");
        assert_invalid(&ModuleMetadata::new("ok", "X").depends_on("a").depends_on("a"), "重复");
        assert_invalid(&ModuleMetadata::new("ok", "X").with_permission("a.b.c"), "权限");
        assert_invalid(&ModuleMetadata::new("ok", "X").with_url(""), "资源定位符");
    }

    #[test]
    fn test_multiple_errors_joined() {
        let metadata = ModuleMetadata::new("", "").with_version("bad");
        match ModuleParser::validate(&metadata) {
            Err(CoreError::InvalidMetadata(msg)) => assert_eq!(msg.split("; ").count(), 3),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ManifestFormat::from_path(Path::new("m.json")), ManifestFormat::Json);
        assert_eq!(ManifestFormat::from_path(Path::new("m.yaml")), ManifestFormat::Yaml);
        assert_eq!(ManifestFormat::from_path(Path::new("m")), ManifestFormat::Yaml);
    }
}
