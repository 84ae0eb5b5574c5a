//! 配置与清单集成测试
//!
//! 测试从文件加载配置、读取模块清单并初始化框架的完整流程

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use module_framework::module::ManifestFormat;
use module_framework::{
    events, CoreError, FrameworkConfig, ModuleFramework, ModuleMetadata, ModuleParser,
    ModuleStatus, ObjectInstance,
};
use serde_json::json;
use tempfile::TempDir;

/// 测试 YAML 配置加载 → 清单注册 → 自动加载
#[tokio::test]
async fn test_full_config_loading_workflow() {
    let temp_dir = TempDir::new().unwrap();

    tokio::fs::write(
        temp_dir.path().join("widgets.yaml"),
        r#"
modules:
  - id: theme
    name: Theme
  - id: widgets
    name: Widgets
    version: 1.2.0
    dependencies: [theme]
"#,
    )
    .await
    .unwrap();

    let config_path = temp_dir.path().join("config.yaml");
    tokio::fs::write(
        &config_path,
        r#"
logging:
  level: debug
  json_format: true
modules:
  modules:
    - id: clock
      name: Clock
  manifests:
    - widgets.yaml
  auto_load: [widgets]
fetch:
  timeout_ms: 2000
"#,
    )
    .await
    .unwrap();

    let config = FrameworkConfig::from_file(&config_path).await.unwrap();
    assert_eq!(config.config_path.as_deref(), Some(config_path.as_path()));
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json_format);
    assert_eq!(config.fetch.timeout_ms, 2000);
    // 相对路径以配置文件目录为基准
    assert_eq!(config.modules.manifests, vec![temp_dir.path().join("widgets.yaml")]);

    let framework = ModuleFramework::new(config).unwrap();
    for id in ["clock", "theme", "widgets"] {
        framework
            .host()
            .provide(id, ObjectInstance::from_value(json!({"id": id})).into_ref());
    }

    let initialized = Arc::new(AtomicUsize::new(0));
    let initialized_clone = initialized.clone();
    framework.on(events::FRAMEWORK_INITIALIZED, move |event| {
        assert!(event.payload.to_json()["timestamp"].is_i64());
        initialized_clone.fetch_add(1, Ordering::SeqCst);
    });

    framework.initialize().await.unwrap();
    assert_eq!(initialized.load(Ordering::SeqCst), 1);

    let ids: Vec<String> = framework.get_modules(false).into_iter().map(|m| m.id).collect();
    assert_eq!(ids, vec!["clock", "theme", "widgets"]);

    let active: Vec<String> = framework.get_modules(true).into_iter().map(|m| m.id).collect();
    assert_eq!(active, vec!["theme", "widgets"]);
    assert_eq!(framework.registry().status("clock"), Some(ModuleStatus::Registered));
    assert_eq!(framework.get_descriptor("widgets").unwrap().metadata.version, "1.2.0");
}

/// 测试 JSON 配置格式
#[tokio::test]
async fn test_json_config_format() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.json");
    tokio::fs::write(
        &config_path,
        r#"{
  "logging": {"level": "warn", "rotation": "hourly"},
  "modules": {"modules": [{"id": "dock", "name": "Dock", "autoStart": true}]},
  "dev_mode": true
}"#,
    )
    .await
    .unwrap();

    let config = FrameworkConfig::from_file(&config_path).await.unwrap();
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.rotation, "hourly");
    assert!(config.dev_mode);
    assert!(config.modules.modules[0].auto_start);
    assert!(config.validate().is_ok());
}

/// 测试配置文件的序列化往返
#[tokio::test]
async fn test_config_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let config = FrameworkConfig::builder()
        .log_level("trace")
        .module(ModuleMetadata::new("a", "A").with_url("https://cdn.example.com/a.css"))
        .module(ModuleMetadata::new("b", "B").depends_on("a").with_auto_start(true))
        .auto_load("b")
        .build();

    let path = temp_dir.path().join("saved.yaml");
    tokio::fs::write(&path, serde_yaml::to_string(&config).unwrap()).await.unwrap();

    let loaded = FrameworkConfig::from_file(&path).await.unwrap();
    assert_eq!(loaded.logging.level, "trace");
    assert_eq!(loaded.modules.modules, config.modules.modules);
    assert_eq!(loaded.modules.auto_load, vec!["b"]);
}

/// 测试无效配置与清单
#[tokio::test]
async fn test_invalid_files() {
    let temp_dir = TempDir::new().unwrap();

    let missing = FrameworkConfig::from_file(temp_dir.path().join("absent.yaml")).await;
    assert!(matches!(missing, Err(CoreError::ConfigLoadFailed(_))));

    let broken = temp_dir.path().join("broken.yaml");
    tokio::fs::write(&broken, "logging: [unclosed").await.unwrap();
    assert!(matches!(
        FrameworkConfig::from_file(&broken).await,
        Err(CoreError::Yaml(_))
    ));

    let bad_manifest = temp_dir.path().join("bad.json");
    tokio::fs::write(&bad_manifest, r#"[{"id": "ok", "name": "Ok", "version": "one"}]"#)
        .await
        .unwrap();
    let err = ModuleParser::parse_file(&bad_manifest).await.unwrap_err();
    assert_eq!(err.error_code(), "MODULE-009");

    // 初始化时清单错误向上返回
    let config = FrameworkConfig::builder().manifest(&bad_manifest).build();
    let framework = ModuleFramework::new(config).unwrap();
    assert!(framework.initialize().await.is_err());
}

/// 测试清单文件同步解析
#[test]
fn test_manifest_sync_parse() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("single.yml");
    std::fs::write(&path, "id: solo\nname: Solo\npermissions: [storage]\n").unwrap();

    let modules = ModuleParser::parse_file_sync(&path).unwrap();
    assert_eq!(modules.len(), 1);
    assert_eq!(modules[0].permissions, vec!["storage"]);
    assert_eq!(ManifestFormat::from_path(&path), ManifestFormat::Yaml);
}
