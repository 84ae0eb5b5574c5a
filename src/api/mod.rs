//! API 模块
//!
//! 对外提供的 SDK 接口。
//!
//! # 示例
//!
//! ```rust,no_run
//! use module_framework::{FrameworkConfig, ModuleFramework};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FrameworkConfig::builder()
//!         .log_level("info")
//!         .manifest("modules.yaml")
//!         .build();
//!
//!     let framework = ModuleFramework::new(config)?;
//!     framework.initialize().await?;
//!     Ok(())
//! }
//! ```

pub mod sdk;

// 重导出主要类型
pub use sdk::ModuleFramework;
