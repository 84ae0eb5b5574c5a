//! Module Framework 命令行入口
//!
//! 用于检查配置、查看模块与依赖顺序，以及试加载模块的命令行工具。
//!
//! # 命令概览
//!
//! - `version` - 显示版本信息
//! - `check-config` - 验证配置文件
//! - `list-modules` - 列出配置中声明的模块
//! - `order` - 查看模块的加载顺序
//! - `load` - 加载模块并可选调用其方法
//!
//! # 使用示例
//!
//! ```bash
//! # 检查配置文件
//! module-framework check-config -c config.yaml
//!
//! # 查看加载顺序
//! module-framework -c config.yaml order dock
//!
//! # 加载模块并调用方法
//! module-framework load widgets --invoke render --args '[{"id": 1}]'
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use module_framework::{
    FrameworkConfig, LogGuard, Logger, LoggerConfig, ModuleFramework, ModuleSummary,
};

/// Module Framework - 运行时模块框架
#[derive(Parser)]
#[command(name = "module-framework")]
#[command(version, about = "运行时模块加载与依赖管理", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// 日志级别 (trace, debug, info, warn, error)，覆盖配置文件
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 开发模式（启用更详细的日志）
    #[arg(long, global = true)]
    dev: bool,

    /// 子命令
    #[command(subcommand)]
    command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
enum Commands {
    /// 查看版本信息
    Version,

    /// 验证配置文件
    ///
    /// 检查配置文件与其引用的模块清单是否有效。
    CheckConfig {
        /// 配置文件路径（不指定则使用全局 -c 选项）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 列出已注册的模块
    ListModules {
        /// 只显示活动模块
        #[arg(long)]
        active: bool,
    },

    /// 查看模块的加载顺序
    Order {
        /// 模块 ID
        module_id: String,
    },

    /// 加载模块
    ///
    /// 按依赖顺序加载模块，输出各模块的状态与耗时。
    Load {
        /// 模块 ID
        module_id: String,

        /// 加载后调用的方法
        #[arg(short, long)]
        invoke: Option<String>,

        /// 方法参数（JSON 数组）
        #[arg(short, long, default_value = "[]")]
        args: String,
    },
}

/// 加载配置文件，文件不存在时使用默认配置
async fn load_config(cli: &Cli, path: &Path) -> Result<FrameworkConfig, Box<dyn std::error::Error>> {
    let mut config = if path.exists() {
        FrameworkConfig::from_file(path).await?
    } else {
        FrameworkConfig::default()
    };

    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.dev {
        config.dev_mode = true;
    }
    config.validate()?;
    Ok(config)
}

/// 初始化日志系统
fn init_logging(config: &FrameworkConfig) -> Result<LogGuard, Box<dyn std::error::Error>> {
    let mut logger_config = LoggerConfig::from_log_config(&config.logging);
    if config.dev_mode {
        logger_config.verbose = true;
        logger_config.level = "debug".to_string();
    }
    Ok(Logger::init(logger_config)?)
}

/// 加载配置并初始化日志，日志系统就绪后再记录配置来源
async fn prepare(cli: &Cli) -> Result<(FrameworkConfig, LogGuard), Box<dyn std::error::Error>> {
    let config = load_config(cli, &cli.config).await?;
    let guard = init_logging(&config)?;
    match config.config_path {
        Some(ref path) => info!("已加载配置文件: {}", path.display()),
        None => info!("配置文件不存在，使用默认配置: {}", cli.config.display()),
    }
    Ok((config, guard))
}

/// 创建并初始化框架
async fn start_framework(config: FrameworkConfig) -> Result<ModuleFramework, Box<dyn std::error::Error>> {
    let framework = ModuleFramework::new(config)?;
    framework.initialize().await?;
    Ok(framework)
}

/// 打印版本信息
fn print_version() {
    println!();
    println!("Module Framework - 运行时模块框架");
    println!("═══════════════════════════════════════");
    println!("  版本:             {}", module_framework::VERSION);
    println!();
    println!("构建信息:");
    println!("  目标平台:         {}", std::env::consts::ARCH);
    println!("  操作系统:         {}", std::env::consts::OS);
    println!("═══════════════════════════════════════");
    println!();
}

/// 检查配置文件
async fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("检查配置文件: {}", path.display());
    println!();

    if !path.exists() {
        println!("⚠️  警告: 配置文件不存在，将使用默认配置");
        println!();
        print_config(&FrameworkConfig::default());
        return Ok(());
    }

    let config = match FrameworkConfig::from_file(path).await {
        Ok(config) => config,
        Err(e) => {
            println!("❌ 配置文件无效: {}", e);
            return Err(Box::new(e));
        }
    };

    if let Err(e) = config.validate() {
        println!("❌ 配置值无效: {}", e);
        return Err(Box::new(e));
    }

    for manifest in &config.modules.manifests {
        match module_framework::ModuleParser::parse_file(manifest).await {
            Ok(modules) => println!("  清单 {}: {} 个模块", manifest.display(), modules.len()),
            Err(e) => {
                println!("❌ 清单 {} 无效: {}", manifest.display(), e);
                return Err(Box::new(e));
            }
        }
    }

    println!("✅ 配置文件有效！");
    println!();
    print_config(&config);
    Ok(())
}

/// 打印配置内容
fn print_config(config: &FrameworkConfig) {
    println!("配置内容:");
    println!("────────────────────────────────────────");
    println!("  [日志配置]");
    println!("    日志级别:       {}", config.logging.level);
    println!("    文件输出:       {}", if config.logging.file_output { "是" } else { "否" });
    println!("    JSON 格式:      {}", if config.logging.json_format { "是" } else { "否" });
    println!("    轮转策略:       {}", config.logging.rotation);
    println!();
    println!("  [模块配置]");
    println!("    声明模块数:     {}", config.modules.modules.len());
    println!("    自动加载:       {:?}", config.modules.auto_load);
    println!("    清单文件:       {:?}", config.modules.manifests);
    println!();
    println!("  [远程获取]");
    println!("    超时:           {} ms", config.fetch.timeout_ms);
    println!("    User-Agent:     {}", config.fetch.user_agent);
    println!();
    println!("  [其他]");
    println!("    开发模式:       {}", if config.dev_mode { "是" } else { "否" });
    println!("────────────────────────────────────────");
}

/// 打印模块列表
fn print_modules(modules: &[ModuleSummary]) {
    println!();
    println!("模块列表 ({})", modules.len());
    println!("═══════════════════════════════════════");
    for module in modules {
        println!(
            "  {:<20} {:<10} {:<8} 依赖: {:?}",
            module.id, module.version, module.status, module.dependencies
        );
        if let Some(load_ms) = module.load_duration_ms {
            println!("      加载耗时: {:.2} ms", load_ms);
        }
        if let Some(init_ms) = module.init_duration_ms {
            println!("      初始化耗时: {:.2} ms", init_ms);
        }
    }
    println!("═══════════════════════════════════════");
    println!();
}

/// 加载模块并可选调用方法
async fn load_module(
    framework: &ModuleFramework,
    module_id: &str,
    invoke: Option<&str>,
    args: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<serde_json::Value> =
        serde_json::from_str(args).map_err(|e| format!("参数 JSON 解析失败: {}", e))?;

    if let Err(e) = framework.load_module(module_id).await {
        println!("❌ 模块加载失败 [{}]: {}", e.error_code(), e);
        print_modules(&framework.get_modules(false));
        return Err(Box::new(e));
    }

    println!("✅ 模块 {} 已加载", module_id);
    print_modules(&framework.get_modules(true));

    if let Some(method) = invoke {
        let result = framework.call_module_method(module_id, method, args).await?;
        println!("调用结果:");
        println!("────────────────────────────────────────");
        println!("{}", serde_json::to_string_pretty(&result)?);
        println!("────────────────────────────────────────");
    }

    let unloaded = framework.unload_all();
    info!(count = unloaded, "已卸载全部模块");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        // 显示版本信息
        Commands::Version => {
            print_version();
        }

        // 检查配置文件
        Commands::CheckConfig { ref config } => {
            let config_path = config.clone().unwrap_or_else(|| cli.config.clone());
            check_config(&config_path).await?;
        }

        // 列出模块
        Commands::ListModules { active } => {
            let (config, _guard) = prepare(&cli).await?;
            let framework = start_framework(config).await?;
            print_modules(&framework.get_modules(active));
        }

        // 加载顺序
        Commands::Order { ref module_id } => {
            let (config, _guard) = prepare(&cli).await?;
            let framework = start_framework(config).await?;
            let order = framework.load_order(module_id)?;
            println!("{}", order.join(" -> "));
        }

        // 加载模块
        Commands::Load {
            ref module_id,
            ref invoke,
            ref args,
        } => {
            let (config, _guard) = prepare(&cli).await?;
            let framework = start_framework(config).await?;
            load_module(&framework, module_id, invoke.as_deref(), args).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_reports_config_source() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "logging:\n  level: warn\n").unwrap();

        let cli = Cli::try_parse_from(["module-framework", "-c", path.to_str().unwrap(), "version"]).unwrap();
        let config = load_config(&cli, &cli.config).await.unwrap();
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
        assert_eq!(config.logging.level, "warn");

        let missing = temp_dir.path().join("missing.yaml");
        let cli = Cli::try_parse_from([
            "module-framework",
            "-c",
            missing.to_str().unwrap(),
            "-l",
            "error",
            "version",
        ])
        .unwrap();
        let (config, guard) = prepare(&cli).await.unwrap();
        assert!(config.config_path.is_none());
        assert_eq!(config.logging.level, "error");
        assert!(guard.is_active());
    }
}
