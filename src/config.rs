//! 配置系统模块
//!
//! 统一处理 TOML 配置文件、环境变量、命令行参数

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use config::{Config as ConfigBuilder, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::engine::EngineOptions;
use crate::geo::DEFAULT_POINT_LIMIT;
use crate::health::{ScoringWeights, Tier};

/// 命令行参数
#[derive(Parser, Debug, Clone)]
#[command(name = "risk-map-engine")]
#[command(about = "健康风险分级与地理聚合引擎")]
#[command(version)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 日志级别
    #[arg(short, long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// 数据库 URL
    #[arg(short, long)]
    pub database_url: Option<String>,

    /// 子命令
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// 支持的命令
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 运行刷新服务
    Run,
    /// 摄取快照文件（JSON 数组）
    Ingest {
        /// 文件路径
        file: PathBuf,
    },
    /// 输出当前地图 JSON
    Map {
        /// 只输出该等级的点
        #[arg(short, long)]
        tier: Option<Tier>,
        /// 只输出此时间之后更新的点（RFC 3339）
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// 只输出此时间之前更新的点（RFC 3339）
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        /// 最多输出的点数
        #[arg(long, default_value_t = DEFAULT_POINT_LIMIT)]
        limit: usize,
    },
    /// 输出主体的风险报告
    Report {
        /// 主体标识
        subject: String,
    },
    /// 对单个快照评分（不修改状态）
    Score {
        /// 文件路径
        file: PathBuf,
    },
    /// 重置配置
    ResetConfig,
}

/// 日志级别
#[derive(clap::ValueEnum, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// 主配置结构
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 评分权重
    pub scoring: ScoringWeights,
    /// 刷新配置
    pub refresh: RefreshConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 数据库 URL
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
}

/// 刷新配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// 定时刷新间隔（秒）
    pub interval_secs: u64,
    /// 写入后立即刷新
    pub refresh_on_write: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 日志格式
    pub format: LogFormat,
    /// 日志输出目录
    pub directory: Option<PathBuf>,
}

/// 日志格式
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 简洁格式
    Compact,
    /// 详细格式
    Full,
    /// JSON 格式
    Json,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:risk-map.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            refresh_on_write: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            directory: None,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// 使用指定的 CLI 参数加载配置
    pub fn load_with_cli(cli: Cli) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        // 1. 首先加载默认配置
        builder = builder.add_source(config::Config::try_from(&Config::default())?);

        // 2. 加载系统配置文件
        if let Some(system_config) = Self::get_system_config_path() {
            if system_config.exists() {
                builder = builder.add_source(File::from(system_config));
            }
        }

        // 3. 加载用户配置文件
        if let Some(user_config) = Self::get_user_config_path() {
            if user_config.exists() {
                builder = builder.add_source(File::from(user_config));
            }
        }

        // 4. 加载指定的配置文件
        if let Some(config_path) = cli.config {
            if config_path.exists() {
                builder = builder.add_source(File::from(config_path));
            } else {
                return Err(anyhow!("配置文件不存在: {}", config_path.display()));
            }
        }

        // 5. 加载环境变量（前缀 RISK_MAP_）
        builder = builder.add_source(
            Environment::with_prefix("RISK_MAP")
                .prefix_separator("_")
                .separator("__"),
        );

        // 6. 构建配置
        let mut config: Config = builder.build()?.try_deserialize()?;

        // 7. 应用命令行参数覆盖
        if let Some(log_level) = cli.log_level {
            config.logging.level = log_level;
        }

        if let Some(database_url) = cli.database_url {
            config.database.url = database_url;
        }

        // 8. 验证配置
        config.validate()?;

        Ok(config)
    }

    /// 获取系统配置文件路径
    pub fn get_system_config_path() -> Option<PathBuf> {
        Some(PathBuf::from("/etc/risk-map-engine/config.toml"))
    }

    /// 获取用户配置文件路径
    pub fn get_user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "risk-map-engine")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// 生成默认配置文件
    pub fn generate_default_config() -> Result<String> {
        let config = Config::default();
        toml::to_string_pretty(&config).map_err(|e| anyhow!("生成默认配置失败: {}", e))
    }

    /// 保存配置到文件
    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| anyhow!("序列化配置失败: {}", e))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// 引擎构造参数
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            weights: self.scoring.clone(),
            refresh_on_write: self.refresh.refresh_on_write,
        }
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(anyhow!("数据库 URL 不能为空"));
        }

        if self.refresh.interval_secs == 0 {
            return Err(anyhow!("刷新间隔不能为 0"));
        }

        if !self.scoring.is_valid() {
            return Err(anyhow!("每种慢性病的权重必须在 1 到 3 之间"));
        }

        if let Some(log_dir) = &self.logging.directory {
            if !log_dir.exists() {
                std::fs::create_dir_all(log_dir)?;
            }
        }

        Ok(())
    }

    /// 初始化日志系统
    ///
    /// 返回的 guard 必须在进程生命周期内保持存活，否则文件日志会丢失
    pub fn init_logging(&self) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
        let level_filter = EnvFilter::builder()
            .with_default_directive(Level::from(self.logging.level.clone()).into())
            .from_env_lossy();

        let (file_writer, guard) = match &self.logging.directory {
            Some(log_dir) => {
                std::fs::create_dir_all(log_dir)?;
                let file_appender = tracing_appender::rolling::daily(log_dir, "risk-map-engine.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                (Some(non_blocking), Some(guard))
            }
            None => (None, None),
        };

        let file_layer = file_writer.map(|writer| fmt::layer().with_ansi(false).with_writer(writer));
        let registry = tracing_subscriber::registry()
            .with(level_filter)
            .with(file_layer);

        // 根据格式选择控制台层
        let result = match self.logging.format {
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
            LogFormat::Full => registry.with(fmt::layer()).try_init(),
            LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        };
        result.map_err(|e| anyhow!("日志系统初始化失败: {}", e))?;

        tracing::info!("日志系统已初始化，级别: {:?}", self.logging.level);
        Ok(guard)
    }
}
