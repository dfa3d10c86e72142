//! 日志配置
//!
//! 基于 `tracing-subscriber` 安装全局订阅者。配置可以来自代码、
//! 环境变量（`RUST_LOG` / `LOG_LEVEL` / `LOG_FORMAT`）或 TOML 的 `[logging]` 段：
//!
//! ```toml
//! [logging]
//! level = "info"
//! container_level = "trace"   # 只作用于 trellis_core / trellis_aop
//! format = "json"
//! install = true              # 构建上下文时安装订阅者
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use crate::error::{ContainerError, ContainerResult};

/// 容器自身日志的 target
const CONTAINER_TARGETS: [&str; 2] = ["trellis_core", "trellis_aop"];

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        if wanted == "warning" {
            return Ok(LogLevel::Warn);
        }
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == wanted)
            .ok_or_else(|| format!("Invalid log level: {}", s))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 紧凑格式（默认）
    #[default]
    Compact,
    /// 完整格式（带时间、级别、目标）
    Full,
    /// JSON 格式
    Json,
    /// 美化格式（适合开发）
    Pretty,
}

impl LogFormat {
    const ALL: [LogFormat; 4] = [
        LogFormat::Compact,
        LogFormat::Full,
        LogFormat::Json,
        LogFormat::Pretty,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LogFormat::ALL
            .into_iter()
            .find(|format| format.as_str() == wanted)
            .ok_or_else(|| format!("Invalid log format: {}", s))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[logging]` 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 构建上下文时是否安装全局订阅者，宿主程序自带订阅者时可关闭
    pub install: bool,

    /// 全局级别
    pub level: LogLevel,

    /// 容器内部（解析、生命周期、切面织入）的级别，缺省时跟随 `level`
    pub container_level: Option<LogLevel>,

    pub format: LogFormat,

    /// 输出 target（模块路径）
    pub show_target: bool,

    /// 输出线程 ID 与线程名，排查并发创建单例时有用
    pub show_threads: bool,

    /// 完整的 `EnvFilter` 指令，设置后忽略上面的级别
    /// 例如："trellis_core=debug,trellis_aop=trace"
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            install: true,
            level: LogLevel::Info,
            container_level: None,
            format: LogFormat::Compact,
            show_target: false,
            show_threads: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(mut self, install: bool) -> Self {
        self.install = install;
        self
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// 单独调整容器内部日志的级别
    pub fn container_level(mut self, level: LogLevel) -> Self {
        self.container_level = Some(level);
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_threads(mut self, show: bool) -> Self {
        self.show_threads = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 默认配置叠加环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 用环境变量覆盖当前配置，无法解析的值被忽略
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(directives) = std::env::var("RUST_LOG") {
            self.filter = Some(directives);
        }
        if let Some(level) = env_value::<LogLevel>("LOG_LEVEL") {
            self.level = level;
        }
        if let Some(format) = env_value::<LogFormat>("LOG_FORMAT") {
            self.format = format;
        }
        self
    }

    /// 生成 `EnvFilter` 指令
    pub fn directives(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        let mut directives = vec![self.level.to_string()];
        if let Some(level) = self.container_level {
            directives.extend(CONTAINER_TARGETS.iter().map(|target| format!("{target}={level}")));
        }
        directives.join(",")
    }

    fn env_filter(&self) -> EnvFilter {
        // 指令无法解析时退回全局级别
        EnvFilter::try_new(self.directives()).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }

    /// 安装全局订阅者
    ///
    /// 全局订阅者只能安装一次，重复调用返回 `LoggingInitFailed`。
    pub fn init(self) -> ContainerResult<()> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_target(self.show_target)
            .with_thread_ids(self.show_threads)
            .with_thread_names(self.show_threads);

        let installed = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Full => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
        installed.map_err(|err| ContainerError::LoggingInitFailed(err.to_string()))?;

        tracing::debug!("Logging initialized ({}, {})", self.directives(), self.format);
        Ok(())
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}
