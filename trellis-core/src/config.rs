//! 容器配置
//!
//! 从 TOML 加载，所有字段都有默认值：
//!
//! ```toml
//! [container]
//! name = "shop"
//! preinstantiate_singletons = true
//!
//! [logging]
//! level = "debug"
//! format = "json"
//!
//! [aop]
//! enabled = true
//! tie_break = "registration-order"
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{ContainerError, ContainerResult};
use crate::logging::LoggingConfig;

/// 完整配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub container: ContainerSettings,
    pub logging: LoggingConfig,
    pub aop: AopSettings,
}

/// `[container]` 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContainerSettings {
    /// 容器名称，用于日志
    pub name: String,

    /// 构建上下文时是否预实例化非延迟单例
    pub preinstantiate_singletons: bool,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            name: "trellis".to_string(),
            preinstantiate_singletons: false,
        }
    }
}

/// `[aop]` 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AopSettings {
    /// 是否安装 AOP 后置处理器
    pub enabled: bool,

    /// 同优先级切面的排序规则
    pub tie_break: TieBreak,
}

impl Default for AopSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tie_break: TieBreak::default(),
        }
    }
}

/// 同优先级切面的排序规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// 先注册的先进入（默认）
    #[default]
    RegistrationOrder,
    /// 后注册的先进入
    ReverseRegistration,
    /// 按切面名称字典序
    Name,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration-order" => Ok(TieBreak::RegistrationOrder),
            "reverse-registration" => Ok(TieBreak::ReverseRegistration),
            "name" => Ok(TieBreak::Name),
            _ => Err(format!("Invalid tie-break rule: {}", s)),
        }
    }
}

impl fmt::Display for TieBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TieBreak::RegistrationOrder => write!(f, "registration-order"),
            TieBreak::ReverseRegistration => write!(f, "reverse-registration"),
            TieBreak::Name => write!(f, "name"),
        }
    }
}

impl ContainerConfig {
    /// 解析 TOML 字符串
    pub fn from_toml_str(content: &str) -> ContainerResult<Self> {
        toml::from_str(content)
            .map_err(|e| ContainerError::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// 读取 TOML 文件
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        tracing::debug!("Loaded container configuration from {}", path.display());
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogFormat, LogLevel};

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::default();
        assert_eq!(config.container.name, "trellis");
        assert!(!config.container.preinstantiate_singletons);
        assert!(config.aop.enabled);
        assert_eq!(config.aop.tie_break, TieBreak::RegistrationOrder);
    }

    #[test]
    fn test_parse_full_document() {
        let config = ContainerConfig::from_toml_str(
            r#"
            [container]
            name = "shop"
            preinstantiate_singletons = true

            [logging]
            level = "debug"
            format = "json"

            [aop]
            enabled = false
            tie_break = "reverse-registration"
            "#,
        )
        .unwrap();

        assert_eq!(config.container.name, "shop");
        assert!(config.container.preinstantiate_singletons);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(!config.aop.enabled);
        assert_eq!(config.aop.tie_break, TieBreak::ReverseRegistration);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = ContainerConfig::from_toml_str("[aop]\ntie_break = \"name\"").unwrap();
        assert_eq!(config.aop.tie_break, TieBreak::Name);
        assert!(config.aop.enabled);
        assert_eq!(config.container.name, "trellis");
    }

    #[test]
    fn test_invalid_document() {
        let err = ContainerConfig::from_toml_str("[aop]\ntie_break = \"random\"").unwrap_err();
        assert!(matches!(err, ContainerError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ContainerConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ContainerError::Config(message) if message.contains("not/here")));
    }

    #[test]
    fn test_tie_break_from_str() {
        assert_eq!("name".parse::<TieBreak>().unwrap(), TieBreak::Name);
        assert_eq!(TieBreak::ReverseRegistration.to_string(), "reverse-registration");
        assert!("random".parse::<TieBreak>().is_err());
    }
}
