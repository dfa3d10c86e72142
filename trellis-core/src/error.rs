//! 容器错误类型
//!
//! 所有容器操作都返回 [`ContainerResult`]。错误按种类区分，
//! 调用方可以直接 `match` 而不需要比较字符串。
//!
//! 用户代码（构造函数、生命周期回调、业务方法、通知）使用 `anyhow::Error`，
//! 容器在包装这些错误时保留原始错误作为 `source`。

use std::fmt;

use crate::scope::{ContextToken, Scope};

/// 容器统一结果类型
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 容器错误
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// 同名 Bean 定义已存在（且新定义未声明覆盖）
    #[error("Bean definition '{name}' already exists")]
    DuplicateDefinition { name: String },

    /// 找不到 Bean
    #[error("No bean named '{name}' is defined")]
    NoSuchBean { name: String },

    /// 按类型查找时存在多个候选且没有唯一的 primary
    #[error("No unique bean of type '{type_name}': candidates are [{}]", candidates.join(", "))]
    AmbiguousBean {
        type_name: String,
        candidates: Vec<String>,
    },

    /// 非延迟依赖形成环
    #[error("Circular dependency detected: {}", path.join(" → "))]
    CircularDependency { path: Vec<String> },

    /// 构造函数失败
    #[error("Failed to create bean '{bean}' (resolution chain: {})", chain.join(" → "))]
    BeanCreationFailed {
        bean: String,
        chain: Vec<String>,
        #[source]
        source: anyhow::Error,
    },

    /// init 回调或 before-initialization 处理器失败
    #[error("Initialization of bean '{bean}' failed in '{hook}'")]
    InitializationFailed {
        bean: String,
        hook: String,
        #[source]
        source: anyhow::Error,
    },

    /// 销毁阶段收集到的 destroy 回调失败（不影响其余 Bean 的销毁）
    #[error("{} destroy hook(s) failed: [{}]", failures.len(), DestroyFailure::names(failures))]
    DestroyHookFailed { failures: Vec<DestroyFailure> },

    /// 容器已开始解析 Bean，不再接受定义变更
    #[error("Cannot register bean definition '{name}': configuration is frozen")]
    ConfigurationFrozen { name: String },

    /// Bean 定义自身不合法
    #[error("Invalid bean definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    /// Bean 实例不是期望的类型
    #[error("Bean '{bean}' is not of type '{expected}'")]
    TypeMismatch { bean: String, expected: String },

    /// 当前调用没有激活对应作用域的上下文
    #[error("Bean '{bean}' has scope {scope} but no matching context is active")]
    ScopeNotActive { bean: String, scope: Scope },

    /// 上下文令牌未进入或已退出
    #[error("Context {token} is not active")]
    ContextNotActive { token: ContextToken },

    /// 上下文令牌重复进入
    #[error("Context {token} is already active")]
    ContextAlreadyActive { token: ContextToken },

    /// 长生命周期的 Bean 不能立即注入短生命周期的 Bean
    #[error("Bean '{bean}' ({scope}) cannot eagerly depend on '{dependency}' ({dependency_scope}); declare the dependency lazy")]
    ScopeMismatch {
        bean: String,
        scope: Scope,
        dependency: String,
        dependency_scope: Scope,
    },

    /// 容器已关闭
    #[error("Container has been shut down")]
    ContainerShutDown,

    /// Bean 没有声明调用契约
    #[error("Bean '{bean}' does not expose an invocation contract")]
    NotInvocable { bean: String },

    /// 调用契约中不存在该方法
    #[error("Bean '{bean}' has no method '{method}'")]
    NoSuchMethod { bean: String, method: String },

    /// 配置加载失败
    #[error("Configuration error: {0}")]
    Config(String),

    /// 日志系统初始化失败
    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),
}

impl ContainerError {
    /// 创建失败的构造错误
    pub(crate) fn creation_failed(
        bean: impl Into<String>,
        chain: Vec<String>,
        source: anyhow::Error,
    ) -> Self {
        ContainerError::BeanCreationFailed {
            bean: bean.into(),
            chain,
            source,
        }
    }

    /// 是否为解析阶段错误（失败只影响单次 get_bean 调用）
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            ContainerError::NoSuchBean { .. }
                | ContainerError::AmbiguousBean { .. }
                | ContainerError::CircularDependency { .. }
                | ContainerError::BeanCreationFailed { .. }
                | ContainerError::InitializationFailed { .. }
                | ContainerError::ScopeNotActive { .. }
                | ContainerError::ScopeMismatch { .. }
                | ContainerError::TypeMismatch { .. }
        )
    }
}

/// 单个 destroy 回调失败的记录
#[derive(Debug)]
pub struct DestroyFailure {
    /// Bean 名称
    pub bean: String,
    /// destroy 回调标识
    pub hook: String,
    /// 原始错误
    pub error: anyhow::Error,
}

impl DestroyFailure {
    fn names(failures: &[DestroyFailure]) -> String {
        failures
            .iter()
            .map(|f| f.bean.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for DestroyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}: {:#}", self.bean, self.hook, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_dependency_message_lists_path() {
        let err = ContainerError::CircularDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a → b → a");
    }

    #[test]
    fn test_ambiguous_bean_lists_candidates() {
        let err = ContainerError::AmbiguousBean {
            type_name: "Repo".into(),
            candidates: vec!["jdbcRepo".into(), "memoryRepo".into()],
        };
        let message = err.to_string();
        assert!(message.contains("jdbcRepo"));
        assert!(message.contains("memoryRepo"));
    }

    #[test]
    fn test_creation_failure_keeps_source() {
        let err = ContainerError::creation_failed(
            "db",
            vec!["service".into(), "db".into()],
            anyhow::anyhow!("connection refused"),
        );
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection refused"));
        assert!(err.to_string().contains("service → db"));
        assert!(err.is_resolution_error());
    }

    #[test]
    fn test_destroy_failures_are_named() {
        let err = ContainerError::DestroyHookFailed {
            failures: vec![DestroyFailure {
                bean: "pool".into(),
                hook: "close".into(),
                error: anyhow::anyhow!("busy"),
            }],
        };
        assert!(err.to_string().contains("pool"));
        assert!(!err.is_resolution_error());
    }
}
