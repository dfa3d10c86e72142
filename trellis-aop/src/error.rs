//! AOP 错误类型

use trellis_core::ContainerError;

/// AOP 结果类型
pub type AopResult<T> = std::result::Result<T, AopError>;

/// AOP 错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AopError {
    /// 切点表达式无法解析（含未定义的命名切点）
    #[error("Invalid pointcut expression '{expression}': {reason}")]
    PointcutParse { expression: String, reason: String },

    /// 切面没有任何通知
    #[error("Aspect '{aspect}' on '{pointcut}' declares no advice")]
    NoAdvice { aspect: String, pointcut: String },
}

impl AopError {
    pub(crate) fn parse(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        AopError::PointcutParse {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

impl From<AopError> for ContainerError {
    fn from(err: AopError) -> Self {
        ContainerError::Config(err.to_string())
    }
}
