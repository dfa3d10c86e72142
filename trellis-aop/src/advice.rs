//! 通知（Advice）定义
//!
//! 定义了在连接点执行的各种动作。before / after 类通知不能失败，
//! 只有 around 通知可以改变调用结果。

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use trellis_core::Value;

use crate::{JoinPoint, ProceedingJoinPoint};

pub type BeforeFn = Arc<dyn Fn(&JoinPoint) + Send + Sync>;
pub type AfterFn = Arc<dyn Fn(&JoinPoint) + Send + Sync>;
pub type AfterReturningFn = Arc<dyn Fn(&JoinPoint, &Value) + Send + Sync>;
pub type AfterThrowingFn = Arc<dyn Fn(&JoinPoint, &anyhow::Error) + Send + Sync>;
pub type AroundFn = Arc<dyn Fn(&ProceedingJoinPoint<'_>) -> Result<Value> + Send + Sync>;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
}

impl fmt::Display for AdviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AdviceType::Before => "before",
            AdviceType::After => "after",
            AdviceType::AfterReturning => "after-returning",
            AdviceType::AfterThrowing => "after-throwing",
            AdviceType::Around => "around",
        };
        f.write_str(label)
    }
}

/// 通知
#[derive(Clone)]
pub enum Advice {
    Before(BeforeFn),
    After(AfterFn),
    AfterReturning(AfterReturningFn),
    AfterThrowing(AfterThrowingFn),
    Around(AroundFn),
}

impl Advice {
    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint) + Send + Sync + 'static,
    {
        Advice::Before(Arc::new(f))
    }

    pub fn after<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint) + Send + Sync + 'static,
    {
        Advice::After(Arc::new(f))
    }

    pub fn after_returning<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint, &Value) + Send + Sync + 'static,
    {
        Advice::AfterReturning(Arc::new(f))
    }

    pub fn after_throwing<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint, &anyhow::Error) + Send + Sync + 'static,
    {
        Advice::AfterThrowing(Arc::new(f))
    }

    pub fn around<F>(f: F) -> Self
    where
        F: Fn(&ProceedingJoinPoint<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Advice::Around(Arc::new(f))
    }

    /// 获取通知类型
    pub fn advice_type(&self) -> AdviceType {
        match self {
            Advice::Before(_) => AdviceType::Before,
            Advice::After(_) => AdviceType::After,
            Advice::AfterReturning(_) => AdviceType::AfterReturning,
            Advice::AfterThrowing(_) => AdviceType::AfterThrowing,
            Advice::Around(_) => AdviceType::Around,
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advice({})", self.advice_type())
    }
}
