//! Trellis AOP - 面向切面编程支持
//!
//! 为容器中的 Bean 提供显式的方法拦截，支持：
//! - 声明式切面定义（切点 + 通知 + 优先级）
//! - 多种通知类型（Before、After、Around、AfterReturning、AfterThrowing）
//! - 切点表达式：`execution`、`within`、`bean`、`&&`、`||`、`!` 和命名切点
//! - 通知链在代理创建时固定，调用时不再匹配切点
//! - 通过 BeanPostProcessor 自动为声明了调用契约的 Bean 应用 AOP

pub mod advice;
pub mod aspect;
pub mod bean_post_processor;
pub mod error;
pub mod error_info;
pub mod joinpoint;
pub mod plugin;
pub mod pointcut;
pub mod proxy;
pub mod registry;

// 重新导出核心类型
pub use advice::{Advice, AdviceType};
pub use aspect::{
    Aspect, AspectBuilder, ExceptionHandlingAspect, LoggingAspect, PerformanceAspect,
};
pub use bean_post_processor::AopBeanPostProcessor;
pub use error::{AopError, AopResult};
pub use error_info::ErrorInfo;
pub use joinpoint::{JoinPoint, ProceedingJoinPoint};
pub use plugin::AopPlugin;
pub use pointcut::{Pointcut, PointcutExpression};
pub use proxy::{MethodChain, ProxyFactory, ProxyHandle};
pub use registry::AspectRegistry;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::{Advice, AdviceType};
    pub use crate::aspect::{
        Aspect, AspectBuilder, ExceptionHandlingAspect, LoggingAspect, PerformanceAspect,
    };
    pub use crate::bean_post_processor::AopBeanPostProcessor;
    pub use crate::error::{AopError, AopResult};
    pub use crate::error_info::ErrorInfo;
    pub use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
    pub use crate::plugin::AopPlugin;
    pub use crate::pointcut::Pointcut;
    pub use crate::registry::AspectRegistry;
}
