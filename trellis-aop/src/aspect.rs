//! 切面（Aspect）定义
//!
//! 切面是横切关注点的模块化：一个切点、一组通知和排序优先级。

use std::fmt;
use std::time::Duration;

use trellis_core::Value;

use crate::advice::Advice;
use crate::pointcut::Pointcut;
use crate::{ErrorInfo, JoinPoint, ProceedingJoinPoint};

/// 默认优先级
pub const DEFAULT_ORDER: i32 = 0;

/// 已注册的切面
pub struct Aspect {
    name: String,
    pointcut: Pointcut,
    advices: Vec<Advice>,
    order: i32,
    /// 注册序号，用于同优先级排序
    sequence: usize,
}

impl Aspect {
    pub(crate) fn new(builder: AspectBuilder, pointcut: Pointcut, sequence: usize) -> Self {
        Self {
            name: builder.name,
            pointcut,
            advices: builder.advices,
            order: builder.order,
            sequence,
        }
    }

    /// 创建切面构建器
    pub fn builder(name: impl Into<String>, pointcut: impl Into<String>) -> AspectBuilder {
        AspectBuilder::new(name, pointcut)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pointcut(&self) -> &Pointcut {
        &self.pointcut
    }

    /// 按声明顺序排列的通知
    pub fn advices(&self) -> &[Advice] {
        &self.advices
    }

    /// 优先级（数字越小越先进入）
    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }
}

impl fmt::Debug for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aspect")
            .field("name", &self.name)
            .field("pointcut", &self.pointcut.expression())
            .field("advices", &self.advices)
            .field("order", &self.order)
            .finish()
    }
}

/// 切面构建器
///
/// 切点表达式在注册到 [`AspectRegistry`](crate::AspectRegistry) 时才解析，
/// 以便引用注册表中的命名切点。
///
/// ```ignore
/// registry.register(
///     Aspect::builder("audit", "execution(* shop..*Service.*(..))")
///         .order(10)
///         .before(|jp| tracing::info!("audit {}", jp)),
/// )?;
/// ```
#[derive(Debug)]
pub struct AspectBuilder {
    name: String,
    pointcut: String,
    advices: Vec<Advice>,
    order: i32,
}

impl AspectBuilder {
    pub fn new(name: impl Into<String>, pointcut: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pointcut: pointcut.into(),
            advices: Vec::new(),
            order: DEFAULT_ORDER,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pointcut_expression(&self) -> &str {
        &self.pointcut
    }

    pub(crate) fn has_advice(&self) -> bool {
        !self.advices.is_empty()
    }

    pub(crate) fn renamed(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    /// 设置优先级
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// 追加通知（保持声明顺序）
    pub fn advice(mut self, advice: Advice) -> Self {
        self.advices.push(advice);
        self
    }

    pub fn advices(mut self, advices: impl IntoIterator<Item = Advice>) -> Self {
        self.advices.extend(advices);
        self
    }

    pub fn before<F>(self, f: F) -> Self
    where
        F: Fn(&JoinPoint) + Send + Sync + 'static,
    {
        self.advice(Advice::before(f))
    }

    pub fn after<F>(self, f: F) -> Self
    where
        F: Fn(&JoinPoint) + Send + Sync + 'static,
    {
        self.advice(Advice::after(f))
    }

    pub fn after_returning<F>(self, f: F) -> Self
    where
        F: Fn(&JoinPoint, &Value) + Send + Sync + 'static,
    {
        self.advice(Advice::after_returning(f))
    }

    pub fn after_throwing<F>(self, f: F) -> Self
    where
        F: Fn(&JoinPoint, &anyhow::Error) + Send + Sync + 'static,
    {
        self.advice(Advice::after_throwing(f))
    }

    pub fn around<F>(self, f: F) -> Self
    where
        F: Fn(&ProceedingJoinPoint<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.advice(Advice::around(f))
    }
}

// ============================================================================
// 预定义的常用切面
// ============================================================================

/// 日志切面 - 记录方法调用
pub struct LoggingAspect {
    pointcut: String,
    log_args: bool,
}

impl LoggingAspect {
    pub fn new(pointcut: impl Into<String>) -> Self {
        Self {
            pointcut: pointcut.into(),
            log_args: false,
        }
    }

    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }
}

impl From<LoggingAspect> for AspectBuilder {
    fn from(aspect: LoggingAspect) -> Self {
        let log_args = aspect.log_args;
        AspectBuilder::new("LoggingAspect", aspect.pointcut)
            .before(move |jp| {
                if log_args {
                    tracing::info!("→ Entering: {} with {} argument(s)", jp, jp.args().len());
                } else {
                    tracing::info!("→ Entering: {}", jp);
                }
            })
            .after(|jp| tracing::info!("← Exiting: {} (took {:?})", jp, jp.elapsed()))
    }
}

/// 性能监控切面
pub struct PerformanceAspect {
    pointcut: String,
    threshold: Duration,
}

impl PerformanceAspect {
    pub fn new(threshold: Duration, pointcut: impl Into<String>) -> Self {
        Self {
            pointcut: pointcut.into(),
            threshold,
        }
    }
}

impl From<PerformanceAspect> for AspectBuilder {
    fn from(aspect: PerformanceAspect) -> Self {
        let threshold = aspect.threshold;
        AspectBuilder::new("PerformanceAspect", aspect.pointcut).after(move |jp| {
            let elapsed = jp.elapsed();
            if elapsed > threshold {
                tracing::warn!(
                    "Slow method detected: {} took {:?} (threshold: {:?})",
                    jp,
                    elapsed,
                    threshold
                );
            }
        })
    }
}

/// 异常处理切面
pub struct ExceptionHandlingAspect {
    pointcut: String,
}

impl ExceptionHandlingAspect {
    pub fn new(pointcut: impl Into<String>) -> Self {
        Self {
            pointcut: pointcut.into(),
        }
    }
}

impl From<ExceptionHandlingAspect> for AspectBuilder {
    fn from(aspect: ExceptionHandlingAspect) -> Self {
        AspectBuilder::new("ExceptionHandlingAspect", aspect.pointcut).after_throwing(|jp, error| {
            let info = ErrorInfo::from_anyhow(error);
            tracing::error!("Exception in {}: {}", jp, info.full_description());
        })
    }
}
