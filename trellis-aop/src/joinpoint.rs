//! 连接点（JoinPoint）定义
//!
//! 连接点表示一次经过代理的方法调用

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use trellis_core::invocation::{self, MethodSignature, Value};

/// 连接点信息
///
/// 包含方法调用时的上下文信息
#[derive(Clone)]
pub struct JoinPoint {
    /// 目标 Bean 名称
    bean_name: Arc<str>,

    /// 方法签名
    signature: Arc<MethodSignature>,

    /// 调用参数
    args: Vec<Value>,

    /// 调用时间戳
    timestamp: Instant,
}

impl JoinPoint {
    /// 创建新的连接点
    pub fn new(bean_name: Arc<str>, signature: Arc<MethodSignature>, args: Vec<Value>) -> Self {
        Self {
            bean_name,
            signature,
            args,
            timestamp: Instant::now(),
        }
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// 声明类型（点分形式）
    pub fn target_type(&self) -> &str {
        &self.signature.declaring_type
    }

    pub fn method_name(&self) -> &str {
        &self.signature.method_name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// 取出第 `index` 个参数
    pub fn arg<T: Any>(&self, index: usize) -> Result<&T> {
        invocation::arg::<T>(&self.args, index)
    }

    /// 获取调用时间戳
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// 从进入代理到现在经过的时间
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }

    /// `OrderService.place` 形式的简短描述
    pub fn short_signature(&self) -> String {
        format!("{}.{}", self.signature.simple_type_name(), self.signature.method_name)
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("bean_name", &self.bean_name)
            .field("signature", &self.signature.to_string())
            .field("args", &self.args.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.bean_name, self.short_signature())
    }
}

/// 环绕通知的执行链
///
/// `proceed` 继续执行链中的下一层（更内层的环绕通知或目标方法），
/// 可以不调用、调用一次或多次。
pub struct ProceedingJoinPoint<'a> {
    join_point: &'a JoinPoint,
    args: &'a [Value],
    next: &'a dyn Fn(&[Value]) -> Result<Value>,
}

impl<'a> ProceedingJoinPoint<'a> {
    pub(crate) fn new(
        join_point: &'a JoinPoint,
        args: &'a [Value],
        next: &'a dyn Fn(&[Value]) -> Result<Value>,
    ) -> Self {
        Self {
            join_point,
            args,
            next,
        }
    }

    /// 以当前参数继续执行
    pub fn proceed(&self) -> Result<Value> {
        (self.next)(self.args)
    }

    /// 以替换后的参数继续执行
    pub fn proceed_with(&self, args: Vec<Value>) -> Result<Value> {
        (self.next)(&args)
    }

    /// 获取连接点信息
    pub fn join_point(&self) -> &JoinPoint {
        self.join_point
    }

    /// 本层收到的参数（外层环绕通知可能已替换）
    pub fn args(&self) -> &[Value] {
        self.args
    }

    /// 取出本层的第 `index` 个参数
    pub fn arg<T: Any>(&self, index: usize) -> Result<&T> {
        invocation::arg::<T>(self.args, index)
    }
}

impl fmt::Debug for ProceedingJoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("join_point", &self.join_point)
            .field("args", &self.args.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use trellis_core::invocation::value;

    fn join_point() -> JoinPoint {
        let signature = MethodSignature::new("shop.service.OrderService", "place")
            .with_params(["u32"])
            .returns("u64");
        JoinPoint::new(Arc::from("orders"), Arc::new(signature), vec![value(3u32)])
    }

    #[test]
    fn test_join_point_accessors() {
        let jp = join_point();
        assert_eq!(jp.bean_name(), "orders");
        assert_eq!(jp.method_name(), "place");
        assert_eq!(jp.target_type(), "shop.service.OrderService");
        assert_eq!(*jp.arg::<u32>(0).unwrap(), 3);
        assert_eq!(jp.to_string(), "orders#OrderService.place");
    }

    #[test]
    fn test_proceed_can_be_called_repeatedly() {
        let jp = join_point();
        let calls = Cell::new(0);
        let next = |args: &[Value]| -> Result<Value> {
            calls.set(calls.get() + 1);
            let quantity = invocation::arg::<u32>(args, 0)?;
            Ok(value(u64::from(*quantity) * 10))
        };
        let pjp = ProceedingJoinPoint::new(&jp, jp.args(), &next);

        let first = invocation::cast::<u64>(pjp.proceed().unwrap()).unwrap();
        let second = invocation::cast::<u64>(pjp.proceed_with(vec![value(5u32)]).unwrap()).unwrap();

        assert_eq!(*first, 30);
        assert_eq!(*second, 50);
        assert_eq!(calls.get(), 2);
    }
}
