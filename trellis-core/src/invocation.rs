//! 调用契约
//!
//! Rust 没有运行时动态代理，容器通过显式的 [`Invocable`] 契约暴露 Bean 的方法：
//! 声明类型、方法签名列表，以及按方法名分发的 `invoke`。
//! 只有声明了契约的 Bean 才能被 AOP 代理拦截。

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};

/// 动态参数 / 返回值
pub type Value = Arc<dyn Any + Send + Sync>;

/// 包装为 [`Value`]
pub fn value<T: Any + Send + Sync>(v: T) -> Value {
    Arc::new(v)
}

/// 空返回值
pub fn unit() -> Value {
    Arc::new(())
}

/// 取出第 `index` 个参数并转换为 `T`
pub fn arg<T: Any>(args: &[Value], index: usize) -> Result<&T> {
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow!("missing argument #{} (got {})", index, args.len()))?;
    raw.downcast_ref::<T>()
        .ok_or_else(|| anyhow!("argument #{} is not a {}", index, type_name::<T>()))
}

/// 将返回值转换为 `T`
pub fn cast<T: Any + Send + Sync>(result: Value) -> Result<Arc<T>> {
    result
        .downcast::<T>()
        .map_err(|_| anyhow!("return value is not a {}", type_name::<T>()))
}

/// 方法签名
///
/// `declaring_type` 使用点分路径，例如 `shop.service.OrderService`，
/// 切点表达式按段匹配。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub declaring_type: String,
    pub method_name: String,
    pub param_types: Vec<String>,
    pub return_type: String,
}

impl MethodSignature {
    pub fn new(declaring_type: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            method_name: method_name.into(),
            param_types: Vec::new(),
            return_type: "void".to_string(),
        }
    }

    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.param_types = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    /// 声明类型的简单名称（最后一段）
    pub fn simple_type_name(&self) -> &str {
        self.declaring_type
            .rsplit('.')
            .next()
            .unwrap_or(&self.declaring_type)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{}({})",
            self.return_type,
            self.declaring_type,
            self.method_name,
            self.param_types.join(", ")
        )
    }
}

/// 可调用契约
///
/// # 示例
///
/// ```ignore
/// impl Invocable for OrderService {
///     fn declaring_type(&self) -> &str {
///         "shop.service.OrderService"
///     }
///
///     fn methods(&self) -> Vec<MethodSignature> {
///         vec![MethodSignature::new(self.declaring_type(), "place")
///             .with_params(["String"])
///             .returns("u64")]
///     }
///
///     fn invoke(&self, method: &str, args: &[Value]) -> anyhow::Result<Value> {
///         match method {
///             "place" => Ok(value(self.place(arg::<String>(args, 0)?)?)),
///             other => anyhow::bail!("unknown method {other}"),
///         }
///     }
/// }
/// ```
pub trait Invocable: Send + Sync {
    /// 点分形式的声明类型
    fn declaring_type(&self) -> &str;

    /// 对外暴露的方法签名
    fn methods(&self) -> Vec<MethodSignature>;

    /// 按方法名分发调用
    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value>;

    /// 查找方法签名
    fn signature(&self, method: &str) -> Option<MethodSignature> {
        self.methods().into_iter().find(|m| m.method_name == method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_downcast() {
        let args = vec![value(42u64), value("hello".to_string())];
        assert_eq!(*arg::<u64>(&args, 0).unwrap(), 42);
        assert_eq!(arg::<String>(&args, 1).unwrap(), "hello");
        assert!(arg::<u64>(&args, 1).is_err());
        assert!(arg::<u64>(&args, 2).is_err());
    }

    #[test]
    fn test_signature_display_and_simple_name() {
        let sig = MethodSignature::new("shop.service.OrderService", "place")
            .with_params(["String", "u32"])
            .returns("u64");
        assert_eq!(sig.simple_type_name(), "OrderService");
        assert_eq!(
            sig.to_string(),
            "u64 shop.service.OrderService.place(String, u32)"
        );
    }

    #[test]
    fn test_cast_return_value() {
        let result = value(7i32);
        assert_eq!(*cast::<i32>(result.clone()).unwrap(), 7);
        assert!(cast::<u8>(result).is_err());
    }
}
