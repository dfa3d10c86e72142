//! Bean 实例
//!
//! 调用方拿到的是 [`BeanRef`]。实例由作用域存储持有，解析器不保留引用。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::bean::{DestroyFn, Hook};
use crate::error::ContainerError;
use crate::invocation::{cast, Invocable, Value};
use crate::lifecycle::LifecycleState;
use crate::scope::Scope;

/// 共享的 Bean 实例
pub type BeanRef = Arc<BeanInstance>;

/// 受容器管理的 Bean 实例
pub struct BeanInstance {
    name: String,
    scope: Scope,
    type_name: &'static str,
    instance: Value,
    target: Option<Arc<dyn Invocable>>,
    proxy: Option<Arc<dyn Invocable>>,
    state: Mutex<LifecycleState>,
    pub(crate) destroy: Option<Hook<DestroyFn>>,
}

impl BeanInstance {
    pub(crate) fn new(
        name: impl Into<String>,
        scope: Scope,
        type_name: &'static str,
        instance: Value,
        target: Option<Arc<dyn Invocable>>,
        proxy: Option<Arc<dyn Invocable>>,
        destroy: Option<Hook<DestroyFn>>,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            type_name,
            instance,
            target,
            proxy,
            state: Mutex::new(LifecycleState::Ready),
            destroy,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached<T: Any + Send + Sync>(name: &str, scope: Scope, instance: T) -> Self {
        Self::new(name, scope, std::any::type_name::<T>(), Arc::new(instance), None, None, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    pub(crate) fn state_cell(&self) -> &Mutex<LifecycleState> {
        &self.state
    }

    /// 是否被切面代理
    pub fn is_proxied(&self) -> bool {
        self.proxy.is_some()
    }

    /// 原始实例（不经过切面）
    pub fn raw(&self) -> &Value {
        &self.instance
    }

    /// 以具体类型取得原始实例（不经过切面）
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.instance).downcast::<T>().ok()
    }

    /// 对外的调用契约：有代理时返回代理，否则返回原始契约
    pub fn contract(&self) -> Option<Arc<dyn Invocable>> {
        self.proxy.as_ref().or(self.target.as_ref()).cloned()
    }

    /// 未经代理的调用契约
    pub fn target(&self) -> Option<Arc<dyn Invocable>> {
        self.target.clone()
    }

    /// 通过调用契约调用方法，切面在此生效
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Value> {
        let contract = self.contract().ok_or_else(|| ContainerError::NotInvocable {
            bean: self.name.clone(),
        })?;
        if contract.signature(method).is_none() {
            return Err(ContainerError::NoSuchMethod {
                bean: self.name.clone(),
                method: method.to_string(),
            }
            .into());
        }
        contract.invoke(method, args)
    }

    /// 调用并将返回值转换为 `R`
    pub fn invoke_as<R: Any + Send + Sync>(&self, method: &str, args: &[Value]) -> Result<Arc<R>> {
        cast::<R>(self.invoke(method, args)?)
    }

    /// 是否与另一个引用指向同一实例
    pub fn same_instance(&self, other: &BeanInstance) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl fmt::Debug for BeanInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanInstance")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("type_name", &self.type_name)
            .field("state", &self.state())
            .field("proxied", &self.is_proxied())
            .finish()
    }
}
