//! 依赖解析辅助类型
//!
//! - [`ResolutionGuard`]：当前线程的解析链，RAII 出栈，用于循环依赖检测
//! - [`Dependencies`]：传给构造函数的已解析依赖
//! - [`LazyBean`]：延迟依赖，首次使用时才解析

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use anyhow::anyhow;
use once_cell::sync::OnceCell;

use crate::bean::BeanKey;
use crate::bean_factory::DefaultListableBeanFactory;
use crate::error::{ContainerError, ContainerResult};
use crate::instance::BeanRef;
use crate::scope::{ContextToken, Scope};

thread_local! {
    /// 每个容器一条解析链（容器 id → 正在创建的 Bean 名称）
    static RESOLUTION_CHAINS: RefCell<HashMap<usize, Vec<String>>> = RefCell::new(HashMap::new());
}

/// 解析链守卫
///
/// 创建时将 Bean 名称压入当前线程的解析链，析构时弹出。
/// 名称已在链中说明出现了循环依赖。
pub(crate) struct ResolutionGuard {
    factory: usize,
}

impl ResolutionGuard {
    pub(crate) fn enter(factory: usize, name: &str) -> ContainerResult<Self> {
        RESOLUTION_CHAINS.with(|chains| {
            let mut chains = chains.borrow_mut();
            let chain = chains.entry(factory).or_default();
            if chain.iter().any(|n| n == name) {
                let mut path = chain.clone();
                path.push(name.to_string());
                tracing::debug!("Circular dependency detected: {}", path.join(" → "));
                return Err(ContainerError::CircularDependency { path });
            }
            chain.push(name.to_string());
            Ok(Self { factory })
        })
    }

    /// 当前线程在该容器上的解析链
    pub(crate) fn chain(factory: usize) -> Vec<String> {
        RESOLUTION_CHAINS.with(|chains| chains.borrow().get(&factory).cloned().unwrap_or_default())
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLUTION_CHAINS.with(|chains| {
            let mut chains = chains.borrow_mut();
            if let Some(chain) = chains.get_mut(&self.factory) {
                chain.pop();
                if chain.is_empty() {
                    chains.remove(&self.factory);
                }
            }
        });
    }
}

/// 单个已解析的依赖
#[derive(Clone)]
pub enum Dependency {
    /// 立即依赖
    Resolved(BeanRef),
    /// 延迟依赖
    Deferred(LazyBean),
}

impl Dependency {
    /// 取得 Bean 引用（延迟依赖在此时解析）
    pub fn bean(&self) -> ContainerResult<BeanRef> {
        match self {
            Dependency::Resolved(bean) => Ok(Arc::clone(bean)),
            Dependency::Deferred(lazy) => lazy.get(),
        }
    }

    /// 以具体类型取得原始实例
    pub fn get<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        let bean = self.bean()?;
        bean.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
            bean: bean.name().to_string(),
            expected: type_name::<T>().to_string(),
        })
    }

    /// 延迟依赖句柄
    pub fn as_lazy(&self) -> Option<&LazyBean> {
        match self {
            Dependency::Resolved(_) => None,
            Dependency::Deferred(lazy) => Some(lazy),
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Resolved(bean) => f.debug_tuple("Resolved").field(&bean.name()).finish(),
            Dependency::Deferred(lazy) => f.debug_tuple("Deferred").field(lazy).finish(),
        }
    }
}

/// 构造函数收到的依赖，按声明顺序排列
#[derive(Debug, Default)]
pub struct Dependencies {
    items: Vec<Dependency>,
}

impl Dependencies {
    pub(crate) fn new(items: Vec<Dependency>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn item(&self, index: usize) -> anyhow::Result<&Dependency> {
        self.items
            .get(index)
            .ok_or_else(|| anyhow!("no dependency #{} (declared {})", index, self.items.len()))
    }

    /// 第 `index` 个依赖的原始实例
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> anyhow::Result<Arc<T>> {
        Ok(self.item(index)?.get::<T>()?)
    }

    /// 第 `index` 个依赖的 Bean 引用
    pub fn bean(&self, index: usize) -> anyhow::Result<BeanRef> {
        Ok(self.item(index)?.bean()?)
    }

    /// 第 `index` 个依赖的延迟句柄
    pub fn lazy(&self, index: usize) -> anyhow::Result<LazyBean> {
        self.item(index)?
            .as_lazy()
            .cloned()
            .ok_or_else(|| anyhow!("dependency #{} is not declared lazy", index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dependency> {
        self.items.iter()
    }
}

struct LazyInner {
    factory: Weak<DefaultListableBeanFactory>,
    /// 持有此句柄的 Bean
    dependent: String,
    key: BeanKey,
    contexts: Vec<ContextToken>,
    resolved: OnceCell<BeanRef>,
}

/// 延迟依赖
///
/// 首次调用 [`LazyBean::get`] 时解析目标。单例目标解析后被缓存；
/// 其他作用域每次重新解析，可以用 [`LazyBean::get_in`] 指定当前上下文。
#[derive(Clone)]
pub struct LazyBean {
    inner: Arc<LazyInner>,
}

impl LazyBean {
    pub(crate) fn new(
        factory: Weak<DefaultListableBeanFactory>,
        dependent: impl Into<String>,
        key: BeanKey,
        contexts: Vec<ContextToken>,
    ) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                factory,
                dependent: dependent.into(),
                key,
                contexts,
                resolved: OnceCell::new(),
            }),
        }
    }

    pub fn key(&self) -> &BeanKey {
        &self.inner.key
    }

    /// 是否已经解析过（仅单例目标会被缓存）
    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.get().is_some()
    }

    /// 使用创建依赖方时的上下文解析目标
    pub fn get(&self) -> ContainerResult<BeanRef> {
        self.get_in(&self.inner.contexts)
    }

    /// 使用给定上下文解析目标
    pub fn get_in(&self, contexts: &[ContextToken]) -> ContainerResult<BeanRef> {
        if let Some(bean) = self.inner.resolved.get() {
            return Ok(Arc::clone(bean));
        }
        let factory = self
            .inner
            .factory
            .upgrade()
            .ok_or(ContainerError::ContainerShutDown)?;
        let bean = factory.resolve_for(&self.inner.dependent, &self.inner.key, contexts)?;
        if bean.scope() == Scope::Singleton {
            return Ok(Arc::clone(self.inner.resolved.get_or_init(|| bean)));
        }
        Ok(bean)
    }

    /// 以具体类型取得原始实例
    pub fn get_as<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        Dependency::Deferred(self.clone()).get::<T>()
    }
}

impl fmt::Debug for LazyBean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyBean")
            .field("dependent", &self.inner.dependent)
            .field("key", &self.inner.key)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
