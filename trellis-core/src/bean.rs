//! Bean 定义
//!
//! [`BeanDefinition`] 描述如何创建和管理一个 Bean：构造函数、依赖、作用域、
//! 生命周期回调以及可选的调用契约。定义通过带类型参数的
//! [`BeanDefinitionBuilder`] 创建，注册时擦除为 `Any`。

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::invocation::{Invocable, Value};
use crate::resolution::{Dependencies, Dependency};
use crate::scope::Scope;
use crate::utils::naming;
use crate::IntoResult;

/// 类型擦除后的构造函数
pub(crate) type Recipe = Arc<dyn Fn(&Dependencies) -> Result<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// 类型擦除后的 setter 注入
pub(crate) type SetterFn = Arc<dyn Fn(&mut (dyn Any + Send + Sync), &Dependency) -> Result<()> + Send + Sync>;

/// 类型擦除后的初始化回调
pub(crate) type InitFn = Arc<dyn Fn(&mut (dyn Any + Send + Sync)) -> Result<()> + Send + Sync>;

/// 类型擦除后的销毁回调
pub(crate) type DestroyFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<()> + Send + Sync>;

/// 调用契约适配器
pub(crate) type ContractFn = Arc<dyn Fn(Value) -> Option<Arc<dyn Invocable>> + Send + Sync>;

/// Bean 查找键：按名称或按类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BeanKey {
    Name(String),
    Type { id: TypeId, name: &'static str },
}

impl BeanKey {
    pub fn name(name: impl Into<String>) -> Self {
        BeanKey::Name(name.into())
    }

    pub fn of_type<T: Any>() -> Self {
        BeanKey::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

impl fmt::Display for BeanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeanKey::Name(name) => write!(f, "{}", name),
            BeanKey::Type { name, .. } => write!(f, "<{}>", name),
        }
    }
}

/// 依赖引用
///
/// 默认立即解析；`lazy()` 的依赖注入一个 [`LazyBean`](crate::resolution::LazyBean)，
/// 首次使用时才解析，可用于打破循环依赖。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    key: BeanKey,
    lazy: bool,
}

impl DependencyRef {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            key: BeanKey::name(name),
            lazy: false,
        }
    }

    pub fn of_type<T: Any>() -> Self {
        Self {
            key: BeanKey::of_type::<T>(),
            lazy: false,
        }
    }

    /// 标记为延迟依赖
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn key(&self) -> &BeanKey {
        &self.key
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }
}

impl From<&str> for DependencyRef {
    fn from(name: &str) -> Self {
        DependencyRef::name(name)
    }
}

impl From<String> for DependencyRef {
    fn from(name: String) -> Self {
        DependencyRef::name(name)
    }
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lazy {
            write!(f, "{} (lazy)", self.key)
        } else {
            write!(f, "{}", self.key)
        }
    }
}

/// setter 注入
#[derive(Clone)]
pub(crate) struct SetterInjection {
    pub(crate) dependency: DependencyRef,
    pub(crate) apply: SetterFn,
}

/// 具名回调
#[derive(Clone)]
pub(crate) struct Hook<F> {
    pub(crate) name: String,
    pub(crate) callback: F,
}

/// Bean 定义 - 描述如何创建和管理 Bean
///
/// 注册后不可变。
#[derive(Clone)]
pub struct BeanDefinition {
    pub(crate) name: String,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) scope: Scope,
    pub(crate) recipe: Recipe,
    pub(crate) dependencies: Vec<DependencyRef>,
    pub(crate) setters: Vec<SetterInjection>,
    pub(crate) init: Option<Hook<InitFn>>,
    pub(crate) destroy: Option<Hook<DestroyFn>>,
    pub(crate) contract: Option<ContractFn>,
    pub(crate) primary: bool,
    pub(crate) lazy_init: bool,
    pub(crate) allow_override: bool,
}

impl BeanDefinition {
    /// 创建指定名称的 Bean 定义
    ///
    /// `recipe` 按声明顺序接收已解析的构造依赖。
    pub fn builder<T, F>(name: impl Into<String>, recipe: F) -> BeanDefinitionBuilder<T>
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies) -> Result<T> + Send + Sync + 'static,
    {
        BeanDefinitionBuilder::new(name.into(), recipe)
    }

    /// 以类型名的 camelCase 形式作为 Bean 名称（`UserService` → `userService`）
    pub fn of_type<T, F>(recipe: F) -> BeanDefinitionBuilder<T>
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies) -> Result<T> + Send + Sync + 'static,
    {
        let name = naming::to_camel_case(naming::simple_type_name(type_name::<T>()));
        BeanDefinitionBuilder::new(name, recipe)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 构造依赖（声明顺序）
    pub fn dependencies(&self) -> &[DependencyRef] {
        &self.dependencies
    }

    /// 构造依赖与 setter 依赖
    pub fn all_dependencies(&self) -> impl Iterator<Item = &DependencyRef> {
        self.dependencies
            .iter()
            .chain(self.setters.iter().map(|s| &s.dependency))
    }

    pub fn init_hook_name(&self) -> Option<&str> {
        self.init.as_ref().map(|h| h.name.as_str())
    }

    pub fn destroy_hook_name(&self) -> Option<&str> {
        self.destroy.as_ref().map(|h| h.name.as_str())
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_lazy_init(&self) -> bool {
        self.lazy_init
    }

    pub fn allows_override(&self) -> bool {
        self.allow_override
    }

    pub fn has_contract(&self) -> bool {
        self.contract.is_some()
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("type_name", &self.type_name)
            .field("scope", &self.scope)
            .field("dependencies", &self.dependencies)
            .field("setters", &self.setters.len())
            .field("init", &self.init_hook_name())
            .field("destroy", &self.destroy_hook_name())
            .field("primary", &self.primary)
            .field("lazy_init", &self.lazy_init)
            .field("invocable", &self.has_contract())
            .finish()
    }
}

/// Bean 定义构建器
///
/// # 示例
///
/// ```ignore
/// let definition = BeanDefinition::builder("orderService", |deps| {
///     Ok(OrderService::new(deps.get::<OrderRepository>(0)?))
/// })
/// .with_dependency("orderRepository")
/// .with_init("warm_up", |service: &mut OrderService| service.warm_up())
/// .with_destroy("flush", |service: &OrderService| service.flush())
/// .invocable();
///
/// context.register(definition)?;
/// ```
pub struct BeanDefinitionBuilder<T> {
    definition: BeanDefinition,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> BeanDefinitionBuilder<T> {
    fn new<F>(name: String, recipe: F) -> Self
    where
        F: Fn(&Dependencies) -> Result<T> + Send + Sync + 'static,
    {
        let recipe: Recipe = Arc::new(move |deps: &Dependencies| {
            recipe(deps).map(|instance| Box::new(instance) as Box<dyn Any + Send + Sync>)
        });
        Self {
            definition: BeanDefinition {
                name,
                type_id: TypeId::of::<T>(),
                type_name: type_name::<T>(),
                scope: Scope::default(),
                recipe,
                dependencies: Vec::new(),
                setters: Vec::new(),
                init: None,
                destroy: None,
                contract: None,
                primary: false,
                lazy_init: false,
                allow_override: false,
            },
            _marker: PhantomData,
        }
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.definition.scope = scope;
        self
    }

    /// 追加一个构造依赖
    pub fn with_dependency(mut self, dependency: impl Into<DependencyRef>) -> Self {
        self.definition.dependencies.push(dependency.into());
        self
    }

    /// 追加多个构造依赖
    pub fn with_dependencies<I, D>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<DependencyRef>,
    {
        self.definition
            .dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// setter 注入，在构造之后、初始化回调之前执行
    pub fn with_setter<F>(mut self, dependency: impl Into<DependencyRef>, setter: F) -> Self
    where
        F: Fn(&mut T, &Dependency) -> Result<()> + Send + Sync + 'static,
    {
        let apply: SetterFn = Arc::new(move |target, dependency| {
            let target = target
                .downcast_mut::<T>()
                .ok_or_else(|| anyhow!("setter target is not a {}", type_name::<T>()))?;
            setter(target, dependency)
        });
        self.definition.setters.push(SetterInjection {
            dependency: dependency.into(),
            apply,
        });
        self
    }

    /// 初始化回调（@PostConstruct），可以返回 `()` 或 `anyhow::Result<()>`
    pub fn with_init<F, R>(mut self, hook: impl Into<String>, init: F) -> Self
    where
        F: Fn(&mut T) -> R + Send + Sync + 'static,
        R: IntoResult,
    {
        let callback: InitFn = Arc::new(move |target| {
            let target = target
                .downcast_mut::<T>()
                .ok_or_else(|| anyhow!("init target is not a {}", type_name::<T>()))?;
            init(target).into_result()
        });
        self.definition.init = Some(Hook {
            name: hook.into(),
            callback,
        });
        self
    }

    /// 销毁回调（@PreDestroy）
    pub fn with_destroy<F, R>(mut self, hook: impl Into<String>, destroy: F) -> Self
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: IntoResult,
    {
        let callback: DestroyFn = Arc::new(move |target| {
            let target = target
                .downcast_ref::<T>()
                .ok_or_else(|| anyhow!("destroy target is not a {}", type_name::<T>()))?;
            destroy(target).into_result()
        });
        self.definition.destroy = Some(Hook {
            name: hook.into(),
            callback,
        });
        self
    }

    /// 按类型查找存在多个候选时优先选择此定义
    pub fn primary(mut self) -> Self {
        self.definition.primary = true;
        self
    }

    /// 单例不参与 `refresh()` 预实例化
    pub fn lazy_init(mut self) -> Self {
        self.definition.lazy_init = true;
        self
    }

    /// 允许替换同名定义
    pub fn allow_override(mut self) -> Self {
        self.definition.allow_override = true;
        self
    }

    pub fn build(self) -> BeanDefinition {
        self.definition
    }
}

impl<T: Invocable + Any> BeanDefinitionBuilder<T> {
    /// 通过 [`Invocable`] 契约暴露方法，使 Bean 可以被切面拦截
    pub fn invocable(mut self) -> Self {
        let contract: ContractFn = Arc::new(|instance: Value| {
            instance
                .downcast::<T>()
                .ok()
                .map(|typed| typed as Arc<dyn Invocable>)
        });
        self.definition.contract = Some(contract);
        self
    }
}

impl<T: Any + Send + Sync> From<BeanDefinitionBuilder<T>> for BeanDefinition {
    fn from(builder: BeanDefinitionBuilder<T>) -> Self {
        builder.build()
    }
}
