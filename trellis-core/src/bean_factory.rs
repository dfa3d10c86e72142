//! Bean Factory - 依赖解析器
//!
//! 负责按需构造 Bean：查缓存 → 检测循环 → 按声明顺序解析依赖 → 构造 →
//! 生命周期 → 代理 → 按作用域缓存。

use std::any::{type_name, Any, TypeId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::bean::{BeanDefinition, BeanKey, DependencyRef};
use crate::error::{ContainerError, ContainerResult};
use crate::instance::BeanRef;
use crate::lifecycle::{BeanPostProcessor, LifecycleOrchestrator};
use crate::registry::BeanDefinitionRegistry;
use crate::resolution::{Dependencies, Dependency, LazyBean, ResolutionGuard};
use crate::scope::{ContextToken, Scope, ScopeManager};
use crate::utils::dependency::{self, DependencyValidationError};

static NEXT_FACTORY_ID: AtomicUsize = AtomicUsize::new(1);

/// 当前解析链上存活时间最长的缓存作用域
///
/// 链上任何被缓存的 Bean 都会间接持有后续的立即依赖，
/// 原型不缓存，但经过原型的依赖仍受上游单例或会话作用域约束。
#[derive(Clone, Copy)]
struct ScopeBound<'a> {
    bean: &'a str,
    scope: Scope,
}

impl<'a> ScopeBound<'a> {
    fn widen(bound: Option<ScopeBound<'a>>, definition: &'a BeanDefinition) -> Option<ScopeBound<'a>> {
        let own = ScopeBound {
            bean: definition.name(),
            scope: definition.scope(),
        };
        match bound {
            _ if !own.scope.is_cached() => bound,
            Some(outer) if !own.scope.outlives(outer.scope) => Some(outer),
            _ => Some(own),
        }
    }
}

/// BeanFactory - 最基础的容器接口
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean
    fn get_bean(&self, name: &str) -> ContainerResult<BeanRef>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;
}

/// BeanFactoryExt - BeanFactory 的扩展 trait
///
/// 提供泛型方法，不能作为 trait object 使用
pub trait BeanFactoryExt: BeanFactory {
    /// 通过类型获取 Bean
    fn get_bean_by_type<T: Any + Send + Sync>(&self) -> ContainerResult<BeanRef>;

    /// 通过名称获取 Bean 的原始实例（不经过切面）
    fn get_bean_as<T: Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let bean = self.get_bean(name)?;
        bean.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
            bean: name.to_string(),
            expected: type_name::<T>().to_string(),
        })
    }

    /// 检查是否包含指定类型的 Bean
    fn contains_bean_by_type<T: Any + Send + Sync>(&self) -> bool;
}

/// ListableBeanFactory - 可列举的 Bean 工厂
pub trait ListableBeanFactory: BeanFactory {
    /// 获取所有 Bean 的名称（注册顺序）
    fn get_bean_names(&self) -> Vec<String>;

    /// 获取指定类型的所有 Bean 名称
    fn get_bean_names_for_type(&self, type_id: TypeId) -> Vec<String>;

    /// 获取 Bean 定义的数量
    fn get_bean_definition_count(&self) -> usize;
}

/// DefaultListableBeanFactory - 默认的 Bean 工厂实现
pub struct DefaultListableBeanFactory {
    /// 容器实例标识（区分各容器的解析链）
    id: usize,

    /// 自身的弱引用，供延迟依赖回调
    me: Weak<DefaultListableBeanFactory>,

    /// Bean 定义注册表
    registry: BeanDefinitionRegistry,

    /// 作用域存储
    scopes: ScopeManager,

    /// 生命周期与后置处理器
    lifecycle: LifecycleOrchestrator,

    /// 解析持读锁（可重入），关闭持写锁
    gate: RwLock<()>,

    shut_down: AtomicBool,
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            id: NEXT_FACTORY_ID.fetch_add(1, Ordering::Relaxed),
            me: me.clone(),
            registry: BeanDefinitionRegistry::new(),
            scopes: ScopeManager::new(),
            lifecycle: LifecycleOrchestrator::default(),
            gate: RwLock::new(()),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &BeanDefinitionRegistry {
        &self.registry
    }

    /// 注册 Bean 定义
    pub fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()> {
        if self.is_shut_down() {
            return Err(ContainerError::ContainerShutDown);
        }
        self.registry.register(definition)
    }

    /// 添加 BeanPostProcessor
    pub fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        self.lifecycle.add_processor(processor);
    }

    pub fn bean_post_processor_count(&self) -> usize {
        self.lifecycle.processor_count()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// 在给定上下文中解析 Bean
    ///
    /// 首次解析会冻结注册表。
    pub fn resolve(&self, key: &BeanKey, contexts: &[ContextToken]) -> ContainerResult<BeanRef> {
        // 关闭过程中（例如 destroy 回调里）不能再等待读锁
        if self.is_shut_down() {
            return Err(ContainerError::ContainerShutDown);
        }
        let _gate = self.gate.read_recursive();
        if self.is_shut_down() {
            return Err(ContainerError::ContainerShutDown);
        }
        self.registry.freeze();

        tracing::trace!("Requesting bean {}", key);
        let definition = self.registry.lookup(key)?;
        self.resolve_definition(&definition, contexts, None)
    }

    /// 延迟依赖首次解析时登记依赖关系，保证依赖方先被销毁
    pub(crate) fn resolve_for(
        &self,
        dependent: &str,
        key: &BeanKey,
        contexts: &[ContextToken],
    ) -> ContainerResult<BeanRef> {
        let bean = self.resolve(key, contexts)?;
        self.scopes.dependents().record(bean.name(), dependent);
        Ok(bean)
    }

    /// 通过名称在给定上下文中获取 Bean
    pub fn get_bean_in(&self, name: &str, contexts: &[ContextToken]) -> ContainerResult<BeanRef> {
        self.resolve(&BeanKey::name(name), contexts)
    }

    fn resolve_definition(
        &self,
        definition: &Arc<BeanDefinition>,
        contexts: &[ContextToken],
        bound: Option<ScopeBound<'_>>,
    ) -> ContainerResult<BeanRef> {
        let name = definition.name();
        let scope = definition.scope();

        if let Some(bean) = self.scopes.cached(name, scope, contexts)? {
            tracing::trace!("Returning cached instance of {} bean '{}'", scope, name);
            return Ok(bean);
        }

        // 守卫覆盖整个创建过程（包括生命周期回调），
        // 同线程重入同名 Bean 在拿创建锁之前就会被识别为循环
        let _guard = ResolutionGuard::enter(self.id, name)?;

        match scope {
            Scope::Singleton => self.scopes.singletons().get_or_create(
                name,
                || {
                    tracing::info!("Creating shared instance of singleton bean '{}'", name);
                    self.create_bean(definition, contexts, bound)
                },
                |orphan| self.discard(orphan, ContainerError::ContainerShutDown),
            ),
            Scope::Prototype => {
                tracing::debug!("Creating new instance of prototype bean '{}'", name);
                self.create_bean(definition, contexts, bound)
            }
            Scope::Request | Scope::Session => {
                let store = self.scopes.context_store(name, scope, contexts)?;
                store.get_or_create(
                    name,
                    || {
                        tracing::debug!("Creating {} scoped instance of bean '{}'", scope, name);
                        self.create_bean(definition, contexts, bound)
                    },
                    |orphan| {
                        self.discard(
                            orphan,
                            ContainerError::ScopeNotActive {
                                bean: name.to_string(),
                                scope,
                            },
                        )
                    },
                )
            }
        }
    }

    /// 存储在创建期间关闭：刚创建的实例直接销毁
    fn discard(&self, orphan: Option<BeanRef>, error: ContainerError) -> ContainerError {
        if let Some(bean) = orphan {
            for failure in self.lifecycle.destroy_all(vec![bean]) {
                tracing::warn!("Discarded bean '{}' failed to destroy: {:#}", failure.bean, failure.error);
            }
        }
        error
    }

    fn create_bean(
        &self,
        definition: &BeanDefinition,
        contexts: &[ContextToken],
        bound: Option<ScopeBound<'_>>,
    ) -> ContainerResult<BeanRef> {
        let bound = ScopeBound::widen(bound, definition);
        let constructor_args = definition
            .dependencies()
            .iter()
            .map(|dependency| self.resolve_dependency(definition, dependency, contexts, bound))
            .collect::<ContainerResult<Vec<_>>>()?;

        let raw = (definition.recipe)(&Dependencies::new(constructor_args))
            .map_err(|err| self.construction_error(definition, err))?;

        let setter_args = definition
            .setters
            .iter()
            .map(|setter| self.resolve_dependency(definition, &setter.dependency, contexts, bound))
            .collect::<ContainerResult<Vec<_>>>()?;

        let instance = self.lifecycle.initialize(definition, raw, &setter_args)?;
        tracing::debug!("Bean '{}' is ready", definition.name());
        Ok(Arc::new(instance))
    }

    fn resolve_dependency(
        &self,
        owner: &BeanDefinition,
        dependency: &DependencyRef,
        contexts: &[ContextToken],
        bound: Option<ScopeBound<'_>>,
    ) -> ContainerResult<Dependency> {
        if dependency.is_lazy() {
            return Ok(Dependency::Deferred(LazyBean::new(
                self.me.clone(),
                owner.name(),
                dependency.key().clone(),
                contexts.to_vec(),
            )));
        }

        let target = self.registry.lookup(dependency.key())?;
        if let Some(bound) = bound.filter(|bound| bound.scope.outlives(target.scope())) {
            return Err(ContainerError::ScopeMismatch {
                bean: bound.bean.to_string(),
                scope: bound.scope,
                dependency: target.name().to_string(),
                dependency_scope: target.scope(),
            });
        }
        let bean = self.resolve_definition(&target, contexts, bound)?;
        self.scopes.dependents().record(target.name(), owner.name());
        Ok(Dependency::Resolved(bean))
    }

    /// 构造函数里因解析依赖（例如延迟依赖）产生的容器错误原样传播，
    /// 其余错误包装为 `BeanCreationFailed`
    fn construction_error(&self, definition: &BeanDefinition, err: anyhow::Error) -> ContainerError {
        match err.downcast::<ContainerError>() {
            Ok(inner) if inner.is_resolution_error() => inner,
            Ok(inner) => self.creation_failed(definition, inner.into()),
            Err(other) => self.creation_failed(definition, other),
        }
    }

    fn creation_failed(&self, definition: &BeanDefinition, source: anyhow::Error) -> ContainerError {
        let chain = ResolutionGuard::chain(self.id);
        tracing::debug!(
            "Failed to create bean '{}' (chain: {}): {:#}",
            definition.name(),
            chain.join(" → "),
            source
        );
        ContainerError::creation_failed(definition.name(), chain, source)
    }

    /// 预实例化所有非延迟单例，依赖在前
    ///
    /// 返回新创建的单例数量。
    pub fn preinstantiate_singletons(&self) -> ContainerResult<usize> {
        let graph = self.registry.dependency_graph()?;
        let order = dependency::topological_sort(&graph).unwrap_or_else(|remaining| {
            // 存在环时退回注册顺序，由解析过程报告具体路径
            tracing::debug!("Dependency graph has a cycle among [{}]", remaining.join(", "));
            graph.iter().map(|(name, _)| name.clone()).collect()
        });

        let mut created = 0;
        for name in order {
            let definition = self.registry.lookup(&BeanKey::name(&name))?;
            if definition.scope() != Scope::Singleton || definition.is_lazy_init() {
                continue;
            }
            if self.scopes.singletons().get(&name).is_none() {
                self.resolve(&BeanKey::name(&name), &[])?;
                created += 1;
            }
        }
        tracing::info!("Pre-instantiated {} singleton bean(s)", created);
        Ok(created)
    }

    /// 静态校验依赖图：缺失的依赖与立即依赖形成的环
    pub fn validate_dependencies(&self) -> ContainerResult<()> {
        let graph = self.registry.dependency_graph()?;
        dependency::validate_dependency_graph(&graph).map_err(|err| {
            tracing::debug!("Dependency validation failed: {}", err);
            match err {
                DependencyValidationError::MissingDependency { missing, .. } => {
                    ContainerError::NoSuchBean { name: missing }
                }
                DependencyValidationError::CircularDependency { cycle } => {
                    ContainerError::CircularDependency { path: cycle }
                }
            }
        })
    }

    /// 进入 request / session 上下文
    pub fn enter_context(&self, token: &ContextToken) -> ContainerResult<()> {
        if self.is_shut_down() {
            return Err(ContainerError::ContainerShutDown);
        }
        let _gate = self.gate.read_recursive();
        if self.is_shut_down() {
            return Err(ContainerError::ContainerShutDown);
        }
        self.scopes.enter(token)
    }

    /// 退出上下文，按创建逆序销毁其中的实例
    pub fn exit_context(&self, token: &ContextToken) -> ContainerResult<()> {
        if self.is_shut_down() {
            return Err(ContainerError::ContextNotActive {
                token: token.clone(),
            });
        }
        let _gate = self.gate.read_recursive();
        let beans = self.scopes.exit(token)?;
        tracing::debug!("Destroying {} bean(s) of context {}", beans.len(), token);
        let failures = self.lifecycle.destroy_all(beans);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContainerError::DestroyHookFailed { failures })
        }
    }

    /// 关闭容器
    ///
    /// 等待进行中的解析结束，先退出所有仍打开的上下文，再按创建逆序销毁单例。
    /// 重复调用无效果。
    pub fn destroy_singletons(&self) -> ContainerResult<()> {
        let _gate = self.gate.write();
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut failures = Vec::new();
        for token in self.scopes.active_contexts() {
            if let Ok(beans) = self.scopes.exit(&token) {
                tracing::debug!("Closing context {} at shutdown", token);
                failures.extend(self.lifecycle.destroy_all(beans));
            }
        }

        let singletons = self.scopes.drain_singletons();
        tracing::info!("Destroying {} singleton bean(s)", singletons.len());
        failures.extend(self.lifecycle.destroy_all(singletons));

        if failures.is_empty() {
            Ok(())
        } else {
            tracing::warn!("{} destroy hook(s) failed during shutdown", failures.len());
            Err(ContainerError::DestroyHookFailed { failures })
        }
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<BeanRef> {
        self.resolve(&BeanKey::name(name), &[])
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.registry.contains(name)
    }
}

impl BeanFactoryExt for DefaultListableBeanFactory {
    fn get_bean_by_type<T: Any + Send + Sync>(&self) -> ContainerResult<BeanRef> {
        self.resolve(&BeanKey::of_type::<T>(), &[])
    }

    fn contains_bean_by_type<T: Any + Send + Sync>(&self) -> bool {
        !self.registry.names_for_type(TypeId::of::<T>()).is_empty()
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn get_bean_names(&self) -> Vec<String> {
        self.registry.names()
    }

    fn get_bean_names_for_type(&self, type_id: TypeId) -> Vec<String> {
        self.registry.names_for_type(type_id)
    }

    fn get_bean_definition_count(&self) -> usize {
        self.registry.count()
    }
}
