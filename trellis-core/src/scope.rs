//! 作用域管理
//!
//! 决定 Bean 实例的复用策略：
//! - 单例：容器生命周期内唯一，首次解析时创建
//! - 原型：每次解析都创建新实例，容器不持有
//! - request / session：每个上下文令牌一个实例，退出上下文时销毁
//!
//! 单例与上下文存储共用 [`InstanceStore`]：按 Bean 名称加创建锁，
//! 同名并发请求等待首个创建者完成，不同名称互不阻塞。

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{ContainerError, ContainerResult};
use crate::instance::BeanRef;

/// Bean 的作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// 单例模式 - 容器中只有一个实例
    #[default]
    Singleton,

    /// 原型模式 - 每次请求都创建新实例
    Prototype,

    /// 请求作用域 - 每个 request 上下文一个实例
    Request,

    /// 会话作用域 - 每个 session 上下文一个实例
    Session,
}

impl Scope {
    /// 该作用域对应的上下文类型（单例、原型没有）
    pub fn context_kind(&self) -> Option<ContextKind> {
        match self {
            Scope::Request => Some(ContextKind::Request),
            Scope::Session => Some(ContextKind::Session),
            Scope::Singleton | Scope::Prototype => None,
        }
    }

    /// 是否缓存实例
    pub fn is_cached(&self) -> bool {
        !matches!(self, Scope::Prototype)
    }

    /// 实例存活时间是否长于 `other`（原型不参与比较）
    pub fn outlives(&self, other: Scope) -> bool {
        fn rank(scope: Scope) -> Option<u8> {
            match scope {
                Scope::Singleton => Some(3),
                Scope::Session => Some(2),
                Scope::Request => Some(1),
                Scope::Prototype => None,
            }
        }
        matches!((rank(*self), rank(other)), (Some(a), Some(b)) if a > b)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Singleton => write!(f, "singleton"),
            Scope::Prototype => write!(f, "prototype"),
            Scope::Request => write!(f, "request"),
            Scope::Session => write!(f, "session"),
        }
    }
}

/// 上下文类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Request,
    Session,
}

/// 外部上下文令牌
///
/// 由调用方（例如 Web 分发层）创建，通过 `enter_context` / `exit_context`
/// 界定 request / session 作用域实例的生命周期。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextToken {
    kind: ContextKind,
    id: Arc<str>,
}

impl ContextToken {
    /// 创建 request 令牌
    pub fn request(id: impl AsRef<str>) -> Self {
        Self {
            kind: ContextKind::Request,
            id: Arc::from(id.as_ref()),
        }
    }

    /// 创建 session 令牌
    pub fn session(id: impl AsRef<str>) -> Self {
        Self {
            kind: ContextKind::Session,
            id: Arc::from(id.as_ref()),
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ContextKind::Request => write!(f, "request:{}", self.id),
            ContextKind::Session => write!(f, "session:{}", self.id),
        }
    }
}

#[derive(Default)]
struct StoreState {
    instances: HashMap<String, BeanRef>,
    /// 创建顺序，销毁时逆序
    order: Vec<String>,
    closed: bool,
}

/// 实例存储
///
/// 使用双重检查的按名称创建锁保证同一名称只构造一次。
pub(crate) struct InstanceStore {
    label: String,
    state: RwLock<StoreState>,
    creation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl InstanceStore {
    pub(crate) fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: RwLock::new(StoreState::default()),
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<BeanRef> {
        self.state.read().instances.get(name).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.read().instances.len()
    }

    fn creation_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.creation_locks.lock();
        Arc::clone(locks.entry(name.to_string()).or_default())
    }

    /// 没有其他等待者时移除创建锁
    fn release_creation_lock(&self, name: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.creation_locks.lock();
        // 一份在表里，一份是 `lock` 本身
        if Arc::strong_count(&lock) == 2 {
            locks.remove(name);
        }
    }

    /// 获取或创建实例
    ///
    /// `create` 只会在持有该名称的创建锁、且再次确认缓存未命中后调用。
    /// 创建失败时不缓存任何内容。存储已关闭时返回 `on_closed` 的错误；
    /// 若关闭发生在创建期间，刚创建的实例交给 `on_closed` 收尾。
    pub(crate) fn get_or_create<F, C>(
        &self,
        name: &str,
        create: F,
        on_closed: C,
    ) -> ContainerResult<BeanRef>
    where
        F: FnOnce() -> ContainerResult<BeanRef>,
        C: FnOnce(Option<BeanRef>) -> ContainerError,
    {
        if let Some(bean) = self.get(name) {
            return Ok(bean);
        }

        let lock = self.creation_lock(name);
        let result = {
            let _creating = lock.lock();
            self.create_locked(name, create, on_closed)
        };
        self.release_creation_lock(name, lock);
        result
    }

    fn create_locked<F, C>(&self, name: &str, create: F, on_closed: C) -> ContainerResult<BeanRef>
    where
        F: FnOnce() -> ContainerResult<BeanRef>,
        C: FnOnce(Option<BeanRef>) -> ContainerError,
    {
        {
            let state = self.state.read();
            if let Some(bean) = state.instances.get(name) {
                tracing::debug!("Bean '{}' was created concurrently in {}", name, self.label);
                return Ok(Arc::clone(bean));
            }
            if state.closed {
                return Err(on_closed(None));
            }
        }

        let bean = create()?;

        let mut state = self.state.write();
        if state.closed {
            drop(state);
            tracing::warn!(
                "Store {} closed while '{}' was being created; tearing the instance down",
                self.label,
                name
            );
            return Err(on_closed(Some(bean)));
        }
        state.instances.insert(name.to_string(), Arc::clone(&bean));
        state.order.push(name.to_string());
        Ok(bean)
    }

    /// 关闭存储并按创建逆序取出全部实例
    pub(crate) fn drain_for_destruction(&self) -> Vec<BeanRef> {
        let mut state = self.state.write();
        state.closed = true;
        let order = std::mem::take(&mut state.order);
        let mut instances = std::mem::take(&mut state.instances);
        order
            .iter()
            .rev()
            .filter_map(|name| instances.remove(name))
            .collect()
    }
}

/// 依赖方登记：被依赖的 Bean 名称 → 依赖它的 Bean 名称
///
/// 延迟依赖在首次使用时才登记，所以不能只靠创建顺序决定销毁顺序。
#[derive(Default)]
pub(crate) struct DependentBeans {
    edges: RwLock<HashMap<String, Vec<String>>>,
}

impl DependentBeans {
    pub(crate) fn record(&self, dependency: &str, dependent: &str) {
        if dependency == dependent {
            return;
        }
        let mut edges = self.edges.write();
        let dependents = edges.entry(dependency.to_string()).or_default();
        if !dependents.iter().any(|name| name == dependent) {
            tracing::trace!("Bean '{}' depends on '{}'", dependent, dependency);
            dependents.push(dependent.to_string());
        }
    }

    pub(crate) fn dependents_of(&self, dependency: &str) -> Vec<String> {
        self.edges.read().get(dependency).cloned().unwrap_or_default()
    }

    /// 调整销毁顺序：依赖方先于被依赖者销毁，
    /// 没有依赖关系的实例保持输入顺序（创建逆序）
    pub(crate) fn destruction_order(&self, beans: Vec<BeanRef>) -> Vec<BeanRef> {
        let edges = self.edges.read();
        let mut pending: HashMap<String, BeanRef> = beans
            .iter()
            .map(|bean| (bean.name().to_string(), Arc::clone(bean)))
            .collect();
        let mut ordered = Vec::with_capacity(beans.len());
        for bean in &beans {
            schedule(bean.name(), &edges, &mut pending, &mut ordered);
        }
        ordered
    }
}

fn schedule(
    name: &str,
    edges: &HashMap<String, Vec<String>>,
    pending: &mut HashMap<String, BeanRef>,
    ordered: &mut Vec<BeanRef>,
) {
    // 先移出再递归，延迟依赖形成的环不会无限展开
    let Some(bean) = pending.remove(name) else {
        return;
    };
    for dependent in edges.get(name).into_iter().flatten() {
        schedule(dependent, edges, pending, ordered);
    }
    ordered.push(bean);
}

struct ContextEntry {
    sequence: u64,
    store: Arc<InstanceStore>,
}

/// 作用域管理器
pub(crate) struct ScopeManager {
    singletons: InstanceStore,
    dependents: DependentBeans,
    contexts: RwLock<HashMap<ContextToken, ContextEntry>>,
    next_sequence: AtomicU64,
}

impl ScopeManager {
    pub(crate) fn new() -> Self {
        Self {
            singletons: InstanceStore::new("singleton store"),
            dependents: DependentBeans::default(),
            contexts: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
        }
    }

    pub(crate) fn singletons(&self) -> &InstanceStore {
        &self.singletons
    }

    pub(crate) fn dependents(&self) -> &DependentBeans {
        &self.dependents
    }

    /// 关闭单例存储，返回待销毁实例（依赖方在前）
    pub(crate) fn drain_singletons(&self) -> Vec<BeanRef> {
        self.dependents
            .destruction_order(self.singletons.drain_for_destruction())
    }

    pub(crate) fn enter(&self, token: &ContextToken) -> ContainerResult<()> {
        let mut contexts = self.contexts.write();
        if contexts.contains_key(token) {
            return Err(ContainerError::ContextAlreadyActive {
                token: token.clone(),
            });
        }
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        contexts.insert(
            token.clone(),
            ContextEntry {
                sequence,
                store: Arc::new(InstanceStore::new(token.to_string())),
            },
        );
        tracing::debug!("Entered context {}", token);
        Ok(())
    }

    /// 退出上下文，返回待销毁实例（依赖方在前，其余按创建逆序）
    pub(crate) fn exit(&self, token: &ContextToken) -> ContainerResult<Vec<BeanRef>> {
        let entry = self
            .contexts
            .write()
            .remove(token)
            .ok_or_else(|| ContainerError::ContextNotActive {
                token: token.clone(),
            })?;
        tracing::debug!("Exiting context {}", token);
        Ok(self
            .dependents
            .destruction_order(entry.store.drain_for_destruction()))
    }

    /// 当前激活的上下文，后进入的排在前面
    pub(crate) fn active_contexts(&self) -> Vec<ContextToken> {
        let contexts = self.contexts.read();
        let mut active: Vec<_> = contexts
            .iter()
            .map(|(token, entry)| (entry.sequence, token.clone()))
            .collect();
        active.sort_by(|a, b| b.0.cmp(&a.0));
        active.into_iter().map(|(_, token)| token).collect()
    }

    /// 为给定作用域选出调用方提供的上下文存储
    pub(crate) fn context_store(
        &self,
        bean: &str,
        scope: Scope,
        contexts: &[ContextToken],
    ) -> ContainerResult<Arc<InstanceStore>> {
        let kind = scope.context_kind().ok_or_else(|| ContainerError::ScopeNotActive {
            bean: bean.to_string(),
            scope,
        })?;
        let token = contexts
            .iter()
            .find(|token| token.kind() == kind)
            .ok_or_else(|| ContainerError::ScopeNotActive {
                bean: bean.to_string(),
                scope,
            })?;
        self.contexts
            .read()
            .get(token)
            .map(|entry| Arc::clone(&entry.store))
            .ok_or_else(|| ContainerError::ContextNotActive {
                token: token.clone(),
            })
    }

    /// 查询可直接返回的已缓存实例
    pub(crate) fn cached(
        &self,
        name: &str,
        scope: Scope,
        contexts: &[ContextToken],
    ) -> ContainerResult<Option<BeanRef>> {
        match scope {
            Scope::Singleton => Ok(self.singletons.get(name)),
            Scope::Prototype => Ok(None),
            Scope::Request | Scope::Session => {
                Ok(self.context_store(name, scope, contexts)?.get(name))
            }
        }
    }
}
