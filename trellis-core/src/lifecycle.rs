//! 生命周期管理
//!
//! 实例按固定顺序推进：
//! `Constructed → DependenciesInjected → PostConstructed → Ready → PreDestroyed → Destroyed`
//!
//! 初始化前后提供 [`BeanPostProcessor`] 扩展点，类似 Spring 的 BeanPostProcessor。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::BeanDefinition;
use crate::error::{ContainerError, ContainerResult, DestroyFailure};
use crate::instance::BeanInstance;
use crate::invocation::{Invocable, Value};
use crate::resolution::Dependency;

/// Bean 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Constructed,
    DependenciesInjected,
    PostConstructed,
    Ready,
    PreDestroyed,
    Destroyed,
}

impl LifecycleState {
    /// 下一个状态，`Destroyed` 之后没有
    pub fn next(self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Constructed => Some(LifecycleState::DependenciesInjected),
            LifecycleState::DependenciesInjected => Some(LifecycleState::PostConstructed),
            LifecycleState::PostConstructed => Some(LifecycleState::Ready),
            LifecycleState::Ready => Some(LifecycleState::PreDestroyed),
            LifecycleState::PreDestroyed => Some(LifecycleState::Destroyed),
            LifecycleState::Destroyed => None,
        }
    }

    /// 只允许推进到紧邻的下一个状态
    fn advance(&mut self, to: LifecycleState, bean: &str) {
        debug_assert_eq!(self.next(), Some(to), "illegal lifecycle transition");
        tracing::trace!("Bean '{}': {} -> {}", bean, self, to);
        *self = to;
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::Constructed => "constructed",
            LifecycleState::DependenciesInjected => "dependencies-injected",
            LifecycleState::PostConstructed => "post-constructed",
            LifecycleState::Ready => "ready",
            LifecycleState::PreDestroyed => "pre-destroyed",
            LifecycleState::Destroyed => "destroyed",
        };
        f.write_str(label)
    }
}

/// BeanPostProcessor trait
///
/// 在 Bean 初始化的不同阶段提供钩子
///
/// 使用场景：
/// - AOP 代理创建
/// - 属性校验
/// - 注入增强
pub trait BeanPostProcessor: Send + Sync {
    /// 在初始化回调（init）之前调用，可以修改原始实例
    fn post_process_before_initialization(
        &self,
        _bean: &mut (dyn Any + Send + Sync),
        _bean_name: &str,
    ) -> ContainerResult<()> {
        Ok(())
    }

    /// 在 Bean 进入 Ready 之后调用，只对声明了调用契约的 Bean 生效
    ///
    /// 返回的契约替换原契约（例如 AOP 代理）。
    fn post_process_after_initialization(
        &self,
        bean: Arc<dyn Invocable>,
        _bean_name: &str,
    ) -> ContainerResult<Arc<dyn Invocable>> {
        Ok(bean)
    }

    /// 获取处理器的名称（用于日志和调试）
    fn name(&self) -> &str {
        "BeanPostProcessor"
    }

    /// 获取处理器的优先级（数字越小优先级越高）
    fn order(&self) -> i32 {
        1000
    }
}

/// 生命周期编排器
#[derive(Default)]
pub(crate) struct LifecycleOrchestrator {
    processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,
}

impl LifecycleOrchestrator {
    pub(crate) fn add_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        let mut processors = self.processors.write();
        tracing::debug!(
            "Registered BeanPostProcessor '{}' (order: {})",
            processor.name(),
            processor.order()
        );
        processors.push(processor);
        // 稳定排序，同优先级保持添加顺序
        processors.sort_by_key(|p| p.order());
    }

    pub(crate) fn processor_count(&self) -> usize {
        self.processors.read().len()
    }

    /// 将刚构造的实例推进到 Ready
    ///
    /// 失败的实例直接丢弃，不缓存也不销毁。
    pub(crate) fn initialize(
        &self,
        definition: &BeanDefinition,
        mut raw: Box<dyn Any + Send + Sync>,
        setter_dependencies: &[Dependency],
    ) -> ContainerResult<BeanInstance> {
        let name = definition.name();
        let mut state = LifecycleState::Constructed;

        for (setter, dependency) in definition.setters.iter().zip(setter_dependencies) {
            (setter.apply)(raw.as_mut(), dependency).map_err(|source| {
                ContainerError::InitializationFailed {
                    bean: name.to_string(),
                    hook: format!("setter({})", setter.dependency),
                    source,
                }
            })?;
        }
        state.advance(LifecycleState::DependenciesInjected, name);

        let processors = self.processors.read().clone();
        for processor in &processors {
            processor
                .post_process_before_initialization(raw.as_mut(), name)
                .map_err(|err| ContainerError::InitializationFailed {
                    bean: name.to_string(),
                    hook: processor.name().to_string(),
                    source: err.into(),
                })?;
        }

        if let Some(init) = &definition.init {
            tracing::debug!("Invoking init hook '{}' on bean '{}'", init.name, name);
            (init.callback)(raw.as_mut()).map_err(|source| ContainerError::InitializationFailed {
                bean: name.to_string(),
                hook: init.name.clone(),
                source,
            })?;
        }
        state.advance(LifecycleState::PostConstructed, name);

        let instance: Value = Arc::from(raw);
        state.advance(LifecycleState::Ready, name);

        let target = definition
            .contract
            .as_ref()
            .and_then(|contract| contract(Arc::clone(&instance)));

        let mut proxy = None;
        if let Some(target) = &target {
            let mut current = Arc::clone(target);
            for processor in &processors {
                current = processor
                    .post_process_after_initialization(current, name)
                    .map_err(|err| ContainerError::InitializationFailed {
                        bean: name.to_string(),
                        hook: processor.name().to_string(),
                        source: err.into(),
                    })?;
            }
            if !same_contract(&current, target) {
                tracing::debug!("Bean '{}' replaced by a proxy", name);
                proxy = Some(current);
            }
        }

        Ok(BeanInstance::new(
            name,
            definition.scope(),
            definition.type_name(),
            instance,
            target,
            proxy,
            definition.destroy.clone(),
        ))
    }

    /// 销毁实例（尽力而为）
    ///
    /// 失败只记录并返回，不中断其余实例的销毁。重复销毁被忽略。
    pub(crate) fn destroy(&self, bean: &BeanInstance) -> Option<DestroyFailure> {
        {
            let mut state = bean.state_cell().lock();
            if *state != LifecycleState::Ready {
                return None;
            }
            state.advance(LifecycleState::PreDestroyed, bean.name());
        }

        let mut failure = None;
        if let Some(hook) = &bean.destroy {
            tracing::debug!("Invoking destroy hook '{}' on bean '{}'", hook.name, bean.name());
            if let Err(error) = (hook.callback)(&**bean.raw()) {
                tracing::warn!(
                    "Destroy hook '{}' of bean '{}' failed: {:#}",
                    hook.name,
                    bean.name(),
                    error
                );
                failure = Some(DestroyFailure {
                    bean: bean.name().to_string(),
                    hook: hook.name.clone(),
                    error,
                });
            }
        }

        bean.state_cell()
            .lock()
            .advance(LifecycleState::Destroyed, bean.name());
        failure
    }

    /// 按给定顺序销毁一组实例，收集失败
    pub(crate) fn destroy_all(&self, beans: Vec<Arc<BeanInstance>>) -> Vec<DestroyFailure> {
        beans
            .iter()
            .filter_map(|bean| self.destroy(bean))
            .collect()
    }
}

fn same_contract(a: &Arc<dyn Invocable>, b: &Arc<dyn Invocable>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::MethodSignature;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Sample {
        events: Vec<String>,
    }

    struct Recording {
        order: i32,
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl BeanPostProcessor for Recording {
        fn post_process_before_initialization(
            &self,
            bean: &mut (dyn Any + Send + Sync),
            bean_name: &str,
        ) -> ContainerResult<()> {
            if let Some(sample) = bean.downcast_mut::<Sample>() {
                sample.events.push(format!("before:{}", self.label));
            }
            self.log.lock().push(format!("{}:{}", self.label, bean_name));
            Ok(())
        }

        fn name(&self) -> &str {
            self.label
        }

        fn order(&self) -> i32 {
            self.order
        }
    }

    fn sample_definition() -> BeanDefinition {
        BeanDefinition::builder("sample", |_| Ok(Sample::default()))
            .with_init("init", |sample: &mut Sample| sample.events.push("init".into()))
            .with_destroy("close", |_: &Sample| -> anyhow::Result<()> {
                anyhow::bail!("still busy")
            })
            .build()
    }

    #[test]
    fn test_state_sequence() {
        let mut state = LifecycleState::Constructed;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            state = next;
            seen.push(state);
        }
        assert_eq!(seen.len(), 6);
        assert_eq!(seen.last(), Some(&LifecycleState::Destroyed));
        assert!(LifecycleState::Ready < LifecycleState::PreDestroyed);
    }

    #[test]
    fn test_processors_run_in_order_before_init() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = LifecycleOrchestrator::default();
        orchestrator.add_processor(Arc::new(Recording {
            order: 20,
            label: "late",
            log: Arc::clone(&log),
        }));
        orchestrator.add_processor(Arc::new(Recording {
            order: 10,
            label: "early",
            log: Arc::clone(&log),
        }));

        let bean = orchestrator
            .initialize(&sample_definition(), Box::new(Sample::default()), &[])
            .unwrap();

        let sample = bean.downcast::<Sample>().unwrap();
        assert_eq!(sample.events, vec!["before:early", "before:late", "init"]);
        assert_eq!(*log.lock(), vec!["early:sample", "late:sample"]);
        assert_eq!(bean.state(), LifecycleState::Ready);
    }

    #[test]
    fn test_init_failure_is_reported() {
        let orchestrator = LifecycleOrchestrator::default();
        let definition = BeanDefinition::builder("broken", |_| Ok(Sample::default()))
            .with_init("connect", |_: &mut Sample| -> anyhow::Result<()> {
                anyhow::bail!("refused")
            })
            .build();

        let err = orchestrator
            .initialize(&definition, Box::new(Sample::default()), &[])
            .unwrap_err();
        assert!(matches!(
            err,
            ContainerError::InitializationFailed { ref hook, .. } if hook == "connect"
        ));
    }

    #[test]
    fn test_destroy_collects_failure_once() {
        let orchestrator = LifecycleOrchestrator::default();
        let bean = orchestrator
            .initialize(&sample_definition(), Box::new(Sample::default()), &[])
            .unwrap();

        let failure = orchestrator.destroy(&bean).unwrap();
        assert_eq!(failure.hook, "close");
        assert_eq!(bean.state(), LifecycleState::Destroyed);
        assert!(orchestrator.destroy(&bean).is_none());
    }

    struct Named;

    impl Invocable for Named {
        fn declaring_type(&self) -> &str {
            "demo.Named"
        }

        fn methods(&self) -> Vec<MethodSignature> {
            Vec::new()
        }

        fn invoke(&self, _method: &str, _args: &[Value]) -> anyhow::Result<Value> {
            Ok(Arc::new(()))
        }
    }

    struct Wrapping;

    impl BeanPostProcessor for Wrapping {
        fn post_process_after_initialization(
            &self,
            _bean: Arc<dyn Invocable>,
            _bean_name: &str,
        ) -> ContainerResult<Arc<dyn Invocable>> {
            Ok(Arc::new(Named))
        }
    }

    #[test]
    fn test_after_initialization_produces_proxy() {
        let orchestrator = LifecycleOrchestrator::default();
        orchestrator.add_processor(Arc::new(Wrapping));

        let definition = BeanDefinition::builder("named", |_| Ok(Named))
            .invocable()
            .build();
        let bean = orchestrator
            .initialize(&definition, Box::new(Named), &[])
            .unwrap();
        assert!(bean.is_proxied());

        let plain = BeanDefinition::builder("plain", |_| Ok(Sample::default())).build();
        let bean = orchestrator
            .initialize(&plain, Box::new(Sample::default()), &[])
            .unwrap();
        assert!(!bean.is_proxied());
    }
}
