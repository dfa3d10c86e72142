//! 代理工厂
//!
//! 为匹配切面的 Bean 构建 [`ProxyHandle`]。每个被拦截的方法在包装时
//! 计算一次固定的通知链，之后所有调用都沿这条链执行：
//!
//! 1. 所有 before 通知（进入顺序）
//! 2. 由 around 通知层层包裹的目标方法（优先级最高的在最外层）
//! 3. 按进入的逆序访问切面：成功时 after-returning，失败时 after-throwing，然后 after

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use trellis_core::{Invocable, MethodSignature, Value};

use crate::advice::{Advice, AfterFn, AfterReturningFn, AfterThrowingFn, AroundFn, BeforeFn};
use crate::aspect::Aspect;
use crate::registry::AspectRegistry;
use crate::{JoinPoint, ProceedingJoinPoint};

/// 单个切面在退出阶段的通知
#[derive(Default)]
struct ExitAdvice {
    after_returning: Vec<AfterReturningFn>,
    after_throwing: Vec<AfterThrowingFn>,
    after: Vec<AfterFn>,
}

/// 一个方法的通知链
pub struct MethodChain {
    signature: Arc<MethodSignature>,
    aspects: Vec<String>,
    before: Vec<BeforeFn>,
    around: Vec<AroundFn>,
    /// 已按进入的逆序排列
    exits: Vec<ExitAdvice>,
}

impl MethodChain {
    fn build(signature: MethodSignature, aspects: &[Arc<Aspect>]) -> Self {
        let mut before = Vec::new();
        let mut around = Vec::new();
        let mut exits = Vec::with_capacity(aspects.len());

        for aspect in aspects {
            let mut exit = ExitAdvice::default();
            for advice in aspect.advices() {
                match advice {
                    Advice::Before(f) => before.push(Arc::clone(f)),
                    Advice::Around(f) => around.push(Arc::clone(f)),
                    Advice::AfterReturning(f) => exit.after_returning.push(Arc::clone(f)),
                    Advice::AfterThrowing(f) => exit.after_throwing.push(Arc::clone(f)),
                    Advice::After(f) => exit.after.push(Arc::clone(f)),
                }
            }
            exits.push(exit);
        }
        exits.reverse();

        Self {
            signature: Arc::new(signature),
            aspects: aspects.iter().map(|a| a.name().to_string()).collect(),
            before,
            around,
            exits,
        }
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// 参与此链的切面名称（进入顺序）
    pub fn aspect_names(&self) -> &[String] {
        &self.aspects
    }

    fn invoke(&self, bean_name: &Arc<str>, target: &dyn Invocable, args: &[Value]) -> Result<Value> {
        let join_point = JoinPoint::new(Arc::clone(bean_name), Arc::clone(&self.signature), args.to_vec());
        tracing::trace!("Advising {} through [{}]", join_point, self.aspects.join(", "));

        for before in &self.before {
            before(&join_point);
        }

        let result = self.call_through(0, &join_point, target, args);

        for exit in &self.exits {
            match &result {
                Ok(value) => exit.after_returning.iter().for_each(|f| f(&join_point, value)),
                Err(error) => exit.after_throwing.iter().for_each(|f| f(&join_point, error)),
            }
            exit.after.iter().for_each(|f| f(&join_point));
        }
        result
    }

    fn call_through(
        &self,
        index: usize,
        join_point: &JoinPoint,
        target: &dyn Invocable,
        args: &[Value],
    ) -> Result<Value> {
        match self.around.get(index) {
            None => target.invoke(&self.signature.method_name, args),
            Some(around) => {
                let next = |next_args: &[Value]| -> Result<Value> {
                    self.call_through(index + 1, join_point, target, next_args)
                };
                around(&ProceedingJoinPoint::new(join_point, args, &next))
            }
        }
    }
}

impl fmt::Debug for MethodChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodChain")
            .field("signature", &self.signature.to_string())
            .field("aspects", &self.aspects)
            .finish()
    }
}

/// AOP 代理
///
/// 对外暴露与目标相同的调用契约，被拦截的方法经过通知链，其余方法直接转发。
pub struct ProxyHandle {
    bean_name: Arc<str>,
    target: Arc<dyn Invocable>,
    chains: HashMap<String, MethodChain>,
}

impl ProxyHandle {
    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }

    /// 被代理的原始契约
    pub fn target(&self) -> &Arc<dyn Invocable> {
        &self.target
    }

    pub fn chain(&self, method: &str) -> Option<&MethodChain> {
        self.chains.get(method)
    }

    /// 被拦截的方法名（排序后）
    pub fn advised_methods(&self) -> Vec<&str> {
        let mut methods: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        methods.sort_unstable();
        methods
    }
}

impl Invocable for ProxyHandle {
    fn declaring_type(&self) -> &str {
        self.target.declaring_type()
    }

    fn methods(&self) -> Vec<MethodSignature> {
        self.target.methods()
    }

    fn invoke(&self, method: &str, args: &[Value]) -> Result<Value> {
        match self.chains.get(method) {
            Some(chain) => chain.invoke(&self.bean_name, self.target.as_ref(), args),
            None => self.target.invoke(method, args),
        }
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("bean_name", &self.bean_name)
            .field("declaring_type", &self.target.declaring_type())
            .field("advised_methods", &self.advised_methods())
            .finish()
    }
}

/// 代理工厂
pub struct ProxyFactory {
    registry: Arc<AspectRegistry>,
}

impl ProxyFactory {
    pub fn new(registry: Arc<AspectRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<AspectRegistry> {
        &self.registry
    }

    /// 为 Bean 构建代理；没有任何方法匹配切面时返回 `None`
    pub fn wrap(&self, bean_name: &str, target: Arc<dyn Invocable>) -> Option<Arc<ProxyHandle>> {
        let mut chains = HashMap::new();
        for signature in target.methods() {
            let aspects = self.registry.matching_aspects(bean_name, &signature);
            if aspects.is_empty() {
                continue;
            }
            let method = signature.method_name.clone();
            chains
                .entry(method)
                .or_insert_with(|| MethodChain::build(signature, &aspects));
        }

        if chains.is_empty() {
            tracing::trace!("Bean '{}' does not match any aspect", bean_name);
            return None;
        }

        tracing::debug!(
            "Creating proxy for bean '{}' advising {} method(s)",
            bean_name,
            chains.len()
        );
        Some(Arc::new(ProxyHandle {
            bean_name: Arc::from(bean_name),
            target,
            chains,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use trellis_core::invocation::{arg, cast, value};

    struct Calculator {
        calls: AtomicUsize,
    }

    impl Invocable for Calculator {
        fn declaring_type(&self) -> &str {
            "math.Calculator"
        }

        fn methods(&self) -> Vec<MethodSignature> {
            vec![
                MethodSignature::new(self.declaring_type(), "double")
                    .with_params(["i64"])
                    .returns("i64"),
                MethodSignature::new(self.declaring_type(), "fail").returns("i64"),
                MethodSignature::new(self.declaring_type(), "reset"),
            ]
        }

        fn invoke(&self, method: &str, args: &[Value]) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match method {
                "double" => Ok(value(arg::<i64>(args, 0)? * 2)),
                "fail" => anyhow::bail!("division by zero"),
                "reset" => Ok(value(())),
                other => anyhow::bail!("unknown method {other}"),
            }
        }
    }

    fn calculator() -> Arc<Calculator> {
        Arc::new(Calculator {
            calls: AtomicUsize::new(0),
        })
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, entry: &str) -> impl Fn(&JoinPoint) + Send + Sync + 'static {
        let log = Arc::clone(log);
        let entry = entry.to_string();
        move |_: &JoinPoint| log.lock().push(entry.clone())
    }

    #[test]
    fn test_unmatched_bean_is_not_wrapped() {
        let registry = Arc::new(AspectRegistry::new());
        registry
            .register(Aspect::builder("other", "bean(users)").before(|_| {}))
            .unwrap();
        let factory = ProxyFactory::new(registry);
        assert!(factory.wrap("calc", calculator()).is_none());
    }

    #[test]
    fn test_only_matching_methods_are_advised() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(AspectRegistry::new());
        registry
            .register(Aspect::builder("trace", "* double(..)").before(recorder(&log, "before")))
            .unwrap();

        let proxy = ProxyFactory::new(registry).wrap("calc", calculator()).unwrap();
        assert_eq!(proxy.advised_methods(), vec!["double"]);

        proxy.invoke("reset", &[]).unwrap();
        assert!(log.lock().is_empty());

        let result = cast::<i64>(proxy.invoke("double", &[value(21i64)]).unwrap()).unwrap();
        assert_eq!(*result, 42);
        assert_eq!(*log.lock(), vec!["before"]);
    }

    #[test]
    fn test_around_can_replace_arguments_and_result() {
        let registry = Arc::new(AspectRegistry::new());
        registry
            .register(Aspect::builder("tweak", "* double(..)").around(|pjp| {
                let input = *pjp.arg::<i64>(0)?;
                let doubled = cast::<i64>(pjp.proceed_with(vec![value(input + 1)])?)?;
                Ok(value(*doubled + 100))
            }))
            .unwrap();

        let proxy = ProxyFactory::new(registry).wrap("calc", calculator()).unwrap();
        let result = cast::<i64>(proxy.invoke("double", &[value(1i64)]).unwrap()).unwrap();
        assert_eq!(*result, 104);
    }

    #[test]
    fn test_around_error_before_proceed_aborts_call() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let target = calculator();
        let registry = Arc::new(AspectRegistry::new());
        let throwing_log = Arc::clone(&log);
        registry
            .register(
                Aspect::builder("guard", "* double(..)")
                    .around(|_| anyhow::bail!("rejected"))
                    .after_throwing(move |_, error| throwing_log.lock().push(error.to_string()))
                    .after(recorder(&log, "after")),
            )
            .unwrap();

        let proxy = ProxyFactory::new(registry).wrap("calc", target.clone()).unwrap();
        let err = proxy.invoke("double", &[value(1i64)]).unwrap_err();
        assert_eq!(err.to_string(), "rejected");
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);
        assert_eq!(*log.lock(), vec!["rejected", "after"]);
    }

    #[test]
    fn test_exit_order_within_and_across_aspects() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(AspectRegistry::new());
        for (name, order) in [("outer", 1), ("inner", 2)] {
            let returning_log = Arc::clone(&log);
            let returning = format!("{name}.after_returning");
            registry
                .register(
                    Aspect::builder(name, "* double(..)")
                        .order(order)
                        .after(recorder(&log, &format!("{name}.after")))
                        .after_returning(move |_, _| returning_log.lock().push(returning.clone())),
                )
                .unwrap();
        }

        let proxy = ProxyFactory::new(registry).wrap("calc", calculator()).unwrap();
        assert_eq!(
            proxy.chain("double").unwrap().aspect_names(),
            ["outer".to_string(), "inner".to_string()]
        );
        proxy.invoke("double", &[value(2i64)]).unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "inner.after_returning",
                "inner.after",
                "outer.after_returning",
                "outer.after",
            ]
        );
    }

    #[test]
    fn test_proxy_exposes_target_contract() {
        let registry = Arc::new(AspectRegistry::new());
        registry
            .register(Aspect::builder("all", "within(math.*)").before(|_| {}))
            .unwrap();
        let proxy = ProxyFactory::new(registry).wrap("calc", calculator()).unwrap();

        assert_eq!(proxy.declaring_type(), "math.Calculator");
        assert_eq!(proxy.methods().len(), 3);
        assert_eq!(proxy.bean_name(), "calc");
        assert!(proxy.invoke("fail", &[]).is_err());
    }
}
