//! AOP BeanPostProcessor - 为匹配切面的 Bean 包装代理
//!
//! 在 Bean 进入 Ready 之后，为声明了调用契约且匹配切面的 Bean 包装 AOP 代理

use std::sync::Arc;

use trellis_core::prelude::*;

use crate::proxy::ProxyFactory;
use crate::registry::AspectRegistry;

/// AOP BeanPostProcessor
///
/// ## 工作原理
///
/// 1. 对 Bean 契约中的每个方法求值所有切面的切点
/// 2. 有方法匹配时，为 Bean 创建 [`ProxyHandle`](crate::ProxyHandle)，通知链在此时固定
/// 3. 容器把代理作为 Bean 的契约返回，之后的 `invoke` 都经过代理
///
/// ## 使用示例
///
/// ```ignore
/// let registry = Arc::new(AspectRegistry::new());
/// context.add_bean_post_processor(Arc::new(AopBeanPostProcessor::new(registry)));
/// ```
pub struct AopBeanPostProcessor {
    factory: ProxyFactory,
    /// 是否启用 AOP
    enabled: bool,
}

impl AopBeanPostProcessor {
    /// 创建新的 AOP BeanPostProcessor
    pub fn new(registry: Arc<AspectRegistry>) -> Self {
        Self {
            factory: ProxyFactory::new(registry),
            enabled: true,
        }
    }

    /// 创建禁用的 AOP BeanPostProcessor
    pub fn disabled(registry: Arc<AspectRegistry>) -> Self {
        Self {
            factory: ProxyFactory::new(registry),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl BeanPostProcessor for AopBeanPostProcessor {
    fn name(&self) -> &str {
        "AopBeanPostProcessor"
    }

    fn order(&self) -> i32 {
        // 在其他处理器之后执行，代理包装最终的契约
        2000
    }

    fn post_process_after_initialization(
        &self,
        bean: Arc<dyn Invocable>,
        bean_name: &str,
    ) -> ContainerResult<Arc<dyn Invocable>> {
        if !self.enabled || self.factory.registry().is_empty() {
            return Ok(bean);
        }

        match self.factory.wrap(bean_name, Arc::clone(&bean)) {
            Some(proxy) => {
                tracing::info!(
                    "Bean '{}' matches AOP pointcuts, advising [{}]",
                    bean_name,
                    proxy.advised_methods().join(", ")
                );
                Ok(proxy as Arc<dyn Invocable>)
            }
            None => {
                tracing::trace!("Bean '{}' does not match any aspect, skipping AOP wrapping", bean_name);
                Ok(bean)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Aspect;

    struct Greeter;

    impl Invocable for Greeter {
        fn declaring_type(&self) -> &str {
            "demo.Greeter"
        }

        fn methods(&self) -> Vec<MethodSignature> {
            vec![MethodSignature::new(self.declaring_type(), "greet").returns("String")]
        }

        fn invoke(&self, _method: &str, _args: &[Value]) -> anyhow::Result<Value> {
            Ok(value("hello".to_string()))
        }
    }

    fn registry_with(pointcut: &str) -> Arc<AspectRegistry> {
        let registry = Arc::new(AspectRegistry::new());
        registry
            .register(Aspect::builder("shout", pointcut).around(|pjp| {
                let greeting = cast::<String>(pjp.proceed()?)?;
                Ok(value(greeting.to_uppercase()))
            }))
            .unwrap();
        registry
    }

    #[test]
    fn test_matching_bean_is_proxied() {
        let processor = AopBeanPostProcessor::new(registry_with("bean(greeter)"));
        let target: Arc<dyn Invocable> = Arc::new(Greeter);
        let contract = processor
            .post_process_after_initialization(Arc::clone(&target), "greeter")
            .unwrap();

        assert!(!Arc::ptr_eq(&contract, &target));
        let greeting = cast::<String>(contract.invoke("greet", &[]).unwrap()).unwrap();
        assert_eq!(greeting.as_str(), "HELLO");
    }

    #[test]
    fn test_non_matching_bean_is_returned_as_is() {
        let processor = AopBeanPostProcessor::new(registry_with("bean(other)"));
        let target: Arc<dyn Invocable> = Arc::new(Greeter);
        let contract = processor
            .post_process_after_initialization(Arc::clone(&target), "greeter")
            .unwrap();
        assert!(Arc::ptr_eq(&contract, &target));
    }

    #[test]
    fn test_disabled_processor() {
        let processor = AopBeanPostProcessor::disabled(registry_with("bean(*)"));
        assert!(!processor.is_enabled());
        let target: Arc<dyn Invocable> = Arc::new(Greeter);
        let contract = processor
            .post_process_after_initialization(Arc::clone(&target), "greeter")
            .unwrap();
        assert!(Arc::ptr_eq(&contract, &target));
    }

    #[test]
    fn test_processor_order() {
        let processor = AopBeanPostProcessor::new(Arc::new(AspectRegistry::new()));
        assert_eq!(processor.order(), 2000);
    }
}
