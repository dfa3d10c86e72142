//! 切面注册表
//!
//! 负责保存切面和命名切点，并为代理工厂挑选匹配的切面

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use trellis_core::{MethodSignature, TieBreak};

use crate::advice::Advice;
use crate::aspect::{Aspect, AspectBuilder};
use crate::error::{AopError, AopResult};
use crate::pointcut::Pointcut;

/// 切面注册表
///
/// 注册的切面只影响之后创建的代理，已有代理的通知链不会改变。
pub struct AspectRegistry {
    aspects: RwLock<Vec<Arc<Aspect>>>,
    named: RwLock<HashMap<String, Pointcut>>,
    tie_break: RwLock<TieBreak>,
}

impl AspectRegistry {
    /// 创建新的切面注册表
    pub fn new() -> Self {
        Self {
            aspects: RwLock::new(Vec::new()),
            named: RwLock::new(HashMap::new()),
            tie_break: RwLock::new(TieBreak::default()),
        }
    }

    /// 定义命名切点，之后的表达式可以用 `name()` 引用
    pub fn define_pointcut(&self, name: impl Into<String>, expression: &str) -> AopResult<()> {
        let name = name.into();
        let valid_name =
            !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !valid_name {
            return Err(AopError::parse(
                expression,
                format!("invalid pointcut name '{}'", name),
            ));
        }

        let mut named = self.named.write();
        let pointcut = Pointcut::parse_with(expression, &named)?;
        tracing::debug!("Defining named pointcut {}() = {}", name, pointcut);
        named.insert(name, pointcut);
        Ok(())
    }

    /// 注册切面，切点表达式在此解析
    ///
    /// 切面至少要有一个通知。
    pub fn register(&self, aspect: impl Into<AspectBuilder>) -> AopResult<()> {
        self.insert(aspect.into(), false)
    }

    /// 以自动生成的名称（`aspect#N`）注册切面
    pub fn register_aspect(
        &self,
        pointcut: &str,
        advices: impl IntoIterator<Item = Advice>,
        order: i32,
    ) -> AopResult<()> {
        self.insert(AspectBuilder::new("", pointcut).order(order).advices(advices), true)
    }

    fn insert(&self, builder: AspectBuilder, generate_name: bool) -> AopResult<()> {
        let pointcut = Pointcut::parse_with(builder.pointcut_expression(), &self.named.read())?;

        let mut aspects = self.aspects.write();
        let builder = if generate_name {
            builder.renamed(format!("aspect#{}", aspects.len() + 1))
        } else {
            builder
        };
        if !builder.has_advice() {
            return Err(AopError::NoAdvice {
                aspect: builder.name().to_string(),
                pointcut: builder.pointcut_expression().to_string(),
            });
        }

        let aspect = Aspect::new(builder, pointcut, aspects.len());
        tracing::debug!(
            "Registering aspect '{}' (order {}) on {}",
            aspect.name(),
            aspect.order(),
            aspect.pointcut()
        );
        aspects.push(Arc::new(aspect));
        Ok(())
    }

    /// 设置同优先级切面的排序规则
    pub fn set_tie_break(&self, tie_break: TieBreak) {
        *self.tie_break.write() = tie_break;
    }

    pub fn tie_break(&self) -> TieBreak {
        *self.tie_break.read()
    }

    /// 获取匹配指定方法的切面，按进入顺序排列
    pub fn matching_aspects(&self, bean_name: &str, method: &MethodSignature) -> Vec<Arc<Aspect>> {
        let mut matching: Vec<_> = self
            .aspects
            .read()
            .iter()
            .filter(|aspect| aspect.pointcut().matches(bean_name, method))
            .cloned()
            .collect();

        let tie_break = self.tie_break();
        matching.sort_by(|a, b| {
            a.order().cmp(&b.order()).then_with(|| match tie_break {
                TieBreak::RegistrationOrder => a.sequence().cmp(&b.sequence()),
                TieBreak::ReverseRegistration => b.sequence().cmp(&a.sequence()),
                TieBreak::Name => a
                    .name()
                    .cmp(b.name())
                    .then_with(|| a.sequence().cmp(&b.sequence())),
            })
        });
        matching
    }

    /// 已注册切面的名称（注册顺序）
    pub fn aspect_names(&self) -> Vec<String> {
        self.aspects
            .read()
            .iter()
            .map(|aspect| aspect.name().to_string())
            .collect()
    }

    /// 获取注册的切面数量
    pub fn len(&self) -> usize {
        self.aspects.read().len()
    }

    /// 检查是否没有注册任何切面
    pub fn is_empty(&self) -> bool {
        self.aspects.read().is_empty()
    }
}

impl Default for AspectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place() -> MethodSignature {
        MethodSignature::new("shop.service.OrderService", "place").returns("u64")
    }

    fn aspect(name: &str, pointcut: &str) -> AspectBuilder {
        Aspect::builder(name, pointcut).before(|_| {})
    }

    fn names(aspects: &[Arc<Aspect>]) -> Vec<&str> {
        aspects.iter().map(|aspect| aspect.name()).collect()
    }

    #[test]
    fn test_matching_sorted_by_order() {
        let registry = AspectRegistry::new();
        registry.register(aspect("late", "bean(orders)").order(20)).unwrap();
        registry.register(aspect("early", "* place(..)").order(1)).unwrap();
        registry.register(aspect("other", "bean(users)").order(0)).unwrap();

        let matching = registry.matching_aspects("orders", &place());
        assert_eq!(names(&matching), vec!["early", "late"]);
    }

    #[test]
    fn test_tie_break_rules() {
        let registry = AspectRegistry::new();
        for name in ["b", "c", "a"] {
            registry.register(aspect(name, "bean(*)")).unwrap();
        }

        assert_eq!(names(&registry.matching_aspects("orders", &place())), vec!["b", "c", "a"]);

        registry.set_tie_break(TieBreak::ReverseRegistration);
        assert_eq!(names(&registry.matching_aspects("orders", &place())), vec!["a", "c", "b"]);

        registry.set_tie_break(TieBreak::Name);
        assert_eq!(names(&registry.matching_aspects("orders", &place())), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_named_pointcuts() {
        let registry = AspectRegistry::new();
        registry.define_pointcut("services", "within(shop..*Service)").unwrap();
        registry.define_pointcut("placing", "services() && * place(..)").unwrap();
        registry.register(aspect("audit", "placing()")).unwrap();

        assert_eq!(registry.matching_aspects("orders", &place()).len(), 1);
        assert!(matches!(
            registry.register(aspect("broken", "missing()")),
            Err(AopError::PointcutParse { .. })
        ));
        assert!(registry.define_pointcut("bad name", "bean(*)").is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_aspect_generates_names() {
        let registry = AspectRegistry::new();
        registry
            .register_aspect("bean(*)", [Advice::before(|_| {})], 3)
            .unwrap();
        registry
            .register_aspect("bean(*)", [Advice::after(|_| {})], 3)
            .unwrap();
        assert_eq!(registry.aspect_names(), vec!["aspect#1", "aspect#2"]);
        assert!(registry.register_aspect("bean(", [Advice::before(|_| {})], 0).is_err());
    }

    #[test]
    fn test_aspect_without_advice_is_rejected() {
        let registry = AspectRegistry::new();
        assert!(matches!(
            registry.register_aspect("bean(*)", Vec::new(), 0),
            Err(AopError::NoAdvice { aspect, .. }) if aspect == "aspect#1"
        ));
        assert!(matches!(
            registry.register(Aspect::builder("empty", "bean(*)")),
            Err(AopError::NoAdvice { aspect, pointcut }) if aspect == "empty" && pointcut == "bean(*)"
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_generated_names_are_unique() {
        let registry = AspectRegistry::new();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    registry
                        .register_aspect("bean(*)", [Advice::before(|_| {})], 0)
                        .unwrap();
                });
            }
        });

        let mut names = registry.aspect_names();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
    }
}
