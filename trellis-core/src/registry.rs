//! Bean 定义注册表
//!
//! 保存全部 Bean 定义及按类型的索引。容器开始解析 Bean 后注册表被冻结。

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::{BeanDefinition, BeanKey};
use crate::error::{ContainerError, ContainerResult};

#[derive(Default)]
struct RegistryState {
    definitions: HashMap<String, Arc<BeanDefinition>>,
    /// 注册顺序
    order: Vec<String>,
    by_type: HashMap<TypeId, Vec<String>>,
}

/// Bean 定义注册表
#[derive(Default)]
pub struct BeanDefinitionRegistry {
    state: RwLock<RegistryState>,
    frozen: AtomicBool,
}

impl BeanDefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 Bean 定义
    ///
    /// 同名定义已存在时，只有新定义声明了 `allow_override` 才会替换。
    /// 依赖名称不在此处校验，允许前向引用。
    pub fn register(&self, definition: BeanDefinition) -> ContainerResult<()> {
        let name = definition.name.clone();

        if self.is_frozen() {
            return Err(ContainerError::ConfigurationFrozen { name });
        }
        Self::check_definition(&definition)?;

        let mut state = self.state.write();
        if let Some(existing) = state.definitions.get(&name) {
            if !definition.allow_override {
                return Err(ContainerError::DuplicateDefinition { name });
            }
            tracing::debug!(
                "Overriding bean definition '{}' ({} -> {})",
                name,
                existing.type_name,
                definition.type_name
            );
            let old_type = existing.type_id;
            if let Some(names) = state.by_type.get_mut(&old_type) {
                names.retain(|n| n != &name);
            }
        } else {
            state.order.push(name.clone());
        }

        state
            .by_type
            .entry(definition.type_id)
            .or_default()
            .push(name.clone());
        tracing::debug!(
            "Registered bean definition '{}' (type: {}, scope: {})",
            name,
            definition.type_name,
            definition.scope
        );
        state.definitions.insert(name, Arc::new(definition));
        Ok(())
    }

    fn check_definition(definition: &BeanDefinition) -> ContainerResult<()> {
        if definition.name.trim().is_empty() {
            return Err(ContainerError::InvalidDefinition {
                name: definition.name.clone(),
                reason: "bean name must not be empty".to_string(),
            });
        }
        let self_reference = definition.all_dependencies().any(|dep| {
            !dep.is_lazy()
                && match dep.key() {
                    BeanKey::Name(target) => target == &definition.name,
                    BeanKey::Type { .. } => false,
                }
        });
        if self_reference {
            return Err(ContainerError::InvalidDefinition {
                name: definition.name.clone(),
                reason: "bean eagerly depends on itself".to_string(),
            });
        }
        Ok(())
    }

    /// 按名称或类型查找定义
    ///
    /// 类型查找有多个候选时选择唯一的 primary 定义，否则返回 `AmbiguousBean`。
    pub fn lookup(&self, key: &BeanKey) -> ContainerResult<Arc<BeanDefinition>> {
        tracing::trace!("Looking up bean definition {}", key);
        let state = self.state.read();
        match key {
            BeanKey::Name(name) => state
                .definitions
                .get(name)
                .cloned()
                .ok_or_else(|| ContainerError::NoSuchBean { name: name.clone() }),
            BeanKey::Type { id, name } => {
                let candidates = state.by_type.get(id).map(Vec::as_slice).unwrap_or(&[]);
                match candidates {
                    [] => Err(ContainerError::NoSuchBean {
                        name: name.to_string(),
                    }),
                    [single] => Ok(Arc::clone(&state.definitions[single])),
                    several => {
                        let primaries: Vec<_> = several
                            .iter()
                            .filter(|n| state.definitions[n.as_str()].primary)
                            .collect();
                        match primaries.as_slice() {
                            [primary] => Ok(Arc::clone(&state.definitions[primary.as_str()])),
                            _ => Err(ContainerError::AmbiguousBean {
                                type_name: name.to_string(),
                                candidates: several.to_vec(),
                            }),
                        }
                    }
                }
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.read().definitions.contains_key(name)
    }

    /// 全部定义名称（注册顺序）
    pub fn names(&self) -> Vec<String> {
        self.state.read().order.clone()
    }

    /// 指定类型的定义名称（注册顺序）
    pub fn names_for_type(&self, type_id: TypeId) -> Vec<String> {
        self.state
            .read()
            .by_type
            .get(&type_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.state.read().definitions.len()
    }

    /// 全部定义（注册顺序）
    pub fn definitions(&self) -> Vec<Arc<BeanDefinition>> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|name| state.definitions.get(name).cloned())
            .collect()
    }

    /// 立即依赖图（注册顺序），类型依赖解析为名称
    ///
    /// 找不到候选的类型依赖保留类型名，由校验阶段报告缺失。
    pub fn dependency_graph(&self) -> ContainerResult<Vec<(String, Vec<String>)>> {
        let mut graph = Vec::new();
        for definition in self.definitions() {
            let mut edges = Vec::new();
            for dependency in definition.all_dependencies().filter(|d| !d.is_lazy()) {
                let key = dependency.key();
                let target = match key {
                    BeanKey::Name(name) => name.clone(),
                    BeanKey::Type { name, .. } => match self.lookup(key) {
                        Ok(found) => found.name.clone(),
                        Err(ContainerError::NoSuchBean { .. }) => name.to_string(),
                        Err(other) => return Err(other),
                    },
                };
                edges.push(target);
            }
            graph.push((definition.name.clone(), edges));
        }
        Ok(graph)
    }

    /// 冻结配置，之后不再接受注册
    pub fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel) {
            tracing::debug!("Bean definition registry frozen");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::DependencyRef;

    struct JdbcRepo;
    struct Clock;

    fn repo(name: &str) -> BeanDefinition {
        BeanDefinition::builder(name, |_| Ok(JdbcRepo)).build()
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let registry = BeanDefinitionRegistry::new();
        registry.register(repo("repo")).unwrap();
        let err = registry.register(repo("repo")).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateDefinition { name } if name == "repo"));
    }

    #[test]
    fn test_override_replaces_definition() {
        let registry = BeanDefinitionRegistry::new();
        registry.register(repo("repo")).unwrap();
        registry
            .register(
                BeanDefinition::builder("repo", |_| Ok(Clock))
                    .allow_override()
                    .build(),
            )
            .unwrap();

        assert_eq!(registry.count(), 1);
        assert_eq!(registry.names(), vec!["repo"]);
        assert!(registry.names_for_type(TypeId::of::<JdbcRepo>()).is_empty());
        assert_eq!(registry.names_for_type(TypeId::of::<Clock>()), vec!["repo"]);
    }

    #[test]
    fn test_forward_references_allowed() {
        let registry = BeanDefinitionRegistry::new();
        let definition = BeanDefinition::builder("service", |_| Ok(Clock))
            .with_dependency("notYetRegistered")
            .build();
        assert!(registry.register(definition).is_ok());
    }

    #[test]
    fn test_type_lookup_prefers_single_primary() {
        let registry = BeanDefinitionRegistry::new();
        registry.register(repo("jdbcRepo")).unwrap();
        registry.register(repo("memoryRepo")).unwrap();

        let err = registry.lookup(&BeanKey::of_type::<JdbcRepo>()).unwrap_err();
        match err {
            ContainerError::AmbiguousBean { candidates, .. } => {
                assert_eq!(candidates, vec!["jdbcRepo", "memoryRepo"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        registry
            .register(
                BeanDefinition::builder("primaryRepo", |_| Ok(JdbcRepo))
                    .primary()
                    .build(),
            )
            .unwrap();
        let found = registry.lookup(&BeanKey::of_type::<JdbcRepo>()).unwrap();
        assert_eq!(found.name(), "primaryRepo");
    }

    #[test]
    fn test_missing_bean() {
        let registry = BeanDefinitionRegistry::new();
        assert!(matches!(
            registry.lookup(&BeanKey::name("ghost")),
            Err(ContainerError::NoSuchBean { .. })
        ));
        assert!(matches!(
            registry.lookup(&BeanKey::of_type::<Clock>()),
            Err(ContainerError::NoSuchBean { .. })
        ));
    }

    #[test]
    fn test_frozen_registry_rejects_registration() {
        let registry = BeanDefinitionRegistry::new();
        registry.freeze();
        assert!(matches!(
            registry.register(repo("late")),
            Err(ContainerError::ConfigurationFrozen { .. })
        ));
    }

    #[test]
    fn test_invalid_definitions() {
        let registry = BeanDefinitionRegistry::new();
        assert!(matches!(
            registry.register(repo("  ")),
            Err(ContainerError::InvalidDefinition { .. })
        ));

        let selfish = BeanDefinition::builder("selfish", |_| Ok(Clock))
            .with_dependency("selfish")
            .build();
        assert!(matches!(
            registry.register(selfish),
            Err(ContainerError::InvalidDefinition { .. })
        ));

        let lazy_self = BeanDefinition::builder("lazySelf", |_| Ok(Clock))
            .with_dependency(DependencyRef::name("lazySelf").lazy())
            .build();
        assert!(registry.register(lazy_self).is_ok());
    }

    #[test]
    fn test_dependency_graph_skips_lazy_edges_and_resolves_types() {
        let registry = BeanDefinitionRegistry::new();
        registry.register(repo("repo")).unwrap();
        registry
            .register(
                BeanDefinition::builder("service", |_| Ok(Clock))
                    .with_dependency(DependencyRef::of_type::<JdbcRepo>())
                    .with_dependency(DependencyRef::name("audit").lazy())
                    .with_setter("metrics", |_, _| Ok(()))
                    .build(),
            )
            .unwrap();

        let graph = registry.dependency_graph().unwrap();
        assert_eq!(graph[0], ("repo".to_string(), vec![]));
        assert_eq!(
            graph[1],
            (
                "service".to_string(),
                vec!["repo".to_string(), "metrics".to_string()]
            )
        );
    }
}
