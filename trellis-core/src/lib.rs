// trellis-core: 带切面拦截的依赖注入容器
//
// 提供类型安全的依赖注入功能，支持：
// - 单例、原型、request、session 作用域
// - 构造函数注入与 setter 注入，立即依赖与延迟依赖
// - 生命周期管理（init/destroy 回调、BeanPostProcessor）
// - 循环依赖检测与作用域校验
// - 显式调用契约，供 AOP 代理拦截

pub mod bean;
pub mod bean_factory;
pub mod config;
pub mod context;
pub mod error;
pub mod instance;
pub mod invocation;
pub mod lifecycle;
pub mod logging;
pub mod plugin;
pub mod registry;
pub mod resolution;
pub mod scope;
pub mod utils;

use anyhow::Result;

// Helper trait for init/destroy callbacks
// Allows both () and Result<()> return types
pub trait IntoResult {
    fn into_result(self) -> Result<()>;
}

impl IntoResult for () {
    fn into_result(self) -> Result<()> {
        Ok(())
    }
}

impl IntoResult for Result<()> {
    fn into_result(self) -> Result<()> {
        self
    }
}

// 重新导出常用类型
pub use bean::{BeanDefinition, BeanDefinitionBuilder, BeanKey, DependencyRef};
pub use bean_factory::{BeanFactory, BeanFactoryExt, DefaultListableBeanFactory, ListableBeanFactory};
pub use config::{AopSettings, ContainerConfig, ContainerSettings, TieBreak};
pub use context::{ApplicationContext, ApplicationContextBuilder, ShutdownHook};
pub use error::{ContainerError, ContainerResult, DestroyFailure};
pub use instance::{BeanInstance, BeanRef};
pub use invocation::{Invocable, MethodSignature, Value};
pub use lifecycle::{BeanPostProcessor, LifecycleState};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use plugin::{ApplicationPlugin, PluginRegistry};
pub use registry::BeanDefinitionRegistry;
pub use resolution::{Dependencies, Dependency, LazyBean};
pub use scope::{ContextKind, ContextToken, Scope};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{BeanDefinition, BeanKey, DependencyRef};
    pub use crate::bean_factory::{BeanFactory, BeanFactoryExt, ListableBeanFactory};
    pub use crate::config::ContainerConfig;
    pub use crate::context::ApplicationContext;
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::instance::BeanRef;
    pub use crate::invocation::{arg, cast, unit, value, Invocable, MethodSignature, Value};
    pub use crate::lifecycle::BeanPostProcessor;
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::plugin::ApplicationPlugin;
    pub use crate::resolution::{Dependencies, LazyBean};
    pub use crate::scope::{ContextToken, Scope};
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
