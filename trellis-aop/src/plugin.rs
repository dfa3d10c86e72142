//! AOP Plugin - 通过插件机制集成 AOP 到容器
//!
//! 提供 ApplicationPlugin 实现，在构建上下文时注册 AOP BeanPostProcessor

use std::sync::Arc;

use trellis_core::prelude::*;

use crate::bean_post_processor::AopBeanPostProcessor;
use crate::registry::AspectRegistry;

/// AOP 应用插件
///
/// ## 功能
///
/// 1. 持有切面注册表，切面通过 [`AopPlugin::registry`] 注册
/// 2. 按 `[aop] tie_break` 配置同优先级切面的排序
/// 3. 注册 AopBeanPostProcessor，为匹配切面的 Bean 包装代理
///
/// `[aop] enabled = false` 或 [`AopPlugin::disabled`] 时不安装处理器。
///
/// ## 使用方式
///
/// ```ignore
/// let aop = AopPlugin::new();
/// aop.registry().register(LoggingAspect::new("within(shop..*Service)"))?;
///
/// let context = ApplicationContext::builder()
///     .plugin(aop)
///     .register(order_service_definition)?
///     .build()?;
/// ```
pub struct AopPlugin {
    /// 插件名称
    name: String,
    /// 是否启用
    enabled: bool,
    registry: Arc<AspectRegistry>,
}

impl AopPlugin {
    /// 创建新的 AOP 插件
    pub fn new() -> Self {
        Self::with_registry(Arc::new(AspectRegistry::new()))
    }

    /// 使用已有的切面注册表
    pub fn with_registry(registry: Arc<AspectRegistry>) -> Self {
        Self {
            name: "AopPlugin".to_string(),
            enabled: true,
            registry,
        }
    }

    /// 创建禁用的 AOP 插件
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// 设置插件名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 切面注册表
    pub fn registry(&self) -> Arc<AspectRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for AopPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationPlugin for AopPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        // 在其他插件之前安装，保证它们注册的 Bean 也能被代理
        10
    }

    fn configure(&self, context: &ApplicationContext) -> ContainerResult<()> {
        let settings = &context.config().aop;
        if !self.enabled || !settings.enabled {
            tracing::info!("AOP support is disabled, skipping initialization");
            return Ok(());
        }

        self.registry.set_tie_break(settings.tie_break);
        context.add_bean_post_processor(Arc::new(AopBeanPostProcessor::new(self.registry())));

        tracing::info!(
            "AOP support initialized with {} aspect(s) (tie-break: {})",
            self.registry.len(),
            settings.tie_break
        );
        Ok(())
    }

    fn on_shutdown(&self, _context: &ApplicationContext) -> ContainerResult<()> {
        if self.enabled {
            tracing::info!("Shutting down AOP support");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::TieBreak;

    #[test]
    fn test_plugin_creation() {
        let plugin = AopPlugin::new();
        assert_eq!(plugin.name(), "AopPlugin");
        assert!(plugin.is_enabled());
        assert!(plugin.registry().is_empty());
    }

    #[test]
    fn test_custom_name() {
        let plugin = AopPlugin::new().with_name("CustomAopPlugin");
        assert_eq!(plugin.name(), "CustomAopPlugin");
    }

    #[test]
    fn test_configure_installs_processor_and_tie_break() {
        let config =
            ContainerConfig::from_toml_str("[aop]\ntie_break = \"reverse-registration\"").unwrap();
        let context = ApplicationContext::with_config(config);
        let plugin = AopPlugin::new();

        plugin.configure(&context).unwrap();
        assert_eq!(context.get_bean_factory().bean_post_processor_count(), 1);
        assert_eq!(plugin.registry().tie_break(), TieBreak::ReverseRegistration);
    }

    #[test]
    fn test_disabled_by_plugin_or_config() {
        let context = ApplicationContext::new();
        AopPlugin::disabled().configure(&context).unwrap();
        assert_eq!(context.get_bean_factory().bean_post_processor_count(), 0);

        let config = ContainerConfig::from_toml_str("[aop]\nenabled = false").unwrap();
        let context = ApplicationContext::with_config(config);
        AopPlugin::new().configure(&context).unwrap();
        assert_eq!(context.get_bean_factory().bean_post_processor_count(), 0);
    }
}
