//! 应用上下文
//!
//! [`ApplicationContext`] 是容器的对外入口，持有 Bean 工厂、配置和插件，
//! 取代全局静态上下文：每个上下文都是一个显式的值。

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;

use crate::bean::BeanDefinition;
use crate::bean_factory::{BeanFactory, BeanFactoryExt, DefaultListableBeanFactory, ListableBeanFactory};
use crate::config::ContainerConfig;
use crate::error::{ContainerError, ContainerResult};
use crate::instance::BeanRef;
use crate::lifecycle::BeanPostProcessor;
use crate::plugin::{ApplicationPlugin, PluginRegistry};
use crate::resolution::Dependencies;
use crate::scope::{ContextToken, Scope};

/// Shutdown hook 类型
pub type ShutdownHook = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// 应用上下文
pub struct ApplicationContext {
    /// Bean 工厂 - 负责 Bean 的创建和管理
    bean_factory: Arc<DefaultListableBeanFactory>,

    /// 容器配置
    config: ContainerConfig,

    /// 已配置的插件（按优先级排序）
    plugins: RwLock<PluginRegistry>,

    /// Shutdown hooks
    shutdown_hooks: RwLock<Vec<ShutdownHook>>,

    closed: AtomicBool,
}

impl ApplicationContext {
    /// 使用默认配置创建上下文
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// 使用给定配置创建上下文
    pub fn with_config(config: ContainerConfig) -> Self {
        Self {
            bean_factory: DefaultListableBeanFactory::new(),
            config,
            plugins: RwLock::new(PluginRegistry::new()),
            shutdown_hooks: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// 构建器模式创建上下文
    pub fn builder() -> ApplicationContextBuilder {
        ApplicationContextBuilder::new()
    }

    pub fn get_bean_factory(&self) -> &Arc<DefaultListableBeanFactory> {
        &self.bean_factory
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// 容器名称
    pub fn name(&self) -> &str {
        &self.config.container.name
    }

    /// 注册 Bean 定义
    pub fn register(&self, definition: impl Into<BeanDefinition>) -> ContainerResult<()> {
        self.bean_factory.register_bean_definition(definition.into())
    }

    /// 注册没有依赖的单例 Bean
    pub fn register_singleton<T, F>(&self, name: impl Into<String>, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies) -> Result<T> + Send + Sync + 'static,
    {
        self.register(BeanDefinition::builder(name, factory).with_scope(Scope::Singleton))
    }

    /// 注册没有依赖的原型 Bean
    pub fn register_prototype<T, F>(&self, name: impl Into<String>, factory: F) -> ContainerResult<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Dependencies) -> Result<T> + Send + Sync + 'static,
    {
        self.register(BeanDefinition::builder(name, factory).with_scope(Scope::Prototype))
    }

    /// 添加 BeanPostProcessor
    pub fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        self.bean_factory.add_bean_post_processor(processor);
    }

    /// 注册 shutdown hook，在销毁 Bean 之前执行
    pub fn register_shutdown_hook<F>(&self, hook: F)
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.shutdown_hooks.write().push(Box::new(hook));
    }

    /// 在给定的 request / session 上下文中获取 Bean
    pub fn get_bean_in(&self, name: &str, contexts: &[ContextToken]) -> ContainerResult<BeanRef> {
        self.bean_factory.get_bean_in(name, contexts)
    }

    /// 进入 request / session 上下文
    pub fn enter_context(&self, token: &ContextToken) -> ContainerResult<()> {
        self.bean_factory.enter_context(token)
    }

    /// 退出上下文，按创建逆序销毁其中的 Bean
    pub fn exit_context(&self, token: &ContextToken) -> ContainerResult<()> {
        self.bean_factory.exit_context(token)
    }

    /// 预实例化所有非延迟单例，返回新创建的数量
    pub fn refresh(&self) -> ContainerResult<usize> {
        tracing::info!("Refreshing context '{}'", self.name());
        self.bean_factory.preinstantiate_singletons()
    }

    /// 静态校验依赖关系
    ///
    /// 检查：
    /// - 缺失的依赖（声明的依赖没有注册）
    /// - 循环依赖（A -> B -> C -> A），延迟依赖除外
    pub fn validate_dependencies(&self) -> ContainerResult<()> {
        self.bean_factory.validate_dependencies()?;
        tracing::info!(
            "Dependency validation passed for {} bean(s)",
            self.bean_factory.get_bean_definition_count()
        );
        Ok(())
    }

    /// 关闭上下文
    ///
    /// 依次执行 shutdown hooks、插件的关闭阶段（逆序），最后销毁 Bean。
    /// destroy 回调的失败在全部销毁完成后统一报告。
    pub fn shutdown(&self) -> ContainerResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!("Shutting down context '{}'", self.name());

        {
            let hooks = self.shutdown_hooks.read();
            tracing::debug!("Executing {} shutdown hook(s)", hooks.len());
            for (idx, hook) in hooks.iter().enumerate() {
                if let Err(e) = hook() {
                    tracing::warn!("Shutdown hook {} failed: {:#}", idx + 1, e);
                }
            }
        }

        self.plugins.read().shutdown_all(self);
        self.bean_factory.destroy_singletons()?;

        tracing::info!("Context '{}' shut down", self.name());
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

impl Default for ApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BeanFactory for ApplicationContext {
    fn get_bean(&self, name: &str) -> ContainerResult<BeanRef> {
        self.bean_factory.get_bean(name)
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.bean_factory.contains_bean(name)
    }
}

impl BeanFactoryExt for ApplicationContext {
    fn get_bean_by_type<T: Any + Send + Sync>(&self) -> ContainerResult<BeanRef> {
        self.bean_factory.get_bean_by_type::<T>()
    }

    fn contains_bean_by_type<T: Any + Send + Sync>(&self) -> bool {
        self.bean_factory.contains_bean_by_type::<T>()
    }
}

impl ListableBeanFactory for ApplicationContext {
    fn get_bean_names(&self) -> Vec<String> {
        self.bean_factory.get_bean_names()
    }

    fn get_bean_names_for_type(&self, type_id: TypeId) -> Vec<String> {
        self.bean_factory.get_bean_names_for_type(type_id)
    }

    fn get_bean_definition_count(&self) -> usize {
        self.bean_factory.get_bean_definition_count()
    }
}

/// 应用上下文构建器
pub struct ApplicationContextBuilder {
    config: ContainerConfig,
    definitions: Vec<BeanDefinition>,
    plugins: PluginRegistry,
}

impl ApplicationContextBuilder {
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
            definitions: Vec::new(),
            plugins: PluginRegistry::new(),
        }
    }

    /// 设置配置
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// 从 TOML 文件读取配置
    pub fn config_file(self, path: impl AsRef<std::path::Path>) -> ContainerResult<Self> {
        Ok(self.config(ContainerConfig::from_file(path)?))
    }

    /// 添加插件
    pub fn plugin(mut self, plugin: impl ApplicationPlugin + 'static) -> Self {
        self.plugins.register(Box::new(plugin));
        self
    }

    /// 注册 Bean
    pub fn register(mut self, definition: impl Into<BeanDefinition>) -> ContainerResult<Self> {
        let definition = definition.into();
        if definition.name().trim().is_empty() {
            return Err(ContainerError::InvalidDefinition {
                name: definition.name().to_string(),
                reason: "bean name must not be empty".to_string(),
            });
        }
        self.definitions.push(definition);
        Ok(self)
    }

    /// 构建上下文
    ///
    /// 顺序：按 `[logging]` 安装日志 → 注册 Bean 定义 → 按优先级配置插件 →
    /// 按配置预实例化单例。已有全局订阅者时保留原订阅者。
    pub fn build(mut self) -> ContainerResult<Arc<ApplicationContext>> {
        if self.config.logging.install {
            if let Err(err) = self.config.logging.clone().init() {
                tracing::debug!("Keeping the existing logging subscriber: {}", err);
            }
        }

        let context = ApplicationContext::with_config(self.config);
        for definition in self.definitions {
            context.register(definition)?;
        }

        self.plugins.sort_by_priority();
        self.plugins.configure_all(&context)?;
        *context.plugins.write() = self.plugins;

        if context.config.container.preinstantiate_singletons {
            context.refresh()?;
        }

        tracing::info!(
            "Context '{}' ready with {} bean definition(s)",
            context.name(),
            context.get_bean_definition_count()
        );
        Ok(Arc::new(context))
    }
}

impl Default for ApplicationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}
