//! 插件机制
//!
//! 插件在构建上下文时按优先级配置，在关闭时逆序收尾。
//! AOP 支持就是以插件形式接入的。

use crate::context::ApplicationContext;
use crate::error::ContainerResult;

/// 应用插件 trait
///
/// 实现此 trait 以创建可插拔的容器模块
pub trait ApplicationPlugin: Send + Sync {
    /// 插件名称
    fn name(&self) -> &str;

    /// 插件优先级（数字越小优先级越高）
    fn priority(&self) -> i32 {
        100
    }

    /// 配置阶段 - 在预实例化单例之前执行
    ///
    /// 用于注册额外的 Bean、后置处理器等
    fn configure(&self, _context: &ApplicationContext) -> ContainerResult<()> {
        Ok(())
    }

    /// 关闭阶段 - 在容器销毁 Bean 之前执行
    fn on_shutdown(&self, _context: &ApplicationContext) -> ContainerResult<()> {
        Ok(())
    }
}

/// 插件注册表
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn ApplicationPlugin>>,
}

impl PluginRegistry {
    /// 创建新的插件注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件
    pub fn register(&mut self, plugin: Box<dyn ApplicationPlugin>) {
        tracing::debug!("Registering plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    /// 按优先级排序插件（稳定排序）
    pub fn sort_by_priority(&mut self) {
        self.plugins.sort_by_key(|p| p.priority());
    }

    /// 获取所有插件
    pub fn plugins(&self) -> &[Box<dyn ApplicationPlugin>] {
        &self.plugins
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// 执行配置阶段
    pub fn configure_all(&self, context: &ApplicationContext) -> ContainerResult<()> {
        for plugin in &self.plugins {
            tracing::info!("Configuring plugin: {}", plugin.name());
            plugin.configure(context)?;
        }
        Ok(())
    }

    /// 执行关闭阶段（逆序，失败只记录）
    pub fn shutdown_all(&self, context: &ApplicationContext) {
        for plugin in self.plugins.iter().rev() {
            tracing::info!("Shutting down plugin: {}", plugin.name());
            if let Err(e) = plugin.on_shutdown(context) {
                tracing::error!("Failed to shutdown plugin {}: {}", plugin.name(), e);
            }
        }
    }
}
