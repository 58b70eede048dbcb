//! 插件机制
//!
//! 插件在容器构建时（或之后通过 `Container::use_plugin`）安装，
//! 通常用来注册生命周期动作并把动作登记到装饰器上。

use std::sync::Arc;

use crate::container::Container;
use crate::error::ContainerResult;

/// 容器插件 trait
pub trait ContainerPlugin: Send + Sync {
    /// 插件名称，同名插件只会安装一次
    fn name(&self) -> &str;

    /// 插件优先级（数字越小越先安装）
    fn priority(&self) -> i32 {
        100
    }

    /// 安装插件
    fn install(&self, container: &Container) -> ContainerResult<()>;
}

/// 插件注册表
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn ContainerPlugin>>,
}

impl PluginRegistry {
    /// 创建新的插件注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件
    pub fn register(&mut self, plugin: Arc<dyn ContainerPlugin>) {
        tracing::debug!("Registering plugin: {}", plugin.name());
        self.plugins.push(plugin);
    }

    /// 按优先级排序插件
    pub fn sort_by_priority(&mut self) {
        self.plugins.sort_by_key(|p| p.priority());
    }

    /// 获取所有插件
    pub fn plugins(&self) -> &[Arc<dyn ContainerPlugin>] {
        &self.plugins
    }

    /// 按优先级安装所有插件
    pub fn install_all(&mut self, container: &Container) -> ContainerResult<()> {
        self.sort_by_priority();
        for plugin in &self.plugins {
            container.use_plugin(plugin.as_ref())?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.name()))
            .finish()
    }
}
