// weft-core: 基于 token 的依赖注入容器
//
// 提供：
// - 类 / 字符串 / Symbol / 注册变体四种 token
// - 单例、瞬态作用域以及带 TTL 的实例缓存
// - 构造参数与属性注入、提供者声明
// - 可扩展的生命周期动作管线（插件在此挂载横切行为）

pub mod actions;
pub mod cache;
pub mod class;
pub mod config;
pub mod constants;
pub mod container;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod logging;
pub mod metadata;
pub mod object;
pub mod plugin;
pub mod provider;
pub mod scope;
pub mod token;
pub mod utils;
pub mod value;

// 重新导出常用类型
pub use cache::InstanceCache;
pub use class::{
    Class, ClassBuilder, ConstructorArgs, MemberSlot, ParamDescriptor, PropertyDescriptor,
    ProviderDeclaration,
};
pub use config::{
    ConfigValue, ContainerConfig, Environment, EnvironmentPropertySource, MapPropertySource,
    PropertySource, ResolutionPolicy, TomlPropertySource,
};
pub use constants::*;
pub use container::{Container, ContainerBuilder};
pub use error::{CallError, CallResult, ContainerError, ContainerResult};
pub use lifecycle::{
    ActionContext, ActionNode, ActionPipeline, DeclarationKind, DecoratorRegistry,
    LifecycleAction, Phase,
};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metadata::{DeclaredMetadata, MetadataLookup};
pub use object::{Invocable, Object};
pub use plugin::{ContainerPlugin, PluginRegistry};
pub use provider::{ExtraProvider, FactoryFn, Provide, ProviderEntry};
pub use scope::Scope;
pub use token::{Registration, Symbol, Token, TokenKey};
pub use value::{Outcome, Value};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::class::{Class, ClassBuilder, ConstructorArgs, MemberSlot, ProviderDeclaration};
    pub use crate::config::{
        self, ConfigValue, ContainerConfig, Environment, MapPropertySource, PropertySource,
        ResolutionPolicy, TomlPropertySource,
    };
    pub use crate::container::{Container, ContainerBuilder};
    pub use crate::error::{CallError, CallResult, ContainerError, ContainerResult};
    pub use crate::lifecycle::{ActionContext, LifecycleAction};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::object::{Invocable, Object};
    pub use crate::plugin::ContainerPlugin;
    pub use crate::provider::{ExtraProvider, Provide};
    pub use crate::scope::Scope;
    pub use crate::token::{Symbol, Token};
    pub use crate::value::{Outcome, Value};
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
