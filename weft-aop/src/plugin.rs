//! AOP Plugin - 通过插件机制把 AOP 集成到容器
//!
//! 安装时为容器创建一个 [`Advisor`]，把四个切面动作挂到动作管线上，
//! 并登记到对应的装饰器：
//!
//! - `@Injectable`：构造函数 advice、成员织入
//! - `@Aspect`：提供者绑定、参数解析、属性注入、切面登记（切面自身不被织入）
//!
//! ```ignore
//! use weft_core::Container;
//! use weft_aop::AopPlugin;
//!
//! let container = Container::builder()
//!     .plugin(AopPlugin::new())
//!     .build()?;
//! ```
//!
//! 插件应在注册任何类之前安装：切面在注册时（design 阶段）被登记。

use std::sync::Arc;

use weft_core::{
    Container, ContainerPlugin, ContainerResult, Provide, Value, AFTER_CONSTRUCTOR_ADVICE,
    AFTER_CONSTRUCTOR_PHASE, ASPECT, BEFORE_CONSTRUCTOR_ADVICE, BEFORE_CONSTRUCTOR_PHASE,
    BIND_METHOD_POINTCUT, BIND_PARAMETER_TYPE, BIND_PROVIDER, CLASS_NODE, DESIGN_PHASE,
    INJECTABLE, INJECT_PROPERTY, METHOD_NODE, REGISTER_ASPECT,
};

use crate::actions::{
    AfterConstructorAdviceAction, BeforeConstructorAdviceAction, BindMethodPointcutAction,
    RegisterAspectAction,
};
use crate::advisor::Advisor;
use crate::aspect::{AdviceLookup, DeclaredAdvice};

/// 容器中 [`Advisor`] 的注册键
pub const ADVISOR_TOKEN: &str = "weft.aop.advisor";

/// AOP 容器插件
pub struct AopPlugin {
    /// 插件名称
    name: String,
    /// 是否启用
    enabled: bool,
    lookup: Arc<dyn AdviceLookup>,
}

impl AopPlugin {
    /// 创建新的 AOP 插件
    pub fn new() -> Self {
        Self {
            name: "AopPlugin".to_string(),
            enabled: true,
            lookup: Arc::new(DeclaredAdvice),
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

    /// 替换读取切面 advice 声明的方式
    pub fn with_lookup(mut self, lookup: impl AdviceLookup + 'static) -> Self {
        self.lookup = Arc::new(lookup);
        self
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

impl ContainerPlugin for AopPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn install(&self, container: &Container) -> ContainerResult<()> {
        if !self.enabled {
            tracing::info!("AOP Plugin is disabled, skipping initialization");
            return Ok(());
        }

        tracing::info!("[{}] Initializing AOP support...", self.name);
        let advisor = Arc::new(Advisor::new(Arc::clone(&self.lookup)));

        container.register_action(
            &[CLASS_NODE, DESIGN_PHASE],
            Arc::new(RegisterAspectAction::new(Arc::clone(&advisor))),
        );
        container.register_action(
            &[CLASS_NODE, BEFORE_CONSTRUCTOR_PHASE],
            Arc::new(BeforeConstructorAdviceAction::new(Arc::clone(&advisor))),
        );
        container.register_action(
            &[CLASS_NODE, AFTER_CONSTRUCTOR_PHASE],
            Arc::new(AfterConstructorAdviceAction::new(Arc::clone(&advisor))),
        );
        container.register_action(
            &[METHOD_NODE],
            Arc::new(BindMethodPointcutAction::new(Arc::clone(&advisor))),
        );

        for action in [BEFORE_CONSTRUCTOR_ADVICE, AFTER_CONSTRUCTOR_ADVICE, BIND_METHOD_POINTCUT] {
            container.enable_action(INJECTABLE, action);
        }
        for action in [BIND_PROVIDER, BIND_PARAMETER_TYPE, INJECT_PROPERTY, REGISTER_ASPECT] {
            container.enable_action(ASPECT, action);
        }

        container.register(ADVISOR_TOKEN, Provide::Value(Value::from_arc(advisor)))?;
        tracing::info!("[{}] AOP support initialized", self.name);
        Ok(())
    }
}

/// 取出容器的 [`Advisor`]，未安装 AOP 插件时返回 `None`
pub fn advisor_of(container: &Container) -> Option<Arc<Advisor>> {
    container.get_value::<Advisor>(ADVISOR_TOKEN).ok()
}
