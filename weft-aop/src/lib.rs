//! Weft AOP - 面向切面编程支持
//!
//! 在 weft-core 容器上提供 AOP 能力：
//! - 声明式切面定义（`@Aspect` 类 + advice 声明）
//! - 六种通知类型（Before、Pointcut、Around、After、AfterReturning、AfterThrowing）
//! - 通配符与正则两种切点表达式
//! - 构造时织入：被匹配的成员在实例上被代理，类描述符保持不变
//! - 延迟值与推送流返回值的后置通知
//!
//! 通过 [`AopPlugin`] 安装到容器。

pub mod actions;
pub mod advice;
pub mod advisor;
pub mod aspect;
pub mod error_info;
pub mod joinpoint;
pub mod plugin;
pub mod pointcut;
pub mod proceeding;
pub mod registry;
pub mod weaver;

// 重新导出核心类型
pub use advice::{
    AdviceHandler, AdviceKind, AdviceMetadata, AdviceOutput, Advicer, Advices, CallPhase,
    PointcutMatch,
};
pub use advisor::Advisor;
pub use aspect::{
    logging_aspect, performance_aspect, AdviceLookup, AspectClassExt, AspectMetadata,
    DeclaredAdvice,
};
pub use error_info::ErrorInfo;
pub use joinpoint::{Joinpoint, JoinpointState};
pub use plugin::{advisor_of, AopPlugin, ADVISOR_TOKEN};
pub use pointcut::{Pointcut, PointcutError, PointcutMatcher};
pub use proceeding::{Proceeding, Recognizer, ReturnShape};
pub use registry::AdviceRegistry;
pub use weaver::{weave, BoundAdvice, BoundAdvices, MethodProxy};

/// 预导入模块
pub mod prelude {
    pub use crate::advice::{AdviceKind, AdviceOutput};
    pub use crate::aspect::{logging_aspect, performance_aspect, AspectClassExt};
    pub use crate::error_info::ErrorInfo;
    pub use crate::joinpoint::{Joinpoint, JoinpointState};
    pub use crate::plugin::AopPlugin;
    pub use crate::pointcut::Pointcut;
}
