//! 装饰器与生命周期动作的名称
//!
//! 装饰器注册表和动作树都按这些名称寻址，插件新增动作时也应在这里登记名称。

/// 普通可注入类的装饰器（未显式指定时的默认值）
pub const INJECTABLE: &str = "@Injectable";

/// 切面类的装饰器
pub const ASPECT: &str = "@Aspect";

// 动作树的分组节点
pub const CLASS_NODE: &str = "class";
pub const PARAMETER_NODE: &str = "parameter";
pub const PROPERTY_NODE: &str = "property";
pub const METHOD_NODE: &str = "method";

// class 节点下的阶段
pub const DESIGN_PHASE: &str = "design";
pub const RUNTIME_PHASE: &str = "runtime";
pub const BEFORE_CONSTRUCTOR_PHASE: &str = "before-constructor";
pub const AFTER_CONSTRUCTOR_PHASE: &str = "after-constructor";

// 核心动作
pub const BIND_PROVIDER: &str = "bind-provider";
pub const BIND_PARAMETER_TYPE: &str = "bind-parameter-type";
pub const INJECT_PROPERTY: &str = "inject-property";

// 切面相关动作，由 AOP 插件安装
pub const REGISTER_ASPECT: &str = "register-aspect";
pub const BEFORE_CONSTRUCTOR_ADVICE: &str = "before-constructor-advice";
pub const AFTER_CONSTRUCTOR_ADVICE: &str = "after-constructor-advice";
pub const BIND_METHOD_POINTCUT: &str = "bind-method-pointcut";

/// 构造函数在连接点中的名称
pub const CONSTRUCTOR: &str = "constructor";

/// 配置键前缀
pub const CONTAINER_CONFIG_PREFIX: &str = "weft.container";
pub const LOGGING_CONFIG_PREFIX: &str = "weft.logging";
