//! 统一的错误处理类型
//!
//! 容器自身的错误使用 `ContainerError`（thiserror），
//! 用户代码（构造函数、方法、advice）使用 `anyhow`，在调用边界统一包装为 `CallError`。

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    /// 没有为 token 注册任何提供者
    #[error("No provider registered for token '{0}'")]
    UnregisteredToken(String),

    /// 调用了实例上不存在的方法
    #[error("Method '{method}' is not defined on '{class}'")]
    MissingMethod { class: String, method: String },

    /// 严格注册时键已存在
    #[error("Registration key '{0}' already exists")]
    DuplicateRegistrationKey(String),

    /// 构造参数解析形成了环
    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// 无法据此注册（例如 token 本身不是类）
    #[error("Invalid registration for '{token}': {reason}")]
    InvalidRegistration { token: String, reason: String },

    /// 解析结果的类型与期望不符
    #[error("Type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },

    /// 构造函数或工厂抛出的错误，原样传播
    #[error(transparent)]
    Construction(CallError),

    /// 生命周期动作执行失败
    #[error("Lifecycle action '{action}' failed: {message}")]
    Action { action: String, message: String },

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 日志初始化失败
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}

pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

impl ContainerError {
    /// 包装用户代码（构造函数、工厂）返回的错误
    ///
    /// 用户代码里冒泡上来的容器错误保持原样，其余错误作为构造错误原样传播。
    pub fn from_user(error: anyhow::Error) -> Self {
        match error.downcast::<ContainerError>() {
            Ok(container_error) => container_error,
            Err(other) => ContainerError::Construction(CallError::new(other)),
        }
    }
}

/// 方法调用抛出的错误
///
/// 内部以 `Arc` 共享：advice 观察到的错误与最终重新抛出给调用方的错误是同一个对象，
/// 可以用 [`CallError::ptr_eq`] 验证。
#[derive(Clone)]
pub struct CallError(Arc<anyhow::Error>);

pub type CallResult<T> = std::result::Result<T, CallError>;

impl CallError {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// 只包含一条消息的错误
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::new(anyhow::Error::msg(message))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// 两个错误是否为同一次抛出
    pub fn ptr_eq(a: &CallError, b: &CallError) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for CallError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

impl From<ContainerError> for CallError {
    fn from(error: ContainerError) -> Self {
        match error {
            // 构造错误本身就是一次调用错误，保留原对象
            ContainerError::Construction(inner) => inner,
            other => Self::new(anyhow::Error::new(other)),
        }
    }
}
