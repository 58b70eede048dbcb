//! 类型擦除的值与方法返回结果

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};

use crate::error::{CallError, CallResult};
use crate::object::Object;

/// 共享的类型擦除值
///
/// 参数、解析出的实例、属性值和返回值都以 `Value` 传递，克隆只增加引用计数。
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: type_name::<T>(),
        }
    }

    /// 表示"没有返回值"
    pub fn unit() -> Self {
        Self::new(())
    }

    pub fn is_unit(&self) -> bool {
        self.is::<()>()
    }

    pub fn is<T: Any>(&self) -> bool {
        (*self.inner).is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        (*self.inner).downcast_ref::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.inner).downcast::<T>().ok()
    }

    /// 作为容器构造出的实例
    pub fn as_object(&self) -> Option<Arc<Object>> {
        self.downcast::<Object>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn ptr_eq(a: &Value, b: &Value) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl From<Arc<Object>> for Value {
    fn from(object: Arc<Object>) -> Self {
        Value::from_arc(object)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<String>() {
            return write!(f, "Value({:?})", s);
        }
        if let Some(s) = self.downcast_ref::<&'static str>() {
            return write!(f, "Value({:?})", s);
        }
        if let Some(n) = self.downcast_ref::<i64>() {
            return write!(f, "Value({})", n);
        }
        if let Some(n) = self.downcast_ref::<i32>() {
            return write!(f, "Value({})", n);
        }
        if let Some(object) = self.downcast_ref::<Object>() {
            return write!(f, "Value(<{}>)", object.class().name());
        }
        write!(f, "Value(<{}>)", self.type_name)
    }
}

/// 方法的返回结果
///
/// 普通值、延迟值（单次完成）与推送流（多次发射）三种形态，
/// 织入层据此选择不同的后置 advice 策略。
pub enum Outcome {
    Ready(Value),
    Deferred(BoxFuture<'static, CallResult<Value>>),
    Stream(BoxStream<'static, CallResult<Value>>),
}

impl Outcome {
    pub fn value(value: Value) -> Self {
        Outcome::Ready(value)
    }

    pub fn of<T: Any + Send + Sync>(value: T) -> Self {
        Outcome::Ready(Value::new(value))
    }

    pub fn unit() -> Self {
        Outcome::Ready(Value::unit())
    }

    pub fn deferred<F>(future: F) -> Self
    where
        F: std::future::Future<Output = CallResult<Value>> + Send + 'static,
    {
        Outcome::Deferred(future.boxed())
    }

    pub fn stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = CallResult<Value>> + Send + 'static,
    {
        Outcome::Stream(stream.boxed())
    }

    /// 由若干值组成的有限流
    pub fn iter<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        Outcome::Stream(stream::iter(values.into_iter().map(Ok)).boxed())
    }

    pub fn as_ready(&self) -> Option<&Value> {
        match self {
            Outcome::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_ready(self) -> Option<Value> {
        match self {
            Outcome::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Outcome::Ready(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Ready(_) => "ready",
            Outcome::Deferred(_) => "deferred",
            Outcome::Stream(_) => "stream",
        }
    }

    /// 等待最终值；流取最后一次发射，空流得到 unit
    pub async fn resolve(self) -> CallResult<Value> {
        match self {
            Outcome::Ready(value) => Ok(value),
            Outcome::Deferred(future) => future.await,
            Outcome::Stream(mut stream) => {
                let mut last = Value::unit();
                while let Some(item) = stream.next().await {
                    last = item?;
                }
                Ok(last)
            }
        }
    }

    /// 统一转换为流
    pub fn into_stream(self) -> BoxStream<'static, CallResult<Value>> {
        match self {
            Outcome::Ready(value) => stream::once(async move { Ok(value) }).boxed(),
            Outcome::Deferred(future) => future.into_stream().boxed(),
            Outcome::Stream(stream) => stream,
        }
    }

    /// 收集所有发射值，遇到错误立即返回
    pub async fn collect(self) -> CallResult<Vec<Value>> {
        let mut stream = self.into_stream();
        let mut values = Vec::new();
        while let Some(item) = stream.next().await {
            values.push(item?);
        }
        Ok(values)
    }
}

impl From<Value> for Outcome {
    fn from(value: Value) -> Self {
        Outcome::Ready(value)
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Outcome::Deferred(_) => f.write_str("Deferred(..)"),
            Outcome::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// 发射一个错误的流
pub fn error_stream(error: CallError) -> BoxStream<'static, CallResult<Value>> {
    stream::once(async move { Err(error) }).boxed()
}
