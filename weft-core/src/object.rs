//! 容器构造出的实例
//!
//! 实例持有类描述符、构造函数返回的状态、注入的字段，以及织入时安装在
//! 实例上的拦截器。调用成员时先查拦截器，再查类的成员表，类描述符本身
//! 从不被修改。

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, Mutex, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

use crate::class::{Class, MemberSlot};
use crate::error::{CallResult, ContainerError};
use crate::value::{Outcome, Value};

/// 可调用成员的统一契约
///
/// 原始方法与织入后的代理都实现此 trait，代理因此可以透明地替换原始成员。
pub trait Invocable: Send + Sync {
    fn invoke(&self, target: &Arc<Object>, args: Vec<Value>) -> CallResult<Outcome>;
}

impl<F> Invocable for F
where
    F: Fn(&Arc<Object>, Vec<Value>) -> CallResult<Outcome> + Send + Sync,
{
    fn invoke(&self, target: &Arc<Object>, args: Vec<Value>) -> CallResult<Outcome> {
        self(target, args)
    }
}

pub struct Object {
    class: Class,
    state: RwLock<Box<dyn Any + Send + Sync>>,
    fields: RwLock<HashMap<String, Value>>,
    interceptors: RwLock<HashMap<(String, MemberSlot), Arc<dyn Invocable>>>,
    /// 外层代理调用的连接点，供内层调用向上追溯
    joinpoint: Mutex<Option<Value>>,
}

impl Object {
    pub fn new(class: Class, state: Box<dyn Any + Send + Sync>) -> Self {
        Self {
            class,
            state: RwLock::new(state),
            fields: RwLock::new(HashMap::new()),
            interceptors: RwLock::new(HashMap::new()),
            joinpoint: Mutex::new(None),
        }
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    pub fn is_instance_of(&self, class: &Class) -> bool {
        self.class.is_subclass_of(class)
    }

    /// 读取状态；类型不符时返回 `None`
    pub fn state<T: Any>(&self) -> Option<MappedRwLockReadGuard<'_, T>> {
        RwLockReadGuard::try_map(self.state.read(), |state| (**state).downcast_ref::<T>()).ok()
    }

    pub fn state_mut<T: Any>(&self) -> Option<MappedRwLockWriteGuard<'_, T>> {
        RwLockWriteGuard::try_map(self.state.write(), |state| (**state).downcast_mut::<T>()).ok()
    }

    pub fn with_state<T: Any, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.state::<T>().map(|state| f(&state))
    }

    pub fn with_state_mut<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.state_mut::<T>().map(|mut state| f(&mut state))
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    pub fn field_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.field(name).and_then(|value| value.downcast::<T>())
    }

    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.fields.write().insert(name.into(), value);
    }

    /// 当前生效的成员：拦截器优先，其次是类（含基类）的成员表
    pub fn member(&self, name: &str, slot: MemberSlot) -> Option<Arc<dyn Invocable>> {
        let intercepted = self
            .interceptors
            .read()
            .get(&(name.to_string(), slot))
            .cloned();
        intercepted.or_else(|| self.class.member(name, slot))
    }

    /// 在实例上安装拦截器
    pub fn decorate(&self, name: impl Into<String>, slot: MemberSlot, invocable: Arc<dyn Invocable>) {
        let name = name.into();
        tracing::trace!("Installing {} interceptor for {}.{}", slot, self.class.name(), name);
        self.interceptors.write().insert((name, slot), invocable);
    }

    pub fn is_decorated(&self, name: &str, slot: MemberSlot) -> bool {
        self.interceptors.read().contains_key(&(name.to_string(), slot))
    }

    fn missing(&self, name: &str) -> ContainerError {
        ContainerError::MissingMethod {
            class: self.class.name().to_string(),
            method: name.to_string(),
        }
    }

    /// 调用方法
    pub fn invoke(self: &Arc<Self>, name: &str, args: Vec<Value>) -> CallResult<Outcome> {
        let member = self
            .member(name, MemberSlot::Method)
            .ok_or_else(|| self.missing(name))?;
        member.invoke(self, args)
    }

    /// 读取属性：有 getter 走 getter，否则读注入的字段
    pub fn get_property(self: &Arc<Self>, name: &str) -> CallResult<Outcome> {
        if let Some(getter) = self.member(name, MemberSlot::Getter) {
            return getter.invoke(self, Vec::new());
        }
        self.field(name)
            .map(Outcome::Ready)
            .ok_or_else(|| self.missing(name).into())
    }

    /// 写入属性：有 setter 走 setter，否则直接写字段
    pub fn set_property(self: &Arc<Self>, name: &str, value: Value) -> CallResult<()> {
        if let Some(setter) = self.member(name, MemberSlot::Setter) {
            setter.invoke(self, vec![value])?;
            return Ok(());
        }
        self.set_field(name, value);
        Ok(())
    }

    /// 替换连接点槽位，返回旧值
    pub fn swap_joinpoint(&self, joinpoint: Option<Value>) -> Option<Value> {
        std::mem::replace(&mut *self.joinpoint.lock(), joinpoint)
    }

    pub fn current_joinpoint(&self) -> Option<Value> {
        self.joinpoint.lock().clone()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.class.name())
            .field("fields", &self.fields.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
