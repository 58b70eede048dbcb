//! 连接点（Joinpoint）定义
//!
//! 每次经过代理的调用都会创建一个新的连接点，advice 通过它读取调用上下文。

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use weft_core::{CallError, Class, Object, Value};

use crate::error_info::ErrorInfo;

/// 连接点当前所处的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinpointState {
    #[default]
    Unset,
    Before,
    Pointcut,
    After,
    AfterReturning,
    AfterThrowing,
}

/// 连接点信息
#[derive(Clone)]
pub struct Joinpoint {
    /// 成员名
    pub name: String,

    /// `<类名>.<成员名>`
    pub full_name: String,

    /// 被调用的实例；构造函数连接点在实例创建前为空
    pub target: Option<Arc<Object>>,

    pub target_type: Class,

    /// 调用参数（可能已被 Around / Pointcut advice 替换）
    pub args: Vec<Value>,

    pub state: JoinpointState,

    /// 当前的返回值
    pub returning: Option<Value>,

    /// 调用抛出的错误
    pub throwing: Option<CallError>,

    /// 外层代理调用的连接点
    pub prov_joinpoint: Option<Arc<Joinpoint>>,

    /// 调用时间戳
    pub timestamp: Instant,
}

impl Joinpoint {
    /// 创建新的连接点
    pub fn new(target_type: &Class, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: format!("{}.{}", target_type.name(), name),
            name,
            target: None,
            target_type: target_type.clone(),
            args: Vec::new(),
            state: JoinpointState::Unset,
            returning: None,
            throwing: None,
            prov_joinpoint: None,
            timestamp: Instant::now(),
        }
    }

    pub fn with_target(mut self, target: &Arc<Object>) -> Self {
        self.target = Some(Arc::clone(target));
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_prov(mut self, prov: Option<Arc<Joinpoint>>) -> Self {
        self.prov_joinpoint = prov;
        self
    }

    /// 获取完整的方法签名
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_type.name(), self.name)
    }

    /// 尝试获取第 `index` 个参数
    pub fn arg<T: Any>(&self, index: usize) -> Option<&T> {
        self.args.get(index)?.downcast_ref::<T>()
    }

    /// 尝试获取当前返回值
    pub fn returning_as<T: Any>(&self) -> Option<&T> {
        self.returning.as_ref()?.downcast_ref::<T>()
    }

    /// 抛出错误的结构化信息
    pub fn error_info(&self) -> Option<ErrorInfo> {
        self.throwing.as_ref().map(ErrorInfo::from_call_error)
    }

    /// 从调用开始到现在经过的时间
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }

    /// 沿外层连接点向上，找到第一个满足条件的
    pub fn find_prov(&self, predicate: impl Fn(&Joinpoint) -> bool) -> Option<&Joinpoint> {
        let mut current = self.prov_joinpoint.as_deref();
        while let Some(joinpoint) = current {
            if predicate(joinpoint) {
                return Some(joinpoint);
            }
            current = joinpoint.prov_joinpoint.as_deref();
        }
        None
    }
}

impl fmt::Debug for Joinpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Joinpoint")
            .field("full_name", &self.full_name)
            .field("state", &self.state)
            .field("args", &self.args.len())
            .field("returning", &self.returning)
            .field("throwing", &self.throwing.as_ref().map(|e| e.to_string()))
            .field(
                "prov",
                &self.prov_joinpoint.as_ref().map(|p| p.full_name.clone()),
            )
            .finish()
    }
}

impl fmt::Display for Joinpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joinpoint_names_and_args() {
        let room = Class::builder("Room").build();
        let jp = Joinpoint::new(&room, "enter").with_args(vec![Value::new(3i32)]);

        assert_eq!(jp.full_name, "Room.enter");
        assert_eq!(jp.signature(), "Room::enter");
        assert_eq!(jp.to_string(), "Room.enter");
        assert_eq!(jp.arg::<i32>(0), Some(&3));
        assert!(jp.arg::<String>(0).is_none());
        assert!(jp.arg::<i32>(1).is_none());
        assert_eq!(jp.state, JoinpointState::Unset);
    }

    #[test]
    fn test_find_prov_walks_outward() {
        let house = Class::builder("House").build();
        let outer = Arc::new(Joinpoint::new(&house, "visit"));
        let middle = Arc::new(Joinpoint::new(&house, "walk").with_prov(Some(Arc::clone(&outer))));
        let inner = Joinpoint::new(&house, "open").with_prov(Some(middle));

        let found = inner.find_prov(|jp| jp.name == "visit").unwrap();
        assert_eq!(found.full_name, "House.visit");
        assert!(inner.find_prov(|jp| jp.name == "open").is_none());
    }
}
