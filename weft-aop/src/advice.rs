//! 通知（Advice）定义
//!
//! advice 的种类是一个封闭枚举，调用过程中每个阶段运行哪些种类由
//! [`CallPhase`] 的阶段表决定：
//!
//! | 阶段             | 运行的种类                | 连接点状态       |
//! |------------------|---------------------------|------------------|
//! | `Before`         | Around, Before            | Before           |
//! | `Pointcut`       | Pointcut                  | Pointcut         |
//! | `Returned`       | Around                    | After            |
//! | `AfterReturning` | Around, AfterReturning    | AfterReturning   |
//! | `AfterThrowing`  | Around, AfterThrowing     | AfterThrowing    |
//! | `Finally`        | After                     | After            |

use std::fmt;
use std::sync::Arc;

use weft_core::{CallResult, Class, Object, Outcome, Token, Value};

use crate::joinpoint::{Joinpoint, JoinpointState};
use crate::pointcut::Pointcut;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceKind {
    /// 前置通知
    Before,
    /// 切点通知（可替换参数）
    Pointcut,
    /// 环绕通知（在多个阶段运行，可替换参数）
    Around,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（可替换返回值）
    AfterReturning,
    /// 异常通知
    AfterThrowing,
}

impl AdviceKind {
    pub const ALL: [AdviceKind; 6] = [
        AdviceKind::Before,
        AdviceKind::Pointcut,
        AdviceKind::Around,
        AdviceKind::After,
        AdviceKind::AfterReturning,
        AdviceKind::AfterThrowing,
    ];

    /// 返回的参数数组会替换后续调用的参数
    pub fn can_replace_args(self) -> bool {
        matches!(self, AdviceKind::Around | AdviceKind::Pointcut)
    }
}

impl fmt::Display for AdviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdviceKind::Before => "Before",
            AdviceKind::Pointcut => "Pointcut",
            AdviceKind::Around => "Around",
            AdviceKind::After => "After",
            AdviceKind::AfterReturning => "AfterReturning",
            AdviceKind::AfterThrowing => "AfterThrowing",
        };
        f.write_str(name)
    }
}

/// 一次代理调用中的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Before,
    Pointcut,
    Returned,
    AfterReturning,
    AfterThrowing,
    Finally,
}

impl CallPhase {
    /// 本阶段运行的种类，按运行顺序
    pub fn kinds(self) -> &'static [AdviceKind] {
        match self {
            CallPhase::Before => &[AdviceKind::Around, AdviceKind::Before],
            CallPhase::Pointcut => &[AdviceKind::Pointcut],
            CallPhase::Returned => &[AdviceKind::Around],
            CallPhase::AfterReturning => &[AdviceKind::Around, AdviceKind::AfterReturning],
            CallPhase::AfterThrowing => &[AdviceKind::Around, AdviceKind::AfterThrowing],
            CallPhase::Finally => &[AdviceKind::After],
        }
    }

    pub fn state(self) -> JoinpointState {
        match self {
            CallPhase::Before => JoinpointState::Before,
            CallPhase::Pointcut => JoinpointState::Pointcut,
            CallPhase::Returned | CallPhase::Finally => JoinpointState::After,
            CallPhase::AfterReturning => JoinpointState::AfterReturning,
            CallPhase::AfterThrowing => JoinpointState::AfterThrowing,
        }
    }

    /// 本阶段中 `kind` 返回的参数数组是否生效
    pub fn replaces_args(self, kind: AdviceKind) -> bool {
        matches!(self, CallPhase::Before | CallPhase::Pointcut) && kind.can_replace_args()
    }
}

/// advice 的返回
pub enum AdviceOutput {
    /// 不做修改
    Continue,
    /// 替换参数（仅 Around / Pointcut 在调用前生效）
    Args(Vec<Value>),
    /// 替换返回值（仅返回后阶段生效）
    Return(Outcome),
}

impl AdviceOutput {
    pub fn value<T: std::any::Any + Send + Sync>(value: T) -> Self {
        AdviceOutput::Return(Outcome::of(value))
    }
}

impl fmt::Debug for AdviceOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdviceOutput::Continue => f.write_str("Continue"),
            AdviceOutput::Args(args) => f.debug_tuple("Args").field(args).finish(),
            AdviceOutput::Return(outcome) => f.debug_tuple("Return").field(outcome).finish(),
        }
    }
}

/// advice 方法：接收切面实例和连接点
pub type AdviceHandler =
    Arc<dyn Fn(&Arc<Object>, &Joinpoint) -> CallResult<AdviceOutput> + Send + Sync>;

/// 切面类上声明的一条 advice
#[derive(Clone)]
pub struct AdviceMetadata {
    pub kind: AdviceKind,
    pub pointcut: Pointcut,
    /// 声明 advice 的方法名
    pub method: String,
    pub handler: AdviceHandler,
}

impl fmt::Debug for AdviceMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceMetadata")
            .field("kind", &self.kind)
            .field("pointcut", &self.pointcut)
            .field("method", &self.method)
            .finish()
    }
}

/// 匹配到的连接点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointcutMatch {
    pub name: String,
    pub full_name: String,
}

/// 匹配结果：连接点 + advice + 声明它的切面
#[derive(Clone)]
pub struct Advicer {
    pub pointcut_match: PointcutMatch,
    pub advice: AdviceMetadata,
    pub aspect_type: Class,
    /// 解析切面实例用的 token
    pub aspect_token: Token,
}

impl Advicer {
    /// 同一种类、同一切点、同一切面的同一方法视为同一条 advice
    pub fn same_advice(&self, other: &Advicer) -> bool {
        self.advice.kind == other.advice.kind
            && self.advice.pointcut.source() == other.advice.pointcut.source()
            && self.advice.method == other.advice.method
            && self.aspect_type.id() == other.aspect_type.id()
    }

    /// `<切面>.<方法>`
    pub fn describe(&self) -> String {
        format!("{}.{}", self.aspect_type.name(), self.advice.method)
    }
}

impl fmt::Debug for Advicer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advicer")
            .field("full_name", &self.pointcut_match.full_name)
            .field("kind", &self.advice.kind)
            .field("advice", &self.describe())
            .finish()
    }
}

/// 一个完整名称下按种类分组的 advice
#[derive(Debug, Clone, Default)]
pub struct Advices {
    pub pointcut: Vec<Advicer>,
    pub before: Vec<Advicer>,
    pub after: Vec<Advicer>,
    pub around: Vec<Advicer>,
    pub after_throwing: Vec<Advicer>,
    pub after_returning: Vec<Advicer>,
}

impl Advices {
    pub fn get(&self, kind: AdviceKind) -> &[Advicer] {
        match kind {
            AdviceKind::Before => &self.before,
            AdviceKind::Pointcut => &self.pointcut,
            AdviceKind::Around => &self.around,
            AdviceKind::After => &self.after,
            AdviceKind::AfterReturning => &self.after_returning,
            AdviceKind::AfterThrowing => &self.after_throwing,
        }
    }

    fn get_mut(&mut self, kind: AdviceKind) -> &mut Vec<Advicer> {
        match kind {
            AdviceKind::Before => &mut self.before,
            AdviceKind::Pointcut => &mut self.pointcut,
            AdviceKind::Around => &mut self.around,
            AdviceKind::After => &mut self.after,
            AdviceKind::AfterReturning => &mut self.after_returning,
            AdviceKind::AfterThrowing => &mut self.after_throwing,
        }
    }

    /// 追加 advice，已存在相同的 advice 时返回 `false`
    pub fn add(&mut self, advicer: Advicer) -> bool {
        let bucket = self.get_mut(advicer.advice.kind);
        if bucket.iter().any(|existing| existing.same_advice(&advicer)) {
            return false;
        }
        bucket.push(advicer);
        true
    }

    /// 某个阶段要运行的 advice，按阶段表的种类顺序排列
    pub fn for_phase(&self, phase: CallPhase) -> Vec<Advicer> {
        phase
            .kinds()
            .iter()
            .flat_map(|kind| self.get(*kind).iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        AdviceKind::ALL.iter().map(|kind| self.get(*kind).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advicer(kind: AdviceKind, method: &str, aspect: &Class) -> Advicer {
        Advicer {
            pointcut_match: PointcutMatch {
                name: "run".to_string(),
                full_name: "Service.run".to_string(),
            },
            advice: AdviceMetadata {
                kind,
                pointcut: Pointcut::from("execution(Service.run)"),
                method: method.to_string(),
                handler: Arc::new(|_: &Arc<Object>, _: &Joinpoint| Ok(AdviceOutput::Continue)),
            },
            aspect_type: aspect.clone(),
            aspect_token: Token::from(aspect),
        }
    }

    #[test]
    fn test_add_is_idempotent() {
        let aspect = Class::builder("Timing").build();
        let mut advices = Advices::default();

        assert!(advices.add(advicer(AdviceKind::Around, "time", &aspect)));
        assert!(!advices.add(advicer(AdviceKind::Around, "time", &aspect)));
        assert!(advices.add(advicer(AdviceKind::Before, "time", &aspect)));
        assert_eq!(advices.len(), 2);
    }

    #[test]
    fn test_distinct_aspects_both_retained() {
        let first = Class::builder("First").build();
        let second = Class::builder("Second").build();
        let mut advices = Advices::default();

        assert!(advices.add(advicer(AdviceKind::Around, "wrap", &first)));
        assert!(advices.add(advicer(AdviceKind::Around, "wrap", &second)));
        assert_eq!(advices.get(AdviceKind::Around).len(), 2);
    }

    #[test]
    fn test_phase_order() {
        let aspect = Class::builder("Audit").build();
        let mut advices = Advices::default();
        advices.add(advicer(AdviceKind::Before, "before", &aspect));
        advices.add(advicer(AdviceKind::Around, "around", &aspect));
        advices.add(advicer(AdviceKind::AfterReturning, "returned", &aspect));

        let before: Vec<String> = advices
            .for_phase(CallPhase::Before)
            .iter()
            .map(|a| a.advice.method.clone())
            .collect();
        assert_eq!(before, vec!["around", "before"]);

        let returning: Vec<String> = advices
            .for_phase(CallPhase::AfterReturning)
            .iter()
            .map(|a| a.advice.method.clone())
            .collect();
        assert_eq!(returning, vec!["around", "returned"]);
        assert!(advices.for_phase(CallPhase::Finally).is_empty());
    }

    #[test]
    fn test_argument_replacement_table() {
        assert!(CallPhase::Before.replaces_args(AdviceKind::Around));
        assert!(!CallPhase::Before.replaces_args(AdviceKind::Before));
        assert!(CallPhase::Pointcut.replaces_args(AdviceKind::Pointcut));
        assert!(!CallPhase::AfterReturning.replaces_args(AdviceKind::Around));
        assert_eq!(CallPhase::Returned.state(), JoinpointState::After);
    }
}
