//! 方法代理与织入
//!
//! 织入发生在实例构造期间：对每个有 advice 的成员，把原始成员包进一个
//! [`MethodProxy`] 并安装在实例上。代理和原始成员实现同一个 `Invocable`
//! 契约，类描述符不被修改。
//!
//! 每次调用的流程：
//!
//! 1. 创建连接点，外层代理调用的连接点作为 `prov_joinpoint`
//! 2. Around + Before（可由 Around 替换参数）
//! 3. Pointcut（可替换参数）
//! 4. 调用原始成员
//! 5. 成功：由返回值策略在结果完成后运行 Around（状态 After）和
//!    Around + AfterReturning；失败：Around + AfterThrowing
//! 6. After，无论成功失败都运行，延迟值和流要等到完成或结束
//! 7. 失败时重新抛出原始错误，否则返回（可能被替换的）结果
//!
//! advice 自身出错时，中止本阶段剩余的 advice 并像方法错误一样传播。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use weft_core::{
    CallResult, Class, Container, ContainerResult, Invocable, MemberSlot, Object, Outcome, Value,
    CONSTRUCTOR,
};

use crate::advice::{AdviceKind, AdviceOutput, Advicer, Advices, CallPhase};
use crate::joinpoint::Joinpoint;
use crate::proceeding::{AfterChain, Recognizer};
use crate::registry::AdviceRegistry;

/// 绑定了切面实例的 advice
#[derive(Clone)]
pub struct BoundAdvice {
    advicer: Advicer,
    aspect: Arc<Object>,
}

impl BoundAdvice {
    pub fn new(advicer: Advicer, aspect: Arc<Object>) -> Self {
        Self { advicer, aspect }
    }

    pub fn kind(&self) -> AdviceKind {
        self.advicer.advice.kind
    }

    pub fn advicer(&self) -> &Advicer {
        &self.advicer
    }

    pub fn aspect(&self) -> &Arc<Object> {
        &self.aspect
    }

    pub fn describe(&self) -> String {
        self.advicer.describe()
    }

    pub fn call(&self, joinpoint: &Joinpoint) -> CallResult<AdviceOutput> {
        (self.advicer.advice.handler)(&self.aspect, joinpoint)
    }
}

impl fmt::Debug for BoundAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAdvice")
            .field("kind", &self.kind())
            .field("advice", &self.describe())
            .finish()
    }
}

/// 一个连接点上全部绑定好的 advice
#[derive(Debug, Clone, Default)]
pub struct BoundAdvices {
    advices: Advices,
    /// 切面 token 键 -> 切面实例
    aspects: HashMap<String, Arc<Object>>,
}

impl BoundAdvices {
    /// 从容器解析切面实例并绑定，同一个切面只解析一次
    pub fn bind(container: &Container, advices: &Advices) -> ContainerResult<Self> {
        let mut aspects: HashMap<String, Arc<Object>> = HashMap::new();

        for kind in AdviceKind::ALL {
            for advicer in advices.get(kind) {
                let key = advicer.aspect_token.key().to_string();
                if !aspects.contains_key(&key) {
                    let aspect = container.get_object(advicer.aspect_token.clone())?;
                    aspects.insert(key, aspect);
                }
            }
        }
        Ok(Self {
            advices: advices.clone(),
            aspects,
        })
    }

    /// 某个阶段要运行的 advice，按阶段表的种类顺序
    pub fn phase(&self, phase: CallPhase) -> Vec<BoundAdvice> {
        self.advices
            .for_phase(phase)
            .into_iter()
            .filter_map(|advicer| {
                let aspect = self.aspects.get(&advicer.aspect_token.key().to_string())?;
                Some(BoundAdvice::new(advicer, Arc::clone(aspect)))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.advices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advices.is_empty()
    }
}

/// 运行一个阶段的 advice
///
/// 只有本阶段允许替换参数的种类返回的参数数组会生效，其余返回值被忽略。
pub(crate) fn run_phase(advices: &[BoundAdvice], phase: CallPhase, jp: &mut Joinpoint) -> CallResult<()> {
    jp.state = phase.state();
    for advice in advices {
        if let AdviceOutput::Args(args) = advice.call(jp)? {
            if phase.replaces_args(advice.kind()) {
                tracing::trace!("{} replaced the arguments of {}", advice.describe(), jp.full_name);
                jp.args = args;
            }
        }
    }
    Ok(())
}

/// 调用期间把连接点放在实例上，供内层代理调用读取
struct JoinpointSlot<'a> {
    target: &'a Arc<Object>,
    previous: Option<Value>,
}

impl<'a> JoinpointSlot<'a> {
    fn enter(target: &'a Arc<Object>, jp: &Joinpoint) -> Self {
        let previous = target.swap_joinpoint(Some(Value::new(jp.clone())));
        Self { target, previous }
    }
}

impl Drop for JoinpointSlot<'_> {
    fn drop(&mut self) {
        self.target.swap_joinpoint(self.previous.take());
    }
}

/// 织入后的成员
pub struct MethodProxy {
    name: String,
    slot: MemberSlot,
    target_type: Class,
    original: Arc<dyn Invocable>,
    advices: BoundAdvices,
}

impl MethodProxy {
    pub fn new(
        name: impl Into<String>,
        slot: MemberSlot,
        target_type: Class,
        original: Arc<dyn Invocable>,
        advices: BoundAdvices,
    ) -> Self {
        Self {
            name: name.into(),
            slot,
            target_type,
            original,
            advices,
        }
    }

    pub fn advices(&self) -> &BoundAdvices {
        &self.advices
    }

    fn phase(&self, phase: CallPhase, jp: &mut Joinpoint) -> CallResult<()> {
        run_phase(&self.advices.phase(phase), phase, jp)
    }

    /// 调用返回后的 advice 链
    fn after_chain(&self, joinpoint: Joinpoint) -> AfterChain {
        AfterChain {
            joinpoint,
            returned: self.advices.phase(CallPhase::Returned).into(),
            returning: self.advices.phase(CallPhase::AfterReturning).into(),
            throwing: self.advices.phase(CallPhase::AfterThrowing).into(),
            finally: self.advices.phase(CallPhase::Finally).into(),
        }
    }
}

impl Invocable for MethodProxy {
    fn invoke(&self, target: &Arc<Object>, args: Vec<Value>) -> CallResult<Outcome> {
        let prov = target
            .current_joinpoint()
            .and_then(|value| value.downcast::<Joinpoint>());
        let mut jp = Joinpoint::new(&self.target_type, self.name.clone())
            .with_target(target)
            .with_args(args)
            .with_prov(prov);
        tracing::trace!("Intercepted {} {}", self.slot, jp.full_name);

        let invoked = self
            .phase(CallPhase::Before, &mut jp)
            .and_then(|()| self.phase(CallPhase::Pointcut, &mut jp))
            .and_then(|()| {
                let _slot = JoinpointSlot::enter(target, &jp);
                self.original.invoke(target, jp.args.clone())
            });

        let chain = self.after_chain(jp);
        match invoked {
            // 延迟值和流在完成后才运行返回后的阶段和 After
            Ok(outcome) => {
                let shape = Recognizer::recognize(&outcome);
                Recognizer::strategy(shape).proceed(outcome, chain)
            }
            Err(error) => {
                let error = chain.throw(error);
                chain.finish(Err(error), None)
            }
        }
    }
}

impl fmt::Debug for MethodProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodProxy")
            .field("member", &format!("{}.{}", self.target_type.name(), self.name))
            .field("slot", &self.slot)
            .field("advices", &self.advices.len())
            .finish()
    }
}

/// 为实例上所有有 advice 的成员安装代理，返回安装的数量
pub fn weave(
    container: &Container,
    registry: &AdviceRegistry,
    instance: &Arc<Object>,
) -> ContainerResult<usize> {
    let class = instance.class().clone();
    let mut woven = 0;

    for (name, slot) in class.members() {
        if name == CONSTRUCTOR {
            continue;
        }
        let full_name = format!("{}.{}", class.name(), name);
        let Some(advices) = registry.get(&full_name).filter(|a| !a.is_empty()) else {
            continue;
        };
        let Some(original) = instance.member(&name, slot) else {
            continue;
        };

        let bound = BoundAdvices::bind(container, &advices)?;
        let proxy = MethodProxy::new(name.clone(), slot, class.clone(), original, bound);
        instance.decorate(name, slot, Arc::new(proxy));
        woven += 1;
    }

    if woven > 0 {
        tracing::debug!("Woven {} member(s) of {}", woven, class.name());
    }
    Ok(woven)
}
