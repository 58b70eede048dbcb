//! AOP 插件安装到容器管线中的生命周期动作
//!
//! | 动作 | 阶段 | 装饰器 |
//! |------|------|--------|
//! | [`RegisterAspectAction`] | class/design | `@Aspect` |
//! | [`BeforeConstructorAdviceAction`] | class/before-constructor | `@Injectable` |
//! | [`AfterConstructorAdviceAction`] | class/after-constructor | `@Injectable` |
//! | [`BindMethodPointcutAction`] | method | `@Injectable` |

use std::sync::Arc;

use weft_core::{
    ActionContext, CallError, ContainerError, ContainerResult, LifecycleAction, Value,
    AFTER_CONSTRUCTOR_ADVICE, ASPECT, BEFORE_CONSTRUCTOR_ADVICE, BIND_METHOD_POINTCUT,
    CONSTRUCTOR, REGISTER_ASPECT,
};

use crate::advice::CallPhase;
use crate::advisor::Advisor;
use crate::joinpoint::Joinpoint;
use crate::weaver::{self, run_phase, BoundAdvices};

fn is_aspect(ctx: &ActionContext) -> bool {
    ctx.decorators.iter().any(|d| d == ASPECT)
}

/// 构造函数连接点上绑定好的 advice，没有时返回 `None`
fn constructor_advices(advisor: &Advisor, ctx: &ActionContext) -> ContainerResult<Option<BoundAdvices>> {
    let full_name = format!("{}.{}", ctx.class.name(), CONSTRUCTOR);
    match advisor.registry().get(&full_name) {
        Some(advices) if !advices.is_empty() => {
            BoundAdvices::bind(&ctx.container, &advices).map(Some)
        }
        _ => Ok(None),
    }
}

fn construction_error(error: CallError) -> ContainerError {
    ContainerError::Construction(error)
}

/// 登记切面类（design 阶段）
pub struct RegisterAspectAction {
    advisor: Arc<Advisor>,
}

impl RegisterAspectAction {
    pub fn new(advisor: Arc<Advisor>) -> Self {
        Self { advisor }
    }
}

impl LifecycleAction for RegisterAspectAction {
    fn name(&self) -> &str {
        REGISTER_ASPECT
    }

    fn execute(&self, ctx: &mut ActionContext) -> ContainerResult<()> {
        self.advisor.add_aspect(&ctx.class, ctx.token.clone());
        Ok(())
    }
}

/// 匹配目标类并在构造前运行构造函数的 Before / Pointcut advice
///
/// advice 替换的参数按位置写回，构造函数收到的是替换后的参数。
pub struct BeforeConstructorAdviceAction {
    advisor: Arc<Advisor>,
}

impl BeforeConstructorAdviceAction {
    pub fn new(advisor: Arc<Advisor>) -> Self {
        Self { advisor }
    }
}

impl LifecycleAction for BeforeConstructorAdviceAction {
    fn name(&self) -> &str {
        BEFORE_CONSTRUCTOR_ADVICE
    }

    fn execute(&self, ctx: &mut ActionContext) -> ContainerResult<()> {
        if is_aspect(ctx) {
            return Ok(());
        }
        self.advisor.advise(&ctx.class);

        let Some(advices) = constructor_advices(&self.advisor, ctx)? else {
            return Ok(());
        };

        let original = ctx.arg_values();
        let mut jp = Joinpoint::new(&ctx.class, CONSTRUCTOR).with_args(original.clone());
        run_phase(&advices.phase(CallPhase::Before), CallPhase::Before, &mut jp)
            .and_then(|()| run_phase(&advices.phase(CallPhase::Pointcut), CallPhase::Pointcut, &mut jp))
            .map_err(construction_error)?;

        // 未被替换的位置保持原样（包括未解析的参数）
        for (index, value) in jp.args.into_iter().enumerate() {
            if original.get(index).is_some_and(|old| Value::ptr_eq(old, &value)) {
                continue;
            }
            match ctx.args.get_mut(index) {
                Some((_, slot)) => *slot = Some(value),
                None => ctx.args.push((format!("arg{}", index), Some(value))),
            }
        }
        Ok(())
    }
}

/// 构造完成后运行构造函数的 Around / AfterReturning / After advice
///
/// 构造函数连接点的返回值就是新实例，advice 的返回值被忽略。
pub struct AfterConstructorAdviceAction {
    advisor: Arc<Advisor>,
}

impl AfterConstructorAdviceAction {
    pub fn new(advisor: Arc<Advisor>) -> Self {
        Self { advisor }
    }
}

impl LifecycleAction for AfterConstructorAdviceAction {
    fn name(&self) -> &str {
        AFTER_CONSTRUCTOR_ADVICE
    }

    fn execute(&self, ctx: &mut ActionContext) -> ContainerResult<()> {
        if is_aspect(ctx) {
            return Ok(());
        }
        let Some(instance) = ctx.instance.clone() else {
            return Ok(());
        };
        let Some(advices) = constructor_advices(&self.advisor, ctx)? else {
            return Ok(());
        };

        let mut jp = Joinpoint::new(&ctx.class, CONSTRUCTOR)
            .with_target(&instance)
            .with_args(ctx.arg_values());
        jp.returning = Some(Value::from(Arc::clone(&instance)));

        for phase in [CallPhase::Returned, CallPhase::AfterReturning, CallPhase::Finally] {
            run_phase(&advices.phase(phase), phase, &mut jp).map_err(construction_error)?;
        }
        Ok(())
    }
}

/// 为新实例上有 advice 的成员安装代理
pub struct BindMethodPointcutAction {
    advisor: Arc<Advisor>,
}

impl BindMethodPointcutAction {
    pub fn new(advisor: Arc<Advisor>) -> Self {
        Self { advisor }
    }
}

impl LifecycleAction for BindMethodPointcutAction {
    fn name(&self) -> &str {
        BIND_METHOD_POINTCUT
    }

    fn execute(&self, ctx: &mut ActionContext) -> ContainerResult<()> {
        if is_aspect(ctx) {
            return Ok(());
        }
        let Some(instance) = ctx.instance.as_ref() else {
            return Ok(());
        };
        weaver::weave(&ctx.container, self.advisor.registry(), instance)?;
        Ok(())
    }
}
