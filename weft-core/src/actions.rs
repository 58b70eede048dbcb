//! 核心生命周期动作

use crate::class::Class;
use crate::constants::{BIND_PARAMETER_TYPE, BIND_PROVIDER, INJECT_PROPERTY};
use crate::error::ContainerResult;
use crate::lifecycle::{ActionContext, LifecycleAction};
use crate::provider::{ExtraProvider, Provide};
use crate::token::Token;

/// 绑定类上声明的提供者（design 阶段，每个类只执行一次）
pub struct BindProviderAction;

impl LifecycleAction for BindProviderAction {
    fn name(&self) -> &str {
        BIND_PROVIDER
    }

    fn execute(&self, ctx: &mut ActionContext) -> ContainerResult<()> {
        let declarations = ctx.container.metadata().providers(&ctx.class);
        for declaration in declarations {
            let key = declaration.key_token();
            let impl_class = declaration
                .impl_class
                .clone()
                .unwrap_or_else(|| ctx.class.clone());

            tracing::debug!(
                "Binding provider {} -> {} (declared on {})",
                key,
                impl_class.name(),
                ctx.class.name()
            );

            match declaration.singleton {
                Some(true) => ctx
                    .container
                    .register_singleton(key, Provide::Class(impl_class))?,
                Some(false) => ctx.container.register(key, Provide::Class(impl_class))?,
                None => {
                    let target = self_or_registered(ctx, impl_class)?;
                    ctx.container.bind_provider(key, Provide::Alias(target))?
                }
            }
        }
        Ok(())
    }
}

/// 别名指向的 token
///
/// 声明类自身用它正在注册的 token（可能是字符串或符号）；其他实现类按类 token
/// 注册后再指向它。
fn self_or_registered(ctx: &ActionContext, impl_class: Class) -> ContainerResult<Token> {
    if Class::ptr_eq(&impl_class, &ctx.class) {
        return Ok(ctx.token.clone());
    }
    let token = Token::Class(impl_class.clone());
    if !ctx.container.has(token.clone()) {
        ctx.container.register_self(&impl_class)?;
    }
    Ok(token)
}

/// 按声明解析构造参数
///
/// 调用方的额外提供者优先（按 token 或参数名匹配），其次走容器解析；
/// 没有绑定 token 的参数只能由额外提供者填充。
pub struct BindParameterTypeAction;

impl LifecycleAction for BindParameterTypeAction {
    fn name(&self) -> &str {
        BIND_PARAMETER_TYPE
    }

    fn execute(&self, ctx: &mut ActionContext) -> ContainerResult<()> {
        let params = ctx.container.metadata().parameters(&ctx.class);
        let mut args = Vec::with_capacity(params.len());

        for param in params {
            let key = param.token.as_ref().map(Token::key);
            let value = match ExtraProvider::find(&ctx.extras, key.as_ref(), &param.name) {
                Some(value) => Some(value.clone()),
                None => match &param.token {
                    Some(token) => ctx.container.resolve(token.clone(), &[])?,
                    None => None,
                },
            };
            if value.is_none() {
                tracing::debug!(
                    "Constructor parameter '{}' of {} resolved to nothing",
                    param.name,
                    ctx.class.name()
                );
            }
            args.push((param.name, value));
        }

        ctx.args = args;
        Ok(())
    }
}

/// 注入声明的属性
pub struct InjectPropertyAction;

impl LifecycleAction for InjectPropertyAction {
    fn name(&self) -> &str {
        INJECT_PROPERTY
    }

    fn execute(&self, ctx: &mut ActionContext) -> ContainerResult<()> {
        let Some(instance) = ctx.instance.clone() else {
            return Ok(());
        };

        for property in ctx.container.metadata().properties(&ctx.class) {
            let key = property.token.key();
            let value = match ExtraProvider::find(&ctx.extras, Some(&key), &property.name) {
                Some(value) => Some(value.clone()),
                None => ctx.container.resolve(property.token.clone(), &[])?,
            };

            match value {
                Some(value) => {
                    tracing::trace!(
                        "Injecting {}.{} from {}",
                        ctx.class.name(),
                        property.name,
                        property.token
                    );
                    instance.set_field(property.name, value);
                }
                None => tracing::debug!(
                    "Property {}.{} left unset, nothing bound to {}",
                    ctx.class.name(),
                    property.name,
                    property.token
                ),
            }
        }
        Ok(())
    }
}
