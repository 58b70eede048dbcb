//! 类型工厂：按固定步骤构造一个类的实例
//!
//! 1. 单例已缓存时直接返回
//! 2. 没有额外提供者且类声明了 TTL 时，查实例缓存
//! 3. design 阶段动作在注册时由容器执行（每个类一次）
//! 4. runtime 阶段动作
//! 5. 解析构造参数
//! 6. before-constructor 动作
//! 7. 调用构造函数
//! 8. after-constructor、属性注入、方法绑定动作
//! 9. 写入单例缓存或实例缓存

use std::sync::Arc;

use crate::class::{Class, ConstructorArgs};
use crate::constants::{AFTER_CONSTRUCTOR_PHASE, BEFORE_CONSTRUCTOR_PHASE, RUNTIME_PHASE};
use crate::container::Container;
use crate::error::{ContainerError, ContainerResult};
use crate::lifecycle::{ActionContext, DeclarationKind};
use crate::object::Object;
use crate::provider::ExtraProvider;
use crate::token::{Token, TokenKey};
use crate::value::Value;

pub struct TypeFactory {
    key: TokenKey,
    token: Token,
    class: Class,
    singleton: bool,
}

impl TypeFactory {
    pub fn new(token: Token, class: Class, singleton: bool) -> Self {
        Self {
            key: token.key(),
            token,
            class,
            singleton,
        }
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn create(&self, container: &Container, extras: &[ExtraProvider]) -> ContainerResult<Value> {
        if self.singleton {
            if let Some(instance) = container.cached_singleton(&self.key) {
                tracing::debug!("Returning cached singleton {}", self.token);
                return Ok(instance);
            }
        }

        let ttl = self.class.cache_ttl().filter(|_| extras.is_empty());
        if ttl.is_some() {
            if let Some(instance) = container.instance_cache().get(self.class.id()) {
                tracing::debug!("Returning cached instance of {}", self.class.name());
                return Ok(Value::from(instance));
            }
        }

        let _guard = container
            .creation_tracker()
            .enter(self.key.as_str(), &self.token.to_string())?;

        let pipeline = container.pipeline();
        let mut ctx = ActionContext::new(container.clone(), self.token.clone(), self.class.clone())
            .with_extras(extras);

        pipeline.execute(DeclarationKind::Class, &mut ctx, &[RUNTIME_PHASE])?;
        pipeline.execute(DeclarationKind::Parameter, &mut ctx, &[])?;
        pipeline.execute(DeclarationKind::Class, &mut ctx, &[BEFORE_CONSTRUCTOR_PHASE])?;

        let state = self
            .class
            .construct(ConstructorArgs::new(ctx.args.clone()))
            .map_err(ContainerError::from_user)?;
        let instance = Arc::new(Object::new(self.class.clone(), state));
        ctx.instance = Some(Arc::clone(&instance));

        pipeline.execute(DeclarationKind::Class, &mut ctx, &[AFTER_CONSTRUCTOR_PHASE])?;
        pipeline.execute(DeclarationKind::Property, &mut ctx, &[])?;
        pipeline.execute(DeclarationKind::Method, &mut ctx, &[])?;

        if self.singleton {
            let stored = container.store_singleton(&self.key, Value::from(Arc::clone(&instance)));
            tracing::info!("Created singleton {}", self.token);
            return Ok(stored);
        }

        if let Some(ttl) = ttl {
            container
                .instance_cache()
                .put(self.class.id(), Arc::clone(&instance), ttl);
        }
        tracing::debug!("Created instance of {}", self.class.name());
        Ok(Value::from(instance))
    }
}
