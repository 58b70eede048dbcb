//! 提供者：token 到工厂的绑定

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::class::Class;
use crate::container::Container;
use crate::factory::TypeFactory;
use crate::token::{Token, TokenKey};
use crate::value::Value;

/// 自定义工厂，接收容器与调用方传入的额外提供者
pub type FactoryFn =
    Arc<dyn Fn(&Container, &[ExtraProvider]) -> anyhow::Result<Value> + Send + Sync>;

/// 注册时提供的实现
#[derive(Clone)]
pub enum Provide {
    /// 由类型工厂构造
    Class(Class),
    /// 调用自定义函数
    Factory(FactoryFn),
    /// 固定值
    Value(Value),
    /// 指向另一个 token
    Alias(Token),
}

impl Provide {
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&Container, &[ExtraProvider]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Provide::Factory(Arc::new(f))
    }

    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Provide::Value(Value::new(value))
    }

    pub fn alias(token: impl Into<Token>) -> Self {
        Provide::Alias(token.into())
    }
}

impl From<Class> for Provide {
    fn from(class: Class) -> Self {
        Provide::Class(class)
    }
}

impl From<&Class> for Provide {
    fn from(class: &Class) -> Self {
        Provide::Class(class.clone())
    }
}

impl fmt::Debug for Provide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provide::Class(class) => write!(f, "Class({})", class.name()),
            Provide::Factory(_) => f.write_str("Factory(..)"),
            Provide::Value(value) => write!(f, "Value({:?})", value),
            Provide::Alias(token) => write!(f, "Alias({})", token),
        }
    }
}

/// 调用方在一次解析中临时提供的值
///
/// 按 token 键匹配构造参数；字符串 token 还会按参数名匹配。
#[derive(Clone, Debug)]
pub struct ExtraProvider {
    pub token: Token,
    pub value: Value,
}

impl ExtraProvider {
    pub fn new(token: impl Into<Token>, value: Value) -> Self {
        Self {
            token: token.into(),
            value,
        }
    }

    pub fn matches(&self, key: Option<&TokenKey>, name: &str) -> bool {
        if let Some(key) = key {
            if &self.token.key() == key {
                return true;
            }
        }
        matches!(&self.token, Token::Name(n) if n == name)
    }

    /// 在额外提供者中查找匹配的值
    pub fn find<'a>(extras: &'a [ExtraProvider], key: Option<&TokenKey>, name: &str) -> Option<&'a Value> {
        extras
            .iter()
            .find(|extra| extra.matches(key, name))
            .map(|extra| &extra.value)
    }
}

/// 实际执行构造的工厂
#[derive(Clone)]
pub(crate) enum Factory {
    Type(Arc<TypeFactory>),
    Custom(FactoryFn),
    Value(Value),
    Alias(Token),
}

impl Factory {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Factory::Type(_) => "type",
            Factory::Custom(_) => "custom",
            Factory::Value(_) => "value",
            Factory::Alias(_) => "alias",
        }
    }
}

/// 注册表中的一条绑定，创建后不再修改
#[derive(Clone)]
pub struct ProviderEntry {
    pub(crate) provide: Token,
    pub(crate) factory: Factory,
    pub(crate) impl_class: Option<Class>,
    pub(crate) singleton: bool,
}

impl ProviderEntry {
    pub fn provide(&self) -> &Token {
        &self.provide
    }

    pub fn impl_class(&self) -> Option<&Class> {
        self.impl_class.as_ref()
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn alias_target(&self) -> Option<&Token> {
        match &self.factory {
            Factory::Alias(target) => Some(target),
            _ => None,
        }
    }
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("provide", &self.provide)
            .field("factory", &self.factory.describe())
            .field("impl_class", &self.impl_class.as_ref().map(|c| c.name().to_string()))
            .field("singleton", &self.singleton)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_provider_matches_by_key_or_name() {
        let by_name = ExtraProvider::new("name", Value::new("x".to_string()));
        let key = Token::from("Config").key();

        assert!(by_name.matches(None, "name"));
        assert!(!by_name.matches(Some(&key), "other"));

        let by_token = ExtraProvider::new("Config", Value::new(1u8));
        assert!(by_token.matches(Some(&key), "config"));

        let extras = vec![by_name, by_token];
        assert!(ExtraProvider::find(&extras, Some(&key), "unused").is_some());
        assert!(ExtraProvider::find(&extras, None, "missing").is_none());
    }
}
