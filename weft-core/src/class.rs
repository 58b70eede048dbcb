//! 类描述符
//!
//! `Class` 是容器构造实例所需的全部声明：名称、可选的基类、构造函数、
//! 成员表（方法 / getter / setter）、构造参数与属性注入描述、提供者声明、
//! 作用域、实例缓存 TTL、装饰器名称，以及供插件使用的类型化扩展。
//!
//! 描述符构建后不可变，以 `Arc` 共享。

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::INJECTABLE;
use crate::error::CallResult;
use crate::object::{Invocable, Object};
use crate::scope::Scope;
use crate::token::Token;
use crate::value::{Outcome, Value};

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// 构造函数，返回实例的内部状态
pub type Constructor =
    Arc<dyn Fn(ConstructorArgs) -> anyhow::Result<Box<dyn Any + Send + Sync>> + Send + Sync>;

/// 成员的槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberSlot {
    Method,
    Getter,
    Setter,
}

impl fmt::Display for MemberSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberSlot::Method => write!(f, "method"),
            MemberSlot::Getter => write!(f, "getter"),
            MemberSlot::Setter => write!(f, "setter"),
        }
    }
}

#[derive(Clone)]
struct MemberDef {
    name: String,
    slot: MemberSlot,
    invocable: Arc<dyn Invocable>,
}

/// 构造参数描述
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    pub name: String,
    /// 绑定的 token；为空时只能由调用方的额外提供者按名称填充
    pub token: Option<Token>,
}

/// 属性注入描述
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub token: Token,
}

/// 提供者声明："这个 token 由这个类实现"
#[derive(Debug, Clone)]
pub struct ProviderDeclaration {
    pub provide: Token,
    /// 区分符；存在时绑定到 `Registration{provide, alias}`
    pub alias: Option<String>,
    /// 覆盖单例标志；为空时以别名方式指向实现类
    pub singleton: Option<bool>,
    /// 实现类；为空时为声明它的类本身
    pub impl_class: Option<Class>,
}

impl ProviderDeclaration {
    pub fn new(provide: impl Into<Token>) -> Self {
        Self {
            provide: provide.into(),
            alias: None,
            singleton: None,
            impl_class: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = Some(singleton);
        self
    }

    pub fn implemented_by(mut self, class: &Class) -> Self {
        self.impl_class = Some(class.clone());
        self
    }

    /// 实际绑定的键
    pub fn key_token(&self) -> Token {
        match &self.alias {
            Some(alias) => Token::registration(self.provide.clone(), alias.clone()),
            None => self.provide.clone(),
        }
    }
}

pub(crate) struct ClassDef {
    id: u64,
    name: String,
    type_name: &'static str,
    base: Option<Class>,
    constructor: Constructor,
    members: Vec<MemberDef>,
    params: Vec<ParamDescriptor>,
    properties: Vec<PropertyDescriptor>,
    providers: Vec<ProviderDeclaration>,
    scope: Option<Scope>,
    cache_ttl: Option<Duration>,
    decorators: Vec<String>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

/// 共享的类描述符
#[derive(Clone)]
pub struct Class(Arc<ClassDef>);

impl Class {
    pub fn builder(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder::new(name)
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// 构造函数产生的状态类型
    pub fn type_name(&self) -> &'static str {
        self.0.type_name
    }

    pub fn base(&self) -> Option<&Class> {
        self.0.base.as_ref()
    }

    pub fn params(&self) -> &[ParamDescriptor] {
        &self.0.params
    }

    /// 自身声明的属性注入
    pub fn own_properties(&self) -> &[PropertyDescriptor] {
        &self.0.properties
    }

    pub fn providers(&self) -> &[ProviderDeclaration] {
        &self.0.providers
    }

    pub fn scope(&self) -> Option<Scope> {
        self.0.scope
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.0.cache_ttl
    }

    pub fn decorators(&self) -> &[String] {
        &self.0.decorators
    }

    pub fn has_decorator(&self, decorator: &str) -> bool {
        self.0.decorators.iter().any(|d| d == decorator)
    }

    pub fn extension<E: Any + Send + Sync>(&self) -> Option<&E> {
        self.0
            .extensions
            .get(&TypeId::of::<E>())
            .and_then(|ext| (**ext).downcast_ref::<E>())
    }

    pub(crate) fn construct(&self, args: ConstructorArgs) -> anyhow::Result<Box<dyn Any + Send + Sync>> {
        (self.0.constructor)(args)
    }

    /// 查找成员，自身优先，然后沿基类链向上
    pub fn member(&self, name: &str, slot: MemberSlot) -> Option<Arc<dyn Invocable>> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(def) = class
                .0
                .members
                .iter()
                .find(|m| m.name == name && m.slot == slot)
            {
                return Some(Arc::clone(&def.invocable));
            }
            current = class.base();
        }
        None
    }

    /// 所有成员（含继承），基类在前，同名同槽位只出现一次
    pub fn members(&self) -> Vec<(String, MemberSlot)> {
        let mut result = match self.base() {
            Some(base) => base.members(),
            None => Vec::new(),
        };
        for def in &self.0.members {
            if !result.iter().any(|(n, s)| n == &def.name && *s == def.slot) {
                result.push((def.name.clone(), def.slot));
            }
        }
        result
    }

    /// 所有成员名（含继承），去重
    pub fn member_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for (name, _) in self.members() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// 是否为 `ancestor` 本身或其子类
    pub fn is_subclass_of(&self, ancestor: &Class) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if Class::ptr_eq(class, ancestor) {
                return true;
            }
            current = class.base();
        }
        false
    }

    pub fn ptr_eq(a: &Class, b: &Class) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Class {}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.0.name)
            .field("id", &self.0.id)
            .field("base", &self.0.base.as_ref().map(|b| b.name().to_string()))
            .field("members", &self.members())
            .finish()
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// 类描述符构建器
pub struct ClassBuilder {
    name: String,
    type_name: &'static str,
    base: Option<Class>,
    constructor: Option<Constructor>,
    members: Vec<MemberDef>,
    params: Vec<ParamDescriptor>,
    properties: Vec<PropertyDescriptor>,
    providers: Vec<ProviderDeclaration>,
    scope: Option<Scope>,
    cache_ttl: Option<Duration>,
    decorators: Vec<String>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name::<()>(),
            base: None,
            constructor: None,
            members: Vec::new(),
            params: Vec::new(),
            properties: Vec::new(),
            providers: Vec::new(),
            scope: None,
            cache_ttl: None,
            decorators: vec![INJECTABLE.to_string()],
            extensions: HashMap::new(),
        }
    }

    /// 设置构造函数
    pub fn constructor<T, F>(mut self, f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(ConstructorArgs) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.type_name = type_name::<T>();
        self.constructor = Some(Arc::new(move |args| {
            f(args).map(|state| Box::new(state) as Box<dyn Any + Send + Sync>)
        }));
        self
    }

    /// 继承基类的成员和属性注入
    pub fn extends(mut self, base: &Class) -> Self {
        self.base = Some(base.clone());
        self
    }

    pub fn param(mut self, name: impl Into<String>, token: impl Into<Token>) -> Self {
        self.params.push(ParamDescriptor {
            name: name.into(),
            token: Some(token.into()),
        });
        self
    }

    pub fn untyped_param(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamDescriptor {
            name: name.into(),
            token: None,
        });
        self
    }

    pub fn inject(mut self, property: impl Into<String>, token: impl Into<Token>) -> Self {
        self.properties.push(PropertyDescriptor {
            name: property.into(),
            token: token.into(),
        });
        self
    }

    /// 声明由本类实现 `token`
    pub fn provides(self, token: impl Into<Token>) -> Self {
        self.provider(ProviderDeclaration::new(token))
    }

    /// 声明由本类实现 `token` 的名为 `alias` 的变体
    pub fn provides_as(self, token: impl Into<Token>, alias: impl Into<String>) -> Self {
        self.provider(ProviderDeclaration::new(token).alias(alias))
    }

    pub fn provider(mut self, declaration: ProviderDeclaration) -> Self {
        self.providers.push(declaration);
        self
    }

    pub fn singleton(mut self) -> Self {
        self.scope = Some(Scope::Singleton);
        self
    }

    pub fn transient(mut self) -> Self {
        self.scope = Some(Scope::Transient);
        self
    }

    /// 无额外提供者的构造结果缓存 `ttl` 时长
    pub fn expires(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn decorator(mut self, decorator: impl Into<String>) -> Self {
        let decorator = decorator.into();
        if !self.decorators.contains(&decorator) {
            self.decorators.push(decorator);
        }
        self
    }

    pub fn without_decorator(mut self, decorator: &str) -> Self {
        self.decorators.retain(|d| d != decorator);
        self
    }

    pub fn extension<E: Any + Send + Sync>(mut self, extension: E) -> Self {
        self.extensions
            .insert(TypeId::of::<E>(), Box::new(extension));
        self
    }

    /// 修改（必要时先创建）某个扩展
    pub fn with_extension<E, F>(mut self, f: F) -> Self
    where
        E: Any + Send + Sync + Default,
        F: FnOnce(&mut E),
    {
        let mut extension = self
            .extensions
            .remove(&TypeId::of::<E>())
            .and_then(|ext| ext.downcast::<E>().ok())
            .map(|ext| *ext)
            .unwrap_or_default();
        f(&mut extension);
        self.extensions
            .insert(TypeId::of::<E>(), Box::new(extension));
        self
    }

    pub fn method<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Arc<Object>, Vec<Value>) -> CallResult<Outcome> + Send + Sync + 'static,
    {
        self.member(name, MemberSlot::Method, Arc::new(f))
    }

    pub fn getter<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Arc<Object>, Vec<Value>) -> CallResult<Outcome> + Send + Sync + 'static,
    {
        self.member(name, MemberSlot::Getter, Arc::new(f))
    }

    pub fn setter<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Arc<Object>, Vec<Value>) -> CallResult<Outcome> + Send + Sync + 'static,
    {
        self.member(name, MemberSlot::Setter, Arc::new(f))
    }

    /// 以现成的 `Invocable` 作为成员
    pub fn member(
        mut self,
        name: impl Into<String>,
        slot: MemberSlot,
        invocable: Arc<dyn Invocable>,
    ) -> Self {
        let name = name.into();
        self.members.retain(|m| !(m.name == name && m.slot == slot));
        self.members.push(MemberDef {
            name,
            slot,
            invocable,
        });
        self
    }

    pub fn build(self) -> Class {
        let constructor = self.constructor.unwrap_or_else(|| {
            Arc::new(|_args| Ok(Box::new(()) as Box<dyn Any + Send + Sync>))
        });
        Class(Arc::new(ClassDef {
            id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            type_name: self.type_name,
            base: self.base,
            constructor,
            members: self.members,
            params: self.params,
            properties: self.properties,
            providers: self.providers,
            scope: self.scope,
            cache_ttl: self.cache_ttl,
            decorators: self.decorators,
            extensions: self.extensions,
        }))
    }
}

/// 传给构造函数的已解析参数
pub struct ConstructorArgs {
    names: Vec<String>,
    values: Vec<Option<Value>>,
}

impl ConstructorArgs {
    pub fn new(args: Vec<(String, Option<Value>)>) -> Self {
        let (names, values) = args.into_iter().unzip();
        Self { names, values }
    }

    pub fn empty() -> Self {
        Self {
            names: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn named(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|index| self.value(index))
    }

    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        self.value(index).and_then(Value::downcast::<T>)
    }

    pub fn object(&self, index: usize) -> Option<Arc<Object>> {
        self.value(index).and_then(Value::as_object)
    }

    /// 取第 `index` 个参数，缺失或类型不符时报错
    pub fn require<T: Any + Send + Sync>(&self, index: usize) -> anyhow::Result<Arc<T>> {
        let name = self.names.get(index).map(String::as_str).unwrap_or("?");
        let value = self
            .value(index)
            .ok_or_else(|| anyhow::anyhow!("constructor argument #{} '{}' is missing", index, name))?;
        value.downcast::<T>().ok_or_else(|| {
            anyhow::anyhow!(
                "constructor argument #{} '{}' is a {}, expected {}",
                index,
                name,
                value.type_name(),
                type_name::<T>()
            )
        })
    }
}
