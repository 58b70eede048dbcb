//! Token - 依赖的标识
//!
//! token 可以是类、字符串、符号或 `Registration`（抽象类型 + 区分符）。
//! 所有比较都基于派生出的字符串键 [`TokenKey`]。

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::class::Class;

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

/// 符号 token，每次创建都是唯一的，描述只用于日志和错误信息
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Arc<str>,
}

impl Symbol {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: Arc::from(description.into()),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description)
    }
}

/// 抽象类型的一个具名实现
///
/// 同一个 base 下可以有多个不同区分符的注册；base 与区分符都相同的两个
/// `Registration` 会得到相同的键，这是有意为之。
#[derive(Clone)]
pub struct Registration {
    base: Box<Token>,
    discriminator: String,
}

impl Registration {
    pub fn new(base: impl Into<Token>, discriminator: impl Into<String>) -> Self {
        Self {
            base: Box::new(base.into()),
            discriminator: discriminator.into(),
        }
    }

    pub fn base(&self) -> &Token {
        &self.base
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Registration({}, {})", self.base, self.discriminator)
    }
}

/// 依赖标识
#[derive(Clone)]
pub enum Token {
    Class(Class),
    Name(String),
    Symbol(Symbol),
    Registration(Registration),
}

/// 由 token 派生的比较键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenKey(String);

impl TokenKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Token {
    /// 为 `base` 的某个具名实现创建 token
    pub fn registration(base: impl Into<Token>, discriminator: impl Into<String>) -> Self {
        Token::Registration(Registration::new(base, discriminator))
    }

    pub fn key(&self) -> TokenKey {
        match self {
            Token::Class(class) => TokenKey(format!("class:{}#{}", class.name(), class.id())),
            Token::Name(name) => TokenKey(name.clone()),
            Token::Symbol(symbol) => {
                TokenKey(format!("symbol:{}#{}", symbol.description, symbol.id))
            }
            Token::Registration(registration) => TokenKey(format!(
                "{}_{}",
                registration.base.key(),
                registration.discriminator
            )),
        }
    }

    pub fn as_class(&self) -> Option<&Class> {
        match self {
            Token::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Token::Class(_))
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Class(class) => f.write_str(class.name()),
            Token::Name(name) => f.write_str(name),
            Token::Symbol(symbol) => write!(f, "Symbol({})", symbol.description),
            Token::Registration(registration) => {
                write!(f, "{}<{}>", registration.base, registration.discriminator)
            }
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.key())
    }
}

impl From<Class> for Token {
    fn from(class: Class) -> Self {
        Token::Class(class)
    }
}

impl From<&Class> for Token {
    fn from(class: &Class) -> Self {
        Token::Class(class.clone())
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Token::Name(name.to_string())
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Name(name)
    }
}

impl From<Symbol> for Token {
    fn from(symbol: Symbol) -> Self {
        Token::Symbol(symbol)
    }
}

impl From<&Symbol> for Token {
    fn from(symbol: &Symbol) -> Self {
        Token::Symbol(symbol.clone())
    }
}

impl From<Registration> for Token {
    fn from(registration: Registration) -> Self {
        Token::Registration(registration)
    }
}

impl From<&Token> for Token {
    fn from(token: &Token) -> Self {
        token.clone()
    }
}
