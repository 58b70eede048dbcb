//! 切点（Pointcut）表达式系统
//!
//! 字符串形式的切点编译为只在尾部锚定的正则：
//!
//! - `execution(X)` 先拆成 `X`
//! - `*` 或 `*.*` 匹配所有连接点
//! - `**` 匹配零个或多个以 `.` / `/` 分隔的片段
//! - `*` 匹配一个单词片段
//! - 其余字符按字面匹配，末尾追加 `$`
//!
//! 没有头部锚定，所以 `Foo.bar` 不会匹配 `Foo.barBaz`，但会匹配 `MyFoo.bar`。
//! 以 `regex:` 开头的字符串按原样作为正则使用。

use std::fmt;

use regex::Regex;
use thiserror::Error;

const REGEX_PREFIX: &str = "regex:";

/// 切点表达式错误
#[derive(Debug, Error)]
pub enum PointcutError {
    #[error("Invalid pointcut regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// 切点
#[derive(Clone)]
pub enum Pointcut {
    /// 通配符表达式
    Expression(String),

    /// 直接匹配完整名称的正则
    Regex(Regex),

    /// 解析失败的表达式，永不匹配
    Invalid(String),
}

impl Pointcut {
    pub fn expression(expression: impl Into<String>) -> Self {
        Pointcut::Expression(expression.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, PointcutError> {
        Regex::new(pattern)
            .map(Pointcut::Regex)
            .map_err(|source| PointcutError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// 解析文本形式的切点，`regex:` 前缀表示正则
    pub fn parse(text: &str) -> Result<Self, PointcutError> {
        match text.strip_prefix(REGEX_PREFIX) {
            Some(pattern) => Self::regex(pattern),
            None => Ok(Self::expression(text)),
        }
    }

    /// 原始文本，用于判断两个 advice 是否相同
    pub fn source(&self) -> &str {
        match self {
            Pointcut::Expression(expression) => expression,
            Pointcut::Regex(regex) => regex.as_str(),
            Pointcut::Invalid(text) => text,
        }
    }

    /// 编译为匹配器，失败时退化为永不匹配
    pub fn compile(&self) -> PointcutMatcher {
        match self {
            Pointcut::Regex(regex) => PointcutMatcher::Pattern(regex.clone()),
            Pointcut::Invalid(_) => PointcutMatcher::Never,
            Pointcut::Expression(expression) => compile_expression(expression),
        }
    }

    pub fn matches(&self, full_name: &str) -> bool {
        self.compile().matches(full_name)
    }
}

impl From<&str> for Pointcut {
    fn from(text: &str) -> Self {
        Pointcut::parse(text).unwrap_or_else(|e| {
            tracing::warn!("{}, the pointcut will never match", e);
            Pointcut::Invalid(text.to_string())
        })
    }
}

impl From<String> for Pointcut {
    fn from(text: String) -> Self {
        Pointcut::from(text.as_str())
    }
}

impl From<Regex> for Pointcut {
    fn from(regex: Regex) -> Self {
        Pointcut::Regex(regex)
    }
}

impl fmt::Debug for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pointcut::Expression(e) => write!(f, "Expression({})", e),
            Pointcut::Regex(r) => write!(f, "Regex({})", r.as_str()),
            Pointcut::Invalid(t) => write!(f, "Invalid({})", t),
        }
    }
}

impl fmt::Display for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pointcut::Regex(r) => write!(f, "{}{}", REGEX_PREFIX, r.as_str()),
            other => f.write_str(other.source()),
        }
    }
}

/// 编译后的切点
#[derive(Debug, Clone)]
pub enum PointcutMatcher {
    All,
    Never,
    Pattern(Regex),
}

impl PointcutMatcher {
    pub fn matches(&self, full_name: &str) -> bool {
        match self {
            PointcutMatcher::All => true,
            PointcutMatcher::Never => false,
            PointcutMatcher::Pattern(regex) => regex.is_match(full_name),
        }
    }
}

fn unwrap_execution(expression: &str) -> &str {
    expression
        .strip_prefix("execution(")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(expression)
}

fn compile_expression(expression: &str) -> PointcutMatcher {
    let expression = unwrap_execution(expression.trim());
    if expression == "*" || expression == "*.*" {
        return PointcutMatcher::All;
    }

    let mut pattern = String::with_capacity(expression.len() * 2);
    let mut chars = expression.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                pattern.push_str(r"(?:\w+(?:[./]\w+)*)?");
            }
            '*' => pattern.push_str(r"\w+"),
            other => {
                let mut buf = [0u8; 4];
                pattern.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    pattern.push('$');

    match Regex::new(&pattern) {
        Ok(regex) => PointcutMatcher::Pattern(regex),
        Err(e) => {
            tracing::warn!(
                "Pointcut '{}' could not be compiled ({}), it will never match",
                expression,
                e
            );
            PointcutMatcher::Never
        }
    }
}
