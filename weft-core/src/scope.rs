use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// 实例的作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// 单例 - 容器中只有一个实例
    Singleton,

    /// 瞬态 - 每次解析都构造新实例（声明了缓存 TTL 的类除外）
    #[default]
    Transient,
}

impl Scope {
    pub fn is_singleton(self) -> bool {
        self == Scope::Singleton
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "singleton" => Ok(Scope::Singleton),
            "transient" | "prototype" => Ok(Scope::Transient),
            _ => Err(format!("Invalid scope: {}", s)),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Singleton => write!(f, "singleton"),
            Scope::Transient => write!(f, "transient"),
        }
    }
}
