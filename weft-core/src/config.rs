use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::constants::CONTAINER_CONFIG_PREFIX;
use crate::error::{ContainerError, ContainerResult};
use crate::logging::LoggingConfig;
use crate::scope::Scope;

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    /// 转换为字符串
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 转换为整数
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 转换为浮点数
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 转换为布尔值
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    /// 获取配置源名称
    fn name(&self) -> &str;

    /// 获取配置值
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 获取所有配置键
    fn keys(&self) -> Vec<String>;

    /// 配置源优先级（数字越大优先级越高）
    fn priority(&self) -> i32 {
        0
    }
}

/// Environment - 按优先级组合多个配置源
pub struct Environment {
    /// 配置源列表（按优先级排序）
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field(
                "sources",
                &self
                    .sources
                    .read()
                    .iter()
                    .map(|s| s.name().to_string())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Environment {
    /// 创建新的环境
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// 添加配置源
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        sources.push(source);
        // 按优先级降序排序
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// 链式添加配置源
    pub fn with_source(self, source: impl PropertySource + 'static) -> Self {
        self.add_property_source(Box::new(source));
        self
    }

    /// 获取配置值
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        for source in sources.iter() {
            if let Some(value) = source.get(key) {
                tracing::debug!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        tracing::trace!("Config '{}' not found in any source", key);
        None
    }

    /// 获取字符串配置
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(String::from))
    }

    /// 获取字符串配置（带默认值）
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// 获取整数配置
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// 获取浮点数配置
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    /// 获取布尔值配置
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    /// 获取布尔值配置（带默认值）
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// 获取字符串数组配置
    /// 支持两种格式:
    /// 1. TOML数组: key = ["a", "b", "c"]
    /// 2. 逗号分隔字符串: key = "a, b, c"
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            ConfigValue::Array(arr) => Some(
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
            ConfigValue::String(s) => Some(
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// 解析为实现了 `FromStr` 的类型，解析失败时报配置错误
    pub fn get_parsed<T>(&self, key: &str) -> ContainerResult<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get_string(key) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|e| ContainerError::Config(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Property Sources ==========

/// 环境变量配置源
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    /// 创建环境变量配置源
    ///
    /// # 参数
    /// * `prefix` - 环境变量前缀，例如 "APP_"
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100, // 环境变量优先级较高
        }
    }

    /// 将环境变量名转换为配置键
    /// 例如: APP_DATABASE_URL -> database.url
    fn env_to_key(&self, env_key: &str) -> String {
        env_key
            .strip_prefix(&self.prefix)
            .unwrap_or(env_key)
            .to_lowercase()
            .replace('_', ".")
    }

    /// 将配置键转换为环境变量名
    /// 例如: weft.container.resolution -> APP_WEFT_CONTAINER_RESOLUTION
    fn key_to_env(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            key.replace(['.', '-'], "_").to_uppercase()
        )
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| self.env_to_key(&k))
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 配置源
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    /// 从文件加载 TOML 配置
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&content, path.to_string_lossy().to_string())
    }

    /// 从字符串解析 TOML 配置
    pub fn parse(content: &str, name: impl Into<String>) -> ContainerResult<Self> {
        let value: toml::Value = toml::from_str(content)
            .map_err(|e| ContainerError::Config(format!("Failed to parse TOML: {}", e)))?;

        let mut properties = HashMap::new();
        Self::flatten_toml(&value, String::new(), &mut properties);

        Ok(Self {
            name: name.into(),
            properties,
            priority: 0, // 文件配置优先级最低
        })
    }

    /// 展平 TOML 结构
    /// 例如: { weft: { container: { resolution: "strict" } } } -> { "weft.container.resolution": "strict" }
    fn flatten_toml(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
        match value {
            toml::Value::Table(table) => {
                for (key, val) in table {
                    let new_prefix = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten_toml(val, new_prefix, result);
                }
            }
            other => {
                result.insert(prefix, Self::toml_value_to_config(other));
            }
        }
    }

    /// 转换 TOML 值为 ConfigValue
    fn toml_value_to_config(value: &toml::Value) -> ConfigValue {
        match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Int(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Bool(*b),
            toml::Value::Array(arr) => {
                ConfigValue::Array(arr.iter().map(Self::toml_value_to_config).collect())
            }
            toml::Value::Table(table) => ConfigValue::Object(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::toml_value_to_config(v)))
                    .collect(),
            ),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        }
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（用于测试或运行时配置）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

// ========== Container Config ==========

/// 解析未注册 token 时的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPolicy {
    /// 返回 `UnregisteredToken` 错误
    #[default]
    Strict,
    /// 记录警告并解析为空
    Lenient,
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(ResolutionPolicy::Strict),
            "lenient" => Ok(ResolutionPolicy::Lenient),
            _ => Err(format!("Invalid resolution policy: {}", s)),
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionPolicy::Strict => write!(f, "strict"),
            ResolutionPolicy::Lenient => write!(f, "lenient"),
        }
    }
}

/// 容器配置
///
/// TOML 形式：
///
/// ```toml
/// resolution = "lenient"
/// default-scope = "singleton"
///
/// [logging]
/// level = "debug"
/// format = "json"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ContainerConfig {
    pub resolution: ResolutionPolicy,

    /// `register_self` 在类未声明作用域时使用的作用域
    pub default_scope: Scope,

    pub logging: Option<LoggingConfig>,
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolution(mut self, resolution: ResolutionPolicy) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn default_scope(mut self, scope: Scope) -> Self {
        self.default_scope = scope;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn is_lenient(&self) -> bool {
        self.resolution == ResolutionPolicy::Lenient
    }

    /// 从 `weft.container.*` 与 `weft.logging.*` 读取
    pub fn from_environment(env: &Environment) -> ContainerResult<Self> {
        let mut config = Self::default();

        if let Some(policy) =
            env.get_parsed::<ResolutionPolicy>(&format!("{}.resolution", CONTAINER_CONFIG_PREFIX))?
        {
            config.resolution = policy;
        }
        if let Some(scope) =
            env.get_parsed::<Scope>(&format!("{}.default-scope", CONTAINER_CONFIG_PREFIX))?
        {
            config.default_scope = scope;
        }
        config.logging = LoggingConfig::from_environment(env)?;

        Ok(config)
    }

    /// 从 TOML 文本反序列化
    pub fn from_toml_str(content: &str) -> ContainerResult<Self> {
        toml::from_str(content)
            .map_err(|e| ContainerError::Config(format!("Invalid container config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogFormat, LogLevel};

    #[test]
    fn test_environment_priority() {
        let env = Environment::new()
            .with_source(
                MapPropertySource::new("low")
                    .with_property("app.name", ConfigValue::String("low".into()))
                    .with_priority(1),
            )
            .with_source(
                MapPropertySource::new("high")
                    .with_property("app.name", ConfigValue::String("high".into()))
                    .with_priority(10),
            );

        assert_eq!(env.get_string("app.name").as_deref(), Some("high"));
        assert_eq!(env.get_string_or("app.missing", "fallback"), "fallback");
    }

    #[test]
    fn test_toml_source_flattens_tables() {
        let source = TomlPropertySource::parse(
            r#"
            [weft.container]
            resolution = "lenient"
            retries = 3
            tags = ["a", "b"]
            "#,
            "inline",
        )
        .unwrap();

        let env = Environment::new().with_source(source);
        assert_eq!(
            env.get_string("weft.container.resolution").as_deref(),
            Some("lenient")
        );
        assert_eq!(env.get_i64("weft.container.retries"), Some(3));
        assert_eq!(
            env.get_string_array("weft.container.tags"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlPropertySource::parse("not = [valid", "broken").err().unwrap();
        assert!(matches!(err, ContainerError::Config(_)));
    }

    #[test]
    fn test_container_config_from_environment() {
        let env = Environment::new().with_source(
            MapPropertySource::new("test")
                .with_property(
                    "weft.container.resolution",
                    ConfigValue::String("Lenient".into()),
                )
                .with_property(
                    "weft.container.default-scope",
                    ConfigValue::String("singleton".into()),
                )
                .with_property("weft.logging.level", ConfigValue::String("debug".into())),
        );

        let config = ContainerConfig::from_environment(&env).unwrap();
        assert_eq!(config.resolution, ResolutionPolicy::Lenient);
        assert_eq!(config.default_scope, Scope::Singleton);
        assert_eq!(config.logging.map(|l| l.level), Some(LogLevel::Debug));
    }

    #[test]
    fn test_container_config_rejects_bad_policy() {
        let env = Environment::new().with_source(
            MapPropertySource::new("test").with_property(
                "weft.container.resolution",
                ConfigValue::String("sometimes".into()),
            ),
        );
        let err = ContainerConfig::from_environment(&env).unwrap_err();
        assert!(err.to_string().contains("weft.container.resolution"));
    }

    #[test]
    fn test_container_config_from_toml() {
        let config = ContainerConfig::from_toml_str(
            r#"
            resolution = "lenient"

            [logging]
            level = "warn"
            format = "json"
            "#,
        )
        .unwrap();

        assert!(config.is_lenient());
        assert_eq!(config.default_scope, Scope::Transient);
        let logging = config.logging.unwrap();
        assert_eq!(logging.level, LogLevel::Warn);
        assert_eq!(logging.format, LogFormat::Json);

        let defaults = ContainerConfig::from_toml_str("").unwrap();
        assert_eq!(defaults.resolution, ResolutionPolicy::Strict);
        assert!(defaults.logging.is_none());
    }
}
