use std::str::FromStr;

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Environment;
use crate::constants::LOGGING_CONFIG_PREFIX;
use crate::error::{ContainerError, ContainerResult};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    const NAMES: [(&'static str, LogLevel); 6] = [
        ("trace", LogLevel::Trace),
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
        ("warn", LogLevel::Warn),
        ("warning", LogLevel::Warn),
        ("error", LogLevel::Error),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(&Self::NAMES, s, "log level")
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 默认
    Compact,
    Full,
    Json,
    /// 多行输出，开发时使用
    Pretty,
}

impl LogFormat {
    const NAMES: [(&'static str, LogFormat); 4] = [
        ("compact", LogFormat::Compact),
        ("full", LogFormat::Full),
        ("json", LogFormat::Json),
        ("pretty", LogFormat::Pretty),
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup(&Self::NAMES, s, "log format")
    }
}

fn lookup<T: Copy>(names: &[(&str, T)], raw: &str, what: &str) -> ContainerResult<T> {
    let wanted = raw.trim().to_ascii_lowercase();
    names
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, value)| *value)
        .ok_or_else(|| ContainerError::Config(format!("unknown {} '{}'", what, raw)))
}

/// 容器的日志配置
///
/// 可以用构建方法组装，也可以从 `Environment`（`weft.logging.*`）、
/// 进程环境变量或 TOML 中读取。
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub show_timestamp: bool,
    /// 输出事件所在的模块路径
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub show_thread_names: bool,
    /// `EnvFilter` 指令，优先于 `level`，例如 `"weft_core=debug,weft_aop=trace"`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_timestamp: true,
            show_target: false,
            show_thread_ids: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(self, level: LogLevel) -> Self {
        Self { level, ..self }
    }

    pub fn format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    pub fn show_timestamp(self, show_timestamp: bool) -> Self {
        Self { show_timestamp, ..self }
    }

    pub fn show_target(self, show_target: bool) -> Self {
        Self { show_target, ..self }
    }

    pub fn show_threads(self, ids: bool, names: bool) -> Self {
        Self {
            show_thread_ids: ids,
            show_thread_names: names,
            ..self
        }
    }

    pub fn filter(self, filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..self
        }
    }

    /// 读取进程环境变量 `RUST_LOG`、`LOG_LEVEL`、`LOG_FORMAT`，无法解析的值被忽略
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        let defaults = Self::default();
        Self {
            filter: var("RUST_LOG"),
            level: var("LOG_LEVEL")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.level),
            format: var("LOG_FORMAT")
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(defaults.format),
            ..defaults
        }
    }

    /// 从 `weft.logging.*` 读取；一个相关键都没有时返回 `None`
    pub fn from_environment(env: &Environment) -> ContainerResult<Option<Self>> {
        let key = |name: &str| format!("{}.{}", LOGGING_CONFIG_PREFIX, name);
        let mut config = Self::default();
        let mut found = false;

        if let Some(level) = env.get_parsed::<LogLevel>(&key("level"))? {
            config.level = level;
            found = true;
        }
        if let Some(format) = env.get_parsed::<LogFormat>(&key("format"))? {
            config.format = format;
            found = true;
        }
        if let Some(filter) = env.get_string(&key("filter")) {
            config.filter = Some(filter);
            found = true;
        }
        for (name, slot) in [
            ("show-timestamp", &mut config.show_timestamp),
            ("show-target", &mut config.show_target),
            ("show-thread-ids", &mut config.show_thread_ids),
            ("show-thread-names", &mut config.show_thread_names),
        ] {
            if let Some(value) = env.get_bool(&key(name)) {
                *slot = value;
                found = true;
            }
        }

        Ok(found.then_some(config))
    }

    /// 初始化日志系统
    pub fn init(self) -> ContainerResult<()> {
        let level = self.level.to_string();
        // 构建环境过滤器
        let env_filter = if let Some(filter) = &self.filter {
            EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(&level))
        } else {
            // 优先使用 RUST_LOG 环境变量，否则使用配置的级别
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level))
        };

        let init_failed = |e: Box<dyn std::error::Error + Send + Sync>| {
            ContainerError::LoggingInit(e.to_string())
        };

        // 根据格式初始化订阅者
        match (self.format, self.show_timestamp) {
            (LogFormat::Compact, true) => fmt()
                .with_env_filter(env_filter)
                .compact()
                .with_target(self.show_target)
                .with_thread_ids(self.show_thread_ids)
                .with_thread_names(self.show_thread_names)
                .try_init()
                .map_err(init_failed)?,
            (LogFormat::Compact, false) => fmt()
                .with_env_filter(env_filter)
                .compact()
                .without_time()
                .with_target(self.show_target)
                .with_thread_ids(self.show_thread_ids)
                .with_thread_names(self.show_thread_names)
                .try_init()
                .map_err(init_failed)?,
            (LogFormat::Full, true) => fmt()
                .with_env_filter(env_filter)
                .with_target(self.show_target)
                .with_thread_ids(self.show_thread_ids)
                .with_thread_names(self.show_thread_names)
                .try_init()
                .map_err(init_failed)?,
            (LogFormat::Full, false) => fmt()
                .with_env_filter(env_filter)
                .without_time()
                .with_target(self.show_target)
                .with_thread_ids(self.show_thread_ids)
                .with_thread_names(self.show_thread_names)
                .try_init()
                .map_err(init_failed)?,
            (LogFormat::Json, _) => fmt()
                .with_env_filter(env_filter)
                .json()
                .with_target(self.show_target)
                .try_init()
                .map_err(init_failed)?,
            (LogFormat::Pretty, _) => fmt()
                .with_env_filter(env_filter)
                .pretty()
                .with_target(self.show_target)
                .try_init()
                .map_err(init_failed)?,
        }

        Ok(())
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigValue, MapPropertySource};

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("full".parse::<LogFormat>().unwrap(), LogFormat::Full);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(ContainerError::Config(_))
        ));
    }

    #[test]
    fn test_logging_config_builder() {
        let config = LoggingConfig::new()
            .level(LogLevel::Debug)
            .format(LogFormat::Json)
            .show_timestamp(false)
            .show_target(true)
            .show_threads(true, false)
            .filter("weft_core=trace");

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.show_timestamp);
        assert!(config.show_target);
        assert!(config.show_thread_ids);
        assert!(!config.show_thread_names);
        assert_eq!(config.filter.as_deref(), Some("weft_core=trace"));
        assert_eq!(config.level.to_string(), "debug");
    }

    #[test]
    fn test_logging_config_from_environment() {
        let empty = Environment::new();
        assert!(LoggingConfig::from_environment(&empty).unwrap().is_none());

        let env = Environment::new().with_source(
            MapPropertySource::new("test")
                .with_property("weft.logging.format", ConfigValue::String("pretty".into()))
                .with_property("weft.logging.show-target", ConfigValue::Bool(true)),
        );
        let config = LoggingConfig::from_environment(&env).unwrap().unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.show_target);
    }
}
