//! 引擎配置
//!
//! 从 TOML 文本或文件加载，可被环境变量覆盖：
//!
//! ```toml
//! enabled = true
//! pool_capacity = 100
//! trace_invocations = false
//!
//! [logging]
//! level = "debug"
//! format = "pretty"
//! ```

use crate::error::{AopError, AopResult};
use crate::logging::LoggingConfig;
use crate::pool::DEFAULT_POOL_CAPACITY;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// 环境变量：是否启用织入
pub const ENV_ENABLED: &str = "AOP_ENABLED";
/// 环境变量：连接点池容量
pub const ENV_POOL_CAPACITY: &str = "AOP_POOL_CAPACITY";
/// 环境变量：是否记录每次调用
pub const ENV_TRACE_INVOCATIONS: &str = "AOP_TRACE_INVOCATIONS";

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AopConfig {
    /// 关闭时规划器生成空计划
    pub enabled: bool,

    /// 每个拦截器的连接点池容量
    pub pool_capacity: usize,

    /// 每次拦截调用输出一条 trace 日志
    pub trace_invocations: bool,

    pub logging: LoggingConfig,
}

impl Default for AopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pool_capacity: DEFAULT_POOL_CAPACITY,
            trace_invocations: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl AopConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(content: &str) -> AopResult<Self> {
        toml::from_str(content)
            .map_err(|e| AopError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> AopResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AopError::InvalidConfig(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_toml_str(&content)
    }

    /// 默认配置叠加环境变量
    pub fn from_env() -> AopResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 用环境变量覆盖当前配置
    pub fn with_env_overrides(self) -> AopResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// 用任意键值来源覆盖当前配置
    pub fn with_overrides<F>(mut self, lookup: F) -> AopResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ENABLED) {
            self.enabled = parse_bool(ENV_ENABLED, &value)?;
        }
        if let Some(value) = lookup(ENV_POOL_CAPACITY) {
            self.pool_capacity = value.trim().parse().map_err(|e| {
                AopError::InvalidConfig(format!("{} must be an integer, got '{}': {}", ENV_POOL_CAPACITY, value, e))
            })?;
        }
        if let Some(value) = lookup(ENV_TRACE_INVOCATIONS) {
            self.trace_invocations = parse_bool(ENV_TRACE_INVOCATIONS, &value)?;
        }
        Ok(self)
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn trace_invocations(mut self, trace: bool) -> Self {
        self.trace_invocations = trace;
        self
    }
}

fn parse_bool(key: &str, value: &str) -> AopResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AopError::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, value
        ))),
    }
}
