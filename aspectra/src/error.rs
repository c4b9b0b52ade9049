//! 统一的错误处理类型
//!
//! - 引擎自身的配置类错误使用 [`AopError`]，织入期或实例解析期立即失败
//! - 目标方法与通知抛出的错误使用 `anyhow::Error` 原样传递，调用方可以 downcast 回原始类型

use thiserror::Error;

/// 引擎错误
#[derive(Debug, Error)]
pub enum AopError {
    #[error("Malformed pointcut `{statement}` at offset {position}: {message}")]
    MalformedPointcut {
        statement: String,
        position: usize,
        message: String,
    },

    #[error("Failed to evaluate pointcut `{statement}`: {message}")]
    PointcutEvaluation { statement: String, message: String },

    #[error("Advice on {aspect}::{method} declares no pointcut")]
    MissingPointcut { aspect: String, method: String },

    #[error("Aspect '{aspect}' has no advice method '{method}'")]
    UnknownAdviceMethod { aspect: String, method: String },

    #[error("Factory method '{method}' is not callable on '{target}'")]
    FactoryNotCallable { target: String, method: String },

    #[error("Factory method '{method}' on '{target}' did not produce a target instance")]
    FactoryProducedNonTarget { target: String, method: String },

    #[error("Delegate of type '{type_name}' cannot be cloned")]
    NotClonable { type_name: String },

    #[error("No delegate bound for {service}::{method}")]
    MissingDelegate { service: String, method: String },

    #[error("proceed() called outside of an Around advice for method '{method}'")]
    NoContinuation { method: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Logging initialization failed: {0}")]
    LoggingInitFailed(String),
}

/// 引擎结果类型
pub type AopResult<T> = Result<T, AopError>;

pub use anyhow::Result;
