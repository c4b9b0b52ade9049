//! 切面（Aspect）定义
//!
//! 切面是横切关注点的模块化。切面方法上声明通知，织入后按方法名被调用

use crate::advice::{Advice, AdviceKind, PointcutSpec};
use crate::error::AopError;
use crate::joinpoint::JoinPoint;
use crate::metadata::{ClassMetadata, MethodMetadata, Reflect, ASPECT_ATTRIBUTE};
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 切面 Trait
///
/// `#[aspect]` 宏会根据 impl 块生成按名称分发的实现
pub trait Aspect: Send + Sync {
    /// 切面名称
    fn name(&self) -> &str;

    /// 调用名为 `method` 的通知方法
    ///
    /// 返回值只对环绕通知有意义，其余通知返回 `Ok(None)`
    fn advise(&self, method: &str, join_point: &mut JoinPoint) -> anyhow::Result<Option<Value>>;
}

/// 延迟获取切面实例
pub type AspectAccessor = Arc<dyn Fn() -> Arc<dyn Aspect> + Send + Sync>;

/// 包装已有实例为访问器
pub fn accessor_for(aspect: Arc<dyn Aspect>) -> AspectAccessor {
    Arc::new(move || aspect.clone())
}

/// 通知方法的返回值：`()` 或 `Result<(), E>`
pub trait IntoAdviceResult {
    fn into_advice_result(self) -> anyhow::Result<()>;
}

impl IntoAdviceResult for () {
    fn into_advice_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> IntoAdviceResult for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_advice_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

fn unknown_advice(aspect: &str, method: &str) -> anyhow::Error {
    AopError::UnknownAdviceMethod {
        aspect: aspect.to_string(),
        method: method.to_string(),
    }
    .into()
}

/// 切面注册器
///
/// 用于 inventory 在链接期收集切面，配合 `register_aspect!` 使用
pub struct AspectRegistration {
    /// 服务 ID
    pub id: &'static str,

    /// 切面的类型元数据
    pub metadata: fn() -> ClassMetadata,

    /// 创建切面实例的函数
    pub creator: fn() -> Arc<dyn Aspect>,
}

impl AspectRegistration {
    pub const fn new(
        id: &'static str,
        metadata: fn() -> ClassMetadata,
        creator: fn() -> Arc<dyn Aspect>,
    ) -> Self {
        Self {
            id,
            metadata,
            creator,
        }
    }

    pub fn create_instance(&self) -> Arc<dyn Aspect> {
        (self.creator)()
    }
}

inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}

// ============================================================================
// 预定义的常用切面
// ============================================================================

/// 日志切面 - 记录匹配服务的方法进入与退出
///
/// 服务 ID 模式支持 `prefix*` 与 `*suffix`
#[derive(Debug, Clone)]
pub struct LoggingAspect {
    patterns: Vec<String>,
}

impl LoggingAspect {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// 通知声明依赖于配置的服务模式，因此元数据按实例生成
    pub fn metadata(&self) -> ClassMetadata {
        let pointcut = || PointcutSpec::ServiceIds(self.patterns.clone());
        ClassMetadata::new("aspectra::LoggingAspect")
            .with_attribute(ASPECT_ATTRIBUTE)
            .with_method(
                MethodMetadata::new("log_entry")
                    .with_advice(Advice::new(AdviceKind::Before, pointcut())),
            )
            .with_method(
                MethodMetadata::new("log_exit")
                    .with_advice(Advice::new(AdviceKind::After, pointcut())),
            )
    }

    pub fn log_entry(&self, join_point: &JoinPoint) {
        tracing::info!(
            service = join_point.service_id().unwrap_or_default(),
            method = join_point.method(),
            sequence = join_point.sequence_id(),
            "→ Entering"
        );
    }

    pub fn log_exit(&self, join_point: &JoinPoint) {
        match join_point.exception() {
            Some(error) => tracing::info!(
                service = join_point.service_id().unwrap_or_default(),
                method = join_point.method(),
                sequence = join_point.sequence_id(),
                error = %error,
                "← Exiting with error"
            ),
            None => tracing::info!(
                service = join_point.service_id().unwrap_or_default(),
                method = join_point.method(),
                sequence = join_point.sequence_id(),
                "← Exiting"
            ),
        }
    }
}

impl Aspect for LoggingAspect {
    fn name(&self) -> &str {
        "LoggingAspect"
    }

    fn advise(&self, method: &str, join_point: &mut JoinPoint) -> anyhow::Result<Option<Value>> {
        match method {
            "log_entry" => self.log_entry(join_point),
            "log_exit" => self.log_exit(join_point),
            other => return Err(unknown_advice(self.name(), other)),
        }
        Ok(None)
    }
}

/// 方法属性：标记需要计时的方法
pub const STOPWATCH_ATTRIBUTE: &str = "Stopwatch";

/// 计时结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopwatchEvent {
    pub service: String,
    pub method: String,
    pub sequence: u64,
    pub elapsed: Duration,
}

/// 调用开始时间，保存在连接点的扩展数据中
struct StopwatchStart(Instant);

/// 计时切面 - 统计带 `Stopwatch` 属性方法的耗时
#[derive(Debug, Default, Clone)]
pub struct StopwatchAspect {
    events: Arc<Mutex<Vec<StopwatchEvent>>>,
}

impl StopwatchAspect {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已完成的计时事件
    pub fn events(&self) -> Vec<StopwatchEvent> {
        self.events.lock().clone()
    }

    pub fn start_event(&self, join_point: &mut JoinPoint) {
        join_point
            .extensions_mut()
            .insert(StopwatchStart(Instant::now()));
    }

    pub fn stop_event(&self, join_point: &mut JoinPoint) {
        // 在 Before 中提前返回时不会有开始时间
        let Some(StopwatchStart(started)) = join_point.extensions_mut().remove::<StopwatchStart>()
        else {
            return;
        };

        let event = StopwatchEvent {
            service: join_point.service_id().unwrap_or_default().to_string(),
            method: join_point.method().to_string(),
            sequence: join_point.sequence_id(),
            elapsed: started.elapsed(),
        };
        tracing::debug!(
            service = %event.service,
            method = %event.method,
            sequence = event.sequence,
            elapsed = ?event.elapsed,
            "Stopwatch event stopped"
        );
        self.events.lock().push(event);
    }
}

impl Reflect for StopwatchAspect {
    fn class_metadata() -> ClassMetadata {
        let pointcut = || PointcutSpec::MethodAttribute(STOPWATCH_ATTRIBUTE.to_string());
        ClassMetadata::new("aspectra::StopwatchAspect")
            .with_attribute(ASPECT_ATTRIBUTE)
            .with_method(
                MethodMetadata::new("start_event")
                    .with_advice(Advice::new(AdviceKind::Before, pointcut())),
            )
            .with_method(
                MethodMetadata::new("stop_event")
                    .with_advice(Advice::new(AdviceKind::After, pointcut())),
            )
    }
}

impl Aspect for StopwatchAspect {
    fn name(&self) -> &str {
        "StopwatchAspect"
    }

    fn advise(&self, method: &str, join_point: &mut JoinPoint) -> anyhow::Result<Option<Value>> {
        match method {
            "start_event" => self.start_event(join_point),
            "stop_event" => self.stop_event(join_point),
            other => return Err(unknown_advice(self.name(), other)),
        }
        Ok(None)
    }
}

/// 类属性：标记需要记录异常的类型
pub const CATCH_EXCEPTION_ATTRIBUTE: &str = "CatchException";

/// 异常处理切面 - 记录带 `CatchException` 属性类型抛出的错误
///
/// 只记录，不吞掉错误
#[derive(Debug, Default, Clone, Copy)]
pub struct ExceptionAspect;

impl ExceptionAspect {
    pub fn catch_exception(&self, join_point: &JoinPoint) {
        if let Some(info) = join_point.error_info() {
            tracing::error!(
                service = join_point.service_id().unwrap_or_default(),
                method = join_point.method(),
                sequence = join_point.sequence_id(),
                root_cause = %info.root_cause,
                "❌ Exception: {}",
                info.full_description()
            );
        }
    }
}

impl Reflect for ExceptionAspect {
    fn class_metadata() -> ClassMetadata {
        ClassMetadata::new("aspectra::ExceptionAspect")
            .with_attribute(ASPECT_ATTRIBUTE)
            .with_method(MethodMetadata::new("catch_exception").with_advice(Advice::new(
                AdviceKind::AfterThrowing,
                PointcutSpec::ClassAttribute(CATCH_EXCEPTION_ATTRIBUTE.to_string()),
            )))
    }
}

impl Aspect for ExceptionAspect {
    fn name(&self) -> &str {
        "ExceptionAspect"
    }

    fn advise(&self, method: &str, join_point: &mut JoinPoint) -> anyhow::Result<Option<Value>> {
        match method {
            "catch_exception" => self.catch_exception(join_point),
            other => return Err(unknown_advice(self.name(), other)),
        }
        Ok(None)
    }
}
