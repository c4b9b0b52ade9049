//! 方法拦截器
//!
//! 每个被织入的目标一个拦截器，持有只读的绑定表，暴露唯一的调用入口。
//!
//! 执行顺序：
//!
//! ```text
//! Start → (Around 链) → Before* → {提前返回 | 目标方法}
//!       → 正常返回：AfterReturning* → After* → 返回
//!       → 抛出错误：AfterThrowing* → (提前返回 ? After* → 返回 : After* → 重新抛出)
//! ```

use crate::advice::AdviceKind;
use crate::binding::{AdviceBinding, BindingTable};
use crate::error::AopError;
use crate::instance::FactoryDescriptor;
use crate::joinpoint::{JoinPoint, Proceed};
use crate::pool::{JoinPointPool, PoolStatistics, DEFAULT_POOL_CAPACITY};
use crate::sequence::SequenceCounter;
use crate::target::{ArgumentNormalizer, PassThrough, Target};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 一次调用的结果
#[derive(Debug)]
pub enum InvokeOutcome {
    /// 方法没有绑定任何通知，参数原样交还，调用方应自行调用目标
    NotIntercepted(Vec<Value>),
    /// 拦截器已接管调用
    Intercepted(Option<Value>),
}

impl InvokeOutcome {
    pub fn is_intercepted(&self) -> bool {
        matches!(self, InvokeOutcome::Intercepted(_))
    }

    /// 拦截结果的返回值；未拦截时为 `None`
    pub fn into_value(self) -> Option<Value> {
        match self {
            InvokeOutcome::Intercepted(value) => value,
            InvokeOutcome::NotIntercepted(_) => None,
        }
    }
}

/// 除 Around 之外的各阶段通知
struct Stages {
    before: Vec<AdviceBinding>,
    after_returning: Vec<AdviceBinding>,
    after_throwing: Vec<AdviceBinding>,
    after: Vec<AdviceBinding>,
}

impl Stages {
    fn from_table(table: &BindingTable, method: &str) -> Self {
        Self {
            before: table.get(method, AdviceKind::Before).to_vec(),
            after_returning: table.get(method, AdviceKind::AfterReturning).to_vec(),
            after_throwing: table.get(method, AdviceKind::AfterThrowing).to_vec(),
            after: table.get(method, AdviceKind::After).to_vec(),
        }
    }
}

/// 目标调用阶段的结局，After 通知执行完后再兑现
enum Completion {
    Returned(Option<Value>),
    Rethrow,
    AdviceFailed(anyhow::Error),
}

fn run_stage(stage: &[AdviceBinding], join_point: &mut JoinPoint) -> anyhow::Result<()> {
    for advice in stage {
        advice.call(join_point)?;
    }
    Ok(())
}

/// Before → 目标 → AfterReturning/AfterThrowing → After
fn run_pipeline(
    stages: &Stages,
    normalizer: &dyn ArgumentNormalizer,
    join_point: &mut JoinPoint,
) -> anyhow::Result<Option<Value>> {
    // Around 多次 proceed 时每一轮从干净的控制状态开始
    join_point.set_return_early(false);
    join_point.set_exception(None);

    for advice in &stages.before {
        advice.call(join_point)?;
        if join_point.is_return_early() {
            return Ok(join_point.return_value().cloned());
        }
    }

    // Before 可能替换了委托对象或参数
    let delegate = join_point
        .delegate()
        .cloned()
        .ok_or_else(|| AopError::MissingDelegate {
            service: join_point.service_id().unwrap_or_default().to_string(),
            method: join_point.method().to_string(),
        })?;
    let args = normalizer.normalize(join_point.method(), join_point.args().to_vec());

    let completion = match delegate.invoke(join_point.method(), &args) {
        Ok(value) => {
            join_point.set_return_value(value.clone());
            // 只观察，不改变返回值
            match run_stage(&stages.after_returning, join_point) {
                Ok(()) => Completion::Returned(value),
                Err(error) => Completion::AdviceFailed(error),
            }
        }
        Err(error) => {
            join_point.set_exception(Some(error));
            handle_error(stages, join_point)
        }
    };

    // finally：无论成功、失败或提前返回都执行；After 自身失败时覆盖原结局
    run_stage(&stages.after, join_point)?;

    match completion {
        Completion::Returned(value) => Ok(value),
        Completion::AdviceFailed(error) => Err(error),
        Completion::Rethrow => Err(join_point.take_exception().unwrap_or_else(|| {
            anyhow::anyhow!("exception of {} was cleared before rethrow", join_point.method())
        })),
    }
}

/// 依次执行 AfterThrowing，第一个设置提前返回的通知把错误转换为返回值
fn handle_error(stages: &Stages, join_point: &mut JoinPoint) -> Completion {
    for advice in &stages.after_throwing {
        if let Err(error) = advice.call(join_point) {
            return Completion::AdviceFailed(error);
        }
        if join_point.is_return_early() {
            join_point.take_exception();
            return Completion::Returned(join_point.return_value().cloned());
        }
    }
    Completion::Rethrow
}

/// 构建方法的执行入口：Around 链包裹核心流程
///
/// 第 n 个 Around 的 `proceed()` 执行第 n+1 个，最后一个执行核心流程
fn compile_method(table: &BindingTable, method: &str, normalizer: Arc<dyn ArgumentNormalizer>) -> Proceed {
    let stages = Arc::new(Stages::from_table(table, method));
    let mut next: Proceed =
        Arc::new(move |jp: &mut JoinPoint| run_pipeline(&stages, normalizer.as_ref(), jp));

    for around in table.get(method, AdviceKind::Around).iter().rev() {
        let inner = next.clone();
        let around = around.clone();
        next = Arc::new(move |jp: &mut JoinPoint| {
            let outer = jp.replace_continuation(Some(inner.clone()));
            let result = around.call(jp);
            jp.replace_continuation(outer);
            result
        });
    }

    next
}

/// 拦截器构建器
pub struct InterceptorBuilder {
    service_id: Option<String>,
    bindings: BindingTable,
    pool_capacity: usize,
    sequence: Option<Arc<SequenceCounter>>,
    factory: Option<FactoryDescriptor>,
    normalizer: Arc<dyn ArgumentNormalizer>,
    trace_invocations: bool,
}

impl InterceptorBuilder {
    fn new() -> Self {
        Self {
            service_id: None,
            bindings: BindingTable::new(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            sequence: None,
            factory: None,
            normalizer: Arc::new(PassThrough),
            trace_invocations: false,
        }
    }

    pub fn service_id(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    /// 使用整张绑定表
    pub fn bindings(mut self, bindings: BindingTable) -> Self {
        self.bindings = bindings;
        self
    }

    /// 追加一条绑定
    pub fn advice(mut self, method: impl Into<String>, kind: AdviceKind, binding: AdviceBinding) -> Self {
        self.bindings.add(method, kind, binding);
        self
    }

    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// 共享的序号计数器，默认使用进程级计数器
    pub fn sequence(mut self, sequence: Arc<SequenceCounter>) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn factory(mut self, factory: Option<FactoryDescriptor>) -> Self {
        self.factory = factory;
        self
    }

    pub fn argument_normalizer(mut self, normalizer: Arc<dyn ArgumentNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn trace_invocations(mut self, trace: bool) -> Self {
        self.trace_invocations = trace;
        self
    }

    pub fn build(self) -> Interceptor {
        let pipelines = self
            .bindings
            .methods()
            .map(|method| {
                (
                    method.to_string(),
                    compile_method(&self.bindings, method, self.normalizer.clone()),
                )
            })
            .collect();

        Interceptor {
            service_id: self.service_id,
            bindings: self.bindings,
            pipelines,
            pool: JoinPointPool::with_capacity(self.pool_capacity),
            sequence: self.sequence.unwrap_or_else(SequenceCounter::global),
            factory: self.factory,
            trace_invocations: self.trace_invocations,
        }
    }
}

/// 方法拦截器
pub struct Interceptor {
    service_id: Option<String>,
    bindings: BindingTable,
    pipelines: HashMap<String, Proceed>,
    pool: JoinPointPool,
    sequence: Arc<SequenceCounter>,
    factory: Option<FactoryDescriptor>,
    trace_invocations: bool,
}

impl Interceptor {
    pub fn builder() -> InterceptorBuilder {
        InterceptorBuilder::new()
    }

    pub fn service_id(&self) -> Option<&str> {
        self.service_id.as_deref()
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// 方法是否被拦截
    pub fn intercepts(&self, method: &str) -> bool {
        self.pipelines.contains_key(method)
    }

    pub fn pool_statistics(&self) -> PoolStatistics {
        self.pool.statistics()
    }

    /// 调用入口
    ///
    /// 方法没有绑定时立即返回 [`InvokeOutcome::NotIntercepted`]，不触碰任何通知；
    /// 否则拦截器接管返回值。目标与通知的错误原样向上传递
    pub fn invoke(
        &self,
        proxy: Option<Arc<dyn Target>>,
        delegate: Arc<dyn Target>,
        method: &str,
        args: Vec<Value>,
    ) -> anyhow::Result<InvokeOutcome> {
        let Some(pipeline) = self.pipelines.get(method) else {
            return Ok(InvokeOutcome::NotIntercepted(args));
        };

        let mut join_point = self.pool.acquire_guard();
        join_point.set_proxy(proxy);
        join_point.set_delegate(Some(delegate));
        join_point.set_method(method);
        join_point.set_args(args);
        join_point.set_factory(self.factory.clone());
        join_point.set_service_id(self.service_id.clone());
        let sequence = self.sequence.next();
        join_point.set_sequence_id(sequence);

        if self.trace_invocations {
            tracing::trace!(
                service = self.service_id().unwrap_or_default(),
                method,
                sequence,
                "Intercepting call"
            );
        }

        let result = pipeline(&mut *join_point);

        if self.trace_invocations {
            tracing::trace!(
                service = self.service_id().unwrap_or_default(),
                method,
                sequence,
                ok = result.is_ok(),
                "Intercepted call finished"
            );
        }

        result.map(InvokeOutcome::Intercepted)
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("service_id", &self.service_id)
            .field("bindings", &self.bindings)
            .field("factory", &self.factory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspect::Aspect;
    use parking_lot::Mutex;
    use std::any::Any;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Service {
        log: Log,
    }

    impl Target for Service {
        fn invoke(&self, method: &str, args: &[Value]) -> anyhow::Result<Option<Value>> {
            self.log.lock().push(format!("target:{}", method));
            match method {
                "doWork" => Ok(Some(Value::from("original"))),
                "throwError" => anyhow::bail!("Test error"),
                "echo" => Ok(args.first().cloned()),
                other => anyhow::bail!("no method {}", other),
            }
        }

        fn has_method(&self, method: &str) -> bool {
            matches!(method, "doWork" | "throwError" | "echo")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// 记录调用顺序的测试切面
    struct Recorder {
        log: Log,
    }

    impl Aspect for Recorder {
        fn name(&self) -> &str {
            "Recorder"
        }

        fn advise(&self, method: &str, jp: &mut JoinPoint) -> anyhow::Result<Option<Value>> {
            self.log.lock().push(method.to_string());
            match method {
                "shortCircuit" => jp.return_with(Some(Value::from("cached"))),
                "recover" => jp.return_with(Some(Value::from("handled"))),
                "mutate" => jp.set_return_value(Some(Value::from("modified"))),
                "failing" => anyhow::bail!("advice failed"),
                "around" => return jp.proceed(),
                "aroundTwice" => {
                    jp.proceed()?;
                    return jp.proceed();
                }
                "aroundSkip" => return Ok(Some(Value::from("skipped"))),
                _ => {}
            }
            Ok(None)
        }
    }

    fn fixture() -> (Log, Arc<dyn Target>, Arc<dyn Aspect>) {
        let log: Log = Arc::default();
        let service: Arc<dyn Target> = Arc::new(Service { log: log.clone() });
        let aspect: Arc<dyn Aspect> = Arc::new(Recorder { log: log.clone() });
        (log, service, aspect)
    }

    fn bind(aspect: &Arc<dyn Aspect>, advice: &str) -> AdviceBinding {
        AdviceBinding::from_aspect("recorder", aspect.clone(), advice)
    }

    fn text(value: Option<Value>) -> String {
        value
            .and_then(|v| v.downcast_ref::<String>().cloned())
            .unwrap_or_default()
    }

    #[test]
    fn test_unbound_method_is_not_intercepted() {
        let (log, service, aspect) = fixture();
        let interceptor = Interceptor::builder()
            .advice("doWork", AdviceKind::Before, bind(&aspect, "before"))
            .build();

        let outcome = interceptor
            .invoke(None, service, "echo", vec![Value::from(7i64)])
            .unwrap();
        assert!(!outcome.is_intercepted());
        let InvokeOutcome::NotIntercepted(args) = outcome else {
            panic!("echo should not be intercepted");
        };
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].downcast_ref::<i64>(), Some(&7));
        assert!(log.lock().is_empty());
        assert_eq!(interceptor.pool_statistics().total_created, 0);
    }

    #[test]
    fn test_normal_return_order() {
        let (log, service, aspect) = fixture();
        let interceptor = Interceptor::builder()
            .advice("doWork", AdviceKind::After, bind(&aspect, "after"))
            .advice("doWork", AdviceKind::AfterReturning, bind(&aspect, "afterReturning"))
            .advice("doWork", AdviceKind::Before, bind(&aspect, "before"))
            .build();

        let outcome = interceptor.invoke(None, service, "doWork", vec![]).unwrap();
        assert_eq!(text(outcome.into_value()), "original");
        assert_eq!(
            *log.lock(),
            vec!["before", "target:doWork", "afterReturning", "after"]
        );
    }

    #[test]
    fn test_before_return_early_skips_target_and_after() {
        let (log, service, aspect) = fixture();
        let interceptor = Interceptor::builder()
            .advice("doWork", AdviceKind::Before, bind(&aspect, "shortCircuit"))
            .advice("doWork", AdviceKind::Before, bind(&aspect, "never"))
            .advice("doWork", AdviceKind::After, bind(&aspect, "after"))
            .build();

        let outcome = interceptor.invoke(None, service, "doWork", vec![]).unwrap();
        assert_eq!(text(outcome.into_value()), "cached");
        assert_eq!(*log.lock(), vec!["shortCircuit"]);
    }

    #[test]
    fn test_error_is_rethrown_unchanged() {
        let (log, service, aspect) = fixture();
        let interceptor = Interceptor::builder()
            .advice("throwError", AdviceKind::Before, bind(&aspect, "before"))
            .advice("throwError", AdviceKind::AfterReturning, bind(&aspect, "afterReturning"))
            .advice("throwError", AdviceKind::AfterThrowing, bind(&aspect, "afterThrowing"))
            .advice("throwError", AdviceKind::After, bind(&aspect, "after"))
            .build();

        let err = interceptor
            .invoke(None, service, "throwError", vec![])
            .unwrap_err();
        assert_eq!(err.to_string(), "Test error");
        assert_eq!(
            *log.lock(),
            vec!["before", "target:throwError", "afterThrowing", "after"]
        );
    }

    #[test]
    fn test_after_throwing_can_recover() {
        let (log, service, aspect) = fixture();
        let interceptor = Interceptor::builder()
            .advice("throwError", AdviceKind::AfterThrowing, bind(&aspect, "recover"))
            .advice("throwError", AdviceKind::AfterThrowing, bind(&aspect, "never"))
            .advice("throwError", AdviceKind::After, bind(&aspect, "after"))
            .build();

        let outcome = interceptor.invoke(None, service, "throwError", vec![]).unwrap();
        assert_eq!(text(outcome.into_value()), "handled");
        assert_eq!(*log.lock(), vec!["target:throwError", "recover", "after"]);
    }

    #[test]
    fn test_after_returning_cannot_change_result() {
        let (_log, service, aspect) = fixture();
        let interceptor = Interceptor::builder()
            .advice("doWork", AdviceKind::AfterReturning, bind(&aspect, "mutate"))
            .advice("doWork", AdviceKind::After, bind(&aspect, "mutate"))
            .build();

        let outcome = interceptor.invoke(None, service, "doWork", vec![]).unwrap();
        assert_eq!(text(outcome.into_value()), "original");
    }

    #[test]
    fn test_after_runs_when_after_returning_fails() {
        let (log, service, aspect) = fixture();
        let interceptor = Interceptor::builder()
            .advice("doWork", AdviceKind::AfterReturning, bind(&aspect, "failing"))
            .advice("doWork", AdviceKind::After, bind(&aspect, "after"))
            .build();

        let err = interceptor.invoke(None, service, "doWork", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "advice failed");
        assert_eq!(*log.lock(), vec!["target:doWork", "failing", "after"]);
    }

    #[test]
    fn test_around_chain_nesting() {
        let (log, service, aspect) = fixture();
        let interceptor = Interceptor::builder()
            .advice("doWork", AdviceKind::Around, bind(&aspect, "around"))
            .advice("doWork", AdviceKind::Around, bind(&aspect, "aroundTwice"))
            .advice("doWork", AdviceKind::Before, bind(&aspect, "before"))
            .build();

        let outcome = interceptor.invoke(None, service, "doWork", vec![]).unwrap();
        assert_eq!(text(outcome.into_value()), "original");
        assert_eq!(
            *log.lock(),
            vec![
                "around",
                "aroundTwice",
                "before",
                "target:doWork",
                "before",
                "target:doWork",
            ]
        );
    }

    #[test]
    fn test_single_proceed_around_matches_plain_pipeline() {
        let run = |with_around: bool, method: &str| {
            let (log, service, aspect) = fixture();
            let mut builder = Interceptor::builder();
            if with_around {
                builder = builder.advice(method, AdviceKind::Around, bind(&aspect, "around"));
            }
            let interceptor = builder
                .advice(method, AdviceKind::Before, bind(&aspect, "before"))
                .advice(method, AdviceKind::AfterReturning, bind(&aspect, "afterReturning"))
                .advice(method, AdviceKind::AfterThrowing, bind(&aspect, "afterThrowing"))
                .advice(method, AdviceKind::After, bind(&aspect, "after"))
                .build();
            let result = interceptor
                .invoke(None, service, method, vec![])
                .map(|outcome| text(outcome.into_value()))
                .map_err(|e| e.to_string());
            let mut entries = log.lock().clone();
            if with_around {
                assert_eq!(entries.remove(0), "around");
            }
            (result, entries)
        };

        for method in ["doWork", "throwError"] {
            assert_eq!(run(true, method), run(false, method));
        }
        assert_eq!(run(true, "doWork").0, Ok("original".to_string()));
        assert_eq!(run(true, "throwError").0, Err("Test error".to_string()));
    }

    #[test]
    fn test_around_without_proceed_swallows_target() {
        let (log, service, aspect) = fixture();
        let interceptor = Interceptor::builder()
            .advice("doWork", AdviceKind::Around, bind(&aspect, "aroundSkip"))
            .advice("doWork", AdviceKind::After, bind(&aspect, "after"))
            .build();

        let outcome = interceptor.invoke(None, service, "doWork", vec![]).unwrap();
        assert_eq!(text(outcome.into_value()), "skipped");
        assert_eq!(*log.lock(), vec!["aroundSkip"]);
    }

    #[test]
    fn test_sequence_and_pool_reuse() {
        let (_log, service, aspect) = fixture();
        let sequence = Arc::new(SequenceCounter::new());
        let interceptor = Interceptor::builder()
            .service_id("app.service")
            .sequence(sequence.clone())
            .advice("echo", AdviceKind::Before, bind(&aspect, "before"))
            .build();

        for _ in 0..3 {
            interceptor
                .invoke(None, service.clone(), "echo", vec![Value::from(1i64)])
                .unwrap();
        }
        assert_eq!(sequence.current(), 3);

        let stats = interceptor.pool_statistics();
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.total_reused, 2);
        assert_eq!(stats.pool_size, 1);
    }
}
