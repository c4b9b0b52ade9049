use aspectra::prelude::*;
use aspectra::{
    DelegateStrategy, ExceptionAspect, FactoryClass, FactoryDescriptor, InstanceResolver,
    LoggingAspect, SequenceCounter, StopwatchAspect, TrailingVariadic,
};
use aspectra_macros::aspect;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static AUDITED: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct AuditAspect;

#[aspect(name = "tests::AuditAspect")]
impl AuditAspect {
    #[before(service_tags = ["audited"])]
    pub fn audit(&self, _jp: &JoinPoint) {
        AUDITED.fetch_add(1, Ordering::SeqCst);
    }
}

aspectra::register_aspect!("tests.audit", AuditAspect);

static TRACKER_INSTANCES: AtomicUsize = AtomicUsize::new(0);
static TRACKED_CALLS: Mutex<Vec<(&'static str, usize)>> = Mutex::new(Vec::new());

/// 记录处理每条通知的切面实例编号
struct InstanceTracker {
    instance: usize,
}

impl Default for InstanceTracker {
    fn default() -> Self {
        Self {
            instance: TRACKER_INSTANCES.fetch_add(1, Ordering::SeqCst),
        }
    }
}

#[aspect(name = "tests::InstanceTracker")]
impl InstanceTracker {
    #[before(service_tags = ["tracked"])]
    pub fn enter(&self, _jp: &JoinPoint) {
        TRACKED_CALLS.lock().push(("before", self.instance));
    }

    #[after(service_tags = ["tracked"])]
    pub fn leave(&self, _jp: &JoinPoint) {
        TRACKED_CALLS.lock().push(("after", self.instance));
    }
}

aspectra::register_aspect!("tests.tracker", InstanceTracker);

/// 每次调用前重新生成委托对象
#[derive(Default)]
struct FreshInstance;

#[aspect]
impl FreshInstance {
    #[around(class_attribute = "Prototype")]
    pub fn fresh(&self, jp: &mut JoinPoint) -> anyhow::Result<Option<Value>> {
        let delegate = InstanceResolver::new().create(jp)?;
        jp.set_delegate(Some(delegate));
        jp.proceed()
    }
}

/// 返回自身编号的计数器服务
#[derive(Clone)]
struct Counter {
    id: usize,
}

impl Target for Counter {
    fn invoke(&self, method: &str, args: &[Value]) -> anyhow::Result<Option<Value>> {
        match method {
            "id" => Ok(Some(Value::from(self.id as i64))),
            "sum" => {
                let total = args.iter().filter_map(|v| v.downcast_ref::<i64>()).sum::<i64>();
                Ok(Some(Value::from(total)))
            }
            "fail" => Err(anyhow::anyhow!("disk full").context("failed to save")),
            other => anyhow::bail!("no method {}", other),
        }
    }

    fn has_method(&self, method: &str) -> bool {
        matches!(method, "id" | "sum" | "fail")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_target(&self) -> Option<Arc<dyn Target>> {
        Some(Arc::new(self.clone()))
    }
}

/// 按递增编号生产计数器
#[derive(Default)]
struct CounterFactory {
    produced: AtomicUsize,
}

impl FactoryClass for CounterFactory {
    fn type_name(&self) -> &str {
        "tests::CounterFactory"
    }

    fn has_function(&self, function: &str) -> bool {
        function == "create"
    }

    fn call(&self, _function: &str, _args: &[Value]) -> anyhow::Result<Option<Value>> {
        let id = self.produced.fetch_add(1, Ordering::SeqCst) + 1;
        let target: Arc<dyn Target> = Arc::new(Counter { id });
        Ok(Some(Value::new(target)))
    }
}

fn counter_class(name: &str) -> ClassMetadata {
    ClassMetadata::new(name)
        .with_method(MethodMetadata::new("id"))
        .with_method(MethodMetadata::new("sum"))
        .with_method(MethodMetadata::new("fail"))
}

fn id_of(value: Option<Value>) -> i64 {
    value.and_then(|v| v.downcast_ref::<i64>().copied()).unwrap_or(-1)
}

#[test]
fn test_registered_aspects_are_loaded() {
    let mut registry = ServiceRegistry::new();
    assert!(registry.load_registered_aspects() >= 1);
    assert!(registry.get("tests.audit").is_some_and(|d| d.is_aspect()));

    registry.register(ServiceDefinition::new("audited", counter_class("tests::Counter")).with_tag("audited"));
    registry.register(ServiceDefinition::new("plain", counter_class("tests::Counter")));

    let plan = Weaver::new().plan(&registry).unwrap();
    assert!(plan.is_woven("audited"));
    assert!(!plan.is_woven("plain"));

    let proxy = plan
        .build_proxy("audited", Arc::new(Counter { id: 7 }))
        .unwrap();
    let before = AUDITED.load(Ordering::SeqCst);
    assert_eq!(id_of(proxy.call("id", Vec::new()).unwrap()), 7);
    assert_eq!(AUDITED.load(Ordering::SeqCst), before + 1);
}

#[test]
fn test_registered_aspect_is_shared_across_calls() {
    let mut registry = ServiceRegistry::new();
    registry.load_registered_aspects();
    registry.register(ServiceDefinition::new("tracked", counter_class("tests::Counter")).with_tag("tracked"));

    let plan = Weaver::new().plan(&registry).unwrap();
    let proxy = plan.build_proxy("tracked", Arc::new(Counter { id: 5 })).unwrap();
    for _ in 0..3 {
        assert_eq!(id_of(proxy.call("id", Vec::new()).unwrap()), 5);
    }

    let calls = TRACKED_CALLS.lock().clone();
    assert_eq!(calls.len(), 6);
    assert_eq!(calls.iter().filter(|(kind, _)| *kind == "before").count(), 3);
    assert!(calls.iter().all(|(_, instance)| *instance == calls[0].1));
}

#[test]
fn test_factory_recreates_delegate() {
    let factory = Arc::new(CounterFactory::default());
    let mut registry = ServiceRegistry::new();
    registry.register(ServiceDefinition::reflected_aspect("fresh", FreshInstance));
    registry.register(
        ServiceDefinition::new(
            "counter",
            counter_class("tests::Counter").with_attribute("Prototype"),
        )
        .with_factory(FactoryDescriptor::from_static(factory.clone(), "create")),
    );

    let plan = Weaver::new().plan(&registry).unwrap();
    assert!(matches!(
        plan.get("counter").unwrap().delegate_strategy(),
        DelegateStrategy::Factory(_)
    ));

    let proxy = plan.build_proxy("counter", Arc::new(Counter { id: 0 })).unwrap();
    assert_eq!(id_of(proxy.call("id", Vec::new()).unwrap()), 1);
    assert_eq!(id_of(proxy.call("id", Vec::new()).unwrap()), 2);
    assert_eq!(factory.produced.load(Ordering::SeqCst), 2);
}

#[test]
fn test_prototype_without_factory_clones_delegate() {
    let mut registry = ServiceRegistry::new();
    registry.register(ServiceDefinition::reflected_aspect("fresh", FreshInstance));
    registry.register(
        ServiceDefinition::new(
            "counter",
            counter_class("tests::Counter").with_attribute("Prototype"),
        )
        .with_instance(Arc::new(Counter { id: 3 })),
    );

    let plan = Weaver::new().plan(&registry).unwrap();
    let proxy = plan.build_registered_proxy("counter").unwrap().unwrap();
    assert_eq!(id_of(proxy.call("id", Vec::new()).unwrap()), 3);
    assert!(plan.build_registered_proxy("missing").unwrap().is_none());
}

#[test]
fn test_stock_aspects() {
    let stopwatch = StopwatchAspect::new();
    let logging = LoggingAspect::new(["*Counter"]);

    let mut registry = ServiceRegistry::new();
    registry.register(ServiceDefinition::reflected_aspect("stopwatch", stopwatch.clone()));
    registry.register(ServiceDefinition::reflected_aspect("exception", ExceptionAspect));
    registry.register(ServiceDefinition::aspect(
        "logging",
        logging.metadata(),
        Arc::new(logging),
    ));

    let class = ClassMetadata::new("tests::Counter")
        .with_attribute("CatchException")
        .with_method(MethodMetadata::new("id").with_attribute("Stopwatch"))
        .with_method(MethodMetadata::new("fail"));
    registry.register(ServiceDefinition::new("app.Counter", class));

    let plan = Weaver::new().plan(&registry).unwrap();
    let proxy = plan.build_proxy("app.Counter", Arc::new(Counter { id: 1 })).unwrap();

    assert_eq!(id_of(proxy.call("id", Vec::new()).unwrap()), 1);
    let events = stopwatch.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].service, "app.Counter");
    assert_eq!(events[0].method, "id");

    // 异常切面只记录，错误原样传播
    let err = proxy.call("fail", Vec::new()).unwrap_err();
    assert_eq!(err.to_string(), "failed to save");
    assert_eq!(err.root_cause().to_string(), "disk full");
    assert_eq!(stopwatch.events().len(), 1);
}

#[test]
fn test_variadic_arguments_are_spread() {
    let mut registry = ServiceRegistry::new();
    registry.register(ServiceDefinition::reflected_aspect("stopwatch", StopwatchAspect::new()));
    let class = ClassMetadata::new("tests::Counter")
        .with_method(MethodMetadata::new("sum").with_attribute("Stopwatch"));
    registry.register(ServiceDefinition::new("counter", class));

    let plan = Weaver::new()
        .plan(&registry)
        .unwrap()
        .with_argument_normalizer(Arc::new(TrailingVariadic::new(["sum"])));
    let proxy = plan.build_proxy("counter", Arc::new(Counter { id: 1 })).unwrap();

    let args = vec![
        Value::from(1i64),
        Value::new(vec![Value::from(2i64), Value::from(3i64)]),
    ];
    assert_eq!(id_of(proxy.call("sum", args).unwrap()), 6);
}

#[test]
fn test_disabled_by_config() {
    let config = AopConfig::from_toml_str("enabled = false").unwrap();
    let mut registry = ServiceRegistry::new();
    registry.register(ServiceDefinition::reflected_aspect("fresh", FreshInstance));
    registry.register(ServiceDefinition::new(
        "counter",
        counter_class("tests::Counter").with_attribute("Prototype"),
    ));

    let plan = Weaver::with_config(config).plan(&registry).unwrap();
    assert!(plan.is_empty());
    assert!(plan.build_proxy("counter", Arc::new(Counter { id: 1 })).is_none());
}

#[test]
fn test_concurrent_calls_get_unique_sequence_ids() {
    let stopwatch = StopwatchAspect::new();
    let mut registry = ServiceRegistry::new();
    registry.register(ServiceDefinition::reflected_aspect("stopwatch", stopwatch.clone()));
    let class = ClassMetadata::new("tests::Counter")
        .with_method(MethodMetadata::new("id").with_attribute("Stopwatch"));
    registry.register(ServiceDefinition::new("counter", class));

    let sequence = Arc::new(SequenceCounter::new());
    let plan = Weaver::new()
        .plan(&registry)
        .unwrap()
        .with_sequence(sequence.clone());
    let proxy = plan.build_proxy("counter", Arc::new(Counter { id: 1 })).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let proxy = proxy.clone();
            scope.spawn(move || {
                for _ in 0..25 {
                    assert_eq!(id_of(proxy.call("id", Vec::new()).unwrap()), 1);
                }
            });
        }
    });

    let sequences: HashSet<u64> = stopwatch.events().iter().map(|e| e.sequence).collect();
    assert_eq!(sequences.len(), 100);
    assert_eq!(sequence.current(), 100);
    assert!(proxy.interceptor().pool_statistics().total_created <= 4);
}
