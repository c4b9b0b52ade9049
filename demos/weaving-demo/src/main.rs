use aspectra::prelude::*;
use aspectra::{ExceptionAspect, StopwatchAspect};
use aspectra_macros::aspect;
use std::any::Any;
use std::sync::Arc;

// ==================== 业务服务 ====================

/// 用户仓储
struct UserRepository;

impl UserRepository {
    fn metadata() -> ClassMetadata {
        ClassMetadata::new("demo::UserRepository")
            .with_attribute("CatchException")
            .with_method(MethodMetadata::new("new"))
            .with_method(MethodMetadata::new("find").with_attribute("Stopwatch"))
            .with_method(MethodMetadata::new("delete"))
    }

    fn find(&self, id: i64) -> anyhow::Result<String> {
        Ok(format!("user-{}", id))
    }

    fn delete(&self, id: i64) -> anyhow::Result<()> {
        anyhow::bail!("user-{} is protected", id)
    }
}

impl Target for UserRepository {
    fn invoke(&self, method: &str, args: &[Value]) -> anyhow::Result<Option<Value>> {
        let id = args
            .first()
            .and_then(|v| v.downcast_ref::<i64>())
            .copied()
            .unwrap_or_default();
        match method {
            "find" => Ok(Some(Value::from(self.find(id)?))),
            "delete" => self.delete(id).map(|_| None),
            other => anyhow::bail!("UserRepository has no method '{}'", other),
        }
    }

    fn has_method(&self, method: &str) -> bool {
        matches!(method, "find" | "delete")
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ==================== 切面 ====================

/// 缓存切面 - 命中时在 Before 中提前返回
#[derive(Default)]
struct CacheAspect;

#[aspect(name = "demo::CacheAspect")]
impl CacheAspect {
    #[before("serviceId ends with 'Repository' && method.getName() == 'find'")]
    pub fn lookup(&self, jp: &mut JoinPoint) {
        let hit = jp.arg(0).and_then(|v| v.downcast_ref::<i64>()) == Some(&0);
        if hit {
            tracing::info!("💾 Cache hit for {}", jp.signature());
            jp.return_with(Some(Value::from("user-0 (cached)")));
        }
    }
}

/// 审计切面 - 环绕记录调用
#[derive(Default)]
struct AuditAspect;

#[aspect(name = "demo::AuditAspect")]
impl AuditAspect {
    #[around(service_tags = ["audited"])]
    pub fn audit(&self, jp: &mut JoinPoint) -> anyhow::Result<Option<Value>> {
        tracing::info!("🔍 [{}] → {}", jp.sequence_id(), jp.signature());
        let result = jp.proceed();
        tracing::info!("🔍 [{}] ← {} ok={}", jp.sequence_id(), jp.signature(), result.is_ok());
        result
    }
}

fn describe(result: anyhow::Result<Option<Value>>) -> String {
    match result {
        Ok(Some(value)) => format!("{:?}", value),
        Ok(None) => "()".to_string(),
        Err(err) => format!("error: {}", err),
    }
}

fn main() -> anyhow::Result<()> {
    // 按优先级查找配置文件
    let config = ["aop.toml", "demos/weaving-demo/aop.toml"]
        .into_iter()
        .find(|path| std::path::Path::new(path).exists())
        .map(AopConfig::from_file)
        .transpose()?
        .unwrap_or_default()
        .with_env_overrides()?;

    config.logging.clone().init()?;

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║                Weaving Services                    ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    let stopwatch = StopwatchAspect::new();
    let mut registry = ServiceRegistry::new();
    registry.register(ServiceDefinition::reflected_aspect("cache", CacheAspect));
    registry.register(ServiceDefinition::reflected_aspect("audit", AuditAspect));
    registry.register(ServiceDefinition::reflected_aspect("stopwatch", stopwatch.clone()));
    registry.register(ServiceDefinition::reflected_aspect("exception", ExceptionAspect));
    registry.register(
        ServiceDefinition::new("userRepository", UserRepository::metadata())
            .with_tag("audited")
            .with_instance(Arc::new(UserRepository)),
    );

    let plan = Weaver::with_config(config).plan(&registry)?;
    for service in plan.services() {
        println!("📦 {} ({})", service.service_id(), service.class_name());
        for marker in service.markers() {
            println!("   {}", marker);
        }
    }

    let Some(repository) = plan.build_registered_proxy("userRepository")? else {
        println!("⚠️  Weaving is disabled, nothing to intercept\n");
        return Ok(());
    };

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║                Intercepted Calls                   ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    println!("find(42)   => {}", describe(repository.call("find", vec![Value::from(42i64)])));
    println!("find(0)    => {}", describe(repository.call("find", vec![Value::from(0i64)])));
    println!("delete(7)  => {}", describe(repository.call("delete", vec![Value::from(7i64)])));

    println!("\n⏱️  Stopwatch:");
    for event in stopwatch.events() {
        println!(
            "   #{} {}::{} took {:?}",
            event.sequence, event.service, event.method, event.elapsed
        );
    }

    let stats = repository.interceptor().pool_statistics();
    println!(
        "\n♻️  Join point pool: created={} reused={} rate={:.0}%",
        stats.total_created,
        stats.total_reused,
        stats.reuse_rate * 100.0
    );

    println!("\n💡 Try these commands:");
    println!("   AOP_ENABLED=false cargo run -p weaving-demo");
    println!("   RUST_LOG=aspectra=debug cargo run -p weaving-demo");
    println!();

    Ok(())
}
