//! 织入规划器
//!
//! 对每个切面方法上的每条通知与每个候选目标方法求值切点，生成绑定表。
//!
//! 1. 扫描切面，把通知按语句文本分组：语句 → 通知类型 → (切面, 切面方法) 列表
//! 2. 扫描其它服务的公开方法（跳过生命周期方法），逐条求值语句
//! 3. 匹配的方法追加绑定并打上 `aop-method:<name>` 标记；已标记的方法在重复织入时跳过

use crate::advice::AdviceKind;
use crate::binding::{AdviceBinding, BindingTable};
use crate::config::AopConfig;
use crate::error::{AopError, AopResult};
use crate::instance::FactoryDescriptor;
use crate::interceptor::Interceptor;
use crate::pointcut::{MatchContext, Pointcut};
use crate::proxy::WovenProxy;
use crate::registry::{ServiceDefinition, ServiceRegistry};
use crate::sequence::SequenceCounter;
use crate::target::{ArgumentNormalizer, Target};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// 委托对象的获取方式
#[derive(Debug, Clone)]
pub enum DelegateStrategy {
    /// 共享同一个实例
    Singleton,
    /// 通过工厂生成
    Factory(FactoryDescriptor),
}

/// 被织入的服务
#[derive(Clone)]
pub struct WovenService {
    service_id: String,
    class_name: String,
    bindings: BindingTable,
    delegate: DelegateStrategy,
    instance: Option<Arc<dyn Target>>,
}

impl WovenService {
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn delegate_strategy(&self) -> &DelegateStrategy {
        &self.delegate
    }

    /// 已织入方法的标记
    pub fn markers(&self) -> Vec<String> {
        self.bindings.markers()
    }

    pub fn is_marked(&self, method: &str) -> bool {
        self.bindings.contains_method(method)
    }

    fn factory(&self) -> Option<FactoryDescriptor> {
        match &self.delegate {
            DelegateStrategy::Singleton => None,
            DelegateStrategy::Factory(factory) => Some(factory.clone()),
        }
    }
}

impl fmt::Debug for WovenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WovenService")
            .field("service_id", &self.service_id)
            .field("class_name", &self.class_name)
            .field("bindings", &self.bindings)
            .field("delegate", &self.delegate)
            .field("has_instance", &self.instance.is_some())
            .finish()
    }
}

/// 织入计划统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanStatistics {
    pub statements: usize,
    pub services: usize,
    pub methods: usize,
    pub bindings: usize,
}

/// 织入计划
#[derive(Clone)]
pub struct WeavingPlan {
    config: AopConfig,
    services: IndexMap<String, WovenService>,
    statements: usize,
    sequence: Arc<SequenceCounter>,
    normalizer: Option<Arc<dyn ArgumentNormalizer>>,
}

impl WeavingPlan {
    fn new(config: AopConfig) -> Self {
        Self {
            config,
            services: IndexMap::new(),
            statements: 0,
            sequence: SequenceCounter::global(),
            normalizer: None,
        }
    }

    pub fn config(&self) -> &AopConfig {
        &self.config
    }

    /// 被织入的服务（按注册顺序）
    pub fn services(&self) -> impl Iterator<Item = &WovenService> {
        self.services.values()
    }

    pub fn get(&self, service_id: &str) -> Option<&WovenService> {
        self.services.get(service_id)
    }

    pub fn is_woven(&self, service_id: &str) -> bool {
        self.services.contains_key(service_id)
    }

    pub fn is_marked(&self, service_id: &str, method: &str) -> bool {
        self.get(service_id).is_some_and(|s| s.is_marked(method))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// 所有拦截器共享的序号计数器
    pub fn with_sequence(mut self, sequence: Arc<SequenceCounter>) -> Self {
        self.sequence = sequence;
        self
    }

    /// 所有拦截器使用的参数规整钩子
    pub fn with_argument_normalizer(mut self, normalizer: Arc<dyn ArgumentNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// 为服务构建拦截器
    pub fn build_interceptor(&self, service_id: &str) -> Option<Interceptor> {
        let service = self.services.get(service_id)?;
        let mut builder = Interceptor::builder()
            .service_id(service.service_id.clone())
            .bindings(service.bindings.clone())
            .pool_capacity(self.config.pool_capacity)
            .sequence(self.sequence.clone())
            .factory(service.factory())
            .trace_invocations(self.config.trace_invocations);
        if let Some(normalizer) = &self.normalizer {
            builder = builder.argument_normalizer(normalizer.clone());
        }
        Some(builder.build())
    }

    /// 为服务构建代理，委托对象由调用方提供
    pub fn build_proxy(&self, service_id: &str, delegate: Arc<dyn Target>) -> Option<Arc<WovenProxy>> {
        let interceptor = self.build_interceptor(service_id)?;
        Some(WovenProxy::new(Arc::new(interceptor), delegate))
    }

    /// 为服务构建代理，委托对象来自注册时提供的实例
    pub fn build_registered_proxy(&self, service_id: &str) -> AopResult<Option<Arc<WovenProxy>>> {
        let Some(service) = self.services.get(service_id) else {
            return Ok(None);
        };
        let instance = service
            .instance
            .clone()
            .ok_or_else(|| AopError::MissingDelegate {
                service: service_id.to_string(),
                method: "*".to_string(),
            })?;
        Ok(self.build_proxy(service_id, instance))
    }

    pub fn statistics(&self) -> PlanStatistics {
        PlanStatistics {
            statements: self.statements,
            services: self.services.len(),
            methods: self.services.values().map(|s| s.bindings.len()).sum(),
            bindings: self
                .services
                .values()
                .map(|s| s.bindings.binding_count())
                .sum(),
        }
    }
}

impl fmt::Debug for WeavingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeavingPlan")
            .field("config", &self.config)
            .field("services", &self.services)
            .field("statements", &self.statements)
            .finish()
    }
}

/// 按语句文本分组的通知
struct StatementGroup {
    pointcut: Pointcut,
    kinds: IndexMap<AdviceKind, Vec<AdviceBinding>>,
}

/// 织入规划器
#[derive(Debug, Clone, Default)]
pub struct Weaver {
    config: AopConfig,
}

impl Weaver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AopConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AopConfig {
        &self.config
    }

    /// 生成新的织入计划
    pub fn plan(&self, registry: &ServiceRegistry) -> AopResult<WeavingPlan> {
        let mut plan = WeavingPlan::new(self.config.clone());
        self.weave_into(registry, &mut plan)?;
        Ok(plan)
    }

    /// 在已有计划上继续织入；已标记的方法不会重复绑定
    pub fn weave_into(&self, registry: &ServiceRegistry, plan: &mut WeavingPlan) -> AopResult<()> {
        if !self.config.enabled {
            tracing::info!("AOP weaving is disabled, skipping");
            return Ok(());
        }

        let statements = collect_statements(registry)?;
        plan.statements = plan.statements.max(statements.len());
        tracing::debug!("Collected {} pointcut statement(s)", statements.len());

        for definition in registry.definitions() {
            if definition.is_skipped() || definition.is_aspect() {
                continue;
            }
            weave_service(definition, &statements, plan)?;
        }

        let stats = plan.statistics();
        tracing::info!(
            services = stats.services,
            methods = stats.methods,
            bindings = stats.bindings,
            "Weaving plan ready"
        );
        Ok(())
    }
}

/// 扫描切面：语句文本 → 通知类型 → 绑定列表（发现顺序）
fn collect_statements(registry: &ServiceRegistry) -> AopResult<IndexMap<String, StatementGroup>> {
    let mut statements: IndexMap<String, StatementGroup> = IndexMap::new();

    for definition in registry.definitions() {
        if definition.is_skipped() || !definition.is_aspect() {
            continue;
        }
        let Some(class) = definition.class() else {
            continue;
        };
        let accessor = definition.aspect_accessor().ok_or_else(|| {
            AopError::InvalidConfig(format!(
                "Aspect '{}' is declared without an instance",
                definition.id()
            ))
        })?;

        for method in class.public_methods() {
            for advice in method.advice() {
                let statement = advice.statement().ok_or_else(|| AopError::MissingPointcut {
                    aspect: class.name().to_string(),
                    method: method.name().to_string(),
                })?;

                if !statements.contains_key(&statement) {
                    let pointcut = Pointcut::compile(&statement)?;
                    statements.insert(
                        statement.clone(),
                        StatementGroup {
                            pointcut,
                            kinds: IndexMap::new(),
                        },
                    );
                }

                tracing::debug!(
                    aspect = definition.id(),
                    method = method.name(),
                    kind = %advice.kind(),
                    statement = %statement,
                    "Found advice"
                );

                if let Some(group) = statements.get_mut(&statement) {
                    group
                        .kinds
                        .entry(advice.kind())
                        .or_default()
                        .push(AdviceBinding::new(
                            definition.id(),
                            accessor.clone(),
                            method.name(),
                        ));
                }
            }
        }
    }

    Ok(statements)
}

fn weave_service(
    definition: &ServiceDefinition,
    statements: &IndexMap<String, StatementGroup>,
    plan: &mut WeavingPlan,
) -> AopResult<()> {
    let Some(class) = definition.class() else {
        return Ok(());
    };
    let parents = class.ancestors();
    let mut table = BindingTable::new();

    for method in class.public_methods() {
        if method.is_lifecycle_hook() {
            continue;
        }
        if plan.is_marked(definition.id(), method.name()) {
            tracing::debug!(
                service = definition.id(),
                method = method.name(),
                "Method already woven, skipping"
            );
            continue;
        }

        let ctx = MatchContext {
            class,
            method,
            service_id: definition.id(),
            service_tags: definition.tags(),
            parent_classes: &parents,
        };

        for (statement, group) in statements {
            if !group.pointcut.matches(&ctx)? {
                continue;
            }
            tracing::debug!(
                service = definition.id(),
                method = method.name(),
                statement = %statement,
                "Pointcut matched"
            );
            for (kind, bindings) in &group.kinds {
                for binding in bindings {
                    table.add(method.name(), *kind, binding.clone());
                }
            }
        }
    }

    if table.is_empty() {
        return Ok(());
    }

    let service = plan
        .services
        .entry(definition.id().to_string())
        .or_insert_with(|| WovenService {
            service_id: definition.id().to_string(),
            class_name: class.name().to_string(),
            bindings: BindingTable::new(),
            delegate: match definition.factory() {
                Some(factory) => DelegateStrategy::Factory(factory.clone()),
                None => DelegateStrategy::Singleton,
            },
            instance: definition.instance().cloned(),
        });

    for method in table.methods().map(str::to_string).collect::<Vec<_>>() {
        for kind in AdviceKind::ALL {
            for binding in table.get(&method, kind) {
                service.bindings.add(method.clone(), kind, binding.clone());
            }
        }
    }

    tracing::debug!(
        service = definition.id(),
        markers = ?service.markers(),
        "Service woven"
    );
    Ok(())
}
