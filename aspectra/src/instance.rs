//! 实例解析
//!
//! 根据连接点上的工厂元数据生成新的委托对象；没有工厂时克隆原型

use crate::error::AopError;
use crate::joinpoint::JoinPoint;
use crate::target::Target;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// 静态工厂：按函数名调用的类型级工厂
pub trait FactoryClass: Send + Sync {
    fn type_name(&self) -> &str;

    fn has_function(&self, function: &str) -> bool;

    fn call(&self, function: &str, args: &[Value]) -> anyhow::Result<Option<Value>>;
}

/// 工厂的承载者
#[derive(Clone)]
pub enum FactoryTarget {
    /// 类型 + 静态函数
    Static(Arc<dyn FactoryClass>),
    /// 对象 + 方法
    Instance(Arc<dyn Target>),
}

impl FactoryTarget {
    fn name(&self) -> &str {
        match self {
            FactoryTarget::Static(class) => class.type_name(),
            FactoryTarget::Instance(object) => object.type_name(),
        }
    }
}

/// 工厂描述
///
/// 工厂返回值必须是 `Value::new(Arc<dyn Target>)`
#[derive(Clone)]
pub struct FactoryDescriptor {
    target: FactoryTarget,
    method: String,
    args: Vec<Value>,
}

impl FactoryDescriptor {
    pub fn new(target: FactoryTarget, method: impl Into<String>) -> Self {
        Self {
            target,
            method: method.into(),
            args: Vec::new(),
        }
    }

    /// 静态工厂
    pub fn from_static(class: Arc<dyn FactoryClass>, function: impl Into<String>) -> Self {
        Self::new(FactoryTarget::Static(class), function)
    }

    /// 实例工厂
    pub fn from_instance(object: Arc<dyn Target>, method: impl Into<String>) -> Self {
        Self::new(FactoryTarget::Instance(object), method)
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn target(&self) -> &FactoryTarget {
        &self.target
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

impl fmt::Debug for FactoryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryDescriptor")
            .field("target", &self.target.name())
            .field("method", &self.method)
            .field("args", &self.args.len())
            .finish()
    }
}

/// 委托实例解析器
#[derive(Debug, Default, Clone, Copy)]
pub struct InstanceResolver;

impl InstanceResolver {
    pub fn new() -> Self {
        Self
    }

    /// 生成新的委托对象
    ///
    /// 1. 静态工厂：调用类型上的函数
    /// 2. 实例工厂：调用工厂对象上的方法
    /// 3. 否则克隆连接点上的委托对象
    ///
    /// 未声明工厂方法名时同样走克隆
    pub fn create(&self, join_point: &JoinPoint) -> anyhow::Result<Arc<dyn Target>> {
        if let Some(factory) = join_point.factory().filter(|f| !f.method.is_empty()) {
            return self.create_from_factory(factory);
        }

        let delegate = join_point
            .delegate()
            .ok_or_else(|| AopError::MissingDelegate {
                service: join_point.service_id().unwrap_or_default().to_string(),
                method: join_point.method().to_string(),
            })?;

        delegate.clone_target().ok_or_else(|| {
            AopError::NotClonable {
                type_name: delegate.type_name().to_string(),
            }
            .into()
        })
    }

    fn create_from_factory(&self, factory: &FactoryDescriptor) -> anyhow::Result<Arc<dyn Target>> {
        let not_callable = || AopError::FactoryNotCallable {
            target: factory.target.name().to_string(),
            method: factory.method.clone(),
        };

        let produced = match &factory.target {
            FactoryTarget::Static(class) => {
                if !class.has_function(&factory.method) {
                    return Err(not_callable().into());
                }
                class.call(&factory.method, &factory.args)?
            }
            FactoryTarget::Instance(object) => {
                if !object.has_method(&factory.method) {
                    return Err(not_callable().into());
                }
                object.invoke(&factory.method, &factory.args)?
            }
        };

        tracing::debug!(
            factory = factory.target.name(),
            method = %factory.method,
            "Created delegate from factory"
        );

        produced
            .as_ref()
            .and_then(|value| value.downcast_ref::<Arc<dyn Target>>())
            .cloned()
            .ok_or_else(|| {
                AopError::FactoryProducedNonTarget {
                    target: factory.target.name().to_string(),
                    method: factory.method.clone(),
                }
                .into()
            })
    }
}
