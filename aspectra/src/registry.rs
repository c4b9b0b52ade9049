//! 服务注册表
//!
//! 织入规划器的输入：宿主容器中每个服务的 ID、标签、类型元数据与实例化方式。
//! 引擎只读取，从不修改宿主的注册信息

use crate::aspect::{accessor_for, get_all_aspect_registrations, Aspect, AspectAccessor};
use crate::instance::FactoryDescriptor;
use crate::metadata::{ClassMetadata, Reflect};
use crate::target::Target;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// 引擎内部服务 ID 前缀
pub const INTERNAL_PREFIX: &str = "aop.";

/// 引擎内部服务 ID 后缀
pub const INTERNAL_SUFFIX: &str = ".internal-for-aop";

/// 是否是引擎内部服务
pub fn is_internal_id(id: &str) -> bool {
    id.starts_with(INTERNAL_PREFIX) || id.ends_with(INTERNAL_SUFFIX)
}

/// 服务定义
#[derive(Clone)]
pub struct ServiceDefinition {
    id: String,
    class: Option<ClassMetadata>,
    tags: Vec<String>,
    is_abstract: bool,
    is_alias: bool,
    factory: Option<FactoryDescriptor>,
    instance: Option<Arc<dyn Target>>,
    aspect: Option<AspectAccessor>,
}

impl ServiceDefinition {
    /// 普通服务
    pub fn new(id: impl Into<String>, class: ClassMetadata) -> Self {
        Self {
            id: id.into(),
            class: Some(class),
            tags: Vec::new(),
            is_abstract: false,
            is_alias: false,
            factory: None,
            instance: None,
            aspect: None,
        }
    }

    /// 类型无法解析的服务
    pub fn unresolved(id: impl Into<String>) -> Self {
        Self {
            class: None,
            ..Self::new(id, ClassMetadata::new(""))
        }
    }

    /// 别名
    pub fn alias(id: impl Into<String>, class: ClassMetadata) -> Self {
        Self {
            is_alias: true,
            ..Self::new(id, class)
        }
    }

    /// 切面服务
    pub fn aspect(id: impl Into<String>, class: ClassMetadata, aspect: Arc<dyn Aspect>) -> Self {
        Self::lazy_aspect(id, class, accessor_for(aspect))
    }

    /// 通过访问器延迟获取的切面服务
    pub fn lazy_aspect(id: impl Into<String>, class: ClassMetadata, accessor: AspectAccessor) -> Self {
        Self {
            aspect: Some(accessor),
            ..Self::new(id, class)
        }
    }

    /// 元数据来自 [`Reflect`] 的切面服务（`#[aspect]` 宏生成）
    pub fn reflected_aspect<A>(id: impl Into<String>, aspect: A) -> Self
    where
        A: Aspect + Reflect + 'static,
    {
        Self::aspect(id, A::class_metadata(), Arc::new(aspect))
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn abstract_definition(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_factory(mut self, factory: FactoryDescriptor) -> Self {
        self.factory = Some(factory);
        self
    }

    /// 单例实例，生成代理时作为委托对象
    pub fn with_instance(mut self, instance: Arc<dyn Target>) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class(&self) -> Option<&ClassMetadata> {
        self.class.as_ref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_alias(&self) -> bool {
        self.is_alias
    }

    pub fn factory(&self) -> Option<&FactoryDescriptor> {
        self.factory.as_ref()
    }

    pub fn instance(&self) -> Option<&Arc<dyn Target>> {
        self.instance.as_ref()
    }

    pub fn aspect_accessor(&self) -> Option<&AspectAccessor> {
        self.aspect.as_ref()
    }

    /// 是否是切面：注册了切面访问器，或类型带有 `Aspect` 属性
    pub fn is_aspect(&self) -> bool {
        self.aspect.is_some() || self.class.as_ref().is_some_and(ClassMetadata::is_aspect)
    }

    /// 不参与织入的定义：别名、抽象、无法解析、引擎内部
    pub fn is_skipped(&self) -> bool {
        self.is_alias || self.is_abstract || self.class.is_none() || is_internal_id(&self.id)
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("id", &self.id)
            .field("class", &self.class.as_ref().map(ClassMetadata::name))
            .field("tags", &self.tags)
            .field("is_abstract", &self.is_abstract)
            .field("is_alias", &self.is_alias)
            .field("factory", &self.factory)
            .field("is_aspect", &self.is_aspect())
            .finish()
    }
}

/// 服务注册表（保持注册顺序）
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: IndexMap<String, ServiceDefinition>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册服务；同 ID 的后注册者替换先注册者，但保留原位置
    pub fn register(&mut self, definition: ServiceDefinition) {
        tracing::debug!(service = definition.id(), "Registering service definition");
        self.services.insert(definition.id.clone(), definition);
    }

    /// 批量注册
    pub fn register_all(&mut self, definitions: impl IntoIterator<Item = ServiceDefinition>) {
        for definition in definitions {
            self.register(definition);
        }
    }

    pub fn get(&self, id: &str) -> Option<&ServiceDefinition> {
        self.services.get(id)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.values()
    }

    /// 获取注册的服务数量
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// 检查是否没有注册任何服务
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// 从 inventory 自动加载所有通过 `register_aspect!` 注册的切面
    ///
    /// 使用示例：
    /// ```ignore
    /// let mut registry = ServiceRegistry::new();
    /// registry.load_registered_aspects();
    /// ```
    pub fn load_registered_aspects(&mut self) -> usize {
        let registrations: Vec<_> = get_all_aspect_registrations().collect();
        tracing::info!("Auto-loading {} aspect(s) from registry", registrations.len());

        for registration in &registrations {
            tracing::debug!("  ├─ Loading aspect: {}", registration.id);
            // 每个注册只实例化一次，所有通知共享同一个切面
            let aspect = registration.create_instance();
            self.register(ServiceDefinition::aspect(
                registration.id,
                (registration.metadata)(),
                aspect,
            ));
        }

        registrations.len()
    }
}
