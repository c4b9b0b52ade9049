//! 类型元数据
//!
//! Rust 没有运行时反射，切点匹配所需的静态事实（类属性、方法属性、继承链、接口）
//! 由注册方以显式的元数据表提供

use crate::advice::Advice;
use std::sync::Arc;

/// 标记切面类型的属性名
pub const ASPECT_ATTRIBUTE: &str = "Aspect";

/// 生命周期相关的方法，永远不会被拦截
pub const LIFECYCLE_METHODS: &[&str] = &[
    "new",
    "drop",
    "deserialize",
    "__construct",
    "__destruct",
    "__unserialize",
];

/// 可以为类型提供元数据的 trait
///
/// `#[aspect]` 宏会为切面自动实现此 trait
pub trait Reflect {
    fn class_metadata() -> ClassMetadata;
}

/// 方法元数据
#[derive(Debug, Clone)]
pub struct MethodMetadata {
    name: String,
    public: bool,
    attributes: Vec<String>,
    advice: Vec<Advice>,
}

impl MethodMetadata {
    /// 创建公开方法的元数据
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public: true,
            attributes: Vec::new(),
            advice: Vec::new(),
        }
    }

    /// 标记为非公开方法
    pub fn private(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    /// 声明一个通知（可重复）
    pub fn with_advice(mut self, advice: Advice) -> Self {
        self.advice.push(advice);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn advice(&self) -> &[Advice] {
        &self.advice
    }

    /// 是否是生命周期方法
    pub fn is_lifecycle_hook(&self) -> bool {
        LIFECYCLE_METHODS.contains(&self.name.as_str())
    }
}

/// 类型元数据
#[derive(Debug, Clone)]
pub struct ClassMetadata {
    name: String,
    attributes: Vec<String>,
    interfaces: Vec<String>,
    parent: Option<Arc<ClassMetadata>>,
    is_final: bool,
    is_abstract: bool,
    methods: Vec<MethodMetadata>,
}

impl ClassMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            interfaces: Vec::new(),
            parent: None,
            is_final: false,
            is_abstract: false,
            methods: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn with_parent(mut self, parent: ClassMetadata) -> Self {
        self.parent = Some(Arc::new(parent));
        self
    }

    /// 标记为 final，final 类型不能被代理继承
    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_method(mut self, method: MethodMetadata) -> Self {
        self.methods.push(method);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 去掉模块路径后的短名称
    pub fn short_name(&self) -> &str {
        self.name
            .rsplit(|c: char| c == ':' || c == '\\')
            .next()
            .unwrap_or(&self.name)
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn parent(&self) -> Option<&ClassMetadata> {
        self.parent.as_deref()
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_aspect(&self) -> bool {
        self.has_attribute(ASPECT_ATTRIBUTE)
    }

    pub fn methods(&self) -> &[MethodMetadata] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodMetadata> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// 公开方法
    pub fn public_methods(&self) -> impl Iterator<Item = &MethodMetadata> {
        self.methods.iter().filter(|m| m.public)
    }

    /// 方法的完整签名 `Class::method`
    pub fn signature(&self, method: &str) -> String {
        format!("{}::{}", self.name, method)
    }

    /// 自身、全部祖先类与实现的接口（去重，保持发现顺序）
    pub fn ancestors(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        if let Some(parent) = &self.parent {
            for name in parent.ancestors() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        for interface in &self.interfaces {
            if !names.contains(interface) {
                names.push(interface.clone());
            }
        }
        names
    }

    /// 所有接口名（包含从父类继承的）
    pub fn interface_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(parent) = &self.parent {
            names.extend(parent.interface_names());
        }
        for interface in &self.interfaces {
            if !names.contains(interface) {
                names.push(interface.clone());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> ClassMetadata {
        ClassMetadata::new("app::UserRepository")
            .with_parent(
                ClassMetadata::new("app::BaseRepository")
                    .with_interface("app::Repository")
                    .abstract_class(),
            )
            .with_interface("app::Countable")
            .with_interface("app::Repository")
    }

    #[test]
    fn test_ancestors_are_transitive_and_unique() {
        assert_eq!(
            repository().ancestors(),
            vec![
                "app::UserRepository",
                "app::BaseRepository",
                "app::Repository",
                "app::Countable",
            ]
        );
    }

    #[test]
    fn test_short_name() {
        assert_eq!(repository().short_name(), "UserRepository");
        assert_eq!(ClassMetadata::new("Plain").short_name(), "Plain");
        assert_eq!(ClassMetadata::new("App\\Service\\Foo").short_name(), "Foo");
    }

    #[test]
    fn test_public_methods_and_lifecycle() {
        let class = ClassMetadata::new("Svc")
            .with_method(MethodMetadata::new("new"))
            .with_method(MethodMetadata::new("work"))
            .with_method(MethodMetadata::new("helper").private());

        let names: Vec<_> = class.public_methods().map(|m| m.name()).collect();
        assert_eq!(names, vec!["new", "work"]);
        assert!(class.method("new").unwrap().is_lifecycle_hook());
        assert!(!class.method("work").unwrap().is_lifecycle_hook());
    }
}
