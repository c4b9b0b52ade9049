//! 绑定表
//!
//! 目标方法名 → 通知类型 → 有序的 (切面, 切面方法) 列表。
//! 织入期构建，运行期只读；同一类型内保持发现顺序

use crate::advice::AdviceKind;
use crate::aspect::{Aspect, AspectAccessor};
use crate::joinpoint::JoinPoint;
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// 已织入方法的标记前缀
pub const METHOD_MARKER_PREFIX: &str = "aop-method:";

/// 方法的织入标记 `aop-method:<name>`
pub fn method_marker(method: &str) -> String {
    format!("{}{}", METHOD_MARKER_PREFIX, method)
}

/// 一条通知绑定
#[derive(Clone)]
pub struct AdviceBinding {
    aspect_id: String,
    accessor: AspectAccessor,
    method: String,
}

impl AdviceBinding {
    pub fn new(aspect_id: impl Into<String>, accessor: AspectAccessor, method: impl Into<String>) -> Self {
        Self {
            aspect_id: aspect_id.into(),
            accessor,
            method: method.into(),
        }
    }

    /// 直接绑定一个切面实例
    pub fn from_aspect(
        aspect_id: impl Into<String>,
        aspect: Arc<dyn Aspect>,
        method: impl Into<String>,
    ) -> Self {
        Self::new(aspect_id, crate::aspect::accessor_for(aspect), method)
    }

    pub fn aspect_id(&self) -> &str {
        &self.aspect_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// 调用通知方法
    pub fn call(&self, join_point: &mut JoinPoint) -> anyhow::Result<Option<Value>> {
        let aspect = (self.accessor)();
        aspect.advise(&self.method, join_point)
    }
}

impl fmt::Debug for AdviceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.aspect_id, self.method)
    }
}

type KindTable = IndexMap<AdviceKind, Vec<AdviceBinding>>;

/// 方法绑定表
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    methods: IndexMap<String, KindTable>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加绑定，不覆盖已有绑定
    pub fn add(&mut self, method: impl Into<String>, kind: AdviceKind, binding: AdviceBinding) {
        self.methods
            .entry(method.into())
            .or_default()
            .entry(kind)
            .or_default()
            .push(binding);
    }

    /// 指定方法、指定类型的绑定
    pub fn get(&self, method: &str, kind: AdviceKind) -> &[AdviceBinding] {
        self.methods
            .get(method)
            .and_then(|kinds| kinds.get(&kind))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// 已织入的方法名（按发现顺序）
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// 已织入方法的标记
    pub fn markers(&self) -> Vec<String> {
        self.methods().map(method_marker).collect()
    }

    /// 全部绑定数量
    pub fn binding_count(&self) -> usize {
        self.methods
            .values()
            .flat_map(|kinds| kinds.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl Aspect for Noop {
        fn name(&self) -> &str {
            "Noop"
        }

        fn advise(&self, method: &str, join_point: &mut JoinPoint) -> anyhow::Result<Option<Value>> {
            join_point.args_mut().push(Value::from(method));
            Ok(None)
        }
    }

    fn binding(method: &str) -> AdviceBinding {
        AdviceBinding::from_aspect("noop", Arc::new(Noop), method)
    }

    #[test]
    fn test_bindings_accumulate_in_order() {
        let mut table = BindingTable::new();
        table.add("doWork", AdviceKind::Before, binding("first"));
        table.add("doWork", AdviceKind::After, binding("cleanup"));
        table.add("doWork", AdviceKind::Before, binding("second"));

        let before: Vec<_> = table
            .get("doWork", AdviceKind::Before)
            .iter()
            .map(AdviceBinding::method)
            .collect();
        assert_eq!(before, vec!["first", "second"]);
        assert_eq!(table.binding_count(), 3);
        assert!(table.get("doWork", AdviceKind::Around).is_empty());
        assert!(table.get("other", AdviceKind::Before).is_empty());
        assert_eq!(table.markers(), vec!["aop-method:doWork"]);
    }

    #[test]
    fn test_call_dispatches_by_name() {
        let mut jp = JoinPoint::new();
        binding("mark").call(&mut jp).unwrap();
        assert_eq!(jp.args()[0].downcast_ref::<String>().unwrap(), "mark");
        assert_eq!(format!("{:?}", binding("mark")), "noop::mark");
    }
}
