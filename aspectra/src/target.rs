//! 拦截目标
//!
//! Rust 没有动态代理，被拦截的对象通过 [`Target`] 暴露按名称调用的能力

use crate::value::Value;
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

/// 可被按名称调用的目标对象
pub trait Target: Any + Send + Sync {
    /// 按方法名调用
    fn invoke(&self, method: &str, args: &[Value]) -> anyhow::Result<Option<Value>>;

    /// 是否存在指定方法
    fn has_method(&self, method: &str) -> bool;

    fn as_any(&self) -> &dyn Any;

    /// 具体类型名称，用于错误信息
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// 创建一个新副本，不支持克隆的目标返回 `None`
    fn clone_target(&self) -> Option<Arc<dyn Target>> {
        None
    }
}

impl dyn Target {
    /// 尝试获取具体类型的引用
    pub fn downcast_ref<T: Target>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// 调用目标前的参数规整钩子
pub trait ArgumentNormalizer: Send + Sync {
    fn normalize(&self, method: &str, args: Vec<Value>) -> Vec<Value>;
}

/// 原样传递参数
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl ArgumentNormalizer for PassThrough {
    fn normalize(&self, _method: &str, args: Vec<Value>) -> Vec<Value> {
        args
    }
}

/// 将可变参数方法的最后一个列表参数展开为位置参数
#[derive(Debug, Default, Clone)]
pub struct TrailingVariadic {
    methods: HashSet<String>,
}

impl TrailingVariadic {
    pub fn new<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }
}

impl ArgumentNormalizer for TrailingVariadic {
    fn normalize(&self, method: &str, mut args: Vec<Value>) -> Vec<Value> {
        if !self.methods.contains(method) {
            return args;
        }
        let spread = match args.last().and_then(|last| last.downcast_ref::<Vec<Value>>()) {
            Some(rest) => rest.clone(),
            None => return args,
        };
        args.pop();
        args.extend(spread);
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_variadic_spreads_last_list() {
        let normalizer = TrailingVariadic::new(["sum"]);
        let args = vec![
            Value::from(1i64),
            Value::new(vec![Value::from(2i64), Value::from(3i64)]),
        ];
        let spread = normalizer.normalize("sum", args);
        let numbers: Vec<i64> = spread
            .iter()
            .map(|v| *v.downcast_ref::<i64>().unwrap())
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_trailing_variadic_ignores_other_methods() {
        let normalizer = TrailingVariadic::new(["sum"]);
        let args = vec![Value::new(vec![Value::from(2i64)])];
        assert_eq!(normalizer.normalize("concat", args).len(), 1);
        assert!(normalizer.normalize("sum", vec![Value::from("x")]).len() == 1);
    }
}
