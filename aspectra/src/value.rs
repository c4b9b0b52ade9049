//! 动态值
//!
//! 方法参数与返回值在拦截边界上都是类型擦除的，统一用 [`Value`] 承载

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// 类型擦除的共享值
///
/// 克隆只增加引用计数；Around 通知多次 `proceed()` 时参数可以被重复使用
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Value {
    /// 包装任意值
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 检查内部值的类型
    pub fn is<T: Any>(&self) -> bool {
        (*self.inner).type_id() == TypeId::of::<T>()
    }

    /// 尝试获取内部值的引用
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// 内部值的类型名称
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// 两个 Value 是否指向同一个底层对象
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<String>() {
            return write!(f, "Value({:?})", s);
        }
        if let Some(s) = self.downcast_ref::<&'static str>() {
            return write!(f, "Value({:?})", s);
        }
        if let Some(n) = self.downcast_ref::<i64>() {
            return write!(f, "Value({})", n);
        }
        write!(f, "Value(<{}>)", self.type_name)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::new(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::new(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::new(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast() {
        let v = Value::from("original");
        assert!(v.is::<String>());
        assert_eq!(v.downcast_ref::<String>().map(String::as_str), Some("original"));
        assert!(v.downcast_ref::<i64>().is_none());
    }

    #[test]
    fn test_clone_shares_allocation() {
        let v = Value::new(vec![1u8, 2, 3]);
        let cloned = v.clone();
        assert!(v.ptr_eq(&cloned));
        assert_eq!(format!("{:?}", Value::from(7i64)), "Value(7)");
    }
}
