//! 连接点（JoinPoint）定义
//!
//! 连接点是单次拦截调用的上下文：目标、方法、参数、返回值、异常与控制标记。
//! 连接点由对象池复用，在一次调用期间被独占

use crate::error::AopError;
use crate::error_info::ErrorInfo;
use crate::instance::FactoryDescriptor;
use crate::target::Target;
use crate::value::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 环绕通知的后续执行链
pub type Proceed = Arc<dyn Fn(&mut JoinPoint) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// 按类型存取的调用级扩展数据
///
/// 切面可以在 Before 中写入、在 After 中取出（例如计时器）
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.map.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.map.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()
    }

    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.map.len())
            .finish()
    }
}

/// 连接点信息
#[derive(Default)]
pub struct JoinPoint {
    /// 代理对象
    proxy: Option<Arc<dyn Target>>,

    /// 被代理的真实对象
    delegate: Option<Arc<dyn Target>>,

    /// 方法名称
    method: String,

    /// 方法参数
    args: Vec<Value>,

    /// 返回值
    return_value: Option<Value>,

    /// 目标方法抛出的错误
    exception: Option<anyhow::Error>,

    /// 提前返回：跳过后续阶段，直接返回 `return_value`
    return_early: bool,

    /// 调用序号
    sequence_id: u64,

    /// 环绕通知的后续执行链
    proceed: Option<Proceed>,

    factory: Option<FactoryDescriptor>,

    service_id: Option<String>,

    extensions: Extensions,
}

impl JoinPoint {
    /// 创建空的连接点
    pub fn new() -> Self {
        Self::default()
    }

    pub fn proxy(&self) -> Option<&Arc<dyn Target>> {
        self.proxy.as_ref()
    }

    pub fn set_proxy(&mut self, proxy: Option<Arc<dyn Target>>) {
        self.proxy = proxy;
    }

    pub fn delegate(&self) -> Option<&Arc<dyn Target>> {
        self.delegate.as_ref()
    }

    /// 替换委托对象，目标调用会使用新的对象
    pub fn set_delegate(&mut self, delegate: Option<Arc<dyn Target>>) {
        self.delegate = delegate;
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn set_method(&mut self, method: impl Into<String>) {
        self.method = method.into();
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// 可变参数，Before 通知可以改写
    pub fn args_mut(&mut self) -> &mut Vec<Value> {
        &mut self.args
    }

    pub fn set_args(&mut self, args: Vec<Value>) {
        self.args = args;
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    pub fn set_return_value(&mut self, value: Option<Value>) {
        self.return_value = value;
    }

    pub fn exception(&self) -> Option<&anyhow::Error> {
        self.exception.as_ref()
    }

    pub(crate) fn set_exception(&mut self, exception: Option<anyhow::Error>) {
        self.exception = exception;
    }

    pub(crate) fn take_exception(&mut self) -> Option<anyhow::Error> {
        self.exception.take()
    }

    /// 结构化的错误信息
    pub fn error_info(&self) -> Option<ErrorInfo> {
        self.exception.as_ref().map(ErrorInfo::from_error)
    }

    pub fn is_return_early(&self) -> bool {
        self.return_early
    }

    pub fn set_return_early(&mut self, return_early: bool) {
        self.return_early = return_early;
    }

    /// 设置返回值并提前返回
    pub fn return_with(&mut self, value: Option<Value>) {
        self.return_value = value;
        self.return_early = true;
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn set_sequence_id(&mut self, sequence_id: u64) {
        self.sequence_id = sequence_id;
    }

    pub fn factory(&self) -> Option<&FactoryDescriptor> {
        self.factory.as_ref()
    }

    pub fn set_factory(&mut self, factory: Option<FactoryDescriptor>) {
        self.factory = factory;
    }

    pub fn service_id(&self) -> Option<&str> {
        self.service_id.as_deref()
    }

    pub fn set_service_id(&mut self, service_id: Option<String>) {
        self.service_id = service_id;
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// `service::method`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.service_id().unwrap_or("<anonymous>"), self.method)
    }

    pub fn has_continuation(&self) -> bool {
        self.proceed.is_some()
    }

    /// 替换后续执行链，返回原来的执行链
    pub(crate) fn replace_continuation(&mut self, proceed: Option<Proceed>) -> Option<Proceed> {
        std::mem::replace(&mut self.proceed, proceed)
    }

    /// 继续执行
    ///
    /// 只能在环绕通知中调用；可以调用零次、一次或多次
    pub fn proceed(&mut self) -> anyhow::Result<Option<Value>> {
        let next = self.proceed.clone().ok_or_else(|| AopError::NoContinuation {
            method: self.method.clone(),
        })?;
        next(self)
    }

    /// 清理调用级数据，供对象池复用
    pub(crate) fn reset(&mut self) {
        self.proxy = None;
        self.delegate = None;
        self.method.clear();
        self.args.clear();
        self.return_value = None;
        self.exception = None;
        self.return_early = false;
        self.sequence_id = 0;
        self.proceed = None;
        self.factory = None;
        self.service_id = None;
        self.extensions.clear();
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature())
            .field("args", &self.args)
            .field("return_value", &self.return_value)
            .field("exception", &self.exception.as_ref().map(|e| e.to_string()))
            .field("return_early", &self.return_early)
            .field("sequence_id", &self.sequence_id)
            .field("has_continuation", &self.proceed.is_some())
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}
