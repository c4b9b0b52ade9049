//! 转发代理
//!
//! [`WovenProxy`] 把每次调用交给拦截器，未被拦截的方法直接调用委托对象

use crate::interceptor::{Interceptor, InvokeOutcome};
use crate::target::Target;
use crate::value::Value;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

pub struct WovenProxy {
    interceptor: Arc<Interceptor>,
    delegate: Arc<dyn Target>,
    this: Weak<WovenProxy>,
}

impl WovenProxy {
    pub fn new(interceptor: Arc<Interceptor>, delegate: Arc<dyn Target>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            interceptor,
            delegate,
            this: this.clone(),
        })
    }

    pub fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    pub fn delegate(&self) -> &Arc<dyn Target> {
        &self.delegate
    }

    /// 按值传参的便捷调用
    pub fn call(&self, method: &str, args: Vec<Value>) -> anyhow::Result<Option<Value>> {
        let proxy = self.this.upgrade().map(|p| p as Arc<dyn Target>);
        match self
            .interceptor
            .invoke(proxy, self.delegate.clone(), method, args)?
        {
            InvokeOutcome::Intercepted(value) => Ok(value),
            InvokeOutcome::NotIntercepted(args) => self.delegate.invoke(method, &args),
        }
    }
}

impl Target for WovenProxy {
    fn invoke(&self, method: &str, args: &[Value]) -> anyhow::Result<Option<Value>> {
        self.call(method, args.to_vec())
    }

    fn has_method(&self, method: &str) -> bool {
        self.delegate.has_method(method)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    /// 克隆委托对象，复用同一个拦截器
    fn clone_target(&self) -> Option<Arc<dyn Target>> {
        let delegate = self.delegate.clone_target()?;
        Some(WovenProxy::new(self.interceptor.clone(), delegate))
    }
}

impl fmt::Debug for WovenProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WovenProxy")
            .field("service_id", &self.interceptor.service_id())
            .field("delegate", &self.delegate.type_name())
            .finish()
    }
}
