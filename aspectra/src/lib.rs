//! Aspectra - 切面织入与方法拦截引擎
//!
//! 提供：
//! - 声明式切面定义（`#[aspect]` 宏或手写 [`Reflect`] 元数据）
//! - 五种通知类型（Before、After、AfterReturning、AfterThrowing、Around）
//! - 切点谓词语言，对类型、方法、服务 ID、标签、父类型求值
//! - 织入规划：生成每个服务、每个方法的绑定表
//! - 运行期拦截：连接点池、环绕链、提前返回、错误原样重抛

pub mod advice;
pub mod aspect;
pub mod binding;
pub mod config;
pub mod error;
pub mod error_info;
pub mod instance;
pub mod interceptor;
pub mod joinpoint;
pub mod logging;
pub mod metadata;
pub mod pointcut;
pub mod pool;
pub mod proxy;
pub mod registry;
pub mod sequence;
pub mod target;
pub mod value;
pub mod weaver;

// 重新导出核心类型
pub use advice::{Advice, AdviceKind, PointcutSpec};
pub use aspect::{
    Aspect, AspectAccessor, AspectRegistration, ExceptionAspect, IntoAdviceResult, LoggingAspect,
    StopwatchAspect, StopwatchEvent,
};
pub use binding::{AdviceBinding, BindingTable};
pub use config::AopConfig;
pub use error::{AopError, AopResult};
pub use error_info::ErrorInfo;
pub use instance::{FactoryClass, FactoryDescriptor, FactoryTarget, InstanceResolver};
pub use interceptor::{Interceptor, InterceptorBuilder, InvokeOutcome};
pub use joinpoint::{Extensions, JoinPoint, Proceed};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metadata::{ClassMetadata, MethodMetadata, Reflect};
pub use pointcut::{MatchContext, Pointcut};
pub use pool::{JoinPointPool, PoolStatistics};
pub use proxy::WovenProxy;
pub use registry::{ServiceDefinition, ServiceRegistry};
pub use sequence::SequenceCounter;
pub use target::{ArgumentNormalizer, PassThrough, Target, TrailingVariadic};
pub use value::Value;
pub use weaver::{DelegateStrategy, PlanStatistics, Weaver, WeavingPlan, WovenService};

// 导出供宏使用
pub use anyhow;
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::{Advice, AdviceKind, PointcutSpec};
    pub use crate::aspect::{Aspect, AspectRegistration};
    pub use crate::config::AopConfig;
    pub use crate::error::{AopError, AopResult};
    pub use crate::joinpoint::JoinPoint;
    pub use crate::metadata::{ClassMetadata, MethodMetadata, Reflect};
    pub use crate::proxy::WovenProxy;
    pub use crate::registry::{ServiceDefinition, ServiceRegistry};
    pub use crate::target::Target;
    pub use crate::value::Value;
    pub use crate::weaver::{Weaver, WeavingPlan};
    pub use crate::register_aspect;
}

/// 在链接期注册切面，配合 [`ServiceRegistry::load_registered_aspects`] 使用
///
/// 切面类型需要实现 [`Reflect`]（`#[aspect]` 宏会生成）
///
/// ```ignore
/// register_aspect!("audit", AuditAspect, || AuditAspect::default());
/// ```
#[macro_export]
macro_rules! register_aspect {
    ($id:expr, $ty:ty, $creator:expr) => {
        $crate::inventory::submit! {
            $crate::AspectRegistration::new(
                $id,
                <$ty as $crate::Reflect>::class_metadata,
                {
                    fn __create() -> ::std::sync::Arc<dyn $crate::Aspect> {
                        let creator: fn() -> $ty = $creator;
                        ::std::sync::Arc::new(creator())
                    }
                    __create
                },
            )
        }
    };
    ($id:expr, $ty:ty) => {
        $crate::register_aspect!($id, $ty, <$ty as ::std::default::Default>::default);
    };
}
