//! Aspectra 过程宏
//!
//! - `#[aspect]` - 标记切面的 impl 块，根据通知属性生成元数据与分发代码

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::parse_macro_input;

mod aspect;
mod utils;

/// `#[aspect]` 属性宏
///
/// 扫描 impl 块中带通知属性的方法，生成 `aspectra::Reflect` 与 `aspectra::Aspect` 实现。
/// 通知属性只在 `#[aspect]` 内部有意义，展开后会被移除
///
/// 通知属性：`#[before]`、`#[after]`、`#[after_returning]`、`#[after_throwing]`、`#[around]`
///
/// 切点写法：
/// - `#[before("serviceId == 'users'")]` - 表达式或 `Class::method` 签名
/// - `#[before(class_attribute = "Audited")]`
/// - `#[before(method_attribute = "Stopwatch")]`
/// - `#[before(service_ids = ["*Repository", "app.*"])]`
/// - `#[before(service_tags = ["audited"])]`
/// - `#[before(parent_classes = ["app::Base"])]`
///
/// 非环绕通知的签名为 `fn(&self, &JoinPoint)` 或 `fn(&self, &mut JoinPoint)`，
/// 返回 `()` 或 `Result<(), E>`；环绕通知返回 `anyhow::Result<Option<Value>>`
///
/// 使用示例：
/// ```ignore
/// use aspectra::prelude::*;
/// use aspectra_macros::aspect;
///
/// #[derive(Default)]
/// pub struct AuditAspect;
///
/// #[aspect(name = "app::AuditAspect")]
/// impl AuditAspect {
///     #[before(service_ids = ["*Repository"])]
///     pub fn audit(&self, jp: &JoinPoint) {
///         tracing::info!("→ {}", jp.signature());
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn aspect(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as aspect::AspectArgs);
    let input = parse_macro_input!(item as syn::ItemImpl);
    aspect::impl_aspect(args, input)
        .unwrap_or_else(utils::to_compile_error)
        .into()
}
