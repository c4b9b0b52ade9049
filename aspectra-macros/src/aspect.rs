//! `#[aspect]` 宏实现

use crate::utils::parse_key_values;
use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{Attribute, Error, ImplItem, ItemImpl, LitStr, Result, Type, Visibility};

/// 通知属性名
const ADVICE_ATTRIBUTES: &[&str] = &[
    "before",
    "after",
    "after_returning",
    "after_throwing",
    "around",
];

/// `#[aspect(name = "...")]` 参数
#[derive(Default)]
pub struct AspectArgs {
    name: Option<LitStr>,
}

impl Parse for AspectArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut args = AspectArgs::default();
        for kv in parse_key_values(input)? {
            if kv.key == "name" {
                args.name = Some(kv.expect_single()?.clone());
            } else {
                return Err(Error::new_spanned(
                    &kv.key,
                    format!("unknown #[aspect] argument `{}`, expected `name`", kv.key),
                ));
            }
        }
        Ok(args)
    }
}

/// 一条通知声明
struct AdviceDecl {
    kind: TokenStream,
    is_around: bool,
    pointcut: TokenStream,
}

/// 带通知的方法
struct AdviceMethod {
    ident: syn::Ident,
    advice: Vec<AdviceDecl>,
}

pub fn impl_aspect(args: AspectArgs, mut input: ItemImpl) -> Result<TokenStream> {
    if let Some((_, path, _)) = &input.trait_ {
        return Err(Error::new_spanned(
            path,
            "#[aspect] must be placed on an inherent impl block",
        ));
    }

    let class_name = match args.name {
        Some(name) => name.value(),
        None => type_name(&input.self_ty)?,
    };

    let mut methods = Vec::new();
    for item in &mut input.items {
        let ImplItem::Fn(method) = item else {
            continue;
        };

        let mut advice = Vec::new();
        let mut errors: Option<Error> = None;
        method.attrs.retain(|attr| {
            if !is_advice_attribute(attr) {
                return true;
            }
            match parse_advice(attr) {
                Ok(decl) => advice.push(decl),
                Err(err) => match &mut errors {
                    Some(existing) => existing.combine(err),
                    None => errors = Some(err),
                },
            }
            false
        });
        if let Some(err) = errors {
            return Err(err);
        }
        if advice.is_empty() {
            continue;
        }

        if !matches!(method.vis, Visibility::Public(_)) {
            return Err(Error::new_spanned(
                &method.sig.ident,
                "advice methods must be `pub`",
            ));
        }
        if advice.iter().any(|a| a.is_around) && advice.len() > 1 {
            return Err(Error::new_spanned(
                &method.sig.ident,
                "#[around] cannot be combined with other advice on the same method",
            ));
        }

        methods.push(AdviceMethod {
            ident: method.sig.ident.clone(),
            advice,
        });
    }

    let self_ty = &input.self_ty;
    let (impl_generics, _, where_clause) = input.generics.split_for_impl();

    let metadata = methods.iter().map(|method| {
        let name = method.ident.to_string();
        let advice = method.advice.iter().map(|decl| {
            let kind = &decl.kind;
            let pointcut = &decl.pointcut;
            quote! {
                .with_advice(::aspectra::Advice::new(#kind, #pointcut))
            }
        });
        quote! {
            .with_method(::aspectra::MethodMetadata::new(#name) #(#advice)*)
        }
    });

    let arms = methods.iter().map(|method| {
        let ident = &method.ident;
        let name = ident.to_string();
        if method.advice.iter().any(|a| a.is_around) {
            quote! {
                #name => ::core::result::Result::map_err(
                    self.#ident(join_point),
                    ::core::convert::Into::into,
                ),
            }
        } else {
            quote! {
                #name => ::aspectra::IntoAdviceResult::into_advice_result(self.#ident(join_point))
                    .map(|_| ::core::option::Option::None),
            }
        }
    });

    let expanded = quote! {
        #input

        impl #impl_generics ::aspectra::Reflect for #self_ty #where_clause {
            fn class_metadata() -> ::aspectra::ClassMetadata {
                ::aspectra::ClassMetadata::new(#class_name)
                    .with_attribute(::aspectra::metadata::ASPECT_ATTRIBUTE)
                    #(#metadata)*
            }
        }

        impl #impl_generics ::aspectra::Aspect for #self_ty #where_clause {
            fn name(&self) -> &str {
                #class_name
            }

            #[allow(unused_variables)]
            fn advise(
                &self,
                method: &str,
                join_point: &mut ::aspectra::JoinPoint,
            ) -> ::aspectra::anyhow::Result<::core::option::Option<::aspectra::Value>> {
                match method {
                    #(#arms)*
                    other => ::core::result::Result::Err(
                        ::aspectra::AopError::UnknownAdviceMethod {
                            aspect: ::std::string::String::from(#class_name),
                            method: ::std::string::String::from(other),
                        }
                        .into(),
                    ),
                }
            }
        }
    };

    Ok(expanded)
}

fn is_advice_attribute(attr: &Attribute) -> bool {
    ADVICE_ATTRIBUTES.iter().any(|name| attr.path().is_ident(name))
}

/// 类型的最后一段路径名
fn type_name(ty: &Type) -> Result<String> {
    if let Type::Path(path) = ty {
        if let Some(segment) = path.path.segments.last() {
            return Ok(segment.ident.to_string());
        }
    }
    Err(Error::new_spanned(
        ty,
        "cannot derive an aspect name for this type, use #[aspect(name = \"...\")]",
    ))
}

fn parse_advice(attr: &Attribute) -> Result<AdviceDecl> {
    let (kind, is_around) = if attr.path().is_ident("before") {
        (quote!(::aspectra::AdviceKind::Before), false)
    } else if attr.path().is_ident("after") {
        (quote!(::aspectra::AdviceKind::After), false)
    } else if attr.path().is_ident("after_returning") {
        (quote!(::aspectra::AdviceKind::AfterReturning), false)
    } else if attr.path().is_ident("after_throwing") {
        (quote!(::aspectra::AdviceKind::AfterThrowing), false)
    } else {
        (quote!(::aspectra::AdviceKind::Around), true)
    };

    let pointcut = attr.parse_args_with(parse_pointcut)?;
    Ok(AdviceDecl {
        kind,
        is_around,
        pointcut,
    })
}

/// 解析切点，生成 `PointcutSpec` 构造表达式
fn parse_pointcut(input: ParseStream) -> Result<TokenStream> {
    if input.peek(LitStr) {
        let statement: LitStr = input.parse()?;
        if !input.is_empty() {
            return Err(input.error("unexpected tokens after the pointcut statement"));
        }
        return Ok(quote! {
            ::aspectra::PointcutSpec::Statement(::std::string::String::from(#statement))
        });
    }

    let span = input.span();
    let mut kvs = parse_key_values(input)?;
    if kvs.len() != 1 {
        return Err(Error::new(
            span,
            "expected exactly one pointcut: a statement string or one of `statement`, \
             `class_attribute`, `method_attribute`, `service_ids`, `service_tags`, `parent_classes`",
        ));
    }
    let kv = kvs.remove(0);

    let spec = match kv.key.to_string().as_str() {
        "statement" => {
            let value = kv.expect_single()?;
            quote!(::aspectra::PointcutSpec::Statement(::std::string::String::from(#value)))
        }
        "class_attribute" => {
            let value = kv.expect_single()?;
            quote!(::aspectra::PointcutSpec::ClassAttribute(::std::string::String::from(#value)))
        }
        "method_attribute" => {
            let value = kv.expect_single()?;
            quote!(::aspectra::PointcutSpec::MethodAttribute(::std::string::String::from(#value)))
        }
        "service_ids" => {
            let items = kv.expect_list()?;
            quote!(::aspectra::PointcutSpec::ServiceIds(::std::vec![#(::std::string::String::from(#items)),*]))
        }
        "service_tags" => {
            let items = kv.expect_list()?;
            quote!(::aspectra::PointcutSpec::ServiceTags(::std::vec![#(::std::string::String::from(#items)),*]))
        }
        "parent_classes" => {
            let items = kv.expect_list()?;
            quote!(::aspectra::PointcutSpec::ParentClasses(::std::vec![#(::std::string::String::from(#items)),*]))
        }
        other => {
            return Err(Error::new_spanned(
                &kv.key,
                format!("unknown pointcut kind `{}`", other),
            ))
        }
    };
    Ok(spec)
}
