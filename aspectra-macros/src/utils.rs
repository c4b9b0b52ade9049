//! 工具函数

use proc_macro2::TokenStream;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{bracketed, Ident, LitStr, Result, Token};

/// 将错误转换为编译错误
pub fn to_compile_error(err: syn::Error) -> TokenStream {
    err.to_compile_error()
}

/// `key = "value"` 或 `key = ["a", "b"]`
pub enum ArgValue {
    Single(LitStr),
    List(Vec<LitStr>),
}

pub struct KeyValue {
    pub key: Ident,
    pub value: ArgValue,
}

impl Parse for KeyValue {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: Ident = input.parse()?;
        input.parse::<Token![=]>()?;

        let value = if input.peek(syn::token::Bracket) {
            let content;
            bracketed!(content in input);
            let items = Punctuated::<LitStr, Token![,]>::parse_terminated(&content)?;
            ArgValue::List(items.into_iter().collect())
        } else {
            ArgValue::Single(input.parse()?)
        };

        Ok(Self { key, value })
    }
}

/// 逗号分隔的 `key = value` 列表
pub fn parse_key_values(input: ParseStream) -> Result<Vec<KeyValue>> {
    let items = Punctuated::<KeyValue, Token![,]>::parse_terminated(input)?;
    Ok(items.into_iter().collect())
}

impl KeyValue {
    pub fn expect_single(&self) -> Result<&LitStr> {
        match &self.value {
            ArgValue::Single(lit) => Ok(lit),
            ArgValue::List(_) => Err(syn::Error::new_spanned(
                &self.key,
                format!("`{}` expects a string literal", self.key),
            )),
        }
    }

    pub fn expect_list(&self) -> Result<&[LitStr]> {
        match &self.value {
            ArgValue::List(items) => Ok(items),
            ArgValue::Single(_) => Err(syn::Error::new_spanned(
                &self.key,
                format!("`{}` expects a list of string literals, e.g. [\"a\", \"b\"]", self.key),
            )),
        }
    }
}
