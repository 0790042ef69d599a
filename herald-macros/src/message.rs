use crate::derive_utils::apply_derives;
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Item, Result, Token, Type, parse::Parse, parse::ParseStream, parse_macro_input};

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Command,
    Query,
    Signal,
}

impl Kind {
    fn attr_name(self) -> &'static str {
        match self {
            Kind::Command => "command",
            Kind::Query => "query",
            Kind::Signal => "signal",
        }
    }
}

/// 三个消息宏共用的展开逻辑
/// - 追加派生：Debug, Clone（与已有 derive 合并去重）
/// - 实现 `Message`（NAME/KIND/Response）及对应的标记 trait
pub(crate) fn expand(attr: TokenStream, item: TokenStream, kind: Kind) -> TokenStream {
    let cfg = parse_macro_input!(attr as MessageAttrConfig);
    let mut input = parse_macro_input!(item as Item);

    if kind == Kind::Signal {
        if let Some(response) = &cfg.response {
            return syn::Error::new(response.span(), "#[signal] does not take a response type")
                .to_compile_error()
                .into();
        }
    }

    let required: Vec<syn::Path> = vec![syn::parse_quote!(Debug), syn::parse_quote!(Clone)];

    let (ident, generics) = match &mut input {
        Item::Struct(st) => {
            apply_derives(&mut st.attrs, required);
            (st.ident.clone(), st.generics.clone())
        }
        Item::Enum(en) => {
            apply_derives(&mut en.attrs, required);
            (en.ident.clone(), en.generics.clone())
        }
        other => {
            let msg = format!("#[{}] only supports struct or enum", kind.attr_name());
            return syn::Error::new(other.span(), msg).to_compile_error().into();
        }
    };

    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();
    let name = cfg
        .name
        .unwrap_or_else(|| syn::LitStr::new(&ident.to_string(), ident.span()));
    let response = cfg.response.unwrap_or_else(|| syn::parse_quote!(()));

    let (kind_variant, markers) = match kind {
        Kind::Command => (
            quote!(Command),
            quote! {
                impl #impl_generics ::herald_core::message::Request for #ident #ty_generics #where_clause {}
                impl #impl_generics ::herald_core::message::Command for #ident #ty_generics #where_clause {}
            },
        ),
        Kind::Query => (
            quote!(Query),
            quote! {
                impl #impl_generics ::herald_core::message::Request for #ident #ty_generics #where_clause {}
                impl #impl_generics ::herald_core::message::Query for #ident #ty_generics #where_clause {}
            },
        ),
        Kind::Signal => (
            quote!(Signal),
            quote! {
                impl #impl_generics ::herald_core::message::Signal for #ident #ty_generics #where_clause {}
            },
        ),
    };

    let expanded = quote! {
        #input

        impl #impl_generics ::herald_core::message::Message for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;
            const KIND: ::herald_core::message::MessageKind =
                ::herald_core::message::MessageKind::#kind_variant;
            type Response = #response;
        }

        #markers
    };

    TokenStream::from(expanded)
}

// -------- parsing --------

struct MessageAttrConfig {
    name: Option<syn::LitStr>,
    response: Option<Type>,
}

impl Parse for MessageAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self {
            name: None,
            response: None,
        };
        if input.is_empty() {
            return Ok(cfg);
        }

        let pairs: Punctuated<MessageAttrElem, Token![,]> = Punctuated::parse_terminated(input)?;
        for elem in pairs {
            match elem {
                MessageAttrElem::Name(lit) => {
                    if cfg.name.is_some() {
                        return Err(syn::Error::new(lit.span(), "duplicate key 'name' in attribute"));
                    }
                    cfg.name = Some(lit);
                }
                MessageAttrElem::Response(ty) => {
                    if cfg.response.is_some() {
                        return Err(syn::Error::new(
                            ty.span(),
                            "duplicate key 'response' in attribute",
                        ));
                    }
                    cfg.response = Some(ty);
                }
            }
        }
        Ok(cfg)
    }
}

enum MessageAttrElem {
    Name(syn::LitStr),
    Response(Type),
}

impl Parse for MessageAttrElem {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: syn::Ident = input.parse()?;
        let _eq: Token![=] = input.parse()?;
        if key == "name" {
            Ok(Self::Name(input.parse()?))
        } else if key == "response" {
            Ok(Self::Response(input.parse()?))
        } else {
            Err(syn::Error::new(
                key.span(),
                "unknown key in attribute; expected 'name' or 'response'",
            ))
        }
    }
}
