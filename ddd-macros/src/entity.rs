use crate::derive_utils::DeriveSet;
use crate::field_utils::{Placement, ensure_required_fields, to_snake_case};
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Field, Item, ItemStruct, Result, Token, Type, parse::Parse, parse::ParseStream,
    parse_macro_input,
};

/// #[entity] 宏实现
/// - 注入字段（若缺失）：`id` 置于最前；`audit`（平铺序列化）与 `events`（不序列化）追加到末尾
/// - `auditable` 时额外注入 `notes: Option<String>` 与 `version: u64`，并实现 `AuditableEntity`
/// - 自动实现 `::ddd_persistence::entity::Entity`
/// - 支持参数：`#[entity(name = "...", event = EventType, auditable, debug = true|false)]`；
///   - `name` 默认为结构体名的 snake_case
///   - `event` 默认 `NoEvent`
///   - `debug` 默认 `true`（派生 Debug）。当为 `false` 时不派生 Debug，便于用户自定义实现。
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EntityAttrConfig);
    let input = parse_macro_input!(item as Item);

    let mut st = match input {
        Item::Struct(s) => s,
        other => {
            return syn::Error::new(other.span(), "#[entity] only on struct")
                .to_compile_error()
                .into();
        }
    };

    // 仅支持具名字段结构体
    let fields_named = match &mut st.fields {
        syn::Fields::Named(f) => f,
        _ => {
            return syn::Error::new(st.span(), "only supports named-field struct")
                .to_compile_error()
                .into();
        }
    };

    let event_ty = cfg
        .event_ty
        .unwrap_or_else(|| syn::parse_quote! { ::ddd_persistence::domain_event::NoEvent });

    let id_field: Field = syn::parse_quote! {
        id: ::ddd_persistence::uuid::Uuid
    };
    ensure_required_fields(fields_named, &[id_field], Placement::Front);

    let mut trailing: Vec<Field> = Vec::new();
    if cfg.auditable {
        trailing.push(syn::parse_quote! {
            #[serde(default)]
            notes: ::core::option::Option<::std::string::String>
        });
        trailing.push(syn::parse_quote! {
            #[serde(default)]
            version: u64
        });
    }
    trailing.push(syn::parse_quote! {
        #[serde(flatten)]
        audit: ::ddd_persistence::audit::AuditFields
    });
    trailing.push(syn::parse_quote! {
        #[serde(skip)]
        events: ::ddd_persistence::domain_event::EventLedger<#event_ty>
    });
    ensure_required_fields(fields_named, &trailing, Placement::Back);

    // 默认添加 Debug（可通过 debug=false 关闭）、Clone、Default、Serialize、Deserialize
    let derives = DeriveSet::new()
        .with_if(cfg.derive_debug.unwrap_or(true), syn::parse_quote!(Debug))
        .with(syn::parse_quote!(Clone))
        .with(syn::parse_quote!(Default))
        .with_serde();
    if let Err(err) = derives.apply(&mut st.attrs) {
        return err.to_compile_error().into();
    }

    let out_struct = ItemStruct { ..st };

    let ident = &out_struct.ident;
    let type_name = cfg
        .name
        .map(|lit| lit.value())
        .unwrap_or_else(|| to_snake_case(&ident.to_string()));
    let generics = out_struct.generics.clone();
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let auditable_impl = cfg.auditable.then(|| {
        quote! {
            impl #impl_generics ::ddd_persistence::entity::AuditableEntity for #ident #ty_generics #where_clause {
                fn notes(&self) -> ::core::option::Option<&str> { self.notes.as_deref() }

                fn set_notes(&mut self, notes: ::core::option::Option<::std::string::String>) {
                    self.notes = notes;
                }

                fn version(&self) -> u64 { self.version }

                fn bump_version(&mut self) -> u64 {
                    self.version += 1;
                    self.version
                }
            }
        }
    });

    let expanded = quote! {
        #out_struct

        impl #impl_generics ::ddd_persistence::entity::Entity for #ident #ty_generics #where_clause {
            const TYPE: &'static str = #type_name;

            type Event = #event_ty;

            fn new(id: ::ddd_persistence::uuid::Uuid) -> Self {
                Self { id, ..::core::default::Default::default() }
            }

            fn id(&self) -> ::ddd_persistence::uuid::Uuid { self.id }

            fn audit(&self) -> &::ddd_persistence::audit::AuditFields { &self.audit }

            fn audit_mut(&mut self) -> &mut ::ddd_persistence::audit::AuditFields { &mut self.audit }

            fn events(&self) -> &::ddd_persistence::domain_event::EventLedger<Self::Event> { &self.events }

            fn events_mut(&mut self) -> &mut ::ddd_persistence::domain_event::EventLedger<Self::Event> {
                &mut self.events
            }
        }

        #auditable_impl
    };

    TokenStream::from(expanded)
}

// -------- parsing --------

struct EntityAttrConfig {
    name: Option<syn::LitStr>,
    event_ty: Option<Type>,
    auditable: bool,
    derive_debug: Option<bool>,
}

impl Parse for EntityAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self {
            name: None,
            event_ty: None,
            auditable: false,
            derive_debug: None,
        };

        if input.is_empty() {
            return Ok(cfg);
        }

        let elems: Punctuated<EntityAttrElem, Token![,]> =
            Punctuated::<EntityAttrElem, Token![,]>::parse_terminated(input)?;

        for elem in elems.into_iter() {
            match elem {
                EntityAttrElem::Name(lit) => {
                    if cfg.name.is_some() {
                        return Err(syn::Error::new(
                            lit.span(),
                            "duplicate key 'name' in attribute",
                        ));
                    }
                    cfg.name = Some(lit);
                }
                EntityAttrElem::Event(ty) => {
                    if cfg.event_ty.is_some() {
                        return Err(syn::Error::new(
                            ty.span(),
                            "duplicate key 'event' in attribute",
                        ));
                    }
                    cfg.event_ty = Some(*ty);
                }
                EntityAttrElem::Auditable => cfg.auditable = true,
                EntityAttrElem::Debug(b) => {
                    if cfg.derive_debug.is_some() {
                        return Err(syn::Error::new(
                            proc_macro2::Span::call_site(),
                            "duplicate key 'debug' in attribute",
                        ));
                    }
                    cfg.derive_debug = Some(b);
                }
            }
        }

        Ok(cfg)
    }
}

enum EntityAttrElem {
    Name(syn::LitStr),
    Event(Box<Type>),
    Auditable,
    Debug(bool),
}

impl Parse for EntityAttrElem {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: syn::Ident = input.parse()?;
        if key == "name" {
            let _eq: Token![=] = input.parse()?;
            Ok(EntityAttrElem::Name(input.parse()?))
        } else if key == "event" {
            let _eq: Token![=] = input.parse()?;
            let ty: Type = input.parse()?;
            Ok(EntityAttrElem::Event(Box::new(ty)))
        } else if key == "auditable" {
            Ok(EntityAttrElem::Auditable)
        } else if key == "debug" {
            let _eq: Token![=] = input.parse()?;
            let expr: syn::Expr = input.parse()?;
            match expr {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Bool(b),
                    ..
                }) => Ok(EntityAttrElem::Debug(b.value())),
                other => Err(syn::Error::new(
                    other.span(),
                    "expected boolean literal for 'debug'",
                )),
            }
        } else {
            Err(syn::Error::new(
                key.span(),
                "unknown key in attribute; expected 'name', 'event', 'auditable' or 'debug'",
            ))
        }
    }
}
