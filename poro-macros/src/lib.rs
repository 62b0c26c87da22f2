//! Procedural macros for the poro project.
//!
//! This crate provides `#[derive(Entity)]`, which makes a struct with named
//! fields persistable: it describes the class, allocates instances with
//! default field values, and copies fields to and from attribute bags.
//!
//! # Attributes
//!
//! - `#[entity(class = "Name")]` - The class name (defaults to the struct name)
//! - `#[entity(collection = "people")]` - The document collection name
//! - `#[entity(skip)]` on a field - Never persisted, restored as `Default::default()`
//! - `#[entity(rename = "name")]` on a field - The persisted field name

#[allow(unused_extern_crates)]
extern crate self as poro_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitStr};

#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

#[derive(Default)]
struct ContainerAttrs {
    class: Option<String>,
    collection: Option<String>,
}

#[derive(Default)]
struct FieldAttrs {
    skip: bool,
    rename: Option<String>,
}

fn container_attrs(input: &DeriveInput) -> syn::Result<ContainerAttrs> {
    let mut attrs = ContainerAttrs::default();

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("class") {
                attrs.class = Some(meta.value()?.parse::<LitStr>()?.value());
                Ok(())
            } else if meta.path.is_ident("collection") {
                attrs.collection = Some(meta.value()?.parse::<LitStr>()?.value());
                Ok(())
            } else {
                Err(meta.error("expected `class` or `collection`"))
            }
        })?;
    }

    Ok(attrs)
}

fn field_attrs(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();

    for attr in field.attrs.iter().filter(|a| a.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                attrs.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                attrs.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                Ok(())
            } else {
                Err(meta.error("expected `skip` or `rename`"))
            }
        })?;
    }

    Ok(attrs)
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "Entity can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "Entity can only be derived for structs",
            ))
        }
    };

    let container = container_attrs(&input)?;
    let ident = &input.ident;
    let class = container.class.unwrap_or_else(|| ident.to_string());
    let collection = container
        .collection
        .map(|collection| quote! { .with_collection(#collection) });
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut allocated = Vec::new();
    let mut names = Vec::new();
    let mut extracted = Vec::new();
    let mut injected = Vec::new();

    for field in fields {
        let attrs = field_attrs(field)?;
        let Some(member) = &field.ident else {
            continue;
        };
        let ty = &field.ty;

        allocated.push(quote! { #member: ::core::default::Default::default() });

        if attrs.skip {
            continue;
        }

        let name = attrs
            .rename
            .unwrap_or_else(|| member.to_string().trim_start_matches("r#").to_string());

        extracted.push(quote! {
            .with(#name, ::poro::entity::ToValue::to_value(&self.#member))
        });
        injected.push(quote! {
            #name => {
                self.#member = ::poro::entity::field_value::<#ty>(value)?;
            }
        });
        names.push(name);
    }

    let count = names.len();

    Ok(quote! {
        impl #impl_generics ::poro::entity::Entity for #ident #ty_generics #where_clause {
            fn class_info() -> ::poro::entity::ClassInfo {
                let fields: [&str; #count] = [#(#names),*];
                ::poro::entity::ClassInfo::new(#class, fields) #collection
            }

            fn allocate() -> Self {
                Self {
                    #(#allocated,)*
                }
            }

            fn extract(&self) -> ::poro::value::Object {
                ::poro::value::Object::new(#class)
                    #(#extracted)*
            }

            fn inject(
                &mut self,
                name: &str,
                value: ::poro::value::Value,
            ) -> ::poro::error::PoroResult<()> {
                match name {
                    #(#injected)*
                    _ => ::core::mem::drop(value),
                }
                Ok(())
            }
        }

        impl #impl_generics ::poro::entity::ToValue for #ident #ty_generics #where_clause {
            fn to_value(&self) -> ::poro::value::Value {
                ::poro::value::Value::Object(::poro::entity::Entity::extract(self))
            }
        }

        impl #impl_generics ::poro::entity::FromValue for #ident #ty_generics #where_clause {
            fn from_value(value: ::poro::value::Value) -> ::poro::error::PoroResult<Self> {
                match value {
                    ::poro::value::Value::Object(object) if object.class() == #class => {
                        <Self as ::poro::entity::Entity>::from_object(object)
                    }
                    ::poro::value::Value::Object(object) => Err(::poro::error::PoroError::InvalidValue(
                        #class.to_string(),
                        object.class().to_string(),
                    )),
                    other => Err(::poro::error::PoroError::InvalidValue(
                        #class.to_string(),
                        other.kind().to_string(),
                    )),
                }
            }
        }
    })
}
