//! # Blockflow Macros
//!
//! `#[derive(Properties)]` builds the property descriptor table of an
//! activity from field attributes.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{
    parse_macro_input, Data, DeriveInput, Expr, Fields, GenericArgument, Ident, LitBool, LitStr,
    PathArguments, Type,
};

/// Derives `blockflow_core::PropertySet`.
///
/// Every annotated field must be an `Option<T>`; `None` means unassigned.
/// A field may carry several of `#[input]`, `#[config]` and `#[output]`.
///
/// # Example
/// ```rust,ignore
/// use blockflow_macros::Properties;
///
/// #[derive(Default, Properties)]
/// struct MaxActivity {
///     #[config(mandatory)]
///     val: Option<i64>,
///     #[input(default = 0)]
///     #[output(mandatory)]
///     max: Option<i64>,
/// }
/// ```
///
/// Supported arguments: `mandatory` (optionally `mandatory = false`),
/// `default = <expr>` (converted with `json!`) and `rename = "name"`.
/// Without `rename`, snake_case field names are exposed in camelCase.
#[proc_macro_derive(Properties, attributes(input, config, output))]
pub fn derive_properties(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct PropertyAttr {
    kind: TokenStream2,
    mandatory: bool,
    default: Option<Expr>,
    rename: Option<String>,
}

struct PropertyField {
    ident: Ident,
    name: String,
    inner: Type,
    attrs: Vec<PropertyAttr>,
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Properties can only be derived for structs",
        ));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &data.fields,
            "Properties requires named fields",
        ));
    };

    let mut fields = Vec::new();
    for field in &named.named {
        let attrs = property_attrs(field)?;
        if attrs.is_empty() {
            continue;
        }
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let inner = option_inner(&field.ty).ok_or_else(|| {
            syn::Error::new_spanned(&field.ty, "property fields must be Option<T>")
        })?;
        let name = attrs
            .iter()
            .find_map(|a| a.rename.clone())
            .unwrap_or_else(|| camel_case(&ident.unraw().to_string()));
        fields.push(PropertyField {
            ident,
            name,
            inner,
            attrs,
        });
    }

    let descriptors = fields.iter().flat_map(|field| {
        let name = &field.name;
        let inner = &field.inner;
        field.attrs.iter().map(move |attr| {
            let kind = &attr.kind;
            let mandatory = attr.mandatory;
            let default = attr.default.as_ref().map(|expr| {
                quote! { .with_default(::blockflow_core::serde_json::json!(#expr)) }
            });
            quote! {
                ::blockflow_core::Property::new(
                    #name,
                    #kind,
                    <#inner as ::blockflow_core::PropertyValue>::property_type(),
                )
                .mandatory(#mandatory)
                #default
            }
        })
    });

    let getters = fields.iter().map(|field| {
        let name = &field.name;
        let ident = &field.ident;
        quote! {
            #name => match &self.#ident {
                ::std::option::Option::Some(value) => ::blockflow_core::serde_json::to_value(value)
                    .map(::std::option::Option::Some)
                    .map_err(|e| ::blockflow_core::PropertyError::conversion(name, e)),
                ::std::option::Option::None => ::std::result::Result::Ok(::std::option::Option::None),
            },
        }
    });

    let setters = fields.iter().map(|field| {
        let name = &field.name;
        let ident = &field.ident;
        quote! {
            #name => {
                let value = ::blockflow_core::serde_json::from_value(value)
                    .map_err(|e| ::blockflow_core::PropertyError::conversion(name, e))?;
                self.#ident = ::std::option::Option::Some(value);
                ::std::result::Result::Ok(())
            }
        }
    });

    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::blockflow_core::PropertySet for #ident #ty_generics #where_clause {
            fn properties(&self) -> ::std::vec::Vec<::blockflow_core::Property> {
                ::std::vec![#(#descriptors),*]
            }

            fn property(
                &self,
                name: &str,
            ) -> ::std::result::Result<
                ::std::option::Option<::blockflow_core::serde_json::Value>,
                ::blockflow_core::PropertyError,
            > {
                match name {
                    #(#getters)*
                    _ => ::std::result::Result::Err(
                        ::blockflow_core::PropertyError::Unknown(name.to_string()),
                    ),
                }
            }

            fn set_property(
                &mut self,
                name: &str,
                value: ::blockflow_core::serde_json::Value,
            ) -> ::std::result::Result<(), ::blockflow_core::PropertyError> {
                match name {
                    #(#setters)*
                    _ => {
                        let _ = value;
                        ::std::result::Result::Err(
                            ::blockflow_core::PropertyError::Unknown(name.to_string()),
                        )
                    }
                }
            }
        }
    })
}

fn property_attrs(field: &syn::Field) -> syn::Result<Vec<PropertyAttr>> {
    let mut attrs = Vec::new();
    for attr in &field.attrs {
        let kind = if attr.path().is_ident("input") {
            quote!(::blockflow_core::PropertyKind::Input)
        } else if attr.path().is_ident("config") {
            quote!(::blockflow_core::PropertyKind::Config)
        } else if attr.path().is_ident("output") {
            quote!(::blockflow_core::PropertyKind::Output)
        } else {
            continue;
        };

        let mut parsed = PropertyAttr {
            kind,
            mandatory: false,
            default: None,
            rename: None,
        };
        if let syn::Meta::List(_) = &attr.meta {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("mandatory") {
                    parsed.mandatory = if meta.input.peek(syn::Token![=]) {
                        meta.value()?.parse::<LitBool>()?.value
                    } else {
                        true
                    };
                    Ok(())
                } else if meta.path.is_ident("default") {
                    if attr.path().is_ident("output") {
                        return Err(meta.error("outputs cannot declare a default"));
                    }
                    parsed.default = Some(meta.value()?.parse::<Expr>()?);
                    Ok(())
                } else if meta.path.is_ident("rename") {
                    parsed.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                    Ok(())
                } else {
                    Err(meta.error("expected `mandatory`, `default` or `rename`"))
                }
            })?;
        }
        attrs.push(parsed);
    }
    Ok(attrs)
}

fn option_inner(ty: &Type) -> Option<Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner.clone()),
        _ => None,
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.trim_start_matches('_').chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
