//! Derives for codevault's compile-time dependency injection.
//!
//! - `#[derive(Context)]` turns every field of the root context into a
//!   `FromRef<Root>` source.
//! - `#[derive(FromContext)]` builds a service or repository by resolving each
//!   of its fields from the root context.
//!
//! Generated code refers to `crate::FromRef`, so the consuming crate must
//! expose that trait at its root.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields};

/// Makes each field of the annotated struct extractable from it.
///
/// ```ignore
/// #[derive(Context, Clone)]
/// pub struct Context {
///     pub vectors: AppVectors,
///     pub config: Arc<Config>,
/// }
/// // impl FromRef<Context> for AppVectors { .. }
/// // impl FromRef<Context> for Arc<Config> { .. }
/// ```
///
/// Field types must be `Clone` and pairwise distinct.
#[proc_macro_derive(Context)]
pub fn derive_context(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_context(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Builds the annotated struct by resolving every field from a root context.
///
/// The root defaults to a type named `Context` in scope; override it with
/// `#[from_context(Context = "path::to::Root")]`.
///
/// ```ignore
/// #[derive(FromContext, Clone)]
/// pub struct SearchService {
///     vectors: AppVectors,
///     embedder: AppEmbedder,
/// }
/// ```
#[proc_macro_derive(FromContext, attributes(from_context))]
pub fn derive_from_context(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_from_context(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_context(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let root = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let impls = named_fields(input, "Context")?.iter().map(|field| {
        let ident = &field.ident;
        let ty = &field.ty;
        quote! {
            impl #impl_generics crate::FromRef<#root #ty_generics> for #ty #where_clause {
                fn from_ref(ctx: &#root #ty_generics) -> Self {
                    ctx.#ident.clone()
                }
            }
        }
    });

    Ok(quote! { #(#impls)* })
}

fn expand_from_context(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let root = root_context(input)?;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let inits = named_fields(input, "FromContext")?.iter().map(|field| {
        let ident = &field.ident;
        let ty = &field.ty;
        quote! { #ident: <#ty as crate::FromRef<#root>>::from_ref(ctx) }
    });

    Ok(quote! {
        impl #impl_generics crate::FromRef<#root> for #name #ty_generics #where_clause {
            fn from_ref(ctx: &#root) -> Self {
                Self { #(#inits),* }
            }
        }
    })
}

/// Returns the named fields of a struct, or a spanned error for anything else.
fn named_fields<'a>(
    input: &'a DeriveInput,
    derive: &str,
) -> syn::Result<&'a Punctuated<Field, Comma>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(&fields.named),
            _ => Err(syn::Error::new_spanned(
                input,
                format!("{derive} requires a struct with named fields"),
            )),
        },
        _ => Err(syn::Error::new_spanned(
            input,
            format!("{derive} can only be derived for structs"),
        )),
    }
}

/// Reads `#[from_context(Context = "...")]`, defaulting to `Context`.
fn root_context(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let mut root: Option<syn::Type> = None;

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("from_context")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("Context") {
                let value: syn::LitStr = meta.value()?.parse()?;
                root = Some(value.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `Context = \"Type\"`"))
            }
        })?;
    }

    Ok(match root {
        Some(ty) => quote! { #ty },
        None => quote! { Context },
    })
}
