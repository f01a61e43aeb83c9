//! `#[derive(Describe)]` for structs stored in mmarena records.
//!
//! The derive reads field offsets from the compiler with
//! `core::mem::offset_of!`, so it works for both `#[repr(C)]` and default
//! (reordered) layouts. Every field type must implement `Describe`; a field
//! whose type describes itself as invalid (a `Vec`, a `String`, ...) still
//! compiles and is rejected at classification time with the field's path.
//! The generated impl allows `unsafe_code`, so deriving works in crates
//! that deny it.
//!
//! Generated code names `::mmarena_core`. Crates that only depend on a
//! re-exporting crate point the derive at the re-export instead:
//! `#[describe(crate = "mmarena_arena::mmarena_core")]`.
//!
//! ```ignore
//! use mmarena_derive::Describe;
//!
//! #[derive(Clone, Copy, Describe)]
//! struct Coordinate {
//!     x: i64,
//!     y: i64,
//! }
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::ext::IdentExt as _;
use syn::spanned::Spanned as _;
use syn::{parse_macro_input, parse_quote, Data, DeriveInput, Fields, Index, Member};

/// Derive `mmarena_core::Describe` for a struct.
#[proc_macro_derive(Describe, attributes(describe))]
pub fn derive_describe(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    match impl_describe(&ast) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn impl_describe(ast: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    if is_repr_packed(ast) {
        return Err(syn::Error::new(
            ast.span(),
            "Describe cannot be derived for #[repr(packed)] structs",
        ));
    }

    let fields = match &ast.data {
        Data::Struct(s) => &s.fields,
        _ => {
            return Err(syn::Error::new(
                ast.span(),
                "Describe can only be derived for structs",
            ))
        }
    };

    let (names, members, types): (Vec<_>, Vec<_>, Vec<_>) = match fields {
        Fields::Named(named) => named
            .named
            .iter()
            .map(|f| {
                // Named fields always carry an ident.
                let ident = f.ident.clone().ok_or_else(|| {
                    syn::Error::new(f.span(), "named field without an identifier")
                })?;
                Ok((ident.unraw().to_string(), Member::Named(ident), f.ty.clone()))
            })
            .collect::<syn::Result<Vec<_>>>()?
            .into_iter()
            .fold((Vec::new(), Vec::new(), Vec::new()), unzip3),
        Fields::Unnamed(unnamed) => unnamed
            .unnamed
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let index = Index {
                    index: i as u32,
                    span: f.span(),
                };
                (i.to_string(), Member::Unnamed(index), f.ty.clone())
            })
            .fold((Vec::new(), Vec::new(), Vec::new()), unzip3),
        Fields::Unit => (Vec::new(), Vec::new(), Vec::new()),
    };

    let krate = crate_path(ast)?;
    let name = &ast.ident;
    let mut generics = ast.generics.clone();
    {
        let type_params: Vec<_> = generics.type_params().map(|p| p.ident.clone()).collect();
        let where_clause = generics.make_where_clause();
        for param in type_params {
            where_clause
                .predicates
                .push(parse_quote!(#param: #krate::Describe));
        }
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        #[allow(unsafe_code)]
        unsafe impl #impl_generics #krate::Describe for #name #ty_generics #where_clause {
            const HAS_REFERENCES: bool = false
                #( || <#types as #krate::Describe>::HAS_REFERENCES )*;

            fn shape() -> #krate::Shape {
                #krate::Shape::Struct(#krate::StructShape::of::<Self>(
                    ::std::vec![
                        #(
                            #krate::FieldShape::new(
                                #names,
                                ::core::mem::offset_of!(Self, #members),
                                <#types as #krate::Describe>::shape(),
                            )
                        ),*
                    ],
                ))
            }

            #[allow(unused_variables)]
            unsafe fn flatten<__F: #krate::Flattener>(
                &self,
                base: usize,
                flattener: &mut __F,
            ) -> ::core::result::Result<(), __F::Error> {
                if !<Self as #krate::Describe>::HAS_REFERENCES {
                    return ::core::result::Result::Ok(());
                }
                #(
                    // SAFETY: forwarded caller contract; the field is reachable from self.
                    unsafe {
                        #krate::Describe::flatten(
                            &self.#members,
                            base + ::core::mem::offset_of!(Self, #members),
                            flattener,
                        )?;
                    }
                )*
                ::core::result::Result::Ok(())
            }
        }
    })
}

type Triple = (String, Member, syn::Type);

fn unzip3(
    (mut names, mut members, mut types): (Vec<String>, Vec<Member>, Vec<syn::Type>),
    (name, member, ty): Triple,
) -> (Vec<String>, Vec<Member>, Vec<syn::Type>) {
    names.push(name);
    members.push(member);
    types.push(ty);
    (names, members, types)
}

/// The path of `mmarena-core` as seen from the deriving crate:
/// `#[describe(crate = "...")]`, or `::mmarena_core`.
fn crate_path(ast: &DeriveInput) -> syn::Result<syn::Path> {
    let mut krate: syn::Path = parse_quote!(::mmarena_core);
    for attr in ast.attrs.iter().filter(|a| a.path().is_ident("describe")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                krate = lit.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported describe attribute"))
            }
        })?;
    }
    Ok(krate)
}

fn is_repr_packed(ast: &DeriveInput) -> bool {
    let mut packed = false;
    for attr in ast.attrs.iter().filter(|a| a.path().is_ident("repr")) {
        // Malformed repr attributes are reported by rustc itself.
        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("packed") {
                packed = true;
            }
            if meta.input.peek(syn::token::Paren) {
                let content;
                syn::parenthesized!(content in meta.input);
                let _: proc_macro2::TokenStream = content.parse()?;
            }
            Ok(())
        });
    }
    packed
}
