// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! This crate provides procedural macros for the Ham object runtime.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, ToTokens};
use syn::{parse_macro_input, Data, DeriveInput, Fields, Index};

/// A derive macro that implements `ham_core::object::Embedded` and
/// `ham_core::object::Derived` for a struct embedding its parent type.
///
/// The struct must be `#[repr(C)]` and its first field is taken as the
/// embedded base. Works for object types and for vtables alike.
#[proc_macro_derive(Derived)]
pub fn derive_derived(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_derived(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_derived(input: &DeriveInput) -> syn::Result<TokenStream2> {
    if !has_repr_c(input) {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "`Derived` requires `#[repr(C)]` so the base sits at a fixed offset",
        ));
    }

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "`Derived` can only be derived for structs",
        ));
    };

    // The first field is the embedded base.
    let (member, base_ty) = match &data.fields {
        Fields::Named(fields) => {
            let field = fields.named.first().ok_or_else(|| missing_base(input))?;
            let ident = field.ident.as_ref().ok_or_else(|| missing_base(input))?;
            (ident.to_token_stream(), &field.ty)
        }
        Fields::Unnamed(fields) => {
            let field = fields.unnamed.first().ok_or_else(|| missing_base(input))?;
            (Index::from(0).to_token_stream(), &field.ty)
        }
        Fields::Unit => return Err(missing_base(input)),
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        unsafe impl #impl_generics ::ham_core::object::Embedded for #name #ty_generics #where_clause {
            type Root = <#base_ty as ::ham_core::object::Embedded>::Root;
            const DEPTH: usize = <#base_ty as ::ham_core::object::Embedded>::DEPTH + 1;

            fn as_root(&self) -> &Self::Root {
                ::ham_core::object::Embedded::as_root(&self.#member)
            }

            fn as_root_mut(&mut self) -> &mut Self::Root {
                ::ham_core::object::Embedded::as_root_mut(&mut self.#member)
            }

            fn root_ptr(ptr: ::core::ptr::NonNull<Self>) -> ::core::ptr::NonNull<Self::Root> {
                <#base_ty as ::ham_core::object::Embedded>::root_ptr(
                    <Self as ::ham_core::object::Derived>::super_ptr(ptr),
                )
            }

            fn from_root_ptr(root: ::core::ptr::NonNull<Self::Root>) -> ::core::ptr::NonNull<Self> {
                <Self as ::ham_core::object::Derived>::from_base_ptr(
                    <#base_ty as ::ham_core::object::Embedded>::from_root_ptr(root),
                )
            }
        }

        unsafe impl #impl_generics ::ham_core::object::Derived for #name #ty_generics #where_clause {
            type Base = #base_ty;
            const BASE_OFFSET: usize = ::core::mem::offset_of!(#name #ty_generics, #member);

            fn base(&self) -> &Self::Base {
                &self.#member
            }

            fn base_mut(&mut self) -> &mut Self::Base {
                &mut self.#member
            }
        }
    })
}

fn has_repr_c(input: &DeriveInput) -> bool {
    input
        .attrs
        .iter()
        .filter(|attr| attr.path().is_ident("repr"))
        .any(|attr| {
            let mut found = false;
            // Other repr hints (`align`, ...) are accepted alongside `C`.
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("C") {
                    found = true;
                }
                if meta.input.peek(syn::token::Paren) {
                    let _content;
                    syn::parenthesized!(_content in meta.input);
                }
                Ok(())
            });
            found
        })
}

fn missing_base(input: &DeriveInput) -> syn::Error {
    syn::Error::new_spanned(
        &input.ident,
        "`Derived` needs a first field holding the embedded base",
    )
}
