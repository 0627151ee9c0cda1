#[macro_use]
extern crate quote;
#[macro_use]
extern crate syn;

use proc_macro::TokenStream;
use syn::{DeriveInput, LitStr};

/// Implement `flowlink_core::function::Function` naming the function after its type.
/// `#[function_name = "..."]` overrides the name.
#[proc_macro_derive(Function, attributes(function_name))]
pub fn derive_function(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let ident = &input.ident;
    let mut function_name = LitStr::new(ident.to_string().as_str(), ident.span());
    for attr in &input.attrs {
        if !attr.path().is_ident("function_name") {
            continue;
        }

        let value = match &attr.meta {
            syn::Meta::NameValue(name_value) => &name_value.value,
            meta => {
                let msg = "expected `#[function_name = \"...\"]`";
                return syn::Error::new_spanned(meta, msg).to_compile_error().into();
            }
        };

        match value {
            syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit),
                ..
            }) => function_name = lit.clone(),
            _ => {
                let msg = "function name must be a string literal";
                return syn::Error::new_spanned(value, msg).to_compile_error().into();
            }
        }
    }

    let (im, ty, wh) = input.generics.split_for_impl();
    let expanded = quote! {
        impl #im flowlink_core::function::Function for #ident #ty #wh {
            fn name(&self) -> &str {
                #function_name
            }
        }
    };

    TokenStream::from(expanded)
}
