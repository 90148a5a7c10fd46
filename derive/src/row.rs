use std::collections::HashSet;

use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Result,
    parse::{Parse, ParseStream},
    spanned::Spanned,
};

pub(crate) fn expand_row(input: &DeriveInput) -> Result<TokenStream> {
    let Data::Struct(data) = &input.data else {
        Err(Error::new(input.span(), "`Row` may only be derived on structs."))?
    };

    let Fields::Named(fields) = &data.fields else {
        Err(Error::new(
            input.span(),
            "`Row` may only be derived on structs with named fields.",
        ))?
    };

    let columns = fields
        .named
        .iter()
        .map(ColumnMetadata::parse)
        .map(Result::transpose)
        .flatten() // Skip fields marked `skip`.
        .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    for column in &columns {
        if !seen.insert(column.label.value()) {
            Err(Error::new(
                column.label.span(),
                "Column names must be unique.",
            ))?
        }
    }

    let labels = columns.iter().map(|c| &c.label);
    let names = columns.iter().map(|c| &c.name);
    let types = columns.iter().map(|c| &c.ty);
    let from_types = columns.iter().map(|c| &c.ty);

    let name = &input.ident;
    let (impl_generics, type_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics Row for #name #type_generics #where_clause {
            fn columns(&self) -> ::std::vec::Vec<::std::borrow::Cow<'static, str>> {
                ::std::vec![#(::std::borrow::Cow::Borrowed(#labels)),*]
            }

            fn values(&self) -> ::std::vec::Vec<Value> {
                ::std::vec![#(<Value as ::std::convert::From<#from_types>>::from(<#types as ::std::clone::Clone>::clone(&self.#names))),*]
            }
        }
    };

    Ok(expanded.into())
}

#[derive(Debug)]
struct ColumnMetadata {
    name: Ident,
    label: LitStr,
    ty: syn::Type,
}

impl ColumnMetadata {
    fn parse(field: &Field) -> Result<Option<Self>> {
        let Some(name) = field.ident.clone() else {
            Err(Error::new(field.span(), "Field must be named."))?
        };

        let attribute = match field.attrs.iter().find(|a| a.path().is_ident("column")) {
            Some(attr) => attr.meta.require_list()?.parse_args()?,
            None => ColumnAttribute::Default,
        };

        let label = match attribute {
            ColumnAttribute::Skip => return Ok(None),
            ColumnAttribute::Rename(label) => label,
            ColumnAttribute::Default => {
                let text = name.to_string();
                let text = text.strip_prefix("r#").unwrap_or(&text).to_owned();
                LitStr::new(&text, name.span())
            }
        };

        Ok(Some(Self { name, label, ty: field.ty.clone() }))
    }
}

#[derive(Debug)]
enum ColumnAttribute {
    Default,
    Skip,
    Rename(LitStr),
}

impl Parse for ColumnAttribute {
    fn parse(input: ParseStream) -> Result<Self> {
        if let Ok(ident) = input.parse::<Ident>() {
            if ident == "skip" {
                Ok(Self::Skip)
            } else {
                Err(Error::new_spanned(
                    ident,
                    "Column attribute must be a string literal or `skip`.",
                ))
            }
        } else {
            Ok(Self::Rename(input.parse::<LitStr>()?))
        }
    }
}
