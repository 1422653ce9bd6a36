use convert_case::{Case, Casing};
use either::Either::{Left, Right};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{ext::IdentExt, parse::Parse, punctuated::Punctuated, *};

#[derive(Default)]
pub struct RecordArgs {
    atomic: bool,
}

impl Parse for RecordArgs {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut args = RecordArgs::default();
        for ident in Punctuated::<Ident, Token![,]>::parse_terminated(input)? {
            if ident == "atomic" {
                args.atomic = true;
            } else {
                return Err(syn::Error::new_spanned(
                    ident,
                    "unknown record option; expected `atomic`",
                ));
            }
        }
        Ok(args)
    }
}

struct RecordField {
    attrs: Vec<Attribute>,
    vis: Visibility,
    ident: Ident,
    ty: Type,
    is_unique: bool,
}

impl RecordField {
    fn new(field: syn::Field) -> syn::Result<Self> {
        let mut is_unique = false;
        let mut attrs = Vec::new();
        for attr in field.attrs {
            if attr.path().is_ident("doc") {
                attrs.push(attr);
                continue;
            }
            if !attr.path().is_ident("record") {
                // Fields become list elements, so only docs have a place to go.
                return Err(syn::Error::new_spanned(
                    attr,
                    "record fields accept only doc comments and `#[record(..)]`",
                ));
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("unique") {
                    is_unique = true;
                    Ok(())
                } else {
                    Err(meta.error("unknown field option; expected `unique`"))
                }
            })?;
        }

        let ident = match field.ident {
            Some(ident) => ident,
            None => {
                return Err(syn::Error::new_spanned(
                    field.ty,
                    "record fields must be named",
                ))
            }
        };

        Ok(RecordField {
            attrs,
            vis: field.vis,
            ident,
            ty: field.ty,
            is_unique,
        })
    }
}

/// The type-level index of the field at `index`.
fn index_ty(index: usize) -> TokenStream {
    (0..index).fold(quote!(::tcow::index::UTerm), |acc, _| {
        quote!(::tcow::index::UInt<#acc>)
    })
}

fn expand_accessors(position: usize, field: &RecordField) -> impl Iterator<Item = TokenStream> {
    let RecordField {
        attrs,
        vis,
        ident,
        ty,
        is_unique,
    } = field;
    let index = index_ty(position);

    let name = ident.unraw();
    let set = format_ident!("set_{}", name);
    let get_mut = format_ident!("{}_mut", name);
    let with = format_ident!("with_{}", name);
    let with_unique = format_ident!("with_{}_unique", name);

    let get = quote! {
        #(#attrs)*
        #vis fn #ident(&self) -> &#ty {
            self.0.get::<#ty, #index>()
        }
    };
    let set = quote! {
        #vis fn #set(&mut self, value: #ty) {
            self.0.set::<#ty, #index>(value)
        }
    };
    let get_mut = quote! {
        #vis fn #get_mut(&mut self) -> &mut #ty {
            self.0.get_mut::<#ty, #index>()
        }
    };

    if *is_unique {
        Left(
            [
                get,
                set,
                get_mut,
                quote! {
                    #[must_use]
                    #vis fn #with(&self, value: #ty) -> Self {
                        Self(self.0.with_unique::<#ty, #index>(value))
                    }
                },
            ]
            .into_iter(),
        )
    } else {
        Right(
            [
                get,
                set,
                get_mut,
                quote! {
                    #[must_use]
                    #vis fn #with(&self, value: #ty) -> Self
                    where
                        #ty: ::core::cmp::PartialEq,
                    {
                        Self(self.0.with::<#ty, #index>(value))
                    }
                },
                quote! {
                    #[must_use]
                    #vis fn #with_unique(&self, value: #ty) -> Self {
                        Self(self.0.with_unique::<#ty, #index>(value))
                    }
                },
            ]
            .into_iter(),
        )
    }
}

fn expand_indices(vis: &Visibility, ident: &Ident, fields: &[RecordField]) -> TokenStream {
    let module = format_ident!("{}", ident.unraw().to_string().to_case(Case::Snake));
    let doc = format!("Field indices of [`{ident}`](super::{ident}).");
    let aliases = fields.iter().enumerate().map(|(position, field)| {
        let alias = format_ident!("{}", field.ident.unraw().to_string().to_case(Case::Pascal));
        let index = index_ty(position);
        quote!(pub type #alias = #index;)
    });

    quote! {
        #[doc = #doc]
        #vis mod #module {
            #(#aliases)*
        }
    }
}

fn expand(args: RecordArgs, item: ItemStruct) -> syn::Result<TokenStream> {
    let ItemStruct {
        attrs,
        vis,
        ident,
        generics,
        fields,
        ..
    } = item;

    let fields = match fields {
        Fields::Named(named) => named
            .named
            .into_iter()
            .map(RecordField::new)
            .collect::<syn::Result<Vec<_>>>()?,
        other => {
            return Err(syn::Error::new_spanned(
                other,
                "records need a struct with named fields",
            ))
        }
    };

    let shared = if args.atomic {
        quote!(::tcow::Atomic)
    } else {
        quote!(::tcow::Local)
    };
    let idents = fields.iter().map(|f| &f.ident).collect::<Vec<_>>();
    let tys = fields.iter().map(|f| &f.ty).collect::<Vec<_>>();
    // Spelled out as `T![..]` would expand: derives reject type macros on generic items.
    let list = tys.iter().rev().fold(quote!(()), |acc, ty| quote!((#ty, #acc)));
    let cow = quote!(::tcow::Cow<#list, #shared>);

    // Copy-on-write needs every field to be cloneable.
    let mut accessor_generics = generics.clone();
    let predicates = &mut accessor_generics.make_where_clause().predicates;
    for ty in &tys {
        predicates.push(parse_quote!(#ty: ::core::clone::Clone));
    }
    let (impl_generics, ty_generics, where_clause) = accessor_generics.split_for_impl();
    let struct_where = &generics.where_clause;

    let accessors = fields
        .iter()
        .enumerate()
        .flat_map(|(position, field)| expand_accessors(position, field));
    let indices = expand_indices(&vis, &ident, &fields);

    Ok(quote! {
        #(#attrs)*
        #[repr(transparent)]
        #vis struct #ident #generics (#cow) #struct_where;

        impl #impl_generics #ident #ty_generics #where_clause {
            /// Allocates fresh storage for the given field values.
            #[allow(clippy::too_many_arguments)]
            #vis fn new(#(#idents: #tys),*) -> Self {
                Self(::tcow::Cow::new(::tcow::t![#(#idents),*]))
            }

            #vis fn from_cow(cow: #cow) -> Self {
                Self(cow)
            }

            #vis fn as_cow(&self) -> &#cow {
                &self.0
            }

            #vis fn cow_mut(&mut self) -> &mut #cow {
                &mut self.0
            }

            #vis fn into_cow(self) -> #cow {
                self.0
            }

            #(#accessors)*
        }

        #indices
    })
}

pub fn expand_record(args: RecordArgs, item: ItemStruct) -> TokenStream {
    expand(args, item).unwrap_or_else(syn::Error::into_compile_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_str(item: ItemStruct) -> String {
        expand_record(RecordArgs::default(), item).to_string()
    }

    #[test]
    fn doc_goes_to_getter() {
        let out = expand_str(parse_quote! {
            struct Sample {
                /// The count.
                count: u32,
            }
        });
        assert!(out.contains("fn count"));
        assert!(out.contains("The count."));
        assert!(!out.contains("compile_error"));
    }

    #[test]
    fn field_attribute_rejected() {
        let out = expand_str(parse_quote! {
            struct Sample {
                #[serde(skip)]
                count: u32,
            }
        });
        assert!(out.contains("compile_error"));
        assert!(out.contains("only doc comments"));
    }

    #[test]
    fn cfg_rejected() {
        let out = expand_str(parse_quote! {
            struct Sample {
                #[cfg(test)]
                count: u32,
            }
        });
        assert!(out.contains("compile_error"));
    }

    #[test]
    fn unique_option() {
        let out = expand_str(parse_quote! {
            struct Sample {
                #[record(unique)]
                handle: u32,
            }
        });
        assert!(out.contains("with_handle"));
        assert!(!out.contains("with_handle_unique"));

        let out = expand_str(parse_quote! {
            struct Sample {
                #[record(shared)]
                handle: u32,
            }
        });
        assert!(out.contains("unknown field option"));
    }
}
