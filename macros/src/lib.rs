use proc_macro::TokenStream;

mod record;

#[proc_macro_attribute]
pub fn record(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = syn::parse_macro_input!(attr as record::RecordArgs);
    let item = syn::parse_macro_input!(item as syn::ItemStruct);
    record::expand_record(args, item).into()
}
