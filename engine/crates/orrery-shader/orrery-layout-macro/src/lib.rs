use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input, spanned::Spanned};

/// 为结构体实现 `GpuLayout`
///
/// 只支持具名字段的结构体，每个字段本身都需要实现 `GpuLayout`。
/// 生成的规则：
/// - `BASE_ALIGNMENT`: 所有字段 `SIZE` 的最大值，向上取整到 16
/// - `SIZE`: 字段数量 * `BASE_ALIGNMENT`
/// - `PACKED_SIZE`: 所有字段 `SIZE` 之和
/// - `serialize` / `deserialize`: 按声明顺序，每个字段前进自身的 `SIZE`
#[proc_macro_derive(GpuLayout)]
pub fn derive_gpu_layout(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_gpu_layout(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_gpu_layout(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            other => {
                return Err(syn::Error::new(other.span(), "GpuLayout only supports structs with named fields"));
            }
        },
        _ => return Err(syn::Error::new(input.span(), "GpuLayout can only be derived for structs")),
    };

    let field_names = fields.iter().filter_map(|f| f.ident.as_ref()).collect::<Vec<_>>();
    let field_types = fields.iter().map(|f| &f.ty).collect::<Vec<_>>();
    let field_count = field_types.len();

    let layout = quote!(::orrery_layout_trait::GpuLayout);

    let expanded = quote! {
        impl #impl_generics #layout for #struct_name #ty_generics #where_clause {
            const BASE_ALIGNMENT: usize = ::orrery_layout_trait::round_up_16(
                ::orrery_layout_trait::const_max(&[#(<#field_types as #layout>::SIZE),*])
            );
            const SIZE: usize = #field_count * Self::BASE_ALIGNMENT;
            const PACKED_SIZE: usize = 0 #(+ <#field_types as #layout>::SIZE)*;

            #[allow(unused_assignments, unused_mut)]
            fn serialize(&self, dest: &mut [u8], offset: usize) {
                let mut running = offset;
                #(
                    #layout::serialize(&self.#field_names, dest, running);
                    running += <#field_types as #layout>::SIZE;
                )*
            }

            #[allow(unused_assignments, unused_mut, unused_variables)]
            fn deserialize(src: &[u8], offset: usize) -> Self {
                let mut running = offset;
                #(
                    let #field_names = <#field_types as #layout>::deserialize(src, running);
                    running += <#field_types as #layout>::SIZE;
                )*
                Self { #(#field_names),* }
            }
        }
    };

    Ok(expanded)
}
