//! Derive macros for the stateless particle framework.
//!
//! This crate provides two derive macros:
//!
//! - [`GpuLayout`] - Describes a module's built-data struct to the GPU side
//! - [`BuiltEnum`] - Stores unit-variant mode enums as `u32` inside built data
//!
//! # Usage
//!
//! These macros are re-exported from the main `stateless_particles` crate.
//! You don't need to add this crate directly:
//!
//! ```ignore
//! use stateless_particles::prelude::*;
//!
//! #[repr(C)]
//! #[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
//! struct MyModuleBuiltData {
//!     position_offset: i32,
//!     scale: BuiltDistribution,
//! }
//!
//! #[derive(BuiltEnum, Clone, Copy, PartialEq)]
//! enum MyMode {
//!     Direct,
//!     Random,
//! }
//! ```
//!
//! # The GpuLayout Macro
//!
//! Built data lives in a tightly packed CPU blob where every field is
//! 4-byte aligned. The GPU reads the same values from a storage buffer,
//! where WGSL imposes its own alignment rules:
//!
//! - `vec3<T>` requires 16-byte alignment (even though it's only 12 bytes)
//! - A struct is aligned to its most-aligned member
//! - A struct's size is rounded up to its alignment
//!
//! `#[derive(GpuLayout)]` computes that layout at compile time from the
//! per-field `GpuLayout` impls and generates a serializer that inserts the
//! padding, plus the matching WGSL struct declaration.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

/// Derive macro for built-data mode enums.
///
/// Mode enums are stored as plain `u32` inside POD built data. Variants are
/// assigned sequential IDs starting from 0.
///
/// # Generated Items
///
/// For an enum `ShapeKind`:
///
/// - `impl From<ShapeKind> for u32` - Convert variant to integer
/// - `impl From<u32> for ShapeKind` - Convert integer to variant (invalid values default to first variant)
/// - `ShapeKind::count() -> u32` - Returns number of variants
///
/// # Example
///
/// ```ignore
/// #[derive(BuiltEnum, Clone, Copy, PartialEq)]
/// enum ShapeKind {
///     Box,      // = 0
///     Sphere,   // = 1
/// }
///
/// let stored: u32 = ShapeKind::Sphere.into();  // 1
/// let mode = ShapeKind::from(stored);
/// ```
///
/// # Panics
///
/// The macro panics at compile time if:
/// - Applied to a struct instead of an enum
/// - Any variant has fields (tuple or struct variants)
/// - Enum has zero variants
#[proc_macro_derive(BuiltEnum)]
pub fn derive_built_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let variants = match &input.data {
        Data::Enum(data) => &data.variants,
        _ => panic!("BuiltEnum derive only supports enums"),
    };

    for variant in variants.iter() {
        if !matches!(variant.fields, Fields::Unit) {
            panic!(
                "BuiltEnum variants must be unit variants (no fields). \
                 Found fields on variant '{}'",
                variant.ident
            );
        }
    }

    let into_arms: Vec<_> = variants
        .iter()
        .enumerate()
        .map(|(i, variant)| {
            let variant_name = &variant.ident;
            let idx = i as u32;
            quote! { #name::#variant_name => #idx }
        })
        .collect();

    let from_arms: Vec<_> = variants
        .iter()
        .enumerate()
        .map(|(i, variant)| {
            let variant_name = &variant.ident;
            let idx = i as u32;
            quote! { #idx => #name::#variant_name }
        })
        .collect();

    let first_variant = &variants
        .first()
        .expect("Enum must have at least one variant")
        .ident;
    let variant_count = variants.len() as u32;

    let expanded = quote! {
        impl From<#name> for u32 {
            fn from(value: #name) -> u32 {
                match value {
                    #(#into_arms),*
                }
            }
        }

        impl From<u32> for #name {
            fn from(value: u32) -> #name {
                match value {
                    #(#from_arms,)*
                    _ => #name::#first_variant,
                }
            }
        }

        impl #name {
            /// Returns the number of variants in this mode enum.
            pub const fn count() -> u32 {
                #variant_count
            }
        }
    };

    TokenStream::from(expanded)
}

/// Derive macro for module built-data structs.
///
/// Implements `stateless_particles::shader::GpuLayout` for a struct whose
/// fields all implement `GpuLayout` themselves (scalars, glam vectors,
/// `[f32; 4]`, `BuiltDistribution`, or other derived structs).
///
/// # Generated Code
///
/// For a struct `ScaleColorBuiltData`:
///
/// ```ignore
/// impl GpuLayout for ScaleColorBuiltData {
///     const WGSL_TYPE: &'static str = "ScaleColorBuiltData";
///     const GPU_ALIGN: u32 = /* max field alignment */;
///     const GPU_SIZE: u32 = /* padded size */;
///     fn write_gpu(&self, out: &mut Vec<u8>) { /* fields + padding */ }
///     fn declare_wgsl(decls: &mut WgslDeclarations) { /* nested structs, then self */ }
/// }
/// ```
///
/// # Panics
///
/// The macro panics at compile time if:
/// - Applied to an enum instead of a struct
/// - Struct uses tuple fields instead of named fields
/// - Struct has no fields
#[proc_macro_derive(GpuLayout)]
pub fn derive_gpu_layout(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let name_str = name.to_string();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => panic!("GpuLayout derive only supports structs with named fields"),
        },
        _ => panic!("GpuLayout derive only supports structs"),
    };

    if fields.is_empty() {
        panic!("GpuLayout derive requires at least one field on '{}'", name_str);
    }

    let field_names: Vec<_> = fields
        .iter()
        .map(|field| field.ident.as_ref().unwrap())
        .collect();
    let field_name_strs: Vec<String> = field_names.iter().map(|ident| ident.to_string()).collect();
    let field_types: Vec<_> = fields.iter().map(|field| &field.ty).collect();

    let krate = quote! { ::stateless_particles };

    let expanded = quote! {
        impl #krate::shader::GpuLayout for #name {
            const WGSL_TYPE: &'static str = #name_str;

            const GPU_ALIGN: u32 = {
                let mut align = 1u32;
                #(
                    align = #krate::shader::max_align(
                        align,
                        <#field_types as #krate::shader::GpuLayout>::GPU_ALIGN,
                    );
                )*
                align
            };

            const GPU_SIZE: u32 = {
                let mut offset = 0u32;
                #(
                    offset = #krate::shader::align_up(
                        offset,
                        <#field_types as #krate::shader::GpuLayout>::GPU_ALIGN,
                    ) + <#field_types as #krate::shader::GpuLayout>::GPU_SIZE;
                )*
                #krate::shader::align_up(offset, <Self as #krate::shader::GpuLayout>::GPU_ALIGN)
            };

            fn write_gpu(&self, out: &mut Vec<u8>) {
                let start = out.len();
                #(
                    #krate::shader::pad_to(
                        out,
                        start,
                        <#field_types as #krate::shader::GpuLayout>::GPU_ALIGN,
                    );
                    #krate::shader::GpuLayout::write_gpu(&self.#field_names, out);
                )*
                #krate::shader::pad_to(out, start, <Self as #krate::shader::GpuLayout>::GPU_ALIGN);
            }

            fn declare_wgsl(decls: &mut #krate::shader::WgslDeclarations) {
                if decls.contains(#name_str) {
                    return;
                }
                #( <#field_types as #krate::shader::GpuLayout>::declare_wgsl(decls); )*
                let members: Vec<String> = vec![
                    #(
                        format!(
                            "    {}: {},",
                            #field_name_strs,
                            <#field_types as #krate::shader::GpuLayout>::WGSL_TYPE,
                        )
                    ),*
                ];
                decls.insert(#name_str, format!("struct {} {{\n{}\n}}", #name_str, members.join("\n")));
            }
        }
    };

    TokenStream::from(expanded)
}
