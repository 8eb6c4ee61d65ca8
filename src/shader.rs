//! GPU-side layout of module built data.
//!
//! The CPU blob packs every module's built data with natural (4-byte)
//! alignment. A GPU kernel reads the same values from a storage buffer whose
//! layout follows WGSL rules instead, so every built-data type also
//! implements [`GpuLayout`] (normally via `#[derive(GpuLayout)]`).
//!
//! # WGSL Layout Rules
//!
//! | Rust Type | WGSL Type | Size | Alignment |
//! |-----------|-----------|------|-----------|
//! | `f32` | `f32` | 4 bytes | 4 bytes |
//! | `u32` | `u32` | 4 bytes | 4 bytes |
//! | `i32` | `i32` | 4 bytes | 4 bytes |
//! | `Vec2` | `vec2<f32>` | 8 bytes | 8 bytes |
//! | `Vec3` | `vec3<f32>` | 12 bytes | 16 bytes |
//! | `[f32; 4]` | `vec4<f32>` | 16 bytes | 16 bytes |
//! | `BuiltDistribution` | `vec3<u32>` | 12 bytes | 16 bytes |
//!
//! A [`ShaderParameterBlock`] concatenates every allocation of a compiled
//! emitter into one `ModuleParameters` struct, in allocation order.

use glam::{Vec2, Vec3};

/// Describes how a value is laid out in a WGSL storage buffer.
///
/// Do not implement this by hand for structs; use `#[derive(GpuLayout)]`
/// which computes alignment and padding from the field types.
pub trait GpuLayout {
    /// WGSL type name (e.g. `"vec3<f32>"` or a struct name).
    const WGSL_TYPE: &'static str;
    /// Required alignment in bytes.
    const GPU_ALIGN: u32;
    /// Size in bytes, including trailing padding for structs.
    const GPU_SIZE: u32;

    /// Append the GPU representation of `self` to `out`.
    ///
    /// The caller is responsible for aligning `out` to `GPU_ALIGN` first.
    fn write_gpu(&self, out: &mut Vec<u8>);

    /// Register the WGSL declarations this type depends on (structs only).
    fn declare_wgsl(_decls: &mut WgslDeclarations) {}
}

/// Round `offset` up to the next multiple of `align`.
#[inline]
pub const fn align_up(offset: u32, align: u32) -> u32 {
    offset.div_ceil(align) * align
}

/// The larger of two alignments.
#[inline]
pub const fn max_align(a: u32, b: u32) -> u32 {
    if a > b {
        a
    } else {
        b
    }
}

/// Pad `out` with zero bytes until `out.len() - start` is a multiple of `align`.
#[inline]
pub fn pad_to(out: &mut Vec<u8>, start: usize, align: u32) {
    let align = align as usize;
    while (out.len() - start) % align != 0 {
        out.push(0);
    }
}

/// Ordered, de-duplicated set of WGSL struct declarations.
#[derive(Clone, Debug, Default)]
pub struct WgslDeclarations {
    decls: Vec<(&'static str, String)>,
}

impl WgslDeclarations {
    /// Create an empty declaration set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a struct with this name was already declared.
    pub fn contains(&self, name: &str) -> bool {
        self.decls.iter().any(|(n, _)| *n == name)
    }

    /// Add a declaration. Dependencies must be inserted first.
    pub fn insert(&mut self, name: &'static str, source: String) {
        if !self.contains(name) {
            self.decls.push((name, source));
        }
    }

    /// Number of declared structs.
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    /// Whether nothing was declared.
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Join every declaration into WGSL source.
    pub fn to_source(&self) -> String {
        self.decls
            .iter()
            .map(|(_, source)| source.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

macro_rules! scalar_gpu_layout {
    ($ty:ty, $wgsl:literal) => {
        impl GpuLayout for $ty {
            const WGSL_TYPE: &'static str = $wgsl;
            const GPU_ALIGN: u32 = 4;
            const GPU_SIZE: u32 = 4;

            fn write_gpu(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

scalar_gpu_layout!(f32, "f32");
scalar_gpu_layout!(u32, "u32");
scalar_gpu_layout!(i32, "i32");

impl GpuLayout for Vec2 {
    const WGSL_TYPE: &'static str = "vec2<f32>";
    const GPU_ALIGN: u32 = 8;
    const GPU_SIZE: u32 = 8;

    fn write_gpu(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
    }
}

impl GpuLayout for Vec3 {
    const WGSL_TYPE: &'static str = "vec3<f32>";
    const GPU_ALIGN: u32 = 16; // vec3 has 16-byte alignment in WGSL!
    const GPU_SIZE: u32 = 12;

    fn write_gpu(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
        out.extend_from_slice(&self.z.to_le_bytes());
    }
}

impl GpuLayout for [f32; 4] {
    const WGSL_TYPE: &'static str = "vec4<f32>";
    const GPU_ALIGN: u32 = 16;
    const GPU_SIZE: u32 = 16;

    fn write_gpu(&self, out: &mut Vec<u8>) {
        for v in self {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

/// Type-erased record of one built-data allocation, kept so the GPU block
/// can be produced after the build without knowing module types.
#[derive(Clone, Copy)]
pub(crate) struct GpuAllocation {
    pub(crate) offset: usize,
    pub(crate) size: usize,
    pub(crate) wgsl_type: &'static str,
    pub(crate) gpu_align: u32,
    pub(crate) write: fn(&[u8], &mut Vec<u8>),
    pub(crate) declare: fn(&mut WgslDeclarations),
}

impl GpuAllocation {
    pub(crate) fn of<T: bytemuck::Pod + GpuLayout>(offset: usize) -> Self {
        Self {
            offset,
            size: std::mem::size_of::<T>(),
            wgsl_type: T::WGSL_TYPE,
            gpu_align: T::GPU_ALIGN,
            write: write_erased::<T>,
            declare: T::declare_wgsl,
        }
    }
}

fn write_erased<T: bytemuck::Pod + GpuLayout>(bytes: &[u8], out: &mut Vec<u8>) {
    let value: T = bytemuck::pod_read_unaligned(bytes);
    value.write_gpu(out);
}

/// GPU mirror of a compiled emitter's built data.
///
/// `wgsl` declares every module struct plus a `ModuleParameters` struct with
/// one member per allocation; `bytes` is the matching storage-buffer payload.
#[derive(Clone, Debug, Default)]
pub struct ShaderParameterBlock {
    wgsl: String,
    bytes: Vec<u8>,
    module_offsets: Vec<u32>,
}

impl ShaderParameterBlock {
    pub(crate) fn build(allocations: &[GpuAllocation], blob: &[u8]) -> Self {
        let mut decls = WgslDeclarations::new();
        let mut members = Vec::with_capacity(allocations.len());
        let mut bytes = Vec::new();
        let mut module_offsets = Vec::with_capacity(allocations.len());

        for (index, alloc) in allocations.iter().enumerate() {
            (alloc.declare)(&mut decls);
            members.push(format!("    module_{}: {},", index, alloc.wgsl_type));

            pad_to(&mut bytes, 0, alloc.gpu_align);
            module_offsets.push(bytes.len() as u32);
            (alloc.write)(&blob[alloc.offset..alloc.offset + alloc.size], &mut bytes);
        }

        if members.is_empty() {
            members.push("    _unused: u32,".to_string());
            bytes.extend_from_slice(&0u32.to_le_bytes());
        }
        pad_to(&mut bytes, 0, 16);

        let mut wgsl = decls.to_source();
        if !wgsl.is_empty() {
            wgsl.push_str("\n\n");
        }
        wgsl.push_str(&format!(
            "struct ModuleParameters {{\n{}\n}}",
            members.join("\n")
        ));

        Self {
            wgsl,
            bytes,
            module_offsets,
        }
    }

    /// WGSL declarations for the block, ending with `struct ModuleParameters`.
    pub fn wgsl(&self) -> &str {
        &self.wgsl
    }

    /// Storage-buffer payload matching [`wgsl`](Self::wgsl).
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte offset of each module member inside the payload.
    pub fn module_offsets(&self) -> &[u32] {
        &self.module_offsets
    }
}
