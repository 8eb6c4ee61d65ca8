//! WGSL mirrors of the CPU runtime helpers.
//!
//! A GPU kernel for a stateless module needs the same three things a CPU
//! kernel gets from [`ParticleSimulationContext`](crate::ParticleSimulationContext):
//! per-particle randoms, the static float pool plus parameter buffer, and a
//! way to sample a [`BuiltDistribution`](crate::BuiltDistribution). These
//! snippets provide them with the same bit layout and arithmetic.
//!
//! # Available Functions
//!
//! ## Random
//! - `pcg4d(v: vec4<u32>) -> vec4<u32>` - PCG4D hash
//! - `random_float4(unique_index: u32, emitter_seed: u32, seed: u32) -> vec4<f32>` - four floats in [0, 1)
//! - `random_float4_stream(unique_index, emitter_seed, seed, stream: u32) -> vec4<f32>` - independent stream of one seed
//! - `random_float(unique_index: u32, emitter_seed: u32, seed: u32) -> f32`
//!
//! ## Distributions
//! - `dist_is_uniform`, `dist_is_random`, `dist_is_binding`, `dist_offset`, `dist_last`
//! - `sample_float(d: vec3<u32>, random: vec4<f32>, time: f32) -> f32`
//! - `sample_vec2`, `sample_vec3`, `sample_vec4` - same for wider tuples
//!
//! # Bindings
//!
//! | Binding | Name | Contents |
//! |---------|------|----------|
//! | 0 | `module_parameters` | [`ShaderParameterBlock::bytes`] |
//! | 1 | `static_data` | static float pool |
//! | 2 | `parameters` | parameter buffer snapshot |

use crate::shader::ShaderParameterBlock;

/// WGSL code for the counter-based random numbers.
pub const RANDOM_WGSL: &str = r#"
fn pcg4d(seed: vec4<u32>) -> vec4<u32> {
    var v = seed * 1664525u + 1013904223u;
    v.x = v.x + v.y * v.w;
    v.y = v.y + v.z * v.x;
    v.z = v.z + v.x * v.y;
    v.w = v.w + v.y * v.z;
    v = v ^ (v >> vec4<u32>(16u));
    v.x = v.x + v.y * v.w;
    v.y = v.y + v.z * v.x;
    v.z = v.z + v.x * v.y;
    v.w = v.w + v.y * v.z;
    return v;
}

fn unit_float(bits: u32) -> f32 {
    return f32(bits >> 8u) * (1.0 / 16777216.0);
}

fn random_float4_stream(unique_index: u32, emitter_seed: u32, seed: u32, stream: u32) -> vec4<f32> {
    let h = pcg4d(vec4<u32>(unique_index, emitter_seed, seed, stream));
    return vec4<f32>(unit_float(h.x), unit_float(h.y), unit_float(h.z), unit_float(h.w));
}

fn random_float4(unique_index: u32, emitter_seed: u32, seed: u32) -> vec4<f32> {
    return random_float4_stream(unique_index, emitter_seed, seed, 0u);
}

fn random_float(unique_index: u32, emitter_seed: u32, seed: u32) -> f32 {
    return random_float4(unique_index, emitter_seed, seed).x;
}
"#;

/// WGSL storage bindings for the static pool and the parameter buffer.
pub const BINDINGS_WGSL: &str = r#"
@group(0) @binding(1) var<storage, read> static_data: array<f32>;
@group(0) @binding(2) var<storage, read> parameters: array<f32>;
"#;

/// WGSL code to decode and sample a `vec3<u32>` distribution record.
///
/// Requires [`BINDINGS_WGSL`].
pub const DISTRIBUTION_WGSL: &str = r#"
const DIST_UNIFORM_BIT: u32 = 0x80000000u;
const DIST_RANDOM_BIT: u32 = 0x40000000u;
const DIST_BINDING_BIT: u32 = 0x20000000u;

fn dist_is_uniform(d: vec3<u32>) -> bool {
    return (d.x & DIST_UNIFORM_BIT) != 0u;
}

fn dist_is_random(d: vec3<u32>) -> bool {
    return (d.x & DIST_RANDOM_BIT) != 0u;
}

fn dist_is_binding(d: vec3<u32>) -> bool {
    return (d.x & DIST_BINDING_BIT) != 0u;
}

fn dist_offset(d: vec3<u32>) -> u32 {
    return d.x & 0xfffffu;
}

fn dist_last(d: vec3<u32>) -> u32 {
    return (d.x >> 20u) & 0x1ffu;
}

struct CurveCoord {
    index: u32,
    next: u32,
    fraction: f32,
}

fn dist_curve_coord(d: vec3<u32>, time: f32) -> CurveCoord {
    let last = dist_last(d);
    var t = clamp((time - bitcast<f32>(d.y)) * bitcast<f32>(d.z), 0.0, f32(last));
    if (t != t) {
        t = 0.0;
    }
    let index = min(u32(floor(t)), last);
    let next = min(index + 1u, last);
    return CurveCoord(index, next, t - f32(index));
}

fn static_vec2(i: u32) -> vec2<f32> {
    return vec2<f32>(static_data[i], static_data[i + 1u]);
}

fn static_vec3(i: u32) -> vec3<f32> {
    return vec3<f32>(static_data[i], static_data[i + 1u], static_data[i + 2u]);
}

fn static_vec4(i: u32) -> vec4<f32> {
    return vec4<f32>(static_data[i], static_data[i + 1u], static_data[i + 2u], static_data[i + 3u]);
}

fn sample_float(d: vec3<u32>, random: vec4<f32>, time: f32) -> f32 {
    let o = dist_offset(d);
    if (dist_is_binding(d)) {
        return parameters[o];
    }
    if (dist_is_random(d)) {
        let a = static_data[o];
        return a + (static_data[o + 1u] - a) * random.x;
    }
    let c = dist_curve_coord(d, time);
    let a = static_data[o + c.index];
    return a + (static_data[o + c.next] - a) * c.fraction;
}

fn sample_vec2(d: vec3<u32>, random: vec4<f32>, time: f32) -> vec2<f32> {
    let o = dist_offset(d);
    if (dist_is_binding(d)) {
        return vec2<f32>(parameters[o], parameters[o + 1u]);
    }
    if (dist_is_random(d)) {
        let r = select(random.xy, vec2<f32>(random.x), dist_is_uniform(d));
        let a = static_vec2(o);
        return a + (static_vec2(o + 2u) - a) * r;
    }
    let c = dist_curve_coord(d, time);
    let a = static_vec2(o + c.index * 2u);
    return a + (static_vec2(o + c.next * 2u) - a) * c.fraction;
}

fn sample_vec3(d: vec3<u32>, random: vec4<f32>, time: f32) -> vec3<f32> {
    let o = dist_offset(d);
    if (dist_is_binding(d)) {
        return vec3<f32>(parameters[o], parameters[o + 1u], parameters[o + 2u]);
    }
    if (dist_is_random(d)) {
        let r = select(random.xyz, vec3<f32>(random.x), dist_is_uniform(d));
        let a = static_vec3(o);
        return a + (static_vec3(o + 3u) - a) * r;
    }
    let c = dist_curve_coord(d, time);
    let a = static_vec3(o + c.index * 3u);
    return a + (static_vec3(o + c.next * 3u) - a) * c.fraction;
}

fn sample_vec4(d: vec3<u32>, random: vec4<f32>, time: f32) -> vec4<f32> {
    let o = dist_offset(d);
    if (dist_is_binding(d)) {
        return vec4<f32>(parameters[o], parameters[o + 1u], parameters[o + 2u], parameters[o + 3u]);
    }
    if (dist_is_random(d)) {
        let r = select(random, vec4<f32>(random.x), dist_is_uniform(d));
        let a = static_vec4(o);
        return a + (static_vec4(o + 4u) - a) * r;
    }
    let c = dist_curve_coord(d, time);
    let a = static_vec4(o + c.index * 4u);
    return a + (static_vec4(o + c.next * 4u) - a) * c.fraction;
}
"#;

/// Every helper, bindings included.
pub fn all_utils_wgsl() -> String {
    format!("{}\n{}\n{}", RANDOM_WGSL, BINDINGS_WGSL, DISTRIBUTION_WGSL)
}

/// Everything a module kernel needs: the emitter's `ModuleParameters`
/// struct bound at binding 0, followed by [`all_utils_wgsl`].
pub fn kernel_prelude(block: &ShaderParameterBlock) -> String {
    format!(
        "{}\n\n@group(0) @binding(0) var<storage, read> module_parameters: ModuleParameters;\n{}",
        block.wgsl(),
        all_utils_wgsl()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::ParticleAttribute;
    use crate::distribution::{Curve, Distribution};
    use crate::emitter::{BuildOptions, EmitterDefinition};
    use crate::modules::{CameraOffset, InitializeParticle, ShapeLocation};
    use glam::Vec4;

    fn validate_wgsl(code: &str) -> Result<(), String> {
        let module = naga::front::wgsl::parse_str(code).map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(())
    }

    #[test]
    fn test_utils_validate() {
        validate_wgsl(&all_utils_wgsl()).unwrap();
    }

    #[test]
    fn test_random_constants_match_cpu() {
        assert!(RANDOM_WGSL.contains("1664525u"));
        assert!(RANDOM_WGSL.contains("1013904223u"));
        assert!(RANDOM_WGSL.contains("16777216.0"));
    }

    #[test]
    fn test_distribution_masks_match_encoding() {
        let d = crate::BuiltDistribution::random(0x12345, true).unwrap();
        assert_eq!(d.words()[0] & 0x8000_0000, 0x8000_0000);
        assert_eq!(d.words()[0] & 0x4000_0000, 0x4000_0000);
        assert_eq!(d.words()[0] & 0xf_ffff, 0x12345);
        assert_eq!((d.words()[0] >> 20) & 0x1ff, d.table_length());
    }

    #[test]
    fn test_kernel_prelude_validates() {
        let definition = EmitterDefinition {
            attributes: vec![
                ParticleAttribute::Position.current(),
                ParticleAttribute::Color.current(),
                ParticleAttribute::CameraOffset.current(),
            ],
            modules: vec![
                InitializeParticle {
                    color: Distribution::range(Vec4::ZERO, Vec4::ONE),
                    ..Default::default()
                }
                .into(),
                ShapeLocation::default().into(),
                CameraOffset {
                    offset: Distribution::curve(Curve::linear(0.0, 10.0)),
                    ..Default::default()
                }
                .into(),
            ],
            ..Default::default()
        };
        let emitter = definition.build(&BuildOptions::default()).unwrap();
        let block = emitter.shader_parameter_block().unwrap();
        let source = format!(
            "{}\n\n@compute @workgroup_size(64)\nfn main(@builtin(global_invocation_id) id: vec3<u32>) {{\n    let r = random_float4(id.x, 1u, 2u);\n    let d = vec3<u32>(0u, 0u, 0u);\n    let c = sample_vec4(d, r, 0.5);\n}}\n",
            kernel_prelude(block)
        );
        validate_wgsl(&source).unwrap();
    }
}
