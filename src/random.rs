//! Counter-based random numbers.
//!
//! Every random value is a pure hash of
//! `(unique_index, emitter_seed, module_seed + seed_offset)`, so a particle
//! draws the same numbers no matter which batch, thread or device evaluates
//! it. The hash is PCG4D (Jarzynski and Olano, "Hash Functions for GPU
//! Rendering"), mirrored in WGSL by [`RANDOM_WGSL`](crate::shader_utils::RANDOM_WGSL).

use glam::{UVec4, Vec2, Vec3, Vec4};

const PCG_MULTIPLIER: u32 = 1_664_525;
const PCG_INCREMENT: u32 = 1_013_904_223;

/// PCG4D hash of four 32-bit words.
#[inline]
pub fn pcg4d(v: UVec4) -> UVec4 {
    let mut x = v.x.wrapping_mul(PCG_MULTIPLIER).wrapping_add(PCG_INCREMENT);
    let mut y = v.y.wrapping_mul(PCG_MULTIPLIER).wrapping_add(PCG_INCREMENT);
    let mut z = v.z.wrapping_mul(PCG_MULTIPLIER).wrapping_add(PCG_INCREMENT);
    let mut w = v.w.wrapping_mul(PCG_MULTIPLIER).wrapping_add(PCG_INCREMENT);

    x = x.wrapping_add(y.wrapping_mul(w));
    y = y.wrapping_add(z.wrapping_mul(x));
    z = z.wrapping_add(x.wrapping_mul(y));
    w = w.wrapping_add(y.wrapping_mul(z));

    x ^= x >> 16;
    y ^= y >> 16;
    z ^= z >> 16;
    w ^= w >> 16;

    x = x.wrapping_add(y.wrapping_mul(w));
    y = y.wrapping_add(z.wrapping_mul(x));
    z = z.wrapping_add(x.wrapping_mul(y));
    w = w.wrapping_add(y.wrapping_mul(z));

    UVec4::new(x, y, z, w)
}

/// Map the top 24 bits of a hash word to `[0, 1)`.
#[inline]
pub fn unit_float(bits: u32) -> f32 {
    (bits >> 8) as f32 * (1.0 / 16_777_216.0)
}

/// Four random floats in `[0, 1)` for one particle and seed.
#[inline]
pub fn random_float4(unique_index: u32, emitter_seed: u32, seed: u32) -> Vec4 {
    random_float4_stream(unique_index, emitter_seed, seed, 0)
}

/// Four random floats from an independent `stream` of one seed.
///
/// The stream is hashed as the fourth word, so it never reaches into the
/// seed space of another module. Stream 0 is [`random_float4`].
#[inline]
pub fn random_float4_stream(unique_index: u32, emitter_seed: u32, seed: u32, stream: u32) -> Vec4 {
    let h = pcg4d(UVec4::new(unique_index, emitter_seed, seed, stream));
    Vec4::new(unit_float(h.x), unit_float(h.y), unit_float(h.z), unit_float(h.w))
}

/// One random float in `[0, 1)`; equal to `random_float4(..).x`.
#[inline]
pub fn random_float(unique_index: u32, emitter_seed: u32, seed: u32) -> f32 {
    random_float4(unique_index, emitter_seed, seed).x
}

#[inline]
pub fn random_float2(unique_index: u32, emitter_seed: u32, seed: u32) -> Vec2 {
    random_float4(unique_index, emitter_seed, seed).truncate().truncate()
}

#[inline]
pub fn random_float3(unique_index: u32, emitter_seed: u32, seed: u32) -> Vec3 {
    random_float4(unique_index, emitter_seed, seed).truncate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streams_are_independent() {
        assert_eq!(random_float4_stream(3, 1, 257, 0), random_float4(3, 1, 257));
        let a = random_float4_stream(3, 1, 257, 255);
        assert_ne!(a, random_float4(3, 1, 257 + 255));
        assert_ne!(a, random_float4_stream(3, 1, 257, 256));
    }

    #[test]
    fn test_pcg4d_is_pure() {
        let a = pcg4d(UVec4::new(7, 11, 13, 0));
        let b = pcg4d(UVec4::new(7, 11, 13, 0));
        assert_eq!(a, b);
        assert_ne!(a, pcg4d(UVec4::new(8, 11, 13, 0)));
    }

    #[test]
    fn test_unit_float_range() {
        assert_eq!(unit_float(0), 0.0);
        assert!(unit_float(u32::MAX) < 1.0);
    }

    #[test]
    fn test_random_mean_is_centered() {
        let n = 20_000;
        let sum: f32 = (0..n).map(|i| random_float(i, 99, 3)).sum();
        let mean = sum / n as f32;
        assert!((mean - 0.5).abs() < 0.02, "mean was {}", mean);
    }

    #[test]
    fn test_narrower_draws_are_prefixes() {
        let v4 = random_float4(5, 6, 7);
        assert_eq!(random_float(5, 6, 7), v4.x);
        assert_eq!(random_float3(5, 6, 7), v4.truncate());
    }
}
