//! CPU gradient noise for the curl-noise force.
//!
//! `noise3` is 3D simplex noise (Ashima Arts / Stefan Gustavson) and returns
//! values in roughly `[-1, 1]`. `curl_noise3` differentiates three offset
//! noise fields, giving a divergence-free vector field.

use glam::{Vec3, Vec3Swizzles, Vec4, Vec4Swizzles};

const CURL_EPSILON: f32 = 1e-2;
const POTENTIAL_OFFSET_Y: Vec3 = Vec3::new(31.416, -47.853, 12.793);
const POTENTIAL_OFFSET_Z: Vec3 = Vec3::new(-233.145, -113.408, -185.31);

#[inline]
fn mod289_3(x: Vec3) -> Vec3 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

#[inline]
fn mod289_4(x: Vec4) -> Vec4 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

#[inline]
fn permute4(x: Vec4) -> Vec4 {
    mod289_4((x * 34.0 + 1.0) * x)
}

#[inline]
fn taylor_inv_sqrt4(r: Vec4) -> Vec4 {
    Vec4::splat(1.792_842_9) - 0.853_734_7 * r
}

/// `1.0` where `edge <= x`, else `0.0`.
#[inline]
fn step3(edge: Vec3, x: Vec3) -> Vec3 {
    Vec3::select(edge.cmple(x), Vec3::ONE, Vec3::ZERO)
}

#[inline]
fn step4(edge: Vec4, x: Vec4) -> Vec4 {
    Vec4::select(edge.cmple(x), Vec4::ONE, Vec4::ZERO)
}

/// 3D simplex noise.
pub fn noise3(v: Vec3) -> f32 {
    const C_X: f32 = 1.0 / 6.0;
    const C_Y: f32 = 1.0 / 3.0;

    // First corner
    let mut i = (v + Vec3::splat(v.dot(Vec3::splat(C_Y)))).floor();
    let x0 = v - i + Vec3::splat(i.dot(Vec3::splat(C_X)));

    // Other corners
    let g = step3(x0.yzx(), x0);
    let l = Vec3::ONE - g;
    let i1 = g.min(l.zxy());
    let i2 = g.max(l.zxy());

    let x1 = x0 - i1 + C_X;
    let x2 = x0 - i2 + C_Y;
    let x3 = x0 - 0.5;

    // Permutations
    i = mod289_3(i);
    let p = permute4(
        permute4(
            permute4(Vec4::splat(i.z) + Vec4::new(0.0, i1.z, i2.z, 1.0))
                + Vec4::splat(i.y)
                + Vec4::new(0.0, i1.y, i2.y, 1.0),
        ) + Vec4::splat(i.x)
            + Vec4::new(0.0, i1.x, i2.x, 1.0),
    );

    // Gradients: 7x7 points over a square, mapped onto an octahedron
    let n_ = 0.142_857_15;
    let ns = Vec3::new(2.0 * n_, 0.5 * n_ - 1.0, n_);

    let j = p - 49.0 * (p * ns.z * ns.z).floor();
    let x_ = (j * ns.z).floor();
    let y_ = (j - 7.0 * x_).floor();

    let x = x_ * ns.x + ns.y;
    let y = y_ * ns.x + ns.y;
    let h = Vec4::ONE - x.abs() - y.abs();

    let b0 = Vec4::new(x.x, x.y, y.x, y.y);
    let b1 = Vec4::new(x.z, x.w, y.z, y.w);

    let s0 = b0.floor() * 2.0 + 1.0;
    let s1 = b1.floor() * 2.0 + 1.0;
    let sh = -step4(h, Vec4::ZERO);

    let a0 = b0.xzyw() + s0.xzyw() * sh.xxyy();
    let a1 = b1.xzyw() + s1.xzyw() * sh.zzww();

    let mut p0 = Vec3::new(a0.x, a0.y, h.x);
    let mut p1 = Vec3::new(a0.z, a0.w, h.y);
    let mut p2 = Vec3::new(a1.x, a1.y, h.z);
    let mut p3 = Vec3::new(a1.z, a1.w, h.w);

    let norm = taylor_inv_sqrt4(Vec4::new(p0.dot(p0), p1.dot(p1), p2.dot(p2), p3.dot(p3)));
    p0 *= norm.x;
    p1 *= norm.y;
    p2 *= norm.z;
    p3 *= norm.w;

    // Mix final noise value
    let m = (Vec4::splat(0.6) - Vec4::new(x0.dot(x0), x1.dot(x1), x2.dot(x2), x3.dot(x3)))
        .max(Vec4::ZERO);
    let m = m * m;
    42.0 * (m * m).dot(Vec4::new(p0.dot(x0), p1.dot(x1), p2.dot(x2), p3.dot(x3)))
}

fn potential(p: Vec3) -> Vec3 {
    Vec3::new(
        noise3(p),
        noise3(p + POTENTIAL_OFFSET_Y),
        noise3(p + POTENTIAL_OFFSET_Z),
    )
}

/// Curl of a noise potential field, by central differences.
pub fn curl_noise3(p: Vec3) -> Vec3 {
    let dx = Vec3::new(CURL_EPSILON, 0.0, 0.0);
    let dy = Vec3::new(0.0, CURL_EPSILON, 0.0);
    let dz = Vec3::new(0.0, 0.0, CURL_EPSILON);

    let d_dx = potential(p + dx) - potential(p - dx);
    let d_dy = potential(p + dy) - potential(p - dy);
    let d_dz = potential(p + dz) - potential(p - dz);

    Vec3::new(d_dy.z - d_dz.y, d_dz.x - d_dx.z, d_dx.y - d_dy.x) / (2.0 * CURL_EPSILON)
}
