//! Authored distributions and their compiled 3-word encoding.
//!
//! Modules describe most of their inputs as a [`Distribution`]: a constant,
//! a random range, a curve over normalized age, or a value that comes from a
//! live parameter. The build compiles each one into a [`BuiltDistribution`]
//! record that points into the static float pool (or the parameter buffer).
//!
//! # Encoding
//!
//! ```text
//! word 0:  31      30      29       28..20          19..0
//!         Uniform  Random  Binding  table_len - 1   data offset
//! word 1:  bias   (f32 bits)
//! word 2:  scale  (f32 bits)
//! ```
//!
//! | Flags | Meaning | Data |
//! |-------|---------|------|
//! | Random + Uniform | one random drives every component | 2 tuples: min, max |
//! | Random | independent random per component | 2 tuples: min, max |
//! | Binding | live parameter, `scale = 1.0` | parameter word offset |
//! | none | curve lookup at `(t - bias) * scale` | `table_len` tuples |

use crate::attributes::INDEX_NONE;
use crate::error::BuildError;
use crate::parameters::ParameterExpression;
use crate::shader::GpuLayout;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::fmt;

const UNIFORM_BIT: u32 = 1 << 31;
const RANDOM_BIT: u32 = 1 << 30;
const BINDING_BIT: u32 = 1 << 29;
const LENGTH_SHIFT: u32 = 20;
const LENGTH_MASK: u32 = 0x1ff;
const OFFSET_MASK: u32 = 0xf_ffff;

/// Largest number of entries a curve table can hold.
pub const MAX_TABLE_LENGTH: usize = 512;
/// First offset that no longer fits the 20-bit offset field.
pub const MAX_DATA_OFFSET: usize = 1 << 20;

/// Compiled 3-word distribution record, identical on CPU and GPU.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct BuiltDistribution([u32; 3]);

impl BuiltDistribution {
    /// A random range of two tuples stored at `offset` in the static pool.
    pub fn random(offset: usize, uniform: bool) -> Result<Self, BuildError> {
        let mut flags = RANDOM_BIT;
        if uniform {
            flags |= UNIFORM_BIT;
        }
        Ok(Self([flags | (1 << LENGTH_SHIFT) | checked_offset(offset)?, 0, 0]))
    }

    /// A lookup table of `length` tuples stored at `offset`.
    ///
    /// `length` must be within `2..=512`.
    pub fn curve(offset: usize, length: usize, bias: f32, scale: f32) -> Result<Self, BuildError> {
        debug_assert!((2..=MAX_TABLE_LENGTH).contains(&length));
        let length_bits = ((length.clamp(1, MAX_TABLE_LENGTH) - 1) as u32) & LENGTH_MASK;
        Ok(Self([
            (length_bits << LENGTH_SHIFT) | checked_offset(offset)?,
            bias.to_bits(),
            scale.to_bits(),
        ]))
    }

    /// A live parameter stored at `word_offset` in the parameter buffer.
    pub fn binding(word_offset: usize) -> Result<Self, BuildError> {
        Ok(Self([BINDING_BIT | checked_offset(word_offset)?, 0, 1.0f32.to_bits()]))
    }

    /// Reinterpret raw words.
    #[inline]
    pub const fn from_words(words: [u32; 3]) -> Self {
        Self(words)
    }

    #[inline]
    pub const fn words(&self) -> [u32; 3] {
        self.0
    }

    #[inline]
    pub const fn is_uniform(&self) -> bool {
        self.0[0] & UNIFORM_BIT != 0
    }

    #[inline]
    pub const fn is_random(&self) -> bool {
        self.0[0] & RANDOM_BIT != 0
    }

    #[inline]
    pub const fn is_binding(&self) -> bool {
        self.0[0] & BINDING_BIT != 0
    }

    /// The encoded length field: number of entries minus one.
    #[inline]
    pub const fn table_length(&self) -> u32 {
        (self.0[0] >> LENGTH_SHIFT) & LENGTH_MASK
    }

    /// Static pool offset, or parameter word offset for bindings.
    #[inline]
    pub const fn data_offset(&self) -> u32 {
        self.0[0] & OFFSET_MASK
    }

    #[inline]
    pub fn bias(&self) -> f32 {
        f32::from_bits(self.0[1])
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        f32::from_bits(self.0[2])
    }
}

fn checked_offset(offset: usize) -> Result<u32, BuildError> {
    if offset >= MAX_DATA_OFFSET {
        return Err(BuildError::DataOffsetOverflow { offset });
    }
    Ok(offset as u32)
}

impl fmt::Debug for BuiltDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltDistribution")
            .field("uniform", &self.is_uniform())
            .field("random", &self.is_random())
            .field("binding", &self.is_binding())
            .field("table_length", &self.table_length())
            .field("data_offset", &self.data_offset())
            .field("bias", &self.bias())
            .field("scale", &self.scale())
            .finish()
    }
}

impl GpuLayout for BuiltDistribution {
    const WGSL_TYPE: &'static str = "vec3<u32>";
    const GPU_ALIGN: u32 = 16;
    const GPU_SIZE: u32 = 12;

    fn write_gpu(&self, out: &mut Vec<u8>) {
        for word in self.0 {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
}

/// A numeric type a distribution can produce.
pub trait DistributionValue: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Number of f32 components.
    const COMPONENTS: usize;

    /// Build from the first `COMPONENTS` floats of `c`.
    fn from_components(c: &[f32]) -> Self;

    /// Append the components to `out`.
    fn push_components(self, out: &mut Vec<f32>);

    /// Every component set to `v`.
    fn splat(v: f32) -> Self;

    /// `a + (b - a) * t` with one `t` for every component.
    fn lerp(a: Self, b: Self, t: f32) -> Self;

    /// `a + (b - a) * t` with one `t` per component.
    fn lerp_components(a: Self, b: Self, t: Vec4) -> Self;

    fn component_min(a: Self, b: Self) -> Self;

    fn component_max(a: Self, b: Self) -> Self;
}

impl DistributionValue for f32 {
    const COMPONENTS: usize = 1;

    #[inline]
    fn from_components(c: &[f32]) -> Self {
        c[0]
    }

    #[inline]
    fn push_components(self, out: &mut Vec<f32>) {
        out.push(self);
    }

    #[inline]
    fn splat(v: f32) -> Self {
        v
    }

    #[inline]
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        a + (b - a) * t
    }

    #[inline]
    fn lerp_components(a: Self, b: Self, t: Vec4) -> Self {
        a + (b - a) * t.x
    }

    #[inline]
    fn component_min(a: Self, b: Self) -> Self {
        a.min(b)
    }

    #[inline]
    fn component_max(a: Self, b: Self) -> Self {
        a.max(b)
    }
}

macro_rules! vector_distribution_value {
    ($ty:ty, $n:literal, $narrow:expr) => {
        impl DistributionValue for $ty {
            const COMPONENTS: usize = $n;

            #[inline]
            fn from_components(c: &[f32]) -> Self {
                <$ty>::from_slice(&c[..$n])
            }

            #[inline]
            fn push_components(self, out: &mut Vec<f32>) {
                out.extend_from_slice(&self.to_array());
            }

            #[inline]
            fn splat(v: f32) -> Self {
                <$ty>::splat(v)
            }

            #[inline]
            fn lerp(a: Self, b: Self, t: f32) -> Self {
                a + (b - a) * t
            }

            #[inline]
            fn lerp_components(a: Self, b: Self, t: Vec4) -> Self {
                let narrow: fn(Vec4) -> $ty = $narrow;
                a + (b - a) * narrow(t)
            }

            #[inline]
            fn component_min(a: Self, b: Self) -> Self {
                a.min(b)
            }

            #[inline]
            fn component_max(a: Self, b: Self) -> Self {
                a.max(b)
            }
        }
    };
}

vector_distribution_value!(Vec2, 2, |t| t.truncate().truncate());
vector_distribution_value!(Vec3, 3, |t| t.truncate());
vector_distribution_value!(Vec4, 4, |t| t);

/// One key of a piecewise-linear curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveKey<T> {
    pub time: f32,
    pub value: T,
}

/// A piecewise-linear curve, usually over normalized age.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Curve<T> {
    pub keys: Vec<CurveKey<T>>,
    /// Lookup table size for this curve; the build-wide resolution when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lut_resolution: Option<usize>,
}

impl<T: DistributionValue> Curve<T> {
    /// Curve through `(time, value)` pairs. Keys are sorted by time.
    pub fn new(keys: impl IntoIterator<Item = (f32, T)>) -> Self {
        let mut keys: Vec<CurveKey<T>> = keys
            .into_iter()
            .map(|(time, value)| CurveKey { time, value })
            .collect();
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            keys,
            lut_resolution: None,
        }
    }

    /// Straight line from `from` at 0 to `to` at 1.
    pub fn linear(from: T, to: T) -> Self {
        Self::new([(0.0, from), (1.0, to)])
    }

    /// Override the lookup table size.
    pub fn with_lut_resolution(mut self, resolution: usize) -> Self {
        self.lut_resolution = Some(resolution);
        self
    }

    /// Evaluate the curve, holding the end values outside the key range.
    pub fn evaluate(&self, time: f32) -> T {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return T::default(),
        };
        if time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }
        for pair in self.keys.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if time <= b.time {
                let span = b.time - a.time;
                if span <= 0.0 {
                    return b.value;
                }
                return T::lerp(a.value, b.value, (time - a.time) / span);
            }
        }
        last.value
    }

    /// Sample the curve into a lookup table.
    ///
    /// Returns the tuples plus `(bias, scale)` for the record. Zero keys give
    /// two copies of `default`; one key gives two copies of its value.
    pub fn to_lut(&self, resolution: usize, default: T) -> (Vec<T>, f32, f32) {
        match self.keys.as_slice() {
            [] => (vec![default; 2], 0.0, 0.0),
            [only] => (vec![only.value; 2], only.time, 0.0),
            [first, .., last] => {
                let count = resolution.clamp(2, MAX_TABLE_LENGTH);
                let (t_min, t_max) = (first.time, last.time);
                let duration = t_max - t_min;
                let values = (0..count)
                    .map(|i| {
                        if i + 1 == count {
                            last.value
                        } else {
                            self.evaluate(t_min + duration * i as f32 / (count - 1) as f32)
                        }
                    })
                    .collect();
                let scale = if duration > 0.0 {
                    (count - 1) as f32 / duration
                } else {
                    0.0
                };
                (values, t_min, scale)
            }
        }
    }

    /// Componentwise bounds over all keys.
    pub fn bounds(&self) -> Option<(T, T)> {
        let mut keys = self.keys.iter();
        let first = keys.next()?.value;
        Some(keys.fold((first, first), |(lo, hi), k| {
            (T::component_min(lo, k.value), T::component_max(hi, k.value))
        }))
    }
}

/// An authored value source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Distribution<T> {
    /// A renderer binding read from the parameter buffer.
    Binding(String),
    /// An expression over renderer bindings, evaluated once per frame.
    ///
    /// Every binding it reads must be declared or bound somewhere in the emitter.
    Expression(ParameterExpression),
    /// One scalar applied to every component.
    UniformConstant(f32),
    NonUniformConstant(T),
    /// One random scalar between `min` and `max` applied to every component.
    UniformRange { min: f32, max: f32 },
    /// Independent random per component.
    NonUniformRange { min: T, max: T },
    /// A scalar curve applied to every component.
    UniformCurve(Curve<f32>),
    NonUniformCurve(Curve<T>),
}

impl<T: DistributionValue> Distribution<T> {
    pub fn constant(value: T) -> Self {
        Distribution::NonUniformConstant(value)
    }

    pub fn uniform_range(min: f32, max: f32) -> Self {
        Distribution::UniformRange { min, max }
    }

    pub fn range(min: T, max: T) -> Self {
        Distribution::NonUniformRange { min, max }
    }

    pub fn curve(curve: Curve<T>) -> Self {
        Distribution::NonUniformCurve(curve)
    }

    pub fn binding(name: impl Into<String>) -> Self {
        Distribution::Binding(name.into())
    }

    /// Whether the value varies with time or comes from a parameter.
    pub fn is_curve(&self) -> bool {
        matches!(
            self,
            Distribution::UniformCurve(_) | Distribution::NonUniformCurve(_)
        )
    }

    /// Whether the value comes from the parameter buffer.
    pub fn is_binding(&self) -> bool {
        matches!(self, Distribution::Binding(_) | Distribution::Expression(_))
    }
}

impl<T: DistributionValue> Default for Distribution<T> {
    fn default() -> Self {
        Distribution::NonUniformConstant(T::default())
    }
}

/// Plain min/max range for modules that do not need a full sampler.
///
/// A range reduced from a binding or expression has zero bounds and carries
/// the parameter's word offset; kernels add the live value on top of
/// [`lerp`](Self::lerp).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ValueRange<T> {
    pub min: T,
    pub max: T,
    pub binding: Option<u32>,
}

impl<T: DistributionValue> ValueRange<T> {
    pub fn constant(value: T) -> Self {
        Self::new(value, value)
    }

    pub fn new(min: T, max: T) -> Self {
        Self {
            min,
            max,
            binding: None,
        }
    }

    /// Range read entirely from the parameter at `offset`.
    pub fn bound(offset: u32) -> Self {
        Self {
            min: T::default(),
            max: T::default(),
            binding: Some(offset),
        }
    }

    /// Parameter word offset for built data, `INDEX_NONE` when unbound.
    #[inline]
    pub fn binding_offset(&self) -> i32 {
        self.binding.map_or(INDEX_NONE, |offset| offset as i32)
    }

    #[inline]
    pub fn lerp(&self, t: f32) -> T {
        T::lerp(self.min, self.max, t)
    }
}
