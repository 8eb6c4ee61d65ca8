//! Per-particle evaluation of compiled distributions.

use crate::distribution::{BuiltDistribution, DistributionValue};
use glam::Vec4;
use std::marker::PhantomData;

/// Resolves one [`BuiltDistribution`] for one particle.
///
/// Construct it once per particle per distribution (the random draw happens
/// here, only for random distributions), then call [`sample`](Self::sample)
/// at as many normalized ages as needed.
#[derive(Clone, Copy, Debug)]
pub struct DistributionSampler<'a, T> {
    distribution: BuiltDistribution,
    static_data: &'a [f32],
    parameters: &'a [f32],
    random: Vec4,
    _marker: PhantomData<T>,
}

impl<'a, T: DistributionValue> DistributionSampler<'a, T> {
    pub fn new(
        distribution: BuiltDistribution,
        static_data: &'a [f32],
        parameters: &'a [f32],
        random: Vec4,
    ) -> Self {
        Self {
            distribution,
            static_data,
            parameters,
            random,
            _marker: PhantomData,
        }
    }

    /// Value at `time` (normalized age for curves; ignored otherwise).
    #[inline]
    pub fn sample(&self, time: f32) -> T {
        let d = &self.distribution;
        if d.is_binding() {
            read_tuple(self.parameters, d.data_offset() as usize, 0)
        } else if d.is_random() {
            let offset = d.data_offset() as usize;
            let min: T = read_tuple(self.static_data, offset, 0);
            let max: T = read_tuple(self.static_data, offset, 1);
            if d.is_uniform() {
                T::lerp(min, max, self.random.x)
            } else {
                T::lerp_components(min, max, self.random)
            }
        } else {
            sample_curve(d, self.static_data, time)
        }
    }
}

/// Curve lookup: clamp `(time - bias) * scale` to the table and interpolate
/// between the surrounding entries.
#[inline]
pub fn sample_curve<T: DistributionValue>(
    distribution: &BuiltDistribution,
    static_data: &[f32],
    time: f32,
) -> T {
    let last = distribution.table_length();
    let t = ((time - distribution.bias()) * distribution.scale()).clamp(0.0, last as f32);
    // NaN times clamp to NaN; treat them as the first entry
    let t = if t.is_nan() { 0.0 } else { t };
    let index = (t.floor() as u32).min(last);
    let next = (index + 1).min(last);
    let fraction = t - index as f32;

    let offset = distribution.data_offset() as usize;
    let a: T = read_tuple(static_data, offset, index as usize);
    let b: T = read_tuple(static_data, offset, next as usize);
    T::lerp(a, b, fraction)
}

#[inline]
fn read_tuple<T: DistributionValue>(data: &[f32], offset: usize, index: usize) -> T {
    let start = offset + index * T::COMPONENTS;
    data.get(start..start + T::COMPONENTS)
        .map(T::from_components)
        .unwrap_or_default()
}
