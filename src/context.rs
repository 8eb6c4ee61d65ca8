//! The per-batch runtime handed to every module kernel.
//!
//! A [`ParticleSimulationContext`] is created for one batch, runs the exec
//! list in order and is dropped. It is the only thing a kernel sees:
//!
//! | Accessor | Purpose |
//! |----------|---------|
//! | [`age`](ParticleSimulationContext::age), [`normalized_age`](ParticleSimulationContext::normalized_age), ... | required columns |
//! | [`read_particle_variable`](ParticleSimulationContext::read_particle_variable) | optional column, default on `INDEX_NONE` |
//! | [`write_particle_variable`](ParticleSimulationContext::write_particle_variable) | optional column, no-op on `INDEX_NONE` |
//! | [`random_float`](ParticleSimulationContext::random_float) and friends | deterministic per-particle randoms |
//! | [`distribution_sampler`](ParticleSimulationContext::distribution_sampler) | compiled distributions |
//! | [`read_built_data`](ParticleSimulationContext::read_built_data) | the running module's built data |
//!
//! # Example
//!
//! ```ignore
//! fn simulate(ctx: &mut ParticleSimulationContext) {
//!     let data: ScaleColorBuiltData = ctx.read_built_data();
//!     for i in 0..ctx.num_instances() {
//!         let color: Vec4 = ctx.read_particle_variable(data.color_offset, i, Vec4::ONE);
//!         let scale: Vec4 = ctx.sample_curve(&data.scale, ctx.normalized_age(i));
//!         ctx.write_particle_variable(data.color_offset, i, color * scale);
//!     }
//! }
//! ```

use crate::attributes::{
    ParticleVariableOffset, AGE_COMPONENT, INDEX_NONE, LIFETIME_COMPONENT, NORMALIZED_AGE_COMPONENT,
    PREVIOUS_NORMALIZED_AGE_COMPONENT, UNIQUE_INDEX_COMPONENT,
};
use crate::batch::{ParticleBatch, ParticleValue};
use crate::distribution::{BuiltDistribution, DistributionValue};
use crate::parameters::ParameterBuffer;
use crate::random;
use crate::sampler::{self, DistributionSampler};
use crate::space::{CoordinateSpace, SpaceTransforms};
use bytemuck::Pod;
use glam::{Quat, Vec2, Vec3, Vec4};

/// Per-batch simulation state.
pub struct ParticleSimulationContext<'a> {
    batch: &'a mut ParticleBatch,
    built_data: &'a [u8],
    static_data: &'a [f32],
    parameters: &'a ParameterBuffer,
    spaces: SpaceTransforms,
    emitter_seed: u32,
    module_seed: u32,
    data_offset: usize,
    delta_time: f32,
    inv_delta_time: f32,
}

impl<'a> ParticleSimulationContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        batch: &'a mut ParticleBatch,
        built_data: &'a [u8],
        static_data: &'a [f32],
        parameters: &'a ParameterBuffer,
        spaces: SpaceTransforms,
        emitter_seed: u32,
        delta_time: f32,
    ) -> Self {
        let inv_delta_time = if delta_time > 0.0 { 1.0 / delta_time } else { 0.0 };
        Self {
            batch,
            built_data,
            static_data,
            parameters,
            spaces,
            emitter_seed,
            module_seed: 0,
            data_offset: 0,
            delta_time,
            inv_delta_time,
        }
    }

    /// Point the context at the next exec entry.
    pub(crate) fn set_module(&mut self, data_offset: usize, module_seed: u32) {
        self.data_offset = data_offset;
        self.module_seed = module_seed;
    }

    #[inline]
    pub fn num_instances(&self) -> usize {
        self.batch.len()
    }

    #[inline]
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    #[inline]
    pub fn inv_delta_time(&self) -> f32 {
        self.inv_delta_time
    }

    #[inline]
    pub fn emitter_seed(&self) -> u32 {
        self.emitter_seed
    }

    // Required columns

    pub fn ages(&self) -> &[f32] {
        self.batch.float_column(AGE_COMPONENT)
    }

    pub fn lifetimes(&self) -> &[f32] {
        self.batch.float_column(LIFETIME_COMPONENT)
    }

    pub fn normalized_ages(&self) -> &[f32] {
        self.batch.float_column(NORMALIZED_AGE_COMPONENT)
    }

    pub fn previous_normalized_ages(&self) -> &[f32] {
        self.batch.float_column(PREVIOUS_NORMALIZED_AGE_COMPONENT)
    }

    #[inline]
    pub fn age(&self, i: usize) -> f32 {
        self.batch.float(AGE_COMPONENT, i)
    }

    #[inline]
    pub fn lifetime(&self, i: usize) -> f32 {
        self.batch.float(LIFETIME_COMPONENT, i)
    }

    #[inline]
    pub fn normalized_age(&self, i: usize) -> f32 {
        self.batch.float(NORMALIZED_AGE_COMPONENT, i)
    }

    #[inline]
    pub fn previous_normalized_age(&self, i: usize) -> f32 {
        self.batch.float(PREVIOUS_NORMALIZED_AGE_COMPONENT, i)
    }

    /// Age at the previous normalized age.
    #[inline]
    pub fn previous_age(&self, i: usize) -> f32 {
        self.previous_normalized_age(i) * self.lifetime(i)
    }

    #[inline]
    pub fn unique_index(&self, i: usize) -> u32 {
        self.batch.int(UNIQUE_INDEX_COMPONENT, i) as u32
    }

    // Optional columns

    /// Read an optional variable; returns `default` when `offset` is `INDEX_NONE`.
    #[inline]
    pub fn read_particle_variable<T: ParticleValue>(
        &self,
        offset: ParticleVariableOffset,
        i: usize,
        default: T,
    ) -> T {
        T::read_or(self.batch, offset, i, default)
    }

    /// Write an optional variable; does nothing when `offset` is `INDEX_NONE`.
    #[inline]
    pub fn write_particle_variable<T: ParticleValue>(
        &mut self,
        offset: ParticleVariableOffset,
        i: usize,
        value: T,
    ) {
        if offset != INDEX_NONE {
            value.store(self.batch, offset as usize, i);
        }
    }

    // Randoms

    #[inline]
    fn seed(&self, seed_offset: u32) -> u32 {
        self.module_seed.wrapping_add(seed_offset)
    }

    #[inline]
    pub fn random_float(&self, i: usize, seed_offset: u32) -> f32 {
        random::random_float(self.unique_index(i), self.emitter_seed, self.seed(seed_offset))
    }

    #[inline]
    pub fn random_float2(&self, i: usize, seed_offset: u32) -> Vec2 {
        random::random_float2(self.unique_index(i), self.emitter_seed, self.seed(seed_offset))
    }

    #[inline]
    pub fn random_float3(&self, i: usize, seed_offset: u32) -> Vec3 {
        random::random_float3(self.unique_index(i), self.emitter_seed, self.seed(seed_offset))
    }

    #[inline]
    pub fn random_float4(&self, i: usize, seed_offset: u32) -> Vec4 {
        random::random_float4(self.unique_index(i), self.emitter_seed, self.seed(seed_offset))
    }

    /// Random float from stream `stream` of one seed offset.
    #[inline]
    pub fn random_float_stream(&self, i: usize, seed_offset: u32, stream: u32) -> f32 {
        random::random_float4_stream(self.unique_index(i), self.emitter_seed, self.seed(seed_offset), stream).x
    }

    // Distributions

    /// Sampler for one particle; draws randoms only for random distributions.
    #[inline]
    pub fn distribution_sampler<T: DistributionValue>(
        &self,
        distribution: &BuiltDistribution,
        i: usize,
        seed_offset: u32,
    ) -> DistributionSampler<'a, T> {
        let random = if distribution.is_random() {
            self.random_float4(i, seed_offset)
        } else {
            Vec4::ZERO
        };
        let parameters: &'a ParameterBuffer = self.parameters;
        DistributionSampler::new(*distribution, self.static_data, parameters.as_slice(), random)
    }

    /// Table lookup outside the standard sampler.
    #[inline]
    pub fn sample_curve<T: DistributionValue>(&self, distribution: &BuiltDistribution, time: f32) -> T {
        sampler::sample_curve(distribution, self.static_data, time)
    }

    /// Raw static pool access for modules with custom tables.
    #[inline]
    pub fn static_data(&self) -> &'a [f32] {
        self.static_data
    }

    // Parameters and spaces

    #[inline]
    pub fn parameter_float(&self, word_offset: usize) -> f32 {
        self.parameters.float(word_offset)
    }

    /// Parameter tuple at `word_offset`, zero for `INDEX_NONE`.
    #[inline]
    pub fn parameter_value<T: DistributionValue>(&self, word_offset: i32) -> T {
        if word_offset == INDEX_NONE {
            return T::default();
        }
        let start = word_offset as usize;
        self.parameters
            .as_slice()
            .get(start..start + T::COMPONENTS)
            .map(T::from_components)
            .unwrap_or_default()
    }

    #[inline]
    pub fn to_simulation_rotation(&self, space: CoordinateSpace) -> Quat {
        self.spaces.to_simulation_rotation(space)
    }

    #[inline]
    pub fn to_simulation_position(&self, space: CoordinateSpace, position: Vec3) -> Vec3 {
        self.spaces.to_simulation_position(space, position)
    }

    #[inline]
    pub fn to_simulation_vector(&self, space: CoordinateSpace, vector: Vec3) -> Vec3 {
        self.spaces.to_simulation_vector(space, vector)
    }

    /// Built data of the running module.
    #[inline]
    pub fn read_built_data<T: Pod>(&self) -> T {
        let size = std::mem::size_of::<T>();
        bytemuck::pod_read_unaligned(&self.built_data[self.data_offset..self.data_offset + size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{ParticleAttribute, ParticleLayout};
    use std::sync::Arc;

    fn batch() -> ParticleBatch {
        let layout = ParticleLayout::new([ParticleAttribute::Color.current()]);
        let mut batch = ParticleBatch::new(Arc::new(layout), 4);
        batch.push(10, 1.0, 4.0, 0.5);
        batch.push(11, 2.0, 4.0, 0.5);
        batch
    }

    #[test]
    fn test_sentinel_read_and_write() {
        let mut batch = batch();
        let params = ParameterBuffer::empty();
        let mut ctx = ParticleSimulationContext::new(&mut batch, &[], &[], &params, SpaceTransforms::default(), 1, 0.5);
        assert_eq!(ctx.read_particle_variable(INDEX_NONE, 0, 3.0f32), 3.0);
        ctx.write_particle_variable(INDEX_NONE, 0, Vec3::ONE);
        ctx.write_particle_variable(4, 1, Vec4::splat(0.5));
        assert_eq!(ctx.read_particle_variable(4, 1, Vec4::ZERO), Vec4::splat(0.5));
    }

    #[test]
    fn test_required_columns() {
        let mut batch = batch();
        let params = ParameterBuffer::empty();
        let ctx = ParticleSimulationContext::new(&mut batch, &[], &[], &params, SpaceTransforms::default(), 1, 0.5);
        assert_eq!(ctx.num_instances(), 2);
        assert_eq!(ctx.normalized_ages(), &[0.25, 0.5]);
        assert_eq!(ctx.previous_age(1), 1.5);
        assert_eq!(ctx.unique_index(1), 11);
        assert_eq!(ctx.inv_delta_time(), 2.0);
    }

    #[test]
    fn test_randoms_follow_unique_index_and_module() {
        let mut batch = batch();
        let params = ParameterBuffer::empty();
        let mut ctx = ParticleSimulationContext::new(&mut batch, &[], &[], &params, SpaceTransforms::default(), 1, 0.5);
        ctx.set_module(0, 256);
        assert_eq!(ctx.random_float(0, 3), random::random_float(10, 1, 259));
        assert_ne!(ctx.random_float(0, 3), ctx.random_float(1, 3));
    }

    #[test]
    fn test_read_built_data_is_unaligned_safe() {
        let mut batch = batch();
        let params = ParameterBuffer::empty();
        let mut blob = vec![0u8; 3];
        blob.extend_from_slice(&42u32.to_le_bytes());
        let mut ctx = ParticleSimulationContext::new(&mut batch, &blob, &[], &params, SpaceTransforms::default(), 1, 0.5);
        ctx.set_module(3, 0);
        assert_eq!(ctx.read_built_data::<u32>(), 42);
    }

    #[test]
    fn test_parameter_value_reads_tuples() {
        let mut layout = crate::parameters::ParameterLayout::new();
        layout.add_binding("Scale", 1, [2.0, 0.0, 0.0, 0.0]);
        layout.add_binding("Wind", 3, [1.0, 2.0, 3.0, 0.0]);
        let params = crate::parameters::ParameterStore::new(layout).snapshot();
        let mut batch = batch();
        let ctx = ParticleSimulationContext::new(&mut batch, &[], &[], &params, SpaceTransforms::default(), 1, 0.5);
        assert_eq!(ctx.parameter_value::<f32>(0), 2.0);
        assert_eq!(ctx.parameter_value::<Vec3>(1), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(ctx.parameter_value::<Vec3>(INDEX_NONE), Vec3::ZERO);
        assert_eq!(ctx.parameter_value::<Vec4>(2), Vec4::ZERO);
    }
}
