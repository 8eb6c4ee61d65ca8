//! Sprite facing, alignment and spin.

use super::{any_requested, default_enabled, lerp, variable_offsets, ModuleStage, StatelessModule};
use crate::attributes::{ParticleAttribute, INDEX_NONE};
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::{BuiltDistribution, Distribution};
use crate::error::BuildError;
use crate::space::CoordinateSpace;
use crate::GpuLayout;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Writes fixed facing and alignment vectors for sprite renderers.
///
/// Vectors are normalized and converted to simulation space once per batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteFacingAndAlignment {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub facing: Option<Vec3>,
    pub alignment: Option<Vec3>,
    pub space: CoordinateSpace,
}

impl Default for SpriteFacingAndAlignment {
    fn default() -> Self {
        Self {
            enabled: true,
            facing: Some(Vec3::X),
            alignment: Some(Vec3::Y),
            space: CoordinateSpace::Local,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct SpriteFacingAndAlignmentBuiltData {
    facing_offset: i32,
    previous_facing_offset: i32,
    alignment_offset: i32,
    previous_alignment_offset: i32,
    facing: Vec3,
    alignment: Vec3,
    space: u32,
}

impl StatelessModule for SpriteFacingAndAlignment {
    const NAME: &'static str = "SpriteFacingAndAlignment";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (facing_offset, previous_facing_offset) = match self.facing {
            Some(_) => variable_offsets(ctx, ParticleAttribute::SpriteFacing),
            None => (INDEX_NONE, INDEX_NONE),
        };
        let (alignment_offset, previous_alignment_offset) = match self.alignment {
            Some(_) => variable_offsets(ctx, ParticleAttribute::SpriteAlignment),
            None => (INDEX_NONE, INDEX_NONE),
        };
        let data = SpriteFacingAndAlignmentBuiltData {
            facing_offset,
            previous_facing_offset,
            alignment_offset,
            previous_alignment_offset,
            facing: self.facing.unwrap_or(Vec3::X).normalize_or(Vec3::X),
            alignment: self.alignment.unwrap_or(Vec3::Y).normalize_or(Vec3::Y),
            space: self.space.into(),
        };
        let handle = ctx.allocate_built_data(data);
        let outputs = [facing_offset, previous_facing_offset, alignment_offset, previous_alignment_offset];
        if self.enabled && any_requested(&outputs) {
            ctx.add_particle_simulation_exec(handle, simulate_facing);
        }
        Ok(())
    }
}

fn simulate_facing(ctx: &mut ParticleSimulationContext<'_>) {
    let data: SpriteFacingAndAlignmentBuiltData = ctx.read_built_data();
    let space = CoordinateSpace::from(data.space);
    let facing = ctx.to_simulation_vector(space, data.facing).normalize_or(data.facing);
    let alignment = ctx.to_simulation_vector(space, data.alignment).normalize_or(data.alignment);

    for i in 0..ctx.num_instances() {
        ctx.write_particle_variable(data.facing_offset, i, facing);
        ctx.write_particle_variable(data.previous_facing_offset, i, facing);
        ctx.write_particle_variable(data.alignment_offset, i, alignment);
        ctx.write_particle_variable(data.previous_alignment_offset, i, alignment);
    }
}

/// Spins sprites: `rotation += rate * age * scale(normalized_age)`, in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpriteRotationRate {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Degrees per second.
    pub rotation_rate: Distribution<f32>,
    pub rate_scale: Distribution<f32>,
}

impl Default for SpriteRotationRate {
    fn default() -> Self {
        Self {
            enabled: true,
            rotation_rate: Distribution::constant(0.0),
            rate_scale: Distribution::constant(1.0),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct SpriteRotationRateBuiltData {
    rotation_offset: i32,
    previous_rotation_offset: i32,
    rate_min: f32,
    rate_max: f32,
    rate_binding: i32,
    rate_scale: BuiltDistribution,
}

impl StatelessModule for SpriteRotationRate {
    const NAME: &'static str = "SpriteRotationRate";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (rotation_offset, previous_rotation_offset) =
            variable_offsets(ctx, ParticleAttribute::SpriteRotation);
        let rate = ctx.convert_distribution_to_range(&self.rotation_rate, 0.0)?;
        let data = SpriteRotationRateBuiltData {
            rotation_offset,
            previous_rotation_offset,
            rate_min: rate.min,
            rate_max: rate.max,
            rate_binding: rate.binding_offset(),
            rate_scale: ctx.add_distribution_as_curve(&self.rate_scale, 1.0)?,
        };
        let handle = ctx.allocate_built_data(data);
        if self.enabled && any_requested(&[rotation_offset, previous_rotation_offset]) {
            ctx.add_particle_simulation_exec(handle, simulate_rate);
        }
        Ok(())
    }
}

fn simulate_rate(ctx: &mut ParticleSimulationContext<'_>) {
    let data: SpriteRotationRateBuiltData = ctx.read_built_data();
    let bound_rate: f32 = ctx.parameter_value(data.rate_binding);

    for i in 0..ctx.num_instances() {
        let rate = lerp(data.rate_min, data.rate_max, ctx.random_float(i, 0)) + bound_rate;
        let scale = ctx.distribution_sampler::<f32>(&data.rate_scale, i, 1);
        let current = rate * ctx.age(i) * scale.sample(ctx.normalized_age(i));
        let previous = rate * ctx.previous_age(i) * scale.sample(ctx.previous_normalized_age(i));

        let rotation: f32 = ctx.read_particle_variable(data.rotation_offset, i, 0.0);
        let previous_rotation: f32 = ctx.read_particle_variable(data.previous_rotation_offset, i, rotation);
        ctx.write_particle_variable(data.rotation_offset, i, rotation + current);
        ctx.write_particle_variable(data.previous_rotation_offset, i, previous_rotation + previous);
    }
}
