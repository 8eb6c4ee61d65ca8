//! Spawn-time values for the common render attributes.

use super::{any_requested, default_enabled, variable_offsets, ModuleStage, StatelessModule};
use crate::attributes::ParticleAttribute;
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::{BuiltDistribution, Distribution};
use crate::error::BuildError;
use crate::space::CoordinateSpace;
use crate::GpuLayout;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

const SEED_COLOR: u32 = 0;
const SEED_SPRITE_SIZE: u32 = 1;
const SEED_SPRITE_ROTATION: u32 = 2;
const SEED_MESH_SCALE: u32 = 3;
const SEED_RIBBON_WIDTH: u32 = 4;
const SEED_MATERIAL_RANDOM: u32 = 5;
// Curves are read at a random point, drawn from these slots
const SEED_CURVE_TIME: u32 = 8;

/// Initial color, sizes, rotation and identity of every particle.
///
/// Also places the particle at the emitter origin, so later location and
/// solve modules add offsets to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializeParticle {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub color: Distribution<Vec4>,
    pub sprite_size: Distribution<Vec2>,
    /// Degrees.
    pub sprite_rotation: Distribution<f32>,
    pub mesh_scale: Distribution<Vec3>,
    pub ribbon_width: Distribution<f32>,
}

impl Default for InitializeParticle {
    fn default() -> Self {
        Self {
            enabled: true,
            color: Distribution::constant(Vec4::ONE),
            sprite_size: Distribution::constant(Vec2::splat(10.0)),
            sprite_rotation: Distribution::constant(0.0),
            mesh_scale: Distribution::constant(Vec3::ONE),
            ribbon_width: Distribution::constant(10.0),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct InitializeParticleBuiltData {
    color_offset: i32,
    previous_color_offset: i32,
    sprite_size_offset: i32,
    previous_sprite_size_offset: i32,
    sprite_rotation_offset: i32,
    previous_sprite_rotation_offset: i32,
    scale_offset: i32,
    previous_scale_offset: i32,
    ribbon_width_offset: i32,
    previous_ribbon_width_offset: i32,
    position_offset: i32,
    previous_position_offset: i32,
    unique_id_offset: i32,
    previous_unique_id_offset: i32,
    material_random_offset: i32,
    previous_material_random_offset: i32,
    color: BuiltDistribution,
    sprite_size: BuiltDistribution,
    sprite_rotation: BuiltDistribution,
    mesh_scale: BuiltDistribution,
    ribbon_width: BuiltDistribution,
}

impl StatelessModule for InitializeParticle {
    const NAME: &'static str = "InitializeParticle";
    const STAGE: ModuleStage = ModuleStage::Initialize;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (color_offset, previous_color_offset) = variable_offsets(ctx, ParticleAttribute::Color);
        let (sprite_size_offset, previous_sprite_size_offset) =
            variable_offsets(ctx, ParticleAttribute::SpriteSize);
        let (sprite_rotation_offset, previous_sprite_rotation_offset) =
            variable_offsets(ctx, ParticleAttribute::SpriteRotation);
        let (scale_offset, previous_scale_offset) = variable_offsets(ctx, ParticleAttribute::Scale);
        let (ribbon_width_offset, previous_ribbon_width_offset) =
            variable_offsets(ctx, ParticleAttribute::RibbonWidth);
        let (position_offset, previous_position_offset) = variable_offsets(ctx, ParticleAttribute::Position);
        let (unique_id_offset, previous_unique_id_offset) = variable_offsets(ctx, ParticleAttribute::UniqueId);
        let (material_random_offset, previous_material_random_offset) =
            variable_offsets(ctx, ParticleAttribute::MaterialRandom);

        let data = InitializeParticleBuiltData {
            color_offset,
            previous_color_offset,
            sprite_size_offset,
            previous_sprite_size_offset,
            sprite_rotation_offset,
            previous_sprite_rotation_offset,
            scale_offset,
            previous_scale_offset,
            ribbon_width_offset,
            previous_ribbon_width_offset,
            position_offset,
            previous_position_offset,
            unique_id_offset,
            previous_unique_id_offset,
            material_random_offset,
            previous_material_random_offset,
            color: ctx.add_distribution(&self.color, Vec4::ONE)?,
            sprite_size: ctx.add_distribution(&self.sprite_size, Vec2::splat(10.0))?,
            sprite_rotation: ctx.add_distribution(&self.sprite_rotation, 0.0)?,
            mesh_scale: ctx.add_distribution(&self.mesh_scale, Vec3::ONE)?,
            ribbon_width: ctx.add_distribution(&self.ribbon_width, 10.0)?,
        };
        let handle = ctx.allocate_built_data(data);

        let outputs = [
            color_offset,
            previous_color_offset,
            sprite_size_offset,
            previous_sprite_size_offset,
            sprite_rotation_offset,
            previous_sprite_rotation_offset,
            scale_offset,
            previous_scale_offset,
            ribbon_width_offset,
            previous_ribbon_width_offset,
            position_offset,
            previous_position_offset,
            unique_id_offset,
            previous_unique_id_offset,
            material_random_offset,
            previous_material_random_offset,
        ];
        if self.enabled && any_requested(&outputs) {
            ctx.add_particle_simulation_exec(handle, simulate);
        }
        Ok(())
    }
}

fn simulate(ctx: &mut ParticleSimulationContext<'_>) {
    let data: InitializeParticleBuiltData = ctx.read_built_data();
    let origin = ctx.to_simulation_position(CoordinateSpace::Local, Vec3::ZERO);

    for i in 0..ctx.num_instances() {
        let curve_time = ctx.random_float4(i, SEED_CURVE_TIME);

        let color: Vec4 = ctx
            .distribution_sampler(&data.color, i, SEED_COLOR)
            .sample(curve_time.x);
        let sprite_size: Vec2 = ctx
            .distribution_sampler(&data.sprite_size, i, SEED_SPRITE_SIZE)
            .sample(curve_time.y);
        let sprite_rotation: f32 = ctx
            .distribution_sampler(&data.sprite_rotation, i, SEED_SPRITE_ROTATION)
            .sample(curve_time.z);
        let mesh_scale: Vec3 = ctx
            .distribution_sampler(&data.mesh_scale, i, SEED_MESH_SCALE)
            .sample(curve_time.w);
        let ribbon_width: f32 = ctx
            .distribution_sampler(&data.ribbon_width, i, SEED_RIBBON_WIDTH)
            .sample(curve_time.x);
        let unique_id = ctx.unique_index(i) as i32;
        let material_random = ctx.random_float(i, SEED_MATERIAL_RANDOM);

        ctx.write_particle_variable(data.color_offset, i, color);
        ctx.write_particle_variable(data.previous_color_offset, i, color);
        ctx.write_particle_variable(data.sprite_size_offset, i, sprite_size);
        ctx.write_particle_variable(data.previous_sprite_size_offset, i, sprite_size);
        ctx.write_particle_variable(data.sprite_rotation_offset, i, sprite_rotation);
        ctx.write_particle_variable(data.previous_sprite_rotation_offset, i, sprite_rotation);
        ctx.write_particle_variable(data.scale_offset, i, mesh_scale);
        ctx.write_particle_variable(data.previous_scale_offset, i, mesh_scale);
        ctx.write_particle_variable(data.ribbon_width_offset, i, ribbon_width);
        ctx.write_particle_variable(data.previous_ribbon_width_offset, i, ribbon_width);
        ctx.write_particle_variable(data.position_offset, i, origin);
        ctx.write_particle_variable(data.previous_position_offset, i, origin);
        ctx.write_particle_variable(data.unique_id_offset, i, unique_id);
        ctx.write_particle_variable(data.previous_unique_id_offset, i, unique_id);
        ctx.write_particle_variable(data.material_random_offset, i, material_random);
        ctx.write_particle_variable(data.previous_material_random_offset, i, material_random);
    }
}
