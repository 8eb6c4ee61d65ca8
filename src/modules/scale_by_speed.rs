//! Size from the speed the particle is moving at.
//!
//! Speed is measured as `|Position - Previous.Position| / dt`, so these
//! modules must run after everything that moves the particle.

use super::{any_requested, default_enabled, variable_offsets, ModuleStage, StatelessModule};
use crate::attributes::{ParticleAttribute, ParticleVariable};
use crate::batch::ParticleValue;
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::DistributionValue;
use crate::error::BuildError;
use crate::GpuLayout;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct ScaleBySpeedBuiltData {
    value_offset: i32,
    previous_value_offset: i32,
    position_offset: i32,
    previous_position_offset: i32,
    /// `1 / threshold`, or zero when every speed counts as full speed.
    inv_speed_threshold: f32,
    min_scale: [f32; 4],
    max_scale: [f32; 4],
}

fn padded<T: DistributionValue>(value: T) -> [f32; 4] {
    let mut out = Vec::with_capacity(4);
    value.push_components(&mut out);
    out.resize(4, 0.0);
    [out[0], out[1], out[2], out[3]]
}

fn build_scale_by_speed<T>(
    ctx: &mut EmitterBuildContext<'_>,
    enabled: bool,
    attribute: ParticleAttribute,
    speed_threshold: f32,
    min_scale: T,
    max_scale: T,
) -> Result<(), BuildError>
where
    T: DistributionValue + ParticleValue + Mul<Output = T>,
{
    let (value_offset, previous_value_offset) = variable_offsets(ctx, attribute);
    let (position_offset, previous_position_offset) = variable_offsets(ctx, ParticleAttribute::Position);
    let data = ScaleBySpeedBuiltData {
        value_offset,
        previous_value_offset,
        position_offset,
        previous_position_offset,
        inv_speed_threshold: if speed_threshold > 0.0 { 1.0 / speed_threshold } else { 0.0 },
        min_scale: padded(min_scale),
        max_scale: padded(max_scale),
    };
    let handle = ctx.allocate_built_data(data);
    if enabled && any_requested(&[value_offset, previous_value_offset]) {
        ctx.add_particle_simulation_exec(handle, simulate::<T>);
    }
    Ok(())
}

fn simulate<T>(ctx: &mut ParticleSimulationContext<'_>)
where
    T: DistributionValue + ParticleValue + Mul<Output = T>,
{
    let data: ScaleBySpeedBuiltData = ctx.read_built_data();
    let min_scale = T::from_components(&data.min_scale);
    let max_scale = T::from_components(&data.max_scale);
    let one = T::splat(1.0);

    for i in 0..ctx.num_instances() {
        let t = if data.inv_speed_threshold > 0.0 {
            let position: Vec3 = ctx.read_particle_variable(data.position_offset, i, Vec3::ZERO);
            let previous_position: Vec3 = ctx.read_particle_variable(data.previous_position_offset, i, position);
            let speed = (position - previous_position).length() * ctx.inv_delta_time();
            (speed * data.inv_speed_threshold).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let scale = T::lerp(min_scale, max_scale, t);

        let value: T = ctx.read_particle_variable(data.value_offset, i, one);
        let previous: T = ctx.read_particle_variable(data.previous_value_offset, i, value);
        ctx.write_particle_variable(data.value_offset, i, value * scale);
        ctx.write_particle_variable(data.previous_value_offset, i, previous * scale);
    }
}

fn position_inputs() -> Vec<ParticleVariable> {
    vec![ParticleAttribute::Position.current(), ParticleAttribute::Position.previous()]
}

/// Lerps mesh `Scale` between two values as speed goes from zero to the threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleMeshSizeBySpeed {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Speed at which `max_scale` is reached. Zero or less always uses `max_scale`.
    pub speed_threshold: f32,
    pub min_scale: Vec3,
    pub max_scale: Vec3,
}

impl Default for ScaleMeshSizeBySpeed {
    fn default() -> Self {
        Self {
            enabled: true,
            speed_threshold: 1000.0,
            min_scale: Vec3::ONE,
            max_scale: Vec3::ONE,
        }
    }
}

impl StatelessModule for ScaleMeshSizeBySpeed {
    const NAME: &'static str = "ScaleMeshSizeBySpeed";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        build_scale_by_speed(
            ctx,
            self.enabled,
            ParticleAttribute::Scale,
            self.speed_threshold,
            self.min_scale,
            self.max_scale,
        )
    }

    fn input_variables(&self) -> Vec<ParticleVariable> {
        position_inputs()
    }
}

/// Lerps `SpriteSize` between two values as speed goes from zero to the threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleSpriteSizeBySpeed {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub speed_threshold: f32,
    pub min_scale: Vec2,
    pub max_scale: Vec2,
}

impl Default for ScaleSpriteSizeBySpeed {
    fn default() -> Self {
        Self {
            enabled: true,
            speed_threshold: 1000.0,
            min_scale: Vec2::ONE,
            max_scale: Vec2::ONE,
        }
    }
}

impl StatelessModule for ScaleSpriteSizeBySpeed {
    const NAME: &'static str = "ScaleSpriteSizeBySpeed";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        build_scale_by_speed(
            ctx,
            self.enabled,
            ParticleAttribute::SpriteSize,
            self.speed_threshold,
            self.min_scale,
            self.max_scale,
        )
    }

    fn input_variables(&self) -> Vec<ParticleVariable> {
        position_inputs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Distribution;
    use crate::modules::testing::build;
    use crate::modules::{AddVelocity, Module, SolveVelocitiesAndForces, VelocityMode};

    fn moving(speed: f32, module: Module, attribute: ParticleAttribute) -> crate::batch::ParticleBatch {
        let add = AddVelocity {
            mode: VelocityMode::Linear {
                velocity: Distribution::constant(Vec3::new(speed, 0.0, 0.0)),
            },
            ..Default::default()
        };
        let harness = build(
            vec![add.into(), SolveVelocitiesAndForces::default().into(), module],
            &[attribute.current()],
        );
        harness.run(&[(0, 1.0, 4.0)], 0.5)
    }

    #[test]
    fn test_sprite_scale_halfway_to_threshold() {
        let module = ScaleSpriteSizeBySpeed {
            speed_threshold: 200.0,
            min_scale: Vec2::ZERO,
            max_scale: Vec2::new(2.0, 4.0),
            ..Default::default()
        };
        let batch = moving(100.0, module.into(), ParticleAttribute::SpriteSize);
        let size: Vec2 = batch.get(ParticleAttribute::SpriteSize.current(), 0).unwrap();
        assert!(size.abs_diff_eq(Vec2::new(1.0, 2.0), 1e-3), "{size}");
    }

    #[test]
    fn test_mesh_scale_clamps_above_threshold() {
        let module = ScaleMeshSizeBySpeed {
            speed_threshold: 10.0,
            min_scale: Vec3::ONE,
            max_scale: Vec3::splat(3.0),
            ..Default::default()
        };
        let batch = moving(500.0, module.into(), ParticleAttribute::Scale);
        let scale: Vec3 = batch.get(ParticleAttribute::Scale.current(), 0).unwrap();
        assert!(scale.abs_diff_eq(Vec3::splat(3.0), 1e-4));
    }

    #[test]
    fn test_stationary_uses_min_scale() {
        let module = ScaleMeshSizeBySpeed {
            speed_threshold: 10.0,
            min_scale: Vec3::splat(0.5),
            max_scale: Vec3::splat(3.0),
            ..Default::default()
        };
        let batch = moving(0.0, module.into(), ParticleAttribute::Scale);
        let scale: Vec3 = batch.get(ParticleAttribute::Scale.current(), 0).unwrap();
        assert!(scale.abs_diff_eq(Vec3::splat(0.5), 1e-6));
    }

    #[test]
    fn test_requests_position_inputs() {
        let module = Module::from(ScaleSpriteSizeBySpeed::default());
        assert_eq!(module.input_variables(), position_inputs());
    }
}
