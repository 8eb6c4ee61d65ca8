//! Orbits particles around their solved position.

use super::{any_requested, default_enabled, lerp, variable_offsets, ModuleStage, StatelessModule};
use crate::attributes::ParticleAttribute;
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::Distribution;
use crate::error::BuildError;
use crate::space::CoordinateSpace;
use crate::GpuLayout;
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

const SEED_RATE: u32 = 0;
const SEED_RADIUS: u32 = 1;
const SEED_PHASE: u32 = 2;

/// Circular motion in the local XY plane.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotateAroundPoint {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Degrees per second.
    pub rate: Distribution<f32>,
    pub radius: Distribution<f32>,
    /// Starting angle as a fraction of a full turn.
    pub initial_phase: Distribution<f32>,
}

impl Default for RotateAroundPoint {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: Distribution::constant(360.0),
            radius: Distribution::constant(100.0),
            initial_phase: Distribution::uniform_range(0.0, 1.0),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct RotateAroundPointBuiltData {
    position_offset: i32,
    previous_position_offset: i32,
    rate_min: f32,
    rate_max: f32,
    radius_min: f32,
    radius_max: f32,
    phase_min: f32,
    phase_max: f32,
    rate_binding: i32,
    radius_binding: i32,
    phase_binding: i32,
}

impl StatelessModule for RotateAroundPoint {
    const NAME: &'static str = "RotateAroundPoint";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (position_offset, previous_position_offset) = variable_offsets(ctx, ParticleAttribute::Position);
        let rate = ctx.convert_distribution_to_range(&self.rate, 0.0)?;
        let radius = ctx.convert_distribution_to_range(&self.radius, 0.0)?;
        let phase = ctx.convert_distribution_to_range(&self.initial_phase, 0.0)?;
        let data = RotateAroundPointBuiltData {
            position_offset,
            previous_position_offset,
            rate_min: rate.min,
            rate_max: rate.max,
            radius_min: radius.min,
            radius_max: radius.max,
            phase_min: phase.min,
            phase_max: phase.max,
            rate_binding: rate.binding_offset(),
            radius_binding: radius.binding_offset(),
            phase_binding: phase.binding_offset(),
        };
        let handle = ctx.allocate_built_data(data);
        if self.enabled && any_requested(&[position_offset, previous_position_offset]) {
            ctx.add_particle_simulation_exec(handle, simulate);
        }
        Ok(())
    }
}

fn simulate(ctx: &mut ParticleSimulationContext<'_>) {
    let data: RotateAroundPointBuiltData = ctx.read_built_data();
    let bound_rate: f32 = ctx.parameter_value(data.rate_binding);
    let bound_radius: f32 = ctx.parameter_value(data.radius_binding);
    let bound_phase: f32 = ctx.parameter_value(data.phase_binding);

    for i in 0..ctx.num_instances() {
        let rate = (lerp(data.rate_min, data.rate_max, ctx.random_float(i, SEED_RATE)) + bound_rate).to_radians();
        let radius = lerp(data.radius_min, data.radius_max, ctx.random_float(i, SEED_RADIUS)) + bound_radius;
        let phase = (lerp(data.phase_min, data.phase_max, ctx.random_float(i, SEED_PHASE)) + bound_phase)
            * std::f32::consts::TAU;

        let orbit = |age: f32| {
            let (sin, cos) = (phase + rate * age).sin_cos();
            Vec3::new(cos * radius, sin * radius, 0.0)
        };
        let offset = ctx.to_simulation_vector(CoordinateSpace::Local, orbit(ctx.age(i)));
        let previous_offset = ctx.to_simulation_vector(CoordinateSpace::Local, orbit(ctx.previous_age(i)));

        let position: Vec3 = ctx.read_particle_variable(data.position_offset, i, Vec3::ZERO);
        let previous: Vec3 = ctx.read_particle_variable(data.previous_position_offset, i, position);
        ctx.write_particle_variable(data.position_offset, i, position + offset);
        ctx.write_particle_variable(data.previous_position_offset, i, previous + previous_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::build;

    #[test]
    fn test_quarter_turn() {
        let module = RotateAroundPoint {
            rate: Distribution::constant(90.0),
            radius: Distribution::constant(10.0),
            initial_phase: Distribution::constant(0.0),
            ..Default::default()
        };
        let harness = build(
            vec![module.into()],
            &[ParticleAttribute::Position.current(), ParticleAttribute::Position.previous()],
        );
        let batch = harness.run(&[(0, 1.0, 2.0)], 1.0);
        let p: Vec3 = batch.get(ParticleAttribute::Position.current(), 0).unwrap();
        let prev: Vec3 = batch.get(ParticleAttribute::Position.previous(), 0).unwrap();
        assert!(p.abs_diff_eq(Vec3::new(0.0, 10.0, 0.0), 1e-4), "{p}");
        assert!(prev.abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1e-4), "{prev}");
    }

    #[test]
    fn test_radius_is_kept() {
        let harness = build(
            vec![RotateAroundPoint::default().into()],
            &[ParticleAttribute::Position.current()],
        );
        let batch = harness.run(&crate::modules::testing::particles(20, 0.3, 1.0), 0.1);
        for i in 0..batch.len() {
            let p: Vec3 = batch.get(ParticleAttribute::Position.current(), i).unwrap();
            assert!((p.length() - 100.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_bound_radius_follows_parameter() {
        let module = RotateAroundPoint {
            radius: Distribution::binding("OrbitRadius"),
            ..Default::default()
        };
        let harness = build(vec![module.into()], &[ParticleAttribute::Position.current()]);
        let mut store = harness.parameter_store();
        store.set("OrbitRadius", 25.0f32).unwrap();
        let batch = harness.run_with(&crate::modules::testing::particles(8, 0.3, 1.0), 0.1, &store.snapshot());
        for i in 0..batch.len() {
            let p: Vec3 = batch.get(ParticleAttribute::Position.current(), i).unwrap();
            assert!((p.length() - 25.0).abs() < 1e-3, "{p}");
        }
    }
}
