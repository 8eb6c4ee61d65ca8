//! Mesh orientation at spawn and its rotation over life.

use super::{any_requested, default_enabled, euler_degrees_to_quat, variable_offsets, ModuleStage, StatelessModule};
use crate::attributes::ParticleAttribute;
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::{BuiltDistribution, Distribution, DistributionValue};
use crate::error::BuildError;
use crate::space::CoordinateSpace;
use crate::GpuLayout;
use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Initial mesh orientation from Euler angles in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialMeshOrientation {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Roll, pitch and yaw about X, Y and Z.
    pub rotation: Distribution<Vec3>,
    pub space: CoordinateSpace,
}

impl Default for InitialMeshOrientation {
    fn default() -> Self {
        Self {
            enabled: true,
            rotation: Distribution::constant(Vec3::ZERO),
            space: CoordinateSpace::Local,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct InitialMeshOrientationBuiltData {
    orientation_offset: i32,
    previous_orientation_offset: i32,
    rotation: BuiltDistribution,
    space: u32,
}

impl StatelessModule for InitialMeshOrientation {
    const NAME: &'static str = "InitialMeshOrientation";
    const STAGE: ModuleStage = ModuleStage::Initialize;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (orientation_offset, previous_orientation_offset) =
            variable_offsets(ctx, ParticleAttribute::MeshOrientation);
        let data = InitialMeshOrientationBuiltData {
            orientation_offset,
            previous_orientation_offset,
            rotation: ctx.add_distribution(&self.rotation, Vec3::ZERO)?,
            space: self.space.into(),
        };
        let handle = ctx.allocate_built_data(data);
        if self.enabled && any_requested(&[orientation_offset, previous_orientation_offset]) {
            ctx.add_particle_simulation_exec(handle, simulate_initial);
        }
        Ok(())
    }
}

fn simulate_initial(ctx: &mut ParticleSimulationContext<'_>) {
    let data: InitialMeshOrientationBuiltData = ctx.read_built_data();
    let to_simulation = ctx.to_simulation_rotation(CoordinateSpace::from(data.space));

    for i in 0..ctx.num_instances() {
        let euler: Vec3 = ctx.distribution_sampler(&data.rotation, i, 0).sample(0.0);
        let orientation = to_simulation * euler_degrees_to_quat(euler);
        ctx.write_particle_variable(data.orientation_offset, i, orientation);
        ctx.write_particle_variable(data.previous_orientation_offset, i, orientation);
    }
}

/// Spins the mesh at a constant rate, scaled over life.
///
/// The rotation at age `t` is `base * euler(rate * t * scale(normalized_age))`,
/// where `base` is the orientation written by earlier modules.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshRotationRate {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Degrees per second about X, Y and Z.
    pub rotation_rate: Distribution<Vec3>,
    /// Multiplier over normalized age.
    pub rate_scale: Distribution<f32>,
}

impl Default for MeshRotationRate {
    fn default() -> Self {
        Self {
            enabled: true,
            rotation_rate: Distribution::constant(Vec3::ZERO),
            rate_scale: Distribution::constant(1.0),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct MeshRotationRateBuiltData {
    orientation_offset: i32,
    previous_orientation_offset: i32,
    rate_min: Vec3,
    rate_max: Vec3,
    rate_binding: i32,
    rate_scale: BuiltDistribution,
}

impl StatelessModule for MeshRotationRate {
    const NAME: &'static str = "MeshRotationRate";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (orientation_offset, previous_orientation_offset) =
            variable_offsets(ctx, ParticleAttribute::MeshOrientation);
        let rate = ctx.convert_distribution_to_range(&self.rotation_rate, Vec3::ZERO)?;
        let data = MeshRotationRateBuiltData {
            orientation_offset,
            previous_orientation_offset,
            rate_min: rate.min,
            rate_max: rate.max,
            rate_binding: rate.binding_offset(),
            rate_scale: ctx.add_distribution_as_curve(&self.rate_scale, 1.0)?,
        };
        let handle = ctx.allocate_built_data(data);
        if self.enabled && any_requested(&[orientation_offset, previous_orientation_offset]) {
            ctx.add_particle_simulation_exec(handle, simulate_rate);
        }
        Ok(())
    }
}

fn simulate_rate(ctx: &mut ParticleSimulationContext<'_>) {
    let data: MeshRotationRateBuiltData = ctx.read_built_data();
    let bound_rate: Vec3 = ctx.parameter_value(data.rate_binding);

    for i in 0..ctx.num_instances() {
        let rate = Vec3::lerp_components(data.rate_min, data.rate_max, ctx.random_float4(i, 0)) + bound_rate;
        let scale = ctx.distribution_sampler::<f32>(&data.rate_scale, i, 1);
        let current_scale = scale.sample(ctx.normalized_age(i));
        let previous_scale = scale.sample(ctx.previous_normalized_age(i));

        let base: Quat = ctx.read_particle_variable(data.orientation_offset, i, Quat::IDENTITY);
        let previous_base: Quat = ctx.read_particle_variable(data.previous_orientation_offset, i, base);
        let rotation = base * euler_degrees_to_quat(rate * ctx.age(i) * current_scale);
        let previous = previous_base * euler_degrees_to_quat(rate * ctx.previous_age(i) * previous_scale);

        ctx.write_particle_variable(data.orientation_offset, i, rotation.normalize());
        ctx.write_particle_variable(data.previous_orientation_offset, i, previous.normalize());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::build;

    #[test]
    fn test_rotation_rate_quarter_turn() {
        let module = MeshRotationRate {
            rotation_rate: Distribution::constant(Vec3::new(90.0, 0.0, 0.0)),
            ..Default::default()
        };
        let harness = build(
            vec![module.into()],
            &[ParticleAttribute::MeshOrientation.current(), ParticleAttribute::MeshOrientation.previous()],
        );
        // lifetime 2, normalized age 0.5
        let batch = harness.run(&[(0, 1.0, 2.0)], 0.5);
        let q: Quat = batch.get(ParticleAttribute::MeshOrientation.current(), 0).unwrap();
        assert!(q.abs_diff_eq(Quat::from_rotation_x(90f32.to_radians()), 1e-5), "{q}");
        let previous: Quat = batch.get(ParticleAttribute::MeshOrientation.previous(), 0).unwrap();
        assert!(previous.abs_diff_eq(Quat::from_rotation_x(45f32.to_radians()), 1e-5));
    }

    #[test]
    fn test_rate_composes_onto_initial_orientation() {
        let initial = InitialMeshOrientation {
            rotation: Distribution::constant(Vec3::new(0.0, 0.0, 90.0)),
            ..Default::default()
        };
        let rate = MeshRotationRate {
            rotation_rate: Distribution::constant(Vec3::new(0.0, 0.0, 90.0)),
            ..Default::default()
        };
        let harness = build(
            vec![rate.into(), initial.into()],
            &[ParticleAttribute::MeshOrientation.current()],
        );
        assert_eq!(harness.exec_modules(), vec!["InitialMeshOrientation", "MeshRotationRate"]);
        let batch = harness.run(&[(0, 1.0, 2.0)], 0.5);
        let q: Quat = batch.get(ParticleAttribute::MeshOrientation.current(), 0).unwrap();
        assert!(q.abs_diff_eq(Quat::from_rotation_z(180f32.to_radians()), 1e-5), "{q}");
    }

    #[test]
    fn test_rate_scale_curve_zero_stops_rotation() {
        let module = MeshRotationRate {
            rotation_rate: Distribution::constant(Vec3::new(0.0, 45.0, 0.0)),
            rate_scale: Distribution::constant(0.0),
            ..Default::default()
        };
        let harness = build(vec![module.into()], &[ParticleAttribute::MeshOrientation.current()]);
        let batch = harness.run(&[(0, 1.0, 2.0)], 0.5);
        let q: Quat = batch.get(ParticleAttribute::MeshOrientation.current(), 0).unwrap();
        assert!(q.abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn test_bound_rate_follows_parameter() {
        let module = MeshRotationRate {
            rotation_rate: Distribution::binding("Spin"),
            ..Default::default()
        };
        let harness = build(vec![module.into()], &[ParticleAttribute::MeshOrientation.current()]);
        let mut store = harness.parameter_store();

        let batch = harness.run_with(&[(0, 1.0, 2.0)], 0.5, &store.snapshot());
        let q: Quat = batch.get(ParticleAttribute::MeshOrientation.current(), 0).unwrap();
        assert!(q.abs_diff_eq(Quat::IDENTITY, 1e-6));

        store.set("Spin", Vec3::new(0.0, 0.0, 90.0)).unwrap();
        let batch = harness.run_with(&[(0, 1.0, 2.0)], 0.5, &store.snapshot());
        let q: Quat = batch.get(ParticleAttribute::MeshOrientation.current(), 0).unwrap();
        assert!(q.abs_diff_eq(Quat::from_rotation_z(90f32.to_radians()), 1e-5), "{q}");
    }
}
