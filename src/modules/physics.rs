//! Aggregated physics and the closed-form solve.
//!
//! Velocity and force modules have no kernel of their own. They accumulate
//! their settings into [`PhysicsBuildData`], a transient shared by one build,
//! and [`SolveVelocitiesAndForces`] turns the sum into a single built-data
//! block and kernel.
//!
//! With initial velocity `v0`, constant acceleration `a` and linear drag `k`,
//! the particle at age `t` is
//!
//! ```text
//! k > 0:  v(t) = a/k + (v0 - a/k) e^(-kt)
//!         x(t) = x0 + (a/k) t + (v0 - a/k) (1 - e^(-kt)) / k
//! k = 0:  v(t) = v0 + a t
//!         x(t) = x0 + v0 t + a t^2 / 2
//! ```
//!
//! Curl noise adds `strength * curl(frequency * (x0 + pan * t)) * t`.
//!
//! A term set from live parameters adds the parameter on top of its random
//! range. Several bound contributions to one term are summed into a single
//! parameter slot each frame.

use super::{
    any_requested, array_to_quat, default_enabled, lerp, quat_to_array, variable_offsets, ModuleStage,
    StatelessModule,
};
use crate::attributes::{ParticleAttribute, INDEX_NONE};
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::{DistributionValue, ValueRange};
use crate::error::BuildError;
use crate::noise::curl_noise3;
use crate::space::CoordinateSpace;
use crate::GpuLayout;
use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::ops::Add;

const SEED_LINEAR_WORLD: u32 = 0;
const SEED_LINEAR_LOCAL: u32 = 1;
const SEED_POINT: u32 = 2;
const SEED_CONE: u32 = 3;
const SEED_ACCEL_WORLD: u32 = 4;
const SEED_ACCEL_LOCAL: u32 = 5;
const SEED_DRAG: u32 = 6;

/// Radial velocity away from a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointVelocity {
    pub origin: Vec3,
    pub space: CoordinateSpace,
    pub speed: ValueRange<f32>,
}

/// Velocity inside a cone around an axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConeVelocity {
    /// Rotates +Z onto the cone axis.
    pub rotation: Quat,
    pub space: CoordinateSpace,
    /// Half angle in radians.
    pub angle: f32,
    /// Fraction of the half angle left empty in the middle.
    pub inner_fraction: f32,
    pub speed: ValueRange<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurlNoiseSettings {
    pub strength: f32,
    pub frequency: f32,
    pub pan: Vec3,
}

/// Sum of every contribution to one physics term.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhysicsTerm<T> {
    pub min: T,
    pub max: T,
    /// Parameter word offsets added to the random value.
    pub bindings: Vec<u32>,
}

impl<T: DistributionValue + Add<Output = T>> PhysicsTerm<T> {
    pub fn add(&mut self, range: ValueRange<T>) {
        self.min = self.min + range.min;
        self.max = self.max + range.max;
        self.bindings.extend(range.binding);
    }
}

/// Physics settings accumulated by force modules during one build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhysicsBuildData {
    pub linear_velocity_world: PhysicsTerm<Vec3>,
    pub linear_velocity_local: PhysicsTerm<Vec3>,
    pub point_velocity: Option<PointVelocity>,
    pub cone_velocity: Option<ConeVelocity>,
    pub acceleration_world: PhysicsTerm<Vec3>,
    pub acceleration_local: PhysicsTerm<Vec3>,
    pub drag: PhysicsTerm<f32>,
    pub curl_noise: Option<CurlNoiseSettings>,
}

impl PhysicsBuildData {
    pub fn add_linear_velocity(&mut self, space: CoordinateSpace, range: ValueRange<Vec3>) {
        match space {
            CoordinateSpace::Local => self.linear_velocity_local.add(range),
            _ => self.linear_velocity_world.add(range),
        }
    }

    pub fn add_acceleration(&mut self, space: CoordinateSpace, range: ValueRange<Vec3>) {
        match space {
            CoordinateSpace::Local => self.acceleration_local.add(range),
            _ => self.acceleration_world.add(range),
        }
    }

    pub fn add_drag(&mut self, range: ValueRange<f32>) {
        self.drag.add(range);
    }
}

/// Integrates velocity and forces into Position and Velocity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveVelocitiesAndForces {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for SolveVelocitiesAndForces {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
pub(crate) struct SolveBuiltData {
    position_offset: i32,
    previous_position_offset: i32,
    velocity_offset: i32,
    previous_velocity_offset: i32,
    linear_world_min: Vec3,
    linear_world_max: Vec3,
    linear_local_min: Vec3,
    linear_local_max: Vec3,
    linear_world_binding: i32,
    linear_local_binding: i32,
    point_enabled: u32,
    point_space: u32,
    point_speed_min: f32,
    point_speed_max: f32,
    point_speed_binding: i32,
    point_origin: Vec3,
    cone_enabled: u32,
    cone_space: u32,
    cone_cos_inner: f32,
    cone_cos_outer: f32,
    cone_speed_min: f32,
    cone_speed_max: f32,
    cone_speed_binding: i32,
    cone_rotation: [f32; 4],
    acceleration_world_min: Vec3,
    acceleration_world_max: Vec3,
    acceleration_local_min: Vec3,
    acceleration_local_max: Vec3,
    acceleration_world_binding: i32,
    acceleration_local_binding: i32,
    drag_min: f32,
    drag_max: f32,
    drag_binding: i32,
    noise_enabled: u32,
    noise_strength: f32,
    noise_frequency: f32,
    noise_pan: Vec3,
}

impl SolveBuiltData {
    fn new(ctx: &mut EmitterBuildContext<'_>, physics: &PhysicsBuildData) -> Self {
        let (position_offset, previous_position_offset) = variable_offsets(ctx, ParticleAttribute::Position);
        let (velocity_offset, previous_velocity_offset) = variable_offsets(ctx, ParticleAttribute::Velocity);
        let point = physics.point_velocity;
        let cone = physics.cone_velocity;
        let noise = physics.curl_noise;

        Self {
            position_offset,
            previous_position_offset,
            velocity_offset,
            previous_velocity_offset,
            linear_world_min: physics.linear_velocity_world.min,
            linear_world_max: physics.linear_velocity_world.max,
            linear_local_min: physics.linear_velocity_local.min,
            linear_local_max: physics.linear_velocity_local.max,
            linear_world_binding: ctx.add_parameter_sum(&physics.linear_velocity_world.bindings, 3),
            linear_local_binding: ctx.add_parameter_sum(&physics.linear_velocity_local.bindings, 3),
            point_enabled: point.is_some() as u32,
            point_space: point.map_or(0, |p| p.space.into()),
            point_speed_min: point.map_or(0.0, |p| p.speed.min),
            point_speed_max: point.map_or(0.0, |p| p.speed.max),
            point_speed_binding: point.map_or(INDEX_NONE, |p| p.speed.binding_offset()),
            point_origin: point.map_or(Vec3::ZERO, |p| p.origin),
            cone_enabled: cone.is_some() as u32,
            cone_space: cone.map_or(0, |c| c.space.into()),
            cone_cos_inner: cone.map_or(1.0, |c| (c.angle * c.inner_fraction.clamp(0.0, 1.0)).cos()),
            cone_cos_outer: cone.map_or(1.0, |c| c.angle.cos()),
            cone_speed_min: cone.map_or(0.0, |c| c.speed.min),
            cone_speed_max: cone.map_or(0.0, |c| c.speed.max),
            cone_speed_binding: cone.map_or(INDEX_NONE, |c| c.speed.binding_offset()),
            cone_rotation: quat_to_array(cone.map_or(Quat::IDENTITY, |c| c.rotation)),
            acceleration_world_min: physics.acceleration_world.min,
            acceleration_world_max: physics.acceleration_world.max,
            acceleration_local_min: physics.acceleration_local.min,
            acceleration_local_max: physics.acceleration_local.max,
            acceleration_world_binding: ctx.add_parameter_sum(&physics.acceleration_world.bindings, 3),
            acceleration_local_binding: ctx.add_parameter_sum(&physics.acceleration_local.bindings, 3),
            drag_min: physics.drag.min.max(0.0),
            drag_max: physics.drag.max.max(0.0),
            drag_binding: ctx.add_parameter_sum(&physics.drag.bindings, 1),
            noise_enabled: noise.is_some() as u32,
            noise_strength: noise.map_or(0.0, |n| n.strength),
            noise_frequency: noise.map_or(0.0, |n| n.frequency),
            noise_pan: noise.map_or(Vec3::ZERO, |n| n.pan),
        }
    }

    fn outputs(&self) -> [i32; 4] {
        [
            self.position_offset,
            self.previous_position_offset,
            self.velocity_offset,
            self.previous_velocity_offset,
        ]
    }
}

impl StatelessModule for SolveVelocitiesAndForces {
    const NAME: &'static str = "SolveVelocitiesAndForces";
    const STAGE: ModuleStage = ModuleStage::Solve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let physics = ctx
            .peek_transient_build_data::<PhysicsBuildData>()
            .cloned()
            .unwrap_or_default();
        let data = SolveBuiltData::new(ctx, &physics);
        let handle = ctx.allocate_built_data(data);
        if self.enabled && any_requested(&data.outputs()) {
            ctx.add_particle_simulation_exec(handle, simulate);
        }
        Ok(())
    }
}

/// Position and velocity after `t` seconds.
#[inline]
pub(crate) fn integrate(x0: Vec3, v0: Vec3, a: Vec3, k: f32, t: f32) -> (Vec3, Vec3) {
    if k > 1e-5 {
        let terminal = a / k;
        let decay = (-k * t).exp();
        let v = terminal + (v0 - terminal) * decay;
        let x = x0 + terminal * t + (v0 - terminal) * ((1.0 - decay) / k);
        (x, v)
    } else {
        (x0 + v0 * t + 0.5 * a * t * t, v0 + a * t)
    }
}

fn simulate(ctx: &mut ParticleSimulationContext<'_>) {
    let data: SolveBuiltData = ctx.read_built_data();
    let point_space = CoordinateSpace::from(data.point_space);
    let cone_space = CoordinateSpace::from(data.cone_space);
    let local_rotation = ctx.to_simulation_rotation(CoordinateSpace::Local);
    let point_origin = ctx.to_simulation_position(point_space, data.point_origin);
    let cone_rotation = ctx.to_simulation_rotation(cone_space) * array_to_quat(data.cone_rotation);

    let bound_velocity = ctx.parameter_value::<Vec3>(data.linear_world_binding)
        + local_rotation * ctx.parameter_value::<Vec3>(data.linear_local_binding);
    let bound_point_speed: f32 = ctx.parameter_value(data.point_speed_binding);
    let bound_cone_speed: f32 = ctx.parameter_value(data.cone_speed_binding);
    let bound_acceleration = ctx.parameter_value::<Vec3>(data.acceleration_world_binding)
        + local_rotation * ctx.parameter_value::<Vec3>(data.acceleration_local_binding);
    let bound_drag: f32 = ctx.parameter_value(data.drag_binding);

    for i in 0..ctx.num_instances() {
        let x0: Vec3 = ctx.read_particle_variable(data.position_offset, i, Vec3::ZERO);

        let mut v0 = Vec3::lerp_components(
            data.linear_world_min,
            data.linear_world_max,
            ctx.random_float4(i, SEED_LINEAR_WORLD),
        );
        v0 += local_rotation
            * Vec3::lerp_components(
                data.linear_local_min,
                data.linear_local_max,
                ctx.random_float4(i, SEED_LINEAR_LOCAL),
            );
        v0 += bound_velocity;

        if data.point_enabled != 0 {
            let speed = lerp(data.point_speed_min, data.point_speed_max, ctx.random_float(i, SEED_POINT))
                + bound_point_speed;
            v0 += (x0 - point_origin).normalize_or_zero() * speed;
        }

        if data.cone_enabled != 0 {
            let r = ctx.random_float3(i, SEED_CONE);
            let cos_theta = lerp(data.cone_cos_inner, data.cone_cos_outer, r.x);
            let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
            let (sin_phi, cos_phi) = (r.y * TAU).sin_cos();
            let direction = Vec3::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta);
            let speed = lerp(data.cone_speed_min, data.cone_speed_max, r.z) + bound_cone_speed;
            v0 += cone_rotation * direction * speed;
        }

        let mut a = Vec3::lerp_components(
            data.acceleration_world_min,
            data.acceleration_world_max,
            ctx.random_float4(i, SEED_ACCEL_WORLD),
        );
        a += local_rotation
            * Vec3::lerp_components(
                data.acceleration_local_min,
                data.acceleration_local_max,
                ctx.random_float4(i, SEED_ACCEL_LOCAL),
            );
        a += bound_acceleration;
        let k = (lerp(data.drag_min, data.drag_max, ctx.random_float(i, SEED_DRAG)) + bound_drag).max(0.0);

        let age = ctx.age(i);
        let previous_age = ctx.previous_age(i);
        let (mut position, mut velocity) = integrate(x0, v0, a, k, age);
        let (mut previous_position, mut previous_velocity) = integrate(x0, v0, a, k, previous_age);

        if data.noise_enabled != 0 {
            let field = |t: f32| {
                data.noise_strength * curl_noise3(data.noise_frequency * (x0 + data.noise_pan * t))
            };
            let noise = field(age);
            let previous_noise = field(previous_age);
            position += noise * age;
            velocity += noise;
            previous_position += previous_noise * previous_age;
            previous_velocity += previous_noise;
        }

        ctx.write_particle_variable(data.position_offset, i, position);
        ctx.write_particle_variable(data.previous_position_offset, i, previous_position);
        ctx.write_particle_variable(data.velocity_offset, i, velocity);
        ctx.write_particle_variable(data.previous_velocity_offset, i, previous_velocity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrate_without_drag() {
        let (x, v) = integrate(Vec3::ZERO, Vec3::X, Vec3::new(0.0, 0.0, -10.0), 0.0, 2.0);
        assert!(x.abs_diff_eq(Vec3::new(2.0, 0.0, -20.0), 1e-5));
        assert!(v.abs_diff_eq(Vec3::new(1.0, 0.0, -20.0), 1e-5));
    }

    #[test]
    fn test_integrate_with_drag_approaches_terminal_velocity() {
        let a = Vec3::new(0.0, 0.0, -10.0);
        let (_, v) = integrate(Vec3::ZERO, Vec3::ZERO, a, 2.0, 20.0);
        assert!(v.abs_diff_eq(a / 2.0, 1e-4));
        let (x, v) = integrate(Vec3::ONE, Vec3::X, a, 2.0, 0.0);
        assert_eq!(x, Vec3::ONE);
        assert!(v.abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn test_drag_matches_limit_for_small_k() {
        let (x_small, _) = integrate(Vec3::ZERO, Vec3::Y, Vec3::X, 1e-3, 1.0);
        let (x_zero, _) = integrate(Vec3::ZERO, Vec3::Y, Vec3::X, 0.0, 1.0);
        assert!(x_small.abs_diff_eq(x_zero, 1e-2));
    }

    #[test]
    fn test_ranges_accumulate() {
        let mut physics = PhysicsBuildData::default();
        physics.add_acceleration(CoordinateSpace::World, ValueRange::constant(Vec3::new(0.0, 0.0, -980.0)));
        physics.add_acceleration(CoordinateSpace::Simulation, ValueRange::constant(Vec3::X));
        physics.add_acceleration(CoordinateSpace::Local, ValueRange::constant(Vec3::Y));
        physics.add_acceleration(CoordinateSpace::World, ValueRange::bound(4));
        physics.add_drag(ValueRange::new(0.5, 1.0));
        physics.add_drag(ValueRange::constant(1.0));
        assert_eq!(physics.acceleration_world.min, Vec3::new(1.0, 0.0, -980.0));
        assert_eq!(physics.acceleration_world.bindings, vec![4]);
        assert_eq!(physics.acceleration_local.max, Vec3::Y);
        assert_eq!((physics.drag.min, physics.drag.max), (1.5, 2.0));
        assert!(physics.drag.bindings.is_empty());
    }

    #[test]
    fn test_solve_layout_has_no_padding() {
        assert_eq!(std::mem::size_of::<SolveBuiltData>() % 4, 0);
        assert_eq!(SolveBuiltData::GPU_ALIGN, 16);
    }
}
