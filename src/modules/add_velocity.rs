//! Initial velocity contributions.
//!
//! `AddVelocity` has no kernel. It adds its settings to
//! [`PhysicsBuildData`] and [`SolveVelocitiesAndForces`](super::SolveVelocitiesAndForces)
//! turns them into motion.

use super::physics::{ConeVelocity, PhysicsBuildData, PointVelocity};
use super::{default_enabled, ModuleStage, StatelessModule};
use crate::attributes::{ParticleAttribute, ParticleVariable};
use crate::build_context::EmitterBuildContext;
use crate::distribution::Distribution;
use crate::error::BuildError;
use crate::space::CoordinateSpace;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

/// How the velocity direction is chosen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum VelocityMode {
    /// A fixed or random vector.
    Linear { velocity: Distribution<Vec3> },
    /// Away from `origin`, through the particle's spawn position.
    FromPoint {
        origin: Vec3,
        speed: Distribution<f32>,
    },
    /// A random direction inside a cone around `axis`.
    InCone {
        axis: Vec3,
        angle_degrees: f32,
        /// Fraction of the cone left empty around the axis.
        #[serde(default)]
        inner_fraction: f32,
        speed: Distribution<f32>,
    },
}

impl Default for VelocityMode {
    fn default() -> Self {
        VelocityMode::Linear {
            velocity: Distribution::constant(Vec3::ZERO),
        }
    }
}

/// Adds an initial velocity.
///
/// Linear contributions from several modules are summed. For the point and
/// cone modes the last enabled module wins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddVelocity {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub mode: VelocityMode,
    /// Space the velocity, point or axis is authored in.
    pub space: CoordinateSpace,
}

impl Default for AddVelocity {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: VelocityMode::default(),
            space: CoordinateSpace::Local,
        }
    }
}

impl StatelessModule for AddVelocity {
    const NAME: &'static str = "AddVelocity";
    const STAGE: ModuleStage = ModuleStage::Force;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        if !self.enabled {
            return Ok(());
        }
        match &self.mode {
            VelocityMode::Linear { velocity } => {
                let range = ctx.convert_distribution_to_range(velocity, Vec3::ZERO)?;
                ctx.transient_build_data::<PhysicsBuildData>()
                    .add_linear_velocity(self.space, range);
            }
            VelocityMode::FromPoint { origin, speed } => {
                let speed = ctx.convert_distribution_to_range(speed, 0.0)?;
                ctx.transient_build_data::<PhysicsBuildData>().point_velocity = Some(PointVelocity {
                    origin: *origin,
                    space: self.space,
                    speed,
                });
            }
            VelocityMode::InCone {
                axis,
                angle_degrees,
                inner_fraction,
                speed,
            } => {
                let speed = ctx.convert_distribution_to_range(speed, 0.0)?;
                let axis = axis.try_normalize().unwrap_or(Vec3::Z);
                ctx.transient_build_data::<PhysicsBuildData>().cone_velocity = Some(ConeVelocity {
                    rotation: Quat::from_rotation_arc(Vec3::Z, axis),
                    space: self.space,
                    angle: angle_degrees.to_radians().clamp(0.0, PI),
                    inner_fraction: *inner_fraction,
                    speed,
                });
            }
        }
        Ok(())
    }

    fn input_variables(&self) -> Vec<ParticleVariable> {
        match self.mode {
            VelocityMode::FromPoint { .. } => vec![ParticleAttribute::Position.current()],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::{build, particles};
    use crate::modules::{ShapeLocation, Shape, SolveVelocitiesAndForces};
    use crate::parameters::{ParameterExpression, ParameterStore};

    fn velocities(modules: Vec<crate::modules::Module>, count: u32) -> Vec<Vec3> {
        bound_velocities(modules, count, |_| {})
    }

    fn bound_velocities(
        modules: Vec<crate::modules::Module>,
        count: u32,
        set: impl FnOnce(&mut ParameterStore),
    ) -> Vec<Vec3> {
        let harness = build(modules, &[ParticleAttribute::Velocity.current()]);
        let mut store = harness.parameter_store();
        set(&mut store);
        let batch = harness.run_with(&particles(count, 1.0, 2.0), 0.1, &store.snapshot());
        (0..batch.len())
            .map(|i| batch.get(ParticleAttribute::Velocity.current(), i).unwrap())
            .collect()
    }

    #[test]
    fn test_linear_velocities_sum() {
        let a = AddVelocity {
            mode: VelocityMode::Linear {
                velocity: Distribution::constant(Vec3::X),
            },
            ..Default::default()
        };
        let b = AddVelocity {
            mode: VelocityMode::Linear {
                velocity: Distribution::constant(Vec3::Y),
            },
            space: CoordinateSpace::World,
            ..Default::default()
        };
        let v = velocities(vec![a.into(), b.into(), SolveVelocitiesAndForces::default().into()], 4);
        assert!(v.iter().all(|v| v.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6)));
    }

    #[test]
    fn test_cone_stays_inside_angle() {
        let cone = AddVelocity {
            mode: VelocityMode::InCone {
                axis: Vec3::X,
                angle_degrees: 30.0,
                inner_fraction: 0.5,
                speed: Distribution::constant(10.0),
            },
            ..Default::default()
        };
        for v in velocities(vec![cone.into(), SolveVelocitiesAndForces::default().into()], 300) {
            assert!((v.length() - 10.0).abs() < 1e-3);
            let angle = v.angle_between(Vec3::X).to_degrees();
            assert!((14.9..=30.1).contains(&angle), "{angle}");
        }
    }

    #[test]
    fn test_from_point_pushes_outward() {
        let shape = ShapeLocation {
            shape: Shape::Sphere {
                radius_min: 10.0,
                radius_max: 10.0,
            },
            ..Default::default()
        };
        let point = AddVelocity {
            mode: VelocityMode::FromPoint {
                origin: Vec3::ZERO,
                speed: Distribution::constant(5.0),
            },
            ..Default::default()
        };
        let modules = vec![shape.into(), point.into(), SolveVelocitiesAndForces::default().into()];
        let harness = build(modules, &[ParticleAttribute::Velocity.current()]);
        let batch = harness.run(&particles(50, 0.0, 1.0), 0.1);
        for i in 0..batch.len() {
            let v: Vec3 = batch.get(ParticleAttribute::Velocity.current(), i).unwrap();
            let p: Vec3 = batch.get(ParticleAttribute::Position.current(), i).unwrap();
            assert!((v.length() - 5.0).abs() < 1e-3);
            assert!(v.normalize().dot(p.normalize()) > 0.999);
        }
    }

    #[test]
    fn test_disabled_contributes_nothing() {
        let add = AddVelocity {
            enabled: false,
            mode: VelocityMode::Linear {
                velocity: Distribution::constant(Vec3::X),
            },
            ..Default::default()
        };
        let v = velocities(vec![add.into(), SolveVelocitiesAndForces::default().into()], 2);
        assert!(v.iter().all(|v| *v == Vec3::ZERO));
    }

    #[test]
    fn test_bound_linear_velocities_add_up() {
        let bound = AddVelocity {
            mode: VelocityMode::Linear {
                velocity: Distribution::binding("Push"),
            },
            space: CoordinateSpace::World,
            ..Default::default()
        };
        let halved = AddVelocity {
            mode: VelocityMode::Linear {
                velocity: Distribution::Expression(ParameterExpression::multiply(
                    ParameterExpression::binding("Push"),
                    ParameterExpression::constant(0.5f32),
                )),
            },
            space: CoordinateSpace::World,
            ..Default::default()
        };
        let constant = AddVelocity {
            mode: VelocityMode::Linear {
                velocity: Distribution::constant(Vec3::Z),
            },
            ..Default::default()
        };
        let modules = vec![
            bound.into(),
            halved.into(),
            constant.into(),
            SolveVelocitiesAndForces::default().into(),
        ];
        let v = bound_velocities(modules.clone(), 2, |_| {});
        assert!(v.iter().all(|v| v.abs_diff_eq(Vec3::Z, 1e-6)));
        let v = bound_velocities(modules, 2, |store| store.set("Push", Vec3::new(10.0, 0.0, 0.0)).unwrap());
        assert!(v.iter().all(|v| v.abs_diff_eq(Vec3::new(15.0, 0.0, 1.0), 1e-5)), "{v:?}");
    }

    #[test]
    fn test_bound_cone_speed_follows_parameter() {
        let cone = AddVelocity {
            mode: VelocityMode::InCone {
                axis: Vec3::Z,
                angle_degrees: 20.0,
                inner_fraction: 0.0,
                speed: Distribution::binding("LaunchSpeed"),
            },
            ..Default::default()
        };
        let modules = vec![cone.into(), SolveVelocitiesAndForces::default().into()];
        let v = bound_velocities(modules.clone(), 16, |_| {});
        assert!(v.iter().all(|v| *v == Vec3::ZERO));
        let v = bound_velocities(modules, 16, |store| store.set("LaunchSpeed", 40.0f32).unwrap());
        assert!(v.iter().all(|v| (v.length() - 40.0).abs() < 1e-3));
    }

    #[test]
    fn test_bound_point_speed_follows_parameter() {
        let shape = ShapeLocation {
            shape: Shape::Sphere {
                radius_min: 10.0,
                radius_max: 10.0,
            },
            ..Default::default()
        };
        let point = AddVelocity {
            mode: VelocityMode::FromPoint {
                origin: Vec3::ZERO,
                speed: Distribution::binding("BurstSpeed"),
            },
            ..Default::default()
        };
        let modules = vec![shape.into(), point.into(), SolveVelocitiesAndForces::default().into()];
        let v = bound_velocities(modules, 16, |store| store.set("BurstSpeed", 7.0f32).unwrap());
        assert!(v.iter().all(|v| (v.length() - 7.0).abs() < 1e-3), "{v:?}");
    }
}
