//! Constant forces. Like `AddVelocity`, these only feed [`PhysicsBuildData`].

use super::physics::{CurlNoiseSettings, PhysicsBuildData};
use super::{default_enabled, ModuleStage, StatelessModule};
use crate::build_context::EmitterBuildContext;
use crate::distribution::{Distribution, ValueRange};
use crate::error::BuildError;
use crate::space::CoordinateSpace;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Constant acceleration, optionally random per particle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccelerationForce {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub acceleration: Distribution<Vec3>,
    pub space: CoordinateSpace,
}

impl Default for AccelerationForce {
    fn default() -> Self {
        Self {
            enabled: true,
            acceleration: Distribution::constant(Vec3::ZERO),
            space: CoordinateSpace::Simulation,
        }
    }
}

impl StatelessModule for AccelerationForce {
    const NAME: &'static str = "AccelerationForce";
    const STAGE: ModuleStage = ModuleStage::Force;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        if self.enabled {
            let range = ctx.convert_distribution_to_range(&self.acceleration, Vec3::ZERO)?;
            ctx.transient_build_data::<PhysicsBuildData>()
                .add_acceleration(self.space, range);
        }
        Ok(())
    }
}

/// World-space gravity, in units per second squared.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GravityForce {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub gravity: Vec3,
}

impl Default for GravityForce {
    fn default() -> Self {
        Self {
            enabled: true,
            gravity: Vec3::new(0.0, 0.0, -980.0),
        }
    }
}

impl StatelessModule for GravityForce {
    const NAME: &'static str = "GravityForce";
    const STAGE: ModuleStage = ModuleStage::Force;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        if self.enabled {
            ctx.transient_build_data::<PhysicsBuildData>()
                .add_acceleration(CoordinateSpace::World, ValueRange::constant(self.gravity));
        }
        Ok(())
    }
}

/// Linear drag coefficient, per second.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Drag {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub drag: Distribution<f32>,
}

impl Default for Drag {
    fn default() -> Self {
        Self {
            enabled: true,
            drag: Distribution::constant(1.0),
        }
    }
}

impl StatelessModule for Drag {
    const NAME: &'static str = "Drag";
    const STAGE: ModuleStage = ModuleStage::Force;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        if self.enabled {
            let range = ctx.convert_distribution_to_range(&self.drag, 0.0)?;
            ctx.transient_build_data::<PhysicsBuildData>().add_drag(range);
        }
        Ok(())
    }
}

/// Deterministic turbulence from a curl noise field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurlNoiseForce {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub strength: f32,
    /// Spatial frequency of the field, per unit.
    pub frequency: f32,
    /// How fast the field scrolls, in units per second.
    pub pan: Vec3,
}

impl Default for CurlNoiseForce {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 100.0,
            frequency: 0.01,
            pan: Vec3::ZERO,
        }
    }
}

impl StatelessModule for CurlNoiseForce {
    const NAME: &'static str = "CurlNoiseForce";
    const STAGE: ModuleStage = ModuleStage::Force;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        if self.enabled {
            ctx.transient_build_data::<PhysicsBuildData>().curl_noise = Some(CurlNoiseSettings {
                strength: self.strength,
                frequency: self.frequency,
                pan: self.pan,
            });
        }
        Ok(())
    }
}
