//! The built-in stateless modules.
//!
//! A module is a self-contained behavior ("add gravity", "scale color over
//! life") with two halves:
//!
//! - `build`: runs once per emitter compile, writes the module's POD built
//!   data into the blob and, when it has work to do, registers its kernel.
//! - a kernel (`fn(&mut ParticleSimulationContext)`) that runs once per batch.
//!
//! Modules are built in [`ModuleStage`] order, keeping authored order within
//! a stage, so later kernels can read attributes earlier ones wrote.
//!
//! # Modules
//!
//! | Module | Stage | Writes |
//! |--------|-------|--------|
//! | [`InitializeParticle`] | Initialize | Color, SpriteSize, SpriteRotation, Scale, RibbonWidth, Position, UniqueID, MaterialRandom |
//! | [`InitialMeshOrientation`] | Initialize | MeshOrientation |
//! | [`ShapeLocation`] | Location | Position |
//! | [`AddVelocity`], [`AccelerationForce`], [`GravityForce`], [`Drag`], [`CurlNoiseForce`] | Force | (physics build data) |
//! | [`SolveVelocitiesAndForces`] | Solve | Position, Velocity |
//! | [`RotateAroundPoint`] | PostSolve | Position |
//! | [`CameraOffset`] | PostSolve | CameraOffset |
//! | [`DynamicMaterialParameters`] | PostSolve | DynamicMaterialParameter0..3 |
//! | [`MeshRotationRate`] | PostSolve | MeshOrientation |
//! | [`MeshIndex`], [`WeightedMeshIndex`] | PostSolve | MeshIndex |
//! | [`ScaleColor`] | PostSolve | Color |
//! | [`ScaleMeshSize`], [`ScaleMeshSizeBySpeed`] | PostSolve | Scale |
//! | [`ScaleRibbonWidth`] | PostSolve | RibbonWidth |
//! | [`ScaleSpriteSize`], [`ScaleSpriteSizeBySpeed`] | PostSolve | SpriteSize |
//! | [`SpriteFacingAndAlignment`] | PostSolve | SpriteFacing, SpriteAlignment |
//! | [`SpriteRotationRate`] | PostSolve | SpriteRotation |
//! | [`SubUvAnimation`] | PostSolve | SubImageIndex |

mod add_velocity;
mod camera_offset;
mod dynamic_material_parameters;
mod forces;
mod initialize_particle;
mod mesh_index;
mod mesh_orientation;
mod physics;
mod rotate_around_point;
mod scale_by_speed;
mod scale_color;
mod scale_size;
mod shape_location;
mod sprite;
mod sub_uv_animation;

pub use add_velocity::{AddVelocity, VelocityMode};
pub use camera_offset::CameraOffset;
pub use dynamic_material_parameters::{DynamicMaterialParameter, DynamicMaterialParameters};
pub use forces::{AccelerationForce, CurlNoiseForce, Drag, GravityForce};
pub use initialize_particle::InitializeParticle;
pub use mesh_index::{MeshIndex, WeightedMeshIndex};
pub use mesh_orientation::{InitialMeshOrientation, MeshRotationRate};
pub use physics::{
    ConeVelocity, CurlNoiseSettings, PhysicsBuildData, PhysicsTerm, PointVelocity, SolveVelocitiesAndForces,
};
pub use rotate_around_point::RotateAroundPoint;
pub use scale_by_speed::{ScaleMeshSizeBySpeed, ScaleSpriteSizeBySpeed};
pub use scale_color::ScaleColor;
pub use scale_size::{ScaleMeshSize, ScaleRibbonWidth, ScaleSpriteSize};
pub use shape_location::{Shape, ShapeLocation};
pub use sprite::{SpriteFacingAndAlignment, SpriteRotationRate};
pub use sub_uv_animation::{SubUvAnimation, SubUvMode};

use crate::attributes::{ParticleAttribute, ParticleVariable, ParticleVariableOffset, INDEX_NONE};
use crate::build_context::EmitterBuildContext;
use crate::error::BuildError;
use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Build order bucket of a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleStage {
    Initialize,
    Location,
    Force,
    Solve,
    PostSolve,
}

/// Build-time half of a module.
pub trait StatelessModule {
    /// Name used in logs.
    const NAME: &'static str;
    const STAGE: ModuleStage;

    fn is_enabled(&self) -> bool;

    /// Write built data and register the kernel if there is work to do.
    ///
    /// Modules with a kernel allocate their built data even when disabled.
    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError>;

    /// Variables the kernel reads that no renderer may have asked for.
    fn input_variables(&self) -> Vec<ParticleVariable> {
        Vec::new()
    }
}

macro_rules! module_set {
    ($($variant:ident),* $(,)?) => {
        /// Any built-in module, tagged by name in JSON.
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "module")]
        pub enum Module {
            $($variant($variant),)*
        }

        impl Module {
            pub fn name(&self) -> &'static str {
                match self {
                    $(Module::$variant(_) => <$variant as StatelessModule>::NAME,)*
                }
            }

            pub fn stage(&self) -> ModuleStage {
                match self {
                    $(Module::$variant(_) => <$variant as StatelessModule>::STAGE,)*
                }
            }

            pub fn is_enabled(&self) -> bool {
                match self {
                    $(Module::$variant(m) => m.is_enabled(),)*
                }
            }

            pub fn input_variables(&self) -> Vec<ParticleVariable> {
                match self {
                    $(Module::$variant(m) => m.input_variables(),)*
                }
            }

            pub(crate) fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
                match self {
                    $(Module::$variant(m) => m.build(ctx),)*
                }
            }
        }

        $(
            impl From<$variant> for Module {
                fn from(module: $variant) -> Self {
                    Module::$variant(module)
                }
            }
        )*
    };
}

module_set! {
    InitializeParticle,
    InitialMeshOrientation,
    ShapeLocation,
    AddVelocity,
    AccelerationForce,
    GravityForce,
    Drag,
    CurlNoiseForce,
    SolveVelocitiesAndForces,
    RotateAroundPoint,
    CameraOffset,
    DynamicMaterialParameters,
    MeshRotationRate,
    MeshIndex,
    WeightedMeshIndex,
    ScaleColor,
    ScaleMeshSize,
    ScaleMeshSizeBySpeed,
    ScaleRibbonWidth,
    ScaleSpriteSize,
    ScaleSpriteSizeBySpeed,
    SpriteFacingAndAlignment,
    SpriteRotationRate,
    SubUvAnimation,
}

pub(crate) fn default_enabled() -> bool {
    true
}

/// Current and previous column offsets of an attribute.
pub(crate) fn variable_offsets(
    ctx: &EmitterBuildContext<'_>,
    attribute: ParticleAttribute,
) -> (ParticleVariableOffset, ParticleVariableOffset) {
    (
        ctx.find_particle_variable_index(attribute.current()),
        ctx.find_particle_variable_index(attribute.previous()),
    )
}

/// Whether any of the offsets names a live column.
#[inline]
pub(crate) fn any_requested(offsets: &[ParticleVariableOffset]) -> bool {
    offsets.iter().any(|&o| o != INDEX_NONE)
}

#[inline]
pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Euler angles in degrees (roll about X, pitch about Y, yaw about Z) to a quaternion.
#[inline]
pub fn euler_degrees_to_quat(degrees: Vec3) -> Quat {
    Quat::from_euler(
        EulerRot::ZYX,
        degrees.z.to_radians(),
        degrees.y.to_radians(),
        degrees.x.to_radians(),
    )
}

/// Store a quaternion in built data without the 16-byte alignment of `Quat`.
#[inline]
pub(crate) fn quat_to_array(q: Quat) -> [f32; 4] {
    q.to_array()
}

#[inline]
pub(crate) fn array_to_quat(a: [f32; 4]) -> Quat {
    Quat::from_array(a)
}

/// Build modules and run their kernels over hand-made particles.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::attributes::ParticleLayout;
    use crate::batch::ParticleBatch;
    use crate::build_context::BuiltEmitterData;
    use crate::emitter::{build_modules, particle_layout, run_exec_list, BuildOptions};
    use crate::parameters::{ParameterBuffer, ParameterStore};
    use crate::space::SpaceTransforms;
    use std::sync::Arc;

    pub(crate) const EMITTER_SEED: u32 = 1234;

    pub(crate) struct Harness {
        pub(crate) layout: Arc<ParticleLayout>,
        pub(crate) built: BuiltEmitterData,
        pub(crate) spaces: SpaceTransforms,
    }

    pub(crate) fn build(modules: Vec<Module>, attributes: &[ParticleVariable]) -> Harness {
        let options = BuildOptions::default();
        let layout = particle_layout(&modules, attributes);
        let built = build_modules(&modules, &[], &options, &layout).unwrap();
        Harness {
            layout: Arc::new(layout),
            built,
            spaces: SpaceTransforms::default(),
        }
    }

    impl Harness {
        pub(crate) fn exec_modules(&self) -> Vec<&'static str> {
            self.built.exec_list.iter().map(|e| e.module).collect()
        }

        pub(crate) fn parameter_store(&self) -> ParameterStore {
            ParameterStore::new(self.built.parameters.clone())
        }

        /// Particles are `(unique_index, age, lifetime)`.
        pub(crate) fn run(&self, particles: &[(u32, f32, f32)], dt: f32) -> ParticleBatch {
            self.run_with(particles, dt, &self.parameter_store().snapshot())
        }

        pub(crate) fn run_with(
            &self,
            particles: &[(u32, f32, f32)],
            dt: f32,
            parameters: &ParameterBuffer,
        ) -> ParticleBatch {
            let mut batch = ParticleBatch::new(self.layout.clone(), particles.len());
            for &(unique_index, age, lifetime) in particles {
                batch.push(unique_index, age, lifetime, dt);
            }
            run_exec_list(
                &self.built.exec_list,
                &self.built.blob,
                &self.built.pool,
                parameters,
                self.spaces,
                EMITTER_SEED,
                &mut batch,
                dt,
            );
            batch
        }
    }

    /// `count` particles with indices `0..count`, all at `age` of `lifetime`.
    pub(crate) fn particles(count: u32, age: f32, lifetime: f32) -> Vec<(u32, f32, f32)> {
        (0..count).map(|i| (i, age, lifetime)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(ModuleStage::Initialize < ModuleStage::Location);
        assert!(ModuleStage::Force < ModuleStage::Solve);
        assert!(ModuleStage::Solve < ModuleStage::PostSolve);
    }

    #[test]
    fn test_module_json_is_tagged() {
        let module = Module::from(GravityForce::default());
        let json = serde_json::to_string(&module).unwrap();
        assert!(json.starts_with(r#"{"module":"GravityForce""#), "{json}");
        let back: Module = serde_json::from_str(&json).unwrap();
        assert_eq!(back, module);
        assert_eq!(back.name(), "GravityForce");
        assert_eq!(back.stage(), ModuleStage::Force);
    }

    #[test]
    fn test_euler_degrees_to_quat() {
        let q = euler_degrees_to_quat(Vec3::new(90.0, 0.0, 0.0));
        assert!(q.abs_diff_eq(Quat::from_rotation_x(90f32.to_radians()), 1e-6));
        let q = euler_degrees_to_quat(Vec3::new(0.0, 0.0, 45.0));
        assert!(q.abs_diff_eq(Quat::from_rotation_z(45f32.to_radians()), 1e-6));
    }
}
