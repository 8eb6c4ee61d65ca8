//! # Stateless Particles
//!
//! Particle emitters whose every attribute is a closed-form function of a
//! particle's age, lifetime and unique index. Nothing is carried from one
//! frame to the next: ask for the particles alive at time `t` and you get
//! the same answer on any thread, in any batch, on any device.
//!
//! ## Quick Start
//!
//! ```ignore
//! use stateless_particles::prelude::*;
//!
//! let definition = EmitterDefinition {
//!     spawn: vec![SpawnInfo::Rate { rate: 200.0, start: 0.0, end: None }],
//!     attributes: vec![
//!         ParticleAttribute::Position.current(),
//!         ParticleAttribute::Color.current(),
//!     ],
//!     modules: vec![
//!         InitializeParticle::default().into(),
//!         ShapeLocation::default().into(),
//!         GravityForce::default().into(),
//!         SolveVelocitiesAndForces::default().into(),
//!     ],
//!     ..Default::default()
//! };
//!
//! let emitter = definition.build(&BuildOptions::default())?;
//! let params = emitter.parameter_store().snapshot();
//! for mut batch in emitter.gather(1.5, 1.0 / 60.0) {
//!     emitter.simulate(&mut batch, &params, 1.0 / 60.0);
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Modules
//!
//! A [`Module`] is one behavior. Building an emitter runs every module's
//! build step once, which packs its settings into a POD blob and registers a
//! kernel. Simulating a batch runs the registered kernels in order. See
//! [`modules`] for the full list.
//!
//! ### Distributions
//!
//! Most module inputs are a [`Distribution`]: constant, random range, curve
//! over normalized age, or a live parameter binding. Each compiles into a
//! 3-word [`BuiltDistribution`] pointing into the static float pool.
//!
//! ### Attributes
//!
//! Renderers request [`ParticleAttribute`]s (and their `Previous.` versions
//! for motion vectors). Anything not requested is never computed: kernels
//! see `INDEX_NONE` and skip the write.
//!
//! ## Feature Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | Spawn state | [`InitializeParticle`], [`InitialMeshOrientation`], [`ShapeLocation`] |
//! | Physics | [`AddVelocity`], [`AccelerationForce`], [`GravityForce`], [`Drag`], [`CurlNoiseForce`], [`SolveVelocitiesAndForces`] |
//! | Motion | [`RotateAroundPoint`], [`MeshRotationRate`], [`SpriteRotationRate`] |
//! | Size and color | [`ScaleColor`], [`ScaleMeshSize`], [`ScaleSpriteSize`], [`ScaleRibbonWidth`], [`ScaleMeshSizeBySpeed`], [`ScaleSpriteSizeBySpeed`] |
//! | Rendering | [`CameraOffset`], [`DynamicMaterialParameters`], [`MeshIndex`], [`WeightedMeshIndex`], [`SpriteFacingAndAlignment`], [`SubUvAnimation`] |

// Lets the derive macros name `::stateless_particles` from inside this crate.
extern crate self as stateless_particles;

pub mod attributes;
pub mod batch;
pub mod build_context;
pub mod context;
pub mod distribution;
pub mod emitter;
pub mod error;
pub mod modules;
pub mod noise;
pub mod parameters;
pub mod random;
pub mod sampler;
pub mod shader;
pub mod shader_utils;
pub mod space;
pub mod spawn;
pub mod static_data;

pub use attributes::{ParticleAttribute, ParticleLayout, ParticleVariable, ParticleVariableOffset, INDEX_NONE};
pub use batch::{ParticleBatch, ParticleValue};
pub use build_context::{BuiltDataHandle, EmitterBuildContext};
pub use bytemuck;
pub use context::ParticleSimulationContext;
pub use distribution::{BuiltDistribution, Curve, Distribution, DistributionValue, ValueRange};
pub use emitter::{BuildOptions, CompiledEmitter, EmitterDefinition, EmitterInstance, FeatureMask};
pub use error::{BuildError, ParameterError};
pub use glam::{Quat, Vec2, Vec3, Vec4};
pub use modules::*;
pub use parameters::{
    ParameterBuffer, ParameterDeclaration, ParameterExpression, ParameterLayout, ParameterStore, ParameterValue,
};
pub use sampler::DistributionSampler;
pub use shader::{GpuLayout, ShaderParameterBlock};
pub use space::{CoordinateSpace, LocalToWorld};
pub use spawn::{LifetimeRange, LoopBehavior, SpawnInfo};
pub use static_data::StaticDataPool;
pub use stateless_particles_derive::{BuiltEnum, GpuLayout};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use stateless_particles::prelude::*;
/// ```
pub mod prelude {
    pub use crate::attributes::{ParticleAttribute, ParticleVariable};
    pub use crate::distribution::{Curve, Distribution};
    pub use crate::emitter::{BuildOptions, CompiledEmitter, EmitterDefinition, EmitterInstance};
    pub use crate::error::BuildError;
    pub use crate::modules::*;
    pub use crate::parameters::ParameterStore;
    pub use crate::space::{CoordinateSpace, LocalToWorld};
    pub use crate::spawn::{LifetimeRange, LoopBehavior, SpawnInfo};
    pub use crate::{Quat, Vec2, Vec3, Vec4};
    pub use bytemuck::{Pod, Zeroable};
}
