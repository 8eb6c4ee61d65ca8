//! Multiply a size attribute over the particle's life.
//!
//! The three size modules and [`ScaleColor`](super::ScaleColor) share one
//! built data layout and one generic kernel.

use super::{any_requested, default_enabled, variable_offsets, ModuleStage, StatelessModule};
use crate::attributes::ParticleAttribute;
use crate::batch::ParticleValue;
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::{BuiltDistribution, Distribution, DistributionValue};
use crate::error::BuildError;
use crate::GpuLayout;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
pub(super) struct ScaleBuiltData {
    value_offset: i32,
    previous_value_offset: i32,
    scale: BuiltDistribution,
}

/// Shared build step: `attribute *= scale(normalized_age)`.
pub(super) fn build_scale<T>(
    ctx: &mut EmitterBuildContext<'_>,
    enabled: bool,
    attribute: ParticleAttribute,
    scale: &Distribution<T>,
) -> Result<(), BuildError>
where
    T: DistributionValue + ParticleValue + Mul<Output = T>,
{
    let (value_offset, previous_value_offset) = variable_offsets(ctx, attribute);
    let data = ScaleBuiltData {
        value_offset,
        previous_value_offset,
        scale: ctx.add_distribution(scale, T::splat(1.0))?,
    };
    let handle = ctx.allocate_built_data(data);
    if enabled && any_requested(&[value_offset, previous_value_offset]) {
        ctx.add_particle_simulation_exec(handle, simulate_scale::<T>);
    }
    Ok(())
}

fn simulate_scale<T>(ctx: &mut ParticleSimulationContext<'_>)
where
    T: DistributionValue + ParticleValue + Mul<Output = T>,
{
    let data: ScaleBuiltData = ctx.read_built_data();
    let one = T::splat(1.0);

    for i in 0..ctx.num_instances() {
        let sampler = ctx.distribution_sampler::<T>(&data.scale, i, 0);
        let value: T = ctx.read_particle_variable(data.value_offset, i, one);
        let previous: T = ctx.read_particle_variable(data.previous_value_offset, i, value);
        let scaled = value * sampler.sample(ctx.normalized_age(i));
        let previous_scaled = previous * sampler.sample(ctx.previous_normalized_age(i));
        ctx.write_particle_variable(data.value_offset, i, scaled);
        ctx.write_particle_variable(data.previous_value_offset, i, previous_scaled);
    }
}

macro_rules! scale_module {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $attribute:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            #[serde(default = "default_enabled")]
            pub enabled: bool,
            /// Multiplier; curves run over normalized age.
            pub scale: Distribution<$ty>,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    enabled: true,
                    scale: Distribution::constant(<$ty as DistributionValue>::splat(1.0)),
                }
            }
        }

        impl StatelessModule for $name {
            const NAME: &'static str = stringify!($name);
            const STAGE: ModuleStage = ModuleStage::PostSolve;

            fn is_enabled(&self) -> bool {
                self.enabled
            }

            fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
                build_scale(ctx, self.enabled, $attribute, &self.scale)
            }
        }
    };
}

scale_module!(
    /// Scales the mesh `Scale` per axis.
    ScaleMeshSize,
    Vec3,
    ParticleAttribute::Scale
);
scale_module!(
    /// Scales `RibbonWidth`.
    ScaleRibbonWidth,
    f32,
    ParticleAttribute::RibbonWidth
);
scale_module!(
    /// Scales `SpriteSize` per axis.
    ScaleSpriteSize,
    Vec2,
    ParticleAttribute::SpriteSize
);
