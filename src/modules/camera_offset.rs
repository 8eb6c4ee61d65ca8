//! Offset toward the camera, applied by the renderer.

use super::{any_requested, default_enabled, variable_offsets, ModuleStage, StatelessModule};
use crate::attributes::ParticleAttribute;
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::{BuiltDistribution, Distribution};
use crate::error::BuildError;
use crate::GpuLayout;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOffset {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Units toward the camera; curves run over normalized age.
    pub offset: Distribution<f32>,
}

impl Default for CameraOffset {
    fn default() -> Self {
        Self {
            enabled: true,
            offset: Distribution::constant(0.0),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct CameraOffsetBuiltData {
    camera_offset_offset: i32,
    previous_camera_offset_offset: i32,
    offset: BuiltDistribution,
}

impl StatelessModule for CameraOffset {
    const NAME: &'static str = "CameraOffset";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (camera_offset_offset, previous_camera_offset_offset) =
            variable_offsets(ctx, ParticleAttribute::CameraOffset);
        let data = CameraOffsetBuiltData {
            camera_offset_offset,
            previous_camera_offset_offset,
            offset: ctx.add_distribution(&self.offset, 0.0)?,
        };
        let handle = ctx.allocate_built_data(data);
        if self.enabled && any_requested(&[camera_offset_offset, previous_camera_offset_offset]) {
            ctx.add_particle_simulation_exec(handle, simulate);
        }
        Ok(())
    }
}

fn simulate(ctx: &mut ParticleSimulationContext<'_>) {
    let data: CameraOffsetBuiltData = ctx.read_built_data();
    for i in 0..ctx.num_instances() {
        let sampler = ctx.distribution_sampler::<f32>(&data.offset, i, 0);
        let offset = sampler.sample(ctx.normalized_age(i));
        let previous = sampler.sample(ctx.previous_normalized_age(i));
        ctx.write_particle_variable(data.camera_offset_offset, i, offset);
        ctx.write_particle_variable(data.previous_camera_offset_offset, i, previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Curve;
    use crate::modules::testing::build;

    #[test]
    fn test_offset_follows_curve() {
        let module = CameraOffset {
            offset: Distribution::curve(Curve::linear(0.0, 100.0)),
            ..Default::default()
        };
        let harness = build(
            vec![module.into()],
            &[ParticleAttribute::CameraOffset.current(), ParticleAttribute::CameraOffset.previous()],
        );
        let batch = harness.run(&[(0, 1.0, 2.0)], 0.5);
        let current: f32 = batch.get(ParticleAttribute::CameraOffset.current(), 0).unwrap();
        let previous: f32 = batch.get(ParticleAttribute::CameraOffset.previous(), 0).unwrap();
        assert!((current - 50.0).abs() < 1e-3);
        assert!((previous - 25.0).abs() < 1e-3);
    }

    #[test]
    fn test_binding_reads_parameter() {
        let module = CameraOffset {
            offset: Distribution::binding("CameraPush"),
            ..Default::default()
        };
        let harness = build(vec![module.into()], &[ParticleAttribute::CameraOffset.current()]);
        let mut store = harness.parameter_store();
        store.set("CameraPush", 12.5f32).unwrap();
        let batch = harness.run_with(&[(3, 0.1, 1.0)], 0.1, &store.snapshot());
        assert_eq!(batch.get::<f32>(ParticleAttribute::CameraOffset.current(), 0), Some(12.5));
    }
}
