//! Per-particle material inputs, four `Vec4` parameters with independent channels.

use super::{any_requested, default_enabled, ModuleStage, StatelessModule};
use crate::attributes::{ParticleAttribute, ParticleVariableOffset, INDEX_NONE};
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::{BuiltDistribution, Distribution};
use crate::error::BuildError;
use crate::GpuLayout;
use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use serde::{Deserialize, Serialize};

const PARAMETER_ATTRIBUTES: [ParticleAttribute; 4] = [
    ParticleAttribute::DynamicMaterialParameter0,
    ParticleAttribute::DynamicMaterialParameter1,
    ParticleAttribute::DynamicMaterialParameter2,
    ParticleAttribute::DynamicMaterialParameter3,
];

/// One material parameter. Channels left as `None` are not written.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicMaterialParameter {
    pub x: Option<Distribution<f32>>,
    pub y: Option<Distribution<f32>>,
    pub z: Option<Distribution<f32>>,
    pub w: Option<Distribution<f32>>,
}

impl DynamicMaterialParameter {
    fn channels(&self) -> [Option<&Distribution<f32>>; 4] {
        [self.x.as_ref(), self.y.as_ref(), self.z.as_ref(), self.w.as_ref()]
    }

    fn channel_mask(&self) -> u32 {
        self.channels()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }
}

/// Writes up to four dynamic material parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicMaterialParameters {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub parameters: [DynamicMaterialParameter; 4],
}

impl Default for DynamicMaterialParameters {
    fn default() -> Self {
        Self {
            enabled: true,
            parameters: Default::default(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct DynamicMaterialParameterBuiltData {
    channel_mask: u32,
    x: BuiltDistribution,
    y: BuiltDistribution,
    z: BuiltDistribution,
    w: BuiltDistribution,
}

impl DynamicMaterialParameterBuiltData {
    fn channels(&self) -> [BuiltDistribution; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct DynamicMaterialParametersBuiltData {
    parameter0_offset: i32,
    previous_parameter0_offset: i32,
    parameter1_offset: i32,
    previous_parameter1_offset: i32,
    parameter2_offset: i32,
    previous_parameter2_offset: i32,
    parameter3_offset: i32,
    previous_parameter3_offset: i32,
    parameter0: DynamicMaterialParameterBuiltData,
    parameter1: DynamicMaterialParameterBuiltData,
    parameter2: DynamicMaterialParameterBuiltData,
    parameter3: DynamicMaterialParameterBuiltData,
}

impl DynamicMaterialParametersBuiltData {
    fn offsets(&self) -> [(ParticleVariableOffset, ParticleVariableOffset); 4] {
        [
            (self.parameter0_offset, self.previous_parameter0_offset),
            (self.parameter1_offset, self.previous_parameter1_offset),
            (self.parameter2_offset, self.previous_parameter2_offset),
            (self.parameter3_offset, self.previous_parameter3_offset),
        ]
    }

    fn parameters(&self) -> [DynamicMaterialParameterBuiltData; 4] {
        [self.parameter0, self.parameter1, self.parameter2, self.parameter3]
    }
}

impl StatelessModule for DynamicMaterialParameters {
    const NAME: &'static str = "DynamicMaterialParameters";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let mut offsets = [(0, 0); 4];
        let mut built = [DynamicMaterialParameterBuiltData::zeroed(); 4];

        for (p, parameter) in self.parameters.iter().enumerate() {
            let attribute = PARAMETER_ATTRIBUTES[p];
            let mask = parameter.channel_mask();
            offsets[p] = if mask != 0 {
                (
                    ctx.find_particle_variable_index(attribute.current()),
                    ctx.find_particle_variable_index(attribute.previous()),
                )
            } else {
                (INDEX_NONE, INDEX_NONE)
            };

            let mut channels = [BuiltDistribution::default(); 4];
            for (c, channel) in parameter.channels().into_iter().enumerate() {
                if let Some(distribution) = channel {
                    channels[c] = ctx.add_distribution(distribution, 0.0)?;
                }
            }
            built[p] = DynamicMaterialParameterBuiltData {
                channel_mask: mask,
                x: channels[0],
                y: channels[1],
                z: channels[2],
                w: channels[3],
            };
        }

        let data = DynamicMaterialParametersBuiltData {
            parameter0_offset: offsets[0].0,
            previous_parameter0_offset: offsets[0].1,
            parameter1_offset: offsets[1].0,
            previous_parameter1_offset: offsets[1].1,
            parameter2_offset: offsets[2].0,
            previous_parameter2_offset: offsets[2].1,
            parameter3_offset: offsets[3].0,
            previous_parameter3_offset: offsets[3].1,
            parameter0: built[0],
            parameter1: built[1],
            parameter2: built[2],
            parameter3: built[3],
        };
        let handle = ctx.allocate_built_data(data);

        let flat: Vec<ParticleVariableOffset> = offsets.iter().flat_map(|&(a, b)| [a, b]).collect();
        if self.enabled && any_requested(&flat) {
            ctx.add_particle_simulation_exec(handle, simulate);
        }
        Ok(())
    }
}

fn simulate(ctx: &mut ParticleSimulationContext<'_>) {
    let data: DynamicMaterialParametersBuiltData = ctx.read_built_data();
    let parameters = data.parameters();

    for (p, (offset, previous_offset)) in data.offsets().into_iter().enumerate() {
        if !any_requested(&[offset, previous_offset]) {
            continue;
        }
        let parameter = &parameters[p];
        let channels = parameter.channels();

        for i in 0..ctx.num_instances() {
            let mut value: Vec4 = ctx.read_particle_variable(offset, i, Vec4::ZERO);
            let mut previous: Vec4 = ctx.read_particle_variable(previous_offset, i, value);
            let age = ctx.normalized_age(i);
            let previous_age = ctx.previous_normalized_age(i);

            for (c, channel) in channels.iter().enumerate() {
                if parameter.channel_mask & (1 << c) == 0 {
                    continue;
                }
                let sampler = ctx.distribution_sampler::<f32>(channel, i, (p * 4 + c) as u32);
                value[c] = sampler.sample(age);
                previous[c] = sampler.sample(previous_age);
            }

            ctx.write_particle_variable(offset, i, value);
            ctx.write_particle_variable(previous_offset, i, previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Curve;
    use crate::modules::testing::build;

    #[test]
    fn test_only_masked_channels_are_written() {
        let mut module = DynamicMaterialParameters::default();
        module.parameters[0].y = Some(Distribution::constant(3.0));
        module.parameters[2].w = Some(Distribution::curve(Curve::linear(0.0, 1.0)));
        let harness = build(
            vec![module.into()],
            &[
                ParticleAttribute::DynamicMaterialParameter0.current(),
                ParticleAttribute::DynamicMaterialParameter1.current(),
                ParticleAttribute::DynamicMaterialParameter2.current(),
            ],
        );
        let batch = harness.run(&[(0, 0.5, 1.0)], 0.1);
        assert_eq!(
            batch.get(ParticleAttribute::DynamicMaterialParameter0.current(), 0),
            Some(Vec4::new(0.0, 3.0, 0.0, 0.0))
        );
        assert_eq!(
            batch.get(ParticleAttribute::DynamicMaterialParameter1.current(), 0),
            Some(Vec4::ZERO)
        );
        let p2: Vec4 = batch.get(ParticleAttribute::DynamicMaterialParameter2.current(), 0).unwrap();
        assert!((p2.w - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_no_channels_no_kernel() {
        let harness = build(
            vec![DynamicMaterialParameters::default().into()],
            &[ParticleAttribute::DynamicMaterialParameter0.current()],
        );
        assert!(harness.exec_modules().is_empty());
    }

    #[test]
    fn test_mask_bits() {
        let parameter = DynamicMaterialParameter {
            x: Some(Distribution::constant(1.0)),
            z: Some(Distribution::constant(1.0)),
            ..Default::default()
        };
        assert_eq!(parameter.channel_mask(), 0b0101);
    }
}
