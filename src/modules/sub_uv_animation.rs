//! Flipbook frame selection.
//!
//! The written sub-image index is continuous: a frame-blending renderer
//! interpolates between `floor(index)` and the next frame. Only the random
//! start frame and the `Random` pick are whole frames.

use super::{any_requested, default_enabled, variable_offsets, ModuleStage, StatelessModule};
use crate::attributes::ParticleAttribute;
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::{BuiltDistribution, Distribution};
use crate::error::BuildError;
use crate::{BuiltEnum, GpuLayout};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

const SEED_START_FRAME: u32 = 0;
const SEED_RANDOM_FRAME: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, BuiltEnum)]
pub enum SubUvMode {
    /// Frame from `frame_index`, sampled at normalized age.
    DirectSet,
    /// Loop forever at `play_rate` frames per second.
    InfiniteLoop,
    /// Play once from the start frame to the last frame over the lifetime.
    #[default]
    Linear,
    /// Pick a random frame, again every `random_change_interval` seconds.
    Random,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubUvAnimation {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub mode: SubUvMode,
    /// Frames in the flipbook; zero counts as one.
    pub num_frames: u32,
    pub frame_index: Distribution<f32>,
    pub play_rate: f32,
    /// Start each particle on a random frame.
    pub random_start_frame: bool,
    /// Zero picks one random frame for the whole life.
    pub random_change_interval: f32,
}

impl Default for SubUvAnimation {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: SubUvMode::Linear,
            num_frames: 16,
            frame_index: Distribution::constant(0.0),
            play_rate: 10.0,
            random_start_frame: false,
            random_change_interval: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct SubUvAnimationBuiltData {
    sub_image_offset: i32,
    previous_sub_image_offset: i32,
    mode: u32,
    num_frames: f32,
    /// Largest index below `num_frames`.
    last_index: f32,
    frame_index: BuiltDistribution,
    /// Flipbook loops per second.
    loop_rate: f32,
    random_start_frame: u32,
    /// Random frame changes per second.
    random_change_rate: f32,
}

impl StatelessModule for SubUvAnimation {
    const NAME: &'static str = "SubUvAnimation";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (sub_image_offset, previous_sub_image_offset) =
            variable_offsets(ctx, ParticleAttribute::SubImageIndex);
        let num_frames = self.num_frames.max(1) as f32;
        let data = SubUvAnimationBuiltData {
            sub_image_offset,
            previous_sub_image_offset,
            mode: self.mode.into(),
            num_frames,
            last_index: f32::from_bits(num_frames.to_bits() - 1),
            frame_index: ctx.add_distribution(&self.frame_index, 0.0)?,
            loop_rate: self.play_rate / num_frames,
            random_start_frame: self.random_start_frame as u32,
            random_change_rate: if self.random_change_interval > 0.0 {
                1.0 / self.random_change_interval
            } else {
                0.0
            },
        };
        let handle = ctx.allocate_built_data(data);
        if self.enabled && any_requested(&[sub_image_offset, previous_sub_image_offset]) {
            ctx.add_particle_simulation_exec(handle, simulate);
        }
        Ok(())
    }
}

fn simulate(ctx: &mut ParticleSimulationContext<'_>) {
    let data: SubUvAnimationBuiltData = ctx.read_built_data();
    let mode = SubUvMode::from(data.mode);
    let frames = data.num_frames;

    for i in 0..ctx.num_instances() {
        let start_frame = if data.random_start_frame != 0 {
            (ctx.random_float(i, SEED_START_FRAME) * frames).floor()
        } else {
            0.0
        };

        let sub_image = |age: f32, normalized_age: f32| {
            let index = match mode {
                SubUvMode::DirectSet => {
                    let index: f32 = ctx
                        .distribution_sampler(&data.frame_index, i, SEED_START_FRAME)
                        .sample(normalized_age);
                    index + start_frame
                }
                SubUvMode::InfiniteLoop => (start_frame / frames + age * data.loop_rate).fract() * frames,
                SubUvMode::Linear => {
                    let start = start_frame / frames;
                    (start + normalized_age * (1.0 - start)) * frames
                }
                SubUvMode::Random => {
                    let step = (age * data.random_change_rate).floor() as u32;
                    (ctx.random_float_stream(i, SEED_RANDOM_FRAME, step) * frames).floor()
                }
            };
            index.clamp(0.0, data.last_index)
        };

        let current = sub_image(ctx.age(i), ctx.normalized_age(i));
        let previous = sub_image(ctx.previous_age(i), ctx.previous_normalized_age(i));
        ctx.write_particle_variable(data.sub_image_offset, i, current);
        ctx.write_particle_variable(data.previous_sub_image_offset, i, previous);
    }
}
