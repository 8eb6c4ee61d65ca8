//! Emitter definitions, compilation and the simulate loop.
//!
//! An [`EmitterDefinition`] is the authored description of an emitter: spawn
//! timeline, lifetime, live parameters and an ordered list of modules. It is
//! compiled once into a [`CompiledEmitter`], which owns the module blob, the
//! static float pool, the parameter layout and the exec list.
//!
//! # Frame Flow
//!
//! ```text
//! gather(time)            -> batches of alive particles, required columns filled
//! parameter_store()       -> ParameterStore, written by the host each frame
//! store.snapshot()        -> ParameterBuffer shared by every batch
//! simulate_batches(...)   -> exec list run over each batch (rayon)
//! ```
//!
//! [`EmitterInstance`] wraps the three steps with a running clock.
//!
//! # Example
//!
//! ```ignore
//! let definition = EmitterDefinition::from_json(&std::fs::read_to_string("fountain.json")?)?;
//! let emitter = Arc::new(definition.build(&BuildOptions::default())?);
//! let mut instance = EmitterInstance::new(emitter.clone());
//! let params = emitter.parameter_store().snapshot();
//! for batch in instance.advance(1.0 / 60.0, &params) {
//!     renderer.upload(&batch);
//! }
//! ```

use crate::attributes::{ParticleLayout, ParticleVariable};
use crate::batch::ParticleBatch;
use crate::build_context::{BuiltEmitterData, EmitterBuildContext, ExecEntry};
use crate::context::ParticleSimulationContext;
use crate::error::BuildError;
use crate::modules::Module;
use crate::parameters::{ParameterBuffer, ParameterDeclaration, ParameterLayout, ParameterStore};
use crate::shader::ShaderParameterBlock;
use crate::space::{CoordinateSpace, SpaceTransforms};
use crate::spawn::{LifetimeRange, LoopBehavior, SpawnInfo, SpawnSchedule};
use crate::static_data::StaticDataPool;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which execution paths an emitter is built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMask {
    /// Register CPU kernels in the exec list.
    pub cpu: bool,
    /// Produce the WGSL shader parameter block.
    pub gpu: bool,
}

impl Default for FeatureMask {
    fn default() -> Self {
        Self { cpu: true, gpu: true }
    }
}

/// Build-time configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub features: FeatureMask,
    /// Curve lookup table size, clamped to `2..=512`.
    pub curve_lut_resolution: usize,
    /// Most particles [`CompiledEmitter::gather`] puts in one batch.
    pub max_batch_size: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            features: FeatureMask::default(),
            curve_lut_resolution: 32,
            max_batch_size: 4096,
        }
    }
}

/// Authored emitter description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterDefinition {
    pub name: String,
    pub random_seed: u32,
    /// `World` or `Local`; `Simulation` is treated as `World`.
    pub simulation_space: CoordinateSpace,
    pub lifetime: LifetimeRange,
    pub loop_behavior: LoopBehavior,
    pub loop_duration: f32,
    pub spawn: Vec<SpawnInfo>,
    /// Live parameters with their defaults, declared before any module builds.
    pub parameters: Vec<ParameterDeclaration>,
    /// Variables the renderer consumes.
    pub attributes: Vec<ParticleVariable>,
    pub modules: Vec<Module>,
}

impl Default for EmitterDefinition {
    fn default() -> Self {
        Self {
            name: String::from("Emitter"),
            random_seed: 0,
            simulation_space: CoordinateSpace::World,
            lifetime: LifetimeRange::default(),
            loop_behavior: LoopBehavior::default(),
            loop_duration: 1.0,
            spawn: Vec::new(),
            parameters: Vec::new(),
            attributes: Vec::new(),
            modules: Vec::new(),
        }
    }
}

impl EmitterDefinition {
    pub fn from_json(json: &str) -> Result<Self, BuildError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, BuildError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Particle layout: renderer attributes plus what enabled modules read.
    pub fn particle_layout(&self) -> ParticleLayout {
        particle_layout(&self.modules, &self.attributes)
    }

    /// Compile the definition.
    pub fn build(&self, options: &BuildOptions) -> Result<CompiledEmitter, BuildError> {
        let _span = tracing::info_span!("build_emitter", emitter = %self.name).entered();

        let layout = self.particle_layout();
        let built = build_modules(&self.modules, &self.parameters, options, &layout)?;
        let shader_block = options
            .features
            .gpu
            .then(|| ShaderParameterBlock::build(&built.allocations, &built.blob));

        let spawn = SpawnSchedule::new(
            &self.spawn,
            self.loop_behavior,
            self.loop_duration,
            self.lifetime,
            self.random_seed,
        );

        tracing::info!(
            blob_bytes = built.blob.len(),
            pool_floats = built.pool.len(),
            parameter_words = built.parameters.num_words(),
            kernels = built.exec_list.len(),
            float_columns = layout.float_components(),
            "emitter compiled"
        );

        Ok(CompiledEmitter {
            name: self.name.clone(),
            simulation_space: match self.simulation_space {
                CoordinateSpace::Local => CoordinateSpace::Local,
                _ => CoordinateSpace::World,
            },
            emitter_seed: self.random_seed,
            layout: Arc::new(layout),
            blob: built.blob,
            pool: built.pool,
            parameters: built.parameters,
            exec_list: built.exec_list,
            shader_block,
            spawn,
            max_batch_size: options.max_batch_size.max(1),
        })
    }
}

pub(crate) fn particle_layout(modules: &[Module], attributes: &[ParticleVariable]) -> ParticleLayout {
    let inputs = modules
        .iter()
        .filter(|m| m.is_enabled())
        .flat_map(|m| m.input_variables());
    ParticleLayout::new(attributes.iter().copied().chain(inputs))
}

/// Seed of the module at `index` in authored order. Seed 0 belongs to lifetimes.
#[inline]
pub(crate) fn module_seed(index: usize) -> u32 {
    (index as u32 + 1) << 8
}

/// Run every module's build in stage order.
pub(crate) fn build_modules(
    modules: &[Module],
    parameters: &[ParameterDeclaration],
    options: &BuildOptions,
    layout: &ParticleLayout,
) -> Result<BuiltEmitterData, BuildError> {
    let mut ctx = EmitterBuildContext::new(options, layout);
    for declaration in parameters {
        let default = declaration.default;
        ctx.declare_parameter(&declaration.name, default.components(), default.to_array())?;
    }

    let mut ordered: Vec<(usize, &Module)> = modules.iter().enumerate().collect();
    ordered.sort_by_key(|(_, module)| module.stage());

    for (index, module) in ordered {
        ctx.begin_module(module.name(), module_seed(index));
        let kernels_before = ctx.exec_len();
        module.build(&mut ctx)?;
        tracing::debug!(
            module = module.name(),
            stage = ?module.stage(),
            enabled = module.is_enabled(),
            kernel = ctx.exec_len() > kernels_before,
            "module built"
        );
    }
    ctx.finish()
}

/// Run an exec list over one batch.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_exec_list(
    exec_list: &[ExecEntry],
    blob: &[u8],
    pool: &StaticDataPool,
    parameters: &ParameterBuffer,
    spaces: SpaceTransforms,
    emitter_seed: u32,
    batch: &mut ParticleBatch,
    dt: f32,
) {
    if batch.is_empty() {
        return;
    }
    let mut ctx = ParticleSimulationContext::new(
        batch,
        blob,
        pool.as_slice(),
        parameters,
        spaces,
        emitter_seed,
        dt,
    );
    for entry in exec_list {
        ctx.set_module(entry.data_offset, entry.module_seed);
        (entry.kernel)(&mut ctx);
    }
}

/// A built emitter, ready to gather and simulate.
#[derive(Debug)]
pub struct CompiledEmitter {
    name: String,
    simulation_space: CoordinateSpace,
    emitter_seed: u32,
    layout: Arc<ParticleLayout>,
    blob: Vec<u8>,
    pool: StaticDataPool,
    parameters: ParameterLayout,
    exec_list: Vec<ExecEntry>,
    shader_block: Option<ShaderParameterBlock>,
    spawn: SpawnSchedule,
    max_batch_size: usize,
}

impl CompiledEmitter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn simulation_space(&self) -> CoordinateSpace {
        self.simulation_space
    }

    pub fn layout(&self) -> &Arc<ParticleLayout> {
        &self.layout
    }

    /// The module built-data blob.
    pub fn built_data(&self) -> &[u8] {
        &self.blob
    }

    pub fn static_data(&self) -> &StaticDataPool {
        &self.pool
    }

    pub fn parameter_layout(&self) -> &ParameterLayout {
        &self.parameters
    }

    /// A fresh store holding every parameter's default.
    pub fn parameter_store(&self) -> ParameterStore {
        ParameterStore::new(self.parameters.clone())
    }

    /// `None` when built without the GPU feature.
    pub fn shader_parameter_block(&self) -> Option<&ShaderParameterBlock> {
        self.shader_block.as_ref()
    }

    /// Names of the modules whose kernels run, in order.
    pub fn exec_modules(&self) -> Vec<&'static str> {
        self.exec_list.iter().map(|e| e.module).collect()
    }

    pub fn spawn_schedule(&self) -> &SpawnSchedule {
        &self.spawn
    }

    /// An empty batch with this emitter's layout.
    pub fn new_batch(&self, capacity: usize) -> ParticleBatch {
        ParticleBatch::new(self.layout.clone(), capacity)
    }

    /// Every particle alive at `time`, split into batches.
    pub fn gather(&self, time: f32, dt: f32) -> Vec<ParticleBatch> {
        let mut batches = Vec::new();
        let mut current = self.new_batch(self.max_batch_size);
        self.spawn.for_each_alive(time, |p| {
            if current.push(p.unique_index, p.age, p.lifetime, dt).is_none() {
                let full = std::mem::replace(&mut current, self.new_batch(self.max_batch_size));
                batches.push(full);
                current.push(p.unique_index, p.age, p.lifetime, dt);
            }
        });
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    /// Run the exec list over one batch.
    pub fn simulate(&self, batch: &mut ParticleBatch, parameters: &ParameterBuffer, dt: f32) {
        let spaces = SpaceTransforms::new(self.simulation_space, parameters.local_to_world());
        run_exec_list(
            &self.exec_list,
            &self.blob,
            &self.pool,
            parameters,
            spaces,
            self.emitter_seed,
            batch,
            dt,
        );
    }

    /// Run the exec list over every batch, one rayon task per batch.
    pub fn simulate_batches(&self, batches: &mut [ParticleBatch], parameters: &ParameterBuffer, dt: f32) {
        batches
            .par_iter_mut()
            .for_each(|batch| self.simulate(batch, parameters, dt));
    }
}

/// A compiled emitter with a running clock.
#[derive(Clone, Debug)]
pub struct EmitterInstance {
    emitter: Arc<CompiledEmitter>,
    time: f32,
}

impl EmitterInstance {
    pub fn new(emitter: Arc<CompiledEmitter>) -> Self {
        Self { emitter, time: 0.0 }
    }

    pub fn emitter(&self) -> &Arc<CompiledEmitter> {
        &self.emitter
    }

    #[inline]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Jump to `time`. Nothing is replayed.
    pub fn seek(&mut self, time: f32) {
        self.time = time.max(0.0);
    }

    /// Step the clock and return the simulated particles at the new time.
    pub fn advance(&mut self, dt: f32, parameters: &ParameterBuffer) -> Vec<ParticleBatch> {
        self.time += dt.max(0.0);
        let mut batches = self.emitter.gather(self.time, dt);
        self.emitter.simulate_batches(&mut batches, parameters, dt);
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::ParticleAttribute;
    use crate::distribution::Distribution;
    use crate::modules::{GravityForce, InitializeParticle, ScaleColor, SolveVelocitiesAndForces};
    use glam::{Vec3, Vec4};

    fn definition() -> EmitterDefinition {
        EmitterDefinition {
            name: "Test".into(),
            random_seed: 42,
            lifetime: LifetimeRange { min: 1.0, max: 2.0 },
            loop_duration: 1.0,
            spawn: vec![SpawnInfo::Burst { time: 0.0, amount: 100 }],
            attributes: vec![
                ParticleAttribute::Position.current(),
                ParticleAttribute::Color.current(),
            ],
            modules: vec![
                SolveVelocitiesAndForces::default().into(),
                InitializeParticle::default().into(),
                GravityForce::default().into(),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_modules_run_in_stage_order() {
        let emitter = definition().build(&BuildOptions::default()).unwrap();
        assert_eq!(
            emitter.exec_modules(),
            vec!["InitializeParticle", "SolveVelocitiesAndForces"]
        );
    }

    #[test]
    fn test_gather_splits_batches() {
        let options = BuildOptions {
            max_batch_size: 30,
            ..BuildOptions::default()
        };
        let emitter = definition().build(&options).unwrap();
        let batches = emitter.gather(0.5, 1.0 / 60.0);
        assert_eq!(batches.iter().map(ParticleBatch::len).collect::<Vec<_>>(), vec![30, 30, 30, 10]);
    }

    #[test]
    fn test_gravity_pulls_down() {
        let emitter = definition().build(&BuildOptions::default()).unwrap();
        let params = emitter.parameter_store().snapshot();
        let mut batches = emitter.gather(0.5, 1.0 / 60.0);
        emitter.simulate_batches(&mut batches, &params, 1.0 / 60.0);
        let z = batches[0].get::<Vec3>(ParticleAttribute::Position.current(), 0).unwrap().z;
        assert!((z - 0.5 * -980.0 * 0.25).abs() < 1e-2, "z = {z}");
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let options = BuildOptions {
            max_batch_size: 16,
            ..BuildOptions::default()
        };
        let mut definition = definition();
        definition.modules.push(
            ScaleColor {
                scale: Distribution::range(Vec4::ZERO, Vec4::ONE),
                ..Default::default()
            }
            .into(),
        );
        let emitter = definition.build(&options).unwrap();
        let params = emitter.parameter_store().snapshot();
        let mut parallel = emitter.gather(0.7, 0.1);
        let mut sequential = parallel.clone();
        emitter.simulate_batches(&mut parallel, &params, 0.1);
        for batch in &mut sequential {
            emitter.simulate(batch, &params, 0.1);
        }
        for (a, b) in parallel.iter().zip(&sequential) {
            for i in 0..a.len() {
                assert_eq!(
                    a.get::<Vec4>(ParticleAttribute::Color.current(), i),
                    b.get::<Vec4>(ParticleAttribute::Color.current(), i)
                );
            }
        }
    }

    #[test]
    fn test_gpu_block_follows_feature_mask() {
        let cpu_only = BuildOptions {
            features: FeatureMask { cpu: true, gpu: false },
            ..BuildOptions::default()
        };
        assert!(definition().build(&cpu_only).unwrap().shader_parameter_block().is_none());
        let gpu_only = BuildOptions {
            features: FeatureMask { cpu: false, gpu: true },
            ..BuildOptions::default()
        };
        let emitter = definition().build(&gpu_only).unwrap();
        assert!(emitter.exec_modules().is_empty());
        assert!(emitter.shader_parameter_block().is_some());
    }

    #[test]
    fn test_definition_json_round_trip() {
        let definition = definition();
        let json = definition.to_json().unwrap();
        assert_eq!(EmitterDefinition::from_json(&json).unwrap(), definition);
        assert!(matches!(
            EmitterDefinition::from_json("{\"modules\": 3}"),
            Err(BuildError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_instance_advances_clock() {
        let emitter = Arc::new(definition().build(&BuildOptions::default()).unwrap());
        let params = emitter.parameter_store().snapshot();
        let mut instance = EmitterInstance::new(emitter);
        let batches = instance.advance(0.25, &params);
        assert_eq!(instance.time(), 0.25);
        assert_eq!(batches.iter().map(ParticleBatch::len).sum::<usize>(), 100);
    }
}
