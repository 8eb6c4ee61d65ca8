//! Build-time orchestration of an emitter's modules.
//!
//! Every module's `build` receives the same [`EmitterBuildContext`]. The
//! context owns everything the build produces:
//!
//! - the module built-data blob ([`allocate_built_data`](EmitterBuildContext::allocate_built_data))
//! - the static float pool ([`add_distribution`](EmitterBuildContext::add_distribution))
//! - the live parameter layout ([`add_renderer_binding`](EmitterBuildContext::add_renderer_binding))
//! - the ordered exec list ([`add_particle_simulation_exec`](EmitterBuildContext::add_particle_simulation_exec))
//! - transient scratch data shared between modules of one build
//!
//! # Example
//!
//! ```ignore
//! fn build(&self, ctx: &mut EmitterBuildContext) -> Result<(), BuildError> {
//!     let data = ScaleColorBuiltData {
//!         scale: ctx.add_distribution(&self.scale, Vec4::ONE)?,
//!         color_offset: ctx.find_particle_variable_index(ParticleAttribute::Color.current()),
//!         ..
//!     };
//!     let handle = ctx.allocate_built_data(data);
//!     if self.enabled && data.color_offset != INDEX_NONE {
//!         ctx.add_particle_simulation_exec(handle, simulate);
//!     }
//!     Ok(())
//! }
//! ```

use crate::attributes::{ParticleLayout, ParticleVariable, ParticleVariableOffset, INDEX_NONE};
use crate::context::ParticleSimulationContext;
use crate::distribution::{
    BuiltDistribution, Curve, Distribution, DistributionValue, ValueRange, MAX_TABLE_LENGTH,
};
use crate::emitter::BuildOptions;
use crate::error::BuildError;
use crate::parameters::{ParameterExpression, ParameterLayout};
use crate::shader::{GpuAllocation, GpuLayout};
use crate::static_data::StaticDataPool;
use bytemuck::Pod;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

/// Per-particle kernel of a module.
pub type SimulateFn = fn(&mut ParticleSimulationContext<'_>);

/// Marker for types that can be stored in the built-data blob.
pub trait BuiltData: Pod + GpuLayout {}

impl<T: Pod + GpuLayout> BuiltData for T {}

/// Typed location of a module's built data inside the blob.
#[derive(Debug)]
pub struct BuiltDataHandle<T> {
    offset: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for BuiltDataHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for BuiltDataHandle<T> {}

impl<T> BuiltDataHandle<T> {
    /// Byte offset in the blob.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// One kernel in the exec list, with the blob offset and seed it runs with.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ExecEntry {
    pub(crate) module: &'static str,
    pub(crate) kernel: SimulateFn,
    pub(crate) data_offset: usize,
    pub(crate) module_seed: u32,
}

/// Everything a finished build produced.
pub(crate) struct BuiltEmitterData {
    pub(crate) blob: Vec<u8>,
    pub(crate) allocations: Vec<GpuAllocation>,
    pub(crate) pool: StaticDataPool,
    pub(crate) parameters: ParameterLayout,
    pub(crate) exec_list: Vec<ExecEntry>,
}

/// Build-time state shared by every module of one emitter.
pub struct EmitterBuildContext<'a> {
    options: &'a BuildOptions,
    layout: &'a ParticleLayout,
    blob: Vec<u8>,
    allocations: Vec<GpuAllocation>,
    pool: StaticDataPool,
    parameters: ParameterLayout,
    expression_bindings: Vec<String>,
    transient: HashMap<TypeId, Box<dyn Any>>,
    exec_list: Vec<ExecEntry>,
    module: &'static str,
    module_seed: u32,
}

impl<'a> EmitterBuildContext<'a> {
    pub(crate) fn new(options: &'a BuildOptions, layout: &'a ParticleLayout) -> Self {
        Self {
            options,
            layout,
            blob: Vec::new(),
            allocations: Vec::new(),
            pool: StaticDataPool::new(),
            parameters: ParameterLayout::new(),
            expression_bindings: Vec::new(),
            transient: HashMap::new(),
            exec_list: Vec::new(),
            module: "",
            module_seed: 0,
        }
    }

    /// Set the module that subsequent calls are made on behalf of.
    pub(crate) fn begin_module(&mut self, module: &'static str, module_seed: u32) {
        self.module = module;
        self.module_seed = module_seed;
    }

    pub(crate) fn finish(self) -> Result<BuiltEmitterData, BuildError> {
        if let Some(missing) = self
            .expression_bindings
            .iter()
            .find(|name| self.parameters.find(name).is_none())
        {
            return Err(BuildError::UnknownBinding(missing.clone()));
        }
        Ok(BuiltEmitterData {
            blob: self.blob,
            allocations: self.allocations,
            pool: self.pool,
            parameters: self.parameters,
            exec_list: self.exec_list,
        })
    }

    #[inline]
    pub(crate) fn exec_len(&self) -> usize {
        self.exec_list.len()
    }

    #[inline]
    pub fn options(&self) -> &BuildOptions {
        self.options
    }

    /// Seed of the module currently building.
    #[inline]
    pub fn module_seed(&self) -> u32 {
        self.module_seed
    }

    /// Append `value` to the blob at its natural alignment.
    ///
    /// The blob only grows; earlier handles stay valid.
    pub fn allocate_built_data<T: BuiltData>(&mut self, value: T) -> BuiltDataHandle<T> {
        let align = std::mem::align_of::<T>();
        let offset = self.blob.len().div_ceil(align) * align;
        self.blob.resize(offset, 0);
        self.blob.extend_from_slice(bytemuck::bytes_of(&value));
        self.allocations.push(GpuAllocation::of::<T>(offset));
        BuiltDataHandle {
            offset,
            _marker: PhantomData,
        }
    }

    /// Overwrite previously allocated built data.
    pub fn write_built_data<T: BuiltData>(&mut self, handle: BuiltDataHandle<T>, value: T) {
        let size = std::mem::size_of::<T>();
        self.blob[handle.offset..handle.offset + size].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Column offset of a variable, or `INDEX_NONE` when nothing consumes it.
    #[inline]
    pub fn find_particle_variable_index(&self, variable: ParticleVariable) -> ParticleVariableOffset {
        self.layout.find(variable)
    }

    /// Append raw floats to the static pool.
    pub fn add_static_data(&mut self, values: &[f32]) -> usize {
        self.pool.add(values)
    }

    /// Compile a distribution, falling back to `default` where it has no data.
    pub fn add_distribution<T: DistributionValue>(
        &mut self,
        distribution: &Distribution<T>,
        default: T,
    ) -> Result<BuiltDistribution, BuildError> {
        match distribution {
            Distribution::Binding(name) => {
                let offset = self.add_renderer_binding(name, T::COMPONENTS as u32)?;
                BuiltDistribution::binding(offset as usize)
            }
            Distribution::Expression(expression) => {
                let offset = self.add_expression(expression, T::COMPONENTS as u32)?;
                BuiltDistribution::binding(offset as usize)
            }
            Distribution::UniformConstant(v) => self.add_range(T::splat(*v), T::splat(*v), true),
            Distribution::NonUniformConstant(v) => self.add_range(*v, *v, false),
            Distribution::UniformRange { min, max } => {
                self.add_range(T::splat(*min), T::splat(*max), true)
            }
            Distribution::NonUniformRange { min, max } => self.add_range(*min, *max, false),
            Distribution::UniformCurve(curve) => {
                let (lut, bias, scale) = self.curve_lut(curve, default_scalar(default));
                let lut: Vec<T> = lut.into_iter().map(T::splat).collect();
                self.add_lut(&lut, bias, scale)
            }
            Distribution::NonUniformCurve(curve) => {
                let (lut, bias, scale) = self.curve_lut(curve, default);
                self.add_lut(&lut, bias, scale)
            }
        }
    }

    /// Compile a distribution as a lookup table over normalized age.
    ///
    /// Constants become flat two-entry tables and ranges run from `min` at 0
    /// to `max` at 1. Bindings stay bindings.
    pub fn add_distribution_as_curve<T: DistributionValue>(
        &mut self,
        distribution: &Distribution<T>,
        default: T,
    ) -> Result<BuiltDistribution, BuildError> {
        let (from, to) = match distribution {
            Distribution::UniformConstant(v) => (T::splat(*v), T::splat(*v)),
            Distribution::NonUniformConstant(v) => (*v, *v),
            Distribution::UniformRange { min, max } => (T::splat(*min), T::splat(*max)),
            Distribution::NonUniformRange { min, max } => (*min, *max),
            _ => return self.add_distribution(distribution, default),
        };
        self.add_lut(&[from, to], 0.0, 1.0)
    }

    /// Reduce a distribution to a plain min/max range.
    ///
    /// Curves use their key bounds. Bindings and expressions are registered
    /// and the range carries their word offset.
    pub fn convert_distribution_to_range<T: DistributionValue>(
        &mut self,
        distribution: &Distribution<T>,
        default: T,
    ) -> Result<ValueRange<T>, BuildError> {
        Ok(match distribution {
            Distribution::Binding(name) => {
                ValueRange::bound(self.add_renderer_binding(name, T::COMPONENTS as u32)?)
            }
            Distribution::Expression(expression) => {
                ValueRange::bound(self.add_expression(expression, T::COMPONENTS as u32)?)
            }
            Distribution::UniformConstant(v) => ValueRange::constant(T::splat(*v)),
            Distribution::NonUniformConstant(v) => ValueRange::constant(*v),
            Distribution::UniformRange { min, max } => ValueRange::new(T::splat(*min), T::splat(*max)),
            Distribution::NonUniformRange { min, max } => ValueRange::new(*min, *max),
            Distribution::UniformCurve(curve) => curve
                .bounds()
                .map(|(min, max)| ValueRange::new(T::splat(min), T::splat(max)))
                .unwrap_or(ValueRange::constant(default)),
            Distribution::NonUniformCurve(curve) => curve
                .bounds()
                .map(|(min, max)| ValueRange::new(min, max))
                .unwrap_or(ValueRange::constant(default)),
        })
    }

    /// Register a live parameter and return its word offset.
    ///
    /// Registering the same name again returns the existing offset.
    pub fn add_renderer_binding(&mut self, name: &str, components: u32) -> Result<u32, BuildError> {
        if let Some(slot) = self.parameters.find(name) {
            if slot.components != components {
                return Err(BuildError::BindingTypeMismatch {
                    name: name.to_string(),
                    expected: slot.components,
                    found: components,
                });
            }
            return Ok(slot.offset);
        }
        let offset = self.parameters.add_binding(name, components, [0.0; 4]);
        tracing::trace!(module = self.module, binding = name, offset, "renderer binding");
        Ok(offset)
    }

    /// Register a declared parameter with its default value.
    pub(crate) fn declare_parameter(
        &mut self,
        name: &str,
        components: u32,
        default: [f32; 4],
    ) -> Result<u32, BuildError> {
        match self.parameters.find(name) {
            Some(_) => self.add_renderer_binding(name, components),
            None => Ok(self.parameters.add_binding(name, components, default)),
        }
    }

    /// Register an expression and return its word offset.
    ///
    /// Every name it reads must be declared or bound by some module of the
    /// emitter; module order does not matter. Checked when the build finishes.
    pub fn add_expression(
        &mut self,
        expression: &ParameterExpression,
        components: u32,
    ) -> Result<u32, BuildError> {
        for name in expression.bindings() {
            if !self.expression_bindings.iter().any(|n| n == name) {
                self.expression_bindings.push(name.to_string());
            }
        }
        Ok(self.parameters.add_expression(expression.clone(), components))
    }

    /// One word offset holding the per-frame sum of the parameters at `offsets`.
    ///
    /// `INDEX_NONE` for no offsets; a single offset is returned as is.
    pub fn add_parameter_sum(&mut self, offsets: &[u32], components: u32) -> ParticleVariableOffset {
        match offsets {
            [] => INDEX_NONE,
            [offset] => *offset as ParticleVariableOffset,
            _ => self.parameters.add_sum(offsets.to_vec(), components) as ParticleVariableOffset,
        }
    }

    /// Scratch data shared by modules of this build, created on first use.
    pub fn transient_build_data<T: Default + 'static>(&mut self) -> &mut T {
        self.transient
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("transient build data is keyed by its own TypeId")
    }

    /// Shared scratch data, if a module already created it.
    pub fn peek_transient_build_data<T: 'static>(&self) -> Option<&T> {
        self.transient
            .get(&TypeId::of::<T>())
            .and_then(|data| data.downcast_ref::<T>())
    }

    /// Append a kernel to the exec list.
    ///
    /// Skipped when the CPU path is disabled in [`BuildOptions`].
    pub fn add_particle_simulation_exec<T>(&mut self, handle: BuiltDataHandle<T>, kernel: SimulateFn) {
        if !self.options.features.cpu {
            tracing::debug!(module = self.module, "cpu path disabled, kernel not registered");
            return;
        }
        self.exec_list.push(ExecEntry {
            module: self.module,
            kernel,
            data_offset: handle.offset,
            module_seed: self.module_seed,
        });
    }

    fn add_range<T: DistributionValue>(
        &mut self,
        min: T,
        max: T,
        uniform: bool,
    ) -> Result<BuiltDistribution, BuildError> {
        let mut values = Vec::with_capacity(T::COMPONENTS * 2);
        min.push_components(&mut values);
        max.push_components(&mut values);
        let offset = self.pool.add(&values);
        BuiltDistribution::random(offset, uniform)
    }

    fn add_lut<T: DistributionValue>(
        &mut self,
        lut: &[T],
        bias: f32,
        scale: f32,
    ) -> Result<BuiltDistribution, BuildError> {
        let mut values = Vec::with_capacity(T::COMPONENTS * lut.len());
        for v in lut {
            v.push_components(&mut values);
        }
        let offset = self.pool.add(&values);
        BuiltDistribution::curve(offset, lut.len(), bias, scale)
    }

    fn curve_lut<T: DistributionValue>(&self, curve: &Curve<T>, default: T) -> (Vec<T>, f32, f32) {
        let requested = curve.lut_resolution.unwrap_or(self.options.curve_lut_resolution);
        if requested > MAX_TABLE_LENGTH {
            tracing::warn!(
                module = self.module,
                requested,
                max = MAX_TABLE_LENGTH,
                "curve table too long, resampling"
            );
        }
        curve.to_lut(requested.min(MAX_TABLE_LENGTH), default)
    }
}

fn default_scalar<T: DistributionValue>(default: T) -> f32 {
    let mut c = Vec::with_capacity(T::COMPONENTS);
    default.push_components(&mut c);
    c.first().copied().unwrap_or(0.0)
}
