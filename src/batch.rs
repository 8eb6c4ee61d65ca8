//! Host-owned particle storage for one simulate call.
//!
//! A [`ParticleBatch`] is a structure-of-arrays buffer: every component of
//! every attribute is one contiguous column of `capacity` values. Float and
//! int attributes live in separate buffers.
//!
//! ```text
//! floats: | Age ... | Lifetime ... | NormAge ... | PrevNormAge ... | Position.x ... | Position.y ... |
//!          <- capacity ->
//! ```

use crate::attributes::{
    ParticleLayout, ParticleValueType, ParticleVariable, ParticleVariableOffset, AGE_COMPONENT,
    INDEX_NONE, LIFETIME_COMPONENT, NORMALIZED_AGE_COMPONENT, PREVIOUS_NORMALIZED_AGE_COMPONENT,
    UNIQUE_INDEX_COMPONENT,
};
use glam::{Quat, Vec2, Vec3, Vec4};
use std::sync::Arc;

/// A batch of particle columns.
#[derive(Clone, Debug)]
pub struct ParticleBatch {
    layout: Arc<ParticleLayout>,
    capacity: usize,
    num_instances: usize,
    floats: Vec<f32>,
    ints: Vec<i32>,
}

impl ParticleBatch {
    /// Allocate a zeroed batch able to hold `capacity` particles.
    pub fn new(layout: Arc<ParticleLayout>, capacity: usize) -> Self {
        let floats = vec![0.0; layout.float_components() * capacity];
        let ints = vec![0; layout.int_components() * capacity];
        Self {
            layout,
            capacity,
            num_instances: 0,
            floats,
            ints,
        }
    }

    #[inline]
    pub fn layout(&self) -> &ParticleLayout {
        &self.layout
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live particles in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.num_instances
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_instances == 0
    }

    /// Append a particle with its required columns filled.
    ///
    /// Returns the instance index, or `None` when the batch is full.
    pub fn push(&mut self, unique_index: u32, age: f32, lifetime: f32, dt: f32) -> Option<usize> {
        if self.num_instances >= self.capacity {
            return None;
        }
        let i = self.num_instances;
        self.num_instances += 1;

        let inv_lifetime = if lifetime > 0.0 { 1.0 / lifetime } else { 0.0 };
        let normalized_age = (age * inv_lifetime).clamp(0.0, 1.0);
        let previous_normalized_age = ((age - dt) * inv_lifetime).clamp(0.0, 1.0);

        self.set_float(AGE_COMPONENT, i, age);
        self.set_float(LIFETIME_COMPONENT, i, lifetime);
        self.set_float(NORMALIZED_AGE_COMPONENT, i, normalized_age);
        self.set_float(PREVIOUS_NORMALIZED_AGE_COMPONENT, i, previous_normalized_age);
        self.set_int(UNIQUE_INDEX_COMPONENT, i, unique_index as i32);
        Some(i)
    }

    /// Drop all particles, keeping the allocation.
    pub fn clear(&mut self) {
        self.num_instances = 0;
    }

    /// One float column.
    #[inline]
    pub fn float_column(&self, component: usize) -> &[f32] {
        let start = component * self.capacity;
        &self.floats[start..start + self.num_instances]
    }

    /// One int column.
    #[inline]
    pub fn int_column(&self, component: usize) -> &[i32] {
        let start = component * self.capacity;
        &self.ints[start..start + self.num_instances]
    }

    #[inline]
    pub fn float(&self, component: usize, index: usize) -> f32 {
        self.floats[component * self.capacity + index]
    }

    #[inline]
    pub fn set_float(&mut self, component: usize, index: usize, value: f32) {
        self.floats[component * self.capacity + index] = value;
    }

    #[inline]
    pub fn int(&self, component: usize, index: usize) -> i32 {
        self.ints[component * self.capacity + index]
    }

    #[inline]
    pub fn set_int(&mut self, component: usize, index: usize, value: i32) {
        self.ints[component * self.capacity + index] = value;
    }

    /// Read a variable by name, returning `None` when it is not in the layout.
    pub fn get<T: ParticleValue>(&self, variable: ParticleVariable, index: usize) -> Option<T> {
        let offset = self.layout.find(variable);
        (offset != INDEX_NONE && index < self.num_instances)
            .then(|| T::load(self, offset as usize, index))
    }

    /// Unique index of every particle in the batch.
    pub fn unique_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.int_column(UNIQUE_INDEX_COMPONENT).iter().map(|&v| v as u32)
    }
}

/// A value type that can be stored in particle columns.
pub trait ParticleValue: Copy {
    const VALUE_TYPE: ParticleValueType;

    /// Load from columns starting at `offset`.
    fn load(batch: &ParticleBatch, offset: usize, index: usize) -> Self;

    /// Store into columns starting at `offset`.
    fn store(self, batch: &mut ParticleBatch, offset: usize, index: usize);

    /// Read with the [`INDEX_NONE`] sentinel honoured.
    #[inline]
    fn read_or(batch: &ParticleBatch, offset: ParticleVariableOffset, index: usize, default: Self) -> Self {
        if offset == INDEX_NONE {
            default
        } else {
            Self::load(batch, offset as usize, index)
        }
    }
}

impl ParticleValue for f32 {
    const VALUE_TYPE: ParticleValueType = ParticleValueType::Float;

    #[inline]
    fn load(batch: &ParticleBatch, offset: usize, index: usize) -> Self {
        batch.float(offset, index)
    }

    #[inline]
    fn store(self, batch: &mut ParticleBatch, offset: usize, index: usize) {
        batch.set_float(offset, index, self);
    }
}

impl ParticleValue for i32 {
    const VALUE_TYPE: ParticleValueType = ParticleValueType::Int;

    #[inline]
    fn load(batch: &ParticleBatch, offset: usize, index: usize) -> Self {
        batch.int(offset, index)
    }

    #[inline]
    fn store(self, batch: &mut ParticleBatch, offset: usize, index: usize) {
        batch.set_int(offset, index, self);
    }
}

macro_rules! vector_particle_value {
    ($ty:ty, $value_type:expr, $n:literal) => {
        impl ParticleValue for $ty {
            const VALUE_TYPE: ParticleValueType = $value_type;

            #[inline]
            fn load(batch: &ParticleBatch, offset: usize, index: usize) -> Self {
                let mut c = [0.0f32; $n];
                for (i, v) in c.iter_mut().enumerate() {
                    *v = batch.float(offset + i, index);
                }
                <$ty>::from_array(c)
            }

            #[inline]
            fn store(self, batch: &mut ParticleBatch, offset: usize, index: usize) {
                for (i, v) in self.to_array().into_iter().enumerate() {
                    batch.set_float(offset + i, index, v);
                }
            }
        }
    };
}

vector_particle_value!(Vec2, ParticleValueType::Vec2, 2);
vector_particle_value!(Vec3, ParticleValueType::Vec3, 3);
vector_particle_value!(Vec4, ParticleValueType::Vec4, 4);
vector_particle_value!(Quat, ParticleValueType::Quat, 4);
