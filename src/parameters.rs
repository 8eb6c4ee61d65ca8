//! Live parameters: values not known until simulate time.
//!
//! Renderer bindings are registered while an emitter is built and packed
//! into a [`ParameterLayout`]. Each frame the host writes values into a
//! [`ParameterStore`] and takes a [`ParameterBuffer`] snapshot, which every
//! batch of that frame reads concurrently.
//!
//! # Example
//!
//! ```ignore
//! let mut store = compiled.parameter_store();
//! store.set("WindStrength", 2.5f32)?;
//! store.set("Target", Vec3::new(0.0, 100.0, 0.0))?;
//! let params = store.snapshot();
//! compiled.simulate(&mut batch, &params, dt);
//! ```

use crate::error::ParameterError;
use crate::space::LocalToWorld;
use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Supported parameter value types.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
}

impl ParameterValue {
    /// Number of f32 components.
    pub fn components(&self) -> u32 {
        match self {
            ParameterValue::Float(_) => 1,
            ParameterValue::Vec2(_) => 2,
            ParameterValue::Vec3(_) => 3,
            ParameterValue::Vec4(_) => 4,
        }
    }

    /// Components padded with zeros.
    pub fn to_array(&self) -> [f32; 4] {
        match *self {
            ParameterValue::Float(v) => [v, 0.0, 0.0, 0.0],
            ParameterValue::Vec2(v) => [v.x, v.y, 0.0, 0.0],
            ParameterValue::Vec3(v) => [v.x, v.y, v.z, 0.0],
            ParameterValue::Vec4(v) => v.to_array(),
        }
    }

    /// Zero value with `components` components.
    pub fn zero(components: u32) -> Self {
        match components {
            0 | 1 => ParameterValue::Float(0.0),
            2 => ParameterValue::Vec2(Vec2::ZERO),
            3 => ParameterValue::Vec3(Vec3::ZERO),
            _ => ParameterValue::Vec4(Vec4::ZERO),
        }
    }
}

impl From<f32> for ParameterValue {
    fn from(v: f32) -> Self {
        ParameterValue::Float(v)
    }
}

impl From<Vec2> for ParameterValue {
    fn from(v: Vec2) -> Self {
        ParameterValue::Vec2(v)
    }
}

impl From<Vec3> for ParameterValue {
    fn from(v: Vec3) -> Self {
        ParameterValue::Vec3(v)
    }
}

impl From<Vec4> for ParameterValue {
    fn from(v: Vec4) -> Self {
        ParameterValue::Vec4(v)
    }
}

/// A declared live parameter with its default value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDeclaration {
    pub name: String,
    pub default: ParameterValue,
}

/// Expression over live parameters, evaluated once per frame.
///
/// Scalars broadcast against vectors; mismatched vectors combine
/// component by component with missing components read as zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParameterExpression {
    Constant(ParameterValue),
    Binding(String),
    Add(Box<ParameterExpression>, Box<ParameterExpression>),
    Multiply(Box<ParameterExpression>, Box<ParameterExpression>),
    Negate(Box<ParameterExpression>),
}

impl ParameterExpression {
    pub fn binding(name: impl Into<String>) -> Self {
        ParameterExpression::Binding(name.into())
    }

    pub fn constant(value: impl Into<ParameterValue>) -> Self {
        ParameterExpression::Constant(value.into())
    }

    pub fn add(a: Self, b: Self) -> Self {
        ParameterExpression::Add(Box::new(a), Box::new(b))
    }

    pub fn multiply(a: Self, b: Self) -> Self {
        ParameterExpression::Multiply(Box::new(a), Box::new(b))
    }

    pub fn negate(a: Self) -> Self {
        ParameterExpression::Negate(Box::new(a))
    }

    /// Every binding name the expression reads.
    pub fn bindings(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_bindings(&mut names);
        names
    }

    fn collect_bindings<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            ParameterExpression::Constant(_) => {}
            ParameterExpression::Binding(name) => names.push(name),
            ParameterExpression::Add(a, b) | ParameterExpression::Multiply(a, b) => {
                a.collect_bindings(names);
                b.collect_bindings(names);
            }
            ParameterExpression::Negate(a) => a.collect_bindings(names),
        }
    }

    fn evaluate(&self, layout: &ParameterLayout, words: &[f32]) -> Evaluated {
        match self {
            ParameterExpression::Constant(v) => Evaluated {
                values: v.to_array(),
                components: v.components(),
            },
            ParameterExpression::Binding(name) => match layout.find(name) {
                Some(slot) => {
                    let mut values = [0.0; 4];
                    let start = slot.offset as usize;
                    let n = slot.components as usize;
                    values[..n].copy_from_slice(&words[start..start + n]);
                    Evaluated {
                        values,
                        components: slot.components,
                    }
                }
                None => Evaluated::default(),
            },
            ParameterExpression::Add(a, b) => {
                a.evaluate(layout, words).combine(b.evaluate(layout, words), |x, y| x + y)
            }
            ParameterExpression::Multiply(a, b) => {
                a.evaluate(layout, words).combine(b.evaluate(layout, words), |x, y| x * y)
            }
            ParameterExpression::Negate(a) => {
                let mut v = a.evaluate(layout, words);
                v.values = v.values.map(|x| -x);
                v
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Evaluated {
    values: [f32; 4],
    components: u32,
}

impl Evaluated {
    fn combine(self, other: Evaluated, op: impl Fn(f32, f32) -> f32) -> Evaluated {
        let components = self.components.max(other.components);
        let mut values = [0.0; 4];
        for (i, v) in values.iter_mut().enumerate() {
            *v = op(self.component(i), other.component(i));
        }
        Evaluated { values, components }
    }

    fn component(&self, i: usize) -> f32 {
        if self.components == 1 {
            self.values[0]
        } else {
            self.values[i]
        }
    }
}

/// One packed parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSlot {
    pub name: String,
    /// Offset in 32-bit words.
    pub offset: u32,
    pub components: u32,
    pub default: [f32; 4],
}

#[derive(Clone, Debug, PartialEq)]
struct ExpressionSlot {
    offset: u32,
    components: u32,
    expression: ParameterExpression,
}

#[derive(Clone, Debug, PartialEq)]
struct SumSlot {
    offset: u32,
    components: u32,
    terms: Vec<u32>,
}

/// Word layout of the live parameter buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterLayout {
    slots: Vec<ParameterSlot>,
    expressions: Vec<ExpressionSlot>,
    sums: Vec<SumSlot>,
    num_words: u32,
}

impl ParameterLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a named binding.
    pub fn find(&self, name: &str) -> Option<&ParameterSlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    /// Named bindings in registration order.
    pub fn slots(&self) -> &[ParameterSlot] {
        &self.slots
    }

    /// Total size of the buffer in words.
    #[inline]
    pub fn num_words(&self) -> u32 {
        self.num_words
    }

    pub(crate) fn add_binding(&mut self, name: &str, components: u32, default: [f32; 4]) -> u32 {
        let offset = self.num_words;
        self.num_words += components;
        self.slots.push(ParameterSlot {
            name: name.to_string(),
            offset,
            components,
            default,
        });
        offset
    }

    pub(crate) fn add_expression(&mut self, expression: ParameterExpression, components: u32) -> u32 {
        let offset = self.num_words;
        self.num_words += components;
        self.expressions.push(ExpressionSlot {
            offset,
            components,
            expression,
        });
        offset
    }

    /// Slot holding the sum of other slots, written after expressions.
    pub(crate) fn add_sum(&mut self, terms: Vec<u32>, components: u32) -> u32 {
        let offset = self.num_words;
        self.num_words += components;
        self.sums.push(SumSlot {
            offset,
            components,
            terms,
        });
        offset
    }

    fn default_words(&self) -> Vec<f32> {
        let mut words = vec![0.0; self.num_words as usize];
        for slot in &self.slots {
            let start = slot.offset as usize;
            let n = slot.components as usize;
            words[start..start + n].copy_from_slice(&slot.default[..n]);
        }
        words
    }
}

/// Mutable per-frame parameter values.
#[derive(Clone, Debug)]
pub struct ParameterStore {
    layout: ParameterLayout,
    words: Vec<f32>,
    local_to_world: LocalToWorld,
}

impl ParameterStore {
    /// Store initialised with every binding's default.
    pub fn new(layout: ParameterLayout) -> Self {
        let words = layout.default_words();
        Self {
            layout,
            words,
            local_to_world: LocalToWorld::default(),
        }
    }

    pub fn layout(&self) -> &ParameterLayout {
        &self.layout
    }

    /// Write a named parameter.
    pub fn set(&mut self, name: &str, value: impl Into<ParameterValue>) -> Result<(), ParameterError> {
        let value = value.into();
        let slot = self
            .layout
            .find(name)
            .ok_or_else(|| ParameterError::Unknown(name.to_string()))?;
        if slot.components != value.components() {
            return Err(ParameterError::TypeMismatch {
                name: name.to_string(),
                expected: slot.components,
                found: value.components(),
            });
        }
        let start = slot.offset as usize;
        let n = slot.components as usize;
        self.words[start..start + n].copy_from_slice(&value.to_array()[..n]);
        Ok(())
    }

    /// Read back a named parameter.
    pub fn get(&self, name: &str) -> Option<ParameterValue> {
        let slot = self.layout.find(name)?;
        let start = slot.offset as usize;
        let w = &self.words[start..start + slot.components as usize];
        Some(match slot.components {
            1 => ParameterValue::Float(w[0]),
            2 => ParameterValue::Vec2(Vec2::from_slice(w)),
            3 => ParameterValue::Vec3(Vec3::from_slice(w)),
            _ => ParameterValue::Vec4(Vec4::from_slice(w)),
        })
    }

    pub fn set_local_to_world(&mut self, transform: LocalToWorld) {
        self.local_to_world = transform;
    }

    pub fn local_to_world(&self) -> &LocalToWorld {
        &self.local_to_world
    }

    /// Evaluate expressions and freeze the values for this frame.
    pub fn snapshot(&self) -> ParameterBuffer {
        let mut words = self.words.clone();
        for slot in &self.layout.expressions {
            let value = slot.expression.evaluate(&self.layout, &self.words);
            for i in 0..slot.components as usize {
                words[slot.offset as usize + i] = value.component(i);
            }
        }
        for sum in &self.layout.sums {
            for i in 0..sum.components as usize {
                words[sum.offset as usize + i] = sum.terms.iter().map(|&t| words[t as usize + i]).sum();
            }
        }
        ParameterBuffer {
            words,
            local_to_world: self.local_to_world,
        }
    }
}

/// Immutable parameter values shared by every batch of one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterBuffer {
    words: Vec<f32>,
    local_to_world: LocalToWorld,
}

impl ParameterBuffer {
    /// Buffer with no parameters and an identity transform.
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.words
    }

    /// One word, or zero past the end.
    #[inline]
    pub fn float(&self, offset: usize) -> f32 {
        self.words.get(offset).copied().unwrap_or(0.0)
    }

    #[inline]
    pub fn local_to_world(&self) -> &LocalToWorld {
        &self.local_to_world
    }
}
