//! Particle attribute name table and the columnar layout built from it.
//!
//! Renderers request attributes by name. The build resolves every requested
//! attribute to a [`ParticleVariableOffset`]: the first component column of
//! that attribute inside a [`ParticleBatch`](crate::ParticleBatch), or
//! [`INDEX_NONE`] when nothing downstream consumes it.
//!
//! # Attribute Table
//!
//! | Attribute | Type |
//! |-----------|------|
//! | `Position` | `Vec3` |
//! | `Velocity` | `Vec3` |
//! | `Color` | `Vec4` (linear RGBA) |
//! | `Scale` | `Vec3` |
//! | `SpriteSize` | `Vec2` |
//! | `SpriteRotation` | `f32` (degrees) |
//! | `SpriteFacing` | `Vec3` |
//! | `SpriteAlignment` | `Vec3` |
//! | `MeshOrientation` | `Quat` |
//! | `MeshIndex` | `i32` |
//! | `RibbonWidth` | `f32` |
//! | `CameraOffset` | `f32` |
//! | `DynamicMaterialParameter0..3` | `Vec4` |
//! | `SubImageIndex` | `f32` |
//! | `UniqueID` | `i32` |
//! | `MaterialRandom` | `f32` |
//!
//! Every attribute also has a `Previous.` counterpart holding the value at the
//! previous normalized age, used for motion vectors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Column offset of a particle variable, or [`INDEX_NONE`].
pub type ParticleVariableOffset = i32;

/// Sentinel offset for "no consumer requested this variable".
pub const INDEX_NONE: ParticleVariableOffset = -1;

/// Storage type of a particle attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParticleValueType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Quat,
    Int,
}

impl ParticleValueType {
    /// Number of 32-bit component columns this type occupies.
    pub const fn components(self) -> usize {
        match self {
            ParticleValueType::Float | ParticleValueType::Int => 1,
            ParticleValueType::Vec2 => 2,
            ParticleValueType::Vec3 => 3,
            ParticleValueType::Vec4 | ParticleValueType::Quat => 4,
        }
    }

    /// Whether the components live in the integer columns.
    pub const fn is_int(self) -> bool {
        matches!(self, ParticleValueType::Int)
    }
}

/// Well-known particle attributes a renderer can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticleAttribute {
    Position,
    Velocity,
    Color,
    Scale,
    SpriteSize,
    SpriteRotation,
    SpriteFacing,
    SpriteAlignment,
    MeshOrientation,
    MeshIndex,
    RibbonWidth,
    CameraOffset,
    DynamicMaterialParameter0,
    DynamicMaterialParameter1,
    DynamicMaterialParameter2,
    DynamicMaterialParameter3,
    SubImageIndex,
    #[serde(rename = "UniqueID")]
    UniqueId,
    MaterialRandom,
}

impl ParticleAttribute {
    /// Every attribute, in table order.
    pub const ALL: [ParticleAttribute; 19] = [
        ParticleAttribute::Position,
        ParticleAttribute::Velocity,
        ParticleAttribute::Color,
        ParticleAttribute::Scale,
        ParticleAttribute::SpriteSize,
        ParticleAttribute::SpriteRotation,
        ParticleAttribute::SpriteFacing,
        ParticleAttribute::SpriteAlignment,
        ParticleAttribute::MeshOrientation,
        ParticleAttribute::MeshIndex,
        ParticleAttribute::RibbonWidth,
        ParticleAttribute::CameraOffset,
        ParticleAttribute::DynamicMaterialParameter0,
        ParticleAttribute::DynamicMaterialParameter1,
        ParticleAttribute::DynamicMaterialParameter2,
        ParticleAttribute::DynamicMaterialParameter3,
        ParticleAttribute::SubImageIndex,
        ParticleAttribute::UniqueId,
        ParticleAttribute::MaterialRandom,
    ];

    /// Name as seen by renderers.
    pub const fn name(self) -> &'static str {
        match self {
            ParticleAttribute::Position => "Position",
            ParticleAttribute::Velocity => "Velocity",
            ParticleAttribute::Color => "Color",
            ParticleAttribute::Scale => "Scale",
            ParticleAttribute::SpriteSize => "SpriteSize",
            ParticleAttribute::SpriteRotation => "SpriteRotation",
            ParticleAttribute::SpriteFacing => "SpriteFacing",
            ParticleAttribute::SpriteAlignment => "SpriteAlignment",
            ParticleAttribute::MeshOrientation => "MeshOrientation",
            ParticleAttribute::MeshIndex => "MeshIndex",
            ParticleAttribute::RibbonWidth => "RibbonWidth",
            ParticleAttribute::CameraOffset => "CameraOffset",
            ParticleAttribute::DynamicMaterialParameter0 => "DynamicMaterialParameter",
            ParticleAttribute::DynamicMaterialParameter1 => "DynamicMaterialParameter1",
            ParticleAttribute::DynamicMaterialParameter2 => "DynamicMaterialParameter2",
            ParticleAttribute::DynamicMaterialParameter3 => "DynamicMaterialParameter3",
            ParticleAttribute::SubImageIndex => "SubImageIndex",
            ParticleAttribute::UniqueId => "UniqueID",
            ParticleAttribute::MaterialRandom => "MaterialRandom",
        }
    }

    /// Storage type of this attribute.
    pub const fn value_type(self) -> ParticleValueType {
        match self {
            ParticleAttribute::Position
            | ParticleAttribute::Velocity
            | ParticleAttribute::Scale
            | ParticleAttribute::SpriteFacing
            | ParticleAttribute::SpriteAlignment => ParticleValueType::Vec3,
            ParticleAttribute::Color
            | ParticleAttribute::DynamicMaterialParameter0
            | ParticleAttribute::DynamicMaterialParameter1
            | ParticleAttribute::DynamicMaterialParameter2
            | ParticleAttribute::DynamicMaterialParameter3 => ParticleValueType::Vec4,
            ParticleAttribute::SpriteSize => ParticleValueType::Vec2,
            ParticleAttribute::MeshOrientation => ParticleValueType::Quat,
            ParticleAttribute::MeshIndex | ParticleAttribute::UniqueId => ParticleValueType::Int,
            ParticleAttribute::SpriteRotation
            | ParticleAttribute::RibbonWidth
            | ParticleAttribute::CameraOffset
            | ParticleAttribute::SubImageIndex
            | ParticleAttribute::MaterialRandom => ParticleValueType::Float,
        }
    }

    /// Look up an attribute by its renderer name (without `Previous.`).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|attr| attr.name() == name)
    }

    /// The current-frame variable for this attribute.
    #[inline]
    pub const fn current(self) -> ParticleVariable {
        ParticleVariable {
            attribute: self,
            previous: false,
        }
    }

    /// The previous-frame variable for this attribute.
    #[inline]
    pub const fn previous(self) -> ParticleVariable {
        ParticleVariable {
            attribute: self,
            previous: true,
        }
    }
}

impl fmt::Display for ParticleAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An attribute at either the current or the previous normalized age.
///
/// Serialized as its renderer name, e.g. `"Previous.Position"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ParticleVariable {
    pub attribute: ParticleAttribute,
    pub previous: bool,
}

impl TryFrom<String> for ParticleVariable {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::parse(&name).ok_or_else(|| format!("unknown particle variable '{}'", name))
    }
}

impl From<ParticleVariable> for String {
    fn from(variable: ParticleVariable) -> Self {
        variable.to_string()
    }
}

impl ParticleVariable {
    /// Parse `"Position"` or `"Previous.Position"`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.strip_prefix("Previous.") {
            Some(rest) => ParticleAttribute::from_name(rest).map(ParticleAttribute::previous),
            None => ParticleAttribute::from_name(name).map(ParticleAttribute::current),
        }
    }

    /// Storage type of the variable.
    #[inline]
    pub const fn value_type(self) -> ParticleValueType {
        self.attribute.value_type()
    }
}

impl fmt::Display for ParticleVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.previous {
            write!(f, "Previous.{}", self.attribute.name())
        } else {
            f.write_str(self.attribute.name())
        }
    }
}

impl From<ParticleAttribute> for ParticleVariable {
    fn from(attribute: ParticleAttribute) -> Self {
        attribute.current()
    }
}

/// Float column of the particle age in seconds.
pub const AGE_COMPONENT: usize = 0;
/// Float column of the particle lifetime in seconds.
pub const LIFETIME_COMPONENT: usize = 1;
/// Float column of the normalized age at the current time.
pub const NORMALIZED_AGE_COMPONENT: usize = 2;
/// Float column of the normalized age one delta time earlier.
pub const PREVIOUS_NORMALIZED_AGE_COMPONENT: usize = 3;
/// Int column of the particle unique index.
pub const UNIQUE_INDEX_COMPONENT: usize = 0;

const REQUIRED_FLOAT_COMPONENTS: usize = 4;
const REQUIRED_INT_COMPONENTS: usize = 1;

/// One resolved variable inside a [`ParticleLayout`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutEntry {
    pub variable: ParticleVariable,
    /// First component column (float or int columns depending on type).
    pub offset: usize,
}

/// Structure-of-arrays layout of a particle batch.
///
/// The required columns (age, lifetime, normalized ages, unique index) are
/// always present at fixed offsets; requested variables follow in request
/// order, each taking one column per component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParticleLayout {
    entries: Vec<LayoutEntry>,
    float_components: usize,
    int_components: usize,
}

impl ParticleLayout {
    /// Build a layout from the variables requested by renderers.
    ///
    /// Duplicates are ignored.
    pub fn new<I>(requested: I) -> Self
    where
        I: IntoIterator<Item = ParticleVariable>,
    {
        let mut layout = Self {
            entries: Vec::new(),
            float_components: REQUIRED_FLOAT_COMPONENTS,
            int_components: REQUIRED_INT_COMPONENTS,
        };
        for variable in requested {
            layout.add(variable);
        }
        layout
    }

    fn add(&mut self, variable: ParticleVariable) {
        if self.entries.iter().any(|e| e.variable == variable) {
            return;
        }
        let value_type = variable.value_type();
        let offset = if value_type.is_int() {
            let offset = self.int_components;
            self.int_components += value_type.components();
            offset
        } else {
            let offset = self.float_components;
            self.float_components += value_type.components();
            offset
        };
        self.entries.push(LayoutEntry { variable, offset });
    }

    /// Resolve a variable to its column offset, or [`INDEX_NONE`].
    pub fn find(&self, variable: ParticleVariable) -> ParticleVariableOffset {
        self.entries
            .iter()
            .find(|e| e.variable == variable)
            .map(|e| e.offset as ParticleVariableOffset)
            .unwrap_or(INDEX_NONE)
    }

    /// Whether a variable is part of this layout.
    #[inline]
    pub fn contains(&self, variable: ParticleVariable) -> bool {
        self.find(variable) != INDEX_NONE
    }

    /// Requested variables with their offsets.
    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    /// Total number of float component columns, required ones included.
    #[inline]
    pub fn float_components(&self) -> usize {
        self.float_components
    }

    /// Total number of int component columns, required ones included.
    #[inline]
    pub fn int_components(&self) -> usize {
        self.int_components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_names_round_trip() {
        for attr in ParticleAttribute::ALL {
            assert_eq!(ParticleVariable::parse(&attr.current().to_string()), Some(attr.current()));
            assert_eq!(ParticleVariable::parse(&attr.previous().to_string()), Some(attr.previous()));
        }
        assert_eq!(ParticleVariable::parse("Previous.Bogus"), None);
    }

    #[test]
    fn test_variable_serializes_as_name() {
        let json = serde_json::to_string(&ParticleAttribute::Color.previous()).unwrap();
        assert_eq!(json, r#""Previous.Color""#);
        let back: ParticleVariable = serde_json::from_str(r#""SpriteSize""#).unwrap();
        assert_eq!(back, ParticleAttribute::SpriteSize.current());
        assert!(serde_json::from_str::<ParticleVariable>(r#""Nope""#).is_err());
    }

    #[test]
    fn test_layout_offsets_follow_required_columns() {
        let layout = ParticleLayout::new([
            ParticleAttribute::Position.current(),
            ParticleAttribute::MeshIndex.current(),
            ParticleAttribute::Color.current(),
            ParticleAttribute::Position.current(),
        ]);
        assert_eq!(layout.find(ParticleAttribute::Position.current()), 4);
        assert_eq!(layout.find(ParticleAttribute::Color.current()), 7);
        assert_eq!(layout.find(ParticleAttribute::MeshIndex.current()), 1);
        assert_eq!(layout.find(ParticleAttribute::Velocity.current()), INDEX_NONE);
        assert_eq!(layout.float_components(), 11);
        assert_eq!(layout.int_components(), 2);
        assert_eq!(layout.entries().len(), 3);
    }
}
