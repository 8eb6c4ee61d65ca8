//! Spawn positions sampled from simple shapes.
//!
//! Every shape is an inverse-CDF mapping of a few uniform randoms, so a
//! particle's location is a pure function of its unique index.
//!
//! | Shape | Sampling |
//! |-------|----------|
//! | Box | volume, or faces weighted by area with an inward thickness |
//! | Plane | area in XY, or edges weighted by length |
//! | Cylinder | area-uniform disc times height, along Z |
//! | Sphere | volume-uniform shell between two radii |
//! | Ring | disc in XY; `coverage` 0 keeps only the rim, 1 fills it |

use super::{any_requested, default_enabled, lerp, variable_offsets, ModuleStage, StatelessModule};
use crate::attributes::ParticleAttribute;
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::error::BuildError;
use crate::space::CoordinateSpace;
use crate::{BuiltEnum, GpuLayout};
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

const SEED_SHAPE: u32 = 0;
const SEED_SURFACE: u32 = 1;

/// Shape to sample, in the emitter's local space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Box {
        size: Vec3,
        #[serde(default)]
        surface_only: bool,
        #[serde(default)]
        surface_thickness: f32,
    },
    Plane {
        size: Vec2,
        #[serde(default)]
        edges_only: bool,
    },
    Cylinder {
        height: f32,
        radius: f32,
        /// Fraction of the height that sits below the origin.
        #[serde(default = "default_midpoint")]
        height_midpoint: f32,
    },
    Sphere {
        radius_min: f32,
        radius_max: f32,
    },
    Ring {
        radius: f32,
        /// 0 samples the rim only, 1 the full disc.
        coverage: f32,
        /// Fraction of the full circle swept, starting at +X.
        #[serde(default = "default_arc")]
        arc: f32,
    },
}

fn default_midpoint() -> f32 {
    0.5
}

fn default_arc() -> f32 {
    1.0
}

impl Default for Shape {
    fn default() -> Self {
        Shape::Sphere {
            radius_min: 0.0,
            radius_max: 100.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, BuiltEnum)]
enum ShapeKind {
    Box,
    Plane,
    Cylinder,
    Sphere,
    Ring,
}

/// Offsets spawn positions by a point sampled from a shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeLocation {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub shape: Shape,
    /// Shape center, in local space.
    pub offset: Vec3,
}

impl Default for ShapeLocation {
    fn default() -> Self {
        Self {
            enabled: true,
            shape: Shape::default(),
            offset: Vec3::ZERO,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct ShapeLocationBuiltData {
    position_offset: i32,
    previous_position_offset: i32,
    shape: u32,
    /// Box or plane extents.
    size: Vec3,
    /// Box faces or plane edges only.
    surface_only: u32,
    surface_thickness: f32,
    radius_min: f32,
    radius_max: f32,
    height: f32,
    height_midpoint: f32,
    coverage: f32,
    arc: f32,
    offset: Vec3,
}

impl ShapeLocationBuiltData {
    fn new(shape: &Shape, offset: Vec3, position_offset: i32, previous_position_offset: i32) -> Self {
        let mut data = Self::zeroed();
        data.position_offset = position_offset;
        data.previous_position_offset = previous_position_offset;
        data.offset = offset;
        let kind = match *shape {
            Shape::Box {
                size,
                surface_only,
                surface_thickness,
            } => {
                data.size = size.abs();
                data.surface_only = surface_only as u32;
                data.surface_thickness = surface_thickness.max(0.0);
                ShapeKind::Box
            }
            Shape::Plane { size, edges_only } => {
                data.size = size.abs().extend(0.0);
                data.surface_only = edges_only as u32;
                ShapeKind::Plane
            }
            Shape::Cylinder {
                height,
                radius,
                height_midpoint,
            } => {
                data.height = height;
                data.radius_max = radius;
                data.height_midpoint = height_midpoint;
                ShapeKind::Cylinder
            }
            Shape::Sphere { radius_min, radius_max } => {
                data.radius_min = radius_min.max(0.0);
                data.radius_max = radius_max.max(0.0);
                ShapeKind::Sphere
            }
            Shape::Ring { radius, coverage, arc } => {
                data.radius_max = radius;
                data.coverage = coverage.clamp(0.0, 1.0);
                data.arc = arc.clamp(0.0, 1.0);
                ShapeKind::Ring
            }
        };
        data.shape = kind.into();
        data
    }
}

impl StatelessModule for ShapeLocation {
    const NAME: &'static str = "ShapeLocation";
    const STAGE: ModuleStage = ModuleStage::Location;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (position_offset, previous_position_offset) = variable_offsets(ctx, ParticleAttribute::Position);
        let data = ShapeLocationBuiltData::new(&self.shape, self.offset, position_offset, previous_position_offset);
        let handle = ctx.allocate_built_data(data);
        if self.enabled && any_requested(&[position_offset, previous_position_offset]) {
            ctx.add_particle_simulation_exec(handle, simulate);
        }
        Ok(())
    }
}

/// Point on the shape for two random vectors.
fn sample_shape(data: &ShapeLocationBuiltData, r: Vec4, s: Vec4) -> Vec3 {
    match ShapeKind::from(data.shape) {
        ShapeKind::Box if data.surface_only != 0 => sample_box_surface(data.size, data.surface_thickness, r, s),
        ShapeKind::Box => (r.truncate() - 0.5) * data.size,
        ShapeKind::Plane if data.surface_only != 0 => sample_plane_edge(data.size.truncate(), r),
        ShapeKind::Plane => ((r.truncate().truncate() - 0.5) * data.size.truncate()).extend(0.0),
        ShapeKind::Cylinder => {
            let (sin, cos) = (r.x * TAU).sin_cos();
            let radius = data.radius_max * r.y.sqrt();
            let z = (r.z - data.height_midpoint) * data.height;
            Vec3::new(cos * radius, sin * radius, z)
        }
        ShapeKind::Sphere => {
            let z = 2.0 * r.x - 1.0;
            let ring = (1.0 - z * z).max(0.0).sqrt();
            let (sin, cos) = (r.y * TAU).sin_cos();
            let (lo, hi) = (data.radius_min.powi(3), data.radius_max.powi(3));
            let radius = lerp(lo, hi, r.z).cbrt();
            Vec3::new(ring * cos, ring * sin, z) * radius
        }
        ShapeKind::Ring => {
            let (sin, cos) = (r.x * data.arc * TAU).sin_cos();
            let radius = data.radius_max * (1.0 - data.coverage * r.y).max(0.0).sqrt();
            Vec3::new(cos * radius, sin * radius, 0.0)
        }
    }
}

fn sample_box_surface(size: Vec3, thickness: f32, r: Vec4, s: Vec4) -> Vec3 {
    // Face area for each normal axis
    let area = Vec3::new(size.y * size.z, size.x * size.z, size.x * size.y);
    let total = area.x + area.y + area.z;
    if total <= 0.0 {
        return Vec3::ZERO;
    }
    let pick = r.x * total;
    let axis = if pick < area.x {
        0
    } else if pick < area.x + area.y {
        1
    } else {
        2
    };
    let sign = if r.y < 0.5 { -1.0 } else { 1.0 };
    let mut p = (Vec3::new(r.z, r.w, s.x) - 0.5) * size;
    let half = size[axis] * 0.5;
    p[axis] = sign * (half - (s.y * thickness).min(half));
    p
}

fn sample_plane_edge(size: Vec2, r: Vec4) -> Vec3 {
    let total = size.x + size.y;
    if total <= 0.0 {
        return Vec3::ZERO;
    }
    let sign = if r.y < 0.5 { -1.0 } else { 1.0 };
    let along = r.z - 0.5;
    if r.x * total < size.x {
        Vec3::new(along * size.x, sign * size.y * 0.5, 0.0)
    } else {
        Vec3::new(sign * size.x * 0.5, along * size.y, 0.0)
    }
}

fn simulate(ctx: &mut ParticleSimulationContext<'_>) {
    let data: ShapeLocationBuiltData = ctx.read_built_data();
    let surface = data.surface_only != 0 && ShapeKind::from(data.shape) == ShapeKind::Box;

    for i in 0..ctx.num_instances() {
        let r = ctx.random_float4(i, SEED_SHAPE);
        let s = if surface {
            ctx.random_float4(i, SEED_SURFACE)
        } else {
            Vec4::ZERO
        };
        let local = data.offset + sample_shape(&data, r, s);
        let offset = ctx.to_simulation_vector(CoordinateSpace::Local, local);

        let position: Vec3 = ctx.read_particle_variable(data.position_offset, i, Vec3::ZERO);
        let previous: Vec3 = ctx.read_particle_variable(data.previous_position_offset, i, position);
        ctx.write_particle_variable(data.position_offset, i, position + offset);
        ctx.write_particle_variable(data.previous_position_offset, i, previous + offset);
    }
}
