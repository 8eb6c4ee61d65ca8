//! Coordinate spaces and the transforms between them.

use glam::{Affine3A, Quat, Vec3};
use serde::{Deserialize, Serialize};
use stateless_particles_derive::BuiltEnum;

/// Space a module's authored values are expressed in.
///
/// Stored in built data as a `u32` via [`BuiltEnum`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, BuiltEnum)]
pub enum CoordinateSpace {
    /// Whatever space the emitter simulates in.
    #[default]
    Simulation,
    World,
    Local,
}

/// Component transform of the emitter's owner, local to world.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalToWorld {
    pub rotation: Quat,
    pub translation: Vec3,
    pub scale: Vec3,
}

impl Default for LocalToWorld {
    fn default() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl LocalToWorld {
    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Precomputed space conversions for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpaceTransforms {
    simulation_space: CoordinateSpace,
    local_to_world: Affine3A,
    world_to_local: Affine3A,
    rotation: Quat,
}

impl SpaceTransforms {
    /// `simulation_space` must be `World` or `Local`; `Simulation` is read as `World`.
    pub fn new(simulation_space: CoordinateSpace, local_to_world: &LocalToWorld) -> Self {
        let simulation_space = match simulation_space {
            CoordinateSpace::Simulation => CoordinateSpace::World,
            space => space,
        };
        let affine = local_to_world.to_affine();
        Self {
            simulation_space,
            local_to_world: affine,
            world_to_local: affine.inverse(),
            rotation: local_to_world.rotation.normalize(),
        }
    }

    #[inline]
    pub fn simulation_space(&self) -> CoordinateSpace {
        self.simulation_space
    }

    /// Rotation from `source` into simulation space.
    pub fn to_simulation_rotation(&self, source: CoordinateSpace) -> Quat {
        match (source, self.simulation_space) {
            (CoordinateSpace::Local, CoordinateSpace::World) => self.rotation,
            (CoordinateSpace::World, CoordinateSpace::Local) => self.rotation.inverse(),
            _ => Quat::IDENTITY,
        }
    }

    /// Transform a point from `source` into simulation space.
    pub fn to_simulation_position(&self, source: CoordinateSpace, position: Vec3) -> Vec3 {
        match (source, self.simulation_space) {
            (CoordinateSpace::Local, CoordinateSpace::World) => {
                self.local_to_world.transform_point3(position)
            }
            (CoordinateSpace::World, CoordinateSpace::Local) => {
                self.world_to_local.transform_point3(position)
            }
            _ => position,
        }
    }

    /// Transform a direction from `source` into simulation space, including scale.
    pub fn to_simulation_vector(&self, source: CoordinateSpace, vector: Vec3) -> Vec3 {
        match (source, self.simulation_space) {
            (CoordinateSpace::Local, CoordinateSpace::World) => {
                self.local_to_world.transform_vector3(vector)
            }
            (CoordinateSpace::World, CoordinateSpace::Local) => {
                self.world_to_local.transform_vector3(vector)
            }
            _ => vector,
        }
    }
}

impl Default for SpaceTransforms {
    fn default() -> Self {
        Self::new(CoordinateSpace::World, &LocalToWorld::default())
    }
}
