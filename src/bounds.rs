//! World-space bounding volumes refreshed from a [`Transform`].

use glam::Vec3;

use crate::game_object::ObjectId;
use crate::transform::Transform;

/// An axis-aligned box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// The degenerate box at the origin.
    pub const ZERO: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => Self { min: p, max: p },
                Some(Self { min, max }) => Self {
                    min: min.min(p),
                    max: max.max(p),
                },
            })
        })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }
}

/// Local-space shape the bounds are derived from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundsShape {
    /// Box defined by half-extents. `(0.5, 0.5, 0.5)` wraps the unit cube.
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
}

impl BoundsShape {
    /// The box enclosing the unit cube primitive.
    pub const UNIT_BOX: Self = Self::Box {
        half_extents: Vec3::splat(0.5),
    };
}

/// Bounding volume owned by one game object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    shape: BoundsShape,
    world: Aabb,
    owner: Option<ObjectId>,
}

impl Bounds {
    pub fn new(shape: BoundsShape) -> Self {
        Self {
            shape,
            world: Aabb::ZERO,
            owner: None,
        }
    }

    pub fn owned_by(owner: ObjectId, shape: BoundsShape) -> Self {
        Self {
            owner: Some(owner),
            ..Self::new(shape)
        }
    }

    pub fn shape(&self) -> BoundsShape {
        self.shape
    }

    pub fn owner(&self) -> Option<ObjectId> {
        self.owner
    }

    /// World box as of the last [`update`](Self::update).
    pub fn world_aabb(&self) -> Aabb {
        self.world
    }

    /// Recomputes the world box from `transform`.
    pub fn update(&mut self, transform: &Transform) {
        self.world = match self.shape {
            BoundsShape::Box { half_extents } => {
                let world = transform.world_matrix();
                let corners = (0..8).map(|i| {
                    let sign = Vec3::new(
                        if i & 1 == 0 { -1.0 } else { 1.0 },
                        if i & 2 == 0 { -1.0 } else { 1.0 },
                        if i & 4 == 0 { -1.0 } else { 1.0 },
                    );
                    world.transform_point3(half_extents * sign)
                });
                Aabb::from_points(corners).unwrap_or(Aabb::ZERO)
            }
            BoundsShape::Sphere { radius } => {
                let r = Vec3::splat(radius * transform.scale_factors().max_element());
                Aabb {
                    min: transform.position - r,
                    max: transform.position + r,
                }
            }
        };
    }
}
