//! Game objects: a transform, bounds, and something to draw.
//!
//! [`GameObject`] is the interface the [`Scene`](crate::Scene) drives each
//! frame. [`PrimitiveGameObject`] is the basic implementation: it owns its
//! [`Transform`] and [`Bounds`] and shares an immutable [`Primitive`] with
//! any copies of itself.
//!
//! ```no_run
//! use std::rc::Rc;
//! use plume::{GameObject, Primitive, PrimitiveGameObject, Vec3, Vec4};
//! # fn demo(device: &mut dyn plume::GraphicsDevice) -> Result<(), plume::InitializationError> {
//! let cube = Rc::new(Primitive::cube(device, "demo", Vec4::ONE)?);
//!
//! let mut a = PrimitiveGameObject::new(cube);
//! a.transform_mut().position = Vec3::new(2.0, 0.0, 0.0);
//!
//! // same cube geometry, independent placement
//! let mut b = a.clone();
//! b.transform_mut().position = Vec3::new(-2.0, 0.0, 0.0);
//! # Ok(())
//! # }
//! ```

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::Mat4;

use crate::bounds::{Bounds, BoundsShape};
use crate::device::{DeviceContext, GraphicsDevice};
use crate::error::RenderError;
use crate::mesh::Primitive;
use crate::transform::Transform;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a game object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Something the scene updates and draws each frame.
pub trait GameObject {
    fn id(&self) -> ObjectId;

    fn transform(&self) -> &Transform;

    fn transform_mut(&mut self) -> &mut Transform;

    fn bounds(&self) -> &Bounds;

    /// Per-frame simulation step. Runs before [`render`](Self::render).
    fn update(&mut self);

    fn render(
        &mut self,
        ctx: &mut dyn DeviceContext,
        view: Mat4,
        proj: Mat4,
    ) -> Result<(), RenderError>;
}

/// A game object drawn with a shared [`Primitive`].
///
/// Cloning produces a new object (new id, own transform and bounds) that
/// draws the same primitive.
#[derive(Debug)]
pub struct PrimitiveGameObject {
    id: ObjectId,
    transform: Transform,
    bounds: Bounds,
    primitive: Option<Rc<Primitive>>,
}

impl PrimitiveGameObject {
    pub fn new(primitive: Rc<Primitive>) -> Self {
        Self {
            primitive: Some(primitive),
            ..Self::empty()
        }
    }

    /// An object with a transform and bounds but nothing to draw.
    pub fn empty() -> Self {
        let id = ObjectId::next();
        Self {
            id,
            transform: Transform::owned_by(id),
            bounds: Bounds::owned_by(id, BoundsShape::UNIT_BOX),
            primitive: None,
        }
    }

    pub fn primitive(&self) -> Option<&Rc<Primitive>> {
        self.primitive.as_ref()
    }

    /// Drops this object's share of the primitive, releasing its GPU
    /// resources if no other object still uses it.
    pub fn release(self, device: &mut dyn GraphicsDevice) {
        if let Some(primitive) = self.primitive.and_then(|rc| Rc::try_unwrap(rc).ok()) {
            primitive.release(device);
        }
    }
}

impl Clone for PrimitiveGameObject {
    fn clone(&self) -> Self {
        let id = ObjectId::next();
        let mut transform = Transform::owned_by(id);
        transform.copy_spatial_from(&self.transform);

        Self {
            id,
            transform,
            bounds: Bounds::owned_by(id, self.bounds.shape()),
            primitive: self.primitive.clone(),
        }
    }
}

impl GameObject for PrimitiveGameObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn transform(&self) -> &Transform {
        &self.transform
    }

    fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn update(&mut self) {
        self.bounds.update(&self.transform);
    }

    fn render(
        &mut self,
        ctx: &mut dyn DeviceContext,
        view: Mat4,
        proj: Mat4,
    ) -> Result<(), RenderError> {
        let Some(primitive) = &self.primitive else {
            return Ok(());
        };
        primitive.draw(ctx, self.transform.world_matrix(), view, proj)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingDevice;
    use crate::device::ShaderStage;
    use crate::flat_shader::FlatVertexUniforms;
    use glam::{Quat, Vec3, Vec4};

    fn cube(device: &mut RecordingDevice) -> Rc<Primitive> {
        Rc::new(Primitive::cube(device, "object-test", Vec4::ONE).unwrap())
    }

    #[test]
    fn clone_shares_primitive_but_not_transform() {
        let mut device = RecordingDevice::new();
        let mut original = PrimitiveGameObject::new(cube(&mut device));
        original.transform_mut().position = Vec3::new(1.0, 2.0, 3.0);
        original.transform_mut().rotation = Quat::from_rotation_y(0.4);

        let mut copy = original.clone();
        copy.transform_mut().position = Vec3::ZERO;

        assert_eq!(original.transform().position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(copy.transform().rotation, original.transform().rotation);
        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.transform().owner(), Some(copy.id()));
        assert_eq!(copy.bounds().owner(), Some(copy.id()));
        assert!(Rc::ptr_eq(
            original.primitive().unwrap(),
            copy.primitive().unwrap()
        ));
    }

    #[test]
    fn update_refreshes_bounds() {
        let mut object = PrimitiveGameObject::empty();
        object.transform_mut().position = Vec3::new(5.0, 0.0, 0.0);

        object.update();

        assert_eq!(object.bounds().world_aabb().center(), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn render_uses_world_matrix() {
        let mut device = RecordingDevice::new();
        let mut object = PrimitiveGameObject::new(cube(&mut device));
        object.transform_mut().position = Vec3::new(0.0, 1.0, 0.0);
        let mut ctx = device.context();

        object
            .render(&mut ctx, Mat4::IDENTITY, Mat4::IDENTITY)
            .unwrap();

        let draw = &ctx.draws()[0];
        let uniforms: FlatVertexUniforms = draw.constant(ShaderStage::Vertex, 0).unwrap();
        assert_eq!(uniforms.world[3], [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn copies_draw_independently_in_one_frame() {
        let mut device = RecordingDevice::new();
        let mut a = PrimitiveGameObject::new(cube(&mut device));
        let mut b = a.clone();
        a.transform_mut().position = Vec3::X;
        b.transform_mut().position = Vec3::Y;
        let mut ctx = device.context();

        a.render(&mut ctx, Mat4::IDENTITY, Mat4::IDENTITY).unwrap();
        b.render(&mut ctx, Mat4::IDENTITY, Mat4::IDENTITY).unwrap();

        let draws = ctx.draws();
        let first: FlatVertexUniforms = draws[0].constant(ShaderStage::Vertex, 0).unwrap();
        let second: FlatVertexUniforms = draws[1].constant(ShaderStage::Vertex, 0).unwrap();
        assert_eq!(first.world[3], [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(second.world[3], [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn empty_object_draws_nothing() {
        let device = RecordingDevice::new();
        let mut object = PrimitiveGameObject::empty();
        let mut ctx = device.context();

        object.render(&mut ctx, Mat4::IDENTITY, Mat4::IDENTITY).unwrap();

        assert!(ctx.calls().is_empty());
    }

    #[test]
    fn last_copy_releases_primitive() {
        let mut device = RecordingDevice::new();
        let a = PrimitiveGameObject::new(cube(&mut device));
        let b = a.clone();

        a.release(&mut device);
        assert!(device.live_buffers() > 0);

        b.release(&mut device);
        assert_eq!(device.live_buffers(), 0);
    }
}
