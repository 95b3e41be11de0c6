//! The scene owner: a flat list of game objects updated and drawn in order.

use glam::Mat4;

use crate::device::DeviceContext;
use crate::game_object::{GameObject, ObjectId};

/// Outcome of one [`Scene::render`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub drawn: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct Scene {
    objects: Vec<Box<dyn GameObject>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an object; it is drawn after everything already in the scene.
    pub fn add(&mut self, object: Box<dyn GameObject>) -> ObjectId {
        let id = object.id();
        self.objects.push(object);
        id
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<Box<dyn GameObject>> {
        let index = self.objects.iter().position(|o| o.id() == id)?;
        Some(self.objects.remove(index))
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut dyn GameObject> {
        self.objects
            .iter_mut()
            .find(|o| o.id() == id)
            .map(|o| o.as_mut() as &mut dyn GameObject)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn update(&mut self) {
        for object in &mut self.objects {
            object.update();
        }
    }

    /// Draws every object. An object whose render fails is logged and
    /// skipped; the rest of the frame still draws.
    pub fn render(&mut self, ctx: &mut dyn DeviceContext, view: Mat4, proj: Mat4) -> FrameReport {
        let mut report = FrameReport::default();
        for object in &mut self.objects {
            match object.render(ctx, view, proj) {
                Ok(()) => report.drawn += 1,
                Err(err) => {
                    log::warn!("object {} skipped this frame: {err}", object.id().raw());
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Removes and returns every object, leaving the scene empty.
    pub fn drain(&mut self) -> Vec<Box<dyn GameObject>> {
        std::mem::take(&mut self.objects)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::{Vec3, Vec4};

    use super::*;
    use crate::backend::RecordingDevice;
    use crate::mesh::Primitive;
    use crate::game_object::PrimitiveGameObject;
    use crate::volume_renderer::VolumeRenderer;

    #[test]
    fn failing_object_does_not_stop_the_frame() {
        let mut device = RecordingDevice::new();
        let cube = Rc::new(Primitive::cube(&mut device, "scene-test", Vec4::ONE).unwrap());

        let mut volume = VolumeRenderer::new(Vec3::splat(2.0), Vec3::ZERO);
        volume.initialize(&mut device, "scene-test").unwrap();

        let mut scene = Scene::new();
        scene.add(Box::new(PrimitiveGameObject::new(cube.clone())));
        // no source texture or camera: render fails
        scene.add(Box::new(volume));
        scene.add(Box::new(PrimitiveGameObject::new(cube)));

        let mut ctx = device.context();
        scene.update();
        let report = scene.render(&mut ctx, Mat4::IDENTITY, Mat4::IDENTITY);

        assert_eq!(report, FrameReport { drawn: 2, failed: 1 });
        assert_eq!(ctx.draws().len(), 2);
    }

    #[test]
    fn update_runs_for_every_object() {
        let mut scene = Scene::new();
        let id = scene.add(Box::new(PrimitiveGameObject::empty()));
        scene
            .get_mut(id)
            .unwrap()
            .transform_mut()
            .position = Vec3::new(0.0, 3.0, 0.0);

        scene.update();

        let object = scene.get_mut(id).unwrap();
        assert_eq!(object.bounds().world_aabb().center(), Vec3::new(0.0, 3.0, 0.0));
    }

    #[test]
    fn remove_by_id() {
        let mut scene = Scene::new();
        let a = scene.add(Box::new(PrimitiveGameObject::empty()));
        let b = scene.add(Box::new(PrimitiveGameObject::empty()));

        let removed = scene.remove(a).unwrap();

        assert_eq!(removed.id(), a);
        assert_eq!(scene.len(), 1);
        assert!(scene.get_mut(b).is_some());
        assert!(scene.remove(a).is_none());
    }
}
