//! Typed constant buffers and the scoped write guard used to fill them.
//!
//! A [`ConstantBuffer<T>`] owns one GPU buffer sized for `T`. Writing goes
//! through [`MappedBuffer`], which maps the buffer with write-discard
//! semantics and unmaps it when dropped, so the release happens on every exit
//! path including early returns.
//!
//! Payload types are `#[repr(C)]` and [`bytemuck::Pod`]. Their size must be a
//! multiple of 16 bytes; [`ConstantBuffer::create`] refuses to compile for
//! any other `T`.

use std::marker::PhantomData;

use bytemuck::Pod;
use glam::Mat4;

use crate::device::{BufferId, DeviceContext, GraphicsDevice, ResourceId};
use crate::error::{FrameSyncError, InitializationError};

/// Constant-buffer sizes are multiples of this.
pub const CONSTANT_BUFFER_ALIGNMENT: usize = 16;

/// Converts a glam matrix to the layout WGSL reads a `mat4x4<f32>` in.
///
/// Every matrix that goes into a payload passes through here.
pub fn gpu_matrix(matrix: Mat4) -> [[f32; 4]; 4] {
    matrix.to_cols_array_2d()
}

/// Scoped write access to a mapped buffer. Unmaps on drop.
pub struct MappedBuffer<'a, C: DeviceContext + ?Sized> {
    ctx: &'a mut C,
    buffer: BufferId,
}

impl<'a, C: DeviceContext + ?Sized> MappedBuffer<'a, C> {
    /// Maps `buffer` for exclusive write, discarding its previous contents.
    pub fn acquire(ctx: &'a mut C, buffer: BufferId) -> Result<Self, FrameSyncError> {
        ctx.map_discard(buffer)?;
        Ok(Self { ctx, buffer })
    }

    /// Copies `bytes` to the start of the mapped region.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), FrameSyncError> {
        let buffer = self.buffer;
        let data = self
            .ctx
            .mapped_data(buffer)
            .ok_or_else(|| FrameSyncError::StaleResource(format!("{buffer:?} is not mapped")))?;

        if bytes.len() > data.len() {
            return Err(FrameSyncError::PayloadSize {
                buffer,
                payload: bytes.len(),
                capacity: data.len(),
            });
        }

        data[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl<C: DeviceContext + ?Sized> Drop for MappedBuffer<'_, C> {
    fn drop(&mut self) {
        self.ctx.unmap(self.buffer);
    }
}

/// A GPU constant buffer holding exactly one `T`.
#[derive(Debug)]
pub struct ConstantBuffer<T> {
    id: BufferId,
    _payload: PhantomData<T>,
}

impl<T: Pod> ConstantBuffer<T> {
    /// Byte size of the buffer.
    pub const SIZE: u64 = std::mem::size_of::<T>() as u64;

    pub fn create<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        label: &str,
    ) -> Result<Self, InitializationError> {
        const {
            assert!(
                std::mem::size_of::<T>() % CONSTANT_BUFFER_ALIGNMENT == 0,
                "constant buffer payloads must be a multiple of 16 bytes"
            )
        };

        let id = device.create_constant_buffer(label, Self::SIZE)?;
        log::debug!("created constant buffer '{label}' ({} bytes)", Self::SIZE);
        Ok(Self {
            id,
            _payload: PhantomData,
        })
    }

    /// Replaces the buffer's contents with `value`.
    pub fn write<C: DeviceContext + ?Sized>(
        &self,
        ctx: &mut C,
        value: &T,
    ) -> Result<(), FrameSyncError> {
        let mut mapped = MappedBuffer::acquire(ctx, self.id)?;
        mapped.write(bytemuck::bytes_of(value))
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn release<D: GraphicsDevice + ?Sized>(self, device: &mut D) {
        device.release(ResourceId::Buffer(self.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Call, RecordingDevice};

    #[repr(C)]
    #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
    struct Payload {
        value: [f32; 4],
    }

    #[test]
    fn write_maps_and_unmaps_once() {
        let mut device = RecordingDevice::new();
        let buffer = ConstantBuffer::<Payload>::create(&mut device, "test").unwrap();

        let mut ctx = device.context();
        buffer
            .write(&mut ctx, &Payload { value: [1.0, 2.0, 3.0, 4.0] })
            .unwrap();

        assert_eq!(
            ctx.calls(),
            &[Call::Map(buffer.id()), Call::Unmap(buffer.id())]
        );
        let contents: [f32; 4] =
            bytemuck::pod_read_unaligned(ctx.buffer_contents(buffer.id()).unwrap());
        assert_eq!(contents, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn failed_map_leaves_nothing_to_release() {
        let mut device = RecordingDevice::new();
        let buffer = ConstantBuffer::<Payload>::create(&mut device, "test").unwrap();

        let mut ctx = device.context();
        ctx.fail_next_map();
        let err = buffer.write(&mut ctx, &Payload { value: [0.0; 4] });

        assert!(matches!(err, Err(FrameSyncError::MapFailed { .. })));
        assert_eq!(ctx.calls(), &[Call::MapFailed(buffer.id())]);
        assert_eq!(ctx.open_maps(), 0);
    }

    #[test]
    fn oversized_payload_still_unmaps() {
        let mut device = RecordingDevice::new();
        let small = device.create_constant_buffer("small", 8).unwrap();

        let mut ctx = device.context();
        {
            let mut mapped = MappedBuffer::acquire(&mut ctx, small).unwrap();
            let err = mapped.write(&[0u8; 16]);
            assert!(matches!(err, Err(FrameSyncError::PayloadSize { .. })));
        }

        assert_eq!(ctx.calls(), &[Call::Map(small), Call::Unmap(small)]);
        assert_eq!(ctx.open_maps(), 0);
    }

    #[test]
    fn gpu_matrix_is_column_major() {
        let m = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let cols = gpu_matrix(m);
        assert_eq!(cols[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
