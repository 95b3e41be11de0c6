//! Error types for shader setup and per-frame synchronization.
//!
//! Two failure classes exist and they are handled very differently:
//!
//! - [`InitializationError`] is fatal for the shader (and for whatever owns
//!   it). It is propagated with `?` through every `initialize` in the chain.
//! - [`FrameSyncError`] is fatal only for the current draw. The scene logs it,
//!   skips the object, and carries on with the rest of the frame.
//!
//! Nothing is retried.

use thiserror::Error;

use crate::device::{BufferId, ShaderStage};

/// Device or resource creation failed. The shader that hit it is unusable.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("graphics device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("shader source '{source_name}' could not be resolved: {reason}")]
    SourceNotFound { source_name: String, reason: String },

    #[error("{stage:?} stage '{entry_point}' in '{source_name}' failed to compile")]
    StageCompilation {
        stage: ShaderStage,
        source_name: String,
        entry_point: String,
    },

    #[error("input layout rejected: {0}")]
    InputLayout(String),

    #[error("binding layout rejected: {0}")]
    BindingLayout(String),

    #[error("stages failed to link: {0}")]
    PipelineLink(String),

    #[error("failed to create constant buffer '{label}' ({size} bytes)")]
    BufferCreation { label: String, size: u64 },

    #[error("failed to create sampler state")]
    SamplerCreation,

    #[error("failed to create geometry '{0}'")]
    GeometryCreation(String),
}

/// Why a buffer could not be acquired for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFailure {
    /// The id does not name a live buffer.
    UnknownBuffer,
    /// The buffer is still mapped from an earlier acquire.
    AlreadyMapped,
    /// The device was lost.
    DeviceLost,
    /// The driver refused the request (out of memory, busy beyond limits).
    Refused,
}

/// A per-frame submission step failed. The current draw must be skipped.
#[derive(Debug, Error)]
pub enum FrameSyncError {
    #[error("failed to map {buffer:?} for writing: {reason:?}")]
    MapFailed { buffer: BufferId, reason: MapFailure },

    #[error("payload of {payload} bytes does not fit {buffer:?} ({capacity} bytes)")]
    PayloadSize {
        buffer: BufferId,
        payload: usize,
        capacity: usize,
    },

    #[error("nothing bound to {stage:?} {kind} slot {slot}")]
    UnboundSlot {
        stage: ShaderStage,
        kind: &'static str,
        slot: u32,
    },

    #[error("draw referenced a released or unknown resource: {0}")]
    StaleResource(String),

    #[error("failed to build a pipeline: {0}")]
    Pipeline(String),
}

/// Errors surfaced by a game object's `render`.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("object rendered before initialization")]
    NotInitialized,

    #[error("no source texture has been set")]
    MissingSourceTexture,

    #[error("no camera has been set")]
    MissingCamera,

    #[error(transparent)]
    FrameSync(#[from] FrameSyncError),
}

/// Misuse of the [`Services`](crate::services::Services) lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("services are already installed; reset them first")]
    AlreadyInitialized,

    #[error("services have not been installed")]
    NotInitialized,

    #[error("services were disposed")]
    Disposed,
}

/// A declared input layout disagrees with the vertex type it describes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutMismatch {
    #[error("layout stride is {declared} bytes but the vertex is {actual}")]
    Stride { declared: u32, actual: u32 },

    #[error("layout declares {declared} elements but the vertex has {actual}")]
    ElementCount { declared: usize, actual: usize },

    #[error("element {index} ('{semantic}') differs in offset, format or location")]
    Element { index: usize, semantic: &'static str },
}
