//! Builder-style configuration for the demo window and the volume renderer.

use glam::{UVec3, Vec3, Vec4};

use crate::device::StageDescription;
use crate::logging::LoggingConfig;

/// How the smoke is shaded. Edited live by the host's UI.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmokeProperties {
    /// RGBA tint; alpha scales the final opacity.
    pub color: Vec4,
    /// Extinction per unit density. Higher is thicker smoke.
    pub absorption: f32,
    /// Ray-march steps through the volume.
    pub num_samples: i32,
}

impl Default for SmokeProperties {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            absorption: 60.0,
            num_samples: 64,
        }
    }
}

impl SmokeProperties {
    pub const MIN_SAMPLES: i32 = 1;
    pub const MAX_SAMPLES: i32 = 512;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn color(mut self, color: Vec4) -> Self {
        self.color = color;
        self
    }

    /// Negative values are clamped to zero.
    pub fn absorption(mut self, absorption: f32) -> Self {
        self.absorption = absorption.max(0.0);
        self
    }

    /// Clamped to `MIN_SAMPLES..=MAX_SAMPLES`.
    pub fn num_samples(mut self, samples: i32) -> Self {
        self.num_samples = samples.clamp(Self::MIN_SAMPLES, Self::MAX_SAMPLES);
        self
    }
}

/// Construction parameters for a [`VolumeRenderer`](crate::VolumeRenderer).
#[derive(Clone, Debug)]
pub struct VolumeConfig {
    /// Grid resolution of the density texture, in cells.
    pub size: UVec3,
    pub position: Vec3,
    pub smoke: SmokeProperties,
    pub vertex_stage: StageDescription,
    pub pixel_stage: StageDescription,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            size: UVec3::splat(64),
            position: Vec3::ZERO,
            smoke: SmokeProperties::default(),
            vertex_stage: StageDescription::new(
                crate::volume_shader::VOLUME_SHADER_SOURCE,
                crate::volume_shader::VOLUME_VERTEX_ENTRY,
            ),
            pixel_stage: StageDescription::new(
                crate::volume_shader::VOLUME_SHADER_SOURCE,
                crate::volume_shader::VOLUME_PIXEL_ENTRY,
            ),
        }
    }
}

impl VolumeConfig {
    pub fn new(size: UVec3) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn smoke(mut self, smoke: SmokeProperties) -> Self {
        self.smoke = smoke;
        self
    }

    /// Overrides the shader sources, e.g. to load edited WGSL from disk.
    pub fn stages(mut self, vertex: StageDescription, pixel: StageDescription) -> Self {
        self.vertex_stage = vertex;
        self.pixel_stage = pixel;
        self
    }
}

/// Window and startup configuration for the demo.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub clear_color: [f64; 4],
    pub logging: LoggingConfig,
    pub volume: VolumeConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Plume".to_string(),
            width: 1280,
            height: 720,
            clear_color: [0.05, 0.06, 0.08, 1.0],
            logging: LoggingConfig::default(),
            volume: VolumeConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn clear_color(mut self, color: [f64; 4]) -> Self {
        self.clear_color = color;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn volume(mut self, volume: VolumeConfig) -> Self {
        self.volume = volume;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoke_defaults() {
        let smoke = SmokeProperties::default();
        assert_eq!(smoke.color, Vec4::ONE);
        assert_eq!(smoke.absorption, 60.0);
        assert_eq!(smoke.num_samples, 64);
    }

    #[test]
    fn smoke_builder_clamps() {
        let smoke = SmokeProperties::new().absorption(-3.0).num_samples(100_000);
        assert_eq!(smoke.absorption, 0.0);
        assert_eq!(smoke.num_samples, SmokeProperties::MAX_SAMPLES);
    }

    #[test]
    fn volume_config_builder() {
        let config = VolumeConfig::new(UVec3::new(32, 64, 32)).position(Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(config.size, UVec3::new(32, 64, 32));
        assert_eq!(config.position, Vec3::X);
        assert_eq!(config.pixel_stage.entry_point, crate::volume_shader::VOLUME_PIXEL_ENTRY);
    }
}
