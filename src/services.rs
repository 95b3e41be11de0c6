//! The engine-wide services bundle.
//!
//! [`Services`] holds the input and graphics systems. It is built once at
//! startup and passed by reference to whatever needs it; there is no global
//! instance. Installing is a one-shot step guarded by [`Lifecycle`]: a second
//! `install` is refused until the bundle is [`reset`](Services::reset), which
//! is how a lost device gets replaced.
//!
//! The systems default to trait objects. A host that needs its concrete types
//! back (to feed window events in, or to open a render pass) names them
//! instead, e.g. `Services<Input, MyWindowGraphics>`.

use glam::Vec2;
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use crate::device::GraphicsDevice;
use crate::error::ServiceError;
use crate::shader::Lifecycle;

/// Read access to the current input state.
pub trait InputSystem {
    fn key_down(&self, key: KeyCode) -> bool;

    /// True only on the frame the key went down.
    fn key_pressed(&self, key: KeyCode) -> bool;

    fn mouse_down(&self, button: MouseButton) -> bool;

    fn mouse_delta(&self) -> Vec2;

    fn scroll_delta(&self) -> Vec2;
}

/// The host's graphics system: a device plus the window it renders into.
pub trait GraphicsSystem {
    /// Names the window in log output.
    fn window_label(&self) -> &str;

    /// Width over height of the render target.
    fn aspect(&self) -> f32;

    fn device(&mut self) -> &mut dyn GraphicsDevice;
}

pub struct Services<I: ?Sized = dyn InputSystem, G: ?Sized = dyn GraphicsSystem> {
    lifecycle: Lifecycle,
    input: Option<Box<I>>,
    graphics: Option<Box<G>>,
}

impl<I: ?Sized, G: ?Sized> Default for Services<I, G> {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            input: None,
            graphics: None,
        }
    }
}

impl<I: InputSystem + ?Sized, G: GraphicsSystem + ?Sized> Services<I, G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs both systems. Refused if already installed.
    pub fn install(&mut self, input: Box<I>, graphics: Box<G>) -> Result<(), ServiceError> {
        match self.lifecycle {
            Lifecycle::Ready => {
                log::warn!("services already installed; ignoring install");
                return Err(ServiceError::AlreadyInitialized);
            }
            Lifecycle::Disposed => return Err(ServiceError::Disposed),
            Lifecycle::Uninitialized => {}
        }

        log::info!("services installed for '{}'", graphics.window_label());
        self.input = Some(input);
        self.graphics = Some(graphics);
        self.lifecycle = Lifecycle::Ready;
        Ok(())
    }

    /// Drops both systems and allows a fresh [`install`](Self::install).
    pub fn reset(&mut self) {
        self.input = None;
        self.graphics = None;
        self.lifecycle = Lifecycle::Uninitialized;
        log::info!("services reset");
    }

    /// Drops both systems for good.
    pub fn dispose(&mut self) {
        self.input = None;
        self.graphics = None;
        self.lifecycle = Lifecycle::Disposed;
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    fn not_ready(&self) -> ServiceError {
        match self.lifecycle {
            Lifecycle::Disposed => ServiceError::Disposed,
            _ => ServiceError::NotInitialized,
        }
    }

    pub fn input(&self) -> Result<&I, ServiceError> {
        self.input.as_deref().ok_or_else(|| self.not_ready())
    }

    pub fn input_mut(&mut self) -> Result<&mut I, ServiceError> {
        let err = self.not_ready();
        match self.input.as_deref_mut() {
            Some(input) => Ok(input),
            None => Err(err),
        }
    }

    pub fn graphics(&self) -> Result<&G, ServiceError> {
        self.graphics.as_deref().ok_or_else(|| self.not_ready())
    }

    pub fn graphics_mut(&mut self) -> Result<&mut G, ServiceError> {
        let err = self.not_ready();
        match self.graphics.as_deref_mut() {
            Some(graphics) => Ok(graphics),
            None => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingDevice;
    use crate::input::Input;
    use crate::volume_renderer::VolumeRenderer;
    use glam::Vec3;

    struct Headless {
        label: String,
        device: RecordingDevice,
    }

    impl GraphicsSystem for Headless {
        fn window_label(&self) -> &str {
            &self.label
        }

        fn aspect(&self) -> f32 {
            1.0
        }

        fn device(&mut self) -> &mut dyn GraphicsDevice {
            &mut self.device
        }
    }

    fn headless(label: &str) -> Box<dyn GraphicsSystem> {
        Box::new(Headless {
            label: label.to_string(),
            device: RecordingDevice::new(),
        })
    }

    #[test]
    fn starts_uninitialized() {
        let services: Services = Services::new();
        assert_eq!(services.lifecycle(), Lifecycle::Uninitialized);
        assert_eq!(services.input().err(), Some(ServiceError::NotInitialized));
    }

    #[test]
    fn install_once() {
        let mut services: Services = Services::new();
        services
            .install(Box::new(Input::new()), headless("first"))
            .unwrap();

        let second = services.install(Box::new(Input::new()), headless("second"));

        assert_eq!(second, Err(ServiceError::AlreadyInitialized));
        assert_eq!(services.graphics().unwrap().window_label(), "first");
    }

    #[test]
    fn reset_allows_reinstall() {
        let mut services: Services = Services::new();
        services
            .install(Box::new(Input::new()), headless("first"))
            .unwrap();

        services.reset();
        assert!(!services.is_ready());
        services
            .install(Box::new(Input::new()), headless("second"))
            .unwrap();

        assert_eq!(services.graphics().unwrap().window_label(), "second");
    }

    #[test]
    fn disposed_refuses_everything() {
        let mut services: Services = Services::new();
        services
            .install(Box::new(Input::new()), headless("main"))
            .unwrap();
        services.dispose();

        assert_eq!(services.input().err(), Some(ServiceError::Disposed));
        assert_eq!(
            services.install(Box::new(Input::new()), headless("again")),
            Err(ServiceError::Disposed)
        );
    }

    #[test]
    fn graphics_device_is_reachable() {
        let mut services: Services = Services::new();
        services
            .install(Box::new(Input::new()), headless("main"))
            .unwrap();

        let graphics = services.graphics_mut().unwrap();
        let buffer = graphics.device().create_constant_buffer("reachable", 16);
        assert!(buffer.is_ok());
    }

    #[test]
    fn renderer_initializes_through_services() {
        let mut services: Services = Services::new();
        services
            .install(Box::new(Input::new()), headless("volume-window"))
            .unwrap();

        let graphics = services.graphics_mut().unwrap();
        let label = graphics.window_label().to_string();
        let mut volume = VolumeRenderer::new(Vec3::splat(32.0), Vec3::ZERO);
        volume.initialize(graphics.device(), &label).unwrap();

        assert!(volume.is_initialized());
        services.reset();
        assert_eq!(services.graphics().err(), Some(ServiceError::NotInitialized));
    }

    #[test]
    fn concrete_systems_stay_reachable() {
        let mut services: Services<Input, Headless> = Services::new();
        services
            .install(
                Box::new(Input::new()),
                Box::new(Headless {
                    label: "main".to_string(),
                    device: RecordingDevice::new(),
                }),
            )
            .unwrap();

        services.input_mut().unwrap().begin_frame();
        assert_eq!(services.graphics().unwrap().label, "main");
        assert_eq!(services.lifecycle(), Lifecycle::Ready);
    }
}
