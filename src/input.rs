use std::collections::HashSet;

use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::services::InputSystem;

/// Keyboard and mouse state built from winit window events.
///
/// "Pressed" and "released" sets only hold transitions since the last
/// [`begin_frame`](Self::begin_frame); "down" sets persist.
#[derive(Debug, Default)]
pub struct Input {
    keys_down: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    keys_released: HashSet<KeyCode>,
    mouse_buttons_down: HashSet<MouseButton>,
    mouse_buttons_pressed: HashSet<MouseButton>,
    mouse_position: Option<Vec2>,
    mouse_delta: Vec2,
    scroll_delta: Vec2,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the start of each frame to reset per-frame state.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
        self.mouse_buttons_pressed.clear();
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = Vec2::ZERO;
    }

    /// Process a window event and update input state.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    self.apply_key(key, event.state);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.apply_mouse_button(*button, *state);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.apply_cursor(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(x, y) => Vec2::new(*x, *y),
                    MouseScrollDelta::PixelDelta(pos) => {
                        Vec2::new(pos.x as f32, pos.y as f32) / 120.0
                    }
                };
            }
            WindowEvent::Focused(false) => {
                // keys released while unfocused never arrive
                self.keys_down.clear();
                self.mouse_buttons_down.clear();
            }
            _ => {}
        }
    }

    fn apply_key(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                // auto-repeat arrives as repeated presses
                if self.keys_down.insert(key) {
                    self.keys_pressed.insert(key);
                }
            }
            ElementState::Released => {
                self.keys_down.remove(&key);
                self.keys_released.insert(key);
            }
        }
    }

    fn apply_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if self.mouse_buttons_down.insert(button) {
                    self.mouse_buttons_pressed.insert(button);
                }
            }
            ElementState::Released => {
                self.mouse_buttons_down.remove(&button);
            }
        }
    }

    fn apply_cursor(&mut self, position: Vec2) {
        if let Some(previous) = self.mouse_position {
            self.mouse_delta += position - previous;
        }
        self.mouse_position = Some(position);
    }

    /// Returns true if the key was released this frame.
    pub fn key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }

    /// Returns true if the mouse button was pressed this frame.
    pub fn mouse_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons_pressed.contains(&button)
    }

    /// Last known cursor position in window coordinates.
    pub fn mouse_position(&self) -> Option<Vec2> {
        self.mouse_position
    }
}

impl InputSystem for Input {
    fn key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    fn key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    fn mouse_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons_down.contains(&button)
    }

    fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    fn scroll_delta(&self) -> Vec2 {
        self.scroll_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_is_reported_once() {
        let mut input = Input::new();

        input.apply_key(KeyCode::ArrowUp, ElementState::Pressed);
        input.apply_key(KeyCode::ArrowUp, ElementState::Pressed);
        assert!(input.key_pressed(KeyCode::ArrowUp));
        assert!(input.key_down(KeyCode::ArrowUp));

        input.begin_frame();
        input.apply_key(KeyCode::ArrowUp, ElementState::Pressed);
        assert!(!input.key_pressed(KeyCode::ArrowUp));
        assert!(input.key_down(KeyCode::ArrowUp));
    }

    #[test]
    fn release_clears_down() {
        let mut input = Input::new();
        input.apply_key(KeyCode::BracketLeft, ElementState::Pressed);
        input.apply_key(KeyCode::BracketLeft, ElementState::Released);

        assert!(!input.key_down(KeyCode::BracketLeft));
        assert!(input.key_released(KeyCode::BracketLeft));
    }

    #[test]
    fn first_cursor_event_has_no_delta() {
        let mut input = Input::new();
        input.apply_cursor(Vec2::new(100.0, 100.0));
        assert_eq!(input.mouse_delta(), Vec2::ZERO);

        input.apply_cursor(Vec2::new(110.0, 95.0));
        assert_eq!(input.mouse_delta(), Vec2::new(10.0, -5.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }

    #[test]
    fn mouse_buttons() {
        let mut input = Input::new();
        input.apply_mouse_button(MouseButton::Left, ElementState::Pressed);
        assert!(input.mouse_down(MouseButton::Left));
        assert!(input.mouse_pressed(MouseButton::Left));

        input.apply_mouse_button(MouseButton::Left, ElementState::Released);
        assert!(!input.mouse_down(MouseButton::Left));
    }
}
