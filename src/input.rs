#[cfg(target_arch = "wasm32")]
pub mod wasm;

use parking_lot::Mutex;

use crate::controls::OrbitControls;

/// Pointer activity accumulated between two frames.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerSnapshot {
    pub dragging: bool,
    pub drag_x: f32,
    pub drag_y: f32,
    pub wheel: f32,
}

impl PointerSnapshot {
    /// Feeds the accumulated gestures into the orbit controls.
    pub fn apply(&self, controls: &mut OrbitControls, viewport_height: f32) {
        controls.set_interacting(self.dragging);
        if self.drag_x != 0.0 || self.drag_y != 0.0 {
            controls.drag(self.drag_x, self.drag_y, viewport_height);
        }
        if self.wheel != 0.0 {
            controls.wheel(self.wheel);
        }
    }
}

/// Pointer input shared between event handlers and the frame loop.
///
/// Handlers record gestures as they arrive; the frame loop drains them once
/// per frame.
#[derive(Debug, Default)]
pub struct PointerInput {
    state: Mutex<PointerSnapshot>,
}

impl PointerInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self) {
        self.state.lock().dragging = true;
    }

    pub fn release(&self) {
        self.state.lock().dragging = false;
    }

    /// Movement only counts while a button is held.
    pub fn move_by(&self, dx: f32, dy: f32) {
        let mut state = self.state.lock();
        if state.dragging {
            state.drag_x += dx;
            state.drag_y += dy;
        }
    }

    pub fn scroll(&self, delta_y: f32) {
        self.state.lock().wheel += delta_y;
    }

    pub fn is_dragging(&self) -> bool {
        self.state.lock().dragging
    }

    /// Returns everything recorded since the last drain. The pressed state
    /// carries over.
    pub fn drain(&self) -> PointerSnapshot {
        let mut state = self.state.lock();
        let snapshot = *state;
        *state = PointerSnapshot {
            dragging: snapshot.dragging,
            ..PointerSnapshot::default()
        };
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;

    #[test]
    fn moves_without_button_are_ignored() {
        let input = PointerInput::new();
        input.move_by(10.0, 5.0);
        assert_eq!(input.drain(), PointerSnapshot::default());
    }

    #[test]
    fn drain_resets_deltas_but_keeps_button() {
        let input = PointerInput::new();
        input.press();
        input.move_by(3.0, 1.0);
        input.move_by(2.0, -4.0);
        input.scroll(120.0);

        let snapshot = input.drain();
        assert!(snapshot.dragging);
        assert_eq!((snapshot.drag_x, snapshot.drag_y), (5.0, -3.0));
        assert_eq!(snapshot.wheel, 120.0);

        let next = input.drain();
        assert!(next.dragging);
        assert_eq!((next.drag_x, next.drag_y, next.wheel), (0.0, 0.0, 0.0));

        input.release();
        assert!(!input.is_dragging());
    }

    #[test]
    fn wheel_snapshot_dollies_camera() {
        let input = PointerInput::new();
        input.scroll(-100.0);
        let mut controls = OrbitControls::default();
        let mut camera = PerspectiveCamera::default();
        input.drain().apply(&mut controls, 600.0);
        controls.update(&mut camera);
        assert!(camera.distance() < 3.0);
    }
}
