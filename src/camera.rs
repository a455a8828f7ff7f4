use glam::{Mat4, Vec3};

pub const DEFAULT_FOV_DEGREES: f32 = 60.0;
pub const DEFAULT_NEAR: f32 = 0.1;
pub const DEFAULT_FAR: f32 = 100.0;
pub const INITIAL_DISTANCE: f32 = 3.0;

/// Perspective camera looking at an orbit target.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            fov_degrees: DEFAULT_FOV_DEGREES,
            aspect: 16.0 / 9.0,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
            position: Vec3::new(0.0, 0.0, INITIAL_DISTANCE),
            target: Vec3::ZERO,
        }
    }
}

impl PerspectiveCamera {
    /// Updates the aspect ratio from a viewport size; degenerate sizes are ignored.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }

    pub fn distance(&self) -> f32 {
        self.position.distance(self.target)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_degrees.to_radians(),
            self.aspect.max(0.01),
            self.near,
            self.far,
        )
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection() * self.view()
    }
}
