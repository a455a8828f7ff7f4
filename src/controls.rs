use std::f32::consts::{PI, TAU};

use glam::Vec3;

use crate::camera::PerspectiveCamera;

const POLAR_EPSILON: f32 = 1e-6;

/// Spherical coordinates around the orbit target, Y up.
///
/// `theta` is the azimuth measured from +Z towards +X, `phi` the polar angle
/// measured from +Y.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Spherical {
    pub radius: f32,
    pub theta: f32,
    pub phi: f32,
}

impl Spherical {
    pub fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return Self::default();
        }
        Self {
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    pub fn to_offset(self) -> Vec3 {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vec3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }
}

/// Orbit camera controller with damped rotation, wheel dolly and optional
/// automatic rotation around the target.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub auto_rotate: bool,
    /// Thirty seconds per orbit at 60 fps when set to 2.0.
    pub auto_rotate_speed: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    spherical_delta: Spherical,
    scale: f32,
    interacting: bool,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            enable_damping: true,
            damping_factor: 0.05,
            auto_rotate: false,
            auto_rotate_speed: 2.0,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            spherical_delta: Spherical::default(),
            scale: 1.0,
            interacting: false,
        }
    }
}

impl OrbitControls {
    pub fn new(auto_rotate: bool, auto_rotate_speed: f32) -> Self {
        Self {
            auto_rotate,
            auto_rotate_speed,
            ..Self::default()
        }
    }

    /// Rotation applied per frame while auto-rotating.
    pub fn auto_rotation_angle(&self) -> f32 {
        TAU / 60.0 / 60.0 * self.auto_rotate_speed
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.spherical_delta.theta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.spherical_delta.phi -= angle;
    }

    /// Marks a pointer drag as in progress; auto-rotation pauses meanwhile.
    pub fn set_interacting(&mut self, interacting: bool) {
        self.interacting = interacting;
    }

    /// Converts a pointer drag in CSS pixels into an orbit rotation.
    pub fn drag(&mut self, dx: f32, dy: f32, viewport_height: f32) {
        let height = viewport_height.max(1.0);
        self.rotate_left(TAU * dx / height * self.rotate_speed);
        self.rotate_up(TAU * dy / height * self.rotate_speed);
    }

    /// Wheel input: negative deltas move towards the target.
    pub fn wheel(&mut self, delta_y: f32) {
        let step = 0.95_f32.powf(self.zoom_speed);
        if delta_y < 0.0 {
            self.scale *= step;
        } else if delta_y > 0.0 {
            self.scale /= step;
        }
    }

    /// Advances damping and auto-rotation and repositions the camera.
    ///
    /// Returns `true` when the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let offset = camera.position - camera.target;
        let mut spherical = Spherical::from_offset(offset);

        if self.auto_rotate && !self.interacting {
            self.rotate_left(self.auto_rotation_angle());
        }

        if self.enable_damping {
            spherical.theta += self.spherical_delta.theta * self.damping_factor;
            spherical.phi += self.spherical_delta.phi * self.damping_factor;
        } else {
            spherical.theta += self.spherical_delta.theta;
            spherical.phi += self.spherical_delta.phi;
        }

        spherical.phi = spherical
            .phi
            .clamp(self.min_polar_angle, self.max_polar_angle)
            .clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        spherical.radius =
            (spherical.radius * self.scale).clamp(self.min_distance, self.max_distance);

        let previous = camera.position;
        camera.position = camera.target + spherical.to_offset();

        if self.enable_damping {
            self.spherical_delta.theta *= 1.0 - self.damping_factor;
            self.spherical_delta.phi *= 1.0 - self.damping_factor;
        } else {
            self.spherical_delta = Spherical::default();
        }
        self.scale = 1.0;

        previous.distance_squared(camera.position) > 1e-12
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn azimuth(camera: &PerspectiveCamera) -> f32 {
        Spherical::from_offset(camera.position - camera.target).theta
    }

    #[test]
    fn spherical_round_trips_offsets() {
        let offset = Vec3::new(1.0, 2.0, -3.0);
        let back = Spherical::from_offset(offset).to_offset();
        assert!((back - offset).length() < 1e-5);
    }

    #[test]
    fn idle_controls_keep_camera_still() {
        let mut controls = OrbitControls::default();
        let mut camera = PerspectiveCamera::default();
        assert!(!controls.update(&mut camera));
        assert!((camera.position - Vec3::new(0.0, 0.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn auto_rotation_reaches_configured_rate() {
        let mut controls = OrbitControls::new(true, 0.4);
        let mut camera = PerspectiveCamera::default();
        for _ in 0..400 {
            controls.update(&mut camera);
        }
        let before = azimuth(&camera);
        controls.update(&mut camera);
        let step = before - azimuth(&camera);
        assert!((step - controls.auto_rotation_angle()).abs() < 1e-5);
        assert!((camera.distance() - 3.0).abs() < 1e-4);
    }

    #[test]
    fn interaction_pauses_auto_rotation() {
        let mut controls = OrbitControls::new(true, 0.4);
        controls.set_interacting(true);
        let mut camera = PerspectiveCamera::default();
        assert!(!controls.update(&mut camera));
    }

    #[test]
    fn damped_drag_converges_to_full_rotation() {
        let mut controls = OrbitControls::default();
        let mut camera = PerspectiveCamera::default();
        // A drag of half the viewport height turns by half a revolution.
        controls.drag(50.0, 0.0, 100.0);
        for _ in 0..2000 {
            controls.update(&mut camera);
        }
        let turned = azimuth(&camera).rem_euclid(TAU);
        assert!((turned - PI).abs() < 1e-3, "turned {turned}");
    }

    #[test]
    fn polar_angle_never_flips_over_the_pole() {
        let mut controls = OrbitControls::default();
        controls.enable_damping = false;
        let mut camera = PerspectiveCamera::default();
        controls.drag(0.0, 500.0, 100.0);
        controls.update(&mut camera);
        assert!(camera.position.y > 0.0);
        assert!(camera.position.y <= 3.0);
    }

    #[test]
    fn wheel_dollies_towards_and_away_from_target() {
        let mut controls = OrbitControls::default();
        let mut camera = PerspectiveCamera::default();
        controls.wheel(-120.0);
        controls.update(&mut camera);
        assert!((camera.distance() - 3.0 * 0.95).abs() < 1e-4);
        controls.wheel(120.0);
        controls.update(&mut camera);
        assert!((camera.distance() - 3.0).abs() < 1e-4);
    }
}
