use glam::Vec3;

use crate::camera::PerspectiveCamera;

/// Closest the camera is ever placed when framing content.
pub const MIN_FRAMING_DISTANCE: f32 = 2.0;
/// Camera distance per unit of the content's largest dimension.
pub const FRAMING_FACTOR: f32 = 1.4;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Smallest box containing every point, or `None` for an empty set.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        points.into_iter().fold(None, |bounds, point| {
            Some(match bounds {
                None => Self {
                    min: point,
                    max: point,
                },
                Some(bounds) => bounds.including(point),
            })
        })
    }

    pub fn including(self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn largest_dimension(&self) -> f32 {
        self.size().max_element()
    }
}

/// Camera distance at which content of the given size fits the viewport.
pub fn fit_distance(size: Vec3) -> f32 {
    (size.max_element() * FRAMING_FACTOR).max(MIN_FRAMING_DISTANCE)
}

/// Result of framing content: where the content was moved and where the
/// camera now sits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framing {
    /// Translation that moves the content's box centre onto the origin.
    pub offset: Vec3,
    pub distance: f32,
}

/// Recentres content with the given bounds at the origin and pulls the
/// camera back along +Z until it fits, looking at the origin.
pub fn frame(bounds: Aabb, camera: &mut PerspectiveCamera) -> Framing {
    let distance = fit_distance(bounds.size());
    camera.target = Vec3::ZERO;
    camera.position = Vec3::new(0.0, 0.0, distance);
    Framing {
        offset: -bounds.center(),
        distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_point_set_has_no_bounds() {
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn bounds_cover_all_points() {
        let bounds = Aabb::from_points([
            Vec3::new(1.0, -2.0, 0.5),
            Vec3::new(-1.0, 4.0, 0.0),
            Vec3::new(0.0, 0.0, 3.0),
        ])
        .unwrap();
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 4.0, 3.0));
        assert_eq!(bounds.largest_dimension(), 6.0);
        assert_eq!(bounds.center(), Vec3::new(0.0, 1.0, 1.5));
    }

    #[test]
    fn small_content_uses_minimum_distance() {
        assert_eq!(fit_distance(Vec3::splat(0.01)), MIN_FRAMING_DISTANCE);
        assert_eq!(fit_distance(Vec3::ZERO), MIN_FRAMING_DISTANCE);
    }

    #[test]
    fn distance_respects_both_lower_bounds() {
        for size in [
            Vec3::new(0.5, 0.2, 0.1),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(3.0, 0.1, 0.1),
            Vec3::new(0.1, 250.0, 7.0),
            Vec3::new(12.0, 9.0, 40.0),
        ] {
            let distance = fit_distance(size);
            assert!(distance >= 2.0);
            assert!(distance >= 1.4 * size.max_element());
        }
        assert!((fit_distance(Vec3::new(1.0, 4.0, 2.0)) - 5.6).abs() < 1e-5);
    }

    #[test]
    fn frame_recentres_and_positions_camera() {
        let bounds = Aabb {
            min: Vec3::new(10.0, 0.0, -1.0),
            max: Vec3::new(14.0, 2.0, 1.0),
        };
        let mut camera = PerspectiveCamera::default();
        camera.target = Vec3::ONE;
        let framing = frame(bounds, &mut camera);
        assert_eq!(framing.offset, Vec3::new(-12.0, -1.0, 0.0));
        assert!((framing.distance - 5.6).abs() < 1e-5);
        assert_eq!(camera.target, Vec3::ZERO);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, framing.distance));
    }
}
