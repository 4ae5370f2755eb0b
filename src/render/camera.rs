//! Look-at camera shared by every rank
//!
//! All ranks must render with the same camera so their frames line up
//! pixel for pixel.

use glam::{DMat4, DVec3, DVec4};

/// Perspective look-at camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position, also the origin for visibility distances
    pub position: DVec3,
    /// Point the camera looks at
    pub look_at: DVec3,
    /// Up direction
    pub up: DVec3,
    /// Vertical field of view in degrees
    pub fov_y_degrees: f64,
    /// Near clipping plane
    pub near: f64,
    /// Far clipping plane
    pub far: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: DVec3::splat(1.5),
            look_at: DVec3::splat(0.5),
            up: DVec3::Y,
            fov_y_degrees: 60.0,
            near: 1.0,
            far: 10.0,
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.position, self.look_at, self.up)
    }

    pub fn projection_matrix(&self, aspect: f64) -> DMat4 {
        DMat4::perspective_rh(self.fov_y_degrees.to_radians(), aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self, width: u32, height: u32) -> DMat4 {
        let aspect = width as f64 / height.max(1) as f64;
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Project a world point to pixel coordinates (origin top-left).
    ///
    /// Returns `None` for points behind the camera.
    pub fn project(&self, view_projection: &DMat4, point: DVec3, width: u32, height: u32) -> Option<(f64, f64)> {
        let clip: DVec4 = *view_projection * point.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let x = (ndc.x + 1.0) * 0.5 * width as f64;
        let y = (1.0 - ndc.y) * 0.5 * height as f64;
        Some((x, y))
    }
}
