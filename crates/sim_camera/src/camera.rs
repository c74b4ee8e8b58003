use glam::{Mat4, Vec3};
use std::f32::consts::FRAC_PI_2;

pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 100.0;

/// Euler angles of the camera relative to the tracked body, in radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MountRotation {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// Fixed transform between the tracked body and the simulated camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountConfig {
    /// Pose stream identifier that drives the camera.
    pub frame_id: u32,
    /// Offset added to the body position (x forward, y left, z up).
    pub position: Vec3,
    /// Accepted but not yet composed into the view orientation.
    pub rotation: MountRotation,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            frame_id: 0,
            position: Vec3::ZERO,
            rotation: MountRotation::default(),
        }
    }
}

/// Perspective projection fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub fovy_deg: f32,
    pub aspect: f32,
    matrix: Mat4,
}

impl Projection {
    pub fn new(fovy_deg: f32, width: u32, height: u32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        // wgpu clip space has depth in [0, 1]; perspective_rh matches it.
        let matrix = Mat4::perspective_rh(fovy_deg.to_radians(), aspect, Z_NEAR, Z_FAR);
        Self {
            fovy_deg,
            aspect,
            matrix,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// The projection with its vertical axis mirrored, so rows come out in
    /// the opposite order.
    pub fn flipped_y(&self) -> Mat4 {
        self.matrix * Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
    }
}

/// Heading convention shared by the camera and tracked instances: external
/// yaw maps to `π/2 − yaw`.
#[inline]
pub fn heading_from_yaw(yaw: f32) -> f32 {
    FRAC_PI_2 - yaw
}

/// Look-at view for an eye at `eye` with the given heading and pitch.
pub fn view_from_angles(eye: Vec3, horizontal: f32, vertical: f32) -> Mat4 {
    let (sin_h, cos_h) = horizontal.sin_cos();
    let (sin_v, cos_v) = vertical.sin_cos();
    let direction = Vec3::new(cos_v * sin_h, cos_v * cos_h, sin_v);

    let (sin_r, cos_r) = (horizontal + FRAC_PI_2).sin_cos();
    let right = Vec3::new(sin_r, cos_r, 0.0);
    let up = right.cross(direction);

    Mat4::look_at_rh(eye, eye + direction, up)
}

/// Tracks the mount frame and keeps the latest view matrix.
#[derive(Debug, Clone)]
pub struct CameraController {
    mount: MountConfig,
    view: Mat4,
    has_pose: bool,
}

impl CameraController {
    pub fn new(mount: MountConfig) -> Self {
        Self {
            mount,
            view: Mat4::IDENTITY,
            has_pose: false,
        }
    }

    /// Recomputes the view when `frame_id` is the mount frame; returns
    /// `false` and leaves the view untouched otherwise.
    pub fn apply_pose_update(&mut self, frame_id: u32, position: Vec3, yaw: f32) -> bool {
        if frame_id != self.mount.frame_id {
            return false;
        }

        // Mount rotation is not composed in; the camera stays level.
        let vertical = 0.0;
        let eye = position + self.mount.position;
        self.view = view_from_angles(eye, heading_from_yaw(yaw), vertical);
        self.has_pose = true;
        true
    }

    pub fn has_pose(&self) -> bool {
        self.has_pose
    }

    /// The most recent view, or `None` before the first mount pose.
    pub fn view(&self) -> Option<Mat4> {
        self.has_pose.then_some(self.view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    fn mount_at(position: Vec3) -> MountConfig {
        MountConfig {
            frame_id: 0,
            position,
            rotation: MountRotation::default(),
        }
    }

    #[test]
    fn no_view_before_first_pose() {
        let mut cam = CameraController::new(mount_at(Vec3::ZERO));
        assert!(cam.view().is_none());

        // Other identifiers never produce a view.
        assert!(!cam.apply_pose_update(4, Vec3::ONE, 0.0));
        assert!(!cam.has_pose());
    }

    #[test]
    fn zero_yaw_looks_along_x() {
        let mut cam = CameraController::new(mount_at(Vec3::new(0.0, 0.0, 5.0)));
        assert!(cam.apply_pose_update(0, Vec3::ZERO, 0.0));
        let view = cam.view().unwrap();

        // The eye sits at the mount offset.
        assert!(approx(view.transform_point3(Vec3::new(0.0, 0.0, 5.0)), Vec3::ZERO));
        // A point ahead on +X lands on the view axis (−Z in view space).
        let ahead = view.transform_point3(Vec3::new(3.0, 0.0, 5.0));
        assert!(approx(ahead, Vec3::new(0.0, 0.0, -3.0)));
        // World up stays up.
        let above = view.transform_point3(Vec3::new(0.0, 0.0, 6.0));
        assert!(approx(above, Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn heading_is_half_pi_minus_yaw() {
        let mut cam = CameraController::new(mount_at(Vec3::ZERO));
        let yaw = FRAC_PI_2;
        cam.apply_pose_update(0, Vec3::ZERO, yaw);
        let view = cam.view().unwrap();

        // Heading 0 looks along +Y.
        let ahead = view.transform_point3(Vec3::new(0.0, 2.0, 0.0));
        assert!(approx(ahead, Vec3::new(0.0, 0.0, -2.0)));
        assert!((heading_from_yaw(yaw)).abs() < 1e-6);
    }

    #[test]
    fn view_is_deterministic_and_latest_wins() {
        let mut a = CameraController::new(mount_at(Vec3::ZERO));
        let mut b = CameraController::new(mount_at(Vec3::ZERO));
        a.apply_pose_update(0, Vec3::new(1.0, 2.0, 0.0), 0.3);
        b.apply_pose_update(0, Vec3::new(9.0, 9.0, 9.0), 1.0);
        b.apply_pose_update(0, Vec3::new(1.0, 2.0, 0.0), 0.3);
        assert_eq!(a.view(), b.view());
    }

    #[test]
    fn mount_rotation_is_not_applied() {
        let mut plain = CameraController::new(mount_at(Vec3::ZERO));
        let mut rotated = CameraController::new(MountConfig {
            rotation: MountRotation {
                roll: 0.1,
                pitch: 0.2,
                yaw: 0.3,
            },
            ..mount_at(Vec3::ZERO)
        });
        plain.apply_pose_update(0, Vec3::ONE, 0.7);
        rotated.apply_pose_update(0, Vec3::ONE, 0.7);
        assert_eq!(plain.view(), rotated.view());
    }

    #[test]
    fn projection_flip_mirrors_y() {
        let proj = Projection::new(60.0, 640, 480);
        let p = proj.matrix().project_point3(Vec3::new(0.5, 0.5, -2.0));
        let q = proj.flipped_y().project_point3(Vec3::new(0.5, 0.5, -2.0));
        assert!((p.x - q.x).abs() < 1e-6);
        assert!((p.y + q.y).abs() < 1e-6);
        assert!((proj.aspect - 4.0 / 3.0).abs() < 1e-6);
    }
}
