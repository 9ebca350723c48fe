//! Camera state and the per-frame camera snapshot.

use glam::{Mat4, Quat, Vec3, Vec4Swizzles};
use umbra_math::{Aabb, Frustum};

/// A perspective camera. The renderer copies it by value on `set_camera`.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// World position.
    pub position: Vec3,
    /// Rotation as a unit quaternion; identity looks down -Z.
    pub rotation: Quat,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Near clip plane distance (always positive).
    pub near: f32,
    /// Far clip plane distance (always positive, > near).
    pub far: f32,
}

impl Camera {
    /// A camera at `position` turned to face `target`, keeping +Y up.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let forward = (target - position).normalize_or(Vec3::NEG_Z);
        let up = if forward.y.abs() > 0.999 { Vec3::Z } else { Vec3::Y };
        // look_to_rh is world-to-view; its inverse rotation is the camera's.
        let view = Mat4::look_to_rh(Vec3::ZERO, forward, up);
        let rotation = Quat::from_mat4(&view).inverse().normalize();
        Self {
            position,
            rotation,
            ..Self::default()
        }
    }

    /// World-to-view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        (Mat4::from_translation(self.position) * Mat4::from_quat(self.rotation)).inverse()
    }

    /// Reverse-Z perspective projection: near maps to z=1, far to z=0.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect, self.far, self.near)
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// The up direction vector (+Y in camera space).
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// The right direction vector (+X in camera space).
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// Everything derived from the camera for one frame.
///
/// Computed once at the start of `render()`. Culling, terrain LOD selection
/// and cascade fitting all read the same snapshot.
#[derive(Debug, Clone)]
pub struct FrameCamera {
    pub position: Vec3,
    pub forward: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub view: Mat4,
    pub proj: Mat4,
    pub inv_view: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    /// Planes and world-space corners (near 0..4, far 4..8).
    pub frustum: Frustum,
    /// Box enclosing the eight corners.
    pub bounds: Aabb,
}

impl FrameCamera {
    /// Snapshot `camera` for a target with the given aspect ratio.
    pub fn snapshot(camera: &Camera, aspect: f32) -> Self {
        let view = camera.view_matrix();
        let proj = camera.projection_matrix(aspect);
        let view_proj = proj * view;
        let frustum = Frustum::from_view_projection(&view_proj);
        let bounds = frustum.bounding_box();
        Self {
            position: camera.position,
            forward: camera.forward(),
            fov_y: camera.fov_y,
            aspect,
            near: camera.near,
            far: camera.far,
            view,
            proj,
            inv_view: view.inverse(),
            inv_proj: proj.inverse(),
            view_proj,
            inv_view_proj: view_proj.inverse(),
            frustum,
            bounds,
        }
    }

    /// Positive distance of a world point along the view direction.
    pub fn view_depth(&self, world: Vec3) -> f32 {
        -self.view.transform_point3(world).z
    }

    /// World position of a pixel from its NDC coordinates and stored depth.
    pub fn unproject(&self, ndc_x: f32, ndc_y: f32, depth: f32) -> Vec3 {
        let p = self.inv_view_proj * glam::Vec4::new(ndc_x, ndc_y, depth, 1.0);
        p.xyz() / p.w
    }
}
