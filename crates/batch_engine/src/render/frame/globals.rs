use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Point3};

/// Per-frame camera and time data, uploaded into every frame slot
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameGlobals {
    /// World to view, column-major
    pub view: [[f32; 4]; 4],
    /// View to clip, column-major
    pub projection: [[f32; 4]; 4],
    /// Camera position in world space
    pub camera_position: [f32; 3],
    /// Seconds since start
    pub time: f32,
}

impl FrameGlobals {
    /// Build from nalgebra types
    pub fn new(view: &Matrix4<f32>, projection: &Matrix4<f32>, camera: &Point3<f32>, time: f32) -> Self {
        Self {
            view: (*view).into(),
            projection: (*projection).into(),
            camera_position: [camera.x, camera.y, camera.z],
            time,
        }
    }
}

impl Default for FrameGlobals {
    fn default() -> Self {
        Self::new(&Matrix4::identity(), &Matrix4::identity(), &Point3::origin(), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn test_std140_friendly_size() {
        assert_eq!(std::mem::size_of::<FrameGlobals>() % 16, 0);
    }

    #[test]
    fn test_matrices_are_column_major() {
        let view = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        let globals = FrameGlobals::new(&view, &Matrix4::identity(), &Point3::new(4.0, 5.0, 6.0), 1.5);
        assert_relative_eq!(globals.view[3][0], 1.0);
        assert_relative_eq!(globals.view[3][2], 3.0);
        assert_relative_eq!(globals.camera_position[1], 5.0);
        assert_relative_eq!(globals.time, 1.5);
    }
}
