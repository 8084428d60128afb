use nalgebra as na;

/// A detected interest point in full-resolution pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// diameter of the support region in pixels
    pub scale: f32,
    /// radians in [0, 2pi)
    pub orientation: f32,
    pub response: f32,
    pub octave: usize,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Keypoint {
        Keypoint {
            x,
            y,
            scale: 1.0,
            orientation: 0.0,
            response: 0.0,
            octave: 0,
        }
    }

    pub fn position(&self) -> glam::Vec2 {
        glam::Vec2::new(self.x, self.y)
    }
}

/// Invertible projective transform from the warped image into the reference frame.
///
/// Only constructed through [`Homography::new`], which rejects singular or
/// non-finite matrices, so the inverse is always available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    forward: na::Matrix3<f64>,
    inverse: na::Matrix3<f64>,
}

const MIN_RELATIVE_DET: f64 = 1e-12;

fn normalize_h33(mat: na::Matrix3<f64>) -> na::Matrix3<f64> {
    let h33 = mat[(2, 2)];
    if h33.abs() > f64::EPSILON {
        mat / h33
    } else {
        mat
    }
}

impl Homography {
    pub fn new(mat: na::Matrix3<f64>) -> Option<Homography> {
        if mat.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let forward = normalize_h33(mat);
        let norm = forward.norm();
        if norm == 0.0 || (forward.determinant() / norm.powi(3)).abs() < MIN_RELATIVE_DET {
            return None;
        }
        let inverse = normalize_h33(forward.try_inverse()?);
        if inverse.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Homography { forward, inverse })
    }

    pub fn identity() -> Homography {
        Homography {
            forward: na::Matrix3::identity(),
            inverse: na::Matrix3::identity(),
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Homography {
        Homography {
            forward: na::Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0),
            inverse: na::Matrix3::new(1.0, 0.0, -tx, 0.0, 1.0, -ty, 0.0, 0.0, 1.0),
        }
    }

    pub fn matrix(&self) -> &na::Matrix3<f64> {
        &self.forward
    }

    pub fn inverse(&self) -> Homography {
        Homography {
            forward: self.inverse,
            inverse: self.forward,
        }
    }

    /// Maps a point through the transform.
    /// Returns `None` when the point lands on or behind the line at infinity.
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        project(&self.forward, x, y)
    }

    /// Maps a point through the inverse transform.
    pub fn project_inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        project(&self.inverse, x, y)
    }

    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        let m = &self.forward;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }
}

pub(crate) fn project(mat: &na::Matrix3<f64>, x: f64, y: f64) -> Option<(f64, f64)> {
    let p = mat * na::Vector3::new(x, y, 1.0);
    if p[2] <= 1e-12 {
        return None;
    }
    Some((p[0] / p[2], p[1] / p[2]))
}
