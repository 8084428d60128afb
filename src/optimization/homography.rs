use faer::linalg::solvers::SolveLstsqCore;
use glam::Vec2;
use nalgebra as na;

/// Similarity moving the centroid of `points` to the origin with mean distance sqrt(2).
fn normalizing_transform(points: impl Iterator<Item = Vec2> + Clone) -> Option<na::Matrix3<f64>> {
    let n = points.clone().count() as f64;
    if n == 0.0 {
        return None;
    }
    let (sx, sy) = points
        .clone()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
    let (cx, cy) = (sx / n, sy / n);
    let mean_dist = points
        .map(|p| ((p.x as f64 - cx).powi(2) + (p.y as f64 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(na::Matrix3::new(
        s,
        0.0,
        -s * cx,
        0.0,
        s,
        -s * cy,
        0.0,
        0.0,
        1.0,
    ))
}

fn apply(t: &na::Matrix3<f64>, p: Vec2) -> (f64, f64) {
    (
        t[(0, 0)] * p.x as f64 + t[(0, 2)],
        t[(1, 1)] * p.y as f64 + t[(1, 2)],
    )
}

/// The two DLT rows of one pair with `h33 = 1`, as `(coefficients, rhs)`.
fn dlt_rows((x, y): (f64, f64), (u, v): (f64, f64)) -> [([f64; 8], f64); 2] {
    [
        ([x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y], u),
        ([0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y], v),
    ]
}

/// Hartley-normalised system for `pairs` of `(source, target)` points, with
/// the transforms needed to undo the normalisation.
struct NormalizedSystem {
    src_t: na::Matrix3<f64>,
    dst_t: na::Matrix3<f64>,
    rows: Vec<([f64; 8], f64)>,
}

impl NormalizedSystem {
    fn new(pairs: &[(Vec2, Vec2)]) -> Option<NormalizedSystem> {
        let src_t = normalizing_transform(pairs.iter().map(|p| p.0))?;
        let dst_t = normalizing_transform(pairs.iter().map(|p| p.1))?;
        let rows = pairs
            .iter()
            .flat_map(|(s, d)| dlt_rows(apply(&src_t, *s), apply(&dst_t, *d)))
            .collect();
        Some(NormalizedSystem { src_t, dst_t, rows })
    }

    /// Maps a solution of the normalised system back to pixel coordinates.
    fn denormalize(&self, h: &[f64]) -> Option<na::Matrix3<f64>> {
        if h.len() != 8 || h.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let hn = na::Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        let dst_inv = self.dst_t.try_inverse()?;
        let mat = dst_inv * hn * self.src_t;
        let h33 = mat[(2, 2)];
        if h33.abs() < 1e-12 {
            return None;
        }
        Some(mat / h33)
    }
}

/// True when any three of the points are (nearly) collinear.
fn has_collinear_triple(points: &[Vec2]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let (a, b, c) = (points[i], points[j], points[k]);
                let cross = (b - a).perp_dot(c - a).abs();
                let scale = (b - a).length() * (c - a).length();
                if cross <= 1e-6 * scale.max(1e-12) {
                    return true;
                }
            }
        }
    }
    false
}

/// Exact homography through four `(source, target)` pairs.
///
/// Returns `None` when either point set has a collinear triple or the 8x8
/// system is singular.
pub fn solve_four_point(pairs: &[(Vec2, Vec2); 4]) -> Option<na::Matrix3<f64>> {
    let src: Vec<Vec2> = pairs.iter().map(|p| p.0).collect();
    let dst: Vec<Vec2> = pairs.iter().map(|p| p.1).collect();
    if has_collinear_triple(&src) || has_collinear_triple(&dst) {
        return None;
    }
    let system = NormalizedSystem::new(pairs)?;
    let mut a = na::SMatrix::<f64, 8, 8>::zeros();
    let mut b = na::SVector::<f64, 8>::zeros();
    for (r, (coeffs, rhs)) in system.rows.iter().enumerate() {
        for (c, v) in coeffs.iter().enumerate() {
            a[(r, c)] = *v;
        }
        b[r] = *rhs;
    }
    let h = a.lu().solve(&b)?;
    system.denormalize(h.as_slice())
}

/// Least-squares homography over all pairs (QR on the `2N x 8` system).
pub fn solve_least_squares(pairs: &[(Vec2, Vec2)]) -> Option<na::Matrix3<f64>> {
    if pairs.len() < 4 {
        return None;
    }
    let system = NormalizedSystem::new(pairs)?;
    let n_rows = system.rows.len();
    let a: faer::Mat<f64> = faer::Mat::from_fn(n_rows, 8, |r, c| system.rows[r].0[c]);
    let mut x: faer::Mat<f64> = faer::Mat::from_fn(n_rows, 1, |r, _| system.rows[r].1);
    a.qr()
        .solve_lstsq_in_place_with_conj(faer::Conj::No, x.as_mut());
    let h: Vec<f64> = (0..8).map(|i| *x.get(i, 0)).collect();
    system.denormalize(&h)
}

/// Euclidean distance between `H * source` and `target`, infinite when the
/// source maps to the line at infinity.
pub fn reprojection_error(h: &na::Matrix3<f64>, source: Vec2, target: Vec2) -> f64 {
    match crate::types::project(h, source.x as f64, source.y as f64) {
        Some((x, y)) => ((x - target.x as f64).powi(2) + (y - target.y as f64).powi(2)).sqrt(),
        None => f64::INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collinear_triple_is_detected() {
        let pts = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 5.0),
        ];
        assert!(has_collinear_triple(&pts));
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        assert!(!has_collinear_triple(&square));
    }
}
