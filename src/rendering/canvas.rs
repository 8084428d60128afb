use image::RgbImage;

use crate::error::{Result, StitchError};
use crate::types::Homography;

const EDGE_TOLERANCE: f64 = 1e-6;

/// Output raster covering the reference image and the projected warped image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    /// translation from reference coordinates to canvas coordinates
    pub offset: (i64, i64),
}

impl Canvas {
    /// Reference-frame point of a canvas pixel.
    #[inline]
    pub fn to_reference(&self, x: u32, y: u32) -> (i64, i64) {
        (x as i64 - self.offset.0, y as i64 - self.offset.1)
    }
}

/// Canvas bounds for `warped` mapped by `h` into the frame of `reference`.
pub fn canvas_for(
    reference: (u32, u32),
    warped: (u32, u32),
    h: &Homography,
    max_pixels: u64,
) -> Result<Canvas> {
    let (rw, rh) = reference;
    let (ww, wh) = warped;
    if rw == 0 || rh == 0 || ww == 0 || wh == 0 {
        return Err(StitchError::DegenerateGeometry("empty input image".to_string()));
    }
    let (wx, wy) = ((ww - 1) as f64, (wh - 1) as f64);

    let mut min = (0.0f64, 0.0f64);
    let mut max = ((rw - 1) as f64, (rh - 1) as f64);
    for (cx, cy) in [(0.0, 0.0), (wx, 0.0), (0.0, wy), (wx, wy)] {
        let (px, py) = h.project(cx, cy).ok_or_else(|| {
            StitchError::DegenerateGeometry(format!(
                "warped corner ({cx}, {cy}) maps to infinity"
            ))
        })?;
        min = (min.0.min(px), min.1.min(py));
        max = (max.0.max(px), max.1.max(py));
    }
    let min = (
        (min.0 + EDGE_TOLERANCE).floor(),
        (min.1 + EDGE_TOLERANCE).floor(),
    );
    let max = (
        (max.0 - EDGE_TOLERANCE).ceil(),
        (max.1 - EDGE_TOLERANCE).ceil(),
    );
    let width = max.0 - min.0 + 1.0;
    let height = max.1 - min.1 + 1.0;
    if !(width.is_finite() && height.is_finite()) {
        return Err(StitchError::DegenerateGeometry(
            "canvas bounds are not finite".to_string(),
        ));
    }
    if width * height > max_pixels as f64 || width > u32::MAX as f64 || height > u32::MAX as f64 {
        return Err(StitchError::CanvasTooLarge {
            width: width as u64,
            height: height as u64,
        });
    }
    Ok(Canvas {
        width: width as u32,
        height: height as u32,
        offset: (-min.0 as i64, -min.1 as i64),
    })
}

/// True when `(x, y)` lies inside the pixel-centre extent of a `w x h` image.
#[inline]
pub fn covers(w: u32, h: u32, x: f64, y: f64) -> bool {
    x >= -EDGE_TOLERANCE
        && y >= -EDGE_TOLERANCE
        && x <= (w - 1) as f64 + EDGE_TOLERANCE
        && y <= (h - 1) as f64 + EDGE_TOLERANCE
}

/// Bilinear RGB sample, `None` outside the image.
pub fn sample_rgb(img: &RgbImage, x: f64, y: f64) -> Option<[f64; 3]> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || !covers(w, h, x, y) {
        return None;
    }
    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as u32, y0 as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (p00, p10) = (img.get_pixel(x0, y0).0, img.get_pixel(x1, y0).0);
    let (p01, p11) = (img.get_pixel(x0, y1).0, img.get_pixel(x1, y1).0);
    let mut out = [0.0; 3];
    for c in 0..3 {
        let top = (1.0 - fx) * p00[c] as f64 + fx * p10[c] as f64;
        let bottom = (1.0 - fx) * p01[c] as f64 + fx * p11[c] as f64;
        out[c] = (1.0 - fy) * top + fy * bottom;
    }
    Some(out)
}

/// Distance to the nearest image edge plus one, in source coordinates.
#[inline]
pub fn feather_weight(w: u32, h: u32, x: f64, y: f64) -> f64 {
    (x + 1.0)
        .min(w as f64 - x)
        .min(y + 1.0)
        .min(h as f64 - y)
        .max(EDGE_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_sample_interpolates_between_pixels() {
        let img = RgbImage::from_fn(2, 1, |x, _| image::Rgb([(x * 100) as u8, 0, 50]));
        let v = sample_rgb(&img, 0.25, 0.0).unwrap();
        assert!((v[0] - 25.0).abs() < 1e-9);
        assert_eq!(v[2], 50.0);
        assert!(sample_rgb(&img, 1.5, 0.0).is_none());
    }

    #[test]
    fn feather_is_one_on_edges() {
        assert_eq!(feather_weight(10, 10, 0.0, 5.0), 1.0);
        assert_eq!(feather_weight(10, 10, 9.0, 5.0), 1.0);
        assert_eq!(feather_weight(10, 10, 4.0, 4.0), 5.0);
    }
}
