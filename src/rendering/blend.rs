use image::RgbImage;
use rayon::prelude::*;

use super::canvas::{canvas_for, feather_weight, sample_rgb, Canvas};
use crate::error::Result;
use crate::types::Homography;

/// A rendered panorama and the offset of the reference image inside it.
#[derive(Debug, Clone)]
pub struct Composite {
    pub image: RgbImage,
    pub offset: (i64, i64),
}

/// A source value at a canvas pixel with its feather weight.
#[derive(Debug, Clone, Copy)]
struct Sample {
    rgb: [f64; 3],
    weight: f64,
}

fn to_u8(rgb: [f64; 3]) -> [u8; 3] {
    rgb.map(|v| v.round().clamp(0.0, 255.0) as u8)
}

/// Warps `warped` through `h` onto a canvas shared with `reference`, combining
/// the two per-pixel samples with `combine`.
fn compose<F>(
    reference: &RgbImage,
    warped: &RgbImage,
    h: &Homography,
    max_canvas_pixels: u64,
    combine: F,
) -> Result<Composite>
where
    F: Fn(Option<Sample>, Option<Sample>) -> [u8; 3] + Sync,
{
    let canvas: Canvas = canvas_for(
        reference.dimensions(),
        warped.dimensions(),
        h,
        max_canvas_pixels,
    )?;
    log::debug!(
        "canvas {}x{}, reference offset {:?}",
        canvas.width,
        canvas.height,
        canvas.offset
    );
    let (rw, rh) = reference.dimensions();
    let (ww, wh) = warped.dimensions();
    let row_len = canvas.width as usize * 3;
    let mut buffer = vec![0u8; row_len * canvas.height as usize];

    buffer
        .par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(cy, row)| {
            for cx in 0..canvas.width {
                let (rx, ry) = canvas.to_reference(cx, cy as u32);
                let from_reference = (rx >= 0 && ry >= 0 && rx < rw as i64 && ry < rh as i64)
                    .then(|| Sample {
                        rgb: reference.get_pixel(rx as u32, ry as u32).0.map(f64::from),
                        weight: feather_weight(rw, rh, rx as f64, ry as f64),
                    });
                let from_warped = h
                    .project_inverse(rx as f64, ry as f64)
                    .and_then(|(sx, sy)| {
                        sample_rgb(warped, sx, sy).map(|rgb| Sample {
                            rgb,
                            weight: feather_weight(ww, wh, sx, sy),
                        })
                    });
                let px = cx as usize * 3;
                row[px..px + 3].copy_from_slice(&combine(from_reference, from_warped));
            }
        });

    let image = RgbImage::from_raw(canvas.width, canvas.height, buffer).ok_or_else(|| {
        crate::error::StitchError::DegenerateGeometry("canvas buffer size mismatch".to_string())
    })?;
    Ok(Composite {
        image,
        offset: canvas.offset,
    })
}

/// Reference pasted first, then every pixel the warped image covers overwritten.
pub fn brute_force_blend(
    reference: &RgbImage,
    warped: &RgbImage,
    h: &Homography,
    max_canvas_pixels: u64,
) -> Result<Composite> {
    compose(reference, warped, h, max_canvas_pixels, |r, w| {
        match (w, r) {
            (Some(w), _) => to_u8(w.rgb),
            (None, Some(r)) => to_u8(r.rgb),
            (None, None) => [0, 0, 0],
        }
    })
}

/// Feather-weighted average of both sources where they overlap.
///
/// Swapping the sources and inverting `h` gives the same pixels only when the
/// two canvases share a pixel grid, i.e. the offsets are whole pixels.
pub fn simple_blend(
    reference: &RgbImage,
    warped: &RgbImage,
    h: &Homography,
    max_canvas_pixels: u64,
) -> Result<Composite> {
    compose(reference, warped, h, max_canvas_pixels, |r, w| match (r, w) {
        (Some(a), Some(b)) => {
            let total = a.weight + b.weight;
            let mut out = [0.0; 3];
            for c in 0..3 {
                out[c] = (a.weight * a.rgb[c] + b.weight * b.rgb[c]) / total;
            }
            to_u8(out)
        }
        (Some(s), None) | (None, Some(s)) => to_u8(s.rgb),
        (None, None) => [0, 0, 0],
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendStrategy {
    BruteForce,
    Simple,
}

impl BlendStrategy {
    pub const ALL: [BlendStrategy; 2] = [BlendStrategy::BruteForce, BlendStrategy::Simple];

    pub fn file_name(&self) -> &'static str {
        match self {
            BlendStrategy::BruteForce => "pano_brute_force.jpg",
            BlendStrategy::Simple => "pano_simple_blend.jpg",
        }
    }

    pub fn render(
        &self,
        reference: &RgbImage,
        warped: &RgbImage,
        h: &Homography,
        max_canvas_pixels: u64,
    ) -> Result<Composite> {
        match self {
            BlendStrategy::BruteForce => brute_force_blend(reference, warped, h, max_canvas_pixels),
            BlendStrategy::Simple => simple_blend(reference, warped, h, max_canvas_pixels),
        }
    }
}
