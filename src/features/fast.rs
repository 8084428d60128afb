//! FAST-9 segment-test corner detector on a [`Plane`].

use super::plane::Plane;

/// Bresenham circle of radius 3, clockwise from the top.
const CIRCLE: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

const ARC_LENGTH: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: usize,
    pub y: usize,
    pub score: f32,
}

/// True when the 16-bit circular mask contains `ARC_LENGTH` consecutive set bits.
fn has_arc(mask: u32) -> bool {
    let doubled = mask | (mask << 16);
    let mut run = doubled;
    for k in 1..ARC_LENGTH {
        run &= doubled >> k;
    }
    run != 0
}

/// Segment-test score at an interior pixel, 0 when it is not a corner.
///
/// The score is the larger of the summed excess brightness or darkness
/// over the circle pixels that pass the threshold.
pub fn score(plane: &Plane, x: usize, y: usize, threshold: f32) -> f32 {
    let center = plane.get(x, y);
    let mut bright = 0u32;
    let mut dark = 0u32;
    let mut bright_sum = 0.0;
    let mut dark_sum = 0.0;
    for (i, (dx, dy)) in CIRCLE.iter().enumerate() {
        let v = plane.get((x as isize + dx) as usize, (y as isize + dy) as usize);
        if v > center + threshold {
            bright |= 1 << i;
            bright_sum += v - center - threshold;
        } else if v < center - threshold {
            dark |= 1 << i;
            dark_sum += center - v - threshold;
        }
    }
    let mut best = 0.0f32;
    if has_arc(bright) {
        best = best.max(bright_sum);
    }
    if has_arc(dark) {
        best = best.max(dark_sum);
    }
    best
}

/// Detects FAST-9 corners at least `border` pixels from the image edge,
/// keeping 3x3 local maxima of the score.
pub fn detect(plane: &Plane, threshold: f32, border: usize) -> Vec<Corner> {
    let border = border.max(3);
    let (w, h) = (plane.width(), plane.height());
    if w <= 2 * border || h <= 2 * border {
        return Vec::new();
    }

    let mut scores = vec![0.0f32; w * h];
    for y in border..h - border {
        for x in border..w - border {
            scores[y * w + x] = score(plane, x, y, threshold);
        }
    }

    let mut corners = Vec::new();
    for y in border..h - border {
        for x in border..w - border {
            let idx = y * w + x;
            let s = scores[idx];
            if s <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'neighbours: for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    let nidx = ny * w + nx;
                    if nidx == idx {
                        continue;
                    }
                    let ns = scores[nidx];
                    // equal scores keep the first pixel in raster order
                    if ns > s || (ns == s && nidx < idx) {
                        is_max = false;
                        break 'neighbours;
                    }
                }
            }
            if is_max {
                corners.push(Corner { x, y, score: s });
            }
        }
    }
    corners
}
