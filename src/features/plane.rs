use image::GrayImage;

/// Single-channel `f32` raster, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Plane {
        Plane {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Plane {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Plane {
            width,
            height,
            data,
        }
    }

    /// Luma values multiplied by `scale` (1.0 keeps the 0..255 range).
    pub fn from_gray(gray: &GrayImage, scale: f32) -> Plane {
        Plane {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.as_raw().iter().map(|&v| v as f32 * scale).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.width + x] = v;
    }

    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let xc = x.clamp(0, self.width as isize - 1) as usize;
        let yc = y.clamp(0, self.height as isize - 1) as usize;
        self.get(xc, yc)
    }

    pub fn contains(&self, x: isize, y: isize, border: isize) -> bool {
        x >= border
            && y >= border
            && x < self.width as isize - border
            && y < self.height as isize - border
    }

    /// Bilinear sample with edge clamping.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (xi, yi) = (x0 as isize, y0 as isize);
        let p00 = self.get_clamped(xi, yi);
        let p10 = self.get_clamped(xi + 1, yi);
        let p01 = self.get_clamped(xi, yi + 1);
        let p11 = self.get_clamped(xi + 1, yi + 1);
        (1.0 - fy) * ((1.0 - fx) * p00 + fx * p10) + fy * ((1.0 - fx) * p01 + fx * p11)
    }

    /// Separable Gaussian blur with clamp-to-edge borders.
    pub fn blurred(&self, sigma: f32) -> Plane {
        if sigma <= 0.0 || self.data.is_empty() {
            return self.clone();
        }
        let kernel = gaussian_kernel(sigma);
        let r = (kernel.len() / 2) as isize;

        let mut horizontal = Plane::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut acc = 0.0;
                for (k, w) in kernel.iter().enumerate() {
                    acc += w * self.get_clamped(x as isize + k as isize - r, y as isize);
                }
                horizontal.set(x, y, acc);
            }
        }

        let mut out = Plane::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut acc = 0.0;
                for (k, w) in kernel.iter().enumerate() {
                    acc += w * horizontal.get_clamped(x as isize, y as isize + k as isize - r);
                }
                out.set(x, y, acc);
            }
        }
        out
    }

    /// Bilinear resize with pixel-centre alignment.
    pub fn resized(&self, width: usize, height: usize) -> Plane {
        let sx = self.width as f32 / width as f32;
        let sy = self.height as f32 / height as f32;
        Plane::from_fn(width, height, |x, y| {
            self.sample((x as f32 + 0.5) * sx - 0.5, (y as f32 + 0.5) * sy - 0.5)
        })
    }

    /// Downscale by `factor`, low-passing first so the result does not alias.
    pub fn downscaled(&self, factor: f32) -> Plane {
        let width = ((self.width as f32 / factor).round() as usize).max(1);
        let height = ((self.height as f32 / factor).round() as usize).max(1);
        if factor <= 1.0 {
            return self.resized(width, height);
        }
        let sigma = 0.5 * (factor * factor - 1.0).sqrt();
        self.blurred(sigma).resized(width, height)
    }

    /// Keeps every second pixel in both directions.
    pub fn decimated(&self) -> Plane {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        Plane::from_fn(width, height, |x, y| self.get(2 * x, 2 * y))
    }

    pub fn difference(&self, other: &Plane) -> Plane {
        Plane {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| a - b)
                .collect(),
        }
    }

    /// Central-difference gradient `(dx, dy)` at an interior pixel.
    #[inline]
    pub fn gradient(&self, x: usize, y: usize) -> (f32, f32) {
        let (xi, yi) = (x as isize, y as isize);
        let dx = 0.5 * (self.get_clamped(xi + 1, yi) - self.get_clamped(xi - 1, yi));
        let dy = 0.5 * (self.get_clamped(xi, yi + 1) - self.get_clamped(xi, yi - 1));
        (dx, dy)
    }

    pub fn integral(&self) -> Integral {
        let w = self.width + 1;
        let mut sums = vec![0.0f64; w * (self.height + 1)];
        for y in 0..self.height {
            let mut row = 0.0f64;
            for x in 0..self.width {
                row += self.get(x, y) as f64;
                sums[(y + 1) * w + x + 1] = sums[y * w + x + 1] + row;
            }
        }
        Integral {
            width: self.width,
            height: self.height,
            sums,
        }
    }
}

/// Summed-area table of a [`Plane`].
#[derive(Debug, Clone)]
pub struct Integral {
    width: usize,
    height: usize,
    sums: Vec<f64>,
}

impl Integral {
    /// Mean over the inclusive pixel box `[x0, x1] x [y0, y1]`, clipped to the image.
    pub fn box_mean(&self, x0: isize, y0: isize, x1: isize, y1: isize) -> f32 {
        let x0 = x0.clamp(0, self.width as isize - 1) as usize;
        let y0 = y0.clamp(0, self.height as isize - 1) as usize;
        let x1 = x1.clamp(0, self.width as isize - 1) as usize;
        let y1 = y1.clamp(0, self.height as isize - 1) as usize;
        let w = self.width + 1;
        let s = self.sums[(y1 + 1) * w + x1 + 1] - self.sums[y0 * w + x1 + 1]
            - self.sums[(y1 + 1) * w + x0]
            + self.sums[y0 * w + x0];
        let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as f64;
        (s / area) as f32
    }
}

pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let r = (3.0 * sigma).ceil().max(1.0) as isize;
    let mut kernel: Vec<f32> = (-r..=r)
        .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}
