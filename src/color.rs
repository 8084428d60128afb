use image::RgbImage;

/// Count of each 8-bit value over all channels of an image.
fn value_counts(img: &RgbImage) -> [u64; 256] {
    let mut counts = [0u64; 256];
    for &v in img.as_raw() {
        counts[v as usize] += 1;
    }
    counts
}

/// Unique values present in `counts` paired with their empirical CDF.
fn quantiles(counts: &[u64; 256]) -> (Vec<f64>, Vec<f64>) {
    let total: u64 = counts.iter().sum();
    let mut values = Vec::new();
    let mut cdf = Vec::new();
    let mut acc = 0u64;
    for (v, &c) in counts.iter().enumerate() {
        if c == 0 {
            continue;
        }
        acc += c;
        values.push(v as f64);
        cdf.push(acc as f64 / total as f64);
    }
    (values, cdf)
}

/// Piecewise linear interpolation, clamping outside `[xp[0], xp[last]]`.
fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let last = xp.len() - 1;
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[last] {
        return fp[last];
    }
    let j = xp.partition_point(|&v| v < x);
    if xp[j] == x {
        return fp[j];
    }
    let (x0, x1) = (xp[j - 1], xp[j]);
    let t = (x - x0) / (x1 - x0);
    fp[j - 1] + t * (fp[j] - fp[j - 1])
}

/// Remaps `source` so the distribution of its values follows `template`.
///
/// All channels are pooled into one histogram. Each source value is sent to the
/// template value found at the same quantile, truncated back to 8 bits.
pub fn hist_match(source: &RgbImage, template: &RgbImage) -> RgbImage {
    if source.as_raw().is_empty() || template.as_raw().is_empty() {
        return source.clone();
    }
    let (s_values, s_quantiles) = quantiles(&value_counts(source));
    let (t_values, t_quantiles) = quantiles(&value_counts(template));

    let mut lut = [0u8; 256];
    for (v, q) in s_values.iter().zip(&s_quantiles) {
        let mapped = interp(*q, &t_quantiles, &t_values);
        lut[*v as usize] = mapped.clamp(0.0, 255.0) as u8;
    }
    log::debug!(
        "histogram matching: {} source levels onto {} template levels",
        s_values.len(),
        t_values.len()
    );

    let data = source.as_raw().iter().map(|&v| lut[v as usize]).collect();
    RgbImage::from_raw(source.width(), source.height(), data).unwrap_or_else(|| source.clone())
}
