//! Photo clean-up for receipts: contrast enhancement and deskewing.
//!
//! Deskewing looks for the rotation that makes the dark pixels of the image
//! line up into the sharpest horizontal rows (a projection profile search),
//! then rotates the image back by that angle.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use tracing::debug;

const DENOISE_SIGMA: f32 = 0.8;
/// Share of the darkest and of the brightest pixels clipped by the stretch.
const CONTRAST_CLIP: f64 = 0.01;
const MAX_SKEW_DEGREES: f32 = 15.0;
const SKEW_STEP_DEGREES: f32 = 0.5;
/// The skew search runs on a copy no larger than this.
const ANALYSIS_DIMENSION: u32 = 600;
const MIN_INK_PIXELS: usize = 200;
/// Above this share of dark pixels the background dominates and the search is skipped.
const MAX_INK_SHARE: f64 = 0.6;

/// Grayscale, light blur, then stretch the histogram to the full range.
pub fn enhance(img: &DynamicImage) -> DynamicImage {
    let gray = img.to_luma8();
    let mut gray = imageops::blur(&gray, DENOISE_SIGMA);
    stretch_contrast(&mut gray, CONTRAST_CLIP);
    DynamicImage::ImageLuma8(gray)
}

/// Map the `clip` and `1 - clip` percentiles to black and white.
pub fn stretch_contrast(gray: &mut GrayImage, clip: f64) {
    let hist = histogram(gray);
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return;
    }
    let cut = (total as f64 * clip) as u64;
    let low = cumulative_cut(hist.iter().enumerate(), cut);
    let high = cumulative_cut(hist.iter().enumerate().rev(), cut);
    if high <= low {
        return;
    }

    let (low, span) = (f32::from(low), f32::from(high - low));
    for pixel in gray.pixels_mut() {
        let value = (f32::from(pixel[0]) - low) * 255.0 / span;
        pixel[0] = value.round().clamp(0.0, 255.0) as u8;
    }
}

fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for pixel in gray.pixels() {
        hist[usize::from(pixel[0])] += 1;
    }
    hist
}

/// First level at which the running count passes `cut`.
fn cumulative_cut<'a>(levels: impl Iterator<Item = (usize, &'a u64)>, cut: u64) -> u8 {
    let mut seen = 0;
    let mut last = 0;
    for (level, count) in levels {
        last = level;
        seen += count;
        if seen > cut {
            break;
        }
    }
    last as u8
}

/// Otsu's threshold: the level that best separates dark from light pixels.
pub fn otsu_threshold(hist: &[u64; 256]) -> u8 {
    let total: u64 = hist.iter().sum();
    let weighted_total: f64 = hist.iter().enumerate().map(|(v, c)| v as f64 * *c as f64).sum();

    let (mut weight_dark, mut weighted_dark) = (0u64, 0f64);
    let (mut best, mut best_variance) = (0u8, -1f64);
    for (level, count) in hist.iter().enumerate() {
        weight_dark += count;
        if weight_dark == 0 {
            continue;
        }
        let weight_light = total - weight_dark;
        if weight_light == 0 {
            break;
        }
        weighted_dark += level as f64 * *count as f64;
        let mean_dark = weighted_dark / weight_dark as f64;
        let mean_light = (weighted_total - weighted_dark) / weight_light as f64;
        let variance = weight_dark as f64 * weight_light as f64 * (mean_dark - mean_light).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best = level as u8;
        }
    }
    best
}

/// Angle in degrees by which text lines slope downwards to the right.
///
/// Returns 0 when the image has too little ink, or too much, to judge.
pub fn skew_angle(gray: &GrayImage) -> f32 {
    let small = shrink(gray);
    let (width, height) = small.dimensions();
    let threshold = otsu_threshold(&histogram(&small));

    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let ink: Vec<(f32, f32)> = small
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] <= threshold)
        .map(|(x, y, _)| (x as f32 - cx, y as f32 - cy))
        .collect();
    let pixels = f64::from(width) * f64::from(height);
    if ink.len() < MIN_INK_PIXELS || ink.len() as f64 > pixels * MAX_INK_SHARE {
        return 0.0;
    }

    // |y cos - x sin| never exceeds the half diagonal, which is below `offset`.
    let offset = (width + height) as f32;
    let bins = 2 * (width + height) as usize + 2;
    let steps = (MAX_SKEW_DEGREES / SKEW_STEP_DEGREES) as i32;
    let candidates = std::iter::once(0).chain((1..=steps).flat_map(|s| [s, -s]));

    let mut best = (0.0f32, f64::MIN);
    let mut profile = vec![0u32; bins];
    for step in candidates {
        let angle = step as f32 * SKEW_STEP_DEGREES;
        let (sin, cos) = angle.to_radians().sin_cos();
        profile.iter_mut().for_each(|c| *c = 0);
        for &(x, y) in &ink {
            let row = (y * cos - x * sin + offset) as usize;
            profile[row.min(bins - 1)] += 1;
        }
        let score: f64 = profile.iter().map(|&c| f64::from(c) * f64::from(c)).sum();
        if score > best.1 {
            best = (angle, score);
        }
    }
    best.0
}

fn shrink(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let longest = width.max(height);
    if longest <= ANALYSIS_DIMENSION {
        return gray.clone();
    }
    let scale = |side: u32| ((u64::from(side) * u64::from(ANALYSIS_DIMENSION) / u64::from(longest)) as u32).max(1);
    imageops::resize(gray, scale(width), scale(height), FilterType::Triangle)
}

/// Level the text lines of `img`. Images without a measurable skew come back unchanged.
pub fn deskew(img: &DynamicImage) -> DynamicImage {
    let angle = skew_angle(&img.to_luma8());
    if angle.abs() < f32::EPSILON {
        return img.clone();
    }
    debug!(angle, "Deskewing image");
    DynamicImage::ImageRgb8(rotate_about_center(&img.to_rgb8(), angle))
}

/// Rotate around the centre so lines sloping by `angle` degrees become
/// horizontal. Edges are filled by repeating the border.
pub fn rotate_about_center(src: &RgbImage, angle: f32) -> RgbImage {
    let (width, height) = src.dimensions();
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let (sin, cos) = angle.to_radians().sin_cos();
    RgbImage::from_fn(width, height, |x, y| {
        let (qx, qy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
        let sx = qx * cos - qy * sin + cx - 0.5;
        let sy = qx * sin + qy * cos + cy - 0.5;
        sample_bilinear(src, sx, sy)
    })
}

/// Bilinear sample at a fractional position, clamped to the image.
pub(crate) fn sample_bilinear(src: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (max_x, max_y) = (src.width() - 1, src.height() - 1);
    let x = if x.is_finite() { x.clamp(0.0, max_x as f32) } else { 0.0 };
    let y = if y.is_finite() { y.clamp(0.0, max_y as f32) } else { 0.0 };
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(max_x), (y0 + 1).min(max_y));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let (p00, p10) = (src.get_pixel(x0, y0), src.get_pixel(x1, y0));
    let (p01, p11) = (src.get_pixel(x0, y1), src.get_pixel(x1, y1));
    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let top = f32::from(p00[c]) + (f32::from(p10[c]) - f32::from(p00[c])) * fx;
        let bottom = f32::from(p01[c]) + (f32::from(p11[c]) - f32::from(p01[c])) * fx;
        *value = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
