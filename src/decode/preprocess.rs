//! Image clean-up passes tried by the optical reader before giving up.

use image::{imageops, DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// Percentage below the local mean at which a pixel is considered dark.
const THRESHOLD_PERCENT: u64 = 15;
const SMOOTHING_SIGMA: f32 = 1.0;
/// Columns/rows scoring below this share of the strongest one are outside the ROI.
const ROI_SCORE_RATIO: f64 = 0.25;
const ROI_PADDING: u32 = 12;
const MIN_ROI_SIDE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreprocessOptions {
    pub smoothing: bool,
    pub adaptive_threshold: bool,
    pub roi_crop: bool,
    /// Rows sampled per image variant.
    pub scanlines: u32,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            smoothing: true,
            adaptive_threshold: true,
            roi_crop: true,
            scanlines: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

pub fn grayscale(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

pub fn smooth(gray: &GrayImage) -> GrayImage {
    imageops::blur(gray, SMOOTHING_SIGMA)
}

/// Local-mean thresholding over a summed-area table. Output is pure black
/// and white, so uneven lighting across the label stops mattering.
pub fn adaptive_threshold(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let integral = integral_image(gray);
    let stride = width as usize + 1;
    let radius = (width.max(height) / 16).max(4);

    GrayImage::from_fn(width, height, |x, y| {
        let x0 = x.saturating_sub(radius) as usize;
        let y0 = y.saturating_sub(radius) as usize;
        let x1 = (x + radius + 1).min(width) as usize;
        let y1 = (y + radius + 1).min(height) as usize;

        let count = ((x1 - x0) * (y1 - y0)) as u64;
        let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
            - integral[y0 * stride + x1]
            - integral[y1 * stride + x0];

        let pixel = u64::from(gray.get_pixel(x, y)[0]);
        if pixel * count * 100 <= sum * (100 - THRESHOLD_PERCENT) {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

fn integral_image(gray: &GrayImage) -> Vec<u64> {
    let (width, height) = gray.dimensions();
    let stride = width as usize + 1;
    let mut table = vec![0u64; stride * (height as usize + 1)];

    for y in 0..height as usize {
        let mut row_sum = 0u64;
        for x in 0..width as usize {
            row_sum += u64::from(gray.get_pixel(x as u32, y as u32)[0]);
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
        }
    }
    table
}

/// Locate the region dominated by vertical edges (horizontal gradient well
/// above vertical gradient), which is where a 1D barcode sits.
pub fn edge_roi(gray: &GrayImage) -> Option<Roi> {
    let (width, height) = gray.dimensions();
    if width < 2 || height < 2 {
        return None;
    }

    let mut columns = vec![0u64; width as usize];
    let mut rows = vec![0u64; height as usize];
    for y in 0..height - 1 {
        for x in 0..width - 1 {
            let here = i32::from(gray.get_pixel(x, y)[0]);
            let gx = (i32::from(gray.get_pixel(x + 1, y)[0]) - here).abs();
            let gy = (i32::from(gray.get_pixel(x, y + 1)[0]) - here).abs();
            let score = (gx - gy).max(0) as u64;
            columns[x as usize] += score;
            rows[y as usize] += score;
        }
    }

    let (x_start, x_end) = dominant_span(&columns)?;
    let (y_start, y_end) = dominant_span(&rows)?;

    let x = x_start.saturating_sub(ROI_PADDING);
    let y = y_start.saturating_sub(ROI_PADDING);
    let roi = Roi {
        x,
        y,
        width: (x_end + ROI_PADDING + 1).min(width) - x,
        height: (y_end + ROI_PADDING + 1).min(height) - y,
    };

    if roi.width < MIN_ROI_SIDE || roi.height < MIN_ROI_SIDE {
        return None;
    }
    if roi.width == width && roi.height == height {
        return None;
    }
    Some(roi)
}

fn dominant_span(scores: &[u64]) -> Option<(u32, u32)> {
    let max = *scores.iter().max()?;
    if max == 0 {
        return None;
    }

    let cutoff = (max as f64 * ROI_SCORE_RATIO) as u64;
    let first = scores.iter().position(|&s| s > cutoff)?;
    let last = scores.iter().rposition(|&s| s > cutoff)?;
    Some((first as u32, last as u32))
}

pub fn crop(gray: &GrayImage, roi: Roi) -> GrayImage {
    imageops::crop_imm(gray, roi.x, roi.y, roi.width, roi.height).to_image()
}

/// Every enabled variant of `image`, cheapest first. The plain grey image is
/// always included.
pub fn variants(image: &DynamicImage, options: &PreprocessOptions) -> Vec<(&'static str, GrayImage)> {
    let gray = grayscale(image);
    let mut out = Vec::with_capacity(4);

    if options.roi_crop {
        if let Some(roi) = edge_roi(&gray) {
            out.push(("roi", crop(&gray, roi)));
        }
    }

    let smoothed = options.smoothing.then(|| smooth(&gray));
    if options.adaptive_threshold {
        let source = smoothed.as_ref().unwrap_or(&gray);
        out.push(("threshold", adaptive_threshold(source)));
    }
    if let Some(smoothed) = smoothed {
        out.push(("smoothed", smoothed));
    }

    out.insert(0, ("gray", gray));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::ean::{self, testing};

    #[test]
    fn threshold_keeps_a_clean_render_unchanged() {
        let rendered = testing::render(&testing::ean13_modules("8935049502142"), 2, 40);
        assert_eq!(adaptive_threshold(&rendered), rendered);
    }

    #[test]
    fn threshold_recovers_unevenly_lit_barcode() {
        let rendered = testing::render(&testing::ean13_modules("4006381333931"), 3, 60);
        let width = rendered.width();
        // dim the left side so its white reads darker than the global midpoint
        let shaded = GrayImage::from_fn(width, rendered.height(), |x, y| {
            let gain = 0.3 + 0.7 * f64::from(x) / f64::from(width);
            Luma([(f64::from(rendered.get_pixel(x, y)[0]) * gain) as u8])
        });

        assert_eq!(ean::scan_image(&shaded, 5), None);
        assert_eq!(
            ean::scan_image(&adaptive_threshold(&shaded), 5).as_deref(),
            Some("4006381333931")
        );
    }

    #[test]
    fn roi_finds_barcode_on_a_larger_canvas() {
        let barcode = testing::render(&testing::ean13_modules("5901234123457"), 2, 50);
        let mut canvas = GrayImage::from_pixel(600, 300, Luma([255]));
        imageops::replace(&mut canvas, &barcode, 150, 120);

        let roi = edge_roi(&canvas).expect("roi");
        assert!(roi.x <= 150 + 20 && roi.x + roi.width >= 150 + barcode.width() - 20);
        assert!(roi.y <= 120 && roi.y + roi.height >= 120 + 50 - 1);
        assert!(roi.width < 600 && roi.height < 300);

        let cropped = crop(&canvas, roi);
        assert_eq!(ean::scan_image(&cropped, 9).as_deref(), Some("5901234123457"));
    }

    #[test]
    fn flat_image_has_no_roi() {
        let flat = GrayImage::from_pixel(100, 100, Luma([200]));
        assert_eq!(edge_roi(&flat), None);
    }

    #[test]
    fn variants_follow_options() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 64, Luma([255])));
        let names = |options: PreprocessOptions| -> Vec<&'static str> {
            variants(&image, &options).into_iter().map(|(name, _)| name).collect()
        };

        assert_eq!(
            names(PreprocessOptions::default()),
            vec!["gray", "threshold", "smoothed"]
        );
        let bare = PreprocessOptions {
            smoothing: false,
            adaptive_threshold: false,
            roi_crop: false,
            scanlines: 3,
        };
        assert_eq!(names(bare), vec!["gray"]);
    }
}
