//! EAN-13 / EAN-8 scanline reader.
//!
//! Works on one binarized pixel row at a time: the row is run-length encoded
//! and every dark run is tried as the start guard. Digit widths are normalized
//! per digit (each digit spans 7 modules) so mild perspective and blur are
//! tolerated. Every candidate must pass the check digit.

use image::GrayImage;

/// Module widths of each digit's four elements (space, bar, space, bar for the
/// L set). The R set shares these widths with colors flipped; the G set is the
/// reverse.
const DIGIT_WIDTHS: [[u8; 4]; 10] = [
    [3, 2, 1, 1],
    [2, 2, 2, 1],
    [2, 1, 2, 2],
    [1, 4, 1, 1],
    [1, 1, 3, 2],
    [1, 2, 3, 1],
    [1, 1, 1, 4],
    [1, 3, 1, 2],
    [1, 2, 1, 3],
    [3, 1, 1, 2],
];

/// L/G parity of the six left-hand digits (true = G), indexed by the implied
/// leading digit of an EAN-13.
const FIRST_DIGIT_PARITY: [[bool; 6]; 10] = [
    [false, false, false, false, false, false],
    [false, false, true, false, true, true],
    [false, false, true, true, false, true],
    [false, false, true, true, true, false],
    [false, true, false, false, true, true],
    [false, true, true, false, false, true],
    [false, true, true, true, false, false],
    [false, true, false, true, false, true],
    [false, true, false, true, true, false],
    [false, true, true, false, true, false],
];

/// Summed absolute deviation (in modules) above which a digit match is refused.
const MAX_DIGIT_ERROR: f32 = 1.5;
const MIN_ROW_CONTRAST: u8 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub dark: bool,
    pub len: usize,
}

pub fn runs(row: &[bool]) -> Vec<Run> {
    let mut out: Vec<Run> = Vec::new();
    for &dark in row {
        match out.last_mut() {
            Some(run) if run.dark == dark => run.len += 1,
            _ => out.push(Run { dark, len: 1 }),
        }
    }
    out
}

/// Check digit for `data` (all digits except the check digit itself).
pub fn check_digit(data: &[u8]) -> u8 {
    let sum: u32 = data
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| if i % 2 == 0 { u32::from(d) * 3 } else { u32::from(d) })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

pub fn has_valid_check_digit(digits: &[u8]) -> bool {
    match digits.split_last() {
        Some((&check, data)) if !data.is_empty() => check_digit(data) == check,
        _ => false,
    }
}

/// Binarize one row at the midpoint of its darkest and lightest pixel.
/// Rows without enough contrast carry no bars and yield `None`.
pub fn binarize_row(gray: &GrayImage, y: u32) -> Option<Vec<bool>> {
    let (width, height) = gray.dimensions();
    if y >= height || width == 0 {
        return None;
    }

    let row: Vec<u8> = (0..width).map(|x| gray.get_pixel(x, y)[0]).collect();
    let min = *row.iter().min()?;
    let max = *row.iter().max()?;
    if max - min < MIN_ROW_CONTRAST {
        return None;
    }

    let threshold = (u16::from(min) + u16::from(max)) / 2;
    Some(row.iter().map(|&p| u16::from(p) < threshold).collect())
}

/// Try `scanlines` evenly spaced rows. Direction is recovered from digit
/// parity, so each row is read once.
pub fn scan_image(gray: &GrayImage, scanlines: u32) -> Option<String> {
    let height = gray.height();
    if height == 0 {
        return None;
    }

    let lines = scanlines.max(1);
    for k in scan_order(lines) {
        let y = ((u64::from(height) * u64::from(k + 1)) / u64::from(lines + 1)) as u32;
        let Some(row) = binarize_row(gray, y.min(height - 1)) else {
            continue;
        };

        if let Some(code) = decode_runs(&runs(&row)) {
            return Some(code);
        }
    }

    None
}

/// Middle scanline first, then alternating outwards.
fn scan_order(lines: u32) -> Vec<u32> {
    let mid = lines / 2;
    let mut order = vec![mid];
    for offset in 1..=lines {
        if let Some(below) = mid.checked_sub(offset) {
            order.push(below);
        }
        if mid + offset < lines {
            order.push(mid + offset);
        }
    }
    order
}

pub fn decode_runs(runs: &[Run]) -> Option<String> {
    for start in 0..runs.len() {
        if !runs[start].dark {
            continue;
        }
        if let Some(code) = decode_ean13_at(runs, start).or_else(|| decode_ean8_at(runs, start)) {
            return Some(code);
        }
    }
    None
}

fn decode_ean13_at(runs: &[Run], start: usize) -> Option<String> {
    if runs.len() < start + 59 {
        return None;
    }
    let module = guard_module(runs, start)?;

    let first_half = read_digits(runs, start + 3, 6, module)?;
    check_middle_guard(runs, start + 27, module)?;
    let second_half = read_digits(runs, start + 32, 6, module)?;
    check_end_guard(runs, start + 56, module)?;

    // Read left to right the right half is all R (L widths); read right to
    // left the first half is the reversed R half and looks like all G.
    let (parity, mut digits): ([bool; 6], Vec<u8>) =
        if second_half.iter().all(|&(_, is_g)| !is_g) {
            let mut parity = [false; 6];
            for (slot, &(_, is_g)) in parity.iter_mut().zip(first_half.iter()) {
                *slot = is_g;
            }
            let digits = first_half.iter().chain(&second_half).map(|&(d, _)| d).collect();
            (parity, digits)
        } else if first_half.iter().all(|&(_, is_g)| is_g) {
            let mut parity = [false; 6];
            for (slot, &(_, is_g)) in parity.iter_mut().zip(second_half.iter().rev()) {
                *slot = !is_g;
            }
            let digits = second_half
                .iter()
                .rev()
                .chain(first_half.iter().rev())
                .map(|&(d, _)| d)
                .collect();
            (parity, digits)
        } else {
            return None;
        };

    let first = FIRST_DIGIT_PARITY.iter().position(|p| *p == parity)? as u8;
    digits.insert(0, first);

    has_valid_check_digit(&digits).then(|| to_string(&digits))
}

fn decode_ean8_at(runs: &[Run], start: usize) -> Option<String> {
    if runs.len() < start + 43 {
        return None;
    }
    let module = guard_module(runs, start)?;

    let mut read = read_digits(runs, start + 3, 4, module)?;
    check_middle_guard(runs, start + 19, module)?;
    read.extend(read_digits(runs, start + 24, 4, module)?);
    check_end_guard(runs, start + 40, module)?;

    // EAN-8 has no G digits; all-G means the row was read backwards
    let digits: Vec<u8> = if read.iter().all(|&(_, is_g)| !is_g) {
        read.iter().map(|&(d, _)| d).collect()
    } else if read.iter().all(|&(_, is_g)| is_g) {
        read.iter().rev().map(|&(d, _)| d).collect()
    } else {
        return None;
    };

    has_valid_check_digit(&digits).then(|| to_string(&digits))
}

fn read_digits(runs: &[Run], at: usize, count: usize, module: f32) -> Option<Vec<(u8, bool)>> {
    (0..count)
        .map(|i| match_digit(element_widths(runs, at + 4 * i), module))
        .collect()
}

/// Validate the bar-space-bar start guard and the quiet zone before it,
/// returning the estimated module width in pixels.
fn guard_module(runs: &[Run], start: usize) -> Option<f32> {
    let guard = [runs[start].len, runs[start + 1].len, runs[start + 2].len];
    let module = guard.iter().sum::<usize>() as f32 / 3.0;
    if !guard.iter().all(|&w| is_single_module(w, module)) {
        return None;
    }

    if start > 0 && (runs[start - 1].len as f32) < module * 2.0 {
        return None;
    }

    Some(module)
}

fn check_middle_guard(runs: &[Run], at: usize, module: f32) -> Option<()> {
    let widths = &runs[at..at + 5];
    widths
        .iter()
        .all(|run| is_single_module(run.len, module))
        .then_some(())
}

fn check_end_guard(runs: &[Run], at: usize, module: f32) -> Option<()> {
    runs[at..at + 3]
        .iter()
        .all(|run| is_single_module(run.len, module))
        .then_some(())
}

/// Guard elements are a single module wide.
fn is_single_module(width: usize, module: f32) -> bool {
    let w = width as f32;
    w >= module * 0.5 && w <= module * 1.5
}

/// A digit spans seven modules.
fn is_digit_span(total: usize, module: f32) -> bool {
    let w = total as f32;
    w >= module * 7.0 * 0.75 && w <= module * 7.0 * 1.3
}

fn element_widths(runs: &[Run], at: usize) -> [usize; 4] {
    [runs[at].len, runs[at + 1].len, runs[at + 2].len, runs[at + 3].len]
}

/// Best digit for four element widths, trying both the L/R widths and the
/// reversed G widths. The flag is true when the G pattern matched.
fn match_digit(widths: [usize; 4], module: f32) -> Option<(u8, bool)> {
    let total: usize = widths.iter().sum();
    if !is_digit_span(total, module) {
        return None;
    }

    let scale = 7.0 / total as f32;
    let normalized = widths.map(|w| w as f32 * scale);
    let error = |pattern: [u8; 4]| -> f32 {
        normalized
            .iter()
            .zip(pattern.iter())
            .map(|(n, &p)| (n - f32::from(p)).abs())
            .sum()
    };

    let mut best: Option<(u8, bool, f32)> = None;
    for (digit, pattern) in DIGIT_WIDTHS.iter().enumerate() {
        let mut reversed = *pattern;
        reversed.reverse();

        for (candidate, is_g) in [(*pattern, false), (reversed, true)] {
            let e = error(candidate);
            if best.map_or(true, |(_, _, best_e)| e < best_e) {
                best = Some((digit as u8, is_g, e));
            }
        }
    }

    best.filter(|&(_, _, e)| e < MAX_DIGIT_ERROR)
        .map(|(digit, is_g, _)| (digit, is_g))
}

fn to_string(digits: &[u8]) -> String {
    digits.iter().map(|d| char::from(b'0' + d)).collect()
}
