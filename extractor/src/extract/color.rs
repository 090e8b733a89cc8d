use image::{GrayImage, RgbImage};
use palette::encoding;
use palette::white_point::D65;
use palette::{FromColor, LinSrgb, Srgb, Yxy};
use stagelight_common::config::ColorConfig;
use stagelight_common::snapshot::{Hsv, StateSnapshot};
use tracing::trace;

use super::mask::{apply_mask, MaskError};

/// Valid domain of the Kang 2002 locus approximation, in Kelvin.
pub const MIN_TEMPERATURE: f64 = 1667.0;
pub const MAX_TEMPERATURE: f64 = 25000.0;

/// Slack for float error when a channel has zero spread.
const SPREAD_EPSILON: f64 = 1e-9;

/// CIE 1931 chromaticity of the D65 white point.
const D65_XY: (f64, f64) = (0.3127, 0.3290);

/// Maximum per-channel deltas under which two readings count as the same state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
    pub temperature: f64,
}

impl From<&ColorConfig> for Thresholds {
    fn from(config: &ColorConfig) -> Self {
        Self {
            hue: config.hue_threshold,
            saturation: config.saturation_threshold,
            value: config.value_threshold,
            temperature: config.temperature_threshold,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimilarityError {
    #[error(
        "snapshots at {first:.2}s and {second:.2}s disagree on region counts \
         ({first_hues} vs {second_hues} hues, {first_temps} vs {second_temps} temps)"
    )]
    LengthMismatch {
        first: f64,
        second: f64,
        first_hues: usize,
        second_hues: usize,
        first_temps: usize,
        second_temps: usize,
    },
}

/// Representative color of the masked region.
///
/// Algorithm:
/// 1. Keep non-black pixels inside the mask, converted to HSV
/// 2. Drop shadows: pixels with `v < brightness_cutoff * mean(v)`
/// 3. Drop chromatic outliers: pixels whose hue or saturation lies more than
///    one standard deviation from the mean of the survivors
/// 4. Average what is left
///
/// Returns black when a filtering stage leaves no pixels.
pub fn extract_color(
    frame: &RgbImage,
    mask: &GrayImage,
    brightness_cutoff: f64,
) -> Result<Hsv, MaskError> {
    let masked = apply_mask(frame, mask)?;

    let colors: Vec<Hsv> = masked
        .pixels()
        .filter(|p| p.0 != [0, 0, 0])
        .map(|p| rgb_to_hsv(p.0[0], p.0[1], p.0[2]))
        .collect();
    if colors.is_empty() {
        return Ok(Hsv::BLACK);
    }

    let cutoff = brightness_cutoff * mean(&colors).v;
    let colors: Vec<Hsv> = colors.into_iter().filter(|c| c.v >= cutoff).collect();
    if colors.is_empty() {
        return Ok(Hsv::BLACK);
    }

    let m = mean(&colors);
    let d = deviation(&colors, &m);
    let colors: Vec<Hsv> = colors
        .into_iter()
        .filter(|c| {
            (c.h - m.h).abs() <= d.h + SPREAD_EPSILON && (c.s - m.s).abs() <= d.s + SPREAD_EPSILON
        })
        .collect();
    if colors.is_empty() {
        return Ok(Hsv::BLACK);
    }

    let color = mean(&colors);
    trace!(pixels = colors.len(), %color, "extracted region color");
    Ok(color)
}

fn mean(colors: &[Hsv]) -> Hsv {
    let n = colors.len() as f64;
    let (h, s, v) = colors
        .iter()
        .fold((0.0, 0.0, 0.0), |(h, s, v), c| (h + c.h, s + c.s, v + c.v));
    Hsv::new(h / n, s / n, v / n)
}

/// Population standard deviation per channel.
fn deviation(colors: &[Hsv], m: &Hsv) -> Hsv {
    let n = colors.len() as f64;
    let (h, s, v) = colors.iter().fold((0.0, 0.0, 0.0), |(h, s, v), c| {
        (
            h + (c.h - m.h).powi(2),
            s + (c.s - m.s).powi(2),
            v + (c.v - m.v).powi(2),
        )
    });
    Hsv::new((h / n).sqrt(), (s / n).sqrt(), (v / n).sqrt())
}

type SrgbHsv = palette::Hsv<encoding::Srgb, f64>;

/// 8-bit RGB to HSV with hue as a fraction of a full turn.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let rgb: Srgb<f64> = Srgb::<u8>::new(r, g, b).into_format();
    let hsv = SrgbHsv::from_color(rgb);
    let h = (hsv.hue.into_positive_degrees() / 360.0).rem_euclid(1.0);
    Hsv::new(h, hsv.saturation, hsv.value)
}

/// HSV back to gamma-encoded RGB in `[0, 1]`.
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (f64, f64, f64) {
    let rgb: Srgb<f64> = Srgb::from_color(SrgbHsv::new(h * 360.0, s, v));
    (rgb.red, rgb.green, rgb.blue)
}

/// sRGB (D65) to CIE 1931 xy chromaticity.
fn rgb_to_xy(r: f64, g: f64, b: f64) -> (f64, f64) {
    let linear: LinSrgb<f64> = Srgb::<f64>::new(r, g, b).into_linear();
    let yxy = Yxy::<D65, f64>::from_color(linear);
    if yxy.luma <= f64::EPSILON {
        return D65_XY;
    }
    (yxy.x, yxy.y)
}

/// Kang et al. (2002) cubic-spline approximation of the Planckian locus.
fn kang_locus(kelvin: f64) -> (f64, f64) {
    let t = kelvin;
    let x = if t <= 4000.0 {
        -0.266_123_9e9 / t.powi(3) - 0.234_358_9e6 / t.powi(2) + 0.877_695_6e3 / t + 0.179_910
    } else {
        -3.025_846_9e9 / t.powi(3) + 2.107_037_9e6 / t.powi(2) + 0.222_634_7e3 / t + 0.240_390
    };
    let y = if t <= 2222.0 {
        -1.106_381_4 * x.powi(3) - 1.348_110_20 * x.powi(2) + 2.185_558_32 * x - 0.202_196_83
    } else if t <= 4000.0 {
        -0.954_947_6 * x.powi(3) - 1.374_185_93 * x.powi(2) + 2.091_370_15 * x - 0.167_488_67
    } else {
        3.081_758_0 * x.powi(3) - 5.873_386_70 * x.powi(2) + 3.751_129_97 * x - 0.370_014_83
    };
    (x, y)
}

fn locus_distance(mired: f64, x: f64, y: f64) -> f64 {
    let (lx, ly) = kang_locus(1.0e6 / mired);
    (lx - x).powi(2) + (ly - y).powi(2)
}

/// Correlated color temperature of `xy`: the temperature of the nearest point
/// on the Kang 2002 locus, searched in mired space.
fn xy_to_cct(x: f64, y: f64) -> f64 {
    const SCAN_STEPS: usize = 600;
    const GOLDEN: f64 = 0.618_033_988_749_895;

    let lo = 1.0e6 / MAX_TEMPERATURE;
    let hi = 1.0e6 / MIN_TEMPERATURE;
    let step = (hi - lo) / SCAN_STEPS as f64;

    let best = (0..=SCAN_STEPS)
        .map(|i| lo + step * i as f64)
        .min_by(|a, b| locus_distance(*a, x, y).total_cmp(&locus_distance(*b, x, y)))
        .unwrap_or(lo);

    // Golden-section refinement inside the bracketing scan cell.
    let mut a = (best - step).max(lo);
    let mut b = (best + step).min(hi);
    for _ in 0..60 {
        let c = b - GOLDEN * (b - a);
        let d = a + GOLDEN * (b - a);
        if locus_distance(c, x, y) < locus_distance(d, x, y) {
            b = d;
        } else {
            a = c;
        }
    }
    1.0e6 / ((a + b) / 2.0)
}

/// Correlated color temperature (Kelvin) of an HSV color, clipped to
/// `[MIN_TEMPERATURE, MAX_TEMPERATURE]`.
pub fn hue_to_temperature(h: f64, s: f64, v: f64) -> f64 {
    let (r, g, b) = hsv_to_rgb(h, s, v);
    let (x, y) = rgb_to_xy(r, g, b);
    xy_to_cct(x, y).clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
}

/// Whether two snapshots describe the same lighting state.
///
/// Two invalid snapshots are the same ("no data" twice); an invalid and a valid
/// one never are. Valid snapshots must agree on their region counts, otherwise
/// they were produced by differently configured extractors and comparing them
/// is an error.
pub fn similar(
    a: &StateSnapshot,
    b: &StateSnapshot,
    thresholds: &Thresholds,
) -> Result<bool, SimilarityError> {
    match (a.is_valid(), b.is_valid()) {
        (false, false) => return Ok(true),
        (true, true) => {}
        _ => return Ok(false),
    }

    if a.hues().len() != b.hues().len() || a.temps().len() != b.temps().len() {
        return Err(SimilarityError::LengthMismatch {
            first: a.timestamp(),
            second: b.timestamp(),
            first_hues: a.hues().len(),
            second_hues: b.hues().len(),
            first_temps: a.temps().len(),
            second_temps: b.temps().len(),
        });
    }

    let hues_close = a.hues().iter().zip(b.hues()).all(|(x, y)| {
        (x.h - y.h).abs() <= thresholds.hue
            && (x.s - y.s).abs() <= thresholds.saturation
            && (x.v - y.v).abs() <= thresholds.value
    });
    let temps_close = a
        .temps()
        .iter()
        .zip(b.temps())
        .all(|(x, y)| (x - y).abs() <= thresholds.temperature);

    Ok(hues_close && temps_close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn thresholds() -> Thresholds {
        Thresholds {
            hue: 0.05,
            saturation: 0.1,
            value: 0.1,
            temperature: 500.0,
        }
    }

    fn full_mask(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([255]))
    }

    fn assert_close(actual: Hsv, expected: Hsv) {
        assert!((actual.h - expected.h).abs() < 0.01, "{actual} vs {expected}");
        assert!((actual.s - expected.s).abs() < 0.01, "{actual} vs {expected}");
        assert!((actual.v - expected.v).abs() < 0.01, "{actual} vs {expected}");
    }

    #[test]
    fn rgb_to_hsv_primaries() {
        assert_close(rgb_to_hsv(255, 0, 0), Hsv::new(0.0, 1.0, 1.0));
        assert_close(rgb_to_hsv(0, 255, 0), Hsv::new(1.0 / 3.0, 1.0, 1.0));
        assert_close(rgb_to_hsv(0, 0, 255), Hsv::new(2.0 / 3.0, 1.0, 1.0));
        assert_close(rgb_to_hsv(255, 255, 255), Hsv::new(0.0, 0.0, 1.0));
        assert_close(rgb_to_hsv(255, 0, 255), Hsv::new(5.0 / 6.0, 1.0, 1.0));
    }

    #[test]
    fn hsv_to_rgb_inverts_rgb_to_hsv() {
        for (r, g, b) in [(255u8, 128u8, 0u8), (12, 200, 90), (40, 40, 220), (250, 10, 120)] {
            let c = rgb_to_hsv(r, g, b);
            let (rr, gg, bb) = hsv_to_rgb(c.h, c.s, c.v);
            assert!((rr * 255.0 - r as f64).abs() < 1e-6);
            assert!((gg * 255.0 - g as f64).abs() < 1e-6);
            assert!((bb * 255.0 - b as f64).abs() < 1e-6);
        }
    }

    #[test]
    fn white_and_black_sit_on_the_white_point() {
        let (x, y) = rgb_to_xy(1.0, 1.0, 1.0);
        assert!((x - D65_XY.0).abs() < 1e-3 && (y - D65_XY.1).abs() < 1e-3, "({x}, {y})");
        assert_eq!(rgb_to_xy(0.0, 0.0, 0.0), D65_XY);

        let (x, _) = rgb_to_xy(1.0, 0.0, 0.0);
        assert!((x - 0.64).abs() < 1e-3, "red x = {x}");
    }

    #[test]
    fn black_outside_mask_gives_black() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([200, 120, 40]));
        let mask = GrayImage::new(8, 8);
        assert_eq!(extract_color(&frame, &mask, 0.5).unwrap(), Hsv::BLACK);

        let black = RgbImage::new(8, 8);
        assert_eq!(extract_color(&black, &full_mask(8, 8), 0.5).unwrap(), Hsv::BLACK);
    }

    #[test]
    fn uniform_region_returns_its_color() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([255, 170, 0]));
        let color = extract_color(&frame, &full_mask(8, 8), 0.5).unwrap();
        assert_close(color, rgb_to_hsv(255, 170, 0));
    }

    #[test]
    fn only_masked_region_counts() {
        // Left half orange lamps, right half blue windows.
        let mut frame = RgbImage::new(8, 8);
        let mut mask = GrayImage::new(8, 8);
        for (x, y, p) in frame.enumerate_pixels_mut() {
            *p = if x < 4 { Rgb([230, 160, 60]) } else { Rgb([60, 120, 210]) };
            if x < 4 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let color = extract_color(&frame, &mask, 0.5).unwrap();
        assert_close(color, rgb_to_hsv(230, 160, 60));
    }

    #[test]
    fn shadows_and_outliers_are_dropped() {
        let mut frame = RgbImage::from_pixel(10, 10, Rgb([240, 140, 40]));
        // A dark shadow band.
        for x in 0..10 {
            frame.put_pixel(x, 0, Rgb([30, 15, 5]));
            frame.put_pixel(x, 1, Rgb([30, 15, 5]));
        }
        // A bright blue reflection.
        frame.put_pixel(5, 5, Rgb([90, 150, 255]));
        frame.put_pixel(6, 5, Rgb([90, 150, 255]));

        let color = extract_color(&frame, &full_mask(10, 10), 0.5).unwrap();
        assert_close(color, rgb_to_hsv(240, 140, 40));
    }

    #[test]
    fn channels_stay_in_unit_range() {
        let mut frame = RgbImage::new(16, 16);
        for (x, y, p) in frame.enumerate_pixels_mut() {
            *p = Rgb([(x * 16) as u8, (y * 16) as u8, ((x + y) * 8) as u8]);
        }
        for cutoff in [0.0, 0.25, 0.5, 1.0] {
            let c = extract_color(&frame, &full_mask(16, 16), cutoff).unwrap();
            for channel in [c.h, c.s, c.v] {
                assert!((0.0..=1.0).contains(&channel), "{c}");
            }
        }
    }

    #[test]
    fn mismatched_mask_is_an_error() {
        let frame = RgbImage::new(8, 8);
        assert!(extract_color(&frame, &full_mask(4, 4), 0.5).is_err());
    }

    #[test]
    fn temperature_of_red_is_warm() {
        assert!((hue_to_temperature(0.0, 1.0, 1.0) - 1667.0).abs() < 100.0);
    }

    #[test]
    fn temperature_of_white_is_neutral() {
        let t = hue_to_temperature(0.0, 0.0, 1.0);
        assert!((6100.0..6600.0).contains(&t), "white gave {t}");
    }

    #[test]
    fn temperature_of_blue_is_cold() {
        assert!((hue_to_temperature(0.66, 1.0, 1.0) - 25000.0).abs() < 100.0);
    }

    #[test]
    fn temperature_rises_from_warm_to_cool() {
        let warm = hue_to_temperature(0.08, 0.6, 1.0);
        let neutral = hue_to_temperature(0.0, 0.0, 1.0);
        let cool = hue_to_temperature(0.6, 0.3, 1.0);
        assert!(warm < neutral, "{warm} !< {neutral}");
        assert!(neutral < cool, "{neutral} !< {cool}");
    }

    #[test]
    fn temperature_always_clipped() {
        for i in 0..=10 {
            for j in 0..=10 {
                for v in [0.0, 0.5, 1.0] {
                    let t = hue_to_temperature(i as f64 / 10.0, j as f64 / 10.0, v);
                    assert!((MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&t), "{t}");
                }
            }
        }
    }

    #[test]
    fn invalid_snapshots_are_similar() {
        let a = StateSnapshot::invalid(1.0);
        let b = StateSnapshot::invalid(2.0);
        assert!(similar(&a, &b, &thresholds()).unwrap());
    }

    #[test]
    fn invalid_and_valid_differ() {
        let a = StateSnapshot::invalid(1.0);
        let b = StateSnapshot::new(vec![], vec![]);
        assert!(!similar(&a, &b, &thresholds()).unwrap());
        assert!(!similar(&b, &a, &thresholds()).unwrap());
    }

    #[test]
    fn within_thresholds_is_similar() {
        let a = StateSnapshot::new(vec![Hsv::new(0.10, 0.50, 0.80)], vec![3000.0]);
        let b = StateSnapshot::new(vec![Hsv::new(0.13, 0.45, 0.85)], vec![3400.0]);
        assert!(similar(&a, &b, &thresholds()).unwrap());
    }

    #[test]
    fn any_channel_over_threshold_differs() {
        let base = StateSnapshot::new(vec![Hsv::new(0.10, 0.50, 0.80)], vec![3000.0]);
        let variants = [
            StateSnapshot::new(vec![Hsv::new(0.20, 0.50, 0.80)], vec![3000.0]),
            StateSnapshot::new(vec![Hsv::new(0.10, 0.70, 0.80)], vec![3000.0]),
            StateSnapshot::new(vec![Hsv::new(0.10, 0.50, 0.50)], vec![3000.0]),
            StateSnapshot::new(vec![Hsv::new(0.10, 0.50, 0.80)], vec![4000.0]),
        ];
        for other in &variants {
            assert!(!similar(&base, other, &thresholds()).unwrap(), "{other}");
        }
    }

    #[test]
    fn mismatched_lengths_are_an_error() {
        let a = StateSnapshot::new(vec![Hsv::BLACK], vec![3000.0]);
        let b = StateSnapshot::new(vec![Hsv::BLACK, Hsv::BLACK], vec![3000.0]);
        assert!(matches!(
            similar(&a, &b, &thresholds()),
            Err(SimilarityError::LengthMismatch { first_hues: 1, second_hues: 2, .. })
        ));

        let c = StateSnapshot::new(vec![Hsv::BLACK], vec![]);
        assert!(similar(&a, &c, &thresholds()).is_err());
    }
}
