//! White balance: color temperature, green tint, exposure and a tone
//! response curve.
//!
//! Channel multipliers come from the CIE daylight locus for the chosen
//! temperature, converted from XYZ to linear sRGB and normalised so the
//! smallest multiplier is 1. A 1-D response curve built from the black
//! point, exposure, gamma and dark level then scales every pixel by
//! `curve[max(r, g, b)]`, which keeps channel ratios (and so hue) while
//! changing brightness.

use serde::{Deserialize, Serialize};

use crate::action::{FilterAction, FilterCategory};
use crate::buffer::{self, PixelBuffer};
use crate::threaded::{ImageFilter, Progress, ReplayableFilter, base_action, process_rows};
use crate::types::FilterError;

/// Parameters of [`WhiteBalanceFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhiteBalanceSettings {
    /// Black point as a fraction of the range.
    pub black: f64,
    /// Main exposure compensation in stops.
    pub exposition_main: f64,
    /// Fine exposure compensation in stops.
    pub exposition_fine: f64,
    /// Color temperature in Kelvin.
    pub temperature: f64,
    /// Green tint; values above 1 add green.
    pub green: f64,
    /// Shadow darkening strength.
    pub dark: f64,
    /// Response curve gamma.
    pub gamma: f64,
    /// Saturation; 1 keeps channel ratios.
    pub saturation: f64,
    /// Keep multiplied values inside the range before the curve.
    pub clip_saturation: bool,
    /// Zero channels that end up above the white point.
    pub over_exposure_indicator: bool,
    /// Scale the multipliers down so no channel of the source clips.
    pub prevent_clipping: bool,
}

impl WhiteBalanceSettings {
    pub const DEFAULT_BLACK: f64 = 0.0;
    pub const DEFAULT_EXPOSITION_MAIN: f64 = 0.0;
    pub const DEFAULT_EXPOSITION_FINE: f64 = 0.0;
    /// Daylight D65.
    pub const DEFAULT_TEMPERATURE: f64 = 6500.0;
    pub const DEFAULT_GREEN: f64 = 1.0;
    pub const DEFAULT_DARK: f64 = 0.5;
    pub const DEFAULT_GAMMA: f64 = 1.0;
    pub const DEFAULT_SATURATION: f64 = 1.0;
    pub const DEFAULT_CLIP_SATURATION: bool = true;

    /// Lowest and highest temperature the daylight fit is used for.
    pub const MIN_TEMPERATURE: f64 = 2000.0;
    pub const MAX_TEMPERATURE: f64 = 12000.0;

    pub fn write_to_action(&self, action: &mut FilterAction) {
        action.add_parameter("black", self.black);
        action.add_parameter("expositionMain", self.exposition_main);
        action.add_parameter("expositionFine", self.exposition_fine);
        action.add_parameter("temperature", self.temperature);
        action.add_parameter("green", self.green);
        action.add_parameter("dark", self.dark);
        action.add_parameter("gamma", self.gamma);
        action.add_parameter("saturation", self.saturation);
        action.add_parameter("clipSaturation", self.clip_saturation);
        action.add_parameter("overExposureIndicator", self.over_exposure_indicator);
        action.add_parameter("preventClipping", self.prevent_clipping);
    }

    #[must_use]
    pub fn from_action(action: &FilterAction) -> Self {
        let d = Self::default();
        Self {
            black: action.parameter("black", d.black),
            exposition_main: action.parameter("expositionMain", d.exposition_main),
            exposition_fine: action.parameter("expositionFine", d.exposition_fine),
            temperature: action.parameter("temperature", d.temperature),
            green: action.parameter("green", d.green),
            dark: action.parameter("dark", d.dark),
            gamma: action.parameter("gamma", d.gamma),
            saturation: action.parameter("saturation", d.saturation),
            clip_saturation: action.parameter("clipSaturation", d.clip_saturation),
            over_exposure_indicator: action
                .parameter("overExposureIndicator", d.over_exposure_indicator),
            prevent_clipping: action.parameter("preventClipping", d.prevent_clipping),
        }
    }
}

impl Default for WhiteBalanceSettings {
    fn default() -> Self {
        Self {
            black: Self::DEFAULT_BLACK,
            exposition_main: Self::DEFAULT_EXPOSITION_MAIN,
            exposition_fine: Self::DEFAULT_EXPOSITION_FINE,
            temperature: Self::DEFAULT_TEMPERATURE,
            green: Self::DEFAULT_GREEN,
            dark: Self::DEFAULT_DARK,
            gamma: Self::DEFAULT_GAMMA,
            saturation: Self::DEFAULT_SATURATION,
            clip_saturation: Self::DEFAULT_CLIP_SATURATION,
            over_exposure_indicator: false,
            prevent_clipping: false,
        }
    }
}

/// Channel multipliers in red, green, blue order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multipliers {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

/// Linear sRGB from CIE XYZ, indexed `[xyz][rgb]`.
const XYZ_TO_RGB: [[f64; 3]; 3] = [
    [3.24071, -0.969_258, 0.055_635_2],
    [-1.53726, 1.87599, -0.203_996],
    [-0.498_571, 0.041_555_7, 1.05707],
];

/// Multipliers for `temperature` (clamped to the fitted range) and
/// `green`, normalised so the smallest is 1.
#[must_use]
pub fn rgb_multipliers(temperature: f64, green: f64) -> Multipliers {
    let t = temperature.clamp(
        WhiteBalanceSettings::MIN_TEMPERATURE,
        WhiteBalanceSettings::MAX_TEMPERATURE,
    );
    let (t2, t3) = (t * t, t * t * t);
    let xd = if t <= 4000.0 {
        0.27475e9 / t3 - 0.98598e6 / t2 + 1.17444e3 / t + 0.145_986
    } else if t <= 7000.0 {
        -4.6070e9 / t3 + 2.9678e6 / t2 + 0.09911e3 / t + 0.244_063
    } else {
        -2.0064e9 / t3 + 1.9018e6 / t2 + 0.24748e3 / t + 0.237_040
    };
    let yd = -3.0 * xd * xd + 2.87 * xd - 0.275;
    let xyz = [xd / yd, 1.0, (1.0 - xd - yd) / yd];

    let [mut red, mut grn, mut blue] =
        std::array::from_fn::<f64, 3, _>(|c| (0..3).map(|i| xyz[i] * XYZ_TO_RGB[i][c]).sum());
    grn /= green;

    red = 1.0 / red;
    grn = 1.0 / grn;
    blue = 1.0 / blue;
    let min = red.min(grn).min(blue);
    Multipliers {
        red: red / min,
        green: grn / min,
        blue: blue / min,
    }
}

/// The per-value response curve and the black and white points it was
/// built with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCurve {
    pub black_point: i64,
    pub white_point: i64,
    pub curve: Vec<f64>,
}

/// Build the response curve for `rgb_max` values (256 or 65536).
///
/// `green_multiplier` scales the white point along with the exposure.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn response_curve(
    settings: &WhiteBalanceSettings,
    green_multiplier: f64,
    rgb_max: usize,
) -> ResponseCurve {
    let range = rgb_max as f64;
    let b = green_multiplier * 2_f64.powf(settings.exposition_main + settings.exposition_fine);
    // NaN casts to 0; the clamp keeps `black_point + 1` in range.
    let black_point = (range * settings.black).clamp(0.0, range) as i64;
    let mut white_point = (range / b) as i64;
    if white_point <= black_point {
        white_point = black_point + 1;
    }

    let gamma = if settings.gamma >= 1.0 {
        0.335 * (2.0 - settings.gamma) + 0.665
    } else {
        1.8 * (2.0 - settings.gamma) - 0.8
    };

    let span = (white_point - black_point) as f64;
    let mut curve = vec![0.0; rgb_max];
    for (i, value) in curve.iter_mut().enumerate().skip(1) {
        let i = i as i64;
        let x = (i - black_point) as f64 / span;
        let mut v = if i < black_point {
            0.0
        } else {
            (range - 1.0) * x.powf(gamma)
        };
        v *= 1.0 - settings.dark * (-x * x / 0.002).exp();
        *value = v / i as f64;
    }

    ResponseCurve {
        black_point,
        white_point,
        curve,
    }
}

/// Scale `multipliers` down so the brightest value of each channel in
/// `image` stays inside the range.
#[must_use]
pub fn prevent_clipping(image: &PixelBuffer, multipliers: Multipliers) -> Multipliers {
    let sixteen_bit = image.sixteen_bit();
    let mut peak = [0_u16; 4];
    for pixel in image.data().chunks_exact(image.bytes_depth()) {
        let c = buffer::read_pixel(pixel, sixteen_bit);
        for (p, v) in peak.iter_mut().zip(c) {
            *p = (*p).max(v);
        }
    }
    let max = f64::from(image.max_value());
    let scale = [
        (peak[buffer::RED], multipliers.red),
        (peak[buffer::GREEN], multipliers.green),
        (peak[buffer::BLUE], multipliers.blue),
    ]
    .into_iter()
    .filter(|&(p, _)| p > 0)
    .map(|(p, m)| max / (f64::from(p) * m))
    .fold(1.0_f64, f64::min);

    Multipliers {
        red: multipliers.red * scale,
        green: multipliers.green * scale,
        blue: multipliers.blue * scale,
    }
}

/// Apply white balance in place.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
pub fn apply_white_balance(
    settings: &WhiteBalanceSettings,
    image: &mut PixelBuffer,
    progress: &Progress,
) {
    let rgb_max = image.depth().segments();
    let mut multipliers = rgb_multipliers(settings.temperature, settings.green);
    let lut_green = if settings.clip_saturation { 1.0 } else { multipliers.green };
    let response = response_curve(settings, lut_green, rgb_max);
    if settings.prevent_clipping {
        multipliers = prevent_clipping(image, multipliers);
    }
    log::debug!(
        "T(K): {} => R: {} G: {} B: {} BP: {} WP: {}",
        settings.temperature,
        multipliers.red,
        multipliers.green,
        multipliers.blue,
        response.black_point,
        response.white_point
    );

    let rgb_max = rgb_max as i64;
    let sixteen_bit = image.sixteen_bit();
    let pixel_size = image.bytes_depth();
    let color = |channel: i64, v: i64| -> u16 {
        let mut r = if settings.clip_saturation && channel > rgb_max {
            rgb_max
        } else {
            channel
        };
        if settings.over_exposure_indicator
            && v > response.black_point
            && v > response.white_point
        {
            r = 0;
        }
        let index = v.clamp(0, rgb_max - 1) as usize;
        let (v, r) = (v as f64, r as f64);
        let value = ((v - settings.saturation * (v - r)) * response.curve[index]) as i64;
        value.clamp(0, rgb_max - 1) as u16
    };

    process_rows(image, progress, 0, 100, |_, row| {
        for pixel in row.chunks_exact_mut(pixel_size) {
            let mut c = buffer::read_pixel(pixel, sixteen_bit);
            let red = (f64::from(c[buffer::RED]) * multipliers.red) as i64;
            let green = (f64::from(c[buffer::GREEN]) * multipliers.green) as i64;
            let blue = (f64::from(c[buffer::BLUE]) * multipliers.blue) as i64;
            let mut v = red.max(green).max(blue);
            if settings.clip_saturation {
                v = v.min(rgb_max - 1);
            }
            c[buffer::RED] = color(red, v);
            c[buffer::GREEN] = color(green, v);
            c[buffer::BLUE] = color(blue, v);
            buffer::write_pixel(pixel, sixteen_bit, c);
        }
    });
}

/// Color temperature, tint and exposure correction.
#[derive(Debug, Clone, Default)]
pub struct WhiteBalanceFilter {
    settings: WhiteBalanceSettings,
}

impl WhiteBalanceFilter {
    #[must_use]
    pub const fn new(settings: WhiteBalanceSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub const fn settings(&self) -> &WhiteBalanceSettings {
        &self.settings
    }
}

impl ImageFilter for WhiteBalanceFilter {
    fn identifier(&self) -> &'static str {
        Self::IDENTIFIER
    }

    fn version(&self) -> i32 {
        Self::VERSION
    }

    fn display_name(&self) -> &'static str {
        Self::DISPLAY_NAME
    }

    fn filter_image(
        &mut self,
        mut source: PixelBuffer,
        _reference: Option<&PixelBuffer>,
        progress: &Progress,
    ) -> Result<PixelBuffer, FilterError> {
        apply_white_balance(&self.settings, &mut source, progress);
        Ok(source)
    }

    fn filter_action(&self) -> FilterAction {
        let mut action = base_action::<Self>(FilterCategory::Reproducible);
        self.settings.write_to_action(&mut action);
        action
    }
}

impl ReplayableFilter for WhiteBalanceFilter {
    const IDENTIFIER: &'static str = "digikam:WhiteBalanceFilter";
    const VERSION: i32 = 1;
    const DISPLAY_NAME: &'static str = "White Balance Tool";

    fn from_action(action: &FilterAction) -> Self {
        Self::new(WhiteBalanceSettings::from_action(action))
    }
}
