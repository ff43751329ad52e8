//! Automatic exposure: derive a black point and exposure from the
//! luminosity histogram, then run white balance with them.

use crate::action::{FilterAction, FilterCategory};
use crate::buffer::PixelBuffer;
use crate::filters::calibration_image;
use crate::filters::white_balance::{WhiteBalanceSettings, apply_white_balance};
use crate::histogram::Histogram;
use crate::threaded::{ImageFilter, Progress, ReplayableFilter, base_action};
use crate::types::{Channel, FilterError};

/// Black point and main exposure that pull the brightest and darkest
/// 0.5% of pixels to the ends of the range.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_precision_loss)]
pub fn auto_exposure_adjustment(histogram: &Histogram) -> (f64, f64) {
    let rgb_max = histogram.segments() as i64;
    let stop = histogram.pixel_count() / 200;

    let mut i = rgb_max;
    let mut sum = 0;
    while i >= 0 && sum < stop {
        sum += histogram.value(Channel::Luminosity, i);
        i -= 1;
    }
    let expo = -((i + 1) as f64 / rgb_max as f64).log2();

    let mut i = 1;
    let mut sum = 0;
    while i < rgb_max && sum < stop {
        sum += histogram.value(Channel::Luminosity, i);
        i += 1;
    }
    let black = i as f64 / rgb_max as f64 / 2.0;

    log::debug!("auto exposure: black {black}, exposure {expo}");
    (black, expo)
}

/// Exposure correction measured on the source or a calibration image.
#[derive(Debug, Clone, Default)]
pub struct AutoExpoFilter {
    used_reference: bool,
}

impl AutoExpoFilter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            used_reference: false,
        }
    }
}

impl ImageFilter for AutoExpoFilter {
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
        reference: Option<&PixelBuffer>,
        progress: &Progress,
    ) -> Result<PixelBuffer, FilterError> {
        let histogram = Histogram::calculate(calibration_image(&source, reference)?);
        self.used_reference = reference.is_some();
        progress.post(10);

        let (black, expo) = auto_exposure_adjustment(&histogram);
        let settings = WhiteBalanceSettings {
            black,
            exposition_main: expo,
            ..WhiteBalanceSettings::default()
        };
        apply_white_balance(&settings, &mut source, progress);
        Ok(source)
    }

    fn filter_action(&self) -> FilterAction {
        let category = if self.used_reference {
            FilterCategory::Complex
        } else {
            FilterCategory::Reproducible
        };
        base_action::<Self>(category)
    }
}

impl ReplayableFilter for AutoExpoFilter {
    const IDENTIFIER: &'static str = "digikam:AutoExpoFilter";
    const VERSION: i32 = 1;
    const DISPLAY_NAME: &'static str = "Auto Exposure";

    fn from_action(_action: &FilterAction) -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::Color;

    fn gradient(sixteen_bit: bool) -> PixelBuffer {
        let mut image = PixelBuffer::new(100, 20, sixteen_bit, false);
        for y in 0..20 {
            for x in 0..100_u16 {
                let v = 50 + x;
                let v = if sixteen_bit { v * 257 } else { v };
                image.set_pixel(u32::from(x), y, Color::opaque(v, v, v, sixteen_bit));
            }
        }
        image
    }

    #[test]
    fn adjustment_from_histogram() {
        // 2000 pixels, stop = 10; every bin 50..=149 holds 20.
        let (black, expo) = auto_exposure_adjustment(&Histogram::calculate(&gradient(false)));
        // Top scan stops after bin 149, leaving i = 148.
        assert!((expo - (-(149.0_f64 / 256.0).log2())).abs() < 1e-12);
        // Bottom scan ends one past bin 50.
        assert!((black - 51.0 / 256.0 / 2.0).abs() < 1e-12);
    }

    #[test]
    fn tiny_image_uses_range_ends() {
        let image = PixelBuffer::filled(2, 2, false, Color::opaque(10, 10, 10, false));
        let (black, expo) = auto_exposure_adjustment(&Histogram::calculate(&image));
        assert!((expo - (-(257.0_f64 / 256.0).log2())).abs() < 1e-12);
        assert!((black - 1.0 / 512.0).abs() < 1e-12);
    }

    #[test]
    fn brightens_dark_image() {
        let image = gradient(false);
        let out = AutoExpoFilter::new()
            .filter_image(image.clone(), None, &Progress::default())
            .unwrap();
        assert!(out.pixel(90, 5).red > image.pixel(90, 5).red);
    }

    #[test]
    fn deterministic() {
        let image = gradient(true);
        let a = AutoExpoFilter::new()
            .filter_image(image.clone(), None, &Progress::default())
            .unwrap();
        let b = AutoExpoFilter::new()
            .filter_image(image, None, &Progress::default())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reference_depth_must_match() {
        let image = gradient(false);
        let reference = gradient(true);
        let err = AutoExpoFilter::new()
            .filter_image(image, Some(&reference), &Progress::default())
            .unwrap_err();
        assert_eq!(err, FilterError::DepthMismatch { expected: 8, found: 16 });
    }

    #[test]
    fn reference_makes_action_complex() {
        let image = gradient(false);
        let mut filter = AutoExpoFilter::new();
        assert_eq!(filter.filter_action().category(), FilterCategory::Reproducible);
        filter
            .filter_image(image.clone(), Some(&image), &Progress::default())
            .unwrap();
        assert_eq!(filter.filter_action().category(), FilterCategory::Complex);
    }
}
