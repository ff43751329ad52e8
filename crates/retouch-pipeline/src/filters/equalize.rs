//! Histogram equalization of red, green and blue.
//!
//! Each channel is mapped through its own cumulative histogram, scaled so
//! the darkest populated value lands on 0 and the brightest on the
//! maximum. A channel whose pixels all share one value is left alone.

use crate::action::FilterAction;
use crate::buffer::PixelBuffer;
use crate::filters::{calibration_image, reference_category};
use crate::histogram::Histogram;
use crate::lut::{ChannelLuts, LutChannel};
use crate::threaded::{ImageFilter, Progress, ReplayableFilter, base_action};
use crate::types::{Channel, FilterError};

/// Equalization tables for red, green and blue.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn equalize_luts(histogram: &Histogram) -> ChannelLuts {
    let depth = histogram.depth();
    let max = u64::from(depth.max_value());
    let mut luts = ChannelLuts::empty(depth);

    for (channel, lut_channel) in [
        (Channel::Red, LutChannel::Red),
        (Channel::Green, LutChannel::Green),
        (Channel::Blue, LutChannel::Blue),
    ] {
        let cumulative: Vec<u64> = histogram
            .counts(channel)
            .iter()
            .scan(0, |sum, &count| {
                *sum += count;
                Some(*sum)
            })
            .collect();
        let low = cumulative.iter().copied().find(|&c| c > 0).unwrap_or(0);
        let high = cumulative.last().copied().unwrap_or(0);
        if low == high {
            continue;
        }
        luts = luts.with_table(lut_channel, |v| {
            let c = cumulative[usize::from(v)].saturating_sub(low);
            (max * c / (high - low)) as u16
        });
    }
    luts
}

/// Histogram equalization.
#[derive(Debug, Clone, Default)]
pub struct EqualizeFilter {
    used_reference: bool,
}

impl EqualizeFilter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            used_reference: false,
        }
    }
}

impl ImageFilter for EqualizeFilter {
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
        equalize_luts(&histogram).apply(&mut source, progress, 10, 100);
        Ok(source)
    }

    fn filter_action(&self) -> FilterAction {
        base_action::<Self>(reference_category(self.used_reference))
    }
}

impl ReplayableFilter for EqualizeFilter {
    const IDENTIFIER: &'static str = "digikam:EqualizeFilter";
    const VERSION: i32 = 1;
    const DISPLAY_NAME: &'static str = "Auto Equalize";

    fn from_action(_action: &FilterAction) -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::Color;

    fn equalize(image: &PixelBuffer, reference: Option<&PixelBuffer>) -> PixelBuffer {
        EqualizeFilter::new()
            .filter_image(image.clone(), reference, &Progress::default())
            .unwrap()
    }

    #[test]
    fn flat_ramp_is_unchanged() {
        let mut image = PixelBuffer::new(256, 2, false, false);
        for x in 0..256_u16 {
            image.set_pixel(u32::from(x), 0, Color::opaque(x, x, x, false));
            image.set_pixel(u32::from(x), 1, Color::opaque(x, x, x, false));
        }
        assert_eq!(equalize(&image, None), image);
    }

    #[test]
    fn uniform_color_is_unchanged() {
        let image = PixelBuffer::filled(5, 5, true, Color::new(90, 40, 200, 10, false));
        assert_eq!(equalize(&image, None), image);
    }

    #[test]
    fn spreads_two_values() {
        let mut image = PixelBuffer::filled(2, 1, false, Color::opaque(100, 100, 100, false));
        image.set_pixel(1, 0, Color::opaque(110, 110, 110, false));
        let out = equalize(&image, None);
        assert_eq!(out.pixel(0, 0).red, 0);
        assert_eq!(out.pixel(1, 0).red, 255);
    }

    #[test]
    fn sixteen_bit() {
        let mut image = PixelBuffer::filled(4, 1, false, Color::opaque(1000, 1000, 1000, true));
        image.set_pixel(3, 0, Color::opaque(2000, 2000, 2000, true));
        let out = equalize(&image, None);
        assert_eq!(out.pixel(0, 0).green, 0);
        assert_eq!(out.pixel(3, 0).green, 65535);
    }

    #[test]
    fn depth_mismatch_fails() {
        let image = PixelBuffer::filled(2, 2, false, Color::opaque(1, 2, 3, false));
        let reference = PixelBuffer::filled(2, 2, false, Color::opaque(1, 2, 3, true));
        let err = EqualizeFilter::new()
            .filter_image(image, Some(&reference), &Progress::default())
            .unwrap_err();
        assert!(matches!(err, FilterError::DepthMismatch { .. }));
    }
}
