use crate::action::FilterAction;
use crate::buffer::PixelBuffer;
use crate::filters::{calibration_image, reference_category};
use crate::histogram::Histogram;
use crate::levels::Levels;
use crate::threaded::{ImageFilter, Progress, ReplayableFilter, base_action};
use crate::types::{Channel, FilterError};

/// Per-channel levels stretch measured on the source or a calibration
/// image.
#[derive(Debug, Clone, Default)]
pub struct AutoLevelsFilter {
    used_reference: bool,
}

impl AutoLevelsFilter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            used_reference: false,
        }
    }

    /// Levels computed from `histogram`: red, green and blue stretched
    /// independently, value and alpha left alone.
    #[must_use]
    pub fn levels(histogram: &Histogram) -> Levels {
        let mut levels = Levels::new(histogram.depth());
        for channel in [Channel::Red, Channel::Green, Channel::Blue] {
            levels.auto_channel(histogram, channel);
        }
        levels
    }
}

impl ImageFilter for AutoLevelsFilter {
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
        Self::levels(&histogram).luts().apply(&mut source, progress, 10, 100);
        Ok(source)
    }

    fn filter_action(&self) -> FilterAction {
        base_action::<Self>(reference_category(self.used_reference))
    }
}

impl ReplayableFilter for AutoLevelsFilter {
    const IDENTIFIER: &'static str = "digikam:AutoLevelsfilter";
    const VERSION: i32 = 1;
    const DISPLAY_NAME: &'static str = "Auto Levels";

    fn from_action(_action: &FilterAction) -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::Color;

    fn low_contrast() -> PixelBuffer {
        let mut image = PixelBuffer::new(200, 5, false, true);
        for y in 0..5 {
            for x in 0..200_u16 {
                let v = 100 + x / 4;
                image.set_pixel(u32::from(x), y, Color::new(v, v / 2, 60, 200, false));
            }
        }
        image
    }

    #[test]
    fn stretches_each_channel() {
        let image = low_contrast();
        let out = AutoLevelsFilter::new()
            .filter_image(image.clone(), None, &Progress::default())
            .unwrap();
        assert!(out.pixel(0, 0).red < image.pixel(0, 0).red);
        assert!(out.pixel(199, 0).red > image.pixel(199, 0).red);
        assert_eq!(out.pixel(50, 3).alpha, 200);
    }

    #[test]
    fn single_value_channel_does_not_fail() {
        let image = PixelBuffer::filled(4, 4, false, Color::opaque(80, 80, 80, false));
        let out = AutoLevelsFilter::new()
            .filter_image(image, None, &Progress::default())
            .unwrap();
        assert_eq!(out.dimensions().width, 4);
    }

    #[test]
    fn uses_reference_histogram() {
        let image = low_contrast();
        let reference = PixelBuffer::filled(10, 10, false, Color::opaque(0, 0, 0, false));
        let mut filter = AutoLevelsFilter::new();
        let with_reference = filter
            .filter_image(image.clone(), Some(&reference), &Progress::default())
            .unwrap();
        let plain = AutoLevelsFilter::new()
            .filter_image(image, None, &Progress::default())
            .unwrap();
        assert_ne!(with_reference, plain);
        assert_eq!(filter.filter_action().category(), crate::action::FilterCategory::Complex);
    }
}
