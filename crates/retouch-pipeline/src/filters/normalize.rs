//! Contrast stretch of the joint red/green/blue range to the full range.

use crate::action::FilterAction;
use crate::buffer::PixelBuffer;
use crate::filters::{calibration_image, reference_category};
use crate::histogram::Histogram;
use crate::lut::ChannelLuts;
use crate::threaded::{ImageFilter, Progress, ReplayableFilter, base_action};
use crate::types::{Channel, FilterError};

/// Lowest and highest red, green or blue value present.
#[must_use]
pub fn color_range(histogram: &Histogram) -> Option<(u16, u16)> {
    let populated = |channel| {
        let counts = histogram.counts(channel);
        let first = counts.iter().position(|&c| c > 0)?;
        let last = counts.iter().rposition(|&c| c > 0)?;
        Some((first, last))
    };
    let (min, max) = [Channel::Red, Channel::Green, Channel::Blue]
        .into_iter()
        .filter_map(populated)
        .reduce(|(a, b), (c, d)| (a.min(c), b.max(d)))?;
    Some((u16::try_from(min).ok()?, u16::try_from(max).ok()?))
}

/// Normalization table shared by red, green and blue.
///
/// Values inside `min..=max` are stretched linearly; values outside (only
/// possible with a separate calibration image) clip to the range ends.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn normalize_luts(histogram: &Histogram) -> ChannelLuts {
    let depth = histogram.depth();
    let Some((min, max)) = color_range(histogram) else {
        return ChannelLuts::empty(depth);
    };
    let top = depth.max_value();
    let range = u32::from(max - min);
    log::debug!("normalize: {min}..={max}");
    ChannelLuts::empty(depth).with_color_tables(|v| {
        if v < min {
            0
        } else if v > max {
            top
        } else if range == 0 {
            v
        } else {
            (u32::from(top) * u32::from(v - min) / range) as u16
        }
    })
}

/// Linear stretch to the full range.
#[derive(Debug, Clone, Default)]
pub struct NormalizeFilter {
    used_reference: bool,
}

impl NormalizeFilter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            used_reference: false,
        }
    }
}

impl ImageFilter for NormalizeFilter {
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
        normalize_luts(&histogram).apply(&mut source, progress, 10, 100);
        Ok(source)
    }

    fn filter_action(&self) -> FilterAction {
        base_action::<Self>(reference_category(self.used_reference))
    }
}

impl ReplayableFilter for NormalizeFilter {
    const IDENTIFIER: &'static str = "digikam:NormalizeFilter";
    const VERSION: i32 = 1;
    const DISPLAY_NAME: &'static str = "Auto Normalize";

    fn from_action(_action: &FilterAction) -> Self {
        Self::new()
    }
}
