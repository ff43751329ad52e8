//! Concrete filters.
//!
//! Every filter pairs a plain serde settings struct with an
//! [`ImageFilter`] implementation, and records those settings in its
//! [`FilterAction`](crate::action::FilterAction) so it can be rebuilt on
//! replay.

pub mod auto_expo;
pub mod auto_levels;
pub mod bcg;
pub mod curves;
pub mod equalize;
pub mod hot_pixels;
pub mod normalize;
pub mod white_balance;

use serde::{Deserialize, Serialize};

pub use auto_expo::AutoExpoFilter;
pub use auto_levels::AutoLevelsFilter;
pub use bcg::{BcgFilter, BcgSettings};
pub use curves::{CurveType, Curves, CurvesFilter, CurvesSettings};
pub use equalize::EqualizeFilter;
pub use hot_pixels::{Direction, HotPixelFilter, HotPixelSettings, Interpolation};
pub use normalize::NormalizeFilter;
pub use white_balance::{WhiteBalanceFilter, WhiteBalanceSettings};

use crate::action::FilterCategory;
use crate::buffer::PixelBuffer;
use crate::threaded::ImageFilter;
use crate::types::FilterError;

/// One filter and its settings, as read from a JSON settings bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum FilterSettings {
    Bcg(BcgSettings),
    WhiteBalance(WhiteBalanceSettings),
    Curves(CurvesSettings),
    AutoExposure,
    AutoLevels,
    Equalize,
    Normalize,
    HotPixels(HotPixelSettings),
}

impl FilterSettings {
    /// Construct the filter these settings describe.
    #[must_use]
    pub fn into_filter(self) -> Box<dyn ImageFilter> {
        match self {
            Self::Bcg(s) => Box::new(BcgFilter::new(s)),
            Self::WhiteBalance(s) => Box::new(WhiteBalanceFilter::new(s)),
            Self::Curves(s) => Box::new(CurvesFilter::new(s)),
            Self::AutoExposure => Box::new(AutoExpoFilter::new()),
            Self::AutoLevels => Box::new(AutoLevelsFilter::new()),
            Self::Equalize => Box::new(EqualizeFilter::new()),
            Self::Normalize => Box::new(NormalizeFilter::new()),
            Self::HotPixels(s) => Box::new(HotPixelFilter::new(s)),
        }
    }
}

/// The image histogram based filters measure: `reference` when given,
/// otherwise `source`. The two must share a bit depth.
pub(crate) fn calibration_image<'a>(
    source: &'a PixelBuffer,
    reference: Option<&'a PixelBuffer>,
) -> Result<&'a PixelBuffer, FilterError> {
    let Some(reference) = reference else {
        return Ok(source);
    };
    if reference.is_null() {
        return Err(FilterError::NullImage);
    }
    if reference.sixteen_bit() != source.sixteen_bit() {
        return Err(FilterError::DepthMismatch {
            expected: source.bits(),
            found: reference.bits(),
        });
    }
    Ok(reference)
}

/// Pixels of a separate calibration image are not part of the history, so
/// such a run cannot be replayed from the action alone.
pub(crate) const fn reference_category(used_reference: bool) -> FilterCategory {
    if used_reference {
        FilterCategory::Complex
    } else {
        FilterCategory::Reproducible
    }
}
