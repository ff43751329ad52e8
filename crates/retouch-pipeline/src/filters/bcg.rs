//! Brightness, contrast and gamma.
//!
//! Two tables (256 and 65536 entries) start as the identity and are
//! transformed by gamma, then brightness, then contrast. The order is
//! part of the recorded behaviour: replays depend on it.

use serde::{Deserialize, Serialize};

use crate::action::{FilterAction, FilterCategory};
use crate::buffer::PixelBuffer;
use crate::lut::{ChannelLuts, LutChannel};
use crate::threaded::{ImageFilter, Progress, ReplayableFilter, base_action};
use crate::types::{Channel, Depth, FilterError};

/// Parameters of [`BcgFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BcgSettings {
    /// `Red`, `Green` or `Blue` for a single channel; anything else
    /// applies to all three color channels.
    pub channel: Channel,
    /// Additive offset as a fraction of the full range.
    pub brightness: f64,
    /// Scale around the mid-point.
    pub contrast: f64,
    /// Power curve exponent (values below 0.01 are raised to 0.01).
    pub gamma: f64,
}

impl BcgSettings {
    pub const DEFAULT_BRIGHTNESS: f64 = 0.0;
    pub const DEFAULT_CONTRAST: f64 = 1.0;
    pub const DEFAULT_GAMMA: f64 = 1.0;

    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_identity(&self) -> bool {
        self.brightness == Self::DEFAULT_BRIGHTNESS
            && self.contrast == Self::DEFAULT_CONTRAST
            && self.gamma == Self::DEFAULT_GAMMA
    }

    #[allow(clippy::cast_possible_wrap)]
    pub fn write_to_action(&self, action: &mut FilterAction) {
        action.add_parameter("channel", self.channel.index() as i64);
        action.add_parameter("brightness", self.brightness);
        action.add_parameter("contrast", self.contrast);
        action.add_parameter("gamma", self.gamma);
    }

    #[must_use]
    pub fn from_action(action: &FilterAction) -> Self {
        Self {
            channel: Channel::from_index(action.parameter("channel", 0_i64)).unwrap_or_default(),
            brightness: action.parameter("brightness", Self::DEFAULT_BRIGHTNESS),
            contrast: action.parameter("contrast", Self::DEFAULT_CONTRAST),
            gamma: action.parameter("gamma", Self::DEFAULT_GAMMA),
        }
    }
}

impl Default for BcgSettings {
    fn default() -> Self {
        Self {
            channel: Channel::Luminosity,
            brightness: Self::DEFAULT_BRIGHTNESS,
            contrast: Self::DEFAULT_CONTRAST,
            gamma: Self::DEFAULT_GAMMA,
        }
    }
}

/// Bound on intermediate table entries. Far outside any channel range, so
/// clamping to it never changes the final clamped lookup.
const TABLE_LIMIT: f64 = 1.0e15;

/// Round `value` and bound it to [`TABLE_LIMIT`]; NaN becomes 0.
#[allow(clippy::cast_possible_truncation)]
fn bounded(value: f64) -> i64 {
    value.round().clamp(-TABLE_LIMIT, TABLE_LIMIT) as i64
}

/// Unclamped transfer table for one depth.
#[allow(clippy::cast_possible_truncation)]
fn transfer_table(settings: &BcgSettings, depth: Depth) -> Vec<i64> {
    let max = f64::from(depth.max_value());
    let mid = i64::from(depth.max_value() / 2);
    let mut map: Vec<i64> = (0..=i64::from(depth.max_value())).collect();

    let gamma = settings.gamma.max(0.01);
    for v in &mut map {
        #[allow(clippy::cast_precision_loss)]
        let x = *v as f64 / max;
        *v = (x.powf(1.0 / gamma) * max).round() as i64;
    }

    let offset = bounded(settings.brightness * max);
    for v in &mut map {
        *v += offset;
    }

    for v in &mut map {
        #[allow(clippy::cast_precision_loss)]
        let scaled = bounded((*v - mid) as f64 * settings.contrast);
        *v = scaled + mid;
    }
    map
}

/// Brightness / contrast / gamma adjustment.
#[derive(Debug, Clone)]
pub struct BcgFilter {
    settings: BcgSettings,
    map8: Vec<i64>,
    map16: Vec<i64>,
}

impl BcgFilter {
    #[must_use]
    pub fn new(settings: BcgSettings) -> Self {
        Self {
            settings,
            map8: transfer_table(&settings, Depth::Eight),
            map16: transfer_table(&settings, Depth::Sixteen),
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &BcgSettings {
        &self.settings
    }

    /// Clamped lookup tables for `depth`, restricted to the selected
    /// channel. Alpha is never mapped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn luts(&self, depth: Depth) -> ChannelLuts {
        let map = if depth.is_sixteen_bit() { &self.map16 } else { &self.map8 };
        let max = i64::from(depth.max_value());
        let lookup = |v: u16| map[usize::from(v)].clamp(0, max) as u16;
        let luts = ChannelLuts::empty(depth);
        match self.settings.channel {
            Channel::Red => luts.with_table(LutChannel::Red, lookup),
            Channel::Green => luts.with_table(LutChannel::Green, lookup),
            Channel::Blue => luts.with_table(LutChannel::Blue, lookup),
            Channel::Luminosity | Channel::Alpha => luts.with_color_tables(lookup),
        }
    }
}

impl ImageFilter for BcgFilter {
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
        self.luts(source.depth()).apply(&mut source, progress, 0, 100);
        Ok(source)
    }

    fn filter_action(&self) -> FilterAction {
        let mut action = base_action::<Self>(FilterCategory::Reproducible);
        self.settings.write_to_action(&mut action);
        action
    }
}

impl ReplayableFilter for BcgFilter {
    const IDENTIFIER: &'static str = "digikam:BCGFilter";
    const VERSION: i32 = 1;
    const DISPLAY_NAME: &'static str = "Brightness / Contrast / Gamma Filter";

    fn from_action(action: &FilterAction) -> Self {
        Self::new(BcgSettings::from_action(action))
    }
}
