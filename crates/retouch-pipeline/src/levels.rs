//! Input/output levels with gamma, per channel.
//!
//! Each color channel goes through its own levels stage followed by the
//! shared value stage. Alpha only goes through its own stage.

use serde::{Deserialize, Serialize};

use crate::histogram::Histogram;
use crate::lut::{ChannelLuts, LutChannel, round_clamp};
use crate::types::{Channel, Depth};

/// Levels of one channel, in channel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelLevels {
    pub low_input: i64,
    pub high_input: i64,
    pub gamma: f64,
    pub low_output: i64,
    pub high_output: i64,
}

impl ChannelLevels {
    /// Pass-through levels for `depth`.
    #[must_use]
    pub fn identity(depth: Depth) -> Self {
        let max = i64::from(depth.max_value());
        Self {
            low_input: 0,
            high_input: max,
            gamma: 1.0,
            low_output: 0,
            high_output: max,
        }
    }

    /// Map a normalised intensity through this stage.
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    fn map(&self, intensity: f64, max: f64) -> f64 {
        let scaled = max * intensity - self.low_input as f64;
        let mut v = if self.high_input == self.low_input {
            scaled
        } else {
            scaled / (self.high_input - self.low_input) as f64
        };
        v = v.clamp(0.0, 1.0);
        if self.gamma != 0.0 {
            v = v.powf(1.0 / self.gamma);
        }
        v = if self.high_output >= self.low_output {
            v * (self.high_output - self.low_output) as f64 + self.low_output as f64
        } else {
            self.low_output as f64 - v * (self.low_output - self.high_output) as f64
        };
        v / max
    }
}

/// Levels for the value, red, green, blue and alpha channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Levels {
    depth: Depth,
    channels: [ChannelLevels; 5],
}

/// Target share of pixels clipped at each end by [`Levels::auto_channel`].
const AUTO_CLIP: f64 = 0.006;

impl Levels {
    #[must_use]
    pub fn new(depth: Depth) -> Self {
        Self {
            depth,
            channels: [ChannelLevels::identity(depth); 5],
        }
    }

    #[must_use]
    pub const fn depth(&self) -> Depth {
        self.depth
    }

    #[must_use]
    pub const fn channel(&self, channel: Channel) -> &ChannelLevels {
        &self.channels[channel.index()]
    }

    pub const fn channel_mut(&mut self, channel: Channel) -> &mut ChannelLevels {
        &mut self.channels[channel.index()]
    }

    /// Stretch `channel` so about 0.6% of its pixels clip at each end.
    ///
    /// Output levels and gamma are reset. A channel without pixels gets a
    /// zero input range.
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    pub fn auto_channel(&mut self, histogram: &Histogram, channel: Channel) {
        let max = i64::from(self.depth.max_value());
        let levels = &mut self.channels[channel.index()];
        levels.gamma = 1.0;
        levels.low_output = 0;
        levels.high_output = max;

        let count = histogram.count(channel, 0, max as usize);
        if count == 0 {
            levels.low_input = 0;
            levels.high_input = 0;
            return;
        }
        let count = count as f64;
        let closer_here = |new_count: u64, next: u64| {
            let here = new_count as f64 / count;
            let after = (new_count + next) as f64 / count;
            (here - AUTO_CLIP).abs() < (after - AUTO_CLIP).abs()
        };

        let mut new_count = 0;
        for i in 0..max {
            new_count += histogram.value(channel, i);
            if closer_here(new_count, histogram.value(channel, i + 1)) {
                levels.low_input = i + 1;
                break;
            }
        }

        new_count = 0;
        for i in (1..=max).rev() {
            new_count += histogram.value(channel, i);
            if closer_here(new_count, histogram.value(channel, i - 1)) {
                levels.high_input = i - 1;
                break;
            }
        }
        log::debug!(
            "auto levels {channel:?}: input {}..={}",
            levels.low_input,
            levels.high_input
        );
    }

    /// Normalised transfer of `value` (0..=1) for `channel`, composing the
    /// channel stage with the value stage.
    #[must_use]
    pub fn transfer(&self, channel: LutChannel, value: f64) -> f64 {
        let max = f64::from(self.depth.max_value());
        let own = &self.channels[channel as usize + 1];
        let v = own.map(value, max);
        if channel == LutChannel::Alpha {
            return v;
        }
        self.channels[Channel::Luminosity.index()].map(v, max)
    }

    /// Lookup tables for all four channels.
    #[must_use]
    pub fn luts(&self) -> ChannelLuts {
        let max = self.depth.max_value();
        let scale = f64::from(max);
        let entry = |channel: LutChannel| {
            move |v: u16| round_clamp(scale * self.transfer(channel, f64::from(v) / scale), max)
        };
        [
            LutChannel::Red,
            LutChannel::Green,
            LutChannel::Blue,
            LutChannel::Alpha,
        ]
        .into_iter()
        .fold(ChannelLuts::empty(self.depth), |luts, channel| {
            luts.with_table(channel, entry(channel))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::{Color, PixelBuffer};

    #[test]
    fn identity_levels_are_identity() {
        for depth in [Depth::Eight, Depth::Sixteen] {
            let luts = Levels::new(depth).luts();
            for channel in [LutChannel::Red, LutChannel::Blue, LutChannel::Alpha] {
                let table = luts.table(channel).unwrap();
                assert!(table.iter().enumerate().all(|(i, &v)| usize::from(v) == i));
            }
        }
    }

    #[test]
    fn input_range_stretches() {
        let mut levels = Levels::new(Depth::Eight);
        let red = levels.channel_mut(Channel::Red);
        red.low_input = 50;
        red.high_input = 150;
        let luts = levels.luts();
        assert_eq!(luts.map(LutChannel::Red, 50), 0);
        assert_eq!(luts.map(LutChannel::Red, 125), 191);
        assert_eq!(luts.map(LutChannel::Red, 150), 255);
        assert_eq!(luts.map(LutChannel::Red, 200), 255);
        assert_eq!(luts.map(LutChannel::Green, 100), 100);
    }

    #[test]
    fn value_stage_applies_to_colors_only() {
        let mut levels = Levels::new(Depth::Eight);
        levels.channel_mut(Channel::Luminosity).high_output = 127;
        let luts = levels.luts();
        assert_eq!(luts.map(LutChannel::Blue, 255), 127);
        assert_eq!(luts.map(LutChannel::Alpha, 255), 255);
    }

    #[test]
    fn inverted_output() {
        let mut levels = Levels::new(Depth::Eight);
        let green = levels.channel_mut(Channel::Green);
        green.low_output = 255;
        green.high_output = 0;
        assert_eq!(levels.luts().map(LutChannel::Green, 0), 255);
        assert_eq!(levels.luts().map(LutChannel::Green, 255), 0);
    }

    #[test]
    fn auto_channel_finds_clip_points() {
        let mut image = PixelBuffer::new(1000, 1, false, false);
        for x in 0..1000_u32 {
            let v = u16::try_from(20 + x * 200 / 1000).unwrap();
            image.set_pixel(x, 0, Color::opaque(v, 0, 0, false));
        }
        let histogram = Histogram::calculate(&image);
        let mut levels = Levels::new(Depth::Eight);
        levels.auto_channel(&histogram, Channel::Red);
        // Each bin in 20..220 holds 5 pixels (0.5%), so the first bin
        // alone is closest to 0.6%.
        let red = levels.channel(Channel::Red);
        assert_eq!(red.low_input, 21);
        assert_eq!(red.high_input, 218);
    }

    #[test]
    fn auto_channel_on_empty_histogram() {
        let histogram = Histogram::calculate(&PixelBuffer::null());
        let mut levels = Levels::new(Depth::Eight);
        levels.auto_channel(&histogram, Channel::Green);
        let green = levels.channel(Channel::Green);
        assert_eq!((green.low_input, green.high_input), (0, 0));
    }
}
