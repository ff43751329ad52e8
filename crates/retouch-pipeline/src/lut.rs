//! Per-channel lookup tables.

use crate::buffer::{self, PixelBuffer};
use crate::threaded::{Progress, process_rows};
use crate::types::Depth;

/// Index of each table in [`ChannelLuts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutChannel {
    Red = 0,
    Green = 1,
    Blue = 2,
    Alpha = 3,
}

/// Lookup tables for red, green, blue and alpha at one bit depth.
///
/// A missing table leaves that channel untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLuts {
    depth: Depth,
    tables: [Option<Vec<u16>>; 4],
}

impl ChannelLuts {
    /// No tables: applying is a no-op.
    #[must_use]
    pub const fn empty(depth: Depth) -> Self {
        Self {
            depth,
            tables: [None, None, None, None],
        }
    }

    /// Build the table for `channel` from `f(value)`.
    #[must_use]
    pub fn with_table(mut self, channel: LutChannel, f: impl Fn(u16) -> u16) -> Self {
        let max = self.depth.max_value();
        self.tables[channel as usize] = Some((0..=max).map(f).collect());
        self
    }

    /// Use the same mapping for red, green and blue.
    #[must_use]
    pub fn with_color_tables(self, f: impl Fn(u16) -> u16) -> Self {
        let table: Vec<u16> = (0..=self.depth.max_value()).map(f).collect();
        let mut luts = self;
        for channel in [LutChannel::Red, LutChannel::Green, LutChannel::Blue] {
            luts.tables[channel as usize] = Some(table.clone());
        }
        luts
    }

    #[must_use]
    pub const fn depth(&self) -> Depth {
        self.depth
    }

    #[must_use]
    pub fn table(&self, channel: LutChannel) -> Option<&[u16]> {
        self.tables[channel as usize].as_deref()
    }

    /// Map one channel value; identity without a table.
    #[must_use]
    pub fn map(&self, channel: LutChannel, value: u16) -> u16 {
        self.table(channel)
            .and_then(|t| t.get(usize::from(value)).copied())
            .unwrap_or(value)
    }

    /// Map every pixel of `image` in place, posting progress in
    /// `start..=end`. The image must be at this table's depth.
    pub fn apply(&self, image: &mut PixelBuffer, progress: &Progress, start: u8, end: u8) {
        debug_assert_eq!(image.depth(), self.depth, "lookup table depth mismatch");
        let sixteen_bit = image.sixteen_bit();
        let pixel_size = image.bytes_depth();
        process_rows(image, progress, start, end, |_, row| {
            for pixel in row.chunks_exact_mut(pixel_size) {
                let mut c = buffer::read_pixel(pixel, sixteen_bit);
                c[buffer::RED] = self.map(LutChannel::Red, c[buffer::RED]);
                c[buffer::GREEN] = self.map(LutChannel::Green, c[buffer::GREEN]);
                c[buffer::BLUE] = self.map(LutChannel::Blue, c[buffer::BLUE]);
                c[buffer::ALPHA] = self.map(LutChannel::Alpha, c[buffer::ALPHA]);
                buffer::write_pixel(pixel, sixteen_bit, c);
            }
        });
    }
}

/// Round half away from zero and clamp to `0..=max`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn round_clamp(value: f64, max: u16) -> u16 {
    value.round().clamp(0.0, f64::from(max)) as u16
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::Color;

    #[test]
    fn empty_is_identity() {
        let mut image = PixelBuffer::filled(3, 3, true, Color::new(1, 2, 3, 4, false));
        let before = image.clone();
        ChannelLuts::empty(Depth::Eight).apply(&mut image, &Progress::default(), 0, 100);
        assert_eq!(image, before);
    }

    #[test]
    fn tables_map_their_channel_only() {
        let mut image = PixelBuffer::filled(2, 2, true, Color::new(10, 20, 30, 40, false));
        let luts = ChannelLuts::empty(Depth::Eight).with_table(LutChannel::Red, |v| v + 1);
        luts.apply(&mut image, &Progress::default(), 0, 100);
        assert_eq!(image.pixel(1, 1), Color::new(11, 20, 30, 40, false));
    }

    #[test]
    fn color_tables_leave_alpha() {
        let mut image = PixelBuffer::filled(2, 1, true, Color::new(10, 20, 30, 40, false));
        let luts = ChannelLuts::empty(Depth::Eight).with_color_tables(|v| 255 - v);
        luts.apply(&mut image, &Progress::default(), 0, 100);
        assert_eq!(image.pixel(0, 0), Color::new(245, 235, 225, 40, false));
    }

    #[test]
    fn round_clamp_is_half_away_from_zero() {
        assert_eq!(round_clamp(25.5, 255), 26);
        assert_eq!(round_clamp(-0.5, 255), 0);
        assert_eq!(round_clamp(300.0, 255), 255);
        assert_eq!(round_clamp(2.49, 255), 2);
    }
}
