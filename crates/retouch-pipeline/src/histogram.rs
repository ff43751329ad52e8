//! Per-channel histograms.
//!
//! Counts are accumulated row by row in parallel and summed afterwards;
//! integer addition makes the result independent of scheduling.

use rayon::prelude::*;

use crate::buffer::{self, PixelBuffer};
use crate::types::{Channel, Depth};

/// Value counts for luminosity (`max(r, g, b)`), red, green, blue and
/// alpha, with 256 or 65536 bins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    depth: Depth,
    pixel_count: u64,
    counts: [Vec<u64>; 5],
}

impl Histogram {
    /// Count every pixel of `image`. A null image gives empty counts.
    #[must_use]
    pub fn calculate(image: &PixelBuffer) -> Self {
        let depth = image.depth();
        let segments = depth.segments();
        let sixteen_bit = image.sixteen_bit();
        let stride = image.row_bytes();
        let pixel_size = image.bytes_depth();

        let flat = if stride == 0 {
            vec![0; 5 * segments]
        } else {
            image
                .data()
                .par_chunks(stride)
                .fold(
                    || vec![0_u64; 5 * segments],
                    |mut acc, row| {
                        for pixel in row.chunks_exact(pixel_size) {
                            let c = buffer::read_pixel(pixel, sixteen_bit);
                            let (blue, green, red, alpha) = (
                                usize::from(c[buffer::BLUE]),
                                usize::from(c[buffer::GREEN]),
                                usize::from(c[buffer::RED]),
                                usize::from(c[buffer::ALPHA]),
                            );
                            acc[blue.max(green).max(red)] += 1;
                            acc[segments + red] += 1;
                            acc[2 * segments + green] += 1;
                            acc[3 * segments + blue] += 1;
                            acc[4 * segments + alpha] += 1;
                        }
                        acc
                    },
                )
                .reduce(
                    || vec![0_u64; 5 * segments],
                    |mut a, b| {
                        for (x, y) in a.iter_mut().zip(b) {
                            *x += y;
                        }
                        a
                    },
                )
        };

        let mut chunks = flat.chunks_exact(segments).map(<[u64]>::to_vec);
        let counts = std::array::from_fn(|_| chunks.next().unwrap_or_default());
        Self {
            depth,
            pixel_count: image.num_pixels() as u64,
            counts,
        }
    }

    #[must_use]
    pub const fn depth(&self) -> Depth {
        self.depth
    }

    /// Number of bins per channel.
    #[must_use]
    pub const fn segments(&self) -> usize {
        self.depth.segments()
    }

    #[must_use]
    pub const fn pixel_count(&self) -> u64 {
        self.pixel_count
    }

    #[must_use]
    pub fn counts(&self, channel: Channel) -> &[u64] {
        &self.counts[channel.index()]
    }

    /// Count in `bin`; zero outside the valid range.
    #[must_use]
    pub fn value(&self, channel: Channel, bin: i64) -> u64 {
        usize::try_from(bin)
            .ok()
            .and_then(|bin| self.counts(channel).get(bin).copied())
            .unwrap_or(0)
    }

    /// Sum of the counts in `start..=end`.
    #[must_use]
    pub fn count(&self, channel: Channel, start: usize, end: usize) -> u64 {
        let counts = self.counts(channel);
        let end = end.min(counts.len().saturating_sub(1));
        if start > end {
            return 0;
        }
        counts[start..=end].iter().sum()
    }
}
