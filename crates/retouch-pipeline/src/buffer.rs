//! Bit-depth agnostic pixel storage.
//!
//! A [`PixelBuffer`] holds `width * height` pixels in B, G, R, A order,
//! one byte per channel for 8-bit images and two little-endian bytes per
//! channel for 16-bit images. Images without alpha still reserve the
//! alpha slot so every pixel has the same stride.
//!
//! Storage is reference counted. Cloning a buffer is cheap and shares
//! the bytes; every mutating method goes through
//! [`PixelBuffer::detach_for_write`], which deep-copies shared storage
//! first, so one handle can never observe writes made through another.

use std::hash::Hasher;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

use crate::types::{Depth, Dimensions, FilterError, Flip, Point, Rect, Rotation};

/// Byte offset of each channel inside an 8-bit pixel (doubled for 16-bit).
pub const BLUE: usize = 0;
pub const GREEN: usize = 1;
pub const RED: usize = 2;
pub const ALPHA: usize = 3;

/// Scale an 8-bit channel value to 16 bits.
#[must_use]
pub const fn upscale(value: u16) -> u16 {
    value * 257
}

/// Scale a 16-bit channel value to 8 bits, rounding to nearest.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn downscale(value: u16) -> u16 {
    ((value as u32 + 128) / 257) as u16
}

/// A single pixel value, tagged with the depth its channels are in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub alpha: u16,
    pub sixteen_bit: bool,
}

impl Color {
    #[must_use]
    pub const fn new(red: u16, green: u16, blue: u16, alpha: u16, sixteen_bit: bool) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
            sixteen_bit,
        }
    }

    /// Fully opaque color.
    #[must_use]
    pub const fn opaque(red: u16, green: u16, blue: u16, sixteen_bit: bool) -> Self {
        let alpha = Depth::from_sixteen_bit(sixteen_bit).max_value();
        Self::new(red, green, blue, alpha, sixteen_bit)
    }

    /// Channels in memory order (B, G, R, A).
    #[must_use]
    pub const fn to_channels(self) -> [u16; 4] {
        [self.blue, self.green, self.red, self.alpha]
    }

    #[must_use]
    pub const fn from_channels(channels: [u16; 4], sixteen_bit: bool) -> Self {
        Self::new(
            channels[RED],
            channels[GREEN],
            channels[BLUE],
            channels[ALPHA],
            sixteen_bit,
        )
    }

    /// Same color expressed at another depth.
    #[must_use]
    pub fn to_depth(self, sixteen_bit: bool) -> Self {
        if self.sixteen_bit == sixteen_bit {
            return self;
        }
        let scale = if sixteen_bit { upscale } else { downscale };
        Self::from_channels(self.to_channels().map(scale), sixteen_bit)
    }
}

/// Read the four channels of the pixel starting at `bytes[0]`.
#[must_use]
pub fn read_pixel(bytes: &[u8], sixteen_bit: bool) -> [u16; 4] {
    if sixteen_bit {
        std::array::from_fn(|c| u16::from_le_bytes([bytes[2 * c], bytes[2 * c + 1]]))
    } else {
        std::array::from_fn(|c| u16::from(bytes[c]))
    }
}

/// Write four channels into the pixel starting at `bytes[0]`.
#[allow(clippy::cast_possible_truncation)]
pub fn write_pixel(bytes: &mut [u8], sixteen_bit: bool, channels: [u16; 4]) {
    if sixteen_bit {
        for (c, value) in channels.into_iter().enumerate() {
            bytes[2 * c..2 * c + 2].copy_from_slice(&value.to_le_bytes());
        }
    } else {
        for (c, value) in channels.into_iter().enumerate() {
            bytes[c] = value as u8;
        }
    }
}

/// Source-over compositing of one BGRA pixel onto another.
#[allow(clippy::cast_possible_truncation)]
fn blend_over(over: [u16; 4], under: [u16; 4], max: u16) -> [u16; 4] {
    let max = u64::from(max);
    let alpha = u64::from(over[ALPHA]);
    let rest = max - alpha.min(max);
    let mix = |a: u16, b: u16| {
        ((u64::from(a) * alpha + u64::from(b) * rest + max / 2) / max) as u16
    };
    let mut out = [0; 4];
    for channel in [BLUE, GREEN, RED] {
        out[channel] = mix(over[channel], under[channel]);
    }
    out[ALPHA] = (alpha + (u64::from(under[ALPHA]) * rest + max / 2) / max).min(max) as u16;
    out
}

/// A blit region after clipping, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    sx: usize,
    sy: usize,
    dx: usize,
    dy: usize,
    width: usize,
    height: usize,
}

/// Clip `src_rect` placed at `dst` against both the source and destination
/// sizes. Negative origins shift the other side forward.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clip_region(
    src_rect: Rect,
    dst: Point,
    source: Dimensions,
    target: Dimensions,
) -> Option<Region> {
    let (mut sx, mut sy) = (i64::from(src_rect.x), i64::from(src_rect.y));
    let (mut w, mut h) = (i64::from(src_rect.width), i64::from(src_rect.height));
    let (mut dx, mut dy) = (i64::from(dst.x), i64::from(dst.y));
    if sx < 0 {
        dx -= sx;
        w += sx;
        sx = 0;
    }
    if sy < 0 {
        dy -= sy;
        h += sy;
        sy = 0;
    }
    if dx < 0 {
        sx -= dx;
        w += dx;
        dx = 0;
    }
    if dy < 0 {
        sy -= dy;
        h += dy;
        dy = 0;
    }
    let w = w
        .min(i64::from(source.width) - sx)
        .min(i64::from(target.width) - dx);
    let h = h
        .min(i64::from(source.height) - sy)
        .min(i64::from(target.height) - dy);
    (w > 0 && h > 0).then(|| Region {
        sx: sx as usize,
        sy: sy as usize,
        dx: dx as usize,
        dy: dy as usize,
        width: w as usize,
        height: h as usize,
    })
}

/// An image: geometry, depth flags and shared pixel storage.
///
/// The default value is the null buffer.
#[derive(Debug, Clone, Default)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    sixteen_bit: bool,
    has_alpha: bool,
    data: Option<Arc<Vec<u8>>>,
}

fn byte_len(width: u32, height: u32, sixteen_bit: bool) -> Option<usize> {
    let depth = if sixteen_bit { 8 } else { 4 };
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(depth)
}

impl PixelBuffer {
    /// The null buffer: zero sized, no storage.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            width: 0,
            height: 0,
            sixteen_bit: false,
            has_alpha: false,
            data: None,
        }
    }

    /// Allocate a zero-filled buffer.
    ///
    /// Returns the null buffer for a zero-sized geometry or when the
    /// allocation cannot be satisfied.
    #[must_use]
    pub fn new(width: u32, height: u32, sixteen_bit: bool, has_alpha: bool) -> Self {
        let Some(len) = byte_len(width, height, sixteen_bit).filter(|&len| len > 0) else {
            return Self::null();
        };
        let mut data = Vec::new();
        if data.try_reserve_exact(len).is_err() {
            log::warn!("cannot allocate {len} bytes for a {width}x{height} image");
            return Self::null();
        }
        data.resize(len, 0);
        Self {
            width,
            height,
            sixteen_bit,
            has_alpha,
            data: Some(Arc::new(data)),
        }
    }

    /// Wrap caller supplied bytes without copying.
    ///
    /// Returns the null buffer when `data` does not hold exactly
    /// `width * height * bytes_depth` bytes.
    #[must_use]
    pub fn from_vec(
        width: u32,
        height: u32,
        sixteen_bit: bool,
        has_alpha: bool,
        data: Vec<u8>,
    ) -> Self {
        match byte_len(width, height, sixteen_bit) {
            Some(len) if len > 0 && len == data.len() => Self {
                width,
                height,
                sixteen_bit,
                has_alpha,
                data: Some(Arc::new(data)),
            },
            _ => {
                log::warn!(
                    "{} bytes do not describe a {width}x{height} image (sixteen_bit: {sixteen_bit})",
                    data.len()
                );
                Self::null()
            }
        }
    }

    /// Deep-copy caller supplied bytes. See [`from_vec`](Self::from_vec).
    #[must_use]
    pub fn from_slice(
        width: u32,
        height: u32,
        sixteen_bit: bool,
        has_alpha: bool,
        data: &[u8],
    ) -> Self {
        Self::from_vec(width, height, sixteen_bit, has_alpha, data.to_vec())
    }

    /// A buffer of the given geometry filled with one color.
    #[must_use]
    pub fn filled(width: u32, height: u32, has_alpha: bool, color: Color) -> Self {
        let mut buffer = Self::new(width, height, color.sixteen_bit, has_alpha);
        buffer.fill(color);
        buffer
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    #[must_use]
    pub const fn sixteen_bit(&self) -> bool {
        self.sixteen_bit
    }

    #[must_use]
    pub const fn depth(&self) -> Depth {
        Depth::from_sixteen_bit(self.sixteen_bit)
    }

    #[must_use]
    pub const fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.data.is_none()
    }

    /// Bits per channel: 8 or 16.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.depth().bits()
    }

    /// Bytes per pixel: 4 or 8.
    #[must_use]
    pub const fn bytes_depth(&self) -> usize {
        if self.sixteen_bit { 8 } else { 4 }
    }

    /// Bytes per row.
    #[must_use]
    pub const fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_depth()
    }

    #[must_use]
    pub const fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Largest channel value at this depth.
    #[must_use]
    pub const fn max_value(&self) -> u16 {
        self.depth().max_value()
    }

    /// The raw bytes; empty for the null buffer.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(data) => data.as_slice(),
            None => &[],
        }
    }

    /// Whether another handle shares this buffer's storage.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.data
            .as_ref()
            .is_some_and(|data| Arc::strong_count(data) > 1)
    }

    /// Same width, height and depth.
    #[must_use]
    pub fn has_same_geometry(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.sixteen_bit == other.sixteen_bit
    }

    /// Take exclusive ownership of the storage and return it for writing.
    ///
    /// Copies the bytes if another handle still shares them.
    pub fn detach_for_write(&mut self) -> &mut [u8] {
        match &mut self.data {
            Some(data) => Arc::make_mut(data).as_mut_slice(),
            None => &mut [],
        }
    }

    /// Bytes of row `y`.
    #[must_use]
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.row_bytes();
        let start = y as usize * stride;
        &self.data()[start..start + stride]
    }

    const fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.bytes_depth()
    }

    /// Color at `(x, y)`. Coordinates must be inside the image.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        debug_assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of range");
        let offset = self.offset(x, y);
        Color::from_channels(read_pixel(&self.data()[offset..], self.sixteen_bit), self.sixteen_bit)
    }

    /// Set the color at `(x, y)`, converting it to this buffer's depth.
    /// Coordinates must be inside the image.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Color) {
        debug_assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of range");
        let offset = self.offset(x, y);
        let sixteen_bit = self.sixteen_bit;
        let channels = color.to_depth(sixteen_bit).to_channels();
        write_pixel(&mut self.detach_for_write()[offset..], sixteen_bit, channels);
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: Color) {
        let sixteen_bit = self.sixteen_bit;
        let depth = self.bytes_depth();
        let channels = color.to_depth(sixteen_bit).to_channels();
        for pixel in self.detach_for_write().chunks_exact_mut(depth) {
            write_pixel(pixel, sixteen_bit, channels);
        }
    }

    /// Deep copy of the whole image, or of `rect` clamped to the image.
    ///
    /// A rectangle that does not overlap the image yields the null buffer.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn copy(&self, rect: Option<Rect>) -> Self {
        if self.is_null() {
            return Self::null();
        }
        let bounds = Rect::from_dimensions(self.dimensions());
        let area = rect.map_or(bounds, |r| r.intersected(&bounds));
        if area.is_empty() {
            return Self::null();
        }
        if area == bounds {
            return Self {
                data: Some(Arc::new(self.data().to_vec())),
                ..self.clone()
            };
        }

        let mut copy = Self::new(
            area.width as u32,
            area.height as u32,
            self.sixteen_bit,
            self.has_alpha,
        );
        if copy.is_null() {
            return copy;
        }
        let depth = self.bytes_depth();
        let len = copy.row_bytes();
        let src_stride = self.row_bytes();
        let src = self.data();
        for (row, dst) in copy.detach_for_write().chunks_exact_mut(len).enumerate() {
            let start = (area.y as usize + row) * src_stride + area.x as usize * depth;
            dst.copy_from_slice(&src[start..start + len]);
        }
        copy
    }

    /// Replace this image with the part inside `rect`.
    pub fn crop(&mut self, rect: Rect) {
        *self = self.copy(Some(rect));
    }

    /// Copy `src_rect` of `src` to `dst` in this image.
    ///
    /// Regions are clipped against both images; a fully clipped region is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::DepthMismatch`] if the two images differ in
    /// bit depth and [`FilterError::NullImage`] if either is null.
    pub fn bit_blit(&mut self, src: &Self, src_rect: Rect, dst: Point) -> Result<(), FilterError> {
        self.check_blit_source(src)?;
        let Some(region) = clip_region(src_rect, dst, src.dimensions(), self.dimensions()) else {
            return Ok(());
        };

        let depth = self.bytes_depth();
        let len = region.width * depth;
        let src_stride = src.row_bytes();
        let dst_stride = self.row_bytes();
        let src_data = src.data();
        let dst_data = self.detach_for_write();
        for row in 0..region.height {
            let from = (region.sy + row) * src_stride + region.sx * depth;
            let to = (region.dy + row) * dst_stride + region.dx * depth;
            dst_data[to..to + len].copy_from_slice(&src_data[from..from + len]);
        }
        Ok(())
    }

    /// Composite `src_rect` of `src` over this image at `dst`, using the
    /// source alpha. Clipping follows [`bit_blit`](Self::bit_blit).
    ///
    /// # Errors
    ///
    /// Same as [`bit_blit`](Self::bit_blit).
    pub fn bit_blend(&mut self, src: &Self, src_rect: Rect, dst: Point) -> Result<(), FilterError> {
        self.check_blit_source(src)?;
        let Some(region) = clip_region(src_rect, dst, src.dimensions(), self.dimensions()) else {
            return Ok(());
        };

        let depth = self.bytes_depth();
        let sixteen_bit = self.sixteen_bit;
        let max = self.max_value();
        let src_stride = src.row_bytes();
        let dst_stride = self.row_bytes();
        let src_data = src.data();
        let dst_data = self.detach_for_write();
        for row in 0..region.height {
            for col in 0..region.width {
                let from = (region.sy + row) * src_stride + (region.sx + col) * depth;
                let to = (region.dy + row) * dst_stride + (region.dx + col) * depth;
                let over = read_pixel(&src_data[from..], sixteen_bit);
                let under = read_pixel(&dst_data[to..], sixteen_bit);
                write_pixel(&mut dst_data[to..], sixteen_bit, blend_over(over, under, max));
            }
        }
        Ok(())
    }

    fn check_blit_source(&self, src: &Self) -> Result<(), FilterError> {
        if self.is_null() || src.is_null() {
            return Err(FilterError::NullImage);
        }
        if self.sixteen_bit != src.sixteen_bit {
            return Err(FilterError::DepthMismatch {
                expected: self.bits(),
                found: src.bits(),
            });
        }
        Ok(())
    }

    /// Rotate clockwise. Quarter turns swap width and height.
    pub fn rotate(&mut self, rotation: Rotation) {
        if self.is_null() {
            return;
        }
        let (w, h) = (self.width as usize, self.height as usize);
        let depth = self.bytes_depth();
        let new_width = match rotation {
            Rotation::Rot180 => w,
            Rotation::Rot90 | Rotation::Rot270 => h,
        };
        let src = self.data();
        let mut data = vec![0; src.len()];
        for (index, pixel) in src.chunks_exact(depth).enumerate() {
            let (x, y) = (index % w, index / w);
            let (nx, ny) = match rotation {
                Rotation::Rot90 => (h - 1 - y, x),
                Rotation::Rot180 => (w - 1 - x, h - 1 - y),
                Rotation::Rot270 => (y, w - 1 - x),
            };
            let to = (ny * new_width + nx) * depth;
            data[to..to + depth].copy_from_slice(pixel);
        }
        if rotation != Rotation::Rot180 {
            std::mem::swap(&mut self.width, &mut self.height);
        }
        self.data = Some(Arc::new(data));
    }

    /// Mirror the image across `flip`.
    pub fn flip(&mut self, flip: Flip) {
        if self.is_null() {
            return;
        }
        let depth = self.bytes_depth();
        let stride = self.row_bytes();
        let data = self.detach_for_write();
        match flip {
            Flip::Horizontal => {
                for row in data.chunks_exact_mut(stride) {
                    // Reversing the bytes mirrors the row but also each pixel.
                    row.reverse();
                    for pixel in row.chunks_exact_mut(depth) {
                        pixel.reverse();
                    }
                }
            }
            Flip::Vertical => {
                let rows = data.len() / stride;
                for y in 0..rows / 2 {
                    let (top, bottom) = data.split_at_mut((rows - 1 - y) * stride);
                    top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
                }
            }
        }
    }

    /// Bring an image stored with Exif `orientation` (1 to 8) upright.
    ///
    /// Returns whether the pixels changed; normal, unspecified and unknown
    /// orientations leave the image alone.
    pub fn rotate_and_flip(&mut self, orientation: u16) -> bool {
        if self.is_null() {
            return false;
        }
        match orientation {
            2 => self.flip(Flip::Horizontal),
            3 => self.rotate(Rotation::Rot180),
            4 => self.flip(Flip::Vertical),
            5 => {
                self.rotate(Rotation::Rot90);
                self.flip(Flip::Horizontal);
            }
            6 => self.rotate(Rotation::Rot90),
            7 => {
                self.rotate(Rotation::Rot90);
                self.flip(Flip::Vertical);
            }
            8 => self.rotate(Rotation::Rot270),
            _ => return false,
        }
        true
    }

    /// Composite the image onto opaque white and drop the alpha channel.
    pub fn remove_alpha_channel(&mut self) {
        self.remove_alpha_channel_onto(Color::opaque(255, 255, 255, false));
    }

    /// Composite the image onto `background` and drop the alpha channel.
    ///
    /// Images without alpha are left as they are.
    pub fn remove_alpha_channel_onto(&mut self, background: Color) {
        if self.is_null() || !self.has_alpha {
            return;
        }
        let sixteen_bit = self.sixteen_bit;
        let max = self.max_value();
        let depth = self.bytes_depth();
        let mut under = background.to_depth(sixteen_bit).to_channels();
        under[ALPHA] = max;
        for pixel in self.detach_for_write().chunks_exact_mut(depth) {
            let over = read_pixel(pixel, sixteen_bit);
            write_pixel(pixel, sixteen_bit, blend_over(over, under, max));
        }
        self.has_alpha = false;
    }

    /// Bilinear sample at a fractional position, clamped to the image.
    ///
    /// Neighbours past the far edges count as transparent black.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sub_pixel_color(&self, x: f64, y: f64) -> Color {
        if self.is_null() {
            return Color::default();
        }
        let clamp = |v: f64, size: u32| {
            if v.is_nan() { 0.0 } else { v.clamp(0.0, f64::from(size - 1)) }
        };
        let (x, y) = (clamp(x, self.width), clamp(y, self.height));
        let (x0, y0) = (x as u32, y as u32);
        let (fx, fy) = (x - f64::from(x0), y - f64::from(y0));

        let mut sum = [0.0_f64; 4];
        let taps = [
            (x0, y0, (1.0 - fx) * (1.0 - fy)),
            (x0 + 1, y0, fx * (1.0 - fy)),
            (x0, y0 + 1, (1.0 - fx) * fy),
            (x0 + 1, y0 + 1, fx * fy),
        ];
        for (px, py, weight) in taps {
            if px < self.width && py < self.height {
                let channels = self.pixel(px, py).to_channels();
                for (total, value) in sum.iter_mut().zip(channels) {
                    *total += weight * f64::from(value);
                }
            }
        }
        let max = f64::from(self.max_value());
        Color::from_channels(sum.map(|v| v.round().clamp(0.0, max) as u16), self.sixteen_bit)
    }

    /// Rescale every channel to `depth` (×257 up, rounded ÷257 down).
    #[allow(clippy::cast_possible_truncation)]
    pub fn convert_depth(&mut self, depth: Depth) {
        if self.is_null() || self.depth() == depth {
            return;
        }
        let data = if depth.is_sixteen_bit() {
            self.data()
                .iter()
                .flat_map(|&v| upscale(u16::from(v)).to_le_bytes())
                .collect()
        } else {
            self.data()
                .chunks_exact(2)
                .map(|pair| downscale(u16::from_le_bytes([pair[0], pair[1]])) as u8)
                .collect()
        };
        self.sixteen_bit = depth.is_sixteen_bit();
        self.data = Some(Arc::new(data));
    }

    /// A resampled copy at `width` x `height` (triangle filter).
    ///
    /// Returns the null buffer for a null source or zero target size.
    #[must_use]
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if self.is_null() || width == 0 || height == 0 {
            return Self::null();
        }
        let data = if self.sixteen_bit {
            let samples: Vec<u16> = self
                .data()
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            let Some(img) = ImageBuffer::<Rgba<u16>, _>::from_raw(self.width, self.height, samples)
            else {
                return Self::null();
            };
            imageops::resize(&img, width, height, FilterType::Triangle)
                .into_raw()
                .into_iter()
                .flat_map(u16::to_le_bytes)
                .collect()
        } else {
            let Some(img) =
                ImageBuffer::<Rgba<u8>, _>::from_raw(self.width, self.height, self.data().to_vec())
            else {
                return Self::null();
            };
            imageops::resize(&img, width, height, FilterType::Triangle).into_raw()
        };
        Self::from_vec(width, height, self.sixteen_bit, self.has_alpha, data)
    }

    /// SipHash-1-3 fingerprint of geometry, depth and pixels.
    ///
    /// Two buffers with equal hashes are treated as the same image when
    /// checking replayed histories.
    #[must_use]
    pub fn content_hash(&self) -> u64 {
        let mut hasher = SipHasher13::new();
        hasher.write_u32(self.width);
        hasher.write_u32(self.height);
        hasher.write_u8(u8::from(self.sixteen_bit));
        hasher.write_u8(u8::from(self.has_alpha));
        hasher.write(self.data());
        hasher.finish()
    }

    /// First pixel, in row-major order, whose channels differ from
    /// `other`'s. Images of different geometry differ at `(0, 0)`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn first_difference(&self, other: &Self) -> Option<Point> {
        if !self.has_same_geometry(other) || self.is_null() != other.is_null() {
            return Some(Point::new(0, 0));
        }
        let depth = self.bytes_depth();
        let index = self
            .data()
            .chunks_exact(depth)
            .zip(other.data().chunks_exact(depth))
            .position(|(a, b)| a != b)?;
        let width = self.width as usize;
        Some(Point::new((index % width) as i32, (index / width) as i32))
    }
}

impl PartialEq for PixelBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.has_same_geometry(other)
            && self.has_alpha == other.has_alpha
            && self.data() == other.data()
    }
}

impl Eq for PixelBuffer {}
