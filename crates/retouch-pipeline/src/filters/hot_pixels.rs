//! Hot pixel repair.
//!
//! Each flagged rectangle is rebuilt from the pixels around it, either as
//! the plain average of the surrounding ring or by fitting a polynomial of
//! order 1 to 3 through the neighbours.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::action::{FilterAction, FilterCategory};
use crate::buffer::{Color, PixelBuffer};
use crate::threaded::{ImageFilter, Progress, ReplayableFilter, base_action};
use crate::types::{FilterError, Point, Rect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    #[default]
    Average,
    Linear,
    Quadratic,
    Cubic,
}

impl Interpolation {
    /// Polynomial order, `None` for averaging.
    #[must_use]
    pub const fn order(self) -> Option<usize> {
        match self {
            Self::Average => None,
            Self::Linear => Some(1),
            Self::Quadratic => Some(2),
            Self::Cubic => Some(3),
        }
    }

    const fn code(self) -> i64 {
        match self {
            Self::Average => 0,
            Self::Linear => 1,
            Self::Quadratic => 2,
            Self::Cubic => 3,
        }
    }

    const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Linear,
            2 => Self::Quadratic,
            3 => Self::Cubic,
            _ => Self::Average,
        }
    }
}

/// Which neighbours a weighted repair uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The ring of pixels around the rectangle.
    #[default]
    TwoDim,
    /// Rows above and below, per column.
    Vertical,
    /// Columns left and right, per row.
    Horizontal,
}

impl Direction {
    const fn code(self) -> i64 {
        match self {
            Self::TwoDim => 0,
            Self::Vertical => 1,
            Self::Horizontal => 2,
        }
    }

    const fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Vertical,
            2 => Self::Horizontal,
            _ => Self::TwoDim,
        }
    }
}

/// Parameters of [`HotPixelFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HotPixelSettings {
    pub interpolation: Interpolation,
    pub direction: Direction,
    pub hot_pixels: Vec<Rect>,
}

impl HotPixelSettings {
    pub fn write_to_action(&self, action: &mut FilterAction) {
        action.add_parameter("interpolationMethod", self.interpolation.code());
        action.add_parameter("direction", self.direction.code());
        action.add_parameter("hotPixels", self.hot_pixels.clone());
    }

    #[must_use]
    pub fn from_action(action: &FilterAction) -> Self {
        Self {
            interpolation: Interpolation::from_code(action.parameter("interpolationMethod", 0_i64)),
            direction: Direction::from_code(action.parameter("direction", 0_i64)),
            hot_pixels: action.parameter("hotPixels", Vec::new()),
        }
    }
}

/// Least-squares interpolation weights for one rectangle shape.
///
/// `weight(i, y, x)` is the contribution of neighbour `positions()[i]`
/// (relative to the rectangle's top-left corner) to the pixel at `(x, y)`
/// inside the rectangle. In the one-dimensional case only the `y`
/// coordinate of a position is meaningful and the width is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct HotPixelWeights {
    width: usize,
    height: usize,
    positions: Vec<Point>,
    weights: Vec<f64>,
}

/// `x^(i / (order + 1)) * y^(i % (order + 1))`.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn poly_term(i: usize, x: i32, y: i32, order: usize) -> f64 {
    let x_power = (i / (order + 1)) as i32;
    let y_power = (i % (order + 1)) as i32;
    f64::from(x).powi(x_power) * f64::from(y).powi(y_power)
}

/// Invert the `size` x `size` matrix `a` in place by Gaussian elimination
/// without pivoting.
fn invert_matrix(a: &mut [f64], size: usize) {
    let mut b = a.to_vec();
    for i in 0..size {
        for j in 0..size {
            a[i * size + j] = if i == j { 1.0 } else { 0.0 };
        }
    }

    let mut eliminate = |ix: usize, iy: usize| {
        let factor = b[iy * size + ix] / b[ix * size + ix];
        for i in 0..size {
            b[iy * size + i] -= factor * b[ix * size + i];
            a[iy * size + i] -= factor * a[ix * size + i];
        }
    };
    for ix in 0..size.saturating_sub(1) {
        for iy in ix + 1..size {
            eliminate(ix, iy);
        }
    }
    for ix in (1..size).rev() {
        for iy in 0..ix {
            eliminate(ix, iy);
        }
    }

    for iy in 0..size {
        let pivot = b[iy * size + iy];
        for ix in 0..size {
            a[iy * size + ix] /= pivot;
        }
    }
}

impl HotPixelWeights {
    #[must_use]
    #[allow(
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss
    )]
    pub fn calculate(width: usize, height: usize, order: usize, two_dim: bool) -> Self {
        let (w, h, o) = (width as i32, height as i32, order as i32);
        let mut positions = Vec::new();
        if two_dim {
            for y in -o..h + o {
                for x in -o..w + o {
                    let corner = (x < 0 && y < 0 && -x - y < o + 2)
                        || (x < 0 && y >= h && -x + y - h < o + 1)
                        || (x >= w && y < 0 && x - y - w < o + 1)
                        || (x >= w && y >= h && x + y - w - h < o);
                    let side = ((x < 0 || x >= w) && (0..h).contains(&y))
                        || ((y < 0 || y >= h) && (0..w).contains(&x));
                    if corner || side {
                        positions.push(Point::new(x, y));
                    }
                }
            }
        } else {
            positions.extend((-o..0).map(|y| Point::new(0, y)));
            positions.extend((h..h + o).map(|y| Point::new(0, y)));
        }

        let coefficients = if two_dim { (order + 1) * (order + 1) } else { order + 1 };
        let count = positions.len();

        let mut terms = vec![0.0; coefficients * count];
        let mut matrix = vec![0.0; coefficients * coefficients];
        for iy in 0..coefficients {
            for (j, p) in positions.iter().enumerate() {
                let term = poly_term(iy, p.x, p.y, order);
                terms[iy * count + j] = term;
                for ix in 0..coefficients {
                    matrix[iy * coefficients + ix] += term * poly_term(ix, p.x, p.y, order);
                }
            }
        }
        invert_matrix(&mut matrix, coefficients);

        let mut solved = vec![0.0; coefficients * count];
        for iy in 0..coefficients {
            for j in 0..count {
                solved[iy * count + j] = (0..coefficients)
                    .map(|ix| matrix[iy * coefficients + ix] * terms[ix * count + j])
                    .sum();
            }
        }

        let mut weights = vec![0.0; count * height * width];
        for y in 0..height {
            for x in 0..width {
                for j in 0..count {
                    let value: f64 = (0..coefficients)
                        .map(|iy| solved[iy * count + j] * poly_term(iy, x as i32, y as i32, order))
                        .sum();
                    weights[(j * height + y) * width + x] = value * count as f64;
                }
            }
        }

        Self {
            width,
            height,
            positions,
            weights,
        }
    }

    #[must_use]
    pub fn positions(&self) -> &[Point] {
        &self.positions
    }

    #[must_use]
    pub fn weight(&self, position: usize, y: usize, x: usize) -> f64 {
        self.weights[(position * self.height + y) * self.width + x]
    }
}

/// Color at `(x, y)` if it lies inside the image.
fn pixel_at(image: &PixelBuffer, x: i32, y: i32) -> Option<Color> {
    let x = u32::try_from(x).ok()?;
    let y = u32::try_from(y).ok()?;
    (x < image.width() && y < image.height()).then(|| image.pixel(x, y))
}

/// Fill `rect` with the rounded mean of the ring around it. Alpha keeps
/// its value; a rectangle with no neighbours inside the image is left
/// alone.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn repair_average(image: &mut PixelBuffer, rect: Rect) {
    let mut neighbours = Vec::new();
    for x in rect.x..rect.right() {
        neighbours.extend(pixel_at(image, x, rect.y - 1));
        neighbours.extend(pixel_at(image, x, rect.bottom()));
    }
    for y in rect.y..rect.bottom() {
        neighbours.extend(pixel_at(image, rect.x - 1, y));
        neighbours.extend(pixel_at(image, rect.right(), y));
    }
    if neighbours.is_empty() {
        return;
    }

    let n = neighbours.len() as f64;
    let mean = |f: fn(&Color) -> u16| {
        (neighbours.iter().map(|c| f64::from(f(c))).sum::<f64>() / n).round() as u16
    };
    let (red, green, blue) = (mean(|c| c.red), mean(|c| c.green), mean(|c| c.blue));

    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            if let Some(old) = pixel_at(image, x, y) {
                let color = Color::new(red, green, blue, old.alpha, image.sixteen_bit());
                image.set_pixel(x as u32, y as u32, color);
            }
        }
    }
}

/// Rebuild `rect` one component at a time from polynomial weights.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_possible_wrap)]
fn repair_weighted(
    image: &mut PixelBuffer,
    rect: Rect,
    direction: Direction,
    weights: &HotPixelWeights,
) {
    let max = i64::from(image.max_value());
    let component = |c: &Color, i: usize| match i {
        0 => c.blue,
        1 => c.green,
        _ => c.red,
    };

    for i_comp in 0..3 {
        for y in 0..rect.height {
            for x in 0..rect.width {
                let (px, py) = (rect.x + x, rect.y + y);
                let Some(mut color) = pixel_at(image, px, py) else {
                    continue;
                };

                let mut v = 0.0;
                let mut sum_weights = 0.0;
                for (i, pos) in weights.positions().iter().enumerate() {
                    let (xx, yy, wy, wx) = match direction {
                        Direction::TwoDim => {
                            (rect.x + pos.x, rect.y + pos.y, y as usize, x as usize)
                        }
                        Direction::Vertical => (px, rect.y + pos.y, y as usize, 0),
                        Direction::Horizontal => (rect.x + pos.y, py, x as usize, 0),
                    };
                    if let Some(neighbour) = pixel_at(image, xx, yy) {
                        let weight = weights.weight(i, wy, wx);
                        v += weight * f64::from(component(&neighbour, i_comp));
                        sum_weights += weight;
                    }
                }

                let value = if v.abs() <= f64::MIN_POSITIVE {
                    0
                } else if sum_weights >= f64::MIN_POSITIVE {
                    (v / sum_weights) as i64
                } else if v >= 0.0 {
                    max
                } else {
                    0
                };
                let value = value.clamp(0, max) as u16;
                match i_comp {
                    0 => color.blue = value,
                    1 => color.green = value,
                    _ => color.red = value,
                }
                image.set_pixel(px as u32, py as u32, color);
            }
        }
    }
}

/// Hot pixel repair over a list of rectangles.
#[derive(Debug, Clone, Default)]
pub struct HotPixelFilter {
    settings: HotPixelSettings,
}

impl HotPixelFilter {
    #[must_use]
    pub const fn new(settings: HotPixelSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub const fn settings(&self) -> &HotPixelSettings {
        &self.settings
    }
}

impl ImageFilter for HotPixelFilter {
    fn identifier(&self) -> &'static str {
        Self::IDENTIFIER
    }

    fn version(&self) -> i32 {
        Self::VERSION
    }

    fn display_name(&self) -> &'static str {
        Self::DISPLAY_NAME
    }

    #[allow(clippy::cast_sign_loss)]
    fn filter_image(
        &mut self,
        mut source: PixelBuffer,
        _reference: Option<&PixelBuffer>,
        progress: &Progress,
    ) -> Result<PixelBuffer, FilterError> {
        let settings = &self.settings;
        let mut cache: HashMap<(usize, usize, usize, bool), HotPixelWeights> = HashMap::new();
        let total = settings.hot_pixels.len();
        let bounds = Rect::from_dimensions(source.dimensions());

        for (done, rect) in settings.hot_pixels.iter().enumerate() {
            if !progress.is_running() {
                break;
            }
            // Only the part inside the image is repaired.
            let rect = rect.intersected(&bounds);
            if rect.is_empty() {
                continue;
            }
            match settings.interpolation.order() {
                None => repair_average(&mut source, rect),
                Some(order) => {
                    let (w, h) = (rect.width as usize, rect.height as usize);
                    let two_dim = settings.direction == Direction::TwoDim;
                    let key = match settings.direction {
                        Direction::TwoDim => (w, h, order, true),
                        Direction::Vertical => (1, h, order, false),
                        Direction::Horizontal => (1, w, order, false),
                    };
                    let weights = cache.entry(key).or_insert_with(|| {
                        HotPixelWeights::calculate(key.0, key.1, order, two_dim)
                    });
                    repair_weighted(&mut source, rect, settings.direction, weights);
                }
            }
            progress.post_fraction(done + 1, total, 0, 100);
        }
        Ok(source)
    }

    fn filter_action(&self) -> FilterAction {
        let mut action = base_action::<Self>(FilterCategory::Reproducible);
        self.settings.write_to_action(&mut action);
        action
    }
}

impl ReplayableFilter for HotPixelFilter {
    const IDENTIFIER: &'static str = "digikam:HotPixelFilter";
    const VERSION: i32 = 1;
    const DISPLAY_NAME: &'static str = "Hot Pixels Fixer";

    fn from_action(action: &FilterAction) -> Self {
        Self::new(HotPixelSettings::from_action(action))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fix(image: &PixelBuffer, settings: HotPixelSettings) -> PixelBuffer {
        HotPixelFilter::new(settings)
            .filter_image(image.clone(), None, &Progress::default())
            .unwrap()
    }

    fn settings(
        interpolation: Interpolation,
        direction: Direction,
        rects: Vec<Rect>,
    ) -> HotPixelSettings {
        HotPixelSettings {
            interpolation,
            direction,
            hot_pixels: rects,
        }
    }

    #[test]
    fn average_restores_surrounding_color() {
        let mut image = PixelBuffer::filled(3, 3, false, Color::opaque(40, 80, 120, false));
        image.set_pixel(1, 1, Color::opaque(255, 255, 255, false));
        let out = fix(
            &image,
            settings(Interpolation::Average, Direction::TwoDim, vec![Rect::new(1, 1, 1, 1)]),
        );
        assert_eq!(out.pixel(1, 1), Color::opaque(40, 80, 120, false));
        assert_eq!(image.pixel(1, 1), Color::opaque(255, 255, 255, false));
    }

    #[test]
    fn average_rounds_and_keeps_alpha() {
        let mut image = PixelBuffer::new(3, 1, false, true);
        image.set_pixel(0, 0, Color::new(10, 0, 0, 255, false));
        image.set_pixel(1, 0, Color::new(200, 200, 200, 7, false));
        image.set_pixel(2, 0, Color::new(11, 0, 0, 255, false));
        let out = fix(
            &image,
            settings(Interpolation::Average, Direction::TwoDim, vec![Rect::new(1, 0, 1, 1)]),
        );
        assert_eq!(out.pixel(1, 0), Color::new(11, 0, 0, 7, false));
    }

    #[test]
    fn empty_list_is_a_no_op() {
        let image = PixelBuffer::filled(4, 4, false, Color::opaque(1, 2, 3, false));
        let out = fix(&image, HotPixelSettings::default());
        assert_eq!(out, image);
    }

    #[test]
    fn rect_outside_image_is_ignored() {
        let image = PixelBuffer::filled(4, 4, false, Color::opaque(1, 2, 3, false));
        let out = fix(
            &image,
            settings(Interpolation::Average, Direction::TwoDim, vec![Rect::new(10, 10, 2, 2)]),
        );
        assert_eq!(out, image);
    }

    #[test]
    fn rect_at_coordinate_limits_is_ignored() {
        let image = PixelBuffer::filled(4, 4, false, Color::opaque(1, 2, 3, false));
        for interpolation in [Interpolation::Average, Interpolation::Cubic] {
            let rects = vec![
                Rect::new(i32::MAX - 1, 0, 5, 1),
                Rect::new(0, i32::MAX, 1, i32::MAX),
                Rect::new(i32::MIN, i32::MIN, 3, 3),
            ];
            let out = fix(&image, settings(interpolation, Direction::TwoDim, rects));
            assert_eq!(out, image, "{interpolation:?}");
        }
    }

    #[test]
    fn oversized_rect_is_clipped_to_image() {
        let mut image = PixelBuffer::filled(6, 6, false, Color::opaque(90, 60, 30, false));
        for x in 0..6 {
            image.set_pixel(x, 2, Color::opaque(255, 255, 255, false));
        }
        let huge = Rect::new(-5, 2, 1_000_000_000, 1);
        for direction in [Direction::TwoDim, Direction::Vertical] {
            let out = fix(&image, settings(Interpolation::Linear, direction, vec![huge]));
            for x in 0..6 {
                let c = out.pixel(x, 2);
                assert!(c.red.abs_diff(90) <= 1, "{direction:?}: {c:?}");
                assert!(c.blue.abs_diff(30) <= 1, "{direction:?}: {c:?}");
            }
            assert_eq!(out.pixel(0, 0), image.pixel(0, 0));
        }
    }

    #[test]
    fn linear_weights_sum_to_count() {
        let weights = HotPixelWeights::calculate(1, 1, 1, true);
        assert_eq!(weights.positions().len(), 8);
        let sum: f64 = (0..8).map(|i| weights.weight(i, 0, 0)).sum();
        assert!((sum - 8.0).abs() < 1e-9, "{sum}");
    }

    #[test]
    fn one_dimensional_positions() {
        let weights = HotPixelWeights::calculate(1, 2, 2, false);
        let ys: Vec<i32> = weights.positions().iter().map(|p| p.y).collect();
        assert_eq!(ys, [-2, -1, 2, 3]);
    }

    #[test]
    fn weighted_repair_of_flat_area() {
        for (interpolation, direction) in [
            (Interpolation::Linear, Direction::TwoDim),
            (Interpolation::Quadratic, Direction::Vertical),
            (Interpolation::Cubic, Direction::Horizontal),
        ] {
            let mut image = PixelBuffer::filled(9, 9, false, Color::opaque(100, 150, 50, false));
            image.set_pixel(4, 4, Color::opaque(255, 0, 255, false));
            image.set_pixel(5, 4, Color::opaque(255, 0, 255, false));
            let out = fix(&image, settings(interpolation, direction, vec![Rect::new(4, 4, 2, 1)]));
            for x in [4, 5] {
                let c = out.pixel(x, 4);
                assert!(c.red.abs_diff(100) <= 1, "{interpolation:?} {direction:?}: {c:?}");
                assert!(c.green.abs_diff(150) <= 1, "{interpolation:?} {direction:?}: {c:?}");
                assert!(c.blue.abs_diff(50) <= 1, "{interpolation:?} {direction:?}: {c:?}");
            }
        }
    }

    #[test]
    fn linear_repair_follows_gradient() {
        let mut image = PixelBuffer::new(5, 5, false, false);
        for y in 0..5 {
            for x in 0..5 {
                let v = u16::try_from(40 + 20 * x).unwrap();
                image.set_pixel(x, y, Color::opaque(v, v, v, false));
            }
        }
        let expected = image.pixel(2, 2);
        image.set_pixel(2, 2, Color::opaque(0, 0, 0, false));
        let out = fix(
            &image,
            settings(Interpolation::Linear, Direction::Horizontal, vec![Rect::new(2, 2, 1, 1)]),
        );
        assert!(out.pixel(2, 2).red.abs_diff(expected.red) <= 1);
    }

    #[test]
    fn action_round_trip() {
        let settings = settings(
            Interpolation::Quadratic,
            Direction::Vertical,
            vec![Rect::new(3, 4, 1, 1), Rect::new(10, 2, 2, 3)],
        );
        let action = HotPixelFilter::new(settings.clone()).filter_action();
        assert_eq!(HotPixelSettings::from_action(&action), settings);
    }
}
