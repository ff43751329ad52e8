//! Tone curves for the value, red, green, blue and alpha channels.
//!
//! A smooth curve is defined by up to [`NUM_POINTS`] control points joined
//! by Catmull-Rom segments; a free curve stores one value per bin. The
//! curves are evaluated into four lookup tables (red, green, blue, alpha)
//! where each color channel's own curve is followed by the value curve.

use serde::{Deserialize, Serialize};

use crate::action::{FilterAction, FilterCategory};
use crate::buffer::{self, PixelBuffer};
use crate::lut::{ChannelLuts, LutChannel};
use crate::threaded::{ImageFilter, Progress, ReplayableFilter, base_action};
use crate::types::{Channel, Depth, FilterError, Point};

/// Control points per smooth curve.
pub const NUM_POINTS: usize = 17;

/// Marker for an unused control point.
pub const DISABLED_POINT: Point = Point::new(-1, -1);

const NUM_CHANNELS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveType {
    #[default]
    Smooth,
    Free,
}

impl CurveType {
    const fn code(self) -> i64 {
        match self {
            Self::Smooth => 0,
            Self::Free => 1,
        }
    }

    const fn from_code(code: i64) -> Self {
        if code == 1 { Self::Free } else { Self::Smooth }
    }
}

type Matrix = [[f64; 4]; 4];

const CR_BASIS: Matrix = [
    [-0.5, 1.5, -1.5, 0.5],
    [1.0, -2.5, 2.0, -0.5],
    [-0.5, 0.0, 0.5, 0.0],
    [0.0, 1.0, 0.0, 0.0],
];

fn compose(a: &Matrix, b: &Matrix) -> Matrix {
    std::array::from_fn(|i| std::array::from_fn(|j| (0..4).map(|k| a[i][k] * b[k][j]).sum()))
}

/// Curves for all five channels at one depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curves {
    depth: Depth,
    types: [CurveType; NUM_CHANNELS],
    points: [[Point; NUM_POINTS]; NUM_CHANNELS],
    values: [Vec<u16>; NUM_CHANNELS],
}

impl Curves {
    /// Linear curves for every channel.
    #[must_use]
    pub fn new(depth: Depth) -> Self {
        let mut curves = Self {
            depth,
            types: [CurveType::Smooth; NUM_CHANNELS],
            points: [[DISABLED_POINT; NUM_POINTS]; NUM_CHANNELS],
            values: std::array::from_fn(|_| Vec::new()),
        };
        for channel in Channel::ALL {
            curves.reset_channel(channel);
        }
        curves
    }

    /// Curves described by `settings`, at the settings' depth.
    #[must_use]
    pub fn from_settings(settings: &CurvesSettings) -> Self {
        let mut curves = Self::new(Depth::from_sixteen_bit(settings.sixteen_bit));
        for channel in Channel::ALL {
            let values = &settings.values[channel.index()];
            curves.set_curve_type(channel, settings.curve_type);
            match settings.curve_type {
                CurveType::Free => curves.set_values(channel, values),
                CurveType::Smooth => curves.set_points(channel, values),
            }
        }
        curves.calculate_all();
        curves
    }

    /// Convert `other` to `depth`, scaling control points and free values.
    #[must_use]
    pub fn converted(other: &Self, depth: Depth) -> Self {
        if other.depth == depth {
            return other.clone();
        }
        let up = depth.is_sixteen_bit();
        let scale = |v: i32| {
            let v = u16::try_from(v).unwrap_or(0);
            i32::from(if up { buffer::upscale(v) } else { buffer::downscale(v) })
        };

        let mut curves = Self::new(depth);
        for channel in Channel::ALL {
            let c = channel.index();
            curves.types[c] = other.types[c];
            match other.types[c] {
                CurveType::Smooth => {
                    for (i, p) in other.points[c].iter().enumerate() {
                        if p.x > -1 && p.y > -1 {
                            curves.set_point(channel, i, Point::new(scale(p.x), scale(p.y)));
                        }
                    }
                }
                CurveType::Free => {
                    curves.values[c] = if up {
                        upsample_free(&other.values[c])
                    } else {
                        other.values[c]
                            .iter()
                            .step_by(257)
                            .map(|&v| buffer::downscale(v))
                            .collect()
                    };
                }
            }
        }
        curves.calculate_all();
        curves
    }

    #[must_use]
    pub const fn depth(&self) -> Depth {
        self.depth
    }

    fn segment_max(&self) -> i32 {
        i32::from(self.depth.max_value())
    }

    /// Linear values and the two end points.
    pub fn reset_channel(&mut self, channel: Channel) {
        let c = channel.index();
        let max = self.depth.max_value();
        self.values[c] = (0..=max).collect();
        self.points[c] = [DISABLED_POINT; NUM_POINTS];
        self.points[c][0] = Point::new(0, 0);
        self.points[c][NUM_POINTS - 1] = Point::new(i32::from(max), i32::from(max));
    }

    #[must_use]
    pub const fn curve_type(&self, channel: Channel) -> CurveType {
        self.types[channel.index()]
    }

    pub const fn set_curve_type(&mut self, channel: Channel, curve_type: CurveType) {
        self.types[channel.index()] = curve_type;
    }

    #[must_use]
    pub fn point(&self, channel: Channel, index: usize) -> Point {
        self.points[channel.index()]
            .get(index)
            .copied()
            .unwrap_or(DISABLED_POINT)
    }

    /// Set one control point. `x == -1` disables the point whatever its
    /// `y`; other out of range points are ignored.
    pub fn set_point(&mut self, channel: Channel, index: usize, point: Point) {
        let max = self.segment_max();
        let Some(slot) = self.points[channel.index()].get_mut(index) else {
            return;
        };
        if point.x == -1 {
            *slot = DISABLED_POINT;
        } else if (0..=max).contains(&point.x) && (0..=max).contains(&point.y) {
            *slot = point;
        }
    }

    #[must_use]
    pub fn points(&self, channel: Channel) -> Vec<Point> {
        self.points[channel.index()].to_vec()
    }

    /// Replace the control points of `channel`.
    ///
    /// An empty list resets the channel. A full list is copied as is. A
    /// single point becomes the middle point; otherwise the list fills the
    /// leading points and its last entry becomes the last point.
    pub fn set_points(&mut self, channel: Channel, points: &[Point]) {
        match points {
            [] => self.reset_channel(channel),
            _ if points.len() >= NUM_POINTS => {
                for (i, &p) in points.iter().take(NUM_POINTS).enumerate() {
                    self.set_point(channel, i, p);
                }
            }
            [single] => {
                self.reset_channel(channel);
                self.set_point(channel, NUM_POINTS / 2, *single);
            }
            [leading @ .., last] => {
                self.reset_channel(channel);
                for (i, &p) in leading.iter().enumerate() {
                    self.set_point(channel, i, p);
                }
                self.set_point(channel, NUM_POINTS - 1, *last);
            }
        }
    }

    #[must_use]
    pub fn value(&self, channel: Channel, bin: usize) -> u16 {
        self.values[channel.index()].get(bin).copied().unwrap_or(0)
    }

    pub fn set_value(&mut self, channel: Channel, bin: usize, value: i32) {
        let max = self.segment_max();
        if let Some(slot) = self.values[channel.index()].get_mut(bin) {
            *slot = u16::try_from(value.clamp(0, max)).unwrap_or(0);
        }
    }

    /// Curve values as `(bin, value)` points.
    #[must_use]
    pub fn values(&self, channel: Channel) -> Vec<Point> {
        self.values[channel.index()]
            .iter()
            .zip(0..)
            .map(|(&v, bin)| Point::new(bin, i32::from(v)))
            .collect()
    }

    /// Replace the free values of `channel` from `(bin, value)` points.
    ///
    /// A list for the other depth is resampled through a smooth curve over
    /// 17 evenly spaced samples.
    pub fn set_values(&mut self, channel: Channel, values: &[Point]) {
        let segments = self.depth.segments();
        if values.is_empty() {
            self.reset_channel(channel);
        } else if values.len() == segments {
            for (bin, p) in values.iter().enumerate() {
                self.set_value(channel, bin, p.y);
            }
        } else {
            let source_depth = if values.len() == Depth::Eight.segments() {
                Depth::Eight
            } else {
                Depth::Sixteen
            };
            let source_max = usize::from(source_depth.max_value());
            let mut sampled = Self::new(source_depth);
            for i in 0..NUM_POINTS {
                let index = i * source_max / (NUM_POINTS - 1);
                let y = values.get(index).map_or(0, |p| p.y);
                let x = i32::try_from(index).unwrap_or(0);
                sampled.set_point(channel, i, Point::new(x, y));
            }
            sampled.calculate_curve(channel);
            let resampled = Self::converted(&sampled, self.depth);
            self.values[channel.index()] = resampled.values[channel.index()].clone();
        }
    }

    /// `true` when `channel` maps every value to itself.
    #[must_use]
    pub fn is_linear_channel(&self, channel: Channel) -> bool {
        let c = channel.index();
        let max = self.segment_max();
        match self.types[c] {
            CurveType::Free => self.values[c]
                .iter()
                .take(usize::from(self.depth.max_value()))
                .zip(0..)
                .all(|(&v, j)| i32::from(v) == j),
            CurveType::Smooth => {
                let (mut has_first, mut has_last) = (false, false);
                for p in &self.points[c] {
                    if p.x > -1 && p.y > -1 {
                        if !has_first && !has_last && p.x == 0 && p.y == 0 {
                            has_first = true;
                        } else if has_first && !has_last && p.x == max && p.y == max {
                            has_last = true;
                        } else {
                            return false;
                        }
                    }
                }
                true
            }
        }
    }

    #[must_use]
    pub fn is_linear(&self) -> bool {
        Channel::ALL.into_iter().all(|c| self.is_linear_channel(c))
    }

    /// Settings that rebuild these curves.
    #[must_use]
    pub fn settings(&self) -> CurvesSettings {
        let curve_type = if self.types.contains(&CurveType::Free) {
            CurveType::Free
        } else {
            CurveType::Smooth
        };
        let mut settings = CurvesSettings {
            curve_type,
            sixteen_bit: self.depth.is_sixteen_bit(),
            values: std::array::from_fn(|_| Vec::new()),
        };
        if self.is_linear() {
            return settings;
        }
        for channel in Channel::ALL {
            settings.values[channel.index()] = match curve_type {
                CurveType::Free => self.values(channel),
                CurveType::Smooth => self.points(channel),
            };
        }
        settings
    }

    pub fn calculate_all(&mut self) {
        for channel in Channel::ALL {
            self.calculate_curve(channel);
        }
    }

    /// Rebuild the values of a smooth curve from its control points.
    #[allow(clippy::cast_sign_loss)]
    pub fn calculate_curve(&mut self, channel: Channel) {
        let c = channel.index();
        if self.types[c] == CurveType::Free {
            return;
        }
        let enabled: Vec<usize> = (0..NUM_POINTS).filter(|&i| self.points[c][i].x != -1).collect();
        let (Some(&first), Some(&last)) = (enabled.first(), enabled.last()) else {
            return;
        };

        let first = self.points[c][first];
        let last = self.points[c][last];
        for v in &mut self.values[c][..first.x as usize] {
            *v = first.y as u16;
        }
        for v in &mut self.values[c][last.x as usize..] {
            *v = last.y as u16;
        }

        let n = enabled.len();
        for i in 0..n.saturating_sub(1) {
            let p1 = if i == 0 { enabled[i] } else { enabled[i - 1] };
            let p2 = enabled[i];
            let p3 = enabled[i + 1];
            let p4 = if i == n - 2 { enabled[n - 1] } else { enabled[i + 2] };
            self.plot_segment(c, [p1, p2, p3, p4]);
        }

        for &i in &enabled {
            let p = self.points[c][i];
            self.values[c][p.x as usize] = p.y as u16;
        }
    }

    /// Draw one Catmull-Rom segment by forward differencing.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn plot_segment(&mut self, c: usize, indices: [usize; 4]) {
        let max = self.segment_max();
        let max_f = f64::from(max);
        let loopdiv = max * 3;

        let mut geometry: Matrix = [[0.0; 4]; 4];
        for (row, &index) in geometry.iter_mut().zip(&indices) {
            let p = self.points[c][index];
            row[0] = f64::from(p.x);
            row[1] = f64::from(p.y);
        }

        let d1 = 1.0 / f64::from(loopdiv);
        let d2 = d1 * d1;
        let d3 = d1 * d1 * d1;
        let steps: Matrix = [
            [0.0, 0.0, 0.0, 1.0],
            [d3, d2, d1, 0.0],
            [6.0 * d3, 2.0 * d2, 0.0, 0.0],
            [6.0 * d3, 0.0, 0.0, 0.0],
        ];
        let deltas = compose(&steps, &compose(&CR_BASIS, &geometry));

        let [mut x, mut dx, mut dx2, dx3] = [0, 1, 2, 3].map(|row| deltas[row][0]);
        let [mut y, mut dy, mut dy2, dy3] = [0, 1, 2, 3].map(|row| deltas[row][1]);

        let curve = &mut self.values[c];
        let mut last_x = x.clamp(0.0, max_f) as i32;
        let mut last_y = y.clamp(0.0, max_f) as i32;
        curve[last_x as usize] = last_y as u16;

        for _ in 0..loopdiv {
            x += dx;
            dx += dx2;
            dx2 += dx3;

            y += dy;
            dy += dy2;
            dy2 += dy3;

            let new_x = (x.round() as i32).clamp(0, max);
            let new_y = (y.round() as i32).clamp(0, max);
            if last_x != new_x || last_y != new_y {
                curve[new_x as usize] = new_y as u16;
            }
            last_x = new_x;
            last_y = new_y;
        }
    }

    /// Normalised transfer of `value` for LUT `channel`: the channel's own
    /// curve, then the value curve (except for alpha).
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn transfer(&self, channel: LutChannel, value: f32) -> f32 {
        let max = self.segment_max();
        let max_f = max as f32;
        let channel = channel as i32;
        let mut inten = f64::from(value);

        let mut j = channel + 1;
        while j >= 0 {
            if j == 0 && channel == LutChannel::Alpha as i32 {
                return inten as f32;
            }
            let curve = &self.values[j as usize];
            inten = if inten < 0.0 {
                f64::from(f32::from(curve[0]) / max_f)
            } else if inten >= 1.0 {
                f64::from(f32::from(curve[max as usize]) / max_f)
            } else {
                let index = (inten * f64::from(max_f)).floor() as usize;
                let f = (inten * f64::from(max_f) - index as f64) as f32;
                let f = f64::from(f);
                let (low, high) = (f64::from(curve[index]), f64::from(curve[index + 1]));
                ((1.0 - f) * low + f * high) / f64::from(max_f)
            };
            j -= channel + 1;
        }
        inten as f32
    }

    /// Lookup tables for red, green, blue and alpha.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn luts(&self) -> ChannelLuts {
        let max = self.depth.max_value();
        let max_f = f64::from(max);
        [
            LutChannel::Red,
            LutChannel::Green,
            LutChannel::Blue,
            LutChannel::Alpha,
        ]
        .into_iter()
        .fold(ChannelLuts::empty(self.depth), |luts, channel| {
            luts.with_table(channel, |v| {
                let transferred = self.transfer(channel, f32::from(v) / f32::from(max));
                let value = max_f * f64::from(transferred) + 0.5;
                value.clamp(0.0, max_f) as u16
            })
        })
    }
}

/// Stretch a 256 entry free curve over 65536 bins, interpolating between
/// neighbouring entries.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn upsample_free(values: &[u16]) -> Vec<u16> {
    let last = values.len().saturating_sub(1);
    (0..=u16::MAX)
        .map(|i| {
            let j = usize::from(i / 257);
            let f = f64::from(i % 257) / 257.0;
            let a = f64::from(values.get(j).copied().unwrap_or(0));
            let b = f64::from(values.get((j + 1).min(last)).copied().unwrap_or(0));
            (((1.0 - f) * a + f * b) * 257.0).round().clamp(0.0, 65535.0) as u16
        })
        .collect()
}

/// Parameters of [`CurvesFilter`].
///
/// Each channel holds either control points (smooth) or `(bin, value)`
/// points (free). An empty list is a linear curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurvesSettings {
    pub curve_type: CurveType,
    pub sixteen_bit: bool,
    /// Value, red, green, blue and alpha.
    pub values: [Vec<Point>; 5],
}

impl Default for CurvesSettings {
    fn default() -> Self {
        Self {
            curve_type: CurveType::Smooth,
            sixteen_bit: false,
            values: std::array::from_fn(|_| Vec::new()),
        }
    }
}

impl CurvesSettings {
    /// Settings with a smooth curve from `points` on one channel.
    #[must_use]
    pub fn smooth(sixteen_bit: bool, channel: Channel, points: Vec<Point>) -> Self {
        let mut settings = Self {
            sixteen_bit,
            ..Self::default()
        };
        settings.values[channel.index()] = points;
        settings
    }

    #[must_use]
    pub fn is_linear(&self) -> bool {
        self.values.iter().all(Vec::is_empty)
    }

    pub fn write_to_action(&self, action: &mut FilterAction) {
        action.add_parameter("curveBitDepth", if self.sixteen_bit { 16_i64 } else { 8 });
        action.add_parameter("curveType", self.curve_type.code());
        for (i, values) in self.values.iter().enumerate() {
            if !values.is_empty() {
                action.add_parameter(format!("values{i}"), values.clone());
            }
        }
    }

    #[must_use]
    pub fn from_action(action: &FilterAction) -> Self {
        Self {
            curve_type: CurveType::from_code(action.parameter("curveType", 0_i64)),
            sixteen_bit: action.parameter("curveBitDepth", 8_i64) == 16,
            values: std::array::from_fn(|i| action.parameter(&format!("values{i}"), Vec::new())),
        }
    }
}

/// Tone curve adjustment.
#[derive(Debug, Clone, Default)]
pub struct CurvesFilter {
    settings: CurvesSettings,
}

impl CurvesFilter {
    #[must_use]
    pub const fn new(settings: CurvesSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub const fn settings(&self) -> &CurvesSettings {
        &self.settings
    }
}

impl ImageFilter for CurvesFilter {
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
        let curves = Curves::from_settings(&self.settings);
        let curves = Curves::converted(&curves, source.depth());
        progress.post(5);
        curves.luts().apply(&mut source, progress, 5, 100);
        Ok(source)
    }

    fn filter_action(&self) -> FilterAction {
        let mut action = base_action::<Self>(FilterCategory::Reproducible);
        self.settings.write_to_action(&mut action);
        action
    }
}

impl ReplayableFilter for CurvesFilter {
    const IDENTIFIER: &'static str = "digikam:CurvesFilter";
    const VERSION: i32 = 1;
    const DISPLAY_NAME: &'static str = "Adjust Curves";

    fn from_action(action: &FilterAction) -> Self {
        Self::new(CurvesSettings::from_action(action))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::Color;

    fn identity(table: &[u16]) -> bool {
        table.iter().enumerate().all(|(i, &v)| usize::from(v) == i)
    }

    #[test]
    fn new_curves_are_linear() {
        for depth in [Depth::Eight, Depth::Sixteen] {
            let curves = Curves::new(depth);
            assert!(curves.is_linear());
            let luts = curves.luts();
            for channel in [LutChannel::Red, LutChannel::Alpha] {
                assert!(identity(luts.table(channel).unwrap()));
            }
        }
    }

    #[test]
    fn control_points_are_exact() {
        let settings = CurvesSettings::smooth(
            false,
            Channel::Red,
            vec![Point::new(0, 0), Point::new(64, 100), Point::new(255, 255)],
        );
        let curves = Curves::from_settings(&settings);
        assert_eq!(curves.value(Channel::Red, 64), 100);
        assert_eq!(curves.value(Channel::Red, 0), 0);
        assert_eq!(curves.value(Channel::Red, 255), 255);
        assert_eq!(curves.point(Channel::Red, 1), Point::new(64, 100));
        assert!(!curves.is_linear_channel(Channel::Red));
        assert!(curves.is_linear_channel(Channel::Green));
    }

    #[test]
    fn smooth_curve_is_monotonic_for_monotonic_points() {
        let settings = CurvesSettings::smooth(
            false,
            Channel::Luminosity,
            vec![Point::new(0, 0), Point::new(128, 180), Point::new(255, 255)],
        );
        let curves = Curves::from_settings(&settings);
        let values = curves.values(Channel::Luminosity);
        assert!(values.windows(2).all(|w| w[0].y <= w[1].y));
        assert!(values[100].y > 100);
    }

    #[test]
    fn boundary_fills_outside_end_points() {
        let settings = CurvesSettings::smooth(
            false,
            Channel::Blue,
            vec![Point::new(20, 40), Point::new(200, 220)],
        );
        let curves = Curves::from_settings(&settings);
        assert_eq!(curves.value(Channel::Blue, 5), 40);
        assert_eq!(curves.value(Channel::Blue, 250), 220);
    }

    #[test]
    fn single_point_goes_to_middle() {
        let mut curves = Curves::new(Depth::Eight);
        curves.set_points(Channel::Green, &[Point::new(128, 150)]);
        assert_eq!(curves.point(Channel::Green, NUM_POINTS / 2), Point::new(128, 150));
        assert_eq!(curves.point(Channel::Green, 0), Point::new(0, 0));
        assert_eq!(curves.point(Channel::Green, NUM_POINTS - 1), Point::new(255, 255));
    }

    #[test]
    fn out_of_range_points_are_ignored() {
        let mut curves = Curves::new(Depth::Eight);
        curves.set_point(Channel::Red, 3, Point::new(300, 10));
        curves.set_point(Channel::Red, 4, Point::new(10, -1));
        assert_eq!(curves.point(Channel::Red, 3), DISABLED_POINT);
        assert_eq!(curves.point(Channel::Red, 4), DISABLED_POINT);
    }

    #[test]
    fn disabled_point_clears_slot() {
        let mut curves = Curves::new(Depth::Eight);
        curves.set_point(Channel::Luminosity, 5, Point::new(100, 50));
        assert_eq!(curves.point(Channel::Luminosity, 5), Point::new(100, 50));
        curves.set_point(Channel::Luminosity, 5, DISABLED_POINT);
        assert_eq!(curves.point(Channel::Luminosity, 5), DISABLED_POINT);
        curves.set_point(Channel::Luminosity, 5, Point::new(100, 50));
        curves.set_point(Channel::Luminosity, 5, Point::new(-1, 77));
        assert_eq!(curves.point(Channel::Luminosity, 5), DISABLED_POINT);
    }

    #[test]
    fn full_list_with_disabled_ends_extends_flat() {
        let mut points = [DISABLED_POINT; NUM_POINTS];
        points[8] = Point::new(128, 200);
        let mut curves = Curves::new(Depth::Eight);
        curves.set_points(Channel::Red, &points);
        assert_eq!(curves.point(Channel::Red, 0), DISABLED_POINT);
        assert_eq!(curves.point(Channel::Red, NUM_POINTS - 1), DISABLED_POINT);
        curves.calculate_curve(Channel::Red);
        for bin in [0, 64, 128, 200, 255] {
            assert_eq!(curves.value(Channel::Red, bin), 200, "bin {bin}");
        }
    }

    #[test]
    fn value_curve_applies_after_channel_curve() {
        let mut settings = CurvesSettings::default();
        // Invert red, then invert everything: red ends up unchanged.
        settings.values[Channel::Red.index()] = vec![Point::new(0, 255), Point::new(255, 0)];
        settings.values[Channel::Luminosity.index()] = vec![Point::new(0, 255), Point::new(255, 0)];
        let luts = Curves::from_settings(&settings).luts();
        assert_eq!(luts.map(LutChannel::Red, 40), 40);
        assert_eq!(luts.map(LutChannel::Green, 40), 215);
        assert_eq!(luts.map(LutChannel::Alpha, 40), 40);
    }

    #[test]
    fn free_values_round_trip() {
        let mut curves = Curves::new(Depth::Eight);
        curves.set_curve_type(Channel::Red, CurveType::Free);
        let values: Vec<Point> = (0..256).map(|i| Point::new(i, 255 - i)).collect();
        curves.set_values(Channel::Red, &values);
        assert_eq!(curves.values(Channel::Red), values);
        assert_eq!(curves.luts().map(LutChannel::Red, 10), 245);
    }

    #[test]
    fn free_values_are_resampled_to_other_depth() {
        let mut curves = Curves::new(Depth::Sixteen);
        curves.set_curve_type(Channel::Red, CurveType::Free);
        let values: Vec<Point> = (0..256).map(|i| Point::new(i, i)).collect();
        curves.set_values(Channel::Red, &values);
        assert_eq!(curves.value(Channel::Red, 0), 0);
        assert_eq!(curves.value(Channel::Red, 65535), 65535);
        assert_eq!(curves.value(Channel::Red, 257 * 16 * 4), 257 * 16 * 4);
    }

    #[test]
    fn conversion_scales_points() {
        let settings = CurvesSettings::smooth(
            false,
            Channel::Red,
            vec![Point::new(0, 0), Point::new(64, 100), Point::new(255, 255)],
        );
        let eight = Curves::from_settings(&settings);
        let sixteen = Curves::converted(&eight, Depth::Sixteen);
        assert_eq!(sixteen.point(Channel::Red, 1), Point::new(64 * 257, 100 * 257));
        assert_eq!(sixteen.value(Channel::Red, 64 * 257), 100 * 257);
        let back = Curves::converted(&sixteen, Depth::Eight);
        assert_eq!(back.point(Channel::Red, 1), Point::new(64, 100));
    }

    #[test]
    fn filter_converts_curve_depth_to_image() {
        let settings = CurvesSettings::smooth(
            false,
            Channel::Red,
            vec![Point::new(0, 0), Point::new(64, 100), Point::new(255, 255)],
        );
        let image = PixelBuffer::filled(3, 2, false, Color::opaque(64 * 257, 7, 9, true));
        let out = CurvesFilter::new(settings)
            .filter_image(image, None, &Progress::default())
            .unwrap();
        assert_eq!(out.pixel(1, 1), Color::opaque(100 * 257, 7, 9, true));
    }

    #[test]
    fn settings_round_trip_through_curves() {
        let settings = CurvesSettings::smooth(
            true,
            Channel::Blue,
            vec![Point::new(0, 0), Point::new(30000, 20000), Point::new(65535, 65535)],
        );
        let curves = Curves::from_settings(&settings);
        let rebuilt = Curves::from_settings(&curves.settings());
        assert_eq!(rebuilt, curves);
    }

    #[test]
    fn linear_curves_give_empty_settings() {
        assert!(Curves::new(Depth::Eight).settings().is_linear());
    }

    #[test]
    fn action_round_trip() {
        let mut settings = CurvesSettings::smooth(
            true,
            Channel::Green,
            vec![Point::new(0, 0), Point::new(1000, 3000), Point::new(65535, 65535)],
        );
        settings.values[Channel::Alpha.index()] = vec![Point::new(0, 65535), Point::new(65535, 0)];
        let action = CurvesFilter::new(settings.clone()).filter_action();
        assert!(!action.has_parameter("values0"));
        assert_eq!(CurvesSettings::from_action(&action), settings);
    }
}
