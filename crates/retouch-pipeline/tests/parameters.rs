//! Property tests: filter settings survive their action, actions survive
//! the portable text form, and any replayed parameter runs without panic.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use retouch_pipeline::filters::{
    BcgSettings, CurveType, CurvesSettings, Direction, HotPixelSettings, Interpolation,
    WhiteBalanceSettings,
};
use retouch_pipeline::{
    Channel, Color, FilterAction, FilterCategory, FilterRegistry, ImageHistory, ParamValue,
    PixelBuffer, Point, Progress, Rect,
};

fn action_of(settings: impl FnOnce(&mut FilterAction)) -> FilterAction {
    let mut action = FilterAction::new("test:Filter", 1);
    settings(&mut action);
    action
}

fn channel() -> impl Strategy<Value = Channel> {
    prop_oneof![
        Just(Channel::Luminosity),
        Just(Channel::Red),
        Just(Channel::Green),
        Just(Channel::Blue),
        Just(Channel::Alpha),
    ]
}

fn finite() -> impl Strategy<Value = f64> {
    -1.0e6..1.0e6
}

fn points() -> impl Strategy<Value = Vec<Point>> {
    prop::collection::vec((-1i32..=65535, -1i32..=65535).prop_map(|(x, y)| Point::new(x, y)), 0..17)
}

fn rects() -> impl Strategy<Value = Vec<Rect>> {
    prop::collection::vec(
        (-5i32..500, -5i32..500, 0i32..8, 0i32..8).prop_map(|(x, y, w, h)| Rect::new(x, y, w, h)),
        0..10,
    )
}

fn param_value() -> impl Strategy<Value = ParamValue> {
    prop_oneof![
        any::<i64>().prop_map(ParamValue::Int),
        finite().prop_map(ParamValue::Double),
        any::<bool>().prop_map(ParamValue::Bool),
        "\\PC*".prop_map(ParamValue::String),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(ParamValue::Blob),
        points().prop_map(ParamValue::Points),
        rects().prop_map(ParamValue::Rects),
    ]
}

fn category() -> impl Strategy<Value = FilterCategory> {
    prop_oneof![
        Just(FilterCategory::Reproducible),
        Just(FilterCategory::Complex),
        Just(FilterCategory::Documented),
    ]
}

fn action() -> impl Strategy<Value = FilterAction> {
    (
        "[a-z]{1,8}:[A-Za-z ]{1,16}",
        1i32..5,
        category(),
        prop::collection::btree_map("[a-zA-Z][a-zA-Z0-9 %;,]{0,12}", param_value(), 0..8),
    )
        .prop_map(|(identifier, version, category, parameters)| {
            let mut action = FilterAction::new(identifier, version).with_category(category);
            for (name, value) in parameters {
                action.add_parameter(name, value);
            }
            action
        })
}

/// Finite, huge and non-finite doubles alike.
fn any_double() -> impl Strategy<Value = f64> {
    prop_oneof![
        -4.0f64..4.0,
        prop::num::f64::ANY,
        Just(f64::NAN),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
        Just(1.0e300),
        Just(-1.0e300),
    ]
}

fn any_rect() -> impl Strategy<Value = Rect> {
    prop_oneof![
        (-3i32..9, -3i32..8, -2i32..12, -2i32..12),
        (any::<i32>(), any::<i32>(), any::<i32>(), any::<i32>()),
    ]
    .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
}

fn any_point() -> impl Strategy<Value = Point> {
    prop_oneof![
        (-1i32..=300, -1i32..=300),
        (any::<i32>(), any::<i32>()),
    ]
    .prop_map(|(x, y)| Point::new(x, y))
}

fn sample_image(sixteen_bit: bool) -> PixelBuffer {
    let mut image = PixelBuffer::new(6, 5, sixteen_bit, true);
    for y in 0..5 {
        for x in 0..6 {
            let v = u16::try_from(x * 40 + y * 10).unwrap();
            image.set_pixel(x, y, Color::new(v, 255 - v, v / 2, 255, false));
        }
    }
    image
}

const DOUBLE_KEYS: [&str; 10] = [
    "brightness",
    "contrast",
    "gamma",
    "black",
    "expositionMain",
    "expositionFine",
    "temperature",
    "green",
    "dark",
    "saturation",
];

const INT_KEYS: [&str; 4] = ["channel", "curveType", "interpolationMethod", "direction"];

proptest! {
    #[test]
    fn bcg_settings_round_trip(
        channel in channel(),
        brightness in -1.0f64..1.0,
        contrast in 0.0f64..4.0,
        gamma in 0.01f64..4.0,
    ) {
        let settings = BcgSettings { channel, brightness, contrast, gamma };
        let action = action_of(|a| settings.write_to_action(a));
        prop_assert_eq!(BcgSettings::from_action(&action), settings);
    }

    #[test]
    fn white_balance_settings_round_trip(
        black in 0.0f64..0.5,
        exposition_main in -4.0f64..4.0,
        exposition_fine in -1.0f64..1.0,
        temperature in 2000.0f64..12000.0,
        green in 0.2f64..2.5,
        dark in 0.0f64..1.0,
        gamma in 0.1f64..3.0,
        saturation in 0.0f64..2.0,
        flags in any::<(bool, bool, bool)>(),
    ) {
        let settings = WhiteBalanceSettings {
            black,
            exposition_main,
            exposition_fine,
            temperature,
            green,
            dark,
            gamma,
            saturation,
            clip_saturation: flags.0,
            over_exposure_indicator: flags.1,
            prevent_clipping: flags.2,
        };
        let action = action_of(|a| settings.write_to_action(a));
        prop_assert_eq!(WhiteBalanceSettings::from_action(&action), settings);
    }

    #[test]
    fn curves_settings_round_trip(
        free in any::<bool>(),
        sixteen_bit in any::<bool>(),
        values in prop::array::uniform5(points()),
    ) {
        let settings = CurvesSettings {
            curve_type: if free { CurveType::Free } else { CurveType::Smooth },
            sixteen_bit,
            values,
        };
        let action = action_of(|a| settings.write_to_action(a));
        prop_assert_eq!(CurvesSettings::from_action(&action), settings);
    }

    #[test]
    fn hot_pixel_settings_round_trip(
        interpolation in prop_oneof![
            Just(Interpolation::Average),
            Just(Interpolation::Linear),
            Just(Interpolation::Quadratic),
            Just(Interpolation::Cubic),
        ],
        direction in prop_oneof![
            Just(Direction::TwoDim),
            Just(Direction::Vertical),
            Just(Direction::Horizontal),
        ],
        hot_pixels in rects(),
    ) {
        let settings = HotPixelSettings { interpolation, direction, hot_pixels };
        let action = action_of(|a| settings.write_to_action(a));
        prop_assert_eq!(HotPixelSettings::from_action(&action), settings);
    }

    #[test]
    fn action_text_round_trip(action in action()) {
        let decoded = FilterAction::from_bytes(&action.to_bytes()).unwrap();
        prop_assert_eq!(decoded.display_name(), action.display_name());
        prop_assert_eq!(decoded, action);
    }

    #[test]
    fn history_text_round_trip(actions in prop::collection::vec(action(), 0..6)) {
        let history = ImageHistory::from(actions);
        let decoded = ImageHistory::from_bytes(&history.to_bytes()).unwrap();
        prop_assert_eq!(decoded, history);
    }

    #[test]
    fn registry_rebuilds_filters_from_their_actions(
        brightness in -0.5f64..0.5,
        temperature in 3000.0f64..9000.0,
    ) {
        let registry = FilterRegistry::with_builtin_filters();
        let bcg = BcgSettings { brightness, ..BcgSettings::default() };
        let wb = WhiteBalanceSettings { temperature, ..WhiteBalanceSettings::default() };
        for filter in [
            retouch_pipeline::FilterSettings::Bcg(bcg).into_filter(),
            retouch_pipeline::FilterSettings::WhiteBalance(wb).into_filter(),
        ] {
            let action = filter.filter_action();
            let rebuilt = registry.create(&action).unwrap();
            prop_assert_eq!(rebuilt.filter_action(), action);
        }
    }

    #[test]
    fn replayed_parameters_never_panic(
        doubles in prop::array::uniform10(any_double()),
        ints in prop::array::uniform4(-3i64..6),
        flags in any::<(bool, bool, bool)>(),
        sixteen_bit_curve in any::<bool>(),
        curves in prop::array::uniform5(prop::collection::vec(any_point(), 0..20)),
        hot_pixels in prop::collection::vec(any_rect(), 0..4),
        sixteen_bit in any::<bool>(),
    ) {
        let registry = FilterRegistry::with_builtin_filters();
        let identifiers: Vec<String> = registry.identifiers().map(str::to_owned).collect();
        let image = sample_image(sixteen_bit);

        for identifier in identifiers {
            let mut action = FilterAction::new(identifier, 1);
            for (key, value) in DOUBLE_KEYS.into_iter().zip(doubles) {
                action.add_parameter(key, value);
            }
            for (key, value) in INT_KEYS.into_iter().zip(ints) {
                action.add_parameter(key, value);
            }
            action.add_parameter("clipSaturation", flags.0);
            action.add_parameter("overExposureIndicator", flags.1);
            action.add_parameter("preventClipping", flags.2);
            action.add_parameter("curveBitDepth", if sixteen_bit_curve { 16_i64 } else { 8 });
            for (i, points) in curves.iter().enumerate() {
                action.add_parameter(format!("values{i}"), points.clone());
            }
            action.add_parameter("hotPixels", hot_pixels.clone());

            let mut filter = registry.create(&action).unwrap();
            let output = filter
                .filter_image(image.clone(), None, &Progress::default())
                .unwrap();
            prop_assert_eq!(output.dimensions(), image.dimensions());
            prop_assert_eq!(output.sixteen_bit(), sixteen_bit);
        }
    }
}
