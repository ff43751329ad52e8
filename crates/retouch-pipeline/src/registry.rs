//! Lookup from action identifier to filter constructor.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use crate::action::FilterAction;
use crate::filters::{
    AutoExpoFilter, AutoLevelsFilter, BcgFilter, CurvesFilter, EqualizeFilter, HotPixelFilter,
    NormalizeFilter, WhiteBalanceFilter,
};
use crate::threaded::{ImageFilter, ReplayableFilter};

type Constructor = fn(&FilterAction) -> Box<dyn ImageFilter>;

#[derive(Debug, Clone)]
struct Entry {
    versions: RangeInclusive<i32>,
    display_name: &'static str,
    construct: Constructor,
}

fn construct<F: ReplayableFilter>(action: &FilterAction) -> Box<dyn ImageFilter> {
    Box::new(F::from_action(action))
}

/// Filters that can be rebuilt from a [`FilterAction`].
///
/// Built once and passed by reference to whatever replays histories.
#[derive(Debug, Clone, Default)]
pub struct FilterRegistry {
    entries: BTreeMap<String, Entry>,
}

impl FilterRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every filter of this crate.
    #[must_use]
    pub fn with_builtin_filters() -> Self {
        let mut registry = Self::new();
        registry.register::<BcgFilter>();
        registry.register::<WhiteBalanceFilter>();
        registry.register::<CurvesFilter>();
        registry.register::<AutoExpoFilter>();
        registry.register::<AutoLevelsFilter>();
        registry.register::<EqualizeFilter>();
        registry.register::<NormalizeFilter>();
        registry.register::<HotPixelFilter>();
        registry
    }

    /// Register `F` for versions `1..=F::VERSION`, replacing any previous
    /// entry with the same identifier.
    pub fn register<F: ReplayableFilter>(&mut self) {
        self.register_versions::<F>(1..=F::VERSION);
    }

    pub fn register_versions<F: ReplayableFilter>(&mut self, versions: RangeInclusive<i32>) {
        log::trace!("registering {} versions {versions:?}", F::IDENTIFIER);
        self.entries.insert(
            F::IDENTIFIER.to_owned(),
            Entry {
                versions,
                display_name: F::DISPLAY_NAME,
                construct: construct::<F>,
            },
        );
    }

    fn entry(&self, identifier: &str, version: i32) -> Option<&Entry> {
        self.entries
            .get(identifier)
            .filter(|entry| entry.versions.contains(&version))
    }

    /// `true` when `identifier` at `version` can be constructed.
    #[must_use]
    pub fn is_supported(&self, identifier: &str, version: i32) -> bool {
        self.entry(identifier, version).is_some()
    }

    /// Rebuild the filter described by `action`.
    #[must_use]
    pub fn create(&self, action: &FilterAction) -> Option<Box<dyn ImageFilter>> {
        self.entry(action.identifier(), action.version())
            .map(|entry| (entry.construct)(action))
    }

    #[must_use]
    pub fn display_name(&self, identifier: &str) -> Option<&'static str> {
        self.entries.get(identifier).map(|entry| entry.display_name)
    }

    /// Registered identifiers in sorted order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::filters::{BcgSettings, CurvesSettings};
    use crate::types::{Channel, Point};

    #[test]
    fn builtin_filters_are_registered() {
        let registry = FilterRegistry::with_builtin_filters();
        assert_eq!(registry.len(), 8);
        for identifier in [
            "digikam:BCGFilter",
            "digikam:WhiteBalanceFilter",
            "digikam:CurvesFilter",
            "digikam:AutoExpoFilter",
            "digikam:AutoLevelsfilter",
            "digikam:EqualizeFilter",
            "digikam:NormalizeFilter",
            "digikam:HotPixelFilter",
        ] {
            assert!(registry.is_supported(identifier, 1), "{identifier}");
        }
    }

    #[test]
    fn unknown_identifier_or_version() {
        let registry = FilterRegistry::with_builtin_filters();
        assert!(!registry.is_supported("digikam:RedEyeCorrectionFilter", 1));
        assert!(!registry.is_supported("digikam:BCGFilter", 2));
        assert!(!registry.is_supported("digikam:BCGFilter", 0));
        assert!(registry.create(&FilterAction::new("digikam:Unknown", 1)).is_none());
    }

    #[test]
    fn create_reads_parameters() {
        let registry = FilterRegistry::with_builtin_filters();
        let settings = CurvesSettings::smooth(
            false,
            Channel::Green,
            vec![Point::new(0, 30), Point::new(255, 200)],
        );
        let original = CurvesFilter::new(settings);
        let rebuilt = registry.create(&original.filter_action()).unwrap();
        assert_eq!(rebuilt.filter_action(), original.filter_action());
    }

    #[test]
    fn create_tolerates_missing_parameters() {
        let registry = FilterRegistry::with_builtin_filters();
        let filter = registry.create(&FilterAction::new("digikam:BCGFilter", 1)).unwrap();
        let expected = BcgFilter::new(BcgSettings::default()).filter_action();
        assert_eq!(filter.filter_action(), expected);
    }

    #[test]
    fn identifiers_are_sorted() {
        let registry = FilterRegistry::with_builtin_filters();
        let ids: Vec<&str> = registry.identifiers().collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert_eq!(registry.display_name("digikam:EqualizeFilter"), Some("Auto Equalize"));
    }

    #[test]
    fn empty_registry() {
        let registry = FilterRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.is_supported("digikam:BCGFilter", 1));
    }
}
