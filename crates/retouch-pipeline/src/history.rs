//! Image history and its replay.
//!
//! An [`ImageHistory`] is the ordered list of [`FilterAction`]s that turned
//! an original image into the current one. [`HistoryReplay`] rebuilds each
//! filter through a [`FilterRegistry`] and runs the chain again on the
//! original pixels:
//!
//! ```rust
//! # use retouch_pipeline::{FilterRegistry, HistoryReplay, ImageHistory, PixelBuffer};
//! # fn run(original: &PixelBuffer, history: &ImageHistory) {
//! let registry = FilterRegistry::with_builtin_filters();
//! let outcome = HistoryReplay::new(&registry).replay(original, history);
//! for issue in &outcome.issues {
//!     eprintln!("step {}: {}", issue.index, issue.reason);
//! }
//! # }
//! ```
//!
//! Actions the registry does not know are skipped and reported; they
//! never abort the replay. Replays run synchronously and cannot be
//! cancelled.

use serde::{Deserialize, Serialize};

use crate::action::{FilterAction, FilterCategory, parse_actions};
use crate::buffer::PixelBuffer;
use crate::diagnostics::{Clock, ReplayDiagnostics, StepDiagnostics, StepMetrics, StepStatus};
use crate::registry::FilterRegistry;
use crate::threaded::Progress;
use crate::types::{ActionDecodeError, FilterError, Point};

/// The ordered actions applied to an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHistory {
    actions: Vec<FilterAction>,
}

impl ImageHistory {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, action: FilterAction) {
        self.actions.push(action);
    }

    #[must_use]
    pub fn actions(&self) -> &[FilterAction] {
        &self.actions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilterAction> {
        self.actions.iter()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// `true` when every action maps to a registered filter and was
    /// recorded as [`FilterCategory::Reproducible`].
    #[must_use]
    pub fn is_reproducible(&self, registry: &FilterRegistry) -> bool {
        self.actions.iter().all(|action| {
            action.category() == FilterCategory::Reproducible
                && registry.is_supported(action.identifier(), action.version())
        })
    }

    /// Portable text form: the action blocks back to back.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        for action in &self.actions {
            action.write_text(&mut out);
        }
        out.into_bytes()
    }

    /// Decode the portable text form. Empty input is an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`ActionDecodeError`] for invalid UTF-8 or a malformed
    /// record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ActionDecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ActionDecodeError::InvalidUtf8)?;
        Ok(Self {
            actions: parse_actions(text)?,
        })
    }
}

impl From<Vec<FilterAction>> for ImageHistory {
    fn from(actions: Vec<FilterAction>) -> Self {
        Self { actions }
    }
}

impl FromIterator<FilterAction> for ImageHistory {
    fn from_iter<I: IntoIterator<Item = FilterAction>>(iter: I) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

impl Extend<FilterAction> for ImageHistory {
    fn extend<I: IntoIterator<Item = FilterAction>>(&mut self, iter: I) {
        self.actions.extend(iter);
    }
}

impl<'a> IntoIterator for &'a ImageHistory {
    type Item = &'a FilterAction;
    type IntoIter = std::slice::Iter<'a, FilterAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

/// Why a replayed action may not match what was recorded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum SkipReason {
    /// No registered filter for the identifier and version. Skipped.
    #[error("no registered filter for this identifier and version")]
    UnknownAction,

    /// The action was recorded as `Complex` (applied, result may differ)
    /// or `Documented` (skipped).
    #[error("action was recorded as {0:?} and cannot be replayed exactly")]
    NotReproducible(FilterCategory),

    /// The filter failed; the image is left as it was before the step.
    #[error("filter failed: {0}")]
    Failed(FilterError),
}

/// One action of a replay that did not reproduce exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayIssue {
    /// Position of the action in the history.
    pub index: usize,
    pub identifier: String,
    pub version: i32,
    pub reason: SkipReason,
}

/// Result of replaying a whole history.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub image: PixelBuffer,
    /// Number of actions whose filter ran.
    pub applied: usize,
    pub issues: Vec<ReplayIssue>,
}

impl ReplayOutcome {
    /// `true` when every action was applied and reproducible.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.issues.is_empty()
    }

    /// Identifiers of the actions that could not be processed.
    pub fn failed_identifiers(&self) -> impl Iterator<Item = &str> {
        self.issues
            .iter()
            .filter(|issue| {
                !matches!(issue.reason, SkipReason::NotReproducible(FilterCategory::Complex))
            })
            .map(|issue| issue.identifier.as_str())
    }
}

/// A replay did not reproduce the expected image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "replayed image differs from the expected image at ({}, {}) with {} replay issue(s)",
    first_difference.x,
    first_difference.y,
    issues.len()
)]
pub struct ReplayMismatch {
    /// First differing pixel in row-major order; `(0, 0)` when the
    /// geometry differs.
    pub first_difference: Point,
    pub issues: Vec<ReplayIssue>,
}

/// What happened in one replay step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayStep {
    pub index: usize,
    pub identifier: String,
    pub version: i32,
    pub status: StepStatus,
    pub issue: Option<SkipReason>,
}

/// Replays histories using the filters of one registry.
#[derive(Debug, Clone, Copy)]
pub struct HistoryReplay<'r> {
    registry: &'r FilterRegistry,
}

impl<'r> HistoryReplay<'r> {
    #[must_use]
    pub const fn new(registry: &'r FilterRegistry) -> Self {
        Self { registry }
    }

    /// Drive the replay one action at a time.
    pub fn steps<'h>(
        &self,
        original: &PixelBuffer,
        history: &'h ImageHistory,
    ) -> ReplaySteps<'r, 'h> {
        ReplaySteps {
            registry: self.registry,
            actions: history.actions.iter().enumerate(),
            image: original.clone(),
            applied: 0,
            issues: Vec::new(),
        }
    }

    /// Apply every action of `history` to `original`, in order.
    ///
    /// `original` is shared, never written.
    #[must_use]
    pub fn replay(&self, original: &PixelBuffer, history: &ImageHistory) -> ReplayOutcome {
        self.steps(original, history).finish()
    }

    /// Like [`replay`](Self::replay), timing each step with `clock`.
    pub fn replay_with_diagnostics<C: Clock>(
        &self,
        original: &PixelBuffer,
        history: &ImageHistory,
        clock: &C,
    ) -> (ReplayOutcome, ReplayDiagnostics) {
        let start = clock.now();
        let mut steps = self.steps(original, history);
        let mut step_diagnostics = Vec::with_capacity(history.len());
        loop {
            let before = steps.image().clone();
            let step_start = clock.now();
            let Some(step) = steps.next() else {
                break;
            };
            let duration = clock.elapsed(&step_start);
            step_diagnostics.push(StepDiagnostics {
                identifier: step.identifier,
                version: step.version,
                status: step.status,
                duration,
                metrics: StepMetrics::between(&before, steps.image()),
            });
        }
        let outcome = steps.finish();
        let diagnostics = ReplayDiagnostics {
            dimensions: outcome.image.dimensions(),
            sixteen_bit: outcome.image.sixteen_bit(),
            steps: step_diagnostics,
            total_duration: clock.elapsed(&start),
            result_hash: outcome.image.content_hash(),
        };
        (outcome, diagnostics)
    }

    /// Replay `history` and compare the result with `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayMismatch`] when any pixel differs.
    pub fn verify(
        &self,
        original: &PixelBuffer,
        history: &ImageHistory,
        expected: &PixelBuffer,
    ) -> Result<(), ReplayMismatch> {
        let outcome = self.replay(original, history);
        match outcome.image.first_difference(expected) {
            None => Ok(()),
            Some(first_difference) => Err(ReplayMismatch {
                first_difference,
                issues: outcome.issues,
            }),
        }
    }
}

/// Iterator over the steps of a replay in progress.
///
/// Each call to `next` runs one action. [`image`](Self::image) is the
/// result so far.
#[derive(Debug)]
#[must_use = "replay steps do nothing unless iterated or finished"]
pub struct ReplaySteps<'r, 'h> {
    registry: &'r FilterRegistry,
    actions: std::iter::Enumerate<std::slice::Iter<'h, FilterAction>>,
    image: PixelBuffer,
    applied: usize,
    issues: Vec<ReplayIssue>,
}

impl ReplaySteps<'_, '_> {
    #[must_use]
    pub const fn image(&self) -> &PixelBuffer {
        &self.image
    }

    #[must_use]
    pub const fn applied(&self) -> usize {
        self.applied
    }

    #[must_use]
    pub fn issues(&self) -> &[ReplayIssue] {
        &self.issues
    }

    /// Run the remaining steps and return the outcome.
    pub fn finish(mut self) -> ReplayOutcome {
        for _ in self.by_ref() {}
        ReplayOutcome {
            image: self.image,
            applied: self.applied,
            issues: self.issues,
        }
    }

    fn run(&mut self, action: &FilterAction) -> (StepStatus, Option<SkipReason>) {
        let Some(mut filter) = self.registry.create(action) else {
            return (StepStatus::Skipped, Some(SkipReason::UnknownAction));
        };
        let category = action.category();
        if category == FilterCategory::Documented {
            return (StepStatus::Skipped, Some(SkipReason::NotReproducible(category)));
        }
        if self.image.is_null() {
            return (StepStatus::Failed, Some(SkipReason::Failed(FilterError::NullImage)));
        }
        match filter.filter_image(self.image.clone(), None, &Progress::default()) {
            Ok(target) => {
                self.image = target;
                self.applied += 1;
                let issue = (category == FilterCategory::Complex)
                    .then_some(SkipReason::NotReproducible(category));
                (StepStatus::Applied, issue)
            }
            Err(err) => (StepStatus::Failed, Some(SkipReason::Failed(err))),
        }
    }
}

impl Iterator for ReplaySteps<'_, '_> {
    type Item = ReplayStep;

    fn next(&mut self) -> Option<ReplayStep> {
        let (index, action) = self.actions.next()?;
        let (status, issue) = self.run(action);
        match &issue {
            Some(reason) => log::warn!(
                "replay step {index} ({} v{}): {reason}",
                action.identifier(),
                action.version()
            ),
            None => log::debug!(
                "replay step {index} ({} v{}) applied",
                action.identifier(),
                action.version()
            ),
        }
        if let Some(reason) = &issue {
            self.issues.push(ReplayIssue {
                index,
                identifier: action.identifier().to_owned(),
                version: action.version(),
                reason: reason.clone(),
            });
        }
        Some(ReplayStep {
            index,
            identifier: action.identifier().to_owned(),
            version: action.version(),
            status,
            issue,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.actions.size_hint()
    }
}
