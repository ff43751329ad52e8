//! retouch-pipeline: Non-destructive image filters with a replayable
//! history (sans-IO).
//!
//! Images are [`PixelBuffer`]s: 8 or 16 bits per channel, BGRA order,
//! copy-on-write storage. Every filter implements [`ImageFilter`], runs
//! through a [`ThreadedFilter`] (synchronously or on its own worker
//! thread, with progress and cooperative cancellation) and describes its
//! run as a [`FilterAction`]. Actions collected in an [`ImageHistory`]
//! can be replayed against the original image with [`HistoryReplay`],
//! which reproduces the derived image exactly.
//!
//! This crate has **no I/O dependencies**. Decoding, encoding and history
//! persistence live in `retouch-io`.

pub mod action;
pub mod buffer;
pub mod diagnostics;
pub mod filters;
pub mod histogram;
pub mod history;
pub mod levels;
pub mod lut;
pub mod registry;
pub mod threaded;
pub mod types;

pub use action::{FilterAction, FilterCategory, ParamValue};
pub use buffer::{Color, PixelBuffer};
pub use filters::FilterSettings;
pub use histogram::Histogram;
pub use history::{
    HistoryReplay, ImageHistory, ReplayIssue, ReplayMismatch, ReplayOutcome, ReplaySteps,
    SkipReason,
};
pub use registry::FilterRegistry;
pub use threaded::{
    CancellationToken, FilterHandle, ImageFilter, Progress, ReplayableFilter, RunState,
    ThreadedFilter,
};
pub use types::{
    ActionDecodeError, Channel, Depth, Dimensions, FilterError, Flip, Point, Rect, Rotation,
};

/// Run `filter` on `source` to completion on the calling thread.
///
/// Returns the target image together with the action describing the run.
///
/// # Errors
///
/// Returns the filter's [`FilterError`], or [`FilterError::NullImage`] for
/// a null source.
pub fn apply(
    filter: Box<dyn ImageFilter>,
    source: &PixelBuffer,
) -> Result<(PixelBuffer, FilterAction), FilterError> {
    let mut run = ThreadedFilter::new(filter, source.clone());
    if let RunState::Failed(err) = run.run() {
        return Err(err.clone());
    }
    let action = run.filter_action();
    run.into_target_image()
        .map(|image| (image, action))
        .ok_or(FilterError::NullImage)
}
