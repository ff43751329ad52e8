//! Threaded filter execution.
//!
//! A [`ThreadedFilter`] is the run record of one filter invocation: the
//! source image, an optional reference image, progress, run state and,
//! once finished, the target image. It can run synchronously with
//! [`ThreadedFilter::run`] or on its own worker thread with
//! [`ThreadedFilter::start`].
//!
//! Cancellation is cooperative. Filters poll [`Progress::is_running`]
//! once per row; after a cancelled run the target image must be
//! discarded.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use rayon::prelude::*;

use crate::action::{FilterAction, FilterCategory};
use crate::buffer::PixelBuffer;
use crate::types::FilterError;

/// A pixel transform that can be run by a [`ThreadedFilter`].
pub trait ImageFilter: Send {
    /// Identifier recorded in the filter action, e.g. `digikam:BCGFilter`.
    fn identifier(&self) -> &'static str;

    /// Version of the parameter set recorded in the filter action.
    fn version(&self) -> i32;

    /// Human-readable name.
    fn display_name(&self) -> &'static str;

    /// Transform `source` and return the target image.
    ///
    /// `source` is a handle to the caller's pixels; writing to it detaches
    /// a private copy first. `reference` is a distinct calibration image
    /// for histogram based filters; when `None` the source is used.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError`] when the buffers cannot cooperate (depth or
    /// geometry mismatch).
    fn filter_image(
        &mut self,
        source: PixelBuffer,
        reference: Option<&PixelBuffer>,
        progress: &Progress,
    ) -> Result<PixelBuffer, FilterError>;

    /// The action that reproduces the last run.
    fn filter_action(&self) -> FilterAction;
}

/// A filter that can be rebuilt from its [`FilterAction`].
pub trait ReplayableFilter: ImageFilter + Sized + 'static {
    const IDENTIFIER: &'static str;
    const VERSION: i32;
    const DISPLAY_NAME: &'static str;

    /// Read the filter parameters back. Missing or mistyped keys fall back
    /// to the defaults.
    fn from_action(action: &FilterAction) -> Self;
}

/// Base action for filter `F` with the given category.
pub(crate) fn base_action<F: ReplayableFilter>(category: FilterCategory) -> FilterAction {
    FilterAction::new(F::IDENTIFIER, F::VERSION)
        .with_category(category)
        .with_display_name(F::DISPLAY_NAME)
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Callback receiving progress percentages, on the worker thread.
pub type ProgressObserver = Arc<dyn Fn(u8) + Send + Sync>;

/// Progress and cancellation handle passed into a filter's pixel loops.
///
/// The stored percentage never decreases within a run. The observer is
/// only called when the value actually grows, and calls are serialized so
/// it sees a strictly increasing sequence even when rows post from
/// several workers.
#[derive(Clone, Default)]
pub struct Progress {
    value: Arc<AtomicU8>,
    delivered: Arc<Mutex<u8>>,
    token: CancellationToken,
    observer: Option<ProgressObserver>,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("value", &self.value())
            .field("cancelled", &self.token.is_cancelled())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Progress {
    #[must_use]
    pub fn new(token: CancellationToken) -> Self {
        Self {
            value: Arc::default(),
            delivered: Arc::default(),
            token,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Report `percent` (clamped to 100).
    ///
    /// The observer runs under a lock and must not post to the same
    /// progress.
    pub fn post(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.value.fetch_max(percent, Ordering::Relaxed);
        if percent <= previous {
            return;
        }
        log::trace!("progress {percent}%");
        if let Some(observer) = &self.observer {
            let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
            if percent > *delivered {
                *delivered = percent;
                observer(percent);
            }
        }
    }

    /// Report `done` of `total` units mapped onto the `start..=end` band.
    #[allow(clippy::cast_possible_truncation)]
    pub fn post_fraction(&self, done: usize, total: usize, start: u8, end: u8) {
        if total == 0 {
            return;
        }
        let span = usize::from(end.saturating_sub(start));
        let percent = usize::from(start) + span * done.min(total) / total;
        self.post(percent as u8);
    }

    #[must_use]
    pub fn value(&self) -> u8 {
        self.value.load(Ordering::Relaxed)
    }

    /// `false` once cancellation has been requested.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    #[must_use]
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Apply `op` to every row of `image`, posting progress in `start..=end`.
///
/// Rows run in parallel, so `op` must not depend on other rows. Each row
/// checks for cancellation before it starts; after a cancellation the
/// remaining rows are left untouched.
pub fn process_rows<F>(image: &mut PixelBuffer, progress: &Progress, start: u8, end: u8, op: F)
where
    F: Fn(usize, &mut [u8]) + Send + Sync,
{
    let stride = image.row_bytes();
    if stride == 0 {
        return;
    }
    let height = image.height() as usize;
    let done = AtomicUsize::new(0);
    image
        .detach_for_write()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            if !progress.is_running() {
                return;
            }
            op(y, row);
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            progress.post_fraction(finished, height, start, end);
        });
}

/// Lifecycle of a [`ThreadedFilter`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Finished,
    Cancelled,
    Failed(FilterError),
}

impl RunState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Failed(_))
    }
}

/// The run record of one filter invocation.
pub struct ThreadedFilter {
    filter: Box<dyn ImageFilter>,
    source: PixelBuffer,
    reference: Option<PixelBuffer>,
    target: PixelBuffer,
    state: RunState,
    /// Copy of `state` readable from a [`FilterHandle`].
    published: Arc<Mutex<RunState>>,
    progress: Progress,
}

impl fmt::Debug for ThreadedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedFilter")
            .field("filter", &self.filter.identifier())
            .field("source", &self.source.dimensions())
            .field("reference", &self.reference.as_ref().map(PixelBuffer::dimensions))
            .field("state", &self.state)
            .field("progress", &self.progress.value())
            .finish_non_exhaustive()
    }
}

impl ThreadedFilter {
    /// Prepare a run of `filter` over `source`. The caller's buffer is
    /// shared, never written.
    #[must_use]
    pub fn new(filter: Box<dyn ImageFilter>, source: PixelBuffer) -> Self {
        Self {
            filter,
            source,
            reference: None,
            target: PixelBuffer::null(),
            state: RunState::Idle,
            published: Arc::default(),
            progress: Progress::new(CancellationToken::new()),
        }
    }

    /// Use a distinct reference image for histogram based filters.
    #[must_use]
    pub fn with_reference(mut self, reference: PixelBuffer) -> Self {
        self.reference = Some(reference);
        self
    }

    #[must_use]
    pub fn with_progress_observer(mut self, observer: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = self.progress.with_observer(Arc::new(observer));
        self
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.progress.token().clone()
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.progress.token().cancel();
    }

    #[must_use]
    pub const fn state(&self) -> &RunState {
        &self.state
    }

    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress.value()
    }

    #[must_use]
    pub fn filter(&self) -> &dyn ImageFilter {
        self.filter.as_ref()
    }

    #[must_use]
    pub const fn source(&self) -> &PixelBuffer {
        &self.source
    }

    /// The action describing the finished run.
    #[must_use]
    pub fn filter_action(&self) -> FilterAction {
        self.filter.filter_action()
    }

    /// The target image; `None` unless the run finished.
    #[must_use]
    pub const fn target_image(&self) -> Option<&PixelBuffer> {
        match self.state {
            RunState::Finished => Some(&self.target),
            _ => None,
        }
    }

    /// Consume the record and return the target image of a finished run.
    #[must_use]
    pub fn into_target_image(self) -> Option<PixelBuffer> {
        match self.state {
            RunState::Finished => Some(self.target),
            _ => None,
        }
    }

    /// The destination buffer in whatever state the run left it.
    ///
    /// After a cancelled run its pixels are unspecified, but its length
    /// always matches its geometry.
    #[must_use]
    pub const fn destination(&self) -> &PixelBuffer {
        &self.target
    }

    /// Run the filter on the calling thread.
    ///
    /// A run record is single use; calling this again returns the
    /// terminal state of the first run.
    pub fn run(&mut self) -> &RunState {
        if self.state != RunState::Idle {
            log::warn!("{} already ran ({:?})", self.filter.identifier(), self.state);
            return &self.state;
        }
        self.set_state(RunState::Running);
        self.progress.post(0);
        let state = self.execute();
        self.set_state(state);
        log::debug!(
            "{} on {} image: {:?}",
            self.filter.identifier(),
            self.source.dimensions(),
            self.state
        );
        &self.state
    }

    fn set_state(&mut self, state: RunState) {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        state.clone_into(&mut *published);
        drop(published);
        self.state = state;
    }

    fn execute(&mut self) -> RunState {
        if self.source.is_null() {
            return RunState::Failed(FilterError::NullImage);
        }
        if let Some(reference) = &self.reference {
            if reference.is_null() {
                return RunState::Failed(FilterError::NullImage);
            }
            if reference.sixteen_bit() != self.source.sixteen_bit() {
                return RunState::Failed(FilterError::DepthMismatch {
                    expected: self.source.bits(),
                    found: reference.bits(),
                });
            }
        }
        if !self.progress.is_running() {
            return RunState::Cancelled;
        }

        match self
            .filter
            .filter_image(self.source.clone(), self.reference.as_ref(), &self.progress)
        {
            Ok(target) => {
                self.target = target;
                if self.progress.is_running() {
                    self.progress.post(100);
                    RunState::Finished
                } else {
                    RunState::Cancelled
                }
            }
            Err(err) => RunState::Failed(err),
        }
    }

    /// Run the filter on a dedicated worker thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn start(mut self) -> std::io::Result<FilterHandle> {
        let progress = self.progress.clone();
        let state = Arc::clone(&self.published);
        let handle = thread::Builder::new()
            .name(format!("filter {}", self.filter.identifier()))
            .spawn(move || {
                self.run();
                self
            })?;
        Ok(FilterHandle {
            handle,
            progress,
            state,
        })
    }
}

/// Handle to a filter running on its worker thread.
#[derive(Debug)]
pub struct FilterHandle {
    handle: JoinHandle<ThreadedFilter>,
    progress: Progress,
    state: Arc<Mutex<RunState>>,
}

impl FilterHandle {
    pub fn cancel(&self) {
        self.progress.token().cancel();
    }

    #[must_use]
    pub fn progress(&self) -> u8 {
        self.progress.value()
    }

    /// Current state of the run on the worker thread.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the worker finishes and return the run record.
    ///
    /// # Errors
    ///
    /// Returns the panic payload if the worker thread panicked.
    pub fn wait(self) -> thread::Result<ThreadedFilter> {
        self.handle.join()
    }
}
