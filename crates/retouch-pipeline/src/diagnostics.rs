//! Replay diagnostics: timing and pixel counts for each history step.
//!
//! The library has no time source of its own. Callers inject a [`Clock`]
//! (the bench binary uses `std::time::Instant`); tests use a fake one.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::types::Dimensions;

/// A monotonic time source.
pub trait Clock {
    type Instant;

    fn now(&self) -> Self::Instant;

    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// What happened to one action during replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Applied,
    Skipped,
    Failed,
}

/// Diagnostics for a single replayed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDiagnostics {
    pub identifier: String,
    pub version: i32,
    pub status: StepStatus,
    /// Wall-clock duration of this step (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub metrics: StepMetrics,
}

/// Pixel level effect of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Pixels whose channels differ between the step's input and output.
    pub changed_pixels: u64,
    /// Total pixel count of the step's input.
    pub pixel_count: u64,
}

impl StepMetrics {
    /// Compare a step's input and output.
    #[must_use]
    pub fn between(before: &PixelBuffer, after: &PixelBuffer) -> Self {
        let pixel_count = before.num_pixels() as u64;
        if !before.has_same_geometry(after) {
            return Self {
                changed_pixels: pixel_count,
                pixel_count,
            };
        }
        let stride = before.bytes_depth();
        let changed_pixels = before
            .data()
            .chunks_exact(stride)
            .zip(after.data().chunks_exact(stride))
            .map(|(a, b)| u64::from(a != b))
            .sum();
        Self {
            changed_pixels,
            pixel_count,
        }
    }
}

/// Diagnostics collected from a single history replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayDiagnostics {
    pub dimensions: Dimensions,
    pub sixteen_bit: bool,
    pub steps: Vec<StepDiagnostics>,
    /// Total wall-clock duration of the replay (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// SipHash fingerprint of the replayed image.
    pub result_hash: u64,
}

impl ReplayDiagnostics {
    #[must_use]
    pub fn applied(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Applied)
            .count()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Replay Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {} ({}-bit)",
            self.dimensions,
            if self.sixteen_bit { 16 } else { 8 },
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<32} {:>8} {:>10} {:>8}  {}",
            "Action", "Status", "Duration", "% Total", "Changed"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for step in &self.steps {
            let ms = duration_ms(step.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let name = format!("{} v{}", step.identifier, step.version);
            let status = match step.status {
                StepStatus::Applied => "applied",
                StepStatus::Skipped => "skipped",
                StepStatus::Failed => "failed",
            };
            lines.push(format!(
                "{name:<32} {status:>8} {ms:>8.3}ms {pct:>7.1}%  {}",
                format_metrics(&step.metrics),
            ));
        }

        lines.push(String::new());
        lines.push(format!(
            "Applied: {}/{}  |  Result hash: {:016x}",
            self.applied(),
            self.steps.len(),
            self.result_hash,
        ));

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StepMetrics) -> String {
    #[allow(clippy::cast_precision_loss)]
    let share = if metrics.pixel_count > 0 {
        metrics.changed_pixels as f64 / metrics.pixel_count as f64 * 100.0
    } else {
        0.0
    };
    format!(
        "{}/{} px ({share:.1}%)",
        metrics.changed_pixels, metrics.pixel_count
    )
}
