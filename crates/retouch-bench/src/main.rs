//! retouch-bench: CLI tool for filter chain experimentation and replay
//! diagnostics.
//!
//! Applies a chain of filters to an image, records the resulting history,
//! replays that history against the original pixels and checks that the
//! replay reproduces the derived image exactly. Useful for:
//!
//! - Checking that a filter chain is reproducible
//! - Measuring per-action replay durations
//! - Replaying a saved history sidecar against its original
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin retouch-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use retouch_pipeline::diagnostics::{Clock, ReplayDiagnostics};
use retouch_pipeline::filters::{BcgSettings, WhiteBalanceSettings};
use retouch_pipeline::{
    FilterRegistry, FilterSettings, HistoryReplay, ImageHistory, PixelBuffer, RunState,
    ThreadedFilter,
};

/// Filter chain experimentation and replay diagnostics for retouch.
///
/// Applies the configured filters to an image, replays the recorded
/// history and prints per-action timing and pixel diagnostics.
#[derive(Parser)]
#[command(name = "retouch-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Brightness offset as a fraction of the full range.
    #[arg(long, default_value_t = BcgSettings::DEFAULT_BRIGHTNESS, allow_negative_numbers = true)]
    brightness: f64,

    /// Contrast factor.
    #[arg(long, default_value_t = BcgSettings::DEFAULT_CONTRAST)]
    contrast: f64,

    /// Gamma exponent.
    #[arg(long, default_value_t = BcgSettings::DEFAULT_GAMMA)]
    gamma: f64,

    /// White balance color temperature in Kelvin.
    #[arg(long, default_value_t = WhiteBalanceSettings::DEFAULT_TEMPERATURE)]
    temperature: f64,

    /// Apply automatic exposure.
    #[arg(long)]
    auto_exposure: bool,

    /// Apply automatic levels.
    #[arg(long)]
    auto_levels: bool,

    /// Apply histogram equalization.
    #[arg(long)]
    equalize: bool,

    /// Apply normalization.
    #[arg(long)]
    normalize: bool,

    /// Full filter chain as a JSON array of filter settings.
    ///
    /// When provided, all other filter flags are ignored. Each element is
    /// tagged by `filter`, e.g. `[{"filter": "bcg", "brightness": 0.1}]`.
    #[arg(long)]
    config_json: Option<String>,

    /// Replay this history sidecar instead of applying a filter chain.
    #[arg(long, conflicts_with = "config_json")]
    replay: Option<PathBuf>,

    /// Write the derived image to this file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write the recorded history sidecar to this file.
    #[arg(long)]
    history: Option<PathBuf>,

    /// Number of replay runs for averaging.
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

/// Build the filter chain from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual filter flags are ignored.
fn chain_from_cli(cli: &Cli) -> Result<Vec<FilterSettings>, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let mut chain = Vec::new();
    if (cli.temperature - WhiteBalanceSettings::DEFAULT_TEMPERATURE).abs() > f64::EPSILON {
        chain.push(FilterSettings::WhiteBalance(WhiteBalanceSettings {
            temperature: cli.temperature,
            ..WhiteBalanceSettings::default()
        }));
    }
    if cli.auto_exposure {
        chain.push(FilterSettings::AutoExposure);
    }
    let bcg = BcgSettings {
        brightness: cli.brightness,
        contrast: cli.contrast,
        gamma: cli.gamma,
        ..BcgSettings::default()
    };
    if !bcg.is_identity() {
        chain.push(FilterSettings::Bcg(bcg));
    }
    if cli.auto_levels {
        chain.push(FilterSettings::AutoLevels);
    }
    if cli.equalize {
        chain.push(FilterSettings::Equalize);
    }
    if cli.normalize {
        chain.push(FilterSettings::Normalize);
    }
    Ok(chain)
}

/// Run every filter of `chain` on its own worker thread, feeding each
/// target image into the next run.
fn apply_chain(
    original: &PixelBuffer,
    chain: Vec<FilterSettings>,
) -> Result<(PixelBuffer, ImageHistory), String> {
    let mut image = original.clone();
    let mut history = ImageHistory::new();
    for settings in chain {
        let filter = settings.into_filter();
        let name = filter.display_name();
        let handle = ThreadedFilter::new(filter, image)
            .with_progress_observer(move |percent| log::trace!("{name}: {percent}%"))
            .start()
            .map_err(|e| format!("Error starting {name}: {e}"))?;
        let run = handle
            .wait()
            .map_err(|_| format!("{name} worker thread panicked"))?;
        match run.state() {
            RunState::Finished => {}
            state => return Err(format!("{name} did not finish: {state:?}")),
        }
        history.push(run.filter_action());
        image = run
            .into_target_image()
            .ok_or_else(|| format!("{name} produced no image"))?;
        eprintln!("Applied {name}");
    }
    Ok((image, history))
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let original = match retouch_io::load(&cli.image_path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({}, {}-bit)",
        cli.image_path.display(),
        original.dimensions(),
        original.bits(),
    );

    // Either a freshly derived image with its history, or a saved history.
    let (derived, history) = if let Some(ref path) = cli.replay {
        match retouch_io::read_history(path) {
            Ok(sidecar) => {
                if !sidecar.matches_original(&original) {
                    log::warn!("{} was recorded against a different original", path.display());
                }
                (None, sidecar.history)
            }
            Err(e) => {
                eprintln!("Error reading {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    } else {
        let chain = match chain_from_cli(&cli) {
            Ok(chain) => chain,
            Err(msg) => {
                eprintln!("{msg}");
                return ExitCode::FAILURE;
            }
        };
        eprintln!("Chain: {chain:#?}");
        match apply_chain(&original, chain) {
            Ok((derived, history)) => (Some(derived), history),
            Err(msg) => {
                eprintln!("{msg}");
                return ExitCode::FAILURE;
            }
        }
    };

    let registry = FilterRegistry::with_builtin_filters();
    let replay = HistoryReplay::new(&registry);
    eprintln!(
        "History: {} action(s), reproducible: {}",
        history.len(),
        history.is_reproducible(&registry),
    );
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    let mut result = None;

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let (outcome, diagnostics) = replay.replay_with_diagnostics(&original, &history, &StdClock);
        if cli.json {
            match serde_json::to_string_pretty(&diagnostics) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", diagnostics.report());
        }

        for issue in &outcome.issues {
            eprintln!(
                "Step {} ({} v{}): {}",
                issue.index, issue.identifier, issue.version, issue.reason
            );
        }

        all_diagnostics.push(diagnostics);
        result = Some(outcome.image);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    let Some(replayed) = result else {
        return ExitCode::FAILURE;
    };

    let mut status = ExitCode::SUCCESS;
    if let Some(ref derived) = derived {
        match replayed.first_difference(derived) {
            None => eprintln!("Replay reproduces the derived image exactly"),
            Some(at) => {
                eprintln!("Replay differs from the derived image at ({}, {})", at.x, at.y);
                status = ExitCode::FAILURE;
            }
        }
    }

    if let Some(ref path) = cli.output {
        let image = derived.as_ref().unwrap_or(&replayed);
        match retouch_io::save(image, path) {
            Ok(()) => eprintln!("Image written to {}", path.display()),
            Err(e) => {
                eprintln!("Error writing image to {}: {e}", path.display());
                status = ExitCode::FAILURE;
            }
        }
    }

    if let Some(ref path) = cli.history {
        let sidecar = retouch_io::HistorySidecar::new(history).with_original(&original);
        match retouch_io::write_history(path, &sidecar) {
            Ok(()) => eprintln!("History written to {}", path.display()),
            Err(e) => {
                eprintln!("Error writing history to {}: {e}", path.display());
                status = ExitCode::FAILURE;
            }
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    status
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[ReplayDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-action means; every run replays the same history.
    println!();
    println!("{:<32} {:>12}", "Action", "Mean (ms)");
    println!("{}", "-".repeat(48));

    for (index, step) in first.steps.iter().enumerate() {
        let step_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(|d| d.steps.get(index))
            .map(|s| s.duration.as_secs_f64() * 1000.0)
            .collect();
        let step_mean = step_durations.iter().sum::<f64>() / step_durations.len() as f64;
        let name = format!("{} v{}", step.identifier, step.version);
        println!("{name:<32} {step_mean:>10.3}ms");
    }

    let hashes_agree = all_diagnostics
        .iter()
        .all(|d| d.result_hash == first.result_hash);
    println!();
    println!("Result hash stable across runs: {hashes_agree}");
}
