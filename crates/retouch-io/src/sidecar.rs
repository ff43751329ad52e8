//! History persistence: a JSON sidecar file next to the image, and the
//! portable text log.

use std::path::{Path, PathBuf};

use retouch_pipeline::{ImageHistory, PixelBuffer};
use serde::{Deserialize, Serialize};

use crate::IoError;

/// Current sidecar layout.
pub const SIDECAR_VERSION: u32 = 1;

/// Contents of a history sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySidecar {
    pub version: u32,
    /// Fingerprint of the original image the history starts from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_hash: Option<u64>,
    pub history: ImageHistory,
}

impl HistorySidecar {
    #[must_use]
    pub const fn new(history: ImageHistory) -> Self {
        Self {
            version: SIDECAR_VERSION,
            original_hash: None,
            history,
        }
    }

    /// Record the fingerprint of `original`.
    #[must_use]
    pub fn with_original(mut self, original: &PixelBuffer) -> Self {
        self.original_hash = Some(original.content_hash());
        self
    }

    /// `false` only when a fingerprint was recorded and `original` does
    /// not match it.
    #[must_use]
    pub fn matches_original(&self, original: &PixelBuffer) -> bool {
        self.original_hash
            .is_none_or(|hash| hash == original.content_hash())
    }
}

/// Conventional sidecar location: `photo.png` -> `photo.png.history.json`.
#[must_use]
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    let mut name = image_path.as_os_str().to_owned();
    name.push(".history.json");
    PathBuf::from(name)
}

/// Write `sidecar` as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`IoError::Json`] or [`IoError::Io`].
pub fn write_history(path: impl AsRef<Path>, sidecar: &HistorySidecar) -> Result<(), IoError> {
    let json = serde_json::to_string_pretty(sidecar)?;
    std::fs::write(path.as_ref(), json)?;
    log::debug!(
        "wrote {} action(s) to {}",
        sidecar.history.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Read a sidecar written by [`write_history`].
///
/// # Errors
///
/// Returns [`IoError::Io`], [`IoError::Json`], or
/// [`IoError::UnsupportedVersion`] for a sidecar from a newer layout.
pub fn read_history(path: impl AsRef<Path>) -> Result<HistorySidecar, IoError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let sidecar: HistorySidecar = serde_json::from_str(&text)?;
    if sidecar.version > SIDECAR_VERSION {
        return Err(IoError::UnsupportedVersion(sidecar.version));
    }
    Ok(sidecar)
}

/// The portable text log of `history`.
#[must_use]
pub fn history_to_text(history: &ImageHistory) -> String {
    String::from_utf8_lossy(&history.to_bytes()).into_owned()
}

/// Parse a text log written by [`history_to_text`].
///
/// # Errors
///
/// Returns [`IoError::Action`] for a malformed log.
pub fn history_from_text(text: &str) -> Result<ImageHistory, IoError> {
    Ok(ImageHistory::from_bytes(text.as_bytes())?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use retouch_pipeline::{Color, FilterAction, FilterCategory};

    use super::*;

    fn history() -> ImageHistory {
        ImageHistory::from(vec![
            FilterAction::new("digikam:BCGFilter", 1)
                .with_parameter("brightness", 0.1)
                .with_parameter("channel", 2_i64),
            FilterAction::new("digikam:AutoLevelsfilter", 1).with_category(FilterCategory::Complex),
        ])
    }

    #[test]
    fn sidecar_path_appends_suffix() {
        assert_eq!(
            sidecar_path(Path::new("/photos/a.png")),
            PathBuf::from("/photos/a.png.history.json")
        );
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.history.json");
        let original = PixelBuffer::filled(2, 2, true, Color::opaque(1, 2, 3, false));
        let sidecar = HistorySidecar::new(history()).with_original(&original);
        write_history(&path, &sidecar).unwrap();
        let back = read_history(&path).unwrap();
        assert_eq!(back, sidecar);
        assert!(back.matches_original(&original));
        let other = PixelBuffer::filled(2, 2, true, Color::opaque(9, 2, 3, false));
        assert!(!back.matches_original(&other));
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        std::fs::write(&path, r#"{"version": 99, "history": []}"#).unwrap();
        assert!(matches!(read_history(&path), Err(IoError::UnsupportedVersion(99))));
    }

    #[test]
    fn malformed_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(read_history(&path), Err(IoError::Json(_))));
    }

    #[test]
    fn text_log_round_trip() {
        let text = history_to_text(&history());
        assert!(text.starts_with("action digikam:BCGFilter 1 reproducible\n"));
        assert_eq!(history_from_text(&text).unwrap(), history());
    }

    #[test]
    fn malformed_text_log_is_reported() {
        assert!(matches!(
            history_from_text("action digikam:BCGFilter 1 reproducible\n"),
            Err(IoError::Action(_))
        ));
    }

    #[test]
    fn sidecar_without_hash_matches_anything() {
        let sidecar = HistorySidecar::new(ImageHistory::new());
        assert!(sidecar.matches_original(&PixelBuffer::null()));
    }
}
