//! retouch-io: Filesystem and codec boundary for retouch.
//!
//! Loads and saves [`PixelBuffer`](retouch_pipeline::PixelBuffer)s through
//! the `image` crate and persists
//! [`ImageHistory`](retouch_pipeline::ImageHistory) as a JSON sidecar or
//! as the portable text log. The pipeline crate itself never touches the
//! filesystem.

pub mod codec;
pub mod sidecar;

use retouch_pipeline::ActionDecodeError;

pub use codec::{decode, encode, from_dynamic_image, load, save, to_dynamic_image};
pub use sidecar::{
    HistorySidecar, history_from_text, history_to_text, read_history, sidecar_path, write_history,
};

/// Errors at the I/O boundary.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Decoding or encoding failed, or the format is not supported.
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("history log error: {0}")]
    Action(#[from] ActionDecodeError),

    /// The buffer to encode is null.
    #[error("image is null")]
    NullImage,

    #[error("history sidecar version {0} is newer than this build supports")]
    UnsupportedVersion(u32),
}
