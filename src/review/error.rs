// src/review/error.rs

use thiserror::Error;

use super::queue::{ImageId, ImageStatus};

/// Errors surfaced by the extraction/verification workflow.
/// Payloads are plain strings so the error can travel inside Bevy events.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReviewError {
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),
    #[error("Failed to save verification: {0}")]
    CommitFailed(String),
    #[error("Image ID not found for '{0}'. Cannot save changes.")]
    IdentityMissing(String),
    #[error("'{0}' is being re-processed and cannot be edited right now.")]
    ReadOnly(String),
    #[error("Row {row}, position {position} is outside the grid.")]
    CellOutOfRange { row: u32, position: u32 },
    #[error("Authentication error: please check your token or log in again.")]
    Unauthorized,
    #[error("Access denied: you may not have permission to {0}.")]
    Forbidden(String),
    #[error("Server returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Unable to connect to server: {0}")]
    Network(String),
    #[error("Unexpected response from server: {0}")]
    Decode(String),
    #[error("No API token set. Store one with `labelgrid set-token`.")]
    MissingToken,
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ReviewError {
    fn from(err: std::io::Error) -> Self {
        ReviewError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for ReviewError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ReviewError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ReviewError::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("request failed").to_string(),
            }
        } else {
            ReviewError::Network(err.to_string())
        }
    }
}

/// A queue transition that the state machine does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Image {0} is not in the queue.")]
    UnknownImage(ImageId),
    #[error("Image {id} cannot go from {from:?} to {to:?}.")]
    Invalid {
        id: ImageId,
        from: ImageStatus,
        to: ImageStatus,
    },
}
