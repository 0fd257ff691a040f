// src/review/events.rs
use bevy::prelude::Event;
use std::path::PathBuf;

use super::error::ReviewError;
use super::queue::{BatchSummary, ImageId, QueueUpdate};
use super::resources::SessionId;
use super::verification::CommitReceipt;

/// Sent by the upload panel with picked files and/or folders.
#[derive(Event, Debug, Clone)]
pub struct RequestStageImages {
    pub paths: Vec<PathBuf>,
}

/// Removes a staged image before processing starts.
#[derive(Event, Debug, Clone)]
pub struct RequestUnstageImage {
    pub id: ImageId,
}

/// Starts a processing session over the currently staged images.
#[derive(Event, Debug, Clone)]
pub struct RequestProcessImages {
    pub project_id: String,
}

#[derive(Event, Debug, Clone)]
pub struct RequestRetryImage {
    pub id: ImageId,
}

/// An operator edit of one grid cell in the verification window.
#[derive(Event, Debug, Clone)]
pub struct RequestEditCell {
    pub id: ImageId,
    pub row: u32,
    pub position: u32,
    pub value: String,
}

#[derive(Event, Debug, Clone)]
pub struct RequestCommitImage {
    pub id: ImageId,
}

/// Ends the session; results still in flight are ignored when they land.
#[derive(Event, Debug, Clone)]
pub struct RequestCloseSession;

#[derive(Event, Debug, Clone)]
pub struct RequestStoreToken {
    pub token: String,
}

// --- Results coming back from background tasks ---

#[derive(Event, Debug, Clone)]
pub struct ExtractionProgress {
    pub session: SessionId,
    pub update: QueueUpdate,
}

#[derive(Event, Debug, Clone)]
pub struct BatchFinished {
    pub session: SessionId,
    pub summary: BatchSummary,
}

#[derive(Event, Debug, Clone)]
pub struct CommitFinished {
    pub session: SessionId,
    pub image_id: ImageId,
    pub result: Result<CommitReceipt, ReviewError>,
}

/// Status line shown at the bottom of the console.
#[derive(Event, Debug, Clone)]
pub struct ReviewFeedback {
    pub message: String,
    pub is_error: bool,
}

impl ReviewFeedback {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: true,
        }
    }
}
