// src/review/resources.rs
use bevy::prelude::*;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::client::BackendClient;
use super::error::{ReviewError, TransitionError};
use super::queue::{Applied, ImageId, ImageQueue, QueueUpdate, UploadedImage};
use super::verification::{CommitReceipt, FinishOutcome, VerificationCoordinator};

/// Identifies one processing run. Bumped on every start and close so that
/// results from an abandoned run can be recognised and dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StartRefusal {
    #[error("Images are already being processed.")]
    AlreadyRunning,
    #[error("Add at least one image before processing.")]
    NothingStaged,
    #[error("Enter a project ID before processing.")]
    MissingProject,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryRefusal {
    #[error("'{0}' is being saved; wait for verification to finish.")]
    Committing(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Main-thread owner of the queue and the verification state.
#[derive(Resource, Debug, Default)]
pub struct ReviewSession {
    session_id: SessionId,
    pub project_id: String,
    /// Picked files waiting for "Process".
    pub staged: Vec<UploadedImage>,
    pub queue: ImageQueue,
    pub coordinator: VerificationCoordinator,
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReviewSession {
    pub fn id(&self) -> SessionId {
        self.session_id
    }

    pub fn is_current(&self, session: SessionId) -> bool {
        self.session_id == session
    }

    pub fn has_images(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Adds uploads, skipping files that are already staged.
    pub fn stage(&mut self, uploads: Vec<UploadedImage>) -> usize {
        let mut added = 0;
        for upload in uploads {
            let known = self.staged.iter().any(|s| s.is_same_file(&upload));
            if known {
                debug!("Skipping already staged '{}'.", upload.file_name);
                continue;
            }
            self.staged.push(upload);
            added += 1;
        }
        added
    }

    pub fn unstage(&mut self, id: ImageId) -> bool {
        let before = self.staged.len();
        self.staged.retain(|s| s.id != id);
        before != self.staged.len()
    }

    /// Moves the staged images into a fresh queue and returns what to dispatch.
    pub fn begin(
        &mut self,
        project_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(SessionId, Vec<UploadedImage>), StartRefusal> {
        if self.running {
            return Err(StartRefusal::AlreadyRunning);
        }
        if project_id.trim().is_empty() {
            return Err(StartRefusal::MissingProject);
        }
        if self.staged.is_empty() {
            return Err(StartRefusal::NothingStaged);
        }

        self.session_id = self.session_id.next();
        self.project_id = project_id.trim().to_string();
        self.queue.enqueue_all(std::mem::take(&mut self.staged));
        self.coordinator.close();
        self.running = true;
        self.started_at = Some(now);
        self.finished_at = None;
        info!(
            "Session {} started for project '{}' with {} image(s).",
            self.session_id,
            self.project_id,
            self.queue.len()
        );
        Ok((self.session_id, self.queue.uploads()))
    }

    pub fn close(&mut self) {
        let closed = self.session_id;
        self.session_id = self.session_id.next();
        self.staged.clear();
        self.queue.clear();
        self.coordinator.close();
        self.running = false;
        self.started_at = None;
        self.finished_at = None;
        info!("Session {} closed.", closed);
    }

    /// Puts a settled image back into processing and returns the upload to
    /// resend. Refused while the image's commit is in flight, so the edits
    /// being saved are not dropped.
    pub fn begin_retry(&mut self, id: ImageId) -> Result<UploadedImage, RetryRefusal> {
        if self.coordinator.is_committing(id) {
            let name = self
                .queue
                .get(id)
                .map_or_else(|| id.to_string(), |image| image.display_name().to_string());
            return Err(RetryRefusal::Committing(name));
        }
        let source = self.queue.begin_retry(id)?;
        self.coordinator.discard_changes(id);
        self.coordinator.sync(&self.queue.carousel_ids());
        Ok(source)
    }

    pub fn apply_progress(&mut self, session: SessionId, update: QueueUpdate) -> Option<Applied> {
        if !self.is_current(session) {
            debug!(
                "Dropping update for {} from stale session {} (current {}).",
                update.id(),
                session,
                self.session_id
            );
            return None;
        }
        let id = update.id();
        let applied = match self.queue.apply_update(update) {
            Ok(applied) => applied,
            Err(e) => {
                warn!("Queue rejected update: {}", e);
                return None;
            }
        };

        if let Applied::Completed { was_retry } = applied {
            if was_retry {
                self.coordinator.mark_attention(id);
            }
            if !self.coordinator.is_open() {
                self.coordinator.open(&self.queue.carousel_ids());
            }
        }
        self.coordinator.sync(&self.queue.carousel_ids());
        Some(applied)
    }

    pub fn finish_batch(&mut self, session: SessionId, now: DateTime<Utc>) -> bool {
        if !self.is_current(session) {
            return false;
        }
        self.running = false;
        self.finished_at = Some(now);
        true
    }

    pub fn finish_commit(
        &mut self,
        session: SessionId,
        id: ImageId,
        result: &Result<CommitReceipt, ReviewError>,
    ) -> Option<FinishOutcome> {
        if !self.is_current(session) {
            debug!("Dropping commit result for {} from stale session {}.", id, session);
            return None;
        }
        Some(self.coordinator.finish_commit(&mut self.queue, id, result))
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        let started = self.started_at?;
        let end = self.finished_at.unwrap_or(now);
        Some((end - started).num_milliseconds().max(0))
    }
}

/// `850ms`, `1.5s`, `2.0m`
pub fn format_processing_time(ms: i64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{:.1}m", ms as f64 / 60_000.0)
    }
}

/// Configured backend client, absent until a token is available.
#[derive(Resource, Default, Clone)]
pub struct BackendHandle {
    pub client: Option<Arc<BackendClient>>,
    pub status: String,
}
