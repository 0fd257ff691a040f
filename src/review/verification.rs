// src/review/verification.rs
//! Verification of completed images: pending edits, the per-image commit
//! guard, carousel position and needs-attention markers.
//!
//! Everything here is keyed by [`ImageId`]. The carousel index is only a
//! cached hint; [`VerificationCoordinator::sync`] re-derives it from the
//! current subset so removals and retries cannot point it at the wrong image.

use bevy::log::{debug, info, warn};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;

use super::error::ReviewError;
use super::grid::{ReviewGrid, USER_ASSERTED_CONFIDENCE};
use super::payloads::{SerialNumberUpdate, SerialNumberUpdateRequest, SerialNumberUpdateResponse};
use super::queue::{ImageId, ImageQueue, ImageStatus, ProcessedImage};

/// The backend side of a commit.
pub trait VerificationBackend: Send + Sync {
    fn update_serial_numbers(
        &self,
        request: &SerialNumberUpdateRequest,
    ) -> impl Future<Output = Result<SerialNumberUpdateResponse, ReviewError>> + Send;

    fn verify_image(
        &self,
        remote_image_id: &str,
        verified: bool,
    ) -> impl Future<Output = Result<(), ReviewError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangeKey {
    pub row: u32,
    pub position: u32,
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.position)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    pub row: u32,
    pub position: u32,
    pub serial_number: String,
    pub is_user_modified: bool,
}

/// Everything a background task needs to commit one image.
#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub image_id: ImageId,
    pub remote_image_id: String,
    pub file_name: String,
    pub update: Option<SerialNumberUpdateRequest>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitReceipt {
    pub image_id: ImageId,
    pub updated_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    Removed { remaining: usize, closed: bool },
    Failed,
    /// The image was no longer in the queue.
    Unknown,
}

/// Which side of the current image holds unread results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttentionHint {
    pub left: bool,
    pub right: bool,
}

#[derive(Debug, Default)]
pub struct VerificationCoordinator {
    open: bool,
    current: Option<ImageId>,
    last_index: usize,
    pending: HashMap<ImageId, BTreeMap<ChangeKey, PendingChange>>,
    in_flight: HashSet<ImageId>,
    attention: HashSet<ImageId>,
}

impl VerificationCoordinator {
    pub fn open(&mut self, subset: &[ImageId]) {
        self.open = true;
        self.current = None;
        self.last_index = 0;
        self.sync(subset);
    }

    /// Ends the verification surface and forgets all per-image state.
    pub fn close(&mut self) {
        self.open = false;
        self.current = None;
        self.last_index = 0;
        self.pending.clear();
        self.in_flight.clear();
        self.attention.clear();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn current(&self) -> Option<ImageId> {
        self.current
    }

    pub fn current_index(&self, subset: &[ImageId]) -> Option<usize> {
        let current = self.current?;
        subset.iter().position(|id| *id == current)
    }

    /// Re-derives the viewed position from `subset`. If the viewed image left
    /// the subset, the image now at the old position (clamped) is shown.
    pub fn sync(&mut self, subset: &[ImageId]) {
        self.attention.retain(|id| subset.contains(id));

        if let Some(index) = self.current_index(subset) {
            self.last_index = index;
        } else if subset.is_empty() {
            self.current = None;
            self.last_index = 0;
        } else {
            let index = self.last_index.min(subset.len() - 1);
            self.current = Some(subset[index]);
            self.last_index = index;
        }

        if let Some(current) = self.current {
            self.attention.remove(&current);
        }
    }

    pub fn show(&mut self, id: ImageId, subset: &[ImageId]) {
        if subset.contains(&id) {
            self.current = Some(id);
            self.sync(subset);
        }
    }

    pub fn next(&mut self, subset: &[ImageId]) {
        self.step(subset, 1);
    }

    pub fn previous(&mut self, subset: &[ImageId]) {
        self.step(subset, subset.len().saturating_sub(1));
    }

    fn step(&mut self, subset: &[ImageId], offset: usize) {
        if subset.is_empty() {
            return;
        }
        let index = self.current_index(subset).unwrap_or(0);
        self.current = Some(subset[(index + offset) % subset.len()]);
        self.sync(subset);
    }

    /// Flags a freshly re-processed image the operator is not looking at.
    pub fn mark_attention(&mut self, id: ImageId) {
        if self.current != Some(id) {
            self.attention.insert(id);
        }
    }

    pub fn needs_attention(&self, id: ImageId) -> bool {
        self.attention.contains(&id)
    }

    pub fn attention_direction(&self, subset: &[ImageId]) -> AttentionHint {
        let Some(current) = self.current_index(subset) else {
            return AttentionHint {
                left: false,
                right: subset.iter().any(|id| self.attention.contains(id)),
            };
        };
        let mut hint = AttentionHint::default();
        for (index, id) in subset.iter().enumerate() {
            if !self.attention.contains(id) {
                continue;
            }
            if index < current {
                hint.left = true;
            } else if index > current {
                hint.right = true;
            }
        }
        hint
    }

    pub fn record_edit(
        &mut self,
        image: &ProcessedImage,
        row: u32,
        position: u32,
        value: &str,
    ) -> Result<(), ReviewError> {
        if image.retrying || image.status != ImageStatus::Completed {
            return Err(ReviewError::ReadOnly(image.display_name().to_string()));
        }
        if image.remote_image_id().is_none() {
            return Err(ReviewError::IdentityMissing(image.display_name().to_string()));
        }
        let in_range = image
            .grid
            .as_ref()
            .is_some_and(|grid| grid.contains(row, position));
        if !in_range {
            return Err(ReviewError::CellOutOfRange { row, position });
        }

        let key = ChangeKey { row, position };
        debug!("Pending change {} on '{}': '{}'", key, image.display_name(), value);
        self.pending.entry(image.id).or_default().insert(
            key,
            PendingChange {
                row,
                position,
                serial_number: value.to_string(),
                is_user_modified: true,
            },
        );
        Ok(())
    }

    pub fn pending_changes(&self, id: ImageId) -> Vec<&PendingChange> {
        self.pending
            .get(&id)
            .map(|changes| changes.values().collect())
            .unwrap_or_default()
    }

    pub fn pending_count(&self, id: ImageId) -> usize {
        self.pending.get(&id).map_or(0, BTreeMap::len)
    }

    pub fn discard_changes(&mut self, id: ImageId) {
        if self.pending.remove(&id).is_some() {
            debug!("Discarded pending changes for {}", id);
        }
    }

    /// The image's grid with its pending edits applied on top.
    pub fn display_grid<'a>(&self, image: &'a ProcessedImage) -> Option<Cow<'a, ReviewGrid>> {
        let grid = image.grid.as_deref()?;
        match self.pending.get(&image.id) {
            Some(changes) if !changes.is_empty() => {
                let mut edited = grid.clone();
                for change in changes.values() {
                    edited.set_serial(change.row, change.position, &change.serial_number);
                }
                Some(Cow::Owned(edited))
            }
            _ => Some(Cow::Borrowed(grid)),
        }
    }

    pub fn is_committing(&self, id: ImageId) -> bool {
        self.in_flight.contains(&id)
    }

    /// Claims the commit slot for `image`. `Ok(None)` means a commit for this
    /// image is already running and nothing should be sent.
    pub fn begin_commit(
        &mut self,
        image: &ProcessedImage,
        project_id: &str,
    ) -> Result<Option<CommitPlan>, ReviewError> {
        if self.in_flight.contains(&image.id) {
            debug!("Commit for '{}' already in flight; ignoring.", image.display_name());
            return Ok(None);
        }
        if image.retrying || image.status != ImageStatus::Completed {
            return Err(ReviewError::ReadOnly(image.display_name().to_string()));
        }
        let remote_image_id = image
            .remote_image_id()
            .ok_or_else(|| ReviewError::IdentityMissing(image.display_name().to_string()))?
            .to_string();

        let updated_serials: Vec<SerialNumberUpdate> = self
            .pending_changes(image.id)
            .into_iter()
            .map(|change| SerialNumberUpdate {
                row: change.row,
                position: change.position,
                serial_number: change.serial_number.clone(),
                is_user_modified: change.is_user_modified,
                confidence: format!("{}%", USER_ASSERTED_CONFIDENCE),
            })
            .collect();
        let update = (!updated_serials.is_empty()).then(|| SerialNumberUpdateRequest {
            image_id: remote_image_id.clone(),
            project_id: project_id.to_string(),
            updated_serials,
        });

        self.in_flight.insert(image.id);
        info!(
            "Committing '{}' ({} edit(s)).",
            image.display_name(),
            update.as_ref().map_or(0, |u| u.updated_serials.len())
        );
        Ok(Some(CommitPlan {
            image_id: image.id,
            remote_image_id,
            file_name: image.display_name().to_string(),
            update,
        }))
    }

    /// Applies a commit outcome. Success removes the image from the queue;
    /// failure only releases the in-flight guard.
    pub fn finish_commit(
        &mut self,
        queue: &mut ImageQueue,
        id: ImageId,
        outcome: &Result<CommitReceipt, ReviewError>,
    ) -> FinishOutcome {
        self.in_flight.remove(&id);
        if let Err(err) = outcome {
            warn!("Commit for {} failed: {}", id, err);
            return FinishOutcome::Failed;
        }

        if queue.remove(id).is_none() {
            warn!("Commit finished for {} but it is no longer queued.", id);
            return FinishOutcome::Unknown;
        }
        self.pending.remove(&id);
        self.attention.remove(&id);
        if self.current == Some(id) {
            self.current = None;
        }

        let subset = queue.carousel_ids();
        self.sync(&subset);
        let closed = subset.is_empty();
        if closed {
            info!("All images verified; closing verification.");
            self.open = false;
        }
        FinishOutcome::Removed {
            remaining: subset.len(),
            closed,
        }
    }
}

/// Sends one image's corrections (if any) and then its verified flag.
pub async fn execute_commit<B: VerificationBackend>(
    backend: &B,
    plan: &CommitPlan,
) -> Result<CommitReceipt, ReviewError> {
    let mut updated_count = 0;
    if let Some(request) = &plan.update {
        let response = backend
            .update_serial_numbers(request)
            .await
            .map_err(commit_error)?;
        if !response.success {
            return Err(ReviewError::CommitFailed(if response.message.is_empty() {
                "serial number update was rejected".to_string()
            } else {
                response.message
            }));
        }
        updated_count = response.updated_count;
    }
    backend
        .verify_image(&plan.remote_image_id, true)
        .await
        .map_err(commit_error)?;
    Ok(CommitReceipt {
        image_id: plan.image_id,
        updated_count,
    })
}

fn commit_error(err: ReviewError) -> ReviewError {
    match err {
        ReviewError::Unauthorized | ReviewError::Forbidden(_) | ReviewError::CommitFailed(_) => err,
        other => ReviewError::CommitFailed(other.to_string()),
    }
}
