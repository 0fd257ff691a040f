// src/review/systems/apply.rs
//! Systems folding background results back into the session.

use bevy::prelude::*;
use chrono::Utc;

use crate::review::events::{BatchFinished, CommitFinished, ExtractionProgress, ReviewFeedback};
use crate::review::queue::{Applied, QueueUpdate};
use crate::review::resources::{format_processing_time, ReviewSession};
use crate::review::verification::FinishOutcome;

pub fn apply_extraction_progress(
    mut events: EventReader<ExtractionProgress>,
    mut session: ResMut<ReviewSession>,
    mut feedback: EventWriter<ReviewFeedback>,
) {
    for ev in events.read() {
        let id = ev.update.id();
        let name = session
            .queue
            .get(id)
            .map(|img| img.display_name().to_string())
            .unwrap_or_default();

        match session.apply_progress(ev.session, ev.update.clone()) {
            Some(Applied::Completed { was_retry: true }) => {
                feedback.write(ReviewFeedback::info(format!("Re-processed '{}'.", name)));
            }
            Some(Applied::Failed { .. }) => {
                if let QueueUpdate::Failed { message, .. } = &ev.update {
                    feedback.write(ReviewFeedback::error(format!("'{}': {}", name, message)));
                }
            }
            _ => {}
        }
    }
}

pub fn apply_batch_finished(
    mut events: EventReader<BatchFinished>,
    mut session: ResMut<ReviewSession>,
    mut feedback: EventWriter<ReviewFeedback>,
) {
    for ev in events.read() {
        let now = Utc::now();
        if !session.finish_batch(ev.session, now) {
            debug!("Ignoring batch result from stale session {}.", ev.session);
            continue;
        }
        let elapsed = session
            .elapsed_ms(now)
            .map(format_processing_time)
            .unwrap_or_default();
        let message = format!(
            "Processed {} image(s) in {}: {} completed, {} failed.",
            ev.summary.completed + ev.summary.failed,
            elapsed,
            ev.summary.completed,
            ev.summary.failed
        );
        if ev.summary.failed > 0 {
            feedback.write(ReviewFeedback::error(message));
        } else {
            feedback.write(ReviewFeedback::info(message));
        }
    }
}

pub fn apply_commit_finished(
    mut events: EventReader<CommitFinished>,
    mut session: ResMut<ReviewSession>,
    mut feedback: EventWriter<ReviewFeedback>,
) {
    for ev in events.read() {
        let name = session
            .queue
            .get(ev.image_id)
            .map(|img| img.display_name().to_string())
            .unwrap_or_default();

        match session.finish_commit(ev.session, ev.image_id, &ev.result) {
            Some(FinishOutcome::Removed { closed: true, .. }) => {
                feedback.write(ReviewFeedback::info(format!(
                    "Verified '{}'. All images verified.",
                    name
                )));
            }
            Some(FinishOutcome::Removed { remaining, .. }) => {
                let edits = ev.result.as_ref().map_or(0, |r| r.updated_count);
                feedback.write(ReviewFeedback::info(format!(
                    "Verified '{}' ({} correction(s)). {} left to verify.",
                    name, edits, remaining
                )));
            }
            Some(FinishOutcome::Failed) => {
                if let Err(e) = &ev.result {
                    feedback.write(ReviewFeedback::error(e.to_string()));
                }
            }
            Some(FinishOutcome::Unknown) | None => {}
        }
    }
}

/// Keeps the carousel pointed at a live image every frame.
pub fn sync_carousel(mut session: ResMut<ReviewSession>) {
    if !session.coordinator.is_open() {
        return;
    }
    let session = &mut *session;
    let subset = session.queue.carousel_ids();
    session.coordinator.sync(&subset);
}
