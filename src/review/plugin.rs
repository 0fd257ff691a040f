// src/review/plugin.rs
use bevy::prelude::*;

use super::events::{
    BatchFinished, CommitFinished, ExtractionProgress, RequestCloseSession, RequestCommitImage,
    RequestEditCell, RequestProcessImages, RequestRetryImage, RequestStageImages,
    RequestStoreToken, RequestUnstageImage, ReviewFeedback,
};
use super::resources::ReviewSession;
use super::systems::{apply, dispatch};
use crate::ui::systems::forward_events;

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
enum ReviewSystemSet {
    UserInput,    // Operator requests, may spawn background tasks
    ApplyResults, // Results forwarded from background tasks
    Housekeeping, // Carousel position
}

/// Image processing and verification workflow.
pub struct ReviewPlugin;

impl Plugin for ReviewPlugin {
    fn build(&self, app: &mut App) {
        app.configure_sets(
            Update,
            (
                ReviewSystemSet::UserInput,
                ReviewSystemSet::ApplyResults.after(ReviewSystemSet::UserInput),
                ReviewSystemSet::Housekeeping.after(ReviewSystemSet::ApplyResults),
            ),
        );

        app.init_resource::<ReviewSession>();

        app.add_event::<RequestStageImages>()
            .add_event::<RequestUnstageImage>()
            .add_event::<RequestProcessImages>()
            .add_event::<RequestRetryImage>()
            .add_event::<RequestEditCell>()
            .add_event::<RequestCommitImage>()
            .add_event::<RequestCloseSession>()
            .add_event::<RequestStoreToken>()
            .add_event::<ExtractionProgress>()
            .add_event::<BatchFinished>()
            .add_event::<CommitFinished>()
            .add_event::<ReviewFeedback>();

        app.add_systems(Startup, dispatch::init_backend_handle);

        app.add_systems(
            Update,
            (
                dispatch::handle_store_token,
                dispatch::handle_stage_images,
                dispatch::handle_unstage_image,
                dispatch::handle_process_request,
                dispatch::handle_edit_request,
                dispatch::handle_retry_request,
                dispatch::handle_commit_request,
                dispatch::handle_close_request,
            )
                .chain()
                .in_set(ReviewSystemSet::UserInput),
        );
        app.add_systems(
            Update,
            (
                forward_events::<ExtractionProgress>,
                forward_events::<BatchFinished>,
                forward_events::<CommitFinished>,
                apply::apply_extraction_progress,
                apply::apply_batch_finished,
                apply::apply_commit_finished,
            )
                .chain()
                .in_set(ReviewSystemSet::ApplyResults),
        );
        app.add_systems(
            Update,
            apply::sync_carousel.in_set(ReviewSystemSet::Housekeeping),
        );

        info!("ReviewPlugin initialized.");
    }
}
