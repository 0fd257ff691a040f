// src/review/systems/dispatch.rs
//! Systems reacting to operator requests. Network work is handed to the
//! tokio runtime; results come back as `SendEvent` entities.

use bevy::prelude::*;
use bevy_tokio_tasks::{TaskContext, TokioTasksRuntime};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::review::client::BackendClient;
use crate::review::error::ReviewError;
use crate::review::events::{
    BatchFinished, CommitFinished, ExtractionProgress, RequestCloseSession, RequestCommitImage,
    RequestEditCell, RequestProcessImages, RequestRetryImage, RequestStageImages,
    RequestStoreToken, RequestUnstageImage, ReviewFeedback,
};
use crate::review::files::{display_path, load_uploads};
use crate::review::queue::{extract_one, run_sequentially, QueueSink, QueueUpdate, UploadedImage};
use crate::review::resources::{BackendHandle, ReviewSession, SessionId};
use crate::review::verification::{execute_commit, CommitPlan};
use crate::settings::{credentials, ConsoleSettings};
use crate::ui::systems::SendEvent;

/// Delivers queue updates to the main thread as `ExtractionProgress` events.
pub struct MainThreadSink {
    ctx: TaskContext,
    session: SessionId,
}

impl MainThreadSink {
    pub fn new(ctx: TaskContext, session: SessionId) -> Self {
        Self { ctx, session }
    }

    async fn send<E: Event>(&mut self, event: E) {
        self.ctx
            .run_on_main_thread(move |world_ctx| {
                world_ctx.world.spawn(SendEvent::new(event));
            })
            .await;
    }
}

impl QueueSink for MainThreadSink {
    async fn push(&mut self, update: QueueUpdate) {
        let session = self.session;
        self.send(ExtractionProgress { session, update }).await;
    }
}

/// Builds the backend handle from settings and the stored token.
pub fn connect_backend(settings: &ConsoleSettings) -> BackendHandle {
    let token = match credentials::load_token() {
        Ok(Some(token)) => token,
        Ok(None) => {
            info!("No API token stored; processing is disabled until one is set.");
            return BackendHandle {
                client: None,
                status: "No token set".to_string(),
            };
        }
        Err(e) => {
            error!("Error reading API token: {}", e);
            return BackendHandle {
                client: None,
                status: "Keyring error".to_string(),
            };
        }
    };
    match BackendClient::new(&settings.api_base_url, token, settings.request_timeout()) {
        Ok(client) => {
            info!("Backend client ready for {}", client.base_url());
            BackendHandle {
                client: Some(Arc::new(client)),
                status: "Token set".to_string(),
            }
        }
        Err(e) => {
            error!("Could not create backend client: {}", e);
            BackendHandle {
                client: None,
                status: e.to_string(),
            }
        }
    }
}

pub fn init_backend_handle(mut commands: Commands, settings: Res<ConsoleSettings>) {
    commands.insert_resource(connect_backend(&settings));
}

pub fn handle_stage_images(
    mut events: EventReader<RequestStageImages>,
    mut session: ResMut<ReviewSession>,
    mut feedback: EventWriter<ReviewFeedback>,
) {
    for ev in events.read() {
        let (uploads, failures) = load_uploads(&ev.paths);
        for (path, err) in &failures {
            warn!("Could not read {}: {}", path.display(), err);
        }
        let added = session.stage(uploads);
        if let Some((path, err)) = failures.first() {
            feedback.write(ReviewFeedback::error(format!(
                "Added {} image(s); could not read {} file(s) (first: {}: {}).",
                added,
                failures.len(),
                display_path(path),
                err
            )));
        } else {
            feedback.write(ReviewFeedback::info(format!("Added {} image(s).", added)));
        }
    }
}

pub fn handle_unstage_image(
    mut events: EventReader<RequestUnstageImage>,
    mut session: ResMut<ReviewSession>,
) {
    for ev in events.read() {
        if !session.unstage(ev.id) {
            debug!("Unstage request for unknown image {}", ev.id);
        }
    }
}

pub fn handle_process_request(
    mut events: EventReader<RequestProcessImages>,
    mut session: ResMut<ReviewSession>,
    mut settings: ResMut<ConsoleSettings>,
    backend: Res<BackendHandle>,
    runtime: Res<TokioTasksRuntime>,
    mut feedback: EventWriter<ReviewFeedback>,
) {
    for ev in events.read() {
        let Some(client) = backend.client.clone() else {
            feedback.write(ReviewFeedback::error(ReviewError::MissingToken.to_string()));
            continue;
        };
        let (session_id, uploads) = match session.begin(&ev.project_id, Utc::now()) {
            Ok(started) => started,
            Err(refusal) => {
                feedback.write(ReviewFeedback::error(refusal.to_string()));
                continue;
            }
        };

        if settings.last_project_id != session.project_id {
            settings.last_project_id = session.project_id.clone();
            if let Err(e) = settings.save() {
                warn!("Could not persist last project id: {}", e);
            }
        }

        feedback.write(ReviewFeedback::info(format!(
            "Processing {} image(s)…",
            uploads.len()
        )));
        spawn_batch(
            &runtime,
            client,
            session_id,
            session.project_id.clone(),
            uploads,
            settings.inter_image_pause(),
        );
    }
}

fn spawn_batch(
    runtime: &TokioTasksRuntime,
    client: Arc<BackendClient>,
    session: SessionId,
    project_id: String,
    uploads: Vec<UploadedImage>,
    pause: Duration,
) {
    runtime.spawn_background_task(move |ctx| async move {
        let mut sink = MainThreadSink::new(ctx, session);
        let summary = run_sequentially(client.as_ref(), &project_id, &uploads, pause, &mut sink).await;
        sink.send(BatchFinished { session, summary }).await;
    });
}

pub fn handle_retry_request(
    mut events: EventReader<RequestRetryImage>,
    mut session: ResMut<ReviewSession>,
    backend: Res<BackendHandle>,
    runtime: Res<TokioTasksRuntime>,
    mut feedback: EventWriter<ReviewFeedback>,
) {
    for ev in events.read() {
        let Some(client) = backend.client.clone() else {
            feedback.write(ReviewFeedback::error(ReviewError::MissingToken.to_string()));
            continue;
        };
        let source = match session.begin_retry(ev.id) {
            Ok(source) => source,
            Err(e) => {
                warn!("Retry refused: {}", e);
                feedback.write(ReviewFeedback::error(format!("Cannot retry: {}", e)));
                continue;
            }
        };
        info!("Re-processing '{}'.", source.file_name);

        let session_id = session.id();
        let project_id = session.project_id.clone();
        runtime.spawn_background_task(move |ctx| async move {
            let update = extract_one(client.as_ref(), &project_id, &source).await;
            MainThreadSink::new(ctx, session_id).push(update).await;
        });
    }
}

pub fn handle_edit_request(
    mut events: EventReader<RequestEditCell>,
    mut session: ResMut<ReviewSession>,
    mut feedback: EventWriter<ReviewFeedback>,
) {
    for ev in events.read() {
        let session = &mut *session;
        let Some(image) = session.queue.get(ev.id) else {
            continue;
        };
        if let Err(e) = session
            .coordinator
            .record_edit(image, ev.row, ev.position, &ev.value)
        {
            feedback.write(ReviewFeedback::error(e.to_string()));
        }
    }
}

pub fn handle_commit_request(
    mut events: EventReader<RequestCommitImage>,
    mut session: ResMut<ReviewSession>,
    backend: Res<BackendHandle>,
    runtime: Res<TokioTasksRuntime>,
    mut feedback: EventWriter<ReviewFeedback>,
) {
    for ev in events.read() {
        let Some(client) = backend.client.clone() else {
            feedback.write(ReviewFeedback::error(ReviewError::MissingToken.to_string()));
            continue;
        };
        let session = &mut *session;
        let Some(image) = session.queue.get(ev.id) else {
            continue;
        };
        let plan = match session.coordinator.begin_commit(image, &session.project_id) {
            Ok(Some(plan)) => plan,
            Ok(None) => continue,
            Err(e) => {
                feedback.write(ReviewFeedback::error(e.to_string()));
                continue;
            }
        };
        spawn_commit(&runtime, client, session.id(), plan);
    }
}

fn spawn_commit(
    runtime: &TokioTasksRuntime,
    client: Arc<BackendClient>,
    session: SessionId,
    plan: CommitPlan,
) {
    runtime.spawn_background_task(move |ctx| async move {
        let result = execute_commit(client.as_ref(), &plan).await;
        MainThreadSink::new(ctx, session)
            .send(CommitFinished {
                session,
                image_id: plan.image_id,
                result,
            })
            .await;
    });
}

pub fn handle_close_request(
    mut events: EventReader<RequestCloseSession>,
    mut session: ResMut<ReviewSession>,
    mut feedback: EventWriter<ReviewFeedback>,
) {
    if events.read().last().is_some() {
        session.close();
        feedback.write(ReviewFeedback::info("Session closed."));
    }
}

pub fn handle_store_token(
    mut events: EventReader<RequestStoreToken>,
    mut backend: ResMut<BackendHandle>,
    settings: Res<ConsoleSettings>,
    mut feedback: EventWriter<ReviewFeedback>,
) {
    for ev in events.read() {
        match credentials::store_token(&ev.token) {
            Ok(()) => {
                *backend = connect_backend(&settings);
                feedback.write(ReviewFeedback::info(format!("API token: {}", backend.status)));
            }
            Err(e) => {
                error!("Storing API token failed: {}", e);
                feedback.write(ReviewFeedback::error(e.to_string()));
            }
        }
    }
}
