// src/ui/elements/mod.rs
use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts};

pub mod lock_screen;
pub mod previews;
pub mod processing_panel;
pub mod upload_panel;
pub mod verification_window;

use crate::review::events::{
    RequestCloseSession, RequestCommitImage, RequestEditCell, RequestProcessImages,
    RequestRetryImage, RequestStageImages, RequestStoreToken, RequestUnstageImage,
};
use crate::review::resources::{BackendHandle, ReviewSession};
use crate::session_policy::AccessGate;
use crate::settings::ConsoleSettings;
use crate::ui::{ConsoleUiState, UiFeedbackState};

use lock_screen::{show_lock_screen, show_policy_banner};
use previews::PreviewCache;
use processing_panel::show_processing_panel;
use upload_panel::{show_token_popup, show_upload_panel};
use verification_window::show_verification_window;

pub fn init_console_ui_state(mut state: ResMut<ConsoleUiState>, settings: Res<ConsoleSettings>) {
    if state.project_id_input.is_empty() {
        state.project_id_input = settings.last_project_id.clone();
    }
}

#[allow(clippy::too_many_arguments)]
pub fn console_ui(
    mut contexts: EguiContexts,
    mut ui_state: ResMut<ConsoleUiState>,
    mut session: ResMut<ReviewSession>,
    backend: Res<BackendHandle>,
    ui_feedback: Res<UiFeedbackState>,
    gate: Option<Res<AccessGate>>,
    mut previews: ResMut<PreviewCache>,
    mut stage_writer: EventWriter<RequestStageImages>,
    mut unstage_writer: EventWriter<RequestUnstageImage>,
    mut process_writer: EventWriter<RequestProcessImages>,
    mut retry_writer: EventWriter<RequestRetryImage>,
    mut edit_writer: EventWriter<RequestEditCell>,
    mut commit_writer: EventWriter<RequestCommitImage>,
    mut close_writer: EventWriter<RequestCloseSession>,
    mut token_writer: EventWriter<RequestStoreToken>,
) {
    let ctx = contexts.ctx_mut();

    if let Some(gate) = gate.as_ref() {
        let status = gate.policy.status();
        if show_lock_screen(ctx, status) {
            return;
        }
        show_policy_banner(ctx, status);
    }

    let session = &mut *session;
    previews.retain(|id| {
        session.queue.get(id).is_some() || session.staged.iter().any(|upload| upload.id == id)
    });

    show_token_popup(ctx, &mut ui_state, &mut token_writer);
    show_upload_panel(
        ctx,
        &mut ui_state,
        session,
        &backend,
        &mut stage_writer,
        &mut unstage_writer,
        &mut process_writer,
        &mut close_writer,
    );

    egui::TopBottomPanel::bottom("feedback_panel").show(ctx, |ui| {
        let text = if ui_feedback.last_message.is_empty() {
            egui::RichText::new("Ready").weak()
        } else if ui_feedback.is_error {
            egui::RichText::new(&ui_feedback.last_message).color(egui::Color32::RED)
        } else {
            egui::RichText::new(&ui_feedback.last_message)
        };
        ui.label(text);
    });

    egui::CentralPanel::default().show(ctx, |ui| {
        show_processing_panel(ui, session, &mut retry_writer);
    });

    show_verification_window(
        ctx,
        session,
        &mut previews,
        &mut edit_writer,
        &mut commit_writer,
        &mut close_writer,
    );
}
