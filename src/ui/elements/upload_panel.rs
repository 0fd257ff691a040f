// src/ui/elements/upload_panel.rs
use bevy::prelude::*;
use bevy_egui::egui;

use crate::review::events::{
    RequestCloseSession, RequestProcessImages, RequestStageImages, RequestStoreToken,
    RequestUnstageImage,
};
use crate::review::queue::SUPPORTED_EXTENSIONS;
use crate::review::resources::{BackendHandle, ReviewSession};
use crate::ui::ConsoleUiState;

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{} KB", bytes.div_ceil(1024))
    }
}

#[allow(clippy::too_many_arguments)]
pub fn show_upload_panel(
    ctx: &egui::Context,
    ui_state: &mut ConsoleUiState,
    session: &ReviewSession,
    backend: &BackendHandle,
    stage_writer: &mut EventWriter<RequestStageImages>,
    unstage_writer: &mut EventWriter<RequestUnstageImage>,
    process_writer: &mut EventWriter<RequestProcessImages>,
    close_writer: &mut EventWriter<RequestCloseSession>,
) {
    egui::SidePanel::left("upload_panel")
        .resizable(true)
        .default_width(300.0)
        .show(ctx, |ui| {
            ui.heading("Label photos");
            ui.separator();

            ui.horizontal(|ui| {
                ui.label("Project ID:");
                ui.add_enabled(
                    !session.running,
                    egui::TextEdit::singleline(&mut ui_state.project_id_input)
                        .hint_text("shipment project")
                        .desired_width(f32::INFINITY),
                );
            });
            ui.horizontal(|ui| {
                ui.label("API token:");
                ui.label(backend.status.as_str());
                if ui.small_button("Change…").clicked() {
                    ui_state.show_token_popup = true;
                }
            });
            ui.separator();

            ui.add_enabled_ui(!session.running, |ui| {
                ui.horizontal(|ui| {
                    if ui.button("Add images…").clicked() {
                        if let Some(paths) = rfd::FileDialog::new()
                            .add_filter("Images", SUPPORTED_EXTENSIONS)
                            .set_title("Select container label photos")
                            .pick_files()
                        {
                            stage_writer.write(RequestStageImages { paths });
                        }
                    }
                    if ui.button("Add folder…").clicked() {
                        if let Some(folder) = rfd::FileDialog::new()
                            .set_title("Select a folder of label photos")
                            .pick_folder()
                        {
                            stage_writer.write(RequestStageImages {
                                paths: vec![folder],
                            });
                        }
                    }
                });
            });

            ui.label(format!("{} image(s) staged", session.staged.len()));
            egui::ScrollArea::vertical()
                .id_salt("staged_images")
                .max_height(ui.available_height() - 80.0)
                .show(ui, |ui| {
                    for upload in &session.staged {
                        ui.horizontal(|ui| {
                            if ui.small_button("✖").on_hover_text("Remove").clicked() {
                                unstage_writer.write(RequestUnstageImage { id: upload.id });
                            }
                            ui.label(upload.file_name.as_str());
                            ui.weak(format_size(upload.bytes.len()));
                        });
                    }
                });

            ui.separator();
            let can_process = !session.running
                && !session.staged.is_empty()
                && backend.client.is_some()
                && !ui_state.project_id_input.trim().is_empty();
            let process = ui
                .add_enabled(can_process, egui::Button::new("▶ Process"))
                .on_disabled_hover_text("Needs a project ID, an API token and at least one image");
            if process.clicked() {
                process_writer.write(RequestProcessImages {
                    project_id: ui_state.project_id_input.clone(),
                });
            }
            if session.has_images() && ui.button("Close session").clicked() {
                close_writer.write(RequestCloseSession);
            }
        });
}

pub fn show_token_popup(
    ctx: &egui::Context,
    ui_state: &mut ConsoleUiState,
    token_writer: &mut EventWriter<RequestStoreToken>,
) {
    if !ui_state.show_token_popup {
        return;
    }
    let mut is_window_open = true;
    let mut close_requested = false;

    egui::Window::new("API Token")
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .open(&mut is_window_open)
        .show(ctx, |ui| {
            ui.label("Bearer token for the shipment backend (stored in the OS keyring):");
            ui.add(
                egui::TextEdit::singleline(&mut ui_state.token_input)
                    .password(true)
                    .desired_width(f32::INFINITY),
            );
            ui.horizontal(|ui| {
                if ui.button("Save").clicked() && !ui_state.token_input.trim().is_empty() {
                    token_writer.write(RequestStoreToken {
                        token: ui_state.token_input.trim().to_string(),
                    });
                    close_requested = true;
                }
                if ui.button("Remove stored token").clicked() {
                    token_writer.write(RequestStoreToken {
                        token: String::new(),
                    });
                    close_requested = true;
                }
            });
        });

    if !is_window_open || close_requested {
        ui_state.token_input.clear();
        ui_state.show_token_popup = false;
    }
}
