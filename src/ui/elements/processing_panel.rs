// src/ui/elements/processing_panel.rs
use bevy::prelude::*;
use bevy_egui::egui::{self, RichText};
use chrono::Utc;
use egui_extras::{Column, TableBuilder};

use crate::review::events::RequestRetryImage;
use crate::review::queue::ImageStatus;
use crate::review::resources::{format_processing_time, ReviewSession};
use crate::ui::common::{status_badge, status_color, ATTENTION_COLOR};

/// Queue overview: stats line and one table row per image.
pub fn show_processing_panel(
    ui: &mut egui::Ui,
    session: &mut ReviewSession,
    retry_writer: &mut EventWriter<RequestRetryImage>,
) {
    if session.queue.is_empty() {
        ui.centered_and_justified(|ui| {
            ui.weak("Stage label photos on the left, then press Process.");
        });
        return;
    }

    let stats = session.queue.stats();
    ui.horizontal_wrapped(|ui| {
        ui.strong(format!("Processed {} / {}", stats.processed, stats.total));
        if stats.errors > 0 {
            ui.colored_label(
                status_color(ImageStatus::Error),
                format!("{} failed", stats.errors),
            );
        }
        ui.separator();
        ui.label(format!("{} containers", stats.total_containers));
        ui.separator();
        ui.label(format!("avg confidence {}%", stats.average_confidence));
        if let Some(ms) = session.elapsed_ms(Utc::now()) {
            ui.separator();
            ui.label(format!("time {}", format_processing_time(ms)));
        }
        if session.running {
            ui.spinner();
        } else if session.queue.is_batch_complete() {
            ui.separator();
            ui.label("all images settled");
        }
    });

    let carousel = session.queue.carousel_ids();
    if !session.coordinator.is_open()
        && !carousel.is_empty()
        && ui.button("Open verification").clicked()
    {
        session.coordinator.open(&carousel);
    }
    ui.separator();

    let snapshot = session.queue.snapshot();
    let mut retry_requested = None;
    let mut jump_to = None;
    TableBuilder::new(ui)
        .striped(true)
        .column(Column::exact(28.0))
        .column(Column::remainder().at_least(160.0).clip(true))
        .column(Column::exact(130.0))
        .column(Column::exact(70.0))
        .column(Column::remainder().at_least(160.0).clip(true))
        .column(Column::exact(60.0))
        .header(22.0, |mut header| {
            for title in ["#", "File", "Status", "Attempts", "Detail", ""] {
                header.col(|ui| {
                    ui.strong(title);
                });
            }
        })
        .body(|mut body| {
            for (index, image) in snapshot.iter().enumerate() {
                body.row(22.0, |mut row| {
                    row.col(|ui| {
                        ui.label((index + 1).to_string());
                    });
                    row.col(|ui| {
                        if image.in_carousel() {
                            if session.coordinator.needs_attention(image.id) {
                                ui.colored_label(ATTENTION_COLOR, "●");
                            }
                            if ui.link(image.display_name()).on_hover_text("Show in verification").clicked() {
                                jump_to = Some(image.id);
                            }
                        } else {
                            ui.label(image.display_name());
                        }
                    });
                    row.col(|ui| status_badge(ui, image));
                    row.col(|ui| {
                        ui.label(image.attempts.to_string());
                    });
                    row.col(|ui| match (&image.error_message, &image.grid) {
                        (Some(message), _) => {
                            ui.label(RichText::new(message).color(status_color(ImageStatus::Error)))
                                .on_hover_text(message);
                        }
                        (None, Some(grid)) => {
                            ui.label(grid.describe());
                        }
                        (None, None) => {}
                    });
                    row.col(|ui| {
                        let can_retry = matches!(
                            image.status,
                            ImageStatus::Completed | ImageStatus::Error
                        ) && !image.retrying;
                        let committing = session.coordinator.is_committing(image.id);
                        if ui
                            .add_enabled(can_retry && !committing, egui::Button::new("⟳").small())
                            .on_hover_text("Re-process this image")
                            .on_disabled_hover_text(if committing {
                                "Saving verification…"
                            } else {
                                "Only completed or failed images can be re-processed"
                            })
                            .clicked()
                        {
                            retry_requested = Some(image.id);
                        }
                    });
                });
            }
        });

    if let Some(id) = jump_to {
        if !session.coordinator.is_open() {
            session.coordinator.open(&carousel);
        }
        session.coordinator.show(id, &carousel);
    }
    if let Some(id) = retry_requested {
        retry_writer.write(RequestRetryImage { id });
    }
}
