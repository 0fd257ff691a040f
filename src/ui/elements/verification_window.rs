// src/ui/elements/verification_window.rs
use bevy::prelude::*;
use bevy_egui::egui::{self, Color32, RichText};

use crate::review::duplicates::{detect, DuplicateGroups};
use crate::review::events::{RequestCloseSession, RequestCommitImage, RequestEditCell};
use crate::review::grid::{CellIndex, ConfidenceLevel, ReviewGrid};
use crate::review::queue::ImageId;
use crate::review::resources::ReviewSession;
use crate::ui::common::{
    confidence_color, highlight_color32, swatch, ATTENTION_COLOR, MANUAL_EDIT_COLOR,
};
use crate::ui::elements::previews::PreviewCache;

const CELL_WIDTH: f32 = 110.0;
const PREVIEW_WIDTH: f32 = 360.0;
const MAGNIFIER_SIDE: f32 = 240.0;
const MAGNIFIER_ZOOM: f32 = 3.0;

enum Navigation {
    Previous,
    Next,
}

#[allow(clippy::too_many_arguments)]
pub fn show_verification_window(
    ctx: &egui::Context,
    session: &mut ReviewSession,
    previews: &mut PreviewCache,
    edit_writer: &mut EventWriter<RequestEditCell>,
    commit_writer: &mut EventWriter<RequestCommitImage>,
    close_writer: &mut EventWriter<RequestCloseSession>,
) {
    if !session.coordinator.is_open() {
        return;
    }
    let subset = session.queue.carousel_ids();
    let Some(current_id) = session.coordinator.current() else {
        return;
    };
    let Some(image) = session.queue.get(current_id).cloned() else {
        return;
    };
    let Some(grid) = session.coordinator.display_grid(&image) else {
        return;
    };

    let position = session.coordinator.current_index(&subset).map_or(0, |i| i + 1);
    let hint = session.coordinator.attention_direction(&subset);
    let committing = session.coordinator.is_committing(image.id);
    let read_only = image.is_read_only() || committing;
    let pending = session.coordinator.pending_count(image.id);
    let duplicates = detect(&grid);

    let mut navigation = None;
    let mut is_window_open = true;

    egui::Window::new("Verification")
        .id(egui::Id::new("verification_window"))
        .default_size([960.0, 640.0])
        .collapsible(false)
        .open(&mut is_window_open)
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.add_enabled_ui(subset.len() > 1, |ui| {
                    if ui.button("◀").clicked() {
                        navigation = Some(Navigation::Previous);
                    }
                    attention_dot(ui, hint.left);
                    ui.strong(format!("Image {} of {}", position, subset.len()));
                    attention_dot(ui, hint.right);
                    if ui.button("▶").clicked() {
                        navigation = Some(Navigation::Next);
                    }
                });
                ui.separator();
                ui.label(image.display_name());
                ui.weak(grid.describe());
            });
            if image.retrying {
                ui.colored_label(
                    Color32::YELLOW,
                    "Re-processing… the grid is read-only until the new result arrives.",
                );
            }
            ui.separator();

            ui.horizontal_top(|ui| {
                ui.vertical(|ui| {
                    ui.set_max_width(PREVIEW_WIDTH);
                    match previews.texture(ctx, &image.source) {
                        Some(texture) => {
                            let response = ui.add(
                                egui::Image::new(texture)
                                    .max_width(PREVIEW_WIDTH)
                                    .maintain_aspect_ratio(true)
                                    .sense(egui::Sense::hover()),
                            );
                            if let Some(pointer) = response.hover_pos() {
                                let lens = egui::Vec2::splat(MAGNIFIER_SIDE);
                                let uv = magnifier_uv(pointer, response.rect, lens, MAGNIFIER_ZOOM);
                                let shown = egui::vec2(
                                    uv.width() * response.rect.width(),
                                    uv.height() * response.rect.height(),
                                ) * MAGNIFIER_ZOOM;
                                response.on_hover_ui_at_pointer(|ui| {
                                    ui.add(egui::Image::new(texture).uv(uv).fit_to_exact_size(shown));
                                });
                            }
                            ui.weak("Hover the photo to magnify.");
                        }
                        None => {
                            ui.weak("No preview available");
                        }
                    }
                });
                ui.separator();
                ui.vertical(|ui| {
                    egui::ScrollArea::both()
                        .id_salt(("verification_grid_scroll", image.id))
                        .max_height(ui.available_height() - 120.0)
                        .show(ui, |ui| {
                            show_grid(ui, image.id, &grid, &duplicates, read_only, edit_writer);
                        });
                    ui.add_space(6.0);
                    show_duplicate_legend(ui, &duplicates);
                    show_confidence_legend(ui);
                });
            });

            ui.separator();
            ui.horizontal(|ui| {
                ui.label(format!("{} pending change(s)", pending));
                let complete = ui
                    .add_enabled(!read_only, egui::Button::new("✔ Complete Verification"))
                    .on_disabled_hover_text("Only completed, settled images can be verified");
                if complete.clicked() {
                    commit_writer.write(RequestCommitImage { id: image.id });
                }
                if committing {
                    ui.spinner();
                    ui.label("Saving…");
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Close").clicked() {
                        close_writer.write(RequestCloseSession);
                    }
                });
            });
        });

    if !is_window_open {
        close_writer.write(RequestCloseSession);
        return;
    }
    match navigation {
        Some(Navigation::Previous) => session.coordinator.previous(&subset),
        Some(Navigation::Next) => session.coordinator.next(&subset),
        None => {}
    }
}

/// Texture region under `pointer` when `image_rect` is enlarged `zoom` times
/// and viewed through a `lens`-sized window. Kept inside the texture at edges.
fn magnifier_uv(pointer: egui::Pos2, image_rect: egui::Rect, lens: egui::Vec2, zoom: f32) -> egui::Rect {
    let zoom = zoom.max(1.0);
    let axis = |pointer: f32, min: f32, extent: f32, lens: f32| {
        if extent <= 0.0 {
            return (0.0, 1.0);
        }
        let span = (lens / (extent * zoom)).min(1.0);
        let half = span / 2.0;
        let center = ((pointer - min) / extent).clamp(half, 1.0 - half);
        (center - half, center + half)
    };
    let (x0, x1) = axis(pointer.x, image_rect.min.x, image_rect.width(), lens.x);
    let (y0, y1) = axis(pointer.y, image_rect.min.y, image_rect.height(), lens.y);
    egui::Rect::from_min_max(egui::pos2(x0, y0), egui::pos2(x1, y1))
}

fn attention_dot(ui: &mut egui::Ui, visible: bool) {
    if visible {
        ui.label(RichText::new("●").color(ATTENTION_COLOR))
            .on_hover_text("A re-processed image has new results");
    }
}

fn show_grid(
    ui: &mut egui::Ui,
    id: ImageId,
    grid: &ReviewGrid,
    duplicates: &DuplicateGroups,
    read_only: bool,
    edit_writer: &mut EventWriter<RequestEditCell>,
) {
    egui::Grid::new(("verification_grid", id))
        .striped(false)
        .spacing([4.0, 4.0])
        .show(ui, |ui| {
            ui.label("");
            for position in 1..=grid.columns() {
                ui.strong(format!("P{}", position));
            }
            ui.end_row();

            for (r, cells) in grid.row_slices().enumerate() {
                ui.strong(format!("R{}", r + 1));
                for (c, cell) in cells.iter().enumerate() {
                    let mut text = cell.serial_number.clone();
                    let mut edit = egui::TextEdit::singleline(&mut text).desired_width(CELL_WIDTH);
                    if !cell.is_empty() {
                        let color = if cell.is_original {
                            confidence_color(cell.level())
                        } else {
                            MANUAL_EDIT_COLOR
                        };
                        edit = edit.text_color(color);
                    }
                    let group = duplicates.group_for(CellIndex::new(r, c));
                    if let Some(group) = group {
                        edit = edit.background_color(highlight_color32(group.color.tint()));
                    }

                    let response = ui.add_enabled(!read_only, edit);
                    let changed = response.changed();
                    let mut hover = if cell.is_original {
                        format!(
                            "Confidence {:.0}% ({})",
                            cell.confidence,
                            cell.level().label()
                        )
                    } else if cell.confidence > 0.0 {
                        "Manually edited".to_string()
                    } else {
                        "Not detected".to_string()
                    };
                    if let Some(group) = group {
                        hover.push_str(&format!(
                            "\nDuplicate #{} ({} cells)",
                            group.ordinal,
                            group.occurrences.len()
                        ));
                    }
                    response.on_hover_text(hover);

                    if changed {
                        edit_writer.write(RequestEditCell {
                            id,
                            row: cell.row,
                            position: cell.position,
                            value: text,
                        });
                    }
                }
                ui.end_row();
            }
        });
}

fn show_duplicate_legend(ui: &mut egui::Ui, duplicates: &DuplicateGroups) {
    if duplicates.is_empty() {
        ui.weak("No duplicate serial numbers.");
        return;
    }
    ui.label(
        RichText::new(format!(
            "{} duplicated serial(s) across {} cells",
            duplicates.len(),
            duplicates.duplicated_cells()
        ))
        .strong(),
    );
    ui.horizontal_wrapped(|ui| {
        for group in duplicates.groups() {
            swatch(ui, highlight_color32(group.color));
            ui.label(format!(
                "#{} {} ×{}",
                group.ordinal,
                group.serial_number,
                group.occurrences.len()
            ));
            ui.add_space(8.0);
        }
    });
}

fn show_confidence_legend(ui: &mut egui::Ui) {
    ui.horizontal_wrapped(|ui| {
        for level in [ConfidenceLevel::High, ConfidenceLevel::Medium, ConfidenceLevel::Low] {
            swatch(ui, confidence_color(level));
            ui.label(level.label());
            ui.add_space(8.0);
        }
        swatch(ui, MANUAL_EDIT_COLOR);
        ui.label("Manual edit");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo() -> egui::Rect {
        egui::Rect::from_min_size(egui::pos2(100.0, 50.0), egui::vec2(360.0, 240.0))
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn magnifier_centres_on_the_pointer() {
        let uv = magnifier_uv(photo().center(), photo(), egui::Vec2::splat(240.0), 3.0);
        assert!(approx(uv.center().x, 0.5) && approx(uv.center().y, 0.5));
        // 240 of 1080 zoomed points wide, 240 of 720 tall.
        assert!(approx(uv.width(), 240.0 / 1080.0));
        assert!(approx(uv.height(), 240.0 / 720.0));
    }

    #[test]
    fn magnifier_stays_inside_the_texture_at_corners() {
        let rect = photo();
        let top_left = magnifier_uv(rect.min, rect, egui::Vec2::splat(240.0), 3.0);
        assert!(approx(top_left.min.x, 0.0) && approx(top_left.min.y, 0.0));
        let bottom_right = magnifier_uv(rect.max, rect, egui::Vec2::splat(240.0), 3.0);
        assert!(approx(bottom_right.max.x, 1.0) && approx(bottom_right.max.y, 1.0));
    }

    #[test]
    fn magnifier_never_exceeds_the_whole_texture() {
        let tiny = egui::Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(40.0, 0.0));
        let uv = magnifier_uv(egui::pos2(20.0, 0.0), tiny, egui::Vec2::splat(240.0), 0.5);
        assert_eq!(uv, egui::Rect::from_min_max(egui::Pos2::ZERO, egui::pos2(1.0, 1.0)));
    }
}
