// src/ui/common.rs
use bevy_egui::egui::{self, Color32, RichText};

use crate::review::duplicates::HighlightColor;
use crate::review::grid::ConfidenceLevel;
use crate::review::queue::{ImageStatus, ProcessedImage};

pub const MANUAL_EDIT_COLOR: Color32 = Color32::from_rgb(120, 170, 255);
pub const ATTENTION_COLOR: Color32 = Color32::from_rgb(240, 150, 40);

pub fn confidence_color(level: ConfidenceLevel) -> Color32 {
    match level {
        ConfidenceLevel::High => Color32::from_rgb(60, 170, 90),
        ConfidenceLevel::Medium => Color32::from_rgb(220, 170, 40),
        ConfidenceLevel::Low => Color32::from_rgb(210, 70, 60),
    }
}

pub fn highlight_color32(color: HighlightColor) -> Color32 {
    let [r, g, b] = color.to_rgb();
    Color32::from_rgb(r, g, b)
}

pub fn status_color(status: ImageStatus) -> Color32 {
    match status {
        ImageStatus::Pending => Color32::GRAY,
        ImageStatus::Processing => Color32::LIGHT_BLUE,
        ImageStatus::Completed => Color32::from_rgb(60, 170, 90),
        ImageStatus::Error => Color32::from_rgb(210, 70, 60),
    }
}

/// Status label, with a spinner while the image is being processed.
pub fn status_badge(ui: &mut egui::Ui, image: &ProcessedImage) {
    ui.horizontal(|ui| {
        if image.status == ImageStatus::Processing {
            ui.spinner();
        }
        let label = if image.retrying {
            "re-processing"
        } else {
            image.status.label()
        };
        ui.label(RichText::new(label).color(status_color(image.status)).strong());
    });
}

/// Small filled square used by the legends.
pub fn swatch(ui: &mut egui::Ui, color: Color32) {
    let (rect, _response) = ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
    ui.painter().rect_filled(rect, 2.0, color);
}
