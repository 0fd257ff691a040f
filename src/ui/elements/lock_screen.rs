// src/ui/elements/lock_screen.rs
use bevy_egui::egui::{self, Color32, RichText};

use crate::session_policy::AccessStatus;

/// Full-window lock once the evaluation period is over. Returns true when
/// the rest of the console must not be drawn.
pub fn show_lock_screen(ctx: &egui::Context, status: AccessStatus) -> bool {
    let AccessStatus::Expired { days_ago } = status else {
        return false;
    };
    egui::CentralPanel::default().show(ctx, |ui| {
        ui.vertical_centered(|ui| {
            ui.add_space(ui.available_height() / 3.0);
            ui.heading(RichText::new("Evaluation period expired").color(Color32::from_rgb(210, 70, 60)));
            ui.add_space(8.0);
            ui.label(format!(
                "Access ended {} day{} ago. Contact your administrator to extend it.",
                days_ago,
                if days_ago == 1 { "" } else { "s" }
            ));
        });
    });
    true
}

pub fn show_policy_banner(ctx: &egui::Context, status: AccessStatus) {
    let Some(text) = status.banner() else {
        return;
    };
    let color = match status {
        AccessStatus::GracePeriod { .. } => Color32::from_rgb(230, 110, 50),
        _ => Color32::from_rgb(220, 170, 40),
    };
    egui::TopBottomPanel::top("policy_banner").show(ctx, |ui| {
        ui.label(RichText::new(text).color(color).strong());
    });
}
