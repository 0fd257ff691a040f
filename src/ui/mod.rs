// src/ui/mod.rs
use bevy::prelude::*;
use bevy_egui::EguiContextPass;

pub mod common;
pub mod elements;
pub mod systems;

use elements::console_ui;
use elements::previews::PreviewCache;
use systems::{clear_ui_feedback_on_session_change, handle_ui_feedback};

#[derive(Resource, Default, Debug, Clone)]
pub struct UiFeedbackState {
    pub last_message: String,
    pub is_error: bool,
}

/// Widget state that is not part of the review session.
#[derive(Resource, Default, Debug, Clone)]
pub struct ConsoleUiState {
    pub project_id_input: String,
    pub token_input: String,
    pub show_token_popup: bool,
}

pub struct ConsoleUiPlugin;

impl Plugin for ConsoleUiPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<UiFeedbackState>()
            .init_resource::<ConsoleUiState>()
            .init_resource::<PreviewCache>()
            .add_systems(Startup, elements::init_console_ui_state)
            .add_systems(
                Update,
                (clear_ui_feedback_on_session_change, handle_ui_feedback).chain(),
            )
            .add_systems(EguiContextPass, console_ui);

        info!("ConsoleUiPlugin initialized.");
    }
}
