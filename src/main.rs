// src/main.rs

#![cfg_attr(all(not(debug_assertions), target_os = "windows"), windows_subsystem = "windows")]

use bevy::{
    log::LogPlugin,
    prelude::*,
    window::{PrimaryWindow, WindowPlugin},
    winit::{UpdateMode, WinitSettings},
};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;

use image::ImageFormat as CrateImageFormat;
use winit::window::Icon as WinitIcon;

use bevy_egui::EguiPlugin;
use bevy_tokio_tasks::TokioTasksPlugin;

mod cli;
mod review;
mod session_policy;
mod settings;
mod ui;

use review::ReviewPlugin;
use session_policy::SessionPolicyPlugin;
use settings::ConsoleSettings;
use ui::ConsoleUiPlugin;

const ICON_PATH: &str = "assets/icon.png";

fn main() -> ExitCode {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();

    let args = cli::Cli::parse();
    if let Some(command) = args.command {
        return match cli::run(command) {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    App::new()
        .insert_resource(WinitSettings {
            focused_mode: UpdateMode::Continuous,
            unfocused_mode: UpdateMode::reactive_low_power(Duration::from_secs_f32(1.0 / 5.0)),
        })
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "LabelGrid Console".into(),
                        ..default()
                    }),
                    ..default()
                })
                .set(LogPlugin {
                    level: bevy::log::Level::INFO,
                    filter: "wgpu=error,naga=warn,bevy_tokio_tasks=warn".to_string(),
                    ..default()
                }),
        )
        // Loaded after LogPlugin so failures are logged.
        .insert_resource(load_console_settings())
        .add_plugins(EguiPlugin {
            enable_multipass_for_primary_context: true,
        })
        .add_plugins(TokioTasksPlugin::default())
        .add_plugins(SessionPolicyPlugin)
        .add_plugins(ReviewPlugin)
        .add_plugins(ConsoleUiPlugin)
        .add_systems(Startup, set_window_icon)
        .run();

    ExitCode::SUCCESS
}

fn load_console_settings() -> ConsoleSettings {
    match ConsoleSettings::load() {
        Ok(settings) => {
            info!("Console settings loaded (backend: {}).", settings.api_base_url);
            settings
        }
        Err(e) => {
            error!("Failed to load console settings, using defaults: {}", e);
            let mut settings = ConsoleSettings::default();
            settings.apply_env_overrides(|key| std::env::var(key).ok());
            settings
        }
    }
}

fn set_window_icon(
    primary_window_query: Query<Entity, With<PrimaryWindow>>,
    windows: NonSend<bevy::winit::WinitWindows>,
) {
    let Ok(primary_entity) = primary_window_query.single() else {
        warn!("Could not find single primary window to set icon.");
        return;
    };

    let Some(primary_winit_window) = windows.get_window(primary_entity) else {
        warn!("Could not get winit window for primary window entity.");
        return;
    };

    let icon_bytes = match std::fs::read(ICON_PATH) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("No window icon at '{}': {}", ICON_PATH, e);
            return;
        }
    };
    let image_buffer = match image::load_from_memory_with_format(&icon_bytes, CrateImageFormat::Png) {
        Ok(image_data) => image_data.into_rgba8(),
        Err(e) => {
            warn!("Failed to decode window icon '{}': {}", ICON_PATH, e);
            return;
        }
    };
    let (width, height) = image_buffer.dimensions();
    match WinitIcon::from_rgba(image_buffer.into_raw(), width, height) {
        Ok(winit_icon) => {
            primary_winit_window.set_window_icon(Some(winit_icon));
            info!("Window icon set from {}", ICON_PATH);
        }
        Err(e) => warn!("Failed to create window icon: {:?}", e),
    }
}
