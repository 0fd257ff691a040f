// src/settings/io.rs
use bevy::log::{debug, error, info};
use directories_next::ProjectDirs;
use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::PathBuf;

use super::SettingsError;

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "LabelGrid";
const APPLICATION: &str = "LabelGridConsole";
const CONFIG_FILE: &str = "console_settings.json";

pub fn config_path() -> Result<PathBuf, SettingsError> {
    let proj_dirs = ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION).ok_or_else(|| {
        SettingsError::Io("could not determine the platform config directory".to_string())
    })?;
    let config_dir = proj_dirs.config_dir();
    fs::create_dir_all(config_dir)?;
    Ok(config_dir.join(CONFIG_FILE))
}

/// Missing file yields defaults; an unreadable or malformed one is an error.
pub fn load_settings_from_file<T: for<'de> serde::Deserialize<'de> + Default>() -> Result<T, SettingsError> {
    let config_file = config_path()?;
    info!("Settings: loading from {:?}", config_file);
    match fs::File::open(&config_file) {
        Ok(file) => serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            error!("Settings: failed to parse {:?}: {}", config_file, e);
            SettingsError::Parse(e.to_string())
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Settings: no file at {:?}, using defaults.", config_file);
            Ok(T::default())
        }
        Err(e) => {
            error!("Settings: failed to open {:?}: {}", config_file, e);
            Err(e.into())
        }
    }
}

pub fn save_settings_to_file<T: serde::Serialize>(settings: &T) -> Result<(), SettingsError> {
    let config_file = config_path()?;
    debug!("Settings: saving to {:?}", config_file);
    let writer = BufWriter::new(fs::File::create(&config_file)?);
    serde_json::to_writer_pretty(writer, settings).map_err(|e| {
        error!("Settings: failed to serialize to {:?}: {}", config_file, e);
        SettingsError::Parse(e.to_string())
    })
}
