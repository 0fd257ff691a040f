// src/settings/credentials.rs
// Bearer token storage in the OS keyring.

use bevy::log::info;

use super::SettingsError;

pub const KEYRING_SERVICE_NAME: &str = "labelgrid_console";
pub const KEYRING_TOKEN_USERNAME: &str = "api_token";
/// Takes precedence over the keyring, for headless runs.
pub const ENV_API_TOKEN: &str = "LABELGRID_API_TOKEN";

fn entry() -> Result<keyring::Entry, SettingsError> {
    Ok(keyring::Entry::new(KEYRING_SERVICE_NAME, KEYRING_TOKEN_USERNAME)?)
}

/// `Ok(None)` when no token has been stored yet.
pub fn load_token() -> Result<Option<String>, SettingsError> {
    if let Some(token) = std::env::var(ENV_API_TOKEN).ok().filter(|t| !t.trim().is_empty()) {
        return Ok(Some(token));
    }
    match entry()?.get_password() {
        Ok(token) => Ok(Some(token)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn store_token(token: &str) -> Result<(), SettingsError> {
    let token = token.trim();
    let entry = entry()?;
    if token.is_empty() {
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(e.into()),
        }
        info!("API token removed from keyring.");
        return Ok(());
    }
    entry.set_password(token)?;
    info!("API token stored in keyring.");
    Ok(())
}
