pub use anyhow::Error as RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Couldn't access the option store.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't encode or decode an option record.\n{0}")]
    Json(#[from] serde_json::Error),

    #[error("Option store '{0}' does not hold a JSON object at its root")]
    Malformed(camino::Utf8PathBuf),
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Setting '{0}' is already registered")]
    Duplicate(String),

    #[error("Couldn't parse settings schema.\n{0}")]
    Schema(#[from] serde_json::Error),

    #[error("Couldn't render settings page.\n{0}")]
    Render(#[from] minijinja::Error),
}

/// Errors that can occur when compiling stylesheets.
#[cfg(feature = "grass")]
#[derive(Debug, Error)]
pub enum StyleError {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A Sass compilation error occurred.
    #[error("Sass compilation error: {0}")]
    Sass(#[from] Box<grass::Error>),

    /// Reading stored compiler settings failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Registering the compiler pages failed.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}
