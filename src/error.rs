//! Error kinds that terminate a run.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MfaError {
    /// The requested profile has no section in the config file.
    #[error("AWS profile {profile} not found at {}", path.display())]
    ProfileNotFound { profile: String, path: PathBuf },

    /// The profile exists but has no `mfa_serial` key.
    #[error("AWS profile {profile} does not have mfa_serial configured at {}", path.display())]
    MfaSerialMissing { profile: String, path: PathBuf },

    /// The session-token exchange did not produce usable credentials.
    #[error("Get session token for profile {profile} failed: {detail}")]
    ExchangeFailed { profile: String, detail: String },

    /// An INI file exists but could not be read, parsed or written.
    #[error("{}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, MfaError>;

impl MfaError {
    pub fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Store {
            path: path.into(),
            source,
        }
    }

    pub fn exchange(profile: &str, detail: impl Into<String>) -> Self {
        Self::ExchangeFailed {
            profile: profile.to_string(),
            detail: detail.into(),
        }
    }
}
