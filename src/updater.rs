//! Session credentials file updates.
//!
//! Persisting a [`CredentialRecord`] replaces the profile's section in the
//! credentials file and leaves every other section untouched:
//!
//! ```ini
//! [default]
//! aws_access_key_id=ASIA...
//! aws_secret_access_key=...
//! aws_session_token=...
//! aws_session_token_expiration=2030-01-01T00:00:00+00:00
//! ```
//!
//! The read-modify-write runs under an exclusive advisory lock on a sibling
//! `.lock` file, and the new content is written to a temporary file in the same
//! directory before being renamed over the original, so an interrupted run never
//! leaves a truncated credentials file behind.

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use fs2::FileExt;
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::{
    credentials::CredentialRecord,
    error::{MfaError, Result},
    store::ConfigStore,
};

/// Writes session credentials into the AWS credentials file.
pub struct CredentialsUpdater {
    /// Path to the credentials file (typically ~/.aws/credentials)
    path: PathBuf,
}

impl CredentialsUpdater {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Upserts `record` under `profile`, rewriting the whole file.
    ///
    /// The previous section for `profile` is dropped entirely, so keys from an
    /// older session never linger next to the new ones. Sections of other
    /// profiles are written back with their values unchanged.
    ///
    /// # Arguments
    ///
    /// * `profile` - Section name to replace or create
    /// * `record` - Credentials returned by the session-token exchange
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The file now holds `record` under `profile`
    /// * `Err(MfaError::Store)` - The lock, the existing file or the rewrite failed;
    ///   the original file is left as it was
    ///
    /// # Errors
    ///
    /// A failure anywhere before the final rename leaves the credentials file
    /// untouched. Only the rename replaces it, and it does so in one step.
    pub fn persist(&self, profile: &str, record: &CredentialRecord) -> Result<()> {
        let dir = parent_dir(&self.path);
        fs::create_dir_all(dir).map_err(|e| MfaError::store(dir, e))?;

        let lock_path = lock_path(&self.path);
        let lock_file = File::create(&lock_path).map_err(|e| MfaError::store(&lock_path, e))?;
        lock_file
            .lock_exclusive()
            .map_err(|e| MfaError::store(&lock_path, e))?;
        debug!("Acquired lock {}", lock_path.display());

        let mut store = ConfigStore::load(&self.path)?;
        let entries: Vec<(&str, &str)> = record
            .entries()
            .into_iter()
            .map(|(key, _, value)| (key, value))
            .collect();
        store.replace_section(profile, &entries);
        self.write(&store.render())?;

        info!(
            "AWS credentials file {} for profile {profile} updated.",
            self.path.display()
        );
        // lock released when lock_file drops
        Ok(())
    }

    fn write(&self, content: &str) -> Result<()> {
        let dir = parent_dir(&self.path);
        // NamedTempFile is created with mode 0600 on Unix
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| MfaError::store(dir, e))?;
        tmp.write_all(content.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| MfaError::store(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| MfaError::store(&self.path, e.error))?;
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(key: &str) -> CredentialRecord {
        CredentialRecord {
            access_key_id: key.to_string(),
            secret_access_key: format!("{key}-secret"),
            session_token: format!("{key}-token"),
            expiration: Some("2030-01-01T00:00:00+00:00".to_string()),
        }
    }

    #[test]
    fn test_persist_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aws").join("credentials");
        CredentialsUpdater::new(&path).persist("default", &record("ASIA1")).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.sections(), vec!["default"]);
        assert_eq!(store.get("default", "aws_access_key_id").as_deref(), Some("ASIA1"));
        assert_eq!(store.get("default", "aws_secret_access_key").as_deref(), Some("ASIA1-secret"));
        assert_eq!(store.get("default", "aws_session_token").as_deref(), Some("ASIA1-token"));
        assert_eq!(
            store.get("default", "aws_session_token_expiration").as_deref(),
            Some("2030-01-01T00:00:00+00:00")
        );
    }

    #[test]
    fn test_persist_keeps_other_profiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(
            &path,
            "[prod]\naws_access_key_id=PROD\nregion_hint=us-east-1\n\n[default]\nlegacy=1\n",
        )
        .unwrap();

        CredentialsUpdater::new(&path).persist("default", &record("ASIA1")).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.get("prod", "aws_access_key_id").as_deref(), Some("PROD"));
        assert_eq!(store.get("prod", "region_hint").as_deref(), Some("us-east-1"));
        assert_eq!(store.get("default", "aws_access_key_id").as_deref(), Some("ASIA1"));
        assert_eq!(store.get("default", "legacy"), None);
    }

    #[test]
    fn test_persist_keeps_comment_chars_in_other_profiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(
            &path,
            "[prod]\naws_secret_access_key=ab#cd\ncredential_process=/bin/get-creds --x a;b\n",
        )
        .unwrap();

        CredentialsUpdater::new(&path).persist("default", &record("ASIA1")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("aws_secret_access_key=ab#cd"), "{content}");
        assert!(content.contains("credential_process=/bin/get-creds --x a;b"), "{content}");

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.get("prod", "aws_secret_access_key").as_deref(), Some("ab#cd"));
        assert_eq!(
            store.get("prod", "credential_process").as_deref(),
            Some("/bin/get-creds --x a;b")
        );
        assert_eq!(store.get("default", "aws_access_key_id").as_deref(), Some("ASIA1"));
    }

    #[test]
    fn test_persist_twice_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        let updater = CredentialsUpdater::new(&path);
        updater.persist("default", &record("FIRST")).unwrap();
        updater.persist("default", &record("SECOND")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("FIRST"));
        assert_eq!(content.matches("[default]").count(), 1);

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.get("default", "aws_access_key_id").as_deref(), Some("SECOND"));
        assert_eq!(store.get("default", "aws_session_token").as_deref(), Some("SECOND-token"));
    }

    #[test]
    fn test_persist_without_expiration_writes_three_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        let record = CredentialRecord {
            expiration: None,
            ..record("ASIA1")
        };
        CredentialsUpdater::new(&path).persist("dev", &record).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        assert!(store.has("dev", "aws_session_token"));
        assert!(!store.has("dev", "aws_session_token_expiration"));
    }

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path(Path::new("/home/u/.aws/credentials")),
            PathBuf::from("/home/u/.aws/credentials.lock")
        );
    }
}
