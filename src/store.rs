//! INI-backed profile stores.
//!
//! The AWS config file, the MFA credentials file and the session credentials file
//! share one shape: a section per profile holding flat `key=value` pairs. Each is
//! loaded into its own [`ConfigStore`]; the three are never merged.

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use configparser::ini::Ini;
use log::debug;

use crate::error::{MfaError, Result};

/// Keys that appear before the first section header land here instead of in
/// configparser's `default` section, which would otherwise collide with the
/// `[default]` profile and be written back without a header.
const ORPHAN_SECTION: &str = "__orphan__";

/// Section prefix used by `~/.aws/config` for every profile except `default`.
const PROFILE_PREFIX: &str = "profile ";

/// One INI file, addressed by profile name.
///
/// Used for all three AWS files. Lookups never fail: a missing section or key is
/// simply `None`, so callers pick their own fallback.
pub struct ConfigStore {
    /// File the store was loaded from
    path: PathBuf,
    /// Parsed sections, in file order
    ini: Ini,
}

impl ConfigStore {
    /// Loads the INI file at `path` into a new store.
    ///
    /// Section and key names are case-sensitive. Whole-line `#` and `;` comments
    /// are skipped, but those characters inside a value are kept verbatim: secrets
    /// and `credential_process` commands may contain them, and the credentials file
    /// is rewritten from this parsed form.
    ///
    /// # Arguments
    ///
    /// * `path` - File to read. It does not have to exist.
    ///
    /// # Returns
    ///
    /// * `Ok(ConfigStore)` - The parsed file, or an empty store if the file is missing
    /// * `Err(MfaError::Store)` - The file exists but cannot be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let mut defaults = Ini::new_cs().defaults();
        defaults.enable_inline_comments = false;
        defaults.default_section = ORPHAN_SECTION.to_string();
        let mut ini = Ini::new_from_defaults(defaults);

        match fs::read_to_string(&path) {
            Ok(content) => {
                ini.read(content)
                    .map_err(|e| MfaError::store(&path, io::Error::new(ErrorKind::InvalidData, e)))?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} not found, using empty store", path.display());
            }
            Err(e) => return Err(MfaError::store(&path, e)),
        }

        Ok(Self { path, ini })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Profile names defined in this store, with any `profile ` prefix removed.
    pub fn sections(&self) -> Vec<String> {
        self.ini
            .sections()
            .into_iter()
            .filter(|s| s != ORPHAN_SECTION)
            .map(|s| match s.strip_prefix(PROFILE_PREFIX) {
                Some(name) => name.trim().to_string(),
                None => s,
            })
            .collect()
    }

    pub fn contains(&self, profile: &str) -> bool {
        self.section_name(profile).is_some()
    }

    /// Looks up `key` for `profile`; missing sections and keys both yield `None`.
    pub fn get(&self, profile: &str, key: &str) -> Option<String> {
        let section = self.section_name(profile)?;
        self.ini.get(&section, key)
    }

    pub fn has(&self, profile: &str, key: &str) -> bool {
        self.get(profile, key).is_some()
    }

    /// Replaces the whole section for `profile` with `entries`.
    pub fn replace_section(&mut self, profile: &str, entries: &[(&str, &str)]) {
        if let Some(section) = self.section_name(profile) {
            self.ini.remove_section(&section);
        }
        for (key, value) in entries {
            self.ini.set(profile, key, Some(value.to_string()));
        }
    }

    /// Serialized INI content of the store.
    pub fn render(&self) -> String {
        self.ini.writes()
    }

    fn section_name(&self, profile: &str) -> Option<String> {
        let sections = self.ini.sections();
        if sections.iter().any(|s| s == profile) {
            return Some(profile.to_string());
        }
        let prefixed = format!("{PROFILE_PREFIX}{profile}");
        sections.into_iter().find(|s| *s == prefixed)
    }
}
