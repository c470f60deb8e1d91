//! Helpers shared by tests that spawn a stand-in for the AWS CLI.

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

/// Writes an executable `/bin/sh` script named `aws` into `dir`.
pub fn fake_aws(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("aws");
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}
