//! MFA token resolution.
//!
//! Tries, in order: the token given on the command line, a TOTP read from
//! 1Password through the `op` CLI, and finally an interactive prompt. The prompt
//! is written to stderr so `--export` output stays clean for `eval`.

use std::{
    io::{self, Write},
    process::Command,
};

use anyhow::{Result, ensure};
use log::{info, warn};

/// Where the 1Password TOTP for a profile lives.
pub struct OnePassword {
    pub account: String,
    pub item: String,
}

impl OnePassword {
    pub fn from_args(account: Option<String>, item: Option<String>) -> Option<Self> {
        match (account, item) {
            (Some(account), Some(item)) => Some(Self { account, item }),
            _ => None,
        }
    }

    fn read_otp(&self) -> Option<String> {
        let output = Command::new("op")
            .args(["item", "get", "--account", &self.account, &self.item, "--otp"])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let otp = String::from_utf8_lossy(&output.stdout).trim().to_string();
        is_otp(&otp).then_some(otp)
    }
}

/// Returns the MFA token for `profile`.
pub fn resolve(explicit: Option<String>, profile: &str, op: Option<&OnePassword>) -> Result<String> {
    if let Some(token) = explicit {
        return Ok(token.trim().to_string());
    }

    if let Some(op) = op {
        if let Some(otp) = op.read_otp() {
            info!("Retrieved MFA token from 1Password");
            return Ok(otp);
        }
        warn!("Failed to get token from 1Password, falling back to manual input");
    }

    prompt(profile)
}

fn prompt(profile: &str) -> Result<String> {
    eprint!("MFA token for profile {profile}: ");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let token = input.trim().to_string();
    ensure!(!token.is_empty(), "No MFA token entered");
    Ok(token)
}

/// Six ASCII digits.
fn is_otp(value: &str) -> bool {
    value.len() == 6 && value.chars().all(|c| c.is_ascii_digit())
}
