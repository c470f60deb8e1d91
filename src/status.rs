//! Profile status listing.

use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, Utc};
use log::warn;

use crate::store::ConfigStore;

/// One listing row, derived from the config, MFA and credentials stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub profile: String,
    pub region: Option<String>,
    pub mfa_configured: bool,
    pub key_configured: bool,
    pub token_present: bool,
    /// `YYYY-MM-DD HH:MM:SS` in the recorded offset, or the raw value if unparsable.
    pub expiration: Option<String>,
    pub expired: Option<bool>,
}

/// Builds one row per profile found in any of the three stores, sorted by name.
///
/// The set of profiles is the union of section names across the stores; a
/// name present in several stores yields a single row.
///
/// # Arguments
///
/// * `config` - Store of `~/.aws/config` (`region`, `mfa_serial`)
/// * `mfa` - Store of the MFA credentials file (`aws_access_key_id`)
/// * `credentials` - Store of `~/.aws/credentials` (`aws_session_token`,
///   `aws_session_token_expiration`)
/// * `now` - Capture time the expirations are compared against
///
/// # Returns
///
/// Rows in lexicographic profile order. A profile with no recorded expiration
/// has `expiration` and `expired` both `None`; otherwise it is expired unless
/// the expiration is strictly after `now`.
pub fn list_profiles(
    config: &ConfigStore,
    mfa: &ConfigStore,
    credentials: &ConfigStore,
    now: DateTime<Utc>,
) -> Vec<StatusRow> {
    let profiles: BTreeSet<String> = config
        .sections()
        .into_iter()
        .chain(mfa.sections())
        .chain(credentials.sections())
        .collect();

    profiles
        .into_iter()
        .map(|profile| {
            let (expiration, expired) =
                match credentials.get(&profile, "aws_session_token_expiration") {
                    None => (None, None),
                    Some(raw) => match parse_expiration(&raw) {
                        Some(dt) => (
                            Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
                            Some(dt.with_timezone(&Utc) <= now),
                        ),
                        None => {
                            warn!("Unrecognized expiration for profile {profile}: {raw}");
                            (Some(raw), None)
                        }
                    },
                };

            StatusRow {
                region: config.get(&profile, "region"),
                mfa_configured: config.has(&profile, "mfa_serial"),
                key_configured: mfa.has(&profile, "aws_access_key_id"),
                token_present: credentials.has(&profile, "aws_session_token"),
                expiration,
                expired,
                profile,
            }
        })
        .collect()
}

/// Accepts RFC 3339 (`+00:00` or `Z`) as well as compact `+0000` offsets.
fn parse_expiration(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}

fn flag(value: bool) -> &'static str {
    if value { "Y" } else { "N" }
}

/// Renders rows as a fixed-width table.
pub fn render_table(rows: &[StatusRow]) -> String {
    let mut out = String::from("\n");
    out.push_str(&format!(
        "|{:^22}|{:^11}|{:^5}|{:^11}|{:^7}|{:^21}|{:^9}|\n",
        "Profile name", "Region", "MFA", "AccessKey", "Token", "Expiration", "Expired"
    ));
    out.push_str(&format!(
        "|{}|{}|{}|{}|{}|{}|{}|\n",
        "-".repeat(22),
        "-".repeat(11),
        "-".repeat(5),
        "-".repeat(11),
        "-".repeat(7),
        "-".repeat(21),
        "-".repeat(9)
    ));
    for row in rows {
        out.push_str(&format!(
            "| {:21}|{:^11}|{:^5}|{:^11}|{:^7}|{:^21}|{:^9}|\n",
            row.profile,
            row.region.as_deref().unwrap_or(""),
            flag(row.mfa_configured),
            flag(row.key_configured),
            flag(row.token_present),
            row.expiration.as_deref().unwrap_or(""),
            row.expired.map(flag).unwrap_or(""),
        ));
    }
    out
}
