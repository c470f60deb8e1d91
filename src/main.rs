//! AWS MFA login tool
//!
//! Fetches temporary AWS session credentials for profiles protected by MFA.
//!
//! Three files are involved, each holding one section per profile:
//! 1. `~/.aws/config` provides the `mfa_serial` (and `region`) of a profile
//! 2. `~/.aws/mfa_credentials` holds the long-term keys allowed to call STS
//! 3. `~/.aws/credentials` receives the temporary session credentials
//!
//! A login resolves the MFA token (flag, 1Password or prompt), exchanges it for a
//! session token and either updates the credentials file or prints `export`
//! statements. `--list` shows every known profile and whether its session expired.

use std::io::{self, Write};

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use log::error;

mod cli;
mod credentials;
mod error;
mod exchange;
mod status;
mod store;
mod token;
mod updater;

#[cfg(all(test, unix))]
mod testing;

use cli::Args;
use exchange::{CredentialExchanger, MfaProfile};
use store::ConfigStore;
use token::OnePassword;
use updater::CredentialsUpdater;

#[tokio::main]
async fn main() {
    // INFO by default; RUST_LOG overrides. env_logger writes to stderr.
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = run(Args::parse(), &mut io::stdout()).await {
        // RUST_LOG=off must not silence the reason for a failed run
        if log::log_enabled!(log::Level::Error) {
            error!("{}", diagnostic(&e));
        } else {
            eprintln!("{}", diagnostic(&e));
        }
        std::process::exit(-1);
    }
}

/// Full error chain on one line, e.g. `outer: inner: root cause`.
fn diagnostic(e: &anyhow::Error) -> String {
    format!("{e:#}")
}

/// Runs one invocation of the tool.
///
/// In list mode the three files are loaded and the status table is written to
/// `out`. Otherwise the login workflow runs strictly in order: look up the
/// profile, resolve the MFA token, exchange it, then either persist the result
/// to the credentials file or write `export` lines to `out`.
///
/// # Arguments
///
/// * `args` - Parsed command line
/// * `out` - Destination for the table or the `export` lines (stdout in `main`)
///
/// # Returns
///
/// * `Ok(())` - Listing printed, credentials persisted or exported
/// * `Err(anyhow::Error)` - Wrapping an [`error::MfaError`] for a missing profile,
///   a missing `mfa_serial`, a failed exchange or an unwritable file; or an I/O
///   error while reading the token. Nothing is written to the credentials file
///   when the lookup or the exchange fails.
async fn run(args: Args, out: &mut impl Write) -> Result<()> {
    let paths = args.paths()?;

    if args.list {
        let config = ConfigStore::load(&paths.config)?;
        let mfa = ConfigStore::load(&paths.mfa)?;
        let credentials = ConfigStore::load(&paths.credentials)?;
        let rows = status::list_profiles(&config, &mfa, &credentials, Utc::now());
        writeln!(out, "{}", status::render_table(&rows))?;
        return Ok(());
    }

    let config = ConfigStore::load(&paths.config)?;
    let profile = MfaProfile::lookup(&config, &args.profile)?;

    let op = OnePassword::from_args(args.op_account, args.op_item_name);
    let token = token::resolve(args.token, &profile.name, op.as_ref())?;

    let record = CredentialExchanger::new(args.backend, &paths.mfa)
        .program(args.aws_cli)
        .timeout(std::time::Duration::from_secs(args.timeout))
        .duration(args.duration)
        .fetch(&profile, &token)
        .await?;

    if args.export {
        for line in record.render_export() {
            writeln!(out, "{line}")?;
        }
    } else {
        CredentialsUpdater::new(&paths.credentials).persist(&profile.name, &record)?;
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{fs, path::Path};

    use serial_test::serial;
    use tempfile::TempDir;

    use crate::{error::MfaError, testing::fake_aws};

    const RESPONSE: &str = r#"{"Credentials": {"AccessKeyId":"AKIAEXAMPLE","SecretAccessKey":"secret","SessionToken":"token","Expiration":"2030-01-01T00:00:00+00:00"}}"#;

    fn setup(dir: &Path) -> Vec<String> {
        fs::write(
            dir.join("config"),
            "[default]\nregion=us-east-1\nmfa_serial=arn:aws:iam::123:mfa/user\n",
        )
        .unwrap();
        fs::write(
            dir.join("mfa_credentials"),
            "[default]\naws_access_key_id=AKIALONGTERM\naws_secret_access_key=longterm\n",
        )
        .unwrap();
        let aws = fake_aws(dir, &format!("echo '{RESPONSE}'"));

        let path = |name: &str| dir.join(name).to_string_lossy().into_owned();
        vec![
            "awslogin".to_string(),
            "--config".to_string(),
            path("config"),
            "--mfa".to_string(),
            path("mfa_credentials"),
            "--aws".to_string(),
            path("credentials"),
            "--aws-cli".to_string(),
            aws.to_string_lossy().into_owned(),
            "--token".to_string(),
            "123456".to_string(),
        ]
    }

    fn args(base: &[String], extra: &[&str]) -> Args {
        let all = base.iter().map(String::as_str).chain(extra.iter().copied());
        Args::try_parse_from(all).unwrap()
    }

    #[tokio::test]
    #[serial]
    async fn test_login_persists_credentials() {
        let dir = TempDir::new().unwrap();
        let base = setup(dir.path());

        let mut out = Vec::new();
        run(args(&base, &[]), &mut out).await.unwrap();
        assert!(out.is_empty());

        let store = ConfigStore::load(dir.path().join("credentials")).unwrap();
        assert_eq!(store.get("default", "aws_access_key_id").as_deref(), Some("AKIAEXAMPLE"));
        assert_eq!(store.get("default", "aws_secret_access_key").as_deref(), Some("secret"));
        assert_eq!(store.get("default", "aws_session_token").as_deref(), Some("token"));
        assert_eq!(
            store.get("default", "aws_session_token_expiration").as_deref(),
            Some("2030-01-01T00:00:00+00:00")
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_login_export_does_not_write() {
        let dir = TempDir::new().unwrap();
        let base = setup(dir.path());

        let mut out = Vec::new();
        run(args(&base, &["--export"]), &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert_eq!(
            out.lines().collect::<Vec<_>>(),
            vec![
                "export AWS_ACCESS_KEY_ID=AKIAEXAMPLE",
                "export AWS_SECRET_ACCESS_KEY=secret",
                "export AWS_SESSION_TOKEN=token",
                "export AWS_SESSION_TOKEN_EXPIRATION=2030-01-01T00:00:00+00:00",
            ]
        );
        assert!(!dir.path().join("credentials").exists());
    }

    #[tokio::test]
    #[serial]
    async fn test_login_unknown_profile() {
        let dir = TempDir::new().unwrap();
        let base = setup(dir.path());

        let err = run(args(&base, &["--profile", "missing"]), &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MfaError>(),
            Some(MfaError::ProfileNotFound { .. })
        ));
        assert!(!dir.path().join("credentials").exists());
    }

    #[tokio::test]
    #[serial]
    async fn test_login_failed_exchange_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut base = setup(dir.path());
        fake_aws(dir.path(), "echo 'InvalidClientTokenId' >&2\nexit 255");
        base.push("--backend".to_string());
        base.push("cli".to_string());

        let err = run(args(&base, &[]), &mut Vec::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MfaError>(),
            Some(MfaError::ExchangeFailed { .. })
        ));
        assert!(!dir.path().join("credentials").exists());
    }

    #[test]
    fn test_diagnostic_includes_error_chain() {
        let err = anyhow::Error::new(MfaError::exchange("default", "AccessDenied"))
            .context("login failed");
        assert_eq!(
            diagnostic(&err),
            "login failed: Get session token for profile default failed: AccessDenied"
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_list_shows_expired_profile() {
        let dir = TempDir::new().unwrap();
        let base = setup(dir.path());
        fs::write(
            dir.path().join("credentials"),
            "[default]\naws_session_token=t\naws_session_token_expiration=2000-01-01T00:00:00+00:00\n",
        )
        .unwrap();

        let mut out = Vec::new();
        run(args(&base, &["--list"]), &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(
            "| default              | us-east-1 |  Y  |     Y     |   Y   | 2000-01-01 00:00:00 |    Y    |"
        ));
    }
}
