//! Session-token exchange.
//!
//! The default backend shells out to `aws sts get-session-token` with an
//! environment built from scratch for each call: every `AWS_*` variable of the
//! caller is dropped and `AWS_SHARED_CREDENTIALS_FILE` points at the MFA
//! credentials file, so the call authenticates with the long-lived device keys
//! and never with a session that happens to be exported in the shell.
//!
//! The `sdk` backend performs the same GetSessionToken call in-process through
//! `aws-sdk-sts`, using the long-lived keys read from the MFA credentials file.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use aws_config::Region;
use aws_sdk_sts::{Client, config::Credentials};
use aws_smithy_types::{date_time::Format, error::display::DisplayErrorContext};
use clap::ValueEnum;
use log::{debug, info};
use tokio::{process::Command, time::timeout};

use crate::{
    credentials::CredentialRecord,
    error::{MfaError, Result},
    store::ConfigStore,
};

const CREDENTIALS_FILE_VAR: &str = "AWS_SHARED_CREDENTIALS_FILE";

/// STS is global; any region resolves its endpoint.
const FALLBACK_REGION: &str = "us-east-1";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Run the AWS CLI as a subprocess
    #[default]
    Cli,
    /// Call STS through the AWS SDK
    Sdk,
}

/// The parts of a config profile needed to request a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaProfile {
    pub name: String,
    pub mfa_serial: String,
    pub region: Option<String>,
}

impl MfaProfile {
    /// Finds `profile` in the config store and reads its MFA device serial.
    ///
    /// # Arguments
    ///
    /// * `config` - Store loaded from the AWS config file
    /// * `profile` - Profile name, with or without the `profile ` section prefix
    ///
    /// # Returns
    ///
    /// * `Ok(MfaProfile)` - Name, `mfa_serial` and optional `region` of the profile
    /// * `Err(MfaError::ProfileNotFound)` - No section for `profile`
    /// * `Err(MfaError::MfaSerialMissing)` - The section has no `mfa_serial`
    ///
    /// The serial is taken as-is; device ARNs are not validated here.
    pub fn lookup(config: &ConfigStore, profile: &str) -> Result<Self> {
        if !config.contains(profile) {
            return Err(MfaError::ProfileNotFound {
                profile: profile.to_string(),
                path: config.path().to_path_buf(),
            });
        }
        let mfa_serial = config
            .get(profile, "mfa_serial")
            .ok_or_else(|| MfaError::MfaSerialMissing {
                profile: profile.to_string(),
                path: config.path().to_path_buf(),
            })?;

        Ok(Self {
            name: profile.to_string(),
            mfa_serial,
            region: config.get(profile, "region"),
        })
    }
}

/// Copies `base`, drops every `AWS_`-prefixed variable and points the shared
/// credentials file at `mfa_credentials`.
pub fn isolated_env<I, K, V>(base: I, mfa_credentials: &Path) -> BTreeMap<OsString, OsString>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<OsString>,
    V: Into<OsString>,
{
    let mut env: BTreeMap<OsString, OsString> = base
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        // bytewise, so non-UTF-8 names are caught too
        .filter(|(k, _)| !k.as_encoded_bytes().starts_with(b"AWS_"))
        .collect();
    env.insert(CREDENTIALS_FILE_VAR.into(), mfa_credentials.into());
    env
}

/// Exchanges an MFA token for temporary credentials.
///
/// Built with [`CredentialExchanger::new`] and configured through the chained
/// setters. It never writes files and never touches the process environment;
/// the only side effect is the STS call itself.
pub struct CredentialExchanger {
    /// How GetSessionToken is called
    backend: Backend,
    /// File holding the long-term keys (typically ~/.aws/mfa_credentials)
    mfa_credentials: PathBuf,
    /// AWS CLI executable for the `cli` backend
    program: OsString,
    /// Upper bound on the whole exchange
    timeout: Duration,
    /// Requested session lifetime in seconds; STS picks its default when unset
    duration: Option<u32>,
    /// Snapshot the child environment is derived from
    base_env: Vec<(OsString, OsString)>,
}

impl CredentialExchanger {
    pub fn new(backend: Backend, mfa_credentials: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            mfa_credentials: mfa_credentials.into(),
            program: "aws".into(),
            timeout: Duration::from_secs(30),
            duration: None,
            base_env: std::env::vars_os().collect(),
        }
    }

    pub fn program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn duration(mut self, duration: Option<u32>) -> Self {
        self.duration = duration;
        self
    }

    /// Replaces the environment the isolated child environment is derived from.
    pub fn base_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.base_env = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Exchanges `token` for temporary credentials of `profile`.
    ///
    /// With the `cli` backend this runs
    /// `aws sts get-session-token --profile P --serial-number S --token-code T --output json`
    /// in an isolated environment (see [`isolated_env`]) and parses the nested
    /// `Credentials` object of its JSON output. With the `sdk` backend the same
    /// call is made through `aws-sdk-sts`, signed with the long-term keys of
    /// `profile` in the MFA credentials file.
    ///
    /// # Arguments
    ///
    /// * `profile` - Result of [`MfaProfile::lookup`]
    /// * `token` - Current MFA code from the device
    ///
    /// # Returns
    ///
    /// * `Ok(CredentialRecord)` - Access key, secret key, session token and expiration
    /// * `Err(MfaError::ExchangeFailed)` - The call exited non-zero, timed out,
    ///   could not be started or returned a body without the expected keys
    /// * `Err(MfaError::Store)` - (`sdk` only) the MFA credentials file is unreadable
    ///
    /// Nothing is retried; the first failure is returned as is.
    pub async fn fetch(&self, profile: &MfaProfile, token: &str) -> Result<CredentialRecord> {
        info!(
            "Requesting session token for profile {} with {}",
            profile.name, profile.mfa_serial
        );
        match self.backend {
            Backend::Cli => self.fetch_cli(profile, token).await,
            Backend::Sdk => self.fetch_sdk(profile, token).await,
        }
    }

    async fn fetch_cli(&self, profile: &MfaProfile, token: &str) -> Result<CredentialRecord> {
        let env = isolated_env(self.base_env.iter().cloned(), &self.mfa_credentials);

        let mut cmd = Command::new(&self.program);
        cmd.args(["sts", "get-session-token", "--profile", &profile.name])
            .args(["--serial-number", &profile.mfa_serial])
            .args(["--token-code", token])
            .args(["--output", "json"]);
        if let Some(duration) = self.duration {
            cmd.arg("--duration-seconds").arg(duration.to_string());
        }
        cmd.env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(
            "Running {} sts get-session-token for {}",
            self.program.to_string_lossy(),
            profile.name
        );

        let child = cmd.spawn().map_err(|e| {
            MfaError::exchange(
                &profile.name,
                format!("failed to run {}: {e}", self.program.to_string_lossy()),
            )
        })?;
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| self.timed_out(profile))?
            .map_err(|e| MfaError::exchange(&profile.name, e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = format!("{}{}", stdout, stderr).trim().to_string();
            return Err(MfaError::exchange(
                &profile.name,
                format!("{} ({})", detail, output.status),
            ));
        }

        CredentialRecord::from_response(&stdout).map_err(|e| {
            MfaError::exchange(&profile.name, format!("unexpected response: {e}"))
        })
    }

    async fn fetch_sdk(&self, profile: &MfaProfile, token: &str) -> Result<CredentialRecord> {
        let mfa = ConfigStore::load(&self.mfa_credentials)?;
        let get = |key: &str| {
            mfa.get(&profile.name, key).ok_or_else(|| {
                MfaError::exchange(
                    &profile.name,
                    format!("missing {key} at {}", self.mfa_credentials.display()),
                )
            })
        };
        let credentials = Credentials::new(
            get("aws_access_key_id")?,
            get("aws_secret_access_key")?,
            None,
            None,
            "aws-mfa-login",
        );
        let region = profile
            .region
            .clone()
            .unwrap_or_else(|| FALLBACK_REGION.to_string());

        let config = aws_config::from_env()
            .credentials_provider(credentials)
            .region(Region::new(region))
            .load()
            .await;

        let mut request = Client::new(&config)
            .get_session_token()
            .serial_number(&profile.mfa_serial)
            .token_code(token);
        if let Some(duration) = self.duration {
            request = request.duration_seconds(duration as i32);
        }

        let session = timeout(self.timeout, request.send())
            .await
            .map_err(|_| self.timed_out(profile))?
            .map_err(|e| MfaError::exchange(&profile.name, DisplayErrorContext(e).to_string()))?
            .credentials()
            .cloned()
            .ok_or_else(|| MfaError::exchange(&profile.name, "no credentials returned"))?;

        let expiration = session
            .expiration()
            .fmt(Format::DateTime)
            .map_err(|e| MfaError::exchange(&profile.name, e.to_string()))?;

        Ok(CredentialRecord {
            access_key_id: session.access_key_id().to_string(),
            secret_access_key: session.secret_access_key().to_string(),
            session_token: session.session_token().to_string(),
            expiration: Some(expiration),
        })
    }

    fn timed_out(&self, profile: &MfaProfile) -> MfaError {
        MfaError::exchange(
            &profile.name,
            format!("no response after {}s", self.timeout.as_secs()),
        )
    }
}
