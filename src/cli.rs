//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::exchange::Backend;

/// AWS MFA login tool.
///
/// Exchanges an MFA token for temporary session credentials using the long-term
/// keys in the MFA credentials file, then writes them to the AWS credentials file
/// under the same profile (or prints them as `export` statements).
#[derive(Parser, Debug)]
#[command(name = "awslogin", author, version, about)]
pub struct Args {
    /// AWS profile to get the MFA serial for
    #[arg(short, long, default_value = "default")]
    pub profile: String,

    /// MFA token to log in with (prompted for if absent)
    #[arg(short, long)]
    pub token: Option<String>,

    /// Path to AWS config file [default: ~/.aws/config]
    #[arg(long, value_name = "CONFIG_FILE", env = "AWS_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Path to MFA credentials file [default: ~/.aws/mfa_credentials]
    #[arg(long, value_name = "MFA_FILE", env = "AWS_MFA_CREDENTIALS_FILE")]
    pub mfa: Option<PathBuf>,

    /// Path to AWS credentials file [default: ~/.aws/credentials]
    #[arg(long, value_name = "AWS_FILE", env = "AWS_SHARED_CREDENTIALS_FILE")]
    pub aws: Option<PathBuf>,

    /// Print export statements instead of updating the credentials file
    #[arg(long, conflicts_with = "list")]
    pub export: bool,

    /// List all profiles and their session status
    #[arg(long)]
    pub list: bool,

    /// Session duration in seconds (900-129600)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(900..=129600))]
    pub duration: Option<u32>,

    /// Seconds to wait for the session-token exchange
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// How to call STS
    #[arg(long, value_enum, default_value_t = Backend::Cli)]
    pub backend: Backend,

    /// AWS CLI executable used by the `cli` backend
    #[arg(long, env = "AWS_MFA_CLI", default_value = "aws")]
    pub aws_cli: PathBuf,

    /// 1Password account for automatic MFA token retrieval
    #[arg(long, env = "AWS_MFA_OP_ACCOUNT")]
    pub op_account: Option<String>,

    /// 1Password item name containing the TOTP
    #[arg(long, env = "AWS_MFA_OP_ITEM_NAME")]
    pub op_item_name: Option<String>,
}

/// The three files a run reads or writes.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config: PathBuf,
    pub mfa: PathBuf,
    pub credentials: PathBuf,
}

impl Args {
    /// Fills in `~/.aws/*` for any file not given explicitly.
    pub fn paths(&self) -> Result<Paths> {
        let aws_dir = || {
            dirs::home_dir()
                .map(|d| d.join(".aws"))
                .context("Could not determine home directory")
        };
        let resolve = |path: &Option<PathBuf>, name: &str| match path {
            Some(path) => Ok(path.clone()),
            None => aws_dir().map(|d| d.join(name)),
        };

        Ok(Paths {
            config: resolve(&self.config, "config")?,
            mfa: resolve(&self.mfa, "mfa_credentials")?,
            credentials: resolve(&self.aws, "credentials")?,
        })
    }
}
