use serde::Deserialize;

/// Temporary credentials returned by a session-token exchange.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CredentialRecord {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    #[serde(default)]
    pub expiration: Option<String>,
}

/// Body printed by `aws sts get-session-token --output json`.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSessionTokenOutput {
    credentials: CredentialRecord,
}

impl CredentialRecord {
    /// Extracts the nested `Credentials` object from an exchange response.
    pub fn from_response(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<GetSessionTokenOutput>(body).map(|out| out.credentials)
    }

    /// Key/value pairs in the fixed order used by both the credentials file and
    /// the exported environment, as `(ini key, env var, value)`.
    pub fn entries(&self) -> Vec<(&'static str, &'static str, &str)> {
        let mut entries = vec![
            ("aws_access_key_id", "AWS_ACCESS_KEY_ID", self.access_key_id.as_str()),
            ("aws_secret_access_key", "AWS_SECRET_ACCESS_KEY", self.secret_access_key.as_str()),
            ("aws_session_token", "AWS_SESSION_TOKEN", self.session_token.as_str()),
        ];
        if let Some(expiration) = &self.expiration {
            entries.push((
                "aws_session_token_expiration",
                "AWS_SESSION_TOKEN_EXPIRATION",
                expiration.as_str(),
            ));
        }
        entries
    }

    /// Renders `export KEY=VALUE` lines for a POSIX shell.
    pub fn render_export(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|(_, var, value)| format!("export {var}={}", shell_quote(value)))
            .collect()
    }
}

fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/+=:._-".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}
