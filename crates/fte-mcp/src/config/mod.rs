//! Configuration loading and resolution.
//!
//! Everything here is read once at startup and never mutated afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use fte_dispatch::{MalformedPolicy, ToolError};

use crate::types::{McpError, McpResult};

/// Credential and identifier variables captured from the environment.
pub const CREDENTIAL_VARS: &[&str] = &[
    "GMAIL_ACCESS_TOKEN",
    "FACEBOOK_ACCESS_TOKEN",
    "FACEBOOK_PAGE_ID",
    "INSTAGRAM_BUSINESS_ACCOUNT_ID",
    "TWITTER_ACCESS_TOKEN",
    "XERO_ACCESS_TOKEN",
    "XERO_TENANT_ID",
    "XERO_BANK_ACCOUNT_CODE",
    "ODOO_DB",
    "ODOO_USERNAME",
    "ODOO_PASSWORD",
];

pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
pub const DEFAULT_META_GRAPH_BASE: &str = "https://graph.facebook.com/v18.0";
pub const DEFAULT_INSTAGRAM_GRAPH_BASE: &str = "https://graph.instagram.com/v18.0";
pub const DEFAULT_TWITTER_API_BASE: &str = "https://api.twitter.com/2";
pub const DEFAULT_XERO_API_BASE: &str = "https://api.xero.com/api.xro/2.0";
pub const DEFAULT_ODOO_URL: &str = "http://localhost:8069";

/// Vendor API base URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub gmail: String,
    pub meta_graph: String,
    pub instagram_graph: String,
    pub twitter: String,
    pub xero: String,
    pub odoo: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gmail: DEFAULT_GMAIL_API_BASE.to_string(),
            meta_graph: DEFAULT_META_GRAPH_BASE.to_string(),
            instagram_graph: DEFAULT_INSTAGRAM_GRAPH_BASE.to_string(),
            twitter: DEFAULT_TWITTER_API_BASE.to_string(),
            xero: DEFAULT_XERO_API_BASE.to_string(),
            odoo: DEFAULT_ODOO_URL.to_string(),
        }
    }
}

impl Endpoints {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let pick = |var: &str, default: &str| {
            lookup(var)
                .map(|v| v.trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        Self {
            gmail: pick("GMAIL_API_BASE", DEFAULT_GMAIL_API_BASE),
            meta_graph: pick("META_GRAPH_BASE", DEFAULT_META_GRAPH_BASE),
            instagram_graph: pick("INSTAGRAM_GRAPH_BASE", DEFAULT_INSTAGRAM_GRAPH_BASE),
            twitter: pick("TWITTER_API_BASE", DEFAULT_TWITTER_API_BASE),
            xero: pick("XERO_API_BASE", DEFAULT_XERO_API_BASE),
            odoo: pick("ODOO_URL", DEFAULT_ODOO_URL),
        }
    }

    /// Point every vendor at the same base URL. Used against local mock servers.
    pub fn all(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            gmail: base.clone(),
            meta_graph: base.clone(),
            instagram_graph: base.clone(),
            twitter: base.clone(),
            xero: base.clone(),
            odoo: base,
        }
    }
}

/// Process-wide adapter configuration.
#[derive(Debug, Clone, Default)]
pub struct AdapterConfig {
    credentials: HashMap<String, String>,
    pub endpoints: Endpoints,
    pub gmail_credentials_path: Option<PathBuf>,
}

impl AdapterConfig {
    /// Capture configuration from the process environment.
    pub fn from_env(gmail_credentials: Option<&str>) -> Self {
        let mut config = Self::from_lookup(|name| std::env::var(name).ok());
        config.gmail_credentials_path = Some(resolve_gmail_credentials_path(gmail_credentials));
        config
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let credentials = CREDENTIAL_VARS
            .iter()
            .filter_map(|&name| {
                lookup(name)
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (name.to_string(), v))
            })
            .collect();

        Self {
            credentials,
            endpoints: Endpoints::from_lookup(&lookup),
            gmail_credentials_path: None,
        }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let vars: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_gmail_credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.gmail_credentials_path = Some(path.into());
        self
    }

    pub fn credential(&self, name: &str) -> Option<&str> {
        self.credentials.get(name).map(String::as_str)
    }

    /// Like [`credential`](Self::credential), but a missing value is a tool failure.
    pub fn require(&self, name: &str) -> Result<&str, ToolError> {
        self.credential(name)
            .ok_or_else(|| ToolError::failed(format!("missing credential {name}")))
    }

    /// Names of captured credentials, for startup diagnostics. Values are never logged.
    pub fn configured(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.credentials.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Gmail access token: the token file first, then `GMAIL_ACCESS_TOKEN`.
    ///
    /// The file is re-read on each call so an external refresh takes effect.
    pub async fn gmail_token(&self) -> Option<String> {
        if let Some(path) = &self.gmail_credentials_path {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => match token_from_json(&text) {
                    Some(token) => return Some(token),
                    None => tracing::warn!(
                        "Gmail credentials at {} contain no access token",
                        path.display()
                    ),
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!("Gmail credentials not found at {}", path.display());
                }
                Err(e) => tracing::warn!("Error reading {}: {e}", path.display()),
            }
        }
        self.credential("GMAIL_ACCESS_TOKEN").map(str::to_string)
    }
}

fn token_from_json(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    value
        .get("access_token")
        .or_else(|| value.get("token"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolve the Gmail token file path.
pub fn resolve_gmail_credentials_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    for var in ["GMAIL_CREDENTIALS_PATH", "GMAIL_CREDENTIALS"] {
        if let Ok(env_path) = std::env::var(var) {
            if !env_path.is_empty() {
                return PathBuf::from(env_path);
            }
        }
    }

    default_gmail_credentials_path()
}

fn default_gmail_credentials_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(home).join(".gmail_token.json")
}

/// Load a `.env` file into the process environment.
///
/// An explicit file that cannot be read is a startup failure; a missing
/// `./.env` is not.
pub fn load_env_file(explicit: Option<&Path>) -> McpResult<()> {
    match explicit {
        Some(path) => {
            dotenvy::from_path(path)
                .map_err(|e| McpError::Config(format!("cannot load {}: {e}", path.display())))?;
            tracing::debug!("Loaded environment from {}", path.display());
        }
        None => {
            if let Ok(path) = dotenvy::dotenv() {
                tracing::debug!("Loaded environment from {}", path.display());
            }
        }
    }
    Ok(())
}

/// Malformed-line handling as selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MalformedMode {
    /// Answer a malformed line with an error response.
    Reject,
    /// Hold incomplete JSON until following lines complete it.
    Rebuffer,
}

impl MalformedMode {
    pub fn policy(self, max_pending_bytes: usize) -> MalformedPolicy {
        match self {
            MalformedMode::Reject => MalformedPolicy::Reject,
            MalformedMode::Rebuffer => MalformedPolicy::Rebuffer {
                max_bytes: max_pending_bytes,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_from_pairs() {
        let config = AdapterConfig::from_pairs([
            ("TWITTER_ACCESS_TOKEN", "tok"),
            ("XERO_TENANT_ID", "  "),
            ("UNRELATED", "x"),
        ]);
        assert_eq!(config.credential("TWITTER_ACCESS_TOKEN"), Some("tok"));
        assert_eq!(config.credential("XERO_TENANT_ID"), None);
        assert_eq!(config.configured(), vec!["TWITTER_ACCESS_TOKEN"]);
    }

    #[test]
    fn test_require_missing_is_failure() {
        let config = AdapterConfig::default();
        let err = config.require("XERO_ACCESS_TOKEN").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Tool execution failed: missing credential XERO_ACCESS_TOKEN"
        );
    }

    #[test]
    fn test_endpoint_overrides() {
        let config = AdapterConfig::from_pairs([("ODOO_URL", "https://erp.example.com/")]);
        assert_eq!(config.endpoints.odoo, "https://erp.example.com");
        assert_eq!(config.endpoints.xero, DEFAULT_XERO_API_BASE);
    }

    #[test]
    fn test_explicit_gmail_path_wins() {
        assert_eq!(
            resolve_gmail_credentials_path(Some("/tmp/token.json")),
            PathBuf::from("/tmp/token.json")
        );
    }

    #[test]
    fn test_token_from_json_variants() {
        assert_eq!(token_from_json(r#"{"access_token":"a"}"#).as_deref(), Some("a"));
        assert_eq!(token_from_json(r#"{"token":"b"}"#).as_deref(), Some("b"));
        assert_eq!(token_from_json(r#"{"refresh_token":"c"}"#), None);
        assert_eq!(token_from_json("not json"), None);
    }

    #[test]
    fn test_gmail_token_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"token": "from-file"}"#).unwrap();

        let config = AdapterConfig::from_pairs([("GMAIL_ACCESS_TOKEN", "from-env")])
            .with_gmail_credentials_path(&path);
        assert_eq!(
            tokio_test::block_on(config.gmail_token()).as_deref(),
            Some("from-file")
        );

        std::fs::write(&path, r#"{"refresh_token": "r"}"#).unwrap();
        assert_eq!(
            tokio_test::block_on(config.gmail_token()).as_deref(),
            Some("from-env")
        );
    }

    #[test]
    fn test_explicit_env_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_env_file(Some(&dir.path().join("absent.env"))).unwrap_err();
        assert!(matches!(err, McpError::Config(_)));

        let path = dir.path().join("adapter.env");
        std::fs::write(&path, "FTE_CONFIG_TEST_MARKER=loaded\n").unwrap();
        load_env_file(Some(&path)).unwrap();
        assert_eq!(std::env::var("FTE_CONFIG_TEST_MARKER").as_deref(), Ok("loaded"));
    }

    #[test]
    fn test_malformed_mode_policy() {
        assert_eq!(MalformedMode::Reject.policy(10), MalformedPolicy::Reject);
        assert_eq!(
            MalformedMode::Rebuffer.policy(10),
            MalformedPolicy::Rebuffer { max_bytes: 10 }
        );
    }
}
