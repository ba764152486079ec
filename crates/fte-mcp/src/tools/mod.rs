//! Vendor tool sets.
//!
//! Each vendor module publishes its descriptors and registers one handler
//! per tool against a shared [`ToolContext`].

pub mod gmail;
pub mod meta;
pub mod odoo;
pub mod twitter;
pub mod xero;

use std::future::Future;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use fte_dispatch::{handler_fn, DispatchResult, JsonMap, ToolError, ToolHandler, ToolRegistry, ToolResult};

use crate::client::ApiClient;
use crate::config::AdapterConfig;

/// Everything a handler needs besides its input.
#[derive(Clone)]
pub struct ToolContext {
    pub client: Arc<dyn ApiClient>,
    pub config: Arc<AdapterConfig>,
}

impl ToolContext {
    pub fn new(client: Arc<dyn ApiClient>, config: Arc<AdapterConfig>) -> Self {
        Self { client, config }
    }
}

/// The adapter processes this binary can run as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Adapter {
    Gmail,
    Meta,
    Twitter,
    Xero,
    Odoo,
}

impl Adapter {
    pub const ALL: [Adapter; 5] = [
        Adapter::Gmail,
        Adapter::Meta,
        Adapter::Twitter,
        Adapter::Xero,
        Adapter::Odoo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Adapter::Gmail => "gmail",
            Adapter::Meta => "meta",
            Adapter::Twitter => "twitter",
            Adapter::Xero => "xero",
            Adapter::Odoo => "odoo",
        }
    }
}

impl std::fmt::Display for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the registry for one adapter.
pub fn build_registry(adapter: Adapter, ctx: &ToolContext) -> DispatchResult<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    match adapter {
        Adapter::Gmail => gmail::register(&mut registry, ctx)?,
        Adapter::Meta => meta::register(&mut registry, ctx)?,
        Adapter::Twitter => twitter::register(&mut registry, ctx)?,
        Adapter::Xero => xero::register(&mut registry, ctx)?,
        Adapter::Odoo => odoo::register(&mut registry, ctx)?,
    }
    tracing::debug!(adapter = %adapter, tools = registry.len(), "Registry built");
    Ok(registry)
}

/// Bind an `async fn(ToolContext, JsonMap)` to a context.
pub(crate) fn bind<F, Fut>(ctx: &ToolContext, f: F) -> impl ToolHandler + 'static
where
    F: Fn(ToolContext, JsonMap) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ToolResult> + Send + 'static,
{
    let ctx = ctx.clone();
    handler_fn(move |input| f(ctx.clone(), input))
}

/// Decode tool input into its parameter struct.
pub(crate) fn decode<T: DeserializeOwned>(input: JsonMap) -> Result<T, ToolError> {
    Ok(serde_json::from_value(Value::Object(input))?)
}

/// A `limit` input as a result count. Absent, zero or negative values
/// give `default`; fractions truncate.
pub(crate) fn limit_or(value: Option<f64>, default: usize) -> usize {
    match value {
        Some(n) if n >= 1.0 => n as usize,
        _ => default,
    }
}

/// Current UTC time, ISO-8601 with milliseconds.
pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Today plus `days`, as `YYYY-MM-DD`.
pub(crate) fn days_from_today(days: i64) -> String {
    (Utc::now() + chrono::Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_limit_or() {
        assert_eq!(limit_or(None, 10), 10);
        assert_eq!(limit_or(Some(5.0), 10), 5);
        assert_eq!(limit_or(Some(7.9), 10), 7);
        assert_eq!(limit_or(Some(0.0), 10), 10);
        assert_eq!(limit_or(Some(-3.0), 10), 10);
    }

    #[derive(Debug, Deserialize)]
    struct Params {
        text: String,
        #[serde(default)]
        reply_to: Option<String>,
    }

    #[test]
    fn test_decode_params() {
        let input = json!({"text": "hi"}).as_object().cloned().unwrap();
        let params: Params = decode(input).unwrap();
        assert_eq!(params.text, "hi");
        assert!(params.reply_to.is_none());
    }

    #[test]
    fn test_decode_failure_is_invalid_input() {
        let input = json!({"text": 5}).as_object().cloned().unwrap();
        let err = decode::<Params>(input).unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }

    #[test]
    fn test_now_iso_shape() {
        let ts = now_iso();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_adapter_names() {
        let names: Vec<&str> = Adapter::ALL.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["gmail", "meta", "twitter", "xero", "odoo"]);
    }
}
