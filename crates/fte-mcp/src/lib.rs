//! DigitalFTE adapter servers: vendor tool sets served over line-delimited JSON.

pub mod client;
pub mod config;
pub mod repl;
pub mod tools;
pub mod transport;
pub mod types;

pub use client::{ApiClient, ApiError, ApiRequest, HttpApiClient};
pub use config::{resolve_gmail_credentials_path, AdapterConfig};
pub use tools::{build_registry, Adapter, ToolContext};
pub use transport::StdioTransport;
