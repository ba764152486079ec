//! Shared helpers for fte-mcp integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use fte_dispatch::{Dispatcher, JsonMap};
use fte_mcp::client::{ApiClient, ApiError, ApiRequest};
use fte_mcp::config::{AdapterConfig, Endpoints};
use fte_mcp::tools::{build_registry, Adapter, ToolContext};

pub const BASE: &str = "https://vendor.test";

/// Records every outbound request and answers from a queue (default `{}`).
#[derive(Default)]
pub struct FakeClient {
    requests: Mutex<Vec<ApiRequest>>,
    responses: Mutex<VecDeque<Result<Value, ApiError>>>,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, value: Value) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn fail(&self, error: ApiError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request(&self, index: usize) -> ApiRequest {
        self.requests()
            .get(index)
            .cloned()
            .unwrap_or_else(|| panic!("no request #{index} was made"))
    }
}

#[async_trait]
impl ApiClient for FakeClient {
    async fn call(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }
}

/// Context with every vendor pointed at [`BASE`].
pub fn context(client: Arc<FakeClient>, vars: &[(&str, &str)]) -> ToolContext {
    let config = AdapterConfig::from_pairs(vars.iter().copied()).with_endpoints(Endpoints::all(BASE));
    ToolContext::new(client, Arc::new(config))
}

pub fn context_with(client: Arc<FakeClient>, config: AdapterConfig) -> ToolContext {
    ToolContext::new(client, Arc::new(config.with_endpoints(Endpoints::all(BASE))))
}

pub fn dispatcher(adapter: Adapter, ctx: &ToolContext) -> Dispatcher {
    Dispatcher::new(Arc::new(build_registry(adapter, ctx).unwrap()))
}

pub fn input(value: Value) -> JsonMap {
    value.as_object().cloned().expect("input must be an object")
}
