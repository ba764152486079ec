//! Gmail tools.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{SecondsFormat, TimeZone, Utc};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};

use fte_dispatch::{DispatchResult, JsonMap, ToolDescriptor, ToolError, ToolRegistry, ToolResult};

use super::{bind, decode, limit_or, now_iso, ToolContext};
use crate::client::ApiRequest;

pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) -> DispatchResult<()> {
    registry.register(send_email_definition(), bind(ctx, send_email))?;
    registry.register(get_emails_definition(), bind(ctx, get_emails))?;
    registry.register(delete_email_definition(), bind(ctx, delete_email))?;
    registry.register(mark_read_definition(), bind(ctx, mark_read))?;
    Ok(())
}

async fn access_token(ctx: &ToolContext) -> Result<String, ToolError> {
    ctx.config
        .gmail_token()
        .await
        .ok_or_else(|| ToolError::failed("Gmail credentials not configured"))
}

#[derive(Debug, Deserialize)]
struct SendEmailParams {
    to: String,
    subject: String,
    body: String,
    #[serde(default)]
    cc: Vec<String>,
    #[serde(default)]
    bcc: Vec<String>,
}

pub fn send_email_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "send_email",
        "Send an email via Gmail API",
        json!({
            "type": "object",
            "properties": {
                "to": { "type": "string", "description": "Recipient email address" },
                "subject": { "type": "string", "description": "Email subject line" },
                "body": { "type": "string", "description": "Email body (plain text)" },
                "cc": { "type": "array", "items": { "type": "string" }, "description": "CC recipients" },
                "bcc": { "type": "array", "items": { "type": "string" }, "description": "BCC recipients" }
            },
            "required": ["to", "subject", "body"]
        }),
    )
}

/// Build the RFC 2822 message Gmail expects in `raw`.
fn compose_message(params: &SendEmailParams) -> String {
    let mut lines = vec!["From: me".to_string(), format!("To: {}", params.to)];
    if !params.cc.is_empty() {
        lines.push(format!("Cc: {}", params.cc.join(",")));
    }
    if !params.bcc.is_empty() {
        lines.push(format!("Bcc: {}", params.bcc.join(",")));
    }
    lines.push(format!("Subject: {}", params.subject));
    lines.push(String::new());
    lines.push(params.body.clone());
    lines.join("\r\n")
}

async fn send_email(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: SendEmailParams = decode(input)?;
    let token = access_token(&ctx).await?;

    let raw = URL_SAFE.encode(compose_message(&params));
    let url = format!("{}/messages/send", ctx.config.endpoints.gmail);
    let response = ctx
        .client
        .call(ApiRequest::post(url, json!({ "raw": raw })).bearer(&token))
        .await?;

    Ok(json!({
        "status": "sent",
        "message_id": response.get("id").cloned().unwrap_or(Value::Null),
        "to": params.to,
        "subject": params.subject,
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct GetEmailsParams {
    #[serde(default = "default_query")]
    query: String,
    #[serde(default)]
    limit: Option<f64>,
}

fn default_query() -> String {
    "is:unread".to_string()
}

const DEFAULT_EMAIL_LIMIT: usize = 10;

pub fn get_emails_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_emails",
        "Retrieve emails matching criteria",
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Gmail query (e.g., \"is:unread\")" },
                "limit": { "type": "number", "description": "Max emails to return", "default": 10 }
            }
        }),
    )
}

async fn get_emails(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: GetEmailsParams = decode(input)?;
    let limit = limit_or(params.limit, DEFAULT_EMAIL_LIMIT);
    let token = access_token(&ctx).await?;
    let base = &ctx.config.endpoints.gmail;

    let listing = ctx
        .client
        .call(
            ApiRequest::get(format!("{base}/messages"))
                .query("q", &params.query)
                .query("maxResults", limit)
                .bearer(&token),
        )
        .await?;

    let ids: Vec<String> = listing
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|m| m.get("id").and_then(Value::as_str))
                .take(limit)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let details = ids.iter().map(|id| {
        let request = ApiRequest::get(format!("{base}/messages/{id}"))
            .query("format", "metadata")
            .bearer(&token);
        let client = ctx.client.clone();
        async move {
            match client.call(request).await {
                Ok(detail) => summarize_message(id, &detail),
                Err(e) => json!({ "id": id, "error": e.to_string() }),
            }
        }
    });
    let emails = join_all(details).await;

    Ok(json!({
        "count": emails.len(),
        "emails": emails,
        "limit": limit,
        "query_used": params.query
    }))
}

fn summarize_message(id: &str, detail: &Value) -> Value {
    let header = |name: &str| {
        detail
            .pointer("/payload/headers")
            .and_then(Value::as_array)
            .and_then(|headers| {
                headers
                    .iter()
                    .find(|h| h.get("name").and_then(Value::as_str) == Some(name))
            })
            .and_then(|h| h.get("value"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let timestamp = detail
        .get("internalDate")
        .and_then(Value::as_str)
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true));

    json!({
        "id": id,
        "from": header("From").unwrap_or_else(|| "unknown".to_string()),
        "subject": header("Subject").unwrap_or_else(|| "(no subject)".to_string()),
        "timestamp": timestamp
    })
}

#[derive(Debug, Deserialize)]
struct MessageParams {
    message_id: String,
}

fn message_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "message_id": { "type": "string", "description": "Gmail message ID" }
        },
        "required": ["message_id"]
    })
}

pub fn delete_email_definition() -> ToolDescriptor {
    ToolDescriptor::new("delete_email", "Delete an email permanently", message_schema())
}

async fn delete_email(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: MessageParams = decode(input)?;
    let token = access_token(&ctx).await?;

    let url = format!("{}/messages/{}", ctx.config.endpoints.gmail, params.message_id);
    ctx.client.call(ApiRequest::delete(url).bearer(&token)).await?;

    Ok(json!({
        "status": "deleted",
        "message_id": params.message_id,
        "timestamp": now_iso()
    }))
}

pub fn mark_read_definition() -> ToolDescriptor {
    ToolDescriptor::new("mark_read", "Mark email as read", message_schema())
}

async fn mark_read(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: MessageParams = decode(input)?;
    let token = access_token(&ctx).await?;

    let url = format!(
        "{}/messages/{}/modify",
        ctx.config.endpoints.gmail, params.message_id
    );
    ctx.client
        .call(ApiRequest::post(url, json!({ "removeLabelIds": ["UNREAD"] })).bearer(&token))
        .await?;

    Ok(json!({
        "status": "marked_read",
        "message_id": params.message_id,
        "timestamp": now_iso()
    }))
}
