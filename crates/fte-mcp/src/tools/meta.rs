//! Meta Graph tools: Facebook Pages and Instagram Business accounts.

use chrono::DateTime;
use serde::Deserialize;
use serde_json::{json, Value};

use fte_dispatch::{DispatchResult, JsonMap, ToolDescriptor, ToolError, ToolRegistry, ToolResult};

use super::{bind, decode, now_iso, ToolContext};
use crate::client::ApiRequest;

const INSTAGRAM_METRICS: &[&str] = &["impressions", "reach", "profile_views", "follower_count"];
const MEDIA_METRICS: &str = "engagement,impressions,reach,saved";
const PAGE_METRICS: &str = "page_views,page_impressions,page_fans,post_impressions";

pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) -> DispatchResult<()> {
    registry.register(post_facebook_definition(), bind(ctx, post_facebook))?;
    registry.register(post_instagram_definition(), bind(ctx, post_instagram))?;
    registry.register(schedule_facebook_definition(), bind(ctx, schedule_facebook))?;
    registry.register(
        get_instagram_insights_definition(),
        bind(ctx, get_instagram_insights),
    )?;
    registry.register(get_media_insights_definition(), bind(ctx, get_media_insights))?;
    registry.register(get_page_insights_definition(), bind(ctx, get_page_insights))?;
    registry.register(check_auth_definition(), bind(ctx, check_auth))?;
    Ok(())
}

fn access_token(ctx: &ToolContext) -> Result<&str, ToolError> {
    ctx.config.require("FACEBOOK_ACCESS_TOKEN")
}

/// Explicit id from the input, else the configured default.
fn resolve_id(ctx: &ToolContext, explicit: Option<String>, var: &str) -> Result<String, ToolError> {
    match explicit.filter(|id| !id.is_empty()) {
        Some(id) => Ok(id),
        None => ctx.config.require(var).map(str::to_string),
    }
}

fn id_of(response: &Value) -> Value {
    response.get("id").cloned().unwrap_or(Value::Null)
}

#[derive(Debug, Deserialize)]
struct PostFacebookParams {
    #[serde(default)]
    page_id: Option<String>,
    message: String,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    link_url: Option<String>,
}

pub fn post_facebook_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "post_facebook",
        "Post a message to a Facebook Page",
        json!({
            "type": "object",
            "properties": {
                "page_id": { "type": "string", "description": "Facebook Page ID" },
                "message": { "type": "string", "description": "Post message" },
                "image_url": { "type": "string", "description": "Image URL (optional)" },
                "link_url": { "type": "string", "description": "Link URL (optional)" }
            },
            "required": ["message"]
        }),
    )
}

async fn post_facebook(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: PostFacebookParams = decode(input)?;
    let token = access_token(&ctx)?;
    let page_id = resolve_id(&ctx, params.page_id, "FACEBOOK_PAGE_ID")?;

    let mut body = json!({ "message": params.message, "access_token": token });
    if let Some(image_url) = &params.image_url {
        body["picture"] = json!(image_url);
        body["link"] = json!(params.link_url.as_deref().unwrap_or(image_url));
    }

    let url = format!("{}/{page_id}/feed", ctx.config.endpoints.meta_graph);
    let response = ctx.client.call(ApiRequest::post(url, body)).await?;
    let post_id = id_of(&response);

    Ok(json!({
        "success": true,
        "post_id": post_id,
        "platform": "facebook",
        "message": format!("Posted to Facebook successfully (ID: {})", display_id(&post_id)),
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct PostInstagramParams {
    #[serde(default)]
    account_id: Option<String>,
    caption: String,
    image_url: String,
    #[serde(default = "default_media_type")]
    media_type: String,
}

fn default_media_type() -> String {
    "IMAGE".to_string()
}

pub fn post_instagram_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "post_instagram",
        "Post media to an Instagram Business Account",
        json!({
            "type": "object",
            "properties": {
                "account_id": { "type": "string", "description": "Instagram Business Account ID" },
                "caption": { "type": "string", "description": "Post caption" },
                "image_url": { "type": "string", "description": "Image URL" },
                "media_type": { "type": "string", "description": "Media type", "default": "IMAGE" }
            },
            "required": ["caption", "image_url"]
        }),
    )
}

async fn post_instagram(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: PostInstagramParams = decode(input)?;
    let token = access_token(&ctx)?;
    let account_id = resolve_id(&ctx, params.account_id, "INSTAGRAM_BUSINESS_ACCOUNT_ID")?;
    let base = &ctx.config.endpoints.instagram_graph;

    // Instagram publishes in two steps: create a container, then publish it.
    let container = ctx
        .client
        .call(ApiRequest::post(
            format!("{base}/{account_id}/media"),
            json!({
                "image_url": params.image_url,
                "caption": params.caption,
                "media_type": params.media_type,
                "access_token": token
            }),
        ))
        .await?;

    let published = ctx
        .client
        .call(ApiRequest::post(
            format!("{base}/{account_id}/media_publish"),
            json!({ "creation_id": id_of(&container), "access_token": token }),
        ))
        .await?;
    let post_id = id_of(&published);

    Ok(json!({
        "success": true,
        "post_id": post_id,
        "platform": "instagram",
        "message": format!("Posted to Instagram successfully (ID: {})", display_id(&post_id)),
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct ScheduleFacebookParams {
    #[serde(default)]
    page_id: Option<String>,
    message: String,
    publish_time: String,
    #[serde(default)]
    image_url: Option<String>,
}

pub fn schedule_facebook_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "schedule_facebook",
        "Schedule a Facebook Page post for a future time",
        json!({
            "type": "object",
            "properties": {
                "page_id": { "type": "string", "description": "Facebook Page ID" },
                "message": { "type": "string", "description": "Post message" },
                "publish_time": { "type": "string", "description": "Scheduled publish time (ISO8601)" },
                "image_url": { "type": "string", "description": "Image URL (optional)" }
            },
            "required": ["message", "publish_time"]
        }),
    )
}

fn publish_timestamp(publish_time: &str) -> Result<i64, ToolError> {
    DateTime::parse_from_rfc3339(publish_time)
        .map(|dt| dt.timestamp())
        .map_err(|_| ToolError::rejected(format!("Invalid publish_time: {publish_time}")))
}

async fn schedule_facebook(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: ScheduleFacebookParams = decode(input)?;
    let scheduled = publish_timestamp(&params.publish_time)?;
    let token = access_token(&ctx)?;
    let page_id = resolve_id(&ctx, params.page_id, "FACEBOOK_PAGE_ID")?;

    let mut body = json!({
        "message": params.message,
        "published": false,
        "scheduled_publish_time": scheduled,
        "access_token": token
    });
    if let Some(image_url) = &params.image_url {
        body["picture"] = json!(image_url);
    }

    let url = format!("{}/{page_id}/feed", ctx.config.endpoints.meta_graph);
    let response = ctx.client.call(ApiRequest::post(url, body)).await?;

    Ok(json!({
        "success": true,
        "post_id": id_of(&response),
        "platform": "facebook",
        "scheduled_for": params.publish_time,
        "message": format!("Post scheduled for {}", params.publish_time),
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct InstagramInsightsParams {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    metric: Option<String>,
}

pub fn get_instagram_insights_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_instagram_insights",
        "Get Instagram account insights",
        json!({
            "type": "object",
            "properties": {
                "account_id": { "type": "string", "description": "Instagram Business Account ID" },
                "metric": {
                    "type": "string",
                    "description": "Metric name (impressions, reach, profile_views, follower_count)"
                }
            }
        }),
    )
}

/// Unknown or missing metrics fall back to `impressions`.
fn instagram_metric(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|m| INSTAGRAM_METRICS.iter().find(|&&known| known == m))
        .copied()
        .unwrap_or("impressions")
}

async fn get_instagram_insights(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: InstagramInsightsParams = decode(input)?;
    let token = access_token(&ctx)?;
    let account_id = resolve_id(&ctx, params.account_id, "INSTAGRAM_BUSINESS_ACCOUNT_ID")?;
    let metric = instagram_metric(params.metric.as_deref());

    let url = format!("{}/{account_id}/insights", ctx.config.endpoints.instagram_graph);
    let response = ctx
        .client
        .call(
            ApiRequest::get(url)
                .query("metric", metric)
                .query("period", "day")
                .query("access_token", token),
        )
        .await?;

    Ok(json!({
        "success": true,
        "metric": metric,
        "data": response.get("data").cloned().unwrap_or_else(|| json!([])),
        "platform": "instagram",
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct MediaInsightsParams {
    media_id: String,
}

pub fn get_media_insights_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_media_insights",
        "Get Instagram media insights for a post",
        json!({
            "type": "object",
            "properties": {
                "media_id": { "type": "string", "description": "Instagram media ID" }
            },
            "required": ["media_id"]
        }),
    )
}

async fn get_media_insights(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: MediaInsightsParams = decode(input)?;
    let token = access_token(&ctx)?;

    let url = format!(
        "{}/{}/insights",
        ctx.config.endpoints.instagram_graph, params.media_id
    );
    let response = ctx
        .client
        .call(
            ApiRequest::get(url)
                .query("metric", MEDIA_METRICS)
                .query("access_token", token),
        )
        .await?;

    Ok(json!({
        "success": true,
        "media_id": params.media_id,
        "insights": response.get("data").cloned().unwrap_or_else(|| json!([])),
        "platform": "instagram",
        "timestamp": now_iso()
    }))
}

#[derive(Debug, Deserialize)]
struct PageInsightsParams {
    #[serde(default)]
    page_id: Option<String>,
}

pub fn get_page_insights_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_page_insights",
        "Get Facebook Page insights",
        json!({
            "type": "object",
            "properties": {
                "page_id": { "type": "string", "description": "Facebook Page ID" }
            }
        }),
    )
}

async fn get_page_insights(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: PageInsightsParams = decode(input)?;
    let token = access_token(&ctx)?;
    let page_id = resolve_id(&ctx, params.page_id, "FACEBOOK_PAGE_ID")?;

    let url = format!("{}/{page_id}/insights", ctx.config.endpoints.meta_graph);
    let response = ctx
        .client
        .call(
            ApiRequest::get(url)
                .query("metric", PAGE_METRICS)
                .query("period", "day")
                .query("access_token", token),
        )
        .await?;

    Ok(json!({
        "success": true,
        "page_id": page_id,
        "insights": response.get("data").cloned().unwrap_or_else(|| json!([])),
        "platform": "facebook",
        "timestamp": now_iso()
    }))
}

pub fn check_auth_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "check_auth",
        "Verify Meta access token",
        json!({ "type": "object", "properties": {} }),
    )
}

/// Reports token validity as data; an auth failure is not a tool error.
async fn check_auth(ctx: ToolContext, _input: JsonMap) -> ToolResult {
    let Some(token) = ctx.config.credential("FACEBOOK_ACCESS_TOKEN") else {
        return Ok(json!({
            "authenticated": false,
            "error": "FACEBOOK_ACCESS_TOKEN not configured"
        }));
    };

    let url = format!("{}/me", ctx.config.endpoints.meta_graph);
    match ctx
        .client
        .call(ApiRequest::get(url).query("access_token", token))
        .await
    {
        Ok(me) => Ok(json!({
            "authenticated": true,
            "user_id": id_of(&me),
            "name": me.get("name").cloned().unwrap_or(Value::Null)
        })),
        Err(e) => {
            tracing::warn!("Meta token check failed: {e}");
            Ok(json!({
                "authenticated": false,
                "error": "Invalid or expired access token"
            }))
        }
    }
}

fn display_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instagram_metric_fallback() {
        assert_eq!(instagram_metric(Some("reach")), "reach");
        assert_eq!(instagram_metric(Some("likes")), "impressions");
        assert_eq!(instagram_metric(None), "impressions");
    }

    #[test]
    fn test_publish_timestamp() {
        assert_eq!(publish_timestamp("2024-01-01T00:00:00Z").unwrap(), 1_704_067_200);
        assert_eq!(
            publish_timestamp("2024-01-01T02:00:00+02:00").unwrap(),
            1_704_067_200
        );
        let err = publish_timestamp("next tuesday").unwrap_err();
        assert_eq!(err, ToolError::Rejected("Invalid publish_time: next tuesday".into()));
    }

    #[test]
    fn test_display_id() {
        assert_eq!(display_id(&json!("123_456")), "123_456");
        assert_eq!(display_id(&Value::Null), "unknown");
    }
}
