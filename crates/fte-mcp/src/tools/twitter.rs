//! Twitter/X tools.

use serde::Deserialize;
use serde_json::{json, Value};

use fte_dispatch::{DispatchResult, JsonMap, ToolDescriptor, ToolError, ToolRegistry, ToolResult};

use super::{bind, decode, now_iso, ToolContext};
use crate::client::ApiRequest;

pub const MAX_TWEET_CHARS: usize = 280;

pub fn register(registry: &mut ToolRegistry, ctx: &ToolContext) -> DispatchResult<()> {
    registry.register(post_tweet_definition(), bind(ctx, post_tweet))?;
    registry.register(get_metrics_definition(), bind(ctx, get_metrics))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PostTweetParams {
    text: String,
    #[serde(default)]
    reply_to: Option<String>,
}

pub fn post_tweet_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "post_tweet",
        "Post a tweet",
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Tweet text (1-280 characters)" },
                "reply_to": { "type": "string", "description": "Tweet ID to reply to" }
            },
            "required": ["text"]
        }),
    )
}

async fn post_tweet(ctx: ToolContext, input: JsonMap) -> ToolResult {
    let params: PostTweetParams = decode(input)?;

    let length = params.text.chars().count();
    if length == 0 || length > MAX_TWEET_CHARS {
        return Err(ToolError::rejected("Tweet must be 1-280 characters"));
    }

    let token = ctx.config.require("TWITTER_ACCESS_TOKEN")?;

    let mut body = json!({ "text": params.text });
    if let Some(reply_to) = &params.reply_to {
        body["reply"] = json!({ "in_reply_to_tweet_id": reply_to });
    }

    let url = format!("{}/tweets", ctx.config.endpoints.twitter);
    let response = ctx
        .client
        .call(ApiRequest::post(url, body).bearer(token))
        .await?;

    let tweet_id = response
        .pointer("/data/id")
        .cloned()
        .unwrap_or(Value::Null);

    tracing::info!(tweet_id = %tweet_id, "Tweet posted");

    Ok(json!({
        "status": "posted",
        "tweet_id": tweet_id,
        "text": params.text,
        "reply_to": params.reply_to,
        "timestamp": now_iso()
    }))
}

pub fn get_metrics_definition() -> ToolDescriptor {
    ToolDescriptor::new(
        "get_metrics",
        "Get Twitter metrics",
        json!({ "type": "object", "properties": {} }),
    )
}

async fn get_metrics(ctx: ToolContext, _input: JsonMap) -> ToolResult {
    let token = ctx.config.require("TWITTER_ACCESS_TOKEN")?;

    let url = format!("{}/users/me", ctx.config.endpoints.twitter);
    let response = ctx
        .client
        .call(
            ApiRequest::get(url)
                .query("user.fields", "public_metrics")
                .bearer(token),
        )
        .await?;

    let user = response.get("data").cloned().unwrap_or(Value::Null);

    Ok(json!({
        "user_id": user.get("id").cloned().unwrap_or(Value::Null),
        "username": user.get("username").cloned().unwrap_or(Value::Null),
        "metrics": user.get("public_metrics").cloned().unwrap_or_else(|| json!({})),
        "timestamp": now_iso()
    }))
}
