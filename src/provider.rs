//! Provider transform hooks: small per-upstream rewrites applied to a
//! request or response after translation, to accommodate idiosyncrasies a
//! given upstream has beyond the wire protocol it otherwise speaks.
//!
//! The kernel's only piece of "configuration" is a [`Provider`] record; it
//! never constructs an HTTP client or reads credentials (see the donor's
//! `provider::openai::OpenAIProvider` for everything this crate deliberately
//! leaves out).

use serde_json::Value;

use crate::messages::unified::{Block, Message, Request, Role};

/// The one piece of upstream identity the kernel needs: enough to select a
/// transform, never enough to make a network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub api_base: String,
    pub api_style: String,
}

/// A staging field carried on [`Request::provider_extras`] from the moment
/// an A source sets `thinking.type = "enabled"` until a provider transform
/// either promotes it into that upstream's own reasoning field or it is
/// dropped by [`cleanup_temp_fields`].
const X_THINKING: &str = "x_thinking";

fn wants_thinking(req: &Request) -> bool {
    matches!(req.provider_extras.get(X_THINKING), Some(Value::Bool(true)))
}

/// Rewrites a translated request for the upstream named by `provider`,
/// dispatched by a substring match against its (lowercased) `api_base`.
///
/// Always followed by [`cleanup_temp_fields`], regardless of whether any
/// known pattern matched, so a request never leaks `x_thinking` onto the
/// wire.
pub fn apply_request_transforms(mut req: Request, provider: &Provider, model: &str) -> Request {
    let api_base = provider.api_base.to_lowercase();

    if api_base.contains("api.deepseek.com") {
        log::debug!(
            "applying deepseek request transform for model '{model}' (thinking requested: {})",
            wants_thinking(&req)
        );
        req = deepseek_request_transform(req);
    }

    cleanup_temp_fields(req)
}

/// DeepSeek's chat completion API is reasoning-capable and expects the
/// assistant's reasoning trace to survive round-trips on its own
/// `reasoning_content` field rather than the `thinking` request flag this
/// kernel otherwise only understands as A's `ThinkingConfig`. A `thinking`
/// block backfilled here (empty when the assistant turn carried none) is
/// what `to_openai`'s message conversion reads to populate
/// `reasoning_content`, so every assistant message DeepSeek sees has the
/// field present — mirroring the response-side guarantee below — whether
/// or not the caller actually requested extended thinking.
fn deepseek_request_transform(mut req: Request) -> Request {
    for message in req.messages.iter_mut() {
        if message.role == Role::Assistant {
            ensure_thinking_block(message);
        }
    }
    req
}

fn ensure_thinking_block(message: &mut Message) {
    let has_thinking = message.content.iter().any(|b| matches!(b, Block::Thinking { .. }));
    if !has_thinking {
        message.content.insert(0, Block::Thinking { id: None, text: String::new() });
    }
}

/// Unconditionally strips staging fields that must never reach upstream
/// wire bytes, independent of which (if any) provider transform ran.
pub fn cleanup_temp_fields(mut req: Request) -> Request {
    req.provider_extras.remove(X_THINKING);
    req
}

/// Rewrites a translated, already-serialized response body for the
/// upstream named by `provider`. Operates on the JSON `Value` rather than
/// the typed wire struct since the rewrite (guaranteeing a field's
/// presence) is shallower than a full reparse.
pub fn apply_response_transforms(mut resp: Value, provider: &Provider, model: &str) -> Value {
    let api_base = provider.api_base.to_lowercase();

    if api_base.contains("api.deepseek.com") {
        log::debug!("applying deepseek response transform for model '{model}'");
        ensure_reasoning_content_present(&mut resp);
    }

    resp
}

fn ensure_reasoning_content_present(resp: &mut Value) {
    let Some(message) = resp.pointer_mut("/choices/0/message").and_then(Value::as_object_mut) else {
        return;
    };
    message.entry("reasoning_content").or_insert_with(|| Value::String(String::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::Request;

    fn deepseek() -> Provider {
        Provider { api_base: "https://api.deepseek.com/v1".into(), api_style: "openai".into() }
    }

    #[test]
    fn unmatched_provider_still_strips_the_thinking_staging_field() {
        let mut req = Request { model: "gpt-4o".into(), ..Default::default() };
        req.provider_extras.insert(X_THINKING.into(), Value::Bool(true));
        let provider = Provider { api_base: "https://api.openai.com/v1".into(), api_style: "openai".into() };
        let out = apply_request_transforms(req, &provider, "gpt-4o");
        assert!(!out.provider_extras.contains_key(X_THINKING));
    }

    #[test]
    fn deepseek_request_transform_also_strips_the_staging_field() {
        let mut req = Request { model: "deepseek-chat".into(), ..Default::default() };
        req.provider_extras.insert(X_THINKING.into(), Value::Bool(true));
        let out = apply_request_transforms(req, &deepseek(), "deepseek-chat");
        assert!(!out.provider_extras.contains_key(X_THINKING));
    }

    #[test]
    fn deepseek_request_transform_backfills_an_empty_thinking_block_when_absent() {
        let req = Request {
            model: "deepseek-chat".into(),
            messages: vec![crate::messages::unified::Message::new(Role::Assistant, vec![Block::text("hi")])],
            ..Default::default()
        };
        let out = apply_request_transforms(req, &deepseek(), "deepseek-chat");
        assert!(matches!(&out.messages[0].content[0], Block::Thinking { text, .. } if text.is_empty()));
        assert_eq!(out.messages[0].content.len(), 2);
    }

    #[test]
    fn deepseek_request_transform_leaves_an_existing_thinking_block_alone() {
        let req = Request {
            model: "deepseek-chat".into(),
            messages: vec![crate::messages::unified::Message::new(
                Role::Assistant,
                vec![Block::Thinking { id: None, text: "already reasoned".into() }, Block::text("hi")],
            )],
            ..Default::default()
        };
        let out = apply_request_transforms(req, &deepseek(), "deepseek-chat");
        assert_eq!(out.messages[0].content.len(), 2);
        assert!(matches!(&out.messages[0].content[0], Block::Thinking { text, .. } if text == "already reasoned"));
    }

    #[test]
    fn non_deepseek_request_transform_does_not_touch_assistant_content() {
        let req = Request {
            model: "gpt-4o".into(),
            messages: vec![crate::messages::unified::Message::new(Role::Assistant, vec![Block::text("hi")])],
            ..Default::default()
        };
        let provider = Provider { api_base: "https://api.openai.com/v1".into(), api_style: "openai".into() };
        let out = apply_request_transforms(req, &provider, "gpt-4o");
        assert_eq!(out.messages[0].content.len(), 1);
    }

    #[test]
    fn deepseek_response_transform_adds_empty_reasoning_content_when_absent() {
        let resp = serde_json::json!({"choices": [{"message": {"content": "hi"}}]});
        let out = apply_response_transforms(resp, &deepseek(), "deepseek-chat");
        assert_eq!(out["choices"][0]["message"]["reasoning_content"], "");
    }

    #[test]
    fn deepseek_response_transform_leaves_existing_reasoning_content_alone() {
        let resp = serde_json::json!({"choices": [{"message": {"content": "hi", "reasoning_content": "because"}}]});
        let out = apply_response_transforms(resp, &deepseek(), "deepseek-chat");
        assert_eq!(out["choices"][0]["message"]["reasoning_content"], "because");
    }

    #[test]
    fn non_deepseek_response_transform_does_not_add_reasoning_content() {
        let resp = serde_json::json!({"choices": [{"message": {"content": "hi"}}]});
        let provider = Provider { api_base: "https://api.openai.com/v1".into(), api_style: "openai".into() };
        let out = apply_response_transforms(resp, &provider, "gpt-4o");
        assert!(out["choices"][0]["message"].get("reasoning_content").is_none());
    }

    #[test]
    fn wants_thinking_reads_the_staging_flag() {
        let mut req = Request { model: "m".into(), ..Default::default() };
        assert!(!wants_thinking(&req));
        req.provider_extras.insert(X_THINKING.into(), Value::Bool(true));
        assert!(wants_thinking(&req));
    }
}
