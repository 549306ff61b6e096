//! Cross-protocol translation kernel for Anthropic-, OpenAI-, and
//! Google-style chat completion APIs.
//!
//! This crate is a library consumed by an HTTP layer (out of scope here):
//! it decodes one protocol's request/response/stream-event shapes,
//! translates through the canonical model in [`messages::unified`], and
//! re-encodes into another protocol's shapes, preserving semantic fidelity
//! for text, tool invocation, tool results, multi-turn history, system
//! instructions, reasoning content, and usage accounting. See
//! `messages::unified::from_*`/`to_*` for the request/response translators
//! and [`stream`] for the streaming state machine.

pub mod error;
pub mod finish_reason;
pub mod messages;
pub mod provider;
pub mod schema;
pub mod stream;

pub use error::{KernelError, Result};
pub use messages::unified::Request as CanonicalRequest;
pub use messages::unified::Response as CanonicalResponse;
pub use provider::Provider;

/// One of the three wire protocols this kernel translates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Anthropic Messages API.
    Anthropic,
    /// OpenAI Chat Completions API.
    OpenAi,
    /// Google Gemini `generateContent` API.
    Google,
}

/// Decodes `body` as a request in `src`, translates it to `dst`, and
/// returns the upstream-protocol request body plus its model name.
///
/// This is the non-streaming request-side composition the donor codebase
/// performs inline per provider; the kernel exposes it as one entry point
/// per §6 ("translate to upstream-protocol request" in the request-side
/// data flow), with the provider transform left to the caller since it
/// additionally needs a [`Provider`] and is optional.
pub fn translate_request(src: Protocol, dst: Protocol, body: &[u8]) -> Result<serde_json::Value> {
    let canonical = decode_request(src, body)?;
    Ok(encode_request(dst, canonical))
}

fn decode_request(protocol: Protocol, body: &[u8]) -> Result<CanonicalRequest> {
    let canonical: CanonicalRequest = match protocol {
        Protocol::Anthropic => {
            let req: messages::anthropic::ChatRequest = serde_json::from_slice(body)?;
            req.into()
        }
        Protocol::OpenAi => {
            let req: messages::openai::ChatCompletionRequest = serde_json::from_slice(body)?;
            req.into()
        }
        Protocol::Google => {
            let req: messages::google::GenerateRequest = serde_json::from_slice(body)?;
            req.into()
        }
    };
    canonical.validate()?;
    Ok(canonical)
}

fn encode_request(protocol: Protocol, canonical: CanonicalRequest) -> serde_json::Value {
    match protocol {
        Protocol::Anthropic => {
            let req: messages::anthropic::ChatRequest = canonical.into();
            serde_json::to_value(req).expect("ChatRequest always serializes")
        }
        Protocol::OpenAi => {
            let req: messages::openai::ChatCompletionRequest = canonical.into();
            serde_json::to_value(req).expect("ChatCompletionRequest always serializes")
        }
        Protocol::Google => {
            let req: messages::google::GenerateRequest = canonical.into();
            serde_json::to_value(req).expect("GenerateRequest always serializes")
        }
    }
}

/// Decodes `body` as a non-streaming response in `src`, translates it to
/// `dst`, and returns the re-encoded response body.
pub fn translate_response(src: Protocol, dst: Protocol, body: &[u8]) -> Result<serde_json::Value> {
    let canonical = decode_response(src, body)?;
    Ok(encode_response(dst, canonical))
}

fn decode_response(protocol: Protocol, body: &[u8]) -> Result<CanonicalResponse> {
    match protocol {
        Protocol::Anthropic => {
            let resp: messages::anthropic::ChatResponse = serde_json::from_slice(body)?;
            Ok(resp.into())
        }
        Protocol::OpenAi => {
            let resp: messages::openai::ChatCompletionResponse = serde_json::from_slice(body)?;
            Ok(resp.into())
        }
        Protocol::Google => {
            let resp: messages::google::GenerateResponse = serde_json::from_slice(body)?;
            Ok(resp.into())
        }
    }
}

fn encode_response(protocol: Protocol, canonical: CanonicalResponse) -> serde_json::Value {
    match protocol {
        Protocol::Anthropic => {
            let resp: messages::anthropic::ChatResponse = canonical.into();
            serde_json::to_value(resp).expect("ChatResponse always serializes")
        }
        Protocol::OpenAi => {
            let resp: messages::openai::ChatCompletionResponse = canonical.into();
            serde_json::to_value(resp).expect("ChatCompletionResponse always serializes")
        }
        Protocol::Google => {
            let resp: messages::google::GenerateResponse = canonical.into();
            serde_json::to_value(resp).expect("GenerateResponse always serializes")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn translate_request_anthropic_to_openai_carries_model_and_text() {
        let body = indoc! {r#"
            {
                "model": "claude-3-5-sonnet-20241022",
                "max_tokens": 256,
                "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}]
            }
        "#};
        let out = translate_request(Protocol::Anthropic, Protocol::OpenAi, body.as_bytes()).unwrap();
        assert_eq!(out["model"], "claude-3-5-sonnet-20241022");
        assert_eq!(out["messages"][0]["role"], "user");
        assert_eq!(out["messages"][0]["content"], "hi");
    }

    #[test]
    fn translate_request_openai_to_google_moves_system_message_out_of_contents() {
        let body = indoc! {r#"
            {
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": "hi"}
                ]
            }
        "#};
        let out = translate_request(Protocol::OpenAi, Protocol::Google, body.as_bytes()).unwrap();
        assert_eq!(out["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(out["contents"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn translate_response_google_to_anthropic_maps_stop_reason() {
        let body = indoc! {r#"
            {
                "candidates": [{"content": {"parts": [{"text": "hi"}], "role": "model"}, "finishReason": "STOP", "index": 0}],
                "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
            }
        "#};
        let out = translate_response(Protocol::Google, Protocol::Anthropic, body.as_bytes()).unwrap();
        assert_eq!(out["stop_reason"], "end_turn");
        assert_eq!(out["content"][0]["text"], "hi");
    }

    #[test]
    fn malformed_request_body_surfaces_as_a_kernel_error() {
        let err = translate_request(Protocol::OpenAi, Protocol::Anthropic, b"not json").unwrap_err();
        assert_eq!(err.kind(), "invalid_shape");
    }

    #[test]
    fn a_tool_choice_naming_an_undeclared_tool_fails_validation_through_translate_request() {
        let body = indoc! {r#"
            {
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "hi"}],
                "tools": [{"type": "function", "function": {"name": "search", "parameters": {"type": "object"}}}],
                "tool_choice": {"type": "function", "function": {"name": "weather"}}
            }
        "#};
        let err = translate_request(Protocol::OpenAi, Protocol::Anthropic, body.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "invalid_shape");
    }
}
