//! The protocol-neutral canonical model.
//!
//! Every request/response translation is routed `src -> Canonical -> dst`
//! (hub-and-spoke) rather than one function per ordered pair of protocols.
//! The per-protocol `From`/`TryFrom` conversions live in the `from_*`/`to_*`
//! submodules; this module only defines the hub types and their validation.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{KernelError, Result};

pub(crate) mod from_anthropic;
pub(crate) mod from_google;
pub(crate) mod from_openai;
pub(crate) mod to_anthropic;
pub(crate) mod to_google;
pub(crate) mod to_openai;

/// Vendor-specific fields that don't collide with any canonical field.
/// Merged back in at emission time rather than smuggled through as loose
/// JSON at each call site.
pub type ProviderExtras = HashMap<String, Value>;

/// A protocol-neutral chat completion request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub model: String,
    pub messages: Vec<Message>,
    /// Absent and `0` are both treated as "not specified"; callers supply a
    /// default (typically 4096-8192) before emitting to a destination that
    /// requires the field (A).
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub stop_sequences: Option<Vec<String>>,
    /// Collapsed system instruction. Multi-block A `system` arrays are
    /// joined on the way in; re-split into N blocks on the way out only
    /// when the destination supports it (A itself).
    pub system: Option<String>,
    pub tools: Vec<Tool>,
    pub tool_choice: ToolChoice,
    pub stream: bool,
    pub user_id: Option<String>,
    pub provider_extras: ProviderExtras,
}

impl Request {
    /// Validate the data-model invariants.
    ///
    /// Checks: every `tool_result` in the conversation refers to a
    /// `tool_use.id` that appeared earlier; a named `tool_choice` names a
    /// tool actually present in `tools`; within an assistant message,
    /// `thinking` blocks precede the `text`/`tool_use` blocks they reasoned
    /// toward.
    pub fn validate(&self) -> Result<()> {
        if let ToolChoice::Named(name) = &self.tool_choice
            && !self.tools.iter().any(|t| &t.name == name)
        {
            return Err(KernelError::InvalidShape {
                reason: format!("tool_choice names '{name}', which is not in the tools list"),
            });
        }

        let mut seen_tool_use_ids: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for message in &self.messages {
            if message.role == Role::Assistant {
                validate_thinking_precedes_text(&message.content)?;
            }

            for block in &message.content {
                match block {
                    Block::ToolUse { id, .. } => {
                        seen_tool_use_ids.insert(id.as_str());
                    }
                    Block::ToolResult { tool_use_id, .. } => {
                        if !seen_tool_use_ids.contains(tool_use_id.as_str()) {
                            return Err(KernelError::InvalidShape {
                                reason: format!(
                                    "tool_result references tool_use_id '{tool_use_id}' that was never seen"
                                ),
                            });
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}

/// Invariant 4: within one message's blocks, every `thinking` block comes
/// before any `text`/`tool_use` block. Once a text or tool_use block has been
/// seen, a later thinking block is out of order.
fn validate_thinking_precedes_text(blocks: &[Block]) -> Result<()> {
    let mut seen_text_or_tool_use = false;
    for block in blocks {
        match block {
            Block::Text { .. } | Block::ToolUse { .. } => seen_text_or_tool_use = true,
            Block::Thinking { .. } if seen_text_or_tool_use => {
                return Err(KernelError::InvalidShape {
                    reason: "thinking block appears after a text/tool_use block in the same message".into(),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

/// One turn of conversation.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: Vec<Block>,
}

impl Message {
    pub fn new(role: Role, content: Vec<Block>) -> Self {
        Self { role, content }
    }

    /// Concatenate all `Text` blocks' text, in order. Used where a
    /// destination wants a single string (O `content`, G text part).
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                Block::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// The four canonical roles. `ToolResult` is its own role (rather than a
/// block embedded in a `User` message, as A models it) so that A's
/// "user message carrying tool_result blocks" decomposes cleanly into
/// role-specific messages on the way into O (separate `role:tool` messages)
/// and G (FunctionResponse parts), and reassembles symmetrically on the way
/// back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    ToolResult,
}

/// A single content block, carried by whichever roles SPEC_FULL.md §3's
/// table names.
#[derive(Debug, Clone)]
pub enum Block {
    Text { text: String, extras: ProviderExtras },

    Image { source: ImageSource },

    ToolUse { id: String, name: String, arguments: Value },

    ToolResult { tool_use_id: String, content: String, is_error: bool },

    /// Chain-of-thought content. Assistant-only; see `Request::validate`.
    /// `id` carries an opaque provider signature (A's `signature`) proving
    /// the block was not tampered with; absent for protocols (O's
    /// `reasoning_content`) that don't sign their reasoning output.
    Thinking { id: Option<String>, text: String },
}

impl Block {
    pub fn text(text: impl Into<String>) -> Self {
        Block::Text { text: text.into(), extras: ProviderExtras::new() }
    }
}

#[derive(Debug, Clone)]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

/// A tool the model may call. `input_schema` is dialect-agnostic JSON
/// Schema; see `crate::schema` for the per-destination normalizer.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// How the model should use the available tools.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    #[default]
    Auto,
    Any,
    None,
    Named(String),
}

/// A final, non-streaming response.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub stop_reason: StopReason,
    pub stop_sequence: Option<String>,
    pub content: Vec<Block>,
    pub usage: Usage,
    pub provider_extras: ProviderExtras,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The canonical stop-reason taxonomy. Per-protocol mapping tables live
/// alongside the `From`/`Into` conversions in `crate::finish_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    ContentFilter,
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> Tool {
        Tool { name: name.into(), description: String::new(), input_schema: serde_json::json!({"type": "object"}) }
    }

    #[test]
    fn named_tool_choice_must_reference_a_declared_tool() {
        let req = Request {
            model: "m".into(),
            tools: vec![tool("search")],
            tool_choice: ToolChoice::Named("weather".into()),
            ..Default::default()
        };
        let err = req.validate().unwrap_err();
        assert!(matches!(err, KernelError::InvalidShape { .. }));
    }

    #[test]
    fn named_tool_choice_matching_a_tool_is_fine() {
        let req = Request {
            model: "m".into(),
            tools: vec![tool("search")],
            tool_choice: ToolChoice::Named("search".into()),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn tool_result_must_reference_a_known_tool_use_id() {
        let req = Request {
            model: "m".into(),
            messages: vec![Message::new(
                Role::ToolResult,
                vec![Block::ToolResult { tool_use_id: "missing".into(), content: "x".into(), is_error: false }],
            )],
            ..Default::default()
        };
        let err = req.validate().unwrap_err();
        assert!(matches!(err, KernelError::InvalidShape { .. }));
    }

    #[test]
    fn tool_result_referencing_a_prior_tool_use_is_fine() {
        let req = Request {
            model: "m".into(),
            messages: vec![
                Message::new(
                    Role::Assistant,
                    vec![Block::ToolUse { id: "t1".into(), name: "search".into(), arguments: serde_json::json!({}) }],
                ),
                Message::new(
                    Role::ToolResult,
                    vec![Block::ToolResult { tool_use_id: "t1".into(), content: "result".into(), is_error: false }],
                ),
            ],
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn thinking_after_text_in_same_message_is_invalid() {
        let req = Request {
            model: "m".into(),
            messages: vec![Message::new(
                Role::Assistant,
                vec![Block::text("answer"), Block::Thinking { id: None, text: "late thought".into() }],
            )],
            ..Default::default()
        };
        let err = req.validate().unwrap_err();
        assert!(matches!(err, KernelError::InvalidShape { .. }));
    }

    #[test]
    fn thinking_before_text_is_valid() {
        let req = Request {
            model: "m".into(),
            messages: vec![Message::new(
                Role::Assistant,
                vec![Block::Thinking { id: None, text: "thought".into() }, Block::text("answer")],
            )],
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn message_text_concatenates_only_text_blocks() {
        let message = Message::new(
            Role::Assistant,
            vec![
                Block::Thinking { id: None, text: "ignored".into() },
                Block::text("Hello "),
                Block::ToolUse { id: "t1".into(), name: "f".into(), arguments: serde_json::json!({}) },
                Block::text("world"),
            ],
        );
        assert_eq!(message.text(), "Hello world");
    }
}
