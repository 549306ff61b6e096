//! A -> Canonical.

use std::collections::HashMap;

use crate::messages::anthropic;
use crate::messages::unified::{Block, ImageSource, Message, Request, Response, Role, Tool, ToolChoice, Usage};
use crate::schema::{self, SchemaDialect};

impl From<anthropic::ChatRequest> for Request {
    fn from(req: anthropic::ChatRequest) -> Self {
        let mut provider_extras = req.extras.into_map();
        if let Some(thinking) = &req.thinking
            && thinking.kind == anthropic::ThinkingConfigKind::Enabled
        {
            provider_extras.insert("x_thinking".into(), serde_json::Value::Bool(true));
        }

        let messages = req.messages.into_iter().flat_map(message_from_anthropic).collect();

        Request {
            model: req.model,
            messages,
            max_tokens: Some(req.max_tokens).filter(|&n| n != 0),
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: req.top_k,
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: req.stop_sequences,
            system: req.system.map(|s| s.joined_text()),
            tools: req.tools.unwrap_or_default().into_iter().map(tool_from_anthropic).collect(),
            tool_choice: req.tool_choice.map(tool_choice_from_anthropic).unwrap_or_default(),
            stream: req.stream.unwrap_or(false),
            user_id: req.metadata.and_then(|m| m.user_id),
            provider_extras,
        }
    }
}

/// A single A message can expand into up to two canonical messages: one
/// `ToolResult`-role message per `tool_result` block (in order), followed
/// by a `User` message carrying whatever non-tool_result content shared the
/// turn (plain text, images).
fn message_from_anthropic(msg: anthropic::Message) -> Vec<Message> {
    if msg.role == anthropic::Role::Assistant {
        return vec![Message::new(Role::Assistant, msg.content.into_iter().map(block_from_anthropic).collect())];
    }

    let mut tool_results = Vec::new();
    let mut sibling = Vec::new();
    for content in msg.content {
        match content {
            anthropic::Content::ToolResult { tool_use_id, content, is_error } => {
                tool_results.push(Block::ToolResult {
                    tool_use_id,
                    content: content.as_text(),
                    is_error: is_error.unwrap_or(false),
                });
            }
            other => sibling.push(block_from_anthropic(other)),
        }
    }

    let mut out = Vec::new();
    for tool_result in tool_results {
        out.push(Message::new(Role::ToolResult, vec![tool_result]));
    }
    if !sibling.is_empty() {
        out.push(Message::new(Role::User, sibling));
    }
    if out.is_empty() {
        // A user message with empty content (or content that was entirely
        // filtered away, which shouldn't happen for well-formed input).
        out.push(Message::new(Role::User, Vec::new()));
    }
    out
}

fn block_from_anthropic(content: anthropic::Content) -> Block {
    match content {
        anthropic::Content::Text { text, extras } => Block::Text { text, extras: extras.into_map() },
        anthropic::Content::Image { source } => Block::Image { source: image_source_from_anthropic(source) },
        anthropic::Content::ToolUse { id, name, input } => Block::ToolUse { id, name, arguments: input },
        anthropic::Content::ToolResult { tool_use_id, content, is_error } => {
            Block::ToolResult { tool_use_id, content: content.as_text(), is_error: is_error.unwrap_or(false) }
        }
        anthropic::Content::Thinking { thinking, signature } => Block::Thinking { id: signature, text: thinking },
    }
}

fn image_source_from_anthropic(source: anthropic::ImageSource) -> ImageSource {
    match source.source_type {
        anthropic::ImageSourceType::Base64 => ImageSource::Base64 {
            media_type: source.media_type.unwrap_or_else(|| "application/octet-stream".into()),
            data: source.data.unwrap_or_default(),
        },
        anthropic::ImageSourceType::Url => ImageSource::Url { url: source.url.unwrap_or_default() },
    }
}

fn tool_from_anthropic(tool: anthropic::Tool) -> Tool {
    let mut schema = tool.input_schema.0;
    schema::normalize(&mut schema, SchemaDialect::Anthropic);
    Tool { name: tool.name, description: tool.description, input_schema: schema }
}

fn tool_choice_from_anthropic(choice: anthropic::ToolChoice) -> ToolChoice {
    match choice {
        anthropic::ToolChoice::Auto { .. } => ToolChoice::Auto,
        anthropic::ToolChoice::Any { .. } => ToolChoice::Any,
        anthropic::ToolChoice::Tool { name, .. } => ToolChoice::Named(name),
        anthropic::ToolChoice::None => ToolChoice::None,
    }
}

impl From<anthropic::ChatResponse> for Response {
    fn from(resp: anthropic::ChatResponse) -> Self {
        Response {
            id: resp.id,
            model: resp.model,
            stop_reason: resp.stop_reason.map(Into::into).unwrap_or(crate::messages::unified::StopReason::EndTurn),
            stop_sequence: resp.stop_sequence,
            content: resp.content.into_iter().map(block_from_anthropic).collect(),
            usage: Usage { input_tokens: resp.usage.input_tokens, output_tokens: resp.usage.output_tokens },
            provider_extras: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::extras::Extras;

    fn base_request(messages: Vec<anthropic::Message>) -> anthropic::ChatRequest {
        anthropic::ChatRequest {
            model: "claude-3-5-sonnet".into(),
            messages,
            max_tokens: 1024,
            system: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: None,
            metadata: None,
            tools: None,
            tool_choice: None,
            thinking: None,
            extras: Extras::default(),
        }
    }

    #[test]
    fn tool_result_with_sibling_text_splits_into_two_messages() {
        let req = base_request(vec![anthropic::Message {
            role: anthropic::Role::User,
            content: vec![
                anthropic::Content::ToolResult {
                    tool_use_id: "t1".into(),
                    content: anthropic::ToolResultContent::Text("42".into()),
                    is_error: None,
                },
                anthropic::Content::Text { text: "and also:".into(), extras: Extras::default() },
            ],
        }]);
        let canonical: Request = req.into();
        assert_eq!(canonical.messages.len(), 2);
        assert_eq!(canonical.messages[0].role, Role::ToolResult);
        assert_eq!(canonical.messages[1].role, Role::User);
        assert_eq!(canonical.messages[1].text(), "and also:");
    }

    #[test]
    fn thinking_flag_lands_in_provider_extras() {
        let mut req = base_request(vec![]);
        req.thinking = Some(anthropic::ThinkingConfig { kind: anthropic::ThinkingConfigKind::Enabled, budget_tokens: Some(1024) });
        let canonical: Request = req.into();
        assert_eq!(canonical.provider_extras.get("x_thinking"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn assistant_message_keeps_blocks_in_one_message() {
        let req = base_request(vec![anthropic::Message {
            role: anthropic::Role::Assistant,
            content: vec![
                anthropic::Content::Thinking { thinking: "reasoning".into(), signature: None },
                anthropic::Content::Text { text: "answer".into(), extras: Extras::default() },
            ],
        }]);
        let canonical: Request = req.into();
        assert_eq!(canonical.messages.len(), 1);
        assert_eq!(canonical.messages[0].content.len(), 2);
    }
}
