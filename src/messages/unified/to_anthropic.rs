//! Canonical -> A.

use crate::messages::anthropic;
use crate::messages::extras::Extras;
use crate::messages::unified::{Block, ImageSource, Message, Request, Response, Role, ToolChoice};
use crate::schema::{self, SchemaDialect};

/// A requires `max_tokens`; callers translating into A supply this default
/// when the canonical request left it unspecified.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

impl From<Request> for anthropic::ChatRequest {
    fn from(req: Request) -> Self {
        let tools_suppressed = req.tool_choice == ToolChoice::None;

        anthropic::ChatRequest {
            model: req.model,
            messages: messages_to_anthropic(req.messages),
            max_tokens: req.max_tokens.filter(|&n| n != 0).unwrap_or(DEFAULT_MAX_TOKENS),
            system: req.system.map(anthropic::SystemPrompt::Text),
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: req.top_k,
            stop_sequences: req.stop_sequences,
            stream: Some(req.stream),
            metadata: req.user_id.map(|user_id| anthropic::Metadata { user_id: Some(user_id) }),
            tools: (!tools_suppressed && !req.tools.is_empty())
                .then(|| req.tools.into_iter().map(tool_to_anthropic).collect()),
            tool_choice: tool_choice_to_anthropic(req.tool_choice),
            thinking: req.provider_extras.get("x_thinking").and_then(|v| v.as_bool()).filter(|&b| b).map(|_| {
                anthropic::ThinkingConfig { kind: anthropic::ThinkingConfigKind::Enabled, budget_tokens: None }
            }),
            extras: Extras::from(req.provider_extras),
        }
    }
}

/// Re-fans canonical `ToolResult`-role messages (plus an optional trailing
/// sibling `User` message) back into a single A user message carrying
/// `tool_result` blocks followed by the sibling content, undoing the split
/// `from_anthropic` performed on the way in.
fn messages_to_anthropic(messages: Vec<Message>) -> Vec<anthropic::Message> {
    let mut out = Vec::new();
    let mut iter = messages.into_iter().peekable();

    while let Some(message) = iter.next() {
        match message.role {
            Role::System => {
                log::warn!("dropping stray system-role message mid-conversation when emitting to A");
            }
            Role::ToolResult => {
                let mut content: Vec<anthropic::Content> =
                    message.content.into_iter().map(block_to_anthropic).collect();
                while let Some(next) = iter.peek()
                    && next.role == Role::ToolResult
                {
                    let next = iter.next().unwrap();
                    content.extend(next.content.into_iter().map(block_to_anthropic));
                }
                if let Some(next) = iter.peek()
                    && next.role == Role::User
                {
                    let sibling = iter.next().unwrap();
                    content.extend(sibling.content.into_iter().map(block_to_anthropic));
                }
                out.push(anthropic::Message { role: anthropic::Role::User, content });
            }
            Role::User => {
                out.push(anthropic::Message {
                    role: anthropic::Role::User,
                    content: message.content.into_iter().map(block_to_anthropic).collect(),
                });
            }
            Role::Assistant => {
                out.push(anthropic::Message {
                    role: anthropic::Role::Assistant,
                    content: message.content.into_iter().map(block_to_anthropic).collect(),
                });
            }
        }
    }

    out
}

fn block_to_anthropic(block: Block) -> anthropic::Content {
    match block {
        Block::Text { text, extras } => anthropic::Content::Text { text, extras: Extras::from(extras) },
        Block::Image { source } => anthropic::Content::Image { source: image_source_to_anthropic(source) },
        Block::ToolUse { id, name, arguments } => anthropic::Content::ToolUse { id, name, input: arguments },
        Block::ToolResult { tool_use_id, content, is_error } => anthropic::Content::ToolResult {
            tool_use_id,
            content: anthropic::ToolResultContent::Text(content),
            is_error: is_error.then_some(true),
        },
        Block::Thinking { id, text } => anthropic::Content::Thinking { thinking: text, signature: id },
    }
}

fn image_source_to_anthropic(source: ImageSource) -> anthropic::ImageSource {
    match source {
        ImageSource::Base64 { media_type, data } => anthropic::ImageSource {
            source_type: anthropic::ImageSourceType::Base64,
            media_type: Some(media_type),
            data: Some(data),
            url: None,
        },
        ImageSource::Url { url } => {
            anthropic::ImageSource { source_type: anthropic::ImageSourceType::Url, media_type: None, data: None, url: Some(url) }
        }
    }
}

fn tool_to_anthropic(tool: crate::messages::unified::Tool) -> anthropic::Tool {
    let mut schema = tool.input_schema;
    schema::normalize(&mut schema, SchemaDialect::Anthropic);
    anthropic::Tool {
        name: tool.name,
        description: tool.description,
        input_schema: Box::new(crate::messages::openai::JsonSchema(schema)),
        extras: Extras::default(),
    }
}

fn tool_choice_to_anthropic(choice: ToolChoice) -> Option<anthropic::ToolChoice> {
    match choice {
        ToolChoice::Auto => Some(anthropic::ToolChoice::Auto { disable_parallel_tool_use: None }),
        ToolChoice::Any => Some(anthropic::ToolChoice::Any { disable_parallel_tool_use: None }),
        ToolChoice::Named(name) => Some(anthropic::ToolChoice::Tool { name, disable_parallel_tool_use: None }),
        ToolChoice::None => None,
    }
}

impl From<Response> for anthropic::ChatResponse {
    fn from(resp: Response) -> Self {
        anthropic::ChatResponse {
            id: resp.id,
            r#type: "message".into(),
            role: anthropic::Role::Assistant,
            content: resp.content.into_iter().map(block_to_anthropic).collect(),
            model: resp.model,
            stop_reason: Some(resp.stop_reason.into()),
            stop_sequence: resp.stop_sequence,
            usage: anthropic::Usage { input_tokens: resp.usage.input_tokens, output_tokens: resp.usage.output_tokens },
        }
    }
}
