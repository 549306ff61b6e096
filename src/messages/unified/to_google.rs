//! Canonical -> G.

use std::collections::HashMap;

use crate::messages::google;
use crate::messages::unified::{Block, ImageSource, Message, Request, Response, Role, ToolChoice};
use crate::schema::{self, SchemaDialect};

impl From<Request> for google::GenerateRequest {
    fn from(req: Request) -> Self {
        let tool_names = build_tool_name_map(&req.messages);
        let tools_suppressed = req.tool_choice == ToolChoice::None;

        google::GenerateRequest {
            contents: messages_to_google(req.messages, &tool_names),
            generation_config: Some(google::GenerationConfig {
                stop_sequences: req.stop_sequences,
                candidate_count: None,
                max_output_tokens: req.max_tokens.map(|n| n as i32),
                temperature: req.temperature,
                top_p: req.top_p,
                top_k: req.top_k.map(|n| n as i32),
            }),
            tools: (!tools_suppressed && !req.tools.is_empty()).then(|| {
                vec![google::Tool {
                    function_declarations: Some(req.tools.into_iter().map(tool_to_google).collect()),
                }]
            }),
            tool_config: (!tools_suppressed).then(|| google::ToolConfig { function_calling_config: Some(tool_choice_to_google(req.tool_choice)) }),
            system_instruction: req.system.map(|text| google::Content { parts: vec![google::Part::text(text)], role: None }),
        }
    }
}

/// A scan-once map from `tool_use`/`tool_result` id to the function name,
/// since a canonical `ToolResult` block carries only the id but G's
/// `FunctionResponse` requires a name on the wire.
fn build_tool_name_map(messages: &[Message]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for message in messages {
        for block in &message.content {
            if let Block::ToolUse { id, name, .. } = block {
                map.insert(id.clone(), name.clone());
            }
        }
    }
    map
}

/// Mirrors `to_anthropic`'s re-fan-in: canonical `ToolResult`-role messages
/// (plus an optional trailing sibling `User` message) collapse into one G
/// `Content` of role `user` carrying the `FunctionResponse` parts followed
/// by the sibling parts.
fn messages_to_google(messages: Vec<Message>, tool_names: &HashMap<String, String>) -> Vec<google::Content> {
    let mut out = Vec::new();
    let mut iter = messages.into_iter().peekable();

    while let Some(message) = iter.next() {
        match message.role {
            Role::System => log::warn!("dropping stray system-role message mid-conversation when emitting to G"),
            Role::ToolResult => {
                let mut parts: Vec<google::Part> = message.content.into_iter().map(|b| block_to_google_part(b, tool_names)).collect();
                while let Some(next) = iter.peek()
                    && next.role == Role::ToolResult
                {
                    let next = iter.next().unwrap();
                    parts.extend(next.content.into_iter().map(|b| block_to_google_part(b, tool_names)));
                }
                if let Some(next) = iter.peek()
                    && next.role == Role::User
                {
                    let sibling = iter.next().unwrap();
                    parts.extend(sibling.content.into_iter().map(|b| block_to_google_part(b, tool_names)));
                }
                out.push(google::Content { parts, role: Some(google::Role::User) });
            }
            Role::User => {
                out.push(google::Content {
                    parts: message.content.into_iter().map(|b| block_to_google_part(b, tool_names)).collect(),
                    role: Some(google::Role::User),
                });
            }
            Role::Assistant => {
                out.push(google::Content {
                    parts: message.content.into_iter().filter_map(|b| block_to_google_part_assistant(b)).collect(),
                    role: Some(google::Role::Model),
                });
            }
        }
    }

    out
}

fn block_to_google_part(block: Block, tool_names: &HashMap<String, String>) -> google::Part {
    match block {
        Block::Text { text, .. } => google::Part::text(text),
        Block::Image { source } => image_source_to_google_part(source),
        Block::ToolUse { id, name, arguments } => {
            google::Part::function_call(google::FunctionCall { id: Some(id), name, args: arguments, thought_signature: None })
        }
        Block::ToolResult { tool_use_id, content, is_error } => {
            let name = tool_names.get(&tool_use_id).cloned().unwrap_or_else(|| {
                log::warn!("could not find a function name for tool_use_id '{tool_use_id}', using the id itself");
                tool_use_id.clone()
            });
            let response = if is_error { serde_json::json!({"error": content}) } else { serde_json::json!({"output": content}) };
            google::Part::function_response(google::FunctionResponse { id: Some(tool_use_id), name, response })
        }
        Block::Thinking { .. } => {
            log::warn!("dropping a thinking block G's wire shape has no part type for");
            google::Part::default()
        }
    }
}

fn block_to_google_part_assistant(block: Block) -> Option<google::Part> {
    match block {
        Block::Thinking { .. } => {
            log::warn!("dropping a thinking block G's wire shape has no part type for");
            None
        }
        other => Some(block_to_google_part(other, &HashMap::new())),
    }
}

fn image_source_to_google_part(source: ImageSource) -> google::Part {
    match source {
        ImageSource::Base64 { media_type, data } => google::Part::inline_data(google::InlineData { mime_type: media_type, data }),
        ImageSource::Url { url } => google::Part::text(format!("[Image: {url}]")),
    }
}

fn tool_to_google(tool: crate::messages::unified::Tool) -> google::FunctionDeclaration {
    let mut schema = tool.input_schema;
    schema::normalize(&mut schema, SchemaDialect::Google);
    google::FunctionDeclaration { name: tool.name, description: Some(tool.description), parameters: Some(schema) }
}

fn tool_choice_to_google(choice: ToolChoice) -> google::FunctionCallingConfig {
    match choice {
        ToolChoice::Auto | ToolChoice::None => google::FunctionCallingConfig { mode: google::FunctionCallingMode::Auto, allowed_function_names: None },
        ToolChoice::Any => google::FunctionCallingConfig { mode: google::FunctionCallingMode::Any, allowed_function_names: None },
        ToolChoice::Named(name) => {
            google::FunctionCallingConfig { mode: google::FunctionCallingMode::Any, allowed_function_names: Some(vec![name]) }
        }
    }
}

impl From<Response> for google::GenerateResponse {
    fn from(resp: Response) -> Self {
        let parts = resp.content.into_iter().filter_map(block_to_google_part_assistant).collect();
        google::GenerateResponse {
            candidates: vec![google::Candidate {
                content: google::Content { parts, role: Some(google::Role::Model) },
                finish_reason: Some(resp.stop_reason.into()),
                index: 0,
            }],
            usage_metadata: Some(google::UsageMetadata {
                prompt_token_count: resp.usage.input_tokens,
                candidates_token_count: resp.usage.output_tokens,
                total_token_count: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
            extras: crate::messages::extras::Extras::from(resp.provider_extras),
        }
    }
}
