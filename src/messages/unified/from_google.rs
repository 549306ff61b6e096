//! G -> Canonical.

use std::collections::HashMap;

use uuid::Uuid;

use crate::messages::google;
use crate::messages::unified::{Block, ImageSource, Message, Request, Response, Role, Tool, ToolChoice, Usage};
use crate::schema::{self, SchemaDialect};

impl From<google::GenerateRequest> for Request {
    fn from(req: google::GenerateRequest) -> Self {
        let call_ids = build_call_id_map(&req.contents);
        let messages = req.contents.into_iter().flat_map(|c| content_from_google(c, &call_ids)).collect();

        let config = req.generation_config.unwrap_or_default();
        let tool_choice = req
            .tool_config
            .and_then(|c| c.function_calling_config)
            .map(tool_choice_from_google)
            .unwrap_or_default();

        Request {
            model: String::new(),
            messages,
            max_tokens: config.max_output_tokens.filter(|&n| n > 0).map(|n| n as u32),
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: config.top_k.filter(|&n| n > 0).map(|n| n as u32),
            frequency_penalty: None,
            presence_penalty: None,
            stop_sequences: config.stop_sequences,
            system: req.system_instruction.map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect()),
            tools: req
                .tools
                .unwrap_or_default()
                .into_iter()
                .flat_map(|t| t.function_declarations.unwrap_or_default())
                .map(tool_from_google)
                .collect(),
            tool_choice,
            stream: false,
            user_id: None,
            provider_extras: HashMap::new(),
        }
    }
}

/// A scan-once map from function name to the canonical `tool_use`/`tool_result`
/// id the kernel will use for every reference to that call. G's own `id`
/// field is used when the wire provides one; otherwise a fresh id is
/// synthesized here, once, so the matching `FunctionCall` and
/// `FunctionResponse` land on the same canonical id.
fn build_call_id_map(contents: &[google::Content]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for content in contents {
        for part in &content.parts {
            if let Some(call) = &part.function_call {
                let id = call.id.clone().unwrap_or_else(|| format!("toolu_{}", Uuid::new_v4()));
                map.insert(call.name.clone(), id);
            }
        }
    }
    map
}

fn content_from_google(content: google::Content, call_ids: &HashMap<String, String>) -> Vec<Message> {
    if content.role == Some(google::Role::Model) {
        let blocks = content.parts.into_iter().filter_map(|p| part_to_block(p, call_ids)).collect();
        return vec![Message::new(Role::Assistant, blocks)];
    }

    let mut tool_results = Vec::new();
    let mut sibling = Vec::new();
    for part in content.parts {
        if let Some(response) = &part.function_response {
            let tool_use_id = response.id.clone().or_else(|| call_ids.get(&response.name).cloned()).unwrap_or_else(|| {
                log::warn!("could not find a tool_use id for function response '{}', using its name", response.name);
                response.name.clone()
            });
            tool_results.push(Block::ToolResult { tool_use_id, content: response_text(&response.response), is_error: false });
        } else if let Some(block) = part_to_block(part, call_ids) {
            sibling.push(block);
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
        out.push(Message::new(Role::User, Vec::new()));
    }
    out
}

fn part_to_block(part: google::Part, call_ids: &HashMap<String, String>) -> Option<Block> {
    if let Some(call) = part.function_call {
        let id = call_ids.get(&call.name).cloned().unwrap_or(call.name.clone());
        return Some(Block::ToolUse { id, name: call.name, arguments: call.args });
    }
    if let Some(data) = part.inline_data {
        return Some(Block::Image { source: ImageSource::Base64 { media_type: data.mime_type, data: data.data } });
    }
    part.text.map(Block::text)
}

/// A `FunctionResponse.response` object's `output` string field is used
/// verbatim when present; otherwise the whole object is serialized.
fn response_text(response: &serde_json::Value) -> String {
    response.get("output").and_then(|v| v.as_str()).map(String::from).unwrap_or_else(|| response.to_string())
}

fn tool_from_google(decl: google::FunctionDeclaration) -> Tool {
    let mut schema = decl.parameters.unwrap_or_else(schema::empty_object_schema);
    schema::normalize(&mut schema, SchemaDialect::Anthropic);
    Tool { name: decl.name, description: decl.description.unwrap_or_default(), input_schema: schema }
}

fn tool_choice_from_google(config: google::FunctionCallingConfig) -> ToolChoice {
    match config.mode {
        google::FunctionCallingMode::None => ToolChoice::None,
        google::FunctionCallingMode::Auto => ToolChoice::Auto,
        google::FunctionCallingMode::Any => match config.allowed_function_names.and_then(|names| {
            if names.len() == 1 { names.into_iter().next() } else { None }
        }) {
            Some(name) => ToolChoice::Named(name),
            None => ToolChoice::Any,
        },
    }
}

impl From<google::GenerateResponse> for Response {
    fn from(resp: google::GenerateResponse) -> Self {
        let candidate = resp.candidates.into_iter().next();
        let (content, stop_reason) = match candidate {
            Some(candidate) => {
                let call_ids = HashMap::new();
                let content = candidate.content.parts.into_iter().filter_map(|p| part_to_block(p, &call_ids)).collect();
                (content, candidate.finish_reason.map(Into::into).unwrap_or(crate::messages::unified::StopReason::EndTurn))
            }
            None => (Vec::new(), crate::messages::unified::StopReason::EndTurn),
        };

        let usage = resp.usage_metadata.unwrap_or_default();
        Response {
            id: String::new(),
            model: String::new(),
            stop_reason,
            stop_sequence: None,
            content,
            usage: Usage { input_tokens: usage.prompt_token_count, output_tokens: usage.candidates_token_count },
            provider_extras: resp.extras.into_map(),
        }
    }
}
