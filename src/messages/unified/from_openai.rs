//! O -> Canonical.

use std::collections::HashMap;

use crate::messages::openai;
use crate::messages::unified::{Block, Message, Request, Response, Role, Tool, ToolChoice, Usage};
use crate::schema::{self, SchemaDialect};

impl From<openai::ChatCompletionRequest> for Request {
    fn from(req: openai::ChatCompletionRequest) -> Self {
        let mut system = None;
        let mut messages = Vec::new();
        for message in req.messages {
            if message.role == openai::ChatRole::System {
                let text = message.content.unwrap_or_default();
                system = Some(match system {
                    Some(existing) => format!("{existing}\n{text}"),
                    None => text,
                });
                continue;
            }
            messages.push(message_from_openai(message));
        }

        Request {
            model: req.model,
            messages,
            max_tokens: req.max_tokens.filter(|&n| n != 0),
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: None,
            frequency_penalty: req.frequency_penalty,
            presence_penalty: req.presence_penalty,
            stop_sequences: req.stop,
            system,
            tools: req.tools.unwrap_or_default().into_iter().map(tool_from_openai).collect(),
            tool_choice: req.tool_choice.map(tool_choice_from_openai).unwrap_or_default(),
            stream: req.stream.unwrap_or(false),
            user_id: None,
            provider_extras: req.extras.into_map(),
        }
    }
}

fn message_from_openai(message: openai::ChatMessage) -> Message {
    if message.role == openai::ChatRole::Tool {
        return Message::new(
            Role::ToolResult,
            vec![Block::ToolResult {
                tool_use_id: message.tool_call_id.unwrap_or_default(),
                content: message.content.unwrap_or_default(),
                is_error: false,
            }],
        );
    }

    let role = match message.role {
        openai::ChatRole::User => Role::User,
        openai::ChatRole::Assistant => Role::Assistant,
        openai::ChatRole::System | openai::ChatRole::Tool => unreachable!("handled above"),
    };

    let mut content = Vec::new();
    if let Some(reasoning) = message.reasoning_content {
        content.push(Block::Thinking { id: None, text: reasoning });
    }
    if let Some(text) = message.content {
        content.push(Block::text(text));
    }
    for tool_call in message.tool_calls.unwrap_or_default() {
        let arguments = serde_json::from_str(&tool_call.function.arguments)
            .unwrap_or_else(|_| serde_json::Value::String(tool_call.function.arguments.clone()));
        content.push(Block::ToolUse { id: tool_call.id, name: tool_call.function.name, arguments });
    }

    Message::new(role, content)
}

fn tool_from_openai(tool: openai::Tool) -> Tool {
    let mut schema = tool.function.parameters.0;
    schema::normalize(&mut schema, SchemaDialect::Anthropic);
    Tool { name: tool.function.name, description: tool.function.description, input_schema: schema }
}

fn tool_choice_from_openai(choice: openai::ToolChoice) -> ToolChoice {
    match choice {
        openai::ToolChoice::Mode(openai::ToolChoiceMode::None) => ToolChoice::None,
        openai::ToolChoice::Mode(openai::ToolChoiceMode::Auto) => ToolChoice::Auto,
        openai::ToolChoice::Mode(openai::ToolChoiceMode::Required) => ToolChoice::Any,
        openai::ToolChoice::Mode(openai::ToolChoiceMode::Other(_)) => ToolChoice::Auto,
        openai::ToolChoice::Specific { function, .. } => ToolChoice::Named(function.name),
    }
}

impl From<openai::ChatCompletionResponse> for Response {
    fn from(resp: openai::ChatCompletionResponse) -> Self {
        let choice = resp.choices.into_iter().next();
        let (content, stop_reason) = match choice {
            Some(choice) => {
                let message = choice.message;
                let mut content = Vec::new();
                if let Some(reasoning) = message.reasoning_content {
                    content.push(Block::Thinking { id: None, text: reasoning });
                }
                if let Some(text) = message.content {
                    content.push(Block::text(text));
                }
                for tool_call in message.tool_calls.unwrap_or_default() {
                    let arguments = serde_json::from_str(&tool_call.function.arguments)
                        .unwrap_or_else(|_| serde_json::Value::String(tool_call.function.arguments.clone()));
                    content.push(Block::ToolUse { id: tool_call.id, name: tool_call.function.name, arguments });
                }
                (content, choice.finish_reason.into())
            }
            None => (Vec::new(), crate::messages::unified::StopReason::EndTurn),
        };

        Response {
            id: resp.id,
            model: resp.model,
            stop_reason,
            stop_sequence: None,
            content,
            usage: Usage { input_tokens: resp.usage.prompt_tokens, output_tokens: resp.usage.completion_tokens },
            provider_extras: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_message(role: openai::ChatRole, content: Option<&str>) -> openai::ChatMessage {
        openai::ChatMessage {
            role,
            content: content.map(String::from),
            tool_calls: None,
            tool_call_id: None,
            reasoning_content: None,
        }
    }

    #[test]
    fn system_message_is_extracted_from_the_list() {
        let req = openai::ChatCompletionRequest {
            model: "gpt-4o".into(),
            messages: vec![chat_message(openai::ChatRole::System, Some("be terse")), chat_message(openai::ChatRole::User, Some("hi"))],
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: None,
            stream: None,
            tools: None,
            tool_choice: None,
            parallel_tool_calls: None,
            extras: Default::default(),
        };
        let canonical: Request = req.into();
        assert_eq!(canonical.system.as_deref(), Some("be terse"));
        assert_eq!(canonical.messages.len(), 1);
    }

    #[test]
    fn tool_role_message_becomes_tool_result_message() {
        let mut message = chat_message(openai::ChatRole::Tool, Some("42"));
        message.tool_call_id = Some("call_1".into());
        let converted = message_from_openai(message);
        assert_eq!(converted.role, Role::ToolResult);
        assert!(matches!(&converted.content[0], Block::ToolResult { tool_use_id, .. } if tool_use_id == "call_1"));
    }

    #[test]
    fn reasoning_content_becomes_a_leading_thinking_block() {
        let mut message = chat_message(openai::ChatRole::Assistant, Some("42 is the answer"));
        message.reasoning_content = Some("let me think".into());
        let converted = message_from_openai(message);
        assert!(matches!(&converted.content[0], Block::Thinking { .. }));
        assert!(matches!(&converted.content[1], Block::Text { .. }));
    }

    #[test]
    fn required_tool_choice_maps_to_any() {
        assert_eq!(tool_choice_from_openai(openai::ToolChoice::Mode(openai::ToolChoiceMode::Required)), ToolChoice::Any);
    }
}
