//! Canonical -> O.

use crate::finish_reason::openai_finish_reason_for;
use crate::messages::extras::Extras;
use crate::messages::openai;
use crate::messages::unified::{Block, Message, Request, Response, Role, ToolChoice};
use crate::schema::{self, SchemaDialect};

impl From<Request> for openai::ChatCompletionRequest {
    fn from(req: Request) -> Self {
        let mut messages = Vec::new();
        if let Some(system) = req.system {
            messages.push(openai::ChatMessage {
                role: openai::ChatRole::System,
                content: Some(system),
                tool_calls: None,
                tool_call_id: None,
                reasoning_content: None,
            });
        }
        for message in req.messages {
            messages.push(message_to_openai(message));
        }

        let tools_suppressed = req.tool_choice == ToolChoice::None;

        openai::ChatCompletionRequest {
            model: req.model,
            messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            top_p: req.top_p,
            frequency_penalty: req.frequency_penalty,
            presence_penalty: req.presence_penalty,
            stop: req.stop_sequences,
            stream: Some(req.stream),
            tools: (!tools_suppressed && !req.tools.is_empty())
                .then(|| req.tools.into_iter().map(tool_to_openai).collect()),
            tool_choice: (!tools_suppressed).then(|| tool_choice_to_openai(req.tool_choice)),
            parallel_tool_calls: None,
            extras: Extras::from(req.provider_extras),
        }
    }
}

/// Every canonical message maps to exactly one O message: a `ToolResult`-role
/// message becomes a `role:tool` message, everything else maps 1:1 with its
/// content blocks fanned into O's single-string-plus-tool_calls shape.
fn message_to_openai(message: Message) -> openai::ChatMessage {
    match message.role {
        Role::ToolResult => {
            let Block::ToolResult { tool_use_id, content, .. } =
                message.content.into_iter().next().unwrap_or(Block::ToolResult {
                    tool_use_id: String::new(),
                    content: String::new(),
                    is_error: false,
                })
            else {
                unreachable!("ToolResult-role message always carries a ToolResult block");
            };
            openai::ChatMessage {
                role: openai::ChatRole::Tool,
                content: Some(content),
                tool_calls: None,
                tool_call_id: Some(tool_use_id),
                reasoning_content: None,
            }
        }
        Role::System => {
            openai::ChatMessage { role: openai::ChatRole::System, content: Some(message.text()), tool_calls: None, tool_call_id: None, reasoning_content: None }
        }
        Role::User => {
            openai::ChatMessage { role: openai::ChatRole::User, content: Some(message.text()), tool_calls: None, tool_call_id: None, reasoning_content: None }
        }
        Role::Assistant => {
            let mut reasoning_content = None;
            let mut text_parts = Vec::new();
            let mut tool_calls = Vec::new();
            for block in message.content {
                match block {
                    Block::Thinking { text, .. } => reasoning_content = Some(text),
                    Block::Text { text, .. } => text_parts.push(text),
                    Block::ToolUse { id, name, arguments } => tool_calls.push(openai::ToolCall {
                        id,
                        tool_type: openai::ToolCallType::Function,
                        function: openai::FunctionCall { name, arguments: serde_json::to_string(&arguments).unwrap_or_default() },
                    }),
                    Block::Image { .. } | Block::ToolResult { .. } => {
                        log::warn!("dropping a block type O's assistant message shape cannot carry");
                    }
                }
            }
            openai::ChatMessage {
                role: openai::ChatRole::Assistant,
                content: (!text_parts.is_empty()).then(|| text_parts.concat()),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
                reasoning_content,
            }
        }
    }
}

fn tool_to_openai(tool: crate::messages::unified::Tool) -> openai::Tool {
    let mut schema = tool.input_schema;
    schema::normalize(&mut schema, SchemaDialect::OpenAi);
    if schema::is_empty_schema(&schema) {
        schema = schema::empty_object_schema();
    }
    openai::Tool {
        tool_type: openai::ToolCallType::Function,
        function: openai::FunctionDefinition { name: tool.name, description: tool.description, parameters: Box::new(openai::JsonSchema(schema)) },
    }
}

fn tool_choice_to_openai(choice: ToolChoice) -> openai::ToolChoice {
    match choice {
        ToolChoice::Auto => openai::ToolChoice::Mode(openai::ToolChoiceMode::Auto),
        ToolChoice::Any => openai::ToolChoice::Mode(openai::ToolChoiceMode::Required),
        ToolChoice::Named(name) => {
            openai::ToolChoice::Specific { tool_type: openai::ToolCallType::Function, function: openai::ToolChoiceFunction { name } }
        }
        ToolChoice::None => openai::ToolChoice::Mode(openai::ToolChoiceMode::None),
    }
}

impl From<Response> for openai::ChatCompletionResponse {
    fn from(resp: Response) -> Self {
        let finish_reason = openai_finish_reason_for(resp.stop_reason, &resp.content);
        let mut reasoning_content = None;
        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        for block in resp.content {
            match block {
                Block::Thinking { text, .. } => reasoning_content = Some(text),
                Block::Text { text, .. } => text_parts.push(text),
                Block::ToolUse { id, name, arguments } => tool_calls.push(openai::ToolCall {
                    id,
                    tool_type: openai::ToolCallType::Function,
                    function: openai::FunctionCall { name, arguments: serde_json::to_string(&arguments).unwrap_or_default() },
                }),
                Block::Image { .. } | Block::ToolResult { .. } => {}
            }
        }

        openai::ChatCompletionResponse {
            id: resp.id,
            object: openai::ObjectType::ChatCompletion,
            created: 0,
            model: resp.model,
            choices: vec![openai::ChatChoice {
                index: 0,
                message: openai::ChatMessage {
                    role: openai::ChatRole::Assistant,
                    content: (!text_parts.is_empty()).then(|| text_parts.concat()),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: None,
                    reasoning_content,
                },
                finish_reason,
            }],
            usage: openai::Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::unified::Usage;

    #[test]
    fn tool_result_message_becomes_role_tool() {
        let message = Message::new(
            Role::ToolResult,
            vec![Block::ToolResult { tool_use_id: "call_1".into(), content: "42".into(), is_error: false }],
        );
        let o = message_to_openai(message);
        assert_eq!(o.role, openai::ChatRole::Tool);
        assert_eq!(o.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn assistant_text_and_tool_use_merge_into_one_message() {
        let message = Message::new(
            Role::Assistant,
            vec![Block::text("checking..."), Block::ToolUse { id: "t1".into(), name: "search".into(), arguments: serde_json::json!({}) }],
        );
        let o = message_to_openai(message);
        assert_eq!(o.content.as_deref(), Some("checking..."));
        assert_eq!(o.tool_calls.unwrap().len(), 1);
    }

    #[test]
    fn response_upgrades_finish_reason_when_tool_use_present() {
        let resp = Response {
            id: "r1".into(),
            model: "m".into(),
            stop_reason: crate::messages::unified::StopReason::EndTurn,
            stop_sequence: None,
            content: vec![Block::ToolUse { id: "t1".into(), name: "f".into(), arguments: serde_json::json!({}) }],
            usage: Usage::default(),
            provider_extras: Default::default(),
        };
        let o: openai::ChatCompletionResponse = resp.into();
        assert_eq!(o.choices[0].finish_reason, openai::FinishReason::ToolCalls);
    }
}
