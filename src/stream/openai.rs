//! O as a stream source (parsing `ChatCompletionChunk`s into `Increment`s)
//! and as a stream destination (`OpenAiFramer`, emitting O-framing SSE).

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use crate::error::{KernelError, Result};
use crate::finish_reason::openai_finish_reason_for;
use crate::messages::openai;
use crate::messages::unified::{Block, StopReason};
use crate::stream::increment::Increment;
use crate::stream::sink::FrameSink;
use crate::stream::state::{ExtrasAccumulator, UsageAccumulator};
use crate::stream::Framer;

/// O streams every tool call fragment with its own stable `index`; unlike A
/// there is no separate "open a block" event, so the only state a source
/// parser needs is which indices have already produced a `ToolStart`.
#[derive(Debug, Default)]
pub struct SourceState(HashSet<usize>);

pub fn increments_from_chunk(chunk: openai::ChatCompletionChunk, state: &mut SourceState) -> Result<Vec<Increment>> {
    let mut out = Vec::new();

    if let Some(usage) = chunk.usage {
        out.push(Increment::Usage { input_tokens: usage.prompt_tokens, output_tokens: usage.completion_tokens });
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(out);
    };

    let delta = choice.delta;

    if let Some(reasoning) = delta.reasoning_content {
        out.push(Increment::Thinking(reasoning));
    }
    if let Some(text) = delta.content {
        out.push(Increment::Text(text));
    }

    for tool_call in delta.tool_calls.unwrap_or_default() {
        match tool_call {
            openai::StreamingToolCall::Start { index, id, function, .. } => {
                state.0.insert(index);
                out.push(Increment::ToolStart { src_index: index, id, name: function.name });
                if !function.arguments.is_empty() {
                    out.push(Increment::ToolArgsDelta { src_index: index, fragment: function.arguments });
                }
            }
            openai::StreamingToolCall::Delta { index, function } => {
                if !state.0.contains(&index) {
                    return Err(KernelError::UpstreamProtocol(format!(
                        "tool call fragment referenced index {index} before it was started"
                    )));
                }
                out.push(Increment::ToolArgsDelta { src_index: index, fragment: function.arguments });
            }
        }
    }

    for (key, value) in delta.extras.into_map() {
        out.push(Increment::Extra { key, value });
    }

    if let Some(finish_reason) = choice.finish_reason {
        out.push(Increment::Terminal { stop_reason: finish_reason.into() });
    }

    Ok(out)
}

#[derive(Debug, Default)]
pub struct OpenAiFramer {
    id: String,
    model: String,
    created: u64,
    role_emitted: bool,
    seen_tool_indices: HashSet<usize>,
    usage: UsageAccumulator,
    extras: ExtrasAccumulator,
    content: Vec<Block>,
    finalized: bool,
}

fn sse_data(value: serde_json::Value) -> String {
    format!("data: {value}\n\n")
}

impl OpenAiFramer {
    fn chunk_envelope(&self, choice: serde_json::Value) -> serde_json::Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [choice],
        })
    }
}

impl Framer for OpenAiFramer {
    fn start(&mut self, model: &str, _sink: &mut dyn FrameSink) -> Result<()> {
        self.id = format!("chatcmpl_{}", SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0));
        self.model = model.to_string();
        self.created = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        Ok(())
    }

    fn handle(&mut self, increment: Increment, sink: &mut dyn FrameSink) -> Result<()> {
        let mut delta = serde_json::Map::new();
        if !self.role_emitted {
            delta.insert("role".into(), json!("assistant"));
            self.role_emitted = true;
        }

        match increment {
            Increment::Text(text) => {
                delta.insert("content".into(), json!(text));
            }
            Increment::Thinking(text) => {
                delta.insert("reasoning_content".into(), json!(text));
            }
            Increment::ToolStart { src_index, id, name } => {
                let is_new = self.seen_tool_indices.insert(src_index);
                if !is_new {
                    return Ok(());
                }
                self.content.push(Block::ToolUse { id: id.clone(), name: name.clone(), arguments: json!({}) });
                delta.insert(
                    "tool_calls".into(),
                    json!([{"index": src_index, "id": id, "type": "function", "function": {"name": name, "arguments": ""}}]),
                );
            }
            Increment::ToolArgsDelta { src_index, fragment } => {
                delta.insert("tool_calls".into(), json!([{"index": src_index, "function": {"arguments": fragment}}]));
            }
            Increment::Usage { input_tokens, output_tokens } => {
                self.usage.record(input_tokens, output_tokens);
                return Ok(());
            }
            Increment::Extra { key, value } => {
                self.extras.record(key, value);
                return Ok(());
            }
            Increment::Terminal { stop_reason } => return self.finalize_with(Some(stop_reason), sink),
        }

        let choice = json!({"index": 0, "delta": delta, "finish_reason": null});
        sink.write_and_flush(&sse_data(self.chunk_envelope(choice)))
    }

    fn error(&mut self, err: &KernelError, sink: &mut dyn FrameSink) -> Result<()> {
        sink.write_and_flush(&sse_data(json!({"error": {"message": err.to_string(), "type": err.kind()}})))?;
        sink.write_and_flush(&sse_data(json!("[DONE]")))
    }

    fn finalize(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        self.finalize_with(None, sink)
    }
}

impl OpenAiFramer {
    fn finalize_with(&mut self, stop_reason: Option<StopReason>, sink: &mut dyn FrameSink) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        let finish_reason: openai::FinishReason = match stop_reason {
            Some(reason) => openai_finish_reason_for(reason, &self.content),
            None => openai::FinishReason::Stop,
        };

        let usage = self.usage.get();
        let mut choice = serde_json::Map::new();
        choice.insert("index".into(), json!(0));
        choice.insert("delta".into(), json!({}));
        choice.insert("finish_reason".into(), json!(finish_reason));
        for (key, value) in std::mem::take(&mut self.extras).into_map() {
            choice.insert(key, value);
        }

        let mut envelope = self.chunk_envelope(serde_json::Value::Object(choice));
        if let Some(obj) = envelope.as_object_mut() {
            obj.insert(
                "usage".into(),
                json!({"prompt_tokens": usage.input_tokens, "completion_tokens": usage.output_tokens, "total_tokens": usage.input_tokens + usage.output_tokens}),
            );
        }

        sink.write_and_flush(&sse_data(envelope))?;
        sink.write_and_flush(&sse_data(json!("[DONE]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::sink::VecSink;

    #[test]
    fn text_increments_stream_as_content_deltas_and_terminate_with_done() {
        let mut framer = OpenAiFramer::default();
        let mut sink = VecSink::default();
        framer.start("gpt-4o", &mut sink).unwrap();
        framer.handle(Increment::Text("Hel".into()), &mut sink).unwrap();
        framer.handle(Increment::Text("lo".into()), &mut sink).unwrap();
        framer.handle(Increment::Terminal { stop_reason: StopReason::EndTurn }, &mut sink).unwrap();

        let joined = sink.joined();
        assert!(joined.contains("\"role\":\"assistant\""));
        assert!(joined.contains("\"content\":\"Hel\""));
        assert!(joined.contains("\"content\":\"lo\""));
        assert!(joined.contains("\"finish_reason\":\"stop\""));
        assert!(joined.ends_with("data: \"[DONE]\"\n\n"));
    }

    #[test]
    fn tool_start_only_emits_id_and_name_once() {
        let mut framer = OpenAiFramer::default();
        let mut sink = VecSink::default();
        framer.start("gpt-4o", &mut sink).unwrap();
        framer.handle(Increment::ToolStart { src_index: 0, id: "call_1".into(), name: "search".into() }, &mut sink).unwrap();
        framer.handle(Increment::ToolArgsDelta { src_index: 0, fragment: "{\"q\":".into() }, &mut sink).unwrap();
        framer.handle(Increment::ToolArgsDelta { src_index: 0, fragment: "\"x\"}".into() }, &mut sink).unwrap();

        let joined = sink.joined();
        assert_eq!(joined.matches("\"id\":\"call_1\"").count(), 1);
        assert_eq!(joined.matches("\"name\":\"search\"").count(), 1);
        assert!(joined.contains("\"arguments\":\"{\\\"q\\\":\""));
    }

    #[test]
    fn finish_reason_upgrades_to_tool_calls_when_content_present() {
        let mut framer = OpenAiFramer::default();
        let mut sink = VecSink::default();
        framer.content = vec![Block::ToolUse { id: "t1".into(), name: "f".into(), arguments: serde_json::json!({}) }];
        framer.start("gpt-4o", &mut sink).unwrap();
        framer.finalize_with(Some(StopReason::EndTurn), &mut sink).unwrap();
        assert!(sink.joined().contains("\"finish_reason\":\"tool_calls\""));
    }

    #[test]
    fn finish_reason_upgrades_to_tool_calls_from_a_live_tool_start_increment() {
        let mut framer = OpenAiFramer::default();
        let mut sink = VecSink::default();
        framer.start("gpt-4o", &mut sink).unwrap();
        framer.handle(Increment::ToolStart { src_index: 0, id: "call_1".into(), name: "search".into() }, &mut sink).unwrap();
        framer.handle(Increment::Terminal { stop_reason: StopReason::EndTurn }, &mut sink).unwrap();
        assert!(sink.joined().contains("\"finish_reason\":\"tool_calls\""));
    }
}
