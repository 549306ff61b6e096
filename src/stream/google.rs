//! G as a stream source (parsing `StreamChunk`s into `Increment`s) and as a
//! stream destination (`GoogleFramer`, emitting G-framing SSE).
//!
//! Unlike A, G's wire chunks are genuinely incremental on the way in (each
//! part's `text` is a fragment, not a running snapshot) but the destination
//! framing re-emits a full snapshot on every change (see SPEC_FULL.md
//! §4.5), so the read and write sides of this module keep state shaped very
//! differently from each other.

use serde_json::json;
use uuid::Uuid;

use crate::error::Result;
use crate::messages::google;
use crate::messages::unified::StopReason;
use crate::stream::increment::Increment;
use crate::stream::sink::FrameSink;
use crate::stream::state::UsageAccumulator;
use crate::stream::Framer;

/// G's streaming `FunctionCall` parts don't carry a stable per-call index
/// the way O's do; the kernel assigns one by counting function calls seen
/// so far in this response, in arrival order.
#[derive(Debug, Default)]
pub struct SourceState(usize);

pub fn increments_from_chunk(chunk: google::StreamChunk, state: &mut SourceState) -> Result<Vec<Increment>> {
    let mut out = Vec::new();

    if let Some(usage) = chunk.usage_metadata {
        out.push(Increment::Usage { input_tokens: usage.prompt_token_count, output_tokens: usage.candidates_token_count });
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(out);
    };

    for part in candidate.content.parts {
        if let Some(call) = part.function_call {
            let src_index = state.0;
            state.0 += 1;
            let id = call.id.unwrap_or_else(|| format!("toolu_{}", Uuid::new_v4()));
            out.push(Increment::ToolStart { src_index, id, name: call.name });
            out.push(Increment::ToolArgsDelta { src_index, fragment: call.args.to_string() });
        } else if let Some(text) = part.text {
            out.push(Increment::Text(text));
        }
        // `functionResponse`/`inlineData` parts never appear on an assistant
        // stream; if an upstream sends one it's silently ignored rather than
        // treated as a protocol violation, since it carries no increment the
        // canonical model represents on this side.
    }

    if let Some(finish_reason) = candidate.finish_reason {
        out.push(Increment::Terminal { stop_reason: finish_reason.into() });
    }

    Ok(out)
}

#[derive(Debug, Clone, Default)]
struct RunningToolCall {
    id: String,
    name: String,
    args_json: String,
}

#[derive(Debug, Default)]
pub struct GoogleFramer {
    text: String,
    tool_calls: Vec<RunningToolCall>,
    usage: UsageAccumulator,
    finalized: bool,
}

impl GoogleFramer {
    fn snapshot(&self, finish_reason: Option<google::FinishReason>) -> serde_json::Value {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(json!({"text": self.text}));
        }
        for call in &self.tool_calls {
            let args: serde_json::Value = serde_json::from_str(&call.args_json).unwrap_or(serde_json::Value::Null);
            parts.push(json!({"functionCall": {"id": call.id, "name": call.name, "args": args}}));
        }

        let mut candidate = serde_json::Map::new();
        candidate.insert("content".into(), json!({"parts": parts, "role": "model"}));
        candidate.insert("index".into(), json!(0));
        if let Some(reason) = finish_reason {
            candidate.insert("finishReason".into(), json!(reason));
        }

        let usage = self.usage.get();
        json!({
            "candidates": [candidate],
            "usageMetadata": {
                "promptTokenCount": usage.input_tokens,
                "candidatesTokenCount": usage.output_tokens,
                "totalTokenCount": usage.input_tokens + usage.output_tokens,
            },
        })
    }
}

fn sse_data(value: serde_json::Value) -> String {
    format!("data: {value}\n\n")
}

impl Framer for GoogleFramer {
    fn start(&mut self, _model: &str, _sink: &mut dyn FrameSink) -> Result<()> {
        Ok(())
    }

    fn handle(&mut self, increment: Increment, sink: &mut dyn FrameSink) -> Result<()> {
        match increment {
            Increment::Text(text) => {
                self.text.push_str(&text);
            }
            Increment::Thinking(_text) => {
                // G has no dedicated reasoning part type; dropped rather than
                // ever surfaced in a snapshot.
                return Ok(());
            }
            Increment::ToolStart { src_index, id, name } => {
                if self.tool_calls.len() <= src_index {
                    self.tool_calls.resize(src_index + 1, RunningToolCall::default());
                }
                self.tool_calls[src_index] = RunningToolCall { id, name, args_json: String::new() };
            }
            Increment::ToolArgsDelta { src_index, fragment } => {
                if self.tool_calls.len() <= src_index {
                    self.tool_calls.resize(src_index + 1, RunningToolCall::default());
                }
                self.tool_calls[src_index].args_json.push_str(&fragment);
            }
            Increment::Usage { input_tokens, output_tokens } => {
                self.usage.record(input_tokens, output_tokens);
                return Ok(());
            }
            Increment::Extra { .. } => {
                // No generic extras slot on the G candidate shape the kernel
                // targets; vendor extras are dropped on this destination.
                return Ok(());
            }
            Increment::Terminal { stop_reason } => return self.finalize_with(Some(stop_reason), sink),
        }

        sink.write_and_flush(&sse_data(self.snapshot(None)))
    }

    fn error(&mut self, err: &crate::error::KernelError, sink: &mut dyn FrameSink) -> Result<()> {
        sink.write_and_flush(&sse_data(json!({"error": {"code": 500, "message": err.to_string(), "status": err.kind()}})))
    }

    fn finalize(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        self.finalize_with(None, sink)
    }
}

impl GoogleFramer {
    fn finalize_with(&mut self, stop_reason: Option<StopReason>, sink: &mut dyn FrameSink) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        let reason: google::FinishReason = stop_reason.unwrap_or(StopReason::EndTurn).into();
        sink.write_and_flush(&sse_data(self.snapshot(Some(reason))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::sink::VecSink;

    #[test]
    fn snapshot_grows_with_each_text_increment() {
        let mut framer = GoogleFramer::default();
        let mut sink = VecSink::default();
        framer.start("gemini-1.5-pro", &mut sink).unwrap();
        framer.handle(Increment::Text("Hel".into()), &mut sink).unwrap();
        framer.handle(Increment::Text("lo".into()), &mut sink).unwrap();
        framer.handle(Increment::Terminal { stop_reason: StopReason::EndTurn }, &mut sink).unwrap();

        assert_eq!(sink.0[0], sse_data(json!({"candidates": [{"content": {"parts": [{"text": "Hel"}], "role": "model"}, "index": 0}], "usageMetadata": {"promptTokenCount": 0, "candidatesTokenCount": 0, "totalTokenCount": 0}})));
        let last = sink.0.last().unwrap();
        assert!(last.contains("\"text\":\"Hello\""));
        assert!(last.contains("\"finishReason\":\"STOP\""));
    }

    #[test]
    fn terminal_snapshot_includes_accumulated_tool_call() {
        let mut framer = GoogleFramer::default();
        let mut sink = VecSink::default();
        framer.start("gemini-1.5-pro", &mut sink).unwrap();
        framer.handle(Increment::ToolStart { src_index: 0, id: "call_1".into(), name: "search".into() }, &mut sink).unwrap();
        framer.handle(Increment::ToolArgsDelta { src_index: 0, fragment: "{\"q\":\"x\"}".into() }, &mut sink).unwrap();
        framer.handle(Increment::Terminal { stop_reason: StopReason::ToolUse }, &mut sink).unwrap();

        let last = sink.0.last().unwrap();
        assert!(last.contains("\"functionCall\""));
        assert!(last.contains("\"name\":\"search\""));
        assert!(last.contains("\"q\":\"x\""));
    }

    #[test]
    fn increments_from_chunk_counts_function_calls_across_parts() {
        let mut state = SourceState::default();
        let chunk = google::StreamChunk {
            candidates: vec![google::Candidate {
                content: google::Content {
                    parts: vec![google::Part::function_call(google::FunctionCall {
                        id: None,
                        name: "search".into(),
                        args: serde_json::json!({"q": "x"}),
                        thought_signature: None,
                    })],
                    role: Some(google::Role::Model),
                },
                finish_reason: None,
                index: 0,
            }],
            usage_metadata: None,
            extras: Default::default(),
        };
        let increments = increments_from_chunk(chunk, &mut state).unwrap();
        assert!(matches!(&increments[0], Increment::ToolStart { src_index: 0, name, .. } if name == "search"));
    }
}
