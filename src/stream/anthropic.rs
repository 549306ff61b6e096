//! A as a stream source (parsing `StreamEvent`s into `Increment`s) and as a
//! stream destination (`AnthropicFramer`, emitting A-framing SSE).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use crate::error::{KernelError, Result};
use crate::messages::anthropic;
use crate::messages::unified::StopReason;
use crate::stream::increment::Increment;
use crate::stream::sink::FrameSink;
use crate::stream::state::{BlockIndexAllocator, ExtrasAccumulator, ToolArgsAccumulator, UsageAccumulator};
use crate::stream::Framer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceBlockKind {
    Text,
    Thinking,
    ToolUse,
}

/// Per-index bookkeeping for parsing an A source stream: the kernel needs
/// to remember what kind of block `content_block_start` opened so it can
/// interpret the untyped `delta` payload of later `content_block_delta`s.
#[derive(Debug, Default)]
pub struct SourceBlocks(HashMap<u32, SourceBlockKind>);

pub fn increments_from_event(event: anthropic::StreamEvent, state: &mut SourceBlocks) -> Result<Vec<Increment>> {
    match event {
        anthropic::StreamEvent::MessageStart { .. } | anthropic::StreamEvent::ContentBlockStop { .. } | anthropic::StreamEvent::Ping => {
            Ok(Vec::new())
        }

        anthropic::StreamEvent::ContentBlockStart { index, content_block } => match content_block {
            anthropic::Content::Text { .. } => {
                state.0.insert(index, SourceBlockKind::Text);
                Ok(Vec::new())
            }
            anthropic::Content::Thinking { .. } => {
                state.0.insert(index, SourceBlockKind::Thinking);
                Ok(Vec::new())
            }
            anthropic::Content::ToolUse { id, name, .. } => {
                state.0.insert(index, SourceBlockKind::ToolUse);
                Ok(vec![Increment::ToolStart { src_index: index as usize, id, name }])
            }
            anthropic::Content::Image { .. } | anthropic::Content::ToolResult { .. } => Ok(Vec::new()),
        },

        anthropic::StreamEvent::ContentBlockDelta { index, delta } => {
            let kind = state.0.get(&index).copied();
            let delta_type = delta.get("type").and_then(|v| v.as_str()).unwrap_or_default();
            match (kind, delta_type) {
                (Some(SourceBlockKind::Text), "text_delta") => {
                    let text = delta.get("text").and_then(|v| v.as_str()).unwrap_or_default();
                    Ok(vec![Increment::Text(text.to_string())])
                }
                (Some(SourceBlockKind::Thinking), "thinking_delta") => {
                    let text = delta.get("thinking").and_then(|v| v.as_str()).unwrap_or_default();
                    Ok(vec![Increment::Thinking(text.to_string())])
                }
                (Some(SourceBlockKind::ToolUse), "input_json_delta") => {
                    let fragment = delta.get("partial_json").and_then(|v| v.as_str()).unwrap_or_default();
                    Ok(vec![Increment::ToolArgsDelta { src_index: index as usize, fragment: fragment.to_string() }])
                }
                // signature_delta and any other per-block delta kind carry nothing
                // the canonical increment stream represents.
                _ => Ok(Vec::new()),
            }
        }

        anthropic::StreamEvent::MessageDelta { delta, usage } => {
            let mut out = vec![Increment::Usage { input_tokens: usage.input_tokens, output_tokens: usage.output_tokens }];
            for (key, value) in delta.extras.into_map() {
                out.push(Increment::Extra { key, value });
            }
            if let Some(stop_reason) = delta.stop_reason {
                out.push(Increment::Terminal { stop_reason: stop_reason.into() });
            }
            Ok(out)
        }

        anthropic::StreamEvent::MessageStop => Ok(Vec::new()),

        anthropic::StreamEvent::Error { error } => Err(KernelError::UpstreamProtocol(error.message)),
    }
}

#[derive(Debug, Default)]
pub struct AnthropicFramer {
    alloc: BlockIndexAllocator,
    tool_args: ToolArgsAccumulator,
    extras: ExtrasAccumulator,
    usage: UsageAccumulator,
    has_text_content: bool,
    finalized: bool,
}

fn sse_event(event_type: &str, data: serde_json::Value) -> String {
    format!("event: {event_type}\ndata: {data}\n\n")
}

impl Framer for AnthropicFramer {
    fn start(&mut self, model: &str, sink: &mut dyn FrameSink) -> Result<()> {
        let id = format!("msg_{}", SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0));
        let data = json!({
            "type": "message_start",
            "message": {
                "id": id,
                "type": "message",
                "role": "assistant",
                "content": [],
                "model": model,
                "usage": {"input_tokens": 0, "output_tokens": 0},
            }
        });
        sink.write_and_flush(&sse_event("message_start", data))
    }

    fn handle(&mut self, increment: Increment, sink: &mut dyn FrameSink) -> Result<()> {
        match increment {
            Increment::Text(text) => {
                self.has_text_content = true;
                if let Some(index) = self.alloc.allocate_text_block() {
                    sink.write_and_flush(&sse_event(
                        "content_block_start",
                        json!({"type": "content_block_start", "index": index, "content_block": {"type": "text", "text": ""}}),
                    ))?;
                }
                let index = self.alloc.text_block_index().expect("just allocated");
                sink.write_and_flush(&sse_event(
                    "content_block_delta",
                    json!({"type": "content_block_delta", "index": index, "delta": {"type": "text_delta", "text": text}}),
                ))
            }
            Increment::Thinking(text) => {
                if let Some(index) = self.alloc.allocate_thinking_block() {
                    sink.write_and_flush(&sse_event(
                        "content_block_start",
                        json!({"type": "content_block_start", "index": index, "content_block": {"type": "thinking", "thinking": ""}}),
                    ))?;
                }
                let index = self.alloc.thinking_block_index().expect("just allocated");
                sink.write_and_flush(&sse_event(
                    "content_block_delta",
                    json!({"type": "content_block_delta", "index": index, "delta": {"type": "thinking_delta", "thinking": text}}),
                ))
            }
            Increment::ToolStart { src_index, id, name } => {
                let (index, is_new) = self.alloc.tool_block_index(src_index);
                if is_new {
                    sink.write_and_flush(&sse_event(
                        "content_block_start",
                        json!({"type": "content_block_start", "index": index, "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}}}),
                    ))?;
                }
                Ok(())
            }
            Increment::ToolArgsDelta { src_index, fragment } => {
                let (index, is_new) = self.alloc.tool_block_index(src_index);
                if is_new {
                    sink.write_and_flush(&sse_event(
                        "content_block_start",
                        json!({"type": "content_block_start", "index": index, "content_block": {"type": "tool_use", "id": "", "name": "", "input": {}}}),
                    ))?;
                }
                self.tool_args.append(index, &fragment);
                sink.write_and_flush(&sse_event(
                    "content_block_delta",
                    json!({"type": "content_block_delta", "index": index, "delta": {"type": "input_json_delta", "partial_json": fragment}}),
                ))
            }
            Increment::Usage { input_tokens, output_tokens } => {
                self.usage.record(input_tokens, output_tokens);
                Ok(())
            }
            Increment::Extra { key, value } => {
                self.extras.record(key, value);
                Ok(())
            }
            Increment::Terminal { stop_reason } => self.finalize_with(Some(stop_reason), sink),
        }
    }

    fn error(&mut self, err: &KernelError, sink: &mut dyn FrameSink) -> Result<()> {
        sink.write_and_flush(&sse_event("error", json!({"type": "error", "error": {"type": err.kind(), "message": err.to_string()}})))
    }

    fn finalize(&mut self, sink: &mut dyn FrameSink) -> Result<()> {
        self.finalize_with(None, sink)
    }
}

impl AnthropicFramer {
    fn finalize_with(&mut self, stop_reason: Option<StopReason>, sink: &mut dyn FrameSink) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        for index in self.alloc.open_blocks_in_close_order() {
            sink.write_and_flush(&sse_event("content_block_stop", json!({"type": "content_block_stop", "index": index})))?;
        }

        let stop_reason: anthropic::StopReason = stop_reason.unwrap_or(StopReason::EndTurn).into();
        let usage = self.usage.get();
        let mut extras_obj = serde_json::Map::new();
        for (key, value) in std::mem::take(&mut self.extras).into_map() {
            extras_obj.insert(key, value);
        }

        let mut delta = json!({"stop_reason": stop_reason.to_string(), "stop_sequence": null});
        if let Some(obj) = delta.as_object_mut() {
            for (key, value) in extras_obj {
                obj.insert(key, value);
            }
        }

        sink.write_and_flush(&sse_event(
            "message_delta",
            json!({"type": "message_delta", "delta": delta, "usage": {"input_tokens": usage.input_tokens, "output_tokens": usage.output_tokens}}),
        ))?;

        sink.write_and_flush(&sse_event(
            "message_stop",
            json!({"type": "message_stop", "content": [], "usage": {"input_tokens": usage.input_tokens, "output_tokens": usage.output_tokens}, "stop_reason": stop_reason.to_string()}),
        ))?;

        sink.write_and_flush(&format!("data: {}\n\n", json!({"type": "message_stop"})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::sink::VecSink;

    #[test]
    fn text_increments_open_one_block_and_close_it_on_terminal() {
        let mut framer = AnthropicFramer::default();
        let mut sink = VecSink::default();
        framer.start("claude-3-5-sonnet", &mut sink).unwrap();
        framer.handle(Increment::Text("Hel".into()), &mut sink).unwrap();
        framer.handle(Increment::Text("lo".into()), &mut sink).unwrap();
        framer.handle(Increment::Terminal { stop_reason: StopReason::EndTurn }, &mut sink).unwrap();

        let joined = sink.joined();
        // Each frame repeats its type once in the `event:` line and once in the
        // JSON body, so one block-start frame contributes two occurrences.
        assert_eq!(joined.matches("content_block_start").count(), 2);
        assert_eq!(joined.matches("content_block_stop").count(), 2);
        assert!(joined.contains("\"text\":\"Hel\""));
        assert!(joined.contains("\"text\":\"lo\""));
        assert!(joined.ends_with("data: {\"type\":\"message_stop\"}\n\n"));
    }

    #[test]
    fn finalize_after_terminal_is_a_no_op() {
        let mut framer = AnthropicFramer::default();
        let mut sink = VecSink::default();
        framer.start("m", &mut sink).unwrap();
        framer.handle(Increment::Terminal { stop_reason: StopReason::EndTurn }, &mut sink).unwrap();
        let frames_after_terminal = sink.0.len();
        framer.finalize(&mut sink).unwrap();
        assert_eq!(sink.0.len(), frames_after_terminal);
    }

    #[test]
    fn thinking_block_opens_and_closes_before_text_block() {
        let mut framer = AnthropicFramer::default();
        let mut sink = VecSink::default();
        framer.start("m", &mut sink).unwrap();
        framer.handle(Increment::Thinking("hmm".into()), &mut sink).unwrap();
        framer.handle(Increment::Text("answer".into()), &mut sink).unwrap();
        framer.handle(Increment::Terminal { stop_reason: StopReason::EndTurn }, &mut sink).unwrap();

        let joined = sink.joined();
        assert!(joined.contains("\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}"));
        let thinking_stop = joined.find("\"type\":\"content_block_stop\",\"index\":0").unwrap();
        let text_stop = joined.find("\"type\":\"content_block_stop\",\"index\":1").unwrap();
        assert!(thinking_stop < text_stop);
        assert!(!joined.contains("\"thinking\":\"answer\""));
    }
}
