//! The abstract unit the streaming kernel's state machine consumes,
//! independent of which wire protocol produced it. Parsing an upstream
//! event into zero or more `Increment`s is the only protocol-specific part
//! of the read side; every destination framer consumes the same enum.

use crate::messages::unified::StopReason;

#[derive(Debug, Clone, PartialEq)]
pub enum Increment {
    Text(String),
    Thinking(String),
    ToolStart { src_index: usize, id: String, name: String },
    ToolArgsDelta { src_index: usize, fragment: String },
    Usage { input_tokens: u32, output_tokens: u32 },
    /// A vendor extra seen on a delta, not already modeled by a dedicated
    /// variant above (e.g. a field a specific upstream adds to its chunks).
    Extra { key: String, value: serde_json::Value },
    Terminal { stop_reason: StopReason },
}
