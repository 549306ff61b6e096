//! Shared streaming state: block-index allocation, tool-argument fragment
//! accumulation, and usage/extras bookkeeping. Framing (SSE byte layout) is
//! kept out of this module entirely; each destination framer owns its own
//! serialization and calls into these small mutation methods.

use std::collections::HashMap;

use crate::messages::unified::Usage;

/// Block-index bookkeeping for A-framing, where every open content block
/// needs a stable index from `content_block_start` through
/// `content_block_stop`. O- and G-framing don't need this (O addresses tool
/// calls by their own running index; G re-emits a full snapshot each time),
/// but they reuse `usage` and `extras` below.
#[derive(Debug, Default)]
pub struct BlockIndexAllocator {
    next_block_index: u32,
    text_block_index: Option<u32>,
    thinking_block_index: Option<u32>,
    tool_block_index_by_src: HashMap<usize, u32>,
    /// Insertion order of tool block dst indices, so terminal close-out can
    /// walk them in ascending order without sorting a hash map's keys.
    tool_block_order: Vec<u32>,
}

impl BlockIndexAllocator {
    /// Returns `Some(index)` the first time it's called (the block needs a
    /// `content_block_start`), `None` on every subsequent call for the same
    /// block kind.
    pub fn allocate_text_block(&mut self) -> Option<u32> {
        if self.text_block_index.is_some() {
            return None;
        }
        let index = self.next_block_index;
        self.next_block_index += 1;
        self.text_block_index = Some(index);
        Some(index)
    }

    pub fn text_block_index(&self) -> Option<u32> {
        self.text_block_index
    }

    pub fn allocate_thinking_block(&mut self) -> Option<u32> {
        if self.thinking_block_index.is_some() {
            return None;
        }
        let index = self.next_block_index;
        self.next_block_index += 1;
        self.thinking_block_index = Some(index);
        Some(index)
    }

    pub fn thinking_block_index(&self) -> Option<u32> {
        self.thinking_block_index
    }

    /// Returns `(dst_index, is_new)`. `is_new` tells the caller whether to
    /// emit a `content_block_start` before the delta.
    pub fn tool_block_index(&mut self, src_index: usize) -> (u32, bool) {
        if let Some(&dst_index) = self.tool_block_index_by_src.get(&src_index) {
            return (dst_index, false);
        }
        let dst_index = self.next_block_index;
        self.next_block_index += 1;
        self.tool_block_index_by_src.insert(src_index, dst_index);
        self.tool_block_order.push(dst_index);
        (dst_index, true)
    }

    /// All open block indices, in the close-out order terminal flush uses:
    /// thinking first, then text, then tool blocks by ascending dst_index.
    pub fn open_blocks_in_close_order(&self) -> Vec<u32> {
        let mut out = Vec::new();
        out.extend(self.thinking_block_index);
        out.extend(self.text_block_index);
        out.extend(self.tool_block_order.iter().copied());
        out
    }
}

/// Per-call tool argument fragment accumulation, keyed by destination block
/// index. Not required for correctness of the streamed output (each
/// fragment is forwarded as it arrives) but kept so a framer can include the
/// fully-assembled arguments in a final snapshot if its wire format wants one.
#[derive(Debug, Default)]
pub struct ToolArgsAccumulator(HashMap<u32, String>);

impl ToolArgsAccumulator {
    pub fn append(&mut self, dst_index: u32, fragment: &str) {
        self.0.entry(dst_index).or_default().push_str(fragment);
    }

    pub fn get(&self, dst_index: u32) -> Option<&str> {
        self.0.get(&dst_index).map(String::as_str)
    }
}

/// Vendor extras observed on deltas mid-stream, surfaced once on the
/// terminal frame rather than duplicated on every chunk.
#[derive(Debug, Default)]
pub struct ExtrasAccumulator(HashMap<String, serde_json::Value>);

impl ExtrasAccumulator {
    pub fn record(&mut self, key: String, value: serde_json::Value) {
        self.0.insert(key, value);
    }

    pub fn into_map(self) -> HashMap<String, serde_json::Value> {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct UsageAccumulator(Usage);

impl UsageAccumulator {
    pub fn record(&mut self, input_tokens: u32, output_tokens: u32) {
        if input_tokens != 0 {
            self.0.input_tokens = input_tokens;
        }
        if output_tokens != 0 {
            self.0.output_tokens = output_tokens;
        }
    }

    pub fn get(&self) -> Usage {
        self.0
    }
}
