//! Finish/stop reason mapping across the three taxonomies.

use crate::messages::unified::StopReason;
use crate::messages::{anthropic, google, openai};

impl From<anthropic::StopReason> for StopReason {
    fn from(reason: anthropic::StopReason) -> Self {
        match reason {
            anthropic::StopReason::EndTurn | anthropic::StopReason::StopSequence => StopReason::EndTurn,
            anthropic::StopReason::MaxTokens => StopReason::MaxTokens,
            anthropic::StopReason::ToolUse => StopReason::ToolUse,
            anthropic::StopReason::ContentFilter | anthropic::StopReason::Refusal => StopReason::ContentFilter,
        }
    }
}

impl From<StopReason> for anthropic::StopReason {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::EndTurn | StopReason::Other => anthropic::StopReason::EndTurn,
            StopReason::MaxTokens => anthropic::StopReason::MaxTokens,
            StopReason::ToolUse => anthropic::StopReason::ToolUse,
            StopReason::ContentFilter => anthropic::StopReason::ContentFilter,
        }
    }
}

impl From<openai::FinishReason> for StopReason {
    fn from(reason: openai::FinishReason) -> Self {
        match reason {
            openai::FinishReason::Stop => StopReason::EndTurn,
            openai::FinishReason::Length => StopReason::MaxTokens,
            openai::FinishReason::ToolCalls => StopReason::ToolUse,
            openai::FinishReason::ContentFilter => StopReason::ContentFilter,
        }
    }
}

impl From<StopReason> for openai::FinishReason {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::EndTurn | StopReason::Other => openai::FinishReason::Stop,
            StopReason::MaxTokens => openai::FinishReason::Length,
            StopReason::ToolUse => openai::FinishReason::ToolCalls,
            StopReason::ContentFilter => openai::FinishReason::ContentFilter,
        }
    }
}

impl From<google::FinishReason> for StopReason {
    fn from(reason: google::FinishReason) -> Self {
        match reason {
            google::FinishReason::Stop => StopReason::EndTurn,
            google::FinishReason::MaxTokens => StopReason::MaxTokens,
            google::FinishReason::Safety => StopReason::ContentFilter,
            google::FinishReason::Recitation | google::FinishReason::Other => StopReason::Other,
        }
    }
}

impl From<StopReason> for google::FinishReason {
    fn from(reason: StopReason) -> Self {
        match reason {
            // STOP also covers ToolUse: G signals a function call via the presence
            // of FunctionCall parts, not a dedicated finish reason.
            StopReason::EndTurn | StopReason::ToolUse => google::FinishReason::Stop,
            StopReason::MaxTokens => google::FinishReason::MaxTokens,
            StopReason::ContentFilter => google::FinishReason::Safety,
            StopReason::Other => google::FinishReason::Other,
        }
    }
}

/// If the destination is O and the final message carries any `tool_use`
/// blocks, upgrade a non-`tool_calls` finish reason to `tool_calls`: O has
/// no separate signal for "the model wants to call a tool" other than the
/// finish reason itself.
pub fn openai_finish_reason_for(stop_reason: StopReason, content: &[crate::messages::unified::Block]) -> openai::FinishReason {
    let has_tool_use = content.iter().any(|b| matches!(b, crate::messages::unified::Block::ToolUse { .. }));
    if has_tool_use {
        openai::FinishReason::ToolCalls
    } else {
        stop_reason.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_reason_map_round_trips_through_anthropic() {
        for reason in [StopReason::EndTurn, StopReason::MaxTokens, StopReason::ToolUse, StopReason::ContentFilter] {
            let a: anthropic::StopReason = reason.into();
            let back: StopReason = a.into();
            assert_eq!(back, reason);
        }
    }

    #[test]
    fn unknown_finish_reasons_map_to_other_or_end_turn() {
        let canonical: StopReason = google::FinishReason::Recitation.into();
        assert_eq!(canonical, StopReason::Other);
        let a: anthropic::StopReason = canonical.into();
        assert_eq!(a, anthropic::StopReason::EndTurn);
    }

    #[test]
    fn idempotent_mapping_a_to_o_to_a() {
        for reason in [StopReason::EndTurn, StopReason::MaxTokens, StopReason::ToolUse, StopReason::ContentFilter] {
            let a: anthropic::StopReason = reason.into();
            let canonical_again: StopReason = a.into();
            let o: openai::FinishReason = canonical_again.into();
            let canonical_back: StopReason = o.into();
            let a_again: anthropic::StopReason = canonical_back.into();
            assert_eq!(a, a_again);
        }
    }

    #[test]
    fn openai_upgrades_finish_reason_when_tool_use_present() {
        let content = vec![crate::messages::unified::Block::ToolUse {
            id: "t1".into(),
            name: "f".into(),
            arguments: serde_json::json!({}),
        }];
        assert_eq!(openai_finish_reason_for(StopReason::EndTurn, &content), openai::FinishReason::ToolCalls);
    }
}
