//! Per-field reducers that merge a step's partial update into the state

use std::ops::Range;

use crate::state::{ConversationState, PartialState};

/// Index ranges of entries appended by a merge
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeReport {
    pub messages: Range<usize>,
    pub streaming_messages: Range<usize>,
}

/// Last write wins; an absent update keeps the old value.
fn last_write<T>(slot: &mut T, update: Option<T>) {
    if let Some(value) = update {
        *slot = value;
    }
}

/// Like [`last_write`] for optional state fields.
fn last_write_opt<T>(slot: &mut Option<T>, update: Option<T>) {
    if update.is_some() {
        *slot = update;
    }
}

/// Concatenate new entries after the existing ones.
fn append<T>(seq: &mut Vec<T>, update: Vec<T>) -> Range<usize> {
    let start = seq.len();
    seq.extend(update);
    start..seq.len()
}

/// Merge `update` into `state` and report what was appended.
pub fn merge(state: &mut ConversationState, update: PartialState) -> MergeReport {
    let PartialState {
        messages,
        stream_name,
        filter_criteria,
        intent,
        tool_args,
        tool_result,
        next_step,
        error,
        streaming_messages,
        final_result,
        awaiting_choice,
    } = update;

    last_write(&mut state.stream_name, stream_name);
    if let Some(filters) = filter_criteria {
        state.filter_criteria.extend(filters);
    }
    last_write_opt(&mut state.intent, intent);
    last_write_opt(&mut state.tool_args, tool_args);
    last_write_opt(&mut state.tool_result, tool_result);
    last_write_opt(&mut state.next_step, next_step);
    last_write(&mut state.error, error);
    last_write_opt(&mut state.final_result, final_result);
    last_write(&mut state.awaiting_choice, awaiting_choice);

    MergeReport {
        messages: append(&mut state.messages, messages),
        streaming_messages: append(&mut state.streaming_messages, streaming_messages),
    }
}
