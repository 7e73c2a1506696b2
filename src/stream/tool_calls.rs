//! Reassembly of tool calls from streamed fragments.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::types::{ToolCall, ToolCallDelta};
use crate::util::ids;

#[derive(Debug, Clone, Default)]
struct Slot {
    id: Option<String>,
    /// Set once a synthesized id has been handed out. From then on the id is
    /// frozen: later backend ids are ignored instead of overwriting it, so every
    /// fragment already relayed under the synthesized id still names this call.
    id_synthesized: bool,
    kind: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Read-only view of a partially assembled call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialToolCall<'a> {
    pub index: usize,
    pub id: Option<&'a str>,
    pub name: Option<&'a str>,
    pub arguments: &'a str,
}

/// Accumulates [`ToolCallDelta`]s keyed by their stream-local index.
///
/// Ids are stable from the moment a consumer can observe them: a call that
/// starts without an id gets a synthesized `call_<hex>` id, and a backend id
/// arriving afterwards does not replace it.
#[derive(Debug, Clone, Default)]
pub struct ToolCallAccumulator {
    slots: BTreeMap<usize, Slot>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta into its slot. Returns the id if one was synthesized.
    pub fn process_delta(&mut self, delta: &ToolCallDelta) -> Option<String> {
        let slot = self.slots.entry(delta.index).or_default();

        if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
            // Backend ids overwrite earlier ones unless the id is already frozen.
            if !slot.id_synthesized {
                slot.id = Some(id.to_string());
            }
        }
        if let Some(kind) = delta.kind.as_deref().filter(|kind| !kind.is_empty()) {
            slot.kind = Some(kind.to_string());
        }

        let mut touched = false;
        if let Some(function) = &delta.function {
            if let Some(name) = function.name.as_deref().filter(|name| !name.is_empty()) {
                slot.name = Some(name.to_string());
                touched = true;
            }
            if let Some(fragment) = function.arguments.as_deref() {
                slot.arguments.push_str(fragment);
                touched |= !fragment.is_empty();
            }
        }

        if touched && slot.id.is_none() {
            let id = ids::tool_call_id();
            slot.id = Some(id.clone());
            slot.id_synthesized = true;
            return Some(id);
        }
        None
    }

    /// Complete calls sorted by index, skipping slots that never got a name.
    ///
    /// Argument text that is not a JSON object yields an empty mapping.
    pub fn finalize(&self) -> Vec<ToolCall> {
        self.slots
            .iter()
            .filter_map(|(index, slot)| {
                let name = slot.name.as_deref()?;
                let mut call = ToolCall::new(
                    slot.id.clone().unwrap_or_else(ids::tool_call_id),
                    name,
                    parse_arguments(*index, name, &slot.arguments),
                );
                if let Some(kind) = &slot.kind {
                    call.kind = kind.clone();
                }
                Some(call)
            })
            .collect()
    }

    pub fn slot(&self, index: usize) -> Option<PartialToolCall<'_>> {
        self.slots.get(&index).map(|slot| PartialToolCall {
            index,
            id: slot.id.as_deref(),
            name: slot.name.as_deref(),
            arguments: &slot.arguments,
        })
    }

    pub fn max_index(&self) -> Option<usize> {
        self.slots.keys().next_back().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn parse_arguments(index: usize, name: &str, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            warn!(index, tool = name, "tool call arguments are not a JSON object");
            Map::new()
        }
        Err(e) => {
            warn!(index, tool = name, error = %e, "unparseable tool call arguments");
            Map::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn fragments_concatenate_into_arguments() {
        let mut acc = ToolCallAccumulator::new();
        acc.process_delta(&ToolCallDelta::start(0, Some("call_a"), "lookup"));
        acc.process_delta(&ToolCallDelta::arguments(0, "{\"a\":1"));
        acc.process_delta(&ToolCallDelta::arguments(0, "}"));

        let calls = acc.finalize();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].name(), "lookup");
        assert_eq!(Value::Object(calls[0].function.arguments.clone()), json!({"a": 1}));
    }

    #[test]
    fn broken_json_finalizes_to_empty_mapping() {
        let mut acc = ToolCallAccumulator::new();
        acc.process_delta(&ToolCallDelta::start(0, Some("call_a"), "lookup"));
        acc.process_delta(&ToolCallDelta::arguments(0, "{\"a\":"));
        let calls = acc.finalize();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].function.arguments.is_empty());
    }

    #[test]
    fn calls_sorted_by_index_and_nameless_slots_skipped() {
        let mut acc = ToolCallAccumulator::new();
        acc.process_delta(&ToolCallDelta::start(2, Some("c2"), "second"));
        acc.process_delta(&ToolCallDelta::start(0, Some("c0"), "first"));
        acc.process_delta(&ToolCallDelta {
            index: 1,
            id: Some("c1".into()),
            ..Default::default()
        });

        let names: Vec<String> = acc
            .finalize()
            .into_iter()
            .map(|call| call.function.name)
            .collect();
        assert_eq!(names, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(acc.max_index(), Some(2));
    }

    #[test]
    fn missing_id_is_synthesized_once_and_kept() {
        let mut acc = ToolCallAccumulator::new();
        let synthesized = acc
            .process_delta(&ToolCallDelta::start(0, None, "lookup"))
            .expect("id synthesized on first named delta");
        assert!(synthesized.starts_with("call_"));

        assert_eq!(acc.process_delta(&ToolCallDelta::arguments(0, "{}")), None);
        acc.process_delta(&ToolCallDelta {
            index: 0,
            id: Some("late_backend_id".into()),
            ..Default::default()
        });
        assert_eq!(acc.slot(0).unwrap().id, Some(synthesized.as_str()));
        assert_eq!(acc.finalize()[0].id, synthesized);
    }

    #[test]
    fn later_name_and_id_overwrite_earlier_values() {
        let mut acc = ToolCallAccumulator::new();
        acc.process_delta(&ToolCallDelta::start(0, Some("first_id"), "draft"));
        acc.process_delta(&ToolCallDelta::start(0, Some("final_id"), "final"));
        acc.process_delta(&ToolCallDelta::start(0, Some(""), ""));
        let call = &acc.finalize()[0];
        assert_eq!(call.id, "final_id");
        assert_eq!(call.name(), "final");
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut acc = ToolCallAccumulator::new();
        acc.process_delta(&ToolCallDelta::start(0, None, "lookup"));
        acc.process_delta(&ToolCallDelta::arguments(0, "{\"q\":\"x\"}"));
        assert_eq!(acc.finalize(), acc.finalize());
    }
}
