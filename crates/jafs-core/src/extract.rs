//! Tool-Call Extraction
//!
//! Turns a freeform model completion into visible text plus an ordered list of
//! [`ToolCall`]s. Models are asked to answer with a fenced JSON block shaped
//! like `{"tool_calls": [{"name": ..., "arguments": {...}}]}`; anything that
//! does not parse is left alone.
//!
//! ```text
//! "Sure! <fence>json {"tool_calls": [...]} <fence>"
//!     ──► visible: "Sure!"
//!     ──► calls:   [call_0, call_1, ...]
//! ```
//!
//! Call ids are `call_{n}` where `n` counts across the whole completion.

use std::collections::HashMap;

use serde_json::Value;

use crate::tool::ToolCall;

const FENCE: &str = "```";

/// Visible text and tool calls recovered from one completion
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Extraction {
    /// Completion text with consumed tool-call blocks removed, trimmed
    pub content: String,

    /// Tool calls in completion order
    pub tool_calls: Vec<ToolCall>,
}

impl Extraction {
    /// True when the completion is a direct answer
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// A fenced region: byte span of the fence markers and the text between them
#[derive(Debug)]
struct FencedBlock {
    start: usize,
    end: usize,
    payload: String,
}

/// Extract tool calls from a model completion.
///
/// Fenced blocks are the candidate payloads; when there are none the whole
/// completion is tried as JSON. Unparseable payloads are skipped.
pub fn extract(completion: &str) -> Extraction {
    let blocks = fenced_blocks(completion);
    let mut tool_calls = Vec::new();

    if blocks.is_empty() {
        if let Ok(value) = serde_json::from_str::<Value>(completion.trim()) {
            collect_tool_calls(&value, &mut tool_calls);
        }
        return Extraction {
            content: completion.trim().to_string(),
            tool_calls,
        };
    }

    let mut consumed = Vec::new();
    for block in &blocks {
        match serde_json::from_str::<Value>(block.payload.trim()) {
            Ok(value) => {
                if collect_tool_calls(&value, &mut tool_calls) {
                    consumed.push((block.start, block.end));
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "Skipping fenced block that is not valid JSON");
            }
        }
    }

    if tool_calls.is_empty() {
        return Extraction {
            content: completion.trim().to_string(),
            tool_calls,
        };
    }

    Extraction {
        content: remove_spans(completion, &consumed).trim().to_string(),
        tool_calls,
    }
}

/// Recover a JSON value from a model response.
///
/// Tries the whole response, then any single line that is a brace-delimited
/// object, then fenced blocks.
pub fn recover_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('{') && line.ends_with('}') {
            if let Ok(value) = serde_json::from_str::<Value>(line) {
                return Some(value);
            }
        }
    }

    fenced_blocks(text)
        .iter()
        .find_map(|block| serde_json::from_str::<Value>(block.payload.trim()).ok())
}

/// Append tool calls found in `value`. Returns whether a `tool_calls` array
/// was present.
fn collect_tool_calls(value: &Value, out: &mut Vec<ToolCall>) -> bool {
    let Some(entries) = value.get("tool_calls").and_then(Value::as_array) else {
        return false;
    };

    for entry in entries {
        let Some(entry) = entry.as_object() else {
            tracing::debug!("Skipping tool call entry that is not an object");
            continue;
        };

        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        out.push(ToolCall {
            id: format!("call_{}", out.len()),
            name,
            arguments: arguments_from(entry.get("arguments")),
        });
    }

    true
}

fn arguments_from(value: Option<&Value>) -> HashMap<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone().into_iter().collect(),
        // Some models emit the arguments object as an encoded string
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_default(),
        _ => HashMap::new(),
    }
}

/// Byte offset of an opening fence that ends this line, if any.
///
/// A bare fence line opens a block with or without a language tag. A fence
/// after other text opens one only when a language tag follows it.
fn opening_fence(line: &str) -> Option<usize> {
    let body = line.trim_end();
    let idx = body.rfind(FENCE)?;
    let tag = &body[idx + FENCE.len()..];
    let is_tag = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'));
    let leads_line = body[..idx].trim().is_empty();
    (is_tag && (leads_line || !tag.is_empty())).then_some(idx)
}

fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut open: Option<(usize, String)> = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();

        if let Some((start, mut payload)) = open.take() {
            if line.trim() == FENCE {
                blocks.push(FencedBlock {
                    start,
                    end: offset,
                    payload,
                });
            } else {
                payload.push_str(line);
                open = Some((start, payload));
            }
        } else if let Some(idx) = opening_fence(line) {
            open = Some((line_start + idx, String::new()));
        }
    }

    // An unterminated fence is not a block
    blocks
}

fn remove_spans(text: &str, spans: &[(usize, usize)]) -> String {
    let mut visible = String::with_capacity(text.len());
    let mut cursor = 0;
    for &(start, end) in spans {
        visible.push_str(&text[cursor..start]);
        cursor = end;
    }
    visible.push_str(&text[cursor..]);
    visible
}
