//! Response normalization: one classifier turns any provider's completed
//! text into exactly one [`ParsedAction`].
//!
//! Matchers are tried in a fixed order — tool call, then plan, then file
//! operations, then plain text. Classification never fails on malformed
//! input: anything that does not parse as a recognized envelope falls
//! through to `PlainText`. The single exception is an invalid regex pattern
//! inside a `searchAndReplace` operation, which is a distinct error so the
//! caller never applies a broken pattern literally.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::types::action::{FileOperation, ParsedAction, PlanStep};
use crate::{Error, Result};

/// ```json ... ``` or a bare fenced block; the tag is case-insensitive.
static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)```(?:json)?\s*(.*?)\s*```").expect("code block pattern"));

/// A classified response: the action plus the human-readable explanation
/// that accompanies it (the envelope's `explanation` field, or the raw
/// trimmed text for plain answers).
#[derive(Debug, Clone, PartialEq)]
pub struct Demuxed {
    pub action: ParsedAction,
    pub explanation: String,
}

/// Classify a completed response text.
///
/// `tool_calls_supported` reflects the provider profile: a `tool_call`
/// envelope from a provider that cannot receive a continuation degrades to
/// plain text instead of surfacing an unexecutable action.
pub fn classify(text: &str, tool_calls_supported: bool) -> Result<Demuxed> {
    let trimmed = text.trim();

    if let Some(json) = extract_json(trimmed) {
        if let Some(demuxed) = match_tool_call(&json, trimmed, tool_calls_supported) {
            return Ok(demuxed);
        }
        if let Some(demuxed) = match_plan(&json) {
            return Ok(demuxed);
        }
        if let Some(demuxed) = match_file_operations(&json)? {
            return Ok(demuxed);
        }
        debug!("json envelope did not match any action shape, treating as text");
    }

    Ok(Demuxed {
        action: ParsedAction::PlainText {
            text: trimmed.to_string(),
        },
        explanation: trimmed.to_string(),
    })
}

/// Pull a parseable JSON object out of the text: fenced code blocks first,
/// then the substring from the first `{` to the last `}`. Returns `None`
/// when nothing parses.
pub fn extract_json(text: &str) -> Option<Value> {
    for captures in CODE_BLOCK.captures_iter(text) {
        let candidate = captures.get(1)?.as_str();
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
            return Some(value);
        }
    }

    let first = text.find('{')?;
    let last = text.rfind('}')?;
    if last <= first {
        return None;
    }
    match serde_json::from_str::<Value>(&text[first..=last]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn action_field(json: &Value) -> Option<&str> {
    json.get("action").and_then(Value::as_str)
}

fn explanation_field(json: &Value, fallback: &str) -> String {
    json.get("explanation")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

fn match_tool_call(json: &Value, raw: &str, tool_calls_supported: bool) -> Option<Demuxed> {
    if !action_field(json)?.eq_ignore_ascii_case("tool_call") {
        return None;
    }
    if !tool_calls_supported {
        debug!("tool_call from a provider without continuation, degrading to text");
        return Some(Demuxed {
            action: ParsedAction::PlainText {
                text: raw.to_string(),
            },
            explanation: raw.to_string(),
        });
    }
    let name = json.get("name").and_then(Value::as_str)?.to_string();
    let arguments = json
        .get("arguments")
        .or_else(|| json.get("args"))
        .cloned()
        .unwrap_or(Value::Null);
    Some(Demuxed {
        explanation: explanation_field(json, ""),
        action: ParsedAction::ToolCall { name, arguments },
    })
}

fn match_plan(json: &Value) -> Option<Demuxed> {
    if action_field(json)? != "plan" {
        return None;
    }
    let steps: Vec<PlanStep> = json
        .get("steps")
        .or_else(|| json.get("planSteps"))
        .and_then(Value::as_array)?
        .iter()
        .filter_map(parse_plan_step)
        .collect();
    if steps.is_empty() {
        return None;
    }
    Some(Demuxed {
        explanation: explanation_field(json, ""),
        action: ParsedAction::Plan {
            goal: json
                .get("goal")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            steps,
        },
    })
}

fn parse_plan_step(value: &Value) -> Option<PlanStep> {
    match value {
        Value::String(title) => Some(PlanStep {
            title: title.clone(),
            description: String::new(),
        }),
        Value::Object(obj) => Some(PlanStep {
            title: obj.get("title").and_then(Value::as_str)?.to_string(),
            description: obj
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        _ => None,
    }
}

fn match_file_operations(json: &Value) -> Result<Option<Demuxed>> {
    let operations_value = match action_field(json) {
        Some("file_operation") => json
            .get("operations")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        // Some models skip the envelope and emit the array, or one bare op.
        _ => {
            if let Some(array) = json.get("operations").and_then(Value::as_array) {
                array.clone()
            } else if json.get("type").is_some() && json.get("path").is_some() {
                vec![json.clone()]
            } else {
                return Ok(None);
            }
        }
    };

    let mut operations = Vec::with_capacity(operations_value.len());
    for op in &operations_value {
        match parse_file_operation(op)? {
            Some(parsed) => operations.push(parsed),
            None => debug!("skipping unrecognized file operation record"),
        }
    }
    if operations.is_empty() {
        return Ok(None);
    }
    Ok(Some(Demuxed {
        explanation: explanation_field(json, ""),
        action: ParsedAction::FileOperations { operations },
    }))
}

fn string_field<'a>(op: &'a Value, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|n| op.get(*n).and_then(Value::as_str))
}

fn parse_file_operation(op: &Value) -> Result<Option<FileOperation>> {
    let op_type = match string_field(op, &["type"]) {
        Some(t) => t,
        None => return Ok(None),
    };
    let path = string_field(op, &["path"]).unwrap_or_default().to_string();

    let parsed = match op_type {
        "createFile" => FileOperation::CreateFile {
            path,
            content: string_field(op, &["content"]).unwrap_or_default().to_string(),
        },
        "updateFile" | "smartUpdate" => FileOperation::UpdateFile {
            path,
            content: string_field(op, &["content"]).unwrap_or_default().to_string(),
        },
        "deleteFile" => FileOperation::DeleteFile { path },
        "renameFile" => FileOperation::RenameFile {
            old_path: string_field(op, &["oldPath", "old_path"])
                .unwrap_or_default()
                .to_string(),
            new_path: string_field(op, &["newPath", "new_path"])
                .unwrap_or_default()
                .to_string(),
        },
        "searchAndReplace" => {
            let pattern = string_field(op, &["searchPattern", "pattern"]).unwrap_or_default();
            let literal = string_field(op, &["search"]).unwrap_or_default();
            let replacement = string_field(op, &["replaceWith", "replace", "replacement"])
                .unwrap_or_default()
                .to_string();
            let regex = !pattern.is_empty();
            if regex {
                Regex::new(pattern).map_err(|e| Error::InvalidRegex {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
            }
            FileOperation::SearchAndReplace {
                path,
                search: if regex {
                    pattern.to_string()
                } else {
                    literal.to_string()
                },
                replacement,
                regex,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}
