//! The uniform action representation every provider response is normalized
//! into, plus the file-operation records consumed by the external executor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exactly one of these is produced per completed turn. Variants are
/// mutually exclusive by construction (see [`crate::demux`] for the
/// classification order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedAction {
    /// Free-form answer, trimmed.
    PlainText { text: String },
    /// A structured plan the UI renders as ordered steps.
    Plan { goal: String, steps: Vec<PlanStep> },
    /// Ordered file operations for the file-operation executor.
    FileOperations { operations: Vec<FileOperation> },
    /// A tool invocation request to be executed externally and continued via
    /// a tool-result turn. Only emitted for providers with continuation
    /// support; others degrade this to `PlainText`.
    ToolCall { name: String, arguments: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// One well-formed file operation record.
///
/// The core validates shape (and regex patterns) before handing these to the
/// executor; applying them is the executor's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FileOperation {
    CreateFile {
        path: String,
        content: String,
    },
    /// Full overwrite of an existing file (`updateFile` / `smartUpdate`).
    UpdateFile {
        path: String,
        content: String,
    },
    DeleteFile {
        path: String,
    },
    RenameFile {
        old_path: String,
        new_path: String,
    },
    /// Literal or regex search/replace. `regex` is true only when the
    /// response carried a non-empty pattern field; the pattern has already
    /// been validated by the demuxer in that case.
    SearchAndReplace {
        path: String,
        search: String,
        replacement: String,
        regex: bool,
    },
}

impl FileOperation {
    /// Human-readable one-line summary for logs and UI.
    pub fn summary(&self) -> String {
        match self {
            FileOperation::CreateFile { path, .. } => format!("Create file: {path}"),
            FileOperation::UpdateFile { path, .. } => format!("Update file: {path}"),
            FileOperation::DeleteFile { path } => format!("Delete file: {path}"),
            FileOperation::RenameFile { old_path, new_path } => {
                format!("Rename file: {old_path} to {new_path}")
            }
            FileOperation::SearchAndReplace { path, regex, .. } => {
                if *regex {
                    format!("Regex replace in: {path}")
                } else {
                    format!("Replace in: {path}")
                }
            }
        }
    }
}

/// A web-search citation harvested from provider stream extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}
