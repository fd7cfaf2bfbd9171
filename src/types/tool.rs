//! Tool specifications advertised to providers in agent mode.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// An OpenAI-compatible function tool specification, transmitted via the
/// request `tools` array. Only the minimal properties the providers require
/// are included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Wire form: `{"type":"function","function":{...}}`.
    pub fn to_wire(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }

    pub fn to_wire_array(specs: &[ToolSpec]) -> Value {
        Value::Array(specs.iter().map(ToolSpec::to_wire).collect())
    }
}

fn object_schema(fields: &[(&str, &str, &str)]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for (name, ty, description) in fields {
        properties.insert(
            (*name).to_string(),
            json!({ "type": ty, "description": description }),
        );
        required.push(Value::String((*name).to_string()));
    }
    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": Value::Array(required),
    })
}

/// The fixed file-manipulation tool set offered in agent mode.
pub fn default_file_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "createFile",
            "Create a new file with the provided content (UTF-8). The file will be created in the project workspace.",
            object_schema(&[
                ("path", "string", "Relative path to the file to create"),
                ("content", "string", "Content to write to the file"),
            ]),
        ),
        ToolSpec::new(
            "updateFile",
            "Overwrite an existing file with new content. The file must exist in the project workspace.",
            object_schema(&[
                ("path", "string", "Relative path to the file to update"),
                ("content", "string", "New content to write to the file"),
            ]),
        ),
        ToolSpec::new(
            "deleteFile",
            "Delete a file or an empty directory from the project workspace.",
            object_schema(&[(
                "path",
                "string",
                "Relative path to the file or directory to delete",
            )]),
        ),
        ToolSpec::new(
            "renameFile",
            "Rename or move a file or directory within the project workspace.",
            object_schema(&[
                ("oldPath", "string", "Current path of the file or directory"),
                ("newPath", "string", "New path for the file or directory"),
            ]),
        ),
        ToolSpec::new(
            "readFile",
            "Read the contents of a file from the project workspace.",
            object_schema(&[("path", "string", "Relative path to the file to read")]),
        ),
        ToolSpec::new(
            "listFiles",
            "List files and directories in a directory within the project workspace.",
            object_schema(&[(
                "path",
                "string",
                "Relative path to the directory to list (use '.' for root)",
            )]),
        ),
        ToolSpec::new(
            "searchAndReplace",
            "Search for a literal string or regex pattern in a file and replace every match.",
            object_schema(&[
                ("path", "string", "Relative path to the file to edit"),
                ("search", "string", "Literal text or regex pattern to find"),
                ("replaceWith", "string", "Replacement text"),
            ]),
        ),
    ]
}
