//! JSON and JSON Lines output formatters

use serde::Serialize;

use super::{records, InstructionRecord, WindowFormatter};
use crate::{DisasmError, Window};

/// Serializable window for JSON output
#[derive(Serialize)]
struct WindowJson {
    /// Index of the requested instruction, null for an empty window
    current: Option<usize>,
    instructions: Vec<InstructionRecord>,
}

impl WindowFormatter for super::JsonFormatter {
    fn format(&self, window: &Window) -> Result<String, DisasmError> {
        let doc = WindowJson {
            current: window.current_index(),
            instructions: records(window),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

impl WindowFormatter for super::JsonLinesFormatter {
    fn format(&self, window: &Window) -> Result<String, DisasmError> {
        let mut output = String::new();
        for record in records(window) {
            output.push_str(&serde_json::to_string(&record)?);
            output.push('\n');
        }
        Ok(output)
    }
}
