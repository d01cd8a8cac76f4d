//! Incremental terminal rendering of a conversation's stream state

use std::collections::HashMap;

use insight_chat::{StreamState, StreamStatus, ToolStatus};

/// Turns successive stream snapshots into text to append to the terminal.
#[derive(Debug, Default)]
pub struct TurnPrinter {
    printed: String,
    tools: HashMap<String, ToolStatus>,
}

impl TurnPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text for whatever changed since the previous snapshot.
    pub fn update(&mut self, state: &StreamState) -> String {
        let mut out = String::new();
        if state.status != StreamStatus::Streaming {
            return out;
        }

        // A restarted stream begins again from an empty draft.
        if !state.draft.starts_with(&self.printed) {
            out.push('\n');
            self.printed.clear();
            self.tools.clear();
        }

        for tool in &state.tools {
            let previous = self.tools.insert(tool.tool_call_id.clone(), tool.status);
            match (previous, tool.status) {
                (None, ToolStatus::Running) => {
                    out.push_str(&format!("\n[Running {}...]\n", tool.tool_name));
                }
                (None, ToolStatus::Done) | (Some(ToolStatus::Running), ToolStatus::Done) => {
                    out.push_str(&format!("[{} done]\n", tool.tool_name));
                }
                _ => {}
            }
        }

        out.push_str(&state.draft[self.printed.len()..]);
        self.printed.clone_from(&state.draft);
        out
    }

    /// Text that closes the turn: the rest of the final content, or the error.
    pub fn finish(&mut self, state: &StreamState) -> String {
        let out = match state.status {
            StreamStatus::Failed => format!(
                "\nError: {}\n",
                state.last_error.as_deref().unwrap_or("unknown error")
            ),
            _ if state.draft.starts_with(&self.printed) => {
                format!("{}\n", &state.draft[self.printed.len()..])
            }
            _ => format!("\n{}\n", state.draft),
        };
        self.printed.clear();
        self.tools.clear();
        out
    }
}
