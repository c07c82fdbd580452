//! Audit log of tool calls, grouped by conversation round.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use super::tools::ToolCallIntent;

pub const TOOL_CALL_LAYERS_FILE: &str = "tool_call_layers.json";
pub const TOOL_CALL_SEQUENCE_FILE: &str = "tool_call_sequence.json";

/// One dispatched call and whether it succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub func_name: String,
    pub arguments: BTreeMap<String, String>,
    pub call_ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl ToolCallRecord {
    pub fn from_intent(intent: &ToolCallIntent, call_ok: bool) -> Self {
        Self {
            func_name: intent.function_name.clone(),
            arguments: intent.arguments.clone(),
            call_ok,
            correlation_id: intent.correlation_id,
        }
    }
}

/// Calls made in one round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallLayer {
    pub round: usize,
    pub calls: Vec<ToolCallRecord>,
    /// Whether the proxy produced a usable selection this round.
    pub proxy_valid: bool,
    /// Whether this round moved the conversation to finishing.
    pub finished: bool,
}

/// Rounds in order, each with its calls.
#[derive(Debug, Clone, Default)]
pub struct ToolCallLog {
    layers: Vec<ToolCallLayer>,
}

impl ToolCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a layer for `round`.
    pub fn open(&mut self, round: usize) {
        self.layers.push(ToolCallLayer {
            round,
            ..ToolCallLayer::default()
        });
    }

    /// Mutable access to the current layer, opening round 0 if none exists.
    pub fn current(&mut self) -> &mut ToolCallLayer {
        if self.layers.is_empty() {
            self.open(0);
        }
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    pub fn record(&mut self, record: ToolCallRecord) {
        self.current().calls.push(record);
    }

    pub fn layers(&self) -> &[ToolCallLayer] {
        &self.layers
    }

    /// Every call across all layers, in dispatch order.
    pub fn sequence(&self) -> Vec<&ToolCallRecord> {
        self.layers.iter().flat_map(|l| l.calls.iter()).collect()
    }

    /// Write both the layered and the flat view into `output_dir`.
    pub fn save(&self, output_dir: &Path) -> std::io::Result<()> {
        let layers = serde_json::to_string_pretty(&self.layers).map_err(std::io::Error::other)?;
        std::fs::write(output_dir.join(TOOL_CALL_LAYERS_FILE), layers)?;

        let sequence =
            serde_json::to_string_pretty(&self.sequence()).map_err(std::io::Error::other)?;
        std::fs::write(output_dir.join(TOOL_CALL_SEQUENCE_FILE), sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, ok: bool) -> ToolCallRecord {
        ToolCallRecord {
            func_name: name.to_string(),
            arguments: BTreeMap::new(),
            call_ok: ok,
            correlation_id: None,
        }
    }

    #[test]
    fn test_layers_group_calls_by_round() {
        let mut log = ToolCallLog::new();
        log.open(1);
        log.record(record("search_class", true));
        log.record(record("search_method", false));
        log.open(2);
        log.current().proxy_valid = true;
        log.record(record("extract_fullcode", true));

        assert_eq!(log.layers().len(), 2);
        assert_eq!(log.layers()[0].calls.len(), 2);
        assert_eq!(log.layers()[1].round, 2);
        assert!(log.layers()[1].proxy_valid);
        let names: Vec<_> = log.sequence().iter().map(|r| r.func_name.as_str()).collect();
        assert_eq!(names, vec!["search_class", "search_method", "extract_fullcode"]);
    }

    #[test]
    fn test_record_without_open_layer() {
        let mut log = ToolCallLog::new();
        log.record(record("write_doc", true));
        assert_eq!(log.layers().len(), 1);
        assert_eq!(log.layers()[0].round, 0);
    }

    #[test]
    fn test_save_writes_both_views() {
        let dir = TempDir::new().unwrap();
        let mut log = ToolCallLog::new();
        log.open(1);
        log.record(record("search_class", true));
        log.save(dir.path()).unwrap();

        let layers: Vec<ToolCallLayer> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(TOOL_CALL_LAYERS_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(layers[0].calls[0].func_name, "search_class");

        let sequence: Vec<ToolCallRecord> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(TOOL_CALL_SEQUENCE_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(sequence.len(), 1);
    }
}
