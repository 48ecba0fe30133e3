//! One iteration of the ReAct loop.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A parsed model turn: thought, optional action, its observation, or a
/// final answer.
///
/// `raw_output` is kept in memory for the orchestrator but never
/// serialized, so audit records and metadata do not leak the full model
/// output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_num: usize,
    #[serde(default)]
    pub thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub action_params: Map<String, Value>,
    #[serde(default)]
    pub observation: String,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub final_answer: String,
    #[serde(skip)]
    pub raw_output: String,
}

impl PlanStep {
    pub fn new(step_num: usize, raw_output: impl Into<String>) -> Self {
        Self {
            step_num,
            raw_output: raw_output.into(),
            ..Self::default()
        }
    }

    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_output_is_not_serialized() {
        let mut step = PlanStep::new(1, "Thought: secret reasoning");
        step.thought = "secret reasoning".into();
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains("\"step_num\":1"));
        assert!(!json.contains("raw_output"));
    }

    #[test]
    fn action_presence() {
        let mut step = PlanStep::new(2, "");
        assert!(!step.has_action());
        step.action = Some("fs".into());
        assert!(step.has_action());
    }
}
