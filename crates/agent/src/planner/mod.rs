//! ReAct planner: Thought → Action → Observation, until a Final Answer.
//!
//! The planner owns the step history of one request. It parses model
//! output, runs actions through the [`SandboxExecutor`], and renders the
//! continuation prompt for the next model call. The loop itself (model
//! calls, step ceilings, auditing) lives in the orchestrator.

pub mod context;
pub mod fallback;
pub mod heuristic;
pub mod parse;

use std::sync::Arc;

use pilot_core::plan::PlanStep;
use pilot_core::tool::{ToolDescriptor, ToolResult};
use pilot_tools::SandboxExecutor;
use tracing::debug;

pub use context::{MAX_CONTEXT_CHARS, trim_context};
pub use heuristic::needs_planning;
pub use parse::{parse_model_output, parse_params};

/// Outcome of executing one step.
#[derive(Debug, Clone)]
pub struct Observation {
    pub text: String,
    pub success: bool,
    /// The tool result, when an action actually ran.
    pub result: Option<ToolResult>,
}

pub struct ReactPlanner {
    executor: Arc<SandboxExecutor>,
    tools: Vec<ToolDescriptor>,
    steps: Vec<PlanStep>,
}

impl ReactPlanner {
    /// A planner for one request, seeing the executor's available tools.
    pub fn new(executor: Arc<SandboxExecutor>) -> Self {
        let tools = executor.available_tools();
        Self {
            executor,
            tools,
            steps: Vec::new(),
        }
    }

    /// Clear the step history.
    pub fn reset(&mut self) {
        self.steps.clear();
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Executed steps, oldest first.
    pub fn history(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn needs_planning(&self, message: &str) -> bool {
        needs_planning(message, &self.tools)
    }

    pub fn parse_model_output(&self, text: &str) -> PlanStep {
        parse_model_output(text, self.steps.len() + 1, &self.tools)
    }

    /// Run the step's action and record the step.
    ///
    /// A step without an action is not recorded and yields an empty,
    /// successful observation.
    pub async fn execute_step(&mut self, step: &mut PlanStep) -> Observation {
        let Some(tool_id) = step.action.clone() else {
            return Observation {
                text: String::new(),
                success: true,
                result: None,
            };
        };

        debug!(step = step.step_num, tool_id = %tool_id, "Executing plan step");
        let result = self.executor.execute(&tool_id, &step.action_params).await;
        step.observation = result.observation();
        self.steps.push(step.clone());

        Observation {
            text: step.observation.clone(),
            success: result.success(),
            result: Some(result),
        }
    }

    /// Render the step just executed and ask for the next move.
    pub fn build_continuation_prompt(&self, step: &PlanStep) -> String {
        let mut lines = Vec::new();
        if !step.thought.is_empty() {
            lines.push(format!("Thought: {}", step.thought));
        }
        if let Some(action) = &step.action {
            let params = serde_json::to_string(&step.action_params).unwrap_or_else(|_| "{}".into());
            lines.push(format!("Action: {action}({params})"));
        }
        if !step.observation.is_empty() {
            lines.push(format!("Observation: {}", step.observation));
        }
        lines.push(String::new());
        lines.push(
            "Based on the observation, continue with another Thought/Action \
             or give the Final Answer."
                .to_string(),
        );
        lines.join("\n")
    }
}
