//! The AI Pilot agent: ReAct planner and orchestrator.
//!
//! A turn follows a **Thought → Action → Observation** cycle:
//!
//! 1. **Receive** a user message and log it
//! 2. **Build context** (memory retrieval + system prompt with tools)
//! 3. **Decide** whether the message needs tools at all
//! 4. **If planning**: call the model, run the requested tool in the
//!    sandbox, feed the observation back, loop until a final answer
//! 5. **Otherwise**: a single direct model call
//! 6. **Clean up** the answer, log it, and learn facts in the background
//!
//! The loop ends on a final answer or when the step or tool-call
//! ceiling is reached.

pub mod extraction;
pub mod model_call;
pub mod orchestrator;
pub mod planner;
pub mod postprocess;
pub mod prompt;
pub mod stream;

#[cfg(test)]
mod test_helpers;

pub use orchestrator::{Pilot, PilotBuilder, PilotResponse, PilotStatus, TurnMetadata};
pub use planner::{Observation, ReactPlanner, needs_planning, parse_model_output};
pub use postprocess::{StreamingPostProcessor, post_process};
pub use prompt::DefaultPromptBuilder;
