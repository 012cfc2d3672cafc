//! Chat agent entity.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::AgentId;

/// A configured chat agent.
///
/// Only agents flagged as system agents are wired to the external engine;
/// the relay refuses `chat` requests targeting anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
    /// Free-form behavioral instruction authored by the agent's owner.
    pub instruction: String,
    /// Names of collaborating agents, if the owner grouped them.
    pub team: Vec<String>,
    pub is_system_agent: bool,
}

impl AgentProfile {
    /// Creates a system agent with the given name and instruction.
    pub fn system(name: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            instruction: instruction.into(),
            team: Vec::new(),
            is_system_agent: true,
        }
    }

    /// Static best-effort reply used when the engine fails mid-turn.
    ///
    /// Built purely from agent metadata so it is always available, even
    /// when the engine never came up.
    pub fn fallback_reply(&self, user_message: &str) -> String {
        format!(
            "I am {}. {} Regarding your message \"{}\": I could not complete \
             the request right now. Please try again shortly.",
            self.name, self.instruction, user_message
        )
    }
}
