//! Engine event taxonomy and derived projections.
//!
//! Events arrive from the external engine as an open set of string kinds.
//! The recognized kinds get first-class variants; anything else is carried
//! through verbatim as [`EventKind::Other`] so new engine versions never
//! break the relay.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::foundation::Timestamp;

/// Kind of an engine event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    TaskStart,
    AiThinkingStart,
    AiResponse,
    ToolCallStart,
    ToolCallComplete,
    AgentSwitch,
    TaskComplete,
    QueryStart,
    QueryComplete,
    QueryError,
    InitializationComplete,
    /// Synthesized locally when the engine itself fails and the relay
    /// falls back to a static reply.
    EngineError,
    /// Any kind the relay does not recognize.
    Other(String),
}

impl EventKind {
    /// Wire representation of the kind.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::TaskStart => "task_start",
            EventKind::AiThinkingStart => "ai_thinking_start",
            EventKind::AiResponse => "ai_response",
            EventKind::ToolCallStart => "tool_call_start",
            EventKind::ToolCallComplete => "tool_call_complete",
            EventKind::AgentSwitch => "agent_switch",
            EventKind::TaskComplete => "task_complete",
            EventKind::QueryStart => "query_start",
            EventKind::QueryComplete => "query_complete",
            EventKind::QueryError => "query_error",
            EventKind::InitializationComplete => "initialization_complete",
            EventKind::EngineError => "engine_error",
            EventKind::Other(raw) => raw,
        }
    }

    /// Whether this kind counts as an error in session statistics.
    pub fn is_error(&self) -> bool {
        matches!(self, EventKind::QueryError | EventKind::EngineError)
            || self.as_str() == "tool_call_error"
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "task_start" => EventKind::TaskStart,
            "ai_thinking_start" => EventKind::AiThinkingStart,
            "ai_response" => EventKind::AiResponse,
            "tool_call_start" => EventKind::ToolCallStart,
            "tool_call_complete" => EventKind::ToolCallComplete,
            "agent_switch" => EventKind::AgentSwitch,
            "task_complete" => EventKind::TaskComplete,
            "query_start" => EventKind::QueryStart,
            "query_complete" => EventKind::QueryComplete,
            "query_error" => EventKind::QueryError,
            "initialization_complete" => EventKind::InitializationComplete,
            "engine_error" => EventKind::EngineError,
            _ => EventKind::Other(raw),
        }
    }
}

impl From<&str> for EventKind {
    fn from(raw: &str) -> Self {
        EventKind::from(raw.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// An immutable event produced by the engine (or synthesized locally).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub kind: EventKind,
    pub agent_name: String,
    pub data: serde_json::Value,
    pub timestamp: Timestamp,
}

impl EngineEvent {
    /// Creates an event stamped with the current time.
    pub fn new(
        kind: impl Into<EventKind>,
        agent_name: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            kind: kind.into(),
            agent_name: agent_name.into(),
            data,
            timestamp: Timestamp::now(),
        }
    }

    fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    fn data_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(|v| v.as_u64())
    }

    /// Tool name, for tool-call events.
    pub fn tool_name(&self) -> Option<&str> {
        self.data_str("tool_name")
    }
}

/// An engine event after the bridge assigned its per-session sequence
/// number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub sequence: u64,
    pub event: EngineEvent,
}

/// Human-readable status derived from an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusProjection {
    pub status: &'static str,
    pub message: String,
}

/// Projects the fixed subset of event kinds onto client-visible status
/// updates. Pure; returns `None` for kinds with no status mapping.
pub fn status_projection(event: &EngineEvent) -> Option<StatusProjection> {
    let projection = match event.kind {
        EventKind::TaskStart => StatusProjection {
            status: "processing",
            message: format!(
                "Processing task: {}",
                event.data_str("user_query").unwrap_or_default()
            ),
        },
        EventKind::AiThinkingStart => StatusProjection {
            status: "thinking",
            message: format!(
                "{} is thinking... (turn {})",
                event.agent_name,
                event.data_u64("turn").unwrap_or(1)
            ),
        },
        EventKind::ToolCallStart => StatusProjection {
            status: "tool_calling",
            message: format!(
                "{} calling tool: {}",
                event.agent_name,
                event.tool_name().unwrap_or("unknown")
            ),
        },
        EventKind::ToolCallComplete => StatusProjection {
            status: "tool_completed",
            message: format!(
                "{} finished tool: {}",
                event.agent_name,
                event.tool_name().unwrap_or("unknown")
            ),
        },
        EventKind::AgentSwitch => StatusProjection {
            status: "agent_switch",
            message: format!(
                "Agent switch: {} -> {}",
                event.data_str("from_agent").unwrap_or_default(),
                event.data_str("to_agent").unwrap_or_default()
            ),
        },
        EventKind::TaskComplete => StatusProjection {
            status: "completed",
            message: format!(
                "Task complete! Total turns: {}",
                event.data_u64("total_turns").unwrap_or(0)
            ),
        },
        _ => return None,
    };
    Some(projection)
}

/// Counters derived from a session's full event log.
///
/// A pure scan; the relay keeps no incremental counter state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub session_id: String,
    pub total_events: usize,
    pub tool_calls: usize,
    pub agent_switches: usize,
    pub tasks_completed: usize,
    pub errors: usize,
    pub tools_used: Vec<String>,
    pub current_turn_events: usize,
}

impl SessionStatistics {
    /// All-zero statistics for a session with no engine state.
    pub fn empty(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            total_events: 0,
            tool_calls: 0,
            agent_switches: 0,
            tasks_completed: 0,
            errors: 0,
            tools_used: Vec::new(),
            current_turn_events: 0,
        }
    }

    /// Derives statistics by scanning an event log.
    pub fn from_log(
        session_id: impl Into<String>,
        events: &[SequencedEvent],
        current_turn_events: usize,
    ) -> Self {
        let mut stats = Self::empty(session_id);
        stats.total_events = events.len();
        stats.current_turn_events = current_turn_events;

        let mut tools = BTreeSet::new();
        for sequenced in events {
            let event = &sequenced.event;
            match event.kind {
                EventKind::ToolCallStart => {
                    stats.tool_calls += 1;
                    if let Some(tool) = event.tool_name() {
                        if !tool.is_empty() {
                            tools.insert(tool.to_string());
                        }
                    }
                }
                EventKind::AgentSwitch => stats.agent_switches += 1,
                EventKind::TaskComplete => stats.tasks_completed += 1,
                _ => {}
            }
            if event.kind.is_error() {
                stats.errors += 1;
            }
        }
        stats.tools_used = tools.into_iter().collect();
        stats
    }
}
