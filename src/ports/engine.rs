//! Agent engine port - the boundary to the external reasoning capability.
//!
//! The engine is a black box: it takes a query, emits zero or more events
//! through a registered callback while it works, and returns a final turn
//! result. Callbacks are plain synchronous functions because the engine may
//! invoke them from an execution context that knows nothing about this
//! crate's runtime; implementations hand events off through the session
//! mailbox and return immediately.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::events::EngineEvent;
use crate::domain::foundation::RelaySessionId;

/// Synchronous event sink registered with an engine instance.
pub type EventCallback = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Errors surfaced by engine implementations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine transport error: {0}")]
    Transport(String),

    #[error("engine returned a malformed response: {0}")]
    Protocol(String),

    #[error("engine initialization failed: {0}")]
    Initialization(String),
}

/// Final result of one engine turn.
///
/// `success: false` is an engine-reported processing failure (the engine
/// ran but declined the query); a transport-level failure is an
/// [`EngineError`] instead.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub success: bool,
    pub response: String,
    pub agent_name: Option<String>,
    pub model_used: Option<String>,
    pub tools_available: u32,
    pub error: Option<String>,
}

impl TurnResult {
    /// A successful turn carrying the given response text.
    pub fn success(response: impl Into<String>) -> Self {
        Self {
            success: true,
            response: response.into(),
            agent_name: None,
            model_used: None,
            tools_available: 0,
            error: None,
        }
    }

    /// An engine-reported failure.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: String::new(),
            agent_name: None,
            model_used: None,
            tools_available: 0,
            error: Some(error.into()),
        }
    }
}

/// One external-engine instance bound to a single relay session.
#[async_trait]
pub trait AgentEngine: Send + Sync {
    /// Optional eager warm-up. Failures are non-fatal; the engine is
    /// expected to initialize itself implicitly on the first turn.
    async fn initialize(&self) -> Result<(), EngineError>;

    /// Processes one conversational turn. May invoke registered callbacks
    /// zero or more times before returning.
    async fn process_turn(&self, query: &str) -> Result<TurnResult, EngineError>;

    /// Clears the engine's internal conversational state.
    async fn reset_state(&self) -> Result<(), EngineError>;

    /// Registers a synchronous event callback.
    fn register_callback(&self, callback: EventCallback);
}

/// Session-unique identity for a freshly created engine instance.
///
/// Concurrently created sessions must not collide on the engine's network
/// identity, so the port is derived from a stable hash of the session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLaunchParams {
    pub instance_name: String,
    pub port: u16,
}

/// First port of the window engine instances are spread across.
const ENGINE_BASE_PORT: u16 = 12347;
/// Size of the port window.
const ENGINE_PORT_SPAN: u16 = 1000;

impl EngineLaunchParams {
    /// Derives launch parameters for a session.
    pub fn for_session(session_id: &RelaySessionId) -> Self {
        Self {
            instance_name: format!("parley_agent_{}", session_id),
            port: ENGINE_BASE_PORT + (fnv1a(session_id.as_str()) % ENGINE_PORT_SPAN as u64) as u16,
        }
    }
}

/// FNV-1a, 64-bit. Stable across processes, unlike the stdlib hasher.
fn fnv1a(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Creates engine instances for the session pool.
pub trait EngineFactory: Send + Sync {
    fn create(&self, params: EngineLaunchParams) -> Arc<dyn AgentEngine>;
}
