//! Engine adapters: the per-session pool plus engine implementations.
//!
//! - [`pool`] - one engine instance + event log per session
//! - [`http`] - production adapter talking to the engine sidecar
//! - [`scripted`] - deterministic engine for tests

pub mod http;
pub mod pool;
pub mod scripted;

pub use http::{HttpEngine, HttpEngineFactory};
pub use pool::EngineSessionPool;
pub use scripted::{ScriptedEngine, ScriptedEngineFactory, ScriptedTurn};
