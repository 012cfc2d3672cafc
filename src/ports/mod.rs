//! Ports - interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the relay and the outside world. Adapters implement these ports.
//!
//! - `ChatStore` - the excluded CRUD/persistence layer
//! - `AgentEngine` / `EngineFactory` - the external reasoning engine

mod chat_store;
mod engine;

pub use chat_store::{ChatStore, ChatStoreError};
pub use engine::{
    AgentEngine, EngineError, EngineFactory, EngineLaunchParams, EventCallback, TurnResult,
};
