//! WebSocket adapters: the real-time session/event relay.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     External engine                          │
//! │        (synchronous callbacks, any execution context)        │
//! └──────────────────────────────────────────────────────────────┘
//!                              │ one event at a time
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       EventBridge                            │
//! │   assigns sequence numbers, appends to the session log,      │
//! │   derives status updates, hands off to the mailbox           │
//! └──────────────────────────────────────────────────────────────┘
//!                              │ ordered, non-blocking push
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Mailbox (per session)                       │
//! │        bounded, drop-oldest, single async consumer           │
//! └──────────────────────────────────────────────────────────────┘
//!                              │ drained by the Dispatcher
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   TransportRegistry                          │
//! │    session id → live connection, immediate send path,        │
//! │    exactly-once teardown on transport failure                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - client/server wire protocol
//! - [`mailbox`] - per-session queue and dispatcher task
//! - [`registry`] - live connection handles, keyed by session id
//! - [`bridge`] - engine callback sequencing
//! - [`handler`] - axum upgrade handler and protocol state machine

pub mod bridge;
pub mod handler;
pub mod mailbox;
pub mod messages;
pub mod registry;

pub use bridge::{EngineLog, EventBridge};
pub use handler::{websocket_router, ws_handler, RelayState};
pub use mailbox::{Dispatcher, Mailbox, DEFAULT_MAILBOX_CAPACITY};
pub use messages::{ChatRequest, ClientMessage, ServerMessage};
pub use registry::{RegistryError, Transport, TransportError, TransportRegistry};
