//! Parley - Multi-tenant agent chat backend.
//!
//! The core of this crate is the real-time session relay: per-session
//! mailboxes and dispatchers push ordered, heartbeated engine events to
//! WebSocket clients, while an engine session pool owns one external
//! reasoning-engine instance per session.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
