//! Adapters - implementations of the ports plus the relay itself.

pub mod engine;
pub mod memory;
pub mod postgres;
pub mod websocket;
