//! Application services coordinating ports and relay components.

mod chat_turn;

pub use chat_turn::ChatTurnService;
