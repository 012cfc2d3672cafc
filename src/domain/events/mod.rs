//! Engine event model: taxonomy, sequencing, and pure projections.

mod event;

pub use event::{
    status_projection, EngineEvent, EventKind, SequencedEvent, SessionStatistics,
    StatusProjection,
};
