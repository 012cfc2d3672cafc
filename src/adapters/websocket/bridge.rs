//! Event bridge: synchronous engine callbacks → sequenced mailbox traffic.
//!
//! The engine invokes its callback one event at a time, from whatever
//! execution context it happens to run in. The bridge's whole job is the
//! hand-off: under the per-session log lock it assigns the next sequence
//! number, appends to the session's event log and current-turn buffer,
//! and pushes the `agent_event` envelope (plus any derived
//! `status_update`) into the mailbox. Pushing inside the lock is what
//! guarantees that mailbox order matches sequence order even when the
//! engine races callbacks across threads.

use std::sync::{Arc, Mutex};

use crate::domain::events::{status_projection, EngineEvent, SequencedEvent};
use crate::domain::foundation::RelaySessionId;
use crate::ports::EventCallback;

use super::mailbox::Mailbox;
use super::messages::ServerMessage;

/// Per-session event history.
///
/// `events` is append-only for the lifetime of the engine session;
/// `current_turn` is cleared at the start of every user turn.
pub struct EngineLog {
    events: Vec<SequencedEvent>,
    current_turn: Vec<SequencedEvent>,
    next_sequence: u64,
}

impl EngineLog {
    /// An empty log; the first event gets sequence 1.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            current_turn: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Assigns the next sequence number and appends the event to both the
    /// full log and the current-turn buffer.
    pub fn record(&mut self, event: EngineEvent) -> SequencedEvent {
        let sequenced = SequencedEvent {
            sequence: self.next_sequence,
            event,
        };
        self.next_sequence += 1;
        self.events.push(sequenced.clone());
        self.current_turn.push(sequenced.clone());
        sequenced
    }

    /// Clears the current-turn buffer. Sequence numbers keep counting;
    /// they are never reused.
    pub fn begin_turn(&mut self) {
        self.current_turn.clear();
    }

    /// Full event history.
    pub fn events(&self) -> &[SequencedEvent] {
        &self.events
    }

    /// Events recorded since the last `begin_turn`.
    pub fn current_turn(&self) -> &[SequencedEvent] {
        &self.current_turn
    }
}

impl Default for EngineLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Bridge from one engine instance to one session's mailbox.
pub struct EventBridge {
    session_id: RelaySessionId,
    log: Arc<Mutex<EngineLog>>,
    mailbox: Arc<Mailbox>,
}

impl EventBridge {
    /// Creates a bridge over the given log and mailbox.
    pub fn new(
        session_id: RelaySessionId,
        log: Arc<Mutex<EngineLog>>,
        mailbox: Arc<Mailbox>,
    ) -> Self {
        Self {
            session_id,
            log,
            mailbox,
        }
    }

    /// Handles one engine event.
    ///
    /// Synchronous and non-blocking; safe to call from any thread. If the
    /// session's mailbox is already closed the envelopes are dropped (the
    /// event is still logged) - a dead client must never block the engine.
    pub fn handle_event(&self, event: EngineEvent) {
        let mut log = self.log.lock().expect("engine log lock poisoned");
        let sequenced = log.record(event);

        let delivered = self.mailbox.push(ServerMessage::agent_event(&sequenced));
        if let Some(projection) = status_projection(&sequenced.event) {
            self.mailbox
                .push(ServerMessage::status_update(projection.status, projection.message));
        }
        drop(log);

        if !delivered {
            tracing::debug!(
                session_id = %self.session_id,
                sequence = sequenced.sequence,
                "event logged but not delivered; session mailbox closed"
            );
        }
    }

    /// Wraps this bridge as the callback shape the engine port expects.
    pub fn as_callback(self: &Arc<Self>) -> EventCallback {
        let bridge = Arc::clone(self);
        Arc::new(move |event| bridge.handle_event(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bridge_fixture(capacity: usize) -> (Arc<EventBridge>, Arc<Mutex<EngineLog>>, Arc<Mailbox>) {
        let log = Arc::new(Mutex::new(EngineLog::new()));
        let mailbox = Arc::new(Mailbox::new(capacity));
        let bridge = Arc::new(EventBridge::new(
            RelaySessionId::new("bridge-test"),
            log.clone(),
            mailbox.clone(),
        ));
        (bridge, log, mailbox)
    }

    #[tokio::test]
    async fn events_get_consecutive_sequence_numbers() {
        let (bridge, log, _mailbox) = bridge_fixture(64);

        for i in 0..5 {
            bridge.handle_event(EngineEvent::new("ai_response", "alpha", json!({"i": i})));
        }

        let log = log.lock().unwrap();
        let sequences: Vec<u64> = log.events().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn agent_event_precedes_its_status_update() {
        let (bridge, _log, mailbox) = bridge_fixture(64);

        bridge.handle_event(EngineEvent::new(
            "tool_call_start",
            "alpha",
            json!({"tool_name": "web"}),
        ));

        assert_eq!(mailbox.recv().await.unwrap().kind_tag(), "agent_event");
        match mailbox.recv().await.unwrap() {
            ServerMessage::StatusUpdate { status, message, .. } => {
                assert_eq!(status, "tool_calling");
                assert!(message.contains("web"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unmapped_kinds_emit_no_status_update() {
        let (bridge, _log, mailbox) = bridge_fixture(64);

        bridge.handle_event(EngineEvent::new("query_start", "alpha", json!({})));

        assert_eq!(mailbox.recv().await.unwrap().kind_tag(), "agent_event");
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn begin_turn_clears_buffer_but_keeps_sequencing() {
        let (bridge, log, _mailbox) = bridge_fixture(64);

        bridge.handle_event(EngineEvent::new("task_start", "alpha", json!({})));
        bridge.handle_event(EngineEvent::new("task_complete", "alpha", json!({})));
        log.lock().unwrap().begin_turn();
        bridge.handle_event(EngineEvent::new("task_start", "alpha", json!({})));

        let log = log.lock().unwrap();
        assert_eq!(log.events().len(), 3);
        assert_eq!(log.current_turn().len(), 1);
        assert_eq!(log.current_turn()[0].sequence, 3);
    }

    #[tokio::test]
    async fn closed_mailbox_still_logs_events() {
        let (bridge, log, mailbox) = bridge_fixture(64);
        mailbox.close();

        bridge.handle_event(EngineEvent::new("ai_response", "alpha", json!({})));

        assert_eq!(log.lock().unwrap().events().len(), 1);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn callbacks_from_many_threads_keep_sequences_and_order_aligned() {
        let (bridge, log, mailbox) = bridge_fixture(1024);

        let mut threads = Vec::new();
        for t in 0..4 {
            let callback = bridge.as_callback();
            threads.push(std::thread::spawn(move || {
                for i in 0..25 {
                    callback(EngineEvent::new(
                        "ai_response",
                        format!("worker-{t}"),
                        json!({"i": i}),
                    ));
                }
            }));
        }
        for thread in threads {
            thread.join().unwrap();
        }

        let log = log.lock().unwrap();
        let sequences: Vec<u64> = log.events().iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (1..=100).collect::<Vec<u64>>());

        // Mailbox order must match sequence order.
        let mut delivered = Vec::new();
        for _ in 0..100 {
            match futures::executor::block_on(mailbox.recv()) {
                Some(ServerMessage::AgentEvent { sequence, .. }) => delivered.push(sequence),
                other => panic!("unexpected message: {other:?}"),
            }
        }
        assert_eq!(delivered, (1..=100).collect::<Vec<u64>>());
    }
}
