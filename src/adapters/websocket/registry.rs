//! Transport registry: one live connection handle per session.
//!
//! The registry owns the transport side of a session. `send_now` is the
//! immediate, non-queued path used for connection acknowledgements, pongs,
//! and dispatcher deliveries; a failed transmit tears the whole session
//! down exactly once, closing the mailbox so the dispatcher stops and no
//! further message can reach the dead connection.
//!
//! # Thread Safety
//!
//! Sessions are independent: the map is behind an `RwLock` held only long
//! enough to resolve or remove an entry, and the actual transmit happens
//! outside the lock, so sends for unrelated sessions never serialize.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{RelaySessionId, Timestamp};

use super::mailbox::Mailbox;
use super::messages::ServerMessage;

/// A transport send failure.
#[derive(Debug, thiserror::Error)]
#[error("transport send failed: {0}")]
pub struct TransportError(pub String);

/// One live client connection.
///
/// The WebSocket adapter wraps the socket sink; tests substitute a
/// capturing implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), TransportError>;
}

/// Errors surfaced by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session {0} is already registered")]
    DuplicateSession(RelaySessionId),

    #[error("session {0} is not registered")]
    SessionNotFound(RelaySessionId),

    #[error("transport failure for session {session_id}: {reason}")]
    TransportFailure {
        session_id: RelaySessionId,
        reason: String,
    },

    #[error("failed to serialize outbound message: {0}")]
    Serialization(String),
}

struct SessionEntry {
    transport: Arc<dyn Transport>,
    mailbox: Arc<Mailbox>,
    #[allow(dead_code)]
    connected_at: Timestamp,
}

/// Registry of live sessions, keyed by session id.
pub struct TransportRegistry {
    sessions: RwLock<HashMap<RelaySessionId, SessionEntry>>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Binds a transport and mailbox to a session id.
    ///
    /// # Errors
    ///
    /// `DuplicateSession` if the id is already bound; the boundary layer
    /// must tear the stale session down first.
    pub async fn register(
        &self,
        session_id: RelaySessionId,
        transport: Arc<dyn Transport>,
        mailbox: Arc<Mailbox>,
    ) -> Result<(), RegistryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session_id) {
            return Err(RegistryError::DuplicateSession(session_id));
        }
        tracing::info!(session_id = %session_id, "session registered");
        sessions.insert(
            session_id,
            SessionEntry {
                transport,
                mailbox,
                connected_at: Timestamp::now(),
            },
        );
        Ok(())
    }

    /// Removes a session binding without closing its mailbox. Idempotent.
    pub async fn unregister(&self, session_id: &RelaySessionId) {
        self.sessions.write().await.remove(session_id);
    }

    /// Immediately transmits a message, bypassing the mailbox.
    ///
    /// On transport failure the session is torn down (exactly once, even
    /// under concurrent failures) before the error is returned.
    pub async fn send_now(
        &self,
        session_id: &RelaySessionId,
        message: &ServerMessage,
    ) -> Result<(), RegistryError> {
        let transport = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(entry) => Arc::clone(&entry.transport),
                None => return Err(RegistryError::SessionNotFound(session_id.clone())),
            }
        };

        let text = serde_json::to_string(message)
            .map_err(|e| RegistryError::Serialization(e.to_string()))?;

        if let Err(e) = transport.send(&text).await {
            if self.teardown(session_id).await {
                tracing::warn!(
                    session_id = %session_id,
                    "transport failed, session torn down: {e}"
                );
            }
            return Err(RegistryError::TransportFailure {
                session_id: session_id.clone(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Tears a session down: removes the binding and closes its mailbox,
    /// which stops the dispatcher within one pending wait.
    ///
    /// Returns `true` only for the call that actually removed the entry;
    /// the map removal under the write lock is what makes concurrent
    /// teardowns collapse to one.
    pub async fn teardown(&self, session_id: &RelaySessionId) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(entry) => {
                entry.mailbox.close();
                tracing::info!(session_id = %session_id, "session torn down");
                true
            }
            None => false,
        }
    }

    /// Whether a session is currently bound.
    pub async fn is_registered(&self, session_id: &RelaySessionId) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Transports for exercising the relay without a socket.
pub mod test_support {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// Records every transmitted frame; optionally fails on demand.
    pub struct CapturingTransport {
        sent: Mutex<Vec<String>>,
        failing: AtomicBool,
    }

    impl CapturingTransport {
        /// A transport that accepts everything.
        pub fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failing: AtomicBool::new(false),
            }
        }

        /// A transport whose every send fails.
        pub fn failing() -> Self {
            let transport = Self::new();
            transport.failing.store(true, Ordering::SeqCst);
            transport
        }

        /// Makes subsequent sends fail (or succeed again).
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Raw frames sent so far.
        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().expect("capturing transport lock poisoned").clone()
        }

        /// The `type` tag of each sent frame, in order.
        pub fn sent_tags(&self) -> Vec<String> {
            self.sent()
                .iter()
                .map(|frame| {
                    serde_json::from_str::<serde_json::Value>(frame)
                        .ok()
                        .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
                        .unwrap_or_default()
                })
                .collect()
        }

        /// Polls until at least `count` frames were sent.
        pub async fn wait_for(&self, count: usize) {
            for _ in 0..500 {
                if self.sent.lock().expect("capturing transport lock poisoned").len() >= count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            panic!(
                "timed out waiting for {count} frames, got {}",
                self.sent.lock().expect("capturing transport lock poisoned").len()
            );
        }
    }

    impl Default for CapturingTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Transport for CapturingTransport {
        async fn send(&self, text: &str) -> Result<(), TransportError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransportError("connection reset".to_string()));
            }
            self.sent
                .lock()
                .expect("capturing transport lock poisoned")
                .push(text.to_string());
            Ok(())
        }
    }
}
