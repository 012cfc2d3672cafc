//! Per-session mailbox and dispatcher.
//!
//! The mailbox decouples event production from transport delivery. Pushes
//! are synchronous and never block, so the engine bridge can hand events
//! off from whatever thread the engine invokes its callback on; the
//! dispatcher task is the single consumer and the only component that
//! touches the transport for queued traffic.
//!
//! Capacity policy: bounded, drop-oldest. A stalled client loses its
//! oldest queued messages rather than growing the queue without bound or
//! blocking the producer.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::domain::foundation::RelaySessionId;

use super::messages::ServerMessage;
use super::registry::TransportRegistry;

/// Default queue capacity when the config does not override it.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

struct Inner {
    queue: VecDeque<ServerMessage>,
    closed: bool,
    dropped: u64,
}

/// Ordered, bounded, per-session delivery queue.
pub struct Mailbox {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

impl Mailbox {
    /// Creates a mailbox with the given capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                closed: false,
                dropped: 0,
            }),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueues a message.
    ///
    /// Best-effort: returns `false` (and drops the message) once the
    /// mailbox is closed. When the queue is full the oldest entry is
    /// discarded to make room. Never blocks, so it is safe to call from
    /// non-async contexts, including under locks.
    pub fn push(&self, message: ServerMessage) -> bool {
        let mut inner = self.inner.lock().expect("mailbox lock poisoned");
        if inner.closed {
            return false;
        }
        if inner.queue.len() == self.capacity {
            inner.queue.pop_front();
            inner.dropped += 1;
        }
        inner.queue.push_back(message);
        drop(inner);
        self.notify.notify_one();
        true
    }

    /// Receives the next message in arrival order.
    ///
    /// Returns `None` once the mailbox has been closed, even if closed
    /// mid-wait. Messages already queued at close time are still drained
    /// first.
    pub async fn recv(&self) -> Option<ServerMessage> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().expect("mailbox lock poisoned");
                if let Some(message) = inner.queue.pop_front() {
                    return Some(message);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Closes the mailbox, waking any pending `recv`. Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("mailbox lock poisoned");
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
        // notify_waiters stores no permit; a consumer between its queue
        // check and its wait still needs one.
        self.notify.notify_one();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("mailbox lock poisoned").closed
    }

    /// Messages currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("mailbox lock poisoned").queue.len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages discarded by the drop-oldest policy so far.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().expect("mailbox lock poisoned").dropped
    }
}

/// Background task draining one session's mailbox into its transport.
///
/// Exactly one dispatcher runs per live session. The loop delivers queued
/// messages in order, synthesizes a heartbeat when the mailbox stays idle
/// for a full interval, and terminates when the mailbox closes or the
/// transport fails (the registry tears the session down on send failure).
pub struct Dispatcher {
    session_id: RelaySessionId,
    mailbox: Arc<Mailbox>,
    registry: Arc<TransportRegistry>,
    heartbeat: Duration,
}

impl Dispatcher {
    /// Spawns the dispatcher task for a session.
    pub fn spawn(
        session_id: RelaySessionId,
        mailbox: Arc<Mailbox>,
        registry: Arc<TransportRegistry>,
        heartbeat: Duration,
    ) -> JoinHandle<()> {
        let dispatcher = Self {
            session_id,
            mailbox,
            registry,
            heartbeat,
        };
        tokio::spawn(dispatcher.run())
    }

    async fn run(self) {
        loop {
            match timeout(self.heartbeat, self.mailbox.recv()).await {
                Ok(Some(message)) => {
                    if let Err(e) = self.registry.send_now(&self.session_id, &message).await {
                        tracing::debug!(
                            session_id = %self.session_id,
                            "dispatcher stopping after send failure: {e}"
                        );
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!(
                        session_id = %self.session_id,
                        "dispatcher stopping: mailbox closed"
                    );
                    break;
                }
                Err(_) => {
                    let heartbeat = ServerMessage::heartbeat();
                    if let Err(e) = self.registry.send_now(&self.session_id, &heartbeat).await {
                        tracing::debug!(
                            session_id = %self.session_id,
                            "dispatcher stopping after heartbeat failure: {e}"
                        );
                        break;
                    }
                }
            }
        }
    }
}
