//! Engine session pool: one external-engine instance per session.
//!
//! Instances are created lazily on the first turn of a session and reused
//! for every subsequent turn until the session is destroyed. The pool also
//! owns each session's event log and the bridge that feeds the mailbox, so
//! destroying a session releases everything the engine side holds.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;

use crate::adapters::websocket::{EngineLog, EventBridge, Mailbox};
use crate::domain::events::{EngineEvent, SessionStatistics};
use crate::domain::foundation::RelaySessionId;
use crate::ports::{AgentEngine, EngineError, EngineFactory, EngineLaunchParams};

struct PoolEntry {
    engine: Arc<dyn AgentEngine>,
    log: Arc<Mutex<EngineLog>>,
    bridge: Arc<EventBridge>,
}

/// Shared pool of per-session engine state.
pub struct EngineSessionPool {
    factory: Arc<dyn EngineFactory>,
    sessions: RwLock<HashMap<RelaySessionId, PoolEntry>>,
}

impl EngineSessionPool {
    /// Creates an empty pool over the given factory.
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the session's engine, creating it (and its log and bridge)
    /// on first use.
    ///
    /// Creation wires the bridge callback into the engine and attempts an
    /// eager `initialize()`; initialization failure is logged and ignored
    /// because the engine retries implicitly on the first turn.
    pub async fn get_or_create(
        &self,
        session_id: &RelaySessionId,
        mailbox: Arc<Mailbox>,
    ) -> Arc<dyn AgentEngine> {
        {
            let sessions = self.sessions.read().await;
            if let Some(entry) = sessions.get(session_id) {
                return Arc::clone(&entry.engine);
            }
        }

        let params = EngineLaunchParams::for_session(session_id);
        tracing::info!(
            session_id = %session_id,
            instance = %params.instance_name,
            port = params.port,
            "creating engine instance"
        );
        let engine = self.factory.create(params);

        let log = Arc::new(Mutex::new(EngineLog::new()));
        let bridge = Arc::new(EventBridge::new(session_id.clone(), log.clone(), mailbox));
        engine.register_callback(bridge.as_callback());

        if let Err(e) = engine.initialize().await {
            tracing::warn!(
                session_id = %session_id,
                "eager engine initialization failed, deferring to first turn: {e}"
            );
        }

        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(session_id.clone()).or_insert(PoolEntry {
            engine,
            log,
            bridge,
        });
        Arc::clone(&entry.engine)
    }

    /// Clears the current-turn event buffer ahead of a new user turn.
    pub async fn begin_turn(&self, session_id: &RelaySessionId) {
        let sessions = self.sessions.read().await;
        if let Some(entry) = sessions.get(session_id) {
            entry.log.lock().expect("engine log lock poisoned").begin_turn();
        }
    }

    /// Records a locally-synthesized event (e.g. the engine-failure
    /// fallback) through the session's normal bridge path, so it is
    /// sequenced, logged, and delivered like any engine event.
    pub async fn record_event(&self, session_id: &RelaySessionId, event: EngineEvent) {
        let sessions = self.sessions.read().await;
        if let Some(entry) = sessions.get(session_id) {
            entry.bridge.handle_event(event);
        }
    }

    /// Number of events recorded for the in-flight turn.
    pub async fn current_turn_len(&self, session_id: &RelaySessionId) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|entry| entry.log.lock().expect("engine log lock poisoned").current_turn().len())
            .unwrap_or(0)
    }

    /// Asks the engine to clear its conversational state and empties the
    /// current-turn buffer. The instance and its event log survive; a
    /// session with no engine state is a no-op.
    pub async fn reset(&self, session_id: &RelaySessionId) -> Result<(), EngineError> {
        let (engine, log) = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(entry) => (Arc::clone(&entry.engine), Arc::clone(&entry.log)),
                None => return Ok(()),
            }
        };

        engine.reset_state().await?;
        log.lock().expect("engine log lock poisoned").begin_turn();
        tracing::info!(session_id = %session_id, "engine session reset");
        Ok(())
    }

    /// Removes and discards the session's engine state. Idempotent;
    /// returns `true` only when an entry was actually removed.
    pub async fn destroy(&self, session_id: &RelaySessionId) -> bool {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            tracing::info!(session_id = %session_id, "engine session destroyed");
        }
        removed
    }

    /// Derives statistics from the session's full event log. Sessions
    /// without engine state get all-zero counters.
    pub async fn statistics(&self, session_id: &RelaySessionId) -> SessionStatistics {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(entry) => {
                let log = entry.log.lock().expect("engine log lock poisoned");
                SessionStatistics::from_log(
                    session_id.as_str(),
                    log.events(),
                    log.current_turn().len(),
                )
            }
            None => SessionStatistics::empty(session_id.as_str()),
        }
    }

    /// Whether the session currently has engine state.
    pub async fn contains(&self, session_id: &RelaySessionId) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Number of sessions holding engine state.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::engine::scripted::{ScriptedEngine, ScriptedEngineFactory};
    use serde_json::json;

    fn pool_fixture() -> (Arc<EngineSessionPool>, Arc<ScriptedEngineFactory>) {
        let factory = Arc::new(ScriptedEngineFactory::new());
        (Arc::new(EngineSessionPool::new(factory.clone())), factory)
    }

    fn mailbox() -> Arc<Mailbox> {
        Arc::new(Mailbox::new(64))
    }

    #[tokio::test]
    async fn get_or_create_reuses_the_instance_across_turns() {
        let (pool, factory) = pool_fixture();
        let session_id = RelaySessionId::new("pool-1");
        let mb = mailbox();

        let first = pool.get_or_create(&session_id, mb.clone()).await;
        let second = pool.get_or_create(&session_id, mb).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.created().len(), 1);
    }

    #[tokio::test]
    async fn creation_attempts_eager_initialization() {
        let (pool, factory) = pool_fixture();
        let session_id = RelaySessionId::new("pool-init");

        pool.get_or_create(&session_id, mailbox()).await;

        let engine = factory.created()[0].1.clone();
        assert_eq!(engine.initialize_calls(), 1);
    }

    #[tokio::test]
    async fn failed_initialization_is_non_fatal() {
        let factory = Arc::new(ScriptedEngineFactory::new());
        factory.push_engine(Arc::new(ScriptedEngine::with_failing_initialize()));
        let pool = EngineSessionPool::new(factory.clone());
        let session_id = RelaySessionId::new("pool-badinit");

        pool.get_or_create(&session_id, mailbox()).await;

        assert!(pool.contains(&session_id).await);
    }

    #[tokio::test]
    async fn launch_params_differ_across_sessions() {
        let (pool, factory) = pool_fixture();

        pool.get_or_create(&RelaySessionId::new("alpha"), mailbox()).await;
        pool.get_or_create(&RelaySessionId::new("beta"), mailbox()).await;

        let created = factory.created();
        assert_eq!(created.len(), 2);
        assert_ne!(created[0].0.instance_name, created[1].0.instance_name);
    }

    #[tokio::test]
    async fn reset_clears_current_turn_but_keeps_history() {
        let (pool, _factory) = pool_fixture();
        let session_id = RelaySessionId::new("pool-reset");
        pool.get_or_create(&session_id, mailbox()).await;

        pool.record_event(&session_id, EngineEvent::new("task_complete", "a", json!({})))
            .await;
        assert_eq!(pool.current_turn_len(&session_id).await, 1);

        pool.reset(&session_id).await.unwrap();

        let stats = pool.statistics(&session_id).await;
        assert_eq!(stats.current_turn_events, 0);
        assert_eq!(stats.tasks_completed, 1);
        assert_eq!(stats.total_events, 1);
    }

    #[tokio::test]
    async fn reset_of_unknown_session_is_a_noop() {
        let (pool, _factory) = pool_fixture();
        pool.reset(&RelaySessionId::new("missing")).await.unwrap();
    }

    #[tokio::test]
    async fn destroy_then_recreate_yields_fresh_state() {
        let (pool, factory) = pool_fixture();
        let session_id = RelaySessionId::new("pool-fresh");

        pool.get_or_create(&session_id, mailbox()).await;
        pool.record_event(&session_id, EngineEvent::new("task_complete", "a", json!({})))
            .await;

        assert!(pool.destroy(&session_id).await);
        assert!(!pool.destroy(&session_id).await);

        pool.get_or_create(&session_id, mailbox()).await;
        let stats = pool.statistics(&session_id).await;
        assert_eq!(stats.total_events, 0);
        assert_eq!(factory.created().len(), 2);
    }

    #[tokio::test]
    async fn statistics_for_unknown_session_are_zeroed() {
        let (pool, _factory) = pool_fixture();
        let stats = pool.statistics(&RelaySessionId::new("never-seen")).await;
        assert_eq!(stats.total_events, 0);
        assert_eq!(stats.tool_calls, 0);
        assert_eq!(stats.errors, 0);
        assert!(stats.tools_used.is_empty());
    }
}
