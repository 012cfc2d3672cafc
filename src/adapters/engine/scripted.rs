//! Scripted engine for tests.
//!
//! Deterministic stand-in for the external engine: each turn pops a
//! scripted response, replays its events through the registered callbacks
//! (optionally after a delay, to exercise in-flight-turn behavior), and
//! returns the scripted outcome.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::events::EngineEvent;
use crate::ports::{
    AgentEngine, EngineError, EngineFactory, EngineLaunchParams, EventCallback, TurnResult,
};

/// One scripted engine turn.
pub struct ScriptedTurn {
    pub events: Vec<EngineEvent>,
    pub outcome: Result<TurnResult, EngineError>,
    pub delay: Option<Duration>,
}

impl ScriptedTurn {
    /// A successful turn with the given response text.
    pub fn success(response: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            outcome: Ok(TurnResult::success(response)),
            delay: None,
        }
    }

    /// An engine-reported processing failure.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            outcome: Ok(TurnResult::failure(error)),
            delay: None,
        }
    }

    /// A transport-level engine error.
    pub fn transport_error(reason: impl Into<String>) -> Self {
        Self {
            events: Vec::new(),
            outcome: Err(EngineError::Transport(reason.into())),
            delay: None,
        }
    }

    /// Events to replay through the callback before returning.
    pub fn with_events(mut self, events: Vec<EngineEvent>) -> Self {
        self.events = events;
        self
    }

    /// Delay before the turn completes (after emitting events).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the full outcome explicitly.
    pub fn with_outcome(mut self, outcome: Result<TurnResult, EngineError>) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Deterministic engine implementation for tests.
pub struct ScriptedEngine {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    callbacks: Mutex<Vec<EventCallback>>,
    queries: Mutex<Vec<String>>,
    initialize_calls: AtomicUsize,
    reset_calls: AtomicUsize,
    fail_initialize: bool,
}

impl ScriptedEngine {
    /// An engine with no scripted turns; unscripted turns succeed with a
    /// canned reply.
    pub fn new() -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            callbacks: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            initialize_calls: AtomicUsize::new(0),
            reset_calls: AtomicUsize::new(0),
            fail_initialize: false,
        }
    }

    /// An engine whose eager initialization always fails.
    pub fn with_failing_initialize() -> Self {
        let mut engine = Self::new();
        engine.fail_initialize = true;
        engine
    }

    /// Queues a scripted turn.
    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.turns.lock().expect("scripted engine lock poisoned").push_back(turn);
    }

    /// Queries processed so far.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("scripted engine lock poisoned").clone()
    }

    /// Number of `initialize` calls observed.
    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    /// Number of `reset_state` calls observed.
    pub fn reset_calls(&self) -> usize {
        self.reset_calls.load(Ordering::SeqCst)
    }

    fn emit(&self, event: EngineEvent) {
        let callbacks = self.callbacks.lock().expect("scripted engine lock poisoned").clone();
        for callback in callbacks {
            callback(event.clone());
        }
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentEngine for ScriptedEngine {
    async fn initialize(&self) -> Result<(), EngineError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_initialize {
            return Err(EngineError::Initialization("scripted failure".to_string()));
        }
        Ok(())
    }

    async fn process_turn(&self, query: &str) -> Result<TurnResult, EngineError> {
        self.queries
            .lock()
            .expect("scripted engine lock poisoned")
            .push(query.to_string());

        let turn = self
            .turns
            .lock()
            .expect("scripted engine lock poisoned")
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::success("Scripted reply"));

        for event in &turn.events {
            self.emit(event.clone());
        }
        if let Some(delay) = turn.delay {
            tokio::time::sleep(delay).await;
        }
        turn.outcome
    }

    async fn reset_state(&self) -> Result<(), EngineError> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn register_callback(&self, callback: EventCallback) {
        self.callbacks
            .lock()
            .expect("scripted engine lock poisoned")
            .push(callback);
    }
}

/// Factory handing out scripted engines and recording what was created.
pub struct ScriptedEngineFactory {
    queued: Mutex<VecDeque<Arc<ScriptedEngine>>>,
    created: Mutex<Vec<(EngineLaunchParams, Arc<ScriptedEngine>)>>,
}

impl ScriptedEngineFactory {
    /// A factory that builds a fresh default engine per session unless one
    /// was queued with [`push_engine`](Self::push_engine).
    pub fn new() -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Queues a pre-configured engine for the next `create` call.
    pub fn push_engine(&self, engine: Arc<ScriptedEngine>) {
        self.queued
            .lock()
            .expect("scripted factory lock poisoned")
            .push_back(engine);
    }

    /// Engines created so far, with their launch parameters.
    pub fn created(&self) -> Vec<(EngineLaunchParams, Arc<ScriptedEngine>)> {
        self.created
            .lock()
            .expect("scripted factory lock poisoned")
            .clone()
    }
}

impl Default for ScriptedEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for ScriptedEngineFactory {
    fn create(&self, params: EngineLaunchParams) -> Arc<dyn AgentEngine> {
        let engine = self
            .queued
            .lock()
            .expect("scripted factory lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Arc::new(ScriptedEngine::new()));
        self.created
            .lock()
            .expect("scripted factory lock poisoned")
            .push((params, Arc::clone(&engine)));
        engine
    }
}
