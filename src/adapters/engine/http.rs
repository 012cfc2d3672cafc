//! HTTP engine adapter.
//!
//! Talks to an engine sidecar over plain HTTP. Each session's instance
//! gets its own base URL (host from config, port from the session's
//! launch parameters). The sidecar returns the turn result together with
//! the events it produced; the adapter replays those events through the
//! registered callbacks before handing the result back, which preserves
//! the "callback zero or more times, then return" contract of the port.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::domain::events::{EngineEvent, EventKind};
use crate::ports::{
    AgentEngine, EngineError, EngineFactory, EngineLaunchParams, EventCallback, TurnResult,
};

/// Engine instance reachable at one base URL.
pub struct HttpEngine {
    base_url: String,
    instance_name: String,
    client: Client,
    callbacks: Mutex<Vec<EventCallback>>,
}

impl HttpEngine {
    /// Creates an engine client for the given base URL.
    pub fn new(base_url: impl Into<String>, instance_name: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            base_url: base_url.into(),
            instance_name: instance_name.into(),
            client,
            callbacks: Mutex::new(Vec::new()),
        }
    }

    fn emit(&self, event: EngineEvent) {
        let callbacks = self.callbacks.lock().expect("engine callback lock poisoned").clone();
        for callback in callbacks {
            callback(event.clone());
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    instance: &'a str,
}

/// Event as the sidecar reports it.
#[derive(Debug, Deserialize)]
struct WireEvent {
    event_type: String,
    #[serde(default)]
    agent_name: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    success: bool,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    agent_name: Option<String>,
    #[serde(default)]
    model_used: Option<String>,
    #[serde(default)]
    tools_available: u32,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    events: Vec<WireEvent>,
}

#[async_trait]
impl AgentEngine for HttpEngine {
    async fn initialize(&self) -> Result<(), EngineError> {
        let response = self
            .client
            .post(format!("{}/initialize", self.base_url))
            .json(&serde_json::json!({ "instance": self.instance_name }))
            .send()
            .await
            .map_err(|e| EngineError::Initialization(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Initialization(format!(
                "sidecar answered {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn process_turn(&self, query: &str) -> Result<TurnResult, EngineError> {
        let response = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(&QueryRequest {
                query,
                instance: &self.instance_name,
            })
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Transport(format!(
                "sidecar answered {}",
                response.status()
            )));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Protocol(e.to_string()))?;

        for wire in &body.events {
            let agent = wire
                .agent_name
                .clone()
                .or_else(|| {
                    wire.data
                        .get("agent_name")
                        .and_then(|v| v.as_str())
                        .map(String::from)
                })
                .unwrap_or_default();
            self.emit(EngineEvent::new(
                EventKind::from(wire.event_type.clone()),
                agent,
                wire.data.clone(),
            ));
        }

        Ok(TurnResult {
            success: body.success,
            response: body.result.unwrap_or_default(),
            agent_name: body.agent_name,
            model_used: body.model_used,
            tools_available: body.tools_available,
            error: body.error,
        })
    }

    async fn reset_state(&self) -> Result<(), EngineError> {
        let response = self
            .client
            .post(format!("{}/reset", self.base_url))
            .json(&serde_json::json!({ "instance": self.instance_name }))
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::Transport(format!(
                "sidecar answered {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn register_callback(&self, callback: EventCallback) {
        self.callbacks
            .lock()
            .expect("engine callback lock poisoned")
            .push(callback);
    }
}

/// Builds [`HttpEngine`] instances from session launch parameters.
pub struct HttpEngineFactory {
    config: EngineConfig,
}

impl HttpEngineFactory {
    /// Creates a factory over the engine sidecar configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for HttpEngineFactory {
    fn create(&self, params: EngineLaunchParams) -> Arc<dyn AgentEngine> {
        let base_url = format!("http://{}:{}", self.config.host, params.port);
        Arc::new(HttpEngine::new(
            base_url,
            params.instance_name,
            self.config.timeout(),
        ))
    }
}
