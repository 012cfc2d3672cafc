//! End-to-end relay tests.
//!
//! Drives the full relay stack - registry, mailbox, dispatcher, bridge,
//! engine pool, and chat turn service - against a capturing transport and
//! a scripted engine, without a real socket or database.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use parley::adapters::engine::{
    EngineSessionPool, ScriptedEngine, ScriptedEngineFactory, ScriptedTurn,
};
use parley::adapters::memory::InMemoryChatStore;
use parley::adapters::websocket::registry::test_support::CapturingTransport;
use parley::adapters::websocket::{
    ChatRequest, Dispatcher, Mailbox, ServerMessage, TransportRegistry,
};
use parley::application::ChatTurnService;
use parley::domain::chat::AgentProfile;
use parley::domain::events::EngineEvent;
use parley::domain::foundation::{RelaySessionId, UserId};

const HEARTBEAT: Duration = Duration::from_secs(30);

struct Relay {
    registry: Arc<TransportRegistry>,
    pool: Arc<EngineSessionPool>,
    factory: Arc<ScriptedEngineFactory>,
    store: Arc<InMemoryChatStore>,
    chat: Arc<ChatTurnService>,
    agent: AgentProfile,
    user_id: UserId,
}

struct Connection {
    transport: Arc<CapturingTransport>,
    mailbox: Arc<Mailbox>,
}

impl Relay {
    fn new() -> Self {
        let agent = AgentProfile::system("Atlas", "You answer questions.");
        let registry = Arc::new(TransportRegistry::new());
        let factory = Arc::new(ScriptedEngineFactory::new());
        let pool = Arc::new(EngineSessionPool::new(factory.clone()));
        let store = Arc::new(InMemoryChatStore::new().with_agent(agent.clone()));
        let chat = Arc::new(ChatTurnService::new(store.clone(), pool.clone()));
        Self {
            registry,
            pool,
            factory,
            store,
            chat,
            agent,
            user_id: UserId::new(),
        }
    }

    /// Mirrors the coordinator's connect path: register, acknowledge,
    /// start the dispatcher.
    async fn connect(&self, session_id: &RelaySessionId) -> Connection {
        let transport = Arc::new(CapturingTransport::new());
        let mailbox = Arc::new(Mailbox::new(256));
        self.registry
            .register(session_id.clone(), transport.clone(), mailbox.clone())
            .await
            .expect("register");
        self.registry
            .send_now(session_id, &ServerMessage::connection_success(session_id))
            .await
            .expect("ack");
        Dispatcher::spawn(
            session_id.clone(),
            mailbox.clone(),
            self.registry.clone(),
            HEARTBEAT,
        );
        Connection { transport, mailbox }
    }

    /// Mirrors the coordinator's disconnect path.
    async fn disconnect(&self, session_id: &RelaySessionId) {
        self.registry.teardown(session_id).await;
        self.pool.destroy(session_id).await;
    }

    fn chat_request(&self, message: &str) -> ChatRequest {
        ChatRequest {
            message: Some(message.to_string()),
            agent_id: Some(self.agent.id.to_string()),
            conversation_id: None,
            model_id: None,
            user_id: Some(self.user_id.to_string()),
        }
    }
}

fn frames_of(transport: &CapturingTransport) -> Vec<serde_json::Value> {
    transport
        .sent()
        .iter()
        .map(|frame| serde_json::from_str(frame).expect("frame is JSON"))
        .collect()
}

fn tags_of(frames: &[serde_json::Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| f["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn chat_happy_path_emits_the_expected_envelope_sequence() {
    let relay = Relay::new();
    let session_id = RelaySessionId::new("flow-1");

    let engine = Arc::new(ScriptedEngine::new());
    engine.push_turn(
        ScriptedTurn::success("All done").with_events(vec![
            EngineEvent::new("task_start", "Atlas", json!({"user_query": "hello"})),
            EngineEvent::new("tool_call_start", "Atlas", json!({"tool_name": "search"})),
            EngineEvent::new("tool_call_complete", "Atlas", json!({"tool_name": "search"})),
            EngineEvent::new("task_complete", "Atlas", json!({"total_turns": 2})),
        ]),
    );
    relay.factory.push_engine(engine);

    let connection = relay.connect(&session_id).await;
    relay
        .chat
        .process(&session_id, relay.chat_request("hello"), &connection.mailbox)
        .await;

    // connection_success + chat_start + user_message_saved
    //   + 4 agent_events + 4 status_updates + chat_complete
    connection.transport.wait_for(12).await;
    let frames = frames_of(&connection.transport);
    let tags = tags_of(&frames);

    assert_eq!(tags[0], "connection_success");
    assert_eq!(tags[1], "chat_start");
    assert_eq!(tags[2], "user_message_saved");
    assert_eq!(*tags.last().unwrap(), "chat_complete");

    // Each agent_event precedes its derived status_update, and sequences
    // are 1..N in order.
    let mut sequences = Vec::new();
    let mut last_was_event = false;
    for frame in &frames {
        match frame["type"].as_str().unwrap() {
            "agent_event" => {
                sequences.push(frame["sequence"].as_u64().unwrap());
                last_was_event = true;
            }
            "status_update" => {
                assert!(last_was_event, "status_update without preceding agent_event");
                last_was_event = false;
            }
            _ => last_was_event = false,
        }
    }
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    // The new conversation id is surfaced and the reply is persisted.
    let saved = frames.iter().find(|f| f["type"] == "user_message_saved").unwrap();
    let conversation_id = saved["conversation_id"].as_str().unwrap();
    let complete = frames.iter().find(|f| f["type"] == "chat_complete").unwrap();
    assert_eq!(complete["conversation_id"].as_str().unwrap(), conversation_id);
    assert_eq!(complete["response"], "All done");
    assert_eq!(complete["events_count"], 4);
    assert_eq!(relay.store.message_count(), 2);
}

#[tokio::test]
async fn ping_is_answered_while_a_chat_turn_is_in_flight() {
    let relay = Relay::new();
    let session_id = RelaySessionId::new("ping-1");

    let engine = Arc::new(ScriptedEngine::new());
    engine.push_turn(
        ScriptedTurn::success("slow reply").with_delay(Duration::from_millis(200)),
    );
    relay.factory.push_engine(engine);

    let connection = relay.connect(&session_id).await;

    // Start the turn on its own task, the way the coordinator does.
    let turn = {
        let chat = relay.chat.clone();
        let session_id = session_id.clone();
        let mailbox = connection.mailbox.clone();
        let request = relay.chat_request("take your time");
        tokio::spawn(async move { chat.process(&session_id, request, &mailbox).await })
    };

    // Give the turn a moment to reach the engine, then ping on the
    // urgent path.
    tokio::time::sleep(Duration::from_millis(50)).await;
    relay
        .registry
        .send_now(&session_id, &ServerMessage::pong(Some("t0".to_string())))
        .await
        .expect("pong");

    turn.await.unwrap();
    connection.transport.wait_for(5).await;

    let tags = tags_of(&frames_of(&connection.transport));
    let pong_at = tags.iter().position(|t| t == "pong").expect("pong sent");
    let complete_at = tags
        .iter()
        .position(|t| t == "chat_complete")
        .expect("turn completed");
    assert!(
        pong_at < complete_at,
        "pong must not wait for the in-flight turn (tags: {tags:?})"
    );
}

#[tokio::test]
async fn reset_clears_current_turn_but_preserves_historical_counters() {
    let relay = Relay::new();
    let session_id = RelaySessionId::new("reset-1");

    let engine = Arc::new(ScriptedEngine::new());
    engine.push_turn(ScriptedTurn::success("done").with_events(vec![
        EngineEvent::new("task_start", "Atlas", json!({})),
        EngineEvent::new("task_complete", "Atlas", json!({"total_turns": 1})),
    ]));
    relay.factory.push_engine(engine.clone());

    let connection = relay.connect(&session_id).await;
    relay
        .chat
        .process(&session_id, relay.chat_request("hi"), &connection.mailbox)
        .await;

    let before = relay.pool.statistics(&session_id).await;
    assert_eq!(before.tasks_completed, 1);
    assert_eq!(before.current_turn_events, 2);

    relay.pool.reset(&session_id).await.unwrap();
    assert_eq!(engine.reset_calls(), 1);

    let after = relay.pool.statistics(&session_id).await;
    assert_eq!(after.current_turn_events, 0, "current-turn buffer cleared");
    assert_eq!(after.tasks_completed, 1, "historical counters preserved");
    assert_eq!(after.total_events, 2);
}

#[tokio::test]
async fn reconnecting_after_teardown_gets_fresh_engine_state() {
    let relay = Relay::new();
    let session_id = RelaySessionId::new("phoenix");

    let first = relay.connect(&session_id).await;
    relay
        .chat
        .process(&session_id, relay.chat_request("first life"), &first.mailbox)
        .await;
    assert_eq!(relay.factory.created().len(), 1);

    // Disconnect mid-session and reconnect with the same id.
    relay.disconnect(&session_id).await;
    assert!(!relay.pool.contains(&session_id).await);

    let second = relay.connect(&session_id).await;
    relay
        .chat
        .process(&session_id, relay.chat_request("second life"), &second.mailbox)
        .await;

    // A fresh engine instance was created and no events leaked across.
    assert_eq!(relay.factory.created().len(), 2);
    let (_, new_engine) = relay.factory.created()[1].clone();
    assert_eq!(new_engine.queries().len(), 1);
    assert!(new_engine.queries()[0].contains("second life"));
}

#[tokio::test]
async fn get_status_before_any_chat_reports_zeroed_counters() {
    let relay = Relay::new();
    let session_id = RelaySessionId::new("quiet");
    let _connection = relay.connect(&session_id).await;

    let stats = relay.pool.statistics(&session_id).await;
    assert_eq!(stats.total_events, 0);
    assert_eq!(stats.tool_calls, 0);
    assert_eq!(stats.agent_switches, 0);
    assert_eq!(stats.tasks_completed, 0);
    assert_eq!(stats.errors, 0);
    assert!(stats.tools_used.is_empty());
}

#[tokio::test]
async fn concurrent_sessions_never_cross_deliver() {
    let relay = Relay::new();
    let s1 = RelaySessionId::new("iso-1");
    let s2 = RelaySessionId::new("iso-2");

    let c1 = relay.connect(&s1).await;
    let c2 = relay.connect(&s2).await;

    // Wire each session's engine state and emit 50 marked events apiece.
    relay.pool.get_or_create(&s1, c1.mailbox.clone()).await;
    relay.pool.get_or_create(&s2, c2.mailbox.clone()).await;

    for i in 0..50 {
        relay
            .pool
            .record_event(&s1, EngineEvent::new("ai_response", "a", json!({"origin": "iso-1", "i": i})))
            .await;
        relay
            .pool
            .record_event(&s2, EngineEvent::new("ai_response", "a", json!({"origin": "iso-2", "i": i})))
            .await;
    }

    c1.transport.wait_for(51).await; // ack + 50 events
    c2.transport.wait_for(51).await;

    for (transport, origin) in [(&c1.transport, "iso-1"), (&c2.transport, "iso-2")] {
        let frames = frames_of(transport);
        let mut sequences = Vec::new();
        for frame in &frames {
            if frame["type"] == "agent_event" {
                assert_eq!(frame["data"]["origin"], *origin, "cross-session delivery");
                sequences.push(frame["sequence"].as_u64().unwrap());
            }
        }
        assert_eq!(sequences, (1..=50).collect::<Vec<u64>>());
    }
}

#[tokio::test]
async fn duplicate_session_registration_is_rejected() {
    let relay = Relay::new();
    let session_id = RelaySessionId::new("dup");
    let _connection = relay.connect(&session_id).await;

    let err = relay
        .registry
        .register(
            session_id.clone(),
            Arc::new(CapturingTransport::new()),
            Arc::new(Mailbox::new(8)),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already registered"));
}

#[tokio::test]
async fn teardown_is_idempotent_for_registry_and_pool() {
    let relay = Relay::new();
    let session_id = RelaySessionId::new("twice");
    let connection = relay.connect(&session_id).await;
    relay.pool.get_or_create(&session_id, connection.mailbox.clone()).await;

    assert!(relay.registry.teardown(&session_id).await);
    assert!(relay.pool.destroy(&session_id).await);

    // Second teardown of an already-destroyed session: no-op both times.
    assert!(!relay.registry.teardown(&session_id).await);
    assert!(!relay.pool.destroy(&session_id).await);
}

#[tokio::test]
async fn dead_transport_kills_only_its_own_session() {
    let relay = Relay::new();
    let healthy = RelaySessionId::new("healthy");
    let doomed = RelaySessionId::new("doomed");

    let healthy_conn = relay.connect(&healthy).await;

    let doomed_transport = Arc::new(CapturingTransport::new());
    let doomed_mailbox = Arc::new(Mailbox::new(8));
    relay
        .registry
        .register(doomed.clone(), doomed_transport.clone(), doomed_mailbox.clone())
        .await
        .unwrap();
    Dispatcher::spawn(
        doomed.clone(),
        doomed_mailbox.clone(),
        relay.registry.clone(),
        HEARTBEAT,
    );

    doomed_transport.set_failing(true);
    doomed_mailbox.push(ServerMessage::heartbeat());

    // The doomed session tears down; the healthy one keeps working.
    for _ in 0..100 {
        if !relay.registry.is_registered(&doomed).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(!relay.registry.is_registered(&doomed).await);
    assert!(doomed_mailbox.is_closed());

    relay
        .registry
        .send_now(&healthy, &ServerMessage::pong(None))
        .await
        .expect("healthy session still reachable");
    healthy_conn.transport.wait_for(2).await;
}

#[tokio::test]
async fn engine_failure_produces_fallback_completion_and_session_survives() {
    let relay = Relay::new();
    let session_id = RelaySessionId::new("fallback");

    let engine = Arc::new(ScriptedEngine::new());
    engine.push_turn(ScriptedTurn::transport_error("sidecar down"));
    engine.push_turn(ScriptedTurn::success("recovered"));
    relay.factory.push_engine(engine);

    let connection = relay.connect(&session_id).await;

    relay
        .chat
        .process(&session_id, relay.chat_request("first"), &connection.mailbox)
        .await;
    relay
        .chat
        .process(&session_id, relay.chat_request("second"), &connection.mailbox)
        .await;

    // ack, then per turn: chat_start, user_message_saved, (agent_event
    // for the engine_error), chat_complete / chat_start,
    // user_message_saved, chat_complete
    connection.transport.wait_for(8).await;
    let frames = frames_of(&connection.transport);
    let tags = tags_of(&frames);

    let completes: Vec<&serde_json::Value> =
        frames.iter().filter(|f| f["type"] == "chat_complete").collect();
    assert_eq!(completes.len(), 2, "both turns completed (tags: {tags:?})");
    assert!(completes[0]["response"].as_str().unwrap().contains("Atlas"));
    assert_eq!(completes[1]["response"], "recovered");

    let stats = relay.pool.statistics(&session_id).await;
    assert_eq!(stats.errors, 1);
}

#[tokio::test]
async fn second_chat_queues_behind_the_first() {
    let relay = Relay::new();
    let session_id = RelaySessionId::new("serial");

    let engine = Arc::new(ScriptedEngine::new());
    engine.push_turn(
        ScriptedTurn::success("one").with_delay(Duration::from_millis(80)),
    );
    engine.push_turn(ScriptedTurn::success("two"));
    relay.factory.push_engine(engine.clone());

    let connection = relay.connect(&session_id).await;
    let turn_lock = Arc::new(tokio::sync::Mutex::new(()));

    let mut turns = Vec::new();
    for message in ["first", "second"] {
        let chat = relay.chat.clone();
        let session_id = session_id.clone();
        let mailbox = connection.mailbox.clone();
        let request = relay.chat_request(message);
        let turn_lock = turn_lock.clone();
        turns.push(tokio::spawn(async move {
            let _turn = turn_lock.lock().await;
            chat.process(&session_id, request, &mailbox).await;
        }));
        // Deterministic arrival order.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    for turn in turns {
        turn.await.unwrap();
    }

    // The engine saw the queries strictly one after the other.
    let queries = engine.queries();
    assert_eq!(queries.len(), 2);
    assert!(queries[0].contains("first"));
    assert!(queries[1].contains("second"));

    // And the envelope stream never interleaves the two turns.
    connection.transport.wait_for(7).await;
    let tags = tags_of(&frames_of(&connection.transport));
    let filtered: Vec<&str> = tags
        .iter()
        .filter(|t| *t == "chat_start" || *t == "chat_complete")
        .map(|s| s.as_str())
        .collect();
    assert_eq!(
        filtered,
        vec!["chat_start", "chat_complete", "chat_start", "chat_complete"]
    );
}

mod sequence_properties {
    use super::*;
    use parley::adapters::websocket::{EngineLog, EventBridge};
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn kind_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("task_start".to_string()),
            Just("ai_response".to_string()),
            Just("tool_call_start".to_string()),
            Just("agent_switch".to_string()),
            Just("task_complete".to_string()),
            "[a-z_]{1,12}",
        ]
    }

    proptest! {
        /// For any stream of events bridged for one session, the observed
        /// sequence numbers are exactly 1..N with no gaps or repeats.
        #[test]
        fn bridged_events_are_sequenced_1_to_n_in_order(
            kinds in proptest::collection::vec(kind_strategy(), 0..40)
        ) {
            let log = Arc::new(Mutex::new(EngineLog::new()));
            let mailbox = Arc::new(Mailbox::new(1024));
            let bridge = Arc::new(EventBridge::new(
                RelaySessionId::new("prop"),
                log.clone(),
                mailbox,
            ));

            for kind in &kinds {
                bridge.handle_event(EngineEvent::new(kind.as_str(), "a", json!({})));
            }

            let log = log.lock().unwrap();
            let sequences: Vec<u64> = log.events().iter().map(|e| e.sequence).collect();
            prop_assert_eq!(sequences, (1..=kinds.len() as u64).collect::<Vec<u64>>());
        }
    }
}
