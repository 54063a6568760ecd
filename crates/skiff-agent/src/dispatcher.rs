// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session ordering.
//!
//! Each session key gets one actor task fed by a bounded mpsc channel. The
//! actor handles its jobs strictly one at a time, so two messages for the
//! same conversation never interleave while different conversations run
//! concurrently. Idle actors retire on their own; a replacement for the same
//! key first waits for its predecessor to finish.
//!
//! Admission never waits on a mailbox. A message for a session whose mailbox
//! is full is turned away: a direct caller gets `SkiffError::BusOverflow`
//! and bus traffic gets [`BUSY_REPLY`] on the outbound queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use skiff_bus::MessageBus;
use skiff_core::{InboundMessage, OutboundMessage, SessionKey, SessionRecord, SkiffError};
use skiff_tools::ToolContext;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::{ContextBuilder, system_turn};
use crate::session::{SessionStore, SessionTranscript};
use crate::tool_loop::{ToolLoop, TurnInput, TurnOutcome};

/// Reply sent to the user when a turn fails. Details go to the log.
pub const ERROR_REPLY: &str = "Sorry, I ran into a problem while handling that. Please try again.";

/// Reply sent when a session already has a full mailbox of pending turns.
pub const BUSY_REPLY: &str =
    "I'm still working through your earlier messages. Please send that again in a moment.";

/// Where a turn's single outbound message goes.
#[derive(Debug)]
pub enum Delivery {
    /// Publish to the outbound bus queue.
    Bus,
    /// Hand back to a waiting caller.
    Direct(oneshot::Sender<Result<OutboundMessage, SkiffError>>),
}

struct Job {
    msg: InboundMessage,
    key: SessionKey,
    delivery: Delivery,
}

struct ActorHandle {
    tx: mpsc::Sender<Job>,
    task: JoinHandle<()>,
}

/// Runs one turn for one message: persist, build context, loop, reply.
pub struct MessageProcessor {
    sessions: Arc<SessionStore>,
    context: Arc<dyn ContextBuilder>,
    tool_loop: ToolLoop,
    bus: Arc<MessageBus>,
    history_window: usize,
}

impl MessageProcessor {
    pub fn new(
        sessions: Arc<SessionStore>,
        context: Arc<dyn ContextBuilder>,
        tool_loop: ToolLoop,
        bus: Arc<MessageBus>,
        history_window: usize,
    ) -> Self {
        Self {
            sessions,
            context,
            tool_loop,
            bus,
            history_window,
        }
    }

    async fn handle(&self, job: Job) {
        let Job { msg, key, delivery } = job;
        let result = self.process(&msg, &key).await;

        match delivery {
            Delivery::Direct(reply) => {
                if reply.send(result).is_err() {
                    debug!(session_key = %key, "direct caller went away before the reply");
                }
            }
            Delivery::Bus => {
                let out = result.unwrap_or_else(|_| {
                    let (channel, chat_id) = msg.reply_target();
                    OutboundMessage::new(channel, chat_id, ERROR_REPLY)
                });
                if let Err(e) = self.bus.publish_outbound(out).await {
                    error!(session_key = %key, error = %e, "failed to publish reply");
                }
            }
        }
    }

    async fn process(
        &self,
        msg: &InboundMessage,
        key: &SessionKey,
    ) -> Result<OutboundMessage, SkiffError> {
        let history = self.sessions.history(key, self.history_window).await?;

        let record = if msg.is_system() {
            SessionRecord::system(system_turn(&msg.sender_id, &msg.content))
        } else {
            SessionRecord::user(msg.content.clone())
        };
        self.sessions.append(key, record).await?;

        let mut tool_ctx = ToolContext::for_inbound(msg);
        tool_ctx.session_key = key.clone();
        let transcript = SessionTranscript::new(&self.sessions, key);

        let result = self
            .tool_loop
            .run(TurnInput {
                history: &history,
                inbound: msg,
                context: self.context.as_ref(),
                tool_ctx: &tool_ctx,
                transcript: &transcript,
            })
            .await;

        info!(
            session_key = %key,
            iterations = result.iterations,
            input_tokens = result.usage.input_tokens,
            output_tokens = result.usage.output_tokens,
            "turn finished"
        );

        match result.outcome {
            TurnOutcome::Error(e) => Err(e),
            TurnOutcome::Success | TurnOutcome::ForcedStop => {
                let (channel, chat_id) = msg.reply_target();
                Ok(OutboundMessage::new(channel, chat_id, result.content))
            }
        }
    }
}

/// Routes messages to per-session actors.
pub struct SessionDispatcher {
    processor: Arc<MessageProcessor>,
    actors: Mutex<HashMap<SessionKey, ActorHandle>>,
    queue_depth: usize,
    idle: Duration,
}

impl SessionDispatcher {
    pub fn new(processor: Arc<MessageProcessor>, queue_depth: usize, idle: Duration) -> Self {
        Self {
            processor,
            actors: Mutex::new(HashMap::new()),
            queue_depth: queue_depth.max(1),
            idle,
        }
    }

    /// Queues `msg` on its session's actor, starting one if needed.
    ///
    /// `key` overrides the key derived from the message.
    pub async fn dispatch(&self, msg: InboundMessage, key: Option<SessionKey>, delivery: Delivery) {
        let key = key.unwrap_or_else(|| msg.session_key());
        let mut job = Job {
            msg,
            key: key.clone(),
            delivery,
        };

        // Only non-blocking sends happen under the lock.
        let mut actors = self.actors.lock().await;
        actors.retain(|_, h| !(h.tx.is_closed() && h.task.is_finished()));

        loop {
            let handle = actors
                .entry(key.clone())
                .or_insert_with(|| self.spawn_actor(key.clone(), None));

            match handle.tx.try_send(job) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    drop(actors);
                    self.turn_away(rejected).await;
                    return;
                }
                Err(TrySendError::Closed(returned)) => {
                    // The actor retired between lookups. Its successor waits for it.
                    job = returned;
                    if let Some(old) = actors.remove(&key) {
                        let handle = self.spawn_actor(key.clone(), Some(old.task));
                        actors.insert(key.clone(), handle);
                    }
                }
            }
        }
    }

    async fn turn_away(&self, job: Job) {
        let Job { msg, key, delivery } = job;
        warn!(
            session_key = %key,
            capacity = self.queue_depth,
            "session mailbox full, turning message away"
        );
        match delivery {
            Delivery::Direct(reply) => {
                let overflow = SkiffError::BusOverflow {
                    queue: "session",
                    capacity: self.queue_depth,
                };
                if reply.send(Err(overflow)).is_err() {
                    debug!(session_key = %key, "direct caller went away before the reply");
                }
            }
            Delivery::Bus => {
                let (channel, chat_id) = msg.reply_target();
                let out = OutboundMessage::new(channel, chat_id, BUSY_REPLY);
                if let Err(e) = self.processor.bus.publish_outbound(out).await {
                    error!(session_key = %key, error = %e, "failed to publish busy reply");
                }
            }
        }
    }

    fn spawn_actor(&self, key: SessionKey, predecessor: Option<JoinHandle<()>>) -> ActorHandle {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let processor = self.processor.clone();
        let idle = self.idle;
        debug!(session_key = %key, "starting session actor");
        let task = tokio::spawn(run_actor(processor, key, rx, idle, predecessor));
        ActorHandle { tx, task }
    }

    /// Number of actors that have not exited yet.
    pub async fn active_count(&self) -> usize {
        self.actors
            .lock()
            .await
            .values()
            .filter(|h| !h.task.is_finished())
            .count()
    }

    /// Detaches every actor, closing their queues. Each actor finishes the
    /// jobs already queued and then exits.
    pub(crate) async fn take_actors(&self) -> Vec<JoinHandle<()>> {
        self.actors
            .lock()
            .await
            .drain()
            .map(|(_, ActorHandle { task, .. })| task)
            .collect()
    }
}

async fn run_actor(
    processor: Arc<MessageProcessor>,
    key: SessionKey,
    mut rx: mpsc::Receiver<Job>,
    idle: Duration,
    predecessor: Option<JoinHandle<()>>,
) {
    if let Some(previous) = predecessor
        && let Err(e) = previous.await
    {
        warn!(session_key = %key, error = %e, "previous session actor ended abnormally");
    }

    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => processor.handle(job).await,
                None => break,
            },
            _ = tokio::time::sleep(idle) => {
                rx.close();
                while let Some(job) = rx.recv().await {
                    processor.handle(job).await;
                }
                processor.sessions.evict(&key).await;
                debug!(session_key = %key, "session actor retired after idling");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use skiff_config::model::BusConfig;
    use skiff_core::Role;
    use skiff_storage::{Database, SqliteStorage};
    use skiff_test_utils::{MockProvider, MockReply};
    use skiff_tools::ToolRegistry;

    use super::*;
    use crate::context::DefaultContextBuilder;
    use crate::tool_loop::LoopSettings;

    async fn dispatcher(
        provider: Arc<MockProvider>,
        idle: Duration,
    ) -> (SessionDispatcher, Arc<SessionStore>, Arc<MessageBus>) {
        let db = Database::open_in_memory().await.unwrap();
        let sessions = Arc::new(SessionStore::new(Arc::new(SqliteStorage::from_database(db))));
        let bus = Arc::new(MessageBus::new(&BusConfig::default()));
        let settings = LoopSettings {
            model: "mock".into(),
            max_tokens: 128,
            temperature: None,
            max_iterations: 4,
            provider_timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
        };
        let tool_loop = ToolLoop::new(provider, Arc::new(ToolRegistry::default()), settings);
        let processor = Arc::new(MessageProcessor::new(
            sessions.clone(),
            Arc::new(DefaultContextBuilder::new("prompt")),
            tool_loop,
            bus.clone(),
            50,
        ));
        (
            SessionDispatcher::new(processor, 8, idle),
            sessions,
            bus,
        )
    }

    #[tokio::test]
    async fn bus_delivery_publishes_reply_to_origin() {
        let provider = Arc::new(MockProvider::new([MockReply::text("pong")]));
        let (dispatcher, _, bus) = dispatcher(provider, Duration::from_secs(60)).await;
        dispatcher
            .dispatch(
                InboundMessage::new("telegram", "u", "42", "ping"),
                None,
                Delivery::Bus,
            )
            .await;
        let out = bus.consume_outbound().await.unwrap();
        assert_eq!(out.channel, "telegram");
        assert_eq!(out.chat_id, "42");
        assert_eq!(out.content, "pong");
    }

    #[tokio::test]
    async fn failed_turn_sends_friendly_reply() {
        let provider = Arc::new(MockProvider::new([MockReply::error("upstream exploded")]));
        let (dispatcher, _, bus) = dispatcher(provider, Duration::from_secs(60)).await;
        dispatcher
            .dispatch(InboundMessage::new("cli", "u", "direct", "hi"), None, Delivery::Bus)
            .await;
        let out = bus.consume_outbound().await.unwrap();
        assert_eq!(out.content, ERROR_REPLY);
        assert!(!out.content.contains("exploded"));
    }

    #[tokio::test]
    async fn direct_delivery_returns_error() {
        let provider = Arc::new(MockProvider::new([MockReply::error("nope")]));
        let (dispatcher, _, bus) = dispatcher(provider, Duration::from_secs(60)).await;
        let (tx, rx) = oneshot::channel();
        dispatcher
            .dispatch(
                InboundMessage::new("cli", "u", "direct", "hi"),
                None,
                Delivery::Direct(tx),
            )
            .await;
        assert!(rx.await.unwrap().is_err());
        assert_eq!(bus.outbound_len().await, 0);
    }

    #[tokio::test]
    async fn system_message_is_recorded_against_origin_session() {
        let provider = Arc::new(MockProvider::new([MockReply::text("summary")]));
        let (dispatcher, sessions, bus) = dispatcher(provider, Duration::from_secs(60)).await;
        dispatcher
            .dispatch(
                InboundMessage::system("subagent", "discord", "room", "done"),
                None,
                Delivery::Bus,
            )
            .await;
        let out = bus.consume_outbound().await.unwrap();
        assert_eq!((out.channel.as_str(), out.chat_id.as_str()), ("discord", "room"));

        let key = SessionKey::new("discord", "room");
        let history = sessions.history(&key, 10).await.unwrap();
        assert_eq!(history[0].role, Role::System);
        assert!(history[0].content.starts_with("[System message from subagent]"));
        assert_eq!(sessions.user_message_count(&key).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn system_message_naming_a_session_is_recorded_there() {
        let provider = Arc::new(MockProvider::new(vec![MockReply::text("summary")]));
        let (dispatcher, sessions, bus) = dispatcher(provider, Duration::from_secs(60)).await;
        let report = InboundMessage::system("subagent", "telegram", "42", "done")
            .with_metadata(skiff_core::SESSION_KEY_METADATA, "cron:j1");
        dispatcher.dispatch(report, None, Delivery::Bus).await;

        let out = bus.consume_outbound().await.unwrap();
        assert_eq!((out.channel.as_str(), out.chat_id.as_str()), ("telegram", "42"));
        let cron = sessions.history(&SessionKey::from("cron:j1"), 10).await.unwrap();
        assert_eq!(cron.len(), 2);
        let chat = sessions.history(&SessionKey::new("telegram", "42"), 10).await.unwrap();
        assert!(chat.is_empty());
    }

    #[tokio::test]
    async fn idle_actor_retires_and_replacement_keeps_order() {
        let provider = Arc::new(
            MockProvider::new([]).with_fallback(MockReply::Delay(
                Duration::from_millis(5),
                Box::new(MockReply::text("ok")),
            )),
        );
        let (dispatcher, sessions, bus) =
            dispatcher(provider, Duration::from_millis(50)).await;
        let key = SessionKey::new("cli", "direct");

        dispatcher
            .dispatch(InboundMessage::new("cli", "u", "direct", "first"), None, Delivery::Bus)
            .await;
        bus.consume_outbound().await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(dispatcher.active_count().await, 0);

        for text in ["second", "third"] {
            dispatcher
                .dispatch(InboundMessage::new("cli", "u", "direct", text), None, Delivery::Bus)
                .await;
        }
        bus.consume_outbound().await.unwrap();
        bus.consume_outbound().await.unwrap();

        let users: Vec<String> = sessions
            .history(&key, 50)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.role == Role::User)
            .map(|r| r.content)
            .collect();
        assert_eq!(users, vec!["first", "second", "third"]);
    }

    fn stalled_provider() -> Arc<MockProvider> {
        Arc::new(
            MockProvider::new(vec![MockReply::Delay(
                Duration::from_secs(3600),
                Box::new(MockReply::text("late")),
            )])
            .with_fallback(MockReply::text("ok")),
        )
    }

    async fn wait_for_requests(provider: &MockProvider, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while provider.request_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("provider was not called in time");
    }

    #[tokio::test]
    async fn full_mailbox_does_not_stall_other_sessions() {
        let provider = stalled_provider();
        let (dispatcher, _, bus) = dispatcher(provider.clone(), Duration::from_secs(60)).await;
        let busy = |text: String| InboundMessage::new("chat", "u", "busy", text);

        dispatcher.dispatch(busy("first".into()), None, Delivery::Bus).await;
        wait_for_requests(&provider, 1).await;

        // 8 fill the mailbox, 4 more are turned away.
        tokio::time::timeout(Duration::from_secs(2), async {
            for i in 0..12 {
                dispatcher.dispatch(busy(format!("m{i}")), None, Delivery::Bus).await;
            }
        })
        .await
        .expect("dispatch waited on a full mailbox");
        assert_eq!(bus.outbound_len().await, 4);
        let out = bus.consume_outbound().await.unwrap();
        assert_eq!((out.chat_id.as_str(), out.content.as_str()), ("busy", BUSY_REPLY));

        let (tx, rx) = oneshot::channel();
        tokio::time::timeout(
            Duration::from_secs(2),
            dispatcher.dispatch(
                InboundMessage::new("chat", "u", "other", "hello"),
                None,
                Delivery::Direct(tx),
            ),
        )
        .await
        .expect("other session was blocked by the busy one");
        let reply = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("other session never replied")
            .unwrap()
            .unwrap();
        assert_eq!(reply.content, "ok");
    }

    #[tokio::test]
    async fn direct_dispatch_to_full_mailbox_reports_overflow() {
        let provider = stalled_provider();
        let (dispatcher, sessions, _) = dispatcher(provider.clone(), Duration::from_secs(60)).await;
        let busy = |text: &str| InboundMessage::new("cli", "u", "direct", text);

        dispatcher.dispatch(busy("first"), None, Delivery::Bus).await;
        wait_for_requests(&provider, 1).await;
        for _ in 0..8 {
            dispatcher.dispatch(busy("queued"), None, Delivery::Bus).await;
        }

        let (tx, rx) = oneshot::channel();
        dispatcher
            .dispatch(busy("one too many"), None, Delivery::Direct(tx))
            .await;
        assert!(matches!(
            rx.await.unwrap(),
            Err(SkiffError::BusOverflow { queue: "session", capacity: 8 })
        ));

        // Turned-away messages never reach the transcript.
        let key = SessionKey::new("cli", "direct");
        assert_eq!(sessions.user_message_count(&key).await.unwrap(), 1);
    }
}
