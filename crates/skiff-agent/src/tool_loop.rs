// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The bounded provider/tool iteration behind every turn.
//!
//! A turn moves through `Init -> BuildContext -> AwaitProvider ->
//! (ExecTools -> AwaitProvider)* -> Terminal`. The iteration counter goes up
//! once per provider round-trip, and reaching the configured bound forces a
//! stop, so a model that never stops calling tools still terminates.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use skiff_config::model::{AgentConfig, ProviderConfig};
use skiff_core::{
    ChatMessage, InboundMessage, ProviderAdapter, ProviderRequest, ProviderResponse,
    SessionRecord, SkiffError, TokenUsage,
};
use skiff_tools::{ToolContext, ToolRegistry};
use tracing::{debug, error, warn};

use crate::context::ContextBuilder;

/// Content used when the model finishes without saying anything.
pub const EMPTY_RESPONSE_NOTICE: &str = "I've completed processing but have no response to give.";

/// Content used when the iteration bound is hit before any text was produced.
pub const FORCED_STOP_NOTICE: &str =
    "I stopped before finishing because this task needed more steps than I'm allowed to take.";

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Success,
    ForcedStop,
    Error,
}

/// States of the per-turn state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Init,
    BuildContext,
    AwaitProvider,
    ExecTools,
    Terminal(TerminalKind),
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Init => write!(f, "init"),
            LoopState::BuildContext => write!(f, "build_context"),
            LoopState::AwaitProvider => write!(f, "await_provider"),
            LoopState::ExecTools => write!(f, "exec_tools"),
            LoopState::Terminal(TerminalKind::Success) => write!(f, "terminal(success)"),
            LoopState::Terminal(TerminalKind::ForcedStop) => write!(f, "terminal(forced_stop)"),
            LoopState::Terminal(TerminalKind::Error) => write!(f, "terminal(error)"),
        }
    }
}

#[derive(Debug)]
pub enum TurnOutcome {
    Success,
    ForcedStop,
    Error(SkiffError),
}

/// Everything a caller needs to know about a finished turn.
#[derive(Debug)]
pub struct TurnResult {
    pub outcome: TurnOutcome,
    /// Final content. Empty only for [`TurnOutcome::Error`].
    pub content: String,
    /// Provider round-trips made.
    pub iterations: usize,
    pub usage: TokenUsage,
    /// Every state the turn passed through, in order.
    pub trace: Vec<LoopState>,
}

impl TurnResult {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, TurnOutcome::Error(_))
    }
}

/// Where a turn writes the records it produces.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn append(&self, record: SessionRecord) -> Result<(), SkiffError>;
}

/// A sink that keeps nothing. Subagents have no session state.
pub struct DiscardTranscript;

#[async_trait]
impl TranscriptSink for DiscardTranscript {
    async fn append(&self, _record: SessionRecord) -> Result<(), SkiffError> {
        Ok(())
    }
}

/// Fixed parameters of a tool loop, taken from config at construction.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub max_iterations: usize,
    pub provider_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl LoopSettings {
    pub fn from_config(agent: &AgentConfig, provider: &ProviderConfig) -> Self {
        Self {
            model: agent.model.clone(),
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
            max_iterations: agent.max_iterations,
            provider_timeout: Duration::from_secs(provider.timeout_secs),
            max_retries: provider.max_retries,
            retry_backoff: Duration::from_millis(provider.retry_backoff_ms),
        }
    }
}

/// Inputs for one turn.
pub struct TurnInput<'a> {
    /// Records preceding the inbound message, oldest first.
    pub history: &'a [SessionRecord],
    pub inbound: &'a InboundMessage,
    pub context: &'a dyn ContextBuilder,
    pub tool_ctx: &'a ToolContext,
    pub transcript: &'a dyn TranscriptSink,
}

/// Bookkeeping carried through a turn.
#[derive(Default)]
struct TurnProgress {
    trace: Vec<LoopState>,
    iterations: usize,
    usage: TokenUsage,
}

impl TurnProgress {
    fn enter(&mut self, state: LoopState) {
        debug!(
            from = %self.trace.last().copied().unwrap_or(LoopState::Init),
            to = %state,
            iteration = self.iterations,
            "loop transition"
        );
        self.trace.push(state);
    }
}

/// Runs turns against one provider and one registry view.
#[derive(Clone)]
pub struct ToolLoop {
    provider: Arc<dyn ProviderAdapter>,
    registry: Arc<ToolRegistry>,
    settings: LoopSettings,
}

impl ToolLoop {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        registry: Arc<ToolRegistry>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            provider,
            registry,
            settings,
        }
    }

    /// A loop over the same provider with a different registry and bound.
    pub fn derive(&self, registry: Arc<ToolRegistry>, max_iterations: usize) -> Self {
        Self {
            provider: self.provider.clone(),
            registry,
            settings: LoopSettings {
                max_iterations,
                ..self.settings.clone()
            },
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn max_iterations(&self) -> usize {
        self.settings.max_iterations
    }

    /// Runs a turn to its terminal state. Never returns early with an error;
    /// failures are reported through [`TurnOutcome::Error`].
    pub async fn run(&self, input: TurnInput<'_>) -> TurnResult {
        let mut progress = TurnProgress {
            trace: vec![LoopState::Init],
            ..Default::default()
        };

        match self.drive(&input, &mut progress).await {
            Ok((kind, content)) => {
                progress.enter(LoopState::Terminal(kind));
                let outcome = match kind {
                    TerminalKind::ForcedStop => {
                        warn!(
                            iterations = progress.iterations,
                            limit = self.settings.max_iterations,
                            "iteration bound reached, forcing stop"
                        );
                        TurnOutcome::ForcedStop
                    }
                    _ => TurnOutcome::Success,
                };
                TurnResult {
                    outcome,
                    content,
                    iterations: progress.iterations,
                    usage: progress.usage,
                    trace: progress.trace,
                }
            }
            Err(e) => {
                progress.enter(LoopState::Terminal(TerminalKind::Error));
                error!(error = %e, iterations = progress.iterations, "turn failed");
                TurnResult {
                    outcome: TurnOutcome::Error(e),
                    content: String::new(),
                    iterations: progress.iterations,
                    usage: progress.usage,
                    trace: progress.trace,
                }
            }
        }
    }

    async fn drive(
        &self,
        input: &TurnInput<'_>,
        progress: &mut TurnProgress,
    ) -> Result<(TerminalKind, String), SkiffError> {
        progress.enter(LoopState::BuildContext);
        let mut messages = input
            .context
            .build_messages(input.history, input.inbound)
            .await?;
        let tools = self.registry.tool_definitions();
        let mut partial = String::new();

        loop {
            if progress.iterations >= self.settings.max_iterations {
                let content = if partial.trim().is_empty() {
                    FORCED_STOP_NOTICE.to_string()
                } else {
                    partial
                };
                input
                    .transcript
                    .append(SessionRecord::assistant(content.clone(), Vec::new()))
                    .await?;
                return Ok((TerminalKind::ForcedStop, content));
            }

            progress.iterations += 1;
            progress.enter(LoopState::AwaitProvider);
            let request = ProviderRequest {
                model: self.settings.model.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                max_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
            };
            let response = self.call_provider(request).await?;
            progress.usage.input_tokens += response.usage.input_tokens;
            progress.usage.output_tokens += response.usage.output_tokens;

            if !response.has_tool_calls() {
                let content = if response.content.trim().is_empty() {
                    EMPTY_RESPONSE_NOTICE.to_string()
                } else {
                    response.content
                };
                input
                    .transcript
                    .append(SessionRecord::assistant(content.clone(), Vec::new()))
                    .await?;
                return Ok((TerminalKind::Success, content));
            }

            if !response.content.trim().is_empty() {
                partial = response.content.clone();
            }
            let assistant = SessionRecord::assistant(response.content, response.tool_calls);
            messages.push(ChatMessage::from(&assistant));
            input.transcript.append(assistant.clone()).await?;

            progress.enter(LoopState::ExecTools);
            for call in &assistant.tool_calls {
                let result = self.registry.execute(call, input.tool_ctx).await;
                let record = SessionRecord::tool(&result);
                messages.push(ChatMessage::from(&record));
                input.transcript.append(record).await?;
            }
        }
    }

    /// One provider round-trip with per-attempt timeout and linear backoff.
    async fn call_provider(&self, request: ProviderRequest) -> Result<ProviderResponse, SkiffError> {
        let timeout = self.settings.provider_timeout;
        let mut last_error = None;

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.settings.retry_backoff * attempt).await;
            }

            let call = AssertUnwindSafe(self.provider.chat(request.clone())).catch_unwind();
            let err = match tokio::time::timeout(timeout, call).await {
                Ok(Ok(Ok(response))) => return Ok(response),
                Ok(Ok(Err(e))) => e,
                Ok(Err(_)) => SkiffError::provider("provider panicked during chat"),
                Err(_) => SkiffError::Timeout { duration: timeout },
            };
            warn!(
                provider = self.provider.name(),
                attempt = attempt + 1,
                max_attempts = self.settings.max_retries + 1,
                error = %err,
                "provider call failed"
            );
            last_error = Some(err);
        }

        Err(last_error.unwrap_or_else(|| SkiffError::provider("provider was never called")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;
    use skiff_core::{Role, ToolCall};
    use skiff_test_utils::{EchoTool, MockProvider, MockReply};

    use super::*;
    use crate::context::DefaultContextBuilder;

    #[derive(Default)]
    struct RecordingTranscript(Mutex<Vec<SessionRecord>>);

    #[async_trait]
    impl TranscriptSink for RecordingTranscript {
        async fn append(&self, record: SessionRecord) -> Result<(), SkiffError> {
            self.0.lock().unwrap().push(record);
            Ok(())
        }
    }

    fn settings(max_iterations: usize) -> LoopSettings {
        LoopSettings {
            model: "mock".into(),
            max_tokens: 256,
            temperature: None,
            max_iterations,
            provider_timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn tool_loop(provider: Arc<MockProvider>, max_iterations: usize) -> ToolLoop {
        let mut registry = ToolRegistry::new(Duration::from_secs(5));
        registry.register(Arc::new(EchoTool)).unwrap();
        ToolLoop::new(provider, Arc::new(registry), settings(max_iterations))
    }

    fn echo_call(id: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "echo".into(),
            arguments: json!({"text": id}),
        }
    }

    async fn run_turn(tool_loop: &ToolLoop, transcript: &RecordingTranscript) -> TurnResult {
        let inbound = InboundMessage::new("cli", "u", "direct", "hello");
        let ctx = ToolContext::for_inbound(&inbound);
        let builder = DefaultContextBuilder::new("prompt");
        tool_loop
            .run(TurnInput {
                history: &[],
                inbound: &inbound,
                context: &builder,
                tool_ctx: &ctx,
                transcript,
            })
            .await
    }

    #[tokio::test]
    async fn text_reply_ends_in_success() {
        let provider = Arc::new(MockProvider::new([MockReply::text("hi there")]));
        let transcript = RecordingTranscript::default();
        let result = run_turn(&tool_loop(provider, 5), &transcript).await;

        assert!(matches!(result.outcome, TurnOutcome::Success));
        assert_eq!(result.content, "hi there");
        assert_eq!(result.iterations, 1);
        assert_eq!(
            result.trace,
            vec![
                LoopState::Init,
                LoopState::BuildContext,
                LoopState::AwaitProvider,
                LoopState::Terminal(TerminalKind::Success),
            ]
        );
        let records = transcript.0.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].role, Role::Assistant);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn transitions_are_logged() {
        let provider = Arc::new(MockProvider::new([MockReply::text("ok")]));
        run_turn(&tool_loop(provider, 5), &RecordingTranscript::default()).await;
        assert!(logs_contain("loop transition"));
        assert!(logs_contain("to=terminal(success)"));
    }

    #[tokio::test]
    async fn tool_round_records_calls_and_results_in_order() {
        let provider = Arc::new(MockProvider::new([
            MockReply::ToolCalls(vec![echo_call("a"), echo_call("b")]),
            MockReply::text("done"),
        ]));
        let transcript = RecordingTranscript::default();
        let result = run_turn(&tool_loop(provider.clone(), 5), &transcript).await;

        assert_eq!(result.content, "done");
        assert_eq!(result.iterations, 2);
        let roles: Vec<Role> = transcript.0.lock().unwrap().iter().map(|r| r.role).collect();
        assert_eq!(
            roles,
            vec![Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
        );

        // The second request carries the tool results back to the model.
        let requests = provider.requests();
        let last = requests.last().unwrap();
        let tool_ids: Vec<_> = last
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(tool_ids, vec!["a", "b"]);
        assert!(!last.tools.is_empty());
    }

    #[tokio::test]
    async fn bound_forces_stop_with_partial_content() {
        let provider = Arc::new(
            MockProvider::new([]).with_fallback(MockReply::ToolCallsWithText(
                "still working".into(),
                vec![echo_call("loop")],
            )),
        );
        let transcript = RecordingTranscript::default();
        let result = run_turn(&tool_loop(provider.clone(), 3), &transcript).await;

        assert!(matches!(result.outcome, TurnOutcome::ForcedStop));
        assert_eq!(result.content, "still working");
        assert_eq!(result.iterations, 3);
        assert_eq!(provider.request_count(), 3);
    }

    #[tokio::test]
    async fn bound_without_text_uses_notice() {
        let provider = Arc::new(
            MockProvider::new([]).with_fallback(MockReply::ToolCalls(vec![echo_call("x")])),
        );
        let transcript = RecordingTranscript::default();
        let result = run_turn(&tool_loop(provider, 2), &transcript).await;
        assert_eq!(result.content, FORCED_STOP_NOTICE);
    }

    #[tokio::test]
    async fn empty_reply_gets_notice() {
        let provider = Arc::new(MockProvider::new([MockReply::text("   ")]));
        let transcript = RecordingTranscript::default();
        let result = run_turn(&tool_loop(provider, 5), &transcript).await;
        assert!(matches!(result.outcome, TurnOutcome::Success));
        assert_eq!(result.content, EMPTY_RESPONSE_NOTICE);
    }

    #[tokio::test]
    async fn provider_error_is_retried_then_terminal() {
        let provider = Arc::new(MockProvider::new([
            MockReply::error("overloaded"),
            MockReply::error("overloaded"),
        ]));
        let mut s = settings(5);
        s.max_retries = 1;
        let mut registry = ToolRegistry::new(Duration::from_secs(5));
        registry.register(Arc::new(EchoTool)).unwrap();
        let tool_loop = ToolLoop::new(provider.clone(), Arc::new(registry), s);

        let transcript = RecordingTranscript::default();
        let result = run_turn(&tool_loop, &transcript).await;
        assert!(result.is_error());
        assert_eq!(provider.request_count(), 2);
        assert_eq!(
            result.trace.last(),
            Some(&LoopState::Terminal(TerminalKind::Error))
        );
        assert!(transcript.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_recovers_after_transient_failure() {
        let provider = Arc::new(MockProvider::new([
            MockReply::error("blip"),
            MockReply::text("recovered"),
        ]));
        let mut s = settings(5);
        s.max_retries = 2;
        let tool_loop = ToolLoop::new(provider, Arc::new(ToolRegistry::default()), s);
        let transcript = RecordingTranscript::default();
        let result = run_turn(&tool_loop, &transcript).await;
        assert_eq!(result.content, "recovered");
        assert_eq!(result.iterations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let provider = Arc::new(MockProvider::new([MockReply::Delay(
            Duration::from_secs(60),
            Box::new(MockReply::text("late")),
        )]));
        let mut s = settings(5);
        s.provider_timeout = Duration::from_secs(1);
        let tool_loop = ToolLoop::new(provider, Arc::new(ToolRegistry::default()), s);
        let transcript = RecordingTranscript::default();
        let result = run_turn(&tool_loop, &transcript).await;
        assert!(matches!(
            result.outcome,
            TurnOutcome::Error(SkiffError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_tool_does_not_abort_turn() {
        let provider = Arc::new(MockProvider::new([
            MockReply::ToolCalls(vec![ToolCall {
                id: "c1".into(),
                name: "nope".into(),
                arguments: json!({}),
            }]),
            MockReply::text("recovered"),
        ]));
        let transcript = RecordingTranscript::default();
        let result = run_turn(&tool_loop(provider, 5), &transcript).await;
        assert_eq!(result.content, "recovered");
        let records = transcript.0.lock().unwrap();
        assert!(records[1].content.contains("nope"));
    }

    #[test]
    fn loop_state_display() {
        assert_eq!(LoopState::AwaitProvider.to_string(), "await_provider");
        assert_eq!(
            LoopState::Terminal(TerminalKind::ForcedStop).to_string(),
            "terminal(forced_stop)"
        );
    }
}
