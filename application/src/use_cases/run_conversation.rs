//! Conversation runner: the bounded tool-call loop.
//!
//! Each turn fetches the merged tool catalog, calls the provider with the
//! history, and either stops (no tool calls) or executes the requested tools
//! and appends their results before dispatching the next turn:
//!
//! ```text
//! Dispatch ──▶ no tool calls ──▶ Done
//!    ▲              │
//!    │         tool calls
//!    │              ▼
//!    └──────── ToolsPending (execute, append results)
//! ```
//!
//! Blocking ([`ConversationRunner::run`]) and streaming
//! ([`ConversationRunner::run_streaming`]) share the same turn budget and the
//! same tool resolution. Exhausting the budget is reported as
//! [`RunOutcome::BudgetExhausted`] together with the best text so far.

use crate::config::RunnerParams;
use crate::ports::conversation_logger::{
    ConversationEvent, ConversationLogger, NoConversationLogger,
};
use crate::ports::llm_gateway::{
    Credentials, ProviderAdapter, ProviderError, ProviderRequest, StreamHandle,
};
use crate::ports::stream_observer::StreamObserver;
use crate::ports::tool_executor::{ToolBackend, ToolCallRequest, ToolHost};
use futures::future::join_all;
use questkeeper_domain::{
    ConversationMessage, ModelSelection, RunOutcome, StreamEvent, ToolCatalog, ToolError,
    ToolInvocation, ToolOutcome, TurnResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that abort a run.
///
/// Tool failures are not among them: they are threaded back into the history
/// as tool results.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Stream failed: {0}")]
    Stream(String),

    #[error("cancelled")]
    Cancelled,
}

/// Result of a top-level run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Final answer, or the best text so far when the budget ran out.
    pub text: String,
    pub outcome: RunOutcome,
    /// Input history plus every message the run appended.
    pub history: Vec<ConversationMessage>,
    pub turns: Vec<TurnResult>,
}

/// Tools available for one turn, with the backend that owns each name.
struct ToolRoster {
    catalog: ToolCatalog,
    backends: HashMap<String, Arc<dyn ToolBackend>>,
}

impl ToolRoster {
    fn empty() -> Self {
        Self {
            catalog: ToolCatalog::new(),
            backends: HashMap::new(),
        }
    }

    fn backend_for(&self, tool: &str) -> Option<&Arc<dyn ToolBackend>> {
        self.catalog
            .owner_of(tool)
            .and_then(|owner| self.backends.get(owner))
    }
}

/// History and per-turn results accumulated during one run.
struct RunState {
    history: Vec<ConversationMessage>,
    turns: Vec<TurnResult>,
    best_text: String,
}

impl RunState {
    fn new(history: Vec<ConversationMessage>) -> Self {
        Self {
            history,
            turns: Vec::new(),
            best_text: String::new(),
        }
    }

    fn apply_tool_turn(&mut self, result: TurnResult, outcomes: Vec<ToolOutcome>) {
        if !result.text.is_empty() {
            self.best_text = result.text.clone();
        }
        self.history.push(ConversationMessage::assistant_with_invocations(
            result.text.clone(),
            result.invocations.clone(),
        ));
        for (invocation, outcome) in result.invocations.iter().zip(outcomes) {
            self.history
                .push(ConversationMessage::tool_result(invocation, outcome));
        }
        self.turns.push(result);
    }

    /// An empty final reply keeps the best earlier text and adds nothing to
    /// the history; vendors reject empty assistant messages on the next call.
    fn complete(mut self, result: TurnResult) -> RunOutput {
        let text = if result.text.is_empty() {
            self.best_text.clone()
        } else {
            self.history
                .push(ConversationMessage::assistant(result.text.clone()));
            result.text.clone()
        };
        self.turns.push(result);
        RunOutput {
            text,
            outcome: RunOutcome::Completed,
            history: self.history,
            turns: self.turns,
        }
    }

    fn exhausted(self, turns: usize) -> RunOutput {
        RunOutput {
            text: self.best_text,
            outcome: RunOutcome::BudgetExhausted { turns },
            history: self.history,
            turns: self.turns,
        }
    }
}

/// Drives a conversation between a provider and the tool workers.
pub struct ConversationRunner {
    provider: Arc<dyn ProviderAdapter>,
    tools: Arc<dyn ToolHost>,
    selection: ModelSelection,
    credentials: Credentials,
    params: RunnerParams,
    conversation_logger: Arc<dyn ConversationLogger>,
    cancellation: Option<CancellationToken>,
}

impl ConversationRunner {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        tools: Arc<dyn ToolHost>,
        selection: ModelSelection,
        credentials: Credentials,
    ) -> Self {
        Self {
            provider,
            tools,
            selection,
            credentials,
            params: RunnerParams::default(),
            conversation_logger: Arc::new(NoConversationLogger),
            cancellation: None,
        }
    }

    pub fn with_params(mut self, params: RunnerParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_conversation_logger(mut self, logger: Arc<dyn ConversationLogger>) -> Self {
        self.conversation_logger = logger;
        self
    }

    /// Checked at every turn boundary and while waiting for stream events.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn selection(&self) -> &ModelSelection {
        &self.selection
    }

    /// Run the conversation to completion, waiting for each full reply.
    pub async fn run(&self, history: Vec<ConversationMessage>) -> Result<RunOutput, RunError> {
        let budget = self.params.turn_budget;
        let mut state = RunState::new(history);

        for turn in 1..=budget {
            self.check_cancelled()?;
            let roster = self.refresh_roster().await;
            debug!(
                "Runner: turn {}/{} with {} tools",
                turn,
                budget,
                roster.catalog.len()
            );

            let response = self
                .provider
                .send_message(self.request(&state.history, &roster))
                .await?;
            let result = TurnResult::from(response);
            self.conversation_logger.log(ConversationEvent::provider_turn(
                turn,
                &result.text,
                &result.invocations,
            ));

            if !result.should_continue {
                info!("Runner: completed after {} turn(s)", turn);
                return Ok(state.complete(result));
            }

            let outcomes = self.execute_tools(&roster, &result.invocations).await;
            state.apply_tool_turn(result, outcomes);
        }

        Ok(self.exhausted(state, budget))
    }

    /// Run the conversation with incremental output.
    ///
    /// Exactly one of `on_complete` or `on_error` is called. The returned
    /// value mirrors what the observer saw.
    pub async fn run_streaming(
        &self,
        history: Vec<ConversationMessage>,
        observer: &dyn StreamObserver,
    ) -> Result<RunOutput, RunError> {
        match self.stream_turns(history, observer).await {
            Ok(output) => {
                observer.on_complete(&output.outcome);
                Ok(output)
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Runner: streaming run failed: {}", message);
                self.conversation_logger
                    .log(ConversationEvent::stream_error(&message));
                observer.on_error(&message);
                Err(e)
            }
        }
    }

    async fn stream_turns(
        &self,
        history: Vec<ConversationMessage>,
        observer: &dyn StreamObserver,
    ) -> Result<RunOutput, RunError> {
        let budget = self.params.turn_budget;
        let mut state = RunState::new(history);

        for turn in 1..=budget {
            self.check_cancelled()?;
            if turn > 1 {
                observer.on_stream_boundary(turn);
            }
            let roster = self.refresh_roster().await;
            debug!(
                "Runner: streaming turn {}/{} with {} tools",
                turn,
                budget,
                roster.catalog.len()
            );

            let mut handle = self
                .provider
                .stream_message(self.request(&state.history, &roster))
                .await?;

            let mut text = String::new();
            let mut invocations = Vec::new();
            while let Some(event) = self.next_event(&mut handle).await? {
                match event {
                    StreamEvent::Delta(chunk) => {
                        observer.on_chunk(&chunk);
                        text.push_str(&chunk);
                    }
                    StreamEvent::ToolCall(invocation) => {
                        debug!("Runner: stream requested tool '{}'", invocation.name);
                        observer.on_tool_call(&invocation);
                        invocations.push(invocation);
                    }
                    StreamEvent::Completed => break,
                    StreamEvent::Error(message) => return Err(RunError::Stream(message)),
                }
            }

            let result = TurnResult::new(text, invocations);
            self.conversation_logger.log(ConversationEvent::provider_turn(
                turn,
                &result.text,
                &result.invocations,
            ));

            if !result.should_continue {
                info!("Runner: streaming completed after {} turn(s)", turn);
                return Ok(state.complete(result));
            }

            let outcomes = self.execute_tools(&roster, &result.invocations).await;
            for (invocation, outcome) in result.invocations.iter().zip(&outcomes) {
                observer.on_tool_result(invocation, outcome);
            }
            state.apply_tool_turn(result, outcomes);
        }

        Ok(self.exhausted(state, budget))
    }

    fn exhausted(&self, state: RunState, budget: usize) -> RunOutput {
        warn!(
            "Runner: turn budget of {} exhausted, returning partial answer",
            budget
        );
        let output = state.exhausted(budget);
        self.conversation_logger
            .log(ConversationEvent::budget_exhausted(&output.outcome));
        output
    }

    async fn next_event(&self, handle: &mut StreamHandle) -> Result<Option<StreamEvent>, RunError> {
        match &self.cancellation {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(RunError::Cancelled),
                event = handle.next() => Ok(event),
            },
            None => Ok(handle.next().await),
        }
    }

    fn check_cancelled(&self) -> Result<(), RunError> {
        if let Some(token) = &self.cancellation
            && token.is_cancelled()
        {
            return Err(RunError::Cancelled);
        }
        Ok(())
    }

    fn request<'a>(
        &'a self,
        history: &'a [ConversationMessage],
        roster: &'a ToolRoster,
    ) -> ProviderRequest<'a> {
        ProviderRequest {
            history,
            credentials: &self.credentials,
            model: &self.selection,
            tools: roster.catalog.descriptors(),
        }
    }

    /// Build this turn's catalog from every backend.
    ///
    /// A backend whose catalog cannot be fetched contributes nothing; the
    /// turn proceeds with whatever tools remain.
    async fn refresh_roster(&self) -> ToolRoster {
        let mut roster = ToolRoster::empty();
        if !self.selection.supports_tools() {
            debug!(
                "Runner: {} on {} does not support tools, not advertising any",
                self.selection.model, self.selection.provider
            );
            return roster;
        }

        let backends = self.tools.backends();
        let listings = join_all(backends.iter().map(|backend| backend.list_tools())).await;

        for (backend, listing) in backends.into_iter().zip(listings) {
            match listing {
                Ok(tools) => {
                    for name in roster.catalog.register(backend.name(), tools) {
                        debug!(
                            "Runner: tool '{}' from {} already provided by another worker",
                            name,
                            backend.name()
                        );
                    }
                    roster.backends.insert(backend.name().to_string(), backend);
                }
                Err(e) => {
                    warn!(
                        "Runner: tool catalog from {} unavailable, continuing without it: {}",
                        backend.name(),
                        e
                    );
                }
            }
        }
        roster
    }

    /// Execute one turn's invocations, returning outcomes in invocation order.
    ///
    /// Calls owned by the same backend go out as one concurrent batch, and
    /// batches for different backends run concurrently with each other.
    async fn execute_tools(
        &self,
        roster: &ToolRoster,
        invocations: &[ToolInvocation],
    ) -> Vec<ToolOutcome> {
        let mut outcomes: Vec<Option<ToolOutcome>> = vec![None; invocations.len()];
        let mut groups: Vec<(&Arc<dyn ToolBackend>, Vec<usize>)> = Vec::new();

        for (slot, invocation) in invocations.iter().enumerate() {
            let backend = roster.backend_for(&invocation.name);
            self.conversation_logger.log(ConversationEvent::tool_call(
                invocation,
                backend.map(|b| b.name()),
            ));
            match backend {
                Some(backend) => {
                    match groups.iter_mut().find(|(b, _)| b.name() == backend.name()) {
                        Some((_, slots)) => slots.push(slot),
                        None => groups.push((backend, vec![slot])),
                    }
                }
                None => {
                    warn!("Runner: no worker provides tool '{}'", invocation.name);
                    outcomes[slot] = Some(ToolOutcome::Failure(ToolError::not_found(
                        &invocation.name,
                    )));
                }
            }
        }

        if self.params.parallel_tools {
            let batches = join_all(groups.iter().map(|(backend, slots)| {
                let calls = slots
                    .iter()
                    .map(|&slot| ToolCallRequest::from(&invocations[slot]))
                    .collect();
                backend.call_tools_batch(calls)
            }))
            .await;

            for ((_, slots), results) in groups.iter().zip(batches) {
                for (&slot, result) in slots.iter().zip(results) {
                    outcomes[slot] = Some(
                        result.unwrap_or_else(|e| ToolOutcome::Failure(e.into_tool_error())),
                    );
                }
            }
        } else {
            for (slot, invocation) in invocations.iter().enumerate() {
                if outcomes[slot].is_some() {
                    continue;
                }
                if let Some(backend) = roster.backend_for(&invocation.name) {
                    let result = backend
                        .call_tool(&invocation.name, invocation.arguments.clone())
                        .await;
                    outcomes[slot] = Some(
                        result.unwrap_or_else(|e| ToolOutcome::Failure(e.into_tool_error())),
                    );
                }
            }
        }

        invocations
            .iter()
            .zip(outcomes)
            .map(|(invocation, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    ToolOutcome::Failure(ToolError::transport("no result recorded"))
                });
                if !outcome.is_success() {
                    debug!("Runner: tool '{}' failed", invocation.name);
                }
                self.conversation_logger
                    .log(ConversationEvent::tool_result(invocation, &outcome));
                outcome
            })
            .collect()
    }
}
