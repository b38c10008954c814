//! Turn orchestrator: the state machine that drives one user message from
//! persisted history through the LLM pipeline stages to a streamed,
//! persisted assistant reply.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};

use reeflow_core::config::LlmConfig as LlmDefaults;
use reeflow_expert::{ExpertClient, ExpertResult};
use reeflow_history::{HistoryStore, Role as HistoryRole};
use reeflow_llm::{LlmClient, LlmError};
use reeflow_protocol::OutboundFrame;
use reeflow_sessions::SessionStore;

use crate::config::{resolve_llm_config, ExpertStreamPolicy};
use crate::constants::{CONVERSATIONAL_AGENT_TYPE, LLM_MAX_RETRIES, TURN_HISTORY_LIMIT};
use crate::convert::to_llm_messages;
use crate::data_lookup::{DataLookup, DeviceActuator, WeatherLookup};
use crate::error::{PipelineError, Result};
use crate::frame_sink::FrameSink;
use crate::stage::Stage;
use crate::stages::{
    IntentInput, IntentStage, QueryRewriteInput, QueryRewriteStage, RoutingInput, RoutingStage,
    SynthesisStage,
};
use crate::types::{IntentLabel, RoutingDecision, StageStats, TurnState};

/// Wires every collaborator one turn needs. One instance is shared across
/// all connections — it holds no per-turn mutable state.
pub struct Orchestrator {
    history: Arc<HistoryStore>,
    sessions: Arc<SessionStore>,
    llm: Arc<dyn LlmClient>,
    expert: Arc<dyn ExpertClient>,
    data_lookup: Arc<dyn DataLookup>,
    device_actuator: Arc<dyn DeviceActuator>,
    weather: Arc<dyn WeatherLookup>,
    llm_defaults: LlmDefaults,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        history: Arc<HistoryStore>,
        sessions: Arc<SessionStore>,
        llm: Arc<dyn LlmClient>,
        expert: Arc<dyn ExpertClient>,
        data_lookup: Arc<dyn DataLookup>,
        device_actuator: Arc<dyn DeviceActuator>,
        weather: Arc<dyn WeatherLookup>,
        llm_defaults: LlmDefaults,
    ) -> Self {
        Self {
            history,
            sessions,
            llm,
            expert,
            data_lookup,
            device_actuator,
            weather,
            llm_defaults,
        }
    }

    /// Run one user turn to completion. `user_message_id` is allocated by
    /// the caller (the gateway's connection task) *before* this is called,
    /// so its `newChatMessage` echo frame and the persisted user row carry
    /// the same id.
    #[instrument(skip(self, sink, cancel), fields(session_id, user_message_id))]
    pub async fn run_turn(
        &self,
        session_id: &str,
        user_message_id: &str,
        user_text: &str,
        sink: &dyn FrameSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let session_config = self.load_session_config(session_id);
        let llm_config = resolve_llm_config(&session_config, &self.llm_defaults);
        let expert_policy = ExpertStreamPolicy::from_session_config(&session_config);

        let (history_rows, load_history_failed) =
            match self.history.recent(session_id, TURN_HISTORY_LIMIT) {
                Ok(rows) => (rows, false),
                Err(e) => {
                    error!(error = %e, "LOAD_HISTORY failed");
                    (Vec::new(), true)
                }
            };
        let history = to_llm_messages(&reeflow_history::format_for_llm(&history_rows));

        if let Err(e) =
            self.history
                .append(session_id, HistoryRole::User, user_text, Some("user"), Some(user_message_id), None)
        {
            // FAIL_HARD: pre-persist failure, no assistant row, connection stays open.
            error!(error = %e, "PERSIST_USER failed");
            sink.send(OutboundFrame::error(
                "STORAGE_ERROR",
                "could not record your message",
            ))?;
            return Ok(());
        }

        let mut state = TurnState::new(user_text, history);
        let mut stats = StageStats::default();

        if load_history_failed {
            return self
                .fail_soft(session_id, &mut state, &llm_config, sink, cancel, "could not load conversation history")
                .await;
        }

        if cancel.is_cancelled() {
            return Ok(());
        }

        if let Some(ctx) = self.weather.lookup(state.effective_text()).await {
            state.weather_context = Some(ctx);
        }

        let intent = match self
            .run_intent(&state, &llm_config, &mut stats, cancel)
            .await
        {
            Ok(Some(intent)) => intent,
            Ok(None) => return Ok(()), // canceled mid-stage, quiet shutdown
            Err(_) => {
                return self
                    .fail_soft(session_id, &mut state, &llm_config, sink, cancel, "could not understand your message")
                    .await
            }
        };
        state.intent = Some(intent.clone());

        if intent == IntentLabel::DeviceControl {
            let device_answer = self.device_actuator.execute(&state.original_text).await;
            let routing = RoutingDecision {
                needs_expert: false,
                needs_data: false,
                decision: "device_control".to_string(),
                reason: "classified as device_control".to_string(),
            };
            state.routing = Some(routing);
            return self
                .synth_and_finish(
                    session_id,
                    &mut state,
                    &mut stats,
                    device_answer,
                    false,
                    &llm_config,
                    sink,
                    cancel,
                )
                .await;
        }

        let rewritten = match self
            .run_rewrite(&state, &llm_config, &mut stats, cancel)
            .await
        {
            Ok(Some(text)) => text,
            Ok(None) => return Ok(()),
            Err(_) => {
                return self
                    .fail_soft(session_id, &mut state, &llm_config, sink, cancel, "could not process your message")
                    .await
            }
        };
        state.rewritten_text = Some(rewritten);

        let routing = match self
            .run_routing(&state, &llm_config, &mut stats, cancel)
            .await
        {
            Ok(Some(routing)) => routing,
            Ok(None) => return Ok(()),
            Err(_) => RoutingDecision::direct_fallback("routing stage failed, defaulting to direct answer"),
        };
        state.routing = Some(routing.clone());

        if cancel.is_cancelled() {
            return Ok(());
        }

        let mut expert_consulted = false;
        let mut grounding: Option<String> = None;

        if routing.needs_expert {
            match expert_policy {
                ExpertStreamPolicy::ForwardExpertChunks => {
                    let forwarded = self
                        .consult_expert(session_id, &state, &session_config, sink, true, cancel)
                        .await;
                    if let Some(result) = forwarded {
                        if result.success {
                            expert_consulted = true;
                            state.buffer = result.answer.clone();
                            state.expert_result = Some(result);
                            return self
                                .persist_and_done(session_id, &mut state, &mut stats, expert_consulted, sink)
                                .await;
                        }
                    }
                }
                ExpertStreamPolicy::SynthesizeFromExpert => {
                    let consulted = self
                        .consult_expert(session_id, &state, &session_config, sink, false, cancel)
                        .await;
                    if let Some(result) = consulted {
                        if result.success {
                            expert_consulted = true;
                            grounding = Some(result.answer.clone());
                            state.expert_result = Some(result);
                        }
                    }
                }
            }
        } else if routing.needs_data {
            grounding = self.data_lookup.lookup(state.effective_text()).await;
        }

        if cancel.is_cancelled() {
            return Ok(());
        }

        self.synth_and_finish(
            session_id,
            &mut state,
            &mut stats,
            grounding,
            expert_consulted,
            &llm_config,
            sink,
            cancel,
        )
        .await
    }

    fn load_session_config(&self, session_id: &str) -> Value {
        match self.sessions.get(session_id) {
            Ok(Some(session)) => session.config,
            Ok(None) => reeflow_sessions::config::default_session_config(),
            Err(e) => {
                warn!(error = %e, "could not load session config, using defaults");
                reeflow_sessions::config::default_session_config()
            }
        }
    }

    /// Runs one LLM-backed stage call with the shared retry policy: only
    /// `RetryableUpstream` errors retry, up to [`LLM_MAX_RETRIES`] times,
    /// waiting [`reeflow_llm::backoff_delay`] between attempts. Returns
    /// `None` if canceled mid-retry (quiet shutdown); otherwise the last
    /// attempt's result.
    async fn retry_llm<T>(
        &self,
        cancel: &CancellationToken,
        mut attempt: impl FnMut() -> std::pin::Pin<Box<dyn std::future::Future<Output = std::result::Result<T, PipelineError>> + Send + '_>>,
    ) -> Option<std::result::Result<T, PipelineError>> {
        for try_num in 0..=LLM_MAX_RETRIES {
            if cancel.is_cancelled() {
                return None;
            }
            match attempt().await {
                Ok(v) => return Some(Ok(v)),
                Err(PipelineError::Llm(LlmError::Canceled)) => return None,
                Err(e @ PipelineError::Llm(ref inner)) if inner.is_retryable() && try_num < LLM_MAX_RETRIES => {
                    warn!(attempt = try_num, error = %e, "retryable LLM error, backing off");
                    tokio::time::sleep(reeflow_llm::backoff_delay(try_num)).await;
                    continue;
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    /// Stage 2: classify intent from the original text.
    async fn run_intent(
        &self,
        state: &TurnState,
        llm_config: &reeflow_llm::LlmConfig,
        stats: &mut StageStats,
        cancel: &CancellationToken,
    ) -> Result<Option<IntentLabel>> {
        let llm = self.llm.clone();
        let text = state.original_text.clone();
        let history = state.history.clone();
        let outcome = self
            .retry_llm(cancel, move || {
                let llm = llm.clone();
                let text = text.clone();
                let history = history.clone();
                Box::pin(async move {
                    IntentStage
                        .run(
                            IntentInput { text: &text, history: &history },
                            llm.as_ref(),
                            llm_config,
                        )
                        .await
                })
            })
            .await;
        match outcome {
            None => Ok(None),
            Some(Ok((label, usage))) => {
                stats.intent.accumulate(&usage);
                Ok(Some(label))
            }
            Some(Err(e)) => Err(e),
        }
    }

    /// Stage 1: rewrite a possibly-elliptical follow-up into a
    /// self-contained query.
    async fn run_rewrite(
        &self,
        state: &TurnState,
        llm_config: &reeflow_llm::LlmConfig,
        stats: &mut StageStats,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let llm = self.llm.clone();
        let original_text = state.original_text.clone();
        let history = state.history.clone();
        let context = state.weather_context.clone();
        let outcome = self
            .retry_llm(cancel, move || {
                let llm = llm.clone();
                let original_text = original_text.clone();
                let history = history.clone();
                let context = context.clone();
                Box::pin(async move {
                    QueryRewriteStage
                        .run(
                            QueryRewriteInput {
                                original_text: &original_text,
                                history: &history,
                                context: context.as_deref(),
                            },
                            llm.as_ref(),
                            llm_config,
                        )
                        .await
                })
            })
            .await;
        match outcome {
            None => Ok(None),
            Some(Ok((text, usage))) => {
                stats.rewrite.accumulate(&usage);
                Ok(Some(text))
            }
            Some(Err(e)) => Err(e),
        }
    }

    /// Stage 3: decide whether this turn needs the expert, local data, or
    /// neither.
    async fn run_routing(
        &self,
        state: &TurnState,
        llm_config: &reeflow_llm::LlmConfig,
        stats: &mut StageStats,
        cancel: &CancellationToken,
    ) -> Result<Option<RoutingDecision>> {
        let llm = self.llm.clone();
        let text = state.effective_text().to_string();
        let intent = state
            .intent
            .clone()
            .unwrap_or_else(|| IntentLabel::Other("other".to_string()));
        let context = state.weather_context.clone();
        let outcome = self
            .retry_llm(cancel, move || {
                let llm = llm.clone();
                let text = text.clone();
                let intent = intent.clone();
                let context = context.clone();
                Box::pin(async move {
                    RoutingStage
                        .run(
                            RoutingInput {
                                text: &text,
                                intent: &intent,
                                context: context.as_deref(),
                            },
                            llm.as_ref(),
                            llm_config,
                        )
                        .await
                })
            })
            .await;
        match outcome {
            None => Ok(None),
            Some(Ok((decision, usage))) => {
                stats.routing.accumulate(&usage);
                Ok(Some(decision))
            }
            Some(Err(e)) => Err(e),
        }
    }

    /// EXPERT_STREAM: consult the upstream expert. When `forward` is set,
    /// every content chunk is relayed to the client as a `stream_chunk`
    /// frame in receive order — the `ForwardExpertChunks`
    /// policy. When unset, chunks are only accumulated into the returned
    /// answer for the `SynthesizeFromExpert` policy to ground on.
    ///
    /// Never retries and never fails the turn: an upstream error or timeout
    /// here is logged and swallowed, returning `None` so the caller falls
    /// through to the no-expert path.
    async fn consult_expert(
        &self,
        session_id: &str,
        state: &TurnState,
        session_config: &Value,
        sink: &dyn FrameSink,
        forward: bool,
        cancel: &CancellationToken,
    ) -> Option<ExpertResult> {
        let query = state.effective_text().to_string();
        let expert_config = session_config.get("rag").cloned();
        let assistant_message_id = &state.assistant_message_id;
        let assistant_timestamp = state.assistant_timestamp.to_rfc3339();

        let outcome = if forward {
            let mut on_chunk = |chunk: &str| {
                let _ = sink.send(OutboundFrame::stream_chunk(
                    session_id,
                    chunk,
                    assistant_message_id,
                    assistant_timestamp.clone(),
                ));
            };
            self.expert
                .consult(
                    &query,
                    CONVERSATIONAL_AGENT_TYPE,
                    session_id,
                    expert_config.as_ref(),
                    Some(&mut on_chunk),
                    Some(cancel),
                )
                .await
        } else {
            self.expert
                .consult(
                    &query,
                    CONVERSATIONAL_AGENT_TYPE,
                    session_id,
                    expert_config.as_ref(),
                    None,
                    Some(cancel),
                )
                .await
        };

        match outcome {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(error = %e, "expert consultation failed, continuing on the no-expert path");
                None
            }
        }
    }

    /// SYNTH_STREAM: the single active producer for this turn. Streams
    /// from the expert grounding when present, otherwise from
    /// history alone; on a bounded-retry LLM failure, degrades to
    /// `FAIL_SOFT`.
    #[allow(clippy::too_many_arguments)]
    async fn synth_and_finish(
        &self,
        session_id: &str,
        state: &mut TurnState,
        stats: &mut StageStats,
        grounding: Option<String>,
        expert_consulted: bool,
        llm_config: &reeflow_llm::LlmConfig,
        sink: &dyn FrameSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let llm = self.llm.clone();
        let history = state.history.clone();
        let query = state.effective_text().to_string();
        let assistant_message_id = state.assistant_message_id.clone();
        let assistant_timestamp = state.assistant_timestamp.to_rfc3339();

        let outcome = self
            .retry_llm(cancel, move || {
                let llm = llm.clone();
                let history = history.clone();
                let query = query.clone();
                let grounding = grounding.clone();
                let assistant_message_id = assistant_message_id.clone();
                let assistant_timestamp = assistant_timestamp.clone();
                Box::pin(async move {
                    let mut on_chunk = |chunk: &str| {
                        let _ = sink.send(OutboundFrame::stream_chunk(
                            session_id,
                            chunk,
                            &assistant_message_id,
                            assistant_timestamp.clone(),
                        ));
                    };
                    match &grounding {
                        Some(g) => {
                            SynthesisStage
                                .stream_grounded(&history, &query, g, llm.as_ref(), llm_config, &mut on_chunk, cancel)
                                .await
                        }
                        None => {
                            SynthesisStage
                                .stream_direct(&history, &query, llm.as_ref(), llm_config, &mut on_chunk, cancel)
                                .await
                        }
                    }
                })
            })
            .await;

        match outcome {
            None => Ok(()), // canceled mid-stream, quiet shutdown
            Some(Ok((text, usage))) => {
                stats.synthesis.accumulate(&usage);
                state.buffer = text;
                self.persist_and_done(session_id, state, stats, expert_consulted, sink)
                    .await
            }
            Some(Err(_)) => {
                self.fail_soft(session_id, state, llm_config, sink, cancel, "could not generate a response")
                    .await
            }
        }
    }

    /// FAIL_SOFT: emit a user-visible error frame, then synthesize and
    /// stream a short apology from empty history, then
    /// persist and finish the turn as usual. The user row was already
    /// persisted before this is reached.
    async fn fail_soft(
        &self,
        session_id: &str,
        state: &mut TurnState,
        llm_config: &reeflow_llm::LlmConfig,
        sink: &dyn FrameSink,
        cancel: &CancellationToken,
        reason: &str,
    ) -> Result<()> {
        sink.send(OutboundFrame::error("UPSTREAM_ERROR", reason))?;

        const APOLOGY_PROMPT: &str = "Apologize briefly to the user for not being able to \
            process their last message due to an internal error, and invite them to try again.";
        const FALLBACK_APOLOGY: &str =
            "I'm sorry, I ran into a problem and couldn't process that. Please try again.";

        let assistant_message_id = state.assistant_message_id.clone();
        let assistant_timestamp = state.assistant_timestamp.to_rfc3339();
        let mut on_chunk = |chunk: &str| {
            let _ = sink.send(OutboundFrame::stream_chunk(
                session_id,
                chunk,
                &assistant_message_id,
                assistant_timestamp.clone(),
            ));
        };

        let apology = SynthesisStage
            .stream_direct(&[], APOLOGY_PROMPT, self.llm.as_ref(), llm_config, &mut on_chunk, cancel)
            .await
            .map(|(text, _usage)| text)
            .unwrap_or_default();

        state.buffer = if apology.trim().is_empty() {
            FALLBACK_APOLOGY.to_string()
        } else {
            apology
        };

        self.persist_and_done(session_id, state, &mut StageStats::default(), false, sink)
            .await
    }

    /// PERSIST_ASSISTANT + DONE: write the accumulated buffer exactly once,
    /// then emit `done`. A storage failure here does not retry inline —
    /// `done` still fires, carrying a warning in `meta`.
    async fn persist_and_done(
        &self,
        session_id: &str,
        state: &mut TurnState,
        stats: &mut StageStats,
        expert_consulted: bool,
        sink: &dyn FrameSink,
    ) -> Result<()> {
        let intent_str = state
            .intent
            .as_ref()
            .map(|i| i.as_str().to_string())
            .unwrap_or_else(|| "assistant".to_string());
        let meta = serde_json::json!({
            "routing": state.routing,
            "expert_consulted": expert_consulted,
            "stage_stats": stats,
        });

        let done_meta = match self.history.append(
            session_id,
            HistoryRole::Assistant,
            &state.buffer,
            Some(&intent_str),
            Some(&state.assistant_message_id),
            Some(meta),
        ) {
            Ok(_) => None,
            Err(e) => {
                error!(error = %e, "PERSIST_ASSISTANT failed");
                Some(serde_json::json!({ "warning": "storage_error" }))
            }
        };

        sink.send(OutboundFrame::done(session_id, &state.assistant_message_id, done_meta))
    }
}
