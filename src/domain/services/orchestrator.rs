#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use anyhow::Result;
use chrono::DateTime;
use chrono::Local;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::OwnedMutexGuard;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::completion_cache::CacheOutcome;
use super::completion_cache::CompletionCache;
use super::completion_cache::ProducerGuard;
use super::context_window;
use super::reports;
use crate::config::Config;
use crate::config::ConfigKey;
use crate::domain::models::BackendBox;
use crate::domain::models::ChatError;
use crate::domain::models::GenerationRequest;
use crate::domain::models::GenerationResult;
use crate::domain::models::Message;
use crate::domain::models::MessageKind;
use crate::domain::models::Report;
use crate::domain::models::ReportOptions;
use crate::domain::models::ReportSection;
use crate::domain::models::Role;
use crate::domain::models::SamplingParams;
use crate::domain::models::Session;
use crate::domain::models::SessionState;
use crate::domain::models::StoreBox;
use crate::domain::models::StreamEvent;
use crate::domain::models::TokenChunk;

#[derive(Clone)]
pub struct OrchestratorSettings {
    pub context_budget: usize,
    pub generation_deadline: Duration,
    pub stream_buffer: usize,
    pub global_concurrency: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub session_idle_timeout: Duration,
    pub sampling: SamplingParams,
}

impl Default for OrchestratorSettings {
    fn default() -> OrchestratorSettings {
        return OrchestratorSettings {
            context_budget: Config::get_u64(ConfigKey::ContextBudget) as usize,
            generation_deadline: Duration::from_millis(Config::get_u64(
                ConfigKey::GenerationDeadline,
            )),
            stream_buffer: Config::get_u64(ConfigKey::StreamBufferSize) as usize,
            global_concurrency: Config::get_u64(ConfigKey::GlobalConcurrency) as usize,
            cache_ttl: Duration::from_secs(Config::get_u64(ConfigKey::CacheTtl)),
            cache_capacity: Config::get_u64(ConfigKey::CacheCapacity) as usize,
            session_idle_timeout: Duration::from_secs(Config::get_u64(
                ConfigKey::SessionIdleTimeout,
            )),
            sampling: SamplingParams {
                temperature: Config::get_f32(ConfigKey::Temperature),
                max_tokens: Config::get_u64(ConfigKey::MaxTokens) as u32,
            },
        };
    }
}

struct SessionSlot {
    id: String,
    owner: String,
    session: Arc<tokio::sync::Mutex<Session>>,
    state: StdMutex<SessionState>,
}

impl SessionSlot {
    fn new(session: Session) -> Arc<SessionSlot> {
        return Arc::new(SessionSlot {
            id: session.id.clone(),
            owner: session.owner.clone(),
            session: Arc::new(tokio::sync::Mutex::new(session)),
            state: StdMutex::new(SessionState::Idle),
        });
    }

    fn set_state(&self, state: SessionState) {
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    fn state(&self) -> SessionState {
        if let Ok(current) = self.state.lock() {
            return *current;
        }
        return SessionState::Idle;
    }
}

/// Handle on one in-flight exchange. Dropping or cancelling the handle
/// detaches this caller from the stream only; a generation that other
/// sessions wait on through the cache still runs to completion.
pub struct SubmitHandle {
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl SubmitHandle {
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        return self.events.recv().await;
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Owns every live session's state machine and coordinates the context
/// window manager, generation client and response cache. Sessions are held
/// in a single-process arena: exactly one slot exists per session id and
/// the slot's async mutex serializes its exchanges.
pub struct SessionOrchestrator {
    settings: OrchestratorSettings,
    sessions: DashMap<String, Arc<SessionSlot>>,
    cache: Arc<CompletionCache>,
    backend: Arc<BackendBox>,
    store: Arc<StoreBox>,
    permits: Arc<Semaphore>,
}

impl SessionOrchestrator {
    pub fn new(
        backend: BackendBox,
        store: StoreBox,
        settings: OrchestratorSettings,
    ) -> SessionOrchestrator {
        let cache = Arc::new(CompletionCache::new(
            settings.cache_ttl,
            settings.cache_capacity,
        ));
        let permits = Arc::new(Semaphore::new(settings.global_concurrency));

        return SessionOrchestrator {
            settings,
            sessions: DashMap::new(),
            cache,
            backend: Arc::new(backend),
            store: Arc::new(store),
            permits,
        };
    }

    pub async fn open_session(&self, owner: &str, model: &str) -> Result<String> {
        let session = Session::new(owner, model);
        let id = session.id.clone();
        self.store.save(&session).await?;
        self.sessions.insert(id.clone(), SessionSlot::new(session));

        tracing::debug!(session = id, owner, model, "opened session");
        return Ok(id);
    }

    pub fn session_state(&self, session_id: &str) -> Option<SessionState> {
        return self.sessions.get(session_id).map(|slot| {
            return slot.state();
        });
    }

    /// Snapshot of a session's history, for callers that render it.
    pub async fn history(&self, session_id: &str, user_id: &str) -> Result<Vec<Message>, ChatError> {
        let slot = self.slot(session_id, user_id).await?;
        let session = slot.session.lock().await;
        return Ok(session.messages.clone());
    }

    /// Submits one user message and returns the live output stream. Appends
    /// exactly one user message, and exactly one assistant message on
    /// success; a failed exchange is recorded as an error-kind message
    /// instead of being silently dropped.
    pub async fn submit(
        &self,
        session_id: &str,
        user_id: &str,
        text: &str,
    ) -> Result<SubmitHandle, ChatError> {
        let slot = self.slot(session_id, user_id).await?;

        // A session serializes its own exchanges: Building/Generating means
        // the lock is held and the caller gets a retriable SessionBusy.
        let guard = slot
            .session
            .clone()
            .try_lock_owned()
            .map_err(|_| return ChatError::SessionBusy)?;
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| return ChatError::SessionBusy)?;

        let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(self.settings.stream_buffer);
        let cancel = CancellationToken::new();

        let exchange = Exchange {
            slot: slot.clone(),
            guard,
            text: text.to_string(),
            backend: self.backend.clone(),
            cache: self.cache.clone(),
            store: self.store.clone(),
            settings: self.settings.clone(),
            event_tx,
            cancel: cancel.clone(),
        };

        tokio::spawn(async move {
            exchange.run().await;
            drop(permit);
        });

        return Ok(SubmitHandle {
            events: event_rx,
            cancel,
        });
    }

    /// Synthesizes a report from a session snapshot. When summarization is
    /// requested, the summary is one extra generation request routed
    /// through the normal client and cache path.
    pub async fn request_report(
        &self,
        session_id: &str,
        user_id: &str,
        options: &ReportOptions,
    ) -> Result<Report, ChatError> {
        let slot = self.slot(session_id, user_id).await?;
        let snapshot = {
            let session = slot
                .session
                .try_lock()
                .map_err(|_| return ChatError::SessionBusy)?;
            session.clone()
        };

        let mut report = reports::synthesize(&snapshot, options)?;

        if options.summarize {
            let transcript = reports::transcript_text(&snapshot);
            let req = GenerationRequest::new(
                &snapshot.model,
                &format!("Summarize this conversation for a clinical report:\n\n{transcript}"),
                self.settings.sampling,
            );
            let summary = self.generate_via_cache(req).await?;
            report.sections.insert(
                0,
                ReportSection {
                    heading: "Summary".to_string(),
                    level: 2,
                    body: summary.text,
                    page_break: false,
                },
            );
        }

        return Ok(report);
    }

    /// Evicts sessions idle past the configured timeout and purges expired
    /// cache entries. Slots with an exchange in flight are never evicted.
    pub fn reap(&self) {
        self.cache.purge_expired();

        let now = Local::now();
        let max_idle = chrono::Duration::milliseconds(
            self.settings.session_idle_timeout.as_millis() as i64
        );

        self.sessions.retain(|id, slot| {
            let Ok(session) = slot.session.try_lock() else {
                return true;
            };
            let Ok(last) = DateTime::parse_from_rfc3339(&session.last_activity) else {
                return false;
            };

            let keep = now.signed_duration_since(last) < max_idle;
            if !keep {
                tracing::debug!(session = id, "reaping idle session");
            }
            return keep;
        });
    }

    pub fn start_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let orchestrator = self.clone();
        return tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                orchestrator.reap();
            }
        });
    }

    async fn slot(&self, session_id: &str, user_id: &str) -> Result<Arc<SessionSlot>, ChatError> {
        if let Some(slot) = self.sessions.get(session_id) {
            if slot.owner != user_id {
                return Err(ChatError::Forbidden);
            }
            return Ok(slot.clone());
        }

        // Not in the arena; the external store is the source of record.
        let session = self
            .store
            .load(session_id)
            .await
            .map_err(|_| return ChatError::Forbidden)?;
        if session.owner != user_id {
            return Err(ChatError::Forbidden);
        }

        let slot = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| return SessionSlot::new(session));
        return Ok(slot.clone());
    }

    async fn generate_via_cache(
        &self,
        req: GenerationRequest,
    ) -> Result<GenerationResult, ChatError> {
        match self.cache.get_or_create(req.cache_key()) {
            CacheOutcome::Hit(result) => return Ok(result),
            CacheOutcome::Wait(rx) => return CompletionCache::await_outcome(rx).await,
            CacheOutcome::Produce(producer) => {
                let (tx, mut rx) = mpsc::channel::<TokenChunk>(self.settings.stream_buffer);
                let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

                let res = tokio::time::timeout(
                    self.settings.generation_deadline,
                    self.backend.generate(req, &tx),
                )
                .await;
                drop(tx);
                let _ = drain.await;

                match res {
                    Ok(Ok(result)) => {
                        producer.complete(result.clone());
                        return Ok(result);
                    }
                    Ok(Err(err)) => {
                        producer.fail(err.clone());
                        return Err(err);
                    }
                    Err(_) => {
                        let err = ChatError::Timeout(format!(
                            "no completion within {}ms",
                            self.settings.generation_deadline.as_millis()
                        ));
                        producer.fail(err.clone());
                        return Err(err);
                    }
                }
            }
        }
    }
}

enum ExchangeOutcome {
    Finished(GenerationResult),
    Failed(ChatError, String),
    Cancelled(String),
}

struct Exchange {
    slot: Arc<SessionSlot>,
    guard: OwnedMutexGuard<Session>,
    text: String,
    backend: Arc<BackendBox>,
    cache: Arc<CompletionCache>,
    store: Arc<StoreBox>,
    settings: OrchestratorSettings,
    event_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl Exchange {
    async fn run(mut self) {
        self.slot.set_state(SessionState::Building);

        let user_msg = Message::new(Role::User, &self.text);
        self.guard.push(user_msg.clone());
        self.persist(&user_msg).await;

        let plan = context_window::build_prompt(&self.guard, self.settings.context_budget);
        if plan.truncated {
            tracing::debug!(
                session = self.slot.id,
                size = plan.size,
                "prompt truncated to fit context budget"
            );
        }

        let req = GenerationRequest::new(&self.guard.model, &plan.render(), self.settings.sampling);

        self.slot.set_state(SessionState::Generating);
        let outcome = match self.cache.get_or_create(req.cache_key()) {
            CacheOutcome::Hit(result) => {
                let _ = self
                    .event_tx
                    .send(StreamEvent::Delta(result.text.clone()))
                    .await;
                ExchangeOutcome::Finished(result)
            }
            CacheOutcome::Wait(rx) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => ExchangeOutcome::Cancelled(String::new()),
                    outcome = CompletionCache::await_outcome(rx) => match outcome {
                        Ok(result) => {
                            let _ = self
                                .event_tx
                                .send(StreamEvent::Delta(result.text.clone()))
                                .await;
                            ExchangeOutcome::Finished(result)
                        }
                        Err(err) => ExchangeOutcome::Failed(err, String::new()),
                    },
                }
            }
            CacheOutcome::Produce(producer) => self.produce_and_relay(req, producer).await,
        };

        match outcome {
            ExchangeOutcome::Finished(result) => {
                let msg = Message::new(Role::Assistant, &result.text);
                self.guard.push(msg.clone());
                self.persist(&msg).await;
                let _ = self.event_tx.send(StreamEvent::Done(result)).await;
            }
            ExchangeOutcome::Failed(err, partial) => {
                tracing::warn!(session = self.slot.id, error = %err, "exchange failed");
                let text = if partial.is_empty() {
                    format!("[exchange failed: {err}]")
                } else {
                    format!("{partial}\n[exchange failed: {err}]")
                };
                let msg = Message::new_with_kind(Role::Assistant, MessageKind::Error, &text);
                self.guard.push(msg.clone());
                self.persist(&msg).await;
                let _ = self.event_tx.send(StreamEvent::Error(err)).await;
            }
            ExchangeOutcome::Cancelled(partial) => {
                self.slot.set_state(SessionState::Closing);
                let text = if partial.is_empty() {
                    "[cancelled]".to_string()
                } else {
                    format!("{partial} [cancelled]")
                };
                let msg = Message::new_with_kind(Role::Assistant, MessageKind::Error, &text);
                self.guard.push(msg.clone());
                self.persist(&msg).await;
            }
        }

        self.slot.set_state(SessionState::Idle);
    }

    /// Runs the generation as a detached producer task and relays its
    /// chunks to this exchange's caller. Cancellation only detaches the
    /// relay: the producer still resolves the cache key for any waiters.
    async fn produce_and_relay(
        &mut self,
        req: GenerationRequest,
        producer: ProducerGuard,
    ) -> ExchangeOutcome {
        let outcome_rx = producer.subscribe();
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<TokenChunk>(self.settings.stream_buffer);

        let backend = self.backend.clone();
        let deadline = self.settings.generation_deadline;
        tokio::spawn(async move {
            match tokio::time::timeout(deadline, backend.generate(req, &chunk_tx)).await {
                Ok(Ok(result)) => producer.complete(result),
                Ok(Err(err)) => producer.fail(err),
                Err(_) => producer.fail(ChatError::Timeout(format!(
                    "no completion within {}ms",
                    deadline.as_millis()
                ))),
            }
        });

        let mut partial = String::new();
        let mut cancelled = false;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                chunk = chunk_rx.recv() => match chunk {
                    Some(chunk) => {
                        if !chunk.text.is_empty() {
                            partial.push_str(&chunk.text);
                            let _ = self.event_tx.send(StreamEvent::Delta(chunk.text)).await;
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        if cancelled {
            return ExchangeOutcome::Cancelled(partial);
        }

        match CompletionCache::await_outcome(outcome_rx).await {
            Ok(result) => return ExchangeOutcome::Finished(result),
            Err(err) => return ExchangeOutcome::Failed(err, partial),
        }
    }

    async fn persist(&self, message: &Message) {
        if let Err(err) = self.store.append_message(&self.slot.id, message).await {
            tracing::warn!(
                session = self.slot.id,
                error = ?err,
                "failed to persist message to session store"
            );
        }
    }
}
