use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::ChatError;
use super::GenerationRequest;
use super::GenerationResult;
use super::TokenChunk;

pub type BackendBox = Box<dyn Backend + Send + Sync>;

#[async_trait]
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Used at startup to verify all configurations are available to work
    /// with the backend.
    async fn health_check(&self) -> Result<()>;

    /// Lists all models the backend can generate with.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Runs one generation, streaming incremental chunks through `tx` and
    /// returning the accumulated result once the backend signals completion.
    ///
    /// The channel is bounded; a slow consumer applies backpressure rather
    /// than buffering unboundedly. A consumer that detaches (drops the
    /// receiver) must not abort the generation: cache waiters still depend
    /// on a terminal outcome, so implementations send best-effort.
    ///
    /// Fails with `ChatError::BackendUnavailable` once connect retries are
    /// exhausted, `ChatError::Timeout` when no chunk arrives within the
    /// inter-chunk deadline, and `ChatError::ModelError` on a mid-stream
    /// fault. Chunks already sent stay with the consumer either way.
    async fn generate<'a>(
        &self,
        req: GenerationRequest,
        tx: &'a mpsc::Sender<TokenChunk>,
    ) -> Result<GenerationResult, ChatError>;
}
