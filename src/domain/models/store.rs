use anyhow::Result;
use async_trait::async_trait;

use super::Message;
use super::Session;

pub type StoreBox = Box<dyn SessionStore + Send + Sync>;

/// Persistence collaborator. The store is the source of record for history
/// the orchestrator has not yet loaded into its in-memory arena; the
/// orchestrator writes back after each completed exchange.
#[async_trait]
pub trait SessionStore {
    async fn load(&self, id: &str) -> Result<Session>;

    async fn save(&self, session: &Session) -> Result<()>;

    async fn append_message(&self, id: &str, message: &Message) -> Result<()>;

    async fn list(&self) -> Result<Vec<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;
}
