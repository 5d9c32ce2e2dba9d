#[cfg(test)]
#[path = "filesystem_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::models::Message;
use crate::domain::models::Role;
use crate::domain::models::Session;
use crate::domain::models::SessionStore;

/// Stores each session as a YAML file under the user's cache directory.
pub struct FilesystemStore {
    pub data_dir: path::PathBuf,
}

impl Default for FilesystemStore {
    fn default() -> FilesystemStore {
        let data_dir = dirs::cache_dir().unwrap().join("careline/sessions");

        return FilesystemStore::new(data_dir);
    }
}

impl FilesystemStore {
    pub fn new(data_dir: path::PathBuf) -> FilesystemStore {
        return FilesystemStore { data_dir };
    }

    fn get_file_path(&self, id: &str) -> path::PathBuf {
        return self.data_dir.join(format!("{id}.yaml"));
    }
}

#[async_trait]
impl SessionStore for FilesystemStore {
    async fn load(&self, id: &str) -> Result<Session> {
        let file_path = self.get_file_path(id);
        if !file_path.exists() {
            bail!(format!("No session found for id {id}"));
        }

        let payload = fs::read_to_string(file_path).await?;
        let session: Session = serde_yaml::from_str(&payload)?;

        return Ok(session);
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let payload = serde_yaml::to_string(session)?;

        if !self.data_dir.exists() {
            fs::create_dir_all(&self.data_dir).await?;
        }

        let mut file = fs::File::create(self.get_file_path(&session.id)).await?;
        file.write_all(payload.as_bytes()).await?;

        return Ok(());
    }

    async fn append_message(&self, id: &str, message: &Message) -> Result<()> {
        let mut session = self.load(id).await?;
        session.push(message.clone());
        return self.save(&session).await;
    }

    /// Returns every stored session, trimmed to the first user message to
    /// save on memory when rendering a picker.
    async fn list(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> = vec![];
        if !self.data_dir.exists() {
            return Ok(sessions);
        }

        let mut dir = fs::read_dir(&self.data_dir).await?;
        while let Some(file) = dir.next_entry().await? {
            let payload = fs::read_to_string(file.path()).await?;
            let mut session: Session = serde_yaml::from_str(&payload)?;
            let user_messages = session
                .messages
                .iter()
                .filter(|e| return e.role == Role::User)
                .collect::<Vec<&Message>>();
            if !user_messages.is_empty() {
                session.messages = vec![user_messages[0].clone()];
            } else {
                session.messages = vec![];
            }

            sessions.push(session);
        }

        sessions.sort_by_cached_key(|session| {
            return DateTime::parse_from_rfc3339(&session.last_activity).unwrap();
        });

        return Ok(sessions);
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let file_path = self.get_file_path(id);
        if !file_path.exists() {
            return Ok(());
        }

        fs::remove_file(file_path).await?;
        return Ok(());
    }
}
