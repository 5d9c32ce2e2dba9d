#[cfg(test)]
#[path = "ollama_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

use super::retry::RetryPolicy;
use crate::config::Config;
use crate::config::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::ChatError;
use crate::domain::models::FinishReason;
use crate::domain::models::GenerationRequest;
use crate::domain::models::GenerationResult;
use crate::domain::models::TokenChunk;

fn convert_err(err: reqwest::Error) -> std::io::Error {
    let err_msg = err.to_string();
    return std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg);
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompletionOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompletionRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: CompletionOptions,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompletionResponse {
    pub response: String,
    pub done: bool,
    pub error: Option<String>,
    pub done_reason: Option<String>,
    pub eval_count: Option<u32>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Model {
    name: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ModelListResponse {
    pub models: Vec<Model>,
}

pub struct Ollama {
    url: String,
    timeout: String,
    chunk_idle_timeout: Duration,
    retry: RetryPolicy,
}

impl Default for Ollama {
    fn default() -> Ollama {
        return Ollama {
            url: Config::get(ConfigKey::OllamaURL),
            timeout: Config::get(ConfigKey::BackendHealthCheckTimeout),
            chunk_idle_timeout: Duration::from_millis(Config::get_u64(ConfigKey::ChunkIdleTimeout)),
            retry: RetryPolicy::default(),
        };
    }
}

impl Ollama {
    /// Opens the completion stream, retrying connect failures and non-success
    /// statuses on the configured backoff schedule.
    async fn connect(&self, req: &CompletionRequest) -> Result<reqwest::Response, ChatError> {
        let mut attempt = 0;
        loop {
            let res = reqwest::Client::new()
                .post(format!("{url}/api/generate", url = self.url))
                .json(req)
                .send()
                .await;

            let err_msg = match res {
                Ok(res) if res.status().is_success() => return Ok(res),
                Ok(res) => format!("Ollama returned status {status}", status = res.status()),
                Err(err) => err.to_string(),
            };

            if attempt >= self.retry.attempts {
                tracing::error!(error = err_msg, "failed to reach Ollama");
                return Err(ChatError::BackendUnavailable(err_msg));
            }

            tracing::warn!(error = err_msg, attempt, "retrying completion request");
            tokio::time::sleep(self.retry.delay(attempt)).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl Backend for Ollama {
    fn name(&self) -> &'static str {
        return "ollama";
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        let res = reqwest::Client::new()
            .get(&self.url)
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .send()
            .await;

        if res.is_err() {
            tracing::error!(error = ?res.unwrap_err(), "Ollama is not running");
            bail!("Ollama is not running");
        }

        let res = res.unwrap();
        if res.status() != 200 {
            tracing::error!(status = res.status().as_u16(), "Ollama health check failed");
            bail!("Ollama health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn list_models(&self) -> Result<Vec<String>> {
        let res = reqwest::Client::new()
            .get(format!("{url}/api/tags", url = self.url))
            .send()
            .await?
            .json::<ModelListResponse>()
            .await?;

        let mut models: Vec<String> = res
            .models
            .iter()
            .map(|model| {
                return model.name.to_string();
            })
            .collect();

        models.sort();

        return Ok(models);
    }

    #[allow(clippy::implicit_return)]
    async fn generate<'a>(
        &self,
        req: GenerationRequest,
        tx: &'a mpsc::Sender<TokenChunk>,
    ) -> Result<GenerationResult, ChatError> {
        let body = CompletionRequest {
            model: req.model.clone(),
            prompt: req.prompt.clone(),
            stream: true,
            options: CompletionOptions {
                temperature: req.params.temperature,
                num_predict: req.params.max_tokens,
            },
        };

        let res = self.connect(&body).await?;
        let stream = res.bytes_stream().map_err(convert_err);
        let mut lines_reader = StreamReader::new(stream).lines();

        let mut text = String::new();
        loop {
            let line = tokio::time::timeout(self.chunk_idle_timeout, lines_reader.next_line())
                .await
                .map_err(|_| {
                    return ChatError::Timeout(format!(
                        "no chunk within {}ms",
                        self.chunk_idle_timeout.as_millis()
                    ));
                })?
                .map_err(|err| {
                    return ChatError::ModelError(err.to_string());
                })?;

            let Some(line) = line else {
                // Stream closed before a done marker.
                return Err(ChatError::ModelError(
                    "completion stream ended early".to_string(),
                ));
            };
            if line.is_empty() {
                continue;
            }

            let ores: CompletionResponse = serde_json::from_str(&line).map_err(|err| {
                return ChatError::ModelError(format!("malformed completion chunk: {err}"));
            })?;
            tracing::debug!(body = ?ores, "completion response");

            if let Some(error) = ores.error {
                return Err(ChatError::ModelError(error));
            }

            text.push_str(&ores.response);

            // Consumers may detach mid-stream; generation continues for
            // cache waiters, so sends are best effort.
            let _ = tx
                .send(TokenChunk {
                    text: ores.response,
                    done: ores.done,
                })
                .await;

            if ores.done {
                let finish_reason = match ores.done_reason.as_deref() {
                    Some("length") => FinishReason::Length,
                    _ => FinishReason::Stop,
                };
                return Ok(GenerationResult {
                    text,
                    token_count: ores.eval_count.unwrap_or(0),
                    finish_reason,
                });
            }
        }
    }
}
