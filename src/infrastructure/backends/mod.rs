pub mod ollama;
pub mod retry;

use anyhow::bail;
use anyhow::Result;

use crate::domain::models::BackendBox;

pub struct BackendManager {}

impl BackendManager {
    pub fn get(name: &str) -> Result<BackendBox> {
        if name == "ollama" {
            return Ok(Box::<ollama::Ollama>::default());
        }

        bail!(format!("No backend implemented for {name}"))
    }
}
