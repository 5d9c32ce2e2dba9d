#[cfg(test)]
#[path = "generation_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> SamplingParams {
        return SamplingParams {
            temperature: 0.7,
            max_tokens: 1024,
        };
    }
}

/// Value object describing one generation call. Two requests with the same
/// model, prompt and sampling parameters are interchangeable, which is what
/// the cache key encodes.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub params: SamplingParams,
}

impl GenerationRequest {
    pub fn new(model: &str, prompt: &str, params: SamplingParams) -> GenerationRequest {
        return GenerationRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            params,
        };
    }

    pub fn cache_key(&self) -> CacheKey {
        return CacheKey {
            model: self.model.clone(),
            prompt: self.prompt.clone(),
            // f32 is not Eq/Hash; the raw bits are, and equal parameters
            // produce equal bits.
            temperature_bits: self.params.temperature.to_bits(),
            max_tokens: self.params.max_tokens,
        };
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    model: String,
    prompt: String,
    temperature_bits: u32,
    max_tokens: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub token_count: u32,
    pub finish_reason: FinishReason,
}
