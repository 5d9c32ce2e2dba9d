use super::GenerationRequest;
use super::SamplingParams;

#[test]
fn it_builds_equal_keys_for_equal_requests() {
    let a = GenerationRequest::new("gemma2:9b", "User: hello", SamplingParams::default());
    let b = GenerationRequest::new("gemma2:9b", "User: hello", SamplingParams::default());
    assert_eq!(a.cache_key(), b.cache_key());
}

#[test]
fn it_builds_distinct_keys_per_model() {
    let a = GenerationRequest::new("gemma2:9b", "User: hello", SamplingParams::default());
    let b = GenerationRequest::new("llama3:8b", "User: hello", SamplingParams::default());
    assert_ne!(a.cache_key(), b.cache_key());
}

#[test]
fn it_builds_distinct_keys_per_sampling_params() {
    let a = GenerationRequest::new("gemma2:9b", "User: hello", SamplingParams::default());
    let b = GenerationRequest::new(
        "gemma2:9b",
        "User: hello",
        SamplingParams {
            temperature: 0.2,
            max_tokens: 1024,
        },
    );
    assert_ne!(a.cache_key(), b.cache_key());
}
