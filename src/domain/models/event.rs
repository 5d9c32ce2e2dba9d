use super::ChatError;
use super::GenerationResult;

/// One increment of streamed model output, as produced by a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenChunk {
    pub text: String,
    pub done: bool,
}

/// What a `submit` caller receives. A stream is a sequence of `Delta`s
/// terminated by exactly one `Done` or `Error`; chunks delivered before an
/// error remain valid.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Done(GenerationResult),
    Error(ChatError),
}
