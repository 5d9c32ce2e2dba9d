pub mod completion_cache;
pub mod context_window;
pub mod orchestrator;
pub mod reports;

pub use completion_cache::CacheOutcome;
pub use completion_cache::CompletionCache;
pub use completion_cache::ProducerGuard;
pub use context_window::PromptPlan;
pub use orchestrator::OrchestratorSettings;
pub use orchestrator::SessionOrchestrator;
pub use orchestrator::SubmitHandle;
