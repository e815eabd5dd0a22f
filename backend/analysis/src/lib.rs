pub mod prompt;
pub mod providers;
pub mod requester;

pub use prompt::{build_prompt, build_request, DETAILED_INSTRUCTION, QUICK_INSTRUCTION};
pub use providers::{provider_from_settings, ProviderKind, ProviderRegistry, ProviderSettings};
pub use requester::{AnalysisRequester, RequesterOptions, FALLBACK_MESSAGE};
