pub mod gemini_provider;
pub mod generator;
pub mod openrouter_provider;
pub mod provider;
pub mod retry;
pub mod stream;
pub mod types;


pub use gemini_provider::GeminiProvider;
pub use generator::TextGenerator;
pub use openrouter_provider::OpenRouterProvider;
pub use provider::TextBackend;
pub use retry::{RetryPolicy, RetryingClient};
pub use stream::TRUNCATION_MARKER;
pub use types::*;
