// =============================================================================
// SSE — single-use token registry and the streaming gateway built on it
// =============================================================================

pub mod gateway;
pub mod token_registry;

pub use token_registry::SseTokenRegistry;
