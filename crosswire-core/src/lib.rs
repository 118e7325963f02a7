//! Crosswire: a translation gateway between LLM chat protocols.
//!
//! Crosswire accepts requests in a canonical chat format and serves them
//! from heterogeneous upstream providers, translating both the request
//! and the (streaming or unary) response so callers never see upstream
//! wire formats. A configured provider chain gives ordered fallback with
//! per-provider retry, and a bounded continuation-token cache keeps
//! multi-turn tool calling coherent for upstreams that require replayed
//! opaque state.
//!
//! The main entry point is [`gateway::Gateway`]; everything below it is
//! usable on its own:
//!
//! - [`protocol`]: canonical request, response, and stream-event types
//! - [`providers`]: upstream adapters, the registry, retry, and routing
//! - [`cache`]: the TTL/capacity-bounded continuation-token cache
//! - [`config`]: YAML configuration with env interpolation and hot reload

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod providers;

pub use cache::ContinuationCache;
pub use config::{ConfigHandle, CrosswireConfig};
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use protocol::{CanonicalRequest, CanonicalResponse, StreamEvent};
pub use providers::{ProviderAdapter, ProviderError, ProviderRegistry};

/// Crate version as compiled
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
