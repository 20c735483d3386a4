//! Translation between the Anthropic request shapes and the Bedrock
//! invoke contract.
//!
//! The core of the gateway: validates inbound bodies, resolves model
//! names, and rewrites fields into what Bedrock expects. All functions
//! here are pure (no I/O).

pub mod normalize;

pub use normalize::{normalize, NormalizedRequest, RequestShape, ANTHROPIC_VERSION};
