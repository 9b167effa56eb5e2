//! Proxy pipeline integration
//!
//! The hook the proxy calls for every exchange, the response rewrite it
//! applies to ignored traffic, and offline replay of recorded archives.

mod har;
mod hook;
mod rewrite;

pub use har::{replay, ReplayReport};
pub use hook::{HookOutcome, MessageContext, VanisherHook};
pub use rewrite::{rewrite, rewrite_headers, CONTENT_TYPE_HEADER, MARKER_HEADER};
