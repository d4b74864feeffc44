//! feedsift Sources
//!
//! Content sources feed time-ordered items into the evaluation scheduler.
//!
//! - [`ContentSource`] is the backend seam: one fetch attempt
//! - [`SourceAdapter`] wraps a source with the polling contract the
//!   scheduler relies on: ordered, filtered, and never failing
//! - [`SseStreamSource`] and [`HttpPollSource`] reach real upstreams;
//!   [`MemorySource`] serves local runs and tests

pub mod adapter;
pub mod config;
pub mod http;
pub mod memory;
pub mod source;
pub mod sse;

pub use adapter::SourceAdapter;
pub use config::{SourceConfig, SourceType};
pub use http::HttpPollSource;
pub use memory::MemorySource;
pub use source::ContentSource;
pub use sse::{SseDecoder, SseEvent, SseOptions, SseStreamSource};
