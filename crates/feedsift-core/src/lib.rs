//! feedsift Core
//!
//! Core types, traits, and utilities shared across feedsift components.
//!
//! This crate provides:
//! - Domain types for content items, prompts, subscriptions and verdicts
//! - The error taxonomy used by every pipeline stage
//! - A bounded, eviction-aware result queue for per-subscription delivery
//! - Feed adapters that normalize vendor-specific update payloads

pub mod adapters;
pub mod error;
pub mod feed_adapter;
pub mod stream;
pub mod types;

pub use adapters::{AdapterConfig, ConfigurableAdapter, DiscoveryAdapter};
pub use error::{Error, Result};
pub use feed_adapter::{AdapterRegistry, FeedAdapter, ParsedUpdate};
pub use stream::ResultQueue;
pub use types::{
    ContentItem, ContentPayload, Cursor, EvaluationResult, PayloadSummary, Prompt, SourceKind,
    SubscriptionId, Verdict, TIMEOUT_RATIONALE,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::feed_adapter::{FeedAdapter, ParsedUpdate};
    pub use crate::stream::ResultQueue;
    pub use crate::types::{
        ContentItem, ContentPayload, Cursor, EvaluationResult, Prompt, SourceKind, SubscriptionId,
        Verdict,
    };
}
