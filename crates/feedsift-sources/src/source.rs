//! Content source trait

use async_trait::async_trait;
use feedsift_core::{ContentItem, Cursor, Result, SourceKind};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A feed of time-ordered content items
///
/// `fetch_since` is a single attempt: failures are reported as
/// [`feedsift_core::Error::SourceUnavailable`] and the caller decides what
/// to do with them (see [`crate::SourceAdapter`]).
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// The configured name of this source
    fn kind(&self) -> &SourceKind;

    /// Fetch items the source knows about with a cursor after `since`
    ///
    /// The result may contain items at or before `since` and need not be
    /// ordered.
    async fn fetch_since(&self, since: Cursor) -> Result<Vec<ContentItem>>;

    /// Items the source discarded before anyone fetched them
    fn dropped(&self) -> u64 {
        0
    }

    /// Start any background work the source needs (e.g. a streaming
    /// connection). Tasks must be spawned on `tracker` and stop when
    /// `cancel` fires.
    fn start(&self, _tracker: &TaskTracker, _cancel: CancellationToken) {}
}
