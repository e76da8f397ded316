//! Social platform abstraction
//!
//! The [`Platform`] trait covers the four calls the bot makes. Implementations
//! own their authentication: callers never see tokens, only the outcome of
//! each call mapped onto [`PlatformError`].
//!
//! # Examples
//!
//! ```no_run
//! use libchirp::platforms::Platform;
//!
//! # async fn example(platform: &mut dyn Platform) -> Result<(), libchirp::error::PlatformError> {
//! let id = platform.post("hello from the loop").await?;
//! let mentions = platform.fetch_mentions(10).await?;
//! if let Some(first) = mentions.first() {
//!     platform.reply(&first.id, "thanks for the mention").await?;
//! }
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::types::{Post, PostId};

pub mod twitter;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Maximum post length on the platform, in characters
pub const MAX_POST_CHARS: usize = 280;

/// Appended to text that had to be shortened
pub const TRUNCATION_MARKER: &str = "…";

/// Authenticated read/write access to the social platform
#[async_trait]
pub trait Platform: Send {
    /// Publish a new post.
    ///
    /// Text longer than [`Platform::character_limit`] is truncated with a
    /// visible marker rather than rejected.
    async fn post(&mut self, text: &str) -> Result<PostId, PlatformError>;

    /// Publish a reply to `parent_id`, truncating like [`Platform::post`]
    async fn reply(&mut self, parent_id: &PostId, text: &str) -> Result<PostId, PlatformError>;

    /// Recent posts matching `query`, at most `limit` of them
    async fn search_recent(&mut self, query: &str, limit: usize)
        -> Result<Vec<Post>, PlatformError>;

    /// Recent posts mentioning the authenticated account
    async fn fetch_mentions(&mut self, limit: usize) -> Result<Vec<Post>, PlatformError>;

    /// Lowercase platform identifier for logs
    fn name(&self) -> &str;

    fn character_limit(&self) -> usize {
        MAX_POST_CHARS
    }
}

/// Shorten `text` to at most `limit` characters, ending in [`TRUNCATION_MARKER`].
///
/// Counts Unicode scalar values, so multi-byte characters are never split.
/// Text already within the limit is returned unchanged.
pub fn truncate_for_post(text: &str, limit: usize) -> Cow<'_, str> {
    if text.chars().count() <= limit {
        return Cow::Borrowed(text);
    }

    let keep = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
    let head: String = text.chars().take(keep).collect();
    let mut shortened = head.trim_end().to_string();
    shortened.push_str(TRUNCATION_MARKER);
    Cow::Owned(shortened)
}
