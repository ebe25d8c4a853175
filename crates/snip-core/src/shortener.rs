use crate::context::Context;
use crate::error::Result;
use crate::record::{BatchEntry, BatchItem, OwnerId, ShortUrlRecord};
use crate::short_id::ShortId;
use async_trait::async_trait;

/// The operations the HTTP layer consumes.
///
/// Mirrors [`Storage`](crate::Storage) one to one. The owner is always passed
/// explicitly; the shortener never looks it up on its own.
#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Shortens a URL, returning the pre-existing id when the owner already
    /// shortened it.
    async fn add(&self, ctx: &Context, original_url: &str, owner: OwnerId) -> Result<ShortId>;

    /// Shortens every URL of the batch, or none.
    async fn add_batch(
        &self,
        ctx: &Context,
        items: Vec<BatchItem>,
        owner: OwnerId,
    ) -> Result<Vec<BatchEntry>>;

    /// Resolves an id to its record. Deleted records are returned as-is.
    async fn get_by_id(&self, ctx: &Context, id: &ShortId) -> Result<ShortUrlRecord>;

    async fn get_by_original_url(&self, ctx: &Context, original_url: &str) -> Result<ShortId>;

    /// The owner's active id for `original_url`, `NotFound` when there is none.
    async fn get_by_original_url_for_owner(
        &self,
        ctx: &Context,
        original_url: &str,
        owner: OwnerId,
    ) -> Result<ShortId>;

    async fn get_urls_by_owner(&self, ctx: &Context, owner: OwnerId)
        -> Result<Vec<ShortUrlRecord>>;

    async fn delete_urls(&self, ctx: &Context, ids: &[ShortId], owner: OwnerId) -> Result<()>;

    async fn ping(&self, ctx: &Context) -> Result<()>;
}
