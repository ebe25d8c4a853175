use crate::context::Context;
use crate::error::Result;
use crate::record::{BatchEntry, BatchItem, OwnerId, ShortUrlRecord};
use crate::short_id::ShortId;
use async_trait::async_trait;

/// The persistence contract shared by every backend.
///
/// Implementations own identifier generation and uniqueness. All methods are
/// safe to call concurrently and must stop work once `ctx` is done.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Shortens `original_url` for `owner`.
    ///
    /// Returns the id of the existing active record when the owner already
    /// shortened this URL. Otherwise stores a new record under a freshly
    /// generated id. A backend enforcing uniqueness with a durable constraint
    /// may instead return `Err(Conflict)` when it loses a race.
    async fn add(&self, ctx: &Context, original_url: &str, owner: OwnerId) -> Result<ShortId>;

    /// Stores every item or none of them.
    ///
    /// No duplicate detection is performed, neither against existing records
    /// nor within the batch. Entries are returned in input order.
    async fn add_batch(
        &self,
        ctx: &Context,
        items: Vec<BatchItem>,
        owner: OwnerId,
    ) -> Result<Vec<BatchEntry>>;

    /// Looks a record up by id, including soft-deleted records.
    async fn get_by_id(&self, ctx: &Context, id: &ShortId) -> Result<ShortUrlRecord>;

    /// Finds any record for `original_url`, regardless of owner.
    ///
    /// Active records are preferred over deleted ones.
    async fn get_by_original_url(&self, ctx: &Context, original_url: &str) -> Result<ShortId>;

    /// Finds the active record `owner` created for `original_url`.
    async fn get_by_original_url_for_owner(
        &self,
        ctx: &Context,
        original_url: &str,
        owner: OwnerId,
    ) -> Result<ShortId>;

    /// Returns all active records of `owner`, in no particular order.
    async fn get_urls_by_owner(&self, ctx: &Context, owner: OwnerId)
        -> Result<Vec<ShortUrlRecord>>;

    /// Soft-deletes the records in `ids` that belong to `owner`.
    ///
    /// Unknown ids and ids owned by someone else are skipped silently.
    async fn delete_urls(&self, ctx: &Context, ids: &[ShortId], owner: OwnerId) -> Result<()>;

    /// Checks that the backend is reachable.
    async fn ping(&self, ctx: &Context) -> Result<()> {
        ctx.check()
    }
}

#[async_trait]
impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    async fn add(&self, ctx: &Context, original_url: &str, owner: OwnerId) -> Result<ShortId> {
        (**self).add(ctx, original_url, owner).await
    }

    async fn add_batch(
        &self,
        ctx: &Context,
        items: Vec<BatchItem>,
        owner: OwnerId,
    ) -> Result<Vec<BatchEntry>> {
        (**self).add_batch(ctx, items, owner).await
    }

    async fn get_by_id(&self, ctx: &Context, id: &ShortId) -> Result<ShortUrlRecord> {
        (**self).get_by_id(ctx, id).await
    }

    async fn get_by_original_url(&self, ctx: &Context, original_url: &str) -> Result<ShortId> {
        (**self).get_by_original_url(ctx, original_url).await
    }

    async fn get_by_original_url_for_owner(
        &self,
        ctx: &Context,
        original_url: &str,
        owner: OwnerId,
    ) -> Result<ShortId> {
        (**self)
            .get_by_original_url_for_owner(ctx, original_url, owner)
            .await
    }

    async fn get_urls_by_owner(
        &self,
        ctx: &Context,
        owner: OwnerId,
    ) -> Result<Vec<ShortUrlRecord>> {
        (**self).get_urls_by_owner(ctx, owner).await
    }

    async fn delete_urls(&self, ctx: &Context, ids: &[ShortId], owner: OwnerId) -> Result<()> {
        (**self).delete_urls(ctx, ids, owner).await
    }

    async fn ping(&self, ctx: &Context) -> Result<()> {
        (**self).ping(ctx).await
    }
}
