use async_trait::async_trait;
use snip_core::{
    BatchEntry, BatchItem, Context, OwnerId, Result, ShortId, ShortUrlRecord, Shortener, Storage,
    StorageError,
};
use tracing::{debug, warn};

/// A concrete implementation of the `Shortener` trait on top of any
/// `Storage` backend.
#[derive(Debug, Clone)]
pub struct ShortenerService<S> {
    storage: S,
}

impl<S: Storage> ShortenerService<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Finds the record that made `add` fail with a conflict.
    ///
    /// The owner's own active record is tried first, then any record for the
    /// URL. If neither exists the original conflict is returned.
    async fn resolve_conflict(
        &self,
        ctx: &Context,
        original_url: &str,
        owner: OwnerId,
        conflict: StorageError,
    ) -> Result<ShortId> {
        match self
            .storage
            .get_by_original_url_for_owner(ctx, original_url, owner)
            .await
        {
            Ok(id) => return Ok(id),
            Err(StorageError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        match self.storage.get_by_original_url(ctx, original_url).await {
            Ok(id) => Ok(id),
            Err(StorageError::NotFound(_)) => {
                warn!(%owner, original_url, "conflict without a matching record");
                Err(conflict)
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl<S: Storage> Shortener for ShortenerService<S> {
    async fn add(&self, ctx: &Context, original_url: &str, owner: OwnerId) -> Result<ShortId> {
        match self.storage.add(ctx, original_url, owner).await {
            Ok(id) => {
                debug!(%owner, %id, "shortened url");
                Ok(id)
            }
            Err(conflict @ StorageError::Conflict(_)) => {
                debug!(%owner, original_url, "add conflicted, returning existing id");
                self.resolve_conflict(ctx, original_url, owner, conflict)
                    .await
            }
            Err(err) => Err(err),
        }
    }

    async fn add_batch(
        &self,
        ctx: &Context,
        items: Vec<BatchItem>,
        owner: OwnerId,
    ) -> Result<Vec<BatchEntry>> {
        let size = items.len();
        let entries = self.storage.add_batch(ctx, items, owner).await?;
        debug!(%owner, size, "shortened batch");
        Ok(entries)
    }

    async fn get_by_id(&self, ctx: &Context, id: &ShortId) -> Result<ShortUrlRecord> {
        self.storage.get_by_id(ctx, id).await
    }

    async fn get_by_original_url(&self, ctx: &Context, original_url: &str) -> Result<ShortId> {
        self.storage.get_by_original_url(ctx, original_url).await
    }

    async fn get_by_original_url_for_owner(
        &self,
        ctx: &Context,
        original_url: &str,
        owner: OwnerId,
    ) -> Result<ShortId> {
        self.storage
            .get_by_original_url_for_owner(ctx, original_url, owner)
            .await
    }

    async fn get_urls_by_owner(
        &self,
        ctx: &Context,
        owner: OwnerId,
    ) -> Result<Vec<ShortUrlRecord>> {
        self.storage.get_urls_by_owner(ctx, owner).await
    }

    async fn delete_urls(&self, ctx: &Context, ids: &[ShortId], owner: OwnerId) -> Result<()> {
        self.storage.delete_urls(ctx, ids, owner).await?;
        debug!(%owner, count = ids.len(), "deleted urls");
        Ok(())
    }

    async fn ping(&self, ctx: &Context) -> Result<()> {
        self.storage.ping(ctx).await
    }
}
