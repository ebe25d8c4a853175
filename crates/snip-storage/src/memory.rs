use async_trait::async_trait;
use parking_lot::Mutex;
use snip_core::record::ensure_storable;
use snip_core::{
    BatchEntry, BatchItem, Context, Generator, OwnerId, RandomGenerator, Result, ShortId,
    ShortUrlRecord, Storage, StorageError,
};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    records: HashMap<ShortId, ShortUrlRecord>,
    /// `(original_url, owner)` -> id of the active record created by `add`.
    active: HashMap<(String, OwnerId), ShortId>,
}

impl State {
    /// Draws ids until one is unused. Ids are never reused, deleted records
    /// included, because deleted records stay in `records`.
    fn fresh_id<G: Generator>(&self, generator: &G) -> ShortId {
        loop {
            let candidate = generator.generate();
            if !self.records.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// The owner's active record for `original_url`, batch records included.
    fn active_for_owner(&self, original_url: &str, owner: OwnerId) -> Option<ShortId> {
        if let Some(id) = self.active.get(&(original_url.to_owned(), owner)) {
            return Some(id.clone());
        }
        // Batch inserts are not indexed in `active`.
        self.records
            .values()
            .find(|r| r.is_active() && r.owner_id == owner && r.original_url == original_url)
            .map(|r| r.id.clone())
    }

    fn fresh_id_excluding<G: Generator>(&self, generator: &G, pending: &[ShortId]) -> ShortId {
        loop {
            let candidate = self.fresh_id(generator);
            if !pending.contains(&candidate) {
                return candidate;
            }
        }
    }
}

/// In-memory implementation of [`Storage`].
///
/// All state sits behind a single mutex. Every logical operation, including
/// the check-generate-insert sequence of [`Storage::add`], runs inside one
/// critical section, and no I/O ever happens while the lock is held.
#[derive(Debug)]
pub struct InMemoryStorage<G = RandomGenerator> {
    state: Mutex<State>,
    generator: G,
}

impl InMemoryStorage<RandomGenerator> {
    /// Creates an empty store using random alphanumeric ids.
    pub fn new() -> Self {
        Self::with_generator(RandomGenerator::new())
    }
}

impl Default for InMemoryStorage<RandomGenerator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: Generator> InMemoryStorage<G> {
    pub fn with_generator(generator: G) -> Self {
        Self {
            state: Mutex::new(State::default()),
            generator,
        }
    }

    /// Number of records ever stored, deleted ones included.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<G: Generator> Storage for InMemoryStorage<G> {
    async fn add(&self, ctx: &Context, original_url: &str, owner: OwnerId) -> Result<ShortId> {
        ctx.check()?;
        ensure_storable(original_url)?;

        let mut state = self.state.lock();
        if let Some(existing) = state.active_for_owner(original_url, owner) {
            return Ok(existing);
        }

        let key = (original_url.to_owned(), owner);
        let id = state.fresh_id(&self.generator);
        state.records.insert(
            id.clone(),
            ShortUrlRecord::new(id.clone(), original_url, owner),
        );
        state.active.insert(key, id.clone());
        debug!(id = %id, owner = %owner, "stored short url");

        Ok(id)
    }

    async fn add_batch(
        &self,
        ctx: &Context,
        items: Vec<BatchItem>,
        owner: OwnerId,
    ) -> Result<Vec<BatchEntry>> {
        ctx.check()?;
        for item in &items {
            ensure_storable(&item.original_url)?;
        }

        let mut state = self.state.lock();
        let mut ids: Vec<ShortId> = Vec::with_capacity(items.len());
        for _ in &items {
            let id = state.fresh_id_excluding(&self.generator, &ids);
            ids.push(id);
        }

        let entries = items
            .into_iter()
            .zip(ids)
            .map(|(item, id)| {
                let record = ShortUrlRecord {
                    id: id.clone(),
                    original_url: item.original_url,
                    owner_id: owner,
                    correlation_id: item.correlation_id.clone(),
                    deleted: false,
                };
                state.records.insert(id.clone(), record);
                BatchEntry {
                    id,
                    correlation_id: item.correlation_id,
                }
            })
            .collect::<Vec<_>>();
        debug!(count = entries.len(), owner = %owner, "stored short url batch");

        Ok(entries)
    }

    async fn get_by_id(&self, ctx: &Context, id: &ShortId) -> Result<ShortUrlRecord> {
        ctx.check()?;
        self.state
            .lock()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn get_by_original_url(&self, ctx: &Context, original_url: &str) -> Result<ShortId> {
        ctx.check()?;
        let state = self.state.lock();
        let mut fallback = None;
        for record in state.records.values() {
            if record.original_url != original_url {
                continue;
            }
            if record.is_active() {
                return Ok(record.id.clone());
            }
            fallback.get_or_insert_with(|| record.id.clone());
        }
        fallback.ok_or_else(|| StorageError::NotFound(original_url.to_string()))
    }

    async fn get_by_original_url_for_owner(
        &self,
        ctx: &Context,
        original_url: &str,
        owner: OwnerId,
    ) -> Result<ShortId> {
        ctx.check()?;
        self.state
            .lock()
            .active_for_owner(original_url, owner)
            .ok_or_else(|| StorageError::NotFound(original_url.to_string()))
    }

    async fn get_urls_by_owner(
        &self,
        ctx: &Context,
        owner: OwnerId,
    ) -> Result<Vec<ShortUrlRecord>> {
        ctx.check()?;
        Ok(self
            .state
            .lock()
            .records
            .values()
            .filter(|r| r.owner_id == owner && r.is_active())
            .cloned()
            .collect())
    }

    async fn delete_urls(&self, ctx: &Context, ids: &[ShortId], owner: OwnerId) -> Result<()> {
        ctx.check()?;
        let mut state = self.state.lock();
        let mut deleted = 0usize;
        for id in ids {
            let Some(record) = state.records.get_mut(id) else {
                continue;
            };
            if record.owner_id != owner || record.deleted {
                continue;
            }
            record.deleted = true;
            let key = (record.original_url.clone(), owner);
            if state.active.get(&key) == Some(id) {
                state.active.remove(&key);
            }
            deleted += 1;
        }
        debug!(requested = ids.len(), deleted, owner = %owner, "soft-deleted short urls");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snip_core::SeqGenerator;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn ctx() -> Context {
        Context::background()
    }

    /// Replays a fixed list of ids, then falls back to a sequence.
    struct ScriptedGenerator {
        script: Mutex<Vec<&'static str>>,
        fallback: SeqGenerator,
    }

    impl Generator for ScriptedGenerator {
        fn generate(&self) -> ShortId {
            match self.script.lock().pop() {
                Some(id) => ShortId::new_unchecked(id),
                None => self.fallback.generate(),
            }
        }
    }

    #[tokio::test]
    async fn add_and_get_round_trip() {
        let storage = InMemoryStorage::new();
        let id = storage
            .add(&ctx(), "https://example.com", OwnerId(1))
            .await
            .unwrap();

        let record = storage.get_by_id(&ctx(), &id).await.unwrap();
        assert_eq!(record.original_url, "https://example.com");
        assert_eq!(record.owner_id, OwnerId(1));
        assert!(!record.deleted);
    }

    #[tokio::test]
    async fn add_is_idempotent_per_owner() {
        let storage = InMemoryStorage::new();
        let first = storage.add(&ctx(), "https://a.example", OwnerId(1)).await.unwrap();
        let second = storage.add(&ctx(), "https://a.example", OwnerId(1)).await.unwrap();
        let other_owner = storage.add(&ctx(), "https://a.example", OwnerId(2)).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other_owner);
        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn add_rejects_empty_url() {
        let storage = InMemoryStorage::new();
        let err = storage.add(&ctx(), "", OwnerId(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn get_unknown_id_is_not_found() {
        let storage = InMemoryStorage::new();
        let err = storage
            .get_by_id(&ctx(), &ShortId::new_unchecked("nope"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn generation_retries_on_collision() {
        let generator = ScriptedGenerator {
            // popped from the back: "dup", "dup", then the sequence
            script: Mutex::new(vec!["dup", "dup"]),
            fallback: SeqGenerator::with_prefix("s"),
        };
        let storage = InMemoryStorage::with_generator(generator);

        let first = storage.add(&ctx(), "https://one.example", OwnerId(1)).await.unwrap();
        let second = storage.add(&ctx(), "https://two.example", OwnerId(1)).await.unwrap();

        assert_eq!(first.as_str(), "dup");
        assert_eq!(second.as_str(), "s000000");
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let storage = InMemoryStorage::with_generator(SeqGenerator::with_prefix("x"));
        let mut seen = std::collections::HashSet::new();

        for round in 0..5 {
            let id = storage
                .add(&ctx(), "https://cycle.example", OwnerId(1))
                .await
                .unwrap();
            assert!(seen.insert(id.clone()), "id reused in round {round}");
            storage.delete_urls(&ctx(), &[id], OwnerId(1)).await.unwrap();
        }
        assert_eq!(storage.len(), 5);
    }

    #[tokio::test]
    async fn owner_isolation() {
        let storage = InMemoryStorage::new();
        storage.add(&ctx(), "https://a.example", OwnerId(10)).await.unwrap();
        storage.add(&ctx(), "https://b.example", OwnerId(20)).await.unwrap();

        let urls = storage.get_urls_by_owner(&ctx(), OwnerId(10)).await.unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].original_url, "https://a.example");

        let none = storage.get_urls_by_owner(&ctx(), OwnerId(30)).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn soft_delete_keeps_record_visible_by_id() {
        let storage = InMemoryStorage::new();
        let id = storage.add(&ctx(), "https://gone.example", OwnerId(1)).await.unwrap();

        storage
            .delete_urls(&ctx(), std::slice::from_ref(&id), OwnerId(1))
            .await
            .unwrap();

        let record = storage.get_by_id(&ctx(), &id).await.unwrap();
        assert!(record.deleted);
        assert!(storage
            .get_urls_by_owner(&ctx(), OwnerId(1))
            .await
            .unwrap()
            .is_empty());

        // After deletion the owner can shorten the same URL again.
        let again = storage.add(&ctx(), "https://gone.example", OwnerId(1)).await.unwrap();
        assert_ne!(again, id);
    }

    #[tokio::test]
    async fn delete_ignores_foreign_and_unknown_ids() {
        let storage = InMemoryStorage::new();
        let id = storage.add(&ctx(), "https://mine.example", OwnerId(1)).await.unwrap();

        storage
            .delete_urls(
                &ctx(),
                &[id.clone(), ShortId::new_unchecked("unknown")],
                OwnerId(2),
            )
            .await
            .unwrap();

        assert!(!storage.get_by_id(&ctx(), &id).await.unwrap().deleted);
    }

    #[tokio::test]
    async fn batch_assigns_distinct_ids_and_keeps_duplicates() {
        let storage = InMemoryStorage::new();
        let existing = storage.add(&ctx(), "https://dup.example", OwnerId(1)).await.unwrap();

        let entries = storage
            .add_batch(
                &ctx(),
                vec![
                    BatchItem::new("https://dup.example", Some("a".to_string())),
                    BatchItem::new("https://dup.example", Some("b".to_string())),
                    BatchItem::new("https://other.example", None),
                ],
                OwnerId(1),
            )
            .await
            .unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].correlation_id.as_deref(), Some("a"));
        assert_eq!(entries[1].correlation_id.as_deref(), Some("b"));
        assert_ne!(entries[0].id, entries[1].id);
        assert_ne!(entries[0].id, existing);
        assert_eq!(storage.len(), 4);

        let record = storage.get_by_id(&ctx(), &entries[1].id).await.unwrap();
        assert_eq!(record.correlation_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let storage = InMemoryStorage::new();
        let err = storage
            .add_batch(
                &ctx(),
                vec![
                    BatchItem::new("https://1.example", None),
                    BatchItem::new("https://2.example", None),
                    BatchItem::new("https://3.example", None),
                    BatchItem::new("", None),
                ],
                OwnerId(1),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::InvalidArgument(_)));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn lookup_by_original_url_prefers_active_record() {
        let storage = InMemoryStorage::new();
        let old = storage.add(&ctx(), "https://x.example", OwnerId(1)).await.unwrap();
        storage.delete_urls(&ctx(), &[old.clone()], OwnerId(1)).await.unwrap();
        let fresh = storage.add(&ctx(), "https://x.example", OwnerId(2)).await.unwrap();

        let found = storage
            .get_by_original_url(&ctx(), "https://x.example")
            .await
            .unwrap();
        assert_eq!(found, fresh);

        let err = storage
            .get_by_original_url(&ctx(), "https://missing.example")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn owner_lookup_finds_batch_records() {
        let storage = InMemoryStorage::new();
        let entries = storage
            .add_batch(&ctx(), vec![BatchItem::new("https://b.example", None)], OwnerId(3))
            .await
            .unwrap();

        let found = storage
            .get_by_original_url_for_owner(&ctx(), "https://b.example", OwnerId(3))
            .await
            .unwrap();
        assert_eq!(found, entries[0].id);
    }

    #[tokio::test]
    async fn expired_context_is_canceled() {
        let storage = InMemoryStorage::new();
        let ctx = Context::with_deadline(tokio::time::Instant::now() - Duration::from_millis(1));
        let err = storage.add(&ctx, "https://late.example", OwnerId(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Canceled(_)));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn add_after_batch_returns_batch_id() {
        let storage = InMemoryStorage::new();
        let entries = storage
            .add_batch(&ctx(), vec![BatchItem::new("https://b.example", None)], OwnerId(3))
            .await
            .unwrap();

        let id = storage.add(&ctx(), "https://b.example", OwnerId(3)).await.unwrap();
        assert_eq!(id, entries[0].id);
        assert_eq!(storage.len(), 1);

        let other = storage.add(&ctx(), "https://b.example", OwnerId(4)).await.unwrap();
        assert_ne!(other, entries[0].id);
    }

    #[tokio::test]
    async fn add_after_deleted_batch_creates_new_record() {
        let storage = InMemoryStorage::new();
        let entries = storage
            .add_batch(&ctx(), vec![BatchItem::new("https://b.example", None)], OwnerId(3))
            .await
            .unwrap();
        storage
            .delete_urls(&ctx(), &[entries[0].id.clone()], OwnerId(3))
            .await
            .unwrap();

        let id = storage.add(&ctx(), "https://b.example", OwnerId(3)).await.unwrap();
        assert_ne!(id, entries[0].id);
        assert_eq!(
            storage.get_urls_by_owner(&ctx(), OwnerId(3)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_adds_converge_on_one_record() {
        const TASKS: usize = 32;
        let storage = Arc::new(InMemoryStorage::new());
        let barrier = Arc::new(Barrier::new(TASKS));
        let mut handles = vec![];

        for _ in 0..TASKS {
            let storage = Arc::clone(&storage);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                storage
                    .add(&Context::background(), "https://race.example", OwnerId(9))
                    .await
                    .unwrap()
            }));
        }

        let mut ids = vec![];
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(storage.len(), 1);
    }
}
