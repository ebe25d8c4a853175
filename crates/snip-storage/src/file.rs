use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snip_core::record::ensure_storable;
use snip_core::{
    BatchEntry, BatchItem, Context, Generator, OwnerId, RandomGenerator, Result, ShortId,
    ShortUrlRecord, Storage, StorageError,
};
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// One line of the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Entry {
    Record {
        id: ShortId,
        original_url: String,
        owner_id: OwnerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<String>,
    },
    Deleted {
        id: ShortId,
        owner_id: OwnerId,
    },
}

impl Entry {
    fn record(record: &ShortUrlRecord) -> Self {
        Entry::Record {
            id: record.id.clone(),
            original_url: record.original_url.clone(),
            owner_id: record.owner_id,
            correlation_id: record.correlation_id.clone(),
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        serde_json::to_writer(&mut *buf, self)
            .map_err(|e| StorageError::InvalidArgument(format!("unencodable entry: {e}")))?;
        buf.push(b'\n');
        Ok(())
    }
}

/// The state obtained by replaying the log.
#[derive(Debug, Default)]
struct Snapshot {
    records: Vec<ShortUrlRecord>,
    positions: HashMap<ShortId, usize>,
    /// Byte length of the complete lines; the next append starts here.
    committed_len: u64,
}

impl Snapshot {
    fn replay(contents: &str) -> Result<Self> {
        let mut snapshot = Snapshot::default();

        // A trailing segment without a newline is an append still in flight.
        let complete = match contents.rfind('\n') {
            Some(end) => &contents[..=end],
            None => "",
        };
        snapshot.committed_len = complete.len() as u64;

        for (index, line) in complete.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: Entry = serde_json::from_str(line).map_err(|e| {
                StorageError::Unavailable(format!("corrupt entry at line {}: {e}", index + 1))
            })?;
            snapshot.apply(entry);
        }

        Ok(snapshot)
    }

    fn apply(&mut self, entry: Entry) {
        match entry {
            Entry::Record {
                id,
                original_url,
                owner_id,
                correlation_id,
            } => {
                let mut record = ShortUrlRecord::new(id.clone(), original_url, owner_id);
                record.correlation_id = correlation_id;
                self.positions.insert(id, self.records.len());
                self.records.push(record);
            }
            Entry::Deleted { id, owner_id } => {
                if let Some(&position) = self.positions.get(&id) {
                    let record = &mut self.records[position];
                    if record.owner_id == owner_id {
                        record.deleted = true;
                    }
                }
            }
        }
    }

    fn get(&self, id: &ShortId) -> Option<&ShortUrlRecord> {
        self.positions.get(id).map(|&position| &self.records[position])
    }

    fn contains(&self, id: &ShortId) -> bool {
        self.positions.contains_key(id)
    }

    fn active_for_owner<'a>(
        &'a self,
        original_url: &'a str,
        owner: OwnerId,
    ) -> impl Iterator<Item = &'a ShortUrlRecord> + 'a {
        self.records.iter().filter(move |r| {
            r.is_active() && r.owner_id == owner && r.original_url == original_url
        })
    }
}

/// Append-only, newline-delimited JSON implementation of [`Storage`].
///
/// Records and deletion tombstones are appended, never rewritten. Every
/// mutation is encoded up front and written with a single `write_all`, so a
/// batch either lands completely or the file is truncated back to where it
/// was. Writers are serialized by an async mutex; readers replay the file
/// without locking and ignore a trailing, partially written line. The next
/// append discards such a line before writing.
///
/// Once started, an append runs to completion in its own task even if the
/// caller's context expires, and it keeps the write lock until it is done.
#[derive(Debug)]
pub struct FileStorage<G = RandomGenerator> {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
    generator: G,
}

impl FileStorage<RandomGenerator> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_generator(path, RandomGenerator::new())
    }
}

impl<G: Generator> FileStorage<G> {
    pub fn with_generator(path: impl Into<PathBuf>, generator: G) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
            generator,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Snapshot> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Snapshot::replay(&contents),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn lock(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.write_lock).lock_owned().await
    }

    /// Writes `bytes` after the last complete line of the log.
    ///
    /// The write happens on a spawned task that owns `guard`, so dropping the
    /// calling future neither tears the write nor lets another writer in.
    async fn append(
        &self,
        guard: OwnedMutexGuard<()>,
        committed_len: u64,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let path = self.path.clone();
        let task = tokio::spawn(async move {
            let result = write_at(&path, committed_len, &bytes).await;
            drop(guard);
            result
        });

        match task.await {
            Ok(result) => result,
            Err(err) => Err(StorageError::Unavailable(format!("append task failed: {err}"))),
        }
    }

    fn fresh_id(&self, snapshot: &Snapshot, pending: &[ShortId]) -> ShortId {
        loop {
            let candidate = self.generator.generate();
            if !snapshot.contains(&candidate) && !pending.contains(&candidate) {
                return candidate;
            }
        }
    }

    async fn add_locked(&self, original_url: &str, owner: OwnerId) -> Result<ShortId> {
        let guard = self.lock().await;
        let snapshot = self.load().await?;

        if let Some(existing) = snapshot.active_for_owner(original_url, owner).next() {
            return Ok(existing.id.clone());
        }

        let id = self.fresh_id(&snapshot, &[]);
        let record = ShortUrlRecord::new(id.clone(), original_url, owner);
        let mut buf = Vec::new();
        Entry::record(&record).encode_into(&mut buf)?;
        self.append(guard, snapshot.committed_len, buf).await?;
        debug!(id = %id, owner = %owner, "appended short url");

        Ok(id)
    }

    async fn add_batch_locked(
        &self,
        items: Vec<BatchItem>,
        owner: OwnerId,
    ) -> Result<Vec<BatchEntry>> {
        let guard = self.lock().await;
        let snapshot = self.load().await?;

        let mut ids: Vec<ShortId> = Vec::with_capacity(items.len());
        let mut buf = Vec::new();
        for item in &items {
            let id = self.fresh_id(&snapshot, &ids);
            let mut record = ShortUrlRecord::new(id.clone(), item.original_url.as_str(), owner);
            record.correlation_id = item.correlation_id.clone();
            Entry::record(&record).encode_into(&mut buf)?;
            ids.push(id);
        }

        self.append(guard, snapshot.committed_len, buf).await?;
        debug!(count = ids.len(), owner = %owner, "appended short url batch");

        Ok(ids
            .into_iter()
            .zip(items)
            .map(|(id, item)| BatchEntry {
                id,
                correlation_id: item.correlation_id,
            })
            .collect())
    }

    async fn find_by_id(&self, id: &ShortId) -> Result<ShortUrlRecord> {
        self.load()
            .await?
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn find_by_original_url(&self, original_url: &str) -> Result<ShortId> {
        let snapshot = self.load().await?;
        let mut matching = snapshot
            .records
            .iter()
            .filter(|r| r.original_url == original_url);
        let first = matching.clone().next();
        matching
            .find(|r| r.is_active())
            .or(first)
            .map(|r| r.id.clone())
            .ok_or_else(|| StorageError::NotFound(original_url.to_string()))
    }

    async fn find_for_owner(&self, original_url: &str, owner: OwnerId) -> Result<ShortId> {
        self.load()
            .await?
            .active_for_owner(original_url, owner)
            .next()
            .map(|r| r.id.clone())
            .ok_or_else(|| StorageError::NotFound(original_url.to_string()))
    }

    async fn list_for_owner(&self, owner: OwnerId) -> Result<Vec<ShortUrlRecord>> {
        Ok(self
            .load()
            .await?
            .records
            .into_iter()
            .filter(|r| r.owner_id == owner && r.is_active())
            .collect())
    }

    async fn delete_locked(&self, ids: &[ShortId], owner: OwnerId) -> Result<()> {
        let guard = self.lock().await;
        let snapshot = self.load().await?;

        let mut buf = Vec::new();
        let mut deleted = 0usize;
        for id in ids {
            let owned = snapshot
                .get(id)
                .is_some_and(|r| r.owner_id == owner && r.is_active());
            if !owned {
                continue;
            }
            Entry::Deleted {
                id: id.clone(),
                owner_id: owner,
            }
            .encode_into(&mut buf)?;
            deleted += 1;
        }

        if deleted > 0 {
            self.append(guard, snapshot.committed_len, buf).await?;
        }
        debug!(requested = ids.len(), deleted, owner = %owner, "appended tombstones");
        Ok(())
    }

    async fn check_directory(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let metadata = tokio::fs::metadata(dir).await?;
        if !metadata.is_dir() {
            return Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(())
    }
}

/// Drops anything past `committed_len`, then appends `bytes` with a single
/// write. A failed write is truncated away again.
async fn write_at(path: &Path, committed_len: u64, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await?;

    let len = file.metadata().await?.len();
    if len > committed_len {
        warn!(
            path = %path.display(),
            discarded = len - committed_len,
            "discarding partial trailing entry"
        );
        file.set_len(committed_len).await?;
    }
    file.seek(SeekFrom::Start(committed_len)).await?;

    let written = match file.write_all(bytes).await {
        Ok(()) => file.sync_data().await,
        Err(err) => Err(err),
    };

    if let Err(err) = written {
        warn!(path = %path.display(), error = %err, "append failed, truncating");
        if let Err(truncate_err) = file.set_len(committed_len).await {
            warn!(error = %truncate_err, "failed to truncate after failed append");
        }
        return Err(err.into());
    }

    Ok(())
}

#[async_trait]
impl<G: Generator> Storage for FileStorage<G> {
    async fn add(&self, ctx: &Context, original_url: &str, owner: OwnerId) -> Result<ShortId> {
        ensure_storable(original_url)?;
        ctx.run(self.add_locked(original_url, owner)).await
    }

    async fn add_batch(
        &self,
        ctx: &Context,
        items: Vec<BatchItem>,
        owner: OwnerId,
    ) -> Result<Vec<BatchEntry>> {
        for item in &items {
            ensure_storable(&item.original_url)?;
        }
        ctx.run(self.add_batch_locked(items, owner)).await
    }

    async fn get_by_id(&self, ctx: &Context, id: &ShortId) -> Result<ShortUrlRecord> {
        ctx.run(self.find_by_id(id)).await
    }

    async fn get_by_original_url(&self, ctx: &Context, original_url: &str) -> Result<ShortId> {
        ctx.run(self.find_by_original_url(original_url)).await
    }

    async fn get_by_original_url_for_owner(
        &self,
        ctx: &Context,
        original_url: &str,
        owner: OwnerId,
    ) -> Result<ShortId> {
        ctx.run(self.find_for_owner(original_url, owner)).await
    }

    async fn get_urls_by_owner(
        &self,
        ctx: &Context,
        owner: OwnerId,
    ) -> Result<Vec<ShortUrlRecord>> {
        ctx.run(self.list_for_owner(owner)).await
    }

    async fn delete_urls(&self, ctx: &Context, ids: &[ShortId], owner: OwnerId) -> Result<()> {
        ctx.run(self.delete_locked(ids, owner)).await
    }

    async fn ping(&self, ctx: &Context) -> Result<()> {
        ctx.run(self.check_directory()).await
    }
}
