use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use skein_storage::traits::BlockStore;
use skein_types::error::TypeError;
use skein_types::ledger::{Block, Entry, Storage};
use skein_types::network::LedgerMessage;
use skein_types::primitives::{duration_millis, BlockIndex, Timestamp};

use crate::block::{build_block, remove_expired, verify_block};
use crate::clock::{Clock, SystemClock};
use crate::error::LedgerError;
use crate::gossip::Gossip;

/// Consecutive publish failures after which they are logged as warnings.
const PUBLISH_WARN_AFTER: u32 = 3;

/// Result of merging a block received from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The block became the local head.
    Accepted,
    /// The local head already orders at or after the block.
    Stale,
}

/// The local replica of the shared ledger.
///
/// Reads are served from the current head without taking the commit lock.
/// Every write (local commit or remote merge) goes through `commit_lock`, so
/// at most one "read head, propose next" step runs at a time in this process.
pub struct Ledger {
    origin: String,
    store: Arc<dyn BlockStore>,
    gossip: Option<Arc<dyn Gossip>>,
    clock: Arc<dyn Clock>,
    head: RwLock<Arc<Block>>,
    commit_lock: Mutex<()>,
    publish_failures: AtomicU32,
}

impl Ledger {
    /// Open a ledger over `store`, resuming from its last block if any.
    pub fn new(origin: impl Into<String>, store: Arc<dyn BlockStore>) -> Result<Self, LedgerError> {
        let head = match store.last()? {
            Some(block) => block,
            None => Arc::new(Block::genesis()),
        };
        Ok(Self {
            origin: origin.into(),
            store,
            gossip: None,
            clock: Arc::new(SystemClock),
            head: RwLock::new(head),
            commit_lock: Mutex::new(()),
            publish_failures: AtomicU32::new(0),
        })
    }

    /// Disseminate committed blocks through `gossip`.
    pub fn with_gossip(mut self, gossip: Arc<dyn Gossip>) -> Self {
        self.gossip = Some(gossip);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Identity stamped on blocks committed by this replica.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ─── Writes ──────────────────────────────────────────────────────────────

    /// Set `bucket/key` to `value`, expiring `ttl` after the write.
    ///
    /// The new block is committed locally and then published to peers. Fails
    /// with [`LedgerError::Timeout`] if the commit cannot start within
    /// `write_timeout`; in that case nothing is committed.
    pub async fn persist(
        &self,
        write_timeout: Duration,
        ttl: Duration,
        bucket: &str,
        key: &str,
        value: &str,
    ) -> Result<Arc<Block>, LedgerError> {
        if bucket.is_empty() {
            return Err(TypeError::EmptyBucket.into());
        }

        let committed = self
            .commit(write_timeout, |storage, now| {
                let entry = Entry {
                    value: value.to_string(),
                    last_updated: now,
                    expires_at: Some(now.saturating_add(duration_millis(ttl))),
                };
                storage
                    .entry(bucket.to_string())
                    .or_default()
                    .insert(key.to_string(), entry);
                true
            })
            .await?;

        // The mutation above always reports a change.
        Ok(committed.unwrap_or_else(|| self.last_block()))
    }

    /// Remove `bucket/key`. Returns whether a block was committed.
    pub async fn delete(
        &self,
        write_timeout: Duration,
        bucket: &str,
        key: &str,
    ) -> Result<bool, LedgerError> {
        let committed = self
            .commit(write_timeout, |storage, _| {
                let Some(entries) = storage.get_mut(bucket) else {
                    return false;
                };
                let removed = entries.remove(key).is_some();
                if entries.is_empty() {
                    storage.remove(bucket);
                }
                removed
            })
            .await?;
        Ok(committed.is_some())
    }

    /// Remove a whole bucket. Returns whether a block was committed.
    pub async fn delete_bucket(
        &self,
        write_timeout: Duration,
        bucket: &str,
    ) -> Result<bool, LedgerError> {
        let committed = self
            .commit(write_timeout, |storage, _| storage.remove(bucket).is_some())
            .await?;
        Ok(committed.is_some())
    }

    /// Physically remove every entry whose expiry has passed.
    ///
    /// Commits a new block only when something was removed. Returns the
    /// number of entries removed.
    pub async fn scrub(&self, write_timeout: Duration) -> Result<usize, LedgerError> {
        let mut removed = 0;
        let committed = self
            .commit(write_timeout, |storage, now| {
                removed = remove_expired(storage, now);
                removed > 0
            })
            .await?;
        if let Some(block) = committed {
            debug!(index = block.index, removed, "scrubbed expired entries");
        }
        Ok(removed)
    }

    /// Serialized commit path shared by every local write.
    ///
    /// `mutate` receives a copy of the head's storage and the commit time and
    /// returns whether it changed anything. The deadline covers waiting for
    /// the commit lock and the best-effort publish that follows the commit.
    async fn commit<F>(
        &self,
        write_timeout: Duration,
        mutate: F,
    ) -> Result<Option<Arc<Block>>, LedgerError>
    where
        F: FnOnce(&mut Storage, Timestamp) -> bool + Send,
    {
        let deadline = Instant::now() + write_timeout;
        let guard = tokio::time::timeout_at(deadline, self.commit_lock.lock())
            .await
            .map_err(|_| LedgerError::Timeout {
                timeout: write_timeout,
            })?;

        let head = self.last_block();
        let now = self.clock.now();
        let mut storage = head.storage.clone();
        if !mutate(&mut storage, now) {
            return Ok(None);
        }

        let block = Arc::new(build_block(&head, storage, &self.origin, now)?);
        self.store.append(block.clone())?;
        self.set_head(block.clone());
        drop(guard);

        self.publish(LedgerMessage::Block((*block).clone()), deadline)
            .await;
        Ok(Some(block))
    }

    /// Re-announce the current head so late joiners converge.
    pub async fn announce(&self, timeout: Duration) {
        let head = self.last_block();
        if head.index == 0 {
            return;
        }
        let message = LedgerMessage::Sync {
            block: (*head).clone(),
            sent_at: self.clock.now(),
        };
        self.publish(message, Instant::now() + timeout).await;
    }

    async fn publish(&self, message: LedgerMessage, deadline: Instant) {
        let Some(gossip) = &self.gossip else {
            return;
        };
        let index = message.block().index;
        let reason = match tokio::time::timeout_at(deadline, gossip.publish(message)).await {
            Ok(Ok(())) => {
                self.publish_failures.store(0, Ordering::Relaxed);
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "timed out".to_string(),
        };
        // A single miss is repaired by the next sync announcement. A streak
        // means peers stopped receiving this replica.
        let failures = self.publish_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= PUBLISH_WARN_AFTER {
            warn!(index, failures, "ledger publish keeps failing: {reason}");
        } else {
            debug!(index, failures, "ledger publish failed: {reason}");
        }
    }

    /// Publishes that failed in a row since the last success.
    pub fn publish_failures(&self) -> u32 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    // ─── Merge ───────────────────────────────────────────────────────────────

    /// Merge a block received from a peer.
    ///
    /// The block replaces the local head iff it orders strictly after it by
    /// `(index, origin, hash)`. Every replica applies the same rule, so
    /// concurrent commits at one index converge on a single winner.
    pub async fn merge(&self, block: Block) -> Result<MergeOutcome, LedgerError> {
        verify_block(&block)?;

        let _guard = self.commit_lock.lock().await;
        let head = self.last_block();
        if !block.supersedes(&head) {
            return Ok(MergeOutcome::Stale);
        }

        if block.index == head.index {
            info!(
                index = block.index,
                origin = %block.origin,
                replaced = %head.origin,
                "concurrent commit resolved by tie-break"
            );
        }

        let block = Arc::new(block);
        self.store.append(block.clone())?;
        self.set_head(block);
        Ok(MergeOutcome::Accepted)
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    /// The highest block known locally.
    pub fn last_block(&self) -> Arc<Block> {
        self.head
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn index(&self) -> BlockIndex {
        self.last_block().index
    }

    /// Every live value in `bucket`.
    pub fn current_data(&self, bucket: &str) -> BTreeMap<String, String> {
        self.current_entries(bucket)
            .into_iter()
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }

    /// Every live entry in `bucket`, with its timestamps.
    pub fn current_entries(&self, bucket: &str) -> BTreeMap<String, Entry> {
        let now = self.clock.now();
        let head = self.last_block();
        head.bucket(bucket)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, entry)| !entry.is_expired(now))
                    .map(|(key, entry)| (key.clone(), entry.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The live value stored at `bucket/key`.
    pub fn get_key(&self, bucket: &str, key: &str) -> Option<String> {
        let now = self.clock.now();
        self.last_block()
            .entry(bucket, key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Whether any live value in `bucket` satisfies `predicate`.
    pub fn exists(&self, bucket: &str, predicate: impl Fn(&str) -> bool) -> bool {
        let now = self.clock.now();
        self.last_block()
            .bucket(bucket)
            .map(|entries| {
                entries
                    .values()
                    .any(|entry| !entry.is_expired(now) && predicate(&entry.value))
            })
            .unwrap_or(false)
    }

    fn set_head(&self, block: Arc<Block>) {
        let mut head = self.head.write().unwrap_or_else(PoisonError::into_inner);
        if block.index < head.index {
            warn!(
                index = block.index,
                head = head.index,
                "refusing to move ledger head backwards"
            );
            return;
        }
        *head = block;
    }
}
