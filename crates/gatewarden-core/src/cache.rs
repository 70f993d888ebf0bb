//! Concurrent snapshot cache for the served allowlist.
//!
//! Holds exactly one current, consistent allowlist view. Readers (request
//! handlers) share a read lock and never block each other; the refresh job's
//! worker takes the write lock only for the duration of a wholesale snapshot
//! replacement. All read operations copy data out — callers never receive a
//! reference into live state, so a concurrent rebuild cannot race with
//! iteration and callers cannot corrupt the snapshot.

use std::{collections::HashMap, sync::Arc};

use gatewarden_types::AllowListEntry;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// The materialized served state: insertion-ordered entries, three indexes,
/// and a content digest.
#[derive(Debug, Default)]
struct Snapshot {
    /// Dedup keys in insertion order.
    order: Vec<String>,
    /// Dedup key → entry.
    by_key: HashMap<String, AllowListEntry>,
    /// Lower-cased mail → dedup key.
    by_mail: HashMap<String, String>,
    /// User id → dedup key.
    by_user_id: HashMap<String, String>,
    /// Order-independent content digest over the retained entries.
    digest: String,
}

/// Outcome of a snapshot rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildStats {
    /// Entries retained in the new snapshot.
    pub kept: usize,
    /// Entries dropped for violating the identity invariant.
    pub dropped: usize,
}

/// Build a snapshot from candidate entries.
///
/// Normalizes every entry, silently drops those violating the identity
/// invariant (phone and mail both empty), keeps the first entry seen per
/// dedup key, and computes the content digest over the retained set sorted
/// by dedup key — so semantically identical sets hash identically regardless
/// of fetch or arrival order.
fn build_snapshot(entries: &[AllowListEntry]) -> (Snapshot, RebuildStats) {
    let mut snapshot = Snapshot::default();
    let mut dropped = 0usize;

    for entry in entries {
        let entry = entry.normalized();
        if !entry.is_valid() {
            dropped += 1;
            continue;
        }
        let key = entry.dedup_key();
        if snapshot.by_key.contains_key(&key) {
            continue;
        }
        if !entry.mail.is_empty() {
            snapshot.by_mail.insert(entry.mail.clone(), key.clone());
        }
        if !entry.user_id.is_empty() {
            snapshot.by_user_id.insert(entry.user_id.clone(), key.clone());
        }
        snapshot.order.push(key.clone());
        snapshot.by_key.insert(key, entry);
    }

    snapshot.digest = digest_snapshot(&snapshot);
    let kept = snapshot.order.len();
    (snapshot, RebuildStats { kept, dropped })
}

fn digest_snapshot(snapshot: &Snapshot) -> String {
    let mut keys: Vec<&String> = snapshot.by_key.keys().collect();
    keys.sort();

    let mut hasher = Sha256::new();
    for key in keys {
        // by_key is only populated from order, so the entry is present
        if let Some(entry) = snapshot.by_key.get(key) {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            // Canonical JSON of the entry; struct field order is fixed
            if let Ok(bytes) = serde_json::to_vec(entry) {
                hasher.update(&bytes);
            }
            hasher.update([0u8]);
        }
    }
    hex::encode(hasher.finalize())
}

/// Compute the content digest a [`SnapshotCache::set`] of these entries
/// would produce, without touching any cache.
///
/// Lets the refresh cycle decide in constant time whether a fetched
/// candidate actually differs from what is already served, avoiding an
/// unnecessary replace and its write-lock window.
pub fn digest_of(entries: &[AllowListEntry]) -> String {
    build_snapshot(entries).0.digest
}

/// Concurrent snapshot cache serving allowlist lookups.
///
/// Created empty at process start; replaced wholesale — never patched — on
/// each successful refresh. Cheap to clone (shared state).
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    inner: Arc<RwLock<Snapshot>>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        let (snapshot, _) = build_snapshot(&[]);
        Self { inner: Arc::new(RwLock::new(snapshot)) }
    }

    /// Atomically replace the served snapshot with one rebuilt from
    /// `entries`.
    ///
    /// Invalid entries are dropped (counted in the returned stats), indexes
    /// and the digest are rebuilt in one pass, and the swap happens under
    /// the write lock so readers observe either the old or the new snapshot,
    /// never a mix.
    pub async fn set(&self, entries: &[AllowListEntry]) -> RebuildStats {
        let (snapshot, stats) = build_snapshot(entries);
        let mut guard = self.inner.write().await;
        *guard = snapshot;
        stats
    }

    /// Return an independent copy of all entries in insertion order.
    pub async fn get_all(&self) -> Vec<AllowListEntry> {
        let guard = self.inner.read().await;
        guard
            .order
            .iter()
            .filter_map(|key| guard.by_key.get(key))
            .cloned()
            .collect()
    }

    /// Return a bounded copy of entries, in insertion order, starting at
    /// `offset` and containing at most `limit` entries.
    pub async fn iterate(&self, offset: usize, limit: usize) -> Vec<AllowListEntry> {
        let guard = self.inner.read().await;
        guard
            .order
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|key| guard.by_key.get(key))
            .cloned()
            .collect()
    }

    /// Look up an entry by phone number.
    ///
    /// Matches only entries whose phone field equals the query — a mail-only
    /// entry is never returned from a phone lookup even though its dedup key
    /// could textually collide.
    pub async fn get_by_phone(&self, phone: &str) -> Option<AllowListEntry> {
        let phone = phone.trim();
        if phone.is_empty() {
            return None;
        }
        let guard = self.inner.read().await;
        guard.by_key.get(phone).filter(|entry| entry.phone == phone).cloned()
    }

    /// Look up an entry by mail address (case-insensitive).
    pub async fn get_by_mail(&self, mail: &str) -> Option<AllowListEntry> {
        let mail = mail.trim().to_lowercase();
        if mail.is_empty() {
            return None;
        }
        let guard = self.inner.read().await;
        let key = guard.by_mail.get(&mail)?;
        guard.by_key.get(key).cloned()
    }

    /// Look up an entry by user id.
    pub async fn get_by_user_id(&self, user_id: &str) -> Option<AllowListEntry> {
        let guard = self.inner.read().await;
        let key = guard.by_user_id.get(user_id.trim())?;
        guard.by_key.get(key).cloned()
    }

    /// The content digest of the currently served snapshot.
    pub async fn digest(&self) -> String {
        self.inner.read().await.digest.clone()
    }

    /// Number of served entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    /// Whether the cache currently serves no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use gatewarden_types::derive_user_id;

    use super::*;

    fn entry(phone: &str, mail: &str) -> AllowListEntry {
        AllowListEntry::builder().phone(phone).mail(mail).build()
    }

    #[tokio::test]
    async fn starts_empty_with_stable_digest() {
        let cache = SnapshotCache::new();
        assert_eq!(cache.len().await, 0);
        assert!(cache.is_empty().await);
        assert_eq!(cache.digest().await, SnapshotCache::new().digest().await);
    }

    #[tokio::test]
    async fn set_replaces_wholesale_and_changes_digest() {
        let cache = SnapshotCache::new();
        let empty_digest = cache.digest().await;

        let stats = cache.set(&[entry("1", ""), entry("2", "")]).await;
        assert_eq!(stats, RebuildStats { kept: 2, dropped: 0 });
        assert_eq!(cache.len().await, 2);
        assert_ne!(cache.digest().await, empty_digest);

        // Full replacement, not a patch
        cache.set(&[entry("3", "")]).await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.get_by_phone("1").await.is_none());
        assert!(cache.get_by_phone("3").await.is_some());
    }

    #[tokio::test]
    async fn digest_is_order_independent() {
        let cache_a = SnapshotCache::new();
        let cache_b = SnapshotCache::new();

        let a = entry("1", "a@x.com");
        let b = entry("2", "b@x.com");

        cache_a.set(&[a.clone(), b.clone()]).await;
        cache_b.set(&[b, a]).await;

        assert_eq!(cache_a.digest().await, cache_b.digest().await);
    }

    #[tokio::test]
    async fn digest_of_matches_set_digest() {
        let cache = SnapshotCache::new();
        let entries = vec![entry("1", "a@x.com"), entry("", "b@x.com")];
        let precomputed = digest_of(&entries);
        cache.set(&entries).await;
        assert_eq!(cache.digest().await, precomputed);
    }

    #[tokio::test]
    async fn invalid_entries_are_dropped_with_count() {
        let cache = SnapshotCache::new();
        let stats = cache
            .set(&[entry("1", ""), entry("", ""), entry("  ", "  ")])
            .await;
        assert_eq!(stats, RebuildStats { kept: 1, dropped: 2 });
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn mail_only_entry_absent_from_phone_lookup() {
        let cache = SnapshotCache::new();
        cache.set(&[entry("", "A@X.com")]).await;

        assert!(cache.get_by_mail("a@x.com").await.is_some());
        assert!(cache.get_by_mail(" A@X.COM ").await.is_some());
        // The dedup key is the mail, but a phone lookup must not match it
        assert!(cache.get_by_phone("a@x.com").await.is_none());
    }

    #[tokio::test]
    async fn user_id_lookup_uses_derived_id() {
        let cache = SnapshotCache::new();
        cache.set(&[entry("123", "")]).await;

        let derived = derive_user_id("123");
        let found = cache.get_by_user_id(&derived).await.unwrap();
        assert_eq!(found.phone, "123");
    }

    #[tokio::test]
    async fn first_seen_wins_on_duplicate_keys() {
        let cache = SnapshotCache::new();
        let mut first = entry("1", "first@x.com");
        first.role = "admin".to_string();
        let second = entry("1", "second@x.com");

        cache.set(&[first, second]).await;

        assert_eq!(cache.len().await, 1);
        let kept = cache.get_by_phone("1").await.unwrap();
        assert_eq!(kept.mail, "first@x.com");
        assert_eq!(kept.role, "admin");
    }

    #[tokio::test]
    async fn reads_return_independent_copies() {
        let cache = SnapshotCache::new();
        cache.set(&[entry("1", "")]).await;

        let mut copy = cache.get_all().await;
        copy[0].status = "tampered".to_string();

        let served = cache.get_by_phone("1").await.unwrap();
        assert_eq!(served.status, "active");
    }

    #[tokio::test]
    async fn iterate_is_bounded_and_ordered() {
        let cache = SnapshotCache::new();
        cache.set(&[entry("1", ""), entry("2", ""), entry("3", "")]).await;

        let page = cache.iterate(1, 1).await;
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].phone, "2");

        let tail = cache.iterate(2, 10).await;
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].phone, "3");

        assert!(cache.iterate(99, 10).await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_readers_during_replace() {
        let cache = SnapshotCache::new();
        cache.set(&[entry("1", "")]).await;

        let mut readers = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let all = cache.get_all().await;
                    // Always a consistent snapshot: 1 or 2 entries, never torn
                    assert!(all.len() == 1 || all.len() == 2);
                }
            }));
        }

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    cache.set(&[entry("1", ""), entry("2", "")]).await;
                    cache.set(&[entry("1", "")]).await;
                }
            })
        };

        for handle in readers {
            handle.await.unwrap();
        }
        writer.await.unwrap();
    }
}
