//! Multi-source merge pipeline.
//!
//! Reconciles the local file and the remote authority into one ordered,
//! deduplicated entry list under a selectable failure-tolerance policy. The
//! priority source seeds the result; the secondary source contributes only
//! entries whose dedup key is not already present, in its own relative
//! order. Within a single source, first-seen-wins on key collisions.
//!
//! A fetch failure is fatal to the cycle unless the policy is tolerant, in
//! which case the pipeline degrades to the surviving source alone.

use std::{collections::HashSet, sync::Arc};

use gatewarden_types::{AllowListEntry, Result};

use crate::source::EntrySource;

/// Which source wins on dedup-key conflicts, and whether a fetch failure
/// degrades or aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum MergePolicy {
    RemoteFirst,
    RemoteFirstTolerant,
    LocalFirst,
    LocalFirstTolerant,
    RemoteOnly,
    LocalOnly,
}

impl MergePolicy {
    /// Whether the remote source is consulted at all.
    pub fn uses_remote(self) -> bool {
        !matches!(self, Self::LocalOnly)
    }

    fn tolerant(self) -> bool {
        matches!(self, Self::RemoteFirstTolerant | Self::LocalFirstTolerant)
    }

    fn remote_priority(self) -> bool {
        matches!(self, Self::RemoteFirst | Self::RemoteFirstTolerant | Self::RemoteOnly)
    }

    fn single_source(self) -> bool {
        matches!(self, Self::RemoteOnly | Self::LocalOnly)
    }
}

/// Merge pipeline over one local and one remote source.
pub struct MergePipeline {
    policy: MergePolicy,
    local: Arc<dyn EntrySource>,
    remote: Arc<dyn EntrySource>,
}

impl MergePipeline {
    pub fn new(
        policy: MergePolicy,
        local: Arc<dyn EntrySource>,
        remote: Arc<dyn EntrySource>,
    ) -> Self {
        Self { policy, local, remote }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Run one merge cycle and produce the candidate entry list.
    ///
    /// # Errors
    ///
    /// Propagates a fetch failure when the policy is not tolerant; a
    /// tolerant policy degrades to the surviving source and only fails when
    /// both sources do.
    pub async fn run(&self) -> Result<Vec<AllowListEntry>> {
        let (priority, secondary) = if self.policy.remote_priority() {
            (&self.remote, &self.local)
        } else {
            (&self.local, &self.remote)
        };

        if self.policy.single_source() {
            return Ok(merge_ordered(priority.fetch().await?, Vec::new()));
        }

        match priority.fetch().await {
            Ok(first) => {
                let second = match secondary.fetch().await {
                    Ok(second) => second,
                    Err(e) if self.policy.tolerant() => {
                        tracing::warn!(
                            source = secondary.label(),
                            error = %e,
                            "Secondary source failed, proceeding with priority source only"
                        );
                        Vec::new()
                    },
                    Err(e) => return Err(e),
                };
                Ok(merge_ordered(first, second))
            },
            Err(e) if self.policy.tolerant() => {
                tracing::warn!(
                    source = priority.label(),
                    error = %e,
                    "Priority source failed, falling back to secondary source"
                );
                Ok(merge_ordered(secondary.fetch().await?, Vec::new()))
            },
            Err(e) => Err(e),
        }
    }
}

/// Normalize and deduplicate: the priority list seeds the result, the
/// secondary list appends only unseen dedup keys, order preserved within
/// each list.
fn merge_ordered(
    priority: Vec<AllowListEntry>,
    secondary: Vec<AllowListEntry>,
) -> Vec<AllowListEntry> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(priority.len() + secondary.len());

    for entry in priority.into_iter().chain(secondary) {
        let entry = entry.normalized();
        if seen.insert(entry.dedup_key()) {
            merged.push(entry);
        }
    }
    merged
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;
    use gatewarden_types::Error;

    use super::*;

    struct FixedSource {
        entries: Option<Vec<AllowListEntry>>,
        label: &'static str,
    }

    impl FixedSource {
        fn ok(label: &'static str, entries: Vec<AllowListEntry>) -> Arc<dyn EntrySource> {
            Arc::new(Self { entries: Some(entries), label })
        }

        fn failing(label: &'static str) -> Arc<dyn EntrySource> {
            Arc::new(Self { entries: None, label })
        }
    }

    #[async_trait]
    impl EntrySource for FixedSource {
        async fn fetch(&self) -> Result<Vec<AllowListEntry>> {
            self.entries
                .clone()
                .ok_or_else(|| Error::source(format!("{} source unavailable", self.label)))
        }

        fn label(&self) -> &'static str {
            self.label
        }
    }

    fn entry(phone: &str, mail: &str) -> AllowListEntry {
        AllowListEntry::builder().phone(phone).mail(mail).build()
    }

    fn phones(entries: &[AllowListEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.phone.as_str()).collect()
    }

    // ── Priority & dedup ─────────────────────────────────────────────

    #[tokio::test]
    async fn remote_first_remote_entries_win_collisions() {
        let local = FixedSource::ok("local", vec![entry("1", ""), entry("9", "")]);
        let remote = FixedSource::ok("remote", vec![entry("1", "a@x.com"), entry("2", "")]);

        let merged = MergePipeline::new(MergePolicy::RemoteFirst, local, remote).run().await.unwrap();

        // Remote entries first in their order, then unseen local entries
        assert_eq!(phones(&merged), vec!["1", "2", "9"]);
        assert_eq!(merged[0].mail, "a@x.com", "remote fields retained on collision");
    }

    #[tokio::test]
    async fn local_first_local_entries_win_collisions() {
        let local = FixedSource::ok("local", vec![entry("1", "local@x.com")]);
        let remote = FixedSource::ok("remote", vec![entry("1", "remote@x.com"), entry("2", "")]);

        let merged = MergePipeline::new(MergePolicy::LocalFirst, local, remote).run().await.unwrap();

        assert_eq!(phones(&merged), vec!["1", "2"]);
        assert_eq!(merged[0].mail, "local@x.com");
    }

    #[tokio::test]
    async fn first_seen_wins_within_one_source() {
        let local = FixedSource::ok("local", vec![]);
        let remote =
            FixedSource::ok("remote", vec![entry("1", "first@x.com"), entry("1", "second@x.com")]);

        let merged = MergePipeline::new(MergePolicy::RemoteFirst, local, remote).run().await.unwrap();

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].mail, "first@x.com");
    }

    #[tokio::test]
    async fn entries_are_normalized_before_placement() {
        let local = FixedSource::ok("local", vec![]);
        let remote = FixedSource::ok("remote", vec![entry(" 1 ", " A@X.COM ")]);

        let merged = MergePipeline::new(MergePolicy::RemoteFirst, local, remote).run().await.unwrap();

        assert_eq!(merged[0].phone, "1");
        assert_eq!(merged[0].mail, "a@x.com");
        assert_eq!(merged[0].status, "active");
        assert!(!merged[0].user_id.is_empty());
    }

    #[tokio::test]
    async fn dedup_spans_sources_via_mail_key() {
        // Same identity via mail on both sides, differing case
        let local = FixedSource::ok("local", vec![entry("", "A@X.com")]);
        let remote = FixedSource::ok("remote", vec![entry("", "a@x.com")]);

        let merged = MergePipeline::new(MergePolicy::RemoteFirst, local, remote).run().await.unwrap();
        assert_eq!(merged.len(), 1);
    }

    // ── Tolerance ────────────────────────────────────────────────────

    #[tokio::test]
    async fn non_tolerant_priority_failure_aborts() {
        let local = FixedSource::ok("local", vec![entry("1", "")]);
        let remote = FixedSource::failing("remote");

        let result = MergePipeline::new(MergePolicy::RemoteFirst, local, remote).run().await;
        assert!(result.is_err(), "non-tolerant remote-first must fail the cycle");
    }

    #[tokio::test]
    async fn tolerant_priority_failure_falls_back_to_secondary() {
        let local = FixedSource::ok("local", vec![entry("1", ""), entry("2", "")]);
        let remote = FixedSource::failing("remote");

        let merged = MergePipeline::new(MergePolicy::RemoteFirstTolerant, local, remote)
            .run()
            .await
            .unwrap();

        // Equals the local-only parse of the same local source
        assert_eq!(phones(&merged), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn tolerant_secondary_failure_degrades_to_priority() {
        let local = FixedSource::failing("local");
        let remote = FixedSource::ok("remote", vec![entry("1", "")]);

        let merged = MergePipeline::new(MergePolicy::RemoteFirstTolerant, local, remote)
            .run()
            .await
            .unwrap();
        assert_eq!(phones(&merged), vec!["1"]);
    }

    #[tokio::test]
    async fn tolerant_both_failing_still_errors() {
        let local = FixedSource::failing("local");
        let remote = FixedSource::failing("remote");

        let result =
            MergePipeline::new(MergePolicy::LocalFirstTolerant, local, remote).run().await;
        assert!(result.is_err());
    }

    // ── Single-source policies ───────────────────────────────────────

    #[tokio::test]
    async fn remote_only_ignores_local() {
        let local = FixedSource::ok("local", vec![entry("9", "")]);
        let remote = FixedSource::ok("remote", vec![entry("1", "")]);

        let merged = MergePipeline::new(MergePolicy::RemoteOnly, local, remote).run().await.unwrap();
        assert_eq!(phones(&merged), vec!["1"]);
    }

    #[tokio::test]
    async fn local_only_never_touches_remote() {
        let local = FixedSource::ok("local", vec![entry("9", "")]);
        let remote = FixedSource::failing("remote");

        let merged = MergePipeline::new(MergePolicy::LocalOnly, local, remote).run().await.unwrap();
        assert_eq!(phones(&merged), vec!["9"]);
    }
}
