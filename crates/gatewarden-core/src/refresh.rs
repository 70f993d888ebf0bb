//! The refresh cycle: merge sources, compare digests, swap the snapshot.
//!
//! One cycle runs the merge pipeline, compares the candidate's content
//! digest against the served snapshot's, and replaces the snapshot only when
//! they differ — an unchanged candidate costs no write-lock window. Cross-
//! instance exclusion is not handled here: the scheduler acquires and
//! releases the refresh lock around this cycle via the job's lock
//! requirement.

use std::time::Instant;

use gatewarden_types::Result;

use crate::{
    cache::{digest_of, SnapshotCache},
    merge::MergePipeline,
    metrics,
};

/// Executes refresh cycles against a shared snapshot cache.
pub struct Refresher {
    pipeline: MergePipeline,
    cache: SnapshotCache,
}

impl Refresher {
    pub fn new(pipeline: MergePipeline, cache: SnapshotCache) -> Self {
        Self { pipeline, cache }
    }

    /// The cache this refresher writes to.
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Run one refresh cycle.
    ///
    /// # Errors
    ///
    /// Propagates pipeline failures; the served snapshot is left untouched
    /// in that case.
    pub async fn run_cycle(&self) -> Result<()> {
        let started = Instant::now();

        let entries = match self.pipeline.run().await {
            Ok(entries) => entries,
            Err(e) => {
                metrics::record_refresh("failed", started.elapsed().as_secs_f64());
                return Err(e);
            },
        };

        let candidate = digest_of(&entries);
        if candidate == self.cache.digest().await {
            metrics::record_refresh("unchanged", started.elapsed().as_secs_f64());
            tracing::debug!(
                policy = %self.pipeline.policy(),
                digest = %candidate,
                "Refresh produced an unchanged allowlist, keeping served snapshot"
            );
            return Ok(());
        }

        let stats = self.cache.set(&entries).await;
        metrics::record_refresh("changed", started.elapsed().as_secs_f64());
        metrics::record_dropped_entries(stats.dropped);
        metrics::set_allowlist_size(stats.kept);

        tracing::info!(
            policy = %self.pipeline.policy(),
            kept = stats.kept,
            dropped = stats.dropped,
            digest = %candidate,
            "Allowlist snapshot replaced"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{io::Write, sync::Arc};

    use async_trait::async_trait;
    use axum::{routing::get, Router};
    use gatewarden_types::{AllowListEntry, Error};
    use tokio::sync::Mutex;

    use super::*;
    use crate::{
        merge::MergePolicy,
        source::{EntrySource, LocalFileSource, RemoteSource},
    };

    struct ScriptedSource {
        responses: Mutex<Vec<Result<Vec<AllowListEntry>>>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Vec<AllowListEntry>>>) -> Arc<Self> {
            let mut responses = responses;
            responses.reverse();
            Arc::new(Self { responses: Mutex::new(responses) })
        }
    }

    #[async_trait]
    impl EntrySource for ScriptedSource {
        async fn fetch(&self) -> Result<Vec<AllowListEntry>> {
            self.responses
                .lock()
                .await
                .pop()
                .unwrap_or_else(|| Err(Error::source("script exhausted")))
        }

        fn label(&self) -> &'static str {
            "scripted"
        }
    }

    fn entry(phone: &str, mail: &str) -> AllowListEntry {
        AllowListEntry::builder().phone(phone).mail(mail).build()
    }

    fn empty_source() -> Arc<dyn EntrySource> {
        ScriptedSource::new(vec![Ok(vec![]), Ok(vec![]), Ok(vec![])])
    }

    #[tokio::test]
    async fn changed_candidate_replaces_snapshot() {
        let remote = ScriptedSource::new(vec![Ok(vec![entry("1", "")])]);
        let pipeline = MergePipeline::new(MergePolicy::RemoteFirst, empty_source(), remote);
        let refresher = Refresher::new(pipeline, SnapshotCache::new());

        refresher.run_cycle().await.unwrap();
        assert_eq!(refresher.cache().len().await, 1);
    }

    #[tokio::test]
    async fn unchanged_candidate_keeps_served_snapshot() {
        let remote = ScriptedSource::new(vec![
            Ok(vec![entry("1", "")]),
            // Same entries, different arrival order after dedup: identical digest
            Ok(vec![entry("1", ""), entry("1", "shadowed@x.com")]),
        ]);
        let pipeline = MergePipeline::new(MergePolicy::RemoteFirst, empty_source(), remote);
        let refresher = Refresher::new(pipeline, SnapshotCache::new());

        refresher.run_cycle().await.unwrap();
        let digest = refresher.cache().digest().await;

        refresher.run_cycle().await.unwrap();
        assert_eq!(refresher.cache().digest().await, digest);
        assert_eq!(refresher.cache().len().await, 1);
    }

    #[tokio::test]
    async fn failed_cycle_leaves_snapshot_untouched() {
        let remote = ScriptedSource::new(vec![Ok(vec![entry("1", "")]), Err(Error::source("down"))]);
        let pipeline = MergePipeline::new(MergePolicy::RemoteFirst, empty_source(), remote);
        let refresher = Refresher::new(pipeline, SnapshotCache::new());

        refresher.run_cycle().await.unwrap();
        assert_eq!(refresher.cache().len().await, 1);

        assert!(refresher.run_cycle().await.is_err());
        assert_eq!(refresher.cache().len().await, 1, "served data survives a failed cycle");
        assert!(refresher.cache().get_by_phone("1").await.is_some());
    }

    #[tokio::test]
    async fn end_to_end_remote_first_over_file_and_http() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"phone":"1"}}]"#).unwrap();

        let router = Router::new().route(
            "/allowlist",
            get(|| async { r#"[{"phone":"1","mail":"a@x.com"},{"phone":"2"}]"# }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let local: Arc<dyn EntrySource> = Arc::new(LocalFileSource::new(file.path()));
        let remote: Arc<dyn EntrySource> =
            Arc::new(RemoteSource::new(format!("http://{addr}/allowlist"), None).unwrap());
        let pipeline = MergePipeline::new(MergePolicy::RemoteFirst, local, remote);
        let refresher = Refresher::new(pipeline, SnapshotCache::new());

        refresher.run_cycle().await.unwrap();

        // Remote entries first; the local duplicate of "1" contributes nothing
        let served = refresher.cache().get_all().await;
        assert_eq!(served.len(), 2);
        assert_eq!(served[0].phone, "1");
        assert_eq!(served[0].mail, "a@x.com");
        assert_eq!(served[1].phone, "2");
    }
}
