use std::{collections::BTreeMap, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use tokio::time;
use tracing::{error, info};
use uuid::Uuid;

use super::{archive_key, SharedArchiveStore};
use crate::{db, transform::CleanedReading};

/// Moves readings older than the live window out of the database and into
/// the per-day archive objects.
pub struct ArchiveService {
    pool: PgPool,
    store: SharedArchiveStore,
    window: chrono::Duration,
    interval: Duration,
}

impl ArchiveService {
    pub fn new(
        pool: PgPool,
        store: SharedArchiveStore,
        window: chrono::Duration,
        interval_secs: u64,
    ) -> Self {
        Self {
            pool,
            store,
            window,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Runs the archive loop indefinitely.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            window_hours = self.window.num_hours(),
            "Archive loop started"
        );
        let mut ticker = time::interval(self.interval);

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_once().await {
                error!(error = %e, "Archive iteration failed");
            }
        }
    }

    /// Archive everything loaded before `now - window`. Each day's rows are
    /// appended to that day's object. Their deletion from the live store runs
    /// in a transaction that commits only after the object is saved, so a
    /// failed save leaves them in place for the next run. Returns the number
    /// of readings moved.
    ///
    /// Delivery is at-least-once: if the commit itself fails after a
    /// successful save, the next run appends the same rows again.
    pub async fn run_once(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.window;
        let expired = db::expired_readings(&self.pool, cutoff).await?;

        if expired.is_empty() {
            info!(cutoff = %cutoff, "No readings due for archiving");
            return Ok(0);
        }

        let mut by_key: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for r in expired {
            by_key
                .entry(archive_key(r.loaded_at.date_naive()))
                .or_default()
                .push(r);
        }

        let mut moved = 0;
        for (key, rows) in by_key {
            let ids: Vec<Uuid> = rows.iter().map(|r| r.reading_id).collect();

            let mut tx = self
                .pool
                .begin()
                .await
                .context("failed to open archive transaction")?;
            let deleted = db::delete_readings(&mut *tx, &ids).await?;

            let mut archived = self.store.load(&key).await?.unwrap_or_default();
            archived.extend(rows.into_iter().map(CleanedReading::from));
            self.store.save(&key, &archived).await?;

            tx.commit()
                .await
                .with_context(|| format!("failed to commit archive of {key}"))?;
            moved += deleted as usize;
            info!(key = %key, rows = deleted, total = archived.len(), "Archived readings");
        }

        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::{
        archive::{ArchiveStore, LocalArchiveStore},
        db::tests::{backdate_all, cleaned},
    };

    fn service(pool: PgPool, root: &std::path::Path) -> (ArchiveService, Arc<LocalArchiveStore>) {
        let store = Arc::new(LocalArchiveStore::new(root));
        let svc = ArchiveService::new(pool, store.clone(), ChronoDuration::hours(24), 3600);
        (svc, store)
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn nothing_to_archive_when_all_current(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        db::load_readings(&pool, &[cleaned(0, "now")]).await.unwrap();

        let (svc, store) = service(pool, dir.path());
        assert_eq!(svc.run_once().await.unwrap(), 0);
        assert!(store.list_keys("").await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn expired_readings_move_to_archive(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        db::load_readings(&pool, &[cleaned(0, "a"), cleaned(1, "b")]).await.unwrap();
        backdate_all(&pool, ChronoDuration::hours(48)).await;
        db::load_readings(&pool, &[cleaned(2, "fresh")]).await.unwrap();

        let (svc, store) = service(pool.clone(), dir.path());
        assert_eq!(svc.run_once().await.unwrap(), 2);

        let keys = store.list_keys("").await.unwrap();
        assert_eq!(keys.len(), 1);
        let archived = store.load(&keys[0]).await.unwrap().unwrap();
        let mut taken: Vec<&str> = archived.iter().map(|r| r.recording_taken.as_str()).collect();
        taken.sort_unstable();
        assert_eq!(taken, vec!["a", "b"]);

        let live = db::current_readings(&pool, Utc::now() - ChronoDuration::days(365))
            .await
            .unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].recording_taken, "fresh");
    }

    /// Store whose saves always fail.
    struct ReadOnlyStore;

    #[async_trait::async_trait]
    impl ArchiveStore for ReadOnlyStore {
        async fn list_keys(&self, _prefix: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn load(&self, _key: &str) -> Result<Option<Vec<CleanedReading>>> {
            Ok(None)
        }

        async fn save(&self, key: &str, _rows: &[CleanedReading]) -> Result<()> {
            anyhow::bail!("read-only store cannot save {key}")
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn failed_save_keeps_readings_in_live_store(pool: PgPool) {
        db::load_readings(&pool, &[cleaned(0, "a"), cleaned(1, "b")]).await.unwrap();
        backdate_all(&pool, ChronoDuration::hours(48)).await;

        let svc = ArchiveService::new(
            pool.clone(),
            Arc::new(ReadOnlyStore),
            ChronoDuration::hours(24),
            3600,
        );
        let err = svc.run_once().await.unwrap_err();
        assert!(err.to_string().contains("read-only store"));

        let expired = db::expired_readings(&pool, Utc::now()).await.unwrap();
        assert_eq!(expired.len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn later_runs_append_to_existing_object(pool: PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let (svc, store) = service(pool.clone(), dir.path());

        db::load_readings(&pool, &[cleaned(0, "first")]).await.unwrap();
        backdate_all(&pool, ChronoDuration::hours(30)).await;
        assert_eq!(svc.run_once().await.unwrap(), 1);

        let key = store.list_keys("").await.unwrap().remove(0);

        // Seed a second expired reading that falls on the same archive day.
        db::load_readings(&pool, &[cleaned(0, "second")]).await.unwrap();
        backdate_all(&pool, ChronoDuration::hours(30)).await;
        let expired = db::expired_readings(&pool, Utc::now()).await.unwrap();
        if archive_key(expired[0].loaded_at.date_naive()) != key {
            // Crossed midnight between the two loads; nothing to compare.
            return;
        }

        assert_eq!(svc.run_once().await.unwrap(), 1);
        let archived = store.load(&key).await.unwrap().unwrap();
        let taken: Vec<&str> = archived.iter().map(|r| r.recording_taken.as_str()).collect();
        assert_eq!(taken, vec!["first", "second"]);
    }
}
