pub mod models;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::transform::CleanedReading;

use self::models::StoredReading;

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const SELECT_STORED: &str = r#"
    SELECT r.reading_id,
           r.plant_id,
           p.plant_name,
           r.soil_moisture,
           r.temperature,
           r.last_watered,
           r.recording_taken,
           b.name  AS botanist_name,
           b.phone AS botanist_mobile,
           b.email AS botanist_email,
           r.error,
           r.loaded_at
    FROM reading r
    JOIN plant p ON p.plant_id = r.plant_id
    LEFT JOIN botanist b ON b.botanist_id = r.botanist_id
"#;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Write a cleaned batch in one transaction: botanists are upserted on their
/// contact triple, plants on `plant_id`, and every row becomes a `reading`.
/// Returns the number of readings inserted.
pub async fn load_readings(pool: &PgPool, readings: &[CleanedReading]) -> Result<usize> {
    let mut tx = pool.begin().await.context("failed to open load transaction")?;

    for r in readings {
        let botanist_id = match r.botanist() {
            Some(b) => Some(
                sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO botanist (name, email, phone)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (email, name, phone) DO UPDATE SET name = EXCLUDED.name
                    RETURNING botanist_id
                    "#,
                )
                .bind(&b.name)
                .bind(&b.email)
                .bind(&b.phone)
                .fetch_one(&mut *tx)
                .await
                .with_context(|| format!("failed to upsert botanist for plant {}", r.plant_id))?,
            ),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO plant (plant_id, plant_name)
            VALUES ($1, $2)
            ON CONFLICT (plant_id) DO UPDATE SET plant_name = EXCLUDED.plant_name
            "#,
        )
        .bind(r.plant_id)
        .bind(&r.plant_name)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert plant {}", r.plant_id))?;

        sqlx::query(
            r#"
            INSERT INTO reading
                (plant_id, botanist_id, soil_moisture, temperature,
                 last_watered, recording_taken, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(r.plant_id)
        .bind(botanist_id)
        .bind(r.soil_moisture)
        .bind(r.temperature)
        .bind(r.last_watered)
        .bind(&r.recording_taken)
        .bind(&r.error)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert reading for plant {}", r.plant_id))?;
    }

    tx.commit().await.context("failed to commit load transaction")?;
    Ok(readings.len())
}

// ---------------------------------------------------------------------------
// Live store queries
// ---------------------------------------------------------------------------

/// Every reading loaded at or after `since`, newest first.
pub async fn current_readings(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<StoredReading>> {
    let sql = format!("{SELECT_STORED} WHERE r.loaded_at >= $1 ORDER BY r.loaded_at DESC, r.plant_id");
    let rows = sqlx::query_as::<_, StoredReading>(&sql)
        .bind(since)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Readings for one plant loaded at or after `since`, in `recording_taken`
/// order so they chart left to right.
pub async fn current_plant_readings(
    pool: &PgPool,
    plant_id: i32,
    since: DateTime<Utc>,
) -> Result<Vec<StoredReading>> {
    let sql = format!(
        "{SELECT_STORED} WHERE r.plant_id = $1 AND r.loaded_at >= $2 ORDER BY r.recording_taken ASC"
    );
    let rows = sqlx::query_as::<_, StoredReading>(&sql)
        .bind(plant_id)
        .bind(since)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Distinct plant IDs with at least one reading loaded at or after `since`.
pub async fn current_plant_ids(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<i32>> {
    let ids = sqlx::query_scalar::<_, i32>(
        "SELECT DISTINCT plant_id FROM reading WHERE loaded_at >= $1 ORDER BY plant_id",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Archive support
// ---------------------------------------------------------------------------

/// Readings loaded before `before`, oldest first.
pub async fn expired_readings(pool: &PgPool, before: DateTime<Utc>) -> Result<Vec<StoredReading>> {
    let sql = format!("{SELECT_STORED} WHERE r.loaded_at < $1 ORDER BY r.loaded_at ASC, r.plant_id");
    let rows = sqlx::query_as::<_, StoredReading>(&sql)
        .bind(before)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Delete readings by id. Takes any executor so the archive job can run it
/// inside the transaction it commits after saving.
pub async fn delete_readings<'e>(executor: impl PgExecutor<'e>, reading_ids: &[Uuid]) -> Result<u64> {
    let done = sqlx::query("DELETE FROM reading WHERE reading_id = ANY($1)")
        .bind(reading_ids)
        .execute(executor)
        .await?;
    Ok(done.rows_affected())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    pub(crate) fn cleaned(plant_id: i32, recording_taken: &str) -> CleanedReading {
        CleanedReading {
            plant_id,
            plant_name: format!("Plant {plant_id}"),
            soil_moisture: Some(42.5),
            temperature: Some(18.25),
            last_watered: Utc.with_ymd_and_hms(2023, 12, 18, 14, 3, 4).unwrap(),
            recording_taken: recording_taken.to_owned(),
            botanist_name: Some("Carl Linnaeus".to_owned()),
            botanist_mobile: Some("(146)994-1635x35992".to_owned()),
            botanist_email: Some("carl.linnaeus@lnhm.co.uk".to_owned()),
            error: None,
        }
    }

    pub(crate) async fn backdate_all(pool: &PgPool, by: Duration) {
        sqlx::query("UPDATE reading SET loaded_at = loaded_at - make_interval(secs => $1)")
            .bind(by.num_seconds() as f64)
            .execute(pool)
            .await
            .unwrap();
    }

    fn long_ago() -> DateTime<Utc> {
        Utc::now() - Duration::days(365)
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn load_empty_batch_is_a_no_op(pool: PgPool) {
        assert_eq!(load_readings(&pool, &[]).await.unwrap(), 0);
        assert!(current_readings(&pool, long_ago()).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn load_then_read_back_preserves_cleaned_shape(pool: PgPool) {
        let batch = vec![cleaned(0, "2023-12-18 15:25:19")];
        assert_eq!(load_readings(&pool, &batch).await.unwrap(), 1);

        let rows = current_readings(&pool, long_ago()).await.unwrap();
        assert_eq!(rows.len(), 1);
        let back: CleanedReading = rows[0].clone().into();
        assert_eq!(back, batch[0]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn botanists_are_deduplicated(pool: PgPool) {
        let batch = vec![
            cleaned(0, "2023-12-18 15:25:19"),
            cleaned(1, "2023-12-18 15:25:20"),
            cleaned(0, "2023-12-18 15:26:19"),
        ];
        load_readings(&pool, &batch).await.unwrap();

        let botanists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM botanist")
            .fetch_one(&pool)
            .await
            .unwrap();
        let plants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM plant")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(botanists, 1);
        assert_eq!(plants, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn partial_botanist_is_stored_and_null_botanist_is_not(pool: PgPool) {
        let partial = CleanedReading {
            botanist_mobile: None,
            ..cleaned(0, "a")
        };
        let none = CleanedReading {
            botanist_name: None,
            botanist_mobile: None,
            botanist_email: None,
            ..cleaned(1, "b")
        };
        load_readings(&pool, &[partial.clone(), none.clone()]).await.unwrap();

        let botanists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM botanist")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(botanists, 1);

        let rows = current_plant_readings(&pool, 1, long_ago()).await.unwrap();
        let back: CleanedReading = rows[0].clone().into();
        assert_eq!(back, none);

        let rows = current_plant_readings(&pool, 0, long_ago()).await.unwrap();
        let back: CleanedReading = rows[0].clone().into();
        assert_eq!(back, partial);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn plant_readings_are_filtered_and_ordered(pool: PgPool) {
        let batch = vec![
            cleaned(2, "2023-12-18 15:27:00"),
            cleaned(1, "2023-12-18 15:26:00"),
            cleaned(2, "2023-12-18 15:25:00"),
        ];
        load_readings(&pool, &batch).await.unwrap();

        let rows = current_plant_readings(&pool, 2, long_ago()).await.unwrap();
        let taken: Vec<&str> = rows.iter().map(|r| r.recording_taken.as_str()).collect();
        assert_eq!(taken, vec!["2023-12-18 15:25:00", "2023-12-18 15:27:00"]);

        assert_eq!(current_plant_ids(&pool, long_ago()).await.unwrap(), vec![1, 2]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn window_splits_current_from_expired(pool: PgPool) {
        load_readings(&pool, &[cleaned(0, "old")]).await.unwrap();
        backdate_all(&pool, Duration::hours(30)).await;
        load_readings(&pool, &[cleaned(1, "new")]).await.unwrap();

        let since = Utc::now() - Duration::hours(24);
        let current = current_readings(&pool, since).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].recording_taken, "new");
        assert_eq!(current_plant_ids(&pool, since).await.unwrap(), vec![1]);

        let expired = expired_readings(&pool, since).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].recording_taken, "old");

        let ids: Vec<Uuid> = expired.iter().map(|r| r.reading_id).collect();
        assert_eq!(delete_readings(&pool, &ids).await.unwrap(), 1);
        assert!(expired_readings(&pool, since).await.unwrap().is_empty());
        assert_eq!(current_readings(&pool, long_ago()).await.unwrap().len(), 1);
    }
}
