//! One report per analysis date across concurrent workers.
//!
//! Postgres advisory locks belong to the session that took them, so the guard
//! keeps its pooled connection until it is released. The 64-bit key splits into
//! the namespace (high half) and the `YYYYMMDD` date (low half), which is how
//! it shows up in `pg_locks` as `classid`/`objid`.

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use sqlx::pool::PoolConnection;
use sqlx::Postgres;

const LOCK_NAMESPACE: i64 = 0x534D_5052; // "SMPR"

fn lock_key_for_date(analysis_date: NaiveDate) -> i64 {
    let yyyymmdd = analysis_date.year() as i64 * 10_000
        + analysis_date.month() as i64 * 100
        + analysis_date.day() as i64;
    (LOCK_NAMESPACE << 32) | yyyymmdd
}

pub struct AnalysisDateLock {
    conn: PoolConnection<Postgres>,
    key: i64,
    analysis_date: NaiveDate,
}

impl AnalysisDateLock {
    /// `None` when another session already holds the date.
    pub async fn try_acquire(
        pool: &sqlx::PgPool,
        analysis_date: NaiveDate,
    ) -> anyhow::Result<Option<Self>> {
        let key = lock_key_for_date(analysis_date);
        let mut conn = pool
            .acquire()
            .await
            .context("failed to check out a connection for the report lock")?;
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .persistent(false)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("failed to acquire report lock for {analysis_date} (key={key})"))?;

        Ok(acquired.then_some(Self {
            conn,
            key,
            analysis_date,
        }))
    }

    /// Must run on the session that took the lock.
    pub async fn release(mut self) -> anyhow::Result<()> {
        let key = self.key;
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .persistent(false)
            .bind(key)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("failed to release report lock for {} (key={key})", self.analysis_date))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn key_carries_namespace_and_calendar_date() {
        let key = lock_key_for_date(date(2026, 1, 27));
        assert_eq!(key >> 32, LOCK_NAMESPACE);
        assert_eq!(key & 0xFFFF_FFFF, 20_260_127);
        assert!(key > 0);
    }

    #[test]
    fn keys_are_stable_and_distinct_per_date() {
        let a = date(2026, 1, 27);
        assert_eq!(lock_key_for_date(a), lock_key_for_date(a));

        let mut keys: Vec<i64> = (0..800)
            .map(|i| lock_key_for_date(a + chrono::Duration::days(i)))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 800);
    }
}
