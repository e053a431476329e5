use crate::domain::recommendation::{Pick, Recommendation, Snapshot};
use crate::storage::SnapshotStore;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};

/// Snapshots in `pick_snapshots` / `pick_items`; one row per date carries `is_current`.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: sqlx::PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    async fn load_items(&self, date: NaiveDate) -> anyhow::Result<Vec<Pick>> {
        let rows: Vec<PickRow> = sqlx::query_as(
            "SELECT rank, ticker, name, sector, quant_score, ai_recommendation, ai_summary, \
                    final_score, price_at_analysis, current_price, target_upside \
             FROM pick_items WHERE analysis_date = $1 ORDER BY rank",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("select pick_items failed (date={date})"))?;

        rows.into_iter().map(PickRow::into_pick).collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PickRow {
    rank: i32,
    ticker: String,
    name: String,
    sector: String,
    quant_score: f64,
    ai_recommendation: String,
    ai_summary: String,
    final_score: f64,
    price_at_analysis: f64,
    current_price: f64,
    target_upside: Option<f64>,
}

impl PickRow {
    fn into_pick(self) -> anyhow::Result<Pick> {
        let ai_recommendation = self
            .ai_recommendation
            .parse::<Recommendation>()
            .map_err(|e| anyhow::anyhow!(e))
            .with_context(|| format!("bad pick_items row for {}", self.ticker))?;
        Ok(Pick {
            rank: self.rank,
            ticker: self.ticker,
            name: self.name,
            sector: self.sector,
            quant_score: self.quant_score,
            ai_recommendation,
            ai_summary: self.ai_summary,
            final_score: self.final_score,
            price_at_analysis: self.price_at_analysis,
            current_price: self.current_price,
            target_upside: self.target_upside,
        })
    }
}

#[async_trait::async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let date = snapshot.analysis_date;
        let mut tx = self.pool.begin().await.context("begin transaction failed")?;

        sqlx::query(
            "INSERT INTO pick_snapshots (analysis_date, analysis_timestamp, is_current, saved_at) \
             VALUES ($1, $2, FALSE, now()) \
             ON CONFLICT (analysis_date) DO UPDATE \
               SET analysis_timestamp = EXCLUDED.analysis_timestamp, saved_at = now()",
        )
        .bind(date)
        .bind(snapshot.analysis_timestamp)
        .execute(&mut *tx)
        .await
        .context("upsert pick_snapshots failed")?;

        sqlx::query("DELETE FROM pick_items WHERE analysis_date = $1")
            .bind(date)
            .execute(&mut *tx)
            .await
            .context("delete pick_items failed")?;

        if !snapshot.picks.is_empty() {
            let mut qb = sqlx::QueryBuilder::new(
                "INSERT INTO pick_items (analysis_date, rank, ticker, name, sector, quant_score, \
                 ai_recommendation, ai_summary, final_score, price_at_analysis, current_price, target_upside) ",
            );
            qb.push_values(&snapshot.picks, |mut b, pick| {
                b.push_bind(date)
                    .push_bind(pick.rank)
                    .push_bind(&pick.ticker)
                    .push_bind(&pick.name)
                    .push_bind(&pick.sector)
                    .push_bind(pick.quant_score)
                    .push_bind(pick.ai_recommendation.as_str())
                    .push_bind(&pick.ai_summary)
                    .push_bind(pick.final_score)
                    .push_bind(pick.price_at_analysis)
                    .push_bind(pick.current_price)
                    .push_bind(pick.target_upside);
            });
            qb.build()
                .persistent(false)
                .execute(&mut *tx)
                .await
                .context("insert pick_items failed")?;
        }

        sqlx::query("UPDATE pick_snapshots SET is_current = FALSE WHERE is_current")
            .execute(&mut *tx)
            .await
            .context("clear current snapshot failed")?;
        sqlx::query("UPDATE pick_snapshots SET is_current = TRUE WHERE analysis_date = $1")
            .bind(date)
            .execute(&mut *tx)
            .await
            .context("mark current snapshot failed")?;

        tx.commit().await.context("commit transaction failed")?;
        tracing::info!(%date, picks = snapshot.picks.len(), "snapshot saved to postgres");
        Ok(())
    }

    async fn current(&self) -> anyhow::Result<Option<Snapshot>> {
        let date: Option<NaiveDate> = sqlx::query_scalar(
            "SELECT analysis_date FROM pick_snapshots WHERE is_current LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("select current snapshot failed")?;

        match date {
            Some(date) => self.load(date).await,
            None => Ok(None),
        }
    }

    async fn load(&self, date: NaiveDate) -> anyhow::Result<Option<Snapshot>> {
        let ts: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT analysis_timestamp FROM pick_snapshots WHERE analysis_date = $1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select pick_snapshots failed (date={date})"))?;

        let Some(analysis_timestamp) = ts else {
            return Ok(None);
        };
        let picks = self.load_items(date).await?;
        Ok(Some(Snapshot {
            analysis_date: date,
            analysis_timestamp,
            picks,
        }))
    }

    async fn dates(&self) -> anyhow::Result<Vec<NaiveDate>> {
        sqlx::query_scalar("SELECT analysis_date FROM pick_snapshots ORDER BY analysis_date")
            .fetch_all(&self.pool)
            .await
            .context("select snapshot dates failed")
    }
}
