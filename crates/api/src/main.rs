use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smartmoney_core::config::{PipelineOptions, Settings};
use smartmoney_core::domain::recommendation::{PerformanceReport, Snapshot};
use smartmoney_core::ingest::provider::{HttpJsonProvider, TimeSeriesProvider};
use smartmoney_core::performance;
use smartmoney_core::storage::files::FileSnapshotStore;
use smartmoney_core::storage::postgres::PgSnapshotStore;
use smartmoney_core::storage::sector_cache::{SectorCache, SECTOR_CACHE_FILE};
use smartmoney_core::storage::SnapshotStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let opts = PipelineOptions::from_env();
    let store = open_store(&settings).await;

    let provider: Option<Arc<dyn TimeSeriesProvider>> =
        match HttpJsonProvider::from_settings(&settings, &opts) {
            Ok(p) => Some(Arc::new(p)),
            Err(e) => {
                tracing::warn!(error = %e, "market data provider missing; serving recorded prices only");
                None
            }
        };

    let state = AppState {
        store,
        provider,
        sectors: Arc::new(Mutex::new(SectorCache::load(settings.data_dir.join(SECTOR_CACHE_FILE)))),
        request_delay: opts.request_delay,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshots/current", get(get_current_snapshot))
        .route("/snapshots/dates", get(get_snapshot_dates))
        .route("/snapshots/:analysis_date", get(get_snapshot_by_date))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Postgres when it connects and migrates; otherwise the file store under `DATA_DIR`.
async fn open_store(settings: &Settings) -> Arc<dyn SnapshotStore> {
    let file_store = || -> Arc<dyn SnapshotStore> { Arc::new(FileSnapshotStore::new(&settings.data_dir)) };

    let Some(db_url) = settings.database_url.as_deref() else {
        tracing::info!(data_dir = %settings.data_dir.display(), "DATABASE_URL unset; serving file snapshots");
        return file_store();
    };

    match sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
    {
        Ok(pool) => match smartmoney_core::storage::migrate(&pool).await {
            Ok(()) => Arc::new(PgSnapshotStore::new(pool)),
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "db migrations failed; falling back to file snapshots");
                file_store()
            }
        },
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "db connect failed; falling back to file snapshots");
            file_store()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    store: Arc<dyn SnapshotStore>,
    provider: Option<Arc<dyn TimeSeriesProvider>>,
    /// Loaded once; every request reads and writes through this lock.
    sectors: Arc<Mutex<SectorCache>>,
    request_delay: std::time::Duration,
}

fn internal(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_current_snapshot(
    State(state): State<AppState>,
) -> Result<Json<PerformanceReport>, StatusCode> {
    let snapshot = state
        .store
        .current()
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(enrich(&state, snapshot).await))
}

async fn get_snapshot_dates(
    State(state): State<AppState>,
) -> Result<Json<Vec<NaiveDate>>, StatusCode> {
    let mut dates = state.store.dates().await.map_err(internal)?;
    dates.reverse();
    Ok(Json(dates))
}

async fn get_snapshot_by_date(
    State(state): State<AppState>,
    Path(analysis_date): Path<String>,
) -> Result<Json<PerformanceReport>, StatusCode> {
    let analysis_date =
        NaiveDate::parse_from_str(&analysis_date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;

    let snapshot = state
        .store
        .load(analysis_date)
        .await
        .map_err(internal)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(enrich(&state, snapshot).await))
}

/// Live prices and short sector names. The stored snapshot is never rewritten.
async fn enrich(state: &AppState, mut snapshot: Snapshot) -> PerformanceReport {
    let tickers: Vec<String> = snapshot.picks.iter().map(|p| p.ticker.clone()).collect();

    let prices = match &state.provider {
        Some(provider) => {
            performance::fetch_current_prices(provider.as_ref(), &tickers, state.request_delay).await
        }
        None => Default::default(),
    };

    {
        let mut sectors = state.sectors.lock().await;
        sectors
            .label_picks(&mut snapshot.picks, state.provider.as_deref())
            .await;
        if let Err(e) = sectors.save_if_dirty() {
            tracing::warn!(error = %e, "sector cache not saved");
        }
    }

    performance::track(&snapshot, &prices)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
