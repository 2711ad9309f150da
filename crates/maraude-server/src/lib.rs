//! HTTP server wiring for the outreach API.
//!
//! Holds the runtime configuration, the top-level router (the JSON API
//! nested under `/api`, wrapped in request tracing) and the background
//! retention sweep.

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::Router;
use chrono::Utc;
use maraude_core::store::OutreachStore;
use serde::Deserialize;
use tokio::{task::JoinHandle, time};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// `MARAUDE_*` environment.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub retention:  RetentionConfig,
}

/// Automatic anonymization of beneficiaries nobody has met for a while.
#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
  /// Days without an encounter before a record is anonymized. `None`
  /// disables the sweep.
  pub inactive_days:       Option<u32>,
  #[serde(default = "default_sweep_interval")]
  pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
  fn default() -> Self {
    Self { inactive_days: None, sweep_interval_secs: default_sweep_interval() }
  }
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("maraude.db") }
fn default_sweep_interval() -> u64 { 24 * 60 * 60 }

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the application router: the JSON API under `/api`, with a tracing
/// span per request.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: OutreachStore + 'static,
{
  Router::new()
    .nest("/api", maraude_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}

// ─── Retention sweep ──────────────────────────────────────────────────────────

/// Anonymize every beneficiary inactive for `inactive_days`.
pub async fn sweep_once<S: OutreachStore>(
  store: &S,
  inactive_days: u32,
) -> Result<Vec<Uuid>, S::Error> {
  let cutoff = Utc::now() - chrono::Duration::days(i64::from(inactive_days));
  store.anonymize_inactive(cutoff).await
}

/// Spawn the periodic retention sweep, if enabled.
pub fn spawn_retention_sweep<S>(store: Arc<S>, config: &RetentionConfig) -> Option<JoinHandle<()>>
where
  S: OutreachStore + 'static,
{
  let inactive_days = config.inactive_days?;
  let period = Duration::from_secs(config.sweep_interval_secs.max(1));

  info!(inactive_days, interval_secs = period.as_secs(), "retention sweep enabled");
  Some(tokio::spawn(async move {
    let mut interval = time::interval(period);
    loop {
      interval.tick().await;
      match sweep_once(store.as_ref(), inactive_days).await {
        Ok(ids) => debug!(count = ids.len(), "retention sweep finished"),
        Err(e) => warn!(error = %e, "retention sweep failed"),
      }
    }
  }))
}
