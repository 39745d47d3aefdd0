//! Server wiring for Rapport: configuration, the HTTP router with request
//! tracing, and the periodic reconciliation sweep.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use axum::Router;
use rapport_core::store::SocialStore;
use rapport_engine::Engine;
use serde::Deserialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `RAPPORT_*` environment variables.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  /// Seconds between sweeps; `0` disables the sweeper.
  pub sweep_interval_secs: u64,
  /// Flagged connections reconciled per sweep.
  pub sweep_page_size:     usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                "127.0.0.1".to_string(),
      port:                5232,
      store_path:          PathBuf::from("rapport.db"),
      sweep_interval_secs: 30,
      sweep_page_size:     50,
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn sweep_interval(&self) -> Option<Duration> {
    (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the HTTP application: the API routes with every request traced.
pub fn router<S>(engine: Engine<S>) -> Router
where
  S: SocialStore + 'static,
{
  rapport_api::api_router(engine).layer(TraceLayer::new_for_http())
}

// ─── Sweeper ──────────────────────────────────────────────────────────────────

/// Reconcile up to `page_size` flagged connections every `every`, until the
/// runtime shuts down. A failed sweep is logged and retried on the next tick.
pub fn spawn_sweeper<S>(engine: Engine<S>, every: Duration, page_size: usize) -> JoinHandle<()>
where
  S: SocialStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      if let Err(e) = engine.sweep(page_size).await {
        tracing::warn!(error = %e, "reconciliation sweep failed");
      }
    }
  })
}

// ─── Tests ────────────────────────────────────────────────────────────────────
