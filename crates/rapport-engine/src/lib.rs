//! The Rapport engine: permission groups, field assignments, the connection
//! lifecycle, profile edit sessions and snapshot reconciliation, orchestrated
//! on top of any [`SocialStore`].
//!
//! The engine holds no state of its own beyond its collaborators. Every
//! mutation is a single store call, so a failure never leaves a partial
//! write behind.

mod connections;
mod groups;
mod notify;
mod profile;
mod reconcile;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use rapport_core::{Error, Result, notify::Notifier, store::SocialStore};

pub use connections::DeleteOutcome;
pub use notify::TracingNotifier;
pub use profile::SaveOutcome;
pub use reconcile::{OpenedConnection, RECONCILE_ATTEMPTS, SweepReport};

/// Orchestrates domain operations against a store and a notifier.
///
/// Cloning is cheap; clones share both collaborators.
pub struct Engine<S> {
  store:    Arc<S>,
  notifier: Arc<dyn Notifier>,
}

impl<S> Clone for Engine<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), notifier: self.notifier.clone() }
  }
}

impl<S: SocialStore + 'static> Engine<S> {
  pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>) -> Self {
    Self { store, notifier }
  }

  /// An engine that reports connection events through `tracing`.
  pub fn with_tracing(store: Arc<S>) -> Self {
    Self::new(store, Arc::new(TracingNotifier))
  }

  pub fn store(&self) -> &S { &self.store }
}

/// Lift a store result into the domain error taxonomy.
trait Lift<T> {
  fn lift(self) -> Result<T>;
}

impl<T, E: Into<Error>> Lift<T> for std::result::Result<T, E> {
  fn lift(self) -> Result<T> { self.map_err(Into::into) }
}
