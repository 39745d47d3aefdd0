//! Keeping cached snapshots consistent with their source profiles.
//!
//! The row `(owner, other)` caches `owner`'s view of `other`. Its source is
//! `other`'s saved profile, filtered by the group `other` bound `owner` to,
//! which lives on the reverse row `(other, owner)` and names one of
//! `other`'s groups.

use rapport_core::{
  Error, Result,
  connection::{Connection, SyncState},
  group::PermissionGroup,
  profile::UserProfile,
  store::SocialStore,
  sync,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{Engine, Lift as _};

/// Rebuilds attempted before a reconcile that keeps losing to concurrent
/// edits gives up and leaves the row flagged.
pub const RECONCILE_ATTEMPTS: usize = 3;

/// A connection as opened for display, possibly with a refresh in flight.
#[derive(Debug)]
pub struct OpenedConnection {
  /// The row as stored. When drifted, `sync_state` is `OutOfSync` and the
  /// snapshot is the stale one.
  pub connection: Connection,
  /// The background reconciliation, when one was started.
  pub refresh:    Option<JoinHandle<()>>,
}

/// Counts from one sweep page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
  pub reconciled: usize,
  /// Flagged rows whose snapshot turned out to be current already.
  pub unchanged:  usize,
  pub failed:     usize,
}

/// Everything reconciliation reads about the source side of a connection.
struct Source {
  profile:     UserProfile,
  bound_group: Option<String>,
  groups:      Vec<PermissionGroup>,
}

impl<S: SocialStore + 'static> Engine<S> {
  async fn source_for(&self, connection: &Connection) -> Result<Source> {
    let other = connection.other_user_id;
    let profile = self
      .store
      .load_profile(other)
      .await
      .lift()?
      .unwrap_or_else(|| UserProfile::empty(other));
    let bound_group = self
      .store
      .find_connection(other, connection.owner_id)
      .await
      .lift()?
      .and_then(|reverse| reverse.permission_group);
    let groups = self.store.list_groups(other).await.lift()?;
    Ok(Source { profile, bound_group, groups })
  }

  /// Open `viewer_id`'s connection for display. Drift is computed on the
  /// spot; a drifted row is returned as is, with its stale snapshot, while a
  /// background task reconciles it.
  pub async fn open_connection(
    &self,
    viewer_id: Uuid,
    connection_id: Uuid,
  ) -> Result<OpenedConnection> {
    let mut connection = self
      .store
      .get_connection(connection_id)
      .await
      .lift()?
      .filter(|c| c.owner_id == viewer_id)
      .ok_or_else(|| Error::not_found(format!("connection {connection_id}")))?;

    if !connection.is_confirmed() {
      return Ok(OpenedConnection { connection, refresh: None });
    }

    let source = self.source_for(&connection).await?;
    let drifted = sync::is_out_of_sync(
      &connection,
      &source.profile,
      source.bound_group.as_deref(),
      &source.groups,
    );
    if !drifted && connection.sync_state == SyncState::InSync {
      return Ok(OpenedConnection { connection, refresh: None });
    }

    if connection.sync_state == SyncState::InSync {
      // Persist the flag so the sweeper retries if the refresh below fails.
      self.store.mark_out_of_sync(connection_id).await.lift()?;
      connection.sync_state = SyncState::OutOfSync;
    }
    let engine = self.clone();
    let refresh = tokio::spawn(async move {
      if let Err(e) = engine.reconcile_connection(connection_id).await {
        tracing::warn!(%connection_id, error = %e, "background reconcile failed");
      }
    });
    Ok(OpenedConnection { connection, refresh: Some(refresh) })
  }

  /// Rebuild one snapshot from the current source. Writes only when the row
  /// was flagged or the projection changed, so reconciling an in-sync row is
  /// a no-op.
  ///
  /// The row is read before its source, and the write is refused when a
  /// trigger flagged the row in between; the rebuild is then retried from a
  /// fresh read. After [`RECONCILE_ATTEMPTS`] lost races the row is left
  /// flagged for the next sweep and a conflict is returned.
  pub async fn reconcile_connection(&self, connection_id: Uuid) -> Result<Connection> {
    for attempt in 1..=RECONCILE_ATTEMPTS {
      let mut connection = self
        .store
        .get_connection(connection_id)
        .await
        .lift()?
        .ok_or_else(|| Error::not_found(format!("connection {connection_id}")))?;
      if !connection.is_confirmed() {
        return Err(Error::conflict(format!(
          "connection {connection_id} is {}",
          connection.status
        )));
      }

      let was_flagged = connection.sync_state == SyncState::OutOfSync;
      let source = self.source_for(&connection).await?;
      let changed = sync::reconcile(
        &mut connection,
        &source.profile,
        source.bound_group.as_deref(),
        &source.groups,
      );
      if !changed && !was_flagged {
        return Ok(connection);
      }

      let snapshot = connection.snapshot.clone().unwrap_or_default();
      let written = self
        .store
        .write_snapshot(connection_id, connection.revision, snapshot)
        .await
        .lift()?;
      if written {
        tracing::debug!(%connection_id, changed, "snapshot reconciled");
        return Ok(connection);
      }
      tracing::debug!(%connection_id, attempt, "source moved during reconcile, retrying");
    }

    Err(Error::conflict(format!(
      "connection {connection_id} kept changing during reconciliation"
    )))
  }

  /// Reconcile up to `page_size` flagged connections, oldest first.
  pub async fn sweep(&self, page_size: usize) -> Result<SweepReport> {
    let flagged = self.store.list_out_of_sync(None, page_size).await.lift()?;
    let mut report = SweepReport::default();

    for row in flagged {
      let before = row.snapshot.clone();
      match self.reconcile_connection(row.connection_id).await {
        Ok(after) if after.snapshot != before => report.reconciled += 1,
        Ok(_) => report.unchanged += 1,
        Err(e) => {
          tracing::warn!(connection_id = %row.connection_id, error = %e, "sweep reconcile failed");
          report.failed += 1;
        }
      }
    }

    if report != SweepReport::default() {
      tracing::info!(
        reconciled = report.reconciled,
        unchanged = report.unchanged,
        failed = report.failed,
        "reconciliation sweep"
      );
    }
    Ok(report)
  }

  /// `owner_id`'s confirmed connections currently flagged out of sync.
  pub async fn list_out_of_sync(&self, owner_id: Uuid) -> Result<Vec<Connection>> {
    self
      .store
      .list_out_of_sync(Some(owner_id), usize::MAX)
      .await
      .lift()
  }
}
