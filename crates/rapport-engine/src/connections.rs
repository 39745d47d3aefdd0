//! The connection lifecycle: requests, confirmation, denial, deletion,
//! blocking and rebinding.

use rapport_core::{
  Result,
  connection::{Connection, ConnectionRequest, ConnectionStatus},
  notify::ConnectionEvent,
  store::SocialStore,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{Engine, Lift as _};

/// The result of deleting one connection as part of a bulk delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
  pub connection_id: Uuid,
  /// `None` when the connection was deleted.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:         Option<String>,
  /// Whether the failure was transient and may succeed on retry.
  pub retryable:     bool,
}

impl DeleteOutcome {
  pub fn is_deleted(&self) -> bool { self.error.is_none() }
}

impl<S: SocialStore + 'static> Engine<S> {
  // ── Reads ─────────────────────────────────────────────────────────────────

  /// Confirmed connections, optionally narrowed by a settled name filter.
  pub async fn list_connections(
    &self,
    user_id: Uuid,
    name_filter: Option<String>,
  ) -> Result<Vec<Connection>> {
    self.store.load_connections(user_id, name_filter).await.lift()
  }

  /// Requests waiting on `user_id`.
  pub async fn list_requests(&self, user_id: Uuid) -> Result<Vec<ConnectionRequest>> {
    self.store.load_requests(user_id).await.lift()
  }

  /// Peers `user_id` denied or was denied by; discovery hides them.
  pub async fn list_denied(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
    self.store.list_peers(user_id, ConnectionStatus::Denied).await.lift()
  }

  pub async fn list_blocked(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
    self.store.list_peers(user_id, ConnectionStatus::Blocked).await.lift()
  }

  // ── Transitions ───────────────────────────────────────────────────────────

  /// Ask `to` to connect. `permission_group` is the requester's group for
  /// `to`; omitting it shows `to` nothing.
  pub async fn send_request(
    &self,
    from: Uuid,
    to: Uuid,
    permission_group: Option<String>,
  ) -> Result<ConnectionRequest> {
    let request = self
      .store
      .send_request(from, to, permission_group)
      .await
      .lift()?;
    self.notifier.notify(ConnectionEvent::RequestSent { from, to });
    Ok(request)
  }

  /// Confirm the request `requesting_user_id` sent, binding them to the
  /// confirmer's `permission_group` (nothing visible when omitted). Both
  /// snapshots are built right away; a failure there leaves them flagged for
  /// the next sweep rather than failing the confirmation.
  pub async fn confirm_request(
    &self,
    requesting_user_id: Uuid,
    confirming_user_id: Uuid,
    permission_group: Option<String>,
  ) -> Result<Connection> {
    let row = self
      .store
      .confirm_request(requesting_user_id, confirming_user_id, permission_group)
      .await
      .lift()?;
    self.notifier.notify(ConnectionEvent::RequestConfirmed {
      requesting_user_id,
      confirming_user_id,
    });

    let row = match self.reconcile_connection(row.connection_id).await {
      Ok(refreshed) => refreshed,
      Err(e) => {
        tracing::warn!(connection_id = %row.connection_id, error = %e, "initial snapshot failed");
        row
      }
    };
    match self
      .store
      .find_connection(requesting_user_id, confirming_user_id)
      .await
      .lift()
    {
      Ok(Some(reverse)) => {
        if let Err(e) = self.reconcile_connection(reverse.connection_id).await {
          tracing::warn!(connection_id = %reverse.connection_id, error = %e, "initial snapshot failed");
        }
      }
      Ok(None) => {}
      Err(e) => tracing::warn!(error = %e, "could not load reverse connection"),
    }

    Ok(row)
  }

  pub async fn deny_request(
    &self,
    requesting_user_id: Uuid,
    denying_user_id: Uuid,
  ) -> Result<()> {
    self
      .store
      .deny_request(requesting_user_id, denying_user_id)
      .await
      .lift()?;
    self.notifier.notify(ConnectionEvent::RequestDenied {
      requesting_user_id,
      denying_user_id,
    });
    Ok(())
  }

  /// Delete one of `actor_id`'s connections. Both directions end up deleted
  /// and lose their snapshots.
  pub async fn delete_connection(
    &self,
    actor_id: Uuid,
    connection_id: Uuid,
  ) -> Result<Connection> {
    let row = self
      .store
      .delete_connection(actor_id, connection_id)
      .await
      .lift()?;
    self.notifier.notify(ConnectionEvent::ConnectionDeleted {
      actor_id,
      other_user_id: row.other_user_id,
    });
    Ok(row)
  }

  /// Delete each connection in turn. A failure is recorded against its id
  /// and the rest still run.
  pub async fn bulk_delete(
    &self,
    actor_id: Uuid,
    connection_ids: &[Uuid],
  ) -> Vec<DeleteOutcome> {
    let mut outcomes = Vec::with_capacity(connection_ids.len());
    for &connection_id in connection_ids {
      let outcome = match self.delete_connection(actor_id, connection_id).await {
        Ok(_) => DeleteOutcome { connection_id, error: None, retryable: false },
        Err(e) => {
          tracing::warn!(%actor_id, %connection_id, error = %e, "bulk delete item failed");
          DeleteOutcome {
            connection_id,
            retryable: e.is_retryable(),
            error: Some(e.to_string()),
          }
        }
      };
      outcomes.push(outcome);
    }
    outcomes
  }

  /// Block `other_user_id` in both directions, from any state.
  pub async fn block_user(&self, actor_id: Uuid, other_user_id: Uuid) -> Result<()> {
    self.store.block_user(actor_id, other_user_id).await.lift()?;
    self.notifier.notify(ConnectionEvent::UserBlocked { actor_id, other_user_id });
    Ok(())
  }

  /// Bind a confirmed connection to another of the owner's groups. The
  /// peer's view of the owner is flagged for reconciliation.
  pub async fn set_connection_group(
    &self,
    actor_id: Uuid,
    connection_id: Uuid,
    permission_group: Option<String>,
  ) -> Result<Connection> {
    let row = self
      .store
      .set_connection_group(actor_id, connection_id, permission_group)
      .await
      .lift()?;
    tracing::info!(
      %actor_id,
      %connection_id,
      group = row.permission_group.as_deref().unwrap_or("-"),
      "connection rebound"
    );
    Ok(row)
  }
}
