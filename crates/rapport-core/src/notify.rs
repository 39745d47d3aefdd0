//! Connection events handed to the notification collaborator.

use serde::Serialize;
use uuid::Uuid;

/// A lifecycle transition worth telling the other party about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
  RequestSent {
    from: Uuid,
    to:   Uuid,
  },
  RequestConfirmed {
    requesting_user_id: Uuid,
    confirming_user_id: Uuid,
  },
  RequestDenied {
    requesting_user_id: Uuid,
    denying_user_id:    Uuid,
  },
  ConnectionDeleted {
    actor_id:      Uuid,
    other_user_id: Uuid,
  },
  UserBlocked {
    actor_id:      Uuid,
    other_user_id: Uuid,
  },
}

/// Delivery is fire-and-forget: the engine never waits on or inspects the
/// outcome.
pub trait Notifier: Send + Sync {
  fn notify(&self, event: ConnectionEvent);
}
