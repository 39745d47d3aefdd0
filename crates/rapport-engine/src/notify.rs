use rapport_core::notify::{ConnectionEvent, Notifier};

/// Logs each event at `info`. Stands in for a push-delivery collaborator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn notify(&self, event: ConnectionEvent) {
    match event {
      ConnectionEvent::RequestSent { from, to } => {
        tracing::info!(%from, %to, "connection request sent");
      }
      ConnectionEvent::RequestConfirmed { requesting_user_id, confirming_user_id } => {
        tracing::info!(%requesting_user_id, %confirming_user_id, "connection request confirmed");
      }
      ConnectionEvent::RequestDenied { requesting_user_id, denying_user_id } => {
        tracing::info!(%requesting_user_id, %denying_user_id, "connection request denied");
      }
      ConnectionEvent::ConnectionDeleted { actor_id, other_user_id } => {
        tracing::info!(%actor_id, %other_user_id, "connection deleted");
      }
      ConnectionEvent::UserBlocked { actor_id, other_user_id } => {
        tracing::info!(%actor_id, %other_user_id, "user blocked");
      }
    }
  }
}
