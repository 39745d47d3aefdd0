//! The `SocialStore` trait: the storage collaborator.
//!
//! The trait is implemented by storage backends (e.g. `rapport-store-sqlite`).
//! Higher layers (`rapport-engine`, `rapport-api`) depend on this abstraction,
//! not on any concrete backend.

use std::{collections::BTreeSet, future::Future};

use uuid::Uuid;

use crate::{
  assignment::FieldAssignments,
  connection::{Connection, ConnectionRequest, ConnectionStatus},
  field::ProfileField,
  group::PermissionGroup,
  profile::{EditableFields, UserProfile},
  sync::ProfileSnapshot,
};

// ─── Result types ────────────────────────────────────────────────────────────

/// Outcome of replacing a group's field set.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct GroupUpdate {
  pub group:               PermissionGroup,
  /// Peer snapshots flagged out of sync because membership changed.
  pub flagged_connections: usize,
}

/// Outcome of deleting a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct GroupRemoval {
  /// Fields whose assignment pointed at the group; they now fall back to
  /// nothing.
  pub released_fields:     Vec<ProfileField>,
  /// Connections whose binding was cleared; their peers are flagged out of
  /// sync.
  pub rebound_connections: usize,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the authoritative store of profiles, groups and the
/// connection graph.
///
/// Every write is atomic per entity: a reader never sees a partially updated
/// snapshot or field set. Connection transitions check the current state and
/// write both directed rows in one step, so two transitions racing on the
/// same pair have exactly one winner; the loser gets a conflict.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait SocialStore: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  // ── Profiles ──────────────────────────────────────────────────────────

  /// Retrieve a user's saved profile. Returns `None` if never saved.
  fn load_profile(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<UserProfile>, Self::Error>> + Send + '_;

  /// Persist `fields` as the user's profile and return the saved profile.
  ///
  /// Every confirmed connection whose snapshot derives from this profile is
  /// flagged out of sync in the same write.
  fn save_profile(
    &self,
    user_id: Uuid,
    fields: EditableFields,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  // ── Permission groups ─────────────────────────────────────────────────

  fn list_groups(
    &self,
    owner_id: Uuid,
  ) -> impl Future<Output = Result<Vec<PermissionGroup>, Self::Error>> + Send + '_;

  /// Persist a new group. Fails with a conflict if the owner already has a
  /// group of that name.
  fn insert_group(
    &self,
    group: PermissionGroup,
  ) -> impl Future<Output = Result<PermissionGroup, Self::Error>> + Send + '_;

  /// Replace a group's field set. When membership changed, every peer bound
  /// to the group is flagged out of sync in the same write.
  fn update_group_fields(
    &self,
    owner_id: Uuid,
    name: String,
    fields: BTreeSet<ProfileField>,
  ) -> impl Future<Output = Result<GroupUpdate, Self::Error>> + Send + '_;

  /// Delete a group, cascading to field assignments and connection bindings.
  fn delete_group(
    &self,
    owner_id: Uuid,
    name: String,
  ) -> impl Future<Output = Result<GroupRemoval, Self::Error>> + Send + '_;

  // ── Field assignments ─────────────────────────────────────────────────

  fn load_assignments(
    &self,
    owner_id: Uuid,
  ) -> impl Future<Output = Result<FieldAssignments, Self::Error>> + Send + '_;

  /// Delegate `field` to `group_name`, which must be one of the owner's
  /// groups.
  fn assign_field(
    &self,
    owner_id: Uuid,
    field: ProfileField,
    group_name: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Connections, reads ───────────────────────────────────────────────

  /// Confirmed connections of `user_id`, optionally restricted to peers whose
  /// name contains `name_filter` (case-insensitive). The filter arrives
  /// already settled; the store never sees intermediate keystrokes.
  fn load_connections(
    &self,
    user_id: Uuid,
    name_filter: Option<String>,
  ) -> impl Future<Output = Result<Vec<Connection>, Self::Error>> + Send + '_;

  fn get_connection(
    &self,
    connection_id: Uuid,
  ) -> impl Future<Output = Result<Option<Connection>, Self::Error>> + Send + '_;

  /// The row `(owner_id, other_user_id)`, if one exists.
  fn find_connection(
    &self,
    owner_id: Uuid,
    other_user_id: Uuid,
  ) -> impl Future<Output = Result<Option<Connection>, Self::Error>> + Send + '_;

  /// Pending requests addressed to `user_id`.
  fn load_requests(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ConnectionRequest>, Self::Error>> + Send + '_;

  /// Peers of `user_id` whose connection is in `status`.
  fn list_peers(
    &self,
    user_id: Uuid,
    status: ConnectionStatus,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Confirmed connections flagged out of sync, oldest first, at most
  /// `limit`. `owner_id` restricts the listing to one user's rows.
  fn list_out_of_sync(
    &self,
    owner_id: Option<Uuid>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Connection>, Self::Error>> + Send + '_;

  // ── Connections, transitions ─────────────────────────────────────────

  /// Open a pending request from `from` to `to`, carrying `from`'s group for
  /// `to`. Fails with a conflict when a pending, confirmed or blocked
  /// connection exists between the pair in either direction.
  fn send_request(
    &self,
    from: Uuid,
    to: Uuid,
    permission_group: Option<String>,
  ) -> impl Future<Output = Result<ConnectionRequest, Self::Error>> + Send + '_;

  /// Confirm the pending request from `requesting_user_id` to
  /// `confirming_user_id`, binding `permission_group` (one of the
  /// confirmer's groups, or `None` for nothing). Removes the request and
  /// returns the confirmer's row.
  fn confirm_request(
    &self,
    requesting_user_id: Uuid,
    confirming_user_id: Uuid,
    permission_group: Option<String>,
  ) -> impl Future<Output = Result<Connection, Self::Error>> + Send + '_;

  /// Deny the pending request and remove it.
  fn deny_request(
    &self,
    requesting_user_id: Uuid,
    denying_user_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete a connection owned by `actor_id`, in both directions. Returns the
  /// actor's row after the transition.
  fn delete_connection(
    &self,
    actor_id: Uuid,
    connection_id: Uuid,
  ) -> impl Future<Output = Result<Connection, Self::Error>> + Send + '_;

  /// Block `other_user_id` in both directions, creating the rows if the pair
  /// never had a connection.
  fn block_user(
    &self,
    actor_id: Uuid,
    other_user_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Rebind a confirmed connection owned by `actor_id` to another of the
  /// actor's groups. The peer's snapshot is flagged out of sync.
  fn set_connection_group(
    &self,
    actor_id: Uuid,
    connection_id: Uuid,
    permission_group: Option<String>,
  ) -> impl Future<Output = Result<Connection, Self::Error>> + Send + '_;

  // ── Snapshots ─────────────────────────────────────────────────────────

  /// Replace a confirmed connection's snapshot and mark it in sync, as one
  /// write, provided the row is still at `revision`.
  ///
  /// `revision` is the one read before the source profile and groups were
  /// loaded. When the row has been flagged since, nothing is written and
  /// `false` is returned; the flag stays until a rebuild from a fresh read
  /// lands.
  fn write_snapshot(
    &self,
    connection_id: Uuid,
    revision: u64,
    snapshot: ProfileSnapshot,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn mark_out_of_sync(
    &self,
    connection_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
