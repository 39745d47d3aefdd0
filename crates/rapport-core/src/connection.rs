//! Connections between users and the request/confirm/deny/delete/block state
//! machine that drives them.
//!
//! Each relationship is stored as two directed rows, one per party. The row
//! `(owner, other)` carries the group *owned by `owner`* that governs what
//! `other` may see, and `owner`'s cached snapshot *of `other`*. Transitions
//! always move both rows together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, sync::ProfileSnapshot};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionStatus {
  Pending,
  Confirmed,
  Denied,
  Blocked,
  Deleted,
}

/// An action that moves a connection between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Transition {
  Confirm,
  Deny,
  Delete,
  Block,
}

impl ConnectionStatus {
  pub fn as_str(self) -> &'static str { self.into() }

  /// The state reached by applying `transition`, or [`Error::Conflict`] when
  /// the transition is not allowed from `self`.
  ///
  /// | From | Confirm | Deny | Delete | Block |
  /// |------|---------|------|--------|-------|
  /// | Pending | Confirmed | Denied | Deleted | Blocked |
  /// | Confirmed | – | – | Deleted | Blocked |
  /// | Denied | – | – | Deleted | Blocked |
  /// | Deleted | – | – | – | Blocked |
  /// | Blocked | – | – | – | – |
  pub fn apply(self, transition: Transition) -> Result<Self> {
    use ConnectionStatus::*;
    let next = match (self, transition) {
      (Blocked, _) => None,
      (_, Transition::Block) => Some(Blocked),
      (Pending, Transition::Confirm) => Some(Confirmed),
      (Pending, Transition::Deny) => Some(Denied),
      (Pending | Confirmed | Denied, Transition::Delete) => Some(Deleted),
      _ => None,
    };
    next.ok_or_else(|| {
      Error::conflict(format!("cannot {transition} a {self} connection"))
    })
  }

  /// A new request may replace a connection in this state.
  pub fn admits_request(self) -> bool { matches!(self, Self::Denied | Self::Deleted) }
}

/// Decide whether a request may be sent given the states of the forward and
/// reverse rows between the pair, if any exist.
pub fn check_request_allowed(
  forward: Option<ConnectionStatus>,
  reverse: Option<ConnectionStatus>,
) -> Result<()> {
  let states = [forward, reverse];
  if states.contains(&Some(ConnectionStatus::Blocked)) {
    return Err(Error::conflict("users are blocked"));
  }
  if let Some(status) = states.into_iter().flatten().find(|s| !s.admits_request())
  {
    return Err(Error::conflict(format!("a {status} connection already exists")));
  }
  Ok(())
}

// ─── Sync state ──────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncState {
  InSync,
  OutOfSync,
}

impl SyncState {
  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Connection ──────────────────────────────────────────────────────────────

/// One direction of a relationship, as seen by `owner_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
  pub connection_id:    Uuid,
  pub owner_id:         Uuid,
  pub other_user_id:    Uuid,
  pub status:           ConnectionStatus,
  /// `owner`'s group governing what `other` sees. `None` means nothing.
  pub permission_group: Option<String>,
  /// `owner`'s cached view of `other`, filtered by `other`'s group for
  /// `owner`. Only confirmed connections carry one.
  pub snapshot:         Option<ProfileSnapshot>,
  pub sync_state:       SyncState,
  /// Bumped every time the row is flagged out of sync. A snapshot built
  /// from a source read at an older revision is refused.
  #[serde(default)]
  pub revision:         u64,
  pub updated_at:       DateTime<Utc>,
}

impl Connection {
  /// A fresh pending row.
  pub fn pending(
    owner_id: Uuid,
    other_user_id: Uuid,
    permission_group: Option<String>,
  ) -> Self {
    Self {
      connection_id: Uuid::new_v4(),
      owner_id,
      other_user_id,
      status: ConnectionStatus::Pending,
      permission_group,
      snapshot: None,
      sync_state: SyncState::InSync,
      revision: 0,
      updated_at: Utc::now(),
    }
  }

  pub fn is_confirmed(&self) -> bool { self.status == ConnectionStatus::Confirmed }

  /// Move to the state `transition` leads to. Leaving the confirmed state
  /// discards the cached snapshot.
  pub fn transition(&mut self, transition: Transition) -> Result<()> {
    self.status = self.status.apply(transition)?;
    if !self.is_confirmed() {
      self.snapshot = None;
      self.sync_state = SyncState::InSync;
    }
    self.updated_at = Utc::now();
    Ok(())
  }
}

// ─── ConnectionRequest ───────────────────────────────────────────────────────

/// An outstanding request. Exists only while the pair is pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
  pub requesting_user_id: Uuid,
  pub target_user_id:     Uuid,
  pub created_at:         DateTime<Utc>,
}
