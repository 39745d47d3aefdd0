//! Out-of-sync detection and reconciliation of cached profile snapshots.
//!
//! A snapshot is the projection of a source profile onto the fields a viewer's
//! bound group makes visible. Every visible field has an entry, set or not,
//! so a field entering or leaving visibility is a difference even when it
//! holds no value.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
  assignment::effective_fields_visible_to,
  connection::{Connection, SyncState},
  field::{FieldValue, ProfileField},
  group::PermissionGroup,
  profile::UserProfile,
};

/// A permission-filtered view of another user's profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileSnapshot(pub BTreeMap<ProfileField, Option<FieldValue>>);

impl ProfileSnapshot {
  pub fn get(&self, field: ProfileField) -> Option<&FieldValue> {
    self.0.get(&field).and_then(Option::as_ref)
  }

  pub fn exposes(&self, field: ProfileField) -> bool { self.0.contains_key(&field) }

  pub fn fields(&self) -> BTreeSet<ProfileField> { self.0.keys().copied().collect() }
}

/// Project `source` onto `visible`.
pub fn project(
  source: &UserProfile,
  visible: &BTreeSet<ProfileField>,
) -> ProfileSnapshot {
  ProfileSnapshot(
    visible
      .iter()
      .map(|field| (*field, source.value_of(*field)))
      .collect(),
  )
}

/// Whether `connection`'s cached snapshot differs from what `bound_group`
/// (looked up among `groups`, the source user's groups) currently allows of
/// `source`.
pub fn is_out_of_sync(
  connection: &Connection,
  source: &UserProfile,
  bound_group: Option<&str>,
  groups: &[PermissionGroup],
) -> bool {
  let expected = project(source, &effective_fields_visible_to(bound_group, groups));
  connection.snapshot.as_ref() != Some(&expected)
}

/// Overwrite the cached snapshot with the current projection and mark the
/// connection in sync. Returns whether the snapshot changed; reconciling an
/// in-sync connection changes nothing.
pub fn reconcile(
  connection: &mut Connection,
  source: &UserProfile,
  bound_group: Option<&str>,
  groups: &[PermissionGroup],
) -> bool {
  let expected = project(source, &effective_fields_visible_to(bound_group, groups));
  let changed = connection.snapshot.as_ref() != Some(&expected);
  if changed {
    connection.snapshot = Some(expected);
  }
  connection.sync_state = SyncState::InSync;
  changed
}
