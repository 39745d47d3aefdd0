//! Field-permission assignment: which group each profile field is delegated
//! to, and how a viewer's group name resolves to a set of visible fields.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  field::ProfileField,
  group::{PermissionGroup, VisibilitySummary},
};

// ─── FieldAssignments ────────────────────────────────────────────────────────

/// Per-user mapping from field to group name. A field without an entry is
/// delegated to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAssignments {
  pub user_id: Uuid,
  pub entries: BTreeMap<ProfileField, String>,
}

impl FieldAssignments {
  pub fn new(user_id: Uuid) -> Self {
    Self { user_id, entries: BTreeMap::new() }
  }

  /// Delegate `field` to `group_name`, replacing any prior assignment.
  ///
  /// The only check is that the group exists among `groups`; the group
  /// definitions themselves are left untouched.
  pub fn assign(
    &mut self,
    field: ProfileField,
    group_name: &str,
    groups: &[PermissionGroup],
  ) -> Result<()> {
    if !groups.iter().any(|g| g.name == group_name) {
      return Err(Error::not_found(format!(
        "permission group {group_name:?}"
      )));
    }
    self.entries.insert(field, group_name.to_owned());
    Ok(())
  }

  pub fn group_for(&self, field: ProfileField) -> Option<&str> {
    self.entries.get(&field).map(String::as_str)
  }

  /// Drop every assignment pointing at `group_name` and return the fields
  /// that now fall back to nothing.
  pub fn release_group(&mut self, group_name: &str) -> Vec<ProfileField> {
    let released: Vec<ProfileField> = self
      .entries
      .iter()
      .filter(|(_, g)| g.as_str() == group_name)
      .map(|(f, _)| *f)
      .collect();
    for field in &released {
      self.entries.remove(field);
    }
    released
  }
}

// ─── Group choices ───────────────────────────────────────────────────────────

/// One row of the group picker shown for a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupChoice {
  pub name:     String,
  pub summary:  VisibilitySummary,
  /// The field is currently delegated to this group.
  pub selected: bool,
  /// The group would make the field visible.
  pub grants:   bool,
}

/// Copy `candidates` into picker rows for `field`. The groups are not
/// modified.
pub fn resolve_groups_for_field(
  field: ProfileField,
  candidates: &[PermissionGroup],
  assignments: &FieldAssignments,
) -> Vec<GroupChoice> {
  let current = assignments.group_for(field);
  candidates
    .iter()
    .map(|g| GroupChoice {
      name:     g.name.clone(),
      summary:  g.summary(),
      selected: current == Some(g.name.as_str()),
      grants:   g.resolve_visibility(field),
    })
    .collect()
}

/// The fields a viewer bound to `viewer_group` may see.
///
/// An unbound viewer, or a group name that is not among `groups`, sees
/// nothing.
pub fn effective_fields_visible_to(
  viewer_group: Option<&str>,
  groups: &[PermissionGroup],
) -> BTreeSet<ProfileField> {
  viewer_group
    .and_then(|name| groups.iter().find(|g| g.name == name))
    .map(PermissionGroup::visible_fields)
    .unwrap_or_default()
}
