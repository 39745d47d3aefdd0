//! Permission groups: named sets of profile fields a connection may see.
//!
//! A group either grants every field ([`GroupScope::Everyone`]) or exactly the
//! fields in its custom set. An empty custom set is an ordinary state meaning
//! "nothing visible"; it is not a sentinel.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, field::ProfileField};

/// The group name that is read as "every field visible", compared
/// case-insensitively.
pub const EVERYONE_GROUP_NAME: &str = "ALL";

// ─── Scope ───────────────────────────────────────────────────────────────────

/// What a group grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum GroupScope {
  Everyone,
  Custom(BTreeSet<ProfileField>),
}

impl GroupScope {
  fn for_name(name: &str, fields: BTreeSet<ProfileField>) -> Self {
    if name.eq_ignore_ascii_case(EVERYONE_GROUP_NAME) {
      Self::Everyone
    } else {
      Self::Custom(fields)
    }
  }
}

/// The badge view of a group's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum VisibilitySummary {
  Everything,
  Nothing,
  Fields(Vec<ProfileField>),
}

// ─── PermissionGroup ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroup {
  pub group_id:   Uuid,
  pub owner_id:   Uuid,
  /// Unique per owner, compared case-sensitively. Never changes once saved.
  pub name:       String,
  pub scope:      GroupScope,
  pub created_at: DateTime<Utc>,
}

impl PermissionGroup {
  /// Create an unsaved group with no fields.
  ///
  /// Fails with [`Error::Validation`] if `name` is empty or whitespace.
  pub fn new(owner_id: Uuid, name: impl Into<String>) -> Result<Self> {
    let name = name.into();
    if name.trim().is_empty() {
      return Err(Error::validation("group name must not be empty"));
    }
    Ok(Self::from_parts(
      Uuid::new_v4(),
      owner_id,
      name,
      BTreeSet::new(),
      Utc::now(),
    ))
  }

  /// Rebuild a group from stored parts. The scope is derived from the name,
  /// so a group named `ALL` always grants everything.
  pub fn from_parts(
    group_id: Uuid,
    owner_id: Uuid,
    name: String,
    fields: BTreeSet<ProfileField>,
    created_at: DateTime<Utc>,
  ) -> Self {
    let scope = GroupScope::for_name(&name, fields);
    Self { group_id, owner_id, name, scope, created_at }
  }

  pub fn with_fields(
    mut self,
    fields: impl IntoIterator<Item = ProfileField>,
  ) -> Self {
    for field in fields {
      self.toggle_field(field, true);
    }
    self
  }

  pub fn is_everyone(&self) -> bool { matches!(self.scope, GroupScope::Everyone) }

  /// The explicit field set; empty for an everyone group.
  pub fn fields(&self) -> BTreeSet<ProfileField> {
    match &self.scope {
      GroupScope::Everyone => BTreeSet::new(),
      GroupScope::Custom(fields) => fields.clone(),
    }
  }

  /// Add or remove `field`. Returns whether membership changed; repeating a
  /// toggle with the same `enabled` value is a no-op.
  pub fn toggle_field(&mut self, field: ProfileField, enabled: bool) -> bool {
    match &mut self.scope {
      GroupScope::Everyone => false,
      GroupScope::Custom(fields) if enabled => fields.insert(field),
      GroupScope::Custom(fields) => fields.remove(&field),
    }
  }

  pub fn resolve_visibility(&self, field: ProfileField) -> bool {
    match &self.scope {
      GroupScope::Everyone => true,
      GroupScope::Custom(fields) => fields.contains(&field),
    }
  }

  /// Every field of the vocabulary this group grants.
  pub fn visible_fields(&self) -> BTreeSet<ProfileField> {
    ProfileField::ALL
      .into_iter()
      .filter(|f| self.resolve_visibility(*f))
      .collect()
  }

  /// A group with an empty field set is still saveable; it grants nothing.
  pub fn is_saveable(&self) -> bool { !self.name.trim().is_empty() }

  pub fn summary(&self) -> VisibilitySummary {
    match &self.scope {
      GroupScope::Everyone => VisibilitySummary::Everything,
      GroupScope::Custom(fields) if fields.is_empty() => {
        VisibilitySummary::Nothing
      }
      GroupScope::Custom(fields) => {
        VisibilitySummary::Fields(fields.iter().copied().collect())
      }
    }
  }
}

// ─── GroupDraft ──────────────────────────────────────────────────────────────

/// Editor buffer for creating or changing a group.
///
/// Toggle positions are read from the field set; nothing else mirrors it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDraft {
  name:        String,
  fields:      BTreeSet<ProfileField>,
  name_locked: bool,
}

impl GroupDraft {
  /// A blank draft for a new group.
  pub fn new() -> Self { Self::default() }

  /// A draft of an existing group. Its name can no longer change.
  pub fn edit(group: &PermissionGroup) -> Self {
    Self {
      name:        group.name.clone(),
      fields:      group.fields(),
      name_locked: true,
    }
  }

  pub fn name(&self) -> &str { &self.name }

  pub fn is_existing(&self) -> bool { self.name_locked }

  pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
    if self.name_locked {
      return Err(Error::validation(format!(
        "group {:?} cannot be renamed",
        self.name
      )));
    }
    self.name = name.into();
    Ok(())
  }

  pub fn toggle_field(&mut self, field: ProfileField, enabled: bool) -> bool {
    if enabled {
      self.fields.insert(field)
    } else {
      self.fields.remove(&field)
    }
  }

  pub fn is_enabled(&self, field: ProfileField) -> bool {
    self.fields.contains(&field)
  }

  pub fn fields(&self) -> &BTreeSet<ProfileField> { &self.fields }

  pub fn is_saveable(&self) -> bool { !self.name.trim().is_empty() }
}
