//! Permission groups and field assignments.

use std::collections::BTreeSet;

use rapport_core::{
  Error, Result,
  assignment::{FieldAssignments, GroupChoice, resolve_groups_for_field},
  field::ProfileField,
  group::{GroupDraft, PermissionGroup},
  store::{GroupRemoval, GroupUpdate, SocialStore},
};
use uuid::Uuid;

use crate::{Engine, Lift as _};

impl<S: SocialStore + 'static> Engine<S> {
  // ── Groups ────────────────────────────────────────────────────────────────

  pub async fn list_groups(&self, owner_id: Uuid) -> Result<Vec<PermissionGroup>> {
    self.store.list_groups(owner_id).await.lift()
  }

  /// Create a group. A blank name is a validation error and a name already
  /// used by this owner is a conflict.
  pub async fn create_group(
    &self,
    owner_id: Uuid,
    name: impl Into<String>,
    fields: impl IntoIterator<Item = ProfileField>,
  ) -> Result<PermissionGroup> {
    let group = PermissionGroup::new(owner_id, name)?.with_fields(fields);
    let group = self.store.insert_group(group).await.lift()?;
    tracing::info!(%owner_id, group = %group.name, "permission group created");
    Ok(group)
  }

  /// Replace a group's fields. Viewers bound to it are flagged when the
  /// visible set actually changed.
  pub async fn update_group(
    &self,
    owner_id: Uuid,
    name: &str,
    fields: BTreeSet<ProfileField>,
  ) -> Result<GroupUpdate> {
    let update = self
      .store
      .update_group_fields(owner_id, name.to_owned(), fields)
      .await
      .lift()?;
    tracing::info!(
      %owner_id,
      group = name,
      flagged = update.flagged_connections,
      "permission group updated"
    );
    Ok(update)
  }

  /// Save an editor buffer: a draft opened from an existing group replaces
  /// that group's fields, a blank draft creates a new group.
  pub async fn save_draft(
    &self,
    owner_id: Uuid,
    draft: &GroupDraft,
  ) -> Result<PermissionGroup> {
    if !draft.is_saveable() {
      return Err(Error::validation("group name must not be empty"));
    }
    if draft.is_existing() {
      let update = self
        .update_group(owner_id, draft.name(), draft.fields().clone())
        .await?;
      Ok(update.group)
    } else {
      self
        .create_group(owner_id, draft.name(), draft.fields().iter().copied())
        .await
    }
  }

  /// Delete a group, releasing its field assignments and clearing every
  /// connection bound to it.
  pub async fn delete_group(&self, owner_id: Uuid, name: &str) -> Result<GroupRemoval> {
    let removal = self
      .store
      .delete_group(owner_id, name.to_owned())
      .await
      .lift()?;
    tracing::info!(
      %owner_id,
      group = name,
      released = removal.released_fields.len(),
      rebound = removal.rebound_connections,
      "permission group deleted"
    );
    Ok(removal)
  }

  // ── Assignments ───────────────────────────────────────────────────────────

  pub async fn load_assignments(&self, owner_id: Uuid) -> Result<FieldAssignments> {
    self.store.load_assignments(owner_id).await.lift()
  }

  /// Assign `field` to `group_name`, replacing any earlier assignment.
  pub async fn assign_field(
    &self,
    owner_id: Uuid,
    field: ProfileField,
    group_name: &str,
  ) -> Result<()> {
    self
      .store
      .assign_field(owner_id, field, group_name.to_owned())
      .await
      .lift()?;
    tracing::debug!(%owner_id, %field, group = group_name, "field assigned");
    Ok(())
  }

  /// The owner's groups as picker rows for `field`.
  pub async fn field_choices(
    &self,
    owner_id: Uuid,
    field: ProfileField,
  ) -> Result<Vec<GroupChoice>> {
    let groups = self.list_groups(owner_id).await?;
    let assignments = self.load_assignments(owner_id).await?;
    Ok(resolve_groups_for_field(field, &groups, &assignments))
  }
}
