//! Profile loading and saving through edit sessions.

use rapport_core::{
  Result,
  change::EditSession,
  profile::{EditableFields, UserProfile},
  store::SocialStore,
};
use uuid::Uuid;

use crate::{Engine, Lift as _};

/// What a save did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
  /// Nothing differed from the persisted profile; no write was issued.
  Unchanged,
  Saved(UserProfile),
}

impl<S: SocialStore + 'static> Engine<S> {
  /// The saved profile, or an empty one if the user never saved.
  pub async fn load_profile(&self, user_id: Uuid) -> Result<UserProfile> {
    Ok(
      self
        .store
        .load_profile(user_id)
        .await
        .lift()?
        .unwrap_or_else(|| UserProfile::empty(user_id)),
    )
  }

  pub async fn begin_edit(&self, user_id: Uuid) -> Result<EditSession> {
    Ok(EditSession::begin(self.load_profile(user_id).await?))
  }

  /// Persist the session's edits when it can save. The session only adopts
  /// the saved profile once the store acknowledged the write; on failure the
  /// edits and `can_save` stay as they were.
  pub async fn save(&self, session: &mut EditSession) -> Result<SaveOutcome> {
    if !session.can_save() {
      return Ok(SaveOutcome::Unchanged);
    }

    let user_id = session.persisted().user_id;
    let saved = self
      .store
      .save_profile(user_id, session.edited().clone())
      .await
      .lift()?;
    session.mark_saved(saved.clone());

    tracing::info!(%user_id, "profile saved");
    Ok(SaveOutcome::Saved(saved))
  }

  /// Replace the whole editable part of a profile in one step.
  pub async fn save_fields(
    &self,
    user_id: Uuid,
    fields: EditableFields,
  ) -> Result<SaveOutcome> {
    let mut session = self.begin_edit(user_id).await?;
    session.update(|edited| *edited = fields);
    self.save(&mut session).await
  }
}
