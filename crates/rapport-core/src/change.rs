//! Change detection between an in-progress edit and the persisted profile.
//!
//! Comparison is resolved per field type at compile time through [`Tracked`].
//! Free text carries one normalisation rule: an empty string and a missing
//! value are the same logical empty state.

use chrono::NaiveDate;

use crate::profile::{Address, EditableFields, UserProfile};

// ─── Comparison ──────────────────────────────────────────────────────────────

/// A field type whose edits are compared against the persisted value.
pub trait Tracked: PartialEq {
  /// Whether the value counts as unset.
  fn is_blank(&self) -> bool { false }
}

impl Tracked for String {
  fn is_blank(&self) -> bool { self.is_empty() }
}

impl Tracked for NaiveDate {}

/// Whether `edited` differs meaningfully from `persisted`.
pub fn has_changed<T: Tracked>(persisted: Option<&T>, edited: Option<&T>) -> bool {
  let persisted = persisted.filter(|v| !v.is_blank());
  let edited = edited.filter(|v| !v.is_blank());
  persisted != edited
}

fn text_changed(persisted: &Option<String>, edited: &Option<String>) -> bool {
  has_changed(persisted.as_ref(), edited.as_ref())
}

fn address_changed(persisted: &Address, edited: &Address) -> bool {
  text_changed(&persisted.street, &edited.street)
    || text_changed(&persisted.unit, &edited.unit)
    || text_changed(&persisted.city, &edited.city)
    || text_changed(&persisted.state, &edited.state)
    || text_changed(&persisted.zip_code, &edited.zip_code)
}

/// Whether any tracked field of `edited` differs from `persisted`.
pub fn compute_dirty(persisted: &UserProfile, edited: &EditableFields) -> bool {
  text_changed(&persisted.first_name, &edited.first_name)
    || text_changed(&persisted.last_name, &edited.last_name)
    || text_changed(&persisted.bio, &edited.bio)
    || text_changed(&persisted.phone_number, &edited.phone_number)
    || text_changed(&persisted.email, &edited.email)
    || address_changed(&persisted.address, &edited.address)
    || address_changed(&persisted.mailing_address, &edited.mailing_address)
    || has_changed(persisted.birthday.as_ref(), edited.birthday.as_ref())
}

// ─── EditSession ─────────────────────────────────────────────────────────────

/// The edit buffer of one editing session: the last-persisted profile plus
/// the fields being edited, and the aggregate `can_save` flag.
#[derive(Debug, Clone)]
pub struct EditSession {
  persisted: UserProfile,
  edited:    EditableFields,
  can_save:  bool,
}

impl EditSession {
  pub fn begin(persisted: UserProfile) -> Self {
    let edited = EditableFields::from(&persisted);
    Self { persisted, edited, can_save: false }
  }

  pub fn persisted(&self) -> &UserProfile { &self.persisted }

  pub fn edited(&self) -> &EditableFields { &self.edited }

  pub fn can_save(&self) -> bool { self.can_save }

  /// Apply an edit and recompute `can_save`. Returns whether the flag
  /// flipped.
  pub fn update(&mut self, edit: impl FnOnce(&mut EditableFields)) -> bool {
    edit(&mut self.edited);
    self.recompute()
  }

  /// Whether the mailing address currently equals the home address.
  pub fn same_as_home(&self) -> bool {
    self.edited.mailing_address.normalized() == self.edited.address.normalized()
  }

  /// Turning this on copies the current home address into the mailing
  /// address once; later home edits do not follow. Turning it off clears
  /// the mailing address.
  pub fn set_same_as_home(&mut self, same: bool) -> bool {
    self.update(|fields| {
      fields.mailing_address = if same {
        fields.address.clone()
      } else {
        Address::default()
      };
    })
  }

  /// Replace the persisted snapshot after the store acknowledged a save.
  /// A failed save must not call this, so the edits and `can_save` survive.
  pub fn mark_saved(&mut self, saved: UserProfile) -> bool {
    self.persisted = saved;
    self.recompute()
  }

  /// End the session without saving.
  pub fn discard(self) -> UserProfile { self.persisted }

  fn recompute(&mut self) -> bool {
    let dirty = compute_dirty(&self.persisted, &self.edited);
    let flipped = dirty != self.can_save;
    self.can_save = dirty;
    flipped
  }
}
