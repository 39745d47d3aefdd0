//! Profile value objects: the persisted profile and the editable subset.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::field::{FieldValue, ProfileField};

// ─── Address ─────────────────────────────────────────────────────────────────

/// A postal address. Every part is optional; an empty string and a missing
/// part mean the same thing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
  pub street:   Option<String>,
  pub unit:     Option<String>,
  pub city:     Option<String>,
  pub state:    Option<String>,
  pub zip_code: Option<String>,
}

impl Address {
  /// Collapse empty strings to `None` so structurally equal addresses
  /// compare equal.
  pub fn normalized(&self) -> Self {
    Self {
      street:   non_empty(&self.street),
      unit:     non_empty(&self.unit),
      city:     non_empty(&self.city),
      state:    non_empty(&self.state),
      zip_code: non_empty(&self.zip_code),
    }
  }

  pub fn is_empty(&self) -> bool { self.normalized() == Self::default() }
}

fn non_empty(s: &Option<String>) -> Option<String> {
  s.as_deref().filter(|v| !v.is_empty()).map(str::to_owned)
}

// ─── UserProfile ─────────────────────────────────────────────────────────────

/// The last-saved, authoritative profile of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
  pub user_id:         Uuid,
  pub first_name:      Option<String>,
  pub last_name:       Option<String>,
  pub bio:             Option<String>,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub address:         Address,
  pub mailing_address: Address,
  pub birthday:        Option<NaiveDate>,
  /// Set by the store on every save; `None` for a profile never saved.
  pub updated_at:      Option<DateTime<Utc>>,
}

impl UserProfile {
  /// A profile with nothing set, used when a user has never saved one.
  pub fn empty(user_id: Uuid) -> Self {
    Self {
      user_id,
      first_name: None,
      last_name: None,
      bio: None,
      email: None,
      phone_number: None,
      address: Address::default(),
      mailing_address: Address::default(),
      birthday: None,
      updated_at: None,
    }
  }

  /// The value of `field`, or `None` when it is unset or blank.
  pub fn value_of(&self, field: ProfileField) -> Option<FieldValue> {
    let text = |s: &Option<String>| non_empty(s).map(FieldValue::Text);
    let address = |a: &Address| {
      (!a.is_empty()).then(|| FieldValue::Address(a.normalized()))
    };
    match field {
      ProfileField::FirstName => text(&self.first_name),
      ProfileField::LastName => text(&self.last_name),
      ProfileField::Bio => text(&self.bio),
      ProfileField::Email => text(&self.email),
      ProfileField::PhoneNumber => text(&self.phone_number),
      ProfileField::Address => address(&self.address),
      ProfileField::MailingAddress => address(&self.mailing_address),
      ProfileField::Birthday => self.birthday.map(FieldValue::Date),
    }
  }

  /// Overwrite the editable fields with `fields`.
  pub fn apply(&mut self, fields: EditableFields, saved_at: DateTime<Utc>) {
    self.first_name = fields.first_name;
    self.last_name = fields.last_name;
    self.bio = fields.bio;
    self.email = fields.email;
    self.phone_number = fields.phone_number;
    self.address = fields.address;
    self.mailing_address = fields.mailing_address;
    self.birthday = fields.birthday;
    self.updated_at = Some(saved_at);
  }

  /// `"First Last"`, or whichever half is set.
  pub fn display_name(&self) -> Option<String> {
    let parts: Vec<String> = [&self.first_name, &self.last_name]
      .into_iter()
      .filter_map(non_empty)
      .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
  }
}

// ─── EditableFields ──────────────────────────────────────────────────────────

/// The mutable subset of a profile, as held by an edit session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditableFields {
  pub first_name:      Option<String>,
  pub last_name:       Option<String>,
  pub bio:             Option<String>,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub address:         Address,
  pub mailing_address: Address,
  pub birthday:        Option<NaiveDate>,
}

impl From<&UserProfile> for EditableFields {
  fn from(p: &UserProfile) -> Self {
    Self {
      first_name:      p.first_name.clone(),
      last_name:       p.last_name.clone(),
      bio:             p.bio.clone(),
      email:           p.email.clone(),
      phone_number:    p.phone_number.clone(),
      address:         p.address.clone(),
      mailing_address: p.mailing_address.clone(),
      birthday:        p.birthday,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_text_reads_as_unset() {
    let mut profile = UserProfile::empty(Uuid::nil());
    profile.email = Some(String::new());
    assert_eq!(profile.value_of(ProfileField::Email), None);

    profile.email = Some("amy@example.com".into());
    assert_eq!(
      profile.value_of(ProfileField::Email),
      Some(FieldValue::Text("amy@example.com".into()))
    );
  }

  #[test]
  fn address_with_only_blank_parts_is_empty() {
    let address = Address {
      street: Some(String::new()),
      city: Some(String::new()),
      ..Address::default()
    };
    assert!(address.is_empty());
    assert_eq!(address.normalized(), Address::default());
  }

  #[test]
  fn display_name_joins_available_parts() {
    let mut profile = UserProfile::empty(Uuid::nil());
    assert_eq!(profile.display_name(), None);
    profile.last_name = Some("Pond".into());
    assert_eq!(profile.display_name().as_deref(), Some("Pond"));
    profile.first_name = Some("Amy".into());
    assert_eq!(profile.display_name().as_deref(), Some("Amy Pond"));
  }
}
