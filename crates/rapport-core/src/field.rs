//! The fixed vocabulary of profile fields and their typed values.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, profile::Address};

// ─── ProfileField ────────────────────────────────────────────────────────────

/// A field of a user profile whose visibility a permission group controls.
///
/// Serialised as camelCase identifiers (`phoneNumber`, `mailingAddress`) both
/// on the wire and in storage.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ProfileField {
  FirstName,
  LastName,
  Bio,
  Email,
  PhoneNumber,
  Address,
  MailingAddress,
  Birthday,
}

impl ProfileField {
  /// Every field, in declaration order.
  pub const ALL: [ProfileField; 8] = [
    Self::FirstName,
    Self::LastName,
    Self::Bio,
    Self::Email,
    Self::PhoneNumber,
    Self::Address,
    Self::MailingAddress,
    Self::Birthday,
  ];

  /// The identifier used on the wire and in storage.
  pub fn as_str(self) -> &'static str { self.into() }

  /// Parse a field identifier, rejecting anything outside the vocabulary.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s)
      .map_err(|_| Error::validation(format!("unknown field id: {s:?}")))
  }

  /// Label for display, e.g. `"Mailing Address"`.
  pub fn human_readable(self) -> &'static str {
    match self {
      Self::FirstName => "First Name",
      Self::LastName => "Last Name",
      Self::Bio => "Bio",
      Self::Email => "Email",
      Self::PhoneNumber => "Phone Number",
      Self::Address => "Address",
      Self::MailingAddress => "Mailing Address",
      Self::Birthday => "Birthday",
    }
  }
}

// ─── FieldValue ──────────────────────────────────────────────────────────────

/// The value a profile field holds when it is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
  Text(String),
  Address(Address),
  Date(NaiveDate),
}
