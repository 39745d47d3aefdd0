//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings and birthdays as
//! `YYYY-MM-DD`. Structured fields (addresses, field sets, snapshots) are
//! stored as compact JSON. UUIDs are stored as hyphenated lowercase strings.

use std::{collections::BTreeSet, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use rapport_core::{
  connection::{Connection, ConnectionRequest, ConnectionStatus, SyncState},
  field::ProfileField,
  group::PermissionGroup,
  profile::{Address, UserProfile},
  sync::ProfileSnapshot,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ────────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::Decode(e.to_string()))
}

// ─── Enums ────────────────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<ConnectionStatus> {
  ConnectionStatus::from_str(s)
    .map_err(|_| Error::Decode(format!("unknown connection status: {s:?}")))
}

pub fn decode_sync_state(s: &str) -> Result<SyncState> {
  SyncState::from_str(s)
    .map_err(|_| Error::Decode(format!("unknown sync state: {s:?}")))
}

pub fn decode_field(s: &str) -> Result<ProfileField> {
  ProfileField::from_str(s)
    .map_err(|_| Error::Decode(format!("unknown field id: {s:?}")))
}

// ─── JSON columns ─────────────────────────────────────────────────────────────

pub fn encode_address(a: &Address) -> Result<String> { Ok(serde_json::to_string(a)?) }

pub fn encode_fields(fields: &BTreeSet<ProfileField>) -> Result<String> {
  Ok(serde_json::to_string(fields)?)
}

pub fn decode_fields(s: &str) -> Result<BTreeSet<ProfileField>> {
  Ok(serde_json::from_str(s)?)
}

pub fn encode_snapshot(s: &ProfileSnapshot) -> Result<String> {
  Ok(serde_json::to_string(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawConnection::from_row`].
pub const CONNECTION_COLUMNS: &str = "c.connection_id, c.owner_id, c.other_user_id, \
   c.status, c.permission_group, c.snapshot, c.sync_state, c.revision, c.updated_at";

/// Raw strings read directly from a `connections` row.
pub struct RawConnection {
  pub connection_id:    String,
  pub owner_id:         String,
  pub other_user_id:    String,
  pub status:           String,
  pub permission_group: Option<String>,
  pub snapshot:         Option<String>,
  pub sync_state:       String,
  pub revision:         i64,
  pub updated_at:       String,
}

impl RawConnection {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      connection_id:    row.get(0)?,
      owner_id:         row.get(1)?,
      other_user_id:    row.get(2)?,
      status:           row.get(3)?,
      permission_group: row.get(4)?,
      snapshot:         row.get(5)?,
      sync_state:       row.get(6)?,
      revision:         row.get(7)?,
      updated_at:       row.get(8)?,
    })
  }

  pub fn into_connection(self) -> Result<Connection> {
    let snapshot = self
      .snapshot
      .as_deref()
      .map(serde_json::from_str::<ProfileSnapshot>)
      .transpose()?;

    Ok(Connection {
      connection_id: decode_uuid(&self.connection_id)?,
      owner_id: decode_uuid(&self.owner_id)?,
      other_user_id: decode_uuid(&self.other_user_id)?,
      status: decode_status(&self.status)?,
      permission_group: self.permission_group,
      snapshot,
      sync_state: decode_sync_state(&self.sync_state)?,
      revision: u64::try_from(self.revision)
        .map_err(|_| Error::Decode(format!("negative revision: {}", self.revision)))?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `permission_groups` row.
pub struct RawGroup {
  pub group_id:   String,
  pub owner_id:   String,
  pub name:       String,
  pub fields:     String,
  pub created_at: String,
}

impl RawGroup {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:   row.get(0)?,
      owner_id:   row.get(1)?,
      name:       row.get(2)?,
      fields:     row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_group(self) -> Result<PermissionGroup> {
    Ok(PermissionGroup::from_parts(
      decode_uuid(&self.group_id)?,
      decode_uuid(&self.owner_id)?,
      self.name,
      decode_fields(&self.fields)?,
      decode_dt(&self.created_at)?,
    ))
  }
}

/// Raw strings read directly from a `profiles` row.
pub struct RawProfile {
  pub user_id:         String,
  pub first_name:      Option<String>,
  pub last_name:       Option<String>,
  pub bio:             Option<String>,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub address:         String,
  pub mailing_address: String,
  pub birthday:        Option<String>,
  pub updated_at:      String,
}

impl RawProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:         row.get(0)?,
      first_name:      row.get(1)?,
      last_name:       row.get(2)?,
      bio:             row.get(3)?,
      email:           row.get(4)?,
      phone_number:    row.get(5)?,
      address:         row.get(6)?,
      mailing_address: row.get(7)?,
      birthday:        row.get(8)?,
      updated_at:      row.get(9)?,
    })
  }

  pub fn into_profile(self) -> Result<UserProfile> {
    Ok(UserProfile {
      user_id:         decode_uuid(&self.user_id)?,
      first_name:      self.first_name,
      last_name:       self.last_name,
      bio:             self.bio,
      email:           self.email,
      phone_number:    self.phone_number,
      address:         serde_json::from_str(&self.address)?,
      mailing_address: serde_json::from_str(&self.mailing_address)?,
      birthday:        self.birthday.as_deref().map(decode_date).transpose()?,
      updated_at:      Some(decode_dt(&self.updated_at)?),
    })
  }
}

/// Raw strings read directly from a `connection_requests` row.
pub struct RawRequest {
  pub requesting_user_id: String,
  pub target_user_id:     String,
  pub created_at:         String,
}

impl RawRequest {
  pub fn into_request(self) -> Result<ConnectionRequest> {
    Ok(ConnectionRequest {
      requesting_user_id: decode_uuid(&self.requesting_user_id)?,
      target_user_id:     decode_uuid(&self.target_user_id)?,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}
