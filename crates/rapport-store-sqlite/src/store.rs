//! [`SqliteStore`]: the SQLite implementation of [`SocialStore`].

use std::{collections::BTreeSet, path::Path, str::FromStr};

use chrono::Utc;
use rapport_core::{
  Error as CoreError,
  assignment::FieldAssignments,
  connection::{
    Connection, ConnectionRequest, ConnectionStatus, SyncState, Transition,
    check_request_allowed,
  },
  field::ProfileField,
  group::PermissionGroup,
  profile::{EditableFields, UserProfile},
  store::{GroupRemoval, GroupUpdate, SocialStore},
  sync::ProfileSnapshot,
};
use rusqlite::{OptionalExtension as _, Transaction, types::Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    CONNECTION_COLUMNS, RawConnection, RawGroup, RawProfile, RawRequest,
    decode_field, decode_uuid, encode_address, encode_date, encode_dt,
    encode_fields, encode_snapshot, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Transactions ────────────────────────────────────────────────────────────

/// A failure inside a transaction: SQLite itself, or a domain rule checked
/// against the rows the transaction read.
enum TxError {
  Sql(rusqlite::Error),
  Rule(CoreError),
}

impl From<rusqlite::Error> for TxError {
  fn from(e: rusqlite::Error) -> Self { Self::Sql(e) }
}

impl From<CoreError> for TxError {
  fn from(e: CoreError) -> Self { Self::Rule(e) }
}

impl From<Error> for TxError {
  fn from(e: Error) -> Self { Self::Rule(e.into()) }
}

type TxResult<T> = std::result::Result<T, TxError>;

/// Run `f` in one transaction and commit only if it succeeds. A rule failure
/// rolls everything back and is handed back as a value, so no partial
/// mutation is ever visible.
fn in_transaction<T>(
  conn: &mut rusqlite::Connection,
  f: impl FnOnce(&Transaction<'_>) -> TxResult<T>,
) -> tokio_rusqlite::Result<std::result::Result<T, CoreError>> {
  let tx = conn.transaction()?;
  match f(&tx) {
    Ok(value) => {
      tx.commit()?;
      Ok(Ok(value))
    }
    Err(TxError::Rule(e)) => Ok(Err(e)),
    Err(TxError::Sql(e)) => Err(e.into()),
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn parse_status(s: &str) -> TxResult<ConnectionStatus> {
  ConnectionStatus::from_str(s).map_err(|_| {
    TxError::Rule(CoreError::Storage(format!("unknown connection status: {s:?}")))
  })
}

fn status_of(
  conn: &rusqlite::Connection,
  owner: &str,
  other: &str,
) -> TxResult<Option<ConnectionStatus>> {
  let raw: Option<String> = conn
    .query_row(
      "SELECT status FROM connections WHERE owner_id = ?1 AND other_user_id = ?2",
      rusqlite::params![owner, other],
      |r| r.get(0),
    )
    .optional()?;
  raw.as_deref().map(parse_status).transpose()
}

fn read_connection(
  conn: &rusqlite::Connection,
  owner: &str,
  other: &str,
) -> rusqlite::Result<Option<RawConnection>> {
  conn
    .query_row(
      &format!(
        "SELECT {CONNECTION_COLUMNS} FROM connections c
         WHERE c.owner_id = ?1 AND c.other_user_id = ?2"
      ),
      rusqlite::params![owner, other],
      RawConnection::from_row,
    )
    .optional()
}

fn read_connection_by_id(
  conn: &rusqlite::Connection,
  connection_id: &str,
) -> rusqlite::Result<Option<RawConnection>> {
  conn
    .query_row(
      &format!(
        "SELECT {CONNECTION_COLUMNS} FROM connections c WHERE c.connection_id = ?1"
      ),
      rusqlite::params![connection_id],
      RawConnection::from_row,
    )
    .optional()
}

/// The actor's own row with id `connection_id`; another user's row reads as
/// missing.
fn owned_connection(
  conn: &rusqlite::Connection,
  actor: &str,
  connection_id: &str,
) -> TxResult<RawConnection> {
  read_connection_by_id(conn, connection_id)?
    .filter(|raw| raw.owner_id == actor)
    .ok_or_else(|| CoreError::not_found(format!("connection {connection_id}")).into())
}

fn require_group(
  conn: &rusqlite::Connection,
  owner: &str,
  name: Option<&str>,
) -> TxResult<()> {
  let Some(name) = name else { return Ok(()) };
  let exists = conn
    .query_row(
      "SELECT 1 FROM permission_groups WHERE owner_id = ?1 AND name = ?2",
      rusqlite::params![owner, name],
      |_| Ok(()),
    )
    .optional()?
    .is_some();
  if !exists {
    return Err(CoreError::not_found(format!("permission group {name:?}")).into());
  }
  Ok(())
}

fn request_exists(
  conn: &rusqlite::Connection,
  requesting: &str,
  target: &str,
) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM connection_requests
         WHERE requesting_user_id = ?1 AND target_user_id = ?2",
        rusqlite::params![requesting, target],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

fn delete_requests_between(
  conn: &rusqlite::Connection,
  a: &str,
  b: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "DELETE FROM connection_requests
     WHERE (requesting_user_id = ?1 AND target_user_id = ?2)
        OR (requesting_user_id = ?2 AND target_user_id = ?1)",
    rusqlite::params![a, b],
  )?;
  Ok(())
}

/// Insert or reset the row `(owner, other)`, discarding any snapshot. An
/// existing row keeps its id.
fn put_row(
  conn: &rusqlite::Connection,
  owner: &str,
  other: &str,
  status: ConnectionStatus,
  permission_group: Option<&str>,
  now: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO connections (
       connection_id, owner_id, other_user_id, status,
       permission_group, snapshot, sync_state, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, 'in_sync', ?6)
     ON CONFLICT (owner_id, other_user_id) DO UPDATE SET
       status           = excluded.status,
       permission_group = excluded.permission_group,
       snapshot         = NULL,
       sync_state       = 'in_sync',
       revision         = connections.revision + 1,
       updated_at       = excluded.updated_at",
    rusqlite::params![
      encode_uuid(Uuid::new_v4()),
      owner,
      other,
      status.as_str(),
      permission_group,
      now,
    ],
  )?;
  Ok(())
}

/// Move the row `(owner, other)` to `status`, discarding any snapshot.
fn set_status(
  conn: &rusqlite::Connection,
  owner: &str,
  other: &str,
  status: ConnectionStatus,
  sync_state: SyncState,
  now: &str,
) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE connections
     SET status = ?3, snapshot = NULL, sync_state = ?4, updated_at = ?5,
         revision = revision + 1
     WHERE owner_id = ?1 AND other_user_id = ?2",
    rusqlite::params![owner, other, status.as_str(), sync_state.as_str(), now],
  )
}

/// Flag the snapshots peers hold of `owner` when the peer is bound to
/// `owner`'s group `group_name`.
fn flag_bound_peers(
  conn: &rusqlite::Connection,
  owner: &str,
  group_name: &str,
) -> rusqlite::Result<usize> {
  conn.execute(
    "UPDATE connections SET sync_state = 'out_of_sync', revision = revision + 1
     WHERE other_user_id = ?1 AND status = 'confirmed'
       AND owner_id IN (
         SELECT other_user_id FROM connections
         WHERE owner_id = ?1 AND permission_group = ?2 AND status = 'confirmed'
       )",
    rusqlite::params![owner, group_name],
  )
}

/// Escape `LIKE` wildcards so `filter` matches literally under `ESCAPE '\'`.
fn escape_like(filter: &str) -> String {
  let mut escaped = String::with_capacity(filter.len());
  for c in filter.chars() {
    if matches!(c, '\\' | '%' | '_') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped
}

/// Resolve a pending request from `requesting` to `target` with
/// `transition`. A request that is already gone is a conflict when the pair
/// has moved on, and missing otherwise.
fn resolve_request(
  tx: &Transaction<'_>,
  requesting: &str,
  target: &str,
  transition: Transition,
) -> TxResult<ConnectionStatus> {
  let status = status_of(tx, target, requesting)?;
  if !request_exists(tx, requesting, target)? {
    return Err(
      match status {
        Some(s) if s != ConnectionStatus::Pending => CoreError::conflict(
          format!("request from {requesting} is already {s}"),
        ),
        _ => CoreError::not_found(format!("pending request from {requesting}")),
      }
      .into(),
    );
  }
  let status = status.ok_or_else(|| {
    CoreError::not_found(format!("connection with {requesting}"))
  })?;
  Ok(status.apply(transition)?)
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Rapport store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store: useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_connections(
    &self,
    sql: String,
    params: Vec<Value>,
  ) -> Result<Vec<Connection>> {
    let raws: Vec<RawConnection> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params_from_iter(params.iter()),
            RawConnection::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawConnection::into_connection).collect()
  }
}

// ─── SocialStore impl ────────────────────────────────────────────────────────

impl SocialStore for SqliteStore {
  type Error = Error;

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn load_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
    let id_str = encode_uuid(user_id);

    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT user_id, first_name, last_name, bio, email, phone_number,
                      address, mailing_address, birthday, updated_at
               FROM profiles WHERE user_id = ?1",
              rusqlite::params![id_str],
              RawProfile::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }

  async fn save_profile(
    &self,
    user_id: Uuid,
    fields:  EditableFields,
  ) -> Result<UserProfile> {
    let mut profile = UserProfile::empty(user_id);
    profile.apply(fields, Utc::now());

    let id_str       = encode_uuid(user_id);
    let first_name   = profile.first_name.clone();
    let last_name    = profile.last_name.clone();
    let bio          = profile.bio.clone();
    let email        = profile.email.clone();
    let phone_number = profile.phone_number.clone();
    let address      = encode_address(&profile.address)?;
    let mailing      = encode_address(&profile.mailing_address)?;
    let birthday     = profile.birthday.map(encode_date);
    let at_str       = encode_dt(profile.updated_at.unwrap_or_else(Utc::now));

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO profiles (
             user_id, first_name, last_name, bio, email, phone_number,
             address, mailing_address, birthday, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
           ON CONFLICT (user_id) DO UPDATE SET
             first_name      = excluded.first_name,
             last_name       = excluded.last_name,
             bio             = excluded.bio,
             email           = excluded.email,
             phone_number    = excluded.phone_number,
             address         = excluded.address,
             mailing_address = excluded.mailing_address,
             birthday        = excluded.birthday,
             updated_at      = excluded.updated_at",
          rusqlite::params![
            id_str,
            first_name,
            last_name,
            bio,
            email,
            phone_number,
            address,
            mailing,
            birthday,
            at_str,
          ],
        )?;
        // Every snapshot of this profile is now a reconciliation candidate.
        tx.execute(
          "UPDATE connections SET sync_state = 'out_of_sync', revision = revision + 1
           WHERE other_user_id = ?1 AND status = 'confirmed'",
          rusqlite::params![id_str],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(profile)
  }

  // ── Permission groups ─────────────────────────────────────────────────────

  async fn list_groups(&self, owner_id: Uuid) -> Result<Vec<PermissionGroup>> {
    let owner_str = encode_uuid(owner_id);

    let raws: Vec<RawGroup> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT group_id, owner_id, name, fields, created_at
           FROM permission_groups WHERE owner_id = ?1
           ORDER BY created_at, name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![owner_str], RawGroup::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGroup::into_group).collect()
  }

  async fn insert_group(&self, group: PermissionGroup) -> Result<PermissionGroup> {
    let id_str     = encode_uuid(group.group_id);
    let owner_str  = encode_uuid(group.owner_id);
    let name       = group.name.clone();
    let fields_str = encode_fields(&group.fields())?;
    let at_str     = encode_dt(group.created_at);

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          let taken = tx
            .query_row(
              "SELECT 1 FROM permission_groups WHERE owner_id = ?1 AND name = ?2",
              rusqlite::params![owner_str, name],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if taken {
            return Err(
              CoreError::conflict(format!("permission group {name:?} already exists"))
                .into(),
            );
          }
          tx.execute(
            "INSERT INTO permission_groups (group_id, owner_id, name, fields, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id_str, owner_str, name, fields_str, at_str],
          )?;
          Ok(())
        })
      })
      .await?;

    outcome?;
    Ok(group)
  }

  async fn update_group_fields(
    &self,
    owner_id: Uuid,
    name:     String,
    fields:   BTreeSet<ProfileField>,
  ) -> Result<GroupUpdate> {
    let owner_str = encode_uuid(owner_id);

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          let raw = tx
            .query_row(
              "SELECT group_id, owner_id, name, fields, created_at
               FROM permission_groups WHERE owner_id = ?1 AND name = ?2",
              rusqlite::params![owner_str, name],
              RawGroup::from_row,
            )
            .optional()?
            .ok_or_else(|| CoreError::not_found(format!("permission group {name:?}")))?;

          let before = raw.into_group()?;
          let after = PermissionGroup::from_parts(
            before.group_id,
            before.owner_id,
            before.name.clone(),
            fields,
            before.created_at,
          );

          tx.execute(
            "UPDATE permission_groups SET fields = ?3 WHERE owner_id = ?1 AND name = ?2",
            rusqlite::params![owner_str, name, encode_fields(&after.fields())?],
          )?;

          let flagged = if before.visible_fields() != after.visible_fields() {
            flag_bound_peers(tx, &owner_str, &name)?
          } else {
            0
          };

          Ok(GroupUpdate { group: after, flagged_connections: flagged })
        })
      })
      .await?;

    Ok(outcome?)
  }

  async fn delete_group(&self, owner_id: Uuid, name: String) -> Result<GroupRemoval> {
    let owner_str = encode_uuid(owner_id);

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          let deleted = tx.execute(
            "DELETE FROM permission_groups WHERE owner_id = ?1 AND name = ?2",
            rusqlite::params![owner_str, name],
          )?;
          if deleted == 0 {
            return Err(CoreError::not_found(format!("permission group {name:?}")).into());
          }

          let released: Vec<String> = {
            let mut stmt = tx.prepare(
              "SELECT field FROM field_assignments WHERE owner_id = ?1 AND group_name = ?2",
            )?;
            stmt
              .query_map(rusqlite::params![owner_str, name], |r| r.get(0))?
              .collect::<rusqlite::Result<Vec<_>>>()?
          };
          tx.execute(
            "DELETE FROM field_assignments WHERE owner_id = ?1 AND group_name = ?2",
            rusqlite::params![owner_str, name],
          )?;

          flag_bound_peers(tx, &owner_str, &name)?;
          let rebound = tx.execute(
            "UPDATE connections SET permission_group = NULL
             WHERE owner_id = ?1 AND permission_group = ?2",
            rusqlite::params![owner_str, name],
          )?;

          let mut released_fields = released
            .iter()
            .map(|f| decode_field(f))
            .collect::<Result<Vec<_>>>()?;
          released_fields.sort();

          Ok(GroupRemoval { released_fields, rebound_connections: rebound })
        })
      })
      .await?;

    Ok(outcome?)
  }

  // ── Field assignments ─────────────────────────────────────────────────────

  async fn load_assignments(&self, owner_id: Uuid) -> Result<FieldAssignments> {
    let owner_str = encode_uuid(owner_id);

    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT field, group_name FROM field_assignments WHERE owner_id = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![owner_str], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut assignments = FieldAssignments::new(owner_id);
    for (field, group_name) in rows {
      assignments.entries.insert(decode_field(&field)?, group_name);
    }
    Ok(assignments)
  }

  async fn assign_field(
    &self,
    owner_id:   Uuid,
    field:      ProfileField,
    group_name: String,
  ) -> Result<()> {
    let owner_str = encode_uuid(owner_id);
    let field_str = field.as_str();

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          require_group(tx, &owner_str, Some(&group_name))?;
          tx.execute(
            "INSERT INTO field_assignments (owner_id, field, group_name)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (owner_id, field) DO UPDATE SET group_name = excluded.group_name",
            rusqlite::params![owner_str, field_str, group_name],
          )?;
          Ok(())
        })
      })
      .await?;

    Ok(outcome?)
  }

  // ── Connections, reads ───────────────────────────────────────────────────

  async fn load_connections(
    &self,
    user_id:     Uuid,
    name_filter: Option<String>,
  ) -> Result<Vec<Connection>> {
    let pattern = name_filter
      .map(|f| f.trim().to_lowercase())
      .filter(|f| !f.is_empty())
      .map(|f| format!("%{}%", escape_like(&f)));

    let sql = format!(
      "SELECT {CONNECTION_COLUMNS}
       FROM connections c
       LEFT JOIN profiles p ON p.user_id = c.other_user_id
       WHERE c.owner_id = ?1 AND c.status = 'confirmed'
         AND (?2 IS NULL OR lower(trim(
               coalesce(p.first_name, '') || ' ' || coalesce(p.last_name, '')
             )) LIKE ?2 ESCAPE '\\')
       ORDER BY lower(coalesce(p.first_name, '')),
                lower(coalesce(p.last_name, '')),
                c.connection_id"
    );

    self
      .query_connections(sql, vec![
        Value::Text(encode_uuid(user_id)),
        pattern.map_or(Value::Null, Value::Text),
      ])
      .await
  }

  async fn get_connection(&self, connection_id: Uuid) -> Result<Option<Connection>> {
    let id_str = encode_uuid(connection_id);

    let raw = self
      .conn
      .call(move |conn| Ok(read_connection_by_id(conn, &id_str)?))
      .await?;

    raw.map(RawConnection::into_connection).transpose()
  }

  async fn find_connection(
    &self,
    owner_id:      Uuid,
    other_user_id: Uuid,
  ) -> Result<Option<Connection>> {
    let owner_str = encode_uuid(owner_id);
    let other_str = encode_uuid(other_user_id);

    let raw = self
      .conn
      .call(move |conn| Ok(read_connection(conn, &owner_str, &other_str)?))
      .await?;

    raw.map(RawConnection::into_connection).transpose()
  }

  async fn load_requests(&self, user_id: Uuid) -> Result<Vec<ConnectionRequest>> {
    let id_str = encode_uuid(user_id);

    let raws: Vec<RawRequest> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT requesting_user_id, target_user_id, created_at
           FROM connection_requests WHERE target_user_id = ?1
           ORDER BY created_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawRequest {
              requesting_user_id: row.get(0)?,
              target_user_id:     row.get(1)?,
              created_at:         row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRequest::into_request).collect()
  }

  async fn list_peers(&self, user_id: Uuid, status: ConnectionStatus) -> Result<Vec<Uuid>> {
    let id_str     = encode_uuid(user_id);
    let status_str = status.as_str();

    let ids: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT other_user_id FROM connections
           WHERE owner_id = ?1 AND status = ?2
           ORDER BY updated_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, status_str], |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    ids.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn list_out_of_sync(
    &self,
    owner_id: Option<Uuid>,
    limit:    usize,
  ) -> Result<Vec<Connection>> {
    let sql = format!(
      "SELECT {CONNECTION_COLUMNS}
       FROM connections c
       WHERE c.status = 'confirmed' AND c.sync_state = 'out_of_sync'
         AND (?1 IS NULL OR c.owner_id = ?1)
       ORDER BY c.updated_at
       LIMIT ?2"
    );

    self
      .query_connections(sql, vec![
        owner_id.map_or(Value::Null, |id| Value::Text(encode_uuid(id))),
        Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)),
      ])
      .await
  }

  // ── Connections, transitions ─────────────────────────────────────────────

  async fn send_request(
    &self,
    from:             Uuid,
    to:               Uuid,
    permission_group: Option<String>,
  ) -> Result<ConnectionRequest> {
    if from == to {
      return Err(CoreError::validation("cannot send a request to yourself").into());
    }

    let request = ConnectionRequest {
      requesting_user_id: from,
      target_user_id:     to,
      created_at:         Utc::now(),
    };

    let from_str = encode_uuid(from);
    let to_str   = encode_uuid(to);
    let at_str   = encode_dt(request.created_at);

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          let forward = status_of(tx, &from_str, &to_str)?;
          let reverse = status_of(tx, &to_str, &from_str)?;
          check_request_allowed(forward, reverse)?;
          require_group(tx, &from_str, permission_group.as_deref())?;

          let pending = ConnectionStatus::Pending;
          put_row(tx, &from_str, &to_str, pending, permission_group.as_deref(), &at_str)?;
          put_row(tx, &to_str, &from_str, pending, None, &at_str)?;
          tx.execute(
            "INSERT OR REPLACE INTO connection_requests
               (requesting_user_id, target_user_id, created_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![from_str, to_str, at_str],
          )?;
          Ok(())
        })
      })
      .await?;

    outcome?;
    Ok(request)
  }

  async fn confirm_request(
    &self,
    requesting_user_id: Uuid,
    confirming_user_id: Uuid,
    permission_group:   Option<String>,
  ) -> Result<Connection> {
    let req_str  = encode_uuid(requesting_user_id);
    let conf_str = encode_uuid(confirming_user_id);
    let at_str   = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          let next = resolve_request(tx, &req_str, &conf_str, Transition::Confirm)?;
          require_group(tx, &conf_str, permission_group.as_deref())?;

          // Both snapshots still have to be built.
          let sync = SyncState::OutOfSync;
          set_status(tx, &conf_str, &req_str, next, sync, &at_str)?;
          set_status(tx, &req_str, &conf_str, next, sync, &at_str)?;
          tx.execute(
            "UPDATE connections SET permission_group = ?3
             WHERE owner_id = ?1 AND other_user_id = ?2",
            rusqlite::params![conf_str, req_str, permission_group],
          )?;
          delete_requests_between(tx, &req_str, &conf_str)?;

          read_connection(tx, &conf_str, &req_str)?.ok_or_else(|| {
            CoreError::Storage("confirmed connection vanished".into()).into()
          })
        })
      })
      .await?;

    outcome?.into_connection()
  }

  async fn deny_request(
    &self,
    requesting_user_id: Uuid,
    denying_user_id:    Uuid,
  ) -> Result<()> {
    let req_str  = encode_uuid(requesting_user_id);
    let deny_str = encode_uuid(denying_user_id);
    let at_str   = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          let next = resolve_request(tx, &req_str, &deny_str, Transition::Deny)?;
          let sync = SyncState::InSync;
          set_status(tx, &deny_str, &req_str, next, sync, &at_str)?;
          set_status(tx, &req_str, &deny_str, next, sync, &at_str)?;
          delete_requests_between(tx, &req_str, &deny_str)?;
          Ok(())
        })
      })
      .await?;

    Ok(outcome?)
  }

  async fn delete_connection(&self, actor_id: Uuid, connection_id: Uuid) -> Result<Connection> {
    let actor_str = encode_uuid(actor_id);
    let id_str    = encode_uuid(connection_id);
    let at_str    = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          let raw = owned_connection(tx, &actor_str, &id_str)?;
          let next = parse_status(&raw.status)?.apply(Transition::Delete)?;
          let sync = SyncState::InSync;
          set_status(tx, &raw.owner_id, &raw.other_user_id, next, sync, &at_str)?;
          set_status(tx, &raw.other_user_id, &raw.owner_id, next, sync, &at_str)?;
          delete_requests_between(tx, &raw.owner_id, &raw.other_user_id)?;

          read_connection_by_id(tx, &id_str)?.ok_or_else(|| {
            CoreError::Storage("deleted connection vanished".into()).into()
          })
        })
      })
      .await?;

    outcome?.into_connection()
  }

  async fn block_user(&self, actor_id: Uuid, other_user_id: Uuid) -> Result<()> {
    if actor_id == other_user_id {
      return Err(CoreError::validation("cannot block yourself").into());
    }

    let actor_str = encode_uuid(actor_id);
    let other_str = encode_uuid(other_user_id);
    let at_str    = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          let forward = status_of(tx, &actor_str, &other_str)?;
          let reverse = status_of(tx, &other_str, &actor_str)?;
          for status in [forward, reverse].into_iter().flatten() {
            status.apply(Transition::Block)?;
          }

          let blocked = ConnectionStatus::Blocked;
          put_row(tx, &actor_str, &other_str, blocked, None, &at_str)?;
          put_row(tx, &other_str, &actor_str, blocked, None, &at_str)?;
          delete_requests_between(tx, &actor_str, &other_str)?;
          Ok(())
        })
      })
      .await?;

    Ok(outcome?)
  }

  async fn set_connection_group(
    &self,
    actor_id:         Uuid,
    connection_id:    Uuid,
    permission_group: Option<String>,
  ) -> Result<Connection> {
    let actor_str = encode_uuid(actor_id);
    let id_str    = encode_uuid(connection_id);
    let at_str    = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          let raw = owned_connection(tx, &actor_str, &id_str)?;
          let status = parse_status(&raw.status)?;
          if status != ConnectionStatus::Confirmed {
            return Err(
              CoreError::conflict(format!("connection {id_str} is {status}")).into(),
            );
          }
          require_group(tx, &actor_str, permission_group.as_deref())?;

          tx.execute(
            "UPDATE connections SET permission_group = ?2, updated_at = ?3
             WHERE connection_id = ?1",
            rusqlite::params![id_str, permission_group, at_str],
          )?;
          tx.execute(
            "UPDATE connections SET sync_state = 'out_of_sync', revision = revision + 1
             WHERE owner_id = ?1 AND other_user_id = ?2 AND status = 'confirmed'",
            rusqlite::params![raw.other_user_id, raw.owner_id],
          )?;

          read_connection_by_id(tx, &id_str)?.ok_or_else(|| {
            CoreError::Storage("rebound connection vanished".into()).into()
          })
        })
      })
      .await?;

    outcome?.into_connection()
  }

  // ── Snapshots ─────────────────────────────────────────────────────────────

  async fn write_snapshot(
    &self,
    connection_id: Uuid,
    revision:      u64,
    snapshot:      ProfileSnapshot,
  ) -> Result<bool> {
    let id_str       = encode_uuid(connection_id);
    let snapshot_str = encode_snapshot(&snapshot)?;
    // Out of range never matches a stored revision, so nothing is written.
    let revision = i64::try_from(revision).unwrap_or(-1);

    let outcome = self
      .conn
      .call(move |conn| {
        in_transaction(conn, |tx| {
          let written = tx.execute(
            "UPDATE connections SET snapshot = ?2, sync_state = 'in_sync'
             WHERE connection_id = ?1 AND status = 'confirmed' AND revision = ?3",
            rusqlite::params![id_str, snapshot_str, revision],
          )?;
          if written > 0 {
            return Ok(true);
          }
          match read_connection_by_id(tx, &id_str)? {
            Some(raw) if raw.status == ConnectionStatus::Confirmed.as_str() => Ok(false),
            Some(raw) => Err(
              CoreError::conflict(format!(
                "connection {id_str} is {}, not confirmed",
                raw.status
              ))
              .into(),
            ),
            None => Err(CoreError::not_found(format!("connection {id_str}")).into()),
          }
        })
      })
      .await?;

    Ok(outcome?)
  }

  async fn mark_out_of_sync(&self, connection_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(connection_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE connections SET sync_state = 'out_of_sync', revision = revision + 1
           WHERE connection_id = ?1 AND status = 'confirmed'",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(())
  }
}
