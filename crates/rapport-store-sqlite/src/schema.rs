//! SQL schema for the Rapport SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS profiles (
    user_id          TEXT PRIMARY KEY,
    first_name       TEXT,
    last_name        TEXT,
    bio              TEXT,
    email            TEXT,
    phone_number     TEXT,
    address          TEXT NOT NULL DEFAULT '{}',   -- JSON-encoded Address
    mailing_address  TEXT NOT NULL DEFAULT '{}',   -- JSON-encoded Address
    birthday         TEXT,                         -- YYYY-MM-DD
    updated_at       TEXT NOT NULL
);

-- Names are unique per owner and compared case-sensitively (BINARY).
CREATE TABLE IF NOT EXISTS permission_groups (
    group_id    TEXT PRIMARY KEY,
    owner_id    TEXT NOT NULL,
    name        TEXT NOT NULL,
    fields      TEXT NOT NULL DEFAULT '[]',        -- JSON array of field ids
    created_at  TEXT NOT NULL,
    UNIQUE (owner_id, name)
);

CREATE TABLE IF NOT EXISTS field_assignments (
    owner_id    TEXT NOT NULL,
    field       TEXT NOT NULL,
    group_name  TEXT NOT NULL,
    PRIMARY KEY (owner_id, field)
);

-- One row per direction. The row (owner, other) holds owner's group for
-- other and owner's cached snapshot of other.
CREATE TABLE IF NOT EXISTS connections (
    connection_id    TEXT PRIMARY KEY,
    owner_id         TEXT NOT NULL,
    other_user_id    TEXT NOT NULL,
    status           TEXT NOT NULL,   -- pending | confirmed | denied | blocked | deleted
    permission_group TEXT,
    snapshot         TEXT,            -- JSON-encoded ProfileSnapshot or NULL
    sync_state       TEXT NOT NULL DEFAULT 'in_sync',
    revision         INTEGER NOT NULL DEFAULT 0,   -- bumped on every flag
    updated_at       TEXT NOT NULL,
    UNIQUE (owner_id, other_user_id),
    CHECK  (owner_id != other_user_id)
);

-- Removed, not archived, once the pair leaves the pending state.
CREATE TABLE IF NOT EXISTS connection_requests (
    requesting_user_id TEXT NOT NULL,
    target_user_id     TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    PRIMARY KEY (requesting_user_id, target_user_id)
);

CREATE INDEX IF NOT EXISTS connections_other_idx ON connections(other_user_id);
CREATE INDEX IF NOT EXISTS connections_sync_idx  ON connections(sync_state, updated_at);
CREATE INDEX IF NOT EXISTS requests_target_idx   ON connection_requests(target_user_id);

PRAGMA user_version = 1;
";
