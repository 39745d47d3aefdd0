//! ETag computation for cached snapshots.
//!
//! The tag is a SHA-256 over the JSON of the snapshot and its sync state.
//! Snapshots are ordered maps, so equal views always serialise, and
//! therefore hash, the same.

use rapport_core::{connection::SyncState, sync::ProfileSnapshot};
use sha2::{Digest, Sha256};

/// Compute a quoted ETag for a connection view. A missing snapshot has its
/// own tag, and flagging a row out of sync changes its tag even though the
/// snapshot itself is untouched.
pub fn snapshot_etag(
  snapshot: Option<&ProfileSnapshot>,
  sync_state: SyncState,
) -> Result<String, serde_json::Error> {
  let canonical = serde_json::to_vec(&(sync_state, snapshot))?;
  let hash = Sha256::digest(&canonical);
  Ok(format!("\"{}\"", hex::encode(hash)))
}

/// Whether an `If-None-Match` value names `etag`. Quotes are optional and
/// `*` matches anything.
pub fn matches(if_none_match: &str, etag: &str) -> bool {
  let bare = strip_etag_quotes(etag);
  if_none_match
    .split(',')
    .map(|candidate| strip_etag_quotes(candidate.trim().trim_start_matches("W/")))
    .any(|candidate| candidate == "*" || candidate == bare)
}

fn strip_etag_quotes(s: &str) -> &str { s.trim_matches('"') }
