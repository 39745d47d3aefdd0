//! Handlers for connections, requests and exclusion lists.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/connections` | Optional `?name=<settled filter>` |
//! | `GET`    | `/connections/out-of-sync` | |
//! | `GET`    | `/connections/{id}` | `ETag`/`If-None-Match` over snapshot and sync state |
//! | `PUT`    | `/connections/{id}/group` | Body: `{"group":"Work"}` or `{"group":null}` |
//! | `DELETE` | `/connections/{id}` | |
//! | `POST`   | `/connections/bulk-delete` | Body: `{"ids":[..]}`; per-item outcomes |
//! | `GET`    | `/requests` | Incoming |
//! | `POST`   | `/requests` | Body: `{"to":"<uuid>","group":"Family"}` |
//! | `POST`   | `/requests/{from}/confirm` | Body: `{"group":"Family"}` |
//! | `POST`   | `/requests/{from}/deny` | |
//! | `GET`    | `/blocks` | |
//! | `POST`   | `/blocks` | Body: `{"user_id":"<uuid>"}` |
//! | `GET`    | `/denied` | |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode, header},
  response::{IntoResponse, Response},
};
use rapport_core::{
  connection::{Connection, ConnectionRequest},
  store::SocialStore,
};
use rapport_engine::{DeleteOutcome, Engine};
use serde::Deserialize;
use uuid::Uuid;

use crate::{actor::Actor, error::ApiError, etag};

// ─── Connections ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub name: Option<String>,
}

/// `GET /connections[?name=<filter>]`
pub async fn list<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Connection>>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.list_connections(user_id, params.name).await?))
}

/// `GET /connections/out-of-sync`
pub async fn out_of_sync<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
) -> Result<Json<Vec<Connection>>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.list_out_of_sync(user_id).await?))
}

/// `GET /connections/{id}`: never waits on reconciliation; a drifted
/// connection is served stale while it refreshes in the background.
pub async fn get_one<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
) -> Result<Response, ApiError>
where
  S: SocialStore + 'static,
{
  let opened = engine.open_connection(user_id, id).await?;
  let etag = etag::snapshot_etag(
    opened.connection.snapshot.as_ref(),
    opened.connection.sync_state,
  )
  .map_err(rapport_core::Error::from)?;

  let not_modified = headers
    .get(header::IF_NONE_MATCH)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| etag::matches(v, &etag));
  if not_modified {
    return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
  }

  Ok(([(header::ETAG, etag)], Json(opened.connection)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct GroupBody {
  pub group: Option<String>,
}

/// `PUT /connections/{id}/group`
pub async fn rebind<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
  Path(id): Path<Uuid>,
  Json(body): Json<GroupBody>,
) -> Result<Json<Connection>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.set_connection_group(user_id, id, body.group).await?))
}

/// `DELETE /connections/{id}`
pub async fn delete<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
  Path(id): Path<Uuid>,
) -> Result<Json<Connection>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.delete_connection(user_id, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteBody {
  pub ids: Vec<Uuid>,
}

/// `POST /connections/bulk-delete`: always `200`; failures are reported
/// per id.
pub async fn bulk_delete<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
  Json(body): Json<BulkDeleteBody>,
) -> Json<Vec<DeleteOutcome>>
where
  S: SocialStore + 'static,
{
  Json(engine.bulk_delete(user_id, &body.ids).await)
}

// ─── Requests ─────────────────────────────────────────────────────────────────

/// `GET /requests`
pub async fn requests<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
) -> Result<Json<Vec<ConnectionRequest>>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.list_requests(user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SendBody {
  pub to:    Uuid,
  #[serde(default)]
  pub group: Option<String>,
}

/// `POST /requests`
pub async fn send<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
  Json(body): Json<SendBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SocialStore + 'static,
{
  let request = engine.send_request(user_id, body.to, body.group).await?;
  Ok((StatusCode::CREATED, Json(request)))
}

/// `POST /requests/{from}/confirm`
pub async fn confirm<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
  Path(from): Path<Uuid>,
  Json(body): Json<GroupBody>,
) -> Result<Json<Connection>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.confirm_request(from, user_id, body.group).await?))
}

/// `POST /requests/{from}/deny`
pub async fn deny<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
  Path(from): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: SocialStore + 'static,
{
  engine.deny_request(from, user_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Exclusion lists ──────────────────────────────────────────────────────────

/// `GET /blocks`
pub async fn blocked<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
) -> Result<Json<Vec<Uuid>>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.list_blocked(user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct BlockBody {
  pub user_id: Uuid,
}

/// `POST /blocks`
pub async fn block<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
  Json(body): Json<BlockBody>,
) -> Result<StatusCode, ApiError>
where
  S: SocialStore + 'static,
{
  engine.block_user(user_id, body.user_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /denied`
pub async fn denied<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
) -> Result<Json<Vec<Uuid>>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.list_denied(user_id).await?))
}
