//! Handlers for `/groups` and `/assignments`.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/groups` | |
//! | `POST`   | `/groups` | Body: `{"name":"Family","fields":["email"]}` |
//! | `PUT`    | `/groups/{name}` | Body: `{"fields":[..]}`; replaces the set |
//! | `DELETE` | `/groups/{name}` | Releases assignments and bindings |
//! | `GET`    | `/assignments` | |
//! | `PUT`    | `/assignments/{field}` | Body: `{"group":"Family"}` |
//! | `GET`    | `/assignments/{field}/choices` | Picker rows |

use std::collections::BTreeSet;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use rapport_core::{
  assignment::{FieldAssignments, GroupChoice},
  field::ProfileField,
  group::PermissionGroup,
  store::{GroupRemoval, GroupUpdate, SocialStore},
};
use rapport_engine::Engine;
use serde::Deserialize;

use crate::{actor::Actor, error::ApiError};

// ─── Groups ───────────────────────────────────────────────────────────────────

/// `GET /groups`
pub async fn list<S>(
  State(engine): State<Engine<S>>,
  Actor(owner_id): Actor,
) -> Result<Json<Vec<PermissionGroup>>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.list_groups(owner_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name:   String,
  #[serde(default)]
  pub fields: BTreeSet<ProfileField>,
}

/// `POST /groups`
pub async fn create<S>(
  State(engine): State<Engine<S>>,
  Actor(owner_id): Actor,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SocialStore + 'static,
{
  let group = engine.create_group(owner_id, body.name, body.fields).await?;
  Ok((StatusCode::CREATED, Json(group)))
}

#[derive(Debug, Deserialize)]
pub struct FieldsBody {
  pub fields: BTreeSet<ProfileField>,
}

/// `PUT /groups/{name}`
pub async fn update<S>(
  State(engine): State<Engine<S>>,
  Actor(owner_id): Actor,
  Path(name): Path<String>,
  Json(body): Json<FieldsBody>,
) -> Result<Json<GroupUpdate>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.update_group(owner_id, &name, body.fields).await?))
}

/// `DELETE /groups/{name}`
pub async fn delete<S>(
  State(engine): State<Engine<S>>,
  Actor(owner_id): Actor,
  Path(name): Path<String>,
) -> Result<Json<GroupRemoval>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.delete_group(owner_id, &name).await?))
}

// ─── Assignments ──────────────────────────────────────────────────────────────

/// `GET /assignments`
pub async fn assignments<S>(
  State(engine): State<Engine<S>>,
  Actor(owner_id): Actor,
) -> Result<Json<FieldAssignments>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.load_assignments(owner_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
  pub group: String,
}

/// `PUT /assignments/{field}`
pub async fn assign<S>(
  State(engine): State<Engine<S>>,
  Actor(owner_id): Actor,
  Path(field): Path<String>,
  Json(body): Json<AssignBody>,
) -> Result<StatusCode, ApiError>
where
  S: SocialStore + 'static,
{
  let field = ProfileField::parse(&field)?;
  engine.assign_field(owner_id, field, &body.group).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /assignments/{field}/choices`
pub async fn choices<S>(
  State(engine): State<Engine<S>>,
  Actor(owner_id): Actor,
  Path(field): Path<String>,
) -> Result<Json<Vec<GroupChoice>>, ApiError>
where
  S: SocialStore + 'static,
{
  let field = ProfileField::parse(&field)?;
  Ok(Json(engine.field_choices(owner_id, field).await?))
}
