//! Handlers for `/profile`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/profile` | Empty profile if never saved |
//! | `PUT`  | `/profile` | Body: editable fields; `204` when nothing changed |

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use rapport_core::{
  profile::{EditableFields, UserProfile},
  store::SocialStore,
};
use rapport_engine::{Engine, SaveOutcome};

use crate::{actor::Actor, error::ApiError};

/// `GET /profile`
pub async fn get_one<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
) -> Result<Json<UserProfile>, ApiError>
where
  S: SocialStore + 'static,
{
  Ok(Json(engine.load_profile(user_id).await?))
}

/// `PUT /profile` with every editable field; omitted ones are cleared.
pub async fn save<S>(
  State(engine): State<Engine<S>>,
  Actor(user_id): Actor,
  Json(fields): Json<EditableFields>,
) -> Result<Response, ApiError>
where
  S: SocialStore + 'static,
{
  match engine.save_fields(user_id, fields).await? {
    SaveOutcome::Unchanged => Ok(StatusCode::NO_CONTENT.into_response()),
    SaveOutcome::Saved(profile) => Ok(Json(profile).into_response()),
  }
}
