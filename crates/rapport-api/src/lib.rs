//! JSON REST API for Rapport.
//!
//! Exposes an axum [`Router`] backed by an [`Engine`] over any
//! [`SocialStore`]. Every route acts on behalf of the user named in the
//! `X-User-Id` header; authenticating that header, TLS and transport are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", rapport_api::api_router(engine.clone()))
//! ```

pub mod actor;
pub mod connections;
pub mod error;
pub mod etag;
pub mod groups;
pub mod profile;

use axum::{
  Router,
  routing::{get, post, put},
};
use rapport_core::store::SocialStore;
use rapport_engine::Engine;

pub use actor::{Actor, USER_ID_HEADER};
pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Engine<S>) -> Router<()>
where
  S: SocialStore + 'static,
{
  Router::new()
    // Profile
    .route("/profile", get(profile::get_one::<S>).put(profile::save::<S>))
    // Groups and assignments
    .route("/groups", get(groups::list::<S>).post(groups::create::<S>))
    .route("/groups/{name}", put(groups::update::<S>).delete(groups::delete::<S>))
    .route("/assignments", get(groups::assignments::<S>))
    .route("/assignments/{field}", put(groups::assign::<S>))
    .route("/assignments/{field}/choices", get(groups::choices::<S>))
    // Connections
    .route("/connections", get(connections::list::<S>))
    .route("/connections/out-of-sync", get(connections::out_of_sync::<S>))
    .route("/connections/bulk-delete", post(connections::bulk_delete::<S>))
    .route(
      "/connections/{id}",
      get(connections::get_one::<S>).delete(connections::delete::<S>),
    )
    .route("/connections/{id}/group", put(connections::rebind::<S>))
    // Requests
    .route("/requests", get(connections::requests::<S>).post(connections::send::<S>))
    .route("/requests/{from}/confirm", post(connections::confirm::<S>))
    .route("/requests/{from}/deny", post(connections::deny::<S>))
    // Exclusion lists
    .route("/blocks", get(connections::blocked::<S>).post(connections::block::<S>))
    .route("/denied", get(connections::denied::<S>))
    .with_state(engine)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
  };
  use rapport_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  async fn app() -> Router {
    let store = SqliteStore::open_in_memory().await.unwrap();
    api_router(Engine::with_tracing(Arc::new(store)))
  }

  async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<Uuid>,
    extra: Vec<(header::HeaderName, String)>,
    body: Option<Value>,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      builder = builder.header(USER_ID_HEADER, user.to_string());
    }
    for (k, v) in extra {
      builder = builder.header(k, v);
    }
    let req = match body {
      Some(body) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(req).await.unwrap()
  }

  async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  /// `amy` requests `rory`, who confirms binding amy to `group`.
  async fn connect(app: &Router, amy: Uuid, rory: Uuid, group: Option<&str>) {
    let resp = call(app, "POST", "/requests", Some(amy), vec![], Some(json!({ "to": rory }))).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = call(
      app,
      "POST",
      &format!("/requests/{amy}/confirm"),
      Some(rory),
      vec![],
      Some(json!({ "group": group })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
  }

  // ── Identity ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn missing_identity_returns_401() {
    let app = app().await;
    let resp = call(&app, "GET", "/profile", None, vec![], None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(json_body(resp).await["error"].is_string());
  }

  // ── Profile ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn unchanged_profile_save_returns_204() {
    let app = app().await;
    let amy = Uuid::new_v4();
    let body = json!({ "first_name": "Amy", "last_name": "Pond" });

    let first = call(&app, "PUT", "/profile", Some(amy), vec![], Some(body.clone())).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(json_body(first).await["first_name"], "Amy");

    let second = call(&app, "PUT", "/profile", Some(amy), vec![], Some(body)).await;
    assert_eq!(second.status(), StatusCode::NO_CONTENT);
  }

  // ── Groups ───────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn group_errors_follow_the_taxonomy() {
    let app = app().await;
    let amy = Uuid::new_v4();

    let blank = call(&app, "POST", "/groups", Some(amy), vec![], Some(json!({ "name": " " }))).await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);

    let body = json!({ "name": "Family", "fields": ["email", "phoneNumber"] });
    let created = call(&app, "POST", "/groups", Some(amy), vec![], Some(body.clone())).await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let dup = call(&app, "POST", "/groups", Some(amy), vec![], Some(body)).await;
    assert_eq!(dup.status(), StatusCode::CONFLICT);

    let missing = call(&app, "DELETE", "/groups/Work", Some(amy), vec![], None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn unknown_field_is_a_bad_request() {
    let app = app().await;
    let amy = Uuid::new_v4();
    let resp = call(
      &app,
      "PUT",
      "/assignments/shoeSize",
      Some(amy),
      vec![],
      Some(json!({ "group": "Family" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn assignment_choices_reflect_selection() {
    let app = app().await;
    let amy = Uuid::new_v4();
    call(&app, "POST", "/groups", Some(amy), vec![], Some(json!({ "name": "Family", "fields": ["email"] }))).await;
    let resp = call(
      &app,
      "PUT",
      "/assignments/email",
      Some(amy),
      vec![],
      Some(json!({ "group": "Family" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = call(&app, "GET", "/assignments/email/choices", Some(amy), vec![], None).await;
    let choices = json_body(resp).await;
    assert_eq!(choices[0]["name"], "Family");
    assert_eq!(choices[0]["selected"], true);
    assert_eq!(choices[0]["grants"], true);
  }

  // ── Connections ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn connection_detail_carries_snapshot_etag() {
    let app = app().await;
    let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
    connect(&app, amy, rory, None).await;

    let list = json_body(call(&app, "GET", "/connections", Some(rory), vec![], None).await).await;
    let id = list[0]["connection_id"].as_str().unwrap().to_owned();

    let resp = call(&app, "GET", &format!("/connections/{id}"), Some(rory), vec![], None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let etag = resp.headers().get(header::ETAG).unwrap().to_str().unwrap().to_owned();

    let cached = call(
      &app,
      "GET",
      &format!("/connections/{id}"),
      Some(rory),
      vec![(header::IF_NONE_MATCH, etag.clone())],
      None,
    )
    .await;
    assert_eq!(cached.status(), StatusCode::NOT_MODIFIED);

    // Amy's save flags rory's view; the old tag no longer matches even though
    // the snapshot rory may see is unchanged.
    let body = json!({ "first_name": "Amy" });
    let saved = call(&app, "PUT", "/profile", Some(amy), vec![], Some(body)).await;
    assert_eq!(saved.status(), StatusCode::OK);
    let flagged = call(
      &app,
      "GET",
      &format!("/connections/{id}"),
      Some(rory),
      vec![(header::IF_NONE_MATCH, etag)],
      None,
    )
    .await;
    assert_eq!(flagged.status(), StatusCode::OK);
    assert_eq!(json_body(flagged).await["sync_state"], "out_of_sync");

    let stranger = call(&app, "GET", &format!("/connections/{id}"), Some(amy), vec![], None).await;
    assert_eq!(stranger.status(), StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn second_resolution_is_a_conflict() {
    let app = app().await;
    let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
    connect(&app, amy, rory, None).await;

    let deny = call(&app, "POST", &format!("/requests/{amy}/deny"), Some(rory), vec![], None).await;
    assert_eq!(deny.status(), StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn blocked_pair_cannot_request() {
    let app = app().await;
    let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
    let resp = call(&app, "POST", "/blocks", Some(rory), vec![], Some(json!({ "user_id": amy }))).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = call(&app, "POST", "/requests", Some(amy), vec![], Some(json!({ "to": rory }))).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let blocks = json_body(call(&app, "GET", "/blocks", Some(rory), vec![], None).await).await;
    assert_eq!(blocks, json!([amy]));
  }

  #[tokio::test]
  async fn bulk_delete_reports_per_item() {
    let app = app().await;
    let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
    connect(&app, amy, rory, None).await;
    let list = json_body(call(&app, "GET", "/connections", Some(amy), vec![], None).await).await;
    let id = list[0]["connection_id"].clone();
    let ghost = Uuid::new_v4();

    let resp = call(
      &app,
      "POST",
      "/connections/bulk-delete",
      Some(amy),
      vec![],
      Some(json!({ "ids": [id, ghost] })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let outcomes = json_body(resp).await;
    assert!(outcomes[0].get("error").is_none());
    assert!(outcomes[1]["error"].is_string());

    let denied = json_body(call(&app, "GET", "/denied", Some(amy), vec![], None).await).await;
    assert_eq!(denied, json!([]));
  }
}
