//! End-to-end tests for `Engine` over an in-memory `SqliteStore`.

use std::{
  collections::BTreeSet,
  sync::{Arc, Mutex},
};

use rapport_core::{
  Error,
  assignment::effective_fields_visible_to,
  connection::{ConnectionStatus, SyncState},
  field::{FieldValue, ProfileField},
  group::GroupDraft,
  notify::{ConnectionEvent, Notifier},
  profile::EditableFields,
  store::SocialStore,
  sync::project,
};
use rapport_store_sqlite::SqliteStore;
use uuid::Uuid;

use self::scripted::Scripted;
use crate::{Engine, SaveOutcome, SweepReport};

mod scripted;

#[derive(Default)]
struct Recorder(Mutex<Vec<ConnectionEvent>>);

impl Notifier for Recorder {
  fn notify(&self, event: ConnectionEvent) { self.0.lock().unwrap().push(event); }
}

async fn engine() -> (Engine<SqliteStore>, Arc<Recorder>) {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  let recorder = Arc::new(Recorder::default());
  (Engine::new(Arc::new(store), recorder.clone()), recorder)
}

fn rory_fields() -> EditableFields {
  let mut fields = EditableFields {
    first_name: Some("Rory".into()),
    last_name: Some("Williams".into()),
    email: Some("rory@leadworth.example".into()),
    phone_number: Some("555-0100".into()),
    ..Default::default()
  };
  fields.address.city = Some("Leadworth".into());
  fields
}

fn text(s: &str) -> Option<FieldValue> { Some(FieldValue::Text(s.into())) }

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn confirmed_family_view_exposes_only_family_fields() {
  let (e, _) = engine().await;
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  e.save_fields(rory, rory_fields()).await.unwrap();

  e.create_group(rory, "Family", [ProfileField::Email, ProfileField::PhoneNumber])
    .await
    .unwrap();
  e.assign_field(rory, ProfileField::PhoneNumber, "Family")
    .await
    .unwrap();

  e.send_request(amy, rory, None).await.unwrap();
  e.confirm_request(amy, rory, Some("Family".into())).await.unwrap();

  let view = e.store().find_connection(amy, rory).await.unwrap().unwrap();
  assert_eq!(view.sync_state, SyncState::InSync);
  let snapshot = view.snapshot.unwrap();
  assert_eq!(
    snapshot.fields(),
    BTreeSet::from([ProfileField::Email, ProfileField::PhoneNumber])
  );
  assert_eq!(snapshot.get(ProfileField::PhoneNumber), text("555-0100").as_ref());
  assert!(!snapshot.exposes(ProfileField::Address));
}

#[tokio::test]
async fn retyping_the_same_name_cannot_save() {
  let (e, _) = engine().await;
  let amy = Uuid::new_v4();
  e.save_fields(amy, EditableFields { first_name: Some("Amy".into()), ..Default::default() })
    .await
    .unwrap();

  let mut session = e.begin_edit(amy).await.unwrap();
  let flipped = session.update(|f| f.first_name = Some("Amy".into()));
  assert!(!flipped);
  assert!(!session.can_save());
  assert_eq!(e.save(&mut session).await.unwrap(), SaveOutcome::Unchanged);
}

#[tokio::test]
async fn removing_a_field_from_the_bound_group_drops_it_on_reconcile() {
  let (e, _) = engine().await;
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  e.save_fields(rory, rory_fields()).await.unwrap();
  e.create_group(rory, "Family", [ProfileField::Email, ProfileField::PhoneNumber])
    .await
    .unwrap();
  e.send_request(amy, rory, None).await.unwrap();
  e.confirm_request(amy, rory, Some("Family".into())).await.unwrap();

  e.update_group(rory, "Family", BTreeSet::from([ProfileField::PhoneNumber]))
    .await
    .unwrap();

  let flagged = e.list_out_of_sync(amy).await.unwrap();
  assert_eq!(flagged.len(), 1);
  assert!(flagged[0].snapshot.as_ref().unwrap().exposes(ProfileField::Email));

  let view = e.reconcile_connection(flagged[0].connection_id).await.unwrap();
  assert_eq!(view.sync_state, SyncState::InSync);
  let snapshot = view.snapshot.unwrap();
  assert!(!snapshot.exposes(ProfileField::Email));
  assert!(snapshot.exposes(ProfileField::PhoneNumber));
  assert!(e.list_out_of_sync(amy).await.unwrap().is_empty());
}

// ─── Profiles ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn saving_adopts_the_persisted_profile() {
  let (e, _) = engine().await;
  let amy = Uuid::new_v4();

  let mut session = e.begin_edit(amy).await.unwrap();
  assert!(session.update(|f| f.bio = Some("Kissogram".into())));

  let SaveOutcome::Saved(saved) = e.save(&mut session).await.unwrap() else {
    panic!("expected a write");
  };
  assert_eq!(saved.bio.as_deref(), Some("Kissogram"));
  assert!(!session.can_save());
  assert_eq!(e.load_profile(amy).await.unwrap(), saved);
}

#[tokio::test]
async fn profile_save_flags_viewers_until_swept() {
  let (e, _) = engine().await;
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  e.create_group(rory, "ALL", []).await.unwrap();
  e.send_request(amy, rory, None).await.unwrap();
  e.confirm_request(amy, rory, Some("ALL".into())).await.unwrap();

  e.save_fields(rory, rory_fields()).await.unwrap();
  assert_eq!(e.list_out_of_sync(amy).await.unwrap().len(), 1);

  let report = e.sweep(10).await.unwrap();
  assert_eq!(report, SweepReport { reconciled: 1, unchanged: 0, failed: 0 });

  let view = e.store().find_connection(amy, rory).await.unwrap().unwrap();
  let snapshot = view.snapshot.unwrap();
  assert_eq!(snapshot.fields().len(), ProfileField::ALL.len());
  assert_eq!(snapshot.get(ProfileField::FirstName), text("Rory").as_ref());

  assert_eq!(e.sweep(10).await.unwrap(), SweepReport::default());
}

// ─── Groups ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn drafts_create_then_update() {
  let (e, _) = engine().await;
  let owner = Uuid::new_v4();

  let blank = GroupDraft::new();
  let err = e.save_draft(owner, &blank).await.unwrap_err();
  assert!(matches!(err, Error::Validation(_)));

  let mut draft = GroupDraft::new();
  draft.set_name("Work").unwrap();
  draft.toggle_field(ProfileField::Email, true);
  let created = e.save_draft(owner, &draft).await.unwrap();
  assert_eq!(created.fields(), BTreeSet::from([ProfileField::Email]));

  let mut draft = GroupDraft::edit(&created);
  draft.toggle_field(ProfileField::Email, false);
  draft.toggle_field(ProfileField::Bio, true);
  let updated = e.save_draft(owner, &draft).await.unwrap();
  assert_eq!(updated.group_id, created.group_id);
  assert_eq!(updated.fields(), BTreeSet::from([ProfileField::Bio]));
  assert_eq!(e.list_groups(owner).await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_group_is_a_conflict() {
  let (e, _) = engine().await;
  let owner = Uuid::new_v4();
  e.create_group(owner, "Family", []).await.unwrap();
  let err = e.create_group(owner, "Family", []).await.unwrap_err();
  assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn field_choices_mark_current_assignment() {
  let (e, _) = engine().await;
  let owner = Uuid::new_v4();
  e.create_group(owner, "Family", [ProfileField::Email]).await.unwrap();
  e.create_group(owner, "Work", []).await.unwrap();
  e.assign_field(owner, ProfileField::Email, "Family").await.unwrap();

  let choices = e.field_choices(owner, ProfileField::Email).await.unwrap();
  let family = choices.iter().find(|c| c.name == "Family").unwrap();
  let work = choices.iter().find(|c| c.name == "Work").unwrap();
  assert!(family.selected && family.grants);
  assert!(!work.selected && !work.grants);
}

#[tokio::test]
async fn deleting_the_bound_group_hides_everything() {
  let (e, _) = engine().await;
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  e.save_fields(rory, rory_fields()).await.unwrap();
  e.create_group(rory, "Family", [ProfileField::Email]).await.unwrap();
  e.send_request(amy, rory, None).await.unwrap();
  e.confirm_request(amy, rory, Some("Family".into())).await.unwrap();

  let removal = e.delete_group(rory, "Family").await.unwrap();
  assert_eq!(removal.rebound_connections, 1);

  e.sweep(10).await.unwrap();
  let view = e.store().find_connection(amy, rory).await.unwrap().unwrap();
  assert!(view.snapshot.unwrap().fields().is_empty());
}

// ─── Connections ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn confirm_without_group_grants_nothing() {
  let (e, _) = engine().await;
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  e.save_fields(rory, rory_fields()).await.unwrap();
  e.send_request(amy, rory, None).await.unwrap();
  e.confirm_request(amy, rory, None).await.unwrap();

  let view = e.store().find_connection(amy, rory).await.unwrap().unwrap();
  assert!(view.snapshot.unwrap().fields().is_empty());
}

#[tokio::test]
async fn lifecycle_events_reach_the_notifier() {
  let (e, recorder) = engine().await;
  let (amy, rory, river) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

  e.send_request(amy, rory, None).await.unwrap();
  e.deny_request(amy, rory).await.unwrap();
  e.block_user(river, amy).await.unwrap();

  let events = recorder.0.lock().unwrap().clone();
  assert_eq!(events, vec![
    ConnectionEvent::RequestSent { from: amy, to: rory },
    ConnectionEvent::RequestDenied { requesting_user_id: amy, denying_user_id: rory },
    ConnectionEvent::UserBlocked { actor_id: river, other_user_id: amy },
  ]);
  assert_eq!(e.list_denied(rory).await.unwrap(), vec![amy]);
  assert_eq!(e.list_blocked(amy).await.unwrap(), vec![river]);
}

#[tokio::test]
async fn failed_transition_does_not_notify() {
  let (e, recorder) = engine().await;
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  let err = e.deny_request(amy, rory).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)));
  assert!(recorder.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn bulk_delete_reports_each_item_and_continues() {
  let (e, _) = engine().await;
  let (amy, rory, river) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
  for peer in [rory, river] {
    e.send_request(amy, peer, None).await.unwrap();
    e.confirm_request(amy, peer, None).await.unwrap();
  }
  let to_rory = e.store().find_connection(amy, rory).await.unwrap().unwrap();
  let to_river = e.store().find_connection(amy, river).await.unwrap().unwrap();
  let ghost = Uuid::new_v4();

  let outcomes = e
    .bulk_delete(amy, &[to_rory.connection_id, ghost, to_river.connection_id])
    .await;
  assert_eq!(outcomes.len(), 3);
  assert!(outcomes[0].is_deleted());
  assert!(!outcomes[1].is_deleted());
  assert_eq!(outcomes[1].connection_id, ghost);
  assert!(!outcomes[1].retryable);
  assert!(outcomes[2].is_deleted());

  assert!(e.list_connections(amy, None).await.unwrap().is_empty());
  let gone = e.store().get_connection(to_river.connection_id).await.unwrap().unwrap();
  assert_eq!(gone.status, ConnectionStatus::Deleted);
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn opening_a_drifted_connection_shows_stale_view_then_refreshes() {
  let (e, _) = engine().await;
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  e.save_fields(rory, rory_fields()).await.unwrap();
  e.create_group(rory, "Family", [ProfileField::FirstName]).await.unwrap();
  e.send_request(amy, rory, None).await.unwrap();
  e.confirm_request(amy, rory, Some("Family".into())).await.unwrap();

  let mut fields = rory_fields();
  fields.first_name = Some("Roranicus".into());
  e.save_fields(rory, fields).await.unwrap();

  let row = e.store().find_connection(amy, rory).await.unwrap().unwrap();
  let opened = e.open_connection(amy, row.connection_id).await.unwrap();
  assert_eq!(opened.connection.sync_state, SyncState::OutOfSync);
  let stale = opened.connection.snapshot.as_ref().unwrap();
  assert_eq!(stale.get(ProfileField::FirstName), text("Rory").as_ref());

  opened.refresh.expect("refresh started").await.unwrap();

  let opened = e.open_connection(amy, row.connection_id).await.unwrap();
  assert!(opened.refresh.is_none());
  assert_eq!(opened.connection.sync_state, SyncState::InSync);
  let fresh = opened.connection.snapshot.unwrap();
  assert_eq!(fresh.get(ProfileField::FirstName), text("Roranicus").as_ref());
}

#[tokio::test]
async fn opening_someone_elses_connection_is_not_found() {
  let (e, _) = engine().await;
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  e.send_request(amy, rory, None).await.unwrap();
  e.confirm_request(amy, rory, None).await.unwrap();
  let row = e.store().find_connection(amy, rory).await.unwrap().unwrap();

  let err = e.open_connection(Uuid::new_v4(), row.connection_id).await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn reconciling_twice_is_a_no_op() {
  let (e, _) = engine().await;
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  e.save_fields(rory, rory_fields()).await.unwrap();
  e.send_request(amy, rory, None).await.unwrap();
  let row = e.confirm_request(amy, rory, None).await.unwrap();

  let first = e.reconcile_connection(row.connection_id).await.unwrap();
  let second = e.reconcile_connection(row.connection_id).await.unwrap();
  assert_eq!(first.snapshot, second.snapshot);
  assert_eq!(second.sync_state, SyncState::InSync);
}

#[tokio::test]
async fn snapshot_built_before_a_save_is_not_stored() {
  let (e, _) = engine().await;
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  e.save_fields(rory, rory_fields()).await.unwrap();
  e.create_group(rory, "Family", [ProfileField::FirstName]).await.unwrap();
  e.send_request(amy, rory, None).await.unwrap();
  e.confirm_request(amy, rory, Some("Family".into())).await.unwrap();

  // Read the row and its source, as a reconcile does.
  let row = e.store().find_connection(amy, rory).await.unwrap().unwrap();
  let source = e.store().load_profile(rory).await.unwrap().unwrap();
  let groups = e.store().list_groups(rory).await.unwrap();

  let mut fields = rory_fields();
  fields.first_name = Some("Roranicus".into());
  e.save_fields(rory, fields).await.unwrap();

  let stale = project(&source, &effective_fields_visible_to(Some("Family"), &groups));
  let written = e
    .store()
    .write_snapshot(row.connection_id, row.revision, stale)
    .await
    .unwrap();
  assert!(!written);

  let flagged = e.list_out_of_sync(amy).await.unwrap();
  assert_eq!(flagged.len(), 1);
  assert_eq!(flagged[0].sync_state, SyncState::OutOfSync);

  assert_eq!(e.sweep(10).await.unwrap().reconciled, 1);
  let view = e.store().find_connection(amy, rory).await.unwrap().unwrap();
  assert_eq!(view.sync_state, SyncState::InSync);
  let snapshot = view.snapshot.unwrap();
  assert_eq!(snapshot.get(ProfileField::FirstName), text("Roranicus").as_ref());
}

#[tokio::test]
async fn reconcile_racing_a_save_rebuilds_from_the_new_profile() {
  let store = Arc::new(Scripted::new().await);
  let e = Engine::new(store.clone(), Arc::new(Recorder::default()));
  let (amy, rory) = (Uuid::new_v4(), Uuid::new_v4());
  e.save_fields(rory, rory_fields()).await.unwrap();
  e.create_group(rory, "Family", [ProfileField::FirstName]).await.unwrap();
  e.send_request(amy, rory, None).await.unwrap();
  e.confirm_request(amy, rory, Some("Family".into())).await.unwrap();

  let mut fields = rory_fields();
  fields.first_name = Some("Roranicus".into());
  e.save_fields(rory, fields.clone()).await.unwrap();

  // Rory saves again while the reconcile is reading the source.
  fields.first_name = Some("Rory the Roman".into());
  store.save_during_source_read(rory, fields);

  let row = e.store().find_connection(amy, rory).await.unwrap().unwrap();
  assert_eq!(row.sync_state, SyncState::OutOfSync);
  let view = e.reconcile_connection(row.connection_id).await.unwrap();
  assert_eq!(view.sync_state, SyncState::InSync);
  let snapshot = view.snapshot.unwrap();
  assert_eq!(snapshot.get(ProfileField::FirstName), text("Rory the Roman").as_ref());

  let stored = e.store().get_connection(row.connection_id).await.unwrap().unwrap();
  assert_eq!(stored.sync_state, SyncState::InSync);
  assert_eq!(stored.snapshot, Some(snapshot));
  assert!(e.list_out_of_sync(amy).await.unwrap().is_empty());
}

// ─── Failing storage ─────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_save_keeps_the_edits_and_can_save() {
  let store = Arc::new(Scripted::new().await);
  let e = Engine::new(store.clone(), Arc::new(Recorder::default()));
  let amy = Uuid::new_v4();

  let mut session = e.begin_edit(amy).await.unwrap();
  assert!(session.update(|f| f.bio = Some("Kissogram".into())));
  let edited = session.edited().clone();

  store.fail_saves(true);
  let err = e.save(&mut session).await.unwrap_err();
  assert!(matches!(err, Error::Storage(_)));
  assert!(err.is_retryable());
  assert!(session.can_save());
  assert_eq!(session.edited(), &edited);
  assert_eq!(session.persisted().bio, None);

  store.fail_saves(false);
  let SaveOutcome::Saved(saved) = e.save(&mut session).await.unwrap() else {
    panic!("expected a write");
  };
  assert_eq!(saved.bio.as_deref(), Some("Kissogram"));
  assert!(!session.can_save());
}
