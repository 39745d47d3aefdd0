//! A `SocialStore` over an in-memory `SqliteStore` that can be told to fail
//! profile saves, or to commit a profile save in the middle of a
//! reconciliation's source read.

use std::{
  collections::BTreeSet,
  sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use rapport_core::{
  Error,
  assignment::FieldAssignments,
  connection::{Connection, ConnectionRequest, ConnectionStatus},
  field::ProfileField,
  group::PermissionGroup,
  profile::{EditableFields, UserProfile},
  store::{GroupRemoval, GroupUpdate, SocialStore},
  sync::ProfileSnapshot,
};
use rapport_store_sqlite::SqliteStore;
use uuid::Uuid;

type Result<T> = std::result::Result<T, Error>;

pub struct Scripted {
  inner:       SqliteStore,
  fail_saves:  AtomicBool,
  /// Saved just before the next group listing, which a reconcile performs
  /// after loading the source profile.
  interleaved: Mutex<Option<(Uuid, EditableFields)>>,
}

impl Scripted {
  pub async fn new() -> Self {
    Self {
      inner:       SqliteStore::open_in_memory()
        .await
        .expect("in-memory store"),
      fail_saves:  AtomicBool::new(false),
      interleaved: Mutex::new(None),
    }
  }

  pub fn fail_saves(&self, fail: bool) { self.fail_saves.store(fail, Ordering::SeqCst); }

  pub fn save_during_source_read(&self, user_id: Uuid, fields: EditableFields) {
    *self.interleaved.lock().unwrap() = Some((user_id, fields));
  }
}

impl SocialStore for Scripted {
  type Error = Error;

  async fn load_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
    Ok(self.inner.load_profile(user_id).await?)
  }

  async fn save_profile(&self, user_id: Uuid, fields: EditableFields) -> Result<UserProfile> {
    if self.fail_saves.load(Ordering::SeqCst) {
      return Err(Error::Storage("disk unavailable".into()));
    }
    Ok(self.inner.save_profile(user_id, fields).await?)
  }

  async fn list_groups(&self, owner_id: Uuid) -> Result<Vec<PermissionGroup>> {
    let pending = self.interleaved.lock().unwrap().take();
    if let Some((user_id, fields)) = pending {
      self.inner.save_profile(user_id, fields).await?;
    }
    Ok(self.inner.list_groups(owner_id).await?)
  }

  async fn insert_group(&self, group: PermissionGroup) -> Result<PermissionGroup> {
    Ok(self.inner.insert_group(group).await?)
  }

  async fn update_group_fields(
    &self,
    owner_id: Uuid,
    name: String,
    fields: BTreeSet<ProfileField>,
  ) -> Result<GroupUpdate> {
    Ok(self.inner.update_group_fields(owner_id, name, fields).await?)
  }

  async fn delete_group(&self, owner_id: Uuid, name: String) -> Result<GroupRemoval> {
    Ok(self.inner.delete_group(owner_id, name).await?)
  }

  async fn load_assignments(&self, owner_id: Uuid) -> Result<FieldAssignments> {
    Ok(self.inner.load_assignments(owner_id).await?)
  }

  async fn assign_field(
    &self,
    owner_id: Uuid,
    field: ProfileField,
    group_name: String,
  ) -> Result<()> {
    Ok(self.inner.assign_field(owner_id, field, group_name).await?)
  }

  async fn load_connections(
    &self,
    user_id: Uuid,
    name_filter: Option<String>,
  ) -> Result<Vec<Connection>> {
    Ok(self.inner.load_connections(user_id, name_filter).await?)
  }

  async fn get_connection(&self, connection_id: Uuid) -> Result<Option<Connection>> {
    Ok(self.inner.get_connection(connection_id).await?)
  }

  async fn find_connection(
    &self,
    owner_id: Uuid,
    other_user_id: Uuid,
  ) -> Result<Option<Connection>> {
    Ok(self.inner.find_connection(owner_id, other_user_id).await?)
  }

  async fn load_requests(&self, user_id: Uuid) -> Result<Vec<ConnectionRequest>> {
    Ok(self.inner.load_requests(user_id).await?)
  }

  async fn list_peers(&self, user_id: Uuid, status: ConnectionStatus) -> Result<Vec<Uuid>> {
    Ok(self.inner.list_peers(user_id, status).await?)
  }

  async fn list_out_of_sync(
    &self,
    owner_id: Option<Uuid>,
    limit: usize,
  ) -> Result<Vec<Connection>> {
    Ok(self.inner.list_out_of_sync(owner_id, limit).await?)
  }

  async fn send_request(
    &self,
    from: Uuid,
    to: Uuid,
    permission_group: Option<String>,
  ) -> Result<ConnectionRequest> {
    Ok(self.inner.send_request(from, to, permission_group).await?)
  }

  async fn confirm_request(
    &self,
    requesting_user_id: Uuid,
    confirming_user_id: Uuid,
    permission_group: Option<String>,
  ) -> Result<Connection> {
    Ok(
      self
        .inner
        .confirm_request(requesting_user_id, confirming_user_id, permission_group)
        .await?,
    )
  }

  async fn deny_request(&self, requesting_user_id: Uuid, denying_user_id: Uuid) -> Result<()> {
    Ok(self.inner.deny_request(requesting_user_id, denying_user_id).await?)
  }

  async fn delete_connection(&self, actor_id: Uuid, connection_id: Uuid) -> Result<Connection> {
    Ok(self.inner.delete_connection(actor_id, connection_id).await?)
  }

  async fn block_user(&self, actor_id: Uuid, other_user_id: Uuid) -> Result<()> {
    Ok(self.inner.block_user(actor_id, other_user_id).await?)
  }

  async fn set_connection_group(
    &self,
    actor_id: Uuid,
    connection_id: Uuid,
    permission_group: Option<String>,
  ) -> Result<Connection> {
    Ok(
      self
        .inner
        .set_connection_group(actor_id, connection_id, permission_group)
        .await?,
    )
  }

  async fn write_snapshot(
    &self,
    connection_id: Uuid,
    revision: u64,
    snapshot: ProfileSnapshot,
  ) -> Result<bool> {
    Ok(self.inner.write_snapshot(connection_id, revision, snapshot).await?)
  }

  async fn mark_out_of_sync(&self, connection_id: Uuid) -> Result<()> {
    Ok(self.inner.mark_out_of_sync(connection_id).await?)
  }
}
