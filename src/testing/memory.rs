use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::diagnostic::Diagnostic;
use crate::provider::SchemaResponse;
use crate::schema::Schema;
use crate::state_store::{
    ConfigureStateStoreRequest, ConfigureStateStoreResponse, DeleteStateRequest,
    GetStatesResponse, LockStateRequest, LockStateResponse, ReadStateBytesRequest,
    ReadStateBytesResponse, StateStore, StateStoreResponse, UnlockStateRequest,
    WriteStateBytesRequest,
};

#[derive(Debug, Default)]
struct Inner {
    states: BTreeMap<String, Vec<u8>>,
    locks: BTreeMap<String, Lock>,
    next_lock: u64,
    chunk_size: i64,
}

#[derive(Debug, Clone)]
struct Lock {
    id: String,
    operation: String,
}

/// A state store keeping blobs and locks in memory.
///
/// Clones share the same storage, so a test can keep a handle and inspect
/// what the dispatcher wrote.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateStore {
    schema: Schema,
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStateStore {
    /// An empty store with an empty configuration schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `schema` as the store configuration schema.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Seed a state.
    ///
    /// Seeding an unshared store never fails. Once clones exist the seed
    /// needs the storage lock; if another task holds it the seed is dropped
    /// with a warning. Use [`InMemoryStateStore::put_state`] from async code.
    pub fn with_state(mut self, state_id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let state_id = state_id.into();
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => {
                inner.get_mut().states.insert(state_id, bytes.into());
            }
            None => match self.inner.try_lock() {
                Ok(mut inner) => {
                    inner.states.insert(state_id, bytes.into());
                }
                Err(_) => warn!(
                    state_id = %state_id,
                    "state store is locked, seed dropped; use put_state"
                ),
            },
        }
        self
    }

    /// Store `bytes` under `state_id`, replacing what was there.
    pub async fn put_state(&self, state_id: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.inner
            .lock()
            .await
            .states
            .insert(state_id.into(), bytes.into());
    }

    /// Bytes stored under `state_id`.
    pub async fn state(&self, state_id: &str) -> Option<Vec<u8>> {
        self.inner.lock().await.states.get(state_id).cloned()
    }

    /// Id of the lock currently held on `state_id`.
    pub async fn lock_id(&self, state_id: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .locks
            .get(state_id)
            .map(|lock| lock.id.clone())
    }

    /// Chunk size negotiated by the last configure call, 0 before that.
    pub async fn chunk_size(&self) -> i64 {
        self.inner.lock().await.chunk_size
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn schema(&self, resp: &mut SchemaResponse) {
        resp.schema = Some(self.schema.clone());
    }

    async fn configure(
        &self,
        _req: ConfigureStateStoreRequest,
        resp: &mut ConfigureStateStoreResponse,
    ) {
        self.inner.lock().await.chunk_size = resp.chunk_size;
    }

    async fn get_states(&self, resp: &mut GetStatesResponse) {
        resp.state_ids = self.inner.lock().await.states.keys().cloned().collect();
    }

    async fn delete_state(&self, req: DeleteStateRequest, resp: &mut StateStoreResponse) {
        let mut inner = self.inner.lock().await;
        if let Some(lock) = inner.locks.get(&req.state_id) {
            resp.diagnostics.push(
                Diagnostic::error("State Locked").with_detail(format!(
                    "State {:?} is locked by {} for {:?}.",
                    req.state_id, lock.id, lock.operation
                )),
            );
            return;
        }
        if inner.states.remove(&req.state_id).is_none() {
            resp.diagnostics.push(
                Diagnostic::error("Unknown State")
                    .with_detail(format!("No state named {:?} exists.", req.state_id)),
            );
        }
    }

    async fn lock_state(&self, req: LockStateRequest, resp: &mut LockStateResponse) {
        let mut inner = self.inner.lock().await;
        if let Some(lock) = inner.locks.get(&req.state_id) {
            resp.diagnostics.push(
                Diagnostic::error("State Already Locked").with_detail(format!(
                    "State {:?} is locked by {} for {:?}.",
                    req.state_id, lock.id, lock.operation
                )),
            );
            return;
        }
        inner.next_lock += 1;
        let id = format!("lock-{}", inner.next_lock);
        debug!(state_id = %req.state_id, lock_id = %id, "state locked");
        inner.locks.insert(
            req.state_id,
            Lock {
                id: id.clone(),
                operation: req.operation,
            },
        );
        resp.lock_id = id;
    }

    async fn unlock_state(&self, req: UnlockStateRequest, resp: &mut StateStoreResponse) {
        let mut inner = self.inner.lock().await;
        match inner.locks.get(&req.state_id) {
            Some(lock) if lock.id == req.lock_id => {
                inner.locks.remove(&req.state_id);
                debug!(state_id = %req.state_id, lock_id = %req.lock_id, "state unlocked");
            }
            Some(lock) => resp.diagnostics.push(
                Diagnostic::error("Lock Mismatch").with_detail(format!(
                    "State {:?} is locked by {}, not {}.",
                    req.state_id, lock.id, req.lock_id
                )),
            ),
            None => resp.diagnostics.push(
                Diagnostic::error("State Not Locked")
                    .with_detail(format!("State {:?} is not locked.", req.state_id)),
            ),
        }
    }

    async fn read_state_bytes(&self, req: ReadStateBytesRequest, resp: &mut ReadStateBytesResponse) {
        let inner = self.inner.lock().await;
        resp.bytes = inner.states.get(&req.state_id).cloned().unwrap_or_default();
        if inner.chunk_size > 0 {
            resp.chunk_size = inner.chunk_size;
        }
    }

    async fn write_state_bytes(&self, req: WriteStateBytesRequest, resp: &mut StateStoreResponse) {
        let mut inner = self.inner.lock().await;
        if inner.locks.contains_key(&req.state_id) {
            resp.diagnostics.push(Diagnostic::warning("Writing Locked State").with_detail(
                format!("State {:?} was written while locked.", req.state_id),
            ));
        }
        inner.states.insert(req.state_id, req.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::has_errors;

    fn lock_req(state_id: &str) -> LockStateRequest {
        LockStateRequest {
            state_id: state_id.to_string(),
            operation: "apply".to_string(),
        }
    }

    #[tokio::test]
    async fn test_lock_unlock() {
        let store = InMemoryStateStore::new().with_state("default", b"{}".to_vec());

        let mut resp = LockStateResponse::default();
        store.lock_state(lock_req("default"), &mut resp).await;
        assert_eq!(resp.lock_id, "lock-1");
        assert_eq!(store.lock_id("default").await.as_deref(), Some("lock-1"));

        let mut second = LockStateResponse::default();
        store.lock_state(lock_req("default"), &mut second).await;
        assert!(has_errors(&second.diagnostics));

        let mut resp = StateStoreResponse::default();
        store
            .unlock_state(
                UnlockStateRequest {
                    state_id: "default".to_string(),
                    lock_id: "lock-9".to_string(),
                },
                &mut resp,
            )
            .await;
        assert_eq!(resp.diagnostics[0].summary, "Lock Mismatch");

        let mut resp = StateStoreResponse::default();
        store
            .unlock_state(
                UnlockStateRequest {
                    state_id: "default".to_string(),
                    lock_id: "lock-1".to_string(),
                },
                &mut resp,
            )
            .await;
        assert!(resp.diagnostics.is_empty());
        assert!(store.lock_id("default").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_locked_state_fails() {
        let store = InMemoryStateStore::new().with_state("default", b"{}".to_vec());
        store
            .lock_state(lock_req("default"), &mut LockStateResponse::default())
            .await;

        let mut resp = StateStoreResponse::default();
        store
            .delete_state(
                DeleteStateRequest {
                    state_id: "default".to_string(),
                },
                &mut resp,
            )
            .await;
        assert_eq!(resp.diagnostics[0].summary, "State Locked");
        assert!(store.state("default").await.is_some());
    }

    #[test]
    fn test_clones_share_storage() {
        tokio_test::block_on(async {
            let store = InMemoryStateStore::new();
            let handle = store.clone();
            store
                .write_state_bytes(
                    WriteStateBytesRequest {
                        state_id: "dev".to_string(),
                        bytes: b"state".to_vec(),
                    },
                    &mut StateStoreResponse::default(),
                )
                .await;
            assert_eq!(handle.state("dev").await, Some(b"state".to_vec()));

            let mut resp = GetStatesResponse::default();
            handle.get_states(&mut resp).await;
            assert_eq!(resp.state_ids, vec!["dev".to_string()]);
        });
    }

    #[tokio::test]
    async fn test_seeding_a_shared_store() {
        let store = InMemoryStateStore::new();
        let handle = store.clone();
        let store = store.with_state("default", b"{}".to_vec());
        assert_eq!(handle.state("default").await, Some(b"{}".to_vec()));

        let guard = handle.inner.lock().await;
        let store = store.with_state("busy", b"1".to_vec());
        drop(guard);
        assert!(store.state("busy").await.is_none());

        store.put_state("busy", b"1".to_vec()).await;
        assert_eq!(handle.state("busy").await, Some(b"1".to_vec()));
    }
}
