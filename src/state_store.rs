//! The state store capability.
//!
//! A state store keeps opaque state blobs keyed by state id. Chunking of
//! state bytes is done by the dispatcher: implementations read and write
//! whole blobs.

use async_trait::async_trait;

use crate::diagnostic::Diagnostic;
use crate::provider::{SchemaResponse, ValidateConfigRequest, ValidateConfigResponse};
use crate::value::Value;

/// State store configuration request.
#[derive(Debug, Clone)]
pub struct ConfigureStateStoreRequest {
    /// Store configuration.
    pub config: Value,
    /// Chunk size proposed by the client, 0 when the client has none.
    pub chunk_size: i64,
}

/// State store configuration response.
#[derive(Debug, Clone, Default)]
pub struct ConfigureStateStoreResponse {
    /// Negotiated chunk size. Starts as the client's proposal, or the server
    /// default when the client proposed none.
    pub chunk_size: i64,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Response listing stored states.
#[derive(Debug, Clone, Default)]
pub struct GetStatesResponse {
    /// Ids of the stored states.
    pub state_ids: Vec<String>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Request to delete a state.
#[derive(Debug, Clone)]
pub struct DeleteStateRequest {
    /// The state to delete.
    pub state_id: String,
}

/// Request to lock a state.
#[derive(Debug, Clone)]
pub struct LockStateRequest {
    /// The state to lock.
    pub state_id: String,
    /// The operation the lock is taken for.
    pub operation: String,
}

/// Response to a lock request.
#[derive(Debug, Clone, Default)]
pub struct LockStateResponse {
    /// Id of the acquired lock.
    pub lock_id: String,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Request to unlock a state.
#[derive(Debug, Clone)]
pub struct UnlockStateRequest {
    /// The locked state.
    pub state_id: String,
    /// Id returned by the lock.
    pub lock_id: String,
}

/// Request to read a state blob.
#[derive(Debug, Clone)]
pub struct ReadStateBytesRequest {
    /// The state to read.
    pub state_id: String,
}

/// Response carrying a state blob.
#[derive(Debug, Clone, Default)]
pub struct ReadStateBytesResponse {
    /// The whole state blob.
    pub bytes: Vec<u8>,
    /// Chunk size used to stream `bytes` back. Starts as the server default.
    pub chunk_size: i64,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Request to write a state blob.
#[derive(Debug, Clone)]
pub struct WriteStateBytesRequest {
    /// The state to write.
    pub state_id: String,
    /// The whole state blob, reassembled from chunks.
    pub bytes: Vec<u8>,
}

/// Response carrying only diagnostics.
#[derive(Debug, Clone, Default)]
pub struct StateStoreResponse {
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// State store capability.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Report the store configuration schema.
    async fn schema(&self, resp: &mut SchemaResponse);

    /// Validate store configuration.
    async fn validate_config(&self, _req: ValidateConfigRequest, _resp: &mut ValidateConfigResponse) {}

    /// Configure the store.
    async fn configure(
        &self,
        _req: ConfigureStateStoreRequest,
        _resp: &mut ConfigureStateStoreResponse,
    ) {}

    /// List stored states.
    async fn get_states(&self, _resp: &mut GetStatesResponse) {}

    /// Delete a state.
    async fn delete_state(&self, _req: DeleteStateRequest, _resp: &mut StateStoreResponse) {}

    /// Lock a state.
    async fn lock_state(&self, _req: LockStateRequest, _resp: &mut LockStateResponse) {}

    /// Unlock a state.
    async fn unlock_state(&self, _req: UnlockStateRequest, _resp: &mut StateStoreResponse) {}

    /// Read a whole state blob.
    async fn read_state_bytes(&self, _req: ReadStateBytesRequest, _resp: &mut ReadStateBytesResponse) {}

    /// Write a whole state blob.
    async fn write_state_bytes(&self, _req: WriteStateBytesRequest, _resp: &mut StateStoreResponse) {}
}
