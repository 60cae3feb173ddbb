//! RPC handler trait (C5).

use crate::dispatch::auth::Identity;
use crate::error::ControllerResult;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// A single RPC endpoint. Implementations receive an already-authenticated
/// `Identity` and a decoded request body, matching the teacher's pattern of
/// keeping auth/codec concerns out of the handler body (`api/rest/server.rs`).
#[async_trait]
pub trait RpcHandler: Send + Sync {
    type Request: DeserializeOwned + Send;
    type Response: Serialize + Send;

    async fn handle(&self, identity: &Identity, request: Self::Request) -> ControllerResult<Self::Response>;
}
