use async_trait::async_trait;

use crate::auth::CallMetadata;
use crate::errors::TransportFailure;
use crate::rpc::{Request, Response};

/// The network collaborator: delivers one typed request with its metadata.
///
/// Implementations attach `metadata` to the call as-is and report failures
/// with whatever structured detail the platform provided. Nothing is read
/// back from response metadata.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Transport: Send + Sync {
    /// Send `request` and wait for the platform's answer.
    async fn call(
        &self,
        request: Request,
        metadata: CallMetadata,
    ) -> std::result::Result<Response, TransportFailure>;
}
