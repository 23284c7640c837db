use std::sync::Arc;

use super::traits::Transport;
use crate::auth::{AuthenticationContext, CallerIdentity, RequestAuthenticator};
use crate::canonical::to_canonical_bytes;
use crate::config::ClientConfig;
use crate::rpc::{Request, Response};
use crate::security::CryptoEngine;
use crate::{Result, TokenkitError};

/// A transport paired with the authenticator of one caller.
///
/// Every call is serialized canonically, freshly signed and sent exactly once.
#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    authenticator: RequestAuthenticator,
    call_timeout_ms: Option<u64>,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &ClientConfig,
        identity: CallerIdentity,
        engine: Arc<dyn CryptoEngine>,
    ) -> Self {
        Self {
            transport,
            authenticator: RequestAuthenticator::new(config, identity, engine),
            call_timeout_ms: config.call_timeout_ms,
        }
    }

    pub fn authenticator(&self) -> &RequestAuthenticator {
        &self.authenticator
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Send `request` without delegation.
    pub async fn call(&self, request: Request) -> Result<Response> {
        self.call_with(request, &mut AuthenticationContext::new()).await
    }

    /// Send `request`, consuming any delegation held by `ctx`.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(request = request.name())))]
    pub async fn call_with(
        &self,
        request: Request,
        ctx: &mut AuthenticationContext,
    ) -> Result<Response> {
        let bytes = to_canonical_bytes(&request)?;
        let metadata = self.authenticator.authenticate(&bytes, ctx)?;
        #[cfg_attr(not(any(feature = "timeout", feature = "tracing")), allow(unused_variables))]
        let operation = request.name();
        let call = self.transport.call(request, metadata);

        #[cfg(feature = "timeout")]
        let outcome = match self.call_timeout_ms {
            Some(timeout_ms) => {
                tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), call)
                    .await
                    .map_err(|_| TokenkitError::ConnectionTimeout {
                        operation: operation.to_string(),
                        timeout_ms,
                    })?
            }
            None => call.await,
        };

        #[cfg(not(feature = "timeout"))]
        let outcome = call.await;

        outcome.map_err(|failure| {
            #[cfg(feature = "tracing")]
            tracing::debug!(operation, %failure, "platform call failed");
            TokenkitError::from(failure)
        })
    }
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("authenticator", &self.authenticator)
            .field("call_timeout_ms", &self.call_timeout_ms)
            .finish_non_exhaustive()
    }
}

/// Build an error for a response of the wrong kind.
pub(crate) fn unexpected_response(expected: &str, got: &Response) -> TokenkitError {
    TokenkitError::Internal(format!("expected {expected} response, got {}", got.name()))
}
