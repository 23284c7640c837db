use std::sync::{Arc, RwLock};

use super::alias::Alias;
use super::operation::{MemberOperation, RecoveryRule};
use super::record::MemberRecord;
use super::update::MemberUpdate;
use crate::auth::AuthenticationContext;
use crate::policy::{AuthorizationPolicy, CANCEL_LEVEL, REPLACE_ENDORSE_LEVEL};
use crate::rpc::{Request, Response};
use crate::security::{CryptoEngine, Key, KeyLevel};
use crate::token::{Token, TokenAction, TokenOperationResult, TokenPayload, TokenSignature, TokenState};
use crate::transport::{unexpected_response, AuthenticatedClient};
use crate::{MemberId, Result, TokenkitError};

fn lock_error(context: &str) -> TokenkitError {
    TokenkitError::Internal(format!("Member: lock poisoned during {context}"))
}

/// A registered member bound to its keys and an authenticated transport.
///
/// Holds a cached [`MemberRecord`] that is replaced whenever the platform
/// returns a newer one. The cache is never used as the base of an update
/// unless the caller asks for it with [`Member::update_from_snapshot`].
///
/// Concurrent updates through the same handle are not serialized: they race
/// on the member hash and the platform decides which one wins.
pub struct Member {
    id: MemberId,
    client: AuthenticatedClient,
    engine: Arc<dyn CryptoEngine>,
    policy: AuthorizationPolicy,
    record: RwLock<MemberRecord>,
}

impl Member {
    pub(crate) fn new(
        client: AuthenticatedClient,
        engine: Arc<dyn CryptoEngine>,
        policy: AuthorizationPolicy,
        record: MemberRecord,
    ) -> Self {
        Self {
            id: record.id.clone(),
            client,
            engine,
            policy,
            record: RwLock::new(record),
        }
    }

    pub fn id(&self) -> &MemberId {
        &self.id
    }

    pub fn engine(&self) -> &Arc<dyn CryptoEngine> {
        &self.engine
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    /// The cached member record.
    pub fn snapshot(&self) -> Result<MemberRecord> {
        let record = self.record.read().map_err(|_| lock_error("snapshot"))?;
        Ok(record.clone())
    }

    /// Cached hash of the member's operation log.
    pub fn last_hash(&self) -> Result<String> {
        Ok(self.snapshot()?.last_hash)
    }

    pub fn keys(&self) -> Result<Vec<Key>> {
        Ok(self.snapshot()?.keys)
    }

    pub fn aliases(&self) -> Result<Vec<Alias>> {
        Ok(self.snapshot()?.aliases)
    }

    fn store(&self, record: MemberRecord) -> Result<MemberRecord> {
        if record.id != self.id {
            return Err(TokenkitError::Internal(format!(
                "platform returned member {} for {}",
                record.id, self.id
            )));
        }
        let mut cached = self.record.write().map_err(|_| lock_error("store"))?;
        *cached = record.clone();
        Ok(record)
    }

    /// Fetch the member from the platform and replace the cached copy.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(member_id = %self.id)))]
    pub async fn refresh(&self) -> Result<MemberRecord> {
        let response = self
            .client
            .call(Request::GetMember {
                member_id: self.id.clone(),
            })
            .await?;
        match response {
            Response::Member(record) => self.store(record),
            other => Err(unexpected_response("member", &other)),
        }
    }

    /// An update of `operations` on top of `prev_hash`.
    pub fn build_update(
        &self,
        prev_hash: impl Into<String>,
        operations: Vec<MemberOperation>,
    ) -> MemberUpdate {
        MemberUpdate::new(self.id.clone(), prev_hash, operations)
    }

    /// Sign and send a prepared update.
    ///
    /// The signer is chosen by the highest level the operations require. On
    /// success the returned record replaces the cached one. A stale base is
    /// surfaced as [`TokenkitError::StaleBase`] and never retried here.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            skip(self, update),
            fields(member_id = %self.id, prev_hash = %update.prev_hash, operations = update.operations.len())
        )
    )]
    pub async fn submit_update(&self, update: MemberUpdate) -> Result<MemberRecord> {
        if update.member_id != self.id {
            return Err(TokenkitError::invalid_data(
                "member_id",
                format!("update targets {} but handle is {}", update.member_id, self.id),
            ));
        }
        let signer = self.engine.signer_for_level(update.required_level())?;
        #[cfg(feature = "tracing")]
        tracing::debug!(key_id = signer.key_id(), level = %signer.level(), "signing member update");
        let update_signature = update.sign(signer.as_ref())?;

        let result = self
            .client
            .call(Request::UpdateMember {
                update,
                update_signature,
            })
            .await;
        match result {
            Ok(Response::Member(record)) => self.store(record),
            Ok(other) => Err(unexpected_response("member", &other)),
            Err(err @ TokenkitError::StaleBase { .. }) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "member update rejected; refetch and rebuild");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Fetch the current hash, then apply `operations` on top of it.
    ///
    /// The update is never sent if the fetch fails.
    pub async fn update(&self, operations: Vec<MemberOperation>) -> Result<MemberRecord> {
        let current = self.refresh().await?;
        self.submit_update(self.build_update(current.last_hash, operations))
            .await
    }

    /// Apply `operations` on top of the cached hash, without a fetch.
    pub async fn update_from_snapshot(
        &self,
        operations: Vec<MemberOperation>,
    ) -> Result<MemberRecord> {
        let prev_hash = self.last_hash()?;
        self.submit_update(self.build_update(prev_hash, operations))
            .await
    }

    pub async fn add_key(&self, key: Key) -> Result<MemberRecord> {
        self.update(vec![MemberOperation::add_key(key)]).await
    }

    pub async fn add_keys(&self, keys: Vec<Key>) -> Result<MemberRecord> {
        self.update(keys.into_iter().map(MemberOperation::add_key).collect())
            .await
    }

    /// Generate a key at `level` in the engine and register it.
    pub async fn approve_new_key(&self, level: KeyLevel) -> Result<Key> {
        let key = self.engine.generate_key(level)?;
        self.add_key(key.clone()).await?;
        Ok(key)
    }

    pub async fn remove_key(&self, key_id: &str) -> Result<MemberRecord> {
        self.update(vec![MemberOperation::remove_key(key_id)]).await
    }

    /// Normalize, hash and register `alias`.
    pub async fn add_alias(&self, alias: &Alias) -> Result<MemberRecord> {
        self.update(vec![MemberOperation::add_alias(alias)?]).await
    }

    pub async fn remove_alias(&self, alias: &Alias) -> Result<MemberRecord> {
        self.update(vec![MemberOperation::remove_alias(alias)?]).await
    }

    pub async fn set_recovery_rule(&self, rule: RecoveryRule) -> Result<MemberRecord> {
        self.update(vec![MemberOperation::set_recovery_rule(rule)])
            .await
    }

    /// Submit a finalized payload. The token carries no signatures yet.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, payload), fields(member_id = %self.id, kind = payload.body.kind())))]
    pub async fn create_token(&self, payload: TokenPayload) -> Result<Token> {
        if payload.from_member_id() != Some(&self.id) {
            return Err(TokenkitError::invalid_data(
                "from",
                "token must be granted by this member",
            ));
        }
        match self.client.call(Request::CreateToken { payload }).await? {
            Response::Token(token) => Ok(token),
            other => Err(unexpected_response("token", &other)),
        }
    }

    pub async fn get_token(&self, token_id: &str) -> Result<Token> {
        self.get_token_with(token_id, &mut AuthenticationContext::new())
            .await
    }

    /// Fetch a token, consuming any delegation held by `ctx`.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, ctx), fields(member_id = %self.id)))]
    pub async fn get_token_with(
        &self,
        token_id: &str,
        ctx: &mut AuthenticationContext,
    ) -> Result<Token> {
        let request = Request::GetToken {
            token_id: token_id.to_string(),
        };
        match self.client.call_with(request, ctx).await? {
            Response::Token(token) => Ok(token),
            other => Err(unexpected_response("token", &other)),
        }
    }

    fn sign_token(
        &self,
        payload: &TokenPayload,
        action: TokenAction,
        level: KeyLevel,
    ) -> Result<TokenSignature> {
        let signer = self.engine.signer_for_level(level)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(key_id = signer.key_id(), level = %signer.level(), %action, "signing token payload");
        TokenSignature::sign(self.id.clone(), payload, action, signer.as_ref())
    }

    fn operation_result(response: Response) -> Result<TokenOperationResult> {
        match response {
            Response::TokenOperation(result) => Ok(result),
            other => Err(unexpected_response("token operation", &other)),
        }
    }

    /// Endorse `token` with a key at `level`.
    ///
    /// Returns `MoreSignaturesNeeded` rather than an error when the
    /// endorsement does not yet satisfy the token's policy.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, token), fields(member_id = %self.id, token_id = %token.id)))]
    pub async fn endorse_token(&self, token: &Token, level: KeyLevel) -> Result<TokenOperationResult> {
        #[cfg(feature = "tracing")]
        {
            let required = self.policy.required_endorse_level(&token.payload.body);
            if !level.satisfies(required) {
                tracing::debug!(%required, "endorsing below the policy minimum");
            }
        }
        let signature = self.sign_token(&token.payload, TokenAction::Endorsed, level)?;
        let response = self
            .client
            .call(Request::EndorseToken {
                token_id: token.id.clone(),
                signature,
            })
            .await?;
        let result = Self::operation_result(response)?;
        #[cfg(feature = "tracing")]
        if !result.is_success() {
            tracing::debug!(status = ?result.status, "endorsement did not complete the token");
        }
        Ok(result)
    }

    /// Cancel `token` with the lowest key that can.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, token), fields(member_id = %self.id, token_id = %token.id)))]
    pub async fn cancel_token(&self, token: &Token) -> Result<TokenOperationResult> {
        let signature = self.sign_token(&token.payload, TokenAction::Cancelled, CANCEL_LEVEL)?;
        let response = self
            .client
            .call(Request::CancelToken {
                token_id: token.id.clone(),
                signature,
            })
            .await?;
        Self::operation_result(response)
    }

    /// Cancel `token` and create `payload` in a single request.
    pub async fn replace_token(
        &self,
        token: &Token,
        payload: TokenPayload,
    ) -> Result<TokenOperationResult> {
        self.replace(token, payload, None).await
    }

    /// Like [`Member::replace_token`], also endorsing the new payload at `level`.
    pub async fn replace_and_endorse_token(
        &self,
        token: &Token,
        payload: TokenPayload,
        level: KeyLevel,
    ) -> Result<TokenOperationResult> {
        if !level.satisfies(REPLACE_ENDORSE_LEVEL) {
            return Err(TokenkitError::invalid_data(
                "level",
                format!("replace endorsement needs {REPLACE_ENDORSE_LEVEL} or above, got {level}"),
            ));
        }
        self.replace(token, payload, Some(level)).await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, token, payload), fields(member_id = %self.id, token_id = %token.id)))]
    async fn replace(
        &self,
        token: &Token,
        payload: TokenPayload,
        endorse_level: Option<KeyLevel>,
    ) -> Result<TokenOperationResult> {
        if payload.from_member_id() != Some(&self.id) {
            return Err(TokenkitError::invalid_data(
                "from",
                "replacement must be granted by this member",
            ));
        }
        let cancel_signature = self.sign_token(&token.payload, TokenAction::Cancelled, CANCEL_LEVEL)?;
        let endorse_signature = endorse_level
            .map(|level| self.sign_token(&payload, TokenAction::Endorsed, level))
            .transpose()?;
        let response = self
            .client
            .call(Request::ReplaceToken {
                token_id: token.id.clone(),
                cancel_signature,
                payload,
                endorse_signature,
            })
            .await?;
        Self::operation_result(response)
    }

    /// State of one of this member's tokens, judged with the cached keys.
    pub fn token_state(&self, token: &Token) -> Result<TokenState> {
        let record = self.record.read().map_err(|_| lock_error("token_state"))?;
        Ok(token.state(&self.policy, |key_id| record.key_level(key_id)))
    }
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("client", &self.client)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
