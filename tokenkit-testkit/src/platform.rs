//! In-memory platform implementing [`Transport`].
//!
//! Enforces the platform-side rules the client relies on:
//!
//! - every envelope is verified against a registered, unexpired key and the
//!   freshness window;
//! - member updates apply only on a matching `prev_hash`, all-or-nothing;
//! - cancelled and replaced tokens reject further signatures;
//! - replace commits its cancel half and create half together.
//!
//! Each call is handled under one lock, so concurrent calls are linearized in
//! arrival order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokenkit_lib::auth::{verify_envelope, CallMetadata, CallerIdentity, Envelope};
use tokenkit_lib::canonical::to_canonical_bytes;
use tokenkit_lib::member::{MemberOperation, MemberRecord, MemberUpdate, UpdateSignature};
use tokenkit_lib::policy::{CANCEL_LEVEL, REPLACE_ENDORSE_LEVEL};
use tokenkit_lib::rpc::{Request, Response};
use tokenkit_lib::security::{key_id_for, now_ms, Ed25519Verifier, Key, KeyLevel};
use tokenkit_lib::token::{
    Token, TokenAction, TokenBody, TokenOperationResult, TokenOperationStatus, TokenPayload,
    TokenSignature,
};
use tokenkit_lib::{MemberId, PlatformError, StatusCode, Transport, TransportFailure};

use crate::config::PlatformConfig;

type CallResult<T> = std::result::Result<T, TransportFailure>;

/// A failure to inject into upcoming calls.
#[derive(Clone, Debug, PartialEq)]
pub enum Fault {
    /// Fail the next call of any kind with this failure, before it is authenticated.
    FailNextCall(TransportFailure),
    /// Fail the next replace after its cancel half is staged and before anything is committed.
    FailReplaceBetweenHalves,
}

/// A call as the platform received it.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub request: &'static str,
    pub metadata: CallMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Caller {
    Member(MemberId),
    Registrant,
}

fn rejected(status: StatusCode, reason: impl Into<String>) -> TransportFailure {
    let reason = reason.into();
    TransportFailure::new(status)
        .with_description(reason.clone())
        .with_error(PlatformError::Rejected { reason })
}

fn unauthenticated(reason: impl Into<String>) -> TransportFailure {
    let reason = reason.into();
    TransportFailure::new(StatusCode::Unauthenticated)
        .with_description(reason.clone())
        .with_error(PlatformError::SignatureRejected { reason })
}

fn bad_signature(reason: impl Into<String>) -> TransportFailure {
    let reason = reason.into();
    TransportFailure::new(StatusCode::InvalidArgument)
        .with_description(reason.clone())
        .with_error(PlatformError::SignatureRejected { reason })
}

fn not_found(what: impl std::fmt::Display) -> TransportFailure {
    TransportFailure::new(StatusCode::NotFound).with_description(format!("{what} not found"))
}

fn terminal(token: &Token) -> TransportFailure {
    let state = if token.replaced_by_token_id.is_some() {
        "replaced"
    } else {
        "cancelled"
    };
    TransportFailure::new(StatusCode::FailedPrecondition)
        .with_description(format!("token {} is already {state}", token.id))
        .with_error(PlatformError::TerminalToken {
            token_id: token.id.clone(),
            state: state.to_string(),
        })
}

/// A key the update itself introduces, usable only by a member's genesis update.
fn genesis_key(record: &MemberRecord, update: &MemberUpdate, key_id: &str) -> Option<Key> {
    if !record.keys.is_empty() || !update.prev_hash.is_empty() || update.member_id != record.id {
        return None;
    }
    update.operations.iter().find_map(|op| match op {
        MemberOperation::AddKey { key } if key.id == key_id => Some(key.clone()),
        _ => None,
    })
}

#[derive(Default)]
struct State {
    members: HashMap<MemberId, MemberRecord>,
    usernames: HashMap<String, MemberId>,
    tokens: HashMap<String, Token>,
    faults: Vec<Fault>,
    calls: Vec<RecordedCall>,
}

impl State {
    fn take_fault(&mut self, wanted: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let index = self.faults.iter().position(wanted)?;
        Some(self.faults.remove(index))
    }

    fn level_of(&self, member_id: &MemberId, key_id: &str) -> Option<KeyLevel> {
        self.members.get(member_id)?.key_level(key_id)
    }

    fn is_authorized(&self, config: &PlatformConfig, token: &Token) -> bool {
        let Some(grantor) = token.payload.from_member_id() else {
            return false;
        };
        config
            .policy
            .is_authorized(&token.payload, &token.payload_signatures, |key_id| {
                self.level_of(grantor, key_id)
            })
    }

    fn authenticate(
        &self,
        config: &PlatformConfig,
        request: &Request,
        metadata: &CallMetadata,
    ) -> CallResult<(Caller, Option<String>)> {
        let bytes = to_canonical_bytes(request)
            .map_err(|e| rejected(StatusCode::InvalidArgument, e.to_string()))?;
        let envelope = Envelope::parse(metadata).map_err(|e| unauthenticated(e.to_string()))?;
        if envelope.realm != config.realm || envelope.scheme != config.scheme {
            return Err(unauthenticated(format!(
                "unsupported realm/scheme {}/{}",
                envelope.realm, envelope.scheme
            )));
        }
        let now = now_ms();

        let caller = match &envelope.identity {
            CallerIdentity::Username(name) => {
                // No key is registered yet; the genesis update binds the keys.
                match request {
                    Request::CreateMember { username } if username == name => {}
                    _ => return Err(unauthenticated("username identity may only register")),
                }
                if !envelope.is_fresh(now, config.freshness_window_ms) {
                    return Err(unauthenticated("signature outside freshness window"));
                }
                Caller::Registrant
            }
            CallerIdentity::Member(member_id) => {
                let record = self
                    .members
                    .get(member_id)
                    .ok_or_else(|| unauthenticated(format!("unknown member {member_id}")))?;
                let key = match (record.key(&envelope.key_id), request) {
                    (Some(key), _) => key.clone(),
                    (None, Request::UpdateMember { update, .. }) => {
                        genesis_key(record, update, &envelope.key_id).ok_or_else(|| {
                            unauthenticated(format!("key {} is not registered", envelope.key_id))
                        })?
                    }
                    (None, _) => {
                        return Err(unauthenticated(format!(
                            "key {} is not registered",
                            envelope.key_id
                        )))
                    }
                };
                if key.is_expired(now) {
                    return Err(unauthenticated(format!("key {} has expired", key.id)));
                }
                let verifier =
                    Ed25519Verifier::from_key(&key).map_err(|e| unauthenticated(e.to_string()))?;
                verify_envelope(metadata, &bytes, &verifier, now, config.freshness_window_ms)
                    .map_err(|e| unauthenticated(e.to_string()))?;
                Caller::Member(member_id.clone())
            }
        };
        Ok((caller, envelope.on_behalf_of))
    }

    fn dispatch(
        &mut self,
        config: &PlatformConfig,
        caller: Caller,
        on_behalf_of: Option<String>,
        request: Request,
    ) -> CallResult<Response> {
        let (caller, request) = match (caller, request) {
            (Caller::Registrant, Request::CreateMember { username }) => {
                return self.create_member(username)
            }
            (Caller::Registrant, _) => {
                return Err(rejected(StatusCode::PermissionDenied, "not a member"))
            }
            (Caller::Member(id), request) => (id, request),
        };

        match request {
            Request::CreateMember { .. } => Err(rejected(
                StatusCode::AlreadyExists,
                format!("{caller} is already registered"),
            )),
            Request::GetMember { member_id } => self
                .members
                .get(&member_id)
                .cloned()
                .map(Response::Member)
                .ok_or_else(|| not_found(format!("member {member_id}"))),
            Request::UpdateMember {
                update,
                update_signature,
            } => self.update_member(config, &caller, update, update_signature),
            Request::CreateToken { payload } => self.create_token(&caller, payload),
            Request::GetToken { token_id } => {
                self.get_token(config, &caller, on_behalf_of.as_deref(), &token_id)
            }
            Request::EndorseToken {
                token_id,
                signature,
            } => self.endorse_token(config, &caller, &token_id, signature),
            Request::CancelToken {
                token_id,
                signature,
            } => self.cancel_token(&caller, &token_id, signature),
            Request::ReplaceToken {
                token_id,
                cancel_signature,
                payload,
                endorse_signature,
            } => self.replace_token(
                config,
                &caller,
                &token_id,
                cancel_signature,
                payload,
                endorse_signature,
            ),
        }
    }

    fn create_member(&mut self, username: String) -> CallResult<Response> {
        if self.usernames.contains_key(&username) {
            return Err(rejected(
                StatusCode::AlreadyExists,
                format!("username {username} is taken"),
            ));
        }
        let member_id = MemberId::new(format!("m:{}", uuid::Uuid::new_v4().simple()));
        self.usernames.insert(username, member_id.clone());
        self.members
            .insert(member_id.clone(), MemberRecord::empty(member_id.clone()));
        Ok(Response::MemberCreated { member_id })
    }

    fn update_member(
        &mut self,
        config: &PlatformConfig,
        caller: &MemberId,
        update: MemberUpdate,
        signature: UpdateSignature,
    ) -> CallResult<Response> {
        if &update.member_id != caller {
            return Err(rejected(
                StatusCode::PermissionDenied,
                "members may only update themselves",
            ));
        }
        let record = self
            .members
            .get(caller)
            .cloned()
            .ok_or_else(|| not_found(format!("member {caller}")))?;

        if update.prev_hash != record.last_hash {
            tracing::debug!(member_id = %caller, expected = %update.prev_hash, actual = %record.last_hash, "stale member update");
            return Err(TransportFailure::new(StatusCode::Aborted)
                .with_description(format!(
                    "update built on {:?} but member is at {:?}",
                    update.prev_hash, record.last_hash
                ))
                .with_error(PlatformError::StaleBase {
                    member_id: caller.to_string(),
                    expected_hash: update.prev_hash.clone(),
                    actual_hash: record.last_hash.clone(),
                }));
        }
        if update.operations.is_empty() {
            return Err(rejected(StatusCode::InvalidArgument, "update is empty"));
        }

        let key = record
            .key(&signature.key_id)
            .cloned()
            .or_else(|| genesis_key(&record, &update, &signature.key_id))
            .ok_or_else(|| {
                rejected(
                    StatusCode::PermissionDenied,
                    format!("update signed by unknown key {}", signature.key_id),
                )
            })?;
        if key.is_expired(now_ms()) {
            return Err(rejected(StatusCode::PermissionDenied, "update key has expired"));
        }
        let required = update.required_level();
        if !key.level.satisfies(required) {
            return Err(rejected(
                StatusCode::PermissionDenied,
                format!("update requires {required}, key is {}", key.level),
            ));
        }
        let verifier = Ed25519Verifier::from_key(&key)
            .map_err(|e| rejected(StatusCode::InvalidArgument, e.to_string()))?;
        update
            .verify(&signature, &verifier)
            .map_err(|e| bad_signature(e.to_string()))?;

        let mut staged = record;
        for operation in &update.operations {
            self.apply(config, &mut staged, operation)?;
        }
        staged.last_hash = update
            .chained_hash()
            .map_err(|e| rejected(StatusCode::Internal, e.to_string()))?;

        tracing::debug!(member_id = %caller, last_hash = %staged.last_hash, "member update applied");
        self.members.insert(caller.clone(), staged.clone());
        Ok(Response::Member(staged))
    }

    fn apply(
        &self,
        config: &PlatformConfig,
        staged: &mut MemberRecord,
        operation: &MemberOperation,
    ) -> CallResult<()> {
        match operation {
            MemberOperation::AddKey { key } => match staged.key(&key.id) {
                Some(existing) if existing == key && config.add_key_idempotent => Ok(()),
                Some(existing) if existing == key => Err(rejected(
                    StatusCode::AlreadyExists,
                    format!("key {} already added", key.id),
                )),
                Some(_) => Err(rejected(
                    StatusCode::InvalidArgument,
                    format!("key id {} reused with different material", key.id),
                )),
                None => {
                    let material = key
                        .public_key_bytes()
                        .map_err(|e| rejected(StatusCode::InvalidArgument, e.to_string()))?;
                    if key_id_for(&material) != key.id {
                        return Err(rejected(
                            StatusCode::InvalidArgument,
                            format!("key id {} does not match its material", key.id),
                        ));
                    }
                    staged.keys.push(key.clone());
                    Ok(())
                }
            },
            MemberOperation::RemoveKey { key_id } => {
                let index = staged
                    .keys
                    .iter()
                    .position(|k| &k.id == key_id)
                    .ok_or_else(|| not_found(format!("key {key_id}")))?;
                staged.keys.remove(index);
                Ok(())
            }
            MemberOperation::AddAlias { alias_hash, alias } => {
                let computed = alias
                    .alias_hash()
                    .map_err(|e| rejected(StatusCode::InvalidArgument, e.to_string()))?;
                if &computed != alias_hash {
                    return Err(rejected(StatusCode::InvalidArgument, "alias hash mismatch"));
                }
                let taken = self
                    .members
                    .values()
                    .any(|m| m.id != staged.id && m.has_alias_hash(alias_hash));
                if taken {
                    return Err(rejected(
                        StatusCode::AlreadyExists,
                        "alias belongs to another member",
                    ));
                }
                if !staged.has_alias_hash(alias_hash) {
                    staged.aliases.push(alias.clone());
                }
                Ok(())
            }
            MemberOperation::RemoveAlias { alias_hash } => {
                let index = staged
                    .aliases
                    .iter()
                    .position(|a| a.alias_hash().map(|h| &h == alias_hash).unwrap_or(false))
                    .ok_or_else(|| not_found(format!("alias {alias_hash}")))?;
                staged.aliases.remove(index);
                Ok(())
            }
            MemberOperation::SetRecoveryRule { rule } => {
                staged.recovery_rule = Some(rule.clone());
                Ok(())
            }
        }
    }

    fn create_token(&mut self, caller: &MemberId, payload: TokenPayload) -> CallResult<Response> {
        if payload.from_member_id() != Some(caller) {
            return Err(rejected(
                StatusCode::PermissionDenied,
                "tokens are created by their grantor",
            ));
        }
        if let Some(to) = &payload.to.member_id {
            if !self.members.contains_key(to) {
                return Err(not_found(format!("member {to}")));
            }
        }
        let token = Token::new(format!("tt:{}", uuid::Uuid::new_v4().simple()), payload);
        self.tokens.insert(token.id.clone(), token.clone());
        Ok(Response::Token(token))
    }

    /// Whether `on_behalf_of` is a live access grant from `grantor` to `caller`.
    fn delegation_allows(
        &self,
        config: &PlatformConfig,
        caller: &MemberId,
        on_behalf_of: Option<&str>,
        grantor: &MemberId,
    ) -> bool {
        let Some(access) = on_behalf_of.and_then(|id| self.tokens.get(id)) else {
            return false;
        };
        matches!(access.payload.body, TokenBody::Access(_))
            && access.payload.to.member_id.as_ref() == Some(caller)
            && access.payload.from_member_id() == Some(grantor)
            && !access.is_terminal()
            && self.is_authorized(config, access)
    }

    fn get_token(
        &self,
        config: &PlatformConfig,
        caller: &MemberId,
        on_behalf_of: Option<&str>,
        token_id: &str,
    ) -> CallResult<Response> {
        let token = self
            .tokens
            .get(token_id)
            .ok_or_else(|| not_found(format!("token {token_id}")))?;
        let party = token.payload.from_member_id() == Some(caller)
            || token.payload.to.member_id.as_ref() == Some(caller);
        let delegated = token
            .payload
            .from_member_id()
            .map(|grantor| self.delegation_allows(config, caller, on_behalf_of, grantor))
            .unwrap_or(false);
        if !party && !delegated {
            return Err(rejected(
                StatusCode::PermissionDenied,
                format!("{caller} may not read token {token_id}"),
            ));
        }
        Ok(Response::Token(token.clone()))
    }

    fn live_token(&self, token_id: &str) -> CallResult<Token> {
        let token = self
            .tokens
            .get(token_id)
            .ok_or_else(|| not_found(format!("token {token_id}")))?;
        if token.is_terminal() {
            return Err(terminal(token));
        }
        Ok(token.clone())
    }

    /// Verify `signature` as `caller`'s `action` over `payload`, returning the key level.
    fn check_signature(
        &self,
        caller: &MemberId,
        payload: &TokenPayload,
        signature: &TokenSignature,
        action: TokenAction,
    ) -> CallResult<KeyLevel> {
        if &signature.member_id != caller {
            return Err(rejected(
                StatusCode::PermissionDenied,
                "signature names another member",
            ));
        }
        if signature.action != action {
            return Err(rejected(
                StatusCode::InvalidArgument,
                format!("expected a {action} signature, got {}", signature.action),
            ));
        }
        let key = self
            .members
            .get(caller)
            .and_then(|m| m.key(&signature.key_id))
            .ok_or_else(|| {
                rejected(
                    StatusCode::PermissionDenied,
                    format!("unknown key {}", signature.key_id),
                )
            })?;
        if key.is_expired(now_ms()) {
            return Err(rejected(StatusCode::PermissionDenied, "signing key has expired"));
        }
        let verifier = Ed25519Verifier::from_key(key)
            .map_err(|e| rejected(StatusCode::InvalidArgument, e.to_string()))?;
        signature
            .verify(payload, &verifier)
            .map_err(|e| bad_signature(e.to_string()))?;
        Ok(key.level)
    }

    fn endorse_token(
        &mut self,
        config: &PlatformConfig,
        caller: &MemberId,
        token_id: &str,
        signature: TokenSignature,
    ) -> CallResult<Response> {
        let mut token = self.live_token(token_id)?;
        if token.payload.from_member_id() != Some(caller) {
            return Err(rejected(
                StatusCode::PermissionDenied,
                "only the grantor endorses a token",
            ));
        }
        self.check_signature(caller, &token.payload, &signature, TokenAction::Endorsed)?;
        token.payload_signatures.push(signature);

        let status = if self.is_authorized(config, &token) {
            TokenOperationStatus::Success
        } else {
            TokenOperationStatus::MoreSignaturesNeeded
        };
        self.tokens.insert(token.id.clone(), token.clone());
        Ok(Response::TokenOperation(TokenOperationResult::new(token, status)))
    }

    fn cancel_token(
        &mut self,
        caller: &MemberId,
        token_id: &str,
        signature: TokenSignature,
    ) -> CallResult<Response> {
        let mut token = self.live_token(token_id)?;
        let party = token.payload.from_member_id() == Some(caller)
            || token.payload.to.member_id.as_ref() == Some(caller);
        if !party {
            return Err(rejected(
                StatusCode::PermissionDenied,
                "only a party may cancel a token",
            ));
        }
        let level = self.check_signature(caller, &token.payload, &signature, TokenAction::Cancelled)?;
        if !level.satisfies(CANCEL_LEVEL) {
            return Err(rejected(StatusCode::PermissionDenied, "cancel key level too low"));
        }
        token.payload_signatures.push(signature);
        self.tokens.insert(token.id.clone(), token.clone());
        Ok(Response::TokenOperation(TokenOperationResult::new(
            token,
            TokenOperationStatus::Success,
        )))
    }

    fn replace_token(
        &mut self,
        config: &PlatformConfig,
        caller: &MemberId,
        token_id: &str,
        cancel_signature: TokenSignature,
        payload: TokenPayload,
        endorse_signature: Option<TokenSignature>,
    ) -> CallResult<Response> {
        let old = self.live_token(token_id)?;
        if old.payload.from_member_id() != Some(caller) || payload.from_member_id() != Some(caller)
        {
            return Err(rejected(
                StatusCode::PermissionDenied,
                "only the grantor replaces a token",
            ));
        }
        self.check_signature(caller, &old.payload, &cancel_signature, TokenAction::Cancelled)?;
        let mut cancelled = old;
        cancelled.payload_signatures.push(cancel_signature);

        if self
            .take_fault(|f| matches!(f, Fault::FailReplaceBetweenHalves))
            .is_some()
        {
            tracing::warn!(token_id, "injected failure between replace halves");
            return Err(TransportFailure::new(StatusCode::Internal)
                .with_description("replace interrupted before the new token was created"));
        }

        let mut replacement = Token::new(format!("tt:{}", uuid::Uuid::new_v4().simple()), payload);
        let mut status = TokenOperationStatus::Success;
        if let Some(signature) = endorse_signature {
            let level = self.check_signature(
                caller,
                &replacement.payload,
                &signature,
                TokenAction::Endorsed,
            )?;
            if !level.satisfies(REPLACE_ENDORSE_LEVEL) {
                return Err(rejected(
                    StatusCode::PermissionDenied,
                    format!("replace endorsement needs {REPLACE_ENDORSE_LEVEL}, key is {level}"),
                ));
            }
            replacement.payload_signatures.push(signature);
            if !self.is_authorized(config, &replacement) {
                status = TokenOperationStatus::MoreSignaturesNeeded;
            }
        }

        cancelled.replaced_by_token_id = Some(replacement.id.clone());
        self.tokens.insert(cancelled.id.clone(), cancelled);
        self.tokens
            .insert(replacement.id.clone(), replacement.clone());
        Ok(Response::TokenOperation(TokenOperationResult::new(
            replacement,
            status,
        )))
    }
}

/// The simulated platform. Clones share state.
#[derive(Clone, Default)]
pub struct SimulatedPlatform {
    config: Arc<PlatformConfig>,
    state: Arc<Mutex<State>>,
}

impl SimulatedPlatform {
    pub fn new(config: PlatformConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::default(),
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays readable after a panicking caller.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a fault; faults fire in the order they were injected.
    pub fn inject_fault(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    pub fn member(&self, member_id: &MemberId) -> Option<MemberRecord> {
        self.lock().members.get(member_id).cloned()
    }

    pub fn member_by_username(&self, username: &str) -> Option<MemberId> {
        self.lock().usernames.get(username).cloned()
    }

    pub fn token(&self, token_id: &str) -> Option<Token> {
        self.lock().tokens.get(token_id).cloned()
    }

    pub fn token_count(&self) -> usize {
        self.lock().tokens.len()
    }

    /// Every call received so far, including rejected ones.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.lock().calls.last().cloned()
    }
}

impl std::fmt::Debug for SimulatedPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SimulatedPlatform")
            .field("config", &self.config)
            .field("members", &state.members.len())
            .field("tokens", &state.tokens.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl Transport for SimulatedPlatform {
    async fn call(&self, request: Request, metadata: CallMetadata) -> CallResult<Response> {
        let mut state = self.lock();
        let name = request.name();
        state.calls.push(RecordedCall {
            request: name,
            metadata: metadata.clone(),
        });

        if let Some(Fault::FailNextCall(failure)) =
            state.take_fault(|f| matches!(f, Fault::FailNextCall(_)))
        {
            tracing::debug!(request = name, %failure, "injected call failure");
            return Err(failure);
        }

        let (caller, on_behalf_of) = state.authenticate(&self.config, &request, &metadata)?;
        let outcome = state.dispatch(&self.config, caller, on_behalf_of, request);
        if let Err(failure) = &outcome {
            tracing::debug!(request = name, %failure, "call rejected");
        }
        outcome
    }
}
