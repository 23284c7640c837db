//! Entry point: registration and loading of members.

use std::sync::Arc;

use crate::auth::CallerIdentity;
use crate::config::ClientConfig;
use crate::member::{Member, MemberOperation, MemberRecord, MemberUpdate};
use crate::policy::AuthorizationPolicy;
use crate::rpc::{Request, Response};
use crate::security::{CryptoEngine, KeyLevel};
use crate::transport::{unexpected_response, AuthenticatedClient, Transport};
use crate::{MemberId, Result, TokenkitError};

/// Factory for [`Member`] handles sharing one transport and configuration.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    policy: AuthorizationPolicy,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            policy: AuthorizationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AuthorizationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    fn member_client(&self, member_id: &MemberId, engine: Arc<dyn CryptoEngine>) -> AuthenticatedClient {
        AuthenticatedClient::new(
            self.transport.clone(),
            &self.config,
            CallerIdentity::Member(member_id.clone()),
            engine,
        )
    }

    /// Register a new member under `username`.
    ///
    /// Generates one key per level in `engine`, reserves a member id with a
    /// username-authenticated call, then submits the genesis update adding
    /// the keys.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, engine)))]
    pub async fn create_member(
        &self,
        engine: Arc<dyn CryptoEngine>,
        username: &str,
    ) -> Result<Member> {
        let username = username.trim();
        if username.is_empty() {
            return Err(TokenkitError::invalid_data("username", "must not be empty"));
        }

        let mut keys = Vec::with_capacity(KeyLevel::ALL.len());
        for level in KeyLevel::ALL.iter().rev() {
            keys.push(engine.generate_key(*level)?);
        }

        let registration = AuthenticatedClient::new(
            self.transport.clone(),
            &self.config,
            CallerIdentity::Username(username.to_string()),
            engine.clone(),
        );
        let member_id = match registration
            .call(Request::CreateMember {
                username: username.to_string(),
            })
            .await?
        {
            Response::MemberCreated { member_id } => member_id,
            other => return Err(unexpected_response("member_created", &other)),
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(%member_id, "member id assigned");

        let member = Member::new(
            self.member_client(&member_id, engine.clone()),
            engine,
            self.policy.clone(),
            MemberRecord::empty(member_id.clone()),
        );
        let genesis = MemberUpdate::genesis(
            member_id,
            keys.into_iter().map(MemberOperation::add_key).collect(),
        );
        member.submit_update(genesis).await?;
        Ok(member)
    }

    /// Bind an existing member to `engine` and fetch its current state.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, member_id, engine), fields(%member_id)))]
    pub async fn load_member(
        &self,
        member_id: MemberId,
        engine: Arc<dyn CryptoEngine>,
    ) -> Result<Member> {
        let member = Member::new(
            self.member_client(&member_id, engine.clone()),
            engine,
            self.policy.clone(),
            MemberRecord::empty(member_id),
        );
        member.refresh().await?;
        Ok(member)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
