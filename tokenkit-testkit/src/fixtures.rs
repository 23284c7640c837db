//! Ready-made platform, client and member setups for tests.

use std::sync::Arc;

use tokenkit_lib::{Client, ClientConfig, InMemoryCryptoEngine, Member, Result};

use crate::config::PlatformConfig;
use crate::platform::SimulatedPlatform;

/// A simulated platform with a client pointed at it.
#[derive(Clone, Debug)]
pub struct TestWorld {
    pub platform: SimulatedPlatform,
    pub client: Client,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(PlatformConfig::default(), ClientConfig::default())
    }

    /// The client inherits the platform's authorization policy.
    pub fn with_config(platform_config: PlatformConfig, client_config: ClientConfig) -> Self {
        let policy = platform_config.policy.clone();
        let platform = SimulatedPlatform::new(platform_config);
        let client = Client::new(Arc::new(platform.clone()), client_config).with_policy(policy);
        Self { platform, client }
    }

    /// Register `username` with a fresh in-memory engine.
    pub async fn register(&self, username: &str) -> Result<(Member, Arc<InMemoryCryptoEngine>)> {
        let engine = Arc::new(InMemoryCryptoEngine::new());
        let member = self.client.create_member(engine.clone(), username).await?;
        Ok((member, engine))
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}
