//! Tokenkit testkit.
//!
//! An in-memory [`SimulatedPlatform`] that implements
//! [`tokenkit_lib::Transport`] with the platform-side rules the client
//! depends on, plus fault injection for failure-path tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokenkit_testkit::TestWorld;
//!
//! let world = TestWorld::new();
//! let (alice, _engine) = world.register("alice").await?;
//! assert_eq!(world.platform.member(alice.id()).unwrap().keys.len(), 3);
//! ```

pub mod config;
pub mod fixtures;
pub mod platform;

pub use config::PlatformConfig;
pub use fixtures::TestWorld;
pub use platform::{Fault, RecordedCall, SimulatedPlatform};
