//! Transport seam and the authenticated client built on it.

mod client;
mod traits;

pub(crate) use client::unexpected_response;
pub use client::AuthenticatedClient;
pub use traits::Transport;
