//! Per-call delegation state.

/// Delegation slot for a single logical call.
///
/// Holds an optional "on-behalf-of" access token id. The slot is single-use:
/// the authenticator takes the value while building the envelope, so a
/// delegation can never leak into a later, unrelated call. Construct a fresh
/// context (or set the value again) right before every delegated call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthenticationContext {
    on_behalf_of: Option<String>,
}

impl AuthenticationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that delegates the next call to `access_token_id`.
    pub fn with_on_behalf_of(access_token_id: impl Into<String>) -> Self {
        Self {
            on_behalf_of: Some(access_token_id.into()),
        }
    }

    pub fn set_on_behalf_of(&mut self, access_token_id: impl Into<String>) {
        self.on_behalf_of = Some(access_token_id.into());
    }

    /// Read and clear the delegation value.
    pub fn take_on_behalf_of(&mut self) -> Option<String> {
        self.on_behalf_of.take()
    }

    /// Inspect the delegation value without consuming it.
    pub fn peek(&self) -> Option<&str> {
        self.on_behalf_of.as_deref()
    }

    pub fn clear(&mut self) {
        self.on_behalf_of = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_clears_value() {
        let mut ctx = AuthenticationContext::with_on_behalf_of("tt:access");
        assert_eq!(ctx.peek(), Some("tt:access"));
        assert_eq!(ctx.take_on_behalf_of().as_deref(), Some("tt:access"));
        assert_eq!(ctx.take_on_behalf_of(), None);
        assert_eq!(ctx.peek(), None);
    }

    #[test]
    fn value_can_be_set_again() {
        let mut ctx = AuthenticationContext::new();
        assert_eq!(ctx.take_on_behalf_of(), None);
        ctx.set_on_behalf_of("tt:1");
        ctx.clear();
        assert_eq!(ctx.take_on_behalf_of(), None);
        ctx.set_on_behalf_of("tt:2");
        assert_eq!(ctx.take_on_behalf_of().as_deref(), Some("tt:2"));
    }
}
