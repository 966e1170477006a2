use serde::Serialize;

/// Resolved identity of a signed-in user, as supplied by the identity
/// provider. The library layer only ever keys on `uid`.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Per-request context. Built once at the request boundary and passed
/// explicitly into every service call; there is no ambient session state.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    user: Option<Identity>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self { user: None }
    }

    pub fn signed_in(user: Identity) -> Self {
        Self { user: Some(user) }
    }

    pub fn user(&self) -> Option<&Identity> {
        self.user.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }
}
