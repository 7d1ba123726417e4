//! Explicit session identity passed to every cart and checkout call.
//!
//! There is no ambient identity: every operation takes a [`SessionContext`]
//! naming both the local cache slot (the [`SessionKey`]) and the caller's
//! identity. The key is assigned once per browser session and survives the
//! guest bootstrap - only the identity evolves when a guest session token is
//! attached or the customer signs in.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use uuid::Uuid;

/// Opaque key identifying one local session slot in the cart store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The key as a string slice (for logging and cache diagnostics).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The caller's identity.
///
/// Implements `Debug` manually to redact session and access tokens.
#[derive(Clone)]
pub enum Identity {
    /// Anonymous identity allowing cart use without an account. The token is
    /// `None` until the guest bootstrap has run.
    Guest {
        session_token: Option<SecretString>,
    },
    /// Signed-in customer. Contact info resolves from the profile, so the
    /// customer-info checkout step needs no further validation.
    Authenticated {
        name: String,
        email: String,
        phone: Option<String>,
        access_token: SecretString,
    },
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Guest { session_token } => f
                .debug_struct("Guest")
                .field(
                    "session_token",
                    &session_token.as_ref().map(|_| "[REDACTED]"),
                )
                .finish(),
            Self::Authenticated { name, email, phone, .. } => f
                .debug_struct("Authenticated")
                .field("name", name)
                .field("email", email)
                .field("phone", phone)
                .field("access_token", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Explicit session value threaded through every call.
#[derive(Debug, Clone)]
pub struct SessionContext {
    key: SessionKey,
    identity: Identity,
}

impl SessionContext {
    /// Start a fresh guest session with no server-side identity yet.
    #[must_use]
    pub fn guest() -> Self {
        Self {
            key: SessionKey::generate(),
            identity: Identity::Guest {
                session_token: None,
            },
        }
    }

    /// Start a session for a signed-in customer.
    #[must_use]
    pub fn authenticated(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: Option<String>,
        access_token: SecretString,
    ) -> Self {
        Self {
            key: SessionKey::generate(),
            identity: Identity::Authenticated {
                name: name.into(),
                email: email.into(),
                phone,
                access_token,
            },
        }
    }

    /// The local cache slot this session owns.
    #[must_use]
    pub const fn key(&self) -> &SessionKey {
        &self.key
    }

    /// The caller's identity.
    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self.identity, Identity::Authenticated { .. })
    }

    /// Whether any server-side session exists (guest token or account).
    #[must_use]
    pub const fn has_server_session(&self) -> bool {
        match &self.identity {
            Identity::Guest { session_token } => session_token.is_some(),
            Identity::Authenticated { .. } => true,
        }
    }

    /// Attach the token issued by the guest bootstrap, keeping the key.
    pub fn attach_guest_token(&mut self, token: SecretString) {
        if let Identity::Guest { session_token } = &mut self.identity {
            *session_token = Some(token);
        }
    }

    /// The bearer token for authenticated requests, if any.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        match &self.identity {
            Identity::Guest { session_token } => {
                session_token.as_ref().map(ExposeSecret::expose_secret)
            }
            Identity::Authenticated { access_token, .. } => Some(access_token.expose_secret()),
        }
    }
}

/// Response from the guest session bootstrap endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestSession {
    pub session_token: String,
}
