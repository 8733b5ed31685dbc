//! In-memory credential state shared by the pipeline and the embedding app.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::models::Role;

/// Snapshot of the current session credential.
///
/// `token` and `role` are only ever set together, so a credential is either
/// authenticated with a known role or not authenticated at all. A token
/// obtained by a refresh before the role is known is kept as `pending`: it is
/// sent as the bearer but does not count as a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    token: Option<String>,
    role: Option<Role>,
    pending: Option<String>,
}

impl Credential {
    pub fn authenticated(token: String, role: Role) -> Self {
        Self {
            token: Some(token),
            role: Some(role),
            pending: None,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Token to send with requests: the session token, else a pending one
    pub fn bearer(&self) -> Option<&str> {
        self.token.as_deref().or(self.pending.as_deref())
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Process-wide credential holder.
///
/// Clone is cheap: every clone shares the same underlying state. Readers never
/// wait on I/O; writers go through `set`, `set_access_token` and `clear` only.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    state: Arc<watch::Sender<Credential>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    /// Create an unauthenticated store
    pub fn new() -> Self {
        Self::with_credential(Credential::default())
    }

    /// Create a store already holding a credential (restored session)
    pub fn with_credential(credential: Credential) -> Self {
        let (state, _) = watch::channel(credential);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn get(&self) -> Credential {
        self.state.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn bearer(&self) -> Option<String> {
        self.state.borrow().bearer().map(str::to_string)
    }

    pub fn role(&self) -> Option<Role> {
        self.state.borrow().role
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Replace the credential after sign-in or identity resolution.
    pub fn set(&self, token: String, role: Role) {
        debug!(role = %role, "Credential set");
        self.state.send_replace(Credential::authenticated(token, role));
    }

    /// Replace only the access token, keeping the known role.
    ///
    /// Without a role the token is held as pending until `set` completes the
    /// credential, so the store never reports a session with no role.
    pub fn set_access_token(&self, token: String) {
        self.state.send_modify(|credential| {
            if credential.role.is_some() {
                credential.token = Some(token);
            } else {
                credential.pending = Some(token);
            }
        });
        debug!("Access token replaced");
    }

    /// Reset to unauthenticated and notify subscribers.
    pub fn clear(&self) {
        self.state.send_replace(Credential::default());
        debug!("Credential cleared");
    }

    /// Observe credential transitions, e.g. to leave protected areas on `clear`.
    pub fn subscribe(&self) -> watch::Receiver<Credential> {
        self.state.subscribe()
    }
}
