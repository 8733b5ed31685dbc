//! Session bootstrap, route guarding, sign-in and logout.
//!
//! `RouteGuard` decides whether a protected route may be shown, resolving the
//! identity through the pipeline when the store has no usable credential.
//! `SessionService` performs the explicit sign-in/logout transitions.

use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthPipeline};
use crate::models::{Role, User};
use crate::navigation::Route;

/// Result of checking the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Signed in. `user` is set when the identity query ran.
    Granted { role: Role, user: Option<User> },
    Denied,
}

/// Where navigation ends up after guarding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Show(Route),
    Redirect(Route),
}

pub struct RouteGuard<'a> {
    pipeline: &'a AuthPipeline,
}

impl<'a> RouteGuard<'a> {
    pub fn new(pipeline: &'a AuthPipeline) -> Self {
        Self { pipeline }
    }

    /// Check the session, querying "who am I" when nothing usable is cached.
    ///
    /// A 401 from the identity query has already been through the refresh
    /// protocol, so it means the user must sign in again.
    pub async fn check(&self) -> Result<Access, ApiError> {
        let store = self.pipeline.store();
        let credential = store.get();
        if let (true, Some(role)) = (credential.is_authenticated(), credential.role()) {
            return Ok(Access::Granted { role, user: None });
        }

        match self.pipeline.fetch_me().await {
            Ok(user) => {
                match store.bearer() {
                    Some(token) => store.set(token, user.role),
                    None => debug!("Identity resolved without an access token"),
                }
                info!(username = %user.username, role = %user.role, "Session resolved");
                Ok(Access::Granted {
                    role: user.role,
                    user: Some(user),
                })
            }
            Err(e) if e.is_auth_failure() => {
                debug!("Identity query unauthorized");
                Ok(Access::Denied)
            }
            Err(e) => Err(e),
        }
    }

    /// Guard navigation to `route`
    pub async fn resolve(&self, route: Route) -> Result<Navigation, ApiError> {
        if !route.is_protected() {
            return Ok(Navigation::Show(route));
        }
        match self.check().await? {
            Access::Granted { .. } => Ok(Navigation::Show(route)),
            Access::Denied => Ok(Navigation::Redirect(Route::SignIn)),
        }
    }

    /// Completes once the credential is cleared, with the route to leave to.
    pub async fn wait_for_sign_out(&self) -> Route {
        let mut rx = self.pipeline.store().subscribe();
        // The store owns the sender, so the channel stays open while we wait.
        let _ = rx.wait_for(|credential| !credential.is_authenticated()).await;
        Route::SignIn
    }
}

pub struct SessionService<'a> {
    pipeline: &'a AuthPipeline,
}

impl<'a> SessionService<'a> {
    pub fn new(pipeline: &'a AuthPipeline) -> Self {
        Self { pipeline }
    }

    /// Sign in and store the resulting credential
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let response = self.pipeline.sign_in(username, password).await?;
        self.pipeline
            .store()
            .set(response.token.access, response.user.role);
        info!(username = %response.user.username, role = %response.user.role, "Signed in");
        Ok(response.user)
    }

    /// Log out on the server, then clear local state whatever the server said
    pub async fn logout(&self) {
        if let Err(e) = self.pipeline.logout().await {
            warn!(error = %e, "Logout request failed");
        }
        self.pipeline.store().clear();
        info!("Signed out");
    }
}
