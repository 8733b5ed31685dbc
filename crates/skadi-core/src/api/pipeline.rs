//! Authenticated request pipeline.
//!
//! Every API call goes through [`AuthPipeline::execute`]. The pipeline
//! attaches the bearer token from the [`CredentialStore`], and when a
//! credentialed call comes back 401 it refreshes the access token through the
//! [`RefreshGate`] so that a burst of failing calls produces a single refresh.
//! Each call is retried at most once after a refresh. The refresh itself runs
//! in its own task, so a caller that stops waiting does not abort it.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::auth::{CredentialStore, RefreshGate, RefreshPermit};
use crate::config::Config;
use crate::models::AccessToken;

use super::{ApiError, ApiRequest, ApiResponse};

/// Callbacks supplied by the embedding application.
pub trait AuthHooks: Send + Sync {
    /// The session cannot be recovered: clear state and send the user to sign-in.
    fn on_auth_failure(&self);

    /// A refresh produced a new access token. The default writes it to the store.
    fn on_token_refresh(&self, store: &CredentialStore, token: String) {
        store.set_access_token(token);
    }
}

pub struct AuthPipeline {
    client: Client,
    cookies: Arc<Jar>,
    config: Config,
    store: CredentialStore,
    gate: RefreshGate,
    hooks: OnceLock<Arc<dyn AuthHooks>>,
}

impl AuthPipeline {
    /// Create a pipeline over `store`. Hooks must be installed before the
    /// first call.
    pub fn new(config: Config, store: CredentialStore) -> Result<Self, ApiError> {
        Self::with_cookies(config, store, Arc::new(Jar::default()))
    }

    /// Create a pipeline with a pre-populated cookie jar (restored session)
    pub fn with_cookies(
        config: Config,
        store: CredentialStore,
        cookies: Arc<Jar>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_provider(Arc::clone(&cookies))
            .build()?;

        Ok(Self {
            client,
            cookies,
            config,
            store,
            gate: RefreshGate::new(),
            hooks: OnceLock::new(),
        })
    }

    /// Register the application's hooks. Can only be done once.
    pub fn install_hooks(&self, hooks: Arc<dyn AuthHooks>) -> Result<(), ApiError> {
        self.hooks
            .set(hooks)
            .map_err(|_| ApiError::HooksAlreadyInstalled)
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn gate(&self) -> &RefreshGate {
        &self.gate
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cookies(&self) -> &Arc<Jar> {
        &self.cookies
    }

    fn hooks(&self) -> Result<Arc<dyn AuthHooks>, ApiError> {
        self.hooks.get().cloned().ok_or(ApiError::HooksNotInstalled)
    }

    /// Execute one logical API call with refresh-on-401 semantics.
    ///
    /// The returned response is whatever the server said last: non-401
    /// statuses pass through untouched, and a retry after refresh is returned
    /// even if it failed again.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let hooks = self.hooks()?;

        // Nothing races ahead of a refresh that is already running.
        self.gate.wait_for_idle().await;

        let (response, sent_with) = self.dispatch(request).await?;
        if response.status() != StatusCode::UNAUTHORIZED || !request.carries_credentials() {
            return Ok(response);
        }

        match self.gate.try_acquire() {
            Some(permit) => {
                // Another caller refreshed (or the session was cleared) after
                // this request went out; its 401 belongs to that cycle.
                if self.store.bearer() != sent_with {
                    drop(permit);
                    debug!(path = request.path(), "Credential changed while request was in flight");
                    return self.retry(request).await;
                }
                self.refresh_and_retry(request, response, hooks, permit).await
            }
            None => {
                debug!(path = request.path(), "Refresh in progress, waiting to retry");
                self.gate.wait_for_idle().await;
                self.retry(request).await
            }
        }
    }

    /// Run the refresh as a detached task that owns the permit, then retry.
    ///
    /// The caller may stop waiting, but the refresh runs to completion and
    /// the gate stays closed until it has.
    async fn refresh_and_retry(
        &self,
        request: &ApiRequest,
        original: ApiResponse,
        hooks: Arc<dyn AuthHooks>,
        permit: RefreshPermit,
    ) -> Result<ApiResponse, ApiError> {
        let task = tokio::spawn(run_refresh(
            self.client.clone(),
            self.config.url(&self.config.endpoints.refresh),
            self.store.clone(),
            hooks,
            permit,
        ));

        let refreshed = task
            .await
            .map_err(|e| ApiError::RefreshInterrupted(e.to_string()))??;
        if refreshed {
            self.retry(request).await
        } else {
            Ok(original)
        }
    }

    /// Final attempt after a refresh. No further 401 handling.
    async fn retry(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let (response, _) = self.dispatch(request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(path = request.path(), "Retried request still unauthorized");
        }
        Ok(response)
    }

    /// Send once, returning the response and the token it was sent with.
    async fn dispatch(
        &self,
        request: &ApiRequest,
    ) -> Result<(ApiResponse, Option<String>), ApiError> {
        let token = if request.carries_credentials() {
            self.store.bearer()
        } else {
            None
        };

        let url = self.config.url(request.path());
        let mut builder = self.client.request(request.method().clone(), &url);
        if let Some(ref token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        debug!(method = %request.method(), path = request.path(), "Sending request");
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        debug!(method = %request.method(), path = request.path(), status = %status, "Response received");

        Ok((ApiResponse::new(status, body), token))
    }

    /// Execute and decode a JSON body, mapping non-success statuses to errors
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        self.execute(request).await?.into_json()
    }

    /// Execute and discard the body, mapping non-success statuses to errors
    pub async fn send_empty(&self, request: &ApiRequest) -> Result<(), ApiError> {
        self.execute(request).await?.error_for_status().map(|_| ())
    }
}

/// One refresh cycle. Returns whether a new token was stored.
///
/// The permit is released when this returns, after the hooks have run.
async fn run_refresh(
    client: Client,
    url: String,
    store: CredentialStore,
    hooks: Arc<dyn AuthHooks>,
    permit: RefreshPermit,
) -> Result<bool, ApiError> {
    let _permit = permit;
    match request_token(&client, &url).await {
        Ok(Some(token)) => {
            hooks.on_token_refresh(&store, token);
            info!("Access token refreshed");
            Ok(true)
        }
        Ok(None) => {
            warn!("Token refresh rejected, ending session");
            hooks.on_auth_failure();
            Ok(false)
        }
        Err(e) => {
            warn!(error = %e, "Token refresh failed, ending session");
            hooks.on_auth_failure();
            Err(e)
        }
    }
}

/// Call the refresh endpoint. `Ok(None)` means the server refused.
async fn request_token(client: &Client, url: &str) -> Result<Option<String>, ApiError> {
    debug!(url = %url, "Refreshing access token");

    // Cookies only: the refresh token lives in the jar, not in the store.
    let response = client.post(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        debug!(status = %status, "Refresh endpoint rejected the session");
        return Ok(None);
    }

    match response.json::<AccessToken>().await {
        Ok(token) if !token.access.is_empty() => Ok(Some(token.access)),
        Ok(_) => Ok(None),
        Err(e) => {
            warn!(error = %e, "Refresh response did not contain an access token");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use futures::future::join_all;
    use mockito::{Matcher, Server, ServerGuard};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const REFRESH: &str = "/auth/private/obtain";

    /// Clears the store on failure, like the real application does.
    struct TestHooks {
        store: CredentialStore,
        failures: AtomicUsize,
        refreshed: Mutex<Vec<String>>,
    }

    impl TestHooks {
        fn new(store: &CredentialStore) -> Arc<Self> {
            Arc::new(Self {
                store: store.clone(),
                failures: AtomicUsize::new(0),
                refreshed: Mutex::new(Vec::new()),
            })
        }

        fn failures(&self) -> usize {
            self.failures.load(Ordering::SeqCst)
        }
    }

    impl AuthHooks for TestHooks {
        fn on_auth_failure(&self) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            self.store.clear();
        }

        fn on_token_refresh(&self, store: &CredentialStore, token: String) {
            self.refreshed.lock().unwrap().push(token.clone());
            store.set_access_token(token);
        }
    }

    fn config_for(server: &ServerGuard) -> Config {
        Config {
            api_base_url: server.url(),
            ..Default::default()
        }
    }

    fn signed_in_pipeline(server: &ServerGuard) -> (AuthPipeline, Arc<TestHooks>) {
        let store = CredentialStore::new();
        store.set("old".to_string(), Role::Teacher);
        let pipeline = AuthPipeline::new(config_for(server), store.clone()).unwrap();
        let hooks = TestHooks::new(&store);
        pipeline.install_hooks(hooks.clone()).unwrap();
        (pipeline, hooks)
    }

    #[tokio::test]
    async fn test_missing_hooks_fail_fast() {
        let store = CredentialStore::new();
        let pipeline = AuthPipeline::new(Config::default(), store).unwrap();
        let result = pipeline.execute(&ApiRequest::get("/user/me")).await;
        assert!(matches!(result, Err(ApiError::HooksNotInstalled)));
    }

    #[tokio::test]
    async fn test_hooks_install_only_once() {
        let store = CredentialStore::new();
        let pipeline = AuthPipeline::new(Config::default(), store.clone()).unwrap();
        pipeline.install_hooks(TestHooks::new(&store)).unwrap();
        assert!(matches!(
            pipeline.install_hooks(TestHooks::new(&store)),
            Err(ApiError::HooksAlreadyInstalled)
        ));
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        let mut server = Server::new_async().await;
        let data = server
            .mock("GET", "/user/me")
            .match_header("authorization", "Bearer old")
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let (pipeline, _) = signed_in_pipeline(&server);
        let response = pipeline.execute(&ApiRequest::get("/user/me")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        data.assert_async().await;
    }

    #[tokio::test]
    async fn test_anonymous_request_has_no_bearer_and_no_refresh() {
        let mut server = Server::new_async().await;
        let login = server
            .mock("POST", "/auth/login")
            .match_header("authorization", Matcher::Missing)
            .with_status(401)
            .create_async()
            .await;
        let refresh = server.mock("POST", REFRESH).expect(0).create_async().await;

        let (pipeline, hooks) = signed_in_pipeline(&server);
        let response = pipeline
            .execute(&ApiRequest::post("/auth/login").anonymous())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(hooks.failures(), 0);
        login.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_auth_errors_pass_through() {
        let mut server = Server::new_async().await;
        let data = server
            .mock("GET", "/admin/user")
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;
        let refresh = server.mock("POST", REFRESH).expect(0).create_async().await;

        let (pipeline, hooks) = signed_in_pipeline(&server);
        let response = pipeline.execute(&ApiRequest::get("/admin/user")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text(), "boom");
        assert_eq!(hooks.failures(), 0);
        data.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_then_retry_with_new_token() {
        let mut server = Server::new_async().await;
        let stale = server
            .mock("GET", "/user/me")
            .match_header("authorization", "Bearer old")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/user/me")
            .match_header("authorization", "Bearer new")
            .with_status(200)
            .with_body(r#"{"id": 1}"#)
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", REFRESH)
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"access": "new"}"#)
            .expect(1)
            .create_async()
            .await;

        let (pipeline, hooks) = signed_in_pipeline(&server);
        let response = pipeline.execute(&ApiRequest::get("/user/me")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let credential = pipeline.store().get();
        assert!(credential.is_authenticated());
        assert_eq!(credential.token(), Some("new"));
        assert_eq!(credential.role(), Some(Role::Teacher));
        assert_eq!(*hooks.refreshed.lock().unwrap(), vec!["new".to_string()]);
        assert!(!pipeline.gate().is_refreshing());

        stale.assert_async().await;
        fresh.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        const CALLS: usize = 5;
        let mut server = Server::new_async().await;
        let stale = server
            .mock("GET", "/admin/user")
            .match_header("authorization", "Bearer old")
            .with_status(401)
            .expect(CALLS)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/admin/user")
            .match_header("authorization", "Bearer new")
            .with_status(200)
            .with_body("[]")
            .expect(CALLS)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", REFRESH)
            .with_status(200)
            .with_body(r#"{"accessToken": "new"}"#)
            .expect(1)
            .create_async()
            .await;

        let (pipeline, hooks) = signed_in_pipeline(&server);
        let request = ApiRequest::get("/admin/user");
        let results = join_all((0..CALLS).map(|_| pipeline.execute(&request))).await;

        for result in results {
            assert_eq!(result.unwrap().status(), StatusCode::OK);
        }
        assert_eq!(hooks.failures(), 0);
        assert_eq!(hooks.refreshed.lock().unwrap().len(), 1);

        stale.assert_async().await;
        fresh.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancelled_leader_does_not_abort_refresh() {
        let mut server = Server::new_async().await;
        let stale = server
            .mock("GET", "/user/me")
            .match_header("authorization", "Bearer old")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/user/me")
            .match_header("authorization", "Bearer new")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", REFRESH)
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(300));
                w.write_all(br#"{"access": "new"}"#)
            })
            .expect(1)
            .create_async()
            .await;

        let (pipeline, hooks) = signed_in_pipeline(&server);
        let request = ApiRequest::get("/user/me");

        let leader = tokio::time::timeout(Duration::from_millis(100), pipeline.execute(&request)).await;
        assert!(leader.is_err());
        assert!(pipeline.gate().is_refreshing());

        // Waits for the detached refresh instead of starting another one.
        let follower = pipeline.execute(&request).await.unwrap();
        assert_eq!(follower.status(), StatusCode::OK);
        assert_eq!(pipeline.store().token().as_deref(), Some("new"));
        assert_eq!(hooks.refreshed.lock().unwrap().len(), 1);
        assert!(!pipeline.gate().is_refreshing());

        stale.assert_async().await;
        fresh.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_for_superseded_token_retries_without_refresh() {
        let mut server = Server::new_async().await;
        let (pipeline, hooks) = signed_in_pipeline(&server);

        // The token changes while the request is at the server.
        let store = pipeline.store().clone();
        let stale = server
            .mock("GET", "/admin/user")
            .match_header("authorization", "Bearer old")
            .with_status(401)
            .with_body_from_request(move |_| {
                store.set_access_token("new".to_string());
                Vec::new()
            })
            .expect(1)
            .create_async()
            .await;
        let fresh = server
            .mock("GET", "/admin/user")
            .match_header("authorization", "Bearer new")
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;
        let refresh = server.mock("POST", REFRESH).expect(0).create_async().await;

        let response = pipeline.execute(&ApiRequest::get("/admin/user")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(hooks.failures(), 0);
        assert!(hooks.refreshed.lock().unwrap().is_empty());
        assert!(!pipeline.gate().is_refreshing());

        stale.assert_async().await;
        fresh.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_retry_is_not_retried_again() {
        let mut server = Server::new_async().await;
        let data = server
            .mock("GET", "/user/me")
            .with_status(401)
            .expect(2)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", REFRESH)
            .with_status(200)
            .with_body(r#"{"access": "new"}"#)
            .expect(1)
            .create_async()
            .await;

        let (pipeline, hooks) = signed_in_pipeline(&server);
        let response = pipeline.execute(&ApiRequest::get("/user/me")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(pipeline.store().token().as_deref(), Some("new"));
        assert_eq!(hooks.failures(), 0);
        data.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_refresh_invokes_failure_once() {
        const CALLS: usize = 3;
        let mut server = Server::new_async().await;
        let data = server
            .mock("GET", "/user/me")
            .with_status(401)
            .expect_at_least(CALLS)
            .create_async()
            .await;
        let refresh = server
            .mock("POST", REFRESH)
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let (pipeline, hooks) = signed_in_pipeline(&server);
        let request = ApiRequest::get("/user/me");
        let results = join_all((0..CALLS).map(|_| pipeline.execute(&request))).await;

        for result in results {
            assert_eq!(result.unwrap().status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(hooks.failures(), 1);
        assert!(!pipeline.store().is_authenticated());
        assert_eq!(pipeline.store().role(), None);
        data.assert_async().await;
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_a_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/user/me")
            .with_status(401)
            .create_async()
            .await;
        server
            .mock("POST", REFRESH)
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let (pipeline, hooks) = signed_in_pipeline(&server);
        let response = pipeline.execute(&ApiRequest::get("/user/me")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(hooks.failures(), 1);
    }

    #[tokio::test]
    async fn test_gate_released_when_refresh_transport_fails() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/user/me")
            .with_status(401)
            .create_async()
            .await;

        let store = CredentialStore::new();
        store.set("old".to_string(), Role::Admin);
        let mut config = config_for(&server);
        // Nothing listens on port 1, so the refresh call fails at connect.
        config.endpoints.refresh = "http://127.0.0.1:1/auth/private/obtain".to_string();
        let pipeline = AuthPipeline::new(config, store.clone()).unwrap();
        let hooks = TestHooks::new(&store);
        pipeline.install_hooks(hooks.clone()).unwrap();

        let result = pipeline.execute(&ApiRequest::get("/user/me")).await;

        assert!(matches!(result, Err(ApiError::NetworkError(_))));
        assert_eq!(hooks.failures(), 1);
        assert!(!pipeline.gate().is_refreshing());
        assert!(pipeline.gate().try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_send_json_maps_errors() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/admin/user/9")
            .with_status(404)
            .with_body("not found")
            .create_async()
            .await;

        let (pipeline, _) = signed_in_pipeline(&server);
        let result: Result<serde_json::Value, _> =
            pipeline.send_json(&ApiRequest::get("/admin/user/9")).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
