use std::{fmt, sync::Arc};

use authgate_tokens::{
    sources::EndpointRefreshSource,
    store::{CredentialStore, FileCredentialStore, InMemoryCredentialStore},
    RefreshCoordinator, SessionTerminator, TokenPair,
};
use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, RequestBuilder};
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Serialize};

use crate::{
    classify::{resolve_error_message, ErrorCode},
    envelope::ParsedBody,
    AccessTokenMiddleware, ApiError, AuthConfig, ConfigError, NoCredential, Notifier,
    NotifyOptions, RenewalMiddleware,
};

/// The credentials issued by a successful login
#[derive(Clone, Debug, Deserialize)]
pub struct LoginOutput {
    /// The issued tokens
    #[serde(flatten)]
    pub tokens: TokenPair,
    /// The name of the signed-in user
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// An API client that manages its own credentials
///
/// Requests built from this client carry the stored access token and are
/// renewed and replayed transparently when it expires. Responses are
/// unwrapped from their `{code, data, msg}` envelope by
/// [`send()`][Self::send()], and failures are reported to the configured
/// [`Notifier`] with a user-facing message.
///
/// ```no_run
/// use authgate_reqwest::{ApiClient, AuthConfig, TracingNotifier};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AuthConfig::new("http://localhost:9999/api/v1".parse()?);
/// let client = ApiClient::builder(config)
///     .notifier(TracingNotifier)
///     .on_session_end(|| tracing::warn!("signed out"))
///     .build()?;
///
/// client.login("admin", "123456").await?;
/// let profile: serde_json::Value = client.send(client.get("/base/userinfo")).await?;
/// # let _ = profile;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    http: ClientWithMiddleware,
    config: Arc<AuthConfig>,
    coordinator: RefreshCoordinator,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ApiClient {
    /// Starts building a client from `config`
    pub fn builder(config: AuthConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    /// The credential store backing this client
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        self.coordinator.store()
    }

    /// The coordinator renewing this client's credentials
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// The client's settings
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The underlying middleware client
    pub fn http(&self) -> &ClientWithMiddleware {
        &self.http
    }

    /// Starts a request to `path`, relative to the base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        self.http.request(method, format!("{base}/{path}"))
    }

    /// Starts a `GET` request to `path`
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    /// Starts a `POST` request to `path`
    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    /// Sends a request and unwraps the payload of its envelope
    ///
    /// A response whose envelope code is not `200` fails with
    /// [`ApiError::Application`]; a non-success status fails with
    /// [`ApiError::Status`]. Both are reported to the notifier, as are
    /// transport failures. An expired session is not reported; the session
    /// terminator handles that.
    pub async fn send<T>(&self, request: RequestBuilder) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
    {
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => return Err(self.reject_transport(error)),
        };

        let status = response.status();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(error) => return Err(self.reject_transport(error.into())),
        };
        let body = ParsedBody::parse(&bytes);

        if !status.is_success() {
            return Err(self.reject_status(status, body));
        }

        if !body.envelope.as_ref().is_some_and(|e| e.is_ok()) {
            return Err(self.reject_application(status, body));
        }

        let data = body.envelope.and_then(|e| e.data).unwrap_or_default();
        serde_json::from_value(data).map_err(ApiError::decode)
    }

    /// Signs in and stores the issued tokens
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutput, ApiError> {
        let request = self
            .post(&self.config.login_path)
            .with_extension(NoCredential)
            .json(&LoginRequest { username, password });

        let output: LoginOutput = self.send(request).await?;
        self.store().store_pair(&output.tokens);
        tracing::info!("signed in");
        Ok(output)
    }

    /// Signs out, revoking the refresh token on the server
    ///
    /// The stored tokens are removed even if the server call fails.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let result = match self.store().refresh_token() {
            Some(refresh_token) => {
                let request = self
                    .post(&self.config.logout_path)
                    .query(&[("refresh_token", refresh_token.as_str())]);
                self.send::<IgnoredAny>(request).await.map(drop)
            }
            None => Ok(()),
        };

        self.store().clear();
        tracing::info!("signed out");
        result
    }

    fn notify(&self, message: &str, options: NotifyOptions) {
        if let Some(notifier) = &self.notifier {
            notifier.error(message, options);
        }
    }

    fn reject_transport(&self, error: reqwest_middleware::Error) -> ApiError {
        let error = match error {
            reqwest_middleware::Error::Middleware(inner) => match inner.downcast::<ApiError>() {
                Ok(api_error) => {
                    tracing::debug!(error = %api_error, "request failed in middleware");
                    return api_error;
                }
                Err(inner) => reqwest_middleware::Error::Middleware(inner),
            },
            error => error,
        };

        let error = ApiError::transport(error);
        tracing::debug!(code = %error.code(), error = %error, "request failed");
        self.notify(error.message(), NotifyOptions::default());
        error
    }

    fn reject_status(&self, status: StatusCode, body: ParsedBody) -> ApiError {
        let code = body.code_or(status);
        let raw = body.message_or(status);
        let error = ApiError::Status {
            code,
            message: resolve_error_message(ErrorCode::Status(code), raw.as_deref()),
            body: body.json,
        };
        tracing::debug!(%status, code, error = %error, "request rejected");
        self.notify(error.message(), NotifyOptions::keep_alive_on_hover());
        error
    }

    fn reject_application(&self, status: StatusCode, body: ParsedBody) -> ApiError {
        let code = body.code_or(status);
        let raw = body.message_or(status);
        let error = ApiError::Application {
            code,
            message: resolve_error_message(ErrorCode::Status(code), raw.as_deref()),
            body: body.json.unwrap_or_default(),
        };
        tracing::debug!(code, error = %error, "application reported failure");
        self.notify(error.message(), NotifyOptions::keep_alive_on_hover());
        error
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .field("notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds an [`ApiClient`]
pub struct ApiClientBuilder {
    config: AuthConfig,
    client: Option<reqwest::Client>,
    store: Option<Arc<dyn CredentialStore>>,
    coordinator: Option<RefreshCoordinator>,
    terminator: Option<Box<dyn SessionTerminator>>,
    notifier: Option<Arc<dyn Notifier>>,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl ApiClientBuilder {
    fn new(config: AuthConfig) -> Self {
        Self {
            config,
            client: None,
            store: None,
            coordinator: None,
            terminator: None,
            notifier: None,
            middleware: Vec::new(),
        }
    }

    /// Uses `client` for API calls and for the refresh call
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Keeps credentials in `store`
    ///
    /// Without one, credentials are kept in the configured credentials file,
    /// or in memory.
    pub fn store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Renews credentials through an existing coordinator
    ///
    /// The coordinator's store is used in place of any configured store, and
    /// any session terminator set on this builder is ignored.
    pub fn coordinator(mut self, coordinator: RefreshCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Calls `terminator` when credentials cannot be renewed
    pub fn on_session_end<T>(mut self, terminator: T) -> Self
    where
        T: SessionTerminator + 'static,
    {
        self.terminator = Some(Box::new(terminator));
        self
    }

    /// Reports failures to `notifier`
    pub fn notifier<N>(mut self, notifier: N) -> Self
    where
        N: Notifier + 'static,
    {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Adds a middleware after the credential middleware
    ///
    /// Middleware run in the order they are added, so they see requests
    /// with the credential attached and are run again for replays.
    pub fn middleware<M>(self, middleware: M) -> Self
    where
        M: Middleware,
    {
        self.middleware_arc(Arc::new(middleware))
    }

    /// Adds a shared middleware after the credential middleware
    pub fn middleware_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Builds the client
    pub fn build(self) -> Result<ApiClient, ConfigError> {
        let header = self.config.credential_header()?;
        let client = self.client.unwrap_or_default();

        let coordinator = match self.coordinator {
            Some(coordinator) => coordinator,
            None => {
                let store = match self.store {
                    Some(store) => store,
                    None => default_store(&self.config)?,
                };
                let source = EndpointRefreshSource::new(
                    client.clone(),
                    self.config.endpoint_url(&self.config.refresh_path)?,
                );
                match self.terminator {
                    Some(terminator) => RefreshCoordinator::with_session_terminator(
                        source,
                        store,
                        move || terminator.terminate_session(),
                    ),
                    None => RefreshCoordinator::new(source, store),
                }
            }
        };

        let mut builder = ClientBuilder::new(client)
            .with(
                RenewalMiddleware::new(coordinator.clone(), self.config.refresh_path.clone())
                    .with_header(header.clone())
                    .with_max_renewals(self.config.max_renewals),
            )
            .with(AccessTokenMiddleware::new(coordinator.store().clone()).with_header(header));
        for middleware in self.middleware {
            builder = builder.with_arc(middleware);
        }

        Ok(ApiClient {
            http: builder.build(),
            config: Arc::new(self.config),
            coordinator,
            notifier: self.notifier,
        })
    }
}

fn default_store(config: &AuthConfig) -> Result<Arc<dyn CredentialStore>, ConfigError> {
    Ok(match &config.credentials_file {
        Some(path) => Arc::new(FileCredentialStore::open(path)?),
        None => Arc::new(InMemoryCredentialStore::new()),
    })
}

impl fmt::Debug for ApiClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClientBuilder")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use authgate_tokens::store::CredentialSlot;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::{
        test_support::{FakeBackend, ScriptedRefresh},
        TransportKind, SESSION_EXPIRED_MESSAGE,
    };

    type Notifications = Arc<Mutex<Vec<(String, NotifyOptions)>>>;

    fn config() -> AuthConfig {
        AuthConfig::new("http://api.test/api/v1".parse().unwrap())
    }

    fn api_client(refresh: &ScriptedRefresh, backend: &Arc<FakeBackend>) -> (ApiClient, Notifications) {
        let notifications = Notifications::default();
        let sink = notifications.clone();
        let client = ApiClient::builder(config())
            .coordinator(refresh.coordinator.clone())
            .notifier(move |message: &str, options: NotifyOptions| {
                sink.lock().push((message.to_owned(), options));
            })
            .middleware_arc(backend.clone())
            .build()
            .unwrap();
        (client, notifications)
    }

    /// Sends `GET /r1`..`/rN` concurrently once all of them have failed
    async fn send_concurrently(
        client: &ApiClient,
        refresh: &ScriptedRefresh,
        count: usize,
    ) -> Vec<Result<serde_json::Value, ApiError>> {
        let tasks: Vec<_> = (1..=count)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move {
                    client
                        .send::<serde_json::Value>(client.get(&format!("/r{i}")))
                        .await
                })
            })
            .collect();

        refresh.wait_for_waiters(count).await;
        refresh.open();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        results
    }

    mod when_credentials_expire_during_concurrent_requests {
        use super::*;

        #[tokio::test]
        async fn one_refresh_serves_every_request() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            let backend = Arc::new(FakeBackend::new("A2"));
            let (client, notifications) = api_client(&refresh, &backend);

            let results = send_concurrently(&client, &refresh, 3).await;

            assert_eq!(refresh.calls(), 1);
            for (i, result) in results.into_iter().enumerate() {
                let data = result.unwrap();
                assert_eq!(data["path"], format!("/api/v1/r{}", i + 1));
            }
            assert_eq!(refresh.store.get(CredentialSlot::Access).as_deref(), Some("A2"));
            assert_eq!(refresh.store.get(CredentialSlot::Refresh).as_deref(), Some("B2"));
            assert!(notifications.lock().is_empty());
            assert_eq!(refresh.terminations(), 0);
        }

        #[tokio::test]
        async fn requests_are_replayed_in_the_order_they_failed() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            let backend = Arc::new(FakeBackend::new("A2"));
            let (client, _) = api_client(&refresh, &backend);

            send_concurrently(&client, &refresh, 3).await;

            let seen = backend.seen();
            let (failed, replayed) = seen.split_at(3);
            assert!(failed.iter().all(|(_, token)| token.as_deref() == Some("A1")));
            assert!(replayed.iter().all(|(_, token)| token.as_deref() == Some("A2")));
            let failed_order: Vec<_> = failed.iter().map(|(path, _)| path).collect();
            let replayed_order: Vec<_> = replayed.iter().map(|(path, _)| path).collect();
            assert_eq!(failed_order, replayed_order);
        }

        mod and_renewal_is_rejected {
            use super::*;

            #[tokio::test]
            async fn every_request_reports_an_expired_session() {
                let refresh = ScriptedRefresh::failing();
                let backend = Arc::new(FakeBackend::new("A2"));
                let (client, notifications) = api_client(&refresh, &backend);

                let results = send_concurrently(&client, &refresh, 3).await;

                assert_eq!(refresh.calls(), 1);
                for result in results {
                    let err = result.unwrap_err();
                    assert!(err.is_session_expired());
                    assert_eq!(err.code(), ErrorCode::Status(401));
                    assert_eq!(err.message(), SESSION_EXPIRED_MESSAGE);
                }
                assert_eq!(refresh.store.get(CredentialSlot::Access), None);
                assert_eq!(refresh.store.get(CredentialSlot::Refresh), None);
                assert_eq!(refresh.terminations(), 1);
                assert!(notifications.lock().is_empty());
                assert_eq!(backend.seen().len(), 3);
            }
        }

        mod and_no_refresh_token_is_stored {
            use super::*;

            #[tokio::test]
            async fn request_fails_without_touching_the_store() {
                let refresh = ScriptedRefresh::succeeding("A2", "B2");
                refresh.store.remove(CredentialSlot::Refresh);
                let backend = Arc::new(FakeBackend::new("A2"));
                let (client, _) = api_client(&refresh, &backend);

                let err = client
                    .send::<serde_json::Value>(client.get("/base/userinfo"))
                    .await
                    .unwrap_err();

                assert!(err.is_session_expired());
                assert_eq!(refresh.calls(), 0);
                assert_eq!(refresh.store.get(CredentialSlot::Access).as_deref(), Some("A1"));
                assert_eq!(refresh.terminations(), 1);
            }
        }
    }

    mod when_response_is_successful {
        use super::*;

        #[tokio::test]
        async fn payload_is_unwrapped() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            let backend = Arc::new(FakeBackend::new("A1"));
            let (client, _) = api_client(&refresh, &backend);

            #[derive(Deserialize)]
            struct Echo {
                path: String,
            }

            let echo: Echo = client.send(client.get("/base/userinfo")).await.unwrap();

            assert_eq!(echo.path, "/api/v1/base/userinfo");
            assert_eq!(refresh.calls(), 0);
        }

        #[tokio::test]
        async fn payload_of_the_wrong_shape_is_a_decode_error() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            let backend = Arc::new(FakeBackend::new("A1"));
            let (client, _) = api_client(&refresh, &backend);

            let err = client
                .send::<Vec<u32>>(client.get("/base/userinfo"))
                .await
                .unwrap_err();

            assert!(matches!(err, ApiError::Decode { .. }));
        }

        mod and_envelope_reports_failure {
            use super::*;

            #[tokio::test]
            async fn unknown_code_uses_the_server_message() {
                let refresh = ScriptedRefresh::succeeding("A2", "B2");
                let backend = Arc::new(FakeBackend::new("A1"));
                backend.respond(
                    "/api/v1/user/create",
                    StatusCode::OK,
                    json!({ "code": 4001, "msg": "用户已存在" }),
                );
                let (client, notifications) = api_client(&refresh, &backend);

                let err = client
                    .send::<IgnoredAny>(client.post("/user/create"))
                    .await
                    .unwrap_err();

                assert!(matches!(err, ApiError::Application { code: 4001, .. }));
                assert_eq!(err.message(), "用户已存在");
                assert_eq!(err.detail().unwrap()["code"], 4001);
                assert_eq!(
                    *notifications.lock(),
                    vec![("用户已存在".to_owned(), NotifyOptions::keep_alive_on_hover())]
                );
            }

            #[tokio::test]
            async fn known_code_uses_the_localized_message() {
                let refresh = ScriptedRefresh::succeeding("A2", "B2");
                let backend = Arc::new(FakeBackend::new("A1"));
                backend.respond(
                    "/api/v1/role/list",
                    StatusCode::OK,
                    json!({ "code": 403, "msg": "Permission denied" }),
                );
                let (client, notifications) = api_client(&refresh, &backend);

                let err = client
                    .send::<IgnoredAny>(client.get("/role/list"))
                    .await
                    .unwrap_err();

                assert_eq!(err.message(), "没有权限");
                assert_eq!(notifications.lock().len(), 1);
                assert_eq!(refresh.calls(), 0);
            }

            #[tokio::test]
            async fn body_without_envelope_uses_the_status() {
                let refresh = ScriptedRefresh::succeeding("A2", "B2");
                let backend = Arc::new(FakeBackend::new("A1"));
                backend.respond("/api/v1/raw", StatusCode::OK, json!(["not", "an", "envelope"]));
                let (client, _) = api_client(&refresh, &backend);

                let err = client
                    .send::<IgnoredAny>(client.get("/raw"))
                    .await
                    .unwrap_err();

                assert!(matches!(err, ApiError::Application { code: 200, .. }));
                assert_eq!(err.message(), "OK");
            }
        }
    }

    mod when_response_has_an_error_status {
        use super::*;

        #[tokio::test]
        async fn error_is_classified_and_notified() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            let backend = Arc::new(FakeBackend::new("A1"));
            backend.respond(
                "/api/v1/broken",
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "code": 500, "msg": "Traceback..." }),
            );
            let (client, notifications) = api_client(&refresh, &backend);

            let err = client
                .send::<IgnoredAny>(client.get("/broken"))
                .await
                .unwrap_err();

            assert!(matches!(err, ApiError::Status { code: 500, .. }));
            assert_eq!(err.message(), "服务器异常");
            assert_eq!(
                *notifications.lock(),
                vec![("服务器异常".to_owned(), NotifyOptions::keep_alive_on_hover())]
            );
            assert_eq!(refresh.calls(), 0);
        }
    }

    mod when_transport_fails {
        use super::*;

        #[tokio::test]
        async fn error_is_classified_and_notified_without_hover() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            let notifications = Notifications::default();
            let sink = notifications.clone();
            let addr = crate::test_support::closed_local_addr();
            let base_url = format!("http://{addr}/api/v1").parse().unwrap();
            let client = ApiClient::builder(AuthConfig::new(base_url))
                .coordinator(refresh.coordinator.clone())
                .notifier(move |message: &str, options: NotifyOptions| {
                    sink.lock().push((message.to_owned(), options));
                })
                .build()
                .unwrap();

            let err = client
                .send::<IgnoredAny>(client.get("/base/userinfo"))
                .await
                .unwrap_err();

            assert_eq!(err.code(), ErrorCode::Transport(TransportKind::Connect));
            assert_eq!(err.message(), "网络连接失败");
            assert_eq!(
                *notifications.lock(),
                vec![("网络连接失败".to_owned(), NotifyOptions::default())]
            );
        }
    }

    mod login {
        use super::*;

        #[tokio::test]
        async fn tokens_are_stored_and_no_credential_is_sent() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            refresh.store.clear();
            let backend = Arc::new(FakeBackend::new("A3"));
            backend.respond(
                "/api/v1/base/access_token",
                StatusCode::OK,
                json!({
                    "code": 200,
                    "msg": "OK",
                    "data": { "access_token": "A3", "refresh_token": "B3", "username": "admin" }
                }),
            );
            let (client, _) = api_client(&refresh, &backend);

            let output = client.login("admin", "123456").await.unwrap();

            assert_eq!(output.username.as_deref(), Some("admin"));
            assert_eq!(output.tokens.access_token().as_str(), "A3");
            assert_eq!(refresh.store.get(CredentialSlot::Access).as_deref(), Some("A3"));
            assert_eq!(refresh.store.get(CredentialSlot::Refresh).as_deref(), Some("B3"));
            assert_eq!(
                backend.seen(),
                vec![("/api/v1/base/access_token".to_owned(), None)]
            );
        }

        #[tokio::test]
        async fn rejected_login_leaves_the_store_alone() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            let backend = Arc::new(FakeBackend::new("A1"));
            backend.respond(
                "/api/v1/base/access_token",
                StatusCode::BAD_REQUEST,
                json!({ "code": 400, "msg": "无效的用户名" }),
            );
            let (client, _) = api_client(&refresh, &backend);

            let err = client.login("nobody", "x").await.unwrap_err();

            assert_eq!(err.message(), "请求参数错误");
            assert_eq!(refresh.store.get(CredentialSlot::Access).as_deref(), Some("A1"));
        }
    }

    mod logout {
        use super::*;

        #[tokio::test]
        async fn store_is_cleared_after_the_server_call() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            let backend = Arc::new(FakeBackend::new("A1"));
            let (client, _) = api_client(&refresh, &backend);

            client.logout().await.unwrap();

            assert_eq!(
                backend.seen(),
                vec![("/api/v1/base/logout".to_owned(), Some("A1".to_owned()))]
            );
            assert_eq!(refresh.store.get(CredentialSlot::Access), None);
            assert_eq!(refresh.store.get(CredentialSlot::Refresh), None);
        }

        #[tokio::test]
        async fn store_is_cleared_when_the_server_call_fails() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            let backend = Arc::new(FakeBackend::new("A1"));
            backend.respond(
                "/api/v1/base/logout",
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "code": 500, "msg": "boom" }),
            );
            let (client, _) = api_client(&refresh, &backend);

            assert!(client.logout().await.is_err());
            assert_eq!(refresh.store.get(CredentialSlot::Refresh), None);
        }

        #[tokio::test]
        async fn without_a_refresh_token_no_call_is_made() {
            let refresh = ScriptedRefresh::succeeding("A2", "B2");
            refresh.store.remove(CredentialSlot::Refresh);
            let backend = Arc::new(FakeBackend::new("A1"));
            let (client, _) = api_client(&refresh, &backend);

            client.logout().await.unwrap();

            assert!(backend.seen().is_empty());
            assert_eq!(refresh.store.get(CredentialSlot::Access), None);
        }
    }

    mod against_a_server {
        use std::time::Duration;

        use wiremock::{
            matchers::{body_json, header, method, path, query_param},
            Mock, MockServer, ResponseTemplate,
        };

        use super::*;

        async fn server() -> MockServer {
            let server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/api/v1/base/access_token"))
                .and(body_json(json!({ "username": "admin", "password": "123456" })))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "code": 200,
                    "msg": "OK",
                    "data": { "access_token": "A1", "refresh_token": "B1", "username": "admin" }
                })))
                .expect(1)
                .mount(&server)
                .await;

            Mock::given(method("POST"))
                .and(path("/api/v1/base/refresh_token"))
                .and(query_param("refresh_token", "B1"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(json!({
                            "code": 200,
                            "msg": "OK",
                            "data": { "access_token": "A2", "refresh_token": "B2" }
                        }))
                        .set_delay(Duration::from_millis(200)),
                )
                .expect(1)
                .mount(&server)
                .await;

            Mock::given(method("GET"))
                .and(path("/api/v1/base/userinfo"))
                .and(header("token", "A1"))
                .respond_with(
                    ResponseTemplate::new(401)
                        .set_body_json(json!({ "code": 401, "msg": "token已过期" })),
                )
                .mount(&server)
                .await;

            Mock::given(method("GET"))
                .and(path("/api/v1/base/userinfo"))
                .and(header("token", "A2"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "code": 200,
                    "msg": "OK",
                    "data": { "username": "admin" }
                })))
                .mount(&server)
                .await;

            server
        }

        #[tokio::test]
        async fn session_survives_access_token_expiry() {
            let server = server().await;
            let ended = Arc::new(Mutex::new(0));
            let counter = ended.clone();
            let config = AuthConfig::new(format!("{}/api/v1", server.uri()).parse().unwrap());
            let client = ApiClient::builder(config)
                .on_session_end(move || *counter.lock() += 1)
                .build()
                .unwrap();

            client.login("admin", "123456").await.unwrap();

            let tasks: Vec<_> = (0..3)
                .map(|_| {
                    let client = client.clone();
                    tokio::spawn(async move {
                        client
                            .send::<serde_json::Value>(client.get("/base/userinfo"))
                            .await
                    })
                })
                .collect();
            for task in tasks {
                let profile = task.await.unwrap().unwrap();
                assert_eq!(profile["username"], "admin");
            }

            assert_eq!(client.store().get(CredentialSlot::Access).as_deref(), Some("A2"));
            assert_eq!(client.store().get(CredentialSlot::Refresh).as_deref(), Some("B2"));
            assert_eq!(*ended.lock(), 0);
        }
    }
}
