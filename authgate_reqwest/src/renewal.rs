use authgate_tokens::RefreshCoordinator;
use bytes::Bytes;
use http::Extensions;
use reqwest::{header::HeaderValue, Request, Response, ResponseBuilderExt};
use reqwest_middleware::{Middleware, Next, Result};

use crate::{envelope::ParsedBody, ApiError, CredentialHeader};

/// A middleware that renews expired credentials and replays the request
///
/// When a response reports an authorization failure, the failure is handed to
/// the [`RefreshCoordinator`]. Once renewed credentials arrive, the request is
/// sent again with the new access token. If renewal fails, the request fails
/// with [`ApiError::SessionExpired`] wrapped in
/// [`reqwest_middleware::Error::Middleware`].
///
/// Requests to the refresh endpoint itself pass straight through, so a
/// rejected refresh never starts another one. A request is renewed at most
/// `max_renewals` times; a replay that is rejected again is returned as is.
///
/// A request that was sent before another request finished renewing is
/// replayed once with the stored credential without starting a new renewal.
///
/// This middleware must come before
/// [`AccessTokenMiddleware`](crate::AccessTokenMiddleware) in the stack.
#[derive(Clone, Debug)]
pub struct RenewalMiddleware {
    coordinator: RefreshCoordinator,
    header: CredentialHeader,
    refresh_path: String,
    max_renewals: usize,
}

impl RenewalMiddleware {
    /// Constructs a renewal middleware
    ///
    /// Requests whose URL path ends with `refresh_path` are never renewed.
    pub fn new(coordinator: RefreshCoordinator, refresh_path: impl Into<String>) -> Self {
        Self {
            coordinator,
            header: CredentialHeader::default(),
            refresh_path: refresh_path.into(),
            max_renewals: 1,
        }
    }

    /// Replaces the header the renewed access token is written to
    pub fn with_header(mut self, header: CredentialHeader) -> Self {
        self.header = header;
        self
    }

    /// Sets how many times a single request may be renewed and replayed
    pub fn with_max_renewals(mut self, max_renewals: usize) -> Self {
        self.max_renewals = max_renewals;
        self
    }

    fn is_refresh_call(&self, req: &Request) -> bool {
        req.url().path().ends_with(&self.refresh_path)
    }

    /// The credential the request will carry once it reaches the transport
    fn credential_sent(&self, req: &Request) -> Option<HeaderValue> {
        req.headers()
            .get(self.header.name())
            .cloned()
            .or_else(|| self.stored_credential())
    }

    fn stored_credential(&self) -> Option<HeaderValue> {
        let token = self.coordinator.store().access_token()?;
        self.header.value_for(&token)
    }

    /// The stored credential, if another request renewed it after this one was sent
    fn renewed_since(&self, sent: Option<&HeaderValue>) -> Option<HeaderValue> {
        if self.coordinator.is_refreshing() {
            return None;
        }
        let current = self.stored_credential()?;
        (Some(&current) != sent).then_some(current)
    }
}

#[async_trait::async_trait]
impl Middleware for RenewalMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if self.is_refresh_call(&req) {
            return next.run(req, extensions).await;
        }

        let mut pending = req.try_clone();
        let mut sent = self.credential_sent(&req);
        let mut response = next.clone().run(req, extensions).await?;
        let mut renewals = 0;
        let mut caught_up = false;

        loop {
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let (buffered, body) = buffer(response).await?;
            if !body.is_authorization_failure(status) {
                return Ok(buffered);
            }

            if renewals >= self.max_renewals {
                tracing::debug!(
                    %status,
                    renewals,
                    "request still unauthorized after renewal"
                );
                return Ok(buffered);
            }

            let Some(mut retry) = pending.take() else {
                tracing::warn!(
                    url = %buffered.url(),
                    "request body cannot be replayed, not renewing credentials"
                );
                return Ok(buffered);
            };

            let value = match self.renewed_since(sent.as_ref()).filter(|_| !caught_up) {
                Some(value) => {
                    tracing::debug!(
                        url = %retry.url(),
                        "credentials were renewed after this request was sent"
                    );
                    caught_up = true;
                    value
                }
                None => {
                    renewals += 1;
                    tracing::debug!(url = %retry.url(), "credentials expired, awaiting renewal");
                    let token = match self.coordinator.renew().await {
                        Ok(token) => token,
                        Err(error) => {
                            return Err(reqwest_middleware::Error::middleware(
                                ApiError::session_expired(error, body.json),
                            ));
                        }
                    };

                    let Some(value) = self.header.value_for(&token) else {
                        tracing::warn!("renewed access token is not a valid header value");
                        return Ok(buffered);
                    };
                    value
                }
            };
            retry.headers_mut().insert(self.header.name().clone(), value.clone());
            sent = Some(value);
            pending = retry.try_clone();

            tracing::debug!(
                url = %retry.url(),
                renewals,
                "replaying request with renewed credentials"
            );
            response = next.clone().run(retry, extensions).await?;
        }
    }
}

/// Reads a response body so it can be inspected, returning an equivalent response
async fn buffer(response: Response) -> Result<(Response, ParsedBody)> {
    let status = response.status();
    let version = response.version();
    let url = response.url().clone();
    let headers = response.headers().clone();

    let bytes: Bytes = response.bytes().await?;
    let body = ParsedBody::parse(&bytes);

    let mut builder = http::Response::builder()
        .status(status)
        .version(version)
        .url(url);
    if let Some(h) = builder.headers_mut() {
        *h = headers;
    }
    let rebuilt = builder
        .body(bytes)
        .map_err(reqwest_middleware::Error::middleware)?;

    Ok((Response::from(rebuilt), body))
}
