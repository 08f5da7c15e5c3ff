//! A refresh source that calls the application's refresh endpoint

use async_trait::async_trait;
use thiserror::Error;

use super::RefreshTokenSource;
use crate::{RefreshTokenRef, TokenPair};

pub mod dto;

/// A refresh source that posts the refresh token to an HTTP endpoint
///
/// The refresh token is sent as the `refresh_token` query parameter. The
/// endpoint is expected to answer with the application envelope
/// `{"code": 200, "data": {"access_token": "…", "refresh_token": "…"}}`.
/// Any other code, an HTTP error status, or a transport failure is reported
/// as an error.
///
/// The client given here should be a plain [`reqwest::Client`], not one
/// wrapped with the renewal middleware.
#[derive(Clone, Debug)]
pub struct EndpointRefreshSource {
    client: reqwest::Client,
    refresh_url: reqwest::Url,
}

impl EndpointRefreshSource {
    /// Constructs a new endpoint refresh source
    pub fn new(client: reqwest::Client, refresh_url: reqwest::Url) -> Self {
        Self {
            client,
            refresh_url,
        }
    }

    /// The URL of the refresh endpoint
    pub fn refresh_url(&self) -> &reqwest::Url {
        &self.refresh_url
    }
}

#[async_trait]
impl RefreshTokenSource for EndpointRefreshSource {
    type Error = TokenRequestError;

    async fn request_token(
        &self,
        refresh_token: &RefreshTokenRef,
    ) -> Result<TokenPair, Self::Error> {
        request_token(&self.client, self.refresh_url.clone(), refresh_token).await
    }
}

/// An error while attempting to renew credentials at the refresh endpoint
#[derive(Debug, Error)]
pub enum TokenRequestError {
    /// The endpoint answered with an HTTP error status
    #[error("error requesting token from refresh endpoint: {body}")]
    ErrorWithBody {
        /// The underlying request error
        source: reqwest::Error,
        /// The body of the error
        body: String,
    },
    /// The endpoint answered, but rejected the refresh token
    #[error("refresh endpoint rejected the refresh token with code {code}: {message}")]
    Rejected {
        /// The application code returned
        code: i64,
        /// The message returned, if any
        message: String,
    },
    /// Unable to deserialize the token body
    #[error("error deserializing token body from refresh endpoint")]
    TokenBodyError(#[from] serde_json::Error),
    /// Unable to read the response
    #[error("error reading response body")]
    BodyReadError(#[source] reqwest::Error),
    /// Unable to send a token request to the endpoint
    #[error("error sending request to refresh endpoint")]
    RequestSend(#[source] reqwest::Error),
}

#[tracing::instrument(
    err,
    skip(client, refresh_url, refresh_token),
    fields(refresh_url = %refresh_url),
)]
async fn request_token(
    client: &reqwest::Client,
    refresh_url: reqwest::Url,
    refresh_token: &RefreshTokenRef,
) -> Result<TokenPair, TokenRequestError> {
    tracing::trace!("requesting renewed credentials from refresh endpoint");

    let resp = client
        .post(refresh_url)
        .query(&[("refresh_token", refresh_token.as_str())])
        .send()
        .await
        .map_err(TokenRequestError::RequestSend)?;

    tracing::debug!(
        response.status = resp.status().as_u16(),
        "received response from refresh endpoint"
    );

    if let Err(error) = resp.error_for_status_ref() {
        let body = resp
            .text()
            .await
            .map_err(TokenRequestError::BodyReadError)?;
        return Err(TokenRequestError::ErrorWithBody {
            source: error,
            body,
        });
    }

    let body = resp
        .bytes()
        .await
        .map_err(TokenRequestError::BodyReadError)?;
    let resp: dto::RefreshResponse = serde_json::from_slice(&body)?;

    if resp.code != dto::OK_CODE {
        return Err(TokenRequestError::Rejected {
            code: resp.code,
            message: resp.msg.unwrap_or_default(),
        });
    }

    let pair: TokenPair = serde_json::from_value(resp.data.unwrap_or_default())?;

    tracing::info!("received renewed credentials");

    Ok(pair)
}
