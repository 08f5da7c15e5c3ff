use authgate_tokens::RefreshError;
use thiserror::Error;

use crate::{
    classify::{resolve_error_message, ErrorCode, TransportKind},
    envelope::UNAUTHORIZED_CODE,
};

/// The message reported when renewal fails and the user must sign in again
pub const SESSION_EXPIRED_MESSAGE: &str = "登录已过期，请重新登录";

/// An error returned to callers of [`ApiClient`](crate::ApiClient)
///
/// Every variant carries the message meant for the user. The underlying
/// failure, where there is one, is available through
/// [`source()`](std::error::Error::source).
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered successfully, but the envelope reported a failure
    #[error("{message}")]
    Application {
        /// The envelope code
        code: i64,
        /// The user-facing message
        message: String,
        /// The response body
        body: serde_json::Value,
    },
    /// The server answered with a non-success status
    #[error("{message}")]
    Status {
        /// The envelope code, or the HTTP status when the body is not an envelope
        code: i64,
        /// The user-facing message
        message: String,
        /// The response body, if it was JSON
        body: Option<serde_json::Value>,
    },
    /// No response was received
    #[error("{message}")]
    Transport {
        /// What went wrong
        kind: TransportKind,
        /// The user-facing message
        message: String,
        /// The transport error
        #[source]
        source: reqwest_middleware::Error,
    },
    /// Credentials could not be renewed and the session has ended
    #[error("{message}")]
    SessionExpired {
        /// The user-facing message
        message: String,
        /// The body of the response that reported the expired credential
        body: Option<serde_json::Value>,
        /// Why renewal failed
        #[source]
        source: RefreshError,
    },
    /// The response payload did not have the expected shape
    #[error("{message}")]
    Decode {
        /// The user-facing message
        message: String,
        /// The decoding error
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub(crate) fn session_expired(source: RefreshError, body: Option<serde_json::Value>) -> Self {
        Self::SessionExpired {
            message: SESSION_EXPIRED_MESSAGE.to_owned(),
            body,
            source,
        }
    }

    pub(crate) fn transport(source: reqwest_middleware::Error) -> Self {
        let kind = TransportKind::of_middleware(&source);
        let raw = source.to_string();
        Self::Transport {
            kind,
            message: resolve_error_message(kind.into(), Some(&raw)),
            source,
        }
    }

    pub(crate) fn decode(source: serde_json::Error) -> Self {
        let raw = source.to_string();
        Self::Decode {
            message: resolve_error_message(TransportKind::Body.into(), Some(&raw)),
            source,
        }
    }

    /// The code this error is classified under
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Application { code, .. } | Self::Status { code, .. } => ErrorCode::Status(*code),
            Self::SessionExpired { .. } => ErrorCode::Status(UNAUTHORIZED_CODE),
            Self::Transport { kind, .. } => ErrorCode::Transport(*kind),
            Self::Decode { .. } => ErrorCode::Transport(TransportKind::Body),
        }
    }

    /// The message meant for the user
    pub fn message(&self) -> &str {
        match self {
            Self::Application { message, .. }
            | Self::Status { message, .. }
            | Self::Transport { message, .. }
            | Self::SessionExpired { message, .. }
            | Self::Decode { message, .. } => message,
        }
    }

    /// The response body that accompanied the failure, if any
    pub fn detail(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Application { body, .. } => Some(body),
            Self::Status { body, .. } | Self::SessionExpired { body, .. } => body.as_ref(),
            Self::Transport { .. } | Self::Decode { .. } => None,
        }
    }

    /// Whether the user must sign in again
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }
}
