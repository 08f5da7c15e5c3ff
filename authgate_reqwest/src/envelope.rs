use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// The envelope code that indicates success
pub const OK_CODE: i64 = 200;

/// The envelope code that indicates an expired or missing credential
pub const UNAUTHORIZED_CODE: i64 = 401;

/// The `{code, data, msg}` envelope wrapping every API response body
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    /// The application status code
    pub code: i64,
    /// The payload
    #[serde(default)]
    pub data: Option<T>,
    /// A message from the server
    #[serde(default)]
    pub msg: Option<String>,
}

impl<T> Envelope<T> {
    /// Whether the envelope reports success
    pub fn is_ok(&self) -> bool {
        self.code == OK_CODE
    }
}

impl Envelope {
    /// Reads the envelope out of a decoded body, if the body is one
    pub fn from_body(body: &serde_json::Value) -> Option<Self> {
        Self::deserialize(body).ok()
    }
}

/// A buffered response body, decoded as far as it will go
#[derive(Debug)]
pub(crate) struct ParsedBody {
    pub(crate) json: Option<serde_json::Value>,
    pub(crate) envelope: Option<Envelope>,
}

impl ParsedBody {
    pub(crate) fn parse(bytes: &[u8]) -> Self {
        let json = serde_json::from_slice::<serde_json::Value>(bytes).ok();
        let envelope = json.as_ref().and_then(Envelope::from_body);
        Self { json, envelope }
    }

    /// Whether a failed response reports an authorization failure
    ///
    /// The envelope code wins when the body is an envelope; otherwise the
    /// HTTP status decides.
    pub(crate) fn is_authorization_failure(&self, status: StatusCode) -> bool {
        match &self.envelope {
            Some(envelope) => envelope.code == UNAUTHORIZED_CODE,
            None => status == StatusCode::UNAUTHORIZED,
        }
    }

    /// The failure code, preferring the envelope's over the HTTP status
    pub(crate) fn code_or(&self, status: StatusCode) -> i64 {
        self.envelope
            .as_ref()
            .map_or_else(|| i64::from(status.as_u16()), |e| e.code)
    }

    /// The server message, falling back to the status reason phrase
    pub(crate) fn message_or(&self, status: StatusCode) -> Option<String> {
        self.envelope
            .as_ref()
            .and_then(|e| e.msg.clone())
            .or_else(|| status.canonical_reason().map(str::to_owned))
    }
}
