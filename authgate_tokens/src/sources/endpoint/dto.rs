//! DTOs for interacting with the refresh endpoint

use serde::Deserialize;

/// The application code signalling success
pub const OK_CODE: i64 = 200;

#[derive(Debug, Deserialize)]
pub(super) struct RefreshResponse {
    pub code: i64,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub msg: Option<String>,
}
