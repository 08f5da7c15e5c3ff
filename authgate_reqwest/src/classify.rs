use std::fmt;

/// The kind of transport failure that prevented a response from arriving
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// The request timed out
    Timeout,
    /// A connection could not be established
    Connect,
    /// The request could not be built or sent
    Request,
    /// The response body could not be read
    Body,
    /// Too many redirects, or a redirect loop
    Redirect,
    /// Any other failure, including errors raised by middleware
    Other,
}

impl TransportKind {
    /// Determines the kind of a `reqwest` error
    pub fn of(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Connect
        } else if error.is_redirect() {
            Self::Redirect
        } else if error.is_body() || error.is_decode() {
            Self::Body
        } else if error.is_request() || error.is_builder() {
            Self::Request
        } else {
            Self::Other
        }
    }

    /// Determines the kind of an error raised through a middleware stack
    pub fn of_middleware(error: &reqwest_middleware::Error) -> Self {
        match error {
            reqwest_middleware::Error::Reqwest(error) => Self::of(error),
            _ => Self::Other,
        }
    }

    /// A stable name for this kind
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Body => "body",
            Self::Redirect => "redirect",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The code a failure is classified under
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// An application envelope code or HTTP status
    Status(i64),
    /// A transport failure that produced no response
    Transport(TransportKind),
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        Self::Status(code)
    }
}

impl From<TransportKind> for ErrorCode {
    fn from(kind: TransportKind) -> Self {
        Self::Transport(kind)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => fmt::Display::fmt(code, f),
            Self::Transport(kind) => fmt::Display::fmt(kind, f),
        }
    }
}

fn known_message(code: ErrorCode) -> Option<&'static str> {
    let message = match code {
        ErrorCode::Status(400) => "请求参数错误",
        ErrorCode::Status(401) => "登录已过期",
        ErrorCode::Status(403) => "没有权限",
        ErrorCode::Status(404) => "资源或接口不存在",
        ErrorCode::Status(500) => "服务器异常",
        ErrorCode::Transport(TransportKind::Timeout) => "请求超时",
        ErrorCode::Transport(TransportKind::Connect) => "网络连接失败",
        _ => return None,
    };
    Some(message)
}

/// Maps a failure code to the message shown to the user
///
/// Known codes use a fixed message regardless of `raw_message`. Unknown
/// codes fall back to `raw_message`, or to a generic message naming the
/// code when there is none.
///
/// ```
/// use authgate_reqwest::{resolve_error_message, ErrorCode};
///
/// assert_eq!(resolve_error_message(ErrorCode::Status(403), Some("nope")), "没有权限");
/// assert_eq!(resolve_error_message(ErrorCode::Status(418), Some("teapot")), "teapot");
/// assert_eq!(resolve_error_message(ErrorCode::Status(418), None), "【418】: 未知异常!");
/// ```
pub fn resolve_error_message(code: ErrorCode, raw_message: Option<&str>) -> String {
    if let Some(message) = known_message(code) {
        return message.to_owned();
    }

    match raw_message.filter(|m| !m.is_empty()) {
        Some(message) => message.to_owned(),
        None => format!("【{code}】: 未知异常!"),
    }
}
