use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use authgate_tokens::{
    sources::RefreshTokenSource, store::InMemoryCredentialStore, AccessToken, RefreshCoordinator,
    RefreshToken, RefreshTokenRef, TokenPair,
};
use http::Extensions;
use parking_lot::Mutex;
use reqwest::{Request, Response, StatusCode};
use reqwest_middleware::{Middleware, Next, Result};
use serde_json::json;
use tokio::sync::Semaphore;

/// An address on the loopback interface that nothing is listening on
pub(crate) fn closed_local_addr() -> std::net::SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// A terminal middleware standing in for the API server
///
/// Requests carrying `valid_token` in the `token` header succeed, everything
/// else is rejected with a 401 envelope unless a fixed response is registered
/// for its path.
pub(crate) struct FakeBackend {
    valid_token: String,
    plain_rejections: bool,
    routes: Mutex<HashMap<String, (StatusCode, serde_json::Value)>>,
    seen: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeBackend {
    pub(crate) fn new(valid_token: &str) -> Self {
        Self {
            valid_token: valid_token.to_owned(),
            plain_rejections: false,
            routes: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Rejects with a bare `401 Unauthorized` instead of an envelope
    pub(crate) fn with_plain_rejections(mut self) -> Self {
        self.plain_rejections = true;
        self
    }

    pub(crate) fn respond(&self, path: &str, status: StatusCode, body: serde_json::Value) {
        self.routes.lock().insert(path.to_owned(), (status, body));
    }

    /// Every request received, as `(path, token header)`
    pub(crate) fn seen(&self) -> Vec<(String, Option<String>)> {
        self.seen.lock().clone()
    }
}

#[async_trait::async_trait]
impl Middleware for FakeBackend {
    async fn handle(&self, req: Request, _: &mut Extensions, _: Next<'_>) -> Result<Response> {
        let path = req.url().path().to_owned();
        let token = req
            .headers()
            .get("token")
            .map(|v| v.to_str().unwrap().to_owned());
        self.seen.lock().push((path.clone(), token.clone()));

        let fixed = self.routes.lock().get(&path).cloned();
        let (status, body) = match fixed {
            Some((status, body)) => (status, body.to_string()),
            None if token.as_deref() == Some(self.valid_token.as_str()) => (
                StatusCode::OK,
                json!({ "code": 200, "data": { "path": path }, "msg": "OK" }).to_string(),
            ),
            None if self.plain_rejections => (StatusCode::UNAUTHORIZED, "Unauthorized".to_owned()),
            None => (
                StatusCode::UNAUTHORIZED,
                json!({ "code": 401, "msg": "token已过期" }).to_string(),
            ),
        };

        Ok(http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("refresh token rejected")]
pub(crate) struct Rejected;

struct ScriptedSource {
    calls: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
    issue: Option<(&'static str, &'static str)>,
}

#[async_trait::async_trait]
impl RefreshTokenSource for ScriptedSource {
    type Error = Rejected;

    async fn request_token(&self, _: &RefreshTokenRef) -> std::result::Result<TokenPair, Rejected> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await.unwrap();
        self.issue
            .map(|(a, r)| TokenPair::new(AccessToken::from_static(a), RefreshToken::from_static(r)))
            .ok_or(Rejected)
    }
}

/// A coordinator over a scripted refresh source and a store holding `A1`/`B1`
///
/// The source holds every refresh until [`open()`][Self::open()] is called.
pub(crate) struct ScriptedRefresh {
    pub(crate) coordinator: RefreshCoordinator,
    pub(crate) store: Arc<InMemoryCredentialStore>,
    calls: Arc<AtomicUsize>,
    terminations: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
}

impl ScriptedRefresh {
    pub(crate) fn succeeding(access: &'static str, refresh: &'static str) -> Self {
        Self::with_issue(Some((access, refresh)))
    }

    pub(crate) fn failing() -> Self {
        Self::with_issue(None)
    }

    fn with_issue(issue: Option<(&'static str, &'static str)>) -> Self {
        let store = Arc::new(InMemoryCredentialStore::with_pair(&TokenPair::new(
            AccessToken::from_static("A1"),
            RefreshToken::from_static("B1"),
        )));
        let calls = Arc::new(AtomicUsize::new(0));
        let terminations = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let source = ScriptedSource {
            calls: calls.clone(),
            gate: gate.clone(),
            issue,
        };
        let counter = terminations.clone();
        let coordinator =
            RefreshCoordinator::with_session_terminator(source, store.clone(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        Self {
            coordinator,
            store,
            calls,
            terminations,
            gate,
        }
    }

    /// Lets held and future refreshes complete
    pub(crate) fn open(&self) {
        self.gate.add_permits(1024);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_waiters(&self, count: usize) {
        while self.coordinator.waiter_count() < count {
            tokio::task::yield_now().await;
        }
    }
}
