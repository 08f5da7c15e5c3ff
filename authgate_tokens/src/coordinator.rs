use crate::{
    sources::RefreshTokenSource,
    store::CredentialStore,
    AccessToken, RefreshTokenRef, TokenPair,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{error, fmt, mem, sync::Arc};
use thiserror::Error;
use tokio::sync::oneshot;

/// The reason a renewal cycle failed
///
/// Every request waiting on the same cycle receives a clone of the same error.
#[derive(Clone, Debug, Error)]
pub enum RefreshError {
    /// No refresh token was stored, so renewal was not attempted
    #[error("no refresh token is available")]
    NoRefreshToken,
    /// The refresh source failed to issue new credentials
    #[error("unable to renew credentials")]
    Failed(#[source] Arc<dyn error::Error + Send + Sync + 'static>),
    /// The renewal task stopped before reporting an outcome
    #[error("credential renewal ended without an outcome")]
    Abandoned,
}

/// A hook invoked when a failed renewal ends the user's session
pub trait SessionTerminator: Send + Sync {
    /// Ends the session
    fn terminate_session(&self);
}

impl<F> SessionTerminator for F
where
    F: Fn() + Send + Sync,
{
    #[inline]
    fn terminate_session(&self) {
        self()
    }
}

/// A session terminator that does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSessionTerminator;

impl SessionTerminator for NoopSessionTerminator {
    #[inline]
    fn terminate_session(&self) {}
}

type Outcome = Result<AccessToken, RefreshError>;

#[derive(Default)]
struct State {
    refreshing: bool,
    generation: u64,
    waiters: Vec<oneshot::Sender<Outcome>>,
}

struct Inner {
    state: Mutex<State>,
    store: Arc<dyn CredentialStore>,
    source: Box<dyn DynRefreshSource>,
    terminator: Box<dyn SessionTerminator>,
}

/// Coordinates renewal of an expired access token
///
/// Any number of requests may report an authorization failure through
/// [`renew()`][Self::renew()]. The first report while idle starts a renewal;
/// reports that arrive while that renewal is in flight wait on its outcome
/// instead of starting another. When the renewal settles, every waiter is
/// resolved in the order it arrived, either with the same new access token or
/// with the same error.
///
/// On success, both tokens in the credential store are replaced. On failure,
/// both are removed and the session terminator runs once. If no refresh token
/// is stored, the cycle fails with [`RefreshError::NoRefreshToken`] without
/// contacting the refresh source or touching the store.
///
/// The renewal itself runs on its own task, so a caller that stops waiting
/// does not strand the others.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    /// Constructs a coordinator that renews from `source` into `store`
    pub fn new<S>(source: S, store: Arc<dyn CredentialStore>) -> Self
    where
        S: RefreshTokenSource + 'static,
    {
        Self::with_session_terminator(source, store, NoopSessionTerminator)
    }

    /// Constructs a coordinator that calls `terminator` when renewal fails
    pub fn with_session_terminator<S, T>(
        source: S,
        store: Arc<dyn CredentialStore>,
        terminator: T,
    ) -> Self
    where
        S: RefreshTokenSource + 'static,
        T: SessionTerminator + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                store,
                source: Box::new(source),
                terminator: Box::new(terminator),
            }),
        }
    }

    /// The credential store this coordinator renews into
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    /// Whether a renewal is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().refreshing
    }

    /// The number of requests waiting on the in-flight renewal
    pub fn waiter_count(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Reports an authorization failure and waits for renewed credentials
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn renew(&self) -> Result<AccessToken, RefreshError> {
        let (tx, rx) = oneshot::channel();

        let started = {
            let mut state = self.inner.state.lock();
            state.waiters.push(tx);
            if state.refreshing {
                tracing::debug!(
                    generation = state.generation,
                    waiters = state.waiters.len(),
                    "renewal already in flight, waiting for outcome"
                );
                None
            } else {
                state.refreshing = true;
                state.generation += 1;
                Some(state.generation)
            }
        };

        if let Some(generation) = started {
            self.spawn_renewal(generation);
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    fn spawn_renewal(&self, generation: u64) {
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move { inner.renew(generation).await });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(err) = join.await {
                if err.is_panic() {
                    tracing::error!(generation, "credential renewal panicked!")
                } else if err.is_cancelled() {
                    tracing::info!(generation, "credential renewal was cancelled")
                }
                inner.settle(generation, Err(RefreshError::Abandoned));
            }
        });
    }
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &state.refreshing)
            .field("generation", &state.generation)
            .field("waiters", &state.waiters.len())
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn renew(&self, generation: u64) {
        let refresh_token = match self.store.refresh_token() {
            Some(token) => token,
            None => {
                tracing::warn!(generation, "no refresh token stored, ending session");
                self.settle(generation, Err(RefreshError::NoRefreshToken));
                self.terminator.terminate_session();
                return;
            }
        };

        tracing::debug!(generation, "requesting renewed credentials");
        match self.source.request_token(&refresh_token).await {
            Ok(pair) => {
                self.store.store_pair(&pair);
                let (access_token, _) = pair.into_parts();
                let waiters = self.settle(generation, Ok(access_token));
                tracing::info!(generation, waiters, "credentials renewed");
            }
            Err(error) => {
                tracing::warn!(
                    generation,
                    error = (&error as &dyn error::Error),
                    "credential renewal failed, ending session"
                );
                self.store.clear();
                self.settle(generation, Err(error));
                self.terminator.terminate_session();
            }
        }
    }

    /// Drains the waiters of `generation`, returning how many were notified
    fn settle(&self, generation: u64, outcome: Outcome) -> usize {
        let waiters = {
            let mut state = self.state.lock();
            if !state.refreshing || state.generation != generation {
                return 0;
            }
            state.refreshing = false;
            mem::take(&mut state.waiters)
        };

        let count = waiters.len();
        for waiter in waiters {
            // the receiving request may have been dropped
            let _ = waiter.send(outcome.clone());
        }
        count
    }
}

#[async_trait]
trait DynRefreshSource: Send + Sync {
    async fn request_token(&self, refresh_token: &RefreshTokenRef)
        -> Result<TokenPair, RefreshError>;
}

#[async_trait]
impl<S: RefreshTokenSource> DynRefreshSource for S {
    async fn request_token(
        &self,
        refresh_token: &RefreshTokenRef,
    ) -> Result<TokenPair, RefreshError> {
        RefreshTokenSource::request_token(self, refresh_token)
            .await
            .map_err(|e| RefreshError::Failed(Arc::new(e)))
    }
}
