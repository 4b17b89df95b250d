//! Capture session
//!
//! A session captures the application code the host loads during a short
//! window, merges it over the artifacts already known from extraction,
//! resolves the spec for the resulting hash and applies it.
//!
//! ```text
//! Trapping → Captured → Hashed → SpecRequested ─┬─▶ Applied
//!                                     ▲          └─▶ StaleRetry
//!                                     └──────────────────┘
//! ```
//!
//! Failure ends in `Aborted`; [`CaptureSession::close`] ends in `Closed`.

use crate::config::CaptureConfig;
use crate::error::SessionError;
use crate::hook::{Accumulator, CaptureHook};
use crate::host::{DispatchObserver, SessionHost, SubscriptionId};
use parking_lot::Mutex;
use specsync_artifact::FrozenArtifactSet;
use specsync_cache::{ReflectorSpec, Resolution, SpecResolver};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

tokio::task_local! {
    static SESSION_SCOPE: SessionId;
}

/// Unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh identifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Observable session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Trapping,
    Captured,
    Hashed,
    SpecRequested,
    StaleRetry,
    Applied,
    Aborted,
    Closed,
}

/// One capture-and-apply run against a host
#[derive(Debug)]
pub struct CaptureSession {
    id: SessionId,
    config: CaptureConfig,
    host: SessionHost,
    resolver: SpecResolver,
    accumulator: Accumulator,
    trapped: AtomicBool,
    closed: AtomicBool,
    subscription: Mutex<Option<SubscriptionId>>,
    observer: Mutex<Option<SubscriptionId>>,
    state: Mutex<SessionState>,
    artifacts: Mutex<Option<FrozenArtifactSet>>,
}

impl CaptureSession {
    /// Create an idle session
    #[must_use]
    pub fn new(host: SessionHost, resolver: SpecResolver, config: CaptureConfig) -> Self {
        Self {
            id: SessionId::new(),
            config,
            host,
            resolver,
            accumulator: Accumulator::new(),
            trapped: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            subscription: Mutex::new(None),
            observer: Mutex::new(None),
            state: Mutex::new(SessionState::Idle),
            artifacts: Mutex::new(None),
        }
    }

    /// Session identifier
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Whether the capture hook is attached
    #[inline]
    #[must_use]
    pub fn is_trapped(&self) -> bool {
        self.trapped.load(Ordering::Acquire)
    }

    /// Artifacts the session hashed, once it got that far
    #[must_use]
    pub fn artifacts(&self) -> Option<FrozenArtifactSet> {
        self.artifacts.lock().clone()
    }

    /// Attach the capture hook. Returns `false` if it was already attached.
    pub fn trap(&self) -> bool {
        let mut subscription = self.subscription.lock();
        if self
            .trapped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let hook = CaptureHook::new(self.accumulator.clone(), self.config.loader_prefix.clone());
        *subscription = Some(self.host.registry.subscribe(Arc::new(hook)));
        true
    }

    /// Detach the capture hook. Returns `false` if it was not attached.
    pub fn untrap(&self) -> bool {
        let mut subscription = self.subscription.lock();
        if self
            .trapped
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(id) = subscription.take() {
            self.host.registry.unsubscribe(id);
        }
        true
    }

    /// Capture, hash, resolve and apply.
    ///
    /// # Errors
    /// Returns [`SessionError`] if resolution fails or the session is closed
    /// while running; nothing is applied in that case.
    pub async fn run(&self) -> Result<ReflectorSpec, SessionError> {
        let result = self.capture_and_apply().await;
        if result.is_err() {
            self.set_state(SessionState::Aborted);
        }
        result
    }

    async fn capture_and_apply(&self) -> Result<ReflectorSpec, SessionError> {
        self.set_state(SessionState::Trapping);
        self.trap();
        let mut known = self.host.client.known_artifacts();

        let cancel = self.resolver.cancellation_token();
        tokio::select! {
            () = cancel.cancelled() => {
                self.untrap();
                return Err(SessionError::Closed);
            }
            () = tokio::time::sleep(self.config.settle()) => {}
        }
        self.untrap();
        self.set_state(SessionState::Captured);

        let captured = self.accumulator.drain();
        let captured_count = captured.len();
        known.merge(captured);
        let frozen = known.freeze();
        *self.artifacts.lock() = Some(frozen.clone());
        self.set_state(SessionState::Hashed);
        tracing::info!(
            "Captured {} artifacts ({} new), {} bytes, hash {}",
            frozen.len(),
            captured_count,
            frozen.set().total_bytes(),
            frozen.hash()
        );

        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        self.host.dispatcher.start();
        let observer = DispatchObserver {
            dispatcher: Arc::clone(&self.host.dispatcher),
        };
        let id = self.host.input.add_observer(Arc::new(observer));
        *self.observer.lock() = Some(id);
        // a close() that ran meanwhile found the slot empty
        if self.is_closed() {
            if let Some(id) = self.observer.lock().take() {
                self.host.input.remove_observer(id);
            }
            return Err(SessionError::Closed);
        }

        SESSION_SCOPE.scope(self.id, self.apply_loop(&frozen)).await
    }

    async fn apply_loop(&self, frozen: &FrozenArtifactSet) -> Result<ReflectorSpec, SessionError> {
        let mut rebuilds = 0u32;
        loop {
            self.set_state(SessionState::SpecRequested);
            let bound = match self.resolver.resolve(frozen).await? {
                Resolution::Ready(spec) => {
                    let adapted = Arc::new(spec.adapt()?);
                    match ReflectorSpec::bind(adapted, frozen.set()) {
                        Ok(bound) => Some(bound),
                        Err(e) if e.is_stale() => {
                            tracing::warn!("spec {} does not fit this client: {}", frozen.hash().short(), e);
                            None
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Resolution::Stale => None,
            };

            if let Some(bound) = bound {
                if self.is_closed() {
                    return Err(SessionError::Closed);
                }
                self.host.client.reflect(bound.clone());
                self.set_state(SessionState::Applied);
                self.host.client.on_applied();
                return Ok(bound);
            }

            self.set_state(SessionState::StaleRetry);
            rebuilds += 1;
            if self.config.max_rebuilds.is_some_and(|max| rebuilds > max) {
                return Err(SessionError::RebuildsExhausted(rebuilds - 1));
            }
            self.resolver.rebuild(frozen).await?;
        }
    }

    /// Spawn `future` inside this session's scope; a [`close`] issued from it
    /// only stops the controller.
    ///
    /// [`close`]: CaptureSession::close
    pub fn spawn_scoped<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        tokio::spawn(SESSION_SCOPE.scope(self.id, future))
    }

    /// Whether the caller runs inside this session's scope
    #[must_use]
    pub fn in_scope(&self) -> bool {
        SESSION_SCOPE.try_with(|id| *id == self.id).unwrap_or(false)
    }

    /// Stop the controller and, unless called from inside the session's own
    /// scope, release everything the session holds. Release happens once.
    pub fn close(&self) {
        self.host.controller.stop();
        if self.in_scope() {
            tracing::debug!("close requested from inside session {}", self.id);
            return;
        }
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.untrap();
        if let Some(id) = self.observer.lock().take() {
            self.host.input.remove_observer(id);
        }
        self.resolver.cancel();
        self.host.client.cancel_timers();
        self.host.dispatcher.close();
        self.host.client.detach_client();
        self.host.client.release_owner();
        *self.state.lock() = SessionState::Closed;
        tracing::info!("session {} closed", self.id);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock();
        if *state != SessionState::Closed {
            *state = next;
        }
    }
}
