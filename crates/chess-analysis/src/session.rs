//! Analysis session over a multiplexed engine.
//!
//! The session owns one engine and runs one search at a time:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready <-> Analyzing
//!                        \            \         /
//!                         +-----------> Errored
//! ```
//!
//! Construction sends the handshake. Once the engine acknowledges it, the
//! configured options are applied and a readiness check follows; its reply
//! makes the session [`SessionState::Ready`]. Any transport failure moves
//! the session to [`SessionState::Errored`], which it never leaves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use engine_mux::{MuxError, Multiplexer, OnComplete, OnStream, TransportError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uci::{go_depth, set_option, BestMove, EngineInfo, Position, UciError, HANDSHAKE, READY_CHECK};

use crate::config::EngineConfig;
use crate::AnalysisResult;

/// Search depth used when none is configured.
pub const DEFAULT_DEPTH: u32 = 15;

/// Errors returned by [`AnalysisSession`] operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The engine could not be started.
    #[error("Engine unavailable: {0}")]
    TransportUnavailable(String),
    /// The channel to the engine broke.
    #[error("Engine transport failed: {0}")]
    TransportFailure(String),
    /// Analysis was requested before the engine was ready.
    #[error("Engine is not ready (state: {0:?})")]
    NotReady(SessionState),
    /// A search is already running on this session.
    #[error("An analysis is already running")]
    Busy,
    /// The session failed earlier and cannot be used.
    #[error("Session has failed: {0}")]
    Errored(String),
    #[error("Invalid position: {0}")]
    InvalidPosition(#[from] UciError),
}

impl From<MuxError> for SessionError {
    fn from(err: MuxError) -> Self {
        match err {
            MuxError::Transport(TransportError::Unavailable(msg)) => {
                SessionError::TransportUnavailable(msg)
            }
            MuxError::Transport(other) => SessionError::TransportFailure(other.to_string()),
            other => SessionError::Errored(other.to_string()),
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Analyzing,
    Errored,
}

/// Everything an observer of a session can see.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Latest snapshot of the current or most recent search.
    pub analysis: Option<AnalysisResult>,
    /// Why the session failed, once it has.
    pub error: Option<String>,
}

/// One engine, analysing one position at a time.
///
/// Cloning is cheap; clones share the engine and its state.
#[derive(Clone)]
pub struct AnalysisSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    mux: Multiplexer,
    status: watch::Sender<SessionStatus>,
    /// Bumped whenever a search starts or is abandoned, so output of a
    /// stopped search can never touch the current snapshot.
    generation: AtomicU64,
    depth: u32,
}

impl AnalysisSession {
    /// Launch the configured engine and start the handshake.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportUnavailable`] if the engine process
    /// cannot be started.
    pub fn spawn(config: &EngineConfig) -> Result<Self, SessionError> {
        let mux = Multiplexer::spawn_process(&config.path, &config.args).map_err(|e| match e {
            TransportError::Unavailable(msg) => SessionError::TransportUnavailable(msg),
            other => SessionError::TransportFailure(other.to_string()),
        })?;
        info!(engine = %config.path.display(), "engine started");
        Self::with_options(mux, config.option_pairs(), config.depth)
    }

    /// Start a session on an already connected engine, with no options.
    ///
    /// # Errors
    ///
    /// Fails if the handshake cannot be written.
    pub fn start(mux: Multiplexer) -> Result<Self, SessionError> {
        Self::with_options(mux, Vec::new(), DEFAULT_DEPTH)
    }

    /// Start a session that applies `options` before declaring itself ready
    /// and searches to `depth` unless told otherwise.
    ///
    /// # Errors
    ///
    /// Fails if the handshake cannot be written.
    pub fn with_options(
        mux: Multiplexer,
        options: Vec<(String, String)>,
        depth: u32,
    ) -> Result<Self, SessionError> {
        let (status, _) = watch::channel(SessionStatus::default());
        let inner = Arc::new(SessionInner {
            mux: mux.clone(),
            status,
            generation: AtomicU64::new(0),
            depth,
        });

        let weak = Arc::downgrade(&inner);
        mux.set_error_handler(move |e| {
            if let Some(inner) = weak.upgrade() {
                inner.fail(e.to_string());
            }
        });

        inner.set_state(SessionState::Initializing);
        let weak = Arc::downgrade(&inner);
        let on_loaded: OnComplete = Box::new(move |_: String| {
            if let Some(inner) = weak.upgrade() {
                inner.configure(&options);
            }
        });
        if let Err(e) = mux.send(HANDSHAKE, Some(on_loaded), None) {
            let err = SessionError::from(e);
            inner.fail(err.to_string());
            return Err(err);
        }

        Ok(Self { inner })
    }

    /// Analyse a FEN position.
    ///
    /// Search output updates [`Self::current_analysis`] as it streams in.
    /// `depth` defaults to the session's configured depth.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidPosition`] for an empty or multi-line FEN
    /// - [`SessionError::NotReady`] before the handshake has finished
    /// - [`SessionError::Busy`] while another search is running
    /// - [`SessionError::Errored`] once the session has failed
    pub fn analyze_position(&self, fen: &str, depth: Option<u32>) -> Result<(), SessionError> {
        let position = Position::from_fen(fen)?;
        self.analyze(&position, depth)
    }

    /// Analyse the position reached by playing `moves` from the start.
    ///
    /// # Errors
    ///
    /// See [`Self::analyze_position`].
    pub fn analyze_moves<I, S>(&self, moves: I, depth: Option<u32>) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let position = Position::startpos().with_moves(moves)?;
        self.analyze(&position, depth)
    }

    /// Analyse any position.
    ///
    /// # Errors
    ///
    /// See [`Self::analyze_position`].
    pub fn analyze(&self, position: &Position, depth: Option<u32>) -> Result<(), SessionError> {
        let inner = &self.inner;
        let depth = depth.unwrap_or(inner.depth);

        let mut admitted = Err(SessionError::Busy);
        inner.status.send_if_modified(|s| match s.state {
            SessionState::Ready => {
                s.state = SessionState::Analyzing;
                s.analysis = None;
                admitted = Ok(inner.generation.fetch_add(1, Ordering::SeqCst) + 1);
                true
            }
            SessionState::Analyzing => false,
            SessionState::Errored => {
                admitted = Err(SessionError::Errored(s.error.clone().unwrap_or_default()));
                false
            }
            other => {
                admitted = Err(SessionError::NotReady(other));
                false
            }
        });
        let generation = admitted?;

        debug!(position = %position.to_uci(), depth, "analysis started");

        let weak = Arc::downgrade(inner);
        let on_stream: OnStream = Arc::new(move |line: &str| {
            if let Some(inner) = weak.upgrade() {
                inner.on_search_line(generation, line);
            }
        });
        let weak = Arc::downgrade(inner);
        let on_done: OnComplete = Box::new(move |message: String| {
            if let Some(inner) = weak.upgrade() {
                inner.on_search_done(generation, &message);
            }
        });

        let sent = inner
            .mux
            .send(&position.to_uci(), None, None)
            .and_then(|()| inner.mux.send(&go_depth(depth), Some(on_done), Some(on_stream)));
        if let Err(e) = sent {
            let err = SessionError::from(e);
            inner.fail(err.to_string());
            return Err(err);
        }
        Ok(())
    }

    /// Stop the running search.
    ///
    /// The session is ready again immediately; whatever the engine still
    /// sends for the stopped search is ignored.
    pub fn stop_analysis(&self) {
        let inner = &self.inner;
        let stopped = inner.status.send_if_modified(|s| {
            if s.state != SessionState::Analyzing {
                return false;
            }
            inner.generation.fetch_add(1, Ordering::SeqCst);
            // Cancel before Ready is visible, so a search admitted next is
            // queued after the cancellation and survives it.
            inner.mux.cancel_searches();
            s.state = SessionState::Ready;
            true
        });
        if stopped {
            debug!("analysis stopped");
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.status.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn is_analyzing(&self) -> bool {
        self.state() == SessionState::Analyzing
    }

    pub fn current_analysis(&self) -> Option<AnalysisResult> {
        self.inner.status.borrow().analysis.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.status.borrow().error.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().clone()
    }

    /// Watch every status change.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    /// The multiplexer driving this session's engine.
    pub fn multiplexer(&self) -> &Multiplexer {
        &self.inner.mux
    }

    /// Wait until the handshake has finished.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Errored`] if the session fails first.
    pub async fn wait_ready(&self) -> Result<(), SessionError> {
        let status = self
            .wait_for(|s| {
                !matches!(
                    s.state,
                    SessionState::Uninitialized | SessionState::Initializing
                )
            })
            .await?;
        match status.state {
            SessionState::Errored => Err(SessionError::Errored(status.error.unwrap_or_default())),
            _ => Ok(()),
        }
    }

    /// Wait until no search is running and return the final snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Errored`] if the session fails first.
    pub async fn wait_idle(&self) -> Result<Option<AnalysisResult>, SessionError> {
        let status = self
            .wait_for(|s| s.state != SessionState::Analyzing)
            .await?;
        match status.state {
            SessionState::Errored => Err(SessionError::Errored(status.error.unwrap_or_default())),
            _ => Ok(status.analysis),
        }
    }

    async fn wait_for<F>(&self, done: F) -> Result<SessionStatus, SessionError>
    where
        F: FnMut(&SessionStatus) -> bool,
    {
        let mut rx = self.subscribe();
        let status = rx
            .wait_for(done)
            .await
            .map_err(|_| SessionError::Errored("session closed".to_string()))?;
        Ok(status.clone())
    }

    /// Stop the engine. The session cannot be used afterwards.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        inner.status.send_modify(|s| {
            inner.generation.fetch_add(1, Ordering::SeqCst);
            s.state = SessionState::Errored;
            s.error.get_or_insert_with(|| "session shut down".to_string());
        });
        inner.mux.shutdown();
        info!("analysis session shut down");
    }
}

impl SessionInner {
    fn set_state(&self, state: SessionState) {
        self.status.send_modify(|s| s.state = state);
    }

    fn fail(&self, error: String) {
        warn!(error = %error, "analysis session failed");
        self.status.send_modify(|s| {
            s.state = SessionState::Errored;
            s.error = Some(error);
        });
    }

    /// Handshake acknowledged: apply options, then check readiness.
    fn configure(self: &Arc<Self>, options: &[(String, String)]) {
        for (name, value) in options {
            if let Err(e) = self.mux.send(&set_option(name, value), None, None) {
                self.fail(SessionError::from(e).to_string());
                return;
            }
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let on_ready: OnComplete = Box::new(move |_: String| {
            if let Some(inner) = weak.upgrade() {
                inner.mark_ready();
            }
        });
        if let Err(e) = self.mux.send(READY_CHECK, Some(on_ready), None) {
            self.fail(SessionError::from(e).to_string());
        }
    }

    fn mark_ready(&self) {
        let ready = self.status.send_if_modified(|s| {
            if s.state != SessionState::Initializing {
                return false;
            }
            s.state = SessionState::Ready;
            true
        });
        if ready {
            info!("engine ready");
        }
    }

    fn on_search_line(&self, generation: u64, line: &str) {
        let Some(info) = EngineInfo::parse(line) else {
            return;
        };
        self.status.send_if_modified(|s| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            match AnalysisResult::update(s.analysis.as_ref(), &info) {
                Some(next) => {
                    s.analysis = Some(next);
                    true
                }
                None => false,
            }
        });
    }

    fn on_search_done(&self, generation: u64, message: &str) {
        let verdict = BestMove::parse(message);
        self.status.send_if_modified(|s| {
            if self.generation.load(Ordering::SeqCst) != generation
                || s.state != SessionState::Analyzing
            {
                return false;
            }
            if let (Some(analysis), Some(verdict)) = (s.analysis.as_mut(), verdict.as_ref()) {
                analysis.finish(verdict);
            }
            s.state = SessionState::Ready;
            true
        });
        debug!(message, "analysis finished");
    }
}
