//! The pending-command queue and reply router.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uci::{is_noise, CommandKind, ReplyKind, STOP};

use crate::pending::{route, OnComplete, OnStream, PendingCommand, Terminal};
use crate::transport::{EventStream, ProcessTransport, Transport, TransportEvent};
use crate::{MuxError, TransportError};

/// Invoked when the transport reports a failure.
pub type OnError = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// How far the engine has come through its start-up exchange.
///
/// `Ready` implies the engine also acknowledged the handshake at some point,
/// so "ready but not loaded" cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// No `uciok` seen yet.
    Pending,
    /// `uciok` seen.
    Loaded,
    /// `readyok` seen.
    Ready,
}

struct Router {
    queue: VecDeque<PendingCommand>,
    handshake: Handshake,
    next_id: u64,
    listener: Option<OnStream>,
    on_error: Option<OnError>,
    shut_down: bool,
}

/// Callbacks owed for one reply line, run after the queue lock is released.
struct Delivery {
    on_stream: Option<OnStream>,
    completion: Option<(OnComplete, String)>,
}

impl Router {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            handshake: Handshake::Pending,
            next_id: 0,
            listener: None,
            on_error: None,
            shut_down: false,
        }
    }

    fn enqueue(
        &mut self,
        command: &str,
        on_complete: Option<OnComplete>,
        on_stream: Option<OnStream>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.queue
            .push_back(PendingCommand::new(id, command, on_complete, on_stream));
        id
    }

    fn remove(&mut self, id: u64) -> Option<PendingCommand> {
        let index = self.queue.iter().position(|p| p.id == id)?;
        self.queue.remove(index)
    }

    fn route_line(&mut self, line: &str) -> Option<Delivery> {
        if self.queue.is_empty() || is_noise(line) {
            return None;
        }

        let index = route(ReplyKind::of(line), self.queue.iter().map(PendingCommand::kind));
        let entry = self.queue.get_mut(index)?;
        let on_stream = entry.stream();
        let terminal = entry.absorb(line);

        let completion = match terminal {
            None => None,
            Some(terminal) => {
                match terminal {
                    Terminal::HandshakeOk if self.handshake == Handshake::Pending => {
                        self.handshake = Handshake::Loaded;
                    }
                    Terminal::ReadyOk => self.handshake = Handshake::Ready,
                    _ => {}
                }
                self.queue
                    .remove(index)
                    .and_then(PendingCommand::into_completion)
            }
        };

        Some(Delivery {
            on_stream,
            completion,
        })
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    router: Mutex<Router>,
    started: Instant,
}

/// Shares one engine between many callers.
///
/// Commands go out in the order [`send`](Self::send) is called. Replies come
/// back through [`on_line`](Self::on_line), which must be fed serially; the
/// pump started by [`attach`](Self::attach) does exactly that. Callbacks run
/// outside the internal lock, so they may call back into the multiplexer.
///
/// Cloning is cheap and every clone drives the same engine.
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

impl Multiplexer {
    /// Wrap a transport without starting a pump.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                router: Mutex::new(Router::new()),
                started: Instant::now(),
            }),
        }
    }

    /// Wrap a transport and pump its events into the multiplexer.
    pub fn connect<T: Transport + 'static>(transport: T, events: EventStream) -> Self {
        let mux = Self::new(Arc::new(transport));
        mux.attach(events);
        mux
    }

    /// Spawn an engine process and connect to it.
    pub fn spawn_process<P: AsRef<Path>>(
        program: P,
        args: &[String],
    ) -> Result<Self, TransportError> {
        let (transport, events) = ProcessTransport::spawn(program, args)?;
        Ok(Self::connect(transport, events))
    }

    /// Start the task that feeds transport events into the router, one at a time.
    pub fn attach(&self, mut events: EventStream) -> JoinHandle<()> {
        let mux = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Line(chunk) => mux.on_line(&chunk),
                    TransportEvent::Failed(message) => {
                        mux.report_failure(TransportError::Failure(message));
                    }
                    TransportEvent::Closed => {
                        mux.report_failure(TransportError::Closed);
                        break;
                    }
                }
            }
        })
    }

    fn router(&self) -> MutexGuard<'_, Router> {
        self.inner
            .router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Send a command.
    ///
    /// Blank commands are ignored. Commands the engine never answers are
    /// written straight away and `on_complete` is scheduled with an empty
    /// message; everything else joins the queue before it is written.
    ///
    /// Joining the queue and writing happen under one lock, so concurrent
    /// callers reach the wire in queue order. Outside a tokio runtime the
    /// empty completion runs before `send` returns.
    pub fn send(
        &self,
        command: &str,
        on_complete: Option<OnComplete>,
        on_stream: Option<OnStream>,
    ) -> Result<(), MuxError> {
        let command = command.trim();
        if command.is_empty() {
            return Ok(());
        }

        let mut router = self.router();
        if router.shut_down {
            return Err(MuxError::ShutDown);
        }
        debug!(command, "engine <");

        if !CommandKind::expects_reply(command) {
            self.inner.transport.send_line(command)?;
            drop(router);
            if let Some(cb) = on_complete {
                complete_empty(cb);
            }
            return Ok(());
        }

        let id = router.enqueue(command, on_complete, on_stream);
        if let Err(e) = self.inner.transport.send_line(command) {
            // Never reached the engine, so nothing will ever answer it.
            let orphan = router.remove(id);
            drop(router);
            drop(orphan);
            return Err(e.into());
        }
        Ok(())
    }

    /// Send a command and wait for its final message.
    ///
    /// # Errors
    ///
    /// [`MuxError::Discarded`] if the command is cancelled first,
    /// [`MuxError::ShutDown`] if the multiplexer shuts down first, or the
    /// transport error if the command could not be written.
    pub async fn request(&self, command: &str) -> Result<String, MuxError> {
        if command.trim().is_empty() {
            return Ok(String::new());
        }
        let (tx, rx) = oneshot::channel();
        let on_complete: OnComplete = Box::new(move |message| {
            let _ = tx.send(message);
        });
        self.send(command, Some(on_complete), None)?;
        match rx.await {
            Ok(message) => Ok(message),
            Err(_) if self.is_shut_down() => Err(MuxError::ShutDown),
            Err(_) => Err(MuxError::Discarded),
        }
    }

    /// Process output from the engine.
    ///
    /// A chunk holding several lines is handled line by line. Lines that
    /// match nothing are dropped.
    pub fn on_line(&self, chunk: &str) {
        if chunk.contains('\n') {
            for line in chunk.split('\n') {
                self.on_line(line);
            }
            return;
        }
        let line = chunk.strip_suffix('\r').unwrap_or(chunk);
        if line.is_empty() {
            return;
        }
        trace!(line, "engine >");

        let (listener, delivery) = {
            let mut router = self.router();
            let listener = router.listener.clone();
            (listener, router.route_line(line))
        };

        if let Some(listener) = listener {
            listener(line);
        }
        if let Some(delivery) = delivery {
            if let Some(on_stream) = delivery.on_stream {
                on_stream(line);
            }
            if let Some((cb, message)) = delivery.completion {
                cb(message);
            }
        }
    }

    /// Stop every search still running and drop its completion.
    ///
    /// One `stop` is sent per cancelled search. Each entry stays queued until
    /// its `bestmove` arrives, so later searches still line up behind it.
    /// Returns how many searches were cancelled.
    pub fn cancel_searches(&self) -> usize {
        let dropped: Vec<Option<OnComplete>> = {
            let mut router = self.router();
            router
                .queue
                .iter_mut()
                .filter(|p| p.kind() == CommandKind::Search && !p.is_discarded())
                .map(PendingCommand::discard)
                .collect()
        };
        let count = dropped.len();
        drop(dropped);

        for _ in 0..count {
            if let Err(e) = self.send(STOP, None, None) {
                warn!(error = %e, "failed to send stop");
            }
        }
        if count > 0 {
            debug!(count, "searches cancelled");
        }
        count
    }

    /// Number of commands waiting for their terminal line.
    pub fn queue_depth(&self) -> usize {
        self.router().queue.len()
    }

    /// Drop every pending command without running its callbacks and close
    /// the transport.
    pub fn shutdown(&self) {
        let dropped = {
            let mut router = self.router();
            router.shut_down = true;
            std::mem::take(&mut router.queue)
        };
        debug!(pending = dropped.len(), "multiplexer shut down");
        drop(dropped);
        self.inner.transport.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.router().shut_down
    }

    /// Receive every non-empty line, whether or not a command claims it.
    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.router().listener = Some(Arc::new(listener));
    }

    /// Be told about transport failures.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.router().on_error = Some(Arc::new(handler));
    }

    /// Surface a transport failure. Pending commands stay queued.
    pub fn report_failure(&self, error: TransportError) {
        let handler = {
            let router = self.router();
            if router.shut_down {
                return;
            }
            router.on_error.clone()
        };
        warn!(error = %error, "engine transport failed");
        if let Some(handler) = handler {
            handler(&error);
        }
    }

    pub fn handshake(&self) -> Handshake {
        self.router().handshake
    }

    /// The engine acknowledged `uci`.
    pub fn is_loaded(&self) -> bool {
        self.handshake() != Handshake::Pending
    }

    /// The engine acknowledged `isready`.
    pub fn is_ready(&self) -> bool {
        self.handshake() == Handshake::Ready
    }

    pub fn started(&self) -> Instant {
        self.inner.started
    }

    pub fn uptime(&self) -> Duration {
        self.inner.started.elapsed()
    }
}

/// Hand a no-reply command its empty result without running it inside `send`
/// when a runtime is available.
fn complete_empty(cb: OnComplete) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { cb(String::new()) });
        }
        Err(_) => cb(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, EngineEnd};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mux() -> (Multiplexer, EngineEnd) {
        let (transport, _events, engine) = ChannelTransport::pair();
        (Multiplexer::new(Arc::new(transport)), engine)
    }

    fn collect() -> (Arc<Mutex<Vec<String>>>, OnComplete) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (
            seen,
            Box::new(move |m: String| sink.lock().unwrap().push(m)),
        )
    }

    #[tokio::test]
    async fn blank_command_is_ignored() {
        let (mux, mut engine) = mux();
        mux.send("   ", None, None).unwrap();
        assert_eq!(mux.queue_depth(), 0);
        assert!(engine.drain_commands().is_empty());
    }

    #[tokio::test]
    async fn commands_are_trimmed() {
        let (mux, mut engine) = mux();
        mux.send("  isready \n", None, None).unwrap();
        assert_eq!(engine.drain_commands(), vec!["isready"]);
    }

    #[tokio::test]
    async fn handshake_and_ready_flags() {
        let (mux, _engine) = mux();
        mux.send("uci", None, None).unwrap();
        mux.send("isready", None, None).unwrap();
        assert_eq!(mux.handshake(), Handshake::Pending);

        mux.on_line("id name Stockfish 17.1\noption name Hash type spin default 16\nuciok");
        assert!(mux.is_loaded());
        assert!(!mux.is_ready());

        mux.on_line("readyok");
        assert!(mux.is_ready());
        assert_eq!(mux.queue_depth(), 0);
    }

    #[tokio::test]
    async fn option_lines_reach_the_handshake() {
        let (mux, _engine) = mux();
        let (seen, cb) = collect();
        mux.send("uci", Some(cb), None).unwrap();
        mux.on_line("id name Stockfish 17.1");
        mux.on_line("option name Threads type spin default 1 min 1 max 1024");
        mux.on_line("uciok");
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            ["option name Threads type spin default 1 min 1 max 1024\nuciok"]
        );
    }

    #[tokio::test]
    async fn stream_runs_per_line_and_completion_once() {
        let (mux, _engine) = mux();
        let (seen, cb) = collect();
        let streamed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&streamed);
        let on_stream: OnStream = Arc::new(move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        mux.send("go depth 2", Some(cb), Some(on_stream)).unwrap();

        mux.on_line("info depth 1 score cp 13 pv e2e4");
        mux.on_line("info depth 2 score cp 20 pv e2e4 e7e5");
        mux.on_line("bestmove e2e4 ponder e7e5");

        assert_eq!(streamed.load(Ordering::SeqCst), 3);
        assert_eq!(seen.lock().unwrap().as_slice(), ["bestmove e2e4 ponder e7e5"]);
    }

    #[tokio::test]
    async fn listener_sees_everything() {
        let (mux, _engine) = mux();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        mux.set_listener(move |l| sink.lock().unwrap().push(l.to_string()));

        mux.on_line("Stockfish 17.1 by the Stockfish developers");
        mux.on_line("readyok");
        assert_eq!(
            lines.lock().unwrap().as_slice(),
            ["Stockfish 17.1 by the Stockfish developers", "readyok"]
        );
    }

    #[tokio::test]
    async fn noise_is_not_routed() {
        let (mux, _engine) = mux();
        let (seen, cb) = collect();
        mux.send("uci", Some(cb), None).unwrap();
        mux.on_line("Stockfish 17.1 by the Stockfish developers");
        mux.on_line("id author the Stockfish developers");
        mux.on_line("No such option: Foo");
        mux.on_line("uciok");
        assert_eq!(seen.lock().unwrap().as_slice(), ["uciok"]);
    }

    #[tokio::test]
    async fn crlf_is_stripped() {
        let (mux, _engine) = mux();
        mux.send("isready", None, None).unwrap();
        mux.on_line("readyok\r\n");
        assert!(mux.is_ready());
        assert_eq!(mux.queue_depth(), 0);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_entry() {
        let (transport, _events, _engine) = ChannelTransport::pair();
        transport.close();
        let mux = Multiplexer::new(Arc::new(transport));
        let err = mux.send("go depth 3", None, None).unwrap_err();
        assert_eq!(err, MuxError::Transport(TransportError::Closed));
        assert_eq!(mux.queue_depth(), 0);
    }

    #[tokio::test]
    async fn cancel_marks_each_search_once() {
        let (mux, mut engine) = mux();
        mux.send("go depth 20", None, None).unwrap();
        mux.send("isready", None, None).unwrap();
        engine.drain_commands();

        assert_eq!(mux.cancel_searches(), 1);
        assert_eq!(mux.cancel_searches(), 0);
        assert_eq!(engine.drain_commands(), vec!["stop"]);
        assert_eq!(mux.queue_depth(), 2);
    }

    #[tokio::test]
    async fn shutdown_drops_callbacks_and_closes() {
        let (mux, _engine) = mux();
        let (seen, cb) = collect();
        mux.send("go depth 20", Some(cb), None).unwrap();
        mux.shutdown();
        assert_eq!(mux.queue_depth(), 0);
        mux.on_line("bestmove e2e4");
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(mux.send("isready", None, None), Err(MuxError::ShutDown));
    }

    #[tokio::test]
    async fn uptime_is_monotonic() {
        let (mux, _engine) = mux();
        assert!(mux.uptime() >= Duration::ZERO);
        assert!(mux.started() <= Instant::now());
    }

    #[test]
    fn silent_completion_without_runtime_runs_inline() {
        let (mux, mut engine) = mux();
        let (seen, cb) = collect();
        mux.send("ucinewgame", Some(cb), None).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), [""]);
        assert_eq!(engine.drain_commands(), vec!["ucinewgame"]);
    }
}
