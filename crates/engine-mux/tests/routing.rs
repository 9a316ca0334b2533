//! Reply routing through a pumped in-memory engine.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use engine_mux::{
    ChannelTransport, EngineEnd, MuxError, Multiplexer, OnComplete, OnStream, Transport,
    TransportError,
};
use tokio::sync::oneshot;

fn connected() -> (Multiplexer, EngineEnd) {
    let (transport, events, engine) = ChannelTransport::pair();
    (Multiplexer::connect(transport, events), engine)
}

/// Completion that forwards its message to a one-shot receiver.
fn completion() -> (OnComplete, oneshot::Receiver<String>) {
    let (tx, rx) = oneshot::channel();
    (
        Box::new(move |message: String| {
            let _ = tx.send(message);
        }),
        rx,
    )
}

/// Let the pump drain everything already injected.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn silent_command_completes_asynchronously_with_empty_message() {
    let (mux, mut engine) = connected();
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    let (tx, rx) = oneshot::channel();

    mux.send(
        "position startpos moves e2e4",
        Some(Box::new(move |message: String| {
            flag.store(true, Ordering::SeqCst);
            let _ = tx.send(message);
        })),
        None,
    )
    .unwrap();

    assert!(!fired.load(Ordering::SeqCst), "completion ran synchronously");
    assert_eq!(mux.queue_depth(), 0);
    assert_eq!(rx.await.unwrap(), "");
    assert_eq!(engine.drain_commands(), vec!["position startpos moves e2e4"]);
}

#[tokio::test]
async fn queue_depth_tracks_reply_expecting_commands() {
    let (mux, engine) = connected();
    mux.send("isready", None, None).unwrap();
    assert_eq!(mux.queue_depth(), 1);
    mux.send("go depth 1", None, None).unwrap();
    assert_eq!(mux.queue_depth(), 2);
    mux.send("setoption name Hash value 32", None, None).unwrap();
    assert_eq!(mux.queue_depth(), 2);

    engine.reply("readyok");
    settle().await;
    assert_eq!(mux.queue_depth(), 1);

    engine.reply("info depth 1 score cp 10 pv e2e4");
    settle().await;
    assert_eq!(mux.queue_depth(), 1);

    engine.reply("bestmove e2e4");
    settle().await;
    assert_eq!(mux.queue_depth(), 0);
}

#[tokio::test]
async fn same_category_replies_go_to_the_oldest() {
    let (mux, engine) = connected();
    let (first, first_rx) = completion();
    let (ready, ready_rx) = completion();
    let (second, mut second_rx) = completion();

    mux.send("go depth 1", Some(first), None).unwrap();
    mux.send("isready", Some(ready), None).unwrap();
    mux.send("go depth 2", Some(second), None).unwrap();

    // Readiness arrives before either search finishes.
    engine.reply("readyok");
    engine.reply("bestmove d2d4");
    settle().await;

    assert_eq!(ready_rx.await.unwrap(), "readyok");
    assert_eq!(first_rx.await.unwrap(), "bestmove d2d4");
    assert!(second_rx.try_recv().is_err());
    assert_eq!(mux.queue_depth(), 1);

    engine.reply("bestmove e2e4");
    assert_eq!(second_rx.await.unwrap(), "bestmove e2e4");
}

#[tokio::test]
async fn cancelled_search_is_consumed_but_silent() {
    let (mux, mut engine) = connected();
    let called = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&called);
    let streamed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&streamed);
    let on_stream: OnStream = Arc::new(move |_: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    mux.send(
        "go depth 30",
        Some(Box::new(move |_: String| flag.store(true, Ordering::SeqCst))),
        Some(on_stream),
    )
    .unwrap();
    engine.reply("info depth 1 score cp 10 pv e2e4");
    settle().await;

    assert_eq!(mux.cancel_searches(), 1);
    assert_eq!(engine.drain_commands(), vec!["go depth 30", "stop"]);
    assert_eq!(mux.queue_depth(), 1);

    engine.reply("info depth 2 score cp 12 pv e2e4");
    engine.reply("bestmove e2e4");
    settle().await;

    assert_eq!(mux.queue_depth(), 0);
    assert!(!called.load(Ordering::SeqCst));
    // Streaming is not retracted by cancellation.
    assert_eq!(streamed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn search_queued_behind_a_cancelled_one_gets_its_own_result() {
    let (mux, engine) = connected();
    mux.send("go infinite", None, None).unwrap();
    mux.cancel_searches();
    let (next, next_rx) = completion();
    mux.send("go depth 4", Some(next), None).unwrap();

    engine.reply("bestmove a2a3\ninfo depth 4 score cp 5 pv g1f3\nbestmove g1f3");
    assert_eq!(next_rx.await.unwrap(), "bestmove g1f3");
    assert_eq!(mux.queue_depth(), 0);
}

#[tokio::test]
async fn terminal_line_on_empty_queue_is_a_no_op() {
    let (mux, _engine) = connected();
    let (cb, rx) = completion();
    mux.send("isready", Some(cb), None).unwrap();
    mux.on_line("readyok");
    assert_eq!(rx.await.unwrap(), "readyok");

    mux.on_line("readyok");
    mux.on_line("bestmove e2e4");
    assert_eq!(mux.queue_depth(), 0);
}

#[tokio::test]
async fn multi_line_chunk_routes_like_separate_lines() {
    async fn run(chunks: &[&str]) -> Vec<String> {
        let (mux, engine) = connected();
        let results = Arc::new(Mutex::new(Vec::new()));
        for cmd in ["uci", "isready", "go depth 1"] {
            let sink = Arc::clone(&results);
            mux.send(
                cmd,
                Some(Box::new(move |m: String| sink.lock().unwrap().push(m))),
                None,
            )
            .unwrap();
        }
        for chunk in chunks {
            engine.reply(chunk);
        }
        settle().await;
        assert_eq!(mux.queue_depth(), 0);
        let out = results.lock().unwrap().clone();
        out
    }

    let lines = [
        "id name Stockfish 17.1",
        "uciok",
        "readyok",
        "info depth 1 score cp 3 pv e2e4",
        "bestmove e2e4",
    ];
    let separate = run(&lines).await;
    let joined = run(&[lines.join("\n").as_str()]).await;
    assert_eq!(separate, joined);
    assert_eq!(separate, vec!["uciok", "readyok", "bestmove e2e4"]);
}

#[tokio::test]
async fn request_resolves_with_final_message() {
    let (mux, mut engine) = connected();
    let responder = tokio::spawn(async move {
        while let Some(cmd) = engine.next_command().await {
            match cmd.as_str() {
                "uci" => engine.reply("id name Fake\noption name Hash type spin\nuciok"),
                "isready" => engine.reply("readyok"),
                "d" => engine.reply(" +---+\nFen: 8/8/8/8/8/8/8/8 w - - 0 1\nKey is"),
                _ => {}
            }
        }
    });

    assert_eq!(mux.request("uci").await.unwrap(), "option name Hash type spin\nuciok");
    assert_eq!(mux.request("isready").await.unwrap(), "readyok");
    assert_eq!(
        mux.request("d").await.unwrap(),
        " +---+\nFen: 8/8/8/8/8/8/8/8 w - - 0 1"
    );
    assert!(mux.is_ready());
    responder.abort();
}

#[tokio::test]
async fn request_reports_discard_and_shutdown() {
    let (mux, _engine) = connected();

    let searching = mux.clone();
    let search = tokio::spawn(async move { searching.request("go infinite").await });
    settle().await;
    mux.cancel_searches();
    assert_eq!(search.await.unwrap(), Err(MuxError::Discarded));

    let waiting = mux.clone();
    let ready = tokio::spawn(async move { waiting.request("isready").await });
    settle().await;
    mux.shutdown();
    assert_eq!(ready.await.unwrap(), Err(MuxError::ShutDown));
}

#[tokio::test]
async fn transport_failure_reaches_error_handler_and_keeps_queue() {
    let (mux, engine) = connected();
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    mux.set_error_handler(move |e| {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(e.clone());
        }
    });

    mux.send("go depth 5", None, None).unwrap();
    engine.fail("broken pipe");
    let err = tokio::time::timeout(Duration::from_secs(1), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(err, TransportError::Failure("broken pipe".to_string()));
    assert_eq!(mux.queue_depth(), 1);
}

#[tokio::test]
async fn callbacks_may_send_more_commands() {
    let (mux, mut engine) = connected();
    let chained = mux.clone();
    mux.send(
        "uci",
        Some(Box::new(move |_: String| {
            chained.send("isready", None, None).unwrap();
        })),
        None,
    )
    .unwrap();

    engine.reply("uciok");
    settle().await;
    assert_eq!(engine.drain_commands(), vec!["uci", "isready"]);
    assert_eq!(mux.queue_depth(), 1);
}

/// Transport whose first write stalls until the test opens the gate.
struct GatedTransport {
    written: Mutex<Vec<String>>,
    entered: Mutex<Option<std_mpsc::Sender<()>>>,
    gate: (Mutex<bool>, Condvar),
}

impl GatedTransport {
    fn new(entered: std_mpsc::Sender<()>) -> Self {
        Self {
            written: Mutex::new(Vec::new()),
            entered: Mutex::new(Some(entered)),
            gate: (Mutex::new(false), Condvar::new()),
        }
    }

    fn open(&self) {
        *self.gate.0.lock().unwrap() = true;
        self.gate.1.notify_all();
    }
}

impl Transport for GatedTransport {
    fn send_line(&self, line: &str) -> Result<(), TransportError> {
        let first = self.entered.lock().unwrap().take();
        if let Some(entered) = first {
            entered.send(()).unwrap();
            let mut open = self.gate.0.lock().unwrap();
            while !*open {
                open = self.gate.1.wait(open).unwrap();
            }
        }
        self.written.lock().unwrap().push(line.to_string());
        Ok(())
    }

    fn close(&self) {}
}

#[test]
fn concurrent_sends_reach_the_wire_in_queue_order() {
    let (entered_tx, entered_rx) = std_mpsc::channel();
    let transport = Arc::new(GatedTransport::new(entered_tx));
    let mux = Multiplexer::new(transport.clone());

    let verdicts = Arc::new(Mutex::new(Vec::new()));
    let tagged = |tag: &'static str| -> OnComplete {
        let sink = Arc::clone(&verdicts);
        Box::new(move |m: String| sink.lock().unwrap().push((tag, m)))
    };

    let first = {
        let mux = mux.clone();
        let cb = tagged("depth 1");
        thread::spawn(move || mux.send("go depth 1", Some(cb), None).unwrap())
    };
    entered_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let second = {
        let mux = mux.clone();
        let cb = tagged("depth 2");
        thread::spawn(move || mux.send("go depth 2", Some(cb), None).unwrap())
    };
    thread::sleep(Duration::from_millis(50));
    transport.open();
    first.join().unwrap();
    second.join().unwrap();

    assert_eq!(
        transport.written.lock().unwrap().as_slice(),
        ["go depth 1", "go depth 2"]
    );

    // The first verdict on the wire belongs to the first search written.
    mux.on_line("bestmove b2b4");
    assert_eq!(
        verdicts.lock().unwrap().as_slice(),
        [("depth 1", "bestmove b2b4".to_string())]
    );
}
