//! Commands awaiting their reply, and how reply lines find them.

use std::fmt;
use std::sync::Arc;

use uci::{CommandKind, ReplyKind};

/// Invoked once with the accumulated reply when a command completes.
pub type OnComplete = Box<dyn FnOnce(String) + Send>;
/// Invoked with every reply line attributed to a command.
pub type OnStream = Arc<dyn Fn(&str) + Send + Sync>;

/// Trailer of the `d` dump that is cut from the final message.
const KEY_TRAILER: &str = "Key is";

/// Pick the queue index a reply line belongs to.
///
/// The oldest entry whose command category claims the line wins; if none
/// does, the head of the queue takes it. Same-category commands are assumed
/// not to overlap, so FIFO order resolves any ambiguity.
pub fn route<I>(reply: ReplyKind, queued: I) -> usize
where
    I: IntoIterator<Item = CommandKind>,
{
    queued
        .into_iter()
        .position(|kind| reply.matches(kind))
        .unwrap_or(0)
}

/// What a terminal line did besides completing its command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Terminal {
    /// `uciok`
    HandshakeOk,
    /// `readyok`
    ReadyOk,
    /// Any other terminal line.
    Finished,
}

/// One in-flight command that expects a reply.
pub struct PendingCommand {
    pub(crate) id: u64,
    command: String,
    kind: CommandKind,
    on_complete: Option<OnComplete>,
    on_stream: Option<OnStream>,
    message: String,
    discarded: bool,
}

impl PendingCommand {
    pub(crate) fn new(
        id: u64,
        command: &str,
        on_complete: Option<OnComplete>,
        on_stream: Option<OnStream>,
    ) -> Self {
        Self {
            id,
            command: command.to_string(),
            kind: CommandKind::of(command),
            on_complete,
            on_stream,
            message: String::new(),
            discarded: false,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Reply lines gathered so far, joined by `\n`.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    pub(crate) fn stream(&self) -> Option<OnStream> {
        self.on_stream.clone()
    }

    /// Mark as cancelled and hand back the completion so it never runs.
    pub(crate) fn discard(&mut self) -> Option<OnComplete> {
        self.discarded = true;
        self.on_complete.take()
    }

    /// The completion and final message, unless discarded.
    pub(crate) fn into_completion(self) -> Option<(OnComplete, String)> {
        if self.discarded {
            return None;
        }
        let message = self.message;
        self.on_complete.map(|cb| (cb, message))
    }

    /// Append a reply line and decide whether it ends the command.
    pub(crate) fn absorb(&mut self, line: &str) -> Option<Terminal> {
        if !self.message.is_empty() {
            self.message.push('\n');
        }
        self.message.push_str(line);

        if line == "uciok" {
            return Some(Terminal::HandshakeOk);
        }
        if line == "readyok" {
            return Some(Terminal::ReadyOk);
        }
        if line.starts_with("bestmove") && self.kind != CommandKind::Benchmark {
            // Only the verdict survives; the streamed info lines were for live updates.
            self.message = line.to_string();
            return Some(Terminal::Finished);
        }

        let done = match self.kind {
            CommandKind::Inspect => {
                let done = line.starts_with("Legal uci moves") || line.starts_with(KEY_TRAILER);
                if line == KEY_TRAILER {
                    self.trim_key_trailer();
                }
                done
            }
            CommandKind::EvalDump => ends_eval_block(&self.message),
            _ => {
                line.starts_with("pawn key")
                    || line.starts_with("Nodes/second")
                    || line.starts_with("Unknown command")
            }
        };
        done.then_some(Terminal::Finished)
    }

    fn trim_key_trailer(&mut self) {
        let keep = self
            .message
            .strip_suffix(KEY_TRAILER)
            .map(|rest| rest.strip_suffix('\n').unwrap_or(rest).len())
            .unwrap_or(self.message.len());
        self.message.truncate(keep);
    }
}

/// The eval table is over once its last line is the total (older engines)
/// or final (newer engines) evaluation.
fn ends_eval_block(message: &str) -> bool {
    let last = message.rsplit('\n').next().unwrap_or(message);
    last.starts_with("Total Evaluation") || last.starts_with("Final evaluation")
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("discarded", &self.discarded)
            .field("has_completion", &self.on_complete.is_some())
            .field("has_stream", &self.on_stream.is_some())
            .finish()
    }
}
