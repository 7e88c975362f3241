//! Dispatch queue between background workers and the UI thread.
//!
//! Workers never touch UI state: everything they want shown is posted as a
//! [`UiEvent`] on a [`Dispatcher`], and the single UI thread consumes the
//! matching [`DispatchQueue`] in order. Events posted by one worker are
//! received in the order they were posted; nothing is guaranteed across
//! workers.
use crate::elevation::SecretReply;
use crate::request::{Completion, Tag};
use std::sync::mpsc::{self, Receiver, RecvError, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::debug;

/// Everything a worker may ask the UI thread to do.
#[derive(Debug)]
pub enum UiEvent {
    /// Replace the status line.
    Status(String),
    /// Append a message to the application console.
    Console(String),
    /// One chunk of output belonging to the request tagged `tag`.
    Output {
        /// originating request
        tag: Tag,
        /// the text, usually one line including its terminator
        text: String,
    },
    /// Enter or leave the busy state.
    Busy(bool),
    /// Show a blocking error message.
    Alert {
        /// dialog title
        title: String,
        /// dialog body
        message: String,
    },
    /// Ask the user for the elevation password and answer through the reply.
    SecretRequested(SecretReply),
    /// A request finished.
    Completed(Completion),
}

/// Sending half of the dispatch queue. Cheap to clone, one per worker.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: Sender<UiEvent>,
}

/// Receiving half of the dispatch queue, owned by the UI thread.
#[derive(Debug)]
pub struct DispatchQueue {
    rx: Receiver<UiEvent>,
}

/// Create a connected [`Dispatcher`] / [`DispatchQueue`] pair.
pub fn channel() -> (Dispatcher, DispatchQueue) {
    let (tx, rx) = mpsc::channel();
    (Dispatcher { tx }, DispatchQueue { rx })
}

impl Dispatcher {
    /// Post `event` to the UI thread.
    ///
    /// Once the UI thread is gone there is nobody left to inform, so the
    /// event is dropped.
    pub fn post(&self, event: UiEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("UI thread is gone, dropping {:?}", e.0);
        }
    }

    /// Post a status line.
    pub fn status(&self, text: impl Into<String>) {
        self.post(UiEvent::Status(text.into()));
    }

    /// Post a console message.
    pub fn console(&self, text: impl Into<String>) {
        self.post(UiEvent::Console(text.into()));
    }
}

impl DispatchQueue {
    /// Block until the next event.
    pub fn recv(&self) -> Result<UiEvent, RecvError> {
        self.rx.recv()
    }

    /// Block for at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<UiEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Events already queued, without blocking.
    pub fn try_iter(&self) -> impl Iterator<Item = UiEvent> + '_ {
        self.rx.try_iter()
    }
}

/// Where the executor sends each line as it is read.
///
/// Either discards lines, or posts them as [`UiEvent::Output`] tagged with
/// the request they belong to.
#[derive(Debug, Clone, Default)]
pub struct LineSink {
    target: Option<(Dispatcher, Tag)>,
}

impl LineSink {
    /// Sink dropping every line.
    pub fn discard() -> Self {
        Self { target: None }
    }

    /// Sink forwarding lines to the UI thread.
    pub fn forward(dispatcher: Dispatcher, tag: Tag) -> Self {
        Self {
            target: Some((dispatcher, tag)),
        }
    }

    /// Hand `text` to the sink.
    pub fn line(&self, text: &str) {
        if let Some((dispatcher, tag)) = &self.target {
            dispatcher.post(UiEvent::Output {
                tag: tag.clone(),
                text: text.to_owned(),
            });
        }
    }

    /// `true` when lines reach the UI.
    pub fn is_forwarding(&self) -> bool {
        self.target.is_some()
    }
}
