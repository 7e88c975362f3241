//! Obtain the elevation password from the UI thread while on a worker.
//!
//! The worker posts a [`UiEvent::SecretRequested`] carrying a [`SecretReply`]
//! and blocks until the UI thread answers. The reply is a one-shot channel
//! with room for exactly one value:
//! - answering consumes the [`SecretReply`], so it cannot be answered twice;
//! - the value is buffered, so an answer given before the worker starts
//!   waiting is not lost;
//! - a reply dropped without answer wakes the worker with `None`.
use crate::dispatch::{Dispatcher, UiEvent};
use crate::secret::Secret;
use std::fmt;
use std::sync::mpsc::{self, Receiver, SyncSender};
use tracing::debug;

/// UI side of a password request.
pub struct SecretReply {
    tx: SyncSender<Option<Secret>>,
}

impl SecretReply {
    /// Create a reply and the receiver the worker waits on.
    pub fn pair() -> (SecretReply, Receiver<Option<Secret>>) {
        let (tx, rx) = mpsc::sync_channel(1);
        (SecretReply { tx }, rx)
    }

    /// Answer the request; `None` means the user cancelled.
    pub fn send(self, secret: Option<Secret>) {
        if self.tx.send(secret).is_err() {
            debug!("Password request abandoned by its worker");
        }
    }
}

impl fmt::Debug for SecretReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretReply")
    }
}

/// Worker side of the rendezvous.
#[derive(Debug, Clone)]
pub struct ElevationBroker {
    dispatcher: Dispatcher,
}

impl ElevationBroker {
    #[allow(missing_docs)]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Ask the UI thread for the password and wait for the answer.
    ///
    /// Must not be called from the UI thread itself, which would wait for an
    /// answer only it can give.
    pub fn obtain_secret(&self) -> Option<Secret> {
        let (reply, rx) = SecretReply::pair();
        self.dispatcher.post(UiEvent::SecretRequested(reply));
        match rx.recv() {
            Ok(secret) => secret,
            Err(_) => {
                debug!("Password request dropped without answer");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use std::thread;

    fn answer_with(value: Option<&'static str>) -> Option<Secret> {
        let (dispatcher, queue) = dispatch::channel();
        let broker = ElevationBroker::new(dispatcher);
        let worker = thread::spawn(move || broker.obtain_secret());
        match queue.recv().unwrap() {
            UiEvent::SecretRequested(reply) => reply.send(value.map(|v| Secret::new(v.into()))),
            other => panic!("unexpected event {:?}", other),
        }
        worker.join().unwrap()
    }

    #[test]
    fn worker_receives_entered_password() {
        let secret = answer_with(Some("hunter2")).expect("a secret");
        assert_eq!(secret.expose(), b"hunter2");
    }

    #[test]
    fn worker_receives_none_on_cancel() {
        assert!(answer_with(None).is_none());
    }

    #[test]
    fn dropped_reply_wakes_worker() {
        let (dispatcher, queue) = dispatch::channel();
        let broker = ElevationBroker::new(dispatcher);
        let worker = thread::spawn(move || broker.obtain_secret());
        drop(queue.recv().unwrap());
        assert!(worker.join().unwrap().is_none());
    }

    #[test]
    fn closed_ui_means_cancelled() {
        let (dispatcher, queue) = dispatch::channel();
        drop(queue);
        assert!(ElevationBroker::new(dispatcher).obtain_secret().is_none());
    }

    #[test]
    fn answer_before_wait_is_kept() {
        let (reply, rx) = SecretReply::pair();
        reply.send(Some(Secret::new("early".into())));
        assert_eq!(rx.recv().unwrap().unwrap().expose(), b"early");
    }
}
