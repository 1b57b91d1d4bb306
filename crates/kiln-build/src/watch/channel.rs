//! Channel-fed change source.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{ChangeBatch, ChangeSource, FileChange, debounce};
use crate::Result;

/// A [`ChangeSource`] fed by a [`ChangeSender`].
///
/// Every change sent is considered relevant; the sender decides what to
/// forward. Bursts are still debounced.
#[derive(Debug)]
pub struct ChannelChangeSource {
    rx: mpsc::UnboundedReceiver<FileChange>,
    debounce: Duration,
    subscribed: Arc<Mutex<Vec<PathBuf>>>,
    closed: bool,
}

/// Sending half of a [`ChannelChangeSource`].
#[derive(Debug, Clone)]
pub struct ChangeSender {
    tx: mpsc::UnboundedSender<FileChange>,
    subscribed: Arc<Mutex<Vec<PathBuf>>>,
}

impl ChannelChangeSource {
    pub fn new(debounce: Duration) -> (Self, ChangeSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscribed = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                rx,
                debounce,
                subscribed: Arc::clone(&subscribed),
                closed: false,
            },
            ChangeSender { tx, subscribed },
        )
    }
}

impl ChangeSender {
    /// Forward a change. Returns `false` once the source has been closed.
    pub fn send(&self, change: FileChange) -> bool {
        self.tx.send(change).is_ok()
    }

    /// True once the source was closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Inputs passed to the most recent `subscribe` call.
    pub fn subscribed_inputs(&self) -> Vec<PathBuf> {
        self.subscribed.lock().clone()
    }
}

#[async_trait]
impl ChangeSource for ChannelChangeSource {
    fn subscribe(&mut self, inputs: &[PathBuf]) -> Result<()> {
        *self.subscribed.lock() = inputs.to_vec();
        Ok(())
    }

    async fn next_batch(&mut self) -> Option<ChangeBatch> {
        if self.closed {
            return None;
        }
        debounce(&mut self.rx, |_| true, self.debounce).await
    }

    fn close(&mut self) {
        self.closed = true;
        self.rx.close();
    }
}
