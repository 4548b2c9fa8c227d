//! Scripted GIF workers for exercising the session's worker failure paths

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::gif::{encode_loop, GifWorker, HostMessage, WorkerFactory, WorkerMessage};

/// Worker that acknowledges `Start` and panics with `message` on the first frame
pub fn crashing_gif_worker(message: &'static str) -> WorkerFactory {
    Arc::new(move || {
        GifWorker::spawn_with(move |rx, tx| {
            for host_message in rx {
                match host_message {
                    HostMessage::Start { .. } => {
                        let _ = tx.send(WorkerMessage::Started);
                    }
                    _ => panic!("{}", message),
                }
            }
        })
    })
}

/// Worker that holds before reading any message until released, then encodes
/// normally. Lets a test act while an export sits in `Processing`.
pub struct GatedGifWorker {
    started_tx: Sender<()>,
    started_rx: Receiver<()>,
    release_tx: Sender<()>,
    release_rx: Receiver<()>,
}

impl GatedGifWorker {
    pub fn new() -> Self {
        let (started_tx, started_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        Self {
            started_tx,
            started_rx,
            release_tx,
            release_rx,
        }
    }

    pub fn factory(&self) -> WorkerFactory {
        let started = self.started_tx.clone();
        let release = self.release_rx.clone();
        Arc::new(move || {
            let started = started.clone();
            let release = release.clone();
            GifWorker::spawn_with(move |rx, tx| {
                let _ = started.send(());
                // a dropped gate releases too
                let _ = release.recv();
                encode_loop(rx, tx);
            })
        })
    }

    /// Wait for a worker to be spawned.
    pub fn wait_until_started(&self, timeout: Duration) -> bool {
        self.started_rx.recv_timeout(timeout).is_ok()
    }

    pub fn release(&self) {
        let _ = self.release_tx.send(());
    }
}

impl Default for GatedGifWorker {
    fn default() -> Self {
        Self::new()
    }
}
