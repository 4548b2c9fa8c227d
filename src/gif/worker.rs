//! Background GIF encoding thread
//!
//! The host and the worker share nothing: the host sends [`HostMessage`]s
//! (frame buffers are moved, not copied) and reads back [`WorkerMessage`]s.
//! A worker that panics or hangs up is torn down and never reused.

use bytes::Bytes;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;

use super::encoder::{GifEncoder, GifOptions};
use crate::errors::ExportError;
use crate::types::{LoopCount, Quality};

/// Frames that may be queued for the worker before the host blocks
const FRAME_QUEUE_DEPTH: usize = 2;

/// Host → worker
#[derive(Debug)]
pub enum HostMessage {
    Start {
        width: u16,
        height: u16,
        /// Frame delay in centiseconds
        delay: u16,
        quality: Quality,
        sample_factor: u32,
        repeat: LoopCount,
    },
    Frame {
        data: Vec<u8>,
        index: usize,
        total: usize,
    },
    Finish,
}

/// Worker → host
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    Started,
    Progress { current: usize, total: usize },
    Finished { data: Bytes },
    Error { message: String },
}

pub struct GifWorker {
    tx: Option<Sender<HostMessage>>,
    rx: Receiver<WorkerMessage>,
    handle: Option<JoinHandle<()>>,
}

impl GifWorker {
    pub fn spawn() -> Result<Self, ExportError> {
        Self::spawn_with(encode_loop)
    }

    /// Run `body` as the worker thread. It owns its ends of both channels;
    /// [`encode_loop`] is the real encoder.
    pub fn spawn_with<F>(body: F) -> Result<Self, ExportError>
    where
        F: FnOnce(Receiver<HostMessage>, Sender<WorkerMessage>) + Send + 'static,
    {
        let (host_tx, worker_rx) = bounded(FRAME_QUEUE_DEPTH);
        let (worker_tx, host_rx) = unbounded();

        let handle = std::thread::Builder::new()
            .name("reelcap-gif-worker".to_string())
            .spawn(move || body(worker_rx, worker_tx))
            .map_err(|e| ExportError::WorkerFailure(format!("spawn failed: {e}")))?;

        log::debug!("GIF worker spawned");
        Ok(Self {
            tx: Some(host_tx),
            rx: host_rx,
            handle: Some(handle),
        })
    }

    pub fn send(&mut self, message: HostMessage) -> Result<(), ExportError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ExportError::WorkerFailure("worker already shut down".to_string()))?;
        if tx.send(message).is_err() {
            return Err(self.failure("worker hung up"));
        }
        Ok(())
    }

    /// Block until the worker says something.
    pub fn recv(&mut self) -> Result<WorkerMessage, ExportError> {
        match self.rx.recv() {
            Ok(WorkerMessage::Error { message }) => Err(self.reported(message)),
            Ok(message) => Ok(message),
            Err(_) => Err(self.failure("worker exited without finishing")),
        }
    }

    pub fn try_recv(&mut self) -> Result<Option<WorkerMessage>, ExportError> {
        match self.rx.try_recv() {
            Ok(WorkerMessage::Error { message }) => Err(self.reported(message)),
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.failure("worker exited without finishing")),
        }
    }

    /// Close the channel and wait for the thread to exit.
    pub fn terminate(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) -> Option<String> {
        self.tx = None;
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(()) => None,
            Err(payload) => Some(panic_message(payload)),
        }
    }

    /// The worker reported an error and exited; reap it.
    fn reported(&mut self, message: String) -> ExportError {
        self.shutdown();
        log::error!("GIF worker reported: {}", message);
        ExportError::WorkerFailure(message)
    }

    /// Tear the worker down and describe why it failed.
    fn failure(&mut self, context: &str) -> ExportError {
        let message = match self.shutdown() {
            Some(panic) => format!("{context}: {panic}"),
            None => context.to_string(),
        };
        log::error!("GIF worker failed: {}", message);
        ExportError::WorkerFailure(message)
    }
}

impl Drop for GifWorker {
    fn drop(&mut self) {
        if let Some(panic) = self.shutdown() {
            log::warn!("GIF worker panicked during shutdown: {}", panic);
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Serve one export: `Start`, any number of `Frame`s, then `Finish`.
pub fn encode_loop(rx: Receiver<HostMessage>, tx: Sender<WorkerMessage>) {
    let mut encoder: Option<GifEncoder> = None;

    for message in rx {
        match message {
            HostMessage::Start {
                width,
                height,
                delay,
                quality,
                sample_factor,
                repeat,
            } => {
                let options = GifOptions {
                    width,
                    height,
                    delay_cs: delay,
                    palette_size: quality.params().palette_size,
                    sample_factor,
                    repeat,
                };
                match GifEncoder::new(options) {
                    Ok(enc) => {
                        encoder = Some(enc);
                        let _ = tx.send(WorkerMessage::Started);
                    }
                    Err(e) => {
                        let _ = tx.send(WorkerMessage::Error {
                            message: e.to_string(),
                        });
                        return;
                    }
                }
            }
            HostMessage::Frame { data, index, total } => {
                let Some(enc) = encoder.as_mut() else {
                    let _ = tx.send(WorkerMessage::Error {
                        message: "frame received before start".to_string(),
                    });
                    return;
                };
                if let Err(e) = enc.add_frame(&data) {
                    let _ = tx.send(WorkerMessage::Error {
                        message: e.to_string(),
                    });
                    return;
                }
                drop(data);
                let _ = tx.send(WorkerMessage::Progress {
                    current: index + 1,
                    total,
                });
            }
            HostMessage::Finish => {
                let message = match encoder.take() {
                    Some(enc) => WorkerMessage::Finished { data: enc.finish() },
                    None => WorkerMessage::Error {
                        message: "finish received before start".to_string(),
                    },
                };
                let _ = tx.send(message);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(width: u16, height: u16) -> HostMessage {
        HostMessage::Start {
            width,
            height,
            delay: 3,
            quality: Quality::Low,
            sample_factor: 10,
            repeat: LoopCount::Infinite,
        }
    }

    #[test]
    fn test_full_protocol() {
        let mut worker = GifWorker::spawn().unwrap();
        worker.send(start(4, 4)).unwrap();
        assert!(matches!(worker.recv().unwrap(), WorkerMessage::Started));

        for index in 0..3 {
            let data = vec![(index * 60) as u8; 4 * 4 * 4];
            worker
                .send(HostMessage::Frame {
                    data,
                    index,
                    total: 3,
                })
                .unwrap();
            match worker.recv().unwrap() {
                WorkerMessage::Progress { current, total } => {
                    assert_eq!(current, index + 1);
                    assert_eq!(total, 3);
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        worker.send(HostMessage::Finish).unwrap();
        match worker.recv().unwrap() {
            WorkerMessage::Finished { data } => {
                assert_eq!(&data[..6], b"GIF89a");
                assert_eq!(*data.last().unwrap(), 0x3B);
            }
            other => panic!("unexpected {:?}", other),
        }
        worker.terminate();
    }

    #[test]
    fn test_frame_before_start_is_an_error() {
        let mut worker = GifWorker::spawn().unwrap();
        worker
            .send(HostMessage::Frame {
                data: vec![0; 16],
                index: 0,
                total: 1,
            })
            .unwrap();
        let err = worker.recv().unwrap_err();
        assert!(matches!(err, ExportError::WorkerFailure(_)));
    }

    #[test]
    fn test_panicking_worker_is_a_worker_failure() {
        let mut worker = GifWorker::spawn_with(|rx, tx| {
            for message in rx {
                match message {
                    HostMessage::Start { .. } => {
                        let _ = tx.send(WorkerMessage::Started);
                    }
                    _ => panic!("quantizer blew up"),
                }
            }
        })
        .unwrap();
        worker.send(start(4, 4)).unwrap();
        assert!(matches!(worker.recv().unwrap(), WorkerMessage::Started));

        // the send may race the panic; whichever call notices reaps the thread
        let err = match worker.send(HostMessage::Frame {
            data: vec![0; 64],
            index: 0,
            total: 1,
        }) {
            Err(err) => err,
            Ok(()) => worker.recv().unwrap_err(),
        };
        match err {
            ExportError::WorkerFailure(message) => {
                assert!(message.contains("quantizer blew up"), "{message}")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(worker.send(HostMessage::Finish).is_err());
    }

    #[test]
    fn test_bad_frame_size_fails_worker() {
        let mut worker = GifWorker::spawn().unwrap();
        worker.send(start(4, 4)).unwrap();
        worker.recv().unwrap();
        worker
            .send(HostMessage::Frame {
                data: vec![0; 3],
                index: 0,
                total: 1,
            })
            .unwrap();
        assert!(worker.recv().is_err());
        // the thread is gone; later sends fail instead of hanging
        assert!(worker.send(HostMessage::Finish).is_err());
    }
}
