//! Append-only byte buffer shared by the encoders

use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

/// Append-only output buffer.
///
/// Clones share the same underlying storage, so a sink can be handed to a
/// muxer that takes ownership of its writer while the caller keeps a handle
/// to collect the bytes afterwards.
#[derive(Debug, Clone, Default)]
pub struct ByteSink {
    buf: Arc<Mutex<BytesMut>>,
}

impl ByteSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Arc::new(Mutex::new(BytesMut::with_capacity(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BytesMut> {
        // Appends cannot leave the buffer half-updated, so a poisoned lock is still usable.
        self.buf.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write_byte(&self, value: u8) {
        self.lock().put_u8(value);
    }

    pub fn write_bytes(&self, data: &[u8]) {
        self.lock().put_slice(data);
    }

    /// Little-endian 16-bit value, as GIF stores all its integers
    pub fn write_u16_le(&self, value: u16) {
        self.lock().put_u16_le(value);
    }

    pub fn write_str(&self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of everything written so far
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock().to_vec()
    }

    /// Take the accumulated bytes, leaving the sink empty
    pub fn take(&self) -> Bytes {
        self.lock().split().freeze()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl io::Write for ByteSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write_bytes(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
