//! stream/io.rs
//! In-memory sink whose contents stay readable after the engine takes it.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// `Write` into an `Arc<Mutex<Vec<u8>>>`.
#[derive(Debug, Clone, Default)]
pub struct SharedBufferWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl SharedBufferWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> Arc<Mutex<Vec<u8>>> {
        self.buf.clone()
    }

    /// Copy of everything written so far.
    pub fn contents(&self) -> io::Result<Vec<u8>> {
        let guard = self.buf.lock().map_err(|_| poisoned())?;
        Ok(guard.clone())
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "shared output buffer poisoned")
}

impl Write for SharedBufferWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut guard = self.buf.lock().map_err(|_| poisoned())?;
        guard.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_handle_sees_writes() {
        let mut w = SharedBufferWriter::new();
        let buf = w.buffer();
        w.write_all(b"hello").unwrap();
        assert_eq!(&*buf.lock().unwrap(), b"hello");
    }

    #[test]
    fn clones_share_one_buffer() {
        let mut a = SharedBufferWriter::new();
        let b = a.clone();
        a.write_all(b"xy").unwrap();
        assert_eq!(b.contents().unwrap(), b"xy");
    }
}
