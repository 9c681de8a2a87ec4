use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

enum ViewData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// Read-only, reference-counted view of a whole file.
///
/// Clones share the same mapping, so the background index builder keeps
/// the bytes alive for as long as it runs, independent of the decoder.
#[derive(Clone)]
pub struct ByteView {
    data: Arc<ViewData>,
}

impl ByteView {
    /// Memory-map a file read-only
    pub fn map_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            // zero-length mappings are rejected on some platforms
            return Ok(Self::from_vec(Vec::new()));
        }
        // Safety: the mapping is never written through; truncation of the
        // file by another process while mapped is outside our control.
        let mmap = unsafe { Mmap::map(&file) }?;
        Ok(Self { data: Arc::new(ViewData::Mapped(mmap)) })
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { data: Arc::new(ViewData::Owned(bytes)) }
    }

    pub fn as_slice(&self) -> &[u8] {
        match self.data.as_ref() {
            ViewData::Mapped(mmap) => &mmap[..],
            ViewData::Owned(bytes) => bytes.as_slice(),
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.data.as_ref(), ViewData::Mapped(_))
    }

    /// Number of live handles to the underlying bytes
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }
}

impl Deref for ByteView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteView")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

/// Sequential byte source for network streams
pub trait StreamTransport: Read + Send {
    /// Drop the connection while paused
    fn disconnect(&mut self) {}

    /// Re-establish the connection after a pause
    fn reconnect(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Adapts any reader (socket, pipe, file) into a transport without
/// reconnection support
pub struct ReadTransport<R> {
    inner: R,
    connected: bool,
}

impl<R: Read + Send> ReadTransport<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, connected: true }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl<R: Read + Send> Read for ReadTransport<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "transport disconnected"));
        }
        self.inner.read(buf)
    }
}

impl<R: Read + Send> StreamTransport for ReadTransport<R> {
    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn reconnect(&mut self) -> io::Result<()> {
        self.connected = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_map_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[1, 2, 3, 4, 5]).unwrap();
        file.flush().unwrap();

        let view = ByteView::map_file(file.path()).unwrap();
        assert!(view.is_mapped());
        assert_eq!(view.len(), 5);
        assert_eq!(&view[1..3], &[2, 3]);
    }

    #[test]
    fn test_empty_file_maps_to_empty_view() {
        let file = NamedTempFile::new().unwrap();
        let view = ByteView::map_file(file.path()).unwrap();
        assert!(!view.is_mapped());
        assert!(view.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let result = ByteView::map_file("/nonexistent/path/track.mp3");
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_clones_share_bytes() {
        let view = ByteView::from_vec(vec![9; 16]);
        let other = view.clone();
        assert_eq!(view.handle_count(), 2);
        drop(view);
        assert_eq!(other.handle_count(), 1);
        assert_eq!(other.len(), 16);
    }

    #[test]
    fn test_read_transport_disconnect() {
        let mut transport = ReadTransport::new(Cursor::new(vec![1u8, 2, 3, 4]));
        let mut buf = [0u8; 2];
        assert_eq!(transport.read(&mut buf).unwrap(), 2);

        transport.disconnect();
        assert!(!transport.is_connected());
        assert_eq!(
            transport.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );

        transport.reconnect().unwrap();
        assert_eq!(transport.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [3, 4]);
    }
}
