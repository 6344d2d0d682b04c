use std::io;

use bytes::Bytes;

/// Zero-copy extraction helpers for an [`io::Cursor`] over [`Bytes`].
///
/// Slicing a `Bytes` only bumps reference counts, so pulling a length-prefixed
/// payload (an SPS entry of a decoder config record, a PES payload) out of a
/// cursor never copies the data.
pub trait BytesCursorExt {
    /// Extracts `size` bytes and advances the cursor.
    ///
    /// Errors with `UnexpectedEof` when fewer than `size` bytes remain.
    fn extract_bytes(&mut self, size: usize) -> io::Result<Bytes>;

    /// Extracts everything left in the cursor.
    fn extract_remaining(&mut self) -> Bytes;
}

impl BytesCursorExt for io::Cursor<Bytes> {
    fn extract_bytes(&mut self, size: usize) -> io::Result<Bytes> {
        let pos = self.position() as usize;
        let len = self.get_ref().len();
        if size > len.saturating_sub(pos) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "not enough bytes",
            ));
        }
        let slice = self.get_ref().slice(pos..pos + size);
        self.set_position((pos + size) as u64);
        Ok(slice)
    }

    fn extract_remaining(&mut self) -> Bytes {
        let pos = (self.position() as usize).min(self.get_ref().len());
        let slice = self.get_ref().slice(pos..);
        self.set_position(self.get_ref().len() as u64);
        slice
    }
}
