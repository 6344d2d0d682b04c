use std::fs::File;
use std::io::{self, BufReader, Read, Seek};

/// Byte source owned by an importer.
///
/// Everything is pull-based: importers read and seek as they parse. `size`
/// returns `None` for sources of unknown length (the MPEG-2 PS prober then
/// falls back to forward scanning only).
pub trait Source: Read + Seek {
    /// Total size in bytes, when known.
    fn size(&mut self) -> Option<u64>;

    /// Reads the entire source into memory from the current position.
    fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Source for File {
    fn size(&mut self) -> Option<u64> {
        self.metadata().ok().map(|m| m.len())
    }
}

impl Source for BufReader<File> {
    fn size(&mut self) -> Option<u64> {
        self.get_ref().metadata().ok().map(|m| m.len())
    }
}

impl<T: AsRef<[u8]>> Source for io::Cursor<T> {
    fn size(&mut self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}
