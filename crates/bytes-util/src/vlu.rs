use std::io;

use crate::BitReader;

/// Variable-length unsigned integers as used by binary scene streams.
///
/// A `vluimsbf` value is a sequence of chunks. Each chunk starts with a
/// continuation bit followed by N value bits (4 for `vluimsbf5`, 7 for
/// `vluimsbf8`); chunks concatenate most significant first. Command lists in
/// binary scene payloads are length-prefixed with these, and the container
/// layer only needs to frame them, never to interpret what follows.
pub trait BitReaderVluExt {
    /// Reads a `vluimsbf5` (1 continuation bit + 4 value bits per chunk).
    fn read_vluimsbf5(&mut self) -> io::Result<u32>;

    /// Reads a `vluimsbf8` (1 continuation bit + 7 value bits per chunk).
    fn read_vluimsbf8(&mut self) -> io::Result<u32>;
}

impl BitReaderVluExt for BitReader<'_> {
    fn read_vluimsbf5(&mut self) -> io::Result<u32> {
        read_vlu(self, 4)
    }

    fn read_vluimsbf8(&mut self) -> io::Result<u32> {
        read_vlu(self, 7)
    }
}

fn read_vlu(reader: &mut BitReader<'_>, chunk_bits: u32) -> io::Result<u32> {
    let mut value = 0u64;
    loop {
        let more = reader.read_bit()?;
        value = (value << chunk_bits) | reader.read_bits(chunk_bits)?;
        if value > u32::MAX as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "vluimsbf value overflows 32 bits",
            ));
        }
        if !more {
            return Ok(value as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BitWriter;

    #[test]
    fn single_chunk() {
        // 0 (stop) + 0b1010
        let mut w = BitWriter::new();
        w.write_bits(0b0_1010, 5).unwrap();
        let data = w.finish();
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_vluimsbf5().unwrap(), 0b1010);
    }

    #[test]
    fn multi_chunk() {
        // vluimsbf8: 1|0000001 0|0000010 => (1 << 7) | 2 = 130
        let data = [0b1000_0001, 0b0000_0010];
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_vluimsbf8().unwrap(), 130);
    }

    #[test]
    fn truncated_chunk_errors() {
        let data = [0b1000_0001];
        let mut r = BitReader::new(&data);
        assert!(r.read_vluimsbf8().is_err());
    }
}
