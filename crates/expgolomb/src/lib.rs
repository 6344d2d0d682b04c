//! Exp-Golomb coding on top of the [`bytes_util`] bit reader and writer.
//!
//! H.264 parameter sets and slice headers encode most of their syntax
//! elements as unsigned (`ue(v)`) or signed (`se(v)`) Exp-Golomb numbers;
//! the MPEG-4 Visual VOL header uses them for a couple of fields as well.
//!
//! See: <https://en.wikipedia.org/wiki/Exponential-Golomb_coding>
#![deny(missing_docs)]
#![deny(unsafe_code)]

use std::io;

use bytes_util::{BitReader, BitWriter};

/// Reads Exp-Golomb encoded numbers from a [`BitReader`].
pub trait BitReaderExpGolombExt {
    /// Reads an unsigned Exp-Golomb number (`ue(v)`).
    fn read_exp_golomb(&mut self) -> io::Result<u64>;

    /// Reads a signed Exp-Golomb number (`se(v)`).
    fn read_signed_exp_golomb(&mut self) -> io::Result<i64> {
        let ue = self.read_exp_golomb()?;
        if ue % 2 == 0 {
            Ok(-((ue / 2) as i64))
        } else {
            Ok((ue / 2) as i64 + 1)
        }
    }
}

impl BitReaderExpGolombExt for BitReader<'_> {
    fn read_exp_golomb(&mut self) -> io::Result<u64> {
        let mut leading_zeros = 0u32;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 63 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "exp-golomb prefix longer than 63 bits",
                ));
            }
        }
        let mut value = 1u64;
        for _ in 0..leading_zeros {
            value = (value << 1) | self.read_bit()? as u64;
        }
        Ok(value - 1)
    }
}

/// Writes Exp-Golomb encoded numbers to a [`BitWriter`].
pub trait BitWriterExpGolombExt {
    /// Writes an unsigned Exp-Golomb number (`ue(v)`).
    fn write_exp_golomb(&mut self, value: u64) -> io::Result<()>;

    /// Writes a signed Exp-Golomb number (`se(v)`).
    fn write_signed_exp_golomb(&mut self, value: i64) -> io::Result<()> {
        let ue = if value <= 0 {
            (-value) as u64 * 2
        } else {
            value as u64 * 2 - 1
        };
        self.write_exp_golomb(ue)
    }
}

impl BitWriterExpGolombExt for BitWriter {
    fn write_exp_golomb(&mut self, value: u64) -> io::Result<()> {
        let coded = value + 1;
        let width = 64 - coded.leading_zeros();
        for _ in 0..width - 1 {
            self.write_bit(false);
        }
        self.write_bits(coded, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(values: &[u64]) -> Vec<u8> {
        let mut w = BitWriter::new();
        for &v in values {
            w.write_exp_golomb(v).unwrap();
        }
        w.finish()
    }

    #[test]
    fn known_codewords() {
        // 0 => 1, 1 => 010, 2 => 011, 3 => 00100
        let data = encode(&[0, 1, 2, 3]);
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(1).unwrap(), 0b1);
        assert_eq!(r.read_bits(3).unwrap(), 0b010);
        assert_eq!(r.read_bits(3).unwrap(), 0b011);
        assert_eq!(r.read_bits(5).unwrap(), 0b00100);
    }

    #[test]
    fn unsigned_round_trip() {
        let values = [0u64, 1, 2, 3, 7, 8, 254, 255, 1023, u32::MAX as u64];
        let data = encode(&values);
        let mut r = BitReader::new(&data);
        for &v in &values {
            assert_eq!(r.read_exp_golomb().unwrap(), v);
        }
    }

    #[test]
    fn signed_round_trip() {
        let values = [0i64, 1, -1, 2, -2, 63, -63, 1000, -1000];
        let mut w = BitWriter::new();
        for &v in &values {
            w.write_signed_exp_golomb(v).unwrap();
        }
        let data = w.finish();
        let mut r = BitReader::new(&data);
        for &v in &values {
            assert_eq!(r.read_signed_exp_golomb().unwrap(), v);
        }
    }

    #[test]
    fn all_zero_prefix_errors() {
        let data = [0u8; 16];
        let mut r = BitReader::new(&data);
        assert!(r.read_exp_golomb().is_err());
    }
}
