use std::io::{self, Cursor, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;
use tracing::warn;

const QCELP_GUID_1: [u8; 16] = [
    0x41, 0x6D, 0x7F, 0x5E, 0x15, 0xB1, 0xD0, 0x11, 0xBA, 0x91, 0x00, 0x80, 0x5F, 0xB4, 0xB9, 0x7E,
];
const QCELP_GUID_2: [u8; 16] = [
    0x42, 0x6D, 0x7F, 0x5E, 0x15, 0xB1, 0xD0, 0x11, 0xBA, 0x91, 0x00, 0x80, 0x5F, 0xB4, 0xB9, 0x7E,
];
const EVRC_GUID: [u8; 16] = [
    0x8D, 0xD4, 0x89, 0xE6, 0x76, 0x90, 0xB5, 0x46, 0x91, 0xEF, 0x73, 0x6A, 0x51, 0x00, 0xCE, 0xB4,
];
const SMV_GUID: [u8; 16] = [
    0x75, 0x2B, 0x7C, 0x8D, 0x97, 0xA7, 0x46, 0xED, 0x98, 0x5E, 0xD5, 0x3C, 0x8C, 0xC7, 0x5F, 0x84,
];

/// Errors raised while reading a QCP file.
#[derive(Error, Debug)]
pub enum QcpError {
    /// Missing or malformed RIFF/QLCM framing or a mandatory chunk.
    #[error("broken QCP file: {0}")]
    Broken(&'static str),
    /// The codec GUID is none of QCELP, EVRC, SMV.
    #[error("unknown QCP codec GUID")]
    UnknownCodec,
    /// Truncated data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Codec identified by the 16-byte GUID of the `fmt` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QcpCodec {
    /// QCELP-13K (both GUID variants).
    Qcelp,
    /// EVRC.
    Evrc,
    /// SMV.
    Smv,
}

impl QcpCodec {
    /// Display name used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            QcpCodec::Qcelp => "QCELP-13K",
            QcpCodec::Evrc => "EVRC",
            QcpCodec::Smv => "SMV",
        }
    }
}

/// One frame located in the `data` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QcpFrame {
    /// Absolute byte offset of the frame (rate byte included when present).
    pub offset: u64,
    /// Total frame length in bytes, rate byte included when present.
    pub size: usize,
}

/// A parsed QCP file: codec identity, the raw `fmt` chunk kept as decoder
/// configuration, the variable-rate table and the located frames.
#[derive(Debug, Clone)]
pub struct QcpFile {
    /// Codec identified by GUID.
    pub codec: QcpCodec,
    /// The 162-byte `fmt` chunk payload, kept verbatim.
    pub fmt_chunk: Vec<u8>,
    /// Fixed packet size for constant-rate files.
    pub pck_size: u16,
    /// PCM samples per frame.
    pub block_size: u16,
    /// Sampling rate in Hz.
    pub sample_rate: u16,
    /// Bits per PCM sample.
    pub bits_per_sample: u16,
    /// Average bitrate in bits per second.
    pub avg_bps: u16,
    /// (frame size, rate index) pairs of the variable-rate table.
    pub rate_table: Vec<(u8, u8)>,
    /// Variable-rate flag of the `vrat` chunk.
    pub variable_rate: bool,
    /// Declared packet count of the `vrat` chunk.
    pub size_in_packets: u32,
    /// Frames of the `data` chunk, in order.
    pub frames: Vec<QcpFrame>,
}

fn read_fourcc(cursor: &mut Cursor<&[u8]>) -> io::Result<[u8; 4]> {
    let mut tag = [0u8; 4];
    cursor.read_exact(&mut tag)?;
    Ok(tag)
}

impl QcpFile {
    /// Parses a full QCP file image.
    pub fn parse(data: &[u8]) -> Result<QcpFile, QcpError> {
        let mut cursor = Cursor::new(data);
        if &read_fourcc(&mut cursor)? != b"RIFF" {
            return Err(QcpError::Broken("RIFF header not found"));
        }
        let riff_size = cursor.read_u32::<LittleEndian>()? as u64;
        if riff_size + 8 != data.len() as u64 {
            return Err(QcpError::Broken("RIFF size does not match file size"));
        }
        if &read_fourcc(&mut cursor)? != b"QLCM" {
            return Err(QcpError::Broken("QLCM header not found"));
        }

        // fmt chunk must come first
        if &read_fourcc(&mut cursor)? != b"fmt " {
            return Err(QcpError::Broken("fmt chunk not found"));
        }
        let chunk_size = cursor.read_u32::<LittleEndian>()? as usize;
        let has_pad = chunk_size % 2 == 1;
        let fmt_start = cursor.position() as usize;
        if fmt_start + chunk_size > data.len() || chunk_size < 150 {
            return Err(QcpError::Broken("fmt chunk truncated"));
        }
        let fmt_chunk = data[fmt_start..fmt_start + chunk_size].to_vec();

        cursor.seek(SeekFrom::Current(2))?; // major/minor version
        let mut guid = [0u8; 16];
        cursor.read_exact(&mut guid)?;
        cursor.read_u16::<LittleEndian>()?; // codec version
        cursor.seek(SeekFrom::Current(80))?; // codec name
        let avg_bps = cursor.read_u16::<LittleEndian>()?;
        let pck_size = cursor.read_u16::<LittleEndian>()?;
        let block_size = cursor.read_u16::<LittleEndian>()?;
        let sample_rate = cursor.read_u16::<LittleEndian>()?;
        let bits_per_sample = cursor.read_u16::<LittleEndian>()?;
        let rtable_cnt = cursor.read_u32::<LittleEndian>()? as usize;
        let mut rate_table = Vec::new();
        for _ in 0..8 {
            let size = cursor.read_u8()?;
            let idx = cursor.read_u8()?;
            rate_table.push((size, idx));
        }
        rate_table.truncate(rtable_cnt.min(8));
        cursor.set_position((fmt_start + chunk_size) as u64);
        if has_pad {
            cursor.seek(SeekFrom::Current(1))?;
        }

        let codec = if guid == QCELP_GUID_1 || guid == QCELP_GUID_2 {
            QcpCodec::Qcelp
        } else if guid == EVRC_GUID {
            QcpCodec::Evrc
        } else if guid == SMV_GUID {
            QcpCodec::Smv
        } else {
            return Err(QcpError::UnknownCodec);
        };

        // vrat chunk follows
        if &read_fourcc(&mut cursor)? != b"vrat" {
            return Err(QcpError::Broken("vrat chunk not found"));
        }
        let chunk_size = cursor.read_u32::<LittleEndian>()? as u64;
        let has_pad = chunk_size % 2 == 1;
        let variable_rate = cursor.read_u32::<LittleEndian>()? != 0;
        let size_in_packets = cursor.read_u32::<LittleEndian>()?;
        cursor.seek(SeekFrom::Current(chunk_size as i64 - 8))?;
        if has_pad {
            cursor.seek(SeekFrom::Current(1))?;
        }

        let mut file = QcpFile {
            codec,
            fmt_chunk,
            pck_size,
            block_size,
            sample_rate,
            bits_per_sample,
            avg_bps,
            rate_table,
            variable_rate,
            size_in_packets,
            frames: Vec::new(),
        };

        // walk the remaining chunks, splitting the data chunk into frames
        while (cursor.position() as usize) + 8 <= data.len() {
            let tag = read_fourcc(&mut cursor)?;
            let mut chunk_size = cursor.read_u32::<LittleEndian>()? as u64;
            let has_pad = chunk_size % 2 == 1;
            if &tag == b"data" {
                file.split_data_chunk(&mut cursor, &mut chunk_size, data.len() as u64)?;
            }
            cursor.seek(SeekFrom::Current(chunk_size as i64))?;
            if has_pad {
                cursor.seek(SeekFrom::Current(1))?;
            }
        }
        Ok(file)
    }

    fn split_data_chunk(
        &mut self,
        cursor: &mut Cursor<&[u8]>,
        chunk_size: &mut u64,
        file_len: u64,
    ) -> Result<(), QcpError> {
        while *chunk_size > 0 {
            let offset = cursor.position();
            if offset >= file_len {
                break;
            }
            let size = if self.variable_rate {
                let idx = cursor.read_u8()?;
                *chunk_size -= 1;
                let Some(&(size, _)) = self.rate_table.iter().find(|(_, rate)| *rate == idx)
                else {
                    warn!(rate = idx, "unknown QCP rate index, stopping frame scan");
                    break;
                };
                size as u64 + 1
            } else {
                self.pck_size as u64
            };
            let payload = size - if self.variable_rate { 1 } else { 0 };
            if payload > *chunk_size {
                break;
            }
            self.frames.push(QcpFrame {
                offset,
                size: size as usize,
            });
            cursor.seek(SeekFrom::Current(payload as i64))?;
            *chunk_size -= payload;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_qcp(variable: bool, frames: &[&[u8]]) -> Vec<u8> {
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&[1, 0]); // major/minor
        fmt.extend_from_slice(&EVRC_GUID);
        fmt.extend_from_slice(&1u16.to_le_bytes()); // codec version
        fmt.extend_from_slice(&[0u8; 80]); // name
        fmt.extend_from_slice(&9600u16.to_le_bytes()); // avg bps
        fmt.extend_from_slice(&22u16.to_le_bytes()); // pck size
        fmt.extend_from_slice(&160u16.to_le_bytes()); // block size
        fmt.extend_from_slice(&8000u16.to_le_bytes()); // sample rate
        fmt.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        fmt.extend_from_slice(&5u32.to_le_bytes()); // rate table count
        for (size, idx) in [(22u8, 4u8), (10, 3), (5, 2), (2, 1), (0, 0), (0, 0), (0, 0), (0, 0)] {
            fmt.push(size);
            fmt.push(idx);
        }
        fmt.extend_from_slice(&[0u8; 20]); // reserved
        assert_eq!(fmt.len(), 162);

        let mut vrat = Vec::new();
        vrat.extend_from_slice(&(variable as u32).to_le_bytes());
        vrat.extend_from_slice(&(frames.len() as u32).to_le_bytes());

        let mut data_chunk = Vec::new();
        for f in frames {
            data_chunk.extend_from_slice(f);
        }

        let mut body = Vec::new();
        body.extend_from_slice(b"QLCM");
        for (tag, chunk) in [(b"fmt ", &fmt), (b"vrat", &vrat), (b"data", &data_chunk)] {
            body.extend_from_slice(tag);
            body.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
            body.extend_from_slice(chunk);
            if chunk.len() % 2 == 1 {
                body.push(0);
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn variable_rate_frames() {
        // rate 4 -> 22+1 bytes total, rate 2 -> 5+1
        let f1 = {
            let mut v = vec![4u8];
            v.extend_from_slice(&[0xAA; 22]);
            v
        };
        let f2 = {
            let mut v = vec![2u8];
            v.extend_from_slice(&[0xBB; 5]);
            v
        };
        let data = build_qcp(true, &[&f1, &f2]);
        let qcp = QcpFile::parse(&data).unwrap();
        assert_eq!(qcp.codec, QcpCodec::Evrc);
        assert_eq!(qcp.sample_rate, 8000);
        assert!(qcp.variable_rate);
        assert_eq!(qcp.frames.len(), 2);
        assert_eq!(qcp.frames[0].size, 23);
        assert_eq!(qcp.frames[1].size, 6);
        assert_eq!(qcp.fmt_chunk.len(), 162);
    }

    #[test]
    fn fixed_rate_frames() {
        let f = vec![0xCC; 22];
        let data = build_qcp(false, &[&f, &f, &f]);
        let qcp = QcpFile::parse(&data).unwrap();
        assert!(!qcp.variable_rate);
        assert_eq!(qcp.frames.len(), 3);
        assert!(qcp.frames.iter().all(|fr| fr.size == 22));
    }

    #[test]
    fn broken_riff_rejected() {
        assert!(matches!(
            QcpFile::parse(b"RIFX1234QLCM"),
            Err(QcpError::Broken(_))
        ));
        let mut data = build_qcp(false, &[]);
        data[0] = b'X';
        assert!(QcpFile::parse(&data).is_err());
    }
}
