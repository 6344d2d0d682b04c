use bytes_util::BitReader;

use crate::asc::SAMPLE_RATES;

/// A parsed ADTS frame header (fixed + variable part).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// MPEG-2 AAC (`ID` bit set) as opposed to MPEG-4.
    pub is_mpeg2: bool,
    /// CRC words present after the header.
    pub has_crc: bool,
    /// Audio object type (ADTS `profile` field + 1).
    pub profile: u8,
    /// Sampling frequency index into the standard rate table.
    pub sr_index: u8,
    /// Sampling rate in Hz.
    pub sample_rate: u32,
    /// Channel configuration.
    pub channels: u8,
    /// Header length in bytes (7, or 9 with CRC).
    pub header_size: usize,
    /// Total frame length in bytes as declared, header included.
    pub frame_size: usize,
}

impl AdtsHeader {
    /// Parses a header starting at `data[0]`; `None` on bad sync, a nonzero
    /// layer, a reserved rate index, or a frame shorter than its header.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<AdtsHeader> {
        let mut r = BitReader::new(data);
        if r.read_bits(12).ok()? != 0xFFF {
            return None;
        }
        let is_mpeg2 = r.read_bit().ok()?;
        if r.read_bits(2).ok()? != 0 {
            // layer must be 0
            return None;
        }
        let no_crc = r.read_bit().ok()?;
        let profile = r.read_bits(2).ok()? as u8 + 1;
        let sr_index = r.read_bits(4).ok()? as u8;
        let sample_rate = SAMPLE_RATES.get(sr_index as usize).copied().unwrap_or(0);
        if sample_rate == 0 {
            return None;
        }
        r.skip_bits(1).ok()?; // private
        let channels = r.read_bits(3).ok()? as u8;
        r.skip_bits(4).ok()?; // original, home, copyright id + start
        let frame_size = r.read_bits(13).ok()? as usize;
        r.skip_bits(11).ok()?; // buffer fullness
        r.skip_bits(2).ok()?; // number of raw data blocks - 1
        let header_size = if no_crc { 7 } else { 9 };
        if frame_size < header_size {
            return None;
        }
        Some(AdtsHeader {
            is_mpeg2,
            has_crc: !no_crc,
            profile,
            sr_index,
            sample_rate,
            channels,
            header_size,
            frame_size,
        })
    }
}

/// Scans `data` from `start` for the next verified ADTS frame.
///
/// On each candidate sync the declared frame length is skipped and the next
/// sync is checked; on mismatch the scan advances one byte. A frame ending
/// exactly at the end of the buffer is accepted without a follower, so the
/// final frame of a stream with no trailing sync is kept.
#[must_use]
pub fn next_adts_frame(data: &[u8], start: usize) -> Option<(usize, AdtsHeader)> {
    let mut pos = start;
    while pos + 7 <= data.len() {
        if data[pos] != 0xFF || data[pos + 1] & 0xF6 != 0xF0 {
            pos += 1;
            continue;
        }
        let Some(hdr) = AdtsHeader::parse(&data[pos..]) else {
            pos += 1;
            continue;
        };
        let next = pos + hdr.frame_size;
        if next > data.len() {
            // truncated tail: only accept when the payload is the remainder
            pos += 1;
            continue;
        }
        if next + 2 <= data.len() && (data[next] != 0xFF || data[next + 1] & 0xF6 != 0xF0) {
            pos += 1;
            continue;
        }
        return Some((pos, hdr));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes_util::BitWriter;

    pub(crate) fn build_frame(payload_len: usize, sr_index: u8, channels: u8) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0xFFF, 12).unwrap();
        w.write_bit(false); // MPEG-4
        w.write_bits(0, 2).unwrap(); // layer
        w.write_bit(true); // no CRC
        w.write_bits(1, 2).unwrap(); // profile -> AOT 2
        w.write_bits(sr_index as u64, 4).unwrap();
        w.write_bit(false); // private
        w.write_bits(channels as u64, 3).unwrap();
        w.write_bits(0, 4).unwrap();
        w.write_bits((7 + payload_len) as u64, 13).unwrap();
        w.write_bits(0x7FF, 11).unwrap();
        w.write_bits(0, 2).unwrap();
        let mut data = w.finish();
        assert_eq!(data.len(), 7);
        data.resize(7 + payload_len, 0x55);
        data
    }

    #[test]
    fn parse_header_fields() {
        let frame = build_frame(1010, 4, 2);
        let hdr = AdtsHeader::parse(&frame).unwrap();
        assert!(!hdr.is_mpeg2);
        assert!(!hdr.has_crc);
        assert_eq!(hdr.profile, 2);
        assert_eq!(hdr.sample_rate, 44100);
        assert_eq!(hdr.channels, 2);
        assert_eq!(hdr.frame_size, 1017);
        assert_eq!(hdr.header_size, 7);
    }

    #[test]
    fn single_frame_at_eof_is_found() {
        let frame = build_frame(100, 4, 2);
        let (pos, hdr) = next_adts_frame(&frame, 0).unwrap();
        assert_eq!(pos, 0);
        assert_eq!(hdr.frame_size, frame.len());
    }

    #[test]
    fn false_sync_advances_one_byte() {
        let real = build_frame(50, 3, 1);
        let mut data = vec![0xFF, 0xF1, 0x00]; // sync pattern, broken header tail
        data.extend_from_slice(&real);
        data.extend_from_slice(&real);
        let (pos, hdr) = next_adts_frame(&data, 0).unwrap();
        assert_eq!(pos, 3);
        assert_eq!(hdr.sample_rate, 48000);
    }

    #[test]
    fn resync_emits_consecutive_frames() {
        let a = build_frame(20, 4, 2);
        let b = build_frame(30, 4, 2);
        let mut data = a.clone();
        data.extend_from_slice(&b);
        let (p0, h0) = next_adts_frame(&data, 0).unwrap();
        assert_eq!((p0, h0.frame_size), (0, 27));
        let (p1, h1) = next_adts_frame(&data, p0 + h0.frame_size).unwrap();
        assert_eq!((p1, h1.frame_size), (27, 37));
    }
}
