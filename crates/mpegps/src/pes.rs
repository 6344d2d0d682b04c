use std::io::{self, Read, Seek, SeekFrom};

use media_types::Source;

/// Pack start code (`00 00 01 BA`).
pub const PACK_START: u32 = 0x0000_01BA;
/// Program end code (`00 00 01 B9`).
pub const PROGRAM_END: u32 = 0x0000_01B9;
/// Smallest code that opens a PES packet (system header `BB` included).
const PS_END: u32 = 0x0000_01BB;
const START_MASK: u32 = 0xFFFF_FF00;
const START_PATTERN: u32 = 0x0000_0100;

/// Timestamps carried by one PES header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PesTs {
    /// Presentation timestamp at 90 kHz, when present.
    pub pts: Option<u64>,
    /// Decode timestamp at 90 kHz, when present.
    pub dts: Option<u64>,
}

impl PesTs {
    /// True when either timestamp is present.
    #[must_use]
    pub fn any(&self) -> bool {
        self.pts.is_some() || self.dts.is_some()
    }

    /// The timestamp used for indexing: DTS for video, PTS otherwise; when
    /// only one is present it stands in for both.
    #[must_use]
    pub fn best(&self, prefer_dts: bool) -> Option<u64> {
        if prefer_dts {
            self.dts.or(self.pts)
        } else {
            self.pts.or(self.dts)
        }
    }

    /// Clears both stamps.
    pub fn clear(&mut self) {
        *self = PesTs::default();
    }
}

/// Decodes a 33-bit PES timestamp: three groups of 3+15+15 bits, each
/// followed by a marker bit, across 5 bytes.
#[must_use]
pub fn read_pts(pak: &[u8; 5]) -> u64 {
    let mut pts = ((pak[0] >> 1) & 0x7) as u64;
    pts <<= 15;
    pts |= (u16::from_be_bytes([pak[1], pak[2]]) >> 1) as u64;
    pts <<= 15;
    pts |= (u16::from_be_bytes([pak[3], pak[4]]) >> 1) as u64;
    pts
}

/// Encodes a 33-bit PES timestamp with the given 4-bit prefix code
/// (`0010` PTS-only, `0011` PTS-of-pair, `0001` DTS).
#[must_use]
pub fn write_pts(prefix: u8, ts: u64) -> [u8; 5] {
    [
        (prefix << 4) | (((ts >> 30) as u8 & 0x7) << 1) | 1,
        (ts >> 22) as u8,
        (((ts >> 15) as u8) << 1) | 1,
        (ts >> 7) as u8,
        ((ts as u8) << 1) | 1,
    ]
}

fn read_bytes(src: &mut dyn Source, buf: &mut [u8]) -> io::Result<bool> {
    match src.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn skip(src: &mut dyn Source, len: i64) -> io::Result<()> {
    src.seek(SeekFrom::Current(len)).map(|_| ())
}

/// Skips a pack header. `consumed` bytes of it (from the start code) were
/// already read. MPEG-2 packs (`byte[4] & 0xC0 == 0x40`) are 14 bytes plus
/// stuffing; MPEG-1 packs are 12 bytes.
fn skip_pack_header(src: &mut dyn Source, pack: &[u8; 6], consumed: u32) -> io::Result<()> {
    let marker = if consumed < 5 {
        skip(src, 5 - consumed as i64)?;
        let mut b = [0u8; 1];
        if !read_bytes(src, &mut b)? {
            return Ok(());
        }
        b[0]
    } else {
        pack[4]
    };
    if marker & 0xC0 != 0x40 {
        // MPEG-1 layout
        skip(src, 12 - consumed as i64)?;
        return Ok(());
    }
    skip(src, 13 - consumed as i64)?;
    let mut b = [0u8; 1];
    if read_bytes(src, &mut b)? {
        skip(src, (b[0] & 0x7) as i64)?;
    }
    Ok(())
}

/// Recovers from corruption by scanning forward for a pack start code in
/// 512-byte windows. `saved` holds bytes already consumed from the stream.
fn find_pack_start(src: &mut dyn Source, saved: &[u8]) -> io::Result<bool> {
    let mut buffer = [0u8; 512];
    let len = saved.len().min(buffer.len());
    buffer[..len].copy_from_slice(&saved[..len]);
    if !read_bytes(src, &mut buffer[len..])? {
        return Ok(false);
    }
    loop {
        let mut on = 0usize;
        while on + 4 <= buffer.len() {
            if buffer[on] == 0 && buffer[on + 1] == 0 && buffer[on + 2] == 1 {
                if buffer[on + 3] == (PACK_START & 0xFF) as u8 {
                    // rewind to the start code
                    skip(src, on as i64 - buffer.len() as i64)?;
                    return Ok(true);
                }
                on += 1;
            } else {
                on += 1;
            }
        }
        // keep a partial start code spanning the window boundary
        let tail = &buffer[buffer.len() - 3..];
        let keep = if tail[0] == 0 && tail[1] == 0 && tail[2] == 1 {
            3
        } else if tail[1] == 0 && tail[2] == 0 {
            2
        } else if tail[2] == 0 {
            1
        } else {
            0
        };
        let mut head = [0u8; 3];
        head[..keep].copy_from_slice(&buffer[buffer.len() - keep..]);
        buffer[..keep].copy_from_slice(&head[..keep]);
        let start = keep;
        if !read_bytes(src, &mut buffer[start..])? {
            return Ok(false);
        }
    }
}

/// Advances to the next PES packet start: skips pack headers, rewinds over
/// program end codes (multi-segment files) and recovers from corruption by
/// pack-start scanning. Returns `(stream_id, pes_len)`.
pub fn read_to_next_pes(src: &mut dyn Source) -> io::Result<Option<(u8, u16)>> {
    loop {
        let mut local = [0u8; 6];
        if !read_bytes(src, &mut local)? {
            return Ok(None);
        }
        let hdr = u32::from_be_bytes([local[0], local[1], local[2], local[3]]);
        if (hdr & START_MASK) != START_PATTERN || hdr < PS_END {
            if hdr == PACK_START {
                skip_pack_header(src, &local, 6)?;
                continue;
            }
            if hdr == PROGRAM_END {
                skip(src, -2)?;
                continue;
            }
            if !find_pack_start(src, &local)? {
                return Ok(None);
            }
            continue;
        }
        let pes_len = u16::from_be_bytes([local[4], local[5]]);
        return Ok(Some((hdr as u8, pes_len)));
    }
}

/// Parses the PES header flags/stamps, consuming them from the source.
///
/// Handles the MPEG-1 stuffing form (leading `0xFF` bytes, optional buffer
/// scale/size, `0010`/`0011` timestamp markers) and the MPEG-2 form (flag
/// bytes plus a header length). Returns the remaining payload length and the
/// timestamps found.
pub fn read_pes_header(
    src: &mut dyn Source,
    pes_len: u16,
) -> io::Result<Option<(u16, PesTs)>> {
    let mut ts = PesTs::default();
    let mut left = pes_len;
    let mut b = [0u8; 1];
    if !read_bytes(src, &mut b)? {
        return Ok(None);
    }
    left = left.saturating_sub(1);
    while b[0] == 0xFF {
        if !read_bytes(src, &mut b)? {
            return Ok(None);
        }
        if left == 0 {
            return Ok(Some((0, ts)));
        }
        left -= 1;
    }
    if b[0] & 0xC0 == 0x40 {
        // buffer scale and size
        skip(src, 1)?;
        if !read_bytes(src, &mut b)? {
            return Ok(None);
        }
        left = left.saturating_sub(2);
    }

    if b[0] & 0xF0 == 0x20 {
        // MPEG-1, PTS only
        let mut stamp = [0u8; 5];
        stamp[0] = b[0];
        if !read_bytes(src, &mut stamp[1..])? {
            return Ok(None);
        }
        ts.pts = Some(read_pts(&stamp));
        left = left.saturating_sub(4);
    } else if b[0] & 0xF0 == 0x30 {
        // MPEG-1, PTS and DTS
        let mut rest = [0u8; 9];
        if !read_bytes(src, &mut rest)? {
            return Ok(None);
        }
        let mut stamp = [0u8; 5];
        stamp[0] = b[0];
        stamp[1..].copy_from_slice(&rest[..4]);
        ts.pts = Some(read_pts(&stamp));
        stamp.copy_from_slice(&rest[4..9]);
        ts.dts = Some(read_pts(&stamp));
        left = left.saturating_sub(9);
    } else if b[0] & 0xC0 == 0x80 {
        // MPEG-2 PES header: flags byte, header data length
        let mut hdr = [0u8; 2];
        if !read_bytes(src, &mut hdr)? {
            return Ok(None);
        }
        let mut hdr_len = hdr[1] as i64;
        left = left.saturating_sub(hdr_len as u16 + 2);
        if hdr[0] & 0xC0 == 0x80 {
            let mut stamp = [0u8; 5];
            if !read_bytes(src, &mut stamp)? {
                return Ok(None);
            }
            ts.pts = Some(read_pts(&stamp));
            hdr_len -= 5;
        } else if hdr[0] & 0xC0 == 0xC0 {
            let mut stamps = [0u8; 10];
            if !read_bytes(src, &mut stamps)? {
                return Ok(None);
            }
            let mut stamp = [0u8; 5];
            stamp.copy_from_slice(&stamps[..5]);
            ts.pts = Some(read_pts(&stamp));
            stamp.copy_from_slice(&stamps[5..]);
            ts.dts = Some(read_pts(&stamp));
            hdr_len -= 10;
        }
        skip(src, hdr_len)?;
    } else if b[0] != 0x0F {
        // unknown header form: drop the payload
        skip(src, left as i64)?;
        left = 0;
    }
    Ok(Some((left, ts)))
}

/// Reads `len` payload bytes into `out` (appending).
pub fn read_payload(src: &mut dyn Source, len: u16, out: &mut Vec<u8>) -> io::Result<usize> {
    let start = out.len();
    out.resize(start + len as usize, 0);
    let mut filled = 0usize;
    while filled < len as usize {
        let n = src.read(&mut out[start + filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    out.truncate(start + filled);
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn pts_round_trip() {
        for ts in [0u64, 1, 90_000, (1 << 33) - 1, 0x1_2345_6789 & ((1 << 33) - 1)] {
            let buf = write_pts(0b0010, ts);
            assert_eq!(read_pts(&buf), ts, "ts {ts}");
        }
    }

    #[test]
    fn marker_bits_are_set() {
        let buf = write_pts(0b0011, 0);
        assert_eq!(buf[0] & 0x01, 1);
        assert_eq!(buf[2] & 0x01, 1);
        assert_eq!(buf[4] & 0x01, 1);
        assert_eq!(buf[0] >> 4, 0b0011);
    }

    #[test]
    fn mpeg2_pes_header_with_pts_dts() {
        // PES payload: flags 0xC0 (PTS+DTS), header len 10, two stamps
        let mut data = Vec::new();
        data.push(0x80); // MPEG-2 marker
        data.push(0xC0);
        data.push(10);
        data.extend_from_slice(&write_pts(0b0011, 45000));
        data.extend_from_slice(&write_pts(0b0001, 41997));
        data.extend_from_slice(b"payload");
        let mut cur = Cursor::new(data);
        let (left, ts) = read_pes_header(&mut cur, 3 + 10 + 7).unwrap().unwrap();
        assert_eq!(ts.pts, Some(45000));
        assert_eq!(ts.dts, Some(41997));
        assert_eq!(left, 7);
    }

    #[test]
    fn mpeg1_stuffing_and_pts() {
        let mut data = vec![0xFF, 0xFF]; // stuffing
        data.extend_from_slice(&write_pts(0b0010, 1234));
        data.extend_from_slice(b"xyz");
        let mut cur = Cursor::new(data);
        let (left, ts) = read_pes_header(&mut cur, 2 + 5 + 3).unwrap().unwrap();
        assert_eq!(ts.pts, Some(1234));
        assert_eq!(ts.dts, None);
        assert_eq!(left, 3);
    }

    #[test]
    fn no_timestamp_header() {
        // "0F" means no stamps, payload follows directly
        let data = vec![0x0F, 1, 2, 3];
        let mut cur = Cursor::new(data);
        let (left, ts) = read_pes_header(&mut cur, 4).unwrap().unwrap();
        assert!(!ts.any());
        assert_eq!(left, 3);
    }
}
