//! MPEG-1/2 video headers.

use bytes_util::BitReader;

use crate::{PictureType, next_start_code};

/// Sequence header start code byte.
pub const SEQ_START: u8 = 0xB3;
/// Picture header start code byte.
pub const PIC_START: u8 = 0x00;
/// Group-of-pictures start code byte.
pub const GOP_START: u8 = 0xB8;
/// Extension start code byte (MPEG-2).
pub const EXT_START: u8 = 0xB5;
/// Sequence end start code byte.
pub const SEQ_END: u8 = 0xB7;

/// True for the start codes that may open a new access unit.
#[must_use]
pub fn is_frame_start(code: u8) -> bool {
    code == SEQ_START || code == PIC_START || code == GOP_START
}

const FRAME_RATES: [f64; 16] = [
    0.0,
    24000.0 / 1001.0,
    24.0,
    25.0,
    30000.0 / 1001.0,
    30.0,
    50.0,
    60000.0 / 1001.0,
    60.0,
    // unofficial economy rates
    1.0,
    5.0,
    10.0,
    12.0,
    15.0,
    0.0,
    0.0,
];

/// A parsed sequence header, sequence extension folded in when present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeqHeader {
    /// Horizontal size in pixels.
    pub width: u32,
    /// Vertical size in pixels.
    pub height: u32,
    /// Frame rate from the frame-rate code table.
    pub fps: f64,
    /// Bitrate in bits per second (400-bit units expanded).
    pub bitrate: f64,
    /// Display aspect ratio, when the aspect code maps to one.
    pub aspect: Option<(u32, u32)>,
    /// A sequence extension was found: MPEG-2.
    pub is_mpeg2: bool,
}

/// Scans `data` for a sequence header and folds in a following sequence
/// extension (which upgrades the stream to MPEG-2 and widens size/bitrate).
///
/// Stops at the first picture start code once a sequence header was found.
#[must_use]
pub fn parse_seq_header(data: &[u8]) -> Option<SeqHeader> {
    let mut from = 0;
    let mut hdr: Option<SeqHeader> = None;
    let mut bitrate_int = 0u32;
    while let Some((pos, code)) = next_start_code(data, from) {
        from = pos + 4;
        match code {
            SEQ_START => {
                let mut r = BitReader::new(data.get(pos + 4..)?);
                let width = r.read_bits(12).ok()? as u32;
                let height = r.read_bits(12).ok()? as u32;
                let aspect_code = r.read_bits(4).ok()?;
                let framerate_code = r.read_bits(4).ok()? as usize;
                bitrate_int = r.read_bits(18).ok()? as u32;
                let aspect = match aspect_code {
                    2 => Some((4, 3)),
                    3 => Some((16, 9)),
                    4 => Some((2, 21)),
                    _ => None,
                };
                hdr = Some(SeqHeader {
                    width,
                    height,
                    fps: FRAME_RATES[framerate_code],
                    bitrate: bitrate_int as f64 * 400.0,
                    aspect,
                    is_mpeg2: false,
                });
            }
            EXT_START => {
                let Some(h) = hdr.as_mut() else { continue };
                let mut r = BitReader::new(data.get(pos + 4..)?);
                if r.read_bits(4).ok()? != 1 {
                    // not a sequence extension
                    continue;
                }
                r.skip_bits(8).ok()?; // profile and level
                r.skip_bits(1 + 2).ok()?; // progressive, chroma format
                let horiz_ext = r.read_bits(2).ok()? as u32;
                let vert_ext = r.read_bits(2).ok()? as u32;
                let bitrate_ext = r.read_bits(12).ok()? as u32;
                h.is_mpeg2 = true;
                h.width |= horiz_ext << 12;
                h.height |= vert_ext << 12;
                bitrate_int |= bitrate_ext << 18;
                h.bitrate = bitrate_int as f64 * 400.0;
            }
            PIC_START if hdr.is_some() => return hdr,
            _ => {}
        }
    }
    hdr
}

/// Picture coding type of the picture header starting at `data[pos]`
/// (the start-code position).
#[must_use]
pub fn picture_type(data: &[u8], pos: usize) -> Option<PictureType> {
    // temporal reference is 10 bits, the type follows
    let b = *data.get(pos + 5)?;
    match (b >> 3) & 0x7 {
        1 => Some(PictureType::I),
        2 => Some(PictureType::P),
        3 => Some(PictureType::B),
        4 => Some(PictureType::Other),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes_util::BitWriter;

    /// A minimal MPEG-1 sequence header followed by one picture header.
    pub(crate) fn build_seq(width: u32, height: u32, framerate_code: u8) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bytes(&[0, 0, 1, SEQ_START]);
        w.write_bits(width as u64, 12).unwrap();
        w.write_bits(height as u64, 12).unwrap();
        w.write_bits(2, 4).unwrap(); // aspect 4:3
        w.write_bits(framerate_code as u64, 4).unwrap();
        w.write_bits(0x3FFFF, 18).unwrap(); // variable bitrate marker
        w.write_bit(true); // marker
        w.write_bits(0, 10).unwrap(); // vbv buffer size
        w.write_bits(0, 3).unwrap();
        w.finish()
    }

    pub(crate) fn build_picture(temporal_ref: u16, ptype: u8) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bytes(&[0, 0, 1, PIC_START]);
        w.write_bits(temporal_ref as u64, 10).unwrap();
        w.write_bits(ptype as u64, 3).unwrap();
        w.write_bits(0xFFFF, 16).unwrap(); // vbv delay
        w.write_bits(0, 3).unwrap();
        w.finish()
    }

    #[test]
    fn mpeg1_sequence() {
        let mut data = build_seq(352, 288, 3);
        data.extend_from_slice(&build_picture(0, 1));
        let hdr = parse_seq_header(&data).unwrap();
        assert_eq!((hdr.width, hdr.height), (352, 288));
        assert_eq!(hdr.fps, 25.0);
        assert_eq!(hdr.aspect, Some((4, 3)));
        assert!(!hdr.is_mpeg2);
    }

    #[test]
    fn mpeg2_extension_widens() {
        let mut data = build_seq(0x800, 0x600, 4);
        // sequence extension: ext id 1, profile/level, flags, size/bitrate ext
        let mut w = BitWriter::new();
        w.write_bytes(&[0, 0, 1, EXT_START]);
        w.write_bits(1, 4).unwrap();
        w.write_bits(0x48, 8).unwrap();
        w.write_bit(true);
        w.write_bits(1, 2).unwrap();
        w.write_bits(1, 2).unwrap(); // horizontal ext
        w.write_bits(0, 2).unwrap(); // vertical ext
        w.write_bits(0, 12).unwrap();
        data.extend_from_slice(&w.finish());
        data.extend_from_slice(&build_picture(0, 2));
        let hdr = parse_seq_header(&data).unwrap();
        assert!(hdr.is_mpeg2);
        assert_eq!(hdr.width, 0x800 | 1 << 12);
        assert_eq!(hdr.height, 0x600);
        assert!((hdr.fps - 29.97).abs() < 0.001);
    }

    #[test]
    fn picture_types() {
        let p = build_picture(1, 3);
        assert_eq!(picture_type(&p, 0), Some(PictureType::B));
        assert_eq!(picture_type(&build_picture(0, 1), 0), Some(PictureType::I));
        assert_eq!(picture_type(&build_picture(0, 2), 0), Some(PictureType::P));
    }
}
