//! AC-3 sync frame parsing and `AC3SpecificBox` construction.
//!
//! A sync frame starts with the `0x0B77` sync word followed by CRC-1, the
//! sample rate code (`fscod`), the frame size code (`frmsizecod`), the
//! bitstream id/mode and the channel coding mode. Frame length is a fixed
//! function of (`fscod`, `frmsizecod`); every frame carries 1536 PCM samples
//! per channel.
#![deny(missing_docs)]
#![deny(unsafe_code)]

use bytes_util::{BitReader, BitWriter};

/// PCM samples per AC-3 sync frame (6 audio blocks of 256).
pub const SAMPLES_PER_FRAME: u32 = 1536;

const SAMPLE_RATES: [u32; 3] = [48000, 44100, 32000];

/// Bitrate in kbit/s indexed by `frmsizecod >> 1`.
const BITRATES: [u32; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];

/// Frame size in 16-bit words, indexed by `frmsizecod`, one column per
/// `fscod` (48 kHz, 44.1 kHz, 32 kHz).
const FRAME_SIZES: [[u16; 3]; 38] = [
    [64, 69, 96],
    [64, 70, 96],
    [80, 87, 120],
    [80, 88, 120],
    [96, 104, 144],
    [96, 105, 144],
    [112, 121, 168],
    [112, 122, 168],
    [128, 139, 192],
    [128, 140, 192],
    [160, 174, 240],
    [160, 175, 240],
    [192, 208, 288],
    [192, 209, 288],
    [224, 243, 336],
    [224, 244, 336],
    [256, 278, 384],
    [256, 279, 384],
    [320, 348, 480],
    [320, 349, 480],
    [384, 417, 576],
    [384, 418, 576],
    [448, 487, 672],
    [448, 488, 672],
    [512, 557, 768],
    [512, 558, 768],
    [640, 696, 960],
    [640, 697, 960],
    [768, 835, 1152],
    [768, 836, 1152],
    [896, 975, 1344],
    [896, 976, 1344],
    [1024, 1114, 1536],
    [1024, 1115, 1536],
    [1152, 1253, 1728],
    [1152, 1254, 1728],
    [1280, 1393, 1920],
    [1280, 1394, 1920],
];

const CHANNELS_BY_ACMOD: [u32; 8] = [2, 1, 2, 3, 3, 4, 4, 5];

/// A parsed AC-3 sync frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncFrame {
    /// Sample rate code (0..=2).
    pub fscod: u8,
    /// Frame size code (0..=37).
    pub frmsizecod: u8,
    /// Bitstream identification.
    pub bsid: u8,
    /// Bitstream mode.
    pub bsmod: u8,
    /// Audio coding (channel) mode.
    pub acmod: u8,
    /// Low-frequency-effects channel present.
    pub lfe_on: bool,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Full-rate channel count implied by `acmod`.
    pub channels: u32,
    /// Bitrate in bits per second.
    pub bitrate: u32,
    /// Total frame length in bytes, sync word included.
    pub frame_size: usize,
}

impl SyncFrame {
    /// Parses a sync frame starting at `data[0]`.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<SyncFrame> {
        if data.len() < 8 || data[0] != 0x0B || data[1] != 0x77 {
            return None;
        }
        let mut r = BitReader::new(&data[2..]);
        r.skip_bits(16).ok()?; // crc1
        let fscod = r.read_bits(2).ok()? as u8;
        let frmsizecod = r.read_bits(6).ok()? as u8;
        if fscod == 3 || frmsizecod as usize >= FRAME_SIZES.len() {
            return None;
        }
        let bsid = r.read_bits(5).ok()? as u8;
        // standard AC-3 only (E-AC-3 uses bsid 11..=16)
        if bsid > 10 {
            return None;
        }
        let bsmod = r.read_bits(3).ok()? as u8;
        let acmod = r.read_bits(3).ok()? as u8;
        if acmod != 1 && acmod & 0x1 != 0 {
            r.skip_bits(2).ok()?; // cmixlev
        }
        if acmod & 0x4 != 0 {
            r.skip_bits(2).ok()?; // surmixlev
        }
        if acmod == 2 {
            r.skip_bits(2).ok()?; // dsurmod
        }
        let lfe_on = r.read_bit().ok()?;
        Some(SyncFrame {
            fscod,
            frmsizecod,
            bsid,
            bsmod,
            acmod,
            lfe_on,
            sample_rate: SAMPLE_RATES[fscod as usize],
            channels: CHANNELS_BY_ACMOD[acmod as usize],
            bitrate: BITRATES[(frmsizecod >> 1) as usize] * 1000,
            frame_size: FRAME_SIZES[frmsizecod as usize][fscod as usize] as usize * 2,
        })
    }

    /// Serializes the `AC3SpecificBox` payload (`dac3` contents, 3 bytes).
    #[must_use]
    pub fn specific_box(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        // writes below cannot fail: every field fits its width by construction
        let _ = w.write_bits(self.fscod as u64, 2);
        let _ = w.write_bits(self.bsid as u64, 5);
        let _ = w.write_bits(self.bsmod as u64, 3);
        let _ = w.write_bits(self.acmod as u64, 3);
        w.write_bit(self.lfe_on);
        let _ = w.write_bits((self.frmsizecod >> 1) as u64, 5);
        let _ = w.write_bits(0, 5);
        w.finish()
    }
}

/// Scans `data` from `start` for the next parseable sync frame.
///
/// A candidate is verified against the sync word of the following frame
/// unless it ends at or beyond the end of the buffer (truncated tail frames
/// are accepted, the caller bounds them by the data that is present).
#[must_use]
pub fn next_sync_frame(data: &[u8], start: usize) -> Option<(usize, SyncFrame)> {
    let mut pos = start;
    while pos + 8 <= data.len() {
        if data[pos] != 0x0B || data[pos + 1] != 0x77 {
            pos += 1;
            continue;
        }
        let Some(frame) = SyncFrame::parse(&data[pos..]) else {
            pos += 1;
            continue;
        };
        let next = pos + frame.frame_size;
        if next + 2 <= data.len() && (data[next] != 0x0B || data[next + 1] != 0x77) {
            pos += 1;
            continue;
        }
        return Some((pos, frame));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a 48 kHz, 256 kbit/s, 3/2 (acmod 7) frame with LFE.
    fn sample_frame() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0x0B77, 16).unwrap();
        w.write_bits(0, 16).unwrap(); // crc1
        w.write_bits(0, 2).unwrap(); // fscod = 48 kHz
        w.write_bits(24, 6).unwrap(); // frmsizecod -> 256 kbit/s
        w.write_bits(8, 5).unwrap(); // bsid
        w.write_bits(0, 3).unwrap(); // bsmod
        w.write_bits(7, 3).unwrap(); // acmod 3/2
        w.write_bits(1, 2).unwrap(); // cmixlev
        w.write_bits(1, 2).unwrap(); // surmixlev
        w.write_bit(true); // lfeon
        let mut data = w.finish();
        data.resize(512 * 2, 0);
        data
    }

    #[test]
    fn parse_sample_frame() {
        let data = sample_frame();
        let frame = SyncFrame::parse(&data).unwrap();
        assert_eq!(frame.sample_rate, 48000);
        assert_eq!(frame.bitrate, 256_000);
        assert_eq!(frame.frame_size, 1024);
        assert_eq!(frame.channels, 5);
        assert!(frame.lfe_on);
    }

    #[test]
    fn scan_with_leading_garbage() {
        let mut data = vec![0x0B, 0x00, 0x77];
        data.extend_from_slice(&sample_frame());
        let (pos, frame) = next_sync_frame(&data, 0).unwrap();
        assert_eq!(pos, 3);
        assert_eq!(frame.sample_rate, 48000);
    }

    #[test]
    fn double_sync_rejects_false_positive() {
        let real = sample_frame();
        let mut data = Vec::new();
        // a sync word whose declared frame is followed by garbage
        data.extend_from_slice(&real[..8]);
        data.extend_from_slice(&vec![0u8; 1500]);
        data.extend_from_slice(&real);
        data.extend_from_slice(&real);
        let (pos, _) = next_sync_frame(&data, 0).unwrap();
        assert_eq!(pos, 1508);
    }

    #[test]
    fn specific_box_layout() {
        let data = sample_frame();
        let frame = SyncFrame::parse(&data).unwrap();
        let boxed = frame.specific_box();
        assert_eq!(boxed.len(), 3);
        let mut r = BitReader::new(&boxed);
        assert_eq!(r.read_bits(2).unwrap(), 0); // fscod
        assert_eq!(r.read_bits(5).unwrap(), 8); // bsid
        assert_eq!(r.read_bits(3).unwrap(), 0); // bsmod
        assert_eq!(r.read_bits(3).unwrap(), 7); // acmod
        assert!(r.read_bit().unwrap()); // lfeon
        assert_eq!(r.read_bits(5).unwrap(), 12); // bit_rate_code
    }
}
