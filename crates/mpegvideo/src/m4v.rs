//! MPEG-4 Visual (Part 2) object layer parsing.

use bytes_util::BitReader;
use tracing::warn;

use crate::{PictureType, next_start_code};

/// Visual object sequence start code byte (carries the profile/level).
pub const VOS_START: u8 = 0xB0;
/// User data start code byte.
pub const USER_DATA_START: u8 = 0xB2;
/// Group-of-VOP start code byte.
pub const GOV_START: u8 = 0xB3;
/// Visual object start code byte.
pub const VISOBJ_START: u8 = 0xB5;
/// VOP start code byte.
pub const VOP_START: u8 = 0xB6;

/// Configuration extracted from the headers preceding the first VOP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct M4vConfig {
    /// Profile/level byte of the VOS header (0 when absent).
    pub profile: u8,
    /// Frame width from the VOL header.
    pub width: u32,
    /// Frame height from the VOL header.
    pub height: u32,
    /// Pixel aspect ratio, when the VOL carries one.
    pub par: Option<(u8, u8)>,
    /// `vop_time_increment_resolution`.
    pub time_resolution: u16,
    /// Bit width of VOP time increments.
    pub time_inc_bits: u32,
    /// Byte length of the configuration prefix (everything before the
    /// first VOP start code); this is the decoder specific info.
    pub config_len: usize,
}

fn time_inc_bits(resolution: u16) -> u32 {
    let mut bits = 1;
    while (1u32 << bits) < resolution as u32 {
        bits += 1;
    }
    bits
}

fn parse_vol(body: &[u8]) -> Option<(u32, u32, Option<(u8, u8)>, u16, u32)> {
    let mut r = BitReader::new(body);
    r.skip_bits(1).ok()?; // random accessible vol
    r.skip_bits(8).ok()?; // video object type indication
    if r.read_bit().ok()? {
        r.skip_bits(4 + 3).ok()?; // version id, priority
    }
    let aspect_code = r.read_bits(4).ok()?;
    let par = match aspect_code {
        1 => Some((1, 1)),
        2 => Some((12, 11)),
        3 => Some((10, 11)),
        4 => Some((16, 11)),
        5 => Some((40, 33)),
        0xF => {
            let num = r.read_bits(8).ok()? as u8;
            let den = r.read_bits(8).ok()? as u8;
            Some((num, den))
        }
        _ => None,
    };
    if r.read_bit().ok()? {
        // vol control parameters
        r.skip_bits(2 + 1).ok()?; // chroma format, low delay
        if r.read_bit().ok()? {
            // vbv parameters
            r.skip_bits(15 + 1 + 15 + 1 + 15 + 1 + 3 + 11 + 1 + 15 + 1).ok()?;
        }
    }
    let shape = r.read_bits(2).ok()?;
    if shape != 0 {
        warn!(shape, "non-rectangular video object layer");
        return None;
    }
    r.skip_bits(1).ok()?; // marker
    let time_resolution = r.read_bits(16).ok()? as u16;
    if time_resolution == 0 {
        return None;
    }
    let inc_bits = time_inc_bits(time_resolution);
    r.skip_bits(1).ok()?; // marker
    if r.read_bit().ok()? {
        // fixed vop rate
        r.skip_bits(inc_bits as usize).ok()?;
    }
    r.skip_bits(1).ok()?; // marker
    let width = r.read_bits(13).ok()? as u32;
    r.skip_bits(1).ok()?; // marker
    let height = r.read_bits(13).ok()? as u32;
    Some((width, height, par, time_resolution, inc_bits))
}

/// Parses the configuration headers up to the first VOP start code.
#[must_use]
pub fn parse_config(data: &[u8]) -> Option<M4vConfig> {
    let mut profile = 0u8;
    let mut vol = None;
    let mut from = 0;
    while let Some((pos, code)) = next_start_code(data, from) {
        from = pos + 4;
        match code {
            VOS_START => profile = data.get(pos + 4).copied().unwrap_or(0),
            0x20..=0x2F => {
                vol = parse_vol(data.get(pos + 4..)?);
            }
            VOP_START | GOV_START if vol.is_some() => {
                let (width, height, par, time_resolution, inc_bits) = vol?;
                return Some(M4vConfig {
                    profile,
                    width,
                    height,
                    par,
                    time_resolution,
                    time_inc_bits: inc_bits,
                    config_len: pos,
                });
            }
            _ => {}
        }
    }
    None
}

/// A parsed VOP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vop {
    /// Coding type.
    pub coding_type: PictureType,
    /// `vop_coded` flag: false for N-VOPs (stuffing frames).
    pub is_coded: bool,
    /// `vop_time_increment`.
    pub time_inc: u32,
}

/// Parses the VOP header whose start code begins at `data[pos]`.
#[must_use]
pub fn parse_vop(data: &[u8], pos: usize, time_inc_bits: u32) -> Option<Vop> {
    let body = data.get(pos + 4..)?;
    let mut r = BitReader::new(body);
    let coding_type = match r.read_bits(2).ok()? {
        0 => PictureType::I,
        1 => PictureType::P,
        2 => PictureType::B,
        _ => PictureType::Other,
    };
    while r.read_bit().ok()? {
        // modulo time base
    }
    r.skip_bits(1).ok()?; // marker
    let time_inc = r.read_bits(time_inc_bits).ok()? as u32;
    r.skip_bits(1).ok()?; // marker
    let is_coded = r.read_bit().ok()?;
    Some(Vop {
        coding_type,
        is_coded,
        time_inc,
    })
}

/// Finds the next VOP start code at or after `from`.
#[must_use]
pub fn next_vop(data: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some((at, code)) = next_start_code(data, pos) {
        if code == VOP_START {
            return Some(at);
        }
        pos = at + 4;
    }
    None
}

/// End offset of the frame whose VOP starts at `vop_pos`: the next
/// VOP/GOV/VOS start code, or the end of the data.
#[must_use]
pub fn frame_end(data: &[u8], vop_pos: usize) -> usize {
    let mut pos = vop_pos + 4;
    while let Some((at, code)) = next_start_code(data, pos) {
        if matches!(code, VOP_START | GOV_START | VOS_START) {
            return at;
        }
        pos = at + 4;
    }
    data.len()
}

/// Rewrites the DivX packed-bitstream marker in a configuration prefix:
/// user data `DivX...p` becomes `...n`. Returns true when packed mode was
/// signalled (and removed).
pub fn rewrite_packed_marker(config: &mut [u8]) -> bool {
    let mut i = 0;
    while i + 4 < config.len() {
        if config[i] != 0 || config[i + 1] != 0 || config[i + 2] != 1 {
            i += 1;
            continue;
        }
        if config[i + 3] != USER_DATA_START {
            i += 4;
            continue;
        }
        let body_start = i + 4;
        if !config[body_start..].starts_with(b"DivX") {
            i += 4;
            continue;
        }
        // packed marker is a 'p' terminating the DivX build string
        for j in body_start..config.len() {
            if config[j] == 0 {
                break;
            }
            if config[j] == b'p' {
                config[j] = b'n';
                return true;
            }
        }
        return false;
    }
    false
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes_util::BitWriter;

    /// Builds a VOS + VOL configuration prefix.
    pub(crate) fn build_config(width: u32, height: u32, time_resolution: u16) -> Vec<u8> {
        let mut out = vec![0, 0, 1, VOS_START, 0x01]; // simple profile L1
        out.extend_from_slice(&[0, 0, 1, 0x20]); // VOL start
        let mut w = BitWriter::new();
        w.write_bit(false); // random accessible
        w.write_bits(1, 8).unwrap(); // object type
        w.write_bit(false); // no object layer id
        w.write_bits(1, 4).unwrap(); // aspect 1:1
        w.write_bit(false); // no vol control
        w.write_bits(0, 2).unwrap(); // rectangular
        w.write_bit(true);
        w.write_bits(time_resolution as u64, 16).unwrap();
        w.write_bit(true);
        w.write_bit(false); // no fixed vop rate
        w.write_bit(true);
        w.write_bits(width as u64, 13).unwrap();
        w.write_bit(true);
        w.write_bits(height as u64, 13).unwrap();
        w.write_bit(true);
        w.write_bits(0, 7).unwrap(); // interlaced, obmc, sprite, quant bits
        out.extend_from_slice(&w.finish());
        out
    }

    pub(crate) fn build_vop(
        coding_type: u8,
        time_inc: u32,
        inc_bits: u32,
        coded: bool,
        padding: usize,
    ) -> Vec<u8> {
        let mut out = vec![0, 0, 1, VOP_START];
        let mut w = BitWriter::new();
        w.write_bits(coding_type as u64, 2).unwrap();
        w.write_bit(false); // end of modulo time base
        w.write_bit(true); // marker
        w.write_bits(time_inc as u64, inc_bits).unwrap();
        w.write_bit(true); // marker
        w.write_bit(coded);
        w.write_bits(0x15, 5).unwrap(); // dummy macroblock bits
        out.extend_from_slice(&w.finish());
        out.extend_from_slice(&vec![0x42u8; padding]);
        out
    }

    #[test]
    fn config_and_vop_round_trip() {
        let mut data = build_config(640, 480, 30);
        let config_len = data.len();
        data.extend_from_slice(&build_vop(0, 3, 5, true, 10));
        data.extend_from_slice(&build_vop(2, 4, 5, true, 6));

        let cfg = parse_config(&data).unwrap();
        assert_eq!((cfg.width, cfg.height), (640, 480));
        assert_eq!(cfg.time_resolution, 30);
        assert_eq!(cfg.time_inc_bits, 5);
        assert_eq!(cfg.config_len, config_len);
        assert_eq!(cfg.profile, 0x01);
        assert_eq!(cfg.par, Some((1, 1)));

        let v0 = next_vop(&data, cfg.config_len).unwrap();
        assert_eq!(v0, config_len);
        let vop = parse_vop(&data, v0, cfg.time_inc_bits).unwrap();
        assert_eq!(vop.coding_type, PictureType::I);
        assert!(vop.is_coded);
        assert_eq!(vop.time_inc, 3);

        let end = frame_end(&data, v0);
        let v1 = next_vop(&data, end).unwrap();
        assert_eq!(end, v1);
        let vop1 = parse_vop(&data, v1, cfg.time_inc_bits).unwrap();
        assert_eq!(vop1.coding_type, PictureType::B);
        assert_eq!(frame_end(&data, v1), data.len());
    }

    #[test]
    fn packed_marker_rewrite() {
        let mut cfg = build_config(320, 240, 25);
        cfg.extend_from_slice(&[0, 0, 1, USER_DATA_START]);
        cfg.extend_from_slice(b"DivX503b1393p");
        assert!(rewrite_packed_marker(&mut cfg));
        assert!(cfg.ends_with(b"DivX503b1393n"));
        // already rewritten: no packed marker anymore
        assert!(!rewrite_packed_marker(&mut cfg));
    }

    #[test]
    fn time_inc_bit_width() {
        assert_eq!(time_inc_bits(1), 1);
        assert_eq!(time_inc_bits(2), 1);
        assert_eq!(time_inc_bits(3), 2);
        assert_eq!(time_inc_bits(25), 5);
        assert_eq!(time_inc_bits(30000), 15);
    }
}
