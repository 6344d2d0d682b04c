//! MPEG video elementary stream parsing.
//!
//! [`mpeg12`] covers MPEG-1/2 sequence, GOP and picture headers as found in
//! program streams and raw `.m1v`/`.m2v` files. [`m4v`] covers the MPEG-4
//! Visual object layer (VOS/VOL/VOP) including the DivX packed-bitstream
//! marker. Both share byte-aligned `00 00 01 xx` start-code scanning.

pub mod m4v;
pub mod mpeg12;

use memchr::memmem;

/// Picture coding type shared by the MPEG-1/2 and MPEG-4 parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureType {
    /// Intra coded.
    I,
    /// Predictive coded.
    P,
    /// Bidirectionally predictive coded.
    B,
    /// MPEG-1 D picture / MPEG-4 S(GMC) VOP.
    Other,
}

/// Finds the next `00 00 01 xx` start code at or after `from`.
///
/// Returns the offset of the first zero byte and the code byte `xx`.
#[must_use]
pub fn next_start_code(data: &[u8], from: usize) -> Option<(usize, u8)> {
    let mut pos = from;
    let finder = memmem::Finder::new(&[0x00, 0x00, 0x01]);
    while pos + 4 <= data.len() {
        let rel = finder.find(&data[pos..])?;
        let at = pos + rel;
        if at + 3 >= data.len() {
            return None;
        }
        return Some((at, data[at + 3]));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_code_scan() {
        let data = [0u8, 0, 0, 0, 1, 0xB3, 9, 9, 0, 0, 1, 0x00];
        assert_eq!(next_start_code(&data, 0), Some((2, 0xB3)));
        assert_eq!(next_start_code(&data, 3), Some((8, 0x00)));
        assert_eq!(next_start_code(&data, 9), None);
    }
}
