//! Frame tables for the 3GPP speech codecs (AMR, AMR-WB, EVRC, SMV) and the
//! QCP (RIFF/QLCM) container reader.
//!
//! Raw speech files start with a text magic (`#!AMR\n`, `#!AMR-WB\n`,
//! `#!EVRC\n`, `#!SMV\n`); each frame then begins with a one-byte TOC whose
//! mode selects the frame length from a fixed per-codec table.
#![deny(missing_docs)]
#![deny(unsafe_code)]

mod qcp;

pub use qcp::{QcpCodec, QcpError, QcpFile, QcpFrame};

/// The speech codec family of a raw file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechCodec {
    /// AMR narrowband (8 kHz).
    Amr,
    /// AMR wideband (16 kHz).
    AmrWb,
    /// EVRC (8 kHz).
    Evrc,
    /// SMV (8 kHz).
    Smv,
}

impl SpeechCodec {
    /// Sampling rate in Hz.
    #[must_use]
    pub fn sample_rate(self) -> u32 {
        match self {
            SpeechCodec::AmrWb => 16000,
            _ => 8000,
        }
    }

    /// PCM samples per frame (20 ms at the sampling rate).
    #[must_use]
    pub fn samples_per_frame(self) -> u32 {
        match self {
            SpeechCodec::AmrWb => 320,
            _ => 160,
        }
    }
}

/// Outcome of sniffing a raw speech file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicResult {
    /// A known single-channel magic; the payload starts after `skip` bytes.
    Known {
        /// Detected codec.
        codec: SpeechCodec,
        /// Magic length to skip.
        skip: usize,
    },
    /// A multichannel AMR magic, which is not supported.
    Multichannel,
    /// No recognizable magic.
    Unknown,
}

/// Sniffs the leading bytes of a raw speech file.
#[must_use]
pub fn detect_magic(head: &[u8]) -> MagicResult {
    const TABLE: [(&[u8], SpeechCodec); 4] = [
        (b"#!AMR-WB\n", SpeechCodec::AmrWb),
        (b"#!AMR\n", SpeechCodec::Amr),
        (b"#!EVRC\n", SpeechCodec::Evrc),
        (b"#!SMV\n", SpeechCodec::Smv),
    ];
    if head.starts_with(b"#!AMR_MC1.0\n") || head.starts_with(b"#!AMR-WB_MC1.0\n") {
        return MagicResult::Multichannel;
    }
    for (magic, codec) in TABLE {
        if head.starts_with(magic) {
            return MagicResult::Known {
                codec,
                skip: magic.len(),
            };
        }
    }
    MagicResult::Unknown
}

/// AMR narrowband frame payload sizes (TOC byte excluded), indexed by the
/// frame type of the TOC.
pub const AMR_FRAME_SIZES: [usize; 16] = [12, 13, 15, 17, 19, 20, 26, 31, 5, 0, 0, 0, 0, 0, 0, 0];

/// AMR wideband frame payload sizes (TOC byte excluded).
pub const AMR_WB_FRAME_SIZES: [usize; 16] =
    [17, 23, 32, 36, 40, 46, 50, 58, 60, 5, 0, 0, 0, 0, 0, 0];

/// EVRC/SMV rate byte to total frame size (rate byte included).
const EVRC_SMV_RATE_TO_SIZE: [(u8, usize); 5] = [(0, 1), (1, 3), (2, 6), (3, 11), (4, 23)];

/// Frame payload length (TOC/rate byte excluded) for a TOC byte of `codec`.
///
/// `None` marks a corrupt EVRC/SMV rate byte; AMR modes outside the table
/// are "no data" frames of length 0.
#[must_use]
pub fn frame_payload_size(codec: SpeechCodec, toc: u8) -> Option<usize> {
    match codec {
        SpeechCodec::Amr => Some(AMR_FRAME_SIZES[((toc >> 3) & 0x0F) as usize]),
        SpeechCodec::AmrWb => Some(AMR_WB_FRAME_SIZES[((toc >> 3) & 0x0F) as usize]),
        SpeechCodec::Evrc | SpeechCodec::Smv => EVRC_SMV_RATE_TO_SIZE
            .iter()
            .find(|(rate, _)| *rate == toc)
            .map(|(_, size)| size - 1),
    }
}

/// Frame type extracted from an AMR TOC byte, used for mode-set tracking.
#[must_use]
pub fn amr_frame_type(toc: u8) -> u8 {
    (toc >> 3) & 0x0F
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_detection() {
        assert_eq!(
            detect_magic(b"#!AMR\n\x3C"),
            MagicResult::Known {
                codec: SpeechCodec::Amr,
                skip: 6
            }
        );
        assert_eq!(
            detect_magic(b"#!AMR-WB\n"),
            MagicResult::Known {
                codec: SpeechCodec::AmrWb,
                skip: 9
            }
        );
        assert_eq!(detect_magic(b"#!AMR_MC1.0\n"), MagicResult::Multichannel);
        assert_eq!(detect_magic(b"\xF8\x00"), MagicResult::Unknown);
    }

    #[test]
    fn amr_mode_sizes() {
        // TOC 0x3C: frame type (0x3C >> 3) & 0xF = 7 -> 12.2 kbit/s, 31 bytes
        assert_eq!(frame_payload_size(SpeechCodec::Amr, 0x3C), Some(31));
        assert_eq!(amr_frame_type(0x3C), 7);
        // SID frame
        assert_eq!(frame_payload_size(SpeechCodec::Amr, 8 << 3), Some(5));
        // no-data frame
        assert_eq!(frame_payload_size(SpeechCodec::Amr, 0x0F << 3), Some(0));
    }

    #[test]
    fn evrc_rates() {
        assert_eq!(frame_payload_size(SpeechCodec::Evrc, 4), Some(22));
        assert_eq!(frame_payload_size(SpeechCodec::Evrc, 0), Some(0));
        assert_eq!(frame_payload_size(SpeechCodec::Smv, 9), None);
    }
}
