use std::io;

use bytes_util::{BitReader, BitWriter};

/// The standard sampling frequency table, indexed by the 4-bit frequency
/// index. Reserved entries are 0; the escape index 15 means the rate is
/// written out in 24 bits.
///
/// ISO/IEC 14496-3 - 1.6.2.4 (Table 1.22)
pub const SAMPLE_RATES: [u32; 16] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350, 0, 0,
    0,
];

/// Finds the index of `rate` in the standard table.
#[must_use]
pub fn sample_rate_index(rate: u32) -> Option<u8> {
    SAMPLE_RATES
        .iter()
        .position(|&r| r != 0 && r == rate)
        .map(|i| i as u8)
}

/// Builder for the `AudioSpecificConfig` records emitted with AAC tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Base audio object type (the ADTS profile + 1).
    pub audio_object_type: u8,
    /// Sampling frequency index of the core stream.
    pub sr_index: u8,
    /// Channel configuration.
    pub channels: u8,
}

impl AudioSpecificConfig {
    /// Plain signaling: base AOT, rate index, channels.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        let _ = w.write_bits(self.audio_object_type as u64, 5);
        let _ = w.write_bits(self.sr_index as u64, 4);
        let _ = w.write_bits(self.channels as u64, 4);
        w.finish()
    }

    /// Backward-compatible SBR: plain config, byte aligned, then the
    /// `0x2b7` sync extension announcing AOT 5 with the extension rate.
    #[must_use]
    pub fn build_implicit_sbr(&self, ext_sr_index: u8) -> Vec<u8> {
        let mut w = BitWriter::new();
        let _ = w.write_bits(self.audio_object_type as u64, 5);
        let _ = w.write_bits(self.sr_index as u64, 4);
        let _ = w.write_bits(self.channels as u64, 4);
        w.align();
        let _ = w.write_bits(0x2b7, 11);
        let _ = w.write_bits(5, 5); // SBR object type
        w.write_bit(true); // SBR present
        let _ = w.write_bits(ext_sr_index as u64, 4);
        w.finish()
    }

    /// Hierarchical SBR: outer AOT 5 carrying the extension rate, then the
    /// base object type.
    #[must_use]
    pub fn build_explicit_sbr(&self, ext_sr_index: u8) -> Vec<u8> {
        let mut w = BitWriter::new();
        let _ = w.write_bits(5, 5);
        let _ = w.write_bits(self.sr_index as u64, 4);
        let _ = w.write_bits(self.channels as u64, 4);
        let _ = w.write_bits(ext_sr_index as u64, 4);
        let _ = w.write_bits(self.audio_object_type as u64, 5);
        w.finish()
    }
}

/// The top fields of a parsed `AudioSpecificConfig`.
///
/// Only the leading fields are decoded; that is all the importer layer needs
/// to validate configs and derive track audio properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialAudioSpecificConfig {
    /// Audio object type (after the 31/escape expansion).
    pub audio_object_type: u16,
    /// Sampling frequency in Hz.
    pub sampling_frequency: u32,
    /// Channel configuration.
    pub channel_configuration: u8,
}

impl PartialAudioSpecificConfig {
    /// Parses the leading fields of an `AudioSpecificConfig`.
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let mut r = BitReader::new(data);
        let mut aot = r.read_bits(5)? as u16;
        if aot == 31 {
            aot = 32 + r.read_bits(6)? as u16;
        }
        let sr_index = r.read_bits(4)? as usize;
        let sampling_frequency = if sr_index == 15 {
            r.read_bits(24)? as u32
        } else {
            match SAMPLE_RATES[sr_index] {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "reserved sampling frequency index",
                    ));
                }
                rate => rate,
            }
        };
        let channel_configuration = r.read_bits(4)? as u8;
        Ok(PartialAudioSpecificConfig {
            audio_object_type: aot,
            sampling_frequency,
            channel_configuration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_round_trip() {
        let asc = AudioSpecificConfig {
            audio_object_type: 2,
            sr_index: 4,
            channels: 2,
        };
        let data = asc.build();
        assert_eq!(data.len(), 2);
        let parsed = PartialAudioSpecificConfig::parse(&data).unwrap();
        assert_eq!(parsed.audio_object_type, 2);
        assert_eq!(parsed.sampling_frequency, 44100);
        assert_eq!(parsed.channel_configuration, 2);
    }

    #[test]
    fn explicit_sbr_layout() {
        let asc = AudioSpecificConfig {
            audio_object_type: 2,
            sr_index: 6, // 24000 core
            channels: 2,
        };
        let data = asc.build_explicit_sbr(3); // 48000 output
        let mut r = BitReader::new(&data);
        assert_eq!(r.read_bits(5).unwrap(), 5);
        assert_eq!(r.read_bits(4).unwrap(), 6);
        assert_eq!(r.read_bits(4).unwrap(), 2);
        assert_eq!(r.read_bits(4).unwrap(), 3);
        assert_eq!(r.read_bits(5).unwrap(), 2);
    }

    #[test]
    fn implicit_sbr_sync_extension() {
        let asc = AudioSpecificConfig {
            audio_object_type: 2,
            sr_index: 6,
            channels: 2,
        };
        let data = asc.build_implicit_sbr(3);
        let mut r = BitReader::new(&data);
        r.skip_bits(13).unwrap();
        r.align();
        assert_eq!(r.read_bits(11).unwrap(), 0x2b7);
        assert_eq!(r.read_bits(5).unwrap(), 5);
        assert!(r.read_bit().unwrap());
        assert_eq!(r.read_bits(4).unwrap(), 3);
    }

    #[test]
    fn rate_index_lookup() {
        assert_eq!(sample_rate_index(44100), Some(4));
        assert_eq!(sample_rate_index(88200), Some(1));
        assert_eq!(sample_rate_index(44101), None);
        assert_eq!(sample_rate_index(0), None);
    }
}
