use std::io;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use bytes_util::BytesCursorExt;

/// The AVC decoder configuration record carried as codec config of H.264
/// tracks. ISO/IEC 14496-15 - 5.3.2.1.2.
#[derive(Debug, Clone, PartialEq)]
pub struct AvcDecoderConfigurationRecord {
    /// Always 1.
    pub configuration_version: u8,
    /// `profile_idc` of the driving SPS.
    pub profile_indication: u8,
    /// The constraint-set flags byte.
    pub profile_compatibility: u8,
    /// `level_idc` of the driving SPS.
    pub level_indication: u8,
    /// Byte width of the per-NALU size field (1, 2 or 4).
    pub nal_unit_size: u8,
    /// SPS NAL units, stored verbatim (escaped form).
    pub sps: Vec<Bytes>,
    /// PPS NAL units, stored verbatim (escaped form).
    pub pps: Vec<Bytes>,
}

impl AvcDecoderConfigurationRecord {
    /// An empty record waiting for parameter sets; the size field defaults
    /// to 4 bytes until the framer settles on its final width.
    #[must_use]
    pub fn new() -> Self {
        AvcDecoderConfigurationRecord {
            configuration_version: 1,
            profile_indication: 0,
            profile_compatibility: 0,
            level_indication: 0,
            nal_unit_size: 4,
            sps: Vec::new(),
            pps: Vec::new(),
        }
    }

    /// Serializes the record.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.configuration_version);
        out.push(self.profile_indication);
        out.push(self.profile_compatibility);
        out.push(self.level_indication);
        out.push(0xFC | (self.nal_unit_size - 1));
        out.push(0xE0 | (self.sps.len() as u8 & 0x1F));
        for sps in &self.sps {
            let _ = out.write_u16::<BigEndian>(sps.len() as u16);
            out.extend_from_slice(sps);
        }
        out.push(self.pps.len() as u8);
        for pps in &self.pps {
            let _ = out.write_u16::<BigEndian>(pps.len() as u16);
            out.extend_from_slice(pps);
        }
        out
    }

    /// Parses a serialized record.
    pub fn parse(data: Bytes) -> io::Result<Self> {
        let mut r = io::Cursor::new(data);
        let configuration_version = r.read_u8()?;
        let profile_indication = r.read_u8()?;
        let profile_compatibility = r.read_u8()?;
        let level_indication = r.read_u8()?;
        let nal_unit_size = (r.read_u8()? & 0x3) + 1;
        let num_sps = r.read_u8()? & 0x1F;
        let mut sps = Vec::with_capacity(num_sps as usize);
        for _ in 0..num_sps {
            let len = r.read_u16::<BigEndian>()? as usize;
            sps.push(r.extract_bytes(len)?);
        }
        let num_pps = r.read_u8()?;
        let mut pps = Vec::with_capacity(num_pps as usize);
        for _ in 0..num_pps {
            let len = r.read_u16::<BigEndian>()? as usize;
            pps.push(r.extract_bytes(len)?);
        }
        Ok(AvcDecoderConfigurationRecord {
            configuration_version,
            profile_indication,
            profile_compatibility,
            level_indication,
            nal_unit_size,
            sps,
            pps,
        })
    }
}

impl Default for AvcDecoderConfigurationRecord {
    fn default() -> Self {
        Self::new()
    }
}
