use std::io;

use bytes_util::BitReader;
use expgolomb::BitReaderExpGolombExt;

/// The subset of the picture parameter set needed to parse slice headers.
/// ISO/IEC 14496-10 - 7.3.2.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pps {
    /// `pic_parameter_set_id` (0..=255).
    pub pps_id: u8,
    /// `seq_parameter_set_id` the PPS refers to.
    pub sps_id: u8,
    /// `entropy_coding_mode_flag` (CABAC).
    pub entropy_coding_mode: bool,
    /// `bottom_field_pic_order_in_frame_present_flag`: when set, slices of
    /// poc type 0 carry `delta_pic_order_cnt_bottom`.
    pub pic_order_present: bool,
}

impl Pps {
    /// Parses a PPS from its unescaped RBSP, NAL header byte included.
    pub fn parse(rbsp: &[u8]) -> io::Result<Pps> {
        let mut r = BitReader::new(rbsp);
        r.skip_bits(8)?; // NAL header
        let pps_id = r.read_exp_golomb()?;
        if pps_id > 255 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "pic_parameter_set_id out of range",
            ));
        }
        let sps_id = r.read_exp_golomb()?;
        if sps_id > 31 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "seq_parameter_set_id out of range",
            ));
        }
        let entropy_coding_mode = r.read_bit()?;
        let pic_order_present = r.read_bit()?;
        Ok(Pps {
            pps_id: pps_id as u8,
            sps_id: sps_id as u8,
            entropy_coding_mode,
            pic_order_present,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes_util::BitWriter;
    use expgolomb::BitWriterExpGolombExt;

    pub(crate) fn build_pps(pps_id: u8, sps_id: u8, pic_order_present: bool) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0x68, 8).unwrap();
        w.write_exp_golomb(pps_id as u64).unwrap();
        w.write_exp_golomb(sps_id as u64).unwrap();
        w.write_bit(false); // CAVLC
        w.write_bit(pic_order_present);
        w.write_exp_golomb(0).unwrap(); // num_slice_groups_minus1
        w.write_bit(true); // stop
        w.finish()
    }

    #[test]
    fn parse_ids() {
        let pps = Pps::parse(&build_pps(3, 1, true)).unwrap();
        assert_eq!(pps.pps_id, 3);
        assert_eq!(pps.sps_id, 1);
        assert!(pps.pic_order_present);
        assert!(!pps.entropy_coding_mode);
    }
}
