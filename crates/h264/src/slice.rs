use std::io;

use bytes_util::BitReader;
use expgolomb::BitReaderExpGolombExt;

use crate::{NalUnitType, Pps, Sps};

/// Slice type after the modulo-5 fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    /// Predictive.
    P,
    /// Bidirectional.
    B,
    /// Intra.
    I,
    /// Switching P.
    Sp,
    /// Switching I.
    Si,
}

/// The decoded slice header fields used for access unit reconstruction and
/// picture order count computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceHeader {
    /// `first_mb_in_slice`; zero for the first slice of a picture.
    pub first_mb_in_slice: u32,
    /// Folded slice type.
    pub slice_type: SliceType,
    /// Referenced PPS.
    pub pps_id: u8,
    /// `nal_ref_idc` of the carrying NAL.
    pub nal_ref_idc: u8,
    /// Slice belongs to an IDR picture.
    pub idr: bool,
    /// `idr_pic_id` (IDR slices only).
    pub idr_pic_id: u32,
    /// `frame_num`.
    pub frame_num: u32,
    /// `field_pic_flag`.
    pub field_pic: bool,
    /// `bottom_field_flag`.
    pub bottom_field: bool,
    /// `pic_order_cnt_lsb` (poc type 0).
    pub poc_lsb: u32,
    /// `delta_pic_order_cnt_bottom` (poc type 0 with the PPS flag set).
    pub delta_poc_bottom: i32,
    /// `delta_pic_order_cnt[0..2]` (poc type 1).
    pub delta_poc: [i32; 2],
}

impl SliceHeader {
    /// Parses a slice header from unescaped RBSP (NAL header included),
    /// resolving the parameter sets through the provided tables.
    pub fn parse(
        rbsp: &[u8],
        sps_set: &[Option<Sps>],
        pps_set: &[Option<Pps>],
    ) -> io::Result<SliceHeader> {
        let mut r = BitReader::new(rbsp);
        let nal_header = r.read_bits(8)? as u8;
        let nal_ref_idc = (nal_header >> 5) & 0x3;
        let nal_type = NalUnitType::from_header(nal_header);
        let idr = nal_type == NalUnitType::IdrSlice;

        let first_mb_in_slice = r.read_exp_golomb()? as u32;
        let slice_type_raw = r.read_exp_golomb()?;
        if slice_type_raw > 9 {
            return Err(invalid("slice_type out of range"));
        }
        let slice_type = match slice_type_raw % 5 {
            0 => SliceType::P,
            1 => SliceType::B,
            2 => SliceType::I,
            3 => SliceType::Sp,
            _ => SliceType::Si,
        };
        let pps_id = r.read_exp_golomb()?;
        let pps = pps_set
            .get(pps_id as usize)
            .and_then(|p| p.as_ref())
            .ok_or_else(|| invalid("slice references unknown PPS"))?;
        let sps = sps_set
            .get(pps.sps_id as usize)
            .and_then(|s| s.as_ref())
            .ok_or_else(|| invalid("PPS references unknown SPS"))?;

        if sps.separate_colour_plane {
            r.skip_bits(2)?; // colour_plane_id
        }
        let frame_num = r.read_bits(sps.log2_max_frame_num as u32)? as u32;
        let mut field_pic = false;
        let mut bottom_field = false;
        if !sps.frame_mbs_only {
            field_pic = r.read_bit()?;
            if field_pic {
                bottom_field = r.read_bit()?;
            }
        }
        let mut idr_pic_id = 0;
        if idr {
            idr_pic_id = r.read_exp_golomb()? as u32;
        }
        let mut poc_lsb = 0;
        let mut delta_poc_bottom = 0;
        let mut delta_poc = [0i32; 2];
        match sps.poc_type {
            0 => {
                poc_lsb = r.read_bits(sps.log2_max_poc_lsb as u32)? as u32;
                if pps.pic_order_present && !field_pic {
                    delta_poc_bottom = r.read_signed_exp_golomb()? as i32;
                }
            }
            1 if !sps.delta_pic_order_always_zero => {
                delta_poc[0] = r.read_signed_exp_golomb()? as i32;
                if pps.pic_order_present && !field_pic {
                    delta_poc[1] = r.read_signed_exp_golomb()? as i32;
                }
            }
            _ => {}
        }

        Ok(SliceHeader {
            first_mb_in_slice,
            slice_type,
            pps_id: pps.pps_id,
            nal_ref_idc,
            idr,
            idr_pic_id,
            frame_num,
            field_pic,
            bottom_field,
            poc_lsb,
            delta_poc_bottom,
            delta_poc,
        })
    }
}

/// Access unit boundary test between two consecutive first slices
/// (ISO/IEC 14496-10 - 7.4.1.2.4, the subset relevant to import).
///
/// The caller only asks for slices with `first_mb_in_slice == 0`; slices
/// continuing the same picture never open a new unit.
#[must_use]
pub fn is_new_access_unit(prev: &SliceHeader, cur: &SliceHeader) -> bool {
    if cur.first_mb_in_slice != 0 {
        return false;
    }
    if prev.frame_num != cur.frame_num
        || prev.pps_id != cur.pps_id
        || prev.field_pic != cur.field_pic
        || prev.idr != cur.idr
    {
        return true;
    }
    if prev.field_pic && cur.field_pic && prev.bottom_field != cur.bottom_field {
        return true;
    }
    if (prev.nal_ref_idc == 0) != (cur.nal_ref_idc == 0) {
        return true;
    }
    if prev.idr && cur.idr && prev.idr_pic_id != cur.idr_pic_id {
        return true;
    }
    if prev.poc_lsb != cur.poc_lsb || prev.delta_poc_bottom != cur.delta_poc_bottom {
        return true;
    }
    prev.delta_poc != cur.delta_poc
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pps::tests::build_pps;
    use crate::sps::tests::build_sps;
    use bytes_util::BitWriter;
    use expgolomb::BitWriterExpGolombExt;

    /// Builds a minimal slice RBSP for the test parameter sets
    /// (poc type 0, log2_max_poc_lsb 8, log2_max_frame_num 4).
    pub(crate) fn build_slice(
        idr: bool,
        nal_ref_idc: u8,
        slice_type: u64,
        frame_num: u32,
        poc_lsb: u32,
    ) -> Vec<u8> {
        let mut w = BitWriter::new();
        let nal_type = if idr { 5 } else { 1 };
        w.write_bits(((nal_ref_idc as u64) << 5) | nal_type, 8).unwrap();
        w.write_exp_golomb(0).unwrap(); // first_mb_in_slice
        w.write_exp_golomb(slice_type).unwrap();
        w.write_exp_golomb(0).unwrap(); // pps id
        w.write_bits(frame_num as u64, 4).unwrap();
        if idr {
            w.write_exp_golomb(1).unwrap(); // idr_pic_id
        }
        w.write_bits(poc_lsb as u64, 8).unwrap();
        w.write_bits(0x3FF, 10).unwrap(); // slice data filler
        w.finish()
    }

    pub(crate) fn test_param_sets() -> (Vec<Option<Sps>>, Vec<Option<Pps>>) {
        let sps = Sps::parse(&build_sps(0, 0, 8, 40, 30, true, None)).unwrap();
        let pps = Pps::parse(&build_pps(0, 0, false)).unwrap();
        let mut sps_set = vec![None; 32];
        sps_set[0] = Some(sps);
        let mut pps_set = vec![None; 256];
        pps_set[0] = Some(pps);
        (sps_set, pps_set)
    }

    #[test]
    fn parse_idr_slice() {
        let (sps_set, pps_set) = test_param_sets();
        let data = build_slice(true, 3, 2, 0, 0);
        let s = SliceHeader::parse(&data, &sps_set, &pps_set).unwrap();
        assert!(s.idr);
        assert_eq!(s.slice_type, SliceType::I);
        assert_eq!(s.frame_num, 0);
        assert_eq!(s.poc_lsb, 0);
        assert_eq!(s.nal_ref_idc, 3);
    }

    #[test]
    fn au_boundary_on_frame_num_change() {
        let (sps_set, pps_set) = test_param_sets();
        let a = SliceHeader::parse(&build_slice(false, 2, 0, 1, 2), &sps_set, &pps_set).unwrap();
        let b = SliceHeader::parse(&build_slice(false, 2, 0, 2, 4), &sps_set, &pps_set).unwrap();
        assert!(is_new_access_unit(&a, &b));
        let same = a;
        assert!(!is_new_access_unit(&a, &same));
    }

    #[test]
    fn unknown_pps_rejected() {
        let (sps_set, _) = test_param_sets();
        let empty_pps = vec![None; 256];
        assert!(SliceHeader::parse(&build_slice(false, 2, 0, 1, 2), &sps_set, &empty_pps).is_err());
    }
}
