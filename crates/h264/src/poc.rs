use crate::{SliceHeader, Sps};

/// Picture order count reconstruction state (ISO/IEC 14496-10 - 8.2.1).
///
/// One context per stream; [`PocContext::compute`] is called once per
/// picture (the first slice of each access unit) and returns the POC the
/// importer stores as the provisional CTS offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct PocContext {
    poc_lsb_prev: u32,
    poc_msb_prev: i32,
    frame_num_prev: u32,
    frame_num_offset_prev: u32,
}

impl PocContext {
    /// Clears the context (at IDR pictures).
    pub fn reset(&mut self) {
        *self = PocContext::default();
    }

    /// Computes the POC of the picture opened by `slice`.
    pub fn compute(&mut self, sps: &Sps, slice: &SliceHeader) -> i32 {
        match sps.poc_type {
            0 => self.compute_type0(sps, slice),
            1 => self.compute_type1(sps, slice),
            _ => self.compute_type2(sps, slice),
        }
    }

    fn compute_type0(&mut self, sps: &Sps, slice: &SliceHeader) -> i32 {
        if slice.idr {
            self.poc_lsb_prev = 0;
            self.poc_msb_prev = 0;
        }
        let max_lsb = 1i32 << sps.log2_max_poc_lsb;
        let lsb = slice.poc_lsb as i32;
        let prev_lsb = self.poc_lsb_prev as i32;
        let msb = if lsb < prev_lsb && prev_lsb - lsb >= max_lsb / 2 {
            self.poc_msb_prev + max_lsb
        } else if lsb > prev_lsb && lsb - prev_lsb > max_lsb / 2 {
            self.poc_msb_prev - max_lsb
        } else {
            self.poc_msb_prev
        };
        let top = msb + lsb;
        let bottom = if slice.field_pic {
            top
        } else {
            top + slice.delta_poc_bottom
        };
        if slice.nal_ref_idc != 0 {
            self.poc_lsb_prev = slice.poc_lsb;
            self.poc_msb_prev = msb;
        }
        if slice.field_pic {
            top
        } else {
            top.min(bottom)
        }
    }

    fn frame_num_offset(&mut self, sps: &Sps, slice: &SliceHeader) -> u32 {
        let max_frame_num = 1u32 << sps.log2_max_frame_num;
        let offset = if slice.idr {
            0
        } else if self.frame_num_prev > slice.frame_num {
            self.frame_num_offset_prev + max_frame_num
        } else {
            self.frame_num_offset_prev
        };
        self.frame_num_prev = slice.frame_num;
        self.frame_num_offset_prev = offset;
        offset
    }

    fn compute_type1(&mut self, sps: &Sps, slice: &SliceHeader) -> i32 {
        let offset = self.frame_num_offset(sps, slice);
        let cycle_len = sps.offsets_for_ref_frame.len() as u32;
        let mut abs_frame_num = if cycle_len != 0 {
            offset + slice.frame_num
        } else {
            0
        };
        if slice.nal_ref_idc == 0 && abs_frame_num > 0 {
            abs_frame_num -= 1;
        }
        let expected_delta: i32 = sps.offsets_for_ref_frame.iter().sum();
        let mut expected = 0i32;
        if abs_frame_num > 0 {
            let cycle_cnt = (abs_frame_num - 1) / cycle_len;
            let in_cycle = (abs_frame_num - 1) % cycle_len;
            expected = cycle_cnt as i32 * expected_delta;
            for off in &sps.offsets_for_ref_frame[..=in_cycle as usize] {
                expected += off;
            }
        }
        if slice.nal_ref_idc == 0 {
            expected += sps.offset_for_non_ref_pic;
        }
        let top = expected + slice.delta_poc[0];
        let bottom = top + sps.offset_for_top_to_bottom_field + slice.delta_poc[1];
        if slice.field_pic {
            if slice.bottom_field { bottom } else { top }
        } else {
            top.min(bottom)
        }
    }

    fn compute_type2(&mut self, sps: &Sps, slice: &SliceHeader) -> i32 {
        let offset = self.frame_num_offset(sps, slice);
        let mut poc = 2 * (offset + slice.frame_num) as i32;
        if slice.nal_ref_idc == 0 {
            poc -= 1;
        }
        poc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::tests::{build_slice, test_param_sets};
    use crate::SliceHeader;

    fn parse(idr: bool, nal_ref_idc: u8, frame_num: u32, poc_lsb: u32) -> SliceHeader {
        let (sps_set, pps_set) = test_param_sets();
        SliceHeader::parse(
            &build_slice(idr, nal_ref_idc, if idr { 2 } else { 0 }, frame_num, poc_lsb),
            &sps_set,
            &pps_set,
        )
        .unwrap()
    }

    #[test]
    fn type0_reorder_sequence() {
        let (sps_set, _) = test_param_sets();
        let sps = sps_set[0].as_ref().unwrap();
        let mut ctx = PocContext::default();
        // IDR(0), P(4), B(2), B(1), B(3) in decode order
        assert_eq!(ctx.compute(sps, &parse(true, 3, 0, 0)), 0);
        assert_eq!(ctx.compute(sps, &parse(false, 2, 1, 4)), 4);
        assert_eq!(ctx.compute(sps, &parse(false, 0, 2, 2)), 2);
        assert_eq!(ctx.compute(sps, &parse(false, 0, 2, 1)), 1);
        assert_eq!(ctx.compute(sps, &parse(false, 0, 2, 3)), 3);
    }

    #[test]
    fn type0_lsb_wrap() {
        let (sps_set, _) = test_param_sets();
        let sps = sps_set[0].as_ref().unwrap();
        let mut ctx = PocContext::default();
        // log2_max_poc_lsb is 8 -> max 256
        assert_eq!(ctx.compute(sps, &parse(true, 3, 0, 0)), 0);
        assert_eq!(ctx.compute(sps, &parse(false, 2, 1, 250)), 250);
        // wraps past 255: msb advances by 256
        assert_eq!(ctx.compute(sps, &parse(false, 2, 2, 2)), 258);
    }
}
