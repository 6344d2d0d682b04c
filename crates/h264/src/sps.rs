use std::io;

use bytes_util::BitReader;
use expgolomb::BitReaderExpGolombExt;

/// VUI timing information, present when the encoder declared a frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VuiTiming {
    /// `num_units_in_tick`.
    pub num_units_in_tick: u32,
    /// `time_scale`; two ticks per frame, so fps = time_scale / (2 * num_units).
    pub time_scale: u32,
    /// `fixed_frame_rate_flag`.
    pub fixed_frame_rate: bool,
}

/// The subset of the sequence parameter set the importer uses.
/// ISO/IEC 14496-10 - 7.3.2.1.
#[derive(Debug, Clone, PartialEq)]
pub struct Sps {
    /// `profile_idc`.
    pub profile_idc: u8,
    /// The constraint-set flags byte (including the reserved bits).
    pub constraint_set_flags: u8,
    /// `level_idc`.
    pub level_idc: u8,
    /// `seq_parameter_set_id` (0..=31).
    pub sps_id: u8,
    /// `log2_max_frame_num_minus4` + 4.
    pub log2_max_frame_num: u8,
    /// `pic_order_cnt_type` (0..=2).
    pub poc_type: u8,
    /// `log2_max_pic_order_cnt_lsb_minus4` + 4 (poc type 0).
    pub log2_max_poc_lsb: u8,
    /// `delta_pic_order_always_zero_flag` (poc type 1).
    pub delta_pic_order_always_zero: bool,
    /// `offset_for_non_ref_pic` (poc type 1).
    pub offset_for_non_ref_pic: i32,
    /// `offset_for_top_to_bottom_field` (poc type 1).
    pub offset_for_top_to_bottom_field: i32,
    /// `offset_for_ref_frame` table (poc type 1).
    pub offsets_for_ref_frame: Vec<i32>,
    /// `max_num_ref_frames`.
    pub max_num_ref_frames: u8,
    /// `frame_mbs_only_flag`: cleared means the stream may be field coded
    /// (PAFF/MBAFF).
    pub frame_mbs_only: bool,
    /// `separate_colour_plane_flag` (high profiles).
    pub separate_colour_plane: bool,
    /// Luma width in pixels after cropping.
    pub width: u32,
    /// Luma height in pixels after cropping.
    pub height: u32,
    /// Sample aspect ratio from the VUI, when present.
    pub sar: Option<(u32, u32)>,
    /// VUI timing info, when present.
    pub timing: Option<VuiTiming>,
}

const SAR_TABLE: [(u32, u32); 17] = [
    (0, 0),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

fn skip_scaling_list(r: &mut BitReader<'_>, size: u32) -> io::Result<()> {
    let mut last_scale = 8i64;
    let mut next_scale = 8i64;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = r.read_signed_exp_golomb()?;
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

impl Sps {
    /// Parses an SPS from its unescaped RBSP, NAL header byte included.
    pub fn parse(rbsp: &[u8]) -> io::Result<Sps> {
        let mut r = BitReader::new(rbsp);
        r.skip_bits(8).map_err(bad("truncated SPS"))?; // NAL header

        let profile_idc = r.read_bits(8)? as u8;
        let constraint_set_flags = r.read_bits(8)? as u8;
        let level_idc = r.read_bits(8)? as u8;
        let sps_id = r.read_exp_golomb()? as u8;
        if sps_id > 31 {
            return Err(invalid("seq_parameter_set_id out of range"));
        }

        let mut chroma_format_idc = 1u64;
        let mut separate_colour_plane = false;
        if matches!(
            profile_idc,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
        ) {
            chroma_format_idc = r.read_exp_golomb()?;
            if chroma_format_idc == 3 {
                separate_colour_plane = r.read_bit()?;
            }
            r.read_exp_golomb()?; // bit_depth_luma_minus8
            r.read_exp_golomb()?; // bit_depth_chroma_minus8
            r.read_bit()?; // qpprime_y_zero_transform_bypass
            if r.read_bit()? {
                // seq_scaling_matrix_present
                let count = if chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..count {
                    if r.read_bit()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        let log2_max_frame_num = r.read_exp_golomb()? as u8 + 4;
        let poc_type = r.read_exp_golomb()? as u8;
        let mut log2_max_poc_lsb = 0;
        let mut delta_pic_order_always_zero = false;
        let mut offset_for_non_ref_pic = 0;
        let mut offset_for_top_to_bottom_field = 0;
        let mut offsets_for_ref_frame = Vec::new();
        match poc_type {
            0 => log2_max_poc_lsb = r.read_exp_golomb()? as u8 + 4,
            1 => {
                delta_pic_order_always_zero = r.read_bit()?;
                offset_for_non_ref_pic = r.read_signed_exp_golomb()? as i32;
                offset_for_top_to_bottom_field = r.read_signed_exp_golomb()? as i32;
                let count = r.read_exp_golomb()?;
                if count > 255 {
                    return Err(invalid("num_ref_frames_in_pic_order_cnt_cycle"));
                }
                for _ in 0..count {
                    offsets_for_ref_frame.push(r.read_signed_exp_golomb()? as i32);
                }
            }
            2 => {}
            _ => return Err(invalid("pic_order_cnt_type")),
        }

        let max_num_ref_frames = r.read_exp_golomb()? as u8;
        r.read_bit()?; // gaps_in_frame_num_value_allowed
        let pic_width_in_mbs = r.read_exp_golomb()? as u32 + 1;
        let pic_height_in_map_units = r.read_exp_golomb()? as u32 + 1;
        let frame_mbs_only = r.read_bit()?;
        if !frame_mbs_only {
            r.read_bit()?; // mb_adaptive_frame_field
        }
        r.read_bit()?; // direct_8x8_inference

        let mut width = pic_width_in_mbs * 16;
        let mut height = (if frame_mbs_only { 1 } else { 2 }) * pic_height_in_map_units * 16;
        if r.read_bit()? {
            // frame cropping
            let left = r.read_exp_golomb()? as u32;
            let right = r.read_exp_golomb()? as u32;
            let top = r.read_exp_golomb()? as u32;
            let bottom = r.read_exp_golomb()? as u32;
            let (crop_x, crop_y) = match chroma_format_idc {
                0 => (1, if frame_mbs_only { 1 } else { 2 }),
                1 => (2, 2 * if frame_mbs_only { 1 } else { 2 }),
                2 => (2, if frame_mbs_only { 1 } else { 2 }),
                _ => (1, if frame_mbs_only { 1 } else { 2 }),
            };
            width = width.saturating_sub((left + right) * crop_x);
            height = height.saturating_sub((top + bottom) * crop_y);
        }

        let mut sar = None;
        let mut timing = None;
        if r.read_bit()? {
            // VUI parameters
            if r.read_bit()? {
                // aspect_ratio_info
                let idc = r.read_bits(8)? as usize;
                if idc == 255 {
                    let num = r.read_bits(16)? as u32;
                    let den = r.read_bits(16)? as u32;
                    sar = Some((num, den));
                } else if idc < SAR_TABLE.len() && idc > 0 {
                    sar = Some(SAR_TABLE[idc]);
                }
            }
            if r.read_bit()? {
                // overscan
                r.read_bit()?;
            }
            if r.read_bit()? {
                // video signal type
                r.skip_bits(3 + 1)?;
                if r.read_bit()? {
                    r.skip_bits(24)?;
                }
            }
            if r.read_bit()? {
                // chroma sample loc
                r.read_exp_golomb()?;
                r.read_exp_golomb()?;
            }
            if r.read_bit()? {
                timing = Some(VuiTiming {
                    num_units_in_tick: r.read_bits(32)? as u32,
                    time_scale: r.read_bits(32)? as u32,
                    fixed_frame_rate: r.read_bit()?,
                });
            }
        }

        Ok(Sps {
            profile_idc,
            constraint_set_flags,
            level_idc,
            sps_id,
            log2_max_frame_num,
            poc_type,
            log2_max_poc_lsb,
            delta_pic_order_always_zero,
            offset_for_non_ref_pic,
            offset_for_top_to_bottom_field,
            offsets_for_ref_frame,
            max_num_ref_frames,
            frame_mbs_only,
            separate_colour_plane,
            width,
            height,
            sar,
            timing,
        })
    }

    /// Frame rate implied by the VUI timing, when declared fixed.
    #[must_use]
    pub fn fixed_fps(&self) -> Option<f64> {
        let t = self.timing?;
        if !t.fixed_frame_rate || t.num_units_in_tick == 0 {
            return None;
        }
        Some(t.time_scale as f64 / (2.0 * t.num_units_in_tick as f64))
    }
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn bad(msg: &'static str) -> impl Fn(io::Error) -> io::Error {
    move |_| invalid(msg)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes_util::BitWriter;
    use expgolomb::BitWriterExpGolombExt;

    /// Builds a baseline SPS RBSP (poc type 0) for tests.
    pub(crate) fn build_sps(
        sps_id: u8,
        poc_type: u8,
        log2_max_poc_lsb: u8,
        width_mbs: u32,
        height_mbs: u32,
        frame_mbs_only: bool,
        timing: Option<(u32, u32, bool)>,
    ) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0x67, 8).unwrap(); // NAL header: SPS
        w.write_bits(66, 8).unwrap(); // baseline
        w.write_bits(0xC0, 8).unwrap(); // constraints
        w.write_bits(30, 8).unwrap(); // level 3.0
        w.write_exp_golomb(sps_id as u64).unwrap();
        w.write_exp_golomb(0).unwrap(); // log2_max_frame_num_minus4
        w.write_exp_golomb(poc_type as u64).unwrap();
        if poc_type == 0 {
            w.write_exp_golomb(log2_max_poc_lsb as u64 - 4).unwrap();
        }
        w.write_exp_golomb(2).unwrap(); // max_num_ref_frames
        w.write_bit(false); // gaps allowed
        w.write_exp_golomb(width_mbs as u64 - 1).unwrap();
        w.write_exp_golomb(height_mbs as u64 - 1).unwrap();
        w.write_bit(frame_mbs_only);
        if !frame_mbs_only {
            w.write_bit(false); // mbaff
        }
        w.write_bit(true); // direct_8x8
        w.write_bit(false); // no cropping
        match timing {
            None => w.write_bit(false),
            Some((num_units, time_scale, fixed)) => {
                w.write_bit(true); // vui present
                w.write_bit(false); // no aspect
                w.write_bit(false); // no overscan
                w.write_bit(false); // no signal type
                w.write_bit(false); // no chroma loc
                w.write_bit(true); // timing
                w.write_bits(num_units as u64, 32).unwrap();
                w.write_bits(time_scale as u64, 32).unwrap();
                w.write_bit(fixed);
            }
        }
        w.write_bit(true); // rbsp stop bit
        w.finish()
    }

    #[test]
    fn baseline_dimensions() {
        let rbsp = build_sps(0, 0, 8, 40, 30, true, None);
        let sps = Sps::parse(&rbsp).unwrap();
        assert_eq!(sps.profile_idc, 66);
        assert_eq!(sps.level_idc, 30);
        assert_eq!((sps.width, sps.height), (640, 480));
        assert_eq!(sps.poc_type, 0);
        assert_eq!(sps.log2_max_poc_lsb, 8);
        assert!(sps.frame_mbs_only);
        assert!(sps.timing.is_none());
    }

    #[test]
    fn vui_timing_fps() {
        let rbsp = build_sps(0, 0, 8, 8, 6, true, Some((1000, 50000, true)));
        let sps = Sps::parse(&rbsp).unwrap();
        let t = sps.timing.unwrap();
        assert_eq!(t.time_scale, 50000);
        assert!(t.fixed_frame_rate);
        assert_eq!(sps.fixed_fps(), Some(25.0));
    }

    #[test]
    fn interlace_doubles_height() {
        let rbsp = build_sps(0, 0, 8, 8, 6, false, None);
        let sps = Sps::parse(&rbsp).unwrap();
        assert!(!sps.frame_mbs_only);
        assert_eq!(sps.height, 6 * 16 * 2);
    }

    #[test]
    fn poc_type_2() {
        let rbsp = build_sps(1, 2, 0, 4, 4, true, None);
        let sps = Sps::parse(&rbsp).unwrap();
        assert_eq!(sps.poc_type, 2);
        assert_eq!(sps.sps_id, 1);
    }
}
