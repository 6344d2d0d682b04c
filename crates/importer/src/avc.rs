use std::path::Path;

use bytes::Bytes;
use h264::{
    AvcDecoderConfigurationRecord, NalIter, NalUnitType, PocContext, Pps, SeiInfo, SliceHeader,
    SliceType, Sps, is_new_access_unit, trim_sei_payload, unescape_rbsp,
};
use media_types::{
    CodecId, ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind, Result, Sink,
    SinkAck, StreamDescriptor, StreamHandle, StreamType, TrackCatalog, TrackInfo, VideoInfo,
    video_timing,
};
use tracing::{debug, info, warn};

/// H.264/AVC Annex-B importer.
///
/// Frames NALUs into access units, collects SPS/PPS into the decoder
/// configuration record, self-tunes the per-NALU size field, tracks picture
/// order counts and resolves the final composition offsets in a rewrite
/// pass over the emitted samples.
pub struct AvcImporter {
    data: Vec<u8>,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    parsed: Option<Parsed>,
    emit_idx: usize,
    rewritten: bool,
    done: bool,
}

struct Parsed {
    samples: Vec<MediaSample>,
    final_offsets: Vec<i64>,
    timescale: u32,
}

/// Everything the per-NAL loop accumulates.
struct ParseState {
    timescale: u32,
    dts_inc: u64,
    size_bytes: usize,
    size_forced: bool,

    config: AvcDecoderConfigurationRecord,
    sps_set: Vec<Option<Sps>>,
    pps_set: Vec<Option<Pps>>,
    max_width: u32,
    max_height: u32,
    pixel_aspect: Option<(u32, u32)>,

    samples: Vec<MediaSample>,
    au_data: Vec<u8>,
    au_has_slice: bool,
    au_is_idr: bool,
    au_recovery: bool,
    prev_slice: Option<SliceHeader>,

    poc_ctx: PocContext,
    last_poc: i32,
    max_last_poc: i32,
    max_last_b_poc: i32,
    min_poc: i32,
    poc_shift: i32,
    poc_diff: i32,
    b_frames: u32,
    max_delay: u32,
    max_total_delay: u32,
    has_cts_offset: bool,
    is_paff: bool,
    ref_frame: Option<usize>,

    nb_idr: u32,
    nb_p: u32,
    nb_b: u32,
    nb_i: u32,
    nb_sei: u32,
}

enum ParseEnd {
    Done(ParseState),
    RestartWithFps(f64),
}

impl ParseState {
    fn new(timescale: u32, dts_inc: u64, forced_size_bits: Option<u32>) -> ParseState {
        let (size_bytes, size_forced) = match forced_size_bits {
            Some(bits @ (8 | 16 | 32)) => ((bits / 8) as usize, true),
            Some(_) => (4, true),
            None => (1, false),
        };
        ParseState {
            timescale,
            dts_inc,
            size_bytes,
            size_forced,
            config: AvcDecoderConfigurationRecord::new(),
            sps_set: vec![None; 32],
            pps_set: vec![None; 256],
            max_width: 0,
            max_height: 0,
            pixel_aspect: None,
            samples: Vec::new(),
            au_data: Vec::new(),
            au_has_slice: false,
            au_is_idr: false,
            au_recovery: false,
            prev_slice: None,
            poc_ctx: PocContext::default(),
            last_poc: 0,
            max_last_poc: 0,
            max_last_b_poc: 0,
            min_poc: 0,
            poc_shift: 0,
            poc_diff: 0,
            b_frames: 0,
            max_delay: 0,
            max_total_delay: 0,
            has_cts_offset: false,
            is_paff: false,
            ref_frame: None,
            nb_idr: 0,
            nb_p: 0,
            nb_b: 0,
            nb_i: 0,
            nb_sei: 0,
        }
    }

    /// Appends a size-prefixed NAL to the open access unit, widening the
    /// size field first when the NAL does not fit. Widening rewrites every
    /// sample already assembled (and the open unit).
    fn push_nal(&mut self, nal: &[u8]) {
        if !self.size_forced {
            let needed = smallest_size_bytes(nal.len());
            if needed > self.size_bytes {
                info!(
                    from = self.size_bytes * 8,
                    to = needed * 8,
                    "widening NALU size field"
                );
                for samp in &mut self.samples {
                    samp.data = Bytes::from(rewrite_nal_sizes(
                        &samp.data,
                        self.size_bytes,
                        needed,
                    ));
                }
                self.au_data = rewrite_nal_sizes(&self.au_data, self.size_bytes, needed);
                self.size_bytes = needed;
            }
        }
        write_size(&mut self.au_data, nal.len(), self.size_bytes);
        self.au_data.extend_from_slice(nal);
    }

    /// Closes the open access unit into a sample carrying the raw POC as
    /// its provisional CTS offset.
    fn flush_sample(&mut self) {
        if self.au_data.is_empty() {
            return;
        }
        let dts = self.dts_inc * self.samples.len() as u64;
        let rap = if self.au_is_idr {
            RapKind::Sync
        } else if self.au_recovery {
            // roll-recovery anchor, exposed as SAP3, never as sync
            RapKind::Sap3
        } else {
            RapKind::None
        };
        let mut samp = MediaSample::new(std::mem::take(&mut self.au_data), dts, rap);
        samp.cts_offset = (self.last_poc - self.poc_shift) as i64;
        self.samples.push(samp);
        if self.min_poc > self.last_poc {
            self.min_poc = self.last_poc;
        }
        self.au_has_slice = false;
        self.au_is_idr = false;
        self.au_recovery = false;
    }

    /// POC bookkeeping for the first slice of an access unit.
    fn track_slice(&mut self, sps_id: u8, slice: &SliceHeader) {
        let Some(sps) = self.sps_set[sps_id as usize].as_ref() else {
            return;
        };
        if !self.is_paff && slice.bottom_field {
            self.is_paff = true;
        }
        let poc = self.poc_ctx.compute(sps, slice);
        debug!(poc, idr = slice.idr, "picture");
        if poc < self.poc_shift {
            if let Some(rf) = self.ref_frame {
                let delta = (self.poc_shift - poc) as i64;
                for samp in &mut self.samples[rf..] {
                    samp.cts_offset += delta;
                }
            }
            self.poc_shift = poc;
        }
        if poc != self.last_poc {
            let diff = (poc - self.last_poc).abs();
            if self.poc_diff == 0 || self.poc_diff > diff {
                self.poc_diff = diff;
            }
            self.last_poc = poc;
        }
        if slice.idr {
            self.nb_idr += 1;
            self.ref_frame = Some(self.samples.len());
            self.max_last_poc = 0;
            self.last_poc = 0;
            self.max_last_b_poc = 0;
            self.b_frames = 0;
            self.max_delay = 0;
            self.poc_shift = 0;
        } else if self.max_last_poc < self.last_poc {
            // a new forward anchor
            self.max_last_poc = self.last_poc;
            self.max_last_b_poc = 0;
            self.b_frames = 0;
            self.max_delay = 0;
        } else if self.max_last_poc > self.last_poc {
            // out-of-order picture
            self.has_cts_offset = true;
            if slice.slice_type == SliceType::B {
                if self.max_last_b_poc == 0 {
                    self.b_frames += 1;
                } else if self.last_poc < self.max_last_b_poc {
                    // a B used as reference
                    self.b_frames += 1;
                    if self.max_delay < self.b_frames {
                        self.max_delay = self.b_frames;
                        if self.max_total_delay < self.max_delay {
                            self.max_total_delay = self.max_delay;
                        }
                    }
                    self.b_frames = 0;
                }
                self.max_last_b_poc = self.last_poc;
            }
        }
    }

    /// Resolves the final CTS offsets from the provisional POC values.
    fn final_offsets(&self) -> Vec<i64> {
        let n = self.samples.len();
        if !self.has_cts_offset {
            return vec![0; n];
        }
        let inc = self.dts_inc as i64;
        let poc_diff = if self.poc_diff == 0 { 1 } else { self.poc_diff } as i64;
        let (min_poc, max_total_delay) = if self.max_total_delay == 0 {
            (0i64, 1i64)
        } else {
            (self.min_poc as i64, self.max_total_delay as i64)
        };
        let min_poc_abs = -min_poc;

        let mut offsets = Vec::with_capacity(n);
        let mut cts_vals: Vec<i64> = Vec::with_capacity(n);
        let mut last_dts = 0i64;
        let mut max_cts = 0i64;
        let mut last_cts_samp = 0usize;
        for i in 0..n {
            let dts = self.samples[i].dts as i64;
            if self.samples[i].rap == RapKind::Sync {
                last_dts = dts;
            }
            let raw = self.samples[i].cts_offset;
            let mut cts =
                (min_poc_abs + raw) * inc / poc_diff + last_dts + max_total_delay * inc;
            if self.is_paff {
                // two fields share one aggregated sample
                cts /= 2;
                if cts % inc != 0 {
                    cts = (cts / inc + 1) * inc;
                }
            }
            let off = cts - dts;
            if max_cts < cts {
                max_cts = cts;
                last_cts_samp = i;
            }
            if off < 0 {
                // weird POC increase; clamp and nudge colliding samples up
                offsets.push(0);
                cts_vals.push(dts);
                for j in last_cts_samp..i {
                    for k in j + 1..=i {
                        if cts_vals[j] == cts_vals[k] {
                            max_cts += inc;
                            cts_vals[k] = max_cts;
                            offsets[k] = max_cts - self.samples[k].dts as i64;
                        }
                    }
                }
                max_cts = cts_vals[i];
            } else {
                offsets.push(off);
                cts_vals.push(cts);
            }
        }
        offsets
    }
}

fn smallest_size_bytes(len: usize) -> usize {
    if len <= 0xFF {
        1
    } else if len <= 0xFFFF {
        2
    } else {
        4
    }
}

fn write_size(out: &mut Vec<u8>, len: usize, size_bytes: usize) {
    match size_bytes {
        1 => out.push(len as u8),
        2 => out.extend_from_slice(&(len as u16).to_be_bytes()),
        _ => out.extend_from_slice(&(len as u32).to_be_bytes()),
    }
}

fn read_size(data: &[u8], size_bytes: usize) -> usize {
    match size_bytes {
        1 => data[0] as usize,
        2 => u16::from_be_bytes([data[0], data[1]]) as usize,
        _ => u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize,
    }
}

/// Re-prefixes every NAL of a size-prefixed buffer with a wider size field.
/// The NAL payload bytes are untouched.
fn rewrite_nal_sizes(data: &[u8], old_bytes: usize, new_bytes: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 16 + 8);
    let mut pos = 0usize;
    while pos + old_bytes <= data.len() {
        let size = read_size(&data[pos..], old_bytes);
        pos += old_bytes;
        let end = (pos + size).min(data.len());
        write_size(&mut out, size, new_bytes);
        out.extend_from_slice(&data[pos..end]);
        pos = end;
    }
    out
}

impl AvcImporter {
    /// Opens an Annex-B `.h264` file.
    pub fn from_path(path: &Path) -> Result<AvcImporter> {
        let data =
            std::fs::read(path).map_err(|_| ImportError::UrlError(path.display().to_string()))?;
        Ok(Self::from_bytes(data))
    }

    /// Creates an importer over in-memory Annex-B bytes.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> AvcImporter {
        AvcImporter {
            data,
            request: ImportRequest::default(),
            handle: None,
            parsed: None,
            emit_idx: 0,
            rewritten: false,
            done: false,
        }
    }

    fn parse(&self, fps: f64, detect_fps: bool) -> Result<ParseEnd> {
        let (timescale, dts_inc) = video_timing(fps);
        let mut state =
            ParseState::new(timescale, dts_inc as u64, self.request.forced_size_length);
        let duration_cap = self.request.duration_ms * timescale as u64 / 1000;

        if h264::next_start_code(&self.data, 0).is_none() {
            return Err(ImportError::non_compliant("cannot find H264 start code"));
        }

        for (_, nal) in NalIter::new(&self.data) {
            if nal.is_empty() {
                continue;
            }
            let nal_type = NalUnitType::from_header(nal[0]);
            match nal_type {
                NalUnitType::Sps => {
                    let rbsp = unescape_rbsp(nal);
                    let sps = Sps::parse(&rbsp).map_err(|e| {
                        ImportError::non_compliant(format!("error parsing SPS: {e}"))
                    })?;
                    let id = sps.sps_id as usize;
                    if state.sps_set[id].is_none() {
                        if state.config.sps.is_empty() {
                            state.config.profile_indication = sps.profile_idc;
                            state.config.profile_compatibility = sps.constraint_set_flags;
                            state.config.level_indication = sps.level_idc;
                        }
                        state.config.sps.push(Bytes::copy_from_slice(nal));
                        if state.max_width <= sps.width && state.max_height <= sps.height {
                            state.max_width = sps.width;
                            state.max_height = sps.height;
                        }
                        if state.pixel_aspect.is_none() {
                            state.pixel_aspect = sps.sar;
                        }
                        if detect_fps {
                            if let Some(detected) = sps.fixed_fps() {
                                // frame rate scans are unreliable above 50
                                if detected <= 50.0 && (detected - fps).abs() > f64::EPSILON {
                                    info!(detected, "restarting import with detected frame rate");
                                    return Ok(ParseEnd::RestartWithFps(detected));
                                }
                            }
                        }
                        state.sps_set[id] = Some(sps);
                    }
                }
                NalUnitType::Pps => {
                    let rbsp = unescape_rbsp(nal);
                    let pps = Pps::parse(&rbsp).map_err(|e| {
                        ImportError::non_compliant(format!("error parsing PPS: {e}"))
                    })?;
                    let id = pps.pps_id as usize;
                    if state.pps_set[id].is_none() {
                        state.config.pps.push(Bytes::copy_from_slice(nal));
                        state.pps_set[id] = Some(pps);
                    }
                }
                NalUnitType::Sei => {
                    // SEI opens the next access unit
                    if state.au_has_slice {
                        state.flush_sample();
                        state.prev_slice = None;
                    }
                    let rbsp = unescape_rbsp(nal);
                    let sei = SeiInfo::parse(&rbsp);
                    if sei.recovery_point {
                        state.au_recovery = true;
                    }
                    let trimmed = trim_sei_payload(nal);
                    if trimmed > 0 {
                        state.nb_sei += 1;
                        state.push_nal(&nal[..trimmed]);
                    }
                }
                NalUnitType::AccessUnitDelimiter => {
                    state.flush_sample();
                    state.prev_slice = None;
                }
                NalUnitType::EndOfSequence
                | NalUnitType::EndOfStream
                | NalUnitType::FillerData => {}
                NalUnitType::DataPartitionB | NalUnitType::DataPartitionC => {
                    state.push_nal(nal);
                }
                NalUnitType::NonIdrSlice
                | NalUnitType::IdrSlice
                | NalUnitType::DataPartitionA => {
                    let rbsp = unescape_rbsp(nal);
                    let slice = match SliceHeader::parse(&rbsp, &state.sps_set, &state.pps_set) {
                        Ok(slice) => slice,
                        Err(e) => {
                            warn!(error = %e, "error parsing NAL unit, skipping");
                            continue;
                        }
                    };
                    let new_au = match &state.prev_slice {
                        Some(prev) => is_new_access_unit(prev, &slice),
                        None => false,
                    };
                    if new_au {
                        state.flush_sample();
                    }
                    if !state.au_has_slice {
                        // first slice of the access unit
                        state.au_is_idr = slice.idr;
                        let pps = state.pps_set[slice.pps_id as usize]
                            .as_ref()
                            .map(|p| p.sps_id);
                        if let Some(sps_id) = pps {
                            state.track_slice(sps_id, &slice);
                        }
                        match slice.slice_type {
                            SliceType::P => state.nb_p += 1,
                            SliceType::B => state.nb_b += 1,
                            SliceType::I => state.nb_i += 1,
                            _ => {}
                        }
                    }
                    state.au_has_slice = true;
                    state.prev_slice = Some(slice);
                    state.push_nal(nal);
                }
                NalUnitType::Unknown(t) => {
                    warn!(nal_type = t, "unhandled NAL unit type, keeping");
                    state.push_nal(nal);
                }
            }
            if duration_cap != 0 && state.dts_inc * state.samples.len() as u64 > duration_cap {
                break;
            }
            if self.request.aborted() {
                break;
            }
        }
        state.flush_sample();
        if state.config.sps.is_empty() {
            return Err(ImportError::non_compliant("no SPS found in stream"));
        }
        info!(
            samples = state.samples.len(),
            i = state.nb_i,
            p = state.nb_p,
            b = state.nb_b,
            idr = state.nb_idr,
            sei = state.nb_sei,
            "AVC import"
        );
        if state.max_total_delay > 1 {
            info!(
                max_delay = state.max_total_delay,
                "stream uses B-slice references"
            );
        }
        Ok(ParseEnd::Done(state))
    }

    fn setup(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let mut fps = self.request.video_fps;
        let mut detect = false;
        if fps == media_types::AUTO_FPS {
            fps = 25.0;
            detect = true;
        }
        if fps == 0.0 {
            fps = media_types::DEFAULT_FPS;
        }
        let state = match self.parse(fps, detect)? {
            ParseEnd::Done(state) => state,
            ParseEnd::RestartWithFps(detected) => match self.parse(detected, false)? {
                ParseEnd::Done(state) => state,
                ParseEnd::RestartWithFps(_) => unreachable!("detection disabled on restart"),
            },
        };

        let mut config = state.config.clone();
        config.nal_unit_size = state.size_bytes as u8;

        let used_timescale = state.timescale;
        let mut desc = StreamDescriptor::new(StreamType::Visual, CodecId::H264, used_timescale);
        desc.codec_config = Some(Bytes::from(config.build()));
        desc.video = Some(VideoInfo {
            width: state.max_width,
            height: state.max_height,
            pixel_aspect: state.pixel_aspect,
            fps: Some(used_timescale as f64 / state.dts_inc as f64),
            ..Default::default()
        });
        desc.language = self.request.language.clone();

        let final_offsets = state.final_offsets();
        self.parsed = Some(Parsed {
            samples: state.samples,
            final_offsets,
            timescale: used_timescale,
        });
        self.handle = Some(sink.declare_stream(desc)?);
        Ok(())
    }
}

impl Importer for AvcImporter {
    fn probe(&mut self) -> Result<TrackCatalog> {
        if h264::next_start_code(&self.data, 0).is_none() {
            return Err(ImportError::non_compliant("cannot find H264 start code"));
        }
        Ok(TrackCatalog {
            tracks: vec![TrackInfo {
                track_num: 1,
                stream_type: Some(StreamType::Visual),
                codec_id: Some(CodecId::H264),
                ..Default::default()
            }],
            programs: Vec::new(),
        })
    }

    fn configure(&mut self, request: ImportRequest) -> Result<()> {
        if let Some(bits) = request.forced_size_length {
            if !matches!(bits, 8 | 16 | 32) {
                return Err(ImportError::BadParam(format!(
                    "NALU size length must be 8, 16 or 32 bits, got {bits}"
                )));
            }
        }
        self.request = request;
        Ok(())
    }

    fn process(&mut self, sink: &mut dyn Sink) -> Result<Progress> {
        if self.done {
            return Ok(Progress::Eos);
        }
        if self.handle.is_none() {
            self.setup(sink)?;
        }
        let handle = self.handle.expect("declared in setup");
        let parsed = self.parsed.as_ref().expect("parsed in setup");
        let cap = self.request.duration_ms * parsed.timescale as u64 / 1000;
        while self.emit_idx < parsed.samples.len() {
            if self.request.aborted() {
                break;
            }
            let sample = &parsed.samples[self.emit_idx];
            if cap != 0 && sample.dts > cap {
                break;
            }
            match sink.write_sample(handle, sample.clone())? {
                SinkAck::Accepted => self.emit_idx += 1,
                SinkAck::WouldBlock => return Ok(Progress::WouldBlock),
            }
        }
        if !self.rewritten {
            // replace the provisional POC values with the final offsets
            let offsets = parsed.final_offsets.clone();
            sink.rewrite_samples(handle, &mut |i, samp| {
                if let Some(off) = offsets.get(i as usize) {
                    samp.cts_offset = *off;
                }
            })?;
            self.rewritten = true;
        }
        sink.signal_eos(handle);
        self.done = true;
        Ok(Progress::Eos)
    }
}
