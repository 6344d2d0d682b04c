use std::path::Path;

use bytes::Bytes;
use media_types::{
    CodecId, ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind, Result, Sink,
    StreamDescriptor, StreamHandle, StreamType, TrackCatalog, TrackInfo, VideoInfo, video_timing,
};
use mpegvideo::{PictureType, m4v, mpeg12, next_start_code};
use tracing::{info, warn};

use crate::queue::SampleQueue;

/// MPEG-4 Visual and raw MPEG-1/2 video importer.
///
/// MPEG-4 inputs get their configuration prefix (up to the first VOP) as
/// decoder config, DivX packed-bitstream handling and an N-VOP drop policy;
/// both flavors reorder composition times when B frames are present by
/// deferring each reference frame's CTS past its trailing B run.
pub struct VisualImporter {
    data: Vec<u8>,
    mpeg12: bool,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    queue: SampleQueue,
    timescale: u32,
    done: bool,
}

struct Frame {
    start: usize,
    len: usize,
    ftype: PictureType,
    coded: bool,
}

impl VisualImporter {
    /// Opens a `.cmp`/`.m4v` (MPEG-4) or `.m1v`/`.m2v` (MPEG-1/2) file.
    pub fn from_path(path: &Path, mpeg12: bool) -> Result<VisualImporter> {
        let data =
            std::fs::read(path).map_err(|_| ImportError::UrlError(path.display().to_string()))?;
        Ok(Self::from_bytes(data, mpeg12))
    }

    /// Creates an importer over in-memory elementary stream bytes.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>, mpeg12: bool) -> VisualImporter {
        VisualImporter {
            data,
            mpeg12,
            request: ImportRequest::default(),
            handle: None,
            queue: SampleQueue::default(),
            timescale: 0,
            done: false,
        }
    }

    fn setup(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let (desc, samples) = if self.mpeg12 {
            self.setup_mpeg12()?
        } else {
            self.setup_m4v()?
        };
        self.timescale = desc.timescale;
        self.queue.fill(samples);
        self.handle = Some(sink.declare_stream(desc)?);
        Ok(())
    }

    fn pick_fps(&self, detected: f64) -> f64 {
        let requested = self.request.video_fps;
        if requested == media_types::AUTO_FPS {
            return if detected > 0.0 { detected } else { 25.0 };
        }
        if requested > 0.0 {
            return requested;
        }
        if detected > 0.0 { detected } else { media_types::DEFAULT_FPS }
    }

    fn setup_mpeg12(&mut self) -> Result<(StreamDescriptor, Vec<MediaSample>)> {
        let seq = mpeg12::parse_seq_header(&self.data)
            .ok_or_else(|| ImportError::non_compliant("cannot load MPEG-1/2 sequence header"))?;
        let fps = self.pick_fps(seq.fps);
        let (timescale, dts_inc) = video_timing(fps);
        let codec = if seq.is_mpeg2 {
            CodecId::Mpeg2Video
        } else {
            CodecId::Mpeg1Video
        };
        info!(width = seq.width, height = seq.height, fps, ?codec, "video import");

        let mut desc = StreamDescriptor::new(StreamType::Visual, codec, timescale);
        desc.video = Some(VideoInfo {
            width: seq.width,
            height: seq.height,
            pixel_aspect: seq.aspect,
            fps: Some(fps),
            ..Default::default()
        });
        desc.language = self.request.language.clone();

        let frames = self.split_mpeg12_frames();
        let samples = self.pack_cts(&frames, dts_inc as u64)?;
        Ok((desc, samples))
    }

    /// Splits the stream at sequence/GOP/picture boundaries; each frame runs
    /// from its first header start code to the next frame's first one.
    fn split_mpeg12_frames(&self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = Vec::new();
        let mut frame_start: Option<usize> = None;
        let mut have_pict = false;
        let mut pict_pos = 0usize;
        let mut from = 0usize;
        while let Some((at, code)) = next_start_code(&self.data, from) {
            from = at + 4;
            if !mpeg12::is_frame_start(code) && code != mpeg12::SEQ_END {
                continue;
            }
            if code == mpeg12::SEQ_END {
                if let (Some(start), true) = (frame_start, have_pict) {
                    frames.push(self.close_frame(start, at, pict_pos));
                }
                frame_start = None;
                have_pict = false;
                continue;
            }
            match frame_start {
                None => {
                    frame_start = Some(at);
                    if code == mpeg12::PIC_START {
                        have_pict = true;
                        pict_pos = at;
                    }
                }
                Some(start) => {
                    if code == mpeg12::PIC_START && have_pict {
                        // a new picture closes the previous frame
                        frames.push(self.close_frame(start, at, pict_pos));
                        frame_start = Some(at);
                        pict_pos = at;
                    } else if code == mpeg12::PIC_START {
                        have_pict = true;
                        pict_pos = at;
                    } else if have_pict {
                        // seq/gop of the next frame
                        frames.push(self.close_frame(start, at, pict_pos));
                        frame_start = Some(at);
                        have_pict = false;
                    }
                }
            }
        }
        if let (Some(start), true) = (frame_start, have_pict) {
            frames.push(self.close_frame(start, self.data.len(), pict_pos));
        }
        frames
    }

    fn close_frame(&self, start: usize, end: usize, pict_pos: usize) -> Frame {
        Frame {
            start,
            len: end - start,
            ftype: mpeg12::picture_type(&self.data, pict_pos).unwrap_or(PictureType::I),
            coded: true,
        }
    }

    fn setup_m4v(&mut self) -> Result<(StreamDescriptor, Vec<MediaSample>)> {
        let cfg = m4v::parse_config(&self.data)
            .ok_or_else(|| ImportError::non_compliant("cannot load MPEG-4 decoder config"))?;
        let mut dsi = self.data[..cfg.config_len].to_vec();
        let forced_packed = m4v::rewrite_packed_marker(&mut dsi);
        let fps = self.pick_fps(0.0);
        let (timescale, dts_inc) = video_timing(fps);
        info!(
            width = cfg.width,
            height = cfg.height,
            fps,
            packed = forced_packed,
            "MPEG-4 video import"
        );

        let mut desc = StreamDescriptor::new(StreamType::Visual, CodecId::Mpeg4Visual, timescale);
        desc.codec_config = Some(Bytes::from(dsi));
        desc.video = Some(VideoInfo {
            width: cfg.width,
            height: cfg.height,
            pixel_aspect: cfg.par.map(|(n, d)| (n as u32, d as u32)),
            fps: Some(fps),
            ..Default::default()
        });
        desc.language = self.request.language.clone();

        let mut frames = Vec::new();
        let mut pos = cfg.config_len;
        while let Some(at) = m4v::next_vop(&self.data, pos) {
            let end = m4v::frame_end(&self.data, at);
            let vop = m4v::parse_vop(&self.data, at, cfg.time_inc_bits);
            let (ftype, coded) = match vop {
                Some(v) => (v.coding_type, v.is_coded),
                None => {
                    warn!(at, "unparsable VOP header, treating as coded P");
                    (PictureType::P, true)
                }
            };
            frames.push(Frame {
                start: at,
                len: end - at,
                ftype,
                coded,
            });
            pos = end;
        }
        let samples = self.pack_m4v(&frames, dts_inc as u64, forced_packed)?;
        Ok((desc, samples))
    }

    /// Builds samples for MPEG-4 frames, applying the N-VOP policy: packed
    /// bitstreams discard the placeholder after a B run, variable frame rate
    /// drops it but keeps the timeline hole, constant frame rate keeps it.
    fn pack_m4v(
        &self,
        frames: &[Frame],
        dts_inc: u64,
        forced_packed: bool,
    ) -> Result<Vec<MediaSample>> {
        let do_vfr = !self.request.no_frame_drop;
        let mut nb_packed = 0u64;
        let mut nb_vfr_dropped = 0u64;
        let mut kept: Vec<Frame> = Vec::new();
        let mut dts_holes: Vec<u64> = Vec::new();
        let mut hole = 0u64;
        let mut b_run = 0u32;
        for frame in frames {
            if !frame.coded {
                if forced_packed && b_run > 0 {
                    nb_packed += 1;
                    continue;
                }
                if do_vfr {
                    nb_vfr_dropped += 1;
                    hole += dts_inc;
                    continue;
                }
            }
            if frame.ftype == PictureType::B {
                b_run += 1;
            } else {
                b_run = 0;
            }
            dts_holes.push(hole);
            kept.push(Frame {
                start: frame.start,
                len: frame.len,
                ftype: frame.ftype,
                coded: frame.coded,
            });
        }
        if nb_packed > 0 {
            info!(nb_packed, "discarded packed-bitstream N-VOPs");
        }
        if nb_vfr_dropped > 0 {
            info!(nb_vfr_dropped, "dropped N-VOPs for variable frame rate");
        }
        let mut samples = self.pack_cts(&kept, dts_inc)?;
        // reapply the timeline holes of dropped N-VOPs
        for (samp, hole) in samples.iter_mut().zip(dts_holes.iter()) {
            samp.dts += *hole;
        }
        Ok(samples)
    }

    /// Shared CTS packing: every reference frame's composition time is
    /// deferred by `(trailing B count + 1) * dts_inc`; once a B frame shows
    /// up, every already-seen sample gets the one-frame baseline offset.
    fn pack_cts(&self, frames: &[Frame], dts_inc: u64) -> Result<Vec<MediaSample>> {
        let mut samples: Vec<MediaSample> = Vec::new();
        let mut has_cts_offset = false;
        let mut b_frames = 0u64;
        let mut max_b = 0u64;
        let mut ref_frame: Option<usize> = None;
        let mut dts = 0u64;
        for frame in frames {
            let rap = match frame.ftype {
                PictureType::I => RapKind::Sync,
                _ => RapKind::None,
            };
            let mut samp = MediaSample::new(
                self.data[frame.start..frame.start + frame.len].to_vec(),
                dts,
                rap,
            );
            if self.request.use_dataref {
                samp.data_ref = Some(frame.start as u64);
            }
            if frame.ftype == PictureType::B {
                b_frames += 1;
                if !has_cts_offset {
                    has_cts_offset = true;
                    for earlier in samples.iter_mut() {
                        earlier.cts_offset = dts_inc as i64;
                    }
                }
            } else {
                if let (Some(r), true) = (ref_frame, has_cts_offset) {
                    samples[r].cts_offset = ((1 + b_frames) * dts_inc) as i64;
                }
                ref_frame = Some(samples.len());
                max_b = max_b.max(b_frames);
                b_frames = 0;
            }
            samples.push(samp);
            dts += dts_inc;
        }
        if let (Some(r), true) = (ref_frame, has_cts_offset) {
            samples[r].cts_offset = ((1 + b_frames) * dts_inc) as i64;
        }
        if has_cts_offset {
            info!(max_b, "stream uses B-frames");
        }
        Ok(samples)
    }
}

impl Importer for VisualImporter {
    fn probe(&mut self) -> Result<TrackCatalog> {
        let (width, height, fps) = if self.mpeg12 {
            let seq = mpeg12::parse_seq_header(&self.data)
                .ok_or_else(|| ImportError::non_compliant("no MPEG-1/2 sequence header"))?;
            (seq.width, seq.height, seq.fps)
        } else {
            let cfg = m4v::parse_config(&self.data)
                .ok_or_else(|| ImportError::non_compliant("no MPEG-4 configuration"))?;
            (cfg.width, cfg.height, 0.0)
        };
        Ok(TrackCatalog {
            tracks: vec![TrackInfo {
                track_num: 1,
                stream_type: Some(StreamType::Visual),
                codec_id: Some(if self.mpeg12 {
                    CodecId::Mpeg2Video
                } else {
                    CodecId::Mpeg4Visual
                }),
                video: Some(VideoInfo {
                    width,
                    height,
                    fps: if fps > 0.0 { Some(fps) } else { None },
                    ..Default::default()
                }),
                ..Default::default()
            }],
            programs: Vec::new(),
        })
    }

    fn configure(&mut self, request: ImportRequest) -> Result<()> {
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
        match self.queue.drain(sink, handle, &self.request, self.timescale)? {
            Progress::Eos => {
                sink.signal_eos(handle);
                self.done = true;
                Ok(Progress::Eos)
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes_util::BitWriter;
    use media_types::MemorySink;

    fn m4v_config(width: u32, height: u32) -> Vec<u8> {
        let mut out = vec![0, 0, 1, m4v::VOS_START, 0x01];
        out.extend_from_slice(&[0, 0, 1, 0x20]);
        let mut w = BitWriter::new();
        w.write_bit(false);
        w.write_bits(1, 8).unwrap();
        w.write_bit(false);
        w.write_bits(1, 4).unwrap();
        w.write_bit(false);
        w.write_bits(0, 2).unwrap();
        w.write_bit(true);
        w.write_bits(30, 16).unwrap();
        w.write_bit(true);
        w.write_bit(false);
        w.write_bit(true);
        w.write_bits(width as u64, 13).unwrap();
        w.write_bit(true);
        w.write_bits(height as u64, 13).unwrap();
        w.write_bit(true);
        w.write_bits(0, 7).unwrap();
        out.extend_from_slice(&w.finish());
        out
    }

    fn vop(coding_type: u8, coded: bool) -> Vec<u8> {
        let mut out = vec![0, 0, 1, m4v::VOP_START];
        let mut w = BitWriter::new();
        w.write_bits(coding_type as u64, 2).unwrap();
        w.write_bit(false);
        w.write_bit(true);
        w.write_bits(3, 5).unwrap();
        w.write_bit(true);
        w.write_bit(coded);
        w.write_bits(0x15, 5).unwrap();
        out.extend_from_slice(&w.finish());
        out.extend_from_slice(&[0x42; 8]);
        out
    }

    fn drive(importer: &mut VisualImporter) -> MemorySink {
        let mut sink = MemorySink::new();
        while importer.process(&mut sink).unwrap() != Progress::Eos {}
        sink
    }

    #[test]
    fn m4v_b_frame_cts_reordering() {
        // I P B B P at 25 fps
        let mut data = m4v_config(320, 240);
        for (t, c) in [(0u8, true), (1, true), (2, true), (2, true), (1, true)] {
            data.extend_from_slice(&vop(t, c));
        }
        let mut importer = VisualImporter::from_bytes(data, false);
        importer.configure(ImportRequest::default()).unwrap();
        let sink = drive(&mut importer);
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 5);
        let inc = 1000i64;
        // I and the first P were rebased by one frame when the B showed up;
        // the P preceding the B run is deferred past it
        assert_eq!(samples[0].cts_offset, inc); // I
        assert_eq!(samples[1].cts_offset, 3 * inc); // P with two trailing Bs
        assert_eq!(samples[2].cts_offset, 0); // B
        assert_eq!(samples[3].cts_offset, 0); // B
        assert_eq!(samples[4].cts_offset, inc); // final P
        // composition times are unique and non-negative
        for s in samples {
            assert!(s.cts_offset >= 0);
        }
        let desc = sink.streams[0].desc.as_ref().unwrap();
        assert_eq!(desc.codec_id, CodecId::Mpeg4Visual);
        let video = desc.video.unwrap();
        assert_eq!((video.width, video.height), (320, 240));
        // decoder config is the header prefix
        assert!(desc.codec_config.as_ref().unwrap().starts_with(&[0, 0, 1, 0xB0]));
    }

    #[test]
    fn n_vop_vfr_drop_keeps_timeline_hole() {
        let mut data = m4v_config(176, 144);
        data.extend_from_slice(&vop(0, true));
        data.extend_from_slice(&vop(1, false)); // N-VOP
        data.extend_from_slice(&vop(1, true));
        let mut importer = VisualImporter::from_bytes(data, false);
        importer.configure(ImportRequest::default()).unwrap();
        let sink = drive(&mut importer);
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].dts, 0);
        // the dropped frame leaves a hole
        assert_eq!(samples[1].dts, 2000);
    }

    #[test]
    fn n_vop_kept_in_cfr_mode() {
        let mut data = m4v_config(176, 144);
        data.extend_from_slice(&vop(0, true));
        data.extend_from_slice(&vop(1, false));
        data.extend_from_slice(&vop(1, true));
        let mut importer = VisualImporter::from_bytes(data, false);
        let request = ImportRequest {
            no_frame_drop: true,
            ..Default::default()
        };
        importer.configure(request).unwrap();
        let sink = drive(&mut importer);
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1].dts, 1000);
        assert_eq!(samples[2].dts, 2000);
    }

    #[test]
    fn divx_packed_marker_rewritten() {
        let mut data = m4v_config(176, 144);
        data.extend_from_slice(&[0, 0, 1, m4v::USER_DATA_START]);
        data.extend_from_slice(b"DivX503p");
        data.extend_from_slice(&vop(0, true));
        let mut importer = VisualImporter::from_bytes(data, false);
        importer.configure(ImportRequest::default()).unwrap();
        let sink = drive(&mut importer);
        let config = sink.streams[0].desc.as_ref().unwrap().codec_config.clone().unwrap();
        let config = config.to_vec();
        assert!(
            config.windows(8).any(|w| w == b"DivX503n"),
            "packed marker rewritten to n"
        );
    }

    #[test]
    fn mpeg12_frames_and_types() {
        // sequence header + I picture + B picture
        let mut w = BitWriter::new();
        w.write_bytes(&[0, 0, 1, mpeg12::SEQ_START]);
        w.write_bits(352, 12).unwrap();
        w.write_bits(288, 12).unwrap();
        w.write_bits(2, 4).unwrap();
        w.write_bits(3, 4).unwrap(); // 25 fps
        w.write_bits(0x3FFFF, 18).unwrap();
        w.write_bit(true);
        w.write_bits(0, 13).unwrap();
        let mut data = w.finish();
        for ptype in [1u8, 2, 3] {
            let mut pw = BitWriter::new();
            pw.write_bytes(&[0, 0, 1, mpeg12::PIC_START]);
            pw.write_bits(0, 10).unwrap();
            pw.write_bits(ptype as u64, 3).unwrap();
            pw.write_bits(0xFFFF, 16).unwrap();
            pw.write_bits(0, 3).unwrap();
            data.extend_from_slice(&pw.finish());
            data.extend_from_slice(&[0xEE; 6]);
        }
        data.extend_from_slice(&[0, 0, 1, mpeg12::SEQ_END]);

        let mut importer = VisualImporter::from_bytes(data, true);
        importer.configure(ImportRequest::default()).unwrap();
        let sink = drive(&mut importer);
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].rap, RapKind::Sync);
        // first frame carries the sequence header
        assert!(samples[0].data.starts_with(&[0, 0, 1, mpeg12::SEQ_START]));
        assert_eq!(samples[1].rap, RapKind::None);
        let desc = sink.streams[0].desc.as_ref().unwrap();
        assert_eq!(desc.codec_id, CodecId::Mpeg1Video);
        assert_eq!(desc.timescale, 25000);
        // B frame forced CTS packing: the P before it is deferred
        assert_eq!(samples[1].cts_offset, 2000);
    }
}
