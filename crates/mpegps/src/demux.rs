use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use media_types::Source;
use mpegvideo::PictureType;
use tracing::{debug, warn};

use crate::error::PsError;
use crate::pes;
use crate::seek;
use crate::stream::{AudioProps, EsKind, StreamState, VideoProps};
use crate::CLOCK_90K;

/// Unit of the timestamps returned with frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsUnits {
    /// Milliseconds relative to the container start (`first_cts`).
    Millis,
    /// Raw 90 kHz ticks as carried in the PES headers.
    Ticks90k,
}

/// Kind of an audio stream, for probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioKind {
    /// MPEG-1/2 audio.
    Mpeg,
    /// AC-3 private stream.
    Ac3,
    /// LPCM private stream (enumerated only).
    Lpcm,
}

/// One video access unit returned by the demuxer.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Elementary stream bytes of the access unit.
    pub data: Vec<u8>,
    /// Picture coding type.
    pub picture_type: PictureType,
    /// Decode timestamp in the requested units.
    pub dts: u64,
    /// Composition timestamp in the requested units.
    pub cts: u64,
}

/// One audio frame returned by the demuxer.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Elementary stream bytes of the frame.
    pub data: Vec<u8>,
    /// Presentation timestamp in the requested units.
    pub pts: u64,
    /// Timestamp in audio sample units since the container start.
    pub freq_ts: u64,
}

enum InputFactory {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

impl InputFactory {
    fn open(&self) -> Result<Box<dyn Source>, PsError> {
        match self {
            InputFactory::File(path) => {
                let file = std::fs::File::open(path)
                    .map_err(|_| PsError::Open(path.display().to_string()))?;
                Ok(Box::new(std::io::BufReader::new(file)))
            }
            InputFactory::Memory(data) => Ok(Box::new(std::io::Cursor::new(data.clone()))),
        }
    }
}

/// MPEG-2 Program Stream demultiplexer with per-stream cursors.
pub struct PsDemuxer {
    factory: InputFactory,
    video: Vec<StreamState>,
    audio: Vec<StreamState>,
    first_dts: u64,
    max_time_ms: u64,
    end_loc: u64,
}

impl PsDemuxer {
    /// Opens and scans a program stream file.
    pub fn open(path: &Path) -> Result<PsDemuxer, PsError> {
        Self::init(InputFactory::File(path.to_path_buf()))
    }

    /// Opens and scans an in-memory program stream.
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> Result<PsDemuxer, PsError> {
        Self::init(InputFactory::Memory(data.into()))
    }

    fn init(factory: InputFactory) -> Result<PsDemuxer, PsError> {
        let mut ps = PsDemuxer {
            factory,
            video: Vec::new(),
            audio: Vec::new(),
            first_dts: 0,
            max_time_ms: 0,
            end_loc: 0,
        };
        ps.scan_file()?;
        if ps.video.is_empty() && ps.audio.is_empty() {
            return Err(PsError::NoStreams);
        }
        Ok(ps)
    }

    fn find_stream(&mut self, stream_id: u8, substream: u8) -> Option<&mut StreamState> {
        let list = if stream_id >= 0xE0 {
            &mut self.video
        } else {
            &mut self.audio
        };
        list.iter_mut().find(|s| {
            s.stream_id == stream_id && (stream_id != 0xBD || s.substream_id == substream)
        })
    }

    fn add_stream(
        &mut self,
        stream_id: u8,
        substream: u8,
        first_loc: u64,
        ts: pes::PesTs,
    ) -> bool {
        if self.find_stream(stream_id, substream).is_some() {
            return false;
        }
        let mut stream = StreamState::new(stream_id, substream);
        stream.first_pes_loc = first_loc;
        if let Some(best) = ts.best(stream.is_video()) {
            stream.start_dts = best;
            stream.first_pes_has_ts = true;
        }
        if stream.is_video() {
            if self.video.len() >= 16 {
                return false;
            }
            self.video.push(stream);
        } else {
            if self.audio.len() >= 32 {
                return false;
            }
            self.audio.push(stream);
        }
        true
    }

    /// Initial file scan: enumerate streams over a bounded prefix, locate
    /// last timestamps over a bounded suffix, derive per-stream info and the
    /// global timeline.
    fn scan_file(&mut self) -> Result<(), PsError> {
        let mut main = self.factory.open()?;
        self.end_loc = main.size().unwrap_or(0);
        let orig_check = (self.end_loc / 50).max(200 * 1024);
        let mut check = orig_check;

        let mut first_video_loc = 0u64;
        let mut first_audio_loc = 0u64;
        let mut loc = 0u64;
        while loc < check {
            let Some((stream_id, pes_len)) = pes::read_to_next_pes(main.as_mut())? else {
                break;
            };
            let mut pes_left = pes_len;
            if (0xBD..0xF0).contains(&stream_id) {
                loc = main.stream_position()? - 6;
                let Some((left, ts)) = pes::read_pes_header(main.as_mut(), pes_len)? else {
                    break;
                };
                pes_left = left;
                let mut substream = 0u8;
                let mut valid = false;
                if stream_id == 0xBD {
                    let mut sub = [0u8; 1];
                    if main.read_exact(&mut sub).is_err() {
                        break;
                    }
                    pes_left = pes_left.saturating_sub(1);
                    substream = sub[0];
                    if (0x80..0x90).contains(&substream) || (0xA0..0xB0).contains(&substream) {
                        valid = true;
                    }
                } else if stream_id >= 0xC0 {
                    valid = true;
                }
                if valid && self.add_stream(stream_id, substream, loc, ts) {
                    if stream_id >= 0xE0 {
                        if self.video.len() == 1 {
                            first_video_loc = loc;
                        }
                    } else if self.audio.len() == 1 {
                        first_audio_loc = loc;
                    }
                    if !self.video.is_empty() && !self.audio.is_empty() {
                        let diff = first_audio_loc.abs_diff(first_video_loc);
                        let bound = diff * 2 + first_video_loc;
                        if bound < check {
                            check = bound;
                        }
                    }
                }
            }
            main.seek(SeekFrom::Current(pes_left as i64))?;
        }
        if self.video.is_empty() && self.audio.is_empty() {
            return Ok(());
        }

        // suffix scan for each stream's last timestamp
        main.seek(SeekFrom::Start(self.end_loc.saturating_sub(orig_check)))?;
        loop {
            let Some((stream_id, pes_len)) = pes::read_to_next_pes(main.as_mut())? else {
                break;
            };
            let loc = main.stream_position()? - 6;
            if stream_id != 0xBD && !(0xC0..0xF0).contains(&stream_id) {
                main.seek(SeekFrom::Current(pes_len as i64))?;
                continue;
            }
            let Some((mut pes_left, ts)) = pes::read_pes_header(main.as_mut(), pes_len)? else {
                break;
            };
            let mut substream = 0u8;
            if stream_id == 0xBD {
                let mut sub = [0u8; 1];
                if main.read_exact(&mut sub).is_err() {
                    break;
                }
                pes_left = pes_left.saturating_sub(1);
                substream = sub[0];
                if !(0x80..0x90).contains(&substream) && !(0xA0..0xB0).contains(&substream) {
                    main.seek(SeekFrom::Current(pes_left as i64))?;
                    continue;
                }
            }
            if self.find_stream(stream_id, substream).is_none() {
                self.add_stream(stream_id, substream, 0, pes::PesTs::default());
            }
            if let Some(stream) = self.find_stream(stream_id, substream) {
                if let Some(best) = ts.best(stream.is_video()) {
                    stream.end_dts = best;
                    stream.end_dts_loc = loc;
                }
            }
            main.seek(SeekFrom::Current(pes_left as i64))?;
        }

        self.collect_stream_info()?;

        // earliest start DTS across streams anchors the zero of the timeline
        self.first_dts = u64::MAX;
        for s in self.video.iter().chain(self.audio.iter()) {
            if s.stream_id != 0 && s.start_dts < self.first_dts {
                self.first_dts = s.start_dts;
            }
        }
        if self.first_dts == u64::MAX {
            self.first_dts = 0;
        }

        // walk out each stream's tail to bound the total duration
        let first_dts = self.first_dts;
        let mut max_time = 0u64;
        for s in self.video.iter_mut().chain(self.audio.iter_mut()) {
            if s.stream_id == 0 || s.end_dts_loc == 0 {
                continue;
            }
            s.seek_to(s.end_dts_loc)?;
            s.clear_buffer();
            let mut frames = 0u64;
            while s.find_frame()? {
                s.advance_frame();
                frames += 1;
            }
            s.clear_buffer();
            let mut ticks = s.end_dts.saturating_sub(first_dts);
            if s.is_video() {
                ticks += frames * s.ticks_per_frame;
            } else if s.audio.sample_rate != 0 {
                ticks += frames * CLOCK_90K * s.audio.samples_per_frame as u64
                    / s.audio.sample_rate as u64;
            }
            max_time = max_time.max(ticks / 90);
            s.seek_to(0)?;
        }
        self.max_time_ms = max_time;

        // drop streams that failed probing
        self.video.retain(|s| s.stream_id != 0);
        self.audio.retain(|s| s.stream_id != 0);
        Ok(())
    }

    /// Reads the first frame of every discovered stream to learn its codec
    /// parameters, synthesizing a start DTS when the first PES had none.
    fn collect_stream_info(&mut self) -> Result<(), PsError> {
        for s in self.video.iter_mut().chain(self.audio.iter_mut()) {
            if s.kind == EsKind::Lpcm {
                // enumerated but not framed
                continue;
            }
            let input = self.factory.open()?;
            s.input = Some(input);
            s.clear_buffer();
            if !s.find_frame()? {
                warn!(stream = s.stream_id, "no frame found while probing, dropping stream");
                s.stream_id = 0;
                continue;
            }
            s.probe_frame_info();
            if s.is_video() && s.video.fps == 0.0 {
                warn!(stream = s.stream_id, "video stream without frame rate, dropping");
                s.stream_id = 0;
                continue;
            }
            if !s.is_video() && s.audio.sample_rate == 0 {
                warn!(stream = s.stream_id, "audio stream without codec info, dropping");
                s.stream_id = 0;
                continue;
            }
            if !s.first_pes_has_ts {
                // step forward until a timestamp shows up, then back-project
                let mut frames_from_beg = 0u64;
                let mut have_frame = true;
                while have_frame && !s.frame_ts.any() && frames_from_beg < 1000 {
                    s.advance_frame();
                    have_frame = s.find_frame()?;
                    frames_from_beg += 1;
                }
                if have_frame {
                    if let Some(ts) = s.frame_ts.best(s.is_video()) {
                        let back = if s.is_video() {
                            frames_from_beg * s.ticks_per_frame
                        } else if s.audio.sample_rate != 0 {
                            s.audio.samples_per_frame as u64 * CLOCK_90K
                                / s.audio.sample_rate as u64
                        } else {
                            0
                        };
                        s.start_dts = ts.saturating_sub(back);
                        debug!(
                            stream = s.stream_id,
                            start_dts = s.start_dts,
                            "back-projected start timestamp"
                        );
                    }
                }
            }
            s.clear_buffer();
            s.seek_to(0)?;
        }
        Ok(())
    }

    /// Earliest timestamp observed across all streams (90 kHz ticks).
    #[must_use]
    pub fn first_cts(&self) -> u64 {
        self.first_dts
    }

    /// Total duration estimate in milliseconds.
    #[must_use]
    pub fn max_time_ms(&self) -> u64 {
        self.max_time_ms
    }

    /// Number of video streams.
    #[must_use]
    pub fn video_stream_count(&self) -> u32 {
        self.video.len() as u32
    }

    /// Number of audio streams.
    #[must_use]
    pub fn audio_stream_count(&self) -> u32 {
        self.audio.len() as u32
    }

    /// Properties of video stream `idx`.
    #[must_use]
    pub fn video_info(&self, idx: u32) -> Option<&VideoProps> {
        self.video.get(idx as usize).map(|s| &s.video)
    }

    /// Properties of audio stream `idx`.
    #[must_use]
    pub fn audio_info(&self, idx: u32) -> Option<&AudioProps> {
        self.audio.get(idx as usize).map(|s| &s.audio)
    }

    /// Kind of audio stream `idx`.
    #[must_use]
    pub fn audio_kind(&self, idx: u32) -> Option<AudioKind> {
        self.audio.get(idx as usize).map(|s| match s.kind {
            EsKind::Ac3 => AudioKind::Ac3,
            EsKind::Lpcm => AudioKind::Lpcm,
            _ => AudioKind::Mpeg,
        })
    }

    /// PS stream id of video stream `idx`.
    #[must_use]
    pub fn video_stream_id(&self, idx: u32) -> Option<u8> {
        self.video.get(idx as usize).map(|s| s.stream_id)
    }

    /// Duration of one stream in milliseconds, from the probe scan.
    #[must_use]
    pub fn stream_duration_ms(&self, video: bool, idx: u32) -> u64 {
        let list = if video { &self.video } else { &self.audio };
        list.get(idx as usize)
            .map(|s| s.end_dts.saturating_sub(s.start_dts) / 90)
            .unwrap_or(0)
    }

    fn ensure_open(&mut self, video: bool, idx: u32) -> Result<&mut StreamState, PsError> {
        let factory = &self.factory;
        let list = if video { &mut self.video } else { &mut self.audio };
        let stream = list
            .get_mut(idx as usize)
            .ok_or(PsError::BadStream(idx))?;
        if stream.input.is_none() {
            stream.input = Some(factory.open()?);
        }
        Ok(stream)
    }

    /// Returns the next video access unit of stream `idx`, or `None` at EOS.
    pub fn next_video_frame(
        &mut self,
        idx: u32,
        units: TsUnits,
    ) -> Result<Option<VideoFrame>, PsError> {
        let first_dts = self.first_dts;
        let stream = self.ensure_open(true, idx)?;
        if !stream.frame_loaded && !stream.find_video_frame()? {
            return Ok(None);
        }
        let data = stream.buffer[stream.buffer_on..stream.buffer_on + stream.frame_len].to_vec();
        let picture_type = stream.loaded_picture_type().unwrap_or(PictureType::I);
        let cts = match stream.frame_ts.pts {
            Some(pts) => pts,
            None => {
                stream.last_ts + (1 + stream.frames_since_last_ts as u64) * stream.ticks_per_frame
            }
        };
        let dts = stream.frame_ts.dts.unwrap_or(cts);
        stream.advance_frame();
        let (dts, cts) = match units {
            TsUnits::Ticks90k => (dts, cts),
            TsUnits::Millis => (
                dts.saturating_sub(first_dts) / 90,
                cts.saturating_sub(first_dts) / 90,
            ),
        };
        Ok(Some(VideoFrame {
            data,
            picture_type,
            dts,
            cts,
        }))
    }

    /// Returns the next audio frame of stream `idx`, or `None` at EOS.
    pub fn next_audio_frame(
        &mut self,
        idx: u32,
        units: TsUnits,
    ) -> Result<Option<AudioFrame>, PsError> {
        let first_dts = self.first_dts;
        let stream = self.ensure_open(false, idx)?;
        if !stream.frame_loaded && !stream.find_frame()? {
            return Ok(None);
        }
        let data = stream.buffer[stream.buffer_on..stream.buffer_on + stream.frame_len].to_vec();
        let ticks = stream.frame_ticks(first_dts);
        let freq_ts = if stream.audio.sample_rate != 0 {
            ticks * stream.audio.sample_rate as u64 / CLOCK_90K
        } else {
            0
        };
        let pts = match units {
            TsUnits::Ticks90k => stream
                .frame_ts
                .best(false)
                .unwrap_or(stream.last_ts),
            TsUnits::Millis => ticks / 90,
        };
        stream.advance_frame();
        Ok(Some(AudioFrame { data, pts, freq_ts }))
    }

    /// Seeks video stream `idx` so the next frame is at or after `msec`.
    /// Stepping to the next I-frame is the caller's concern.
    pub fn seek_video(&mut self, idx: u32, msec: u64) -> Result<bool, PsError> {
        let first_dts = self.first_dts;
        let stream = self.ensure_open(true, idx)?;
        seek::seek_frame(stream, msec, first_dts)
    }

    /// Seeks audio stream `idx` so the next frame is at or after `msec`.
    pub fn seek_audio(&mut self, idx: u32, msec: u64) -> Result<bool, PsError> {
        let first_dts = self.first_dts;
        let stream = self.ensure_open(false, idx)?;
        seek::seek_frame(stream, msec, first_dts)
    }
}
