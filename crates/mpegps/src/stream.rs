use std::io::{self, Read, Seek, SeekFrom};

use media_types::Source;
use mpegvideo::{PictureType, mpeg12};
use tracing::warn;

use crate::CLOCK_90K;
use crate::index::AnchorIndex;
use crate::pes::{self, PesTs};

/// What the elementary payload of a stream contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsKind {
    /// MPEG-1/2 video.
    Video,
    /// MPEG audio (layers I-III).
    MpegAudio,
    /// AC-3 in private stream 1.
    Ac3,
    /// LPCM in private stream 1 (enumerated, frames not reassembled).
    Lpcm,
}

/// Audio properties discovered from the first frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioProps {
    /// Sampling rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u32,
    /// PCM samples per frame.
    pub samples_per_frame: u32,
    /// Bitrate in bits per second.
    pub bitrate: u32,
    /// MPEG audio layer (0 for AC-3/LPCM).
    pub layer: u32,
}

/// Video properties discovered from the first sequence header.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoProps {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Frame rate.
    pub fps: f64,
    /// Bitrate in bits per second.
    pub bitrate: f64,
    /// Display aspect ratio.
    pub aspect: Option<(u32, u32)>,
    /// Sequence extension seen: MPEG-2 video.
    pub is_mpeg2: bool,
}

/// Per-elementary-stream demux state: an independent cursor into the same
/// input, the PES reassembly buffer, timestamp recovery state and the seek
/// anchor index.
pub struct StreamState {
    /// PS stream id (0xE0.., 0xC0.., 0xBD).
    pub stream_id: u8,
    /// Sub-stream id for private stream 1.
    pub substream_id: u8,
    /// Payload kind.
    pub kind: EsKind,
    /// Independent source cursor (opened lazily from the demuxer input).
    pub input: Option<Box<dyn Source>>,

    /// Reassembled elementary data.
    pub buffer: Vec<u8>,
    /// Read position inside `buffer`.
    pub buffer_on: usize,
    /// Length of the currently loaded frame at `buffer_on`.
    pub frame_len: usize,
    /// Offset of the picture header inside `buffer` (video only).
    pub pict_header_offset: usize,
    /// A frame is loaded and not yet consumed.
    pub frame_loaded: bool,

    /// Timestamps of the most recently read PES header.
    pub next_pes_ts: PesTs,
    /// Timestamps that apply to the loaded frame.
    pub frame_ts: PesTs,
    /// Last timestamp attached to an emitted frame.
    pub last_ts: u64,
    /// Frames emitted since `last_ts` was refreshed.
    pub frames_since_last_ts: u32,

    /// Location of the first PES of this stream.
    pub first_pes_loc: u64,
    /// Start DTS (read or back-projected).
    pub start_dts: u64,
    /// Whether the first PES carried a timestamp.
    pub first_pes_has_ts: bool,
    /// Location of the last PES with a timestamp (from the suffix scan).
    pub end_dts_loc: u64,
    /// Its timestamp.
    pub end_dts: u64,

    /// Seek anchors.
    pub index: AnchorIndex,
    /// Audio properties, once probed.
    pub audio: AudioProps,
    /// Video properties, once probed.
    pub video: VideoProps,
    /// 90 kHz ticks per video frame.
    pub ticks_per_frame: u64,
}

impl StreamState {
    /// Creates the state for a newly discovered stream.
    pub fn new(stream_id: u8, substream_id: u8) -> StreamState {
        let kind = if stream_id >= 0xE0 {
            EsKind::Video
        } else if stream_id == 0xBD {
            if (0xA0..0xB0).contains(&substream_id) {
                EsKind::Lpcm
            } else {
                EsKind::Ac3
            }
        } else {
            EsKind::MpegAudio
        };
        StreamState {
            stream_id,
            substream_id,
            kind,
            input: None,
            buffer: Vec::with_capacity(4 * 4096),
            buffer_on: 0,
            frame_len: 0,
            pict_header_offset: 0,
            frame_loaded: false,
            next_pes_ts: PesTs::default(),
            frame_ts: PesTs::default(),
            last_ts: 0,
            frames_since_last_ts: 0,
            first_pes_loc: 0,
            start_dts: 0,
            first_pes_has_ts: false,
            end_dts_loc: 0,
            end_dts: 0,
            index: AnchorIndex::default(),
            audio: AudioProps::default(),
            video: VideoProps::default(),
            ticks_per_frame: 0,
        }
    }

    /// True for video streams.
    pub fn is_video(&self) -> bool {
        self.kind == EsKind::Video
    }

    /// Drops buffered data and frame state (used around seeks).
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.buffer_on = 0;
        self.frame_len = 0;
        self.frame_loaded = false;
        self.next_pes_ts.clear();
        self.frame_ts.clear();
    }

    fn input(&mut self) -> io::Result<&mut Box<dyn Source>> {
        self.input
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream input not open"))
    }

    /// Seeks the stream cursor.
    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.input()?.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    /// Current cursor position.
    pub fn position(&mut self) -> io::Result<u64> {
        self.input()?.stream_position()
    }

    /// Reads forward to the next PES of this stream and appends its payload
    /// to the buffer. Records an anchor when the header carries a timestamp.
    /// Returns false at end of input.
    pub fn read_next_pes(&mut self, record: bool) -> io::Result<bool> {
        let (found, _loc) = self.search_next_pes(record)?;
        Ok(found)
    }

    /// Like [`read_next_pes`], also reporting the PES start location.
    ///
    /// [`read_next_pes`]: StreamState::read_next_pes
    pub fn search_next_pes(&mut self, record: bool) -> io::Result<(bool, u64)> {
        let stream_id = self.stream_id;
        let substream_id = self.substream_id;
        let is_video = self.kind == EsKind::Video;
        let is_private = stream_id == 0xBD;
        let input = self
            .input
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream input not open"))?;
        loop {
            let src = input.as_mut();
            let Some((id, pes_len)) = pes::read_to_next_pes(src)? else {
                return Ok((false, 0));
            };
            if id != stream_id {
                src.seek(SeekFrom::Current(pes_len as i64))?;
                continue;
            }
            let loc = src.stream_position()? - 6;
            let Some((mut left, ts)) = pes::read_pes_header(src, pes_len)? else {
                return Ok((false, 0));
            };
            if is_private {
                if left < 4 {
                    src.seek(SeekFrom::Current(left as i64))?;
                    continue;
                }
                let mut sub = [0u8; 1];
                src.read_exact(&mut sub)?;
                left -= 1;
                if sub[0] != substream_id {
                    src.seek(SeekFrom::Current(left as i64))?;
                    continue;
                }
                // frame count + first access unit pointer
                src.seek(SeekFrom::Current(3))?;
                left -= 3;
            }
            self.next_pes_ts = ts;
            if record && ts.any() {
                if let Some(best) = ts.best(is_video) {
                    self.index.record(loc, best);
                }
            }
            pes::read_payload(input.as_mut(), left, &mut self.buffer)?;
            return Ok((true, loc));
        }
    }

    fn compact_buffer(&mut self) {
        if self.buffer_on > 0 {
            self.buffer.drain(..self.buffer_on);
            if self.pict_header_offset >= self.buffer_on {
                self.pict_header_offset -= self.buffer_on;
            }
            self.buffer_on = 0;
        }
    }

    /// Loads the next MPEG video access unit into the buffer.
    ///
    /// A frame spans from a sequence/GOP/picture start code up to the next
    /// one (or a sequence end code), pulling PES payloads in as needed.
    pub fn find_video_frame(&mut self) -> io::Result<bool> {
        self.compact_buffer();
        self.frame_ts = self.next_pes_ts;
        let mut started_new_pes = false;
        if self.buffer.len() <= self.buffer_on + 4 {
            if self.buffer.len() != self.buffer_on {
                started_new_pes = true;
            }
            if !self.read_next_pes(true)? {
                return Ok(false);
            }
        }
        // find the first frame start code
        let start;
        loop {
            match next_frame_code(&self.buffer, self.buffer_on) {
                Some(at) => {
                    let was_at_cursor = at == self.buffer_on;
                    self.buffer_on = at;
                    if !(was_at_cursor && started_new_pes) {
                        self.frame_ts = self.next_pes_ts;
                        self.next_pes_ts.clear();
                    }
                    start = at;
                    break;
                }
                None => {
                    if self.buffer.len() > 3 {
                        self.buffer_on = self.buffer.len() - 3;
                    } else {
                        self.buffer_on = self.buffer.len();
                        started_new_pes = true;
                    }
                    if !self.read_next_pes(true)? {
                        return Ok(false);
                    }
                }
            }
        }

        let mut have_pict = false;
        if self.buffer[start + 3] == mpeg12::PIC_START {
            self.pict_header_offset = start;
            have_pict = true;
        }
        let mut scan = start + 4;
        loop {
            match mpegvideo::next_start_code(&self.buffer, scan) {
                None => {
                    scan = self.buffer.len().saturating_sub(3).max(start + 4);
                    if !self.read_next_pes(true)? {
                        return Ok(false);
                    }
                }
                Some((at, code)) => {
                    if !have_pict {
                        if code == mpeg12::PIC_START {
                            have_pict = true;
                            self.pict_header_offset = at;
                        }
                    } else if mpeg12::is_frame_start(code) || code == mpeg12::SEQ_END {
                        self.frame_len = at - self.buffer_on;
                        self.frame_loaded = true;
                        return Ok(true);
                    }
                    scan = at + 4;
                }
            }
        }
    }

    /// Loads the next MPEG audio frame.
    pub fn find_mpeg_audio_frame(&mut self) -> io::Result<bool> {
        self.compact_buffer();
        self.frame_ts = self.next_pes_ts;
        let mut started_new_pes = false;
        if self.buffer.len() <= self.buffer_on + 4 {
            if self.buffer.len() != self.buffer_on {
                started_new_pes = true;
            }
            if !self.read_next_pes(true)? {
                return Ok(false);
            }
        }
        loop {
            if let Some((at, hdr)) = mp3::next_frame(&self.buffer, self.buffer_on) {
                let was_at_cursor = at == self.buffer_on;
                self.frame_len = hdr.frame_size();
                self.buffer_on = at;
                if !(was_at_cursor && started_new_pes) {
                    self.frame_ts = self.next_pes_ts;
                    self.next_pes_ts.clear();
                }
                while self.buffer.len() - self.buffer_on < self.frame_len {
                    if !self.read_next_pes(true)? {
                        return Ok(false);
                    }
                }
                self.frame_loaded = true;
                return Ok(true);
            }
            if self.buffer.len() > 3 {
                if self.buffer_on != self.buffer.len() {
                    self.buffer_on = self.buffer.len() - 3;
                }
                started_new_pes = true;
            } else {
                self.buffer_on = self.buffer.len();
            }
            if !self.read_next_pes(true)? {
                return Ok(false);
            }
        }
    }

    /// Loads the next AC-3 sync frame.
    pub fn find_ac3_frame(&mut self) -> io::Result<bool> {
        self.compact_buffer();
        self.frame_ts = self.next_pes_ts;
        let mut started_new_pes = false;
        if self.buffer.len() <= self.buffer_on + 6 {
            if self.buffer.len() != self.buffer_on {
                started_new_pes = true;
            }
            if !self.read_next_pes(true)? {
                return Ok(false);
            }
        }
        loop {
            if let Some((at, frame)) = ac3::next_sync_frame(&self.buffer, self.buffer_on) {
                let was_at_cursor = at == self.buffer_on;
                self.frame_len = frame.frame_size;
                self.buffer_on = at;
                if !(was_at_cursor && started_new_pes) {
                    self.frame_ts = self.next_pes_ts;
                    self.next_pes_ts.clear();
                }
                while self.buffer.len() - self.buffer_on < self.frame_len {
                    if !self.read_next_pes(true)? {
                        return Ok(false);
                    }
                }
                self.frame_loaded = true;
                return Ok(true);
            }
            if self.buffer.len() > 6 {
                self.buffer_on = self.buffer.len() - 6;
                started_new_pes = true;
            } else {
                self.buffer_on = self.buffer.len();
            }
            if !self.read_next_pes(true)? {
                return Ok(false);
            }
        }
    }

    /// Loads the next frame for this stream's kind.
    pub fn find_frame(&mut self) -> io::Result<bool> {
        match self.kind {
            EsKind::Video => self.find_video_frame(),
            EsKind::MpegAudio => self.find_mpeg_audio_frame(),
            EsKind::Ac3 => self.find_ac3_frame(),
            EsKind::Lpcm => Ok(false),
        }
    }

    /// Consumes the loaded frame and updates timestamp recovery state.
    pub fn advance_frame(&mut self) {
        self.buffer_on += self.frame_len;
        self.frame_loaded = false;
        if let Some(ts) = self.frame_ts.best(self.is_video()) {
            self.last_ts = ts;
            self.frames_since_last_ts = 0;
        } else {
            self.frames_since_last_ts += 1;
        }
    }

    /// Fills audio/video properties from the loaded frame.
    pub fn probe_frame_info(&mut self) {
        let frame = &self.buffer[self.buffer_on..self.buffer_on + self.frame_len];
        match self.kind {
            EsKind::Video => {
                let Some(seq) = mpeg12::parse_seq_header(frame) else {
                    warn!(stream = self.stream_id, "video stream without sequence header");
                    return;
                };
                self.video = VideoProps {
                    width: seq.width,
                    height: seq.height,
                    fps: seq.fps,
                    bitrate: seq.bitrate,
                    aspect: seq.aspect,
                    is_mpeg2: seq.is_mpeg2,
                };
                if seq.fps > 0.0 {
                    self.ticks_per_frame = (CLOCK_90K as f64 / seq.fps) as u64;
                }
            }
            EsKind::MpegAudio => {
                if let Some(hdr) = mp3::FrameHeader::parse(u32::from_be_bytes([
                    frame[0], frame[1], frame[2], frame[3],
                ])) {
                    self.audio = AudioProps {
                        sample_rate: hdr.sample_rate,
                        channels: hdr.channels,
                        samples_per_frame: hdr.samples_per_frame(),
                        bitrate: hdr.bitrate,
                        layer: hdr.layer_number(),
                    };
                }
            }
            EsKind::Ac3 => {
                if let Some(frame) = ac3::SyncFrame::parse(frame) {
                    self.audio = AudioProps {
                        sample_rate: frame.sample_rate,
                        channels: frame.channels,
                        samples_per_frame: ac3::SAMPLES_PER_FRAME,
                        bitrate: frame.bitrate,
                        layer: 0,
                    };
                }
            }
            EsKind::Lpcm => {}
        }
    }

    /// Converts a frame timestamp to 90 kHz ticks since `base`, using frame
    /// counting when the current frame carries no PES timestamp.
    pub fn frame_ticks(&self, base: u64) -> u64 {
        let (ts, frames_since) = match self.frame_ts.best(self.is_video()) {
            Some(ts) => (ts, 0u64),
            None => (self.last_ts, self.frames_since_last_ts as u64 + 1),
        };
        let mut ticks = ts.saturating_sub(base);
        if self.is_video() {
            ticks += frames_since * self.ticks_per_frame;
        } else if self.audio.sample_rate != 0 {
            ticks += frames_since * CLOCK_90K * self.audio.samples_per_frame as u64
                / self.audio.sample_rate as u64;
        }
        ticks
    }

    /// Picture coding type of the loaded video frame.
    pub fn loaded_picture_type(&self) -> Option<PictureType> {
        mpeg12::picture_type(&self.buffer, self.pict_header_offset)
    }
}

/// Finds the next sequence/GOP/picture start code at or after `from`.
fn next_frame_code(data: &[u8], from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some((at, code)) = mpegvideo::next_start_code(data, pos) {
        if mpeg12::is_frame_start(code) {
            return Some(at);
        }
        pos = at + 4;
    }
    None
}
