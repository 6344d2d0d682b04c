use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use media_types::{
    AudioInfo, CodecId, ImportError, ImportRequest, Importer, ImporterEvent, MediaSample,
    Progress, RapKind, Result, Sink, SinkAck, StreamDescriptor, StreamHandle, StreamType,
    TrackCatalog, TrackInfo, VideoInfo, video_timing,
};
use mpegps::{AudioKind, PsDemuxer, TsUnits};
use mpegvideo::PictureType;
use tracing::{info, warn};

enum PsSource {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    video: bool,
    index: u32,
    dts_inc: u64,
    timescale: u32,
}

/// MPEG-2 Program Stream importer.
///
/// Wraps the pack/PES demuxer: one stream is selected, its access units are
/// pulled one per `process()` step and re-stamped on a constant frame/sample
/// grid. Video composition offsets are resolved at end of stream by a
/// rewrite pass deferring each reference frame past its trailing B run.
pub struct PsImporter {
    source: PsSource,
    request: ImportRequest,
    demux: Option<PsDemuxer>,
    selection: Option<Selection>,
    handle: Option<StreamHandle>,
    pending: Option<MediaSample>,
    frames: u64,
    ref_frame: u64,
    cts_updates: Vec<(u64, i64)>,
    audio_dts: u64,
    done: bool,
}

impl PsImporter {
    /// Creates an importer over a `.mpg`/`.vob` file.
    #[must_use]
    pub fn new(path: &Path) -> PsImporter {
        Self::with_source(PsSource::File(path.to_path_buf()))
    }

    /// Creates an importer over an in-memory program stream.
    #[must_use]
    pub fn from_bytes(data: impl Into<Arc<[u8]>>) -> PsImporter {
        Self::with_source(PsSource::Memory(data.into()))
    }

    fn with_source(source: PsSource) -> PsImporter {
        PsImporter {
            source,
            request: ImportRequest::default(),
            demux: None,
            selection: None,
            handle: None,
            pending: None,
            frames: 0,
            ref_frame: 0,
            cts_updates: Vec::new(),
            audio_dts: 0,
            done: false,
        }
    }

    fn open(&mut self) -> Result<&mut PsDemuxer> {
        if self.demux.is_none() {
            let demux = match &self.source {
                PsSource::File(path) => PsDemuxer::open(path),
                PsSource::Memory(data) => PsDemuxer::from_bytes(data.clone()),
            }
            .map_err(map_ps_err)?;
            self.demux = Some(demux);
        }
        Ok(self.demux.as_mut().expect("opened above"))
    }

    /// Resolves the requested track to a (video?, index) pair; track
    /// numbers count video streams first, then audio.
    fn select(&mut self) -> Result<Selection> {
        let fps_override = self.request.video_fps;
        let track = self.request.stream_index;
        let demux = self.open()?;
        let nb_video = demux.video_stream_count();
        let nb_audio = demux.audio_stream_count();
        let (video, index) = match track {
            Some(n) if n >= 1 && n <= nb_video => (true, n - 1),
            Some(n) if n > nb_video && n <= nb_video + nb_audio => (false, n - nb_video - 1),
            Some(n) => {
                return Err(ImportError::BadParam(format!(
                    "track {n} not found ({nb_video} video, {nb_audio} audio streams)"
                )));
            }
            None if nb_video == 1 => (true, 0),
            None if nb_video == 0 && nb_audio == 1 => (false, 0),
            None => {
                return Err(ImportError::BadParam(format!(
                    "{} streams in MPEG file, indicate the track to import",
                    nb_video + nb_audio
                )));
            }
        };
        if video {
            let info = *demux.video_info(index).ok_or(ImportError::BadParam(
                "video stream vanished".into(),
            ))?;
            let mut fps = info.fps;
            if fps_override != 0.0 && fps_override != media_types::AUTO_FPS {
                fps = fps_override;
            }
            let (timescale, dts_inc) = video_timing(fps);
            Ok(Selection {
                video: true,
                index,
                dts_inc: dts_inc as u64,
                timescale,
            })
        } else {
            let info = *demux.audio_info(index).ok_or(ImportError::BadParam(
                "audio stream vanished".into(),
            ))?;
            Ok(Selection {
                video: false,
                index,
                dts_inc: info.samples_per_frame as u64,
                timescale: info.sample_rate,
            })
        }
    }

    fn declare(&mut self, sink: &mut dyn Sink, sel: Selection) -> Result<StreamHandle> {
        let request_lang = self.request.language.clone();
        let demux = self.demux.as_mut().expect("opened in select");
        let mut desc = if sel.video {
            let info = *demux.video_info(sel.index).expect("validated");
            let codec = if info.is_mpeg2 {
                CodecId::Mpeg2Video
            } else {
                CodecId::Mpeg1Video
            };
            info!(
                width = info.width,
                height = info.height,
                fps = info.fps,
                ?codec,
                "MPEG-PS video import"
            );
            let mut desc = StreamDescriptor::new(StreamType::Visual, codec, sel.timescale);
            desc.stream_id = demux.video_stream_id(sel.index).unwrap_or(0xE0) as u32;
            desc.video = Some(VideoInfo {
                width: info.width,
                height: info.height,
                pixel_aspect: info.aspect,
                fps: Some(info.fps),
                ..Default::default()
            });
            desc
        } else {
            let info = *demux.audio_info(sel.index).expect("validated");
            let codec = match demux.audio_kind(sel.index) {
                Some(AudioKind::Mpeg) => {
                    if info.layer == 3 {
                        CodecId::Mp3
                    } else {
                        CodecId::Mpeg2Audio
                    }
                }
                Some(AudioKind::Ac3) => CodecId::Ac3,
                _ => {
                    return Err(ImportError::NotSupported(
                        "LPCM program stream audio".into(),
                    ));
                }
            };
            info!(
                sample_rate = info.sample_rate,
                channels = info.channels,
                ?codec,
                "MPEG-PS audio import"
            );
            let mut desc = StreamDescriptor::new(StreamType::Audio, codec, sel.timescale);
            desc.audio = Some(AudioInfo {
                sample_rate: info.sample_rate,
                channels: info.channels,
                bits_per_sample: 16,
                samples_per_frame: info.samples_per_frame,
            });
            desc
        };
        desc.duration_hint =
            Some(demux.max_time_ms() * sel.timescale as u64 / 1000);
        desc.language = request_lang;
        sink.declare_stream(desc)
    }

    fn next_sample(&mut self, sel: Selection) -> Result<Option<MediaSample>> {
        let demux = self.demux.as_mut().expect("opened");
        if sel.video {
            let Some(frame) = demux
                .next_video_frame(sel.index, TsUnits::Ticks90k)
                .map_err(map_ps_err)?
            else {
                return Ok(None);
            };
            let mut data = frame.data;
            // drop a trailing sequence-end code
            if data.len() >= 4 && data[data.len() - 4..data.len() - 1] == [0, 0, 1] {
                data.truncate(data.len() - 4);
            }
            let rap = if frame.picture_type == PictureType::I {
                RapKind::Sync
            } else {
                RapKind::None
            };
            let dts = sel.dts_inc * self.frames;
            if frame.picture_type != PictureType::B {
                // defer the previous reference frame past the B run
                let gap = self.frames - self.ref_frame;
                if gap > 0 {
                    self.cts_updates
                        .push((self.ref_frame, (gap * sel.dts_inc) as i64));
                }
                self.ref_frame = self.frames;
            }
            self.frames += 1;
            Ok(Some(MediaSample::new(Bytes::from(data), dts, rap)))
        } else {
            let Some(frame) = demux
                .next_audio_frame(sel.index, TsUnits::Ticks90k)
                .map_err(map_ps_err)?
            else {
                return Ok(None);
            };
            let dts = self.audio_dts;
            self.audio_dts += sel.dts_inc;
            self.frames += 1;
            Ok(Some(MediaSample::new(
                Bytes::from(frame.data),
                dts,
                RapKind::Sync,
            )))
        }
    }
}

fn map_ps_err(e: mpegps::PsError) -> ImportError {
    match e {
        mpegps::PsError::Open(path) => ImportError::UrlError(path),
        mpegps::PsError::Io(e) => ImportError::Io(e),
        mpegps::PsError::NoStreams => {
            ImportError::non_compliant("no MPEG program stream content found")
        }
        mpegps::PsError::BadStream(n) => ImportError::BadParam(format!("stream {n} not present")),
    }
}

impl Importer for PsImporter {
    fn probe(&mut self) -> Result<TrackCatalog> {
        let demux = self.open()?;
        let mut tracks = Vec::new();
        let nb_video = demux.video_stream_count();
        for i in 0..nb_video {
            let info = *demux.video_info(i).expect("counted");
            tracks.push(TrackInfo {
                track_num: i + 1,
                stream_type: Some(StreamType::Visual),
                codec_id: Some(if info.is_mpeg2 {
                    CodecId::Mpeg2Video
                } else {
                    CodecId::Mpeg1Video
                }),
                video: Some(VideoInfo {
                    width: info.width,
                    height: info.height,
                    pixel_aspect: info.aspect,
                    fps: Some(info.fps),
                    ..Default::default()
                }),
                duration_ms: Some(demux.stream_duration_ms(true, i)),
                ..Default::default()
            });
        }
        for i in 0..demux.audio_stream_count() {
            let info = *demux.audio_info(i).expect("counted");
            tracks.push(TrackInfo {
                track_num: nb_video + i + 1,
                stream_type: Some(StreamType::Audio),
                codec_id: match demux.audio_kind(i) {
                    Some(AudioKind::Ac3) => Some(CodecId::Ac3),
                    Some(AudioKind::Lpcm) => Some(CodecId::Generic),
                    _ => Some(CodecId::Mp3),
                },
                audio: Some(AudioInfo {
                    sample_rate: info.sample_rate,
                    channels: info.channels,
                    bits_per_sample: 16,
                    samples_per_frame: info.samples_per_frame,
                }),
                duration_ms: Some(demux.stream_duration_ms(false, i)),
                ..Default::default()
            });
        }
        Ok(TrackCatalog {
            tracks,
            programs: Vec::new(),
        })
    }

    fn configure(&mut self, request: ImportRequest) -> Result<()> {
        if request.use_dataref {
            return Err(ImportError::NotSupported(
                "data referencing into MPEG-1/2 systems files".into(),
            ));
        }
        self.request = request;
        Ok(())
    }

    fn process(&mut self, sink: &mut dyn Sink) -> Result<Progress> {
        if self.done {
            return Ok(Progress::Eos);
        }
        let sel = match self.selection {
            Some(sel) => sel,
            None => {
                let sel = self.select()?;
                self.selection = Some(sel);
                sel
            }
        };
        if self.handle.is_none() {
            self.handle = Some(self.declare(sink, sel)?);
        }
        let handle = self.handle.expect("declared above");

        let duration_cap = self.request.duration_ms * sel.timescale as u64 / 1000;
        let sample = match self.pending.take() {
            Some(sample) => Some(sample),
            None => {
                if self.request.aborted() {
                    None
                } else {
                    self.next_sample(sel)?
                }
            }
        };
        let Some(sample) = sample else {
            // end of stream: resolve deferred composition offsets
            if sel.video && !self.cts_updates.is_empty() {
                let updates = std::mem::take(&mut self.cts_updates);
                sink.rewrite_samples(handle, &mut |i, samp| {
                    for (idx, off) in &updates {
                        if *idx == i as u64 {
                            samp.cts_offset = *off;
                        }
                    }
                })?;
            }
            sink.signal_eos(handle);
            self.done = true;
            return Ok(Progress::Eos);
        };
        if duration_cap != 0 && sample.dts > duration_cap {
            self.pending = None;
            // flush as if the stream ended
            if sel.video && !self.cts_updates.is_empty() {
                let updates = std::mem::take(&mut self.cts_updates);
                sink.rewrite_samples(handle, &mut |i, samp| {
                    for (idx, off) in &updates {
                        if *idx == i as u64 {
                            samp.cts_offset = *off;
                        }
                    }
                })?;
            }
            sink.signal_eos(handle);
            self.done = true;
            return Ok(Progress::Eos);
        }
        match sink.write_sample(handle, sample.clone())? {
            SinkAck::Accepted => Ok(Progress::Continue),
            SinkAck::WouldBlock => {
                self.pending = Some(sample);
                Ok(Progress::WouldBlock)
            }
        }
    }

    fn event(&mut self, event: ImporterEvent) {
        match event {
            ImporterEvent::Play { start_ms } if start_ms > 0 => {
                if let (Some(sel), Some(demux)) = (self.selection, self.demux.as_mut()) {
                    let seeked = if sel.video {
                        demux.seek_video(sel.index, start_ms)
                    } else {
                        demux.seek_audio(sel.index, start_ms)
                    };
                    if let Err(e) = seeked {
                        warn!(error = %e, "seek failed, continuing linearly");
                    }
                    self.pending = None;
                }
            }
            ImporterEvent::Play { .. } | ImporterEvent::SetSpeed(_) => {}
            ImporterEvent::Stop => self.done = true,
        }
    }
}
