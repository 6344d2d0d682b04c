use bytes::Bytes;
use media_types::{
    CodecId, ImportError, ImportRequest, Importer, ImporterEvent, MediaSample, Progress,
    PropertyValue, RapKind, Result, SimpleTextMode, Sink, SinkAck, StreamDescriptor, StreamHandle,
    StreamType, SubSample, TrackCatalog, TrackInfo, VideoInfo,
};
use tracing::{info, warn};

use crate::tx3g::{TextConfig, TextSample};
use crate::ttml::{TtmlLoadOptions, load_ttml};
use crate::{SwfReader, TextCue, TextFormat, decode_text, guess_format};

/// Importer over every supported subtitle/text format.
///
/// The whole document is parsed on the first `process()` step; samples are
/// then drained cooperatively, honoring sink backpressure and the abort
/// flag at each sample boundary.
pub struct TextImporter {
    text: String,
    format: TextFormat,
    base_dir: Option<std::path::PathBuf>,
    request: ImportRequest,
    swf: Option<Box<dyn SwfReader>>,

    handle: Option<StreamHandle>,
    pending: Vec<MediaSample>,
    last_dur: u64,
    emit_idx: usize,
    stopped: bool,
}

impl TextImporter {
    /// Opens a text file.
    pub fn from_path(path: &std::path::Path) -> Result<TextImporter> {
        let data =
            std::fs::read(path).map_err(|_| ImportError::UrlError(path.display().to_string()))?;
        let extension = path.extension().and_then(|e| e.to_str()).map(str::to_string);
        let mut importer = Self::from_bytes(&data, extension.as_deref());
        importer.base_dir = path.parent().map(|p| p.to_path_buf());
        Ok(importer)
    }

    /// Creates an importer over in-memory document bytes.
    #[must_use]
    pub fn from_bytes(data: &[u8], extension: Option<&str>) -> TextImporter {
        let text = decode_text(data);
        let mut head_len = text.len().min(1024);
        while !text.is_char_boundary(head_len) {
            head_len -= 1;
        }
        let format = guess_format(&text[..head_len], extension);
        TextImporter {
            text,
            format,
            base_dir: None,
            request: ImportRequest::default(),
            swf: None,
            handle: None,
            pending: Vec::new(),
            last_dur: 0,
            emit_idx: 0,
            stopped: false,
        }
    }

    /// Installs the external SWF frame reader.
    pub fn with_swf_reader(mut self, reader: Box<dyn SwfReader>) -> TextImporter {
        self.swf = Some(reader);
        self
    }

    /// The detected input format.
    #[must_use]
    pub fn format(&self) -> TextFormat {
        self.format
    }

    fn timescale(&self) -> u32 {
        1000
    }

    /// Turns a cue list into TX3G samples with a gap-free timeline:
    /// a leading empty sample when the first cue starts late, empty fillers
    /// between cues, and a zero-duration flush cue at the end.
    fn cues_to_samples(&self, cues: &[TextCue]) -> Vec<MediaSample> {
        let mut samples = Vec::new();
        let no_empty = self.request.no_empty;
        let mut prev_end = 0u64;
        let mut first = true;
        for cue in cues {
            if first && cue.start_ms > 0 && !no_empty {
                let mut gap = MediaSample::new(TextSample::default().build(), 0, RapKind::Sync);
                gap.duration = Some(cue.start_ms as u32);
                samples.push(gap);
            }
            if !first && cue.start_ms != prev_end && !no_empty {
                let mut gap =
                    MediaSample::new(TextSample::default().build(), prev_end, RapKind::Sync);
                gap.duration = Some((cue.start_ms - prev_end) as u32);
                samples.push(gap);
            }
            first = false;
            let payload = TextSample {
                text: cue.text.clone(),
                styles: cue.styles.clone(),
            }
            .build();
            let mut samp = MediaSample::new(payload, cue.start_ms, RapKind::Sync);
            samp.duration = Some((cue.end_ms - cue.start_ms) as u32);
            samples.push(samp);
            prev_end = cue.end_ms;
        }
        if prev_end != 0 && !self.request.noflush && !no_empty {
            let flush = MediaSample::new(TextSample::default().build(), prev_end, RapKind::Sync);
            samples.push(flush);
        }
        samples
    }

    fn tx3g_descriptor(&self, width: u32, height: u32) -> StreamDescriptor {
        let mut config = TextConfig::default();
        if self.request.nodefbox {
            config.default_box = (0, 0, 0, 0);
        } else if width != 0 && height != 0 {
            config.default_box = (0, 0, height as i16, width as i16);
        }
        let mut desc = StreamDescriptor::new(StreamType::Text, CodecId::Tx3g, self.timescale());
        desc.codec_config = Some(Bytes::from(config.build()));
        desc.language = self.request.language.clone();
        if width != 0 && height != 0 {
            desc.video = Some(VideoInfo {
                width,
                height,
                ..Default::default()
            });
        }
        desc
    }

    fn setup(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let (desc, samples, last_dur) = match self.format {
            TextFormat::Srt => {
                let cues = crate::parse_srt(&self.text);
                (self.tx3g_descriptor(0, 0), self.cues_to_samples(&cues), 0)
            }
            TextFormat::Sub => {
                let fps = if self.request.video_fps > 0.0
                    && self.request.video_fps != media_types::AUTO_FPS
                {
                    self.request.video_fps
                } else {
                    25.0
                };
                let cues = crate::parse_sub(&self.text, fps);
                (self.tx3g_descriptor(0, 0), self.cues_to_samples(&cues), 0)
            }
            TextFormat::Ssa => {
                let cues = crate::parse_ssa(&self.text);
                (self.tx3g_descriptor(0, 0), self.cues_to_samples(&cues), 0)
            }
            TextFormat::Ttxt => {
                let doc = crate::parse_ttxt(&self.text)?;
                (
                    self.tx3g_descriptor(doc.width, doc.height),
                    ttxt_samples(&doc.cues),
                    0,
                )
            }
            TextFormat::WebVtt => {
                let doc = crate::parse_vtt(&self.text)
                    .ok_or_else(|| ImportError::non_compliant("missing WEBVTT signature"))?;
                let mut desc =
                    StreamDescriptor::new(StreamType::Text, CodecId::WebVtt, self.timescale());
                desc.codec_config = Some(Bytes::from(doc.header.into_bytes()));
                desc.language = self.request.language.clone();
                let samples = doc
                    .cues
                    .iter()
                    .map(|cue| {
                        let mut samp = MediaSample::new(
                            cue.text.clone().into_bytes(),
                            cue.start_ms,
                            RapKind::Sync,
                        );
                        samp.duration = Some((cue.end_ms - cue.start_ms) as u32);
                        samp
                    })
                    .collect();
                (desc, samples, 0)
            }
            TextFormat::Ttml => self.setup_ttml()?,
            TextFormat::SwfSvg => self.setup_swf()?,
            TextFormat::Simple => self.setup_simple(),
        };
        info!(format = ?self.format, samples = samples.len(), "text import ready");
        self.handle = Some(sink.declare_stream(desc)?);
        self.pending = samples;
        self.last_dur = last_dur;
        Ok(())
    }

    fn setup_ttml(&mut self) -> Result<(StreamDescriptor, Vec<MediaSample>, u64)> {
        let opts = TtmlLoadOptions {
            split: self.request.ttml.split,
            embed: self.request.ttml.embed,
            zero: self.request.ttml.zero.clone(),
            base_dir: self.base_dir.clone(),
        };
        let doc = load_ttml(&self.text, &opts)?;
        let mut desc = StreamDescriptor::new(StreamType::Text, CodecId::Ttml, self.timescale());
        desc.language = doc.language.clone().or(self.request.language.clone());

        // composition offset policy: None keeps interval times; a negative
        // request rebases the first interval to zero; a non-negative one
        // shifts everything so the first interval lands on that time
        let first_begin = doc.samples.first().map(|s| s.begin_ms).unwrap_or(0);
        let cts_shift = |begin: u64| -> u64 {
            match self.request.ttml.cts {
                None => begin,
                Some(v) if v < 0 => begin - first_begin,
                Some(v) => begin - first_begin + v as u64,
            }
        };

        let mut samples = Vec::new();
        let mut prev_end: Option<u64> = None;
        let mut last_dur = 0u64;
        for ts in &doc.samples {
            if let Some(prev) = prev_end {
                if self.request.ttml.split && !self.request.no_empty && prev < ts.begin_ms {
                    // fill the inter-cue hole with an empty document
                    let empty = empty_ttml_doc(&ts.xml);
                    let mut gap =
                        MediaSample::new(empty.into_bytes(), cts_shift(prev), RapKind::Sync);
                    gap.duration = Some((ts.begin_ms - prev) as u32);
                    samples.push(gap);
                }
            }
            let mut data = ts.xml.clone().into_bytes();
            let text_len = data.len();
            let mut subsamples = Vec::new();
            if !ts.resources.is_empty() {
                subsamples.push(SubSample {
                    size: text_len as u32,
                });
                for res in &ts.resources {
                    subsamples.push(SubSample {
                        size: res.len() as u32,
                    });
                    data.extend_from_slice(res);
                }
            }
            let mut samp = MediaSample::new(data, cts_shift(ts.begin_ms), RapKind::Sync);
            last_dur = ts.end_ms.saturating_sub(ts.begin_ms);
            if !self.request.ttml.split {
                if let Some(dur) = self.request.ttml.dur {
                    last_dur = dur;
                }
            }
            samp.duration = Some(last_dur as u32);
            samp.subsamples = subsamples;
            samples.push(samp);
            prev_end = Some(ts.end_ms);
        }
        Ok((desc, samples, last_dur))
    }

    fn setup_swf(&mut self) -> Result<(StreamDescriptor, Vec<MediaSample>, u64)> {
        let Some(reader) = self.swf.as_mut() else {
            return Err(ImportError::NotSupported(
                "SWF input requires an external frame reader".into(),
            ));
        };
        let header = reader.header_svg()?;
        let mut desc = StreamDescriptor::new(StreamType::Text, CodecId::SimpleText, 1000);
        desc.codec_config = Some(Bytes::from(header.into_bytes()));
        let mut samples = Vec::new();
        while let Some(frame) = reader.next_frame()? {
            let rap = if frame.is_rap {
                RapKind::Sync
            } else {
                RapKind::None
            };
            samples.push(MediaSample::new(frame.svg.into_bytes(), frame.timestamp_ms, rap));
        }
        Ok((desc, samples, 0))
    }

    fn setup_simple(&mut self) -> (StreamDescriptor, Vec<MediaSample>, u64) {
        let codec = match self.request.stxtmod {
            SimpleTextMode::Tx3g => CodecId::Tx3g,
            SimpleTextMode::Vtt => CodecId::WebVtt,
            SimpleTextMode::None => CodecId::SimpleText,
        };
        let mut desc = StreamDescriptor::new(StreamType::Text, codec, self.timescale());
        if self.request.stxtmod == SimpleTextMode::Tx3g {
            desc.codec_config = Some(Bytes::from(TextConfig::default().build()));
        }
        let samples = self
            .text
            .lines()
            .enumerate()
            .map(|(i, line)| {
                let payload = match self.request.stxtmod {
                    SimpleTextMode::Tx3g => TextSample {
                        text: line.to_string(),
                        styles: Vec::new(),
                    }
                    .build(),
                    _ => line.as_bytes().to_vec(),
                };
                let mut samp = MediaSample::new(payload, i as u64 * 1000, RapKind::Sync);
                samp.duration = Some(1000);
                samp
            })
            .collect();
        (desc, samples, 1000)
    }

    fn probe_duration_ms(&self) -> Option<u64> {
        let cues = match self.format {
            TextFormat::Srt => crate::parse_srt(&self.text),
            TextFormat::Sub => crate::parse_sub(&self.text, 25.0),
            TextFormat::Ssa => crate::parse_ssa(&self.text),
            TextFormat::WebVtt => crate::parse_vtt(&self.text)?.cues,
            TextFormat::Ttxt => crate::parse_ttxt(&self.text).ok()?.cues,
            _ => return None,
        };
        cues.iter().map(|c| c.end_ms).max()
    }
}

fn ttxt_samples(cues: &[TextCue]) -> Vec<MediaSample> {
    cues.iter()
        .map(|cue| {
            let payload = TextSample {
                text: cue.text.clone(),
                styles: cue.styles.clone(),
            }
            .build();
            let mut samp = MediaSample::new(payload, cue.start_ms, RapKind::Sync);
            samp.duration = Some((cue.end_ms.saturating_sub(cue.start_ms)) as u32);
            samp
        })
        .collect()
}

/// Produces the empty-document form of a per-interval serialization by
/// dropping every `<p>` element (cheap textual pass; the input here is
/// already a single-interval document).
fn empty_ttml_doc(interval_xml: &str) -> String {
    let mut out = String::with_capacity(interval_xml.len());
    let mut rest = interval_xml;
    loop {
        match rest.find("<p") {
            None => {
                out.push_str(rest);
                return out;
            }
            Some(open) => {
                out.push_str(&rest[..open]);
                let tail = &rest[open..];
                match tail.find("</p>") {
                    Some(close) => rest = &tail[close + 4..],
                    None => match tail.find("/>") {
                        Some(close) => rest = &tail[close + 2..],
                        None => return out,
                    },
                }
            }
        }
    }
}

impl Importer for TextImporter {
    fn probe(&mut self) -> Result<TrackCatalog> {
        let track = TrackInfo {
            track_num: 1,
            stream_type: Some(StreamType::Text),
            codec_id: Some(match self.format {
                TextFormat::WebVtt => CodecId::WebVtt,
                TextFormat::Ttml => CodecId::Ttml,
                TextFormat::Simple => CodecId::SimpleText,
                _ => CodecId::Tx3g,
            }),
            duration_ms: self.probe_duration_ms(),
            ..Default::default()
        };
        Ok(TrackCatalog {
            tracks: vec![track],
            programs: Vec::new(),
        })
    }

    fn configure(&mut self, request: ImportRequest) -> Result<()> {
        if let Some(idx) = request.stream_index {
            if idx != 1 {
                return Err(ImportError::BadParam(format!(
                    "text inputs carry a single track, requested {idx}"
                )));
            }
        }
        self.request = request;
        Ok(())
    }

    fn process(&mut self, sink: &mut dyn Sink) -> Result<Progress> {
        if self.stopped {
            return Ok(Progress::Eos);
        }
        if self.handle.is_none() {
            self.setup(sink)?;
        }
        let handle = self.handle.expect("stream declared in setup");
        let cap = self.request.duration_ms;
        while self.emit_idx < self.pending.len() {
            if self.request.aborted() {
                break;
            }
            let sample = &self.pending[self.emit_idx];
            if cap != 0 && sample.dts > cap {
                break;
            }
            match sink.write_sample(handle, sample.clone())? {
                SinkAck::Accepted => self.emit_idx += 1,
                SinkAck::WouldBlock => return Ok(Progress::WouldBlock),
            }
        }
        sink.set_stream_property(handle, "ttxt:last_dur", PropertyValue::Uint(self.last_dur));
        sink.signal_eos(handle);
        self.stopped = true;
        Ok(Progress::Eos)
    }

    fn event(&mut self, event: ImporterEvent) {
        match event {
            ImporterEvent::Play { start_ms } => {
                self.stopped = false;
                // restart delivery at the first sample still visible
                self.emit_idx = self
                    .pending
                    .iter()
                    .position(|s| {
                        s.dts + s.duration.unwrap_or(0) as u64 >= start_ms
                    })
                    .unwrap_or(self.pending.len());
            }
            ImporterEvent::Stop => self.stopped = true,
            ImporterEvent::SetSpeed(speed) => {
                if speed < 0.0 {
                    warn!("reverse playback not supported for text streams");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::MemorySink;

    const SRT: &str = "1\n00:00:01,000 --> 00:00:02,500\nHello, <b>world</b>.\n\n2\n00:00:03,000 --> 00:00:04,000\nBye.\n";

    fn run(importer: &mut TextImporter, sink: &mut MemorySink) {
        loop {
            match importer.process(sink).unwrap() {
                Progress::Eos => break,
                Progress::WouldBlock => sink.accept_budget = None,
                Progress::Continue => {}
            }
        }
    }

    #[test]
    fn srt_happy_path_samples() {
        let mut importer = TextImporter::from_bytes(SRT.as_bytes(), Some("srt"));
        importer.configure(ImportRequest::default()).unwrap();
        let mut sink = MemorySink::new();
        run(&mut importer, &mut sink);

        let samples = sink.samples(0);
        // gap, cue, gap, cue, flush
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].dts, 0);
        assert_eq!(samples[0].duration, Some(1000));
        assert_eq!(samples[0].data.len(), 2); // empty text sample

        assert_eq!(samples[1].dts, 1000);
        assert_eq!(samples[1].duration, Some(1500));
        let text_len = u16::from_be_bytes([samples[1].data[0], samples[1].data[1]]) as usize;
        assert_eq!(&samples[1].data[2..2 + text_len], b"Hello, world.");
        // bold style record spans chars 7..12
        let styl = &samples[1].data[2 + text_len..];
        assert_eq!(&styl[4..8], b"styl");
        assert_eq!(u16::from_be_bytes([styl[10], styl[11]]), 7);
        assert_eq!(u16::from_be_bytes([styl[12], styl[13]]), 12);

        assert_eq!(samples[2].dts, 2500);
        assert_eq!(samples[2].duration, Some(500));
        assert_eq!(samples[3].dts, 3000);
        assert_eq!(samples[3].duration, Some(1000));
        // trailing flush
        assert_eq!(samples[4].dts, 4000);
        assert!(sink.streams[0].eos);
    }

    #[test]
    fn srt_backpressure_resumes() {
        let mut importer = TextImporter::from_bytes(SRT.as_bytes(), Some("srt"));
        importer.configure(ImportRequest::default()).unwrap();
        let mut sink = MemorySink::new();
        sink.accept_budget = Some(2);
        assert_eq!(importer.process(&mut sink).unwrap(), Progress::WouldBlock);
        assert_eq!(sink.samples(0).len(), 2);
        sink.accept_budget = None;
        assert_eq!(importer.process(&mut sink).unwrap(), Progress::Eos);
        assert_eq!(sink.samples(0).len(), 5);
    }

    #[test]
    fn ttml_split_samples() {
        let xml = "<tt xmlns=\"http://www.w3.org/ns/ttml\"><body><div><p begin=\"0s\" end=\"2s\">A</p><p begin=\"1s\" end=\"3s\">B</p></div></body></tt>";
        let mut importer = TextImporter::from_bytes(xml.as_bytes(), Some("ttml"));
        let mut req = ImportRequest::default();
        req.ttml.split = true;
        importer.configure(req).unwrap();
        let mut sink = MemorySink::new();
        run(&mut importer, &mut sink);
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].dts, 0);
        assert_eq!(samples[1].dts, 1000);
        assert_eq!(samples[2].dts, 2000);
        assert!(
            sink.streams[0]
                .properties
                .iter()
                .any(|(k, v)| k == "ttxt:last_dur" && *v == PropertyValue::Uint(1000))
        );
    }

    #[test]
    fn simple_text_mode() {
        let mut importer = TextImporter::from_bytes(b"one\ntwo", None);
        importer.configure(ImportRequest::default()).unwrap();
        assert_eq!(importer.format(), TextFormat::Simple);
        let mut sink = MemorySink::new();
        run(&mut importer, &mut sink);
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].data.as_ref(), b"one");
        assert_eq!(samples[1].dts, 1000);
    }

    #[test]
    fn duration_cap_stops_early() {
        let mut importer = TextImporter::from_bytes(SRT.as_bytes(), Some("srt"));
        let request = ImportRequest {
            duration_ms: 2000,
            ..Default::default()
        };
        importer.configure(request).unwrap();
        let mut sink = MemorySink::new();
        run(&mut importer, &mut sink);
        // samples past the 2 s cap are not emitted
        assert!(sink.samples(0).iter().all(|s| s.dts <= 2000));
        assert!(sink.streams[0].eos);
    }
}
