use std::path::{Path, PathBuf};

use bytes::Bytes;
use media_types::{
    AudioInfo, CodecId, ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind,
    Result, Sink, SinkAck, StreamDescriptor, StreamHandle, StreamType, TrackCatalog, TrackInfo,
    VideoInfo,
};
use tracing::{info, warn};

use crate::deflate_sample;
use crate::xml_range::extract_xml_range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DictMode {
    None,
    File,
    SelfFeeding,
}

/// NHML (and DIMS document) importer.
///
/// The descriptor XML declares the track; sample payloads come from the
/// companion `.media` file (or `baseMediaFile`), per-sample `mediaFile`
/// overrides, or `xmlFrom`/`xmlTo` ranges of an XML document. Optional
/// per-sample deflate and DIMS enveloping are applied last.
pub struct NhmlImporter {
    path: PathBuf,
    dims_doc: bool,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    pending: Vec<MediaSample>,
    desc: Option<StreamDescriptor>,
    emit_idx: usize,
    done: bool,
}

impl NhmlImporter {
    /// Creates an importer for an `.nhml` descriptor file.
    pub fn new(path: &Path) -> NhmlImporter {
        NhmlImporter {
            path: path.to_path_buf(),
            dims_doc: false,
            request: ImportRequest::default(),
            handle: None,
            pending: Vec::new(),
            desc: None,
            emit_idx: 0,
            done: false,
        }
    }

    /// Creates an importer for a `.dml` DIMS document.
    pub fn new_dims(path: &Path) -> NhmlImporter {
        let mut importer = Self::new(path);
        importer.dims_doc = true;
        importer
    }

    fn companion(&self, extension: &str) -> PathBuf {
        self.path.with_extension(extension)
    }

    fn load(&mut self) -> Result<()> {
        let root_name = if self.dims_doc { "DIMSStream" } else { "NHNTStream" };
        let sample_name = if self.dims_doc { "DIMSUnit" } else { "NHNTSample" };

        let xml = std::fs::read_to_string(&self.path)
            .map_err(|_| ImportError::UrlError(self.path.display().to_string()))?;
        let doc = roxmltree::Document::parse(&xml)
            .map_err(|e| ImportError::non_compliant(format!("NHML parse error: {e}")))?;
        let root = doc.root_element();
        if root.tag_name().name() != root_name {
            return Err(ImportError::BadParam(format!(
                "\"{root_name}\" root expected, got \"{}\"",
                root.tag_name().name()
            )));
        }

        let mut stream_type = 0u32;
        let mut oti = 0u32;
        let mut timescale = 1000u32;
        let mut media_path = self.companion("media");
        let mut info_path = self.companion("info");
        let mut width = 0u32;
        let mut height = 0u32;
        let mut sample_rate = 0u32;
        let mut channels = 0u32;
        let mut bits_per_sample = 16u32;
        let mut dts_inc = 0u64;
        let mut do_compress = false;
        let mut dict_mode = DictMode::None;
        let mut dictionary: Option<Vec<u8>> = None;
        let mut media_subtype = String::new();
        let mut is_dims = self.dims_doc;

        let mut par_num = 0u32;
        let mut par_den = 0u32;
        for attr in root.attributes() {
            let name = attr.name();
            let value = attr.value();
            match name {
                "streamType" => stream_type = value.parse().unwrap_or(0),
                "objectTypeIndication" => oti = value.parse().unwrap_or(0),
                "timeScale" => timescale = value.parse().unwrap_or(1000),
                "mediaSubType" => media_subtype = value.to_string(),
                "width" => width = value.parse().unwrap_or(0),
                "height" => height = value.parse().unwrap_or(0),
                "parNum" => par_num = value.parse().unwrap_or(0),
                "parDen" => par_den = value.parse().unwrap_or(0),
                "sampleRate" => sample_rate = value.parse().unwrap_or(0),
                "numChannels" => channels = value.parse().unwrap_or(0),
                "bitsPerSample" => bits_per_sample = value.parse().unwrap_or(16),
                "baseMediaFile" => media_path = self.sibling(value),
                "specificInfoFile" => info_path = self.sibling(value),
                "DTS_increment" => dts_inc = value.parse().unwrap_or(0),
                "gzipSamples" => do_compress = value.eq_ignore_ascii_case("yes"),
                "gzipDictionary" => {
                    if value.eq_ignore_ascii_case("self") {
                        dict_mode = DictMode::SelfFeeding;
                    } else {
                        dict_mode = DictMode::File;
                        let dict_file = self.sibling(value);
                        match std::fs::read(&dict_file) {
                            Ok(data) => dictionary = Some(data),
                            Err(_) => {
                                warn!(file = %dict_file.display(), "cannot open dictionary file");
                                dict_mode = DictMode::None;
                            }
                        }
                    }
                }
                "content_encoding" => do_compress |= value == "deflate",
                _ => {}
            }
        }
        if media_subtype == "dims" {
            is_dims = true;
        }
        if sample_rate != 0 && timescale == 1000 {
            timescale = sample_rate;
        }
        if stream_type == 1 {
            return Err(ImportError::NotSupported(
                "object descriptor streams cannot be imported from NHML".into(),
            ));
        }
        if !is_dims && stream_type == 0 && media_subtype.is_empty() {
            return Err(ImportError::NotSupported(
                "NHML without streamType or mediaSubType".into(),
            ));
        }

        let spec_info = std::fs::read(&info_path).ok();

        let (st, mut codec) = crate::codec_from_mpeg4(stream_type, oti);
        if is_dims {
            codec = CodecId::Generic;
        }
        let mut desc = StreamDescriptor::new(
            if is_dims { StreamType::Scene } else { st },
            codec,
            timescale,
        );
        desc.codec_config = spec_info.clone().map(Bytes::from);
        desc.language = self.request.language.clone();

        // MPEG-4 Visual configs carry the real dimensions
        if codec == CodecId::Mpeg4Visual {
            if let Some(info) = &spec_info {
                if let Some(cfg) = mpegvideo::m4v::parse_config(info) {
                    width = cfg.width;
                    height = cfg.height;
                }
            }
        }
        if width != 0 && height != 0 {
            desc.video = Some(VideoInfo {
                width,
                height,
                pixel_aspect: if par_num != 0 && par_den != 0 {
                    Some((par_num, par_den))
                } else {
                    None
                },
                ..Default::default()
            });
        } else if sample_rate != 0 {
            desc.audio = Some(AudioInfo {
                sample_rate,
                channels: if channels != 0 { channels } else { 2 },
                bits_per_sample,
                samples_per_frame: 0,
            });
        }

        let media_data = std::fs::read(&media_path).ok();
        let mut media_done = 0u64;
        let mut samples = Vec::new();
        let mut count = 0u64;
        let mut prev_dts = 0u64;

        for node in root.children().filter(|n| n.is_element()) {
            if node.tag_name().name() != sample_name {
                continue;
            }
            let mut dts: Option<u64> = None;
            let mut cts_offset = 0i64;
            let mut rap = if count == 0 { RapKind::Sync } else { RapKind::None };
            let mut offset: Option<u64> = None;
            let mut length: Option<usize> = None;
            let mut media_file: Option<PathBuf> = None;
            let mut xml_from: Option<String> = None;
            let mut xml_to: Option<String> = None;
            let mut compress = do_compress;

            for attr in node.attributes() {
                let value = attr.value();
                match attr.name() {
                    "DTS" | "time" => dts = Some(parse_time(value, timescale)),
                    "CTSOffset" => cts_offset = value.parse().unwrap_or(0),
                    "isRAP" => {
                        if value.eq_ignore_ascii_case("yes") {
                            rap = RapKind::Sync;
                        } else if count != 0 {
                            rap = RapKind::None;
                        }
                    }
                    "isSyncShadow" => {
                        if value.eq_ignore_ascii_case("yes") {
                            rap = RapKind::SyncShadow;
                        }
                    }
                    "mediaOffset" => offset = value.parse().ok(),
                    "dataLength" => length = value.parse().ok(),
                    "mediaFile" => media_file = Some(self.sibling(value)),
                    "xmlFrom" => xml_from = Some(value.to_string()),
                    "xmlTo" => xml_to = Some(value.to_string()),
                    "compress" => compress |= value.eq_ignore_ascii_case("yes"),
                    _ => {}
                }
            }

            let mut dts = dts.unwrap_or(prev_dts + dts_inc);
            if count == 0 {
                dts = 0;
            }

            let mut payload: Vec<u8> = if let (Some(from), Some(to)) = (&xml_from, &xml_to) {
                let xml_file = media_file.clone().unwrap_or_else(|| media_path.clone());
                extract_xml_range(&xml_file, from, to)?
            } else if let Some(file) = &media_file {
                let data = std::fs::read(file)
                    .map_err(|_| ImportError::UrlError(file.display().to_string()))?;
                let start = offset.unwrap_or(0) as usize;
                let end = length.map(|l| start + l).unwrap_or(data.len());
                data.get(start..end.min(data.len())).unwrap_or(&[]).to_vec()
            } else {
                let Some(data) = &media_data else {
                    return Err(ImportError::UrlError(media_path.display().to_string()));
                };
                let start = offset.unwrap_or(media_done) as usize;
                let end = length.map(|l| start + l).unwrap_or(data.len());
                data.get(start..end.min(data.len())).unwrap_or(&[]).to_vec()
            };

            if compress {
                let dict = match dict_mode {
                    DictMode::None => None,
                    DictMode::File | DictMode::SelfFeeding => dictionary.as_deref(),
                };
                let raw = payload.clone();
                payload = deflate_sample(&payload, dict)?;
                // the self dictionary is installed after deflating, so the
                // first sample compresses without one
                if dict_mode == DictMode::SelfFeeding {
                    dictionary = Some(raw);
                }
            }

            if is_dims {
                payload = wrap_dims_unit(&payload, rap.is_rap());
                if payload.len() > 0xFFFF {
                    return Err(ImportError::BadParam(
                        "DIMS unit larger than 65535 bytes".into(),
                    ));
                }
            }

            media_done += payload.len() as u64;
            let mut samp = MediaSample::new(payload, dts, rap);
            samp.cts_offset = cts_offset;
            if self.request.use_dataref && media_file.is_none() && xml_from.is_none() && !compress {
                samp.data_ref = Some(offset.unwrap_or(0));
            }
            prev_dts = dts;
            count += 1;
            samples.push(samp);

            if self.request.duration_ms != 0
                && dts > self.request.duration_ms * timescale as u64 / 1000
            {
                break;
            }
        }

        info!(
            stream_type,
            oti,
            samples = samples.len(),
            "NHML import ready"
        );
        self.desc = Some(desc);
        self.pending = samples;
        Ok(())
    }

    fn sibling(&self, name: &str) -> PathBuf {
        let p = Path::new(name);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.path.parent().unwrap_or(Path::new(".")).join(p)
        }
    }
}

fn parse_time(value: &str, timescale: u32) -> u64 {
    // either raw ticks or h:m:s.ms
    if let Ok(ticks) = value.parse::<u64>() {
        return ticks;
    }
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() == 3 {
        let (sec, ms) = parts[2].split_once('.').unwrap_or((parts[2], "0"));
        let h: u64 = parts[0].parse().unwrap_or(0);
        let m: u64 = parts[1].parse().unwrap_or(0);
        let s: u64 = sec.parse().unwrap_or(0);
        let ms: u64 = ms.parse().unwrap_or(0);
        return ((h * 3600 + m * 60 + s) * 1000 + ms) * timescale as u64 / 1000;
    }
    0
}

/// Wraps a DIMS unit: 16-bit size (flags + payload), 8-bit flags, payload.
/// Units containing SVG content are flagged as scene (and high priority).
fn wrap_dims_unit(payload: &[u8], is_rap: bool) -> Vec<u8> {
    const UNIT_S: u8 = 0x01;
    const UNIT_M: u8 = 0x02;
    const UNIT_P: u8 = 0x08;
    let mut flags = 0u8;
    if is_rap {
        flags |= UNIT_M;
    }
    if payload.windows(4).any(|w| w == b"svg ") {
        flags |= UNIT_S | UNIT_P;
    }
    let mut out = Vec::with_capacity(payload.len() + 3);
    out.extend_from_slice(&((payload.len() + 1) as u16).to_be_bytes());
    out.push(flags);
    out.extend_from_slice(payload);
    out
}

impl Importer for NhmlImporter {
    fn probe(&mut self) -> Result<TrackCatalog> {
        Ok(TrackCatalog {
            tracks: vec![TrackInfo {
                track_num: 1,
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
            self.load()?;
            let desc = self.desc.clone().expect("descriptor built by load");
            self.handle = Some(sink.declare_stream(desc)?);
        }
        let handle = self.handle.expect("declared above");
        while self.emit_idx < self.pending.len() {
            if self.request.aborted() {
                break;
            }
            match sink.write_sample(handle, self.pending[self.emit_idx].clone())? {
                SinkAck::Accepted => self.emit_idx += 1,
                SinkAck::WouldBlock => return Ok(Progress::WouldBlock),
            }
        }
        sink.signal_eos(handle);
        self.done = true;
        Ok(Progress::Eos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::MemorySink;
    use std::io::Write;

    fn write_files(nhml: &str, media: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let nhml_path = dir.path().join("track.nhml");
        std::fs::File::create(&nhml_path)
            .unwrap()
            .write_all(nhml.as_bytes())
            .unwrap();
        std::fs::File::create(dir.path().join("track.media"))
            .unwrap()
            .write_all(media)
            .unwrap();
        (dir, nhml_path)
    }

    fn drive(path: &Path) -> MemorySink {
        let mut importer = NhmlImporter::new(path);
        importer.configure(ImportRequest::default()).unwrap();
        let mut sink = MemorySink::new();
        while importer.process(&mut sink).unwrap() != Progress::Eos {}
        sink
    }

    #[test]
    fn contiguous_samples_from_media_file() {
        let nhml = r#"<NHNTStream streamType="5" objectTypeIndication="64" timeScale="48000" sampleRate="48000" numChannels="2">
  <NHNTSample DTS="0" dataLength="4" isRAP="yes"/>
  <NHNTSample DTS="1024" dataLength="4"/>
  <NHNTSample DTS="2048" dataLength="2"/>
</NHNTStream>"#;
        let (_dir, path) = write_files(nhml, b"aaaabbbbcc");
        let sink = drive(&path);
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].data.as_ref(), b"aaaa");
        assert_eq!(samples[1].data.as_ref(), b"bbbb");
        assert_eq!(samples[2].data.as_ref(), b"cc");
        assert_eq!(samples[1].dts, 1024);
        assert_eq!(samples[0].rap, RapKind::Sync);
        assert_eq!(samples[1].rap, RapKind::None);

        let desc = sink.streams[0].desc.as_ref().unwrap();
        assert_eq!(desc.codec_id, CodecId::AacMp4);
        assert_eq!(desc.timescale, 48000);
        assert_eq!(desc.audio.unwrap().channels, 2);
    }

    #[test]
    fn explicit_offsets_and_sync_shadow() {
        let nhml = r#"<NHNTStream streamType="4" objectTypeIndication="33" timeScale="90000">
  <NHNTSample DTS="0" mediaOffset="4" dataLength="4" isRAP="yes"/>
  <NHNTSample DTS="3000" mediaOffset="0" dataLength="4" isSyncShadow="yes"/>
</NHNTStream>"#;
        let (_dir, path) = write_files(nhml, b"xxxxyyyy");
        let sink = drive(&path);
        let samples = sink.samples(0);
        assert_eq!(samples[0].data.as_ref(), b"yyyy");
        assert_eq!(samples[1].data.as_ref(), b"xxxx");
        assert_eq!(samples[1].rap, RapKind::SyncShadow);
        assert_eq!(
            sink.streams[0].desc.as_ref().unwrap().codec_id,
            CodecId::H264
        );
    }

    #[test]
    fn gzip_self_dictionary_chain() {
        let nhml = r#"<NHNTStream streamType="3" objectTypeIndication="9" timeScale="1000" gzipSamples="yes" gzipDictionary="self">
  <NHNTSample DTS="0" dataLength="8" isRAP="yes"/>
  <NHNTSample DTS="100" dataLength="8"/>
</NHNTStream>"#;
        let (_dir, path) = write_files(nhml, b"ABCDEFGHABCDEFGH");
        let sink = drive(&path);
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 2);
        // first sample: plain zlib, no dictionary required
        let mut decoder = flate2::read::ZlibDecoder::new(samples[0].data.as_ref());
        let mut out = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut out).unwrap();
        assert_eq!(out, b"ABCDEFGH");
        // second sample needs the first sample's raw payload as dictionary
        use flate2::{Decompress, FlushDecompress};
        let mut d = Decompress::new(true);
        let mut out2 = Vec::with_capacity(64);
        let err = d
            .decompress_vec(samples[1].data.as_ref(), &mut out2, FlushDecompress::Finish)
            .unwrap_err();
        assert!(err.needs_dictionary().is_some());
        d.set_dictionary(b"ABCDEFGH").unwrap();
        d.decompress_vec(
            &samples[1].data.as_ref()[d.total_in() as usize..],
            &mut out2,
            FlushDecompress::Finish,
        )
        .unwrap();
        assert_eq!(out2, b"ABCDEFGH");
        assert_eq!(
            sink.streams[0].desc.as_ref().unwrap().codec_id,
            CodecId::Laser
        );
    }

    #[test]
    fn dims_units_are_enveloped() {
        let dims = r#"<DIMSStream timeScale="1000">
  <DIMSUnit time="0" dataLength="9" isRAP="yes"/>
</DIMSStream>"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.dml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(dims.as_bytes())
            .unwrap();
        std::fs::File::create(dir.path().join("doc.media"))
            .unwrap()
            .write_all(b"<svg done")
            .unwrap();
        let mut importer = NhmlImporter::new_dims(&path);
        importer.configure(ImportRequest::default()).unwrap();
        let mut sink = MemorySink::new();
        while importer.process(&mut sink).unwrap() != Progress::Eos {}
        let samp = &sink.samples(0)[0];
        // 2-byte length (payload+flags), 1-byte flags, payload
        assert_eq!(&samp.data[..2], &10u16.to_be_bytes());
        let flags = samp.data[2];
        assert_eq!(flags & 0x02, 0x02, "RAP flag set");
        assert_eq!(flags & 0x01, 0x01, "scene flag from svg sniff");
        assert_eq!(&samp.data[3..], b"<svg done");
    }

    #[test]
    fn missing_media_file_is_url_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.nhml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(
                br#"<NHNTStream streamType="5" objectTypeIndication="64"><NHNTSample DTS="0"/></NHNTStream>"#,
            )
            .unwrap();
        let mut importer = NhmlImporter::new(&path);
        importer.configure(ImportRequest::default()).unwrap();
        let mut sink = MemorySink::new();
        assert!(matches!(
            importer.process(&mut sink),
            Err(ImportError::UrlError(_))
        ));
    }
}
