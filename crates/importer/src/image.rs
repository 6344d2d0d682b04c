use std::path::Path;

use bytes::Bytes;
use media_types::{
    CodecId, ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind, Result, Sink,
    SinkAck, StreamDescriptor, StreamHandle, StreamType, TrackCatalog, TrackInfo, VideoInfo,
};
use tracing::info;

/// Still image importer: identifies JPEG, PNG or JPEG-2000, derives the
/// image size for the descriptor and emits a single sync sample covering
/// the whole file.
pub struct ImageImporter {
    data: Vec<u8>,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    emitted: bool,
    done: bool,
}

fn parse_png(data: &[u8]) -> Option<(u32, u32)> {
    if !data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        return None;
    }
    if data.len() < 24 || &data[12..16] != b"IHDR" {
        return None;
    }
    let w = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    let h = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
    Some((w, h))
}

fn parse_jpeg(data: &[u8]) -> Option<(u32, u32)> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2usize;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        // standalone markers have no length field
        if (0xD0..=0xD9).contains(&marker) || marker == 0x01 || marker == 0xFF {
            pos += 2;
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        // any SOF marker except DHT/JPGA/DAC
        if (0xC0..=0xCF).contains(&marker)
            && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
        {
            if pos + 9 > data.len() {
                return None;
            }
            let h = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let w = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
            return Some((w, h));
        }
        pos += 2 + len;
    }
    None
}

fn parse_jp2(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 12 || &data[4..8] != b"jP  " {
        return None;
    }
    // locate the image header box
    let ihdr = data.windows(4).position(|w| w == b"ihdr")?;
    if ihdr + 12 > data.len() {
        return None;
    }
    let h = u32::from_be_bytes([data[ihdr + 4], data[ihdr + 5], data[ihdr + 6], data[ihdr + 7]]);
    let w = u32::from_be_bytes([data[ihdr + 8], data[ihdr + 9], data[ihdr + 10], data[ihdr + 11]]);
    Some((w, h))
}

fn identify(data: &[u8]) -> Result<(CodecId, u32, u32)> {
    if let Some((w, h)) = parse_png(data) {
        return Ok((CodecId::Png, w, h));
    }
    if let Some((w, h)) = parse_jpeg(data) {
        return Ok((CodecId::Jpeg, w, h));
    }
    if let Some((w, h)) = parse_jp2(data) {
        return Ok((CodecId::Jpeg2000, w, h));
    }
    Err(ImportError::NotSupported("unrecognized image file".into()))
}

impl ImageImporter {
    /// Opens an image file.
    pub fn from_path(path: &Path) -> Result<ImageImporter> {
        let data =
            std::fs::read(path).map_err(|_| ImportError::UrlError(path.display().to_string()))?;
        Ok(Self::from_bytes(data))
    }

    /// Creates an importer over in-memory image bytes.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> ImageImporter {
        ImageImporter {
            data,
            request: ImportRequest::default(),
            handle: None,
            emitted: false,
            done: false,
        }
    }
}

impl Importer for ImageImporter {
    fn probe(&mut self) -> Result<TrackCatalog> {
        let (codec, width, height) = identify(&self.data)?;
        Ok(TrackCatalog {
            tracks: vec![TrackInfo {
                track_num: 1,
                stream_type: Some(StreamType::Visual),
                codec_id: Some(codec),
                video: Some(VideoInfo {
                    width,
                    height,
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
            let (codec, width, height) = identify(&self.data)?;
            if width == 0 || height == 0 {
                return Err(ImportError::non_compliant("invalid image dimensions"));
            }
            info!(?codec, width, height, "image import");
            let mut desc = StreamDescriptor::new(StreamType::Visual, codec, 1000);
            desc.video = Some(VideoInfo {
                width,
                height,
                ..Default::default()
            });
            desc.language = self.request.language.clone();
            self.handle = Some(sink.declare_stream(desc)?);
        }
        let handle = self.handle.expect("declared above");
        if !self.emitted {
            let mut samp =
                MediaSample::new(Bytes::from(self.data.clone()), 0, RapKind::Sync);
            if self.request.use_dataref {
                samp.data_ref = Some(0);
            }
            match sink.write_sample(handle, samp)? {
                SinkAck::Accepted => self.emitted = true,
                SinkAck::WouldBlock => return Ok(Progress::WouldBlock),
            }
        }
        sink.signal_eos(handle);
        self.done = true;
        Ok(Progress::Eos)
    }
}
