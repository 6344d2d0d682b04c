use std::path::Path;

use h263::{PictureHeader, next_start_code};
use media_types::{
    CodecId, ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind, Result, Sink,
    StreamDescriptor, StreamHandle, StreamType, TrackCatalog, TrackInfo, VideoInfo, video_timing,
};
use tracing::info;

use crate::queue::SampleQueue;

/// H.263 elementary stream importer: frames split on picture start codes,
/// imported at a constant frame rate (15 fps unless overridden).
pub struct H263Importer {
    data: Vec<u8>,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    queue: SampleQueue,
    timescale: u32,
    done: bool,
}

impl H263Importer {
    /// Opens a `.263` file.
    pub fn from_path(path: &Path) -> Result<H263Importer> {
        let data =
            std::fs::read(path).map_err(|_| ImportError::UrlError(path.display().to_string()))?;
        Ok(Self::from_bytes(data))
    }

    /// Creates an importer over in-memory H.263 bytes.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> H263Importer {
        H263Importer {
            data,
            request: ImportRequest::default(),
            handle: None,
            queue: SampleQueue::default(),
            timescale: 0,
            done: false,
        }
    }

    fn first_header(&self) -> Result<PictureHeader> {
        if !h263::is_start_code(&self.data) {
            return Err(ImportError::non_compliant(
                "cannot find H263 picture start code",
            ));
        }
        PictureHeader::parse(&self.data)
            .ok_or_else(|| ImportError::NotSupported("unsupported H263 frame header".into()))
    }

    fn setup(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let first = self.first_header()?;
        let mut fps = self.request.video_fps;
        if fps == media_types::AUTO_FPS {
            fps = media_types::DEFAULT_FPS;
        }
        if fps == 0.0 {
            fps = h263::DEFAULT_FPS;
        }
        let (timescale, dts_inc) = video_timing(fps);
        self.timescale = timescale;
        info!(width = first.width, height = first.height, fps, "H263 import");

        let mut desc = StreamDescriptor::new(StreamType::Visual, CodecId::H263, timescale);
        desc.video = Some(VideoInfo {
            width: first.width,
            height: first.height,
            fps: Some(fps),
            ..Default::default()
        });
        desc.language = self.request.language.clone();

        let mut samples = Vec::new();
        let mut pos = 0usize;
        let mut dts = 0u64;
        while let Some(at) = next_start_code(&self.data, pos, false) {
            let end = next_start_code(&self.data, at, true).unwrap_or(self.data.len());
            let rap = match PictureHeader::parse(&self.data[at..]) {
                Some(hdr) if hdr.is_intra => RapKind::Sync,
                _ => RapKind::None,
            };
            let mut samp = MediaSample::new(self.data[at..end].to_vec(), dts, rap);
            if self.request.use_dataref {
                samp.data_ref = Some(at as u64);
            }
            samples.push(samp);
            dts += dts_inc as u64;
            pos = end;
        }
        self.queue.fill(samples);
        self.handle = Some(sink.declare_stream(desc)?);
        Ok(())
    }
}

impl Importer for H263Importer {
    fn probe(&mut self) -> Result<TrackCatalog> {
        let first = self.first_header()?;
        Ok(TrackCatalog {
            tracks: vec![TrackInfo {
                track_num: 1,
                stream_type: Some(StreamType::Visual),
                codec_id: Some(CodecId::H263),
                video: Some(VideoInfo {
                    width: first.width,
                    height: first.height,
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
