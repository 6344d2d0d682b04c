use std::path::Path;

use media_types::{
    AudioInfo, CodecId, ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind,
    Result, Sink, StreamDescriptor, StreamHandle, StreamType, TrackCatalog, TrackInfo,
};
use mp3::{FrameHeader, next_frame};
use tracing::info;

use crate::queue::SampleQueue;

/// MPEG-1/2 audio (MP1/MP2/MP3) elementary stream importer.
///
/// Frames keep their 4-byte header; DTS advances by the layer/version
/// window size at the sampling rate timescale.
pub struct Mp3Importer {
    data: Vec<u8>,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    queue: SampleQueue,
    timescale: u32,
    done: bool,
}

impl Mp3Importer {
    /// Opens an `.mp3`/`.mp2` file.
    pub fn from_path(path: &Path) -> Result<Mp3Importer> {
        let data =
            std::fs::read(path).map_err(|_| ImportError::UrlError(path.display().to_string()))?;
        Ok(Self::from_bytes(data))
    }

    /// Creates an importer over in-memory MPEG audio bytes.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Mp3Importer {
        Mp3Importer {
            data,
            request: ImportRequest::default(),
            handle: None,
            queue: SampleQueue::default(),
            timescale: 0,
            done: false,
        }
    }

    fn first_header(&self) -> Result<FrameHeader> {
        next_frame(&self.data, 0)
            .map(|(_, hdr)| hdr)
            .ok_or_else(|| ImportError::non_compliant("audio is not MPEG-1/2 audio"))
    }

    fn setup(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let hdr = self.first_header()?;
        let codec = if hdr.is_mpeg2() {
            CodecId::Mpeg2Audio
        } else {
            CodecId::Mp3
        };
        let mut desc = StreamDescriptor::new(StreamType::Audio, codec, hdr.sample_rate);
        desc.audio = Some(AudioInfo {
            sample_rate: hdr.sample_rate,
            channels: hdr.channels,
            bits_per_sample: 16,
            samples_per_frame: hdr.samples_per_frame(),
        });
        desc.language = self.request.language.clone();
        self.timescale = hdr.sample_rate;
        info!(
            sample_rate = hdr.sample_rate,
            layer = hdr.layer_number(),
            channels = hdr.channels,
            mpeg2 = hdr.is_mpeg2(),
            "MP3 import"
        );

        let mut samples = Vec::new();
        let mut pos = 0usize;
        let mut dts = 0u64;
        while let Some((at, frame)) = next_frame(&self.data, pos) {
            let end = (at + frame.frame_size()).min(self.data.len());
            let mut samp = MediaSample::new(self.data[at..end].to_vec(), dts, RapKind::Sync);
            if self.request.use_dataref {
                samp.data_ref = Some(at as u64);
            }
            samples.push(samp);
            dts += frame.samples_per_frame() as u64;
            pos = at + frame.frame_size();
        }
        self.queue.fill(samples);
        self.handle = Some(sink.declare_stream(desc)?);
        Ok(())
    }
}

impl Importer for Mp3Importer {
    fn probe(&mut self) -> Result<TrackCatalog> {
        let hdr = self.first_header()?;
        Ok(TrackCatalog {
            tracks: vec![TrackInfo {
                track_num: 1,
                stream_type: Some(StreamType::Audio),
                codec_id: Some(if hdr.is_mpeg2() {
                    CodecId::Mpeg2Audio
                } else {
                    CodecId::Mp3
                }),
                audio: Some(AudioInfo {
                    sample_rate: hdr.sample_rate,
                    channels: hdr.channels,
                    bits_per_sample: 16,
                    samples_per_frame: hdr.samples_per_frame(),
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
    use media_types::MemorySink;

    fn frame() -> Vec<u8> {
        // MPEG-1 Layer III, 128 kbps, 44100 Hz
        let mut data = 0xFFFB_9000u32.to_be_bytes().to_vec();
        data.resize(417, 0x11);
        data
    }

    #[test]
    fn frames_keep_header_and_window_timing() {
        let mut data = frame();
        data.extend_from_slice(&frame());
        let mut importer = Mp3Importer::from_bytes(data);
        importer.configure(ImportRequest::default()).unwrap();
        let mut sink = MemorySink::new();
        while importer.process(&mut sink).unwrap() != Progress::Eos {}

        let samples = sink.samples(0);
        assert_eq!(samples.len(), 2);
        assert_eq!(&samples[0].data[..2], &[0xFF, 0xFB]);
        assert_eq!(samples[0].data.len(), 417);
        assert_eq!(samples[1].dts, 1152);
        let desc = sink.streams[0].desc.as_ref().unwrap();
        assert_eq!(desc.timescale, 44100);
        assert_eq!(desc.codec_id, CodecId::Mp3);
    }

    #[test]
    fn non_audio_rejected() {
        let mut importer = Mp3Importer::from_bytes(vec![0u8; 100]);
        assert!(importer.probe().is_err());
    }
}
