use std::path::Path;

use ac3::{SyncFrame, next_sync_frame};
use bytes::Bytes;
use media_types::{
    AudioInfo, CodecId, ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind,
    Result, Sink, StreamDescriptor, StreamHandle, StreamType, TrackCatalog, TrackInfo,
};
use tracing::info;

use crate::queue::SampleQueue;

/// AC-3 elementary stream importer.
pub struct Ac3Importer {
    data: Vec<u8>,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    queue: SampleQueue,
    timescale: u32,
    done: bool,
}

impl Ac3Importer {
    /// Opens an `.ac3` file.
    pub fn from_path(path: &Path) -> Result<Ac3Importer> {
        let data =
            std::fs::read(path).map_err(|_| ImportError::UrlError(path.display().to_string()))?;
        Ok(Self::from_bytes(data))
    }

    /// Creates an importer over in-memory AC-3 bytes.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> Ac3Importer {
        Ac3Importer {
            data,
            request: ImportRequest::default(),
            handle: None,
            queue: SampleQueue::default(),
            timescale: 0,
            done: false,
        }
    }

    fn first_frame(&self) -> Result<SyncFrame> {
        next_sync_frame(&self.data, 0)
            .map(|(_, frame)| frame)
            .ok_or_else(|| ImportError::non_compliant("audio is not AC-3"))
    }

    fn setup(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let first = self.first_frame()?;
        let mut desc =
            StreamDescriptor::new(StreamType::Audio, CodecId::Ac3, first.sample_rate);
        desc.codec_config = Some(Bytes::from(first.specific_box()));
        desc.audio = Some(AudioInfo {
            sample_rate: first.sample_rate,
            channels: first.channels,
            bits_per_sample: 16,
            samples_per_frame: ac3::SAMPLES_PER_FRAME,
        });
        desc.language = self.request.language.clone();
        self.timescale = first.sample_rate;
        info!(
            sample_rate = first.sample_rate,
            channels = first.channels,
            "AC3 import"
        );

        let mut samples = Vec::new();
        let mut pos = 0usize;
        let mut dts = 0u64;
        while let Some((at, frame)) = next_sync_frame(&self.data, pos) {
            let end = (at + frame.frame_size).min(self.data.len());
            let mut samp = MediaSample::new(self.data[at..end].to_vec(), dts, RapKind::Sync);
            if self.request.use_dataref {
                samp.data_ref = Some(at as u64);
            }
            samples.push(samp);
            dts += ac3::SAMPLES_PER_FRAME as u64;
            pos = at + frame.frame_size;
        }
        self.queue.fill(samples);
        self.handle = Some(sink.declare_stream(desc)?);
        Ok(())
    }
}

impl Importer for Ac3Importer {
    fn probe(&mut self) -> Result<TrackCatalog> {
        let frame = self.first_frame()?;
        Ok(TrackCatalog {
            tracks: vec![TrackInfo {
                track_num: 1,
                stream_type: Some(StreamType::Audio),
                codec_id: Some(CodecId::Ac3),
                audio: Some(AudioInfo {
                    sample_rate: frame.sample_rate,
                    channels: frame.channels,
                    bits_per_sample: 16,
                    samples_per_frame: ac3::SAMPLES_PER_FRAME,
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

    fn ac3_frame() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0x0B77, 16).unwrap();
        w.write_bits(0, 16).unwrap();
        w.write_bits(0, 2).unwrap(); // 48 kHz
        w.write_bits(8, 6).unwrap(); // 128 kbit/s
        w.write_bits(8, 5).unwrap(); // bsid
        w.write_bits(0, 3).unwrap();
        w.write_bits(2, 3).unwrap(); // acmod 2/0
        w.write_bits(0, 2).unwrap(); // dsurmod
        w.write_bit(false); // lfe
        let mut data = w.finish();
        data.resize(256 * 2, 0);
        data
    }

    #[test]
    fn frames_and_config() {
        let mut data = ac3_frame();
        data.extend_from_slice(&ac3_frame());
        let mut importer = Ac3Importer::from_bytes(data);
        importer.configure(ImportRequest::default()).unwrap();
        let mut sink = MemorySink::new();
        while importer.process(&mut sink).unwrap() != Progress::Eos {}

        let samples = sink.samples(0);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].dts, 1536);
        let desc = sink.streams[0].desc.as_ref().unwrap();
        assert_eq!(desc.codec_id, CodecId::Ac3);
        assert_eq!(desc.timescale, 48000);
        assert_eq!(desc.codec_config.as_ref().unwrap().len(), 3);
        assert_eq!(desc.audio.unwrap().channels, 2);
    }
}
