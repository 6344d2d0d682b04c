use std::path::Path;

use aac::{AdtsHeader, AudioSpecificConfig, SAMPLE_RATES, next_adts_frame, sample_rate_index};
use bytes::Bytes;
use media_types::{
    AudioInfo, CodecId, ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind,
    Result, SbrSignaling, Sink, StreamDescriptor, StreamHandle, StreamType, TrackCatalog,
    TrackInfo,
};
use tracing::{info, warn};

use crate::queue::SampleQueue;

/// AAC/ADTS elementary stream importer.
pub struct AdtsImporter {
    data: Vec<u8>,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    queue: SampleQueue,
    timescale: u32,
    done: bool,
}

impl AdtsImporter {
    /// Opens an `.aac` file.
    pub fn from_path(path: &Path) -> Result<AdtsImporter> {
        let data =
            std::fs::read(path).map_err(|_| ImportError::UrlError(path.display().to_string()))?;
        Ok(Self::from_bytes(data))
    }

    /// Creates an importer over in-memory ADTS bytes.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> AdtsImporter {
        AdtsImporter {
            data,
            request: ImportRequest::default(),
            handle: None,
            queue: SampleQueue::default(),
            timescale: 0,
            done: false,
        }
    }

    fn first_header(&self) -> Result<AdtsHeader> {
        next_adts_frame(&self.data, 0)
            .map(|(_, hdr)| hdr)
            .ok_or_else(|| ImportError::non_compliant("audio is not MPEG-2/4 AAC with ADTS"))
    }

    fn setup(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let mut hdr = self.first_header()?;
        if self.request.force_mpeg4 {
            hdr.is_mpeg2 = false;
        }
        let mut sbr = self.request.sbr;
        // MPEG-2 AAC has no explicit SBR signaling; fall back to implicit
        if hdr.is_mpeg2 && sbr == SbrSignaling::Explicit {
            warn!("explicit SBR unavailable for MPEG-2 AAC, using implicit signaling");
            sbr = SbrSignaling::Implicit;
        }
        let sr = hdr.sample_rate;
        let (sbr_sr, sbr_sr_idx) = match sample_rate_index(2 * sr) {
            Some(idx) => (2 * sr, idx),
            None => (sr, hdr.sr_index),
        };

        let asc = AudioSpecificConfig {
            audio_object_type: hdr.profile,
            sr_index: hdr.sr_index,
            channels: hdr.channels,
        };
        let (config, dts_inc, out_sr) = match sbr {
            SbrSignaling::Explicit => (
                asc.build_explicit_sbr(sbr_sr_idx),
                aac::SAMPLES_PER_FRAME_SBR,
                sbr_sr,
            ),
            SbrSignaling::Implicit => (
                asc.build_implicit_sbr(sbr_sr_idx),
                aac::SAMPLES_PER_FRAME,
                sr,
            ),
            SbrSignaling::None => (asc.build(), aac::SAMPLES_PER_FRAME, sr),
        };

        let mut desc = StreamDescriptor::new(
            StreamType::Audio,
            if hdr.is_mpeg2 {
                CodecId::Mpeg2Audio
            } else {
                CodecId::AacMp4
            },
            out_sr,
        );
        desc.codec_config = Some(Bytes::from(config));
        desc.audio = Some(AudioInfo {
            sample_rate: out_sr,
            channels: hdr.channels as u32,
            bits_per_sample: 16,
            samples_per_frame: dts_inc,
        });
        desc.language = self.request.language.clone();
        self.timescale = out_sr;

        info!(
            sample_rate = out_sr,
            channels = hdr.channels,
            mpeg2 = hdr.is_mpeg2,
            ?sbr,
            "AAC import"
        );

        // frame the whole stream; each sample carries one complete ADTS frame
        let mut samples = Vec::new();
        let mut pos = 0usize;
        let mut dts = 0u64;
        while let Some((at, frame)) = next_adts_frame(&self.data, pos) {
            let end = (at + frame.frame_size).min(self.data.len());
            let mut samp =
                MediaSample::new(self.data[at..end].to_vec(), dts, RapKind::Sync);
            if self.request.use_dataref {
                samp.data_ref = Some(at as u64);
            }
            samples.push(samp);
            dts += dts_inc as u64;
            pos = at + frame.frame_size;
        }
        self.queue.fill(samples);
        self.handle = Some(sink.declare_stream(desc)?);
        Ok(())
    }
}

impl Importer for AdtsImporter {
    fn probe(&mut self) -> Result<TrackCatalog> {
        let hdr = self.first_header()?;
        Ok(TrackCatalog {
            tracks: vec![TrackInfo {
                track_num: 1,
                stream_type: Some(StreamType::Audio),
                codec_id: Some(CodecId::AacMp4),
                audio: Some(AudioInfo {
                    sample_rate: SAMPLE_RATES[hdr.sr_index as usize],
                    channels: hdr.channels as u32,
                    bits_per_sample: 16,
                    samples_per_frame: aac::SAMPLES_PER_FRAME,
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

    fn adts_frame(payload_len: usize, sr_index: u8, channels: u8) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0xFFF, 12).unwrap();
        w.write_bit(false);
        w.write_bits(0, 2).unwrap();
        w.write_bit(true);
        w.write_bits(1, 2).unwrap(); // AOT 2
        w.write_bits(sr_index as u64, 4).unwrap();
        w.write_bit(false);
        w.write_bits(channels as u64, 3).unwrap();
        w.write_bits(0, 4).unwrap();
        w.write_bits((7 + payload_len) as u64, 13).unwrap();
        w.write_bits(0x7FF, 11).unwrap();
        w.write_bits(0, 2).unwrap();
        let mut data = w.finish();
        data.resize(7 + payload_len, 0x5A);
        data
    }

    fn drive(importer: &mut AdtsImporter) -> MemorySink {
        let mut sink = MemorySink::new();
        while importer.process(&mut sink).unwrap() != Progress::Eos {}
        sink
    }

    #[test]
    fn single_frame_at_eof() {
        // one 1017-byte frame, 44100 Hz stereo
        let data = adts_frame(1010, 4, 2);
        let mut importer = AdtsImporter::from_bytes(data);
        importer.configure(ImportRequest::default()).unwrap();
        let sink = drive(&mut importer);

        let samples = sink.samples(0);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].data.len(), 1017);

        let desc = sink.streams[0].desc.as_ref().unwrap();
        assert_eq!(desc.codec_id, CodecId::AacMp4);
        let audio = desc.audio.unwrap();
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.channels, 2);
        // AudioSpecificConfig { aot 2, sr index 4, channels 2 }
        let asc = aac::PartialAudioSpecificConfig::parse(
            desc.codec_config.as_ref().unwrap(),
        )
        .unwrap();
        assert_eq!(asc.audio_object_type, 2);
        assert_eq!(asc.sampling_frequency, 44100);
        assert_eq!(asc.channel_configuration, 2);
    }

    #[test]
    fn dts_advances_by_frame_size() {
        let mut data = adts_frame(20, 3, 2);
        data.extend_from_slice(&adts_frame(24, 3, 2));
        data.extend_from_slice(&adts_frame(28, 3, 2));
        let mut importer = AdtsImporter::from_bytes(data);
        importer.configure(ImportRequest::default()).unwrap();
        let sink = drive(&mut importer);
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].dts, 0);
        assert_eq!(samples[1].dts, 1024);
        assert_eq!(samples[2].dts, 2048);
    }

    #[test]
    fn explicit_sbr_config() {
        let data = adts_frame(30, 6, 2); // 24000 Hz core
        let mut importer = AdtsImporter::from_bytes(data);
        let request = ImportRequest {
            sbr: SbrSignaling::Explicit,
            ..Default::default()
        };
        importer.configure(request).unwrap();
        let sink = drive(&mut importer);
        let desc = sink.streams[0].desc.as_ref().unwrap();
        // output rate doubles, frames carry 2048 samples
        assert_eq!(desc.timescale, 48000);
        assert_eq!(desc.audio.unwrap().samples_per_frame, 2048);
        let asc = aac::PartialAudioSpecificConfig::parse(
            desc.codec_config.as_ref().unwrap(),
        )
        .unwrap();
        assert_eq!(asc.audio_object_type, 5);
    }

    #[test]
    fn garbage_input_rejected() {
        let mut importer = AdtsImporter::from_bytes(vec![0u8; 64]);
        assert!(matches!(
            importer.probe(),
            Err(ImportError::NonCompliantBitstream(_))
        ));
    }
}
