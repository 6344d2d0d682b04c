use std::path::Path;

use amr::{QcpCodec, QcpFile};
use bytes::Bytes;
use media_types::{
    AudioInfo, CodecId, ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind,
    Result, Sink, StreamDescriptor, StreamHandle, StreamType, TrackCatalog, TrackInfo,
};
use tracing::info;

use crate::queue::SampleQueue;

/// QCP (RIFF/QLCM) importer for QCELP, EVRC and SMV payloads.
pub struct QcpImporter {
    data: Vec<u8>,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    queue: SampleQueue,
    timescale: u32,
    done: bool,
}

impl QcpImporter {
    /// Opens a `.qcp` file.
    pub fn from_path(path: &Path) -> Result<QcpImporter> {
        let data =
            std::fs::read(path).map_err(|_| ImportError::UrlError(path.display().to_string()))?;
        Ok(Self::from_bytes(data))
    }

    /// Creates an importer over in-memory QCP bytes.
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> QcpImporter {
        QcpImporter {
            data,
            request: ImportRequest::default(),
            handle: None,
            queue: SampleQueue::default(),
            timescale: 0,
            done: false,
        }
    }

    fn parse(&self) -> Result<QcpFile> {
        QcpFile::parse(&self.data).map_err(|e| match e {
            amr::QcpError::UnknownCodec => {
                ImportError::NotSupported("unknown QCP codec GUID".into())
            }
            amr::QcpError::Io(e) => ImportError::Io(e),
            other => ImportError::non_compliant(other.to_string()),
        })
    }

    fn setup(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let qcp = self.parse()?;
        let sample_rate = qcp.sample_rate as u32;
        let block_size = qcp.block_size as u64;
        let frames_per_sample = self.request.frames_per_sample.clamp(1, 15);
        info!(codec = qcp.codec.name(), sample_rate, "QCP import");

        let codec_id = match qcp.codec {
            QcpCodec::Qcelp => CodecId::Qcelp,
            QcpCodec::Evrc => CodecId::Evrc,
            QcpCodec::Smv => CodecId::Smv,
        };
        let mut desc = StreamDescriptor::new(StreamType::Audio, codec_id, sample_rate);
        desc.audio = Some(AudioInfo {
            sample_rate,
            channels: 1,
            bits_per_sample: qcp.bits_per_sample as u32,
            samples_per_frame: qcp.block_size as u32,
        });
        // the raw fmt chunk is the decoder configuration for QCELP
        if qcp.codec == QcpCodec::Qcelp {
            desc.codec_config = Some(Bytes::from(qcp.fmt_chunk.clone()));
        }
        desc.language = self.request.language.clone();
        self.timescale = sample_rate;

        let mut samples: Vec<MediaSample> = Vec::new();
        let mut dts = 0u64;
        let mut aggregated: Vec<u8> = Vec::new();
        let mut agg_count = 0u32;
        let mut agg_dts = 0u64;
        let mut agg_offset = 0u64;
        for frame in &qcp.frames {
            let start = frame.offset as usize;
            let end = (start + frame.size).min(self.data.len());
            if agg_count == 0 {
                agg_dts = dts;
                agg_offset = frame.offset;
            }
            aggregated.extend_from_slice(&self.data[start..end]);
            agg_count += 1;
            dts += block_size;
            if agg_count == frames_per_sample {
                let mut samp =
                    MediaSample::new(std::mem::take(&mut aggregated), agg_dts, RapKind::Sync);
                if self.request.use_dataref && frames_per_sample == 1 {
                    samp.data_ref = Some(agg_offset);
                }
                samples.push(samp);
                agg_count = 0;
            }
        }
        if agg_count > 0 {
            samples.push(MediaSample::new(aggregated, agg_dts, RapKind::Sync));
        }
        self.queue.fill(samples);
        self.handle = Some(sink.declare_stream(desc)?);
        Ok(())
    }
}

impl Importer for QcpImporter {
    fn probe(&mut self) -> Result<TrackCatalog> {
        let qcp = self.parse()?;
        Ok(TrackCatalog {
            tracks: vec![TrackInfo {
                track_num: 1,
                stream_type: Some(StreamType::Audio),
                codec_id: Some(match qcp.codec {
                    QcpCodec::Qcelp => CodecId::Qcelp,
                    QcpCodec::Evrc => CodecId::Evrc,
                    QcpCodec::Smv => CodecId::Smv,
                }),
                audio: Some(AudioInfo {
                    sample_rate: qcp.sample_rate as u32,
                    channels: 1,
                    bits_per_sample: qcp.bits_per_sample as u32,
                    samples_per_frame: qcp.block_size as u32,
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
