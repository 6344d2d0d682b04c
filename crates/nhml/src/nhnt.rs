use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use bytes_util::BitReader;
use media_types::{
    ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind, Result, Sink, SinkAck,
    StreamDescriptor, StreamHandle, TrackCatalog, TrackInfo, VideoInfo,
};
use tracing::info;

/// NHNT (binary sample table) importer.
///
/// `<name>.nhnt` carries the stream header (`NHnt` v0 with 32-bit fields or
/// `NHnl` v1 with 64-bit fields) and one record per sample; payload bytes
/// live in `<name>.media`, decoder config in `<name>.info`. Continuation
/// records (`is_start == 0`) append to the previous sample.
pub struct NhntImporter {
    path: PathBuf,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    pending: Vec<MediaSample>,
    emit_idx: usize,
    done: bool,
}

impl NhntImporter {
    /// Creates an importer from any of the three companion paths.
    pub fn new(path: &Path) -> NhntImporter {
        NhntImporter {
            path: path.to_path_buf(),
            request: ImportRequest::default(),
            handle: None,
            pending: Vec::new(),
            emit_idx: 0,
            done: false,
        }
    }

    fn load(&mut self) -> Result<StreamDescriptor> {
        let nhnt_path = self.path.with_extension("nhnt");
        let media_path = self.path.with_extension("media");
        let info_path = self.path.with_extension("info");

        let table = std::fs::read(&nhnt_path)
            .map_err(|_| ImportError::UrlError(nhnt_path.display().to_string()))?;
        let media = std::fs::read(&media_path)
            .map_err(|_| ImportError::UrlError(media_path.display().to_string()))?;
        let spec_info = std::fs::read(&info_path).ok();

        let mut r = Cursor::new(&table[..]);
        let mut sig = [0u8; 4];
        r.read_exact(&mut sig).map_err(ImportError::Io)?;
        let large = match &sig {
            b"NHnt" => false,
            b"NHnl" => true,
            _ => return Err(ImportError::non_compliant("invalid NHNT signature")),
        };
        r.read_u8().map_err(ImportError::Io)?; // version
        let stream_type = r.read_u8().map_err(ImportError::Io)? as u32;
        let oti = r.read_u8().map_err(ImportError::Io)? as u32;
        r.read_u16::<BigEndian>().map_err(ImportError::Io)?; // reserved
        r.read_u24::<BigEndian>().map_err(ImportError::Io)?; // buffer size
        r.read_u32::<BigEndian>().map_err(ImportError::Io)?; // avg bitrate
        r.read_u32::<BigEndian>().map_err(ImportError::Io)?; // max bitrate
        let timescale = r.read_u32::<BigEndian>().map_err(ImportError::Io)?;

        if stream_type == 1 {
            return Err(ImportError::NotSupported(
                "object descriptor streams cannot be imported from NHNT".into(),
            ));
        }
        let (st, codec) = crate::codec_from_mpeg4(stream_type, oti);
        let mut desc = StreamDescriptor::new(st, codec, if timescale == 0 { 1000 } else { timescale });
        desc.codec_config = spec_info.clone().map(Bytes::from);
        if codec == media_types::CodecId::Mpeg4Visual {
            if let Some(info) = &spec_info {
                if let Some(cfg) = mpegvideo::m4v::parse_config(info) {
                    desc.video = Some(VideoInfo {
                        width: cfg.width,
                        height: cfg.height,
                        ..Default::default()
                    });
                }
            }
        }

        let mut samples: Vec<MediaSample> = Vec::new();
        let mut count = 0u64;
        let mut next_is_start = true;
        let duration_cap = self.request.duration_ms * desc.timescale as u64 / 1000;
        loop {
            let Ok(len) = r.read_u24::<BigEndian>() else {
                break;
            };
            let mut flags_data = [0u8; 1];
            if r.read_exact(&mut flags_data).is_err() {
                break;
            }
            let mut flags = BitReader::new(&flags_data);
            let is_rap = flags.read_bit().map_err(ImportError::Io)?;
            let mut is_start = flags.read_bit().map_err(ImportError::Io)?;
            let is_end = flags.read_bit().map_err(ImportError::Io)?;
            if next_is_start {
                is_start = true;
                next_is_start = false;
            }
            if is_end {
                next_is_start = true;
            }
            let (offset, cts, dts) = if large {
                let offset = r.read_u64::<BigEndian>().map_err(ImportError::Io)?;
                let cts = r.read_u64::<BigEndian>().map_err(ImportError::Io)?;
                let dts = r.read_u64::<BigEndian>().map_err(ImportError::Io)?;
                (offset, cts, dts)
            } else {
                let offset = r.read_u32::<BigEndian>().map_err(ImportError::Io)? as u64;
                let cts = r.read_u32::<BigEndian>().map_err(ImportError::Io)? as u64;
                let dts = r.read_u32::<BigEndian>().map_err(ImportError::Io)? as u64;
                (offset, cts, dts)
            };
            let mut dts = dts;
            if count == 0 {
                dts = 0;
            }
            let start = offset as usize;
            let end = (start + len as usize).min(media.len());
            let chunk = media.get(start..end).unwrap_or(&[]);

            if is_start {
                let mut samp = MediaSample::new(chunk.to_vec(), dts, if is_rap {
                    RapKind::Sync
                } else {
                    RapKind::None
                });
                samp.cts_offset = cts as i64 - dts as i64;
                if self.request.use_dataref {
                    samp.data_ref = Some(offset);
                }
                samples.push(samp);
                count += 1;
            } else if let Some(last) = samples.last_mut() {
                // continuation: append payload to the open sample
                let mut data = last.data.to_vec();
                data.extend_from_slice(chunk);
                last.data = Bytes::from(data);
            }
            if duration_cap != 0 && dts > duration_cap {
                break;
            }
        }

        info!(stream_type, oti, samples = samples.len(), "NHNT import ready");
        self.pending = samples;
        Ok(desc)
    }
}

impl Importer for NhntImporter {
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
            let desc = self.load()?;
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

    fn record_v0(len: u32, flags: u8, offset: u32, cts: u32, dts: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&len.to_be_bytes()[1..]);
        out.push(flags);
        out.extend_from_slice(&offset.to_be_bytes());
        out.extend_from_slice(&cts.to_be_bytes());
        out.extend_from_slice(&dts.to_be_bytes());
        out
    }

    fn header_v0(stream_type: u8, oti: u8, timescale: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"NHnt");
        out.push(0); // version
        out.push(stream_type);
        out.push(oti);
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes()[1..]); // buffer size db (24)
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&timescale.to_be_bytes());
        out
    }

    #[test]
    fn v0_samples_with_continuation() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("t.nhnt");
        let mut table = header_v0(5, 0x40, 44100);
        // flags: rap|start|end in the top three bits
        table.extend_from_slice(&record_v0(3, 0b1100_0000, 0, 0, 0)); // rap+start, no end
        table.extend_from_slice(&record_v0(3, 0b0010_0000, 3, 0, 0)); // continuation+end
        table.extend_from_slice(&record_v0(4, 0b1110_0000, 6, 1124, 1024)); // full sample
        std::fs::File::create(&base).unwrap().write_all(&table).unwrap();
        std::fs::File::create(dir.path().join("t.media"))
            .unwrap()
            .write_all(b"abcdefghij")
            .unwrap();

        let mut importer = NhntImporter::new(&base);
        importer.configure(ImportRequest::default()).unwrap();
        let mut sink = MemorySink::new();
        while importer.process(&mut sink).unwrap() != Progress::Eos {}
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].data.as_ref(), b"abcdef");
        assert_eq!(samples[1].data.as_ref(), b"ghij");
        assert_eq!(samples[1].dts, 1024);
        assert_eq!(samples[1].cts_offset, 100);
        assert!(samples[0].rap.is_rap());
        assert_eq!(
            sink.streams[0].desc.as_ref().unwrap().codec_id,
            media_types::CodecId::AacMp4
        );
    }

    #[test]
    fn bad_signature_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("x.nhnt");
        std::fs::File::create(&base).unwrap().write_all(b"XXXX....").unwrap();
        std::fs::File::create(dir.path().join("x.media")).unwrap();
        let mut importer = NhntImporter::new(&base);
        importer.configure(ImportRequest::default()).unwrap();
        let mut sink = MemorySink::new();
        assert!(matches!(
            importer.process(&mut sink),
            Err(ImportError::NonCompliantBitstream(_))
        ));
    }
}
