use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use media_types::{
    ImportError, ImportRequest, Importer, MediaSample, Progress, RapKind, Result, Sink, SinkAck,
    StreamDescriptor, StreamHandle, TrackCatalog, TrackInfo,
};
use tracing::{info, warn};

const SAF_STREAM_HEADER: u8 = 1;
const SAF_STREAM_HEADER_PERMANENT: u8 = 2;
const SAF_END_OF_STREAM: u8 = 3;
const SAF_ACCESS_UNIT: u8 = 4;
const SAF_REMOTE_STREAM_HEADER: u8 = 7;

#[derive(Debug, Clone)]
struct SafStream {
    stream_id: u32,
    stream_type: u32,
    oti: u32,
    timescale: u32,
    decoder_config: Option<Vec<u8>>,
}

/// SAF (Simple Aggregation Format) demuxer/importer.
///
/// Stream headers declare object type, stream type, timestamp resolution and
/// decoder config; access units become samples stamped with the 30-bit CTS.
/// Scene command payloads stay opaque and flow to the scene decoder.
pub struct SafImporter {
    path: PathBuf,
    request: ImportRequest,
    handle: Option<StreamHandle>,
    pending: Vec<MediaSample>,
    desc: Option<StreamDescriptor>,
    emit_idx: usize,
    done: bool,
}

impl SafImporter {
    /// Creates an importer over a `.saf`/`.lsr` file.
    pub fn new(path: &Path) -> SafImporter {
        SafImporter {
            path: path.to_path_buf(),
            request: ImportRequest::default(),
            handle: None,
            pending: Vec::new(),
            desc: None,
            emit_idx: 0,
            done: false,
        }
    }

    fn scan(&self, collect_for: Option<u32>) -> Result<(Vec<SafStream>, Vec<MediaSample>)> {
        let data = std::fs::read(&self.path)
            .map_err(|_| ImportError::UrlError(self.path.display().to_string()))?;
        let mut r = Cursor::new(&data[..]);
        let mut streams: Vec<SafStream> = Vec::new();
        let mut samples = Vec::new();

        loop {
            let Ok(first) = r.read_u16::<BigEndian>() else {
                break;
            };
            let is_rap = first & 0x8000 != 0;
            // 15-bit sequence number then 2 bits of padding folded into the
            // 30-bit composition timestamp read
            let Ok(ts_word) = r.read_u32::<BigEndian>() else {
                break;
            };
            let cts = (ts_word & 0x3FFF_FFFF) as u64;
            let Ok(au_size) = r.read_u16::<BigEndian>() else {
                break;
            };
            if au_size < 2 {
                return Err(ImportError::non_compliant("invalid SAF packet header"));
            }
            let Ok(type_word) = r.read_u16::<BigEndian>() else {
                break;
            };
            let unit_type = (type_word >> 12) as u8;
            let mut stream_id = (type_word & 0x0FFF) as u32;
            if stream_id == 0 {
                stream_id = 1000;
            }
            let mut remaining = au_size as usize - 2;

            match unit_type {
                SAF_STREAM_HEADER | SAF_STREAM_HEADER_PERMANENT | SAF_REMOTE_STREAM_HEADER => {
                    if remaining < 7 {
                        return Err(ImportError::non_compliant("short SAF stream header"));
                    }
                    let oti = r.read_u8().map_err(ImportError::Io)? as u32;
                    let stream_type = r.read_u8().map_err(ImportError::Io)? as u32;
                    let mut ts_res = r.read_u24::<BigEndian>().map_err(ImportError::Io)?;
                    r.read_u16::<BigEndian>().map_err(ImportError::Io)?; // buffer size
                    remaining -= 7;
                    if ts_res == 0 {
                        ts_res = 1000;
                    }
                    if unit_type == SAF_REMOTE_STREAM_HEADER && remaining >= 2 {
                        let url_len = r.read_u16::<BigEndian>().map_err(ImportError::Io)? as usize;
                        let mut url = vec![0u8; url_len.min(remaining - 2)];
                        r.read_exact(&mut url).map_err(ImportError::Io)?;
                        remaining -= 2 + url.len();
                        warn!(url = %String::from_utf8_lossy(&url), "remote SAF stream");
                    }
                    let mut config = None;
                    if remaining > 0 {
                        let mut dsi = vec![0u8; remaining];
                        r.read_exact(&mut dsi).map_err(ImportError::Io)?;
                        remaining = 0;
                        config = Some(dsi);
                    }
                    if !streams.iter().any(|s| s.stream_id == stream_id) {
                        streams.push(SafStream {
                            stream_id,
                            stream_type,
                            oti,
                            timescale: ts_res,
                            decoder_config: config,
                        });
                    }
                }
                SAF_ACCESS_UNIT => {
                    if collect_for == Some(stream_id) {
                        let mut payload = vec![0u8; remaining];
                        r.read_exact(&mut payload).map_err(ImportError::Io)?;
                        remaining = 0;
                        let samp = MediaSample {
                            data: Bytes::from(payload),
                            dts: cts,
                            cts_offset: 0,
                            rap: if is_rap { RapKind::Sync } else { RapKind::None },
                            duration: None,
                            subsamples: Vec::new(),
                            data_ref: None,
                        };
                        samples.push(samp);
                    }
                }
                SAF_END_OF_STREAM => {}
                _ => {}
            }
            if remaining > 0 {
                let pos = r.position() + remaining as u64;
                r.set_position(pos);
            }
        }
        Ok((streams, samples))
    }
}

impl Importer for SafImporter {
    fn probe(&mut self) -> Result<TrackCatalog> {
        let (streams, _) = self.scan(None)?;
        let tracks = streams
            .iter()
            .map(|s| {
                let (stream_type, codec) = crate::codec_from_mpeg4(s.stream_type, s.oti);
                TrackInfo {
                    track_num: s.stream_id,
                    stream_type: Some(stream_type),
                    codec_id: Some(codec),
                    ..Default::default()
                }
            })
            .collect();
        Ok(TrackCatalog {
            tracks,
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
            let (streams, _) = self.scan(None)?;
            let selected = match self.request.stream_index {
                Some(id) => streams
                    .iter()
                    .find(|s| s.stream_id == id)
                    .ok_or(ImportError::BadParam(format!("SAF stream {id} not found")))?,
                None if streams.len() == 1 => &streams[0],
                None => {
                    return Err(ImportError::BadParam(format!(
                        "{} SAF streams, select one",
                        streams.len()
                    )));
                }
            };
            let (stream_type, codec) = crate::codec_from_mpeg4(selected.stream_type, selected.oti);
            let mut desc = StreamDescriptor::new(stream_type, codec, selected.timescale);
            desc.stream_id = selected.stream_id;
            desc.codec_config = selected.decoder_config.clone().map(Bytes::from);
            info!(
                stream = selected.stream_id,
                stream_type = selected.stream_type,
                oti = selected.oti,
                "SAF import ready"
            );
            let (_, samples) = self.scan(Some(selected.stream_id))?;
            self.pending = samples;
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

    fn saf_packet(is_rap: bool, cts: u32, unit_type: u8, stream_id: u16, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let first: u16 = if is_rap { 0x8000 } else { 0 };
        out.extend_from_slice(&first.to_be_bytes());
        out.extend_from_slice(&(cts & 0x3FFF_FFFF).to_be_bytes());
        out.extend_from_slice(&((body.len() as u16 + 2).to_be_bytes()));
        let type_word = ((unit_type as u16) << 12) | (stream_id & 0x0FFF);
        out.extend_from_slice(&type_word.to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    fn stream_header(oti: u8, stream_type: u8, ts_res: u32, dsi: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(oti);
        body.push(stream_type);
        body.extend_from_slice(&ts_res.to_be_bytes()[1..]);
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(dsi);
        body
    }

    fn build_saf() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&saf_packet(
            true,
            0,
            SAF_STREAM_HEADER,
            5,
            &stream_header(0x09, 3, 1000, b"LASERCFG"),
        ));
        out.extend_from_slice(&saf_packet(true, 0, SAF_ACCESS_UNIT, 5, b"scene-update-1"));
        out.extend_from_slice(&saf_packet(false, 500, SAF_ACCESS_UNIT, 5, b"scene-update-2"));
        out.extend_from_slice(&saf_packet(false, 0, SAF_END_OF_STREAM, 5, &[]));
        out
    }

    #[test]
    fn probe_lists_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.saf");
        std::fs::File::create(&path).unwrap().write_all(&build_saf()).unwrap();
        let mut importer = SafImporter::new(&path);
        let catalog = importer.probe().unwrap();
        assert_eq!(catalog.tracks.len(), 1);
        assert_eq!(catalog.tracks[0].track_num, 5);
        assert_eq!(catalog.tracks[0].codec_id, Some(media_types::CodecId::Laser));
    }

    #[test]
    fn access_units_become_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.saf");
        std::fs::File::create(&path).unwrap().write_all(&build_saf()).unwrap();
        let mut importer = SafImporter::new(&path);
        importer.configure(ImportRequest::default()).unwrap();
        let mut sink = MemorySink::new();
        while importer.process(&mut sink).unwrap() != Progress::Eos {}
        let desc = sink.streams[0].desc.as_ref().unwrap();
        assert_eq!(desc.codec_config.as_deref(), Some(&b"LASERCFG"[..]));
        assert_eq!(desc.timescale, 1000);
        let samples = sink.samples(0);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].data.as_ref(), b"scene-update-1");
        assert!(samples[0].rap.is_rap());
        assert_eq!(samples[1].dts, 500);
        assert!(!samples[1].rap.is_rap());
    }

    #[test]
    fn short_packet_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.saf");
        let mut data = Vec::new();
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes()); // au_size < 2
        data.extend_from_slice(&0u16.to_be_bytes());
        std::fs::File::create(&path).unwrap().write_all(&data).unwrap();
        let mut importer = SafImporter::new(&path);
        assert!(importer.probe().is_err());
    }
}
