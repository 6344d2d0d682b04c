use bytes::Bytes;

use crate::{ImportError, MediaSample, Result, StreamDescriptor};

/// Opaque handle to a declared output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle(pub(crate) u32);

impl StreamHandle {
    /// Index of the stream in declaration order.
    #[must_use]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Outcome of handing a sample to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkAck {
    /// The sink took ownership of the sample.
    Accepted,
    /// Backpressure: the sample was not consumed, retry on the next
    /// `process()` step.
    WouldBlock,
}

/// Typed value for mid-stream sink properties (e.g. `ttxt:last_dur`).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Unsigned integer.
    Uint(u64),
    /// Signed integer.
    Int(i64),
    /// Text.
    Str(String),
    /// Opaque bytes (subsample tables, auxiliary blobs).
    Data(Bytes),
}

/// Receiving side of the import pipeline, implemented by the track writer.
pub trait Sink {
    /// Registers a new output stream.
    fn declare_stream(&mut self, desc: StreamDescriptor) -> Result<StreamHandle>;

    /// Replaces the codec configuration of a stream. Allowed once more after
    /// declaration, when the framer finishes parsing its init headers.
    fn update_codec_config(&mut self, stream: StreamHandle, config: Bytes) -> Result<()>;

    /// Appends one sample. Ownership moves to the sink on `Accepted`.
    fn write_sample(&mut self, stream: StreamHandle, sample: MediaSample) -> Result<SinkAck>;

    /// Visits every already-written sample of a stream for in-place rewrite.
    ///
    /// Needed by framers that must retrofit previously emitted data: NALU
    /// size-field widening and final CTS-offset packing.
    fn rewrite_samples(
        &mut self,
        stream: StreamHandle,
        rewrite: &mut dyn FnMut(u32, &mut MediaSample),
    ) -> Result<()>;

    /// Attaches a property derived mid-stream.
    fn set_stream_property(&mut self, stream: StreamHandle, key: &str, value: PropertyValue);

    /// Marks a stream as finished.
    fn signal_eos(&mut self, stream: StreamHandle);
}

/// One stream captured by [`MemorySink`].
#[derive(Debug, Default)]
pub struct SinkStream {
    /// Descriptor as declared (codec config possibly refined).
    pub desc: Option<StreamDescriptor>,
    /// Samples in emission order.
    pub samples: Vec<MediaSample>,
    /// Properties set on the stream.
    pub properties: Vec<(String, PropertyValue)>,
    /// Whether EOS was signalled.
    pub eos: bool,
}

/// In-memory sink used by the test suites.
///
/// `accept_budget` simulates backpressure: when set, each accepted sample
/// decrements it and a write at zero reports [`SinkAck::WouldBlock`] without
/// consuming the sample.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Captured streams in declaration order.
    pub streams: Vec<SinkStream>,
    /// Remaining writes before the sink blocks; `None` never blocks.
    pub accept_budget: Option<u32>,
}

impl MemorySink {
    /// An unbounded sink.
    #[must_use]
    pub fn new() -> Self {
        MemorySink::default()
    }

    fn stream_mut(&mut self, handle: StreamHandle) -> Result<&mut SinkStream> {
        self.streams
            .get_mut(handle.0 as usize)
            .ok_or_else(|| ImportError::BadParam("unknown stream handle".into()))
    }

    /// The samples of stream `index`.
    #[must_use]
    pub fn samples(&self, index: usize) -> &[MediaSample] {
        &self.streams[index].samples
    }
}

impl Sink for MemorySink {
    fn declare_stream(&mut self, desc: StreamDescriptor) -> Result<StreamHandle> {
        self.streams.push(SinkStream {
            desc: Some(desc),
            ..Default::default()
        });
        Ok(StreamHandle(self.streams.len() as u32 - 1))
    }

    fn update_codec_config(&mut self, stream: StreamHandle, config: Bytes) -> Result<()> {
        let slot = self.stream_mut(stream)?;
        if let Some(desc) = slot.desc.as_mut() {
            desc.codec_config = Some(config);
        }
        Ok(())
    }

    fn write_sample(&mut self, stream: StreamHandle, sample: MediaSample) -> Result<SinkAck> {
        match self.accept_budget {
            Some(0) => return Ok(SinkAck::WouldBlock),
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        self.stream_mut(stream)?.samples.push(sample);
        Ok(SinkAck::Accepted)
    }

    fn rewrite_samples(
        &mut self,
        stream: StreamHandle,
        rewrite: &mut dyn FnMut(u32, &mut MediaSample),
    ) -> Result<()> {
        let slot = self.stream_mut(stream)?;
        for (i, sample) in slot.samples.iter_mut().enumerate() {
            rewrite(i as u32, sample);
        }
        Ok(())
    }

    fn set_stream_property(&mut self, stream: StreamHandle, key: &str, value: PropertyValue) {
        if let Ok(slot) = self.stream_mut(stream) {
            slot.properties.push((key.to_string(), value));
        }
    }

    fn signal_eos(&mut self, stream: StreamHandle) {
        if let Ok(slot) = self.stream_mut(stream) {
            slot.eos = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CodecId, RapKind, StreamType};

    #[test]
    fn backpressure_budget() {
        let mut sink = MemorySink::new();
        sink.accept_budget = Some(1);
        let h = sink
            .declare_stream(StreamDescriptor::new(StreamType::Audio, CodecId::Mp3, 44100))
            .unwrap();
        let samp = MediaSample::new(Bytes::from_static(b"a"), 0, RapKind::Sync);
        assert_eq!(sink.write_sample(h, samp.clone()).unwrap(), SinkAck::Accepted);
        assert_eq!(sink.write_sample(h, samp).unwrap(), SinkAck::WouldBlock);
        assert_eq!(sink.samples(0).len(), 1);
    }
}
