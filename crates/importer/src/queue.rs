use media_types::{ImportRequest, MediaSample, Progress, Result, Sink, SinkAck, StreamHandle};

/// Shared drain loop: pre-built samples are handed to the sink one at a
/// time, honoring backpressure (cursor kept), the duration cap and the
/// abort flag at every sample boundary.
#[derive(Debug, Default)]
pub(crate) struct SampleQueue {
    samples: Vec<MediaSample>,
    next: usize,
}

impl SampleQueue {
    pub fn fill(&mut self, samples: Vec<MediaSample>) {
        self.samples = samples;
        self.next = 0;
    }

    /// Emits until blocked or done. Returns `WouldBlock` or `Eos`.
    pub fn drain(
        &mut self,
        sink: &mut dyn Sink,
        handle: StreamHandle,
        request: &ImportRequest,
        timescale: u32,
    ) -> Result<Progress> {
        let cap = request.duration_ms * timescale as u64 / 1000;
        while self.next < self.samples.len() {
            if request.aborted() {
                break;
            }
            let sample = &self.samples[self.next];
            if cap != 0 && sample.dts > cap {
                break;
            }
            match sink.write_sample(handle, sample.clone())? {
                SinkAck::Accepted => self.next += 1,
                SinkAck::WouldBlock => return Ok(Progress::WouldBlock),
            }
        }
        Ok(Progress::Eos)
    }
}
