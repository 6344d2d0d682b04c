//! Shared data model of the import pipeline.
//!
//! Importers turn container or elementary-stream bytes into timestamped
//! [`MediaSample`]s and hand them to a [`Sink`] together with one
//! [`StreamDescriptor`] per logical track. The [`Importer`] trait is the
//! uniform entry point driven by the host scheduler; everything is
//! single-threaded and cooperative (`process()` until EOS or error).

mod error;
mod request;
mod sample;
mod sink;
mod source;
mod stream;
mod timing;

pub use error::{ImportError, Result};
pub use request::{
    ImportRequest, ImporterEvent, Progress, SbrSignaling, SimpleTextMode, TtmlOptions,
};
pub use sample::{MediaSample, RapKind, SubSample};
pub use sink::{MemorySink, PropertyValue, Sink, SinkAck, SinkStream, StreamHandle};
pub use source::Source;
pub use stream::{
    AudioInfo, CodecId, ProgramInfo, StreamDescriptor, StreamType, TrackCatalog, TrackInfo,
    VideoInfo,
};
pub use timing::{AUTO_FPS, DEFAULT_FPS, video_timing};

/// Uniform entry point of one import session.
///
/// An importer owns its input source. `probe` is non-destructive and may be
/// called before `configure`; `process` consumes input and pushes zero or
/// more samples into the sink, returning [`Progress::WouldBlock`] untouched
/// cursor state when the sink applies backpressure.
pub trait Importer {
    /// Enumerates the tracks the source contains without emitting samples.
    fn probe(&mut self) -> Result<TrackCatalog>;

    /// Binds the session to one stream and latches the request options.
    fn configure(&mut self, request: ImportRequest) -> Result<()>;

    /// Runs one cooperative step.
    fn process(&mut self, sink: &mut dyn Sink) -> Result<Progress>;

    /// Accepts a playback event. The default implementation ignores it.
    fn event(&mut self, _event: ImporterEvent) {}

    /// Releases the input source. The default implementation does nothing;
    /// owned resources are dropped with the importer.
    fn close(&mut self) {}
}
