use bytes::Bytes;

/// Media kind of a logical output track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// Video and still images.
    Visual,
    /// Audio.
    Audio,
    /// Timed text and subtitles.
    Text,
    /// Scene description (binary scene commands forwarded opaquely).
    Scene,
    /// Object descriptor streams.
    ObjectDescriptor,
    /// DVD-style subpictures.
    Subpicture,
    /// MPEG-7 metadata.
    Mpeg7,
    /// IPMP streams.
    Ipmp,
    /// Object content information.
    Oci,
    /// Font data streams.
    Fonts,
    /// Anything else, carried through with a generic description.
    Generic,
}

/// Closed set of codecs the importers can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecId {
    /// H.264 / AVC.
    H264,
    /// MPEG-1 Video.
    Mpeg1Video,
    /// MPEG-2 Video.
    Mpeg2Video,
    /// MPEG-4 Visual (Part 2).
    Mpeg4Visual,
    /// ITU H.263.
    H263,
    /// MPEG-1 audio (layers I-III).
    Mp3,
    /// MPEG-2 audio (low sample rate layers).
    Mpeg2Audio,
    /// MPEG-4 AAC.
    AacMp4,
    /// Dolby AC-3.
    Ac3,
    /// AMR narrowband.
    Amr,
    /// AMR wideband.
    AmrWb,
    /// QCELP 13k.
    Qcelp,
    /// EVRC.
    Evrc,
    /// SMV.
    Smv,
    /// JPEG still image.
    Jpeg,
    /// PNG still image.
    Png,
    /// JPEG-2000 still image.
    Jpeg2000,
    /// 3GPP timed text.
    Tx3g,
    /// WebVTT cues.
    WebVtt,
    /// TTML documents.
    Ttml,
    /// Unpackaged UTF-8 text.
    SimpleText,
    /// LASeR binary scene stream.
    Laser,
    /// Generic / unknown codec carried by four-character code.
    Generic,
}

/// Visual properties of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VideoInfo {
    /// Display width in pixels.
    pub width: u32,
    /// Display height in pixels.
    pub height: u32,
    /// Pixel aspect ratio as numerator/denominator, when known.
    pub pixel_aspect: Option<(u32, u32)>,
    /// Horizontal track offset for composition.
    pub horizontal_offset: i32,
    /// Vertical track offset for composition.
    pub vertical_offset: i32,
    /// Stacking order among visual tracks.
    pub z_order: i16,
    /// Detected frame rate, when known.
    pub fps: Option<f64>,
}

/// Audio properties of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioInfo {
    /// Sampling rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u32,
    /// Bits per PCM sample (16 unless the container says otherwise).
    pub bits_per_sample: u32,
    /// Frame size in PCM samples (1024 for AAC, 1536 for AC-3, ...).
    pub samples_per_frame: u32,
}

/// Description of one logical output track.
///
/// Constructed once at first sample; immutable afterwards except for
/// `codec_config`, which may be refined through
/// [`Sink::update_codec_config`](crate::Sink::update_codec_config) once the
/// framer finishes parsing initialization headers.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Identifier of the stream inside its container (PES stream id, track
    /// number); importers over raw elementary streams use 1.
    pub stream_id: u32,
    /// Media kind.
    pub stream_type: StreamType,
    /// Codec of the samples.
    pub codec_id: CodecId,
    /// Timescale every sample timestamp of this stream is expressed in.
    pub timescale: u32,
    /// Opaque decoder configuration; layout depends on `codec_id`.
    pub codec_config: Option<Bytes>,
    /// Visual extras.
    pub video: Option<VideoInfo>,
    /// Audio extras.
    pub audio: Option<AudioInfo>,
    /// BCP-47-like language tag.
    pub language: Option<String>,
    /// Total duration in timescale units when probing determined one.
    pub duration_hint: Option<u64>,
}

impl StreamDescriptor {
    /// A descriptor with only the mandatory fields set.
    pub fn new(stream_type: StreamType, codec_id: CodecId, timescale: u32) -> Self {
        StreamDescriptor {
            stream_id: 1,
            stream_type,
            codec_id,
            timescale,
            codec_config: None,
            video: None,
            audio: None,
            language: None,
            duration_hint: None,
        }
    }
}

/// One track as reported by a non-destructive probe.
#[derive(Debug, Clone, Default)]
pub struct TrackInfo {
    /// 1-based track number used with `ImportRequest::stream_index`.
    pub track_num: u32,
    /// Media kind, when identified.
    pub stream_type: Option<StreamType>,
    /// Codec, when identified.
    pub codec_id: Option<CodecId>,
    /// Visual properties, when identified.
    pub video: Option<VideoInfo>,
    /// Audio properties, when identified.
    pub audio: Option<AudioInfo>,
    /// Language tag, when the container declares one.
    pub language: Option<String>,
    /// Duration in milliseconds, when the probe derived one.
    pub duration_ms: Option<u64>,
}

/// Program structure of multi-program containers.
#[derive(Debug, Clone, Default)]
pub struct ProgramInfo {
    /// Program number.
    pub number: u32,
    /// Track numbers belonging to this program.
    pub tracks: Vec<u32>,
}

/// Result of probing a source: what could be determined, possibly partial.
#[derive(Debug, Clone, Default)]
pub struct TrackCatalog {
    /// Tracks found in the source.
    pub tracks: Vec<TrackInfo>,
    /// Program grouping, for containers that have one.
    pub programs: Vec<ProgramInfo>,
}
