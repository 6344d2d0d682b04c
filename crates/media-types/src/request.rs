use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// SBR signaling policy for AAC imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SbrSignaling {
    /// Plain AudioSpecificConfig, no SBR.
    #[default]
    None,
    /// Backward-compatible signaling through a sync extension.
    Implicit,
    /// Non-backward-compatible hierarchical signaling (AOT 5 outer object).
    Explicit,
}

/// Output packaging for the "simple text" pass-through loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimpleTextMode {
    /// Raw UTF-8 lines.
    #[default]
    None,
    /// Package each line as a TX3G sample.
    Tx3g,
    /// Package each line as a WebVTT cue.
    Vtt,
}

/// TTML-specific knobs.
#[derive(Debug, Clone, Default)]
pub struct TtmlOptions {
    /// Split overlapping cue windows into per-interval samples.
    pub split: bool,
    /// Load referenced/inlined resources and embed them as subsamples.
    pub embed: bool,
    /// Media time that becomes 0; cues before it are dropped. Parsed with
    /// the TTML clock grammar, an optional leading `T` is tolerated.
    pub zero: Option<String>,
    /// Extra CTS offset in milliseconds applied to every sample; negative
    /// means "rebase first interval to zero".
    pub cts: Option<i64>,
    /// Forced sample duration in milliseconds (union mode only).
    pub dur: Option<u64>,
}

/// Everything a host passes when binding an importer to one stream.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// 1-based track number to import from multi-stream containers;
    /// `None` selects the only stream and errors when ambiguous.
    pub stream_index: Option<u32>,
    /// Stop after this many milliseconds of media; 0 imports everything.
    pub duration_ms: u64,
    /// FPS override: `0.0` autodetects, [`crate::AUTO_FPS`] means "detect
    /// or fall back to 25".
    pub video_fps: f64,
    /// 3GPP audio frame aggregation factor, clamped to 1..=15.
    pub frames_per_sample: u32,
    /// Forced H.264 NALU size field width in bits (8, 16 or 32);
    /// `None` enables self-tuning from 8 bits.
    pub forced_size_length: Option<u32>,
    /// Keep MPEG-4 N-VOPs to achieve constant frame rate.
    pub no_frame_drop: bool,
    /// AAC SBR signaling mode.
    pub sbr: SbrSignaling,
    /// Treat MPEG-2 AAC profiles as MPEG-4 object types.
    pub force_mpeg4: bool,
    /// Emit samples as byte-range references into the source.
    pub use_dataref: bool,
    /// TTML options.
    pub ttml: TtmlOptions,
    /// Suppress the default text box of subtitle sample descriptions.
    pub nodefbox: bool,
    /// Skip the trailing flush sample of subtitle imports.
    pub noflush: bool,
    /// Drop empty subtitle samples instead of emitting gap fillers.
    pub no_empty: bool,
    /// Simple-text packaging mode.
    pub stxtmod: SimpleTextMode,
    /// Language tag stamped on declared streams.
    pub language: Option<String>,
    /// Cooperative cancellation flag, polled at sample boundaries.
    pub abort: Arc<AtomicBool>,
}

impl Default for ImportRequest {
    fn default() -> Self {
        ImportRequest {
            stream_index: None,
            duration_ms: 0,
            video_fps: 0.0,
            frames_per_sample: 1,
            forced_size_length: None,
            no_frame_drop: false,
            sbr: SbrSignaling::None,
            force_mpeg4: false,
            use_dataref: false,
            ttml: TtmlOptions::default(),
            nodefbox: false,
            noflush: false,
            no_empty: false,
            stxtmod: SimpleTextMode::None,
            language: None,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl ImportRequest {
    /// True once the host requested cancellation.
    #[must_use]
    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }
}

/// Playback events accepted by `Importer::event`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImporterEvent {
    /// Start or resume delivery from the given media time.
    Play {
        /// Start position in milliseconds.
        start_ms: u64,
    },
    /// Stop delivery.
    Stop,
    /// Change delivery speed.
    SetSpeed(f64),
}

/// Outcome of one `process()` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Input remains, call `process()` again.
    Continue,
    /// The sink applied backpressure; cursor state is intact.
    WouldBlock,
    /// All input consumed (or abort observed); streams got EOS.
    Eos,
}
