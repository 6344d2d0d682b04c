//! MPEG-2 Program Stream demultiplexer.
//!
//! Parses interleaved pack headers and PES packets into per-elementary-stream
//! access units with reconstructed timestamps. Streams are identified by the
//! MPEG-2 PS convention: `0xE0..=0xEF` video, `0xC0..=0xDF` MPEG audio,
//! `0xBD` private with a sub-stream byte selecting AC-3 (`0x80..=0x8F`) or
//! LPCM (`0xA0..=0xAF`).
//!
//! Opening a file runs a bounded probe that enumerates streams, derives
//! per-stream durations and records seek anchors; random access then uses the
//! anchor index plus interpolation-driven binary seeking.

mod demux;
mod error;
mod index;
mod pes;
mod seek;
mod stream;

pub use demux::{AudioFrame, AudioKind, PsDemuxer, TsUnits, VideoFrame};
pub use error::PsError;
pub use pes::{read_pts, write_pts};

/// Clock rate of PES timestamps.
pub const CLOCK_90K: u64 = 90_000;

/// Minimum spacing between two recorded seek anchors: 5 seconds at 90 kHz.
pub const RECORD_MIN_GAP: u64 = 5 * CLOCK_90K;
