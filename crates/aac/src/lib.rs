//! AAC/ADTS frame parsing and AudioSpecificConfig construction.
//!
//! The ADTS side locates sync frames with double-sync verification; the
//! config side builds the `AudioSpecificConfig` records (ISO/IEC 14496-3)
//! for plain AAC, implicit SBR (backward-compatible sync extension) and
//! explicit SBR (hierarchical AOT 5) signaling.
#![deny(missing_docs)]
#![deny(unsafe_code)]

mod adts;
mod asc;

pub use adts::{AdtsHeader, next_adts_frame};
pub use asc::{
    AudioSpecificConfig, PartialAudioSpecificConfig, SAMPLE_RATES, sample_rate_index,
};

/// PCM samples per AAC frame without SBR.
pub const SAMPLES_PER_FRAME: u32 = 1024;

/// PCM samples per frame when explicit SBR doubles the output rate.
pub const SAMPLES_PER_FRAME_SBR: u32 = 2048;
