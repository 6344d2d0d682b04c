//! H.264/AVC elementary stream parsing.
//!
//! Covers what the Annex-B importer needs: start-code framing, RBSP
//! unescaping, SPS/PPS parsing (including the VUI timing and aspect
//! information), slice-header parsing with picture order count computation,
//! access unit boundary detection, SEI classification and the
//! `AVCDecoderConfigurationRecord`.

mod annexb;
mod config;
mod nal;
mod poc;
mod pps;
mod sei;
mod slice;
mod sps;

pub use annexb::{NalIter, next_start_code};
pub use config::AvcDecoderConfigurationRecord;
pub use nal::{NalUnitType, unescape_rbsp};
pub use poc::PocContext;
pub use pps::Pps;
pub use sei::{SeiInfo, trim_sei_payload};
pub use slice::{SliceHeader, SliceType, is_new_access_unit};
pub use sps::{Sps, VuiTiming};
