//! Bit-level and byte-level helpers shared by the parsing crates.
//!
//! The [`BitReader`] walks a borrowed byte slice with single-bit resolution,
//! the [`BitWriter`] accumulates bits into an owned buffer. Both are used by
//! the codec header parsers (SPS/PPS, ADTS, AC-3 sync frames) where fields
//! are not byte aligned.
#![deny(missing_docs)]
#![deny(unsafe_code)]

mod bit_read;
mod bit_write;
mod cursor;
mod vlu;

pub use bit_read::BitReader;
pub use bit_write::BitWriter;
pub use cursor::BytesCursorExt;
pub use vlu::BitReaderVluExt;
