//! NHML / NHNT / SAF container import.
//!
//! NHML is an XML descriptor declaring a track (codec, timescale, visual or
//! audio properties) plus per-sample records whose payloads come from a
//! companion media file, per-sample files, or byte ranges of an XML
//! document. NHNT is the equivalent binary descriptor; SAF is the simple
//! aggregation multiplex whose stream headers carry decoder configs and
//! whose access units become samples (scene payloads are forwarded
//! opaquely to the scene decoder).

mod deflate;
mod descriptor;
mod nhnt;
mod saf;
mod xml_range;

pub use deflate::deflate_sample;
pub use descriptor::NhmlImporter;
pub use nhnt::NhntImporter;
pub use saf::SafImporter;
pub use xml_range::extract_xml_range;

use media_types::{CodecId, StreamType};

/// Maps an MPEG-4 systems (streamType, objectTypeIndication) pair onto the
/// workspace codec identifiers.
#[must_use]
pub fn codec_from_mpeg4(stream_type: u32, oti: u32) -> (StreamType, CodecId) {
    match stream_type {
        3 => (
            StreamType::Scene,
            if oti == 0x09 {
                CodecId::Laser
            } else {
                CodecId::Generic
            },
        ),
        4 => {
            let codec = match oti {
                0x20 => CodecId::Mpeg4Visual,
                0x21 => CodecId::H264,
                0x6A => CodecId::Mpeg1Video,
                0x60..=0x65 => CodecId::Mpeg2Video,
                0x6C => CodecId::Jpeg,
                0x6D => CodecId::Png,
                0x6E => CodecId::Jpeg2000,
                _ => CodecId::Generic,
            };
            (StreamType::Visual, codec)
        }
        5 => {
            let codec = match oti {
                0x40 => CodecId::AacMp4,
                0x69 => CodecId::Mpeg2Audio,
                0x6B => CodecId::Mp3,
                0xA5 => CodecId::Ac3,
                _ => CodecId::Generic,
            };
            (StreamType::Audio, codec)
        }
        6 => (StreamType::Mpeg7, CodecId::Generic),
        7 => (StreamType::Ipmp, CodecId::Generic),
        8 => (StreamType::Oci, CodecId::Generic),
        _ => (StreamType::Generic, CodecId::Generic),
    }
}
