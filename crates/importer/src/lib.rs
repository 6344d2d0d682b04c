//! The uniform importer layer.
//!
//! One [`Importer`](media_types::Importer) implementation per input family
//! turns container or elementary-stream bytes into declared streams and
//! timestamped samples on a [`Sink`](media_types::Sink). [`open_importer`]
//! dispatches on file extension (with a content fallback for XML
//! descriptors), mirroring how hosts select importers by name.

mod ac3_import;
mod adts;
mod avc;
mod h263_import;
mod image;
mod mp3_import;
mod ps;
mod qcp;
mod queue;
mod speech;
mod visual;

pub use ac3_import::Ac3Importer;
pub use adts::AdtsImporter;
pub use avc::AvcImporter;
pub use h263_import::H263Importer;
pub use image::ImageImporter;
pub use mp3_import::Mp3Importer;
pub use nhml::{NhmlImporter, NhntImporter, SafImporter};
pub use ps::PsImporter;
pub use qcp::QcpImporter;
pub use speech::SpeechImporter;
pub use timedtext::TextImporter;
pub use visual::VisualImporter;

use std::path::Path;

use media_types::{ImportError, Importer, Result};

/// Opens the importer matching a file, dispatching on its extension and,
/// for XML inputs, on the document root.
pub fn open_importer(path: &Path) -> Result<Box<dyn Importer>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let importer: Box<dyn Importer> = match ext.as_str() {
        "mpg" | "mpeg" | "vob" | "vcd" | "svcd" => Box::new(PsImporter::new(path)),
        "mp2" | "mp3" | "m1a" | "m2a" => Box::new(Mp3Importer::from_path(path)?),
        "aac" => Box::new(AdtsImporter::from_path(path)?),
        "ac3" => Box::new(Ac3Importer::from_path(path)?),
        "amr" | "awb" | "evc" | "smv" => Box::new(SpeechImporter::from_path(path)?),
        "qcp" => Box::new(QcpImporter::from_path(path)?),
        "263" | "h263" => Box::new(H263Importer::from_path(path)?),
        "cmp" | "m4v" => Box::new(VisualImporter::from_path(path, false)?),
        "m1v" | "m2v" => Box::new(VisualImporter::from_path(path, true)?),
        "h264" | "264" | "x264" | "h26l" | "26l" => Box::new(AvcImporter::from_path(path)?),
        "jpg" | "jpeg" | "png" | "jp2" => Box::new(ImageImporter::from_path(path)?),
        "nhnt" | "media" | "info" => Box::new(NhntImporter::new(path)),
        "nhml" => Box::new(NhmlImporter::new(path)),
        "dml" => Box::new(NhmlImporter::new_dims(path)),
        "saf" | "lsr" => Box::new(SafImporter::new(path)),
        "srt" | "sub" | "ssa" | "ass" | "vtt" | "ttxt" | "ttml" | "txt" => {
            Box::new(TextImporter::from_path(path)?)
        }
        _ => return open_by_content(path),
    };
    Ok(importer)
}

/// Content sniffing for extension-less inputs: XML roots select the NHML
/// or text importers, anything else falls back on the text prober.
fn open_by_content(path: &Path) -> Result<Box<dyn Importer>> {
    let data = std::fs::read(path).map_err(|_| ImportError::UrlError(path.display().to_string()))?;
    let head = String::from_utf8_lossy(&data[..data.len().min(512)]).into_owned();
    if head.contains("NHNTStream") {
        return Ok(Box::new(NhmlImporter::new(path)));
    }
    if head.contains("DIMSStream") {
        return Ok(Box::new(NhmlImporter::new_dims(path)));
    }
    if head.contains("<TextStream") || head.contains("<tt") || head.trim_start().starts_with('<') {
        return Ok(Box::new(TextImporter::from_path(path)?));
    }
    Err(ImportError::NotSupported(format!(
        "unknown input file type: {}",
        path.display()
    )))
}
