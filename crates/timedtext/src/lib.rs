//! Subtitle and timed-text loading.
//!
//! A single importer fronts all supported formats: SRT, MicroDVD SUB, SSA,
//! WebVTT, TTXT (the XML text-stream dump format), TTML and a plain-text
//! pass-through. Format detection peeks at the first non-whitespace bytes;
//! each loader converts its cues into timestamped samples, filling gaps with
//! empty samples so the output timeline is continuous.

mod importer;
mod srt;
mod ssa;
mod sub;
mod swf;
mod ttml;
mod ttxt;
mod tx3g;
mod utf;
mod vtt;

pub use importer::TextImporter;
pub use srt::parse_srt;
pub use ssa::parse_ssa;
pub use sub::parse_sub;
pub use swf::{SwfFrame, SwfReader};
pub use ttml::{
    ClockContext, TtmlDocument, TtmlInterval, TtmlLoadOptions, TtmlSample, load_ttml, parse_clock,
};
pub use ttxt::{TtxtDocument, parse_ttxt};
pub use tx3g::{
    STYLE_BOLD, STYLE_ITALIC, STYLE_STRIKETHROUGH, STYLE_UNDERLINED, StyleRecord, TextConfig,
    TextSample,
};
pub use utf::decode_text;
pub use vtt::{VttDocument, parse_vtt};

/// Detected input format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// SubRip.
    Srt,
    /// MicroDVD (frame-based `{start}{end}` lines).
    Sub,
    /// SubStation Alpha.
    Ssa,
    /// WebVTT.
    WebVtt,
    /// XML text-stream dump (`<TextStream>` root).
    Ttxt,
    /// W3C TTML.
    Ttml,
    /// Flash, handed to an external frame reader.
    SwfSvg,
    /// Unstructured text, one sample per line.
    Simple,
}

/// One parsed cue on the millisecond timeline, shared by the line-oriented
/// loaders.
#[derive(Debug, Clone, PartialEq)]
pub struct TextCue {
    /// Start time in milliseconds.
    pub start_ms: u64,
    /// End time in milliseconds.
    pub end_ms: u64,
    /// Cue text with markup stripped.
    pub text: String,
    /// Style modifiers with character ranges into `text`.
    pub styles: Vec<StyleRecord>,
}

/// Guesses the format from the decoded head of the file plus its extension.
#[must_use]
pub fn guess_format(head: &str, extension: Option<&str>) -> TextFormat {
    let line = head.trim_start_matches(['\n', '\r', '\t', ' ', '\u{feff}']);
    if line.starts_with('{') && line.contains("}{") {
        return TextFormat::Sub;
    }
    if line.starts_with('<') {
        if let Some(ext) = extension {
            if ext.eq_ignore_ascii_case("ttxt") {
                return TextFormat::Ttxt;
            }
            if ext.eq_ignore_ascii_case("ttml") {
                return TextFormat::Ttml;
            }
        }
        if line.contains("TextStream") {
            return TextFormat::Ttxt;
        }
        if line.contains("<tt ") || line.contains(":tt ") {
            return TextFormat::Ttml;
        }
        return TextFormat::Simple;
    }
    if line.starts_with("WEBVTT") {
        return TextFormat::WebVtt;
    }
    if line.contains(" --> ") {
        return TextFormat::Srt;
    }
    if line.starts_with("FWS") || line.starts_with("CWS") {
        return TextFormat::SwfSvg;
    }
    if line.starts_with("[Script Info]") {
        return TextFormat::Ssa;
    }
    TextFormat::Simple
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_probe() {
        assert_eq!(guess_format("{10}{25}Hello", None), TextFormat::Sub);
        assert_eq!(guess_format("WEBVTT\n\n", None), TextFormat::WebVtt);
        assert_eq!(
            guess_format("1\n00:00:01,000 --> 00:00:02,000\nHi\n", None),
            TextFormat::Srt
        );
        assert_eq!(guess_format("[Script Info]\n", None), TextFormat::Ssa);
        assert_eq!(guess_format("FWS\x05", None), TextFormat::SwfSvg);
        assert_eq!(
            guess_format("<?xml version=\"1.0\"?>\n<TextStream>", None),
            TextFormat::Ttxt
        );
        assert_eq!(
            guess_format("<tt xmlns=\"http://www.w3.org/ns/ttml\">", None),
            TextFormat::Ttml
        );
        assert_eq!(
            guess_format("<x/>", Some("ttml")),
            TextFormat::Ttml
        );
        assert_eq!(guess_format("plain text", None), TextFormat::Simple);
    }
}
