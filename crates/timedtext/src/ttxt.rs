//! TTXT (XML text-stream dump) parsing: a `<TextStream>` root with one
//! `<TextSample>` per cue, each carrying a `sampleTime` and either a `text`
//! attribute or element text.

use media_types::{ImportError, Result};
use tracing::warn;

use crate::TextCue;

/// Result of parsing a TTXT document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TtxtDocument {
    /// Track width from the stream header.
    pub width: u32,
    /// Track height from the stream header.
    pub height: u32,
    /// The samples as cues; `end_ms` is the next sample's time (the last
    /// sample gets a zero-length window the importer may extend).
    pub cues: Vec<TextCue>,
}

fn parse_sample_time(value: &str) -> Option<u64> {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() == 3 {
        let (sec, ms) = parts[2].split_once('.').unwrap_or((parts[2], "0"));
        let h: u64 = parts[0].parse().ok()?;
        let m: u64 = parts[1].parse().ok()?;
        let s: u64 = sec.parse().ok()?;
        let ms: u64 = ms.parse().ok()?;
        return Some((h * 3600 + m * 60 + s) * 1000 + ms);
    }
    // seconds, possibly fractional
    value.parse::<f64>().ok().map(|s| (s * 1000.0) as u64)
}

/// Parses a TTXT document.
pub fn parse_ttxt(xml: &str) -> Result<TtxtDocument> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| ImportError::non_compliant(format!("TTXT parse error: {e}")))?;
    let root = doc.root_element();
    if root.tag_name().name() != "TextStream" {
        return Err(ImportError::non_compliant(format!(
            "\"TextStream\" root expected, got \"{}\"",
            root.tag_name().name()
        )));
    }
    let mut out = TtxtDocument::default();
    let mut samples: Vec<(u64, String)> = Vec::new();
    for node in root.children().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "TextStreamHeader" => {
                out.width = node
                    .attribute("width")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                out.height = node
                    .attribute("height")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
            }
            "TextSample" => {
                let Some(time) = node.attribute("sampleTime").and_then(parse_sample_time)
                else {
                    warn!("TextSample without sampleTime, skipping");
                    continue;
                };
                let text = node
                    .attribute("text")
                    .map(str::to_string)
                    .or_else(|| node.text().map(str::to_string))
                    .unwrap_or_default();
                samples.push((time, text));
            }
            _ => {}
        }
    }
    samples.sort_by_key(|(t, _)| *t);
    for i in 0..samples.len() {
        let end = samples
            .get(i + 1)
            .map(|(t, _)| *t)
            .unwrap_or(samples[i].0);
        out.cues.push(TextCue {
            start_ms: samples[i].0,
            end_ms: end,
            text: samples[i].1.clone(),
            styles: Vec::new(),
        });
    }
    Ok(out)
}
