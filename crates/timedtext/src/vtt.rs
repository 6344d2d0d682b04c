//! WebVTT parsing: the header block becomes the stream configuration, cue
//! blocks become timed samples with their payload kept verbatim.

use tracing::warn;

use crate::TextCue;

/// Result of parsing a WebVTT document.
#[derive(Debug, Clone, PartialEq)]
pub struct VttDocument {
    /// Everything from `WEBVTT` up to the first cue (stream config).
    pub header: String,
    /// The cues; `text` keeps cue payload markup verbatim.
    pub cues: Vec<TextCue>,
}

fn parse_vtt_clock(s: &str) -> Option<u64> {
    let s = s.trim();
    let (main, ms) = s.split_once('.')?;
    let ms: u64 = ms.parse().ok()?;
    let parts: Vec<&str> = main.split(':').collect();
    let (h, m, sec): (u64, u64, u64) = match parts.as_slice() {
        [h, m, s] => (h.parse().ok()?, m.parse().ok()?, s.parse().ok()?),
        [m, s] => (0u64, m.parse().ok()?, s.parse().ok()?),
        _ => return None,
    };
    Some((h * 3600 + m * 60 + sec) * 1000 + ms)
}

/// Parses a WebVTT document; input must start with the `WEBVTT` signature.
#[must_use]
pub fn parse_vtt(input: &str) -> Option<VttDocument> {
    let trimmed = input.trim_start_matches('\u{feff}');
    if !trimmed.starts_with("WEBVTT") {
        return None;
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    let mut header_end = lines.len();
    for (i, line) in lines.iter().enumerate() {
        if line.contains("-->") {
            // the header stops at the blank line before the first cue block
            header_end = lines[..i]
                .iter()
                .rposition(|l| l.trim().is_empty())
                .map(|p| p + 1)
                .unwrap_or(i);
            break;
        }
    }
    let header = lines[..header_end].join("\n");

    let mut cues = Vec::new();
    let mut i = header_end;
    while i < lines.len() {
        while i < lines.len() && lines[i].trim().is_empty() {
            i += 1;
        }
        if i >= lines.len() {
            break;
        }
        // optional cue identifier line
        let timing_line = if lines[i].contains("-->") {
            lines[i]
        } else {
            i += 1;
            match lines.get(i) {
                Some(l) if l.contains("-->") => *l,
                _ => {
                    warn!("cue block without timing line, skipping");
                    while i < lines.len() && !lines[i].trim().is_empty() {
                        i += 1;
                    }
                    continue;
                }
            }
        };
        let Some((left, right)) = timing_line.split_once("-->") else {
            i += 1;
            continue;
        };
        let start = parse_vtt_clock(left);
        let end = parse_vtt_clock(right.split_whitespace().next().unwrap_or(""));
        i += 1;
        let mut payload = Vec::new();
        while i < lines.len() && !lines[i].trim().is_empty() {
            payload.push(lines[i]);
            i += 1;
        }
        match (start, end) {
            (Some(start_ms), Some(end_ms)) if end_ms >= start_ms => {
                cues.push(TextCue {
                    start_ms,
                    end_ms,
                    text: payload.join("\n"),
                    styles: Vec::new(),
                });
            }
            _ => warn!(line = timing_line, "bad cue timing, skipping"),
        }
    }
    Some(VttDocument { header, cues })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "WEBVTT - test file\nNOTE a note\n\ncue-1\n00:00:01.000 --> 00:00:02.500 align:start\nHello <b>world</b>\n\n00:03.000 --> 00:04.000\nBye\n";

    #[test]
    fn header_and_cues() {
        let doc = parse_vtt(SAMPLE).unwrap();
        assert!(doc.header.starts_with("WEBVTT"));
        assert!(doc.header.contains("NOTE"));
        assert_eq!(doc.cues.len(), 2);
        assert_eq!((doc.cues[0].start_ms, doc.cues[0].end_ms), (1000, 2500));
        assert_eq!(doc.cues[0].text, "Hello <b>world</b>");
        assert_eq!(doc.cues[1].start_ms, 3000);
    }

    #[test]
    fn requires_signature() {
        assert!(parse_vtt("1\n00:00:01,000 --> 2\n").is_none());
    }
}
