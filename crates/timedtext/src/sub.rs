//! MicroDVD `.sub` parsing: `{start_frame}{end_frame}text` lines with `|`
//! as the line separator, scaled to milliseconds by the frame rate.

use tracing::warn;

use crate::TextCue;

/// Parses a MicroDVD document. `fps` scales frame counts to time; callers
/// pass 25 when nothing better is known.
#[must_use]
pub fn parse_sub(input: &str, fps: f64) -> Vec<TextCue> {
    let ms_per_frame = 1000.0 / if fps > 0.0 { fps } else { 25.0 };
    let mut cues: Vec<TextCue> = Vec::new();
    let mut prev_end = 0u64;
    for (line_no, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some((sframe, eframe, text)) = split_braces(line) else {
            warn!(line = line_no + 1, "bad MicroDVD line, skipping");
            continue;
        };
        let mut start = (sframe as f64 * ms_per_frame) as u64;
        let end = (eframe as f64 * ms_per_frame) as u64;
        if start < prev_end {
            warn!(line = line_no + 1, "cue starts before previous end, clamping");
            start = prev_end;
        }
        if end < start {
            warn!(line = line_no + 1, "cue ends before it starts, skipping");
            continue;
        }
        cues.push(TextCue {
            start_ms: start,
            end_ms: end,
            text: text.replace('|', "\n"),
            styles: Vec::new(),
        });
        prev_end = end;
    }
    cues
}

fn split_braces(line: &str) -> Option<(u64, u64, &str)> {
    let rest = line.strip_prefix('{')?;
    let (sframe, rest) = rest.split_once('}')?;
    let rest = rest.strip_prefix('{')?;
    let (eframe, text) = rest.split_once('}')?;
    Some((sframe.parse().ok()?, eframe.parse().ok()?, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_scale_with_fps() {
        let cues = parse_sub("{25}{50}Hello|world\n{100}{125}Bye", 25.0);
        assert_eq!(cues.len(), 2);
        assert_eq!((cues[0].start_ms, cues[0].end_ms), (1000, 2000));
        assert_eq!(cues[0].text, "Hello\nworld");
        assert_eq!((cues[1].start_ms, cues[1].end_ms), (4000, 5000));
    }

    #[test]
    fn malformed_lines_skipped() {
        let cues = parse_sub("nonsense\n{10}{5}backwards\n{30}{40}ok", 25.0);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "ok");
    }
}
