//! SubStation Alpha parsing: `[Events]` section `Dialogue:` lines with
//! `h:mm:ss.cc` timing, override blocks stripped, `\N` as line break.

use tracing::warn;

use crate::TextCue;

fn parse_ssa_clock(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    let (h, m, rest) = match parts.as_slice() {
        [h, m, rest] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *rest),
        [m, rest] => (0, m.parse::<u64>().ok()?, *rest),
        _ => return None,
    };
    let (sec, cs) = rest.split_once('.').unwrap_or((rest, "0"));
    let sec: u64 = sec.parse().ok()?;
    let cs: u64 = cs.parse().ok()?;
    // centiseconds in the classic format
    Some((h * 3600 + m * 60 + sec) * 1000 + cs * 10)
}

fn strip_overrides(text: &str) -> String {
    let mut out = String::new();
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.replace("\\N", "\n").replace("\\n", "\n")
}

/// Parses an SSA/ASS document, keeping only `Dialogue:` events.
#[must_use]
pub fn parse_ssa(input: &str) -> Vec<TextCue> {
    let mut cues: Vec<TextCue> = Vec::new();
    for raw in input.lines() {
        let line = raw.trim();
        let Some(event) = line.strip_prefix("Dialogue:") else {
            continue;
        };
        // Format: Marked, Start, End, Style, Name, MarginL, MarginR,
        // MarginV, Effect, Text (text may contain commas)
        let fields: Vec<&str> = event.splitn(10, ',').collect();
        if fields.len() < 10 {
            warn!(line, "short Dialogue line, skipping");
            continue;
        }
        let (Some(start), Some(end)) = (parse_ssa_clock(fields[1]), parse_ssa_clock(fields[2]))
        else {
            warn!(line, "bad Dialogue timing, skipping");
            continue;
        };
        if end < start {
            continue;
        }
        cues.push(TextCue {
            start_ms: start,
            end_ms: end,
            text: strip_overrides(fields[9].trim()),
            styles: Vec::new(),
        });
    }
    cues.sort_by_key(|c| c.start_ms);
    cues
}
