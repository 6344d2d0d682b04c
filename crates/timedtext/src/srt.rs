//! SubRip (SRT) parsing.

use tracing::warn;

use crate::TextCue;
use crate::tx3g::{
    STYLE_BOLD, STYLE_ITALIC, STYLE_STRIKETHROUGH, STYLE_UNDERLINED, StyleRecord,
};

const DEFAULT_COLOR: u32 = 0xFFFF_FFFF;

/// Parses `HH:MM:SS,mmm --> HH:MM:SS,mmm`; the comma may be a period and
/// the hours field may be absent.
fn parse_timing(line: &str) -> Option<(u64, u64)> {
    let (left, right) = line.split_once("-->")?;
    Some((parse_clock(left.trim())?, parse_clock(right.trim())?))
}

fn parse_clock(s: &str) -> Option<u64> {
    // strip cue settings after the timestamp
    let s = s.split_whitespace().next()?;
    let (main, ms) = s
        .split_once(',')
        .or_else(|| s.split_once('.'))
        .unwrap_or((s, "0"));
    let ms: u64 = ms.parse().ok()?;
    let parts: Vec<&str> = main.split(':').collect();
    let (h, m, sec): (u64, u64, u64) = match parts.as_slice() {
        [h, m, s] => (h.parse().ok()?, m.parse().ok()?, s.parse().ok()?),
        [m, s] => (0u64, m.parse().ok()?, s.parse().ok()?),
        _ => return None,
    };
    Some((h * 3600 + m * 60 + sec) * 1000 + ms)
}

/// Parses a named or `#RRGGBB[AA]` color into RGBA.
fn parse_color(value: &str) -> Option<u32> {
    let v = value.trim().trim_matches(['"', '\'']);
    if let Some(hex) = v.strip_prefix('#') {
        return match hex.len() {
            6 => u32::from_str_radix(hex, 16).ok().map(|r| (r << 8) | 0xFF),
            8 => u32::from_str_radix(hex, 16).ok(),
            _ => None,
        };
    }
    match v.to_ascii_lowercase().as_str() {
        "white" => Some(0xFFFF_FFFF),
        "black" => Some(0x0000_00FF),
        "red" => Some(0xFF00_00FF),
        "green" => Some(0x00FF_00FF),
        "blue" => Some(0x0000_FFFF),
        "yellow" => Some(0xFFFF_00FF),
        "cyan" => Some(0x00FF_FFFF),
        "magenta" => Some(0xFF00_FFFF),
        _ => None,
    }
}

#[derive(Clone, Copy)]
struct Composite {
    flags: u8,
    color: u32,
}

impl Composite {
    fn is_default(&self) -> bool {
        self.flags == 0 && self.color == DEFAULT_COLOR
    }
}

/// Incremental markup stripper: collects styled character ranges while
/// accumulating plain text. Char offsets count Unicode scalar values across
/// the whole sample, newlines included.
pub(crate) struct MarkupParser {
    pub text: String,
    pub styles: Vec<StyleRecord>,
    chars: usize,
    current: Composite,
    seg_start: usize,
}

impl MarkupParser {
    pub fn new() -> Self {
        MarkupParser {
            text: String::new(),
            styles: Vec::new(),
            chars: 0,
            current: Composite {
                flags: 0,
                color: DEFAULT_COLOR,
            },
            seg_start: 0,
        }
    }

    fn switch_to(&mut self, next: Composite) {
        if !self.current.is_default() && self.chars > self.seg_start {
            self.styles.push(StyleRecord {
                start_char: self.seg_start as u16,
                end_char: self.chars as u16,
                font_id: 1,
                style_flags: self.current.flags,
                font_size: 18,
                color: self.current.color,
            });
        }
        self.seg_start = self.chars;
        self.current = next;
    }

    pub fn push_newline(&mut self) {
        self.text.push('\n');
        self.chars += 1;
    }

    /// Feeds one line of cue text.
    pub fn push_line(&mut self, line: &str) {
        let mut rest = line;
        while let Some(open) = rest.find('<') {
            for c in rest[..open].chars() {
                self.text.push(c);
                self.chars += 1;
            }
            rest = &rest[open..];
            let Some(close) = rest.find('>') else {
                // unterminated tag: keep as literal text
                break;
            };
            let tag = &rest[1..close];
            rest = &rest[close + 1..];
            self.apply_tag(tag);
        }
        for c in rest.chars() {
            self.text.push(c);
            self.chars += 1;
        }
    }

    fn apply_tag(&mut self, tag: &str) {
        let lower = tag.to_ascii_lowercase();
        let mut next = self.current;
        match lower.as_str() {
            "b" => next.flags |= STYLE_BOLD,
            "i" => next.flags |= STYLE_ITALIC,
            "u" => next.flags |= STYLE_UNDERLINED,
            "s" | "strike" => next.flags |= STYLE_STRIKETHROUGH,
            "/b" => next.flags &= !STYLE_BOLD,
            "/i" => next.flags &= !STYLE_ITALIC,
            "/u" => next.flags &= !STYLE_UNDERLINED,
            "/s" | "/strike" => next.flags &= !STYLE_STRIKETHROUGH,
            "/font" => next.color = DEFAULT_COLOR,
            _ if lower.starts_with("font") => {
                if let Some(eq) = lower.find("color") {
                    let value = lower[eq + 5..].trim_start_matches([' ', '=']);
                    if let Some(color) = parse_color(value) {
                        next.color = color;
                    }
                }
            }
            // unknown tag: stripped, no style change
            _ => return,
        }
        self.switch_to(next);
    }

    /// Closes any open style and returns the accumulated sample parts.
    pub fn finish(mut self) -> (String, Vec<StyleRecord>) {
        let default = Composite {
            flags: 0,
            color: DEFAULT_COLOR,
        };
        self.switch_to(default);
        (self.text, self.styles)
    }
}

/// Parses a whole SRT document into cues.
///
/// Malformed index or timing lines produce warnings and resynchronize on
/// the next blank-line boundary; overlapping cues are clamped the way the
/// timeline requires (starts pulled up to the previous end, fully covered
/// cues dropped).
#[must_use]
pub fn parse_srt(input: &str) -> Vec<TextCue> {
    let mut cues: Vec<TextCue> = Vec::new();
    let lines: Vec<&str> = input.lines().collect();
    let mut i = 0usize;
    let mut cur_line = 0u64;
    let mut prev_end = 0u64;

    while i < lines.len() {
        // skip blank separators
        while i < lines.len() && lines[i].trim().is_empty() {
            i += 1;
        }
        if i >= lines.len() {
            break;
        }
        // cue index
        match lines[i].trim().parse::<u64>() {
            Ok(n) => {
                if n != cur_line + 1 {
                    warn!(got = n, after = cur_line, "non-sequential subtitle index");
                }
                cur_line = n;
                i += 1;
            }
            Err(_) => {
                warn!(line = lines[i], "expected cue index, resynchronizing");
                i += 1;
                continue;
            }
        }
        // timing line
        let Some(&timing_line) = lines.get(i) else { break };
        let Some((mut start, end)) = parse_timing(timing_line) else {
            warn!(line = timing_line, "bad cue timing, resynchronizing");
            continue;
        };
        i += 1;
        if start < prev_end {
            warn!(start, prev_end, "overlapping cue start, clamping");
            start = prev_end;
        }
        let drop = end <= prev_end && prev_end != 0;
        if drop {
            warn!(end, prev_end, "cue ends before previous cue, dropping");
        }

        // text lines until blank separator (or a blank run not followed by
        // a cue index, which is embedded blank text)
        let mut markup = MarkupParser::new();
        let mut text_lines = 0;
        while i < lines.len() {
            let line = lines[i];
            if line.trim().is_empty() {
                // lookahead: a following number line means the cue is over
                let mut j = i;
                let mut blanks = 0usize;
                while j < lines.len() && lines[j].trim().is_empty() {
                    blanks += 1;
                    j += 1;
                }
                if j >= lines.len() || lines[j].trim().parse::<u64>().is_ok() {
                    i = j.min(i + 1);
                    break;
                }
                for _ in 0..blanks {
                    markup.push_newline();
                }
                i = j;
                continue;
            }
            if text_lines > 0 {
                markup.push_newline();
            }
            markup.push_line(line);
            text_lines += 1;
            i += 1;
        }

        if !drop && text_lines > 0 {
            let (text, styles) = markup.finish();
            cues.push(TextCue {
                start_ms: start,
                end_ms: end,
                text,
                styles,
            });
            prev_end = end;
        }
    }
    cues
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str =
        "1\n00:00:01,000 --> 00:00:02,500\nHello, <b>world</b>.\n\n2\n00:00:03,000 --> 00:00:04,000\nBye.\n";

    #[test]
    fn happy_path_cues() {
        let cues = parse_srt(SAMPLE);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_ms, 1000);
        assert_eq!(cues[0].end_ms, 2500);
        assert_eq!(cues[0].text, "Hello, world.");
        assert_eq!(cues[0].styles.len(), 1);
        let style = cues[0].styles[0];
        assert_eq!((style.start_char, style.end_char), (7, 12));
        assert_eq!(style.style_flags, STYLE_BOLD);
        assert_eq!(cues[1].text, "Bye.");
        assert_eq!((cues[1].start_ms, cues[1].end_ms), (3000, 4000));
    }

    #[test]
    fn truncated_last_cue_is_kept() {
        let cues = parse_srt("1\n00:00:00,500 --> 00:00:01,000\nTail without blank line");
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Tail without blank line");
    }

    #[test]
    fn period_and_short_timings() {
        let cues = parse_srt("1\n00:01.250 --> 00:02.000\nA\n");
        assert_eq!(cues[0].start_ms, 1250);
        assert_eq!(cues[0].end_ms, 2000);
    }

    #[test]
    fn overlap_clamping_and_drop() {
        let input = "1\n00:00:01,000 --> 00:00:03,000\nA\n\n2\n00:00:02,000 --> 00:00:04,000\nB\n\n3\n00:00:01,000 --> 00:00:02,000\nC\n";
        let cues = parse_srt(input);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].start_ms, 3000); // clamped to previous end
        assert_eq!(cues[1].end_ms, 4000);
        // third cue ends before previous end: dropped
    }

    #[test]
    fn bad_index_resyncs() {
        let input = "oops\n1\n00:00:01,000 --> 00:00:02,000\nFine\n";
        let cues = parse_srt(input);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].text, "Fine");
    }

    #[test]
    fn font_color_tag() {
        let cues = parse_srt("1\n00:00:01,000 --> 00:00:02,000\n<font color=\"#FF0000\">red</font> x\n");
        assert_eq!(cues[0].text, "red x");
        assert_eq!(cues[0].styles.len(), 1);
        assert_eq!(cues[0].styles[0].color, 0xFF00_00FF);
        assert_eq!((cues[0].styles[0].start_char, cues[0].styles[0].end_char), (0, 3));
    }

    #[test]
    fn multi_line_offsets_span_newline() {
        let cues = parse_srt("1\n00:00:01,000 --> 00:00:02,000\nab\n<i>cd</i>\n");
        // "ab\ncd": italic covers chars 3..5
        assert_eq!(cues[0].text, "ab\ncd");
        assert_eq!((cues[0].styles[0].start_char, cues[0].styles[0].end_char), (3, 5));
        assert_eq!(cues[0].styles[0].style_flags, STYLE_ITALIC);
    }
}
