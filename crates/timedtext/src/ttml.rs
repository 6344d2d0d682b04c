//! TTML loading: clock grammar, interval construction, per-interval
//! document splitting, timestamp rebasing and resource embedding.
//!
//! The DOM collaborator is read-only, so per-interval documents are produced
//! by text surgery on the original serialization: paragraph nodes outside
//! the interval are cut by byte range, rewritten attributes (rebased
//! `begin`/`end`, embedded `src`) are spliced in place. That mirrors the
//! clone-and-strip approach of DOM-based loaders without a mutable tree.

use std::ops::Range;
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use media_types::{ImportError, Result};
use roxmltree::Node;
use tracing::{debug, warn};

/// The TTML namespace required on the root element.
pub const TTML_NAMESPACE: &str = "http://www.w3.org/ns/ttml";

/// Frame/tick context for the clock grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockContext {
    /// `ttp:tickRate`.
    pub tick_rate: u32,
    /// `ttp:frameRate` numerator (with multiplier applied).
    pub fps_num: u32,
    /// `ttp:frameRate` denominator.
    pub fps_den: u32,
    /// `ttp:subFrameRate`.
    pub sub_fps: u32,
}

/// Parses a TTML time expression to milliseconds.
///
/// Supported: `HH:MM:SS.fff`, `HH:MM:SS`, `HH:MM:SS:FF`, `HH:MM:SS:FF.SF`,
/// and the metric forms `NNt`, `NNh`, `NNm`, `NNs`, `NNms`, `NNf`, `NNf.sf`.
#[must_use]
pub fn parse_clock(value: &str, ctx: &mut ClockContext) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(ticks) = value.strip_suffix('t') {
        let t: i64 = ticks.parse().ok()?;
        let ms = t * 1000;
        return Some(if ctx.tick_rate != 0 {
            ms / ctx.tick_rate as i64
        } else {
            ms
        });
    }
    if let Some(ms) = value.strip_suffix("ms") {
        return Some(ms.parse::<f64>().ok()? as i64);
    }
    if let Some(h) = value.strip_suffix('h') {
        return Some((h.parse::<f64>().ok()? * 3_600_000.0) as i64);
    }
    if let Some(m) = value.strip_suffix('m') {
        return Some((m.parse::<f64>().ok()? * 60_000.0) as i64);
    }
    if let Some(s) = value.strip_suffix('s') {
        return Some((s.parse::<f64>().ok()? * 1000.0) as i64);
    }
    if let Some(f) = value.strip_suffix('f') {
        let (frames, sub) = f.split_once('.').unwrap_or((f, "0"));
        let frames: i64 = frames.parse().ok()?;
        let sub: i64 = sub.parse().ok()?;
        if ctx.fps_num == 0 {
            warn!("frame metric without frameRate, assuming 25 fps");
            ctx.fps_num = 25;
            ctx.fps_den = 1;
        }
        if sub != 0 && ctx.sub_fps == 0 {
            warn!("subframe metric without subFrameRate, assuming 1");
            ctx.sub_fps = 1;
        }
        let mut ms = 1000 * frames * ctx.fps_den as i64 / ctx.fps_num as i64;
        if sub != 0 {
            ms += 1000 * sub * ctx.fps_den as i64 / ctx.sub_fps as i64 / ctx.fps_num as i64;
        }
        return Some(ms);
    }

    let parts: Vec<&str> = value.split(':').collect();
    match parts.as_slice() {
        [h, m, s] => {
            let (sec, frac) = s.split_once('.').unwrap_or((s, ""));
            let mut ms = (h.parse::<i64>().ok()? * 3600
                + m.parse::<i64>().ok()? * 60
                + sec.parse::<i64>().ok()?)
                * 1000;
            if !frac.is_empty() {
                let scale = 10i64.pow(frac.len().min(3) as u32);
                ms += frac[..frac.len().min(3)].parse::<i64>().ok()? * 1000 / scale;
            }
            Some(ms)
        }
        [h, m, s, f] => {
            let mut ms = (h.parse::<i64>().ok()? * 3600
                + m.parse::<i64>().ok()? * 60
                + s.parse::<i64>().ok()?)
                * 1000;
            let (frames, sub) = f.split_once('.').unwrap_or((f, "0"));
            let frames: i64 = frames.parse().ok()?;
            let sub: i64 = sub.parse().ok()?;
            if ctx.fps_num == 0 {
                warn!("frame digits without frameRate, assuming 25 fps");
                ctx.fps_num = 25;
                ctx.fps_den = 1;
            }
            ms += 1000 * frames * ctx.fps_den as i64 / ctx.fps_num as i64;
            if sub != 0 {
                if ctx.sub_fps == 0 {
                    ctx.sub_fps = 1;
                }
                ms += 1000 * sub * ctx.fps_den as i64 / ctx.sub_fps as i64 / ctx.fps_num as i64;
            }
            Some(ms)
        }
        _ => None,
    }
}

fn format_clock(ms: i64) -> String {
    let v = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        v / 3600,
        (v / 60) % 60,
        v % 60,
        ms % 1000
    )
}

/// One media-time window covered by a single output sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtmlInterval {
    /// Window start in milliseconds.
    pub begin_ms: i64,
    /// Window end in milliseconds.
    pub end_ms: i64,
    /// Indices into the document resource list carried by this interval
    /// (head resources first, then per-cue ones).
    pub resources: Vec<usize>,
}

/// One output sample.
#[derive(Debug, Clone, PartialEq)]
pub struct TtmlSample {
    /// Window start in milliseconds.
    pub begin_ms: u64,
    /// Window end in milliseconds.
    pub end_ms: u64,
    /// Serialized document restricted to this window.
    pub xml: String,
    /// Resource payloads to append as subsamples.
    pub resources: Vec<Vec<u8>>,
}

/// Options controlling TTML loading.
#[derive(Debug, Clone, Default)]
pub struct TtmlLoadOptions {
    /// Split overlapping windows into distinct samples.
    pub split: bool,
    /// Embed referenced/inlined resources.
    pub embed: bool,
    /// Media time mapped to zero (clock grammar, optional leading `T`).
    pub zero: Option<String>,
    /// Directory for resolving relative resource references.
    pub base_dir: Option<std::path::PathBuf>,
}

/// A loaded TTML document, split into intervals.
#[derive(Debug, Clone, Default)]
pub struct TtmlDocument {
    /// `xml:lang` of the root, when present.
    pub language: Option<String>,
    /// Sorted, pairwise disjoint (split mode) intervals.
    pub intervals: Vec<TtmlInterval>,
    /// One sample per interval.
    pub samples: Vec<TtmlSample>,
    /// Whether any resource was embedded.
    pub has_images: bool,
}

#[derive(Debug, Clone)]
struct Cue {
    begin: i64,
    end: i64,
    node_range: Range<usize>,
}

#[derive(Debug, Clone)]
struct Edit {
    range: Range<usize>,
    replacement: String,
}

/// Does the cue window `(begin, end)` contribute to `interval`?
///
/// Bounded cues contribute when they cover the whole interval (split mode
/// cuts intervals at every cue boundary, so partial overlap cannot happen);
/// cues missing one bound fall back to one-sided checks.
fn cue_in_interval(interval: &TtmlInterval, begin: i64, end: i64) -> bool {
    if begin != -1 && end != -1 {
        begin <= interval.begin_ms && end >= interval.end_ms
    } else if begin == -1 && end != -1 {
        end >= interval.end_ms
    } else if begin != -1 && end == -1 {
        begin <= interval.begin_ms
    } else {
        false
    }
}

/// Builds the interval set from cue windows.
///
/// Split mode cuts the timeline at every distinct cue boundary, keeping the
/// elementary windows covered by at least one cue: overlapping cues
/// `[0,2]` and `[1,3]` yield `[0,1) [1,2) [2,3)`. Union mode produces one
/// interval spanning everything.
fn build_intervals(windows: &[(i64, i64)], split: bool) -> Vec<TtmlInterval> {
    let bounded: Vec<(i64, i64)> = windows
        .iter()
        .copied()
        .filter(|(b, e)| *b != -1 && *e != -1)
        .collect();
    if bounded.is_empty() {
        return Vec::new();
    }
    if !split {
        let begin = bounded.iter().map(|(b, _)| *b).min().unwrap_or(0);
        let end = bounded.iter().map(|(_, e)| *e).max().unwrap_or(0);
        return vec![TtmlInterval {
            begin_ms: begin,
            end_ms: end,
            resources: Vec::new(),
        }];
    }
    let mut bounds: Vec<i64> = bounded.iter().flat_map(|(b, e)| [*b, *e]).collect();
    bounds.sort_unstable();
    bounds.dedup();
    let mut intervals = Vec::new();
    for pair in bounds.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if bounded.iter().any(|(b, e)| *b <= lo && *e >= hi) {
            intervals.push(TtmlInterval {
                begin_ms: lo,
                end_ms: hi,
                resources: Vec::new(),
            });
        }
    }
    intervals
}

fn timing_of(node: Node<'_, '_>, ctx: &mut ClockContext) -> (i64, i64) {
    let begin = node
        .attribute("begin")
        .and_then(|v| parse_clock(v, ctx))
        .unwrap_or(-1);
    let end = node
        .attribute("end")
        .and_then(|v| parse_clock(v, ctx))
        .unwrap_or(-1);
    (begin, end)
}

/// Replaces `attr="old"` inside the opening tag of `node` with a new value.
fn attr_edit(
    xml: &str,
    node: Node<'_, '_>,
    attr: &str,
    old_value: &str,
    new_value: &str,
) -> Option<Edit> {
    let node_range = node.range();
    let tag_end = xml[node_range.clone()].find('>')? + node_range.start;
    let tag = &xml[node_range.start..tag_end];
    let attr_pos = tag.find(attr)?;
    let rel = tag[attr_pos..].find(old_value)?;
    let start = node_range.start + attr_pos + rel;
    Some(Edit {
        range: start..start + old_value.len(),
        replacement: new_value.to_string(),
    })
}

struct Loader<'a> {
    xml: &'a str,
    opts: &'a TtmlLoadOptions,
    ctx: ClockContext,
    resources: Vec<Vec<u8>>,
    global_resources: Vec<usize>,
    edits: Vec<Edit>,
    has_images: bool,
}

impl<'a> Loader<'a> {
    fn load_resource(&self, src: &str) -> Option<Vec<u8>> {
        let path = src.strip_prefix("file://").unwrap_or(src);
        if path.contains("://") {
            return None;
        }
        let resolved = match &self.opts.base_dir {
            Some(dir) if !Path::new(path).is_absolute() => dir.join(path),
            _ => Path::new(path).to_path_buf(),
        };
        match std::fs::read(&resolved) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(path = %resolved.display(), error = %e, "cannot load TTML resource");
                None
            }
        }
    }

    /// Recursively embeds resources referenced under `node`, registering the
    /// attribute rewrites. Returns resource indices in discovery order.
    fn push_resources(&mut self, node: Node<'_, '_>, out: &mut Vec<usize>, base_count: usize) {
        if !self.opts.embed {
            return;
        }
        let name = node.tag_name().name();
        if name == "chunk" {
            return;
        }
        let check_src = matches!(name, "source" | "data" | "audio" | "font" | "image");
        if check_src {
            if let Some(src) = node.attribute("src") {
                if !src.starts_with('#')
                    && (src.starts_with("file://") || !src.contains("://"))
                {
                    if let Some(data) = self.load_resource(src) {
                        self.resources.push(data);
                        out.push(self.resources.len() - 1);
                        let urn = format!("urn:mpeg:14496-30:{}", base_count + out.len());
                        if let Some(edit) = attr_edit(self.xml, node, "src", src, &urn) {
                            self.edits.push(edit);
                        }
                        self.has_images = true;
                    }
                }
            }
        }
        // base64 <data> children of a <source>
        if name == "data" && is_parent_source(node) {
            if let Some(text) = node.text() {
                let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                if let Ok(data) = BASE64.decode(cleaned.as_bytes()) {
                    self.resources.push(data);
                    out.push(self.resources.len() - 1);
                    let urn = format!("urn:mpeg:14496-30:{}", base_count + out.len());
                    if let Some(parent) = node.parent() {
                        // replace the whole <source> element with a reference
                        let data_type = node.attribute("type").unwrap_or("");
                        let type_attr = if data_type.is_empty() {
                            String::new()
                        } else {
                            format!(" type=\"{data_type}\"")
                        };
                        self.edits.push(Edit {
                            range: parent.range(),
                            replacement: format!("<source src=\"{urn}\"{type_attr}/>"),
                        });
                    }
                    self.has_images = true;
                    return;
                }
            }
        }
        for child in node.children().filter(|c| c.is_element()) {
            self.push_resources(child, out, base_count);
        }
    }
}

fn is_parent_source(node: Node<'_, '_>) -> bool {
    node.parent()
        .map(|p| p.tag_name().name() == "source")
        .unwrap_or(false)
}

/// Loads a TTML document and splits it into interval samples.
pub fn load_ttml(xml: &str, opts: &TtmlLoadOptions) -> Result<TtmlDocument> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| ImportError::non_compliant(format!("TTML parse error: {e}")))?;
    let root = doc.root_element();
    if root.tag_name().name() != "tt" {
        return Err(ImportError::non_compliant(format!(
            "\"tt\" root expected, got \"{}\"",
            root.tag_name().name()
        )));
    }
    if let Some(ns) = root.tag_name().namespace() {
        if ns != TTML_NAMESPACE {
            return Err(ImportError::non_compliant(format!(
                "unexpected TTML namespace {ns}"
            )));
        }
    }

    let mut ctx = ClockContext::default();
    let mut language = None;
    for attr in root.attributes() {
        match attr.name() {
            "lang" => language = Some(attr.value().to_string()),
            "tickRate" => ctx.tick_rate = attr.value().parse().unwrap_or(0),
            "frameRate" => {
                ctx.fps_num = attr.value().parse().unwrap_or(0);
                ctx.fps_den = 1;
            }
            "frameRateMultiplier" => {
                let mut parts = attr.value().split_whitespace();
                if let (Some(num), Some(den)) = (parts.next(), parts.next()) {
                    let num: u32 = num.parse().unwrap_or(1);
                    let den: u32 = den.parse().unwrap_or(1);
                    if ctx.fps_num != 0 && den != 0 {
                        ctx.fps_num *= num;
                        ctx.fps_den = den;
                    }
                }
            }
            "subFrameRate" => ctx.sub_fps = attr.value().parse().unwrap_or(0),
            _ => {}
        }
    }

    let zero_ms = match &opts.zero {
        Some(z) => {
            let stripped = z.strip_prefix('T').unwrap_or(z);
            parse_clock(stripped, &mut ctx).unwrap_or(0)
        }
        None => 0,
    };

    let mut loader = Loader {
        xml,
        opts,
        ctx,
        resources: Vec::new(),
        global_resources: Vec::new(),
        edits: Vec::new(),
        has_images: false,
    };

    // head resources are shared by every interval
    if let Some(head) = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "head")
    {
        let mut globals = Vec::new();
        loader.push_resources(head, &mut globals, 0);
        loader.global_resources = globals;
    }

    // collect cues (p under body/div, with span timing folded in)
    let body = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "body");
    let mut cues: Vec<Cue> = Vec::new();
    let mut windows: Vec<(i64, i64)> = Vec::new();
    let mut cue_resources: Vec<(usize, Vec<usize>)> = Vec::new();

    if let Some(body) = body {
        let divs: Vec<Node> = body
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "div")
            .collect();
        for div in &divs {
            for p in div
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "p")
            {
                let mut ctx2 = loader.ctx;
                let (mut begin, mut end) = timing_of(p, &mut ctx2);
                loader.ctx = ctx2;
                let mut drop = false;
                if zero_ms != 0 {
                    for (value, attr) in [(&mut begin, "begin"), (&mut end, "end")] {
                        if *value == -1 {
                            continue;
                        }
                        if *value < zero_ms {
                            drop = true;
                        } else {
                            *value -= zero_ms;
                            if let Some(old) = p.attribute(attr) {
                                if let Some(edit) =
                                    attr_edit(xml, p, attr, old, &format_clock(*value))
                                {
                                    loader.edits.push(edit);
                                }
                            }
                        }
                    }
                }
                if drop {
                    loader.edits.push(Edit {
                        range: p.range(),
                        replacement: String::new(),
                    });
                    continue;
                }
                if end != -1 && begin != -1 && end < begin {
                    return Err(ImportError::non_compliant(format!(
                        "invalid cue timings begin={begin} end={end}"
                    )));
                }
                windows.push((begin, end));

                // span-level timing opens windows of its own
                for span in p
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "span")
                {
                    let mut ctx3 = loader.ctx;
                    let (s_begin, s_end) = timing_of(span, &mut ctx3);
                    loader.ctx = ctx3;
                    if s_begin != -1 || s_end != -1 {
                        windows.push((s_begin, s_end));
                    }
                }

                let cue_idx = cues.len();
                cues.push(Cue {
                    begin,
                    end,
                    node_range: p.range(),
                });
                let mut own = Vec::new();
                let base = loader.global_resources.len();
                loader.push_resources(p, &mut own, base);
                if !own.is_empty() {
                    cue_resources.push((cue_idx, own));
                }
            }
        }
    }

    let mut intervals = build_intervals(&windows, opts.split);
    if intervals.is_empty() {
        intervals.push(TtmlInterval {
            begin_ms: 0,
            end_ms: 0,
            resources: Vec::new(),
        });
    }

    // every interval carries the head resources plus those of its cues;
    // union mode has a single interval carrying everything
    for interval in &mut intervals {
        interval.resources = loader.global_resources.clone();
    }
    for (cue_idx, own) in &cue_resources {
        let cue = &cues[*cue_idx];
        for interval in &mut intervals {
            if !opts.split || cue_in_interval(interval, cue.begin, cue.end) {
                interval.resources.extend_from_slice(own);
            }
        }
    }

    for interval in &intervals {
        debug!(begin = interval.begin_ms, end = interval.end_ms, "TTML interval");
    }

    // build one sample per interval; split mode cuts out-of-window cues,
    // union mode keeps every surviving cue in its single sample
    let mut samples = Vec::new();
    for interval in &intervals {
        let mut edits = loader.edits.clone();
        if opts.split {
            for cue in &cues {
                if cue_in_interval(interval, cue.begin, cue.end) {
                    continue;
                }
                edits.push(Edit {
                    range: cue.node_range.clone(),
                    replacement: String::new(),
                });
            }
        }
        let serialized = apply_edits(xml, edits);
        samples.push(TtmlSample {
            begin_ms: interval.begin_ms.max(0) as u64,
            end_ms: interval.end_ms.max(0) as u64,
            xml: serialized,
            resources: interval
                .resources
                .iter()
                .map(|&i| loader.resources[i].clone())
                .collect(),
        });
    }

    Ok(TtmlDocument {
        language,
        intervals,
        samples,
        has_images: loader.has_images,
    })
}

/// Applies non-nested edits back to front; edits nested inside a removal are
/// dropped.
fn apply_edits(xml: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.range.start, std::cmp::Reverse(e.range.end)));
    let mut filtered: Vec<Edit> = Vec::new();
    for edit in edits {
        if let Some(last) = filtered.last() {
            if edit.range.start < last.range.end {
                continue; // nested or overlapping with an earlier cut
            }
        }
        filtered.push(edit);
    }
    let mut out = xml.to_string();
    for edit in filtered.into_iter().rev() {
        out.replace_range(edit.range, &edit.replacement);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> String {
        format!(
            "<tt xmlns=\"http://www.w3.org/ns/ttml\" xml:lang=\"en\"><body><div>{body}</div></body></tt>"
        )
    }

    #[test]
    fn clock_grammar() {
        let mut ctx = ClockContext::default();
        assert_eq!(parse_clock("00:00:02.500", &mut ctx), Some(2500));
        assert_eq!(parse_clock("01:00:00", &mut ctx), Some(3_600_000));
        assert_eq!(parse_clock("1.5s", &mut ctx), Some(1500));
        assert_eq!(parse_clock("2m", &mut ctx), Some(120_000));
        assert_eq!(parse_clock("1h", &mut ctx), Some(3_600_000));
        assert_eq!(parse_clock("1500ms", &mut ctx), Some(1500));
        ctx.tick_rate = 90000;
        assert_eq!(parse_clock("90000t", &mut ctx), Some(1000));
        ctx.fps_num = 25;
        ctx.fps_den = 1;
        assert_eq!(parse_clock("50f", &mut ctx), Some(2000));
        assert_eq!(parse_clock("00:00:01:05", &mut ctx), Some(1200));
    }

    #[test]
    fn split_mode_three_intervals() {
        let xml = doc(
            "<p begin=\"0s\" end=\"2s\">A</p><p begin=\"1s\" end=\"3s\">B</p>",
        );
        let out = load_ttml(
            &xml,
            &TtmlLoadOptions {
                split: true,
                ..Default::default()
            },
        )
        .unwrap();
        // every distinct overlapping window becomes its own sample
        let bounds: Vec<(i64, i64)> = out
            .intervals
            .iter()
            .map(|iv| (iv.begin_ms, iv.end_ms))
            .collect();
        assert_eq!(bounds, vec![(0, 1000), (1000, 2000), (2000, 3000)]);
        // intervals are pairwise disjoint and sorted
        for pair in out.intervals.windows(2) {
            assert!(pair[0].end_ms <= pair[1].begin_ms);
        }
        // first carries only A, middle both, last only B
        assert!(out.samples[0].xml.contains(">A<") && !out.samples[0].xml.contains(">B<"));
        assert!(out.samples[1].xml.contains(">A<") && out.samples[1].xml.contains(">B<"));
        assert!(!out.samples[2].xml.contains(">A<") && out.samples[2].xml.contains(">B<"));
    }

    #[test]
    fn split_mode_disjoint_cues() {
        let xml = doc(
            "<p begin=\"0s\" end=\"1s\">A</p><p begin=\"2s\" end=\"3s\">B</p>",
        );
        let out = load_ttml(
            &xml,
            &TtmlLoadOptions {
                split: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(out.intervals.len(), 2);
        assert!(out.samples[0].xml.contains(">A<"));
        assert!(!out.samples[0].xml.contains(">B<"));
        assert!(out.samples[1].xml.contains(">B<"));
        assert!(!out.samples[1].xml.contains(">A<"));
    }

    #[test]
    fn union_mode_single_sample() {
        let xml = doc(
            "<p begin=\"0s\" end=\"2s\">A</p><p begin=\"1s\" end=\"3s\">B</p>",
        );
        let out = load_ttml(&xml, &TtmlLoadOptions::default()).unwrap();
        assert_eq!(out.intervals.len(), 1);
        assert_eq!((out.intervals[0].begin_ms, out.intervals[0].end_ms), (0, 3000));
        assert!(out.samples[0].xml.contains(">A<"));
        assert!(out.samples[0].xml.contains(">B<"));
    }

    #[test]
    fn zero_rebase_drops_and_rewrites() {
        let xml = doc(
            "<p begin=\"00:00:01.000\" end=\"00:00:02.000\">early</p><p begin=\"00:00:10.000\" end=\"00:00:12.000\">late</p>",
        );
        let out = load_ttml(
            &xml,
            &TtmlLoadOptions {
                zero: Some("00:00:05.000".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(out.intervals.len(), 1);
        assert_eq!(out.intervals[0].begin_ms, 5000);
        assert!(!out.samples[0].xml.contains("early"));
        assert!(out.samples[0].xml.contains("begin=\"00:00:05.000\""));
        assert!(out.samples[0].xml.contains("end=\"00:00:07.000\""));
    }

    #[test]
    fn wrong_namespace_rejected() {
        let xml = "<tt xmlns=\"http://example.com\"><body/></tt>";
        assert!(load_ttml(xml, &TtmlLoadOptions::default()).is_err());
    }

    #[test]
    fn empty_document_single_interval() {
        let xml = "<tt xmlns=\"http://www.w3.org/ns/ttml\"><body/></tt>";
        let out = load_ttml(xml, &TtmlLoadOptions::default()).unwrap();
        assert_eq!(out.intervals.len(), 1);
        assert_eq!((out.intervals[0].begin_ms, out.intervals[0].end_ms), (0, 0));
    }

    #[test]
    fn base64_data_embedding() {
        let payload = BASE64.encode(b"PNGDATA");
        let xml = format!(
            "<tt xmlns=\"http://www.w3.org/ns/ttml\"><head><source><data type=\"image/png\">{payload}</data></source></head><body><div><p begin=\"0s\" end=\"1s\">A</p></div></body></tt>"
        );
        let out = load_ttml(
            &xml,
            &TtmlLoadOptions {
                embed: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(out.has_images);
        assert_eq!(out.samples[0].resources.len(), 1);
        assert_eq!(out.samples[0].resources[0], b"PNGDATA");
        assert!(out.samples[0].xml.contains("urn:mpeg:14496-30:1"));
        assert!(!out.samples[0].xml.contains(&payload));
    }
}
