use tracing::debug;

use crate::error::PsError;
use crate::index::RecordedPes;
use crate::stream::StreamState;
use crate::{CLOCK_90K, RECORD_MIN_GAP};

/// Positions `stream` so that frame reading resumes at (or just before)
/// `msec`. The caller then steps frames forward; for video it additionally
/// steps to the next I-frame before decoding.
pub fn seek_frame(stream: &mut StreamState, msec: u64, first_dts: u64) -> Result<bool, PsError> {
    stream.clear_buffer();

    // first second: just restart from the stream head
    if msec <= 1000 {
        stream.seek_to(stream.first_pes_loc)?;
        return Ok(true);
    }
    let target = msec * 90 + first_dts;

    match stream.index.search(target) {
        Some(rec) => {
            // within a second either way: snap to the anchor
            if rec.dts + CLOCK_90K >= target && rec.dts <= target + CLOCK_90K {
                stream.seek_to(rec.location)?;
                return Ok(true);
            }
            if rec.dts + RECORD_MIN_GAP < target {
                // more than five seconds short: narrow by interpolation
                let end = stream
                    .index
                    .successor(&rec)
                    .unwrap_or(RecordedPes {
                        dts: stream.end_dts,
                        location: stream.end_dts_loc,
                    });
                binary_seek(stream, target, rec.dts, rec.location, end.dts, end.location)?;
            } else {
                // between one and five seconds short: read linearly from it
                stream.seek_to(rec.location)?;
            }
        }
        None => {
            let (start_dts, start_loc) = (stream.start_dts, stream.first_pes_loc);
            let (end_dts, end_loc) = (stream.end_dts, stream.end_dts_loc);
            binary_seek(stream, target, start_dts, start_loc, end_dts, end_loc)?;
        }
    }

    // frame-by-frame up to the target
    stream.clear_buffer();
    loop {
        if !stream.find_frame()? {
            return Ok(false);
        }
        let msec_ts = stream.frame_ticks(first_dts) / 90;
        if msec_ts >= msec {
            return Ok(true);
        }
        stream.advance_frame();
    }
}

/// Interpolation-driven seek: place the cursor on a PES with a timestamp
/// within `[target - 5 s, target]`, approaching from below so the final
/// frame-stepping phase always moves forward.
fn binary_seek(
    stream: &mut StreamState,
    target: u64,
    mut start_dts: u64,
    mut start_loc: u64,
    mut end_dts: u64,
    mut end_loc: u64,
) -> Result<(), PsError> {
    loop {
        if end_dts <= start_dts || end_loc <= start_loc {
            return Ok(());
        }
        // percentage between the bounds, backed off to approach from below
        let mut perc = (target.saturating_sub(start_dts)) * 1000 / (end_dts - start_dts);
        perc -= perc % 10;
        let loc = start_loc + (end_loc - start_loc) * perc / 1000;
        if loc == start_loc || loc == end_loc {
            return Ok(());
        }

        stream.clear_buffer();
        stream.seek_to(loc)?;

        // next PES of this stream that carries a timestamp
        let found_loc;
        loop {
            let (found, at) = stream.search_next_pes(true)?;
            if !found {
                return Ok(());
            }
            if stream.next_pes_ts.any() {
                found_loc = at;
                break;
            }
            // payload already buffered, keep walking
            stream.buffer.clear();
        }
        let found_dts = stream
            .next_pes_ts
            .best(stream.is_video())
            .unwrap_or(start_dts);
        debug!(found_dts, found_loc, target, "binary seek probe");

        if found_dts + RECORD_MIN_GAP > target && found_dts < target {
            stream.seek_to(found_loc)?;
            return Ok(());
        }
        if found_dts > target {
            if found_dts >= end_dts {
                stream.seek_to(found_loc)?;
                return Ok(());
            }
            end_loc = found_loc;
            end_dts = found_dts;
        } else {
            if found_dts <= start_dts {
                stream.seek_to(found_loc)?;
                return Ok(());
            }
            start_loc = found_loc;
            start_dts = found_dts;
        }
    }
}
