//! End-to-end tests over a synthetic program stream.

use bytes_util::BitWriter;
use mpegps::{PsDemuxer, TsUnits, write_pts};
use mpegvideo::PictureType;

/// MPEG-2 style pack header (14 bytes, no stuffing).
fn pack_header() -> Vec<u8> {
    vec![0, 0, 1, 0xBA, 0x44, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x03, 0xF8]
}

fn pes_packet(stream_id: u8, pts: u64, dts: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0, 0, 1, stream_id];
    let pes_len = 3 + 10 + payload.len();
    out.extend_from_slice(&(pes_len as u16).to_be_bytes());
    out.push(0x80); // MPEG-2 marker
    out.push(0xC0); // PTS + DTS
    out.push(10);
    out.extend_from_slice(&write_pts(0b0011, pts));
    out.extend_from_slice(&write_pts(0b0001, dts));
    out.extend_from_slice(payload);
    out
}

/// MPEG-1 sequence header, 352x288 at 25 fps.
fn seq_header() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bytes(&[0, 0, 1, 0xB3]);
    w.write_bits(352, 12).unwrap();
    w.write_bits(288, 12).unwrap();
    w.write_bits(2, 4).unwrap(); // 4:3
    w.write_bits(3, 4).unwrap(); // 25 fps
    w.write_bits(0x3FFFF, 18).unwrap();
    w.write_bit(true);
    w.write_bits(0, 13).unwrap();
    w.finish()
}

fn picture(temporal_ref: u16, ptype: u8) -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bytes(&[0, 0, 1, 0x00]);
    w.write_bits(temporal_ref as u64, 10).unwrap();
    w.write_bits(ptype as u64, 3).unwrap();
    w.write_bits(0xFFFF, 16).unwrap();
    w.write_bits(0, 3).unwrap();
    let mut v = w.finish();
    v.extend_from_slice(&[0xEE; 20]);
    v
}

/// One MP3 frame: MPEG-1 Layer III, 128 kbps, 44.1 kHz (417 bytes).
fn mp3_frame() -> Vec<u8> {
    let mut data = 0xFFFB_9000u32.to_be_bytes().to_vec();
    data.resize(417, 0xAA);
    data
}

const TICKS_PER_FRAME: u64 = 3600; // 25 fps at 90 kHz

/// Builds a PS with one video stream (0xE0) of `frames` pictures and,
/// optionally, an MP3 stream (0xC0). A pack header is emitted every
/// `pack_every` frames.
fn build_ps_packs(frames: u32, with_audio: bool, pack_every: u32) -> Vec<u8> {
    let mut out = Vec::new();
    let audio_frame = mp3_frame();
    let mut audio_ts = 0u64;
    for i in 0..frames {
        if i % pack_every == 0 {
            out.extend_from_slice(&pack_header());
        }
        let mut payload = Vec::new();
        if i == 0 {
            payload.extend_from_slice(&seq_header());
        }
        payload.extend_from_slice(&picture(i as u16 % 1024, if i % 25 == 0 { 1 } else { 2 }));
        let ts = i as u64 * TICKS_PER_FRAME;
        out.extend_from_slice(&pes_packet(0xE0, ts, ts, &payload));

        // interleave roughly one audio frame per video frame
        if with_audio {
            out.extend_from_slice(&pes_packet(0xC0, audio_ts, audio_ts, &audio_frame));
            audio_ts += 2351; // 1152 samples at 44.1 kHz in 90 kHz ticks
        }
    }
    // close the last picture
    out.extend_from_slice(&pes_packet(
        0xE0,
        frames as u64 * TICKS_PER_FRAME,
        frames as u64 * TICKS_PER_FRAME,
        &[0, 0, 1, 0xB7],
    ));
    out
}

fn build_ps(frames: u32, with_audio: bool) -> Vec<u8> {
    build_ps_packs(frames, with_audio, 25)
}

#[test]
fn probe_finds_streams_and_info() {
    let ps = PsDemuxer::from_bytes(build_ps(50, true)).unwrap();
    assert_eq!(ps.video_stream_count(), 1);
    assert_eq!(ps.audio_stream_count(), 1);

    let v = ps.video_info(0).unwrap();
    assert_eq!((v.width, v.height), (352, 288));
    assert_eq!(v.fps, 25.0);
    assert!(!v.is_mpeg2);

    let a = ps.audio_info(0).unwrap();
    assert_eq!(a.sample_rate, 44100);
    assert_eq!(a.channels, 2);
    assert_eq!(a.samples_per_frame, 1152);

    assert_eq!(ps.first_cts(), 0);
    // ~2 seconds of content
    assert!(ps.max_time_ms() >= 1900, "max time {}", ps.max_time_ms());
}

#[test]
fn video_frames_come_out_in_order() {
    let mut ps = PsDemuxer::from_bytes(build_ps(30, false)).unwrap();
    let mut last_dts = None;
    let mut count = 0;
    while let Some(frame) = ps.next_video_frame(0, TsUnits::Ticks90k).unwrap() {
        if let Some(prev) = last_dts {
            assert_eq!(frame.dts, prev + TICKS_PER_FRAME);
        }
        if count == 0 {
            assert_eq!(frame.picture_type, PictureType::I);
            // first frame carries the sequence header
            assert_eq!(&frame.data[..4], &[0, 0, 1, 0xB3]);
        }
        last_dts = Some(frame.dts);
        count += 1;
    }
    assert_eq!(count, 30);
}

#[test]
fn audio_frames_carry_pts() {
    let mut ps = PsDemuxer::from_bytes(build_ps(20, true)).unwrap();
    let first = ps.next_audio_frame(0, TsUnits::Ticks90k).unwrap().unwrap();
    assert_eq!(first.pts, 0);
    assert_eq!(first.data.len(), 417);
    let second = ps.next_audio_frame(0, TsUnits::Ticks90k).unwrap().unwrap();
    assert_eq!(second.pts, 2351);
}

#[test]
fn seek_lands_just_before_target() {
    // 120 seconds at 25 fps
    let mut ps = PsDemuxer::from_bytes(build_ps(3000, false)).unwrap();
    assert!(ps.seek_video(0, 60_000).unwrap());
    let frame = ps.next_video_frame(0, TsUnits::Millis).unwrap().unwrap();
    assert!(
        (59_000..=61_000).contains(&frame.dts),
        "seek landed at {} ms",
        frame.dts
    );
}

#[test]
fn begins_mid_pack_recovers() {
    let full = build_ps_packs(30, false, 5);
    // drop into the middle of the first PES: the scanner must find the next
    // pack start and carry on
    let damaged = full[21..].to_vec();
    let mut ps = PsDemuxer::from_bytes(damaged).unwrap();
    let mut count = 0;
    while ps.next_video_frame(0, TsUnits::Ticks90k).unwrap().is_some() {
        count += 1;
    }
    assert!(count >= 20, "only {count} frames recovered");
}
