/// Default video frame rate when nothing is detected or requested.
pub const DEFAULT_FPS: f64 = 25.0;

/// Sentinel FPS meaning "detect from the bitstream, else fall back to 25".
pub const AUTO_FPS: f64 = 10000.0;

/// Maps a frame rate to `(timescale, dts_increment)`.
///
/// Drop-frame rates keep their exact rational form so DTS stays integral:
/// 29.97 becomes 30000/1001, 23.976 becomes 24000/1001, 59.94 becomes
/// 60000/1001. Everything else uses a millifps timescale.
#[must_use]
pub fn video_timing(fps: f64) -> (u32, u32) {
    let fps_1000 = (fps * 1000.0 + 0.5) as u32;
    match fps_1000 {
        29970 => (30000, 1001),
        23976 => (24000, 1001),
        59940 => (60000, 1001),
        _ => (fps_1000, 1000),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_frame_rates() {
        assert_eq!(video_timing(29.97), (30000, 1001));
        assert_eq!(video_timing(23.976), (24000, 1001));
        assert_eq!(video_timing(59.94), (60000, 1001));
    }

    #[test]
    fn integral_rates() {
        assert_eq!(video_timing(25.0), (25000, 1000));
        assert_eq!(video_timing(30.0), (30000, 1000));
        assert_eq!(video_timing(15.0), (15000, 1000));
    }
}
