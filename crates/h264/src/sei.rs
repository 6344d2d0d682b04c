/// Classification of an SEI NAL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeiInfo {
    /// A recovery point message is present. Recovery points are exposed as
    /// roll-recovery metadata, never as sync samples.
    pub recovery_point: bool,
}

impl SeiInfo {
    /// Walks the SEI messages of an unescaped SEI RBSP (NAL header
    /// included) and classifies them.
    #[must_use]
    pub fn parse(rbsp: &[u8]) -> SeiInfo {
        let mut info = SeiInfo::default();
        let mut pos = 1; // skip NAL header
        while pos < rbsp.len() {
            // payload type and size both use 0xFF run-length coding
            let mut payload_type = 0usize;
            while pos < rbsp.len() && rbsp[pos] == 0xFF {
                payload_type += 255;
                pos += 1;
            }
            if pos >= rbsp.len() {
                break;
            }
            payload_type += rbsp[pos] as usize;
            pos += 1;

            let mut payload_size = 0usize;
            while pos < rbsp.len() && rbsp[pos] == 0xFF {
                payload_size += 255;
                pos += 1;
            }
            if pos >= rbsp.len() {
                break;
            }
            payload_size += rbsp[pos] as usize;
            pos += 1;

            if payload_type == 6 {
                info.recovery_point = true;
            }
            pos += payload_size;
            // the rbsp trailing bits byte ends the message list
            if pos < rbsp.len() && rbsp[pos] == 0x80 {
                break;
            }
        }
        info
    }
}

/// Trims trailing zero padding from an SEI NAL payload.
///
/// Unregistered user-data messages are frequently padded with zero bytes
/// after the RBSP stop bit; dropping them shrinks the NAL without changing
/// any message. Returns the trimmed length (0 drops the NAL entirely).
#[must_use]
pub fn trim_sei_payload(nal: &[u8]) -> usize {
    let mut len = nal.len();
    while len > 1 && nal[len - 1] == 0x00 {
        len -= 1;
    }
    // nothing left but the header and a stop byte: drop the NAL
    if len <= 2 {
        return 0;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_point_detected() {
        // type 6, size 2, payload, stop
        let sei = [0x06, 0x06, 0x02, 0xAA, 0xBB, 0x80];
        assert!(SeiInfo::parse(&sei).recovery_point);

        // buffering period (type 0) only
        let sei = [0x06, 0x00, 0x01, 0xAA, 0x80];
        assert!(!SeiInfo::parse(&sei).recovery_point);
    }

    #[test]
    fn long_payload_type_coding() {
        // type = 255 + 5 + 255*0 = 260, not a recovery point
        let sei = [0x06, 0xFF, 0x05, 0x01, 0xCC, 0x80];
        assert!(!SeiInfo::parse(&sei).recovery_point);
    }

    #[test]
    fn padding_trim() {
        let sei = [0x06, 0x05, 0x02, 0xAA, 0xBB, 0x80, 0x00, 0x00, 0x00];
        assert_eq!(trim_sei_payload(&sei), 6);
        let empty = [0x06, 0x80, 0x00, 0x00];
        assert_eq!(trim_sei_payload(&empty), 0);
    }
}
