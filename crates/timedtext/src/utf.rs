/// Decodes subtitle file bytes to UTF-8.
///
/// Honors UTF-8, UTF-16LE and UTF-16BE byte order marks; BOM-less input is
/// taken as UTF-8 when valid, otherwise as an 8-bit codepage mapped byte to
/// code point (the common case for legacy Windows subtitle files).
#[must_use]
pub fn decode_text(data: &[u8]) -> String {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(&data[3..]).into_owned();
    }
    if data.starts_with(&[0xFF, 0xFE]) {
        return decode_utf16(&data[2..], true);
    }
    if data.starts_with(&[0xFE, 0xFF]) {
        return decode_utf16(&data[2..], false);
    }
    match std::str::from_utf8(data) {
        Ok(s) => s.to_string(),
        Err(_) => data.iter().map(|&b| b as char).collect(),
    }
}

fn decode_utf16(data: &[u8], little_endian: bool) -> String {
    let units: Vec<u16> = data
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bom_dispatch() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFhi"), "hi");
        assert_eq!(decode_text(&[0xFF, 0xFE, b'h', 0, b'i', 0]), "hi");
        assert_eq!(decode_text(&[0xFE, 0xFF, 0, b'h', 0, b'i']), "hi");
        assert_eq!(decode_text(b"plain"), "plain");
    }

    #[test]
    fn latin1_fallback() {
        // 0xE9 is not valid UTF-8 on its own; mapped as U+00E9
        assert_eq!(decode_text(b"caf\xE9"), "caf\u{e9}");
    }
}
