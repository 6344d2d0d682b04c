//! 3GPP timed text (TX3G) sample description and sample serialization.

/// Bold face flag.
pub const STYLE_BOLD: u8 = 1;
/// Italic face flag.
pub const STYLE_ITALIC: u8 = 2;
/// Underline face flag.
pub const STYLE_UNDERLINED: u8 = 4;
/// Strike-through face flag.
pub const STYLE_STRIKETHROUGH: u8 = 8;

/// One style modifier over a character range of a text sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleRecord {
    /// First styled character (inclusive).
    pub start_char: u16,
    /// One past the last styled character.
    pub end_char: u16,
    /// Font identifier into the description's font table.
    pub font_id: u16,
    /// Face flag combination.
    pub style_flags: u8,
    /// Font size in points.
    pub font_size: u8,
    /// Text color, RGBA.
    pub color: u32,
}

impl StyleRecord {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.start_char.to_be_bytes());
        out.extend_from_slice(&self.end_char.to_be_bytes());
        out.extend_from_slice(&self.font_id.to_be_bytes());
        out.push(self.style_flags);
        out.push(self.font_size);
        out.extend_from_slice(&self.color.to_be_bytes());
    }
}

/// The sample description for a TX3G track, serialized as the `tx3g` sample
/// entry payload (display flags, justification, background, default box,
/// default style, font table).
#[derive(Debug, Clone, PartialEq)]
pub struct TextConfig {
    /// Display flags.
    pub display_flags: u32,
    /// Horizontal justification (1 = center).
    pub horiz_justify: i8,
    /// Vertical justification (-1 = bottom).
    pub vert_justify: i8,
    /// Background color, RGBA (transparent by default).
    pub back_color: u32,
    /// Default text box: top, left, bottom, right.
    pub default_box: (i16, i16, i16, i16),
    /// Default style applied where no modifier matches.
    pub default_style: StyleRecord,
    /// Font table: id and name pairs.
    pub fonts: Vec<(u16, String)>,
}

impl Default for TextConfig {
    fn default() -> Self {
        TextConfig {
            display_flags: 0,
            horiz_justify: 1,
            vert_justify: -1,
            back_color: 0x0000_0000,
            default_box: (0, 0, 0, 0),
            default_style: StyleRecord {
                start_char: 0,
                end_char: 0,
                font_id: 1,
                style_flags: 0,
                font_size: 18,
                color: 0xFFFF_FFFF,
            },
            fonts: vec![(1, "Serif".to_string())],
        }
    }
}

impl TextConfig {
    /// Serializes the description payload.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.display_flags.to_be_bytes());
        out.push(self.horiz_justify as u8);
        out.push(self.vert_justify as u8);
        out.extend_from_slice(&self.back_color.to_be_bytes());
        let (top, left, bottom, right) = self.default_box;
        out.extend_from_slice(&top.to_be_bytes());
        out.extend_from_slice(&left.to_be_bytes());
        out.extend_from_slice(&bottom.to_be_bytes());
        out.extend_from_slice(&right.to_be_bytes());
        self.default_style.write(&mut out);
        // font table box
        let names_len: usize = self.fonts.iter().map(|(_, n)| 3 + n.len()).sum();
        out.extend_from_slice(&((8 + 2 + names_len) as u32).to_be_bytes());
        out.extend_from_slice(b"ftab");
        out.extend_from_slice(&(self.fonts.len() as u16).to_be_bytes());
        for (id, name) in &self.fonts {
            out.extend_from_slice(&id.to_be_bytes());
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
        }
        out
    }
}

/// One timed text sample: UTF-8 text plus style modifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextSample {
    /// The text; empty for gap-filling samples.
    pub text: String,
    /// Style modifiers.
    pub styles: Vec<StyleRecord>,
}

impl TextSample {
    /// Serializes the sample: 16-bit text length, UTF-8 text, then a `styl`
    /// modifier box when styles are present.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.text.len() as u16).to_be_bytes());
        out.extend_from_slice(self.text.as_bytes());
        if !self.styles.is_empty() {
            let size = 8 + 2 + self.styles.len() * 12;
            out.extend_from_slice(&(size as u32).to_be_bytes());
            out.extend_from_slice(b"styl");
            out.extend_from_slice(&(self.styles.len() as u16).to_be_bytes());
            for style in &self.styles {
                style.write(&mut out);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sample_is_two_bytes() {
        assert_eq!(TextSample::default().build(), vec![0, 0]);
    }

    #[test]
    fn styled_sample_layout() {
        let samp = TextSample {
            text: "Hello, world.".to_string(),
            styles: vec![StyleRecord {
                start_char: 7,
                end_char: 12,
                font_id: 1,
                style_flags: STYLE_BOLD,
                font_size: 18,
                color: 0xFFFF_FFFF,
            }],
        };
        let data = samp.build();
        assert_eq!(&data[..2], &13u16.to_be_bytes());
        assert_eq!(&data[2..15], b"Hello, world.");
        // styl box header
        assert_eq!(&data[15..19], &22u32.to_be_bytes());
        assert_eq!(&data[19..23], b"styl");
        assert_eq!(&data[23..25], &1u16.to_be_bytes());
        assert_eq!(&data[25..27], &7u16.to_be_bytes());
        assert_eq!(&data[27..29], &12u16.to_be_bytes());
    }

    #[test]
    fn config_contains_font_table() {
        let cfg = TextConfig::default();
        let data = cfg.build();
        let ftab = data.windows(4).position(|w| w == b"ftab").unwrap();
        assert_eq!(&data[ftab + 4..ftab + 6], &1u16.to_be_bytes());
        assert_eq!(&data[ftab + 9..ftab + 14], b"Serif");
    }
}
