//! Color helpers for overlay tinting and marker drawing.
//!
//! Overlay colors are persisted next to the mask handle as CSS-style hex
//! strings (`#rrggbb`), so parsing and formatting live here.

/// An opaque 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const RED: Rgb = Rgb::new(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` or `#rgb` (leading `#` optional, case-insensitive).
    ///
    /// Returns `None` for anything else.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match digits.len() {
            6 => {
                let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
                let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
                let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
                Some(Self::new(r, g, b))
            }
            3 => {
                let expand = |i: usize| -> Option<u8> {
                    let v = u8::from_str_radix(&digits[i..i + 1], 16).ok()?;
                    Some(v * 17)
                };
                Some(Self::new(expand(0)?, expand(1)?, expand(2)?))
            }
            _ => None,
        }
    }

    /// Format as lowercase `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub(crate) fn to_skia(self, alpha: u8) -> tiny_skia::Color {
        tiny_skia::Color::from_rgba8(self.r, self.g, self.b, alpha)
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::RED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_long_hex() {
        assert_eq!(Rgb::from_hex("#ff8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(Rgb::from_hex("00FF7f"), Some(Rgb::new(0, 255, 127)));
    }

    #[test]
    fn test_parse_short_hex() {
        assert_eq!(Rgb::from_hex("#f0a"), Some(Rgb::new(255, 0, 170)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Rgb::from_hex("#ff00"), None);
        assert_eq!(Rgb::from_hex("red"), None);
        assert_eq!(Rgb::from_hex("#gg0000"), None);
        assert_eq!(Rgb::from_hex(""), None);
    }

    #[test]
    fn test_hex_roundtrip_is_lowercase() {
        let color = Rgb::from_hex("#AbCdEf").unwrap();
        assert_eq!(color.to_hex(), "#abcdef");
    }
}
