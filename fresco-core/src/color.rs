//! 24-bit RGB color with the `#rrggbb` wire representation.
//!
//! The wire protocol and the snapshot codec both speak 7-character hex
//! strings (`#ff0000`), one byte per channel. Parsing accepts upper or
//! lower case; formatting always emits lowercase.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A single canvas cell color: 8 bits per channel, no alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Plain white, the base tone of a fresh canvas.
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);

    /// Construct from explicit channel values.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// A neutral gray with all channels equal.
    pub const fn gray(v: u8) -> Self {
        Self::rgb(v, v, v)
    }

    /// Parse a `#rrggbb` string (case-insensitive hex).
    pub fn parse(s: &str) -> Result<Self, ColorError> {
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| ColorError::InvalidFormat(s.to_string()))?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ColorError::InvalidFormat(s.to_string()));
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
        Ok(Self {
            r: channel(0).map_err(|_| ColorError::InvalidFormat(s.to_string()))?,
            g: channel(2).map_err(|_| ColorError::InvalidFormat(s.to_string()))?,
            b: channel(4).map_err(|_| ColorError::InvalidFormat(s.to_string()))?,
        })
    }

    /// Channel values as an array, in RGB order.
    pub const fn channels(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Color::parse(s)
    }
}

impl From<[u8; 3]> for Color {
    fn from(c: [u8; 3]) -> Self {
        Self::rgb(c[0], c[1], c[2])
    }
}

// The wire form is the hex string, so serde goes through Display/parse
// rather than a three-field struct.
impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Color::parse(&s).map_err(D::Error::custom)
    }
}

/// Color parsing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    /// Not a `#` followed by exactly six hex digits.
    InvalidFormat(String),
}

impl fmt::Display for ColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorError::InvalidFormat(s) => write!(f, "invalid color string: {s:?}"),
        }
    }
}

impl std::error::Error for ColorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lowercase() {
        let c = Color::parse("#ff8000").unwrap();
        assert_eq!(c, Color::rgb(0xff, 0x80, 0x00));
    }

    #[test]
    fn test_parse_uppercase() {
        let c = Color::parse("#FF8000").unwrap();
        assert_eq!(c, Color::rgb(0xff, 0x80, 0x00));
    }

    #[test]
    fn test_display_lowercase() {
        let c = Color::rgb(0xab, 0xcd, 0xef);
        assert_eq!(c.to_string(), "#abcdef");
    }

    #[test]
    fn test_roundtrip_all_channels() {
        let c = Color::rgb(1, 2, 3);
        assert_eq!(Color::parse(&c.to_string()).unwrap(), c);
    }

    #[test]
    fn test_parse_rejects_missing_hash() {
        assert!(Color::parse("ff8000").is_err());
    }

    #[test]
    fn test_parse_rejects_short() {
        assert!(Color::parse("#fff").is_err());
    }

    #[test]
    fn test_parse_rejects_long() {
        assert!(Color::parse("#ff8000ff").is_err());
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        assert!(Color::parse("#zzzzzz").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let c = Color::rgb(0xff, 0x00, 0x00);
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, "\"#ff0000\"");

        let back: Color = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_serde_rejects_garbage() {
        let result: Result<Color, _> = serde_json::from_str("\"red\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_white_constant() {
        assert_eq!(Color::WHITE.to_string(), "#ffffff");
    }
}
