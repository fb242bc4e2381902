//! Two-colour choropleth ramp.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned for a malformed `#rrggbb` colour.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid colour '{input}': expected #rrggbb")]
pub struct ColorParseError {
    /// The rejected text.
    pub input: String,
}

/// An opaque 8-bit RGB colour, written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb {
    /// Creates a colour from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Formats as lowercase `#rrggbb`.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError {
            input: s.to_string(),
        };
        let hex = s.trim().strip_prefix('#').ok_or_else(err)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(err());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());

        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

/// Linear ramp from `low` to `high`, with a `neutral` colour for values
/// that cannot be placed on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorGradient {
    /// Colour at the minimum.
    pub low: Rgb,
    /// Colour at the maximum.
    pub high: Rgb,
    /// Colour for missing values or a degenerate range.
    pub neutral: Rgb,
}

impl Default for ColorGradient {
    fn default() -> Self {
        Self {
            low: Rgb::new(0xab, 0xd9, 0xe9),
            high: Rgb::new(0xd7, 0x19, 0x1c),
            neutral: Rgb::new(0xf0, 0xf0, 0xf0),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lerp_channel(from: u8, to: u8, t: f64) -> u8 {
    let value = (f64::from(to) - f64::from(from)).mul_add(t, f64::from(from));
    value.round().clamp(0.0, 255.0) as u8
}

impl ColorGradient {
    /// Maps `value` onto the ramp between `min` and `max`.
    ///
    /// Missing or non-finite inputs, and a zero-width range, map to the
    /// neutral colour. Values outside the range are clamped to its ends. An
    /// inverted range (`min > max`) still interpolates from `min` to `max`.
    #[must_use]
    pub fn color_for(&self, value: Option<f64>, min: Option<f64>, max: Option<f64>) -> Rgb {
        let (Some(value), Some(min), Some(max)) = (value, min, max) else {
            return self.neutral;
        };
        if !(value.is_finite() && min.is_finite() && max.is_finite()) {
            return self.neutral;
        }
        let span = max - min;
        if span == 0.0 {
            return self.neutral;
        }

        let t = ((value - min) / span).clamp(0.0, 1.0);
        Rgb::new(
            lerp_channel(self.low.r, self.high.r, t),
            lerp_channel(self.low.g, self.high.g, t),
            lerp_channel(self.low.b, self.high.b, t),
        )
    }
}
