//! Colors, palettes and multi-stop interpolation.
//!
//! Palettes are written the way the analysis scripts write them: a list of
//! CSS colour names or `#rrggbb` strings, spread evenly over `[min, max]`.

use serde::{Deserialize, Serialize};

use landsight_core::{Error, Result};

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    /// Parse a CSS colour name, `#rgb` or `#rrggbb`
    pub fn parse(text: &str) -> Result<Self> {
        let s = text.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| invalid_color(text));
        }
        let lower = s.to_ascii_lowercase();
        CSS_COLORS
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, c)| *c)
            .or_else(|| {
                // bare hex as written in some GEE palettes: 'FF0000'
                if s.len() == 6 {
                    parse_hex(s)
                } else {
                    None
                }
            })
            .ok_or_else(|| invalid_color(text))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

fn invalid_color(text: &str) -> Error {
    Error::InvalidParameter {
        name: "palette",
        value: text.to_string(),
        reason: "expected a CSS colour name or #rrggbb".into(),
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(Rgb::new(
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        )),
        3 => {
            let d = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
            Some(Rgb::new(d(0)?, d(1)?, d(2)?))
        }
        _ => None,
    }
}

const CSS_COLORS: &[(&str, Rgb)] = &[
    ("black", Rgb::new(0, 0, 0)),
    ("white", Rgb::new(255, 255, 255)),
    ("red", Rgb::new(255, 0, 0)),
    ("green", Rgb::new(0, 128, 0)),
    ("lime", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("yellow", Rgb::new(255, 255, 0)),
    ("orange", Rgb::new(255, 165, 0)),
    ("purple", Rgb::new(128, 0, 128)),
    ("cyan", Rgb::new(0, 255, 255)),
    ("aqua", Rgb::new(0, 255, 255)),
    ("magenta", Rgb::new(255, 0, 255)),
    ("fuchsia", Rgb::new(255, 0, 255)),
    ("gray", Rgb::new(128, 128, 128)),
    ("grey", Rgb::new(128, 128, 128)),
    ("silver", Rgb::new(192, 192, 192)),
    ("maroon", Rgb::new(128, 0, 0)),
    ("olive", Rgb::new(128, 128, 0)),
    ("navy", Rgb::new(0, 0, 128)),
    ("teal", Rgb::new(0, 128, 128)),
    ("brown", Rgb::new(165, 42, 42)),
    ("darkgreen", Rgb::new(0, 100, 0)),
    ("lightgreen", Rgb::new(144, 238, 144)),
    ("darkblue", Rgb::new(0, 0, 139)),
    ("lightblue", Rgb::new(173, 216, 230)),
    ("darkred", Rgb::new(139, 0, 0)),
    ("pink", Rgb::new(255, 192, 203)),
    ("beige", Rgb::new(245, 245, 220)),
    ("tan", Rgb::new(210, 180, 140)),
];

/// Ordered colors spread evenly over `[0, 1]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Palette {
    colors: Vec<Rgb>,
}

impl Palette {
    pub fn new(colors: Vec<Rgb>) -> Result<Self> {
        if colors.is_empty() {
            return Err(Error::InvalidParameter {
                name: "palette",
                value: "[]".into(),
                reason: "needs at least one colour".into(),
            });
        }
        Ok(Self { colors })
    }

    /// Parse a list such as `["green", "white", "red"]`
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let colors = names
            .iter()
            .map(|n| Rgb::parse(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(colors)
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Interpolated color at `t`, clamped to `[0, 1]`
    pub fn evaluate(&self, t: f64) -> Rgb {
        let n = self.colors.len();
        if n == 1 || t <= 0.0 || t.is_nan() {
            return self.colors[0];
        }
        if t >= 1.0 {
            return self.colors[n - 1];
        }
        let pos = t * (n - 1) as f64;
        let i = pos.floor() as usize;
        lerp_color(self.colors[i], self.colors[i + 1], pos - i as f64)
    }

    /// Nearest stop at `t`, without blending
    pub fn nearest(&self, t: f64) -> Rgb {
        let n = self.colors.len();
        let i = (t.clamp(0.0, 1.0) * (n - 1) as f64).round() as usize;
        self.colors[i.min(n - 1)]
    }
}

impl TryFrom<Vec<String>> for Palette {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Palette::parse(&names)
    }
}

impl From<Palette> for Vec<String> {
    fn from(p: Palette) -> Self {
        p.colors.iter().map(|c| c.to_hex()).collect()
    }
}

/// Preset palettes for the pipeline's layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorScheme {
    /// Black -> White
    Grayscale,
    /// White -> Green (vegetation indices)
    Vegetation,
    /// White -> Blue (water indices)
    Water,
    /// Green -> White -> Red (built-up index, -1..1)
    BuiltUp,
    /// Blue -> Yellow -> Red (temperature)
    Temperature,
    /// Black -> Yellow -> White (nighttime radiance)
    NightLights,
    /// Four distinct land-cover classes
    LandCover,
}

impl ColorScheme {
    pub const ALL: &[ColorScheme] = &[
        Self::Grayscale,
        Self::Vegetation,
        Self::Water,
        Self::BuiltUp,
        Self::Temperature,
        Self::NightLights,
        Self::LandCover,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Grayscale => "Grayscale",
            Self::Vegetation => "Vegetation",
            Self::Water => "Water",
            Self::BuiltUp => "Built-up",
            Self::Temperature => "Temperature",
            Self::NightLights => "Night lights",
            Self::LandCover => "Land cover",
        }
    }

    pub fn palette(&self) -> Palette {
        let colors = match self {
            Self::Grayscale => vec![Rgb::BLACK, Rgb::WHITE],
            Self::Vegetation => vec![Rgb::WHITE, Rgb::new(0, 128, 0)],
            Self::Water => vec![Rgb::WHITE, Rgb::new(0, 0, 255)],
            Self::BuiltUp => vec![Rgb::new(0, 128, 0), Rgb::WHITE, Rgb::new(255, 0, 0)],
            Self::Temperature => vec![
                Rgb::new(49, 54, 149),
                Rgb::new(116, 173, 209),
                Rgb::new(255, 255, 191),
                Rgb::new(244, 109, 67),
                Rgb::new(165, 0, 38),
            ],
            Self::NightLights => vec![Rgb::BLACK, Rgb::new(255, 204, 0), Rgb::WHITE],
            Self::LandCover => vec![
                Rgb::new(0xcc, 0x6d, 0x8f),
                Rgb::new(0xff, 0xc1, 0x07),
                Rgb::new(0x1e, 0x88, 0xe5),
                Rgb::new(0x00, 0x4d, 0x40),
            ],
        };
        Palette { colors }
    }
}

// ─── Interpolation ─────────────────────────────────────────────────────

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_names_and_hex() {
        assert_eq!(Rgb::parse("green").unwrap(), Rgb::new(0, 128, 0));
        assert_eq!(Rgb::parse("White").unwrap(), Rgb::WHITE);
        assert_eq!(Rgb::parse("#1e88e5").unwrap(), Rgb::new(30, 136, 229));
        assert_eq!(Rgb::parse("#f00").unwrap(), Rgb::new(255, 0, 0));
        assert_eq!(Rgb::parse("004d40").unwrap(), Rgb::new(0, 77, 64));
        assert!(Rgb::parse("not-a-colour").is_err());
        assert!(Rgb::parse("#12345").is_err());
    }

    #[test]
    fn three_stop_midpoint() {
        let p = Palette::parse(&["green", "white", "red"]).unwrap();
        assert_eq!(p.evaluate(0.0), Rgb::new(0, 128, 0));
        assert_eq!(p.evaluate(0.5), Rgb::WHITE);
        assert_eq!(p.evaluate(1.0), Rgb::new(255, 0, 0));
        assert_eq!(p.evaluate(0.25), Rgb::new(128, 192, 128));
    }

    #[test]
    fn clamping() {
        let p = ColorScheme::Grayscale.palette();
        assert_eq!(p.evaluate(-0.5), Rgb::BLACK);
        assert_eq!(p.evaluate(1.5), Rgb::WHITE);
        assert_eq!(p.evaluate(0.5), Rgb::new(128, 128, 128));
    }

    #[test]
    fn nearest_stop_for_classes() {
        let p = ColorScheme::LandCover.palette();
        assert_eq!(p.nearest(0.0), Rgb::new(0xcc, 0x6d, 0x8f));
        assert_eq!(p.nearest(1.0 / 3.0), Rgb::new(0xff, 0xc1, 0x07));
        assert_eq!(p.nearest(1.0), Rgb::new(0x00, 0x4d, 0x40));
    }

    #[test]
    fn palette_serde_round_trip() {
        let p: Palette = serde_json::from_str(r##"["white", "#0000ff"]"##).unwrap();
        assert_eq!(p, ColorScheme::Water.palette());
        assert!(serde_json::from_str::<Palette>("[]").is_err());
    }

    #[test]
    fn all_schemes_have_colors() {
        for scheme in ColorScheme::ALL {
            assert!(!scheme.palette().is_empty(), "{}", scheme.name());
        }
    }
}
