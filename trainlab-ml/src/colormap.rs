//! Colormaps used to tell curves apart.

use crate::error::MlError;

/// An sRGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn from_unit(rgb: [f64; 3]) -> Self {
        let to_u8 = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(to_u8(rgb[0]), to_u8(rgb[1]), to_u8(rgb[2]))
    }
}

/// Resolution of the lookup table of segmented colormaps.
const LUT_SIZE: usize = 256;

/// `nipy_spectral` anchors, evenly spaced every 0.05.
const NIPY_SPECTRAL: [[f64; 3]; 21] = [
    [0.0, 0.0, 0.0],
    [0.4667, 0.0, 0.5333],
    [0.5333, 0.0, 0.6],
    [0.0, 0.0, 0.6667],
    [0.0, 0.0, 0.8667],
    [0.0, 0.4667, 0.8667],
    [0.0, 0.6, 0.8667],
    [0.0, 0.6667, 0.6667],
    [0.0, 0.6667, 0.5333],
    [0.0, 0.6, 0.0],
    [0.0, 0.7333, 0.0],
    [0.0, 0.8667, 0.0],
    [0.0, 1.0, 0.0],
    [0.7333, 1.0, 0.0],
    [0.9333, 0.9333, 0.0],
    [1.0, 0.8, 0.0],
    [1.0, 0.6, 0.0],
    [1.0, 0.0, 0.0],
    [0.8667, 0.0, 0.0],
    [0.8, 0.0, 0.0],
    [0.8, 0.8, 0.8],
];

const TAB20: [Rgb; 20] = [
    Rgb::new(0x1f, 0x77, 0xb4),
    Rgb::new(0xae, 0xc7, 0xe8),
    Rgb::new(0xff, 0x7f, 0x0e),
    Rgb::new(0xff, 0xbb, 0x78),
    Rgb::new(0x2c, 0xa0, 0x2c),
    Rgb::new(0x98, 0xdf, 0x8a),
    Rgb::new(0xd6, 0x27, 0x28),
    Rgb::new(0xff, 0x98, 0x96),
    Rgb::new(0x94, 0x67, 0xbd),
    Rgb::new(0xc5, 0xb0, 0xd5),
    Rgb::new(0x8c, 0x56, 0x4b),
    Rgb::new(0xc4, 0x9c, 0x94),
    Rgb::new(0xe3, 0x77, 0xc2),
    Rgb::new(0xf7, 0xb6, 0xd2),
    Rgb::new(0x7f, 0x7f, 0x7f),
    Rgb::new(0xc7, 0xc7, 0xc7),
    Rgb::new(0xbc, 0xbd, 0x22),
    Rgb::new(0xdb, 0xdb, 0x8d),
    Rgb::new(0x17, 0xbe, 0xcf),
    Rgb::new(0x9e, 0xda, 0xe5),
];

/// Supported colormaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    /// Segmented black-purple-blue-green-yellow-red-grey ramp.
    NipySpectral,
    /// Twenty categorical colours, paired dark/light.
    Tab20,
}

impl Colormap {
    pub fn from_name(name: &str) -> Result<Self, MlError> {
        match name {
            "nipy_spectral" => Ok(Self::NipySpectral),
            "tab20" => Ok(Self::Tab20),
            other => Err(MlError::invalid_input(format!(
                "unknown colormap '{other}' (expected nipy_spectral or tab20)"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NipySpectral => "nipy_spectral",
            Self::Tab20 => "tab20",
        }
    }

    /// Colour at position `x` in [0, 1].
    pub fn sample(&self, x: f64) -> Rgb {
        let x = if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 };
        match self {
            Self::NipySpectral => {
                let index = ((x * LUT_SIZE as f64) as usize).min(LUT_SIZE - 1);
                let position = index as f64 / (LUT_SIZE - 1) as f64;
                Rgb::from_unit(interpolate(&NIPY_SPECTRAL, position))
            }
            Self::Tab20 => {
                let index = ((x * TAB20.len() as f64) as usize).min(TAB20.len() - 1);
                TAB20[index]
            }
        }
    }

    /// `n` colours taken at `i / n` for `i in 0..n`.
    pub fn colors(&self, n: usize) -> Vec<Rgb> {
        (0..n).map(|i| self.sample(i as f64 / n as f64)).collect()
    }
}

fn interpolate(anchors: &[[f64; 3]], position: f64) -> [f64; 3] {
    let segments = (anchors.len() - 1) as f64;
    let scaled = position * segments;
    let lower = (scaled.floor() as usize).min(anchors.len() - 2);
    let t = scaled - lower as f64;
    let (a, b) = (anchors[lower], anchors[lower + 1]);
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(Colormap::from_name("tab20").unwrap(), Colormap::Tab20);
        assert_eq!(
            Colormap::from_name("nipy_spectral").unwrap().name(),
            "nipy_spectral"
        );
        assert!(Colormap::from_name("jet").is_err());
    }

    #[test]
    fn test_tab20_sampling_walks_the_list() {
        let colors = Colormap::Tab20.colors(4);
        assert_eq!(colors[0], TAB20[0]);
        assert_eq!(colors[1], TAB20[5]);
        assert_eq!(colors[2], TAB20[10]);
        assert_eq!(colors[3], TAB20[15]);
    }

    #[test]
    fn test_nipy_spectral_endpoints() {
        assert_eq!(Colormap::NipySpectral.sample(0.0), Rgb::new(0, 0, 0));
        assert_eq!(Colormap::NipySpectral.sample(1.0), Rgb::new(204, 204, 204));
        // 0.6 is the pure green anchor.
        let green = Colormap::NipySpectral.sample(0.6);
        assert!(green.g > 250 && green.r < 5 && green.b < 5, "{green:?}");
    }

    #[test]
    fn test_colors_are_distinct_for_few_experiments() {
        let colors = Colormap::NipySpectral.colors(3);
        assert_eq!(colors.len(), 3);
        assert_ne!(colors[0], colors[1]);
        assert_ne!(colors[1], colors[2]);
        assert!(Colormap::Tab20.colors(0).is_empty());
    }
}
