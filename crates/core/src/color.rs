//! Perceptual color distance for filament matching.
//!
//! Colors arrive as hex strings (`RRGGBB` or `RRGGBBAA`, optional leading
//! `#`). They are converted sRGB -> linear RGB -> CIE XYZ (D65) -> CIE Lab
//! and compared with the CIEDE2000 formula (kL = kC = kH = 1).

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Distance reported for any input that cannot be parsed as a hex color.
///
/// Large enough that it never passes a matching tolerance.
pub const MALFORMED_DISTANCE: f64 = 100.0;

/// D65 reference white.
const REF_X: f64 = 0.95047;
const REF_Y: f64 = 1.0;
const REF_Z: f64 = 1.08883;

/// CIE Lab linear-segment threshold, (6/29)^3.
const LAB_EPSILON: f64 = 0.008856;

/// sRGB -> XYZ matrix for the D65 illuminant, 2 degree observer.
const SRGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.4124564, 0.3575761, 0.1804375],
    [0.2126729, 0.7151522, 0.0721750],
    [0.0193339, 0.1191920, 0.9503041],
];

/// 25^7, used by both the G correction and the RC rotation term.
const POW25_7: f64 = 6_103_515_625.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A color in CIE L*a*b* space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

/// Reasons a hex color string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColorParseError {
    #[error("expected 6 or 8 hex digits, got {0}")]
    Length(usize),

    #[error("invalid hex digit in {0:?}")]
    Digit(String),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// CIEDE2000 distance between two hex colors.
///
/// An 8-digit input has its trailing alpha byte discarded. If either input
/// is malformed the result is [`MALFORMED_DISTANCE`]; this never fails.
pub fn color_distance(a: &str, b: &str) -> f64 {
    match (hex_to_lab(a), hex_to_lab(b)) {
        (Ok(lab_a), Ok(lab_b)) => ciede2000(lab_a, lab_b),
        _ => MALFORMED_DISTANCE,
    }
}

/// Decode a hex color into sRGB components in `0.0..=1.0`.
pub fn parse_hex(hex: &str) -> Result<[f64; 3], ColorParseError> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    let digits = match digits.len() {
        6 => digits,
        8 => digits
            .get(..6)
            .ok_or_else(|| ColorParseError::Digit(hex.to_string()))?,
        n => return Err(ColorParseError::Length(n)),
    };

    if !digits.bytes().all(|c| c.is_ascii_hexdigit()) {
        return Err(ColorParseError::Digit(hex.to_string()));
    }

    let mut rgb = [0.0; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        let byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
            .map_err(|_| ColorParseError::Digit(hex.to_string()))?;
        *channel = f64::from(byte) / 255.0;
    }
    Ok(rgb)
}

/// Convert a hex color to CIE Lab.
pub fn hex_to_lab(hex: &str) -> Result<Lab, ColorParseError> {
    parse_hex(hex).map(srgb_to_lab)
}

/// Convert sRGB components (`0.0..=1.0`) to CIE Lab under D65.
pub fn srgb_to_lab(rgb: [f64; 3]) -> Lab {
    let linear = rgb.map(srgb_to_linear);

    let mut xyz = [0.0; 3];
    for (row, out) in SRGB_TO_XYZ.iter().zip(xyz.iter_mut()) {
        *out = row[0] * linear[0] + row[1] * linear[1] + row[2] * linear[2];
    }

    let fx = lab_f(xyz[0] / REF_X);
    let fy = lab_f(xyz[1] / REF_Y);
    let fz = lab_f(xyz[2] / REF_Z);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// CIEDE2000 color difference with unit weighting factors.
pub fn ciede2000(lab1: Lab, lab2: Lab) -> f64 {
    let (k_l, k_c, k_h) = (1.0, 1.0, 1.0);

    let c1 = lab1.a.hypot(lab1.b);
    let c2 = lab2.a.hypot(lab2.b);
    let c_bar = (c1 + c2) / 2.0;

    let c_bar7 = c_bar.powi(7);
    let g = 0.5 * (1.0 - (c_bar7 / (c_bar7 + POW25_7)).sqrt());

    let a1p = (1.0 + g) * lab1.a;
    let a2p = (1.0 + g) * lab2.a;

    let c1p = a1p.hypot(lab1.b);
    let c2p = a2p.hypot(lab2.b);

    let h1p = hue_degrees(lab1.b, a1p, c1p);
    let h2p = hue_degrees(lab2.b, a2p, c2p);

    let dl_p = lab2.l - lab1.l;
    let dc_p = c2p - c1p;

    let chroma_product = c1p * c2p;
    let dh_p = if chroma_product == 0.0 {
        0.0
    } else {
        let diff = h2p - h1p;
        if diff > 180.0 {
            diff - 360.0
        } else if diff < -180.0 {
            diff + 360.0
        } else {
            diff
        }
    };
    let dh_big = 2.0 * chroma_product.sqrt() * (dh_p / 2.0).to_radians().sin();

    let l_bar_p = (lab1.l + lab2.l) / 2.0;
    let c_bar_p = (c1p + c2p) / 2.0;

    let h_bar_p = if chroma_product == 0.0 {
        h1p + h2p
    } else if (h1p - h2p).abs() <= 180.0 {
        (h1p + h2p) / 2.0
    } else if h1p + h2p < 360.0 {
        (h1p + h2p + 360.0) / 2.0
    } else {
        (h1p + h2p - 360.0) / 2.0
    };

    let t = 1.0 - 0.17 * (h_bar_p - 30.0).to_radians().cos()
        + 0.24 * (2.0 * h_bar_p).to_radians().cos()
        + 0.32 * (3.0 * h_bar_p + 6.0).to_radians().cos()
        - 0.20 * (4.0 * h_bar_p - 63.0).to_radians().cos();

    let d_theta = 30.0 * (-((h_bar_p - 275.0) / 25.0).powi(2)).exp();
    let c_bar_p7 = c_bar_p.powi(7);
    let r_c = 2.0 * (c_bar_p7 / (c_bar_p7 + POW25_7)).sqrt();

    let l_offset = (l_bar_p - 50.0).powi(2);
    let s_l = 1.0 + (0.015 * l_offset) / (20.0 + l_offset).sqrt();
    let s_c = 1.0 + 0.045 * c_bar_p;
    let s_h = 1.0 + 0.015 * c_bar_p * t;
    let r_t = -(2.0 * d_theta).to_radians().sin() * r_c;

    let l_term = dl_p / (k_l * s_l);
    let c_term = dc_p / (k_c * s_c);
    let h_term = dh_big / (k_h * s_h);

    (l_term.powi(2) + c_term.powi(2) + h_term.powi(2) + r_t * c_term * h_term)
        .max(0.0)
        .sqrt()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// sRGB transfer function inverse (companded -> linear light).
fn srgb_to_linear(v: f64) -> f64 {
    if v > 0.04045 {
        ((v + 0.055) / 1.055).powf(2.4)
    } else {
        v / 12.92
    }
}

/// CIE Lab companding function.
fn lab_f(t: f64) -> f64 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

/// Hue angle in `[0, 360)`; zero when the chroma is zero.
fn hue_degrees(b: f64, a_prime: f64, c_prime: f64) -> f64 {
    if c_prime == 0.0 {
        0.0
    } else {
        b.atan2(a_prime).to_degrees().rem_euclid(360.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
