//! Confidence-to-color mapping for generated panel fields.
//!
//! A confidence score in `[0, 1]` is scaled to a percentage and mapped onto a
//! piecewise-linear color ramp. Scores at or below 40% are pure red, scores at
//! or above 80% are the ramp's darkest green, and everything in between is
//! interpolated channel by channel between the two bracketing [`ColorStop`]s.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An sRGB color with 8-bit channels.
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
}

/// Renders as a canonical CSS `rgb(r, g, b)` string.
impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// One point on the confidence ramp: a percentage threshold and its color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub threshold: f64,
    pub color: Rgb,
}

impl ColorStop {
    const fn new(threshold: f64, color: Rgb) -> Self {
        Self { threshold, color }
    }
}

pub const RED: Rgb = Rgb::new(255, 0, 0);
pub const DARK_GREEN: Rgb = Rgb::new(0, 200, 0);
/// Light gray (`#e5e5e5`) shown when confidence is unknown.
pub const NEUTRAL_GRAY: Rgb = Rgb::new(229, 229, 229);

/// Percentage at or below which the color clamps to [`RED`].
pub const LOW_THRESHOLD: f64 = 40.0;
/// Percentage at or above which the color clamps to [`DARK_GREEN`].
pub const HIGH_THRESHOLD: f64 = 80.0;

/// The ramp, ordered by strictly increasing threshold.
pub const COLOR_STOPS: [ColorStop; 6] = [
    ColorStop::new(40.0, Rgb::new(255, 0, 0)),
    ColorStop::new(50.0, Rgb::new(255, 50, 50)),
    ColorStop::new(60.0, Rgb::new(255, 195, 0)),
    ColorStop::new(70.0, Rgb::new(255, 214, 51)),
    ColorStop::new(80.0, Rgb::new(0, 255, 0)),
    ColorStop::new(100.0, Rgb::new(0, 200, 0)),
];

/// What an absent confidence score should look like.
///
/// The voice-call panel has always shown missing scores as confirmed (darkest
/// green) while the experience panel shows them as unknown (gray). Both are
/// kept as explicit policies rather than picking one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsetPolicy {
    /// Unknown confidence renders as [`NEUTRAL_GRAY`].
    #[default]
    Neutral,
    /// Unknown confidence renders as [`DARK_GREEN`].
    Maximal,
}

impl UnsetPolicy {
    pub fn color(self) -> Rgb {
        match self {
            Self::Neutral => NEUTRAL_GRAY,
            Self::Maximal => DARK_GREEN,
        }
    }
}

/// Map a confidence score to its border color.
///
/// Non-finite scores are treated like absent ones. Finite scores outside
/// `[0, 1]` clamp through the hard thresholds.
pub fn color_for(confidence: Option<f64>, policy: UnsetPolicy) -> Rgb {
    let Some(confidence) = confidence.filter(|c| c.is_finite()) else {
        return policy.color();
    };

    let percent = confidence * 100.0;
    if percent <= LOW_THRESHOLD {
        return RED;
    }
    if percent >= HIGH_THRESHOLD {
        return DARK_GREEN;
    }

    let (lower, upper) = bracket(percent);
    let span = upper.threshold - lower.threshold;
    let t = (percent - lower.threshold) / span;

    Rgb::new(
        lerp_channel(lower.color.r, upper.color.r, t),
        lerp_channel(lower.color.g, upper.color.g, t),
        lerp_channel(lower.color.b, upper.color.b, t),
    )
}

/// Inline style for a bordered panel box tinted by confidence.
pub fn style_for(confidence: Option<f64>, policy: UnsetPolicy) -> String {
    let border = color_for(confidence, policy);
    format!("border: 2px solid {border}; background-color: white; transition: all 0.3s ease;")
}

/// Find the first pair of adjacent stops whose thresholds contain `percent`.
///
/// Falls back to the outermost stops, which only happens for values the
/// hard thresholds already handle.
fn bracket(percent: f64) -> (ColorStop, ColorStop) {
    COLOR_STOPS
        .windows(2)
        .find(|pair| percent >= pair[0].threshold && percent <= pair[1].threshold)
        .map(|pair| (pair[0], pair[1]))
        .unwrap_or((COLOR_STOPS[0], COLOR_STOPS[COLOR_STOPS.len() - 1]))
}

fn lerp_channel(from: u8, to: u8, t: f64) -> u8 {
    let value = f64::from(from) + (f64::from(to) - f64::from(from)) * t;
    value.round().clamp(0.0, 255.0) as u8
}
