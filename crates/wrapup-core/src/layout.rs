//! Scrollbar visibility for generated text regions.

/// Default slack, in pixels, before a region counts as overflowing. Absorbs
/// sub-pixel rounding between scroll and client heights.
pub const DEFAULT_SCROLL_TOLERANCE_PX: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowMode {
    Auto,
    Hidden,
}

impl OverflowMode {
    pub fn as_css(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Hidden => "hidden",
        }
    }
}

/// Overflow directives for one text region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub vertical: OverflowMode,
    pub horizontal: OverflowMode,
}

/// Measured heights of a rendered text region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextRegion {
    pub scroll_height: f64,
    pub client_height: f64,
}

impl TextRegion {
    pub fn needs_scroll(&self, tolerance: f64) -> bool {
        self.scroll_height - self.client_height > tolerance
    }

    /// Vertical scrolling only when the content overflows by more than
    /// `tolerance`; horizontal overflow is always hidden.
    pub fn overflow(&self, tolerance: f64) -> Overflow {
        Overflow {
            vertical: if self.needs_scroll(tolerance) {
                OverflowMode::Auto
            } else {
                OverflowMode::Hidden
            },
            horizontal: OverflowMode::Hidden,
        }
    }
}
